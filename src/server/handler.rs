//! Prompt routing to the upstream providers.

use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedSender;
use tracing::debug;

use crate::api::{GeminiClient, ReplicateClient, RetryPolicy, UpstreamClient};
use crate::config::ServerConfig;
use crate::credentials::{CredentialPair, Provider};

/// Prompts starting with this go to image generation
pub const DREAM_PREFIX: &str = "/dream";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The complete text reply
    Text(String),
    /// URL of a generated image
    Image(String),
}

/// Receives text chunks while a reply is still being generated
pub type PartialSender = UnboundedSender<String>;

/// Answers one prompt. Shared by every connection of a running server.
#[async_trait]
pub trait ChatHandler: Send + Sync {
    /// Produce the reply for `prompt`. Text handlers may send chunks to
    /// `partial` as they arrive; the returned `Reply` is always complete.
    async fn handle(&self, prompt: &str, partial: PartialSender) -> Result<Reply>;
}

#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Dream(&'a str),
    Chat(&'a str),
}

fn parse_command(prompt: &str) -> Command<'_> {
    let prompt = prompt.trim();
    match prompt.strip_prefix(DREAM_PREFIX) {
        Some(rest) if rest.is_empty() || rest.starts_with(char::is_whitespace) => {
            Command::Dream(rest.trim_start())
        }
        _ => Command::Chat(prompt),
    }
}

/// Routes `/dream` prompts to Replicate and everything else to Gemini.
pub struct ProviderHandler {
    gemini: GeminiClient,
    replicate: ReplicateClient,
}

impl ProviderHandler {
    pub fn new(credentials: CredentialPair, config: &ServerConfig) -> Result<Self> {
        let client = Arc::new(UpstreamClient::new(
            config.request_timeout,
            RetryPolicy::default(),
        )?);
        let gemini = GeminiClient::new(
            client.clone(),
            credentials.secret(Provider::Gemini).clone(),
            &config.gemini_model,
        )?;
        let replicate =
            ReplicateClient::new(client, credentials.secret(Provider::Replicate).clone())?;
        Ok(Self { gemini, replicate })
    }
}

#[async_trait]
impl ChatHandler for ProviderHandler {
    async fn handle(&self, prompt: &str, partial: PartialSender) -> Result<Reply> {
        match parse_command(prompt) {
            Command::Dream("") => bail!("Usage: {} <description of the image>", DREAM_PREFIX),
            Command::Dream(description) => {
                debug!("Generating image ({} chars)", description.len());
                Ok(Reply::Image(self.replicate.generate_image(description).await?))
            }
            Command::Chat("") => bail!("Prompt is empty"),
            Command::Chat(text) => {
                debug!("Generating text ({} chars)", text.len());
                let reply = self
                    .gemini
                    .stream_text(text, |chunk| {
                        // The connection may already be gone
                        let _ = partial.send(chunk.to_string());
                    })
                    .await?;
                Ok(Reply::Text(reply))
            }
        }
    }
}
