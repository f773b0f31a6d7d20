//! Gemini text generation, streamed over server-sent events.

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use futures_util::StreamExt;
use tracing::debug;
use url::Url;

use super::client::{Auth, UpstreamClient};
use super::types::{Content, GenerateContentRequest, GenerateContentResponse, Part};
use crate::credentials::Secret;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/";

pub struct GeminiClient {
    client: Arc<UpstreamClient>,
    api_key: Secret,
    endpoint: Url,
}

impl GeminiClient {
    pub fn new(client: Arc<UpstreamClient>, api_key: Secret, model: &str) -> Result<Self> {
        Self::with_base_url(client, api_key, GEMINI_BASE_URL, model)
    }

    fn with_base_url(
        client: Arc<UpstreamClient>,
        api_key: Secret,
        base_url: &str,
        model: &str,
    ) -> Result<Self> {
        Ok(Self {
            client,
            api_key,
            endpoint: endpoint(base_url, model)?,
        })
    }

    /// Generate a reply for a user prompt.
    ///
    /// `on_text` sees each text chunk as it arrives; the return value is the
    /// whole reply.
    pub async fn stream_text(
        &self,
        prompt: &str,
        mut on_text: impl FnMut(&str) + Send,
    ) -> Result<String> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
        };

        let response = self
            .client
            .post_stream(&self.endpoint, Auth::GoogApiKey(&self.api_key), &body)
            .await
            .context("Gemini request failed")?;

        let mut stream = response.bytes_stream();
        let mut events = SseBuffer::default();
        let mut reply = String::new();
        let mut finish_reason = None;

        let mut handle_event = |data: String| -> Result<()> {
            let chunk: GenerateContentResponse =
                serde_json::from_str(&data).context("Failed to parse Gemini stream chunk")?;
            let (text, reason) = chunk_text(&chunk)?;
            if !text.is_empty() {
                on_text(&text);
                reply.push_str(&text);
            }
            if reason.is_some() {
                finish_reason = reason;
            }
            Ok(())
        };

        while let Some(bytes) = stream.next().await {
            let bytes = bytes.context("Failed to read Gemini stream")?;
            for data in events.push(&bytes) {
                handle_event(data)?;
            }
        }
        for data in events.finish() {
            handle_event(data)?;
        }

        if reply.is_empty() {
            bail!(
                "Gemini returned an empty reply (finish reason: {})",
                finish_reason.as_deref().unwrap_or("unknown")
            );
        }
        debug!("Gemini reply complete ({} chars)", reply.len());
        Ok(reply)
    }
}

fn endpoint(base_url: &str, model: &str) -> Result<Url> {
    let base = Url::parse(base_url).with_context(|| format!("Invalid base URL: {}", base_url))?;
    let mut url = base
        .join(&format!("models/{}:streamGenerateContent", model))
        .with_context(|| format!("Failed to build Gemini URL for model: {}", model))?;
    url.query_pairs_mut().append_pair("alt", "sse");
    Ok(url)
}

/// Text of the first candidate in one stream chunk, plus its finish reason.
fn chunk_text(response: &GenerateContentResponse) -> Result<(String, Option<String>)> {
    if let Some(reason) = response
        .prompt_feedback
        .as_ref()
        .and_then(|f| f.block_reason.as_deref())
    {
        bail!("Gemini blocked the prompt: {}", reason);
    }

    let Some(candidate) = response.candidates.first() else {
        return Ok((String::new(), None));
    };

    let text = candidate
        .content
        .iter()
        .flat_map(|content| content.parts.iter())
        .filter_map(|part| part.text.as_deref())
        .collect();
    Ok((text, candidate.finish_reason.clone()))
}

/// Incremental server-sent-events decoder that yields `data` payloads.
#[derive(Debug, Default)]
struct SseBuffer {
    pending: Vec<u8>,
    data: String,
}

impl SseBuffer {
    /// Feed raw bytes; returns every event completed by them.
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut events = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            self.line(line.trim_end_matches(|c| c == '\r' || c == '\n'), &mut events);
        }
        events
    }

    /// Flush whatever the stream ended with.
    fn finish(mut self) -> Vec<String> {
        let mut events = Vec::new();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let rest = String::from_utf8_lossy(&rest);
            self.line(rest.trim_end_matches(|c| c == '\r' || c == '\n'), &mut events);
        }
        if !self.data.is_empty() {
            events.push(self.data);
        }
        events
    }

    fn line(&mut self, line: &str, events: &mut Vec<String>) {
        if line.is_empty() {
            if !self.data.is_empty() {
                events.push(std::mem::take(&mut self.data));
            }
            return;
        }
        // Other fields (event:, id:, comments) carry nothing we use
        if let Some(value) = line.strip_prefix("data:") {
            if !self.data.is_empty() {
                self.data.push('\n');
            }
            self.data.push_str(value.strip_prefix(' ').unwrap_or(value));
        }
    }
}
