use anyhow::{bail, Context, Result};
use uuid::Uuid;

use super::frame::{read_message, write_message};
use super::protocol::{ChatRequest, ChatResponse};
use super::socket;
use crate::config::SocketAddress;

/// Send one prompt to a running server and wait for its terminal response.
///
/// Partial text chunks are passed to `on_partial` as they arrive.
pub async fn ask(
    address: &SocketAddress,
    prompt: &str,
    mut on_partial: impl FnMut(&str),
) -> Result<ChatResponse> {
    let mut stream = socket::connect(address)
        .await
        .with_context(|| format!("Failed to connect to {}", address))?;

    let request = ChatRequest::new(Uuid::new_v4().to_string(), prompt);
    write_message(&mut stream, &request).await?;

    loop {
        let response: ChatResponse = read_message(&mut stream)
            .await?
            .context("Server closed the connection without answering")?;
        if response.id != request.id {
            bail!(
                "Response id {} does not match request id {}",
                response.id,
                request.id
            );
        }

        match response.response_kind() {
            Some(kind) if kind.is_terminal() => return Ok(response),
            Some(_) => on_partial(&response.message),
            None => bail!("Unknown response kind {}", response.kind),
        }
    }
}
