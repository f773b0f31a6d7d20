//! One client connection: read requests, answer them in order.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::frame::{read_message, write_message, FrameError};
use super::handler::{ChatHandler, Reply};
use super::protocol::{ChatRequest, ChatResponse, ResponseKind};

/// Serve a connection until the peer closes it.
///
/// Each request gets any number of `Text` chunks followed by exactly one
/// terminal response. Handler failures become `Error` responses; only
/// transport and framing errors end the connection.
pub async fn handle<S>(mut stream: S, handler: &dyn ChatHandler) -> Result<(), FrameError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(request) = read_message::<ChatRequest, _>(&mut stream).await? {
        debug!("Request {} received", request.id);
        let response = dispatch(&mut stream, handler, &request).await?;
        write_message(&mut stream, &response).await?;
    }
    debug!("Client closed connection");
    Ok(())
}

/// Run the handler, forwarding partial text as it arrives, and build the
/// terminal response.
async fn dispatch<S>(
    stream: &mut S,
    handler: &dyn ChatHandler,
    request: &ChatRequest,
) -> Result<ChatResponse, FrameError>
where
    S: AsyncWrite + Unpin,
{
    let (partial_tx, mut partial_rx) = mpsc::unbounded_channel();
    let handling = handler.handle(&request.prompt, partial_tx);
    tokio::pin!(handling);

    let outcome = loop {
        tokio::select! {
            outcome = &mut handling => break outcome,
            Some(chunk) = partial_rx.recv() => {
                let partial = ChatResponse::new(request.id.as_str(), chunk, ResponseKind::Text);
                write_message(stream, &partial).await?;
            }
        }
    };
    // Chunks sent just before the handler returned
    while let Ok(chunk) = partial_rx.try_recv() {
        let partial = ChatResponse::new(request.id.as_str(), chunk, ResponseKind::Text);
        write_message(stream, &partial).await?;
    }

    Ok(match outcome {
        Ok(Reply::Text(text)) => ChatResponse::new(request.id.as_str(), text, ResponseKind::End),
        Ok(Reply::Image(url)) => ChatResponse::new(request.id.as_str(), url, ResponseKind::Image),
        Err(e) => {
            warn!("Request {} failed: {:#}", request.id, e);
            ChatResponse::new(request.id.as_str(), format!("{:#}", e), ResponseKind::Error)
        }
    })
}
