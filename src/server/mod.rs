//! Embedded chat server.
//!
//! Runs on its own thread with its own tokio runtime, listening on a local
//! Unix socket for length-prefixed protobuf requests from the host app.
//! Readiness is reported to the bridge once the socket is bound.

mod client;
mod connection;
pub mod frame;
mod handler;
pub mod protocol;
pub mod socket;

use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::UnixListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::credentials::CredentialPair;
use crate::startup::{readiness, ReadySender, Readiness, ServerSubsystem};

pub use client::ask;
pub use handler::{ChatHandler, PartialSender, ProviderHandler, Reply, DREAM_PREFIX};
pub use protocol::{ChatRequest, ChatResponse, ResponseKind};

/// Builds the request handler for a start attempt from its credentials
pub type HandlerFactory =
    Arc<dyn Fn(CredentialPair, &ServerConfig) -> Result<Arc<dyn ChatHandler>> + Send + Sync>;

pub fn handler_factory<F>(factory: F) -> HandlerFactory
where
    F: Fn(CredentialPair, &ServerConfig) -> Result<Arc<dyn ChatHandler>> + Send + Sync + 'static,
{
    Arc::new(factory)
}

/// Pause after a failed `accept` before trying again
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub struct EmbeddedServer {
    config: ServerConfig,
    factory: HandlerFactory,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
}

impl EmbeddedServer {
    /// Server backed by the Gemini and Replicate providers.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_handler_factory(
            config,
            handler_factory(|credentials, config| {
                let handler = ProviderHandler::new(credentials, config)?;
                Ok(Arc::new(handler) as Arc<dyn ChatHandler>)
            }),
        )
    }

    pub fn with_handler_factory(config: ServerConfig, factory: HandlerFactory) -> Self {
        Self {
            config,
            factory,
            shutdown: Mutex::new(None),
        }
    }

    /// Stop the serve loop of the last started instance.
    ///
    /// Returns `false` if nothing was running.
    pub fn shutdown(&self) -> bool {
        let sender = self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        match sender {
            Some(sender) => sender.send(()).is_ok(),
            None => false,
        }
    }
}

impl ServerSubsystem for EmbeddedServer {
    fn initialize(&self, credentials: CredentialPair) -> Result<Readiness> {
        let handler =
            (self.factory)(credentials, &self.config).context("Failed to create request handler")?;

        let (ready, readiness) = readiness::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let config = self.config.clone();

        thread::Builder::new()
            .name("solus-server".to_string())
            .spawn(move || run(config, handler, ready, shutdown_rx))
            .context("Failed to spawn server thread")?;

        // Replacing an older sender drops it, which stops that instance
        *self
            .shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(shutdown_tx);
        Ok(readiness)
    }
}

impl std::fmt::Debug for EmbeddedServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedServer")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Body of the server thread.
fn run(
    config: ServerConfig,
    handler: Arc<dyn ChatHandler>,
    ready: ReadySender,
    shutdown: oneshot::Receiver<()>,
) {
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("solus-worker")
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to build server runtime: {}", e);
            ready.fail(format!("failed to build async runtime: {}", e));
            return;
        }
    };

    runtime.block_on(async move {
        let listener = match socket::bind(&config.socket) {
            Ok(listener) => listener,
            Err(e) => {
                ready.fail(format!("failed to bind {}: {}", config.socket, e));
                return;
            }
        };
        let socket_file = socket::socket_file(&config.socket);

        if !ready.ready() {
            warn!(
                "Startup was abandoned before the server became ready, releasing {}",
                config.socket
            );
            drop(listener);
            remove_socket_file(socket_file);
            return;
        }

        info!("Listening on {}", config.socket);
        serve(listener, handler, shutdown).await;
        remove_socket_file(socket_file);
        info!("Embedded server stopped");
    });
}

async fn serve(
    listener: UnixListener,
    handler: Arc<dyn ChatHandler>,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        tokio::select! {
            _ = &mut shutdown => {
                debug!("Shutdown requested");
                break;
            }
            accepted = listener.accept() => match accepted {
                Ok((stream, _)) => {
                    debug!("Client connected");
                    let handler = handler.clone();
                    tokio::spawn(async move {
                        if let Err(e) = connection::handle(stream, handler.as_ref()).await {
                            warn!("Connection closed with error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    warn!("Failed to accept connection: {}", e);
                    tokio::time::sleep(ACCEPT_BACKOFF).await;
                }
            }
        }
    }
}

fn remove_socket_file(path: Option<PathBuf>) {
    if let Some(path) = path {
        if let Err(e) = std::fs::remove_file(&path) {
            debug!("Could not remove {}: {}", path.display(), e);
        }
    }
}
