use std::io::{self, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use solus::config::ServerConfig;
use solus::credentials::CredentialPair;
use solus::server::{self, EmbeddedServer, ResponseKind};
use solus::startup::Bridge;
use solus::{logging, runtime};

/// Solus - embedded chat server for Gemini and Replicate
#[derive(Parser)]
#[command(name = "solus")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server and keep it running until Ctrl-C
    Serve {
        /// Replicate API token
        #[arg(long, env = "REPLICATE_TOKEN", hide_env_values = true)]
        replicate_token: String,

        /// Gemini API key
        #[arg(long, env = "GEMINI_TOKEN", hide_env_values = true)]
        gemini_token: String,
    },
    /// Send one prompt to a running server and print the reply
    Ask {
        /// Prompt text; start with /dream to generate an image
        prompt: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ServerConfig::from_env()?;

    match cli.command {
        Commands::Serve {
            replicate_token,
            gemini_token,
        } => run_serve(config, replicate_token, gemini_token).await,
        Commands::Ask { prompt } => run_ask(config, &prompt).await,
    }
}

async fn run_serve(config: ServerConfig, replicate_token: String, gemini_token: String) -> Result<()> {
    let socket = config.socket.clone();
    let timeout = config.startup_timeout;
    let server = Arc::new(EmbeddedServer::new(config));
    let bridge = runtime::install(Bridge::new(server.clone(), timeout))?;

    let credentials = CredentialPair::new(replicate_token, gemini_token);
    let started = tokio::task::spawn_blocking(move || bridge.try_start(credentials))
        .await
        .context("Start task failed")?;
    if let Err(e) = started {
        bail!("{}", e);
    }

    println!("✅ Solus is listening on {}", socket);
    println!("   Press Ctrl-C to stop.");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    server.shutdown();
    println!("\nStopped.");
    Ok(())
}

async fn run_ask(config: ServerConfig, prompt: &str) -> Result<()> {
    let mut streamed = false;
    let response = server::ask(&config.socket, prompt, |chunk| {
        streamed = true;
        print!("{}", chunk);
        let _ = io::stdout().flush();
    })
    .await?;

    match response.response_kind() {
        Some(ResponseKind::Image) => println!("🖼️  {}", response.message),
        Some(ResponseKind::Error) => bail!("Server error: {}", response.message),
        _ if streamed => println!(),
        _ => println!("{}", response.message),
    }
    Ok(())
}
