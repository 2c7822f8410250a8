//! tcp-fileshare: a multi-client TCP file server and client
//!
//! The server stores uploaded files in a single directory and serves them
//! back on request; every connection carries one command:
//! - GET: download a file
//! - PUT: upload a file
//! - MSG: send a text message
//!
//! Features:
//! - One task per connection, no shared mutable state
//! - Files of any type and size, streamed in 4 KiB chunks
//! - Filenames confined to the storage directory
//! - Configuration via CLI arguments or TOML file

mod client;
mod config;
mod protocol;
mod server;
mod storage;
mod wire;

use client::FileClient;
use config::{Action, Config, ServerSettings};
use server::Server;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Load configuration
    let config = Config::load()?;

    // Initialize logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let client = FileClient::new(&config.server_addr);

    let result = match config.action {
        Action::Serve => return run_server(config.server).await,
        Action::Get { remote, local } => client.download(&remote, &local).await.map(|_| ()),
        Action::Put { local, remote } => client.upload(&local, &remote).await.map(|_| ()),
        Action::Msg { text } => client.message(&text).await.map(|ack| {
            info!(reply = %ack, "Server acknowledged message");
        }),
    };

    if let Err(e) = result {
        error!(error = %e, "Request failed");
        std::process::exit(1);
    }
    Ok(())
}

/// Run the file server until Ctrl-C
async fn run_server(settings: ServerSettings) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    info!(
        listen = %settings.listen,
        storage_dir = %settings.storage_dir.display(),
        "Starting tcp-fileshare server"
    );

    let server = Server::bind(&settings).await?;
    server.run_until(shutdown_signal()).await
}

/// Resolves when the process receives Ctrl-C
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}
