//! TCP server for the file-transfer protocol.
//!
//! Accepts connections and hands each one to its own task running a
//! [`ProtocolHandler`]. The accept loop never waits on a transfer; the only
//! thing it waits for is a free connection slot.

use crate::config::ServerSettings;
use crate::protocol::ProtocolHandler;
use crate::storage::StorageRoot;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Server instance
pub struct Server {
    listener: TcpListener,
    storage: Arc<StorageRoot>,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Open the storage directory and bind the listening socket.
    pub async fn bind(settings: &ServerSettings) -> io::Result<Self> {
        let storage = Arc::new(StorageRoot::open(&settings.storage_dir)?);

        let addr = tokio::net::lookup_host(&settings.listen)
            .await?
            .next()
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("'{}' did not resolve to an address", settings.listen),
                )
            })?;
        let listener = TcpListener::from_std(create_listener(addr, settings.backlog)?)?;

        info!(
            address = %listener.local_addr()?,
            storage = %storage.path().display(),
            max_connections = settings.max_connections,
            "Server listening"
        );

        Ok(Server {
            listener,
            storage,
            connection_limit: Arc::new(Semaphore::new(settings.max_connections)),
        })
    }

    /// Address the server is actually bound to, for testing
    #[cfg(test)]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` completes, then close the
    /// listening socket.
    ///
    /// Connections already being served keep running; nothing waits for them.
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            // Wait for a connection slot
            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = self.connection_limit.clone().acquire_owned() => permit?,
            };

            let accepted = tokio::select! {
                _ = &mut shutdown => break,
                accepted = self.listener.accept() => accepted,
            };

            match accepted {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    let storage = Arc::clone(&self.storage);

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, storage).await {
                            warn!(peer = %peer, error = %e, "Connection error");
                        }
                        debug!(peer = %peer, "Connection closed");
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        info!("Server stopped accepting connections");
        Ok(())
    }
}

/// Handle a single client connection
async fn handle_connection(
    stream: TcpStream,
    storage: Arc<StorageRoot>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let (reader, writer) = stream.into_split();
    ProtocolHandler::new(BufReader::new(reader), writer, storage)
        .run()
        .await
}

fn create_listener(addr: SocketAddr, backlog: i32) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        match addr {
            SocketAddr::V4(_) => socket2::Domain::IPV4,
            SocketAddr::V6(_) => socket2::Domain::IPV6,
        },
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_reuse_address(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(backlog)?;

    Ok(socket.into())
}
