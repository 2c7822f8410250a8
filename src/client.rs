//! Client side of the file-transfer protocol.
//!
//! Each operation opens its own connection, issues one command and reads
//! the result. Failed transfers are reported, never retried.

use crate::protocol::{Reply, Request};
use crate::wire::{read_control_line, receive_exact, send_exact};
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Connects to a file server to download, upload and send messages.
#[derive(Debug, Clone)]
pub struct FileClient {
    server: String,
}

impl FileClient {
    pub fn new(server: impl Into<String>) -> Self {
        FileClient {
            server: server.into(),
        }
    }

    async fn connect(&self) -> Result<(BufReader<OwnedReadHalf>, OwnedWriteHalf), ClientError> {
        let stream = TcpStream::connect(&self.server)
            .await
            .map_err(|e| ClientError::Connect(self.server.clone(), e))?;
        debug!(server = %self.server, "Connected");

        let (reader, writer) = stream.into_split();
        Ok((BufReader::new(reader), writer))
    }

    /// Download `remote` into `local`, returning the number of bytes saved.
    ///
    /// The local file is only created once the server has confirmed the
    /// remote file exists. An interrupted download leaves the bytes that did
    /// arrive in place.
    pub async fn download(&self, remote: &str, local: &Path) -> Result<u64, ClientError> {
        check_name(remote)?;
        let (mut reader, mut writer) = self.connect().await?;

        writer.write_all(&Request::get(remote)).await?;

        let size = match read_reply(&mut reader).await? {
            Reply::Found(size) => size,
            Reply::NotFound => return Err(ClientError::NotFound(remote.to_string())),
            Reply::BadSize(line) => return Err(ClientError::InvalidSize(line)),
            Reply::Err(message) => return Err(ClientError::Rejected(message)),
            other => return Err(ClientError::Unexpected(format!("{:?}", other))),
        };

        if let Some(parent) = local.parent() {
            fs::create_dir_all(parent).await?;
        }
        let mut file = File::create(local).await?;

        let outcome = receive_exact(&mut reader, &mut file, size).await?;
        file.sync_all().await?;

        if !outcome.is_complete() {
            return Err(ClientError::Incomplete {
                expected: size,
                received: outcome.transferred,
            });
        }

        info!(remote, local = %local.display(), bytes = size, "Download complete");
        Ok(size)
    }

    /// Upload `local` as `remote`, returning the number of bytes sent.
    pub async fn upload(&self, local: &Path, remote: &str) -> Result<u64, ClientError> {
        check_name(remote)?;

        let size = match fs::metadata(local).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => return Err(ClientError::LocalFileMissing(local.to_path_buf())),
        };
        let mut file = File::open(local).await?;

        let (mut reader, mut writer) = self.connect().await?;
        writer.write_all(&Request::put(remote)).await?;

        match read_reply(&mut reader).await? {
            Reply::SendSize => {}
            Reply::Err(message) => return Err(ClientError::Rejected(message)),
            other => return Err(ClientError::Unexpected(format!("{:?}", other))),
        }

        writer.write_all(&Request::size(size)).await?;
        let outcome = send_exact(&mut file, &mut writer, size).await?;
        if !outcome.is_complete() {
            // The server is still waiting for the rest; hanging up makes it
            // report an incomplete transfer.
            writer.shutdown().await?;
        }

        match read_reply(&mut reader).await? {
            Reply::Ok if outcome.is_complete() => {
                info!(local = %local.display(), remote, bytes = size, "Upload complete");
                Ok(size)
            }
            Reply::Err(message) => Err(ClientError::Rejected(message)),
            other => Err(ClientError::Unexpected(format!("{:?}", other))),
        }
    }

    /// Send a text message, returning the server's acknowledgement.
    pub async fn message(&self, text: &str) -> Result<String, ClientError> {
        check_name(text)?;
        let (mut reader, mut writer) = self.connect().await?;

        writer.write_all(&Request::msg(text)).await?;

        match read_reply(&mut reader).await? {
            Reply::Ack(ack) => Ok(ack),
            Reply::Err(message) => Err(ClientError::Rejected(message)),
            other => Err(ClientError::Unexpected(format!("{:?}", other))),
        }
    }
}

async fn read_reply(reader: &mut BufReader<OwnedReadHalf>) -> Result<Reply, ClientError> {
    let line = read_control_line(reader).await?;
    if line.is_empty() {
        return Err(ClientError::NoResponse);
    }
    Ok(Reply::parse(&line))
}

/// Command arguments travel on a single line.
fn check_name(argument: &str) -> Result<(), ClientError> {
    if argument.contains('\n') {
        return Err(ClientError::InvalidArgument(argument.to_string()));
    }
    Ok(())
}

/// Client operation errors
#[derive(Debug)]
pub enum ClientError {
    /// Could not reach the server
    Connect(String, io::Error),
    /// Connection or local file I/O failed
    Io(io::Error),
    /// Server closed the connection without replying
    NoResponse,
    /// Requested file does not exist on the server
    NotFound(String),
    /// Server answered with `ERR <message>`
    Rejected(String),
    /// Server reply did not fit the exchange
    Unexpected(String),
    /// Server announced a size that is not a number
    InvalidSize(String),
    /// Connection ended before the announced payload arrived
    Incomplete { expected: u64, received: u64 },
    /// Local file to upload does not exist or is not a regular file
    LocalFileMissing(PathBuf),
    /// Argument cannot be sent on a single protocol line
    InvalidArgument(String),
}

impl From<io::Error> for ClientError {
    fn from(e: io::Error) -> Self {
        ClientError::Io(e)
    }
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::Connect(server, e) => write!(f, "Failed to connect to {}: {}", server, e),
            ClientError::Io(e) => write!(f, "I/O error: {}", e),
            ClientError::NoResponse => write!(f, "No response from server"),
            ClientError::NotFound(name) => {
                write!(f, "The file '{}' does not exist on the server", name)
            }
            ClientError::Rejected(message) => write!(f, "Server reported an error: {}", message),
            ClientError::Unexpected(reply) => write!(f, "Unexpected response: {}", reply),
            ClientError::InvalidSize(line) => write!(f, "Invalid size in response: {}", line),
            ClientError::Incomplete { expected, received } => write!(
                f,
                "Transfer incomplete: {} of {} bytes ({} missing)",
                received,
                expected,
                expected - received
            ),
            ClientError::LocalFileMissing(path) => {
                write!(f, "Local file not found: {}", path.display())
            }
            ClientError::InvalidArgument(arg) => {
                write!(f, "Argument contains a line break: {:?}", arg)
            }
        }
    }
}

impl std::error::Error for ClientError {}
