//! Per-connection protocol state machine.
//!
//! A connection carries exactly one command:
//!
//! ```text
//! AwaitCommand -> ServeGet | ServePut | ServeMsg | Reject -> Done
//! ```
//!
//! Protocol errors (bad size line, unknown command, rejected filename) are
//! answered with an `ERR` line and end the connection normally. I/O errors
//! propagate to the caller, which logs them and drops the connection.

use super::parser::{parse_size, Command, ErrorReply, Response};
use crate::storage::StorageRoot;
use crate::wire::{read_control_line, receive_exact, send_exact};
use std::path::Path;
use std::sync::Arc;
use tokio::fs::{self, File};
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, trace, warn};

/// Current state of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    /// Waiting for the command line.
    AwaitCommand,
    /// Sending a file to the peer.
    ServeGet(String),
    /// Receiving a file from the peer.
    ServePut(String),
    /// Acknowledging a text message.
    ServeMsg(String),
    /// Unrecognised command.
    Reject,
    /// Nothing left to do; the connection will be closed.
    Done,
}

/// Drives one connection from its command line to completion.
///
/// Control lines and upload payload are both read through `reader`, which
/// must be the only reader of the connection.
pub struct ProtocolHandler<R, W> {
    reader: R,
    writer: W,
    storage: Arc<StorageRoot>,
}

impl<R, W> ProtocolHandler<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W, storage: Arc<StorageRoot>) -> Self {
        Self {
            reader,
            writer,
            storage,
        }
    }

    /// Run the state machine until `Done`, then shut down the write side.
    pub async fn run(mut self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        let mut state = State::AwaitCommand;

        while state != State::Done {
            trace!(?state, "Connection state");
            state = match state {
                State::AwaitCommand => self.await_command().await?,
                State::ServeGet(filename) => self.serve_get(&filename).await?,
                State::ServePut(filename) => self.serve_put(&filename).await?,
                State::ServeMsg(text) => self.serve_msg(&text).await?,
                State::Reject => self.reject().await?,
                State::Done => State::Done,
            };
        }

        self.writer.shutdown().await?;
        Ok(())
    }

    async fn await_command(&mut self) -> std::io::Result<State> {
        let line = read_control_line(&mut self.reader).await?;
        if line.is_empty() {
            trace!("Connection closed before a command was received");
            return Ok(State::Done);
        }

        Ok(match Command::parse(&line) {
            Command::Get { filename } => State::ServeGet(filename),
            Command::Put { filename } => State::ServePut(filename),
            Command::Msg { text } => State::ServeMsg(text),
            Command::Unknown { raw } => {
                debug!(command = %raw, "Unknown command");
                State::Reject
            }
        })
    }

    async fn serve_get(&mut self, filename: &str) -> std::io::Result<State> {
        let path = match self.storage.resolve(filename).await {
            Ok(path) => path,
            Err(e) => {
                warn!(filename, error = %e, "Rejected GET");
                self.reply(&Response::error(ErrorReply::InvalidFilename))
                    .await?;
                return Ok(State::Done);
            }
        };

        let size = match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => metadata.len(),
            _ => {
                debug!(filename, "GET for missing file");
                self.reply(Response::not_found()).await?;
                return Ok(State::Done);
            }
        };

        let mut file = File::open(&path).await?;
        self.reply(&Response::found(size)).await?;

        let outcome = send_exact(&mut file, &mut self.writer, size).await?;
        if outcome.is_complete() {
            info!(filename, bytes = size, "Sent file");
        } else {
            warn!(filename, %outcome, "File shrank while being sent");
        }

        Ok(State::Done)
    }

    async fn serve_put(&mut self, filename: &str) -> std::io::Result<State> {
        let path = match self.storage.resolve(filename).await {
            Ok(path) => path,
            Err(e) => {
                warn!(filename, error = %e, "Rejected PUT");
                self.reply(&Response::error(ErrorReply::InvalidFilename))
                    .await?;
                return Ok(State::Done);
            }
        };

        self.reply(Response::send_size()).await?;

        let size_line = read_control_line(&mut self.reader).await?;
        let size = match parse_size(&size_line) {
            Ok(size) => size,
            Err(reply) => {
                debug!(filename, line = %size_line, error = %reply, "Bad size line");
                self.reply(&Response::error(reply)).await?;
                return Ok(State::Done);
            }
        };

        let mut file = match create_target(&path).await {
            Ok(file) => file,
            Err(e) => {
                warn!(filename, error = %e, "Cannot create upload target");
                self.reply(&Response::error(ErrorReply::InvalidFilename))
                    .await?;
                return Ok(State::Done);
            }
        };

        let outcome = receive_exact(&mut self.reader, &mut file, size).await?;
        file.sync_all().await?;

        if outcome.is_complete() {
            info!(filename, bytes = size, "Received file");
            self.reply(Response::ok()).await?;
        } else {
            warn!(
                filename,
                %outcome,
                missing = outcome.missing(),
                "Upload ended early"
            );
            self.reply(&Response::error(ErrorReply::IncompleteTransfer))
                .await?;
        }

        Ok(State::Done)
    }

    async fn serve_msg(&mut self, text: &str) -> std::io::Result<State> {
        info!(message = %text, "Message received");
        self.reply(&Response::ack(text)).await?;
        Ok(State::Done)
    }

    async fn reject(&mut self) -> std::io::Result<State> {
        self.reply(&Response::error(ErrorReply::UnknownCommand))
            .await?;
        Ok(State::Done)
    }

    async fn reply(&mut self, line: &[u8]) -> std::io::Result<()> {
        self.writer.write_all(line).await?;
        self.writer.flush().await
    }
}

/// Create (or truncate) an upload target along with any missing directories.
async fn create_target(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }
    File::create(path).await
}
