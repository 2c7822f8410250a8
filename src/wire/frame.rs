//! Exact-length chunked transfer.
//!
//! A payload is always announced by its length before any payload byte is
//! sent, so both directions copy at most the declared count and then stop,
//! leaving any further bytes on the stream untouched.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of a single read/write during a bulk transfer.
pub const CHUNK_SIZE: usize = 4096;

/// Which way the payload flows, relative to the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// File to stream.
    Send,
    /// Stream to file.
    Receive,
}

/// Result of a single transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferOutcome {
    pub direction: Direction,
    /// Byte count announced before the transfer started.
    pub declared: u64,
    /// Bytes actually copied.
    pub transferred: u64,
}

impl TransferOutcome {
    /// True when every declared byte was copied.
    pub fn is_complete(&self) -> bool {
        self.transferred == self.declared
    }

    /// Declared bytes that never arrived.
    pub fn missing(&self) -> u64 {
        self.declared - self.transferred
    }
}

impl std::fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let verb = match self.direction {
            Direction::Send => "sent",
            Direction::Receive => "received",
        };
        write!(f, "{} {} of {} bytes", verb, self.transferred, self.declared)
    }
}

/// Copy up to `byte_count` bytes from a local file to the stream.
///
/// Stops early if the file runs out; the caller sees that as an incomplete
/// outcome. Never writes more than `byte_count` bytes, even if the file grew
/// after its size was announced.
pub async fn send_exact<F, S>(
    file: &mut F,
    stream: &mut S,
    byte_count: u64,
) -> io::Result<TransferOutcome>
where
    F: AsyncRead + Unpin + ?Sized,
    S: AsyncWrite + Unpin + ?Sized,
{
    let transferred = copy_chunked(file, stream, byte_count).await?;
    Ok(TransferOutcome {
        direction: Direction::Send,
        declared: byte_count,
        transferred,
    })
}

/// Copy up to `byte_count` bytes from the stream into a local file.
///
/// A zero-length read means the peer closed the connection; the transfer
/// ends there and whatever arrived stays in the file.
pub async fn receive_exact<S, F>(
    stream: &mut S,
    file: &mut F,
    byte_count: u64,
) -> io::Result<TransferOutcome>
where
    S: AsyncRead + Unpin + ?Sized,
    F: AsyncWrite + Unpin + ?Sized,
{
    let transferred = copy_chunked(stream, file, byte_count).await?;
    Ok(TransferOutcome {
        direction: Direction::Receive,
        declared: byte_count,
        transferred,
    })
}

async fn copy_chunked<R, W>(reader: &mut R, writer: &mut W, byte_count: u64) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut remaining = byte_count;

    while remaining > 0 {
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let n = reader.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        writer.write_all(&chunk[..n]).await?;
        remaining -= n as u64;
    }

    writer.flush().await?;
    Ok(byte_count - remaining)
}
