//! Bounded line reader.
//!
//! A control line ends at the first `\n`. Peers are allowed to close the
//! connection without sending the terminator, in which case whatever was
//! received is the line. Lines longer than [`MAX_LINE_LENGTH`] are truncated:
//! the first `MAX_LINE_LENGTH` bytes are returned and the remainder of that
//! line, up to and including its terminator, is dropped.
//!
//! Dropping the remainder is bounded. At most [`MAX_DISCARD`] further bytes
//! are consumed, and the reader waits at most [`DISCARD_WAIT`] for them, so a
//! peer that never terminates its line still gets an answer. Anything left
//! over stays on the stream.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Maximum length of a control line, excluding the terminator.
pub const MAX_LINE_LENGTH: usize = 4096;

/// Most bytes of an over-long line dropped after the first `MAX_LINE_LENGTH`.
pub const MAX_DISCARD: usize = 64 * 1024;

/// How long to wait for the rest of an over-long line.
pub const DISCARD_WAIT: Duration = Duration::from_millis(200);

/// Read one line from `reader`.
///
/// Returns the bytes before the terminator, decoded lossily as UTF-8.
/// An empty string means either an empty line or a peer that closed the
/// connection before sending anything.
pub async fn read_line<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = Vec::with_capacity(64);

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            // Peer closed; return what we have
            break;
        }

        let room = MAX_LINE_LENGTH - line.len();
        let window = &available[..available.len().min(room)];

        if let Some(pos) = window.iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&window[..pos]);
            reader.consume(pos + 1);
            return Ok(decode(line));
        }

        let taken = window.len();
        line.extend_from_slice(window);
        reader.consume(taken);

        if line.len() == MAX_LINE_LENGTH {
            match tokio::time::timeout(DISCARD_WAIT, discard_line(reader)).await {
                Ok(dropped) => {
                    let dropped = dropped?;
                    if dropped > 0 {
                        debug!(dropped, "Truncated over-long line");
                    }
                }
                Err(_) => debug!("Over-long line not terminated in time"),
            }
            break;
        }
    }

    Ok(decode(line))
}

/// Read one control line with trailing whitespace (including `\r`) removed.
///
/// Every control line received by either side of the protocol goes through
/// here so that `\r\n` clients and stray padding are treated the same way.
pub async fn read_control_line<R>(reader: &mut R) -> io::Result<String>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut line = read_line(reader).await?;
    let len = line.trim_end().len();
    line.truncate(len);
    Ok(line)
}

/// Consume the rest of the current line, including its terminator, up to
/// `MAX_DISCARD` bytes.
///
/// Returns the number of bytes dropped, not counting the terminator.
async fn discard_line<R>(reader: &mut R) -> io::Result<usize>
where
    R: AsyncBufRead + Unpin + ?Sized,
{
    let mut dropped = 0;

    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Ok(dropped);
        }

        match available.iter().position(|&b| b == b'\n') {
            Some(pos) if pos <= MAX_DISCARD - dropped => {
                reader.consume(pos + 1);
                return Ok(dropped + pos);
            }
            _ => {
                let n = available.len().min(MAX_DISCARD - dropped);
                reader.consume(n);
                dropped += n;
                if dropped == MAX_DISCARD {
                    return Ok(dropped);
                }
            }
        }
    }
}

fn decode(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}
