//! File-transfer protocol parser and message builders.
//!
//! Every control message is a single line ending in `\n`:
//! - Requests: `GET <name>`, `PUT <name>`, `MSG <text>`, then `SIZE <n>`
//! - Replies: `FOUND <n>`, `NOT_FOUND`, `SEND_SIZE`, `OK`, `ACK <text>`,
//!   `ERR <message>`
//!
//! Lines are expected to have trailing whitespace trimmed already.

use bytes::BytesMut;

/// Parsed first line of a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Download a file
    Get { filename: String },

    /// Upload a file
    Put { filename: String },

    /// Send a text message
    Msg { text: String },

    /// Anything else
    Unknown { raw: String },
}

impl Command {
    /// Parse a command line.
    ///
    /// The tag before the first space is matched case-insensitively; the
    /// remainder is taken verbatim as the argument and may be empty.
    pub fn parse(line: &str) -> Command {
        let (tag, argument) = line.split_once(' ').unwrap_or((line, ""));

        if tag.eq_ignore_ascii_case("GET") {
            Command::Get {
                filename: argument.to_string(),
            }
        } else if tag.eq_ignore_ascii_case("PUT") {
            Command::Put {
                filename: argument.to_string(),
            }
        } else if tag.eq_ignore_ascii_case("MSG") {
            Command::Msg {
                text: argument.to_string(),
            }
        } else {
            Command::Unknown {
                raw: line.to_string(),
            }
        }
    }
}

/// Protocol-level failures reported to the peer as `ERR <message>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReply {
    InvalidFilename,
    MissingSize,
    InvalidSize,
    IncompleteTransfer,
    UnknownCommand,
}

impl ErrorReply {
    pub fn message(&self) -> &'static str {
        match self {
            ErrorReply::InvalidFilename => "Invalid filename",
            ErrorReply::MissingSize => "Missing size",
            ErrorReply::InvalidSize => "Invalid size",
            ErrorReply::IncompleteTransfer => "Incomplete transfer",
            ErrorReply::UnknownCommand => "Unknown command",
        }
    }
}

impl std::fmt::Display for ErrorReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Parse the `SIZE <n>` line that follows `SEND_SIZE`.
pub fn parse_size(line: &str) -> Result<u64, ErrorReply> {
    let value = line.strip_prefix("SIZE ").ok_or(ErrorReply::MissingSize)?;
    value.trim().parse().map_err(|_| ErrorReply::InvalidSize)
}

/// Server reply generator
pub struct Response;

impl Response {
    /// Generate NOT_FOUND response
    pub fn not_found() -> &'static [u8] {
        b"NOT_FOUND\n"
    }

    /// Generate FOUND header; the payload follows it directly
    pub fn found(size: u64) -> BytesMut {
        line(format_args!("FOUND {}", size))
    }

    /// Generate SEND_SIZE prompt
    pub fn send_size() -> &'static [u8] {
        b"SEND_SIZE\n"
    }

    /// Generate OK response
    pub fn ok() -> &'static [u8] {
        b"OK\n"
    }

    /// Generate ACK response for a message
    pub fn ack(text: &str) -> BytesMut {
        line(format_args!("ACK {}", text))
    }

    /// Generate ERR response
    pub fn error(reply: ErrorReply) -> BytesMut {
        line(format_args!("ERR {}", reply))
    }
}

/// Client request generator
pub struct Request;

impl Request {
    pub fn get(filename: &str) -> BytesMut {
        line(format_args!("GET {}", filename))
    }

    pub fn put(filename: &str) -> BytesMut {
        line(format_args!("PUT {}", filename))
    }

    /// Size declaration; the payload follows it directly
    pub fn size(size: u64) -> BytesMut {
        line(format_args!("SIZE {}", size))
    }

    pub fn msg(text: &str) -> BytesMut {
        line(format_args!("MSG {}", text))
    }
}

/// Server reply as seen by the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    NotFound,
    Found(u64),
    /// `FOUND` with a size that is not a number
    BadSize(String),
    SendSize,
    Ok,
    Ack(String),
    Err(String),
    Unexpected(String),
}

impl Reply {
    pub fn parse(line: &str) -> Reply {
        match line {
            "NOT_FOUND" => return Reply::NotFound,
            "SEND_SIZE" => return Reply::SendSize,
            "OK" => return Reply::Ok,
            _ => {}
        }

        if let Some(size) = line.strip_prefix("FOUND ") {
            return match size.trim().parse() {
                Ok(size) => Reply::Found(size),
                Err(_) => Reply::BadSize(line.to_string()),
            };
        }
        if let Some(text) = line.strip_prefix("ACK ") {
            return Reply::Ack(text.to_string());
        }
        if line == "ACK" {
            return Reply::Ack(String::new());
        }
        if let Some(message) = line.strip_prefix("ERR ") {
            return Reply::Err(message.to_string());
        }

        Reply::Unexpected(line.to_string())
    }
}

fn line(args: std::fmt::Arguments<'_>) -> BytesMut {
    let text = std::fmt::format(args);
    let mut buf = BytesMut::with_capacity(text.len() + 1);
    buf.extend_from_slice(text.as_bytes());
    buf.extend_from_slice(b"\n");
    buf
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_get() {
        assert_eq!(
            Command::parse("GET report.pdf"),
            Command::Get {
                filename: "report.pdf".to_string()
            }
        );
    }

    #[test]
    fn test_parse_tag_case_insensitive() {
        assert_eq!(
            Command::parse("put Video.MP4"),
            Command::Put {
                filename: "Video.MP4".to_string()
            }
        );
        assert_eq!(
            Command::parse("Msg hi"),
            Command::Msg {
                text: "hi".to_string()
            }
        );
    }

    #[test]
    fn test_parse_argument_verbatim() {
        // Only the first space splits; the rest is kept as-is
        assert_eq!(
            Command::parse("GET my holiday  photo.jpg"),
            Command::Get {
                filename: "my holiday  photo.jpg".to_string()
            }
        );
        assert_eq!(
            Command::parse("MSG  leading space"),
            Command::Msg {
                text: " leading space".to_string()
            }
        );
    }

    #[test]
    fn test_parse_missing_argument() {
        assert_eq!(
            Command::parse("GET"),
            Command::Get {
                filename: String::new()
            }
        );
    }

    #[test]
    fn test_parse_unknown_command() {
        assert_eq!(
            Command::parse("DELETE a.txt"),
            Command::Unknown {
                raw: "DELETE a.txt".to_string()
            }
        );
        assert!(matches!(
            Command::parse("GETX a.txt"),
            Command::Unknown { .. }
        ));
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("SIZE 50000"), Ok(50000));
        assert_eq!(parse_size("SIZE 0"), Ok(0));
    }

    #[test]
    fn test_parse_size_invalid() {
        assert_eq!(parse_size("SIZE x"), Err(ErrorReply::InvalidSize));
        assert_eq!(parse_size("SIZE -5"), Err(ErrorReply::InvalidSize));
        assert_eq!(parse_size("SIZE "), Err(ErrorReply::InvalidSize));
    }

    #[test]
    fn test_parse_size_missing() {
        assert_eq!(parse_size(""), Err(ErrorReply::MissingSize));
        assert_eq!(parse_size("SIZE"), Err(ErrorReply::MissingSize));
        assert_eq!(parse_size("size 10"), Err(ErrorReply::MissingSize));
        assert_eq!(parse_size("LENGTH 10"), Err(ErrorReply::MissingSize));
    }

    #[test]
    fn test_response_lines() {
        assert_eq!(&Response::found(4097)[..], b"FOUND 4097\n");
        assert_eq!(&Response::ack("hello there")[..], b"ACK hello there\n");
        assert_eq!(
            &Response::error(ErrorReply::IncompleteTransfer)[..],
            b"ERR Incomplete transfer\n"
        );
        assert_eq!(
            &Response::error(ErrorReply::UnknownCommand)[..],
            b"ERR Unknown command\n"
        );
    }

    #[test]
    fn test_request_lines() {
        assert_eq!(&Request::get("a.txt")[..], b"GET a.txt\n");
        assert_eq!(&Request::put("dir/b.bin")[..], b"PUT dir/b.bin\n");
        assert_eq!(&Request::size(0)[..], b"SIZE 0\n");
        assert_eq!(&Request::msg("hi")[..], b"MSG hi\n");
    }

    #[test]
    fn test_reply_parse() {
        assert_eq!(Reply::parse("NOT_FOUND"), Reply::NotFound);
        assert_eq!(Reply::parse("FOUND 12"), Reply::Found(12));
        assert_eq!(Reply::parse("SEND_SIZE"), Reply::SendSize);
        assert_eq!(Reply::parse("OK"), Reply::Ok);
        assert_eq!(Reply::parse("ACK hi"), Reply::Ack("hi".to_string()));
        assert_eq!(
            Reply::parse("ERR Invalid filename"),
            Reply::Err("Invalid filename".to_string())
        );
    }

    #[test]
    fn test_reply_parse_malformed() {
        assert_eq!(
            Reply::parse("FOUND lots"),
            Reply::BadSize("FOUND lots".to_string())
        );
        assert_eq!(
            Reply::parse("HELLO"),
            Reply::Unexpected("HELLO".to_string())
        );
    }
}
