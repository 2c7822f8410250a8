//! File-transfer protocol.
//!
//! A client opens a connection and sends one command line; the server
//! answers and, where the command calls for it, streams a length-prefixed
//! payload in either direction before closing the connection.
//!
//! ## Protocol Format
//!
//! ```text
//! Download:
//!   > GET report.pdf
//!   < FOUND 50000
//!   < <50000 raw bytes>
//!
//!   > GET missing.txt
//!   < NOT_FOUND
//!
//! Upload:
//!   > PUT video.mp4
//!   < SEND_SIZE
//!   > SIZE 1048576
//!   > <1048576 raw bytes>
//!   < OK                       (or ERR Incomplete transfer)
//!
//! Message:
//!   > MSG hello
//!   < ACK hello
//! ```

pub mod handler;
pub mod parser;

pub use handler::ProtocolHandler;
pub use parser::{Reply, Request};
