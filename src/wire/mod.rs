//! Byte-stream primitives shared by the server and the client.
//!
//! - `line`: bounded reading of `\n`-terminated control lines
//! - `frame`: exact-length chunked copying between a stream and a file
//!
//! Both sides of a connection read control lines and payload bytes through
//! the same buffered reader, so bytes that arrive in the same segment as a
//! header line are never lost to the payload copy.

pub mod frame;
pub mod line;

pub use frame::{receive_exact, send_exact};
pub use line::read_control_line;
