//! Header wire format.
//!
//! - [`HeaderEncoder`]: writes outgoing [`Headers`](crate::Headers) as
//!   `Name: value\r\n` lines for the transfer engine
//! - [`decode_header_lines`]: turns the raw header lines a response received
//!   back into a `Headers` layer

mod header_decoder;
mod header_encoder;

pub use header_decoder::decode_header_lines;
pub use header_decoder::strip_line_ending;
pub use header_encoder::HeaderEncoder;
