//! Serializes a flattened [`Headers`] chain into wire-format header lines.
//!
//! The encoder writes one `Name: value\r\n` line per entry of the flattened
//! view, most remote layer first. It does not write the blank line that ends a
//! header block; transfer engines append their own framing.

use std::io;

use bytes::{BufMut, BytesMut};
use tokio_util::codec::Encoder;
use tracing::error;

use crate::protocol::Headers;

/// Initial buffer size reserved per encoded header line.
const INIT_LINE_SIZE: usize = 64;

#[derive(Debug, Clone, Copy, Default)]
pub struct HeaderEncoder;

impl Encoder<&Headers> for HeaderEncoder {
    type Error = io::Error;

    /// # Errors
    ///
    /// Returns [`io::ErrorKind::InvalidInput`] if a name or value contains a
    /// line break, which would otherwise smuggle an extra header onto the wire.
    fn encode(&mut self, item: &Headers, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let entries = item.flatten();
        dst.reserve(entries.len() * INIT_LINE_SIZE);

        for (name, value) in &entries {
            if has_line_break(name) || has_line_break(value) {
                error!(header = %name, "refusing to encode header containing a line break");
                return Err(io::Error::new(io::ErrorKind::InvalidInput, format!("header {name:?} contains a line break")));
            }
            dst.put_slice(name.as_bytes());
            dst.put_slice(b": ");
            dst.put_slice(value.as_bytes());
            dst.put_slice(b"\r\n");
        }
        Ok(())
    }
}

fn has_line_break(s: &str) -> bool {
    s.bytes().any(|b| b == b'\r' || b == b'\n')
}
