//! The capped in-memory sink for response bodies.

use bytes::Bytes;

/// Upper bound on the body bytes a response stores for its caller.
pub const MAX_BODY_SIZE: usize = 16 * 1024 * 1024;

const SMALL_GRANULE: usize = 1024;
const LARGE_GRANULE: usize = 4 * 1024;
const SMALL_LIMIT: usize = 8 * 1024;

/// Capacity to allocate for `content_len` bytes of body: one spare byte,
/// rounded up to 1 KiB while small and to 4 KiB after, never past the cap.
pub fn next_capacity(content_len: usize) -> usize {
    let with_spare = content_len.saturating_add(1);
    let granule = if with_spare < SMALL_LIMIT { SMALL_GRANULE } else { LARGE_GRANULE };
    with_spare.next_multiple_of(granule).min(MAX_BODY_SIZE + 1)
}

/// Accumulates body chunks up to [`MAX_BODY_SIZE`].
#[derive(Debug, Default)]
pub struct BodyBuffer {
    buf: Vec<u8>,
    truncated: bool,
}

impl BodyBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends as much of `bytes` as fits under the cap and returns the count
    /// taken. Anything beyond the cap is dropped and the buffer is marked
    /// truncated.
    pub fn store(&mut self, bytes: &[u8]) -> usize {
        let room = MAX_BODY_SIZE - self.buf.len();
        let accepted = bytes.len().min(room);
        if accepted < bytes.len() {
            self.truncated = true;
        }
        if accepted == 0 {
            return 0;
        }

        let content_len = self.buf.len() + accepted;
        let target = next_capacity(content_len);
        if target > self.buf.capacity() {
            self.buf.reserve_exact(target - self.buf.len());
        }
        self.buf.extend_from_slice(&bytes[..accepted]);
        accepted
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn to_bytes(&self) -> Bytes {
        Bytes::copy_from_slice(&self.buf)
    }
}
