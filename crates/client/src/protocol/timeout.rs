use std::time::Duration;

/// A throughput-based timeout.
///
/// A transfer times out when it moves fewer than `bytes_per_second` bytes per
/// second over a window of `seconds` seconds. The same value bounds how long a
/// caller is willing to [`wait`](crate::Response::wait) for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Timeout {
    pub bytes_per_second: u32,
    pub seconds: u32,
}

impl Timeout {
    pub const STANDARD: Timeout = Timeout::new(10, 30);

    /// Never time out.
    pub const NEVER: Timeout = Timeout::new(0, 0);

    pub const fn new(bytes_per_second: u32, seconds: u32) -> Self {
        Self { bytes_per_second, seconds }
    }

    pub const fn is_never(&self) -> bool {
        self.seconds == 0
    }

    /// The wall-clock window, or `None` for a timeout that never fires.
    pub const fn duration(&self) -> Option<Duration> {
        if self.is_never() { None } else { Some(Duration::from_secs(self.seconds as u64)) }
    }
}

impl Default for Timeout {
    fn default() -> Self {
        Self::STANDARD
    }
}
