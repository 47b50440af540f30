/// Byte counters for one transfer, as last reported by the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Progress {
    pub expected_receive_total: u64,
    pub received_so_far: u64,
    pub expected_send_total: u64,
    pub sent_so_far: u64,
}

impl Progress {
    pub const fn new(expected_receive_total: u64, received_so_far: u64, expected_send_total: u64, sent_so_far: u64) -> Self {
        Self { expected_receive_total, received_so_far, expected_send_total, sent_so_far }
    }
}
