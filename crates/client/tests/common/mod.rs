use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use micro_client::engine::{ActionTarget, EngineHost, FinishedTransfer, TransferEngine, TransferId, TransferInfo, TransferSpec, WatchState};
use micro_client::{EngineError, Progress};

pub type Captured = Arc<Mutex<Vec<TransferSpec>>>;

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

/// Answers every transfer with `200 OK` from the next timer callback,
/// echoing the encoded request headers back as the body.
#[derive(Debug, Default)]
pub struct CaptureEngine {
    captured: Captured,
    pending: Vec<TransferSpec>,
    finished: Vec<FinishedTransfer>,
    urls: HashMap<TransferId, String>,
}

impl CaptureEngine {
    pub fn new() -> (Self, Captured) {
        let engine = Self::default();
        let captured = Arc::clone(&engine.captured);
        (engine, captured)
    }
}

impl TransferEngine for CaptureEngine {
    fn add_transfer(&mut self, host: &mut dyn EngineHost, spec: TransferSpec) -> Result<(), EngineError> {
        self.captured.lock().push(spec.clone());
        self.urls.insert(spec.id, spec.url.clone());
        self.pending.push(spec);
        host.adjust_timer(0);
        Ok(())
    }

    fn remove_transfer(&mut self, _host: &mut dyn EngineHost, id: TransferId) -> Result<(), EngineError> {
        self.pending.retain(|spec| spec.id != id);
        Ok(())
    }

    fn socket_action(&mut self, host: &mut dyn EngineHost, target: ActionTarget, _events: WatchState) -> Result<usize, EngineError> {
        if target != ActionTarget::Timer {
            return Err(EngineError::bad_socket("capture engine owns no sockets"));
        }

        for spec in std::mem::take(&mut self.pending) {
            let body = spec.encode_headers().unwrap_or_default();
            host.on_receive_header(spec.id, b"HTTP/1.1 200 OK\r\n");
            host.on_receive_header(spec.id, format!("Content-Length: {}\r\n", body.len()).as_bytes());
            host.on_receive_header(spec.id, b"\r\n");
            host.on_receive_body(spec.id, &body);
            host.on_progress(spec.id, Progress::new(body.len() as u64, body.len() as u64, 0, 0));
            self.finished.push(FinishedTransfer::ok(spec.id));
        }
        Ok(0)
    }

    fn drain_finished(&mut self) -> Vec<FinishedTransfer> {
        std::mem::take(&mut self.finished)
    }

    fn transfer_info(&self, id: TransferId) -> TransferInfo {
        TransferInfo { status_code: 200, effective_url: self.urls.get(&id).cloned() }
    }
}
