//! Responses: the caller's handle on a transfer in flight.
//!
//! A [`Response`] is returned by [`Session::send`](crate::Session::send) before
//! any I/O happens. It is a reference-counted handle: the caller holds one
//! side and the channel's reactor holds the other while the transfer runs. The
//! reactor feeds received headers, body bytes and progress into the shared
//! state and finalizes it exactly once; callers block in [`Response::wait`]
//! until that happens or their deadline passes.
//!
//! ```no_run
//! use micro_client::{Session, Timeout};
//!
//! # fn run(session: &Session) -> Result<(), micro_client::ClientError> {
//! let response = session.get("http://example.com/")?;
//! if response.wait(Timeout::STANDARD) {
//!     println!("{} bytes, status {}", response.body().len(), response.status_code());
//! }
//! # Ok(())
//! # }
//! ```

mod body;

pub use body::BodyBuffer;
pub use body::MAX_BODY_SIZE;
pub use body::next_capacity;

use std::fmt;
use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::{Duration, Instant};

use bytes::Bytes;
use http::StatusCode;
use parking_lot::{Condvar, Mutex};
use tracing::trace;

use crate::codec::{decode_header_lines, strip_line_ending};
use crate::engine::{TransferId, TransferInfo};
use crate::handler::ReceiveHandler;
use crate::protocol::{Headers, Progress, Timeout, TransferError};
use crate::session::Session;

static NEXT_RESPONSE_ID: AtomicU32 = AtomicU32::new(1);

/// Lifecycle of the transfer behind a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferState {
    /// Created, not yet handed to the channel.
    Configuring,
    InFlight,
    Completed,
    Failed,
    Aborted,
}

impl TransferState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, TransferState::Completed | TransferState::Failed | TransferState::Aborted)
    }
}

#[derive(Debug)]
struct ResponseData {
    state: TransferState,
    status_code: u16,
    header_lines: Vec<String>,
    body: BodyBuffer,
    progress: Progress,
    error: Option<TransferError>,
    effective_url: Option<String>,
}

pub(crate) struct ResponseShared {
    id: u32,
    transfer_id: TransferId,
    session_id: u32,
    data: Mutex<ResponseData>,
    completed: Condvar,
    finalized: AtomicBool,
    handler: Option<Arc<dyn ReceiveHandler>>,
    /// Keeps a throwaway session alive for as long as its only response.
    owned_session: Mutex<Option<Session>>,
}

/// A shared handle on the outcome of one transfer.
#[derive(Clone)]
pub struct Response {
    shared: Arc<ResponseShared>,
}

impl Response {
    pub(crate) fn new(transfer_id: TransferId, session_id: u32, handler: Option<Arc<dyn ReceiveHandler>>) -> Self {
        let data = ResponseData {
            state: TransferState::Configuring,
            status_code: 0,
            header_lines: Vec::new(),
            body: BodyBuffer::new(),
            progress: Progress::default(),
            error: None,
            effective_url: None,
        };
        let shared = ResponseShared {
            id: NEXT_RESPONSE_ID.fetch_add(1, Ordering::Relaxed),
            transfer_id,
            session_id,
            data: Mutex::new(data),
            completed: Condvar::new(),
            finalized: AtomicBool::new(false),
            handler,
            owned_session: Mutex::new(None),
        };
        Self { shared: Arc::new(shared) }
    }

    pub fn id(&self) -> u32 {
        self.shared.id
    }

    pub fn transfer_id(&self) -> TransferId {
        self.shared.transfer_id
    }

    pub fn session_id(&self) -> u32 {
        self.shared.session_id
    }

    pub fn state(&self) -> TransferState {
        self.shared.data.lock().state
    }

    pub fn is_terminal(&self) -> bool {
        self.state().is_terminal()
    }

    /// Blocks until the transfer is terminal or `timeout`'s window elapses.
    /// [`Timeout::NEVER`] waits without a deadline. Returns whether the
    /// transfer is terminal; a missed deadline does not stop the transfer.
    ///
    /// Never call this on the channel's reactor thread (for example from a
    /// [`ReceiveHandler`]); the transfer cannot progress while it blocks.
    pub fn wait(&self, timeout: Timeout) -> bool {
        match timeout.duration() {
            Some(window) => self.wait_for(window),
            None => self.wait_until(None),
        }
    }

    pub fn wait_for(&self, window: Duration) -> bool {
        self.wait_until(Instant::now().checked_add(window))
    }

    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        let mut data = self.shared.data.lock();
        while !data.state.is_terminal() {
            match deadline {
                Some(deadline) => {
                    if self.shared.completed.wait_until(&mut data, deadline).timed_out() {
                        return data.state.is_terminal();
                    }
                }
                None => self.shared.completed.wait(&mut data),
            }
        }
        true
    }

    /// The status code the engine reported, or 0 before completion.
    pub fn status_code(&self) -> u16 {
        self.shared.data.lock().status_code
    }

    pub fn status(&self) -> Option<StatusCode> {
        StatusCode::from_u16(self.status_code()).ok()
    }

    /// Received header lines, line endings stripped, in arrival order.
    pub fn header_lines(&self) -> Vec<String> {
        self.shared.data.lock().header_lines.clone()
    }

    /// The received headers decoded into a layer of their own.
    pub fn headers(&self) -> Headers {
        decode_header_lines(self.shared.data.lock().header_lines.as_slice())
    }

    pub fn body(&self) -> Bytes {
        self.shared.data.lock().body.to_bytes()
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.shared.data.lock().body.as_bytes()).into_owned()
    }

    /// Whether body bytes were dropped because the stored body hit
    /// [`MAX_BODY_SIZE`].
    pub fn is_body_truncated(&self) -> bool {
        self.shared.data.lock().body.is_truncated()
    }

    pub fn progress(&self) -> Progress {
        self.shared.data.lock().progress
    }

    pub fn error(&self) -> Option<TransferError> {
        self.shared.data.lock().error.clone()
    }

    pub fn effective_url(&self) -> Option<String> {
        self.shared.data.lock().effective_url.clone()
    }

    pub(crate) fn downgrade(&self) -> Weak<ResponseShared> {
        Arc::downgrade(&self.shared)
    }

    pub(crate) fn from_shared(shared: Arc<ResponseShared>) -> Self {
        Self { shared }
    }

    pub(crate) fn own_session(&self, session: Session) {
        *self.shared.owned_session.lock() = Some(session);
    }

    /// Moves a freshly built response to [`TransferState::InFlight`]. Only
    /// the first call out of `Configuring` has any effect.
    pub(crate) fn mark_in_flight(&self) {
        let mut data = self.shared.data.lock();
        if data.state == TransferState::Configuring {
            data.state = TransferState::InFlight;
        }
    }

    /// Routes a body chunk to the handler if there is one, else stores it.
    pub(crate) fn receive_body(&self, bytes: &[u8]) -> usize {
        match &self.shared.handler {
            Some(handler) => handler.on_body(bytes),
            None => self.store_bytes(bytes),
        }
    }

    pub(crate) fn store_bytes(&self, bytes: &[u8]) -> usize {
        self.shared.data.lock().body.store(bytes)
    }

    /// Records one raw header line. Returns the full length of `line` so the
    /// engine sees it as consumed, including the blank end-of-headers line
    /// that is not kept.
    pub(crate) fn store_header(&self, line: &[u8]) -> usize {
        let stripped = strip_line_ending(line);
        if !stripped.is_empty() {
            let text = String::from_utf8_lossy(stripped).into_owned();
            self.shared.data.lock().header_lines.push(text);
        }
        line.len()
    }

    /// Records the latest counters and tells whether any of them changed.
    pub(crate) fn update_progress(&self, progress: Progress) -> bool {
        let mut data = self.shared.data.lock();
        if data.progress == progress {
            return false;
        }
        data.progress = progress;
        true
    }

    /// Asks the handler whether the transfer may continue.
    pub(crate) fn report_progress(&self, progress: Progress) -> bool {
        let changed = self.update_progress(progress);
        match &self.shared.handler {
            Some(handler) if changed => handler.on_progress(&progress),
            _ => true,
        }
    }

    /// Moves the response to its terminal state. Only the first call has any
    /// effect; it wakes every waiter and notifies the handler. Returns whether
    /// this call was the one that finalized.
    pub(crate) fn finalize(&self, outcome: Result<(), TransferError>, info: TransferInfo) -> bool {
        if self.shared.finalized.swap(true, Ordering::AcqRel) {
            trace!(response_id = self.id(), "response already finalized");
            return false;
        }

        let state = {
            let mut data = self.shared.data.lock();
            if info.status_code != 0 {
                data.status_code = info.status_code;
            }
            if info.effective_url.is_some() {
                data.effective_url = info.effective_url;
            }
            let state = match outcome {
                Ok(()) => TransferState::Completed,
                Err(error) => {
                    let state = match error {
                        TransferError::Aborted | TransferError::ChannelClosed => TransferState::Aborted,
                        _ => TransferState::Failed,
                    };
                    data.error = Some(error);
                    state
                }
            };
            data.state = state;
            state
        };

        trace!(response_id = self.id(), transfer = %self.transfer_id(), ?state, "response finalized");
        if let Some(handler) = &self.shared.handler {
            handler.on_complete(state);
        }
        self.shared.completed.notify_all();
        true
    }
}

impl fmt::Debug for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let data = self.shared.data.lock();
        f.debug_struct("Response")
            .field("id", &self.shared.id)
            .field("transfer_id", &self.shared.transfer_id)
            .field("state", &data.state)
            .field("status_code", &data.status_code)
            .field("body_len", &data.body.len())
            .finish_non_exhaustive()
    }
}
