//! The contract between the channel and a transfer engine.
//!
//! A transfer engine does the actual protocol work (connecting, TLS, framing,
//! redirects). It never blocks and never owns an event loop: instead it tells
//! its [`EngineHost`] which sockets to watch and when it wants a timer
//! callback, and the host calls [`TransferEngine::socket_action`] whenever one
//! of those fires. The channel's reactor thread is the only host; every call
//! in either direction happens on that thread.
//!
//! # Lifecycle of a transfer
//!
//! 1. The channel hands the engine a [`TransferSpec`] via `add_transfer`.
//! 2. The engine opens sockets through the host, requests watch states and
//!    schedules timers.
//! 3. Received data flows back through `on_receive_header`, `on_receive_body`
//!    and `on_progress`, addressed by [`TransferId`].
//! 4. When done, the engine queues a [`FinishedTransfer`]; the channel drains
//!    the queue after every action, reads [`TransferInfo`] and removes the
//!    transfer.

#[cfg(test)]
pub(crate) mod scripted;

use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;
use bytes::BytesMut;
use tokio::io::Interest;
use tokio_util::codec::Encoder;

use crate::codec::HeaderEncoder;
use crate::protocol::{ClientError, EngineError, Headers, HttpMethod, Progress, Timeout, TransferError};

/// The operating system's socket handle.
pub type NativeSocket = RawFd;

static NEXT_TRANSFER_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one transfer between the channel and the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferId(u64);

impl TransferId {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub(crate) fn next() -> Self {
        Self(NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketPurpose {
    /// An outbound connection; the engine connects it.
    Connection,
    /// A listening socket, bound and listening when returned.
    Accept,
}

/// What the engine wants the host to watch a socket for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WatchState {
    /// Keep the socket registered but do not report readiness.
    #[default]
    None,
    Readable,
    Writable,
    ReadWrite,
    /// Stop watching; the engine is done with the socket for this transfer.
    Remove,
}

impl WatchState {
    pub const fn implies_io(self) -> bool {
        matches!(self, WatchState::Readable | WatchState::Writable | WatchState::ReadWrite)
    }

    pub const fn wants_read(self) -> bool {
        matches!(self, WatchState::Readable | WatchState::ReadWrite)
    }

    pub const fn wants_write(self) -> bool {
        matches!(self, WatchState::Writable | WatchState::ReadWrite)
    }

    /// Builds the readiness state reported back to the engine.
    pub const fn from_readiness(readable: bool, writable: bool) -> Self {
        match (readable, writable) {
            (true, true) => WatchState::ReadWrite,
            (true, false) => WatchState::Readable,
            (false, true) => WatchState::Writable,
            (false, false) => WatchState::None,
        }
    }

    /// The reactor interest for this state, if it implies any I/O.
    pub const fn interest(self) -> Option<Interest> {
        match self {
            WatchState::Readable => Some(Interest::READABLE),
            WatchState::Writable => Some(Interest::WRITABLE),
            WatchState::ReadWrite => Some(Interest::READABLE.add(Interest::WRITABLE)),
            WatchState::None | WatchState::Remove => None,
        }
    }
}

/// What a call to [`TransferEngine::socket_action`] is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionTarget {
    Socket(NativeSocket),
    Timer,
}

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new<U: Into<String>, P: Into<String>>(user: U, password: P) -> Self {
        Self { user: user.into(), password: password.into() }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").field("user", &self.user).field("password", &"<redacted>").finish()
    }
}

/// Everything the engine needs to perform one transfer.
#[derive(Debug, Clone)]
pub struct TransferSpec {
    pub id: TransferId,
    pub method: HttpMethod,
    pub url: String,
    /// The session defaults layered under the request's own headers.
    pub headers: Headers,
    pub body: Bytes,
    /// Abort the transfer when throughput stays below this rule.
    pub timeout: Timeout,
    pub credentials: Option<Credentials>,
    pub wants_progress: bool,
}

impl TransferSpec {
    /// The flattened headers as `Name: value\r\n` lines.
    pub fn encode_headers(&self) -> io::Result<Bytes> {
        let mut buf = BytesMut::new();
        HeaderEncoder.encode(&self.headers, &mut buf)?;
        Ok(buf.freeze())
    }

    /// The transfer as an [`http::Request`], for engines built on the `http` types.
    pub fn to_http(&self) -> Result<http::Request<Bytes>, ClientError> {
        let method = http::Method::try_from(self.method).map_err(http::Error::from)?;
        let mut builder = http::Request::builder().method(method).uri(self.url.as_str());
        if let Some(headers) = builder.headers_mut() {
            *headers = self.headers.to_header_map()?;
        }
        Ok(builder.body(self.body.clone())?)
    }
}

/// A transfer the engine has finished with, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedTransfer {
    pub id: TransferId,
    pub result: Result<(), TransferError>,
}

impl FinishedTransfer {
    pub fn ok(id: TransferId) -> Self {
        Self { id, result: Ok(()) }
    }

    pub fn failed(id: TransferId, error: TransferError) -> Self {
        Self { id, result: Err(error) }
    }
}

/// Facts about a transfer the engine knows once it is done.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferInfo {
    pub status_code: u16,
    pub effective_url: Option<String>,
}

/// Services the channel provides to its engine.
///
/// All methods are called on the reactor thread, from inside one of the
/// [`TransferEngine`] entry points.
pub trait EngineHost {
    /// Creates a non-blocking socket for `address`'s family and registers it
    /// with the reactor. The host owns the socket until `close_socket`.
    fn open_socket(&mut self, purpose: SocketPurpose, address: SocketAddr) -> io::Result<NativeSocket>;

    fn close_socket(&mut self, socket: NativeSocket);

    /// Sets what `socket` is watched for on behalf of `owner`. Requests for
    /// sockets the host does not know are ignored.
    fn update_socket_watch(&mut self, socket: NativeSocket, owner: TransferId, desired: WatchState);

    /// Schedules the single engine timer: negative cancels it, zero fires on
    /// the next loop turn, positive fires after that many milliseconds.
    fn adjust_timer(&mut self, millis: i64);

    /// Returns how many bytes were consumed; fewer than given asks the engine
    /// to fail the transfer.
    fn on_receive_body(&mut self, transfer: TransferId, bytes: &[u8]) -> usize;

    /// Receives one raw header line, line ending included.
    fn on_receive_header(&mut self, transfer: TransferId, line: &[u8]) -> usize;

    /// Returns false if the transfer should be aborted.
    fn on_progress(&mut self, transfer: TransferId, progress: Progress) -> bool;
}

/// A non-blocking, callback-driven transfer engine.
pub trait TransferEngine: Send + 'static {
    fn add_transfer(&mut self, host: &mut dyn EngineHost, spec: TransferSpec) -> Result<(), EngineError>;

    fn remove_transfer(&mut self, host: &mut dyn EngineHost, id: TransferId) -> Result<(), EngineError>;

    /// Drives the engine after `target` fired with readiness `events`
    /// (`WatchState::None` for the timer). Returns the number of transfers
    /// still running.
    fn socket_action(&mut self, host: &mut dyn EngineHost, target: ActionTarget, events: WatchState) -> Result<usize, EngineError>;

    fn drain_finished(&mut self) -> Vec<FinishedTransfer>;

    fn transfer_info(&self, id: TransferId) -> TransferInfo;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watch_states() {
        assert!(WatchState::Readable.implies_io());
        assert!(WatchState::ReadWrite.implies_io());
        assert!(!WatchState::None.implies_io());
        assert!(!WatchState::Remove.implies_io());
        assert_eq!(WatchState::Remove.interest(), None);
        assert_eq!(WatchState::from_readiness(true, false), WatchState::Readable);
        assert_eq!(WatchState::from_readiness(false, false), WatchState::None);
        assert!(WatchState::ReadWrite.interest().unwrap().is_writable());
    }

    #[test]
    fn spec_conversions() {
        let headers = Headers::new();
        headers.set("Accept", "*/*");
        let spec = TransferSpec {
            id: TransferId::new(7),
            method: HttpMethod::Post,
            url: "http://example.com/upload".to_owned(),
            headers,
            body: Bytes::from_static(b"payload"),
            timeout: Timeout::STANDARD,
            credentials: Some(Credentials::new("user", "secret")),
            wants_progress: true,
        };

        assert_eq!(&spec.encode_headers().unwrap()[..], b"Accept: */*\r\n");

        let request = spec.to_http().unwrap();
        assert_eq!(request.method(), http::Method::POST);
        assert_eq!(request.uri(), "http://example.com/upload");
        assert_eq!(request.headers()["accept"], "*/*");
        assert_eq!(request.body(), &Bytes::from_static(b"payload"));

        assert!(!format!("{spec:?}").contains("secret"));
    }
}
