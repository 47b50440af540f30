//! Sockets the reactor watches on behalf of the engine.
//!
//! tokio registers file descriptors edge-triggered, while transfer engines
//! expect level-triggered readiness: a socket that is still readable after the
//! engine's action must be reported again. Each wait therefore confirms
//! readiness with a zero-timeout `poll(2)` before reporting it, and clears
//! tokio's cached readiness only when the probe says the socket is idle.

use std::io;
use std::net::SocketAddr;
use std::os::fd::{AsRawFd, FromRawFd, IntoRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::Interest;
use tokio::io::unix::AsyncFd;
use tokio::net::TcpSocket;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use crate::engine::{NativeSocket, SocketPurpose, TransferId, WatchState};

const LISTEN_BACKLOG: u32 = 1024;

/// Watch serials are unique across all sockets, so an event queued for a
/// closed socket cannot match a later socket that reuses its descriptor.
static NEXT_WATCH_SERIAL: AtomicU64 = AtomicU64::new(1);

/// Readiness reported by a wait task.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SocketEvent {
    pub(crate) socket: NativeSocket,
    /// The watch serial the wait was armed under.
    pub(crate) serial: u64,
    pub(crate) ready: WatchState,
}

/// A registered socket and its current watch.
#[derive(Debug)]
pub(crate) struct ReactorSocket {
    fd: Arc<AsyncFd<OwnedFd>>,
    pub(crate) owner: Option<TransferId>,
    pub(crate) desired: WatchState,
    /// Replaced every time a wait is armed or cancelled; events carrying any
    /// other serial are stale.
    pub(crate) serial: u64,
    wait: Option<JoinHandle<()>>,
}

impl ReactorSocket {
    /// Creates a socket for `address`'s family and registers it with the
    /// current runtime. Must be called on the reactor thread.
    pub(crate) fn open(purpose: SocketPurpose, address: SocketAddr) -> io::Result<Self> {
        let socket = if address.is_ipv4() { TcpSocket::new_v4()? } else { TcpSocket::new_v6()? };
        let fd = match purpose {
            SocketPurpose::Connection => {
                let raw = socket.into_raw_fd();
                // SAFETY: `raw` was just released by the `TcpSocket` that created it and has no other owner.
                unsafe { OwnedFd::from_raw_fd(raw) }
            }
            SocketPurpose::Accept => {
                socket.set_reuseaddr(true)?;
                socket.bind(address)?;
                OwnedFd::from(socket.listen(LISTEN_BACKLOG)?.into_std()?)
            }
        };

        let fd = AsyncFd::with_interest(fd, Interest::READABLE.add(Interest::WRITABLE))?;
        Ok(Self { fd: Arc::new(fd), owner: None, desired: WatchState::None, serial: 0, wait: None })
    }

    pub(crate) fn raw_fd(&self) -> NativeSocket {
        self.fd.as_raw_fd()
    }

    /// Records a new watch request and arms a wait for it.
    pub(crate) fn watch(&mut self, owner: TransferId, desired: WatchState, events: &UnboundedSender<SocketEvent>) {
        self.owner = Some(owner);
        self.desired = desired;
        self.rearm(events);
    }

    /// Invalidates any outstanding wait and, if the current watch implies I/O,
    /// arms exactly one new one.
    pub(crate) fn rearm(&mut self, events: &UnboundedSender<SocketEvent>) {
        self.serial = NEXT_WATCH_SERIAL.fetch_add(1, Ordering::Relaxed);
        self.cancel_wait();
        if let Some(interest) = self.desired.interest() {
            let wait = spawn_wait(Arc::clone(&self.fd), self.serial, self.desired, interest, events.clone());
            self.wait = Some(wait);
        }
    }

    fn cancel_wait(&mut self) {
        if let Some(wait) = self.wait.take() {
            wait.abort();
        }
    }
}

impl Drop for ReactorSocket {
    fn drop(&mut self) {
        self.cancel_wait();
    }
}

fn spawn_wait(
    fd: Arc<AsyncFd<OwnedFd>>,
    serial: u64,
    desired: WatchState,
    interest: Interest,
    events: UnboundedSender<SocketEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let socket = fd.as_raw_fd();
        loop {
            let mut guard = match fd.ready(interest).await {
                Ok(guard) => guard,
                Err(e) => {
                    // let the engine find the error on its own read or write
                    warn!(socket, cause = %e, "socket readiness wait failed");
                    report(&events, SocketEvent { socket, serial, ready: desired });
                    return;
                }
            };

            let ready = probe(socket, desired);
            if ready != WatchState::None {
                report(&events, SocketEvent { socket, serial, ready });
                return;
            }
            guard.clear_ready();
        }
    })
}

fn report(events: &UnboundedSender<SocketEvent>, event: SocketEvent) {
    if events.send(event).is_err() {
        trace!(socket = event.socket, "reactor gone, dropping socket event");
    }
}

/// Asks the kernel which of the `desired` directions `socket` is ready for
/// right now. Hang-ups and errors count as ready in both directions.
pub(crate) fn probe(socket: RawFd, desired: WatchState) -> WatchState {
    let mut pollfd = libc::pollfd { fd: socket, events: libc::POLLIN | libc::POLLOUT, revents: 0 };
    // SAFETY: `pollfd` is a single initialized entry that lives across the call, matching `nfds == 1`.
    let rc = unsafe { libc::poll(&mut pollfd, 1, 0) };
    if rc <= 0 {
        return WatchState::None;
    }

    let revents = pollfd.revents;
    let readable = desired.wants_read() && revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
    let writable = desired.wants_write() && revents & (libc::POLLOUT | libc::POLLHUP | libc::POLLERR) != 0;
    WatchState::from_readiness(readable, writable)
}
