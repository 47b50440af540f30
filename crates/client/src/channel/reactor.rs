//! The reactor loop that drives a transfer engine.
//!
//! Each open channel runs one reactor on a dedicated thread with a
//! current-thread tokio runtime. The loop multiplexes three sources:
//!
//! - commands from caller threads (submit, abandon, shutdown)
//! - readiness events from the per-socket wait tasks
//! - the engine's single timer
//!
//! and turns each into exactly one engine entry point call followed by a
//! sweep of the engine's finished queue. The engine is only ever called from
//! this loop, never re-entered from inside one of its own callbacks.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};

use crate::channel::socket::{ReactorSocket, SocketEvent};
use crate::channel::{ChannelConfig, EngineErrorPolicy};
use crate::engine::{
    ActionTarget, EngineHost, NativeSocket, SocketPurpose, TransferEngine, TransferId, TransferInfo, TransferSpec, WatchState,
};
use crate::protocol::{ChannelError, EngineError, Progress, TransferError};
use crate::response::Response;

#[derive(Debug)]
pub(crate) enum Command {
    Submit { spec: TransferSpec, response: Response },
    Abandon(TransferId),
    Shutdown,
}

/// What a running channel keeps of its reactor.
#[derive(Debug)]
pub(crate) struct ReactorHandle {
    /// The keep-alive token: the loop runs until this is dropped or a
    /// shutdown command arrives.
    pub(crate) commands: UnboundedSender<Command>,
    pub(crate) runner: Option<thread::JoinHandle<()>>,
}

/// Starts the reactor thread for `engine`.
pub(crate) fn spawn(
    channel_id: u32,
    config: &ChannelConfig,
    engine: Box<dyn TransferEngine>,
) -> Result<ReactorHandle, ChannelError> {
    let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
    let (commands, receiver) = mpsc::unbounded_channel();
    let reactor = Reactor::new(channel_id, config.engine_error_policy, engine);

    let runner = thread::Builder::new().name(format!("{}-{channel_id}", config.thread_name)).spawn(move || {
        runtime.block_on(reactor.run(receiver));
    })?;

    Ok(ReactorHandle { commands, runner: Some(runner) })
}

/// The engine-facing half of the reactor. Kept apart from the engine itself
/// so the engine can be handed `&mut` access to it during every call.
struct HostState {
    channel_id: u32,
    sockets: HashMap<NativeSocket, ReactorSocket>,
    transfers: HashMap<TransferId, Response>,
    timer: Option<Instant>,
    /// Owners of sockets the engine asked to `Remove` since the last sweep.
    removed_owners: Vec<TransferId>,
    events: UnboundedSender<SocketEvent>,
}

impl HostState {
    fn owns_watched_socket(&self, owner: TransferId) -> bool {
        self.sockets.values().any(|socket| socket.owner == Some(owner) && socket.desired.implies_io())
    }
}

impl EngineHost for HostState {
    fn open_socket(&mut self, purpose: SocketPurpose, address: SocketAddr) -> io::Result<NativeSocket> {
        let socket = ReactorSocket::open(purpose, address)?;
        let fd = socket.raw_fd();
        trace!(channel_id = self.channel_id, socket = fd, ?purpose, %address, "socket opened");
        self.sockets.insert(fd, socket);
        Ok(fd)
    }

    fn close_socket(&mut self, socket: NativeSocket) {
        match self.sockets.remove(&socket) {
            Some(_) => trace!(channel_id = self.channel_id, socket, "socket closed"),
            None => trace!(channel_id = self.channel_id, socket, "close of unknown socket ignored"),
        }
    }

    fn update_socket_watch(&mut self, socket: NativeSocket, owner: TransferId, desired: WatchState) {
        let Some(entry) = self.sockets.get_mut(&socket) else {
            trace!(channel_id = self.channel_id, socket, ?desired, "watch request for unknown socket ignored");
            return;
        };

        trace!(channel_id = self.channel_id, socket, transfer = %owner, ?desired, "socket watch updated");
        entry.watch(owner, desired, &self.events);
        if desired == WatchState::Remove {
            self.removed_owners.push(owner);
        }
    }

    fn adjust_timer(&mut self, millis: i64) {
        self.timer = match u64::try_from(millis) {
            Ok(0) => Some(Instant::now()),
            Ok(millis) => Some(Instant::now() + Duration::from_millis(millis)),
            Err(_negative) => None,
        };
    }

    fn on_receive_body(&mut self, transfer: TransferId, bytes: &[u8]) -> usize {
        match self.transfers.get(&transfer) {
            Some(response) => response.receive_body(bytes),
            None => 0,
        }
    }

    fn on_receive_header(&mut self, transfer: TransferId, line: &[u8]) -> usize {
        match self.transfers.get(&transfer) {
            Some(response) => response.store_header(line),
            None => 0,
        }
    }

    fn on_progress(&mut self, transfer: TransferId, progress: Progress) -> bool {
        self.transfers.get(&transfer).is_none_or(|response| response.report_progress(progress))
    }
}

struct Reactor {
    engine: Box<dyn TransferEngine>,
    host: HostState,
    events: UnboundedReceiver<SocketEvent>,
    policy: EngineErrorPolicy,
}

impl Reactor {
    fn new(channel_id: u32, policy: EngineErrorPolicy, engine: Box<dyn TransferEngine>) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let host = HostState {
            channel_id,
            sockets: HashMap::new(),
            transfers: HashMap::new(),
            timer: None,
            removed_owners: Vec::new(),
            events: events_tx,
        };
        Self { engine, host, events, policy }
    }

    async fn run(mut self, mut commands: UnboundedReceiver<Command>) {
        info!(channel_id = self.host.channel_id, "reactor started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Submit { spec, response }) => self.submit(spec, response),
                    Some(Command::Abandon(id)) => self.abandon(id),
                    Some(Command::Shutdown) | None => break,
                },
                Some(event) = self.events.recv() => self.on_socket_event(event),
                () = sleep_until_deadline(self.host.timer) => self.on_timeout(),
            }
        }
        self.shutdown();
    }

    fn submit(&mut self, spec: TransferSpec, response: Response) {
        let id = spec.id;
        debug!(channel_id = self.host.channel_id, transfer = %id, method = %spec.method, url = %spec.url, "adding transfer");
        self.host.transfers.insert(id, response);

        let result = self.engine.add_transfer(&mut self.host, spec);
        if let Err(e) = result
            && !self.tolerate(&e)
            && let Some(response) = self.host.transfers.remove(&id)
        {
            response.finalize(Err(TransferError::rejected(&e)), TransferInfo::default());
        }
        self.check_finished();
    }

    fn abandon(&mut self, id: TransferId) {
        let Some(response) = self.host.transfers.remove(&id) else {
            trace!(channel_id = self.host.channel_id, transfer = %id, "abandon of unknown transfer ignored");
            return;
        };
        debug!(channel_id = self.host.channel_id, transfer = %id, "abandoning transfer");
        let result = self.engine.remove_transfer(&mut self.host, id);
        if let Err(e) = result {
            self.tolerate(&e);
        }
        response.finalize(Err(TransferError::Aborted), TransferInfo::default());
        self.check_finished();
    }

    fn on_socket_event(&mut self, event: SocketEvent) {
        let current = self.host.sockets.get(&event.socket).map(|socket| socket.serial);
        if current != Some(event.serial) {
            trace!(channel_id = self.host.channel_id, socket = event.socket, serial = event.serial, "stale socket event ignored");
            return;
        }

        trace!(channel_id = self.host.channel_id, socket = event.socket, ready = ?event.ready, "socket ready");
        let result = self.engine.socket_action(&mut self.host, ActionTarget::Socket(event.socket), event.ready);
        self.after_action(result);

        // the engine did not ask for anything new: keep watching as before
        if let Some(socket) = self.host.sockets.get_mut(&event.socket)
            && socket.serial == event.serial
            && socket.desired.implies_io()
        {
            socket.rearm(&self.host.events);
        }
        self.check_finished();
    }

    fn on_timeout(&mut self) {
        trace!(channel_id = self.host.channel_id, "engine timer fired");
        self.host.timer = None;
        let result = self.engine.socket_action(&mut self.host, ActionTarget::Timer, WatchState::None);
        self.after_action(result);
        self.check_finished();
    }

    fn after_action(&mut self, result: Result<usize, EngineError>) {
        match result {
            Ok(0) => self.host.timer = None,
            Ok(running) => trace!(channel_id = self.host.channel_id, running, "engine action done"),
            Err(e) => {
                self.tolerate(&e);
            }
        }
    }

    /// Finalizes everything the engine reported finished, then every transfer
    /// that lost its last watched socket without finishing.
    fn check_finished(&mut self) {
        for finished in self.engine.drain_finished() {
            let info = self.engine.transfer_info(finished.id);
            let Some(response) = self.host.transfers.remove(&finished.id) else {
                trace!(channel_id = self.host.channel_id, transfer = %finished.id, "finished transfer already gone");
                continue;
            };
            self.remove_from_engine(finished.id);
            debug!(
                channel_id = self.host.channel_id,
                transfer = %finished.id,
                status = info.status_code,
                ok = finished.result.is_ok(),
                "transfer finished"
            );
            response.finalize(finished.result, info);
        }

        for owner in std::mem::take(&mut self.host.removed_owners) {
            let premature = self.host.transfers.get(&owner).is_some_and(|response| !response.is_terminal())
                && !self.host.owns_watched_socket(owner);
            if !premature {
                continue;
            }
            let info = self.engine.transfer_info(owner);
            if let Some(response) = self.host.transfers.remove(&owner) {
                self.remove_from_engine(owner);
                debug!(channel_id = self.host.channel_id, transfer = %owner, "connection closed before transfer finished");
                response.finalize(Err(TransferError::PrematureClose), info);
            }
        }
    }

    fn remove_from_engine(&mut self, id: TransferId) {
        let result = self.engine.remove_transfer(&mut self.host, id);
        if let Err(e) = result {
            self.tolerate(&e);
        }
    }

    /// Applies the engine error policy. Returns true if the error is benign.
    fn tolerate(&self, e: &EngineError) -> bool {
        if e.is_benign() {
            warn!(channel_id = self.host.channel_id, cause = %e, "ignoring engine error");
            return true;
        }
        match self.policy {
            EngineErrorPolicy::Exit => {
                let exit_code = e.code.exit_code();
                error!(channel_id = self.host.channel_id, cause = %e, exit_code, "fatal transfer engine error");
                std::process::exit(exit_code);
            }
            EngineErrorPolicy::Log => {
                error!(channel_id = self.host.channel_id, cause = %e, "transfer engine error");
                false
            }
        }
    }

    fn shutdown(mut self) {
        let in_flight = std::mem::take(&mut self.host.transfers);
        info!(channel_id = self.host.channel_id, in_flight = in_flight.len(), "reactor stopping");

        for (id, response) in in_flight {
            if let Err(e) = self.engine.remove_transfer(&mut self.host, id) {
                debug!(channel_id = self.host.channel_id, transfer = %id, cause = %e, "engine error while shutting down");
            }
            response.finalize(Err(TransferError::ChannelClosed), TransferInfo::default());
        }
        self.host.sockets.clear();
        self.host.timer = None;
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
