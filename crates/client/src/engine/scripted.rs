//! A transfer engine that plays back canned behavior, for driving the channel
//! through its real socket and timer paths in tests.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::engine::{
    ActionTarget, EngineHost, FinishedTransfer, NativeSocket, SocketPurpose, TransferEngine, TransferId, TransferInfo, TransferSpec,
    WatchState,
};
use crate::protocol::{EngineCode, EngineError, Progress, TransferError};

/// What the engine does with one transfer.
#[derive(Debug, Clone)]
pub(crate) enum Script {
    /// Delivers the reply from the timer callback right after the add.
    Reply { status: u16, headers: Vec<&'static str>, chunks: Vec<&'static [u8]> },
    /// Opens an unconnected socket, which is permanently writable, watches it
    /// and asks the host to remove it after that many readiness events.
    SocketDrop { events_before_remove: usize, report_done_after: bool },
    /// Like `SocketDrop` without reporting done, but the engine still queues
    /// the transfer as finished on its next timer callback.
    SocketDropThenFinish { events_before_remove: usize },
    /// Watches the socket for writing, switches the watch to `to` from inside
    /// the first action, and reports done after that many events.
    SwitchWatch { to: WatchState, events_before_remove: usize },
    /// Never makes progress.
    Hang,
    Reject(EngineCode),
}

impl Script {
    pub(crate) fn ok(body: &'static [u8]) -> Self {
        Script::Reply { status: 200, headers: vec!["HTTP/1.1 200 OK", "Content-Type: text/plain"], chunks: vec![body] }
    }
}

/// Engine entry points in the order they were called.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Event {
    Added(TransferId),
    Removed(TransferId),
    Action(ActionTarget),
    Info(TransferId),
}

#[derive(Debug, Default)]
pub(crate) struct ScriptLog {
    pub(crate) events: Vec<Event>,
    pub(crate) specs: Vec<TransferSpec>,
    /// Readiness passed to each socket action, in order.
    pub(crate) readiness: Vec<WatchState>,
}

impl ScriptLog {
    pub(crate) fn socket_actions(&self) -> usize {
        self.events.iter().filter(|e| matches!(e, Event::Action(ActionTarget::Socket(_)))).count()
    }

    pub(crate) fn position(&self, event: &Event) -> Option<usize> {
        self.events.iter().position(|e| e == event)
    }

    pub(crate) fn count(&self, event: &Event) -> usize {
        self.events.iter().filter(|e| *e == event).count()
    }
}

enum Running {
    Reply { status: u16, headers: Vec<&'static str>, chunks: Vec<&'static [u8]> },
    Socket { fd: NativeSocket, events_left: usize, report_done_after: bool, finish_late: bool, switch_to: Option<WatchState> },
    Hang,
}

type Chooser = Box<dyn Fn(&TransferSpec) -> Script + Send>;

pub(crate) struct ScriptedEngine {
    choose: Chooser,
    log: Arc<Mutex<ScriptLog>>,
    running: HashMap<TransferId, Running>,
    statuses: HashMap<TransferId, (u16, String)>,
    finished: Vec<FinishedTransfer>,
    /// Transfers to report finished on the next timer callback.
    late: Vec<TransferId>,
}

impl ScriptedEngine {
    pub(crate) fn new<F>(choose: F) -> (Self, Arc<Mutex<ScriptLog>>)
    where
        F: Fn(&TransferSpec) -> Script + Send + 'static,
    {
        let log = Arc::new(Mutex::new(ScriptLog::default()));
        let engine = Self {
            choose: Box::new(choose),
            log: Arc::clone(&log),
            running: HashMap::new(),
            statuses: HashMap::new(),
            finished: Vec::new(),
            late: Vec::new(),
        };
        (engine, log)
    }

    /// Every transfer follows the same script.
    pub(crate) fn always(script: Script) -> (Self, Arc<Mutex<ScriptLog>>) {
        Self::new(move |_| script.clone())
    }

    /// Opens an unconnected socket, which is permanently writable, and
    /// watches it for writing.
    fn open_watched(host: &mut dyn EngineHost, id: TransferId) -> Result<NativeSocket, EngineError> {
        let address: SocketAddr = ([127, 0, 0, 1], 9).into();
        let fd = host
            .open_socket(SocketPurpose::Connection, address)
            .map_err(|e| EngineError::new(EngineCode::Internal, e))?;
        host.update_socket_watch(fd, id, WatchState::Writable);
        Ok(fd)
    }

    fn deliver(host: &mut dyn EngineHost, id: TransferId, headers: &[&str], chunks: &[&[u8]]) -> Result<(), TransferError> {
        for line in headers {
            host.on_receive_header(id, format!("{line}\r\n").as_bytes());
        }
        host.on_receive_header(id, b"\r\n");

        let total: usize = chunks.iter().map(|c| c.len()).sum();
        let mut received = 0;
        for chunk in chunks {
            if host.on_receive_body(id, chunk) < chunk.len() {
                return Err(TransferError::engine(23, "write error"));
            }
            received += chunk.len();
            let progress = Progress::new(total as u64, received as u64, 0, 0);
            if !host.on_progress(id, progress) {
                return Err(TransferError::engine(42, "aborted by callback"));
            }
        }
        Ok(())
    }
}

impl TransferEngine for ScriptedEngine {
    fn add_transfer(&mut self, host: &mut dyn EngineHost, spec: TransferSpec) -> Result<(), EngineError> {
        let id = spec.id;
        let script = (self.choose)(&spec);
        {
            let mut log = self.log.lock();
            log.events.push(Event::Added(id));
            log.specs.push(spec.clone());
        }

        let running = match script {
            Script::Reject(code) => return Err(EngineError::new(code, "add_transfer")),
            Script::Reply { status, headers, chunks } => {
                host.adjust_timer(0);
                Running::Reply { status, headers, chunks }
            }
            Script::SocketDrop { events_before_remove, report_done_after } => Running::Socket {
                fd: Self::open_watched(host, id)?,
                events_left: events_before_remove,
                report_done_after,
                finish_late: false,
                switch_to: None,
            },
            Script::SocketDropThenFinish { events_before_remove } => Running::Socket {
                fd: Self::open_watched(host, id)?,
                events_left: events_before_remove,
                report_done_after: false,
                finish_late: true,
                switch_to: None,
            },
            Script::SwitchWatch { to, events_before_remove } => Running::Socket {
                fd: Self::open_watched(host, id)?,
                events_left: events_before_remove,
                report_done_after: true,
                finish_late: false,
                switch_to: Some(to),
            },
            Script::Hang => Running::Hang,
        };
        self.statuses.insert(id, (0, spec.url));
        self.running.insert(id, running);
        Ok(())
    }

    fn remove_transfer(&mut self, host: &mut dyn EngineHost, id: TransferId) -> Result<(), EngineError> {
        self.log.lock().events.push(Event::Removed(id));
        if let Some(Running::Socket { fd, .. }) = self.running.remove(&id) {
            host.close_socket(fd);
        }
        Ok(())
    }

    fn socket_action(
        &mut self,
        host: &mut dyn EngineHost,
        target: ActionTarget,
        events: WatchState,
    ) -> Result<usize, EngineError> {
        self.log.lock().events.push(Event::Action(target));

        match target {
            ActionTarget::Timer => {
                let ready: Vec<TransferId> =
                    self.running.iter().filter(|(_, r)| matches!(r, Running::Reply { .. })).map(|(id, _)| *id).collect();
                for id in ready {
                    let Some(Running::Reply { status, headers, chunks }) = self.running.remove(&id) else {
                        continue;
                    };
                    let result = Self::deliver(host, id, &headers, &chunks);
                    if let Some(entry) = self.statuses.get_mut(&id) {
                        entry.0 = status;
                    }
                    self.finished.push(FinishedTransfer { id, result });
                }
                for id in std::mem::take(&mut self.late) {
                    self.finished.push(FinishedTransfer::ok(id));
                }
            }
            ActionTarget::Socket(socket) => {
                self.log.lock().readiness.push(events);
                let owner = self
                    .running
                    .iter()
                    .find_map(|(id, r)| matches!(r, Running::Socket { fd, .. } if *fd == socket).then_some(*id));
                let Some(id) = owner else {
                    return Err(EngineError::bad_socket("socket_action"));
                };
                let Some(Running::Socket { events_left, report_done_after, finish_late, switch_to, .. }) = self.running.get_mut(&id)
                else {
                    return Err(EngineError::bad_socket("socket_action"));
                };

                if let Some(next) = switch_to.take() {
                    host.update_socket_watch(socket, id, next);
                }
                *events_left = events_left.saturating_sub(1);
                if *events_left > 0 {
                    return Ok(self.running.len());
                }

                let (report_done_after, finish_late) = (*report_done_after, *finish_late);
                host.update_socket_watch(socket, id, WatchState::Remove);
                if report_done_after {
                    self.running.remove(&id);
                    host.close_socket(socket);
                    self.finished.push(FinishedTransfer::ok(id));
                }
                if finish_late {
                    self.late.push(id);
                    host.adjust_timer(0);
                }
            }
        }

        Ok(self.running.len())
    }

    fn drain_finished(&mut self) -> Vec<FinishedTransfer> {
        std::mem::take(&mut self.finished)
    }

    fn transfer_info(&self, id: TransferId) -> TransferInfo {
        self.log.lock().events.push(Event::Info(id));
        let (status_code, url) = self.statuses.get(&id).cloned().unwrap_or_default();
        TransferInfo { status_code, effective_url: Some(url) }
    }
}
