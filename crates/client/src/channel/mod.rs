//! Channels: the bridge between a transfer engine and the reactor thread.
//!
//! A [`Channel`] owns one [`TransferEngine`]. The first submission (or an
//! explicit [`Channel::open`]) starts a dedicated reactor thread that drives
//! the engine; from then on every engine call happens on that thread, and
//! callers only talk to it through a command queue. The thread runs until the
//! last `Channel` handle is dropped.
//!
//! # Example
//!
//! ```no_run
//! use micro_client::{Channel, EngineErrorPolicy, Session};
//! # fn run<E: micro_client::engine::TransferEngine>(engine: E) {
//!
//! let channel = Channel::builder()
//!     .thread_name("fetcher")
//!     .engine_error_policy(EngineErrorPolicy::Log)
//!     .build(engine);
//! let session = Session::new(&channel);
//! # }
//! ```
//!
//! # Teardown
//!
//! Dropping the last handle stops the reactor: every transfer still in flight
//! is finalized as aborted, sockets are closed, and all sessions created on
//! the channel become detached.

mod reactor;
mod socket;

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::thread;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::engine::{TransferEngine, TransferId, TransferSpec};
use crate::protocol::ChannelError;
use crate::response::Response;
use crate::session::SessionInner;

use reactor::{Command, ReactorHandle};

static NEXT_CHANNEL_ID: AtomicU32 = AtomicU32::new(1);

type EngineFactory = Box<dyn Fn() -> Box<dyn TransferEngine> + Send + Sync>;

static DEFAULT_ENGINE: OnceCell<EngineFactory> = OnceCell::new();
static DEFAULT_CHANNEL: OnceCell<Channel> = OnceCell::new();

const DEFAULT_THREAD_NAME: &str = "micro-client-reactor";

/// What the reactor does when the engine reports a non-benign error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EngineErrorPolicy {
    /// Log and terminate the process with the engine's exit code.
    #[default]
    Exit,
    /// Log and fail only the affected transfer.
    Log,
}

#[derive(Debug, Clone)]
pub struct ChannelConfig {
    pub thread_name: String,
    pub engine_error_policy: EngineErrorPolicy,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { thread_name: DEFAULT_THREAD_NAME.to_owned(), engine_error_policy: EngineErrorPolicy::default() }
    }
}

#[derive(Debug, Default)]
pub struct ChannelBuilder {
    config: ChannelConfig,
}

impl ChannelBuilder {
    fn new() -> Self {
        Self::default()
    }

    /// Prefix of the reactor thread's name; the channel id is appended.
    #[must_use]
    pub fn thread_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.thread_name = name.into();
        self
    }

    #[must_use]
    pub fn engine_error_policy(mut self, policy: EngineErrorPolicy) -> Self {
        self.config.engine_error_policy = policy;
        self
    }

    pub fn build<E: TransferEngine>(self, engine: E) -> Channel {
        self.build_boxed(Box::new(engine))
    }

    pub fn build_boxed(self, engine: Box<dyn TransferEngine>) -> Channel {
        let id = NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed);
        debug!(channel_id = id, thread_name = %self.config.thread_name, "channel created");
        Channel {
            inner: Arc::new(ChannelInner {
                id,
                config: self.config,
                state: Mutex::new(ChannelState::Idle(engine)),
                sessions: Mutex::new(HashMap::new()),
            }),
        }
    }
}

enum ChannelState {
    /// Not opened yet; the engine waits to be moved onto the reactor thread.
    Idle(Box<dyn TransferEngine>),
    Running(ReactorHandle),
    Closed,
}

pub(crate) struct ChannelInner {
    id: u32,
    config: ChannelConfig,
    state: Mutex<ChannelState>,
    sessions: Mutex<HashMap<u32, Weak<SessionInner>>>,
}

/// A cheap-to-clone handle on a channel.
#[derive(Clone)]
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    pub fn new<E: TransferEngine>(engine: E) -> Self {
        Self::builder().build(engine)
    }

    pub fn builder() -> ChannelBuilder {
        ChannelBuilder::new()
    }

    /// Registers the engine factory behind [`Channel::get_default`]. Only the
    /// first registration in a process succeeds.
    pub fn set_default_engine<F>(factory: F) -> Result<(), ChannelError>
    where
        F: Fn() -> Box<dyn TransferEngine> + Send + Sync + 'static,
    {
        DEFAULT_ENGINE.set(Box::new(factory)).map_err(|_factory| ChannelError::DefaultAlreadySet)
    }

    /// The process-wide default channel, built on first use from the engine
    /// registered with [`Channel::set_default_engine`].
    pub fn get_default() -> Result<Channel, ChannelError> {
        DEFAULT_CHANNEL
            .get_or_try_init(|| {
                let factory = DEFAULT_ENGINE.get().ok_or(ChannelError::NoDefaultEngine)?;
                info!("creating default channel");
                Ok(Channel::builder().build_boxed(factory()))
            })
            .cloned()
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    /// Starts the reactor thread if it is not running yet.
    pub fn open(&self) -> Result<(), ChannelError> {
        let mut state = self.inner.state.lock();
        self.inner.ensure_running(&mut state)?;
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        matches!(*self.inner.state.lock(), ChannelState::Running(_))
    }

    /// Sessions created on this channel that are still alive.
    pub fn session_count(&self) -> usize {
        self.inner.sessions.lock().values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub(crate) fn from_inner(inner: Arc<ChannelInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<ChannelInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn attach(&self, session_id: u32, session: Weak<SessionInner>) {
        self.inner.sessions.lock().insert(session_id, session);
    }

    pub(crate) fn detach(&self, session_id: u32) {
        self.inner.sessions.lock().remove(&session_id);
    }

    /// Hands a transfer to the reactor, starting it if needed.
    pub(crate) fn submit(&self, spec: TransferSpec, response: Response) -> Result<(), ChannelError> {
        self.inner.send(Command::Submit { spec, response })
    }

    /// Asks the reactor to stop a transfer and finalize it as aborted. A
    /// closed channel has nothing left to abandon.
    pub(crate) fn abandon(&self, id: TransferId) {
        if let Err(e) = self.inner.send(Command::Abandon(id)) {
            debug!(channel_id = self.id(), transfer = %id, cause = %e, "abandon not delivered");
        }
    }
}

impl ChannelInner {
    fn ensure_running<'a>(&self, state: &'a mut ChannelState) -> Result<&'a ReactorHandle, ChannelError> {
        if let ChannelState::Idle(_) = state {
            let ChannelState::Idle(engine) = std::mem::replace(state, ChannelState::Closed) else {
                return Err(ChannelError::closed(self.id));
            };
            let handle = reactor::spawn(self.id, &self.config, engine)?;
            info!(channel_id = self.id, "channel opened");
            *state = ChannelState::Running(handle);
        }

        match state {
            ChannelState::Running(handle) => Ok(handle),
            ChannelState::Idle(_) | ChannelState::Closed => Err(ChannelError::closed(self.id)),
        }
    }

    fn send(&self, command: Command) -> Result<(), ChannelError> {
        let mut state = self.state.lock();
        let handle = self.ensure_running(&mut state)?;
        handle.commands.send(command).map_err(|_rejected| ChannelError::closed(self.id))
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        if let ChannelState::Running(handle) = std::mem::replace(self.state.get_mut(), ChannelState::Closed) {
            let ReactorHandle { commands, runner } = handle;
            if commands.send(Command::Shutdown).is_err() {
                debug!(channel_id = self.id, "reactor already stopped");
            }
            drop(commands);

            if let Some(runner) = runner {
                if runner.thread().id() == thread::current().id() {
                    debug!(channel_id = self.id, "channel dropped on its own reactor thread, not joining");
                } else if runner.join().is_err() {
                    error!(channel_id = self.id, "reactor thread panicked");
                }
            }
        }

        for session in self.sessions.get_mut().drain().filter_map(|(_, weak)| weak.upgrade()) {
            session.sever_channel();
        }
        info!(channel_id = self.id, "channel closed");
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("id", &self.inner.id)
            .field("config", &self.inner.config)
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
