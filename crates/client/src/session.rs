//! Sessions: per-caller defaults on top of a shared channel.
//!
//! A [`Session`] carries default headers, a [`Timeout`] and optional
//! credentials, and turns [`Request`]s into transfers on its channel. It only
//! holds a weak reference to the channel: when the channel goes away first,
//! the session becomes *detached* and every later submission fails with
//! [`ClientError::Detached`].
//!
//! When the last handle to a session drops, the session abandons every
//! transfer nobody is waiting for any more and deregisters from its channel.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::channel::{Channel, ChannelInner};
use crate::engine::{Credentials, TransferId, TransferSpec};
use crate::ensure;
use crate::protocol::{ClientError, Headers, HttpMethod, Timeout};
use crate::request::Request;
use crate::response::{Response, ResponseShared};

static NEXT_SESSION_ID: AtomicU32 = AtomicU32::new(1);

pub(crate) struct SessionInner {
    id: u32,
    channel: RwLock<Option<Weak<ChannelInner>>>,
    defaults: RwLock<Headers>,
    timeout: RwLock<Timeout>,
    credentials: RwLock<Option<Credentials>>,
    /// Responses submitted through this session, by response id. Also
    /// serializes submission.
    responses: Mutex<HashMap<u32, Weak<ResponseShared>>>,
}

/// A cheap-to-clone handle on a session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(channel: &Channel) -> Self {
        let inner = Arc::new(SessionInner {
            id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
            channel: RwLock::new(Some(channel.downgrade())),
            defaults: RwLock::new(Headers::new()),
            timeout: RwLock::new(Timeout::default()),
            credentials: RwLock::new(None),
            responses: Mutex::new(HashMap::new()),
        });
        channel.attach(inner.id, Arc::downgrade(&inner));
        debug!(session_id = inner.id, channel_id = channel.id(), "session attached");
        Self { inner }
    }

    /// A session on the process-wide default channel.
    pub fn with_default_channel() -> Result<Self, ClientError> {
        let channel = Channel::get_default()?;
        Ok(Self::new(&channel))
    }

    pub fn id(&self) -> u32 {
        self.inner.id
    }

    /// The channel this session submits to, unless it has gone away.
    pub fn channel(&self) -> Option<Channel> {
        self.inner.channel().map(Channel::from_inner)
    }

    pub fn is_detached(&self) -> bool {
        self.inner.channel().is_none()
    }

    pub fn default_headers(&self) -> Headers {
        self.inner.defaults.read().clone()
    }

    /// Replaces the default header layer. The layer is shared, not copied:
    /// later changes to `headers` apply to later requests.
    pub fn set_default_headers(&self, headers: Headers) {
        *self.inner.defaults.write() = headers;
    }

    pub fn timeout(&self) -> Timeout {
        *self.inner.timeout.read()
    }

    pub fn set_timeout(&self, timeout: Timeout) {
        *self.inner.timeout.write() = timeout;
    }

    pub fn set_credentials<U: Into<String>, P: Into<String>>(&self, user: U, password: P) {
        *self.inner.credentials.write() = Some(Credentials::new(user, password));
    }

    pub fn clear_credentials(&self) {
        *self.inner.credentials.write() = None;
    }

    pub fn user(&self) -> Option<String> {
        self.inner.credentials.read().as_ref().map(|c| c.user.clone())
    }

    /// Number of submitted responses that are still alive somewhere.
    pub fn response_count(&self) -> usize {
        self.inner.responses.lock().values().filter(|weak| weak.strong_count() > 0).count()
    }

    pub fn request<U: Into<String>>(&self, method: HttpMethod, url: U) -> Request {
        Request::new(self, method, url)
    }

    pub fn get<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Get, url).send()
    }

    pub fn put<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Put, url).send()
    }

    pub fn post<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Post, url).send()
    }

    pub fn head<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Head, url).send()
    }

    pub fn options<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Options, url).send()
    }

    pub fn delete<U: Into<String>>(&self, url: U) -> Result<Response, ClientError> {
        self.request(HttpMethod::Delete, url).send()
    }

    /// Submits `request` and returns its response without waiting for any I/O.
    ///
    /// The transfer carries the session's default headers with the request's
    /// own headers layered on top, the session timeout and credentials.
    /// Transfer failures are reported through the response, never here.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidUrl`] if the url is empty or unparsable
    /// - [`ClientError::Header`] if a header name or value is not valid
    /// - [`ClientError::Detached`] if the channel has gone away
    /// - [`ClientError::Channel`] if the channel could not start its reactor
    pub fn send(&self, request: Request) -> Result<Response, ClientError> {
        let Request { method, url, headers: request_headers, body, handler, track_progress, .. } = request;

        ensure!(!url.is_empty(), ClientError::invalid_url(&url, "empty url"));
        url.parse::<http::Uri>().map_err(|e| ClientError::invalid_url(&url, e))?;

        let headers = Headers::new();
        headers.get_defaults_from(&self.default_headers())?;
        for (name, value) in request_headers.flatten() {
            headers.set(name, value);
        }
        headers.to_header_map()?;

        let channel = self.channel().ok_or_else(|| ClientError::detached(self.id()))?;

        let transfer_id = TransferId::next();
        let response = Response::new(transfer_id, self.id(), handler);
        let spec = TransferSpec {
            id: transfer_id,
            method,
            url,
            headers,
            body,
            timeout: self.timeout(),
            credentials: self.inner.credentials.read().clone(),
            wants_progress: track_progress,
        };

        let mut responses = self.inner.responses.lock();
        responses.retain(|_, weak| weak.strong_count() > 0);

        response.mark_in_flight();
        channel.submit(spec, response.clone())?;
        responses.insert(response.id(), response.downgrade());
        trace!(session_id = self.id(), response_id = response.id(), transfer = %transfer_id, "request submitted");

        Ok(response)
    }
}

impl SessionInner {
    fn channel(&self) -> Option<Arc<ChannelInner>> {
        self.channel.read().as_ref().and_then(Weak::upgrade)
    }

    /// Drops the back-reference; called by a channel that is going away.
    pub(crate) fn sever_channel(&self) {
        if self.channel.write().take().is_some() {
            debug!(session_id = self.id, "session detached from its channel");
        }
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let responses = std::mem::take(self.responses.get_mut());
        let Some(channel) = self.channel().map(Channel::from_inner) else {
            return;
        };

        for weak in responses.into_values() {
            // the reactor's reference is the only one left
            if weak.strong_count() != 1 {
                continue;
            }
            if let Some(response) = weak.upgrade().map(Response::from_shared)
                && !response.is_terminal()
            {
                trace!(session_id = self.id, transfer = %response.transfer_id(), "abandoning orphaned transfer");
                channel.abandon(response.transfer_id());
            }
        }

        channel.detach(self.id);
        debug!(session_id = self.id, channel_id = channel.id(), "session dropped");
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("detached", &self.is_detached())
            .field("timeout", &self.timeout())
            .field("default_headers", &self.default_headers())
            .finish_non_exhaustive()
    }
}
