//! Outgoing requests.
//!
//! A [`Request`] is built from a [`Session`], configured with headers, a body
//! and optionally a [`ReceiveHandler`], then consumed by [`Request::send`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use bytes::Bytes;

use crate::handler::ReceiveHandler;
use crate::protocol::{ClientError, Headers, HttpMethod};
use crate::response::Response;
use crate::session::Session;

static NEXT_REQUEST_ID: AtomicU32 = AtomicU32::new(1);

pub struct Request {
    pub(crate) id: u32,
    pub(crate) method: HttpMethod,
    pub(crate) url: String,
    pub(crate) headers: Headers,
    pub(crate) body: Bytes,
    pub(crate) handler: Option<Arc<dyn ReceiveHandler>>,
    pub(crate) track_progress: bool,
    session: Session,
}

impl Request {
    pub fn new<U: Into<String>>(session: &Session, method: HttpMethod, url: U) -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            method,
            url: url.into(),
            headers: Headers::new(),
            body: Bytes::new(),
            handler: None,
            track_progress: true,
            session: session.clone(),
        }
    }

    /// Sets a request header. Request headers take precedence over the
    /// session's defaults.
    #[must_use]
    pub fn header<N: Into<String>, V: Into<String>>(self, name: N, value: V) -> Self {
        self.headers.set(name, value);
        self
    }

    /// The request's own header layer; changes apply until the request is sent.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    #[must_use]
    pub fn body<B: Into<Bytes>>(mut self, body: B) -> Self {
        self.body = body.into();
        self
    }

    /// Hands received body bytes to `handler` instead of storing them in the
    /// response.
    #[must_use]
    pub fn on_receive<H: ReceiveHandler + 'static>(mut self, handler: H) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Whether the engine should report progress for this transfer.
    #[must_use]
    pub fn track_progress(mut self, enabled: bool) -> Self {
        self.track_progress = enabled;
        self
    }

    pub fn send(self) -> Result<Response, ClientError> {
        let session = self.session.clone();
        session.send(self)
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("method", &self.method)
            .field("url", &self.url)
            .field("headers", &self.headers)
            .field("body_len", &self.body.len())
            .field("session_id", &self.session.id())
            .finish_non_exhaustive()
    }
}
