//! An asynchronous micro HTTP client
//!
//! This crate lets callers issue requests without blocking: every submission
//! returns a reference-counted [`Response`] immediately, and the caller later
//! [`wait`](Response::wait)s on it with a deadline. The protocol work itself is
//! done by a pluggable, callback-driven [`TransferEngine`](engine::TransferEngine);
//! this crate bridges that engine onto a tokio reactor running on a dedicated
//! thread.
//!
//! # Architecture
//!
//! - [`Channel`]: owns one engine and the reactor thread that drives it
//! - [`Session`]: default headers, timeout and credentials on top of a channel
//! - [`Request`]: one outgoing request, built from a session
//! - [`Response`]: the shared handle on a transfer's outcome
//! - [`Headers`]: layered, case-insensitive header maps
//!
//! # Example
//!
//! ```no_run
//! use micro_client::{Channel, Session, Timeout};
//! # fn run<E: micro_client::engine::TransferEngine>(engine: E) {
//!
//! let channel = Channel::new(engine);
//! let session = Session::new(&channel);
//! session.default_headers().set("User-Agent", "micro-client");
//!
//! let response = session.get("http://example.com/").unwrap();
//! if response.wait(Timeout::STANDARD) {
//!     println!("status {}: {}", response.status_code(), response.text());
//! }
//! # }
//! ```
//!
//! For scripts and tools, register an engine once and use the one-shot calls:
//!
//! ```no_run
//! use micro_client::{Channel, Timeout};
//! # fn run<E: micro_client::engine::TransferEngine + Default>() {
//!
//! Channel::set_default_engine(|| Box::new(E::default())).unwrap();
//! let response = micro_client::get("http://example.com/").unwrap();
//! response.wait(Timeout::NEVER);
//! # }
//! ```
//!
//! # Threading
//!
//! All engine calls, and every [`ReceiveHandler`] callback, run on the
//! channel's reactor thread. Never block in a handler, and never wait on a
//! response from that thread.
//!
//! # Platform
//!
//! Sockets are handed to engines as raw file descriptors, so the crate
//! targets Unix-like systems.

mod channel;
pub mod codec;
pub mod engine;
pub mod handler;
pub mod protocol;
mod request;
pub mod response;
mod session;

mod utils;
pub(crate) use utils::ensure;

pub use channel::{Channel, ChannelBuilder, ChannelConfig, EngineErrorPolicy};
pub use handler::{ReceiveFn, ReceiveHandler, receive_fn};
pub use protocol::{
    ChannelError, ClientError, EngineCode, EngineError, HeaderError, HeaderStatus, Headers, HttpMethod, Progress, Timeout,
    TransferError,
};
pub use request::Request;
pub use response::{Response, TransferState};
pub use session::Session;

/// Sends a one-shot request on the default channel. The returned response
/// owns the throwaway session that sent it.
fn one_shot<U: Into<String>>(method: HttpMethod, url: U) -> Result<Response, ClientError> {
    let session = Session::with_default_channel()?;
    let response = session.request(method, url).send()?;
    response.own_session(session);
    Ok(response)
}

pub fn get<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Get, url)
}

pub fn put<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Put, url)
}

pub fn post<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Post, url)
}

pub fn head<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Head, url)
}

pub fn options<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Options, url)
}

pub fn delete<U: Into<String>>(url: U) -> Result<Response, ClientError> {
    one_shot(HttpMethod::Delete, url)
}
