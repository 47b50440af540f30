//! Hooks for taking over what a response does with received data.
//!
//! By default a [`Response`](crate::Response) stores the body in its own capped
//! buffer. A request configured with a [`ReceiveHandler`] hands every body
//! chunk to the handler instead, and also reports progress and completion to
//! it. Handlers run on the channel's reactor thread: they must not block, and
//! must never wait on a response of the same channel.

use std::fmt;

use crate::protocol::Progress;
use crate::response::TransferState;

#[cfg_attr(test, mockall::automock)]
pub trait ReceiveHandler: Send + Sync {
    /// Consumes a body chunk, returning how many bytes were taken. Returning
    /// fewer than `bytes.len()` makes the engine fail the transfer.
    fn on_body(&self, bytes: &[u8]) -> usize;

    /// Returns false to abort the transfer.
    fn on_progress(&self, _progress: &Progress) -> bool {
        true
    }

    /// Called exactly once, when the response reaches its terminal state.
    fn on_complete(&self, _state: TransferState) {}
}

/// A [`ReceiveHandler`] built from a body closure.
pub struct ReceiveFn<F> {
    f: F,
}

impl<F> ReceiveHandler for ReceiveFn<F>
where
    F: Fn(&[u8]) -> usize + Send + Sync,
{
    fn on_body(&self, bytes: &[u8]) -> usize {
        (self.f)(bytes)
    }
}

impl<F> fmt::Debug for ReceiveFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiveFn").finish_non_exhaustive()
    }
}

pub fn receive_fn<F>(f: F) -> ReceiveFn<F>
where
    F: Fn(&[u8]) -> usize + Send + Sync,
{
    ReceiveFn { f }
}
