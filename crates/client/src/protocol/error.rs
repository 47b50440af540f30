use std::io;
use thiserror::Error;

/// Top-level error returned by the caller-facing API.
///
/// Failures of an individual transfer never show up here; they are recorded in
/// the [`Response`](crate::Response) that owns the transfer.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("session {session_id} is detached from its channel")]
    Detached { session_id: u32 },

    #[error("invalid url {url:?}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("channel error: {source}")]
    Channel {
        #[from]
        source: ChannelError,
    },

    #[error("header error: {source}")]
    Header {
        #[from]
        source: HeaderError,
    },

    #[error("http error: {source}")]
    Http {
        #[from]
        source: http::Error,
    },
}

impl ClientError {
    pub fn detached(session_id: u32) -> Self {
        Self::Detached { session_id }
    }

    pub fn invalid_url<S: ToString, R: ToString>(url: S, reason: R) -> Self {
        Self::InvalidUrl { url: url.to_string(), reason: reason.to_string() }
    }
}

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel {channel_id} is closed")]
    Closed { channel_id: u32 },

    #[error("no default transfer engine has been registered")]
    NoDefaultEngine,

    #[error("a default transfer engine is already registered")]
    DefaultAlreadySet,

    #[error("failed to start reactor: {source}")]
    Runtime {
        #[from]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn closed(channel_id: u32) -> Self {
        Self::Closed { channel_id }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HeaderError {
    #[error("header defaults would form a cycle")]
    CyclicDefaults,

    #[error("invalid header name: {name:?}")]
    InvalidName { name: String },

    #[error("invalid value for header {name:?}")]
    InvalidValue { name: String },
}

impl HeaderError {
    pub fn invalid_name<S: ToString>(name: S) -> Self {
        Self::InvalidName { name: name.to_string() }
    }

    pub fn invalid_value<S: ToString>(name: S) -> Self {
        Self::InvalidValue { name: name.to_string() }
    }
}

/// Result codes a transfer engine reports from its core entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCode {
    /// The socket passed to the engine is already gone. Benign.
    BadSocket,
    BadHandle,
    BadTransfer,
    OutOfMemory,
    Internal,
    Unknown(i32),
}

impl EngineCode {
    /// Process exit status used when this code is treated as fatal.
    pub fn exit_code(self) -> i32 {
        match self {
            EngineCode::BadHandle => 1,
            EngineCode::BadTransfer => 2,
            EngineCode::OutOfMemory => 3,
            EngineCode::Internal => 4,
            EngineCode::BadSocket => 5,
            EngineCode::Unknown(code) if code > 0 => code,
            // never a success status
            EngineCode::Unknown(_) => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("transfer engine returned {code:?} in {context}")]
pub struct EngineError {
    pub code: EngineCode,
    pub context: String,
}

impl EngineError {
    pub fn new<S: ToString>(code: EngineCode, context: S) -> Self {
        Self { code, context: context.to_string() }
    }

    pub fn bad_socket<S: ToString>(context: S) -> Self {
        Self::new(EngineCode::BadSocket, context)
    }

    /// Whether this is the "socket already gone" code, which is never fatal.
    pub fn is_benign(&self) -> bool {
        self.code == EngineCode::BadSocket
    }
}

/// Why a transfer ended in a failed or aborted state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransferError {
    #[error("connection closed before the transfer finished")]
    PrematureClose,

    #[error("transfer aborted")]
    Aborted,

    #[error("channel closed while the transfer was in flight")]
    ChannelClosed,

    #[error("transfer engine rejected the transfer: {reason}")]
    Rejected { reason: String },

    #[error("transfer failed with engine code {code}: {message}")]
    Engine { code: i32, message: String },
}

impl TransferError {
    pub fn rejected<S: ToString>(reason: S) -> Self {
        Self::Rejected { reason: reason.to_string() }
    }

    pub fn engine<S: ToString>(code: i32, message: S) -> Self {
        Self::Engine { code, message: message.to_string() }
    }
}
