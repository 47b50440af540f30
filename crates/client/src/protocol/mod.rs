//! Value types shared by every layer of the client.
//!
//! - [`Headers`]: layered, case-insensitive header maps
//! - [`HttpMethod`]: the verb table
//! - [`Timeout`]: the throughput timeout used for transfers and waits
//! - [`Progress`]: byte counters reported by the engine
//! - error types for each layer

mod error;
mod headers;
mod method;
mod progress;
mod timeout;

pub use error::ChannelError;
pub use error::ClientError;
pub use error::EngineCode;
pub use error::EngineError;
pub use error::HeaderError;
pub use error::TransferError;

pub use headers::HeaderStatus;
pub use headers::Headers;

pub use method::HttpMethod;
pub use method::UnknownMethod;

pub use progress::Progress;
pub use timeout::Timeout;
