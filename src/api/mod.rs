//! Server API client module

pub mod client;
pub mod error;
pub mod models;
pub mod sse;
pub mod transport;

pub use client::HttpClient;
pub use error::{ApiError, ChannelError};
pub use models::*;
pub use transport::{EventSource, FrameStream, MutationApi, ProgressFn};
