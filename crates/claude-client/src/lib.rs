//! `claude-client`: streaming client for the Anthropic Messages API.
//!
//! ```text
//! ClaudeClient::stream(system, messages)
//!     │   POST /v1/messages, stream: true
//!     ▼
//! background task  ← reads server-sent events, forwards text deltas
//!     │
//!     ▼
//! TextStream       ← futures::Stream<Item = Result<String>> over an mpsc channel
//! ```
//!
//! The [`Completion`] trait is the seam the server depends on, so tests can
//! substitute scripted streams for the network.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{collect, ClaudeClient, Completion};
pub use error::ClaudeError;
pub use stream::TextStream;
pub use types::{ChatMessage, Role, StreamEvent};

/// Convenience `Result` alias for this crate.
pub type Result<T> = std::result::Result<T, ClaudeError>;
