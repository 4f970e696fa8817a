pub mod backlog;
pub mod capability;
pub mod config;
pub mod error;
pub mod knowledge;
pub mod memory;
pub mod prompt;
pub mod session;
pub mod tags;
pub mod types;
pub mod workflow;

pub use error::{CoachError, Result};
