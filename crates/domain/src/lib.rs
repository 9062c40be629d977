//! Shared types for the I3 gateway: configuration schema, error taxonomy,
//! and structured trace events.
pub mod config;
pub mod error;
pub mod trace;

pub use config::Config;
pub use error::{Error, Result};
pub use trace::TraceEvent;
