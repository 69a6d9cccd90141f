//! # Squall Common
//!
//! Common types, errors, and utilities shared across all Squall crates.

pub mod config;
pub mod error;
pub mod metrics;
pub mod testing;
pub mod types;

pub use config::*;
pub use error::{Error, Result, SearchError};
pub use types::*;

/// Re-export commonly used external types
pub mod prelude {
    pub use super::config::*;
    pub use super::error::{Error, Result, SearchError};
    pub use super::types::*;
    pub use async_trait::async_trait;
    pub use bytes::Bytes;
    pub use tracing::{debug, error, info, instrument, trace, warn};
}
