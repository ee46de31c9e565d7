//! Loghaul Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared infrastructure for the loghaul workspace members:
//!
//! - **Logging**: `tracing` subscriber setup driven by [`logging::LogConfig`]
//! - **Error Handling**: [`CommonError`] and its result alias

pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
