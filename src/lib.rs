#![forbid(unsafe_code)]

//! Session board: live registry of long-running CLI sessions.
//!
//! Wrappers register sessions through the control API, the resource
//! monitor samples their processes, and finished sessions are purged after
//! a retention window.

pub mod api;
pub mod board;
pub mod config;
pub mod errors;
pub mod models;
pub mod orchestrator;
pub mod store;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
