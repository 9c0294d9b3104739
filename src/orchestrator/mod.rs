//! Session orchestration modules.
//!
//! Covers the lifecycle policy shared by every writer, process table
//! access, the periodic resource monitor, and operator kill actions.

pub mod lifecycle;
pub mod monitor;
pub mod process;
pub mod session_manager;
