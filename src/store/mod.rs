//! Session registry and its retention sweep.

pub mod retention;
pub mod session_store;

pub use session_store::{Applied, MonitorTarget, SessionStore, StoreStats};
