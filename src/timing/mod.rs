//! Fixed-period cycle timing and execution monitoring.

pub mod monitor;
pub mod scheduler;
