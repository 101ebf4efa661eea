//! Timing-aware supervisory controller for a cyber-physical control loop.
//!
//! One cycle: read the (possibly attacked) measurement, compare it with the
//! expected plant value, update the operating mode, pick an actuation
//! command for that mode, then wait for the next period and record timing.

pub mod config;
pub mod error;
pub mod plant;
pub mod runner;
pub mod supervisor;
pub mod timing;
pub mod utils;
