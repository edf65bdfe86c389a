//! Async runtime glue
//!
//! Drives a [`Session`](crate::session::Session) from a tokio task and
//! implements its timers with tokio.

mod driver;
mod scheduler;

pub use driver::{DriverCommand, DriverError, DriverHandle, SessionDriver};
pub use scheduler::TokioScheduler;
