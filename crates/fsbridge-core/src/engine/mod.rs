//! Download engine
//!
//! One tokio task per job, a registry that owns the job handles, and a
//! manager that validates requests and drives stop/shutdown.

mod download_task;
mod manager;
mod registry;

pub use manager::*;
