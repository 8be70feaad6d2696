//! Background Tasks Module
//!
//! # Tasks
//! - Maintenance executor: single worker thread for queued maintenance jobs
//! - Maintenance task: periodic tokio task sweeping expired cache entries,
//!   on a fixed interval or the manager's configured one

mod executor;
mod maintenance;

pub use executor::MaintenanceExecutor;
pub use maintenance::{spawn_configured_maintenance_task, spawn_maintenance_task};
