//! Process supervisor
//!
//! Tracks long-lived workers by name. A worker is either an external
//! command or an in-process task. Stopping is soft first (SIGTERM or a
//! cancelled token), then forced once the grace period runs out.

use thiserror::Error;

pub mod entrypoint;
pub mod supervisor;
mod worker;

pub use entrypoint::{CommandSpec, Entrypoint, TaskFn, TaskFuture};
pub use supervisor::ProcessSupervisor;
pub use worker::{RunState, WorkerStatus};

/// Supervisor errors
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("◆ COULD NOT START {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("◆ WORKER LOG UNAVAILABLE: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SupervisorError>;
