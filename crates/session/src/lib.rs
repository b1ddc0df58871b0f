//! Session and task management
//!
//! A session is the state of one persistent connection: its conversation
//! history and the task it is currently running, if any.

pub mod history;
pub mod manager;
pub mod runner;

pub use history::{History, DEFAULT_MAX_MESSAGES};
pub use manager::{SessionEnd, SessionManager, ACTIVE_SESSIONS_FIELD, SERVICE_EXCEPTION};
pub use runner::{TaskContext, TaskError, TaskOutcome, TaskRequest, TaskRunner};
