//! Agent core
//!
//! Tool discovery and execution, parallel fan-out of tool calls, and the
//! agent loop that runs a task against a model provider.

use thiserror::Error;

pub mod batch;
pub mod context;
pub mod executor;
pub mod loop_agent;
pub mod result;
pub mod tools;

pub use batch::{BatchError, BatchItemError, ParallelBatch};
pub use context::{ToolCallContext, BUS_EXTENSION};
pub use executor::{ErrorClass, ToolExecutor};
pub use loop_agent::AgentLoop;
pub use result::ToolResult;
pub use tools::{
    RegistryError, ToolCatalog, ToolDefinition, ToolDescriptor, ToolEnv, ToolNamespace,
    ToolRegistry, ToolStatus, ToolTrait, BUILTIN_NAMESPACES,
};

/// Agent loop errors
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("◆ PROVIDER ERROR: {0}")]
    Provider(String),

    #[error("◆ MAX ITERATIONS EXCEEDED")]
    MaxIterations,

    #[error("◆ TASK CANCELLED")]
    Cancelled,

    #[error("◆ BATCH FAILED: {0}")]
    Batch(#[from] BatchError),
}

pub type Result<T> = std::result::Result<T, AgentError>;
