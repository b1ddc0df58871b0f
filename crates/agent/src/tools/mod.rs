//! Tool registry and instance cache
//!
//! Tool modules add their definitions to a [`ToolCatalog`] from a plain
//! `register` function; [`BUILTIN_NAMESPACES`] lists those functions.
//! Discovery walks the table once at startup. Instances are built on first
//! use and cached by name for the registry's lifetime.

pub mod basic;
pub mod filesystem;
pub mod schema;
pub mod shell;
pub mod workspace;

pub use basic::{EchoTool, SleepTool};
pub use filesystem::WriteFileTool;
pub use schema::{check_schema, validate_arguments, ValidationError};
pub use shell::ExecTool;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use warden_config::ToolkitConfig;
use warden_provider::ToolSignature;

use crate::context::ToolCallContext;

/// Error a tool body may return
pub type ToolError = Box<dyn std::error::Error + Send + Sync>;

/// A callable tool
#[async_trait]
pub trait ToolTrait: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters(&self) -> Value;
    async fn execute(&self, ctx: &ToolCallContext, args: Value) -> Result<String, ToolError>;
}

/// Settings tool constructors may read
#[derive(Debug, Clone)]
pub struct ToolEnv {
    pub workspace: PathBuf,
    pub exec_timeout: Duration,
}

impl Default for ToolEnv {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            exec_timeout: Duration::from_secs(60),
        }
    }
}

impl ToolEnv {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
            ..Default::default()
        }
    }

    pub fn with_exec_timeout(mut self, timeout: Duration) -> Self {
        self.exec_timeout = timeout;
        self
    }
}

pub type Constructor = Arc<dyn Fn(&ToolEnv) -> Result<Arc<dyn ToolTrait>, ToolError> + Send + Sync>;

/// What a tool module registers: its call signature and how to build it
#[derive(Clone)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub parameters: Value,
    pub constructor: Constructor,
}

impl ToolDefinition {
    pub fn new<F>(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: Value,
        constructor: F,
    ) -> Self
    where
        F: Fn(&ToolEnv) -> Result<Arc<dyn ToolTrait>, ToolError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
            constructor: Arc::new(constructor),
        }
    }

    /// Definition for an already built instance
    pub fn from_tool(tool: Arc<dyn ToolTrait>) -> Self {
        Self {
            name: tool.name().to_string(),
            description: tool.description().to_string(),
            parameters: tool.parameters(),
            constructor: Arc::new(move |_| Ok(tool.clone())),
        }
    }

    pub fn signature(&self) -> ToolSignature {
        ToolSignature::new(&self.name, &self.description, self.parameters.clone())
    }
}

impl std::fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolDefinition")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish()
    }
}

/// Definitions collected from one namespace
#[derive(Debug, Default)]
pub struct ToolCatalog {
    definitions: Vec<ToolDefinition>,
}

impl ToolCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, definition: ToolDefinition) {
        self.definitions.push(definition);
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn into_definitions(self) -> Vec<ToolDefinition> {
        self.definitions
    }
}

/// Entry in the static registration table
#[derive(Clone, Copy)]
pub struct ToolNamespace {
    pub name: &'static str,
    pub register: fn(&mut ToolCatalog),
}

impl std::fmt::Debug for ToolNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolNamespace")
            .field("name", &self.name)
            .finish()
    }
}

/// Tools shipped with the runtime
pub static BUILTIN_NAMESPACES: &[ToolNamespace] = &[
    ToolNamespace {
        name: "basic",
        register: basic::register,
    },
    ToolNamespace {
        name: "shell",
        register: shell::register,
    },
    ToolNamespace {
        name: "filesystem",
        register: filesystem::register,
    },
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    Available,
    Unavailable(String),
}

/// A discovered tool
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub definition: ToolDefinition,
    pub namespace: String,
    pub status: ToolStatus,
}

impl ToolDescriptor {
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn is_available(&self) -> bool {
        self.status == ToolStatus::Available
    }
}

/// Registry errors
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("tool '{0}' does not exist")]
    NotFound(String),

    #[error("tool '{name}' is unavailable: {reason}")]
    Unavailable { name: String, reason: String },

    #[error("tool '{name}' could not be constructed: {reason}")]
    Construction { name: String, reason: String },
}

/// Discovered tools plus the per-name instance cache
pub struct ToolRegistry {
    env: ToolEnv,
    descriptors: HashMap<String, ToolDescriptor>,
    instances: DashMap<String, Arc<dyn ToolTrait>>,
}

impl ToolRegistry {
    pub fn new(env: ToolEnv) -> Self {
        Self {
            env,
            descriptors: HashMap::new(),
            instances: DashMap::new(),
        }
    }

    /// Walk the registration table and record every definition found.
    ///
    /// A definition with a broken schema, or one switched off in the
    /// toolkit config, is kept as unavailable; discovery never aborts.
    pub fn discover(namespaces: &[ToolNamespace], config: &ToolkitConfig, env: ToolEnv) -> Self {
        let mut registry = Self::new(env);

        for namespace in namespaces {
            if !config.scans(namespace.name) {
                debug!("Skipping tool namespace {}", namespace.name);
                continue;
            }

            let mut catalog = ToolCatalog::new();
            (namespace.register)(&mut catalog);
            debug!(
                "Namespace {} registered {} tool(s)",
                namespace.name,
                catalog.len()
            );

            for definition in catalog.into_definitions() {
                let status = if definition.name.trim().is_empty() {
                    ToolStatus::Unavailable("empty tool name".to_string())
                } else if let Err(reason) = check_schema(&definition.parameters) {
                    warn!("◆ TOOL {} REJECTED: {}", definition.name, reason);
                    ToolStatus::Unavailable(reason)
                } else if !config.is_enabled(&definition.name) {
                    ToolStatus::Unavailable("disabled".to_string())
                } else {
                    ToolStatus::Available
                };
                registry.insert(namespace.name, definition, status);
            }
        }

        info!(
            "◆ TOOLKIT READY: {} of {} tool(s) available",
            registry.available_count(),
            registry.descriptors.len()
        );
        registry
    }

    fn insert(&mut self, namespace: &str, definition: ToolDefinition, status: ToolStatus) {
        let name = definition.name.clone();
        if self.descriptors.contains_key(&name) {
            warn!("Tool {} defined twice, keeping the first definition", name);
            return;
        }
        self.descriptors.insert(
            name,
            ToolDescriptor {
                definition,
                namespace: namespace.to_string(),
                status,
            },
        );
    }

    /// Register a built instance directly
    pub fn register(&mut self, tool: Arc<dyn ToolTrait>) {
        let name = tool.name().to_string();
        self.define(ToolDefinition::from_tool(tool.clone()));
        if self.descriptors.get(&name).is_some_and(ToolDescriptor::is_available) {
            self.instances.insert(name, tool);
        }
    }

    /// Register a definition directly, replacing any previous one
    pub fn define(&mut self, definition: ToolDefinition) {
        let status = match check_schema(&definition.parameters) {
            Ok(()) => ToolStatus::Available,
            Err(reason) => {
                warn!("◆ TOOL {} REJECTED: {}", definition.name, reason);
                ToolStatus::Unavailable(reason)
            }
        };
        let name = definition.name.clone();
        self.instances.remove(&name);
        self.descriptors.insert(
            name,
            ToolDescriptor {
                definition,
                namespace: "direct".to_string(),
                status,
            },
        );
    }

    /// Cached instance for `name`, constructing it on first use.
    ///
    /// Concurrent first calls may both construct; only one instance is
    /// kept and every caller receives that one. Failures are not cached.
    pub fn get_instance(&self, name: &str) -> Result<Arc<dyn ToolTrait>, RegistryError> {
        if let Some(instance) = self.instances.get(name) {
            return Ok(instance.value().clone());
        }

        let descriptor = self
            .descriptors
            .get(name)
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;

        if let ToolStatus::Unavailable(reason) = &descriptor.status {
            return Err(RegistryError::Unavailable {
                name: name.to_string(),
                reason: reason.clone(),
            });
        }

        let instance = (descriptor.definition.constructor)(&self.env).map_err(|e| {
            warn!("◆ TOOL {} CONSTRUCTION FAILED: {}", name, e);
            RegistryError::Construction {
                name: name.to_string(),
                reason: e.to_string(),
            }
        })?;

        debug!("Constructed tool instance {}", name);
        Ok(self
            .instances
            .entry(name.to_string())
            .or_insert(instance)
            .value()
            .clone())
    }

    /// Call signatures of available tools, sorted by name
    pub fn list_call_signatures(&self) -> Vec<ToolSignature> {
        let mut signatures: Vec<ToolSignature> = self
            .descriptors
            .values()
            .filter(|d| d.is_available())
            .map(|d| d.definition.signature())
            .collect();
        signatures.sort_by(|a, b| a.name.cmp(&b.name));
        signatures
    }

    pub fn descriptor(&self, name: &str) -> Option<&ToolDescriptor> {
        self.descriptors.get(name)
    }

    /// All descriptors, sorted by name
    pub fn descriptors(&self) -> Vec<&ToolDescriptor> {
        let mut all: Vec<&ToolDescriptor> = self.descriptors.values().collect();
        all.sort_by(|a, b| a.name().cmp(b.name()));
        all
    }

    pub fn has(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.descriptors.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn available_count(&self) -> usize {
        self.descriptors.values().filter(|d| d.is_available()).count()
    }

    pub fn cached_count(&self) -> usize {
        self.instances.len()
    }

    pub fn env(&self) -> &ToolEnv {
        &self.env
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new(ToolEnv::default())
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .field("cached", &self.instances.len())
            .finish()
    }
}
