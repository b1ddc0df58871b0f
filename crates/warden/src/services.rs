//! Runtime service wiring
//!
//! Every long-lived service is built once here and handed out explicitly.

use anyhow::{Context, Result};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use warden_agent::{AgentLoop, ToolEnv, ToolExecutor, ToolRegistry, BUILTIN_NAMESPACES};
use warden_bus::EventBus;
use warden_config::Config;
use warden_ids::{SnowflakeGenerator, WorkerId};
use warden_provider::LoopbackProvider;
use warden_session::SessionManager;
use warden_state::{FieldType, SharedState};
use warden_supervisor::ProcessSupervisor;

/// State field holding the identifier worker id
pub const WORKER_ID_FIELD: &str = "runtime.worker_id";

pub struct Services {
    pub config: Config,
    pub bus: EventBus,
    pub state: Arc<SharedState>,
    pub registry: Arc<ToolRegistry>,
    pub supervisor: Arc<ProcessSupervisor>,
    pub sessions: Arc<SessionManager>,
}

impl Services {
    pub fn build(config: Config) -> Result<Self> {
        let bus = EventBus::new();
        let state = Arc::new(SharedState::new(config.idle_timeout()));

        let worker_id = WorkerId::assigned_or_random(config.worker_id()?)
            .context("invalid worker id")?;
        let ids = Arc::new(SnowflakeGenerator::new(worker_id));
        if let Err(e) = state.register(WORKER_ID_FIELD, json!(worker_id.get()), Some(FieldType::Number)) {
            warn!("Failed to register {}: {}", WORKER_ID_FIELD, e);
        }

        let registry = Arc::new(discover_tools(&config));
        let executor = Arc::new(
            ToolExecutor::new(registry.clone()).with_default_timeout(config.toolkit.call_timeout()),
        );

        let agent = AgentLoop::with_config(LoopbackProvider::new(), executor, &config.operative);
        info!("◆ AGENT READY: model {}", agent.model());

        let sessions = Arc::new(SessionManager::new(
            Arc::new(agent),
            bus.clone(),
            state.clone(),
            ids,
            config.session.clone(),
        ));
        let supervisor = Arc::new(ProcessSupervisor::from_config(&config.supervisor));

        Ok(Self {
            config,
            bus,
            state,
            registry,
            supervisor,
            sessions,
        })
    }

    pub fn stop_grace(&self) -> Duration {
        self.config.supervisor.stop_grace()
    }
}

/// Tool registry for the configured workspace
pub fn discover_tools(config: &Config) -> ToolRegistry {
    let env = ToolEnv::new(config.workspace_path())
        .with_exec_timeout(Duration::from_secs(config.toolkit.exec_timeout_secs));
    ToolRegistry::discover(BUILTIN_NAMESPACES, &config.toolkit, env)
}
