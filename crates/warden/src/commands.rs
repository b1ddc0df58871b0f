//! Warden command implementations

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use warden_bus::EventKind;
use warden_config::{self, Config};
use warden_ids::{parse_id, SnowflakeGenerator, WorkerId};
use warden_watchdog::IdleWatchdog;

use crate::server::Server;
use crate::services::{discover_tools, Services};

/// Initialize config and workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing Warden...");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let config = warden_config::init().await?;

    println!("\n◆ Warden initialized");
    println!("Config:    {}", warden_config::config_path().display());
    println!("Workspace: {}", config.workspace_path().display());
    println!("\nNext steps:");
    println!("  1. Adjust ~/.warden/config.json if needed");
    println!("  2. Start the runtime: warden serve");

    Ok(())
}

/// Show config and workspace status
pub async fn status_command() -> Result<()> {
    let config_path = warden_config::config_path();

    println!("◆ Warden Status");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "Config:    {} {}",
        config_path.display(),
        if config_path.exists() { "[OK]" } else { "[Missing]" }
    );

    let config = Config::load().await?;
    let workspace = config.workspace_path();
    println!(
        "Workspace: {} {}",
        workspace.display(),
        if workspace.exists() { "[OK]" } else { "[Missing]" }
    );
    println!("Model:     {}", config.operative.model);
    println!("Listen:    {}:{}", config.deploy.host, config.deploy.port);
    println!("Idle:      {}s", config.idle_timeout().as_secs());
    match config.worker_id()? {
        Some(id) => println!("Worker id: {}", id),
        None => println!("Worker id: [Random]"),
    }

    let registry = discover_tools(&config);
    println!(
        "Tools:     {} of {} available",
        registry.available_count(),
        registry.names().len()
    );

    println!("\n◆ Ready");
    Ok(())
}

/// Print the call signatures of available tools as JSON
pub async fn tools_command() -> Result<()> {
    let config = Config::load().await?;
    let registry = discover_tools(&config);

    for descriptor in registry.descriptors() {
        if let warden_agent::ToolStatus::Unavailable(reason) = &descriptor.status {
            eprintln!("◆ {} unavailable: {}", descriptor.name(), reason);
        }
    }

    let signatures = registry.list_call_signatures();
    println!("{}", serde_json::to_string_pretty(&signatures)?);
    Ok(())
}

/// Issue identifiers, or decode one
pub async fn id_command(count: usize, parse: Option<u64>) -> Result<()> {
    if let Some(id) = parse {
        let parts = parse_id(id);
        let timestamp = i64::try_from(parts.timestamp_ms)
            .ok()
            .and_then(DateTime::<Utc>::from_timestamp_millis)
            .map(|t| t.to_rfc3339());
        let decoded = json!({
            "id": id,
            "timestamp_ms": parts.timestamp_ms,
            "timestamp": timestamp,
            "worker_id": parts.worker_id,
            "sequence": parts.sequence,
        });
        println!("{}", serde_json::to_string_pretty(&decoded)?);
        return Ok(());
    }

    let config = Config::load().await?;
    let worker_id = WorkerId::assigned_or_random(config.worker_id()?)
        .context("invalid worker id")?;
    let generator = SnowflakeGenerator::new(worker_id);
    for _ in 0..count {
        println!("{}", generator.next_id().await?);
    }
    Ok(())
}

/// Run the runtime until interrupted or idle
pub async fn serve_command(host: Option<String>, port: Option<u16>) -> Result<()> {
    println!("◆ Starting Warden runtime");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut config = Config::load().await?;
    if let Some(host) = host {
        config.deploy.host = host;
    }
    if let Some(port) = port {
        config.deploy.port = port;
    }

    let services = Services::build(config)?;
    log_failures(&services);

    let addr = format!("{}:{}", services.config.deploy.host, services.config.deploy.port);
    let server = Server::bind(&addr, services.sessions.clone()).await?;
    let local = server.local_addr()?;

    let shutdown = CancellationToken::new();
    let monitor = services
        .supervisor
        .spawn_monitor(services.config.supervisor.poll_interval(), shutdown.clone());
    let server_task = tokio::spawn(server.run(shutdown.clone()));

    info!("◆ LISTENING ON {}", local);
    println!("◆ Listening on {}", local);
    println!("Tools: {} available", services.registry.available_count());
    println!("Press Ctrl+C to stop");

    let watchdog = IdleWatchdog::new(
        services.state.clone(),
        Some(services.config.watchdog_interval()),
        services.config.watchdog.enabled,
    );
    let idle = async {
        match watchdog.run(|_| async {}).await {
            Some(idle_for) => idle_for,
            None => std::future::pending().await,
        }
    };

    tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                error!("◆ SIGNAL HANDLER FAILED: {}", e);
            }
            info!("◆ Shutdown signal received");
            println!("\n◆ Shutting down...");
        }
        idle_for = idle => {
            info!("◆ IDLE FOR {:?}, SHUTTING DOWN", idle_for);
            println!("◆ Idle for {}s, shutting down", idle_for.as_secs());
        }
    }

    shutdown.cancel();
    if let Err(e) = server_task.await {
        error!("◆ SERVER TASK FAILED: {}", e);
    }
    if let Err(e) = monitor.await {
        error!("◆ SUPERVISOR MONITOR FAILED: {}", e);
    }

    let results = services.supervisor.stop_all(services.stop_grace()).await;
    for (name, stopped) in &results {
        if !stopped {
            warn!("◆ WORKER {} DID NOT STOP", name);
        }
    }

    println!("◆ Stopped");
    Ok(())
}

/// Log task and session failures published on the bus
fn log_failures(services: &Services) {
    for kind in [EventKind::TaskFailed, EventKind::Error] {
        services.bus.subscribe_fn(kind, "failure-log", move |event| {
            warn!(
                "◆ {} (session {}): {:?}",
                event.kind,
                event.session_id.as_deref().unwrap_or("-"),
                event.payload
            );
            Ok(())
        });
    }
}
