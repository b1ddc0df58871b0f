//! A launched worker and how it is brought down

use serde::Serialize;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::fs::OpenOptions;
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use warden_config::paths::safe_filename;

use crate::entrypoint::{CommandSpec, Entrypoint};
use crate::{Result, SupervisorError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    /// Exited on its own; removed at the next poll
    Exited,
}

/// Snapshot returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkerStatus {
    pub name: String,
    pub pid: Option<u32>,
    pub status: RunState,
    pub exit_code: Option<i32>,
    #[serde(serialize_with = "as_secs_f64")]
    pub uptime: Duration,
}

fn as_secs_f64<S: serde::Serializer>(value: &Duration, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_f64(value.as_secs_f64())
}

#[derive(Debug)]
enum Runner {
    Process(Child),
    Task {
        handle: JoinHandle<()>,
        cancel: CancellationToken,
    },
}

/// Outcome of polling a worker without waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Liveness {
    Alive,
    Exited(Option<i32>),
}

#[derive(Debug)]
pub(crate) struct Worker {
    name: String,
    pid: Option<u32>,
    started: Instant,
    runner: Runner,
}

impl Worker {
    pub(crate) async fn launch(name: &str, entrypoint: Entrypoint) -> Result<Self> {
        let runner = match entrypoint {
            Entrypoint::Command(spec) => Runner::Process(spawn_command(name, &spec).await?),
            Entrypoint::Task(body) => {
                let cancel = CancellationToken::new();
                let handle = tokio::spawn(body(cancel.clone()));
                Runner::Task { handle, cancel }
            }
        };
        let pid = match &runner {
            Runner::Process(child) => child.id(),
            Runner::Task { .. } => None,
        };

        Ok(Self {
            name: name.to_string(),
            pid,
            started: Instant::now(),
            runner,
        })
    }

    pub(crate) fn pid(&self) -> Option<u32> {
        self.pid
    }

    pub(crate) fn liveness(&mut self) -> Liveness {
        match &mut self.runner {
            Runner::Process(child) => match child.try_wait() {
                Ok(Some(status)) => Liveness::Exited(status.code()),
                Ok(None) => Liveness::Alive,
                Err(e) => {
                    warn!("◆ COULD NOT POLL WORKER {}: {}", self.name, e);
                    Liveness::Alive
                }
            },
            Runner::Task { handle, .. } => {
                if handle.is_finished() {
                    Liveness::Exited(None)
                } else {
                    Liveness::Alive
                }
            }
        }
    }

    pub(crate) fn status(&mut self) -> WorkerStatus {
        let (status, exit_code) = match self.liveness() {
            Liveness::Alive => (RunState::Running, None),
            Liveness::Exited(code) => (RunState::Exited, code),
        };
        WorkerStatus {
            name: self.name.clone(),
            pid: self.pid,
            status,
            exit_code,
            uptime: self.started.elapsed(),
        }
    }

    /// Ask the worker to stop, then force it after `grace`.
    ///
    /// Returns true once the worker is confirmed gone.
    pub(crate) async fn terminate(&mut self, grace: Duration) -> bool {
        if let Liveness::Exited(code) = self.liveness() {
            debug!("Worker {} already exited ({:?})", self.name, code);
            return true;
        }

        match &mut self.runner {
            Runner::Process(child) => {
                request_stop(&self.name, child);
                match tokio::time::timeout(grace, child.wait()).await {
                    Ok(Ok(status)) => {
                        info!("◆ WORKER {} STOPPED: {}", self.name, status);
                        return true;
                    }
                    Ok(Err(e)) => warn!("◆ WAITING ON WORKER {} FAILED: {}", self.name, e),
                    Err(_) => warn!("◆ WORKER {} IGNORED STOP FOR {:?}, KILLING", self.name, grace),
                }
                match child.kill().await {
                    Ok(()) => {
                        info!("◆ WORKER {} KILLED", self.name);
                        true
                    }
                    Err(e) => {
                        error!("◆ COULD NOT KILL WORKER {}: {}", self.name, e);
                        false
                    }
                }
            }
            Runner::Task { handle, cancel } => {
                cancel.cancel();
                if tokio::time::timeout(grace, &mut *handle).await.is_ok() {
                    info!("◆ WORKER {} STOPPED", self.name);
                    return true;
                }
                warn!("◆ WORKER {} IGNORED STOP FOR {:?}, ABORTING", self.name, grace);
                handle.abort();
                // Cancelled or finished in the meantime; gone either way
                let _ = (&mut *handle).await;
                true
            }
        }
    }
}

#[cfg(unix)]
fn request_stop(name: &str, child: &mut Child) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    let Some(pid) = child.id() else {
        return;
    };
    debug!("Sending SIGTERM to worker {} (pid {})", name, pid);
    if let Err(e) = kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        warn!("◆ SIGTERM TO WORKER {} FAILED: {}", name, e);
    }
}

#[cfg(not(unix))]
fn request_stop(name: &str, child: &mut Child) {
    // No soft stop without signals
    if let Err(e) = child.start_kill() {
        warn!("◆ STOP REQUEST TO WORKER {} FAILED: {}", name, e);
    }
}

async fn spawn_command(name: &str, spec: &CommandSpec) -> Result<Child> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .kill_on_drop(true);
    if let Some(cwd) = &spec.cwd {
        cmd.current_dir(cwd);
    }

    match &spec.log_dir {
        Some(dir) => {
            tokio::fs::create_dir_all(dir).await?;
            let path = dir.join(format!("{}.log", safe_filename(name)));
            let log = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await?
                .into_std()
                .await;
            cmd.stdout(Stdio::from(log.try_clone()?))
                .stderr(Stdio::from(log));
            debug!("Worker {} logging to {:?}", name, path);
        }
        None => {
            cmd.stdout(Stdio::null()).stderr(Stdio::null());
        }
    }

    let child = cmd.spawn().map_err(|source| SupervisorError::Spawn {
        name: name.to_string(),
        source,
    })?;
    info!(
        "◆ WORKER {} STARTED: {} (pid {:?})",
        name,
        spec.program,
        child.id()
    );
    Ok(child)
}
