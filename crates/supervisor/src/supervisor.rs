//! Named worker table

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use warden_config::SupervisorConfig;

use crate::entrypoint::Entrypoint;
use crate::worker::{Liveness, Worker, WorkerStatus};
use crate::Result;

/// Starts, stops and polls named workers.
///
/// The table lock is never held while waiting on a worker: `stop` takes the
/// entry out first, so the poller cannot handle it a second time.
#[derive(Debug)]
pub struct ProcessSupervisor {
    workers: Mutex<HashMap<String, Worker>>,
    grace: Duration,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::from_config(&SupervisorConfig::default())
    }
}

impl ProcessSupervisor {
    /// `grace` is used when `start` replaces a running worker
    pub fn new(grace: Duration) -> Self {
        Self {
            workers: Mutex::new(HashMap::new()),
            grace,
        }
    }

    pub fn from_config(config: &SupervisorConfig) -> Self {
        Self::new(config.stop_grace())
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Launch a worker under `name`, stopping any worker already there.
    ///
    /// Returns the OS pid for commands, `None` for tasks.
    pub async fn start(&self, name: &str, entrypoint: Entrypoint) -> Result<Option<u32>> {
        if self.stop(name, self.grace).await {
            info!("◆ REPLACING WORKER {}", name);
        }

        let worker = Worker::launch(name, entrypoint).await?;
        let pid = worker.pid();

        let displaced = self.workers.lock().await.insert(name.to_string(), worker);
        if let Some(mut old) = displaced {
            // Started concurrently under the same name; the later start wins
            warn!("Worker {} was started twice, stopping the older one", name);
            let grace = self.grace;
            tokio::spawn(async move {
                old.terminate(grace).await;
            });
        }
        Ok(pid)
    }

    /// Stop `name`. Returns true if it was tracked and is now gone.
    pub async fn stop(&self, name: &str, grace: Duration) -> bool {
        let Some(mut worker) = self.workers.lock().await.remove(name) else {
            debug!("Stop requested for unknown worker {}", name);
            return false;
        };

        if worker.terminate(grace).await {
            return true;
        }

        error!("◆ WORKER {} COULD NOT BE STOPPED", name);
        // Keep tracking it unless something new took the name meanwhile
        self.workers
            .lock()
            .await
            .entry(name.to_string())
            .or_insert(worker);
        false
    }

    /// Stop every worker concurrently; one failure does not hold up the rest
    pub async fn stop_all(&self, grace: Duration) -> HashMap<String, bool> {
        let workers: Vec<(String, Worker)> = self.workers.lock().await.drain().collect();
        if workers.is_empty() {
            return HashMap::new();
        }
        info!("◆ STOPPING {} WORKER(S)", workers.len());

        let mut results: HashMap<String, bool> =
            workers.iter().map(|(name, _)| (name.clone(), false)).collect();

        let mut set = JoinSet::new();
        for (name, mut worker) in workers {
            set.spawn(async move {
                let stopped = worker.terminate(grace).await;
                (name, stopped)
            });
        }
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((name, stopped)) => {
                    results.insert(name, stopped);
                }
                Err(e) => error!("◆ STOP TASK FAILED: {}", e),
            }
        }
        results
    }

    /// Remove workers that exited on their own; returns their names and exit codes
    pub async fn reap(&self) -> Vec<(String, Option<i32>)> {
        let mut workers = self.workers.lock().await;
        let exited: Vec<(String, Option<i32>)> = workers
            .iter_mut()
            .filter_map(|(name, worker)| match worker.liveness() {
                Liveness::Exited(code) => Some((name.clone(), code)),
                Liveness::Alive => None,
            })
            .collect();

        for (name, code) in &exited {
            workers.remove(name);
            match code {
                Some(0) | None => info!("◆ WORKER {} EXITED", name),
                Some(code) => warn!("◆ WORKER {} EXITED WITH CODE {}", name, code),
            }
        }
        exited
    }

    /// Poll at `interval` until `shutdown` is cancelled
    pub fn spawn_monitor(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) -> JoinHandle<()> {
        let supervisor = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        debug!("Supervisor monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        supervisor.reap().await;
                    }
                }
            }
        })
    }

    pub async fn status(&self, name: &str) -> Option<WorkerStatus> {
        self.workers.lock().await.get_mut(name).map(Worker::status)
    }

    /// Status of every tracked worker, sorted by name
    pub async fn list(&self) -> Vec<WorkerStatus> {
        let mut all: Vec<WorkerStatus> = self
            .workers
            .lock()
            .await
            .values_mut()
            .map(Worker::status)
            .collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }

    pub async fn contains(&self, name: &str) -> bool {
        self.workers.lock().await.contains_key(name)
    }

    pub async fn len(&self) -> usize {
        self.workers.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workers.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stop_unknown_worker() {
        let supervisor = ProcessSupervisor::default();
        assert!(!supervisor.stop("ghost", Duration::from_millis(10)).await);
        assert!(supervisor.stop_all(Duration::from_millis(10)).await.is_empty());
    }

    #[tokio::test]
    async fn test_default_grace_from_config() {
        let supervisor = ProcessSupervisor::default();
        assert_eq!(supervisor.grace(), Duration::from_millis(5000));
    }
}
