//! Parallel batch runner
//!
//! Items are queued with [`ParallelBatch::add`], spawned together by
//! [`ParallelBatch::start`] and collected by [`ParallelBatch::wait`] in the
//! order they were added. A timeout is a hard ceiling: every item still
//! running is aborted. After `wait` the batch is empty and reusable.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

type BoxedFuture<T> = Pin<Box<dyn Future<Output = T> + Send + 'static>>;

/// Batch misuse or timeout
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("batch already started")]
    AlreadyStarted,

    #[error("batch was not started")]
    NotStarted,

    #[error("batch timed out after {0:?}")]
    Timeout(Duration),
}

/// Failure of one item; occupies that item's slot
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchItemError {
    #[error("item panicked: {0}")]
    Panicked(String),

    #[error("item was cancelled")]
    Cancelled,
}

impl From<JoinError> for BatchItemError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            let panic = err.into_panic();
            let message = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            BatchItemError::Panicked(message)
        } else {
            BatchItemError::Cancelled
        }
    }
}

pub type BatchResults<T> = Vec<Result<T, BatchItemError>>;

/// Fan-out of independent work items
pub struct ParallelBatch<T> {
    pending: Vec<BoxedFuture<T>>,
    running: Option<Vec<JoinHandle<T>>>,
}

impl<T: Send + 'static> Default for ParallelBatch<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> ParallelBatch<T> {
    pub fn new() -> Self {
        Self {
            pending: Vec::new(),
            running: None,
        }
    }

    /// Queue an item; returns its slot index
    pub fn add<F>(&mut self, item: F) -> Result<usize, BatchError>
    where
        F: Future<Output = T> + Send + 'static,
    {
        if self.running.is_some() {
            return Err(BatchError::AlreadyStarted);
        }
        self.pending.push(Box::pin(item));
        Ok(self.pending.len() - 1)
    }

    /// Spawn every queued item
    pub fn start(&mut self) -> Result<(), BatchError> {
        if self.running.is_some() {
            return Err(BatchError::AlreadyStarted);
        }
        let handles: Vec<JoinHandle<T>> = self.pending.drain(..).map(tokio::spawn).collect();
        debug!("Batch started with {} item(s)", handles.len());
        self.running = Some(handles);
        Ok(())
    }

    pub fn is_started(&self) -> bool {
        self.running.is_some()
    }

    /// Items queued or running
    pub fn len(&self) -> usize {
        self.running
            .as_ref()
            .map_or(self.pending.len(), Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collect results in submission order.
    ///
    /// On timeout every unfinished item is aborted and awaited before
    /// `BatchError::Timeout` is returned. Either way the batch is reset.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<BatchResults<T>, BatchError> {
        let handles = self.running.take().ok_or(BatchError::NotStarted)?;
        let mut slots: Vec<Option<JoinHandle<T>>> = handles.into_iter().map(Some).collect();
        let mut results: Vec<Option<Result<T, BatchItemError>>> =
            slots.iter().map(|_| None).collect();

        let collected = {
            let collect = async {
                for (slot, result) in slots.iter_mut().zip(results.iter_mut()) {
                    if let Some(handle) = slot.as_mut() {
                        let joined = handle.await;
                        *slot = None;
                        *result = Some(joined.map_err(BatchItemError::from));
                    }
                }
            };
            match timeout {
                Some(limit) => tokio::time::timeout(limit, collect).await.is_ok(),
                None => {
                    collect.await;
                    true
                }
            }
        };

        if !collected {
            let limit = timeout.unwrap_or_default();
            let outstanding: Vec<JoinHandle<T>> = slots.into_iter().flatten().collect();
            warn!(
                "◆ BATCH TIMED OUT AFTER {:?}: aborting {} item(s)",
                limit,
                outstanding.len()
            );
            for handle in &outstanding {
                handle.abort();
            }
            for handle in outstanding {
                // Aborted or finished in the meantime; either way it is discarded
                let _ = handle.await;
            }
            return Err(BatchError::Timeout(limit));
        }

        Ok(results
            .into_iter()
            .map(|r| r.unwrap_or(Err(BatchItemError::Cancelled)))
            .collect())
    }
}

impl<T> Drop for ParallelBatch<T> {
    fn drop(&mut self) {
        if let Some(handles) = self.running.take() {
            for handle in handles {
                handle.abort();
            }
        }
    }
}

impl<T> std::fmt::Debug for ParallelBatch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelBatch")
            .field("pending", &self.pending.len())
            .field("running", &self.running.as_ref().map(Vec::len))
            .finish()
    }
}
