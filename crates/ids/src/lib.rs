//! Snowflake identifiers for tasks and sub-items
//!
//! An identifier packs three fields into 64 bits:
//!
//! ```text
//! | 42 bits: ms since EPOCH_MS | 10 bits: worker id | 12 bits: sequence |
//! ```
//!
//! Identifiers issued by one generator are strictly increasing. Two
//! generators only stay collision-free if they run with distinct worker ids,
//! so the worker id should be assigned from configuration.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

/// Custom epoch: 2024-01-01T00:00:00Z
pub const EPOCH_MS: u64 = 1_704_067_200_000;

const WORKER_BITS: u32 = 10;
const SEQUENCE_BITS: u32 = 12;
const WORKER_SHIFT: u32 = SEQUENCE_BITS;
const TIMESTAMP_SHIFT: u32 = SEQUENCE_BITS + WORKER_BITS;

pub const MAX_WORKER_ID: u16 = (1 << WORKER_BITS) - 1;
pub const MAX_SEQUENCE: u16 = (1 << SEQUENCE_BITS) - 1;

/// Largest clock regression absorbed by sleeping
pub const MAX_BACKWARD_MS: u64 = 5;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum IdError {
    #[error("clock moved backwards by {behind_ms}ms, refusing to issue identifiers")]
    ClockRegression { behind_ms: u64 },

    #[error("worker id {0} out of range (0..={MAX_WORKER_ID})")]
    InvalidWorkerId(u16),

    #[error("clock reads {0}ms, before the identifier epoch")]
    BeforeEpoch(u64),
}

pub type Result<T> = std::result::Result<T, IdError>;

/// Millisecond wall clock
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// System time clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Manually driven clock
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// 10-bit worker id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WorkerId(u16);

impl WorkerId {
    pub fn new(id: u16) -> Result<Self> {
        if id > MAX_WORKER_ID {
            return Err(IdError::InvalidWorkerId(id));
        }
        Ok(Self(id))
    }

    /// Uncoordinated random worker id. Collides across processes with
    /// probability 1/1024 per pair.
    pub fn random() -> Self {
        Self(rand::thread_rng().gen_range(0..=MAX_WORKER_ID))
    }

    /// Assigned id if present, otherwise a random one
    pub fn assigned_or_random(assigned: Option<u16>) -> Result<Self> {
        match assigned {
            Some(id) => Self::new(id),
            None => {
                let id = Self::random();
                warn!(
                    "No worker id assigned, using random worker id {}; identifiers may collide across processes",
                    id.0
                );
                Ok(id)
            }
        }
    }

    pub fn get(self) -> u16 {
        self.0
    }
}

/// Decoded identifier fields
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SnowflakeParts {
    /// Unix milliseconds
    pub timestamp_ms: u64,
    pub worker_id: u16,
    pub sequence: u16,
}

/// Recover timestamp, worker id and sequence from an identifier
pub fn parse_id(id: u64) -> SnowflakeParts {
    SnowflakeParts {
        timestamp_ms: (id >> TIMESTAMP_SHIFT) + EPOCH_MS,
        worker_id: ((id >> WORKER_SHIFT) & u64::from(MAX_WORKER_ID)) as u16,
        sequence: (id & u64::from(MAX_SEQUENCE)) as u16,
    }
}

fn compose(timestamp_ms: u64, worker_id: WorkerId, sequence: u16) -> u64 {
    ((timestamp_ms - EPOCH_MS) << TIMESTAMP_SHIFT)
        | (u64::from(worker_id.0) << WORKER_SHIFT)
        | u64::from(sequence)
}

struct GeneratorState {
    last_ms: u64,
    sequence: u16,
}

/// Issues strictly increasing identifiers
pub struct SnowflakeGenerator {
    worker_id: WorkerId,
    clock: Arc<dyn Clock>,
    state: Mutex<GeneratorState>,
}

impl SnowflakeGenerator {
    pub fn new(worker_id: WorkerId) -> Self {
        Self::with_clock(worker_id, Arc::new(SystemClock))
    }

    pub fn with_clock(worker_id: WorkerId, clock: Arc<dyn Clock>) -> Self {
        Self {
            worker_id,
            clock,
            state: Mutex::new(GeneratorState {
                last_ms: 0,
                sequence: 0,
            }),
        }
    }

    pub fn worker_id(&self) -> WorkerId {
        self.worker_id
    }

    /// Issue the next identifier
    pub async fn next_id(&self) -> Result<u64> {
        let mut state = self.state.lock().await;

        loop {
            let mut now = self.clock.now_ms();

            if now < state.last_ms {
                let behind_ms = state.last_ms - now;
                if behind_ms >= MAX_BACKWARD_MS {
                    error!("Clock moved backwards by {}ms", behind_ms);
                    return Err(IdError::ClockRegression { behind_ms });
                }
                debug!("Clock behind by {}ms, waiting it out", behind_ms);
                tokio::time::sleep(Duration::from_millis(behind_ms)).await;
                continue;
            }

            if now < EPOCH_MS {
                return Err(IdError::BeforeEpoch(now));
            }

            if now == state.last_ms {
                state.sequence = (state.sequence + 1) & MAX_SEQUENCE;
                if state.sequence == 0 {
                    now = self.wait_next_millis(state.last_ms).await;
                }
            } else {
                state.sequence = 0;
            }

            state.last_ms = now;
            return Ok(compose(now, self.worker_id, state.sequence));
        }
    }

    /// Spin until the clock passes `last_ms`
    async fn wait_next_millis(&self, last_ms: u64) -> u64 {
        loop {
            let now = self.clock.now_ms();
            if now > last_ms {
                return now;
            }
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_id_bounds() {
        assert!(WorkerId::new(0).is_ok());
        assert!(WorkerId::new(MAX_WORKER_ID).is_ok());
        assert_eq!(WorkerId::new(1024), Err(IdError::InvalidWorkerId(1024)));
    }

    #[test]
    fn test_random_worker_id_in_range() {
        for _ in 0..100 {
            assert!(WorkerId::random().get() <= MAX_WORKER_ID);
        }
    }

    #[test]
    fn test_compose_parse_layout() {
        let worker = WorkerId::new(513).unwrap();
        let id = compose(EPOCH_MS + 1234, worker, 77);

        assert_eq!(id >> 22, 1234);
        let parts = parse_id(id);
        assert_eq!(parts.timestamp_ms, EPOCH_MS + 1234);
        assert_eq!(parts.worker_id, 513);
        assert_eq!(parts.sequence, 77);
    }

    #[tokio::test]
    async fn test_same_millisecond_increments_sequence() {
        let clock = Arc::new(ManualClock::new(EPOCH_MS + 10));
        let generator = SnowflakeGenerator::with_clock(WorkerId::new(1).unwrap(), clock.clone());

        let a = generator.next_id().await.unwrap();
        let b = generator.next_id().await.unwrap();
        assert_eq!(parse_id(a).sequence, 0);
        assert_eq!(parse_id(b).sequence, 1);

        clock.advance(1);
        let c = generator.next_id().await.unwrap();
        assert_eq!(parse_id(c).sequence, 0);
        assert!(a < b && b < c);
    }

    #[tokio::test]
    async fn test_large_regression_is_fatal() {
        let clock = Arc::new(ManualClock::new(EPOCH_MS + 100));
        let generator = SnowflakeGenerator::with_clock(WorkerId::new(1).unwrap(), clock.clone());

        generator.next_id().await.unwrap();
        clock.set(EPOCH_MS + 95);

        assert_eq!(
            generator.next_id().await,
            Err(IdError::ClockRegression { behind_ms: 5 })
        );
    }

    #[tokio::test]
    async fn test_clock_before_epoch() {
        let clock = Arc::new(ManualClock::new(1_000));
        let generator = SnowflakeGenerator::with_clock(WorkerId::new(1).unwrap(), clock);

        assert_eq!(generator.next_id().await, Err(IdError::BeforeEpoch(1_000)));
    }
}
