use std::{fmt, future::Future, sync::Arc, time::Duration};

use chrono::Utc;
use sea_orm::DatabaseConnection;
use tokio::time::Instant;

use crate::{Clock, EngineError, InMemoryScheduler, ResultEngine, Scheduler, SystemClock};

mod chats;
mod idempotency;
mod maintenance;
mod purchases;
mod quests;
mod unit_of_work;
mod users;

pub use quests::Completion;
pub use unit_of_work::{TxHandle, UnitOfWork};

/// Tunables of an [`Engine`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EngineConfig {
    /// How long a finished idempotency key keeps answering replays.
    pub idempotency_ttl: Duration,
    /// Age after which a `pending` key is considered abandoned and can be
    /// claimed again.
    pub pending_timeout: Duration,
    /// Deadline of a workflow when the command carries none.
    pub operation_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            idempotency_ttl: Duration::from_secs(24 * 60 * 60),
            pending_timeout: Duration::from_secs(5 * 60),
            operation_timeout: Duration::from_secs(10),
        }
    }
}

pub struct Engine {
    database: DatabaseConnection,
    uow: UnitOfWork,
    scheduler: Arc<dyn Scheduler>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl fmt::Debug for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Engine")
            .field("database", &self.database)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Return a builder for `Engine`. Help to build the struct.
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The transaction manager the workflows run in.
    pub fn unit_of_work(&self) -> &UnitOfWork {
        &self.uow
    }

    fn deadline(&self, timeout: Option<Duration>) -> ResultEngine<Instant> {
        let timeout = timeout.unwrap_or(self.config.operation_timeout);
        Instant::now()
            .checked_add(timeout)
            .ok_or_else(|| EngineError::InvalidRequest(format!("timeout {timeout:?} is out of range")))
    }
}

/// Runs `fut` until `deadline`. A future cut short is dropped, which rolls
/// back any transaction it still holds.
async fn with_deadline<T>(
    deadline: Instant,
    fut: impl Future<Output = ResultEngine<T>>,
) -> ResultEngine<T> {
    tokio::time::timeout_at(deadline, fut)
        .await
        .map_err(|_| EngineError::Timeout)?
}

fn chrono_duration(duration: Duration) -> ResultEngine<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|_| EngineError::InvalidRequest(format!("duration {duration:?} is out of range")))
}

/// The builder for `Engine`
#[derive(Default)]
pub struct EngineBuilder {
    database: DatabaseConnection,
    scheduler: Option<Arc<dyn Scheduler>>,
    clock: Option<Arc<dyn Clock>>,
    config: EngineConfig,
}

impl EngineBuilder {
    /// Pass the required database
    pub fn database(mut self, db: DatabaseConnection) -> EngineBuilder {
        self.database = db;
        self
    }

    /// Recurrence bookkeeping. Defaults to an [`InMemoryScheduler`].
    pub fn scheduler(mut self, scheduler: Arc<dyn Scheduler>) -> EngineBuilder {
        self.scheduler = Some(scheduler);
        self
    }

    /// Time source. Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> EngineBuilder {
        self.clock = Some(clock);
        self
    }

    pub fn config(mut self, config: EngineConfig) -> EngineBuilder {
        self.config = config;
        self
    }

    /// Defaults to 24 hours.
    pub fn idempotency_ttl(mut self, ttl: Duration) -> EngineBuilder {
        self.config.idempotency_ttl = ttl;
        self
    }

    /// Defaults to 5 minutes.
    pub fn pending_timeout(mut self, timeout: Duration) -> EngineBuilder {
        self.config.pending_timeout = timeout;
        self
    }

    /// Defaults to 10 seconds.
    pub fn operation_timeout(mut self, timeout: Duration) -> EngineBuilder {
        self.config.operation_timeout = timeout;
        self
    }

    /// Construct `Engine`
    pub async fn build(self) -> ResultEngine<Engine> {
        for (label, duration) in [
            ("idempotency_ttl", self.config.idempotency_ttl),
            ("pending_timeout", self.config.pending_timeout),
        ] {
            let span = chrono_duration(duration)?;
            if Utc::now().checked_add_signed(span).is_none() {
                return Err(EngineError::InvalidRequest(format!(
                    "{label} {duration:?} is out of range"
                )));
            }
        }
        if self.config.operation_timeout.is_zero() {
            return Err(EngineError::InvalidRequest(
                "operation_timeout must be positive".to_string(),
            ));
        }

        Ok(Engine {
            uow: UnitOfWork::new(self.database.clone()),
            database: self.database,
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(InMemoryScheduler::new())),
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            config: self.config,
        })
    }
}
