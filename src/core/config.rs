use crate::core::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine configuration with all tuning parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    // Scheduling
    /// Maximum number of tasks in Running state at once.
    pub max_concurrent: usize,
    /// Idle sleep between scheduler polls when no work or no capacity.
    pub queue_poll_interval: Duration,

    // Execution
    /// Default per-attempt timeout; None means unbounded.
    pub default_timeout: Option<Duration>,
    /// How long a cancelled attempt gets to observe its token and exit
    /// before the executor gives up on it.
    pub grace_period: Duration,

    // Retry
    /// Maximum executor invocations per task (first attempt included).
    pub max_attempts: u32,
    /// Initial retry delay; doubles per attempt.
    pub retry_base_delay: Duration,
    /// Cap on the backoff delay.
    pub max_backoff: Duration,
    /// Treat timeouts as transient for retry purposes.
    pub retry_on_timeout: bool,

    // Streams
    /// Checkpoint every N items on a persisted stream.
    pub checkpoint_interval: usize,
    /// In-flight chunk bound per source in `merge` compositions.
    pub merge_source_bound: usize,

    // Retention
    /// How long terminal task records and metric samples are kept.
    pub retention_window: Duration,

    // Events
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let parallelism = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4);

        Self {
            max_concurrent: parallelism,
            queue_poll_interval: Duration::from_millis(10),
            default_timeout: None,
            grace_period: Duration::from_millis(500),
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            max_backoff: Duration::from_secs(30),
            retry_on_timeout: false,
            checkpoint_interval: 100,
            merge_source_bound: 16,
            retention_window: Duration::from_secs(3600),
            event_capacity: 1024,
        }
    }
}

impl EngineConfig {
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration before the engine starts.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent == 0 {
            return Err(EngineError::validation_field(
                "max_concurrent must be at least 1",
                "max_concurrent",
            ));
        }
        if self.max_attempts == 0 {
            return Err(EngineError::validation_field(
                "max_attempts must be at least 1",
                "max_attempts",
            ));
        }
        if self.checkpoint_interval == 0 {
            return Err(EngineError::validation_field(
                "checkpoint_interval must be at least 1",
                "checkpoint_interval",
            ));
        }
        if self.merge_source_bound == 0 {
            return Err(EngineError::validation_field(
                "merge_source_bound must be at least 1",
                "merge_source_bound",
            ));
        }
        if self.event_capacity == 0 {
            return Err(EngineError::validation_field(
                "event_capacity must be at least 1",
                "event_capacity",
            ));
        }
        Ok(())
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl Default for EngineConfigBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
        }
    }
}

impl EngineConfigBuilder {
    pub fn max_concurrent(mut self, n: usize) -> Self {
        self.config.max_concurrent = n;
        self
    }

    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.config.default_timeout = Some(timeout);
        self
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.config.grace_period = grace;
        self
    }

    pub fn max_attempts(mut self, n: u32) -> Self {
        self.config.max_attempts = n;
        self
    }

    pub fn retry_base_delay(mut self, delay: Duration) -> Self {
        self.config.retry_base_delay = delay;
        self
    }

    pub fn max_backoff(mut self, cap: Duration) -> Self {
        self.config.max_backoff = cap;
        self
    }

    pub fn retry_on_timeout(mut self, enabled: bool) -> Self {
        self.config.retry_on_timeout = enabled;
        self
    }

    pub fn checkpoint_interval(mut self, items: usize) -> Self {
        self.config.checkpoint_interval = items;
        self
    }

    pub fn merge_source_bound(mut self, bound: usize) -> Self {
        self.config.merge_source_bound = bound;
        self
    }

    pub fn retention_window(mut self, window: Duration) -> Self {
        self.config.retention_window = window;
        self
    }

    pub fn event_capacity(mut self, capacity: usize) -> Self {
        self.config.event_capacity = capacity;
        self
    }

    pub fn queue_poll_interval(mut self, interval: Duration) -> Self {
        self.config.queue_poll_interval = interval;
        self
    }

    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
