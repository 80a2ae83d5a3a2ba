use std::time::Duration;

/// Controller tuning knobs.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Bound of each command channel; producers block when full.
    pub queue_size: usize,

    /// How long a producer may block on a full queue before `QueueFull`.
    pub admission_timeout: Duration,

    /// Timeout sweeper cadence.
    pub sweeper_period: Duration,

    /// Generator trigger loop cadence.
    pub generator_period: Duration,

    /// Cron trigger loop cadence.
    pub cron_period: Duration,

    /// Candidates fetched per assign attempt.
    pub assign_batch: usize,

    /// How long a periodic pass may wait for the controller lock before
    /// skipping its tick.
    pub lock_timeout: Duration,

    /// Delete old successful processes and graphs when set.
    pub retention: bool,

    /// Retention sweep cadence.
    pub retention_period: Duration,

    /// Age a successful process/graph must reach before retention deletes it.
    pub retention_age: Duration,

    /// Allow a re-registering executor to replace its previous registration.
    pub allow_executor_reregister: bool,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            queue_size: 500,
            admission_timeout: Duration::from_secs(1),
            sweeper_period: Duration::from_millis(500),
            generator_period: Duration::from_millis(1000),
            cron_period: Duration::from_millis(1000),
            assign_batch: 32,
            lock_timeout: Duration::from_secs(5),
            retention: false,
            retention_period: Duration::from_secs(60),
            retention_age: Duration::from_secs(3600),
            allow_executor_reregister: false,
        }
    }
}

impl ControllerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_queue_size(mut self, size: usize) -> Self {
        self.queue_size = size.max(1);
        self
    }

    pub fn with_sweeper_period(mut self, period: Duration) -> Self {
        self.sweeper_period = period;
        self
    }

    pub fn with_generator_period(mut self, period: Duration) -> Self {
        self.generator_period = period;
        self
    }

    pub fn with_cron_period(mut self, period: Duration) -> Self {
        self.cron_period = period;
        self
    }

    pub fn with_retention(mut self, period: Duration, age: Duration) -> Self {
        self.retention = true;
        self.retention_period = period;
        self.retention_age = age;
        self
    }

    pub fn with_executor_reregister(mut self, allow: bool) -> Self {
        self.allow_executor_reregister = allow;
        self
    }
}
