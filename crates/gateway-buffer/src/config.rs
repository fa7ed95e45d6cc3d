use std::time::Duration;

/// Resource budgets for the Failover Buffer (spec §5 "Resource budgets").
#[derive(Debug, Clone)]
pub struct FailoverBufferConfig {
    pub max_buffered_per_shard: usize,
    pub max_total_buffered: usize,
    pub max_failover_duration: Duration,
}

impl Default for FailoverBufferConfig {
    fn default() -> Self {
        Self {
            max_buffered_per_shard: 10,
            max_total_buffered: 1000,
            max_failover_duration: Duration::from_secs(20),
        }
    }
}

#[derive(Default)]
pub struct FailoverBufferConfigBuilder {
    config: FailoverBufferConfig,
}

impl FailoverBufferConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_buffered_per_shard(mut self, max: usize) -> Self {
        self.config.max_buffered_per_shard = max;
        self
    }

    pub fn max_total_buffered(mut self, max: usize) -> Self {
        self.config.max_total_buffered = max;
        self
    }

    pub fn max_failover_duration(mut self, duration: Duration) -> Self {
        self.config.max_failover_duration = duration;
        self
    }

    pub fn build(self) -> FailoverBufferConfig {
        self.config
    }
}
