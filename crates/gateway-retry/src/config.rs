use gateway_core::Role;

/// Tuning knobs for the retry/selection loop (spec §6 "Configuration").
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts beyond the first; spec's `gateway_retry_count`.
    pub retry_count: usize,
    /// Empty means all roles are allowed.
    pub allowed_tablet_types: Vec<Role>,
    /// If true, a `REPLICA` target also considers `READ_ONLY` tablets.
    pub replica_routes_to_readonly: bool,
    /// Spec's `buffer_enabled`. When false, primary requests never wait on
    /// the Failover Buffer; a retryable primary error is retried
    /// immediately against the next candidate instead.
    pub buffer_enabled: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            retry_count: 2,
            allowed_tablet_types: Vec::new(),
            replica_routes_to_readonly: false,
            buffer_enabled: true,
        }
    }
}

impl RetryConfig {
    pub fn role_allowed(&self, role: Role) -> bool {
        self.allowed_tablet_types.is_empty() || self.allowed_tablet_types.contains(&role)
    }
}
