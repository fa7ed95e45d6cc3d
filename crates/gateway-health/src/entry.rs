use gateway_core::Role;
use std::time::Instant;

/// Last known health state reported by a tablet's streaming subscription.
///
/// `declared_role` is the role the tablet itself reports, which the
/// gateway trusts over the topology record's role during the brief
/// windows where the two disagree (spec §3, §9).
#[derive(Debug, Clone)]
pub struct HealthEntry {
    pub serving: bool,
    pub declared_role: Role,
    pub replication_lag_seconds: f64,
    pub last_error: Option<String>,
    pub last_update: Instant,
}
