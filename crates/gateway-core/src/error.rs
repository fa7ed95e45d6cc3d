//! Unified error type for the gateway (spec §7 "Error Handling Design").

use crate::Target;
use std::time::Duration;

/// Errors surfaced by the gateway's core components.
///
/// Each variant corresponds to one of the error *kinds* spec §7 names —
/// these are kinds, not wire codes, so callers match on the variant rather
/// than an integer status.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GatewayError {
    /// Mutually exclusive config options supplied, or an unknown role.
    /// Fatal at startup.
    #[error("invalid gateway configuration: {reason}")]
    ConfigInvalid { reason: String },

    /// The stats cache has no healthy tablet for this target. Never
    /// retried internally.
    #[error("no healthy tablet for {target}")]
    NoHealthyTablet { target: Target },

    /// A connection was missing, or dialing the tablet failed, during
    /// selection. The retry loop marks the tablet invalid and tries the
    /// next one.
    #[error("tablet {alias} unreachable: {reason}")]
    TabletUnreachable { alias: String, reason: String },

    /// The caller's action surfaced a terminal error, wrapped with target
    /// metadata before return (spec §7 "Propagation").
    #[error("query failed against {target}: {source}")]
    ActionFatal {
        target: Target,
        #[source]
        source: Box<GatewayError>,
    },

    /// Buffer admission refused because capacity is exhausted. The caller
    /// must not retry.
    #[error("failover buffer full for shard {keyspace}/{shard}")]
    BufferFull { keyspace: String, shard: String },

    /// Buffer admission refused because the gateway is shutting down.
    #[error("failover buffer is shut down")]
    BufferShutdown,

    /// The buffer window expired with no new primary observed; surfaced as
    /// the last-seen primary error.
    #[error("failover timed out after {waited:?} for shard {keyspace}/{shard}: {last_error}")]
    FailoverTimeout {
        keyspace: String,
        shard: String,
        waited: Duration,
        last_error: String,
    },

    /// `allowed_tablet_types` excludes the requested target's role.
    #[error("role {role} excluded by allowed_tablet_types")]
    RoleNotAllowed { role: String },

    /// A caller-supplied action reported a terminal (application) error
    /// that carries no further gateway context.
    #[error("{0}")]
    Application(String),
}

impl GatewayError {
    /// Wrap this error with target metadata, per spec §7 "Propagation".
    pub fn with_target(self, target: Target) -> Self {
        GatewayError::ActionFatal {
            target,
            source: Box::new(self),
        }
    }

    pub fn is_no_healthy_tablet(&self) -> bool {
        matches!(self, GatewayError::NoHealthyTablet { .. })
    }

    pub fn is_buffer_full(&self) -> bool {
        matches!(self, GatewayError::BufferFull { .. })
    }

    pub fn is_failover_timeout(&self) -> bool {
        matches!(self, GatewayError::FailoverTimeout { .. })
    }
}
