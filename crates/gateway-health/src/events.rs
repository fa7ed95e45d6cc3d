use crate::HealthEntry;
use gateway_core::events::GatewayEvent;
use gateway_core::TabletRecord;
use std::time::Instant;

/// Published by the Health Check module towards the Stats Cache and the
/// Failover Buffer (spec §4.2, §9 — the cycle is broken by routing both
/// through this one listener rather than either depending on the other).
#[derive(Debug, Clone)]
pub enum HealthEvent {
    /// A health message arrived and the entry was updated. Carries the
    /// full tablet record (so a listener can recompute its `Target`
    /// without a topology lookup) plus the delta.
    Health {
        record: TabletRecord,
        old: Option<HealthEntry>,
        new: HealthEntry,
        timestamp: Instant,
    },
    /// The subscription reported `serving: false`, died, or the tablet
    /// was removed. Only delivered when the table's listener was
    /// installed with `send_down_events = true`.
    Down {
        record: TabletRecord,
        last: Option<HealthEntry>,
        timestamp: Instant,
    },
}

impl GatewayEvent for HealthEvent {
    fn event_type(&self) -> &'static str {
        match self {
            HealthEvent::Health { .. } => "health_update",
            HealthEvent::Down { .. } => "health_down",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            HealthEvent::Health { timestamp, .. } | HealthEvent::Down { timestamp, .. } => {
                *timestamp
            }
        }
    }
}
