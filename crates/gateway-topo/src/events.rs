//! Events emitted by the topology watcher towards the Health Check module.

use gateway_core::events::GatewayEvent;
use gateway_core::{TabletAlias, TabletRecord};
use std::time::Instant;

/// One delta produced by a topology refresh (spec §4.1 step 3).
#[derive(Debug, Clone)]
pub enum TopologyEvent {
    /// A newly observed tablet.
    Added {
        cell: String,
        record: TabletRecord,
        timestamp: Instant,
    },
    /// A known tablet whose record fields changed. Logically REMOVE then
    /// ADD; the Health Check may reuse the subscription if the endpoint
    /// (hostname/port) is unchanged.
    Updated {
        cell: String,
        old: TabletRecord,
        new: TabletRecord,
        timestamp: Instant,
    },
    /// A tablet that disappeared from the cell listing.
    Removed {
        cell: String,
        alias: TabletAlias,
        timestamp: Instant,
    },
}

impl GatewayEvent for TopologyEvent {
    fn event_type(&self) -> &'static str {
        match self {
            TopologyEvent::Added { .. } => "topology_tablet_added",
            TopologyEvent::Updated { .. } => "topology_tablet_updated",
            TopologyEvent::Removed { .. } => "topology_tablet_removed",
        }
    }

    fn timestamp(&self) -> Instant {
        match self {
            TopologyEvent::Added { timestamp, .. }
            | TopologyEvent::Updated { timestamp, .. }
            | TopologyEvent::Removed { timestamp, .. } => *timestamp,
        }
    }
}
