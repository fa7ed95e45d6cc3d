use gateway_core::{Target, TabletRecord};

/// The Stats Cache's downstream capability, injected rather than held as
/// a compile-time dependency on the Failover Buffer (spec §9 "Cyclic
/// references" — "an interface holding two methods: `stats_update`,
/// `down_event`").
///
/// Only invoked for `PRIMARY`-role targets: that is the only role the
/// Failover Buffer cares about.
pub trait CacheListener: Send + Sync {
    /// The healthy set for a primary target changed (including becoming
    /// non-empty again after a [`down_event`][CacheListener::down_event]).
    fn stats_update(&self, target: &Target, healthy: &[TabletRecord]);

    /// A primary target's healthy set became empty.
    fn down_event(&self, target: &Target);
}
