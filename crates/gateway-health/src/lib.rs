//! Streaming per-tablet health checking (spec §4.2).
//!
//! One streaming health subscription per known tablet. Shaped as a
//! generic wrapper holding an `RwLock`-protected table of per-resource
//! state plus a pluggable checker, but driven by a long-lived
//! bidirectional stream per tablet instead of a periodic poll, since
//! spec §4.2 requires push-based delivery, not pull.

mod entry;
mod events;
mod server;
mod table;

pub use entry::HealthEntry;
pub use events::HealthEvent;
pub use server::{HealthMessage, TabletQueryService};
pub use table::HealthCheckTable;
