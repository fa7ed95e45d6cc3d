//! `GatewayConfig` (spec §6 "Configuration (enumerated)").
//!
//! A plain value constructed once at startup and threaded through every
//! constructor — spec §9 "Global mutable state" rejects the source's
//! process-global configuration in favor of this. Built either
//! programmatically via [`GatewayConfigBuilder`] or, for the
//! `tablet-gatewayd` binary, by deserializing [`GatewayConfigRaw`] from a
//! layered TOML + env + CLI source and converting it.

use gateway_core::{GatewayError, Role};
use std::str::FromStr;
use std::time::Duration;

/// Fully validated, typed gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub cells_to_watch: Vec<String>,
    /// The gateway's own cell, used for `cell_affinity_shuffle` (spec
    /// §4.5 step 4). Not itself a spec §6 field; defaults to the first
    /// entry of `cells_to_watch` when unset.
    pub local_cell: String,
    pub gateway_retry_count: usize,
    pub gateway_route_replica_to_rdonly: bool,
    pub allowed_tablet_types: Vec<Role>,
    /// `(keyspace, shard)` narrowing filter. Mutually exclusive with
    /// `keyspaces_to_watch`.
    pub tablet_filters: Vec<(String, String)>,
    pub keyspaces_to_watch: Vec<String>,
    pub refresh_interval: Duration,
    pub refresh_known_tablets: bool,
    pub topo_read_concurrency: usize,
    pub buffer_enabled: bool,
    pub buffer_size_per_shard: usize,
    /// Ambient addition: the global cap `FailoverBufferConfig` also
    /// requires (spec §8 invariant 3), not itself enumerated in spec §6.
    pub max_total_buffered: usize,
    pub buffer_max_failover_duration: Duration,
    /// Ambient addition used by `gateway-cache`'s healthy/unhealthy cutoff
    /// (spec §4.3); not in spec §6's enumerated list.
    pub lag_threshold_seconds: f64,
    /// Ambient addition: the deadline `wait_for_tablets` waits before
    /// surfacing the still-unsatisfied targets.
    pub wait_for_tablets_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            cells_to_watch: Vec::new(),
            local_cell: String::new(),
            gateway_retry_count: 2,
            gateway_route_replica_to_rdonly: false,
            allowed_tablet_types: Vec::new(),
            tablet_filters: Vec::new(),
            keyspaces_to_watch: Vec::new(),
            refresh_interval: Duration::from_secs(60),
            refresh_known_tablets: false,
            topo_read_concurrency: 32,
            buffer_enabled: true,
            buffer_size_per_shard: 10,
            max_total_buffered: 1000,
            buffer_max_failover_duration: Duration::from_secs(20),
            lag_threshold_seconds: 30.0,
            wait_for_tablets_timeout: Duration::from_secs(30),
        }
    }
}

impl GatewayConfig {
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder::default()
    }
}

/// Builder for [`GatewayConfig`], following the usual `*ConfigBuilder`
/// convention used across this workspace's config types.
#[derive(Default)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn cells_to_watch(mut self, cells: impl IntoIterator<Item = String>) -> Self {
        self.config.cells_to_watch = cells.into_iter().filter(|c| !c.is_empty()).collect();
        self
    }

    pub fn local_cell(mut self, cell: impl Into<String>) -> Self {
        self.config.local_cell = cell.into();
        self
    }

    /// Default: 2.
    pub fn gateway_retry_count(mut self, count: usize) -> Self {
        self.config.gateway_retry_count = count;
        self
    }

    /// Default: false.
    pub fn gateway_route_replica_to_rdonly(mut self, enabled: bool) -> Self {
        self.config.gateway_route_replica_to_rdonly = enabled;
        self
    }

    /// Default: empty (all roles allowed).
    pub fn allowed_tablet_types(mut self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.config.allowed_tablet_types = roles.into_iter().collect();
        self
    }

    pub fn tablet_filters(mut self, filters: impl IntoIterator<Item = (String, String)>) -> Self {
        self.config.tablet_filters = filters.into_iter().collect();
        self
    }

    pub fn keyspaces_to_watch(mut self, keyspaces: impl IntoIterator<Item = String>) -> Self {
        self.config.keyspaces_to_watch = keyspaces.into_iter().collect();
        self
    }

    /// Default: 60 seconds.
    pub fn refresh_interval(mut self, interval: Duration) -> Self {
        self.config.refresh_interval = interval;
        self
    }

    /// Default: false.
    pub fn refresh_known_tablets(mut self, refresh_known: bool) -> Self {
        self.config.refresh_known_tablets = refresh_known;
        self
    }

    /// Default: 32.
    pub fn topo_read_concurrency(mut self, concurrency: usize) -> Self {
        self.config.topo_read_concurrency = concurrency;
        self
    }

    /// Default: true.
    pub fn buffer_enabled(mut self, enabled: bool) -> Self {
        self.config.buffer_enabled = enabled;
        self
    }

    /// Default: 10.
    pub fn buffer_size_per_shard(mut self, size: usize) -> Self {
        self.config.buffer_size_per_shard = size;
        self
    }

    /// Default: 1000.
    pub fn max_total_buffered(mut self, size: usize) -> Self {
        self.config.max_total_buffered = size;
        self
    }

    /// Default: 20 seconds.
    pub fn buffer_max_failover_duration(mut self, duration: Duration) -> Self {
        self.config.buffer_max_failover_duration = duration;
        self
    }

    /// Default: 30.0 seconds.
    pub fn lag_threshold_seconds(mut self, seconds: f64) -> Self {
        self.config.lag_threshold_seconds = seconds;
        self
    }

    /// Default: 30 seconds.
    pub fn wait_for_tablets_timeout(mut self, timeout: Duration) -> Self {
        self.config.wait_for_tablets_timeout = timeout;
        self
    }

    /// Validate and finalize. `tablet_filters` and `keyspaces_to_watch`
    /// being simultaneously non-empty is a fatal config error (spec §9
    /// "Open questions" — "retain that").
    pub fn build(self) -> Result<GatewayConfig, GatewayError> {
        let mut config = self.config;
        if !config.tablet_filters.is_empty() && !config.keyspaces_to_watch.is_empty() {
            return Err(GatewayError::ConfigInvalid {
                reason: "tablet_filters and keyspaces_to_watch are mutually exclusive".into(),
            });
        }
        if config.local_cell.is_empty() {
            config.local_cell = config.cells_to_watch.first().cloned().unwrap_or_default();
        }
        Ok(config)
    }
}

/// The on-disk/env/CLI shape of [`GatewayConfig`]: everything is a string
/// or primitive so `serde` can deserialize it directly, matching the
/// `config` crate's layered TOML + env + CLI loading (ambient CLI
/// surface, `tablet-gatewayd` binary only).
#[derive(Debug, Clone, Default, serde::Deserialize)]
#[serde(default)]
pub struct GatewayConfigRaw {
    pub cells_to_watch: Vec<String>,
    pub local_cell: String,
    pub gateway_retry_count: Option<usize>,
    pub gateway_route_replica_to_rdonly: Option<bool>,
    pub allowed_tablet_types: Vec<String>,
    /// Each entry is `"keyspace/shard"`.
    pub tablet_filters: Vec<String>,
    pub keyspaces_to_watch: Vec<String>,
    pub refresh_interval_secs: Option<u64>,
    pub refresh_known_tablets: Option<bool>,
    pub topo_read_concurrency: Option<usize>,
    pub buffer_enabled: Option<bool>,
    pub buffer_size_per_shard: Option<usize>,
    pub max_total_buffered: Option<usize>,
    pub buffer_max_failover_duration_secs: Option<u64>,
    pub lag_threshold_seconds: Option<f64>,
    pub wait_for_tablets_timeout_secs: Option<u64>,
}

impl GatewayConfigRaw {
    pub fn into_config(self) -> Result<GatewayConfig, GatewayError> {
        let default = GatewayConfig::default();
        let allowed_tablet_types = self
            .allowed_tablet_types
            .iter()
            .map(|s| Role::from_str(s))
            .collect::<Result<Vec<Role>, GatewayError>>()?;
        let tablet_filters = self
            .tablet_filters
            .iter()
            .map(|entry| {
                entry
                    .split_once('/')
                    .map(|(keyspace, shard)| (keyspace.to_string(), shard.to_string()))
                    .ok_or_else(|| GatewayError::ConfigInvalid {
                        reason: format!("malformed tablet_filters entry {entry:?}, expected keyspace/shard"),
                    })
            })
            .collect::<Result<Vec<_>, GatewayError>>()?;

        let mut builder = GatewayConfig::builder()
            .cells_to_watch(self.cells_to_watch)
            .local_cell(self.local_cell)
            .gateway_retry_count(self.gateway_retry_count.unwrap_or(default.gateway_retry_count))
            .gateway_route_replica_to_rdonly(
                self.gateway_route_replica_to_rdonly
                    .unwrap_or(default.gateway_route_replica_to_rdonly),
            )
            .allowed_tablet_types(allowed_tablet_types)
            .tablet_filters(tablet_filters)
            .keyspaces_to_watch(self.keyspaces_to_watch)
            .refresh_interval(Duration::from_secs(
                self.refresh_interval_secs
                    .unwrap_or(default.refresh_interval.as_secs()),
            ))
            .refresh_known_tablets(
                self.refresh_known_tablets
                    .unwrap_or(default.refresh_known_tablets),
            )
            .topo_read_concurrency(
                self.topo_read_concurrency
                    .unwrap_or(default.topo_read_concurrency),
            )
            .buffer_enabled(self.buffer_enabled.unwrap_or(default.buffer_enabled))
            .buffer_size_per_shard(
                self.buffer_size_per_shard
                    .unwrap_or(default.buffer_size_per_shard),
            )
            .max_total_buffered(self.max_total_buffered.unwrap_or(default.max_total_buffered))
            .buffer_max_failover_duration(Duration::from_secs(
                self.buffer_max_failover_duration_secs
                    .unwrap_or(default.buffer_max_failover_duration.as_secs()),
            ))
            .lag_threshold_seconds(
                self.lag_threshold_seconds
                    .unwrap_or(default.lag_threshold_seconds),
            );
        builder = builder.wait_for_tablets_timeout(Duration::from_secs(
            self.wait_for_tablets_timeout_secs
                .unwrap_or(default.wait_for_tablets_timeout.as_secs()),
        ));
        builder.build()
    }
}
