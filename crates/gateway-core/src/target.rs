//! The routing key and tablet identity types (spec §3 "Data Model").

use std::fmt;

/// A tablet's role within its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum Role {
    /// Accepts writes.
    Primary,
    /// Serves reads with replication lag.
    Replica,
    /// Serves offline/analytical reads.
    ReadOnly,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Role::Primary => "PRIMARY",
            Role::Replica => "REPLICA",
            Role::ReadOnly => "READ_ONLY",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Role {
    type Err = crate::GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PRIMARY" => Ok(Role::Primary),
            "REPLICA" => Ok(Role::Replica),
            "READ_ONLY" => Ok(Role::ReadOnly),
            other => Err(crate::GatewayError::ConfigInvalid {
                reason: format!("unknown tablet role {other:?}"),
            }),
        }
    }
}

/// The routing key a planner hands the gateway: `(keyspace, shard, role)`.
///
/// Immutable for the lifetime of a request (spec §3).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    pub keyspace: String,
    pub shard: String,
    pub role: Role,
}

impl Target {
    pub fn new(keyspace: impl Into<String>, shard: impl Into<String>, role: Role) -> Self {
        Self {
            keyspace: keyspace.into(),
            shard: shard.into(),
            role,
        }
    }

    /// The `(keyspace, shard)` pair, ignoring role — used by the failover
    /// buffer, which buffers per-shard rather than per-target.
    pub fn shard_key(&self) -> (&str, &str) {
        (&self.keyspace, &self.shard)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.keyspace, self.shard, self.role)
    }
}

/// Identifies a tablet: `(cell, uid)` (spec §3 "Tablet Record").
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TabletAlias {
    pub cell: String,
    pub uid: u32,
}

impl TabletAlias {
    pub fn new(cell: impl Into<String>, uid: u32) -> Self {
        Self {
            cell: cell.into(),
            uid,
        }
    }
}

impl fmt::Display for TabletAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.cell, self.uid)
    }
}

/// An optional key-range carried by a sharded tablet record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyRange {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

/// A tablet as known to the topology server (spec §3 "Tablet Record").
///
/// Mutable only via the topology watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletRecord {
    pub alias: TabletAlias,
    pub hostname: String,
    pub port: u16,
    pub keyspace: String,
    pub shard: String,
    pub role: Role,
    pub key_range: Option<KeyRange>,
}

impl TabletRecord {
    pub fn target(&self) -> Target {
        Target::new(self.keyspace.clone(), self.shard.clone(), self.role)
    }
}

/// A shard's metadata as known to the topology server, namely its current
/// primary election (spec §6 `get_shard`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardRecord {
    pub keyspace: String,
    pub shard: String,
    pub primary_alias: Option<TabletAlias>,
}
