//! Property-based tests for the Failover Buffer (spec §8 "Testable
//! Properties" — quantified invariants and Laws).

pub mod buffer_laws;
