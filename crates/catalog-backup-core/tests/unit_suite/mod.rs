//! Unit tests for catalog-backup-core.
//!
//! Engine, manager and recovery behavior with scripted sources and the
//! in-memory store.

pub mod backup;
pub mod manager;
