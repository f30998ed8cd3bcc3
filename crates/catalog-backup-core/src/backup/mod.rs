//! Backup engine module.

pub mod control;
pub mod engine;
pub mod manager;

pub use control::{
    no_progress, PartialReason, ProgressFn, RunControl, RunOutcome, RunSignal, StopRequest,
};
pub use engine::BackupEngine;
pub use manager::{BackupManager, RunHandle};
