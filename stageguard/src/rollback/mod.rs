//! Checkpoints, the rollback log, backups and rollback execution.
//!
//! On-disk layout, one directory per pipeline:
//!
//! ```text
//! <base>/<pipeline_id>/checkpoints/<step_id>.json
//! <base>/<pipeline_id>/rollback_log.json
//! <base>/<pipeline_id>/backups/<sequence>-<encoded path>
//! <base>/<pipeline_id>/.lock
//! ```

mod backup;
mod checkpoints;
mod layout;
mod lock;
mod log;
mod manager;
mod plan;
mod report;
mod types;


pub use backup::BackupStore;
pub use checkpoints::CheckpointStore;
pub use layout::{
    PipelineLayout, BACKUPS_DIRNAME, CHECKPOINTS_DIRNAME, LOCK_FILENAME, ROLLBACK_LOG_FILENAME,
};
pub use lock::PipelineLock;
pub use log::RollbackLogStore;
pub use manager::RollbackManager;
pub use plan::{PlanEntry, PlannedAction, RollbackPlan, MANUAL_INTERVENTION_NOTICE};
pub use report::{RevertFailure, RollbackReport};
pub use types::{
    Checkpoint, OperationType, Reversal, RollbackLog, RollbackOperation, LOG_FORMAT_VERSION,
};
