//! Lifecycle events emitted by the rollback manager.
//!
//! Each [`Event`] carries a type such as `"checkpoint.created"`, the pipeline
//! id and a JSON payload.

mod sink;

pub use sink::{CollectingEventSink, Event, EventSink, LoggingEventSink, NoOpEventSink};

/// Event type names emitted by [`RollbackManager`](crate::rollback::RollbackManager).
pub mod event_types {
    /// A checkpoint was persisted.
    pub const CHECKPOINT_CREATED: &str = "checkpoint.created";
    /// A pipeline's persisted state was removed.
    pub const CHECKPOINTS_CLEANED: &str = "checkpoint.cleaned";
    /// A rollback log was created or loaded.
    pub const LOG_INITIALIZED: &str = "rollback.log_initialized";
    /// An operation was appended to the log.
    pub const OPERATION_LOGGED: &str = "rollback.operation_logged";
    /// A file backup was written.
    pub const BACKUP_CREATED: &str = "rollback.backup_created";
    /// A rollback started.
    pub const ROLLBACK_STARTED: &str = "rollback.started";
    /// One operation could not be reverted.
    pub const OPERATION_FAILED: &str = "rollback.operation_failed";
    /// A rollback finished, cleanly or not.
    pub const ROLLBACK_COMPLETED: &str = "rollback.completed";
}
