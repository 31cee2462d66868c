//! # Stageguard
//!
//! Checkpoint and rollback support for automated multi-step pipelines.
//!
//! A pipeline executor that mutates a workspace step by step records every
//! mutation in a durable, per-pipeline operation log and marks accepted states
//! with checkpoints. When a later step fails its contract, the executor asks
//! the [`RollbackManager`](rollback::RollbackManager) to undo the log, either
//! completely or back to a checkpoint.
//!
//! The crate provides:
//!
//! - **Rollback log**: append-only, crash-safe record of mutating operations
//! - **Checkpoints**: named markers used as rollback targets
//! - **Backups**: byte-identical copies of files taken before mutation
//! - **Rollback plans**: operator-facing reports that flag manual follow-up
//! - **Contract validators**: JSON schema, template and test-suite checks that
//!   decide whether a rollback is needed
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stageguard::prelude::*;
//!
//! let manager = RollbackManager::new("/var/lib/stageguard");
//! manager.init_rollback_log("run-42")?;
//!
//! let checkpoint = manager.create_checkpoint("run-42", "plan", "/work", HashMap::new())?;
//!
//! let backup = manager.create_backup("run-42", "/work/src/lib.rs")?;
//! std::fs::write("/work/src/lib.rs", new_source)?;
//! manager.log_operation("run-42", RollbackOperation::file_modified("/work/src/lib.rs", backup))?;
//!
//! if validators.validate(&contract, Path::new("/work")).await.is_err() {
//!     println!("{}", manager.get_rollback_plan("run-42")?);
//!     manager.rollback("run-42", Some(&checkpoint))?;
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod config;
pub mod contracts;
pub mod errors;
pub mod events;
pub mod observability;
pub mod rollback;
pub mod testing;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{StoreConfig, ValidatorConfig};
    pub use crate::contracts::{
        ContractDescriptor, ContractKind, ContractValidator, FailureKind, JsonSchemaValidator,
        TemplateValidator, TestSuiteValidator, ValidationFailure, ValidatorRegistry,
    };
    pub use crate::errors::{RollbackError, StageguardError, StoreError};
    pub use crate::events::{CollectingEventSink, Event, EventSink, LoggingEventSink, NoOpEventSink};
    pub use crate::rollback::{
        Checkpoint, OperationType, RollbackLog, RollbackManager, RollbackOperation,
        RollbackPlan, RollbackReport,
    };
    pub use crate::utils::{now_utc, Timestamp};
}
