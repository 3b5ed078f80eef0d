//! Main library entry point for pg-env-sync.
//!
//! Copies every table of a PostgreSQL schema from a source environment into a
//! target environment: introspect, reset, copy in foreign-key order, then
//! realign sequences.

pub mod args;
pub mod column_map;
pub mod config;
pub mod connection;
pub mod copier;
pub mod error;
pub mod introspect;
pub mod orchestrator;
pub mod report;
pub mod reset;
pub mod resolver;
pub mod sequence;
pub mod serializer;
pub mod table;

// Re-export key types for ergonomic access

pub use self::table::*;
pub use config::{SafetyCheck, SyncConfig};
pub use connection::ConnectionManager;
pub use copier::{BatchedCopy, CopyStats, TableCopy};
pub use error::{Role, SyncError};
pub use introspect::{Introspector, SchemaSnapshot};
pub use orchestrator::{SyncOrchestrator, SyncPlan, SyncState};
pub use report::{RunReport, TableReport, TableStatus};
pub use resolver::{DependencyGraph, ForeignKeyEdge, OrderResult};
pub use sequence::SequenceRealigner;

use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Connects, runs one sync and returns its report. `cancel` is honoured
/// between tables.
pub fn run_sync(config: SyncConfig, cancel: Option<Arc<AtomicBool>>) -> Result<RunReport, SyncError> {
    config.validate()?;
    let connections = ConnectionManager::connect(&config)?;
    let mut orchestrator = SyncOrchestrator::new(config, connections);
    if let Some(cancel) = cancel {
        orchestrator = orchestrator.with_cancel(cancel);
    }
    orchestrator.run()
}
