use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use tracing::{error, info, info_span, warn};

use crate::config::{SafetyCheck, SyncConfig};
use crate::connection::ConnectionManager;
use crate::copier::{BatchedCopy, TableCopy};
use crate::error::{Role, SyncError, error_chain};
use crate::introspect::Introspector;
use crate::report::{RunReport, TableReport};
use crate::reset::reset;
use crate::resolver::{DependencyGraph, OrderResult};
use crate::sequence::SequenceRealigner;
use crate::table::Table;

/// Phases of one run. `Done` and `Aborted` are terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    Idle,
    Introspecting,
    Resetting,
    Copying { index: usize, table: Table },
    Realigning,
    Done,
    Aborted(String),
}

impl SyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SyncState::Done | SyncState::Aborted(_))
    }

    /// Whether moving from `self` to `next` is a legal transition.
    pub fn can_advance_to(&self, next: &SyncState) -> bool {
        use SyncState::*;
        match (self, next) {
            (Idle, Introspecting) => true,
            // Safety check failure happens right before the reset starts.
            (Introspecting, Resetting | Done | Aborted(_)) => true,
            (Resetting, Copying { index: 0, .. } | Realigning) => true,
            (Copying { index: i, .. }, Copying { index: j, .. }) => *j == i + 1,
            (Copying { .. }, Realigning) => true,
            (Realigning, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Introspecting => write!(f, "introspecting"),
            SyncState::Resetting => write!(f, "resetting"),
            SyncState::Copying { index, table } => write!(f, "copying #{index} {table}"),
            SyncState::Realigning => write!(f, "realigning"),
            SyncState::Done => write!(f, "done"),
            SyncState::Aborted(reason) => write!(f, "aborted: {reason}"),
        }
    }
}

/// The introspected, ordered work list.
#[derive(Debug, Clone)]
pub struct SyncPlan {
    pub order: OrderResult,
    /// Tables in copy order that the run will touch
    pub tables: Vec<Table>,
    /// Target tables left out by configuration
    pub excluded: Vec<Table>,
    /// Target tables that do not exist in the source
    pub missing_in_source: Vec<Table>,
}

pub struct SyncOrchestrator {
    config: SyncConfig,
    connections: ConnectionManager,
    copier: Box<dyn TableCopy>,
    cancel: Arc<AtomicBool>,
    state: SyncState,
    history: Vec<SyncState>,
}

impl SyncOrchestrator {
    pub fn new(config: SyncConfig, connections: ConnectionManager) -> Self {
        let copier = Box::new(BatchedCopy {
            batch_size: config.batch_size,
        });
        Self {
            config,
            connections,
            copier,
            cancel: Arc::new(AtomicBool::new(false)),
            state: SyncState::Idle,
            history: vec![SyncState::Idle],
        }
    }

    pub fn with_copier(mut self, copier: Box<dyn TableCopy>) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_cancel(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Flag checked before each table; once set no new table is started.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn state(&self) -> &SyncState {
        &self.state
    }

    /// Every state the run passed through, in order.
    pub fn history(&self) -> &[SyncState] {
        &self.history
    }

    fn advance(&mut self, next: SyncState) {
        debug_assert!(
            self.state.can_advance_to(&next),
            "illegal transition {} -> {}",
            self.state,
            next
        );
        info!(from = %self.state, to = %next, "Sync state");
        self.history.push(next.clone());
        self.state = next;
    }

    fn abort(&mut self, err: SyncError) -> SyncError {
        error!(error = %error_chain(&err), "Sync aborted");
        self.advance(SyncState::Aborted(err.to_string()));
        err
    }

    /// Reads the target catalog and resolves the copy order.
    pub fn plan(&self) -> Result<SyncPlan, SyncError> {
        let introspector = Introspector::new(&self.config.schema);
        let snapshot = self
            .connections
            .with_connection(Role::Target, |target| introspector.snapshot(target))?;
        let source_tables = self
            .connections
            .with_connection(Role::Source, |source| introspector.list_tables(source))?;

        let graph = DependencyGraph::build(&snapshot.tables, &snapshot.edges);
        let order = graph.resolve();

        let mut tables = Vec::new();
        let mut excluded = Vec::new();
        let mut missing_in_source = Vec::new();
        for table in &order.order {
            if self.config.is_excluded(table) {
                excluded.push(table.clone());
            } else if !source_tables.contains(table) {
                missing_in_source.push(table.clone());
            } else {
                tables.push(table.clone());
            }
        }
        Ok(SyncPlan {
            order,
            tables,
            excluded,
            missing_in_source,
        })
    }

    /// Runs the whole sync. Errors are fatal; per-table failures land in the
    /// returned report instead.
    pub fn run(&mut self) -> Result<RunReport, SyncError> {
        let run_id = uuid::Uuid::new_v4();
        let span = info_span!("sync", run_id = %run_id.simple(), schema = %self.config.schema);
        let _guard = span.enter();
        let started = Instant::now();

        self.advance(SyncState::Introspecting);
        let plan = match self.config.validate().and_then(|_| self.plan()) {
            Ok(plan) => plan,
            Err(err) => return Err(self.abort(err)),
        };
        info!(
            tables = plan.tables.len(),
            excluded = plan.excluded.len(),
            missing_in_source = plan.missing_in_source.len(),
            "Copy order resolved"
        );

        let mut report = RunReport::new();
        report.set_dropped_edges(plan.order.dropped_edges.clone());
        for table in &plan.excluded {
            report.record(TableReport::skipped(table.clone(), "excluded"));
        }
        for table in &plan.missing_in_source {
            report.record(TableReport::skipped(table.clone(), "not present in source"));
        }

        if self.config.dry_run {
            for table in &plan.tables {
                report.record(TableReport::skipped(table.clone(), "dry run"));
            }
            self.advance(SyncState::Done);
            return Ok(report.finish(started.elapsed()));
        }

        if let Err(err) = SafetyCheck::new(&self.config).verify() {
            return Err(self.abort(err));
        }

        let mut target = match self.connections.target() {
            Ok(target) => target,
            Err(err) => return Err(self.abort(err)),
        };
        self.advance(SyncState::Resetting);
        let mut reset_tables = plan.tables.clone();
        reset_tables.extend(plan.missing_in_source.iter().cloned());
        let outcome = reset(&mut *target, &reset_tables);
        drop(target);
        report.set_reset_failures(outcome.failed);

        for (index, table) in plan.tables.iter().enumerate() {
            if self.cancel.load(Ordering::Relaxed) {
                if !report.was_cancelled() {
                    warn!("Cancellation requested, not starting further tables");
                    report.mark_cancelled();
                }
                report.record(TableReport::skipped(table.clone(), "cancelled"));
                continue;
            }
            self.advance(SyncState::Copying {
                index,
                table: table.clone(),
            });
            report.record(self.copy_table(table));
        }

        self.advance(SyncState::Realigning);
        let realigner = SequenceRealigner::new(Introspector::new(&self.config.schema));
        let realigned = self
            .connections
            .with_connection(Role::Target, |target| realigner.realign(target));
        match realigned {
            Ok(outcome) => report.set_sequences(outcome.realigned.len(), outcome.skipped),
            Err(err) => {
                let message = error_chain(&err);
                warn!(error = %message, "Sequence realignment failed");
                report.set_sequences(0, vec![("*".to_string(), message)]);
            }
        }

        self.advance(SyncState::Done);
        let report = report.finish(started.elapsed());
        info!(status = %report.status_line(), "Sync finished");
        Ok(report)
    }

    /// Copies one table, turning any failure into a report entry.
    fn copy_table(&self, table: &Table) -> TableReport {
        info!(table = %table, "Copying table");
        let result = self.connections.source().and_then(|mut source| {
            let mut target = self.connections.target()?;
            self.copier.copy(table, &mut source, &mut target)
        });
        match result {
            Ok(stats) if stats.source_rows == 0 => {
                info!(table = %table, "Source table is empty");
                TableReport::skipped(table.clone(), "source table is empty")
            }
            Ok(stats) => {
                info!(table = %table, rows = stats.rows_copied, "Table copied");
                TableReport::copied(table.clone(), stats.rows_copied)
            }
            Err(err) => {
                let message = error_chain(&err);
                error!(table = %table, error = %message, "Table copy failed");
                TableReport::failed(table.clone(), message)
            }
        }
    }
}
