//! Run report: one entry per table plus run-level notes.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde_json::json;

use crate::error::SyncError;
use crate::resolver::ForeignKeyEdge;
use crate::table::Table;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    Copied,
    Skipped(String),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableReport {
    pub table: Table,
    pub rows_copied: u64,
    pub status: TableStatus,
}

impl TableReport {
    pub fn copied(table: Table, rows_copied: u64) -> Self {
        Self {
            table,
            rows_copied,
            status: TableStatus::Copied,
        }
    }

    pub fn skipped(table: Table, reason: impl Into<String>) -> Self {
        Self {
            table,
            rows_copied: 0,
            status: TableStatus::Skipped(reason.into()),
        }
    }

    pub fn failed(table: Table, error: impl Into<String>) -> Self {
        Self {
            table,
            rows_copied: 0,
            status: TableStatus::Failed(error.into()),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, TableStatus::Skipped(_))
    }

    pub fn error(&self) -> Option<&str> {
        match &self.status {
            TableStatus::Failed(e) => Some(e),
            _ => None,
        }
    }

    fn outcome(&self) -> String {
        match &self.status {
            TableStatus::Copied => "copied".to_string(),
            TableStatus::Skipped(reason) => format!("skipped: {reason}"),
            TableStatus::Failed(error) => format!("error: {error}"),
        }
    }
}

/// Appended to as tables complete, then frozen by [`RunReport::finish`].
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    tables: Vec<TableReport>,
    dropped_edges: Vec<ForeignKeyEdge>,
    reset_failures: Vec<(Table, String)>,
    sequence_issues: Vec<(String, String)>,
    sequences_realigned: usize,
    elapsed: Option<Duration>,
    cancelled: bool,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entry: TableReport) {
        debug_assert!(!self.is_finished(), "report is frozen after finish");
        self.tables.push(entry);
    }

    pub fn set_dropped_edges(&mut self, edges: Vec<ForeignKeyEdge>) {
        self.dropped_edges = edges;
    }

    pub fn set_reset_failures(&mut self, failures: Vec<(Table, String)>) {
        self.reset_failures = failures;
    }

    pub fn set_sequences(&mut self, realigned: usize, issues: Vec<(String, String)>) {
        self.sequences_realigned = realigned;
        self.sequence_issues = issues;
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn finish(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed.is_some()
    }

    pub fn tables(&self) -> &[TableReport] {
        &self.tables
    }

    pub fn get(&self, table: &Table) -> Option<&TableReport> {
        self.tables.iter().find(|t| &t.table == table)
    }

    pub fn dropped_edges(&self) -> &[ForeignKeyEdge] {
        &self.dropped_edges
    }

    pub fn reset_failures(&self) -> &[(Table, String)] {
        &self.reset_failures
    }

    pub fn sequence_issues(&self) -> &[(String, String)] {
        &self.sequence_issues
    }

    pub fn sequences_realigned(&self) -> usize {
        self.sequences_realigned
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn total_rows(&self) -> u64 {
        self.tables.iter().map(|t| t.rows_copied).sum()
    }

    pub fn copied_count(&self) -> usize {
        self.tables
            .iter()
            .filter(|t| t.status == TableStatus::Copied)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.tables.iter().filter(|t| t.is_skipped()).count()
    }

    pub fn failed_count(&self) -> usize {
        self.tables.iter().filter(|t| t.error().is_some()).count()
    }

    pub fn has_errors(&self) -> bool {
        self.failed_count() > 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        let tables: Vec<_> = self
            .tables
            .iter()
            .map(|t| {
                let skip_reason = match &t.status {
                    TableStatus::Skipped(reason) => Some(reason.as_str()),
                    _ => None,
                };
                json!({
                    "table": t.table.to_string(),
                    "rows_copied": t.rows_copied,
                    "skipped": t.is_skipped(),
                    "skip_reason": skip_reason,
                    "error": t.error(),
                })
            })
            .collect();
        json!({
            "tables": tables,
            "totals": {
                "tables": self.tables.len(),
                "copied": self.copied_count(),
                "skipped": self.skipped_count(),
                "failed": self.failed_count(),
                "rows": self.total_rows(),
            },
            "dropped_edges": self.dropped_edges.iter().map(ToString::to_string).collect::<Vec<_>>(),
            "reset_failures": self.reset_failures.iter()
                .map(|(t, e)| json!({ "table": t.to_string(), "error": e }))
                .collect::<Vec<_>>(),
            "sequences_realigned": self.sequences_realigned,
            "sequence_issues": self.sequence_issues.iter()
                .map(|(s, e)| json!({ "sequence": s, "reason": e }))
                .collect::<Vec<_>>(),
            "cancelled": self.cancelled,
            "elapsed_ms": self.elapsed.map(|d| d.as_millis() as u64),
        })
    }

    pub fn write_json(&self, path: &Path) -> Result<(), SyncError> {
        let body = serde_json::to_string_pretty(&self.to_json())?;
        std::fs::write(path, body)?;
        Ok(())
    }

    pub fn status_line(&self) -> String {
        let state = if self.cancelled {
            "CANCELLED"
        } else if self.has_errors() {
            "COMPLETED WITH ERRORS"
        } else {
            "OK"
        };
        let mut line = format!(
            "{state}: {} tables, {} copied, {} skipped, {} failed, {} rows",
            self.tables.len(),
            self.copied_count(),
            self.skipped_count(),
            self.failed_count(),
            self.total_rows()
        );
        if let Some(elapsed) = self.elapsed {
            line.push_str(&format!(" in {:.1}s", elapsed.as_secs_f64()));
        }
        line
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let width = self
            .tables
            .iter()
            .map(|t| t.table.to_string().len())
            .max()
            .unwrap_or(0)
            .max("TABLE".len());
        writeln!(f, "{:<width$}  {:>10}  RESULT", "TABLE", "ROWS")?;
        for entry in &self.tables {
            writeln!(
                f,
                "{:<width$}  {:>10}  {}",
                entry.table.to_string(),
                entry.rows_copied,
                entry.outcome()
            )?;
        }
        if !self.dropped_edges.is_empty() {
            writeln!(f)?;
            writeln!(f, "Foreign keys ignored for ordering (cycle):")?;
            for edge in &self.dropped_edges {
                writeln!(f, "  {edge}")?;
            }
        }
        if !self.reset_failures.is_empty() {
            writeln!(f)?;
            writeln!(f, "Tables not truncated:")?;
            for (table, error) in &self.reset_failures {
                writeln!(f, "  {table}: {error}")?;
            }
        }
        if !self.sequence_issues.is_empty() {
            writeln!(f)?;
            writeln!(f, "Sequences not realigned:")?;
            for (sequence, reason) in &self.sequence_issues {
                writeln!(f, "  {sequence}: {reason}")?;
            }
        }
        writeln!(f)?;
        write!(f, "{}", self.status_line())
    }
}
