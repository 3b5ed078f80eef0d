//! Destructive reset of the target tables.

use itertools::Itertools;
use postgres::GenericClient;
use tracing::{info, warn};

use crate::error::error_chain;
use crate::table::Table;

/// What the reset managed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    /// True when the single bulk statement succeeded.
    pub bulk: bool,
    /// Tables that could not be truncated even one at a time.
    pub failed: Vec<(Table, String)>,
}

impl ResetOutcome {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

pub fn truncate_all_statement(tables: &[Table]) -> String {
    format!(
        "TRUNCATE TABLE {} CASCADE",
        tables.iter().map(Table::qualified).join(", ")
    )
}

/// Empties every table in `tables`. Irreversible; callers must run the
/// safety check first.
pub fn reset<C: GenericClient>(target: &mut C, tables: &[Table]) -> ResetOutcome {
    if tables.is_empty() {
        return ResetOutcome {
            bulk: true,
            failed: Vec::new(),
        };
    }

    match target.batch_execute(&truncate_all_statement(tables)) {
        Ok(()) => {
            info!(tables = tables.len(), "Truncated target tables");
            return ResetOutcome {
                bulk: true,
                failed: Vec::new(),
            };
        }
        Err(e) => {
            warn!(error = %error_chain(&e), "Bulk truncate failed, truncating tables one at a time");
        }
    }

    let mut failed = Vec::new();
    for table in tables {
        let stmt = format!("TRUNCATE TABLE {} CASCADE", table.qualified());
        if let Err(e) = target.batch_execute(&stmt) {
            let message = error_chain(&e);
            warn!(table = %table, error = %message, "Could not truncate table");
            failed.push((table.clone(), message));
        }
    }
    ResetOutcome {
        bulk: false,
        failed,
    }
}
