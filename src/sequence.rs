//! Moves sequences past the ids copied into the target.

use std::collections::HashMap;

use postgres::GenericClient;
use tracing::{debug, info, warn};

use crate::error::{SyncError, error_chain};
use crate::introspect::Introspector;
use crate::table::{Table, quote_ident};

/// The column a sequence feeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceOwner {
    pub sequence: String,
    pub table: Table,
    pub column: String,
}

#[derive(Debug, Clone, Default)]
pub struct RealignOutcome {
    /// Each realigned owner with the value the sequence was set to
    pub realigned: Vec<(SequenceOwner, i64)>,
    /// Sequences left untouched, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Finds the owner of `sequence` from the `<table>_<column>_seq` naming
/// convention. When several splits match, the longest table name wins.
pub fn match_owner(
    sequence: &str,
    schema: &str,
    columns: &HashMap<Table, Vec<String>>,
) -> Option<SequenceOwner> {
    let stem = sequence.strip_suffix("_seq")?;
    columns
        .iter()
        .filter(|(table, _)| table.schema == schema)
        .flat_map(|(table, cols)| cols.iter().map(move |col| (table, col)))
        .filter(|(table, col)| stem == format!("{}_{}", table.name, col))
        .max_by_key(|(table, _)| table.name.len())
        .map(|(table, col)| SequenceOwner {
            sequence: sequence.to_string(),
            table: table.clone(),
            column: col.clone(),
        })
}

/// `setval` so that the next value is `max(column) + 1`, or the sequence
/// minimum when the table is empty.
pub fn setval_sql(owner: &SequenceOwner) -> String {
    let column = quote_ident(&owner.column);
    format!(
        "SELECT setval($1::text::regclass, \
         COALESCE(MAX({column})::bigint, (SELECT min_value FROM pg_sequences WHERE schemaname = $2 AND sequencename = $3)), \
         MAX({column}) IS NOT NULL) \
         FROM {table}",
        table = owner.table.qualified()
    )
}

pub struct SequenceRealigner {
    introspector: Introspector,
}

impl SequenceRealigner {
    pub fn new(introspector: Introspector) -> Self {
        Self { introspector }
    }

    /// Realigns every sequence in the schema. Sequences that cannot be
    /// matched or set are logged and skipped; only catalog failures error.
    pub fn realign<C: GenericClient>(&self, target: &mut C) -> Result<RealignOutcome, SyncError> {
        let schema = self.introspector.schema();
        let sequences = self.introspector.list_sequences(target)?;
        let columns = self.introspector.list_columns(target)?;
        let mut outcome = RealignOutcome::default();

        for sequence in sequences {
            let Some(owner) = match_owner(&sequence, schema, &columns) else {
                warn!(sequence = %sequence, "No owning table found for sequence, skipping");
                outcome
                    .skipped
                    .push((sequence, "no owning table/column".to_string()));
                continue;
            };
            let qualified_seq = format!("{}.{}", quote_ident(schema), quote_ident(&sequence));
            match target.query_one(
                setval_sql(&owner).as_str(),
                &[&qualified_seq, &schema, &sequence],
            ) {
                Ok(row) => {
                    let value: i64 = row.get(0);
                    debug!(sequence = %sequence, table = %owner.table, value, "Sequence realigned");
                    outcome.realigned.push((owner, value));
                }
                Err(e) => {
                    let message = error_chain(&e);
                    warn!(sequence = %sequence, error = %message, "Could not realign sequence");
                    outcome.skipped.push((sequence, message));
                }
            }
        }

        info!(
            realigned = outcome.realigned.len(),
            skipped = outcome.skipped.len(),
            "Sequences realigned"
        );
        Ok(outcome)
    }
}
