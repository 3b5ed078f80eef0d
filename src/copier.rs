use postgres::types::ToSql;
use postgres::{Client, IsolationLevel};
use tracing::{debug, warn};

use crate::column_map::ColumnMap;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::SyncError;
use crate::serializer::{SqlValue, TableSerializer};
use crate::table::Table;

/// Row counts for one table copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CopyStats {
    /// Rows the source reported before reading
    pub source_rows: u64,
    /// Rows acknowledged by the target
    pub rows_copied: u64,
}

pub trait TableCopy: Send + Sync {
    fn copy(
        &self,
        table: &Table,
        source: &mut Client,
        target: &mut Client,
    ) -> Result<CopyStats, SyncError>;
}

/// Streams a table in fixed-size batches and inserts each batch with one
/// parameterized multi-row INSERT. All batches of a table share one target
/// transaction, so a failed table leaves nothing behind.
pub struct BatchedCopy {
    pub batch_size: usize,
}

impl Default for BatchedCopy {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }
}

impl TableCopy for BatchedCopy {
    fn copy(
        &self,
        table: &Table,
        source: &mut Client,
        target: &mut Client,
    ) -> Result<CopyStats, SyncError> {
        let mut read_tx = source
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()?;
        let source_rows = table.row_count(&mut read_tx)? as u64;
        if source_rows == 0 {
            read_tx.commit()?;
            return Ok(CopyStats::default());
        }

        let probe = format!("SELECT * FROM {}", table.qualified());
        let source_stmt = read_tx.prepare(&probe)?;
        let target_stmt = target.prepare(&probe)?;
        let generated = table.generated_columns(target)?;
        let source_cols: Vec<String> = source_stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        let target_cols: Vec<String> = target_stmt
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .filter(|c| !generated.contains(c))
            .collect();
        let map = ColumnMap::new(&source_cols, &target_cols);
        for col in map.dropped() {
            warn!(table = %table, column = %col, "Column not copied, target has no matching column");
        }
        let serializer = TableSerializer::resolve(table, source_stmt.columns(), &map);
        if serializer.column_count() == 0 {
            return Err(SyncError::NoSharedColumns(table.to_string()));
        }

        let batch_size = serializer.effective_batch_size(self.batch_size);
        let portal = read_tx.bind(serializer.select_sql().as_str(), &[])?;
        let mut write_tx = target.transaction()?;
        let full_batch = write_tx.prepare(&serializer.insert_sql(batch_size))?;

        let mut rows_copied = 0u64;
        let mut batch_no = 0usize;
        loop {
            let rows = read_tx.query_portal(&portal, batch_size as i32)?;
            if rows.is_empty() {
                break;
            }
            let mut params: Vec<SqlValue> =
                Vec::with_capacity(rows.len() * serializer.column_count());
            for row in &rows {
                serializer.bind_row(row, &mut params)?;
            }
            let refs: Vec<&(dyn ToSql + Sync)> = params.iter().map(|p| &**p).collect();
            let inserted = if rows.len() == batch_size {
                write_tx.execute(&full_batch, &refs)?
            } else {
                write_tx.execute(serializer.insert_sql(rows.len()).as_str(), &refs)?
            };
            rows_copied += inserted;
            batch_no += 1;
            debug!(table = %table, batch = batch_no, rows = inserted, "Inserted batch");
            if rows.len() < batch_size {
                break;
            }
        }

        write_tx.commit()?;
        read_tx.commit()?;

        if rows_copied != source_rows {
            warn!(
                table = %table,
                expected = source_rows,
                copied = rows_copied,
                "Row count differs from source count"
            );
        }
        Ok(CopyStats {
            source_rows,
            rows_copied,
        })
    }
}
