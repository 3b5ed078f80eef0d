//! Schema-driven discovery of tables, foreign keys, columns and sequences.

use std::collections::HashMap;

use postgres::GenericClient;
use tracing::debug;

use crate::error::SyncError;
use crate::resolver::ForeignKeyEdge;
use crate::table::Table;

/// Everything the engine needs to know about one schema.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    pub tables: Vec<Table>,
    pub edges: Vec<ForeignKeyEdge>,
}

/// Reads the catalog of a single user schema.
#[derive(Debug, Clone)]
pub struct Introspector {
    schema: String,
}

impl Introspector {
    pub fn new(schema: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// All base tables in the schema, sorted by name.
    pub fn list_tables<C: GenericClient>(&self, client: &mut C) -> Result<Vec<Table>, SyncError> {
        let rows = client
            .query(
                "SELECT table_name::text FROM information_schema.tables
                 WHERE table_schema = $1 AND table_type = 'BASE TABLE'
                 ORDER BY table_name",
                &[&self.schema],
            )
            .map_err(SyncError::Introspection)?;
        Ok(rows
            .iter()
            .map(|row| Table::new(&self.schema, row.get::<_, &str>(0)))
            .collect())
    }

    /// Foreign keys whose both ends live in the schema.
    pub fn list_foreign_keys<C: GenericClient>(
        &self,
        client: &mut C,
    ) -> Result<Vec<ForeignKeyEdge>, SyncError> {
        let rows = client
            .query(
                "SELECT DISTINCT dep.relname::text, ref.relname::text
                 FROM pg_constraint c
                 JOIN pg_class dep ON dep.oid = c.conrelid
                 JOIN pg_namespace dep_ns ON dep_ns.oid = dep.relnamespace
                 JOIN pg_class ref ON ref.oid = c.confrelid
                 JOIN pg_namespace ref_ns ON ref_ns.oid = ref.relnamespace
                 WHERE c.contype = 'f' AND dep_ns.nspname = $1 AND ref_ns.nspname = $1
                 ORDER BY 1, 2",
                &[&self.schema],
            )
            .map_err(SyncError::Introspection)?;
        Ok(rows
            .iter()
            .map(|row| {
                ForeignKeyEdge::new(
                    Table::new(&self.schema, row.get::<_, &str>(0)),
                    Table::new(&self.schema, row.get::<_, &str>(1)),
                )
            })
            .collect())
    }

    pub fn snapshot<C: GenericClient>(&self, client: &mut C) -> Result<SchemaSnapshot, SyncError> {
        let tables = self.list_tables(client)?;
        let edges = self.list_foreign_keys(client)?;
        debug!(
            schema = %self.schema,
            tables = tables.len(),
            foreign_keys = edges.len(),
            "Introspected schema"
        );
        Ok(SchemaSnapshot { tables, edges })
    }

    /// Column names of every table in the schema, in ordinal order.
    pub fn list_columns<C: GenericClient>(
        &self,
        client: &mut C,
    ) -> Result<HashMap<Table, Vec<String>>, SyncError> {
        let rows = client.query(
            "SELECT table_name::text, column_name::text FROM information_schema.columns
             WHERE table_schema = $1
             ORDER BY table_name, ordinal_position",
            &[&self.schema],
        )?;
        let mut columns: HashMap<Table, Vec<String>> = HashMap::new();
        for row in &rows {
            columns
                .entry(Table::new(&self.schema, row.get::<_, &str>(0)))
                .or_default()
                .push(row.get::<_, String>(1));
        }
        Ok(columns)
    }

    /// Names of all sequences in the schema.
    pub fn list_sequences<C: GenericClient>(&self, client: &mut C) -> Result<Vec<String>, SyncError> {
        let rows = client.query(
            "SELECT sequence_name::text FROM information_schema.sequences
             WHERE sequence_schema = $1
             ORDER BY sequence_name",
            &[&self.schema],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
