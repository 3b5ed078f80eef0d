//! Per-column value handling for the bulk copy.
//!
//! The serializer for each column is picked once per table from the column's
//! type, so the batch loop only dispatches on an enum. Structured values
//! (json/jsonb) are read as their exact text and cast back on insert, so
//! numbers and key order survive untouched. Types without a native binding
//! travel as text the same way.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use itertools::Itertools;
use postgres::types::{Date, Timestamp, ToSql, Type};
use postgres::{Column, Row};

use crate::column_map::ColumnMap;
use crate::error::SyncError;
use crate::table::{Table, quote_ident};

pub type SqlValue = Box<dyn ToSql + Sync>;

/// PostgreSQL's limit on bind parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnSerializer {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Text,
    Bytes,
    Uuid,
    Date,
    Time,
    Timestamp,
    TimestampTz,
    /// json/jsonb, read as text and cast back
    Json,
    /// Anything else, read as `::text` and cast back to the column type
    AsText,
}

impl ColumnSerializer {
    pub fn for_type(ty: &Type) -> Self {
        match *ty {
            Type::BOOL => Self::Bool,
            Type::INT2 => Self::Int2,
            Type::INT4 => Self::Int4,
            Type::INT8 => Self::Int8,
            Type::FLOAT4 => Self::Float4,
            Type::FLOAT8 => Self::Float8,
            Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME => Self::Text,
            Type::BYTEA => Self::Bytes,
            Type::UUID => Self::Uuid,
            Type::DATE => Self::Date,
            Type::TIME => Self::Time,
            Type::TIMESTAMP => Self::Timestamp,
            Type::TIMESTAMPTZ => Self::TimestampTz,
            Type::JSON | Type::JSONB => Self::Json,
            _ => Self::AsText,
        }
    }

    /// Whether the value crosses the wire as text.
    pub fn is_textual(&self) -> bool {
        matches!(self, Self::Json | Self::AsText)
    }

    /// Expression used in the source SELECT list.
    pub fn select_expr(&self, column: &str) -> String {
        match self {
            Self::Json | Self::AsText => format!("{}::text", quote_ident(column)),
            _ => quote_ident(column),
        }
    }

    /// Parameter placeholder for the target INSERT, typed with the source type.
    pub fn placeholder(&self, index: usize, ty: &Type) -> String {
        if self.is_textual() {
            format!("${index}::text::{}", type_name(ty))
        } else {
            format!("${index}::{}", type_name(ty))
        }
    }

    pub fn extract(&self, row: &Row, idx: usize) -> Result<SqlValue, SyncError> {
        let value: SqlValue = match self {
            Self::Bool => Box::new(row.try_get::<_, Option<bool>>(idx)?),
            Self::Int2 => Box::new(row.try_get::<_, Option<i16>>(idx)?),
            Self::Int4 => Box::new(row.try_get::<_, Option<i32>>(idx)?),
            Self::Int8 => Box::new(row.try_get::<_, Option<i64>>(idx)?),
            Self::Float4 => Box::new(row.try_get::<_, Option<f32>>(idx)?),
            Self::Float8 => Box::new(row.try_get::<_, Option<f64>>(idx)?),
            Self::Text | Self::Json | Self::AsText => {
                Box::new(row.try_get::<_, Option<String>>(idx)?)
            }
            Self::Bytes => Box::new(row.try_get::<_, Option<Vec<u8>>>(idx)?),
            Self::Uuid => Box::new(row.try_get::<_, Option<uuid::Uuid>>(idx)?),
            // Date/Timestamp wrappers carry 'infinity' and '-infinity'
            Self::Date => Box::new(row.try_get::<_, Option<Date<NaiveDate>>>(idx)?),
            Self::Time => Box::new(row.try_get::<_, Option<NaiveTime>>(idx)?),
            Self::Timestamp => {
                Box::new(row.try_get::<_, Option<Timestamp<NaiveDateTime>>>(idx)?)
            }
            Self::TimestampTz => {
                Box::new(row.try_get::<_, Option<Timestamp<DateTime<Utc>>>>(idx)?)
            }
        };
        Ok(value)
    }
}

/// Fully qualified, quoted type name usable in a cast.
pub fn type_name(ty: &Type) -> String {
    format!("{}.{}", quote_ident(ty.schema()), quote_ident(ty.name()))
}

#[derive(Debug, Clone)]
struct CopiedColumn {
    name: String,
    ty: Type,
    serializer: ColumnSerializer,
}

/// The serializers for every copied column of one table.
#[derive(Debug, Clone)]
pub struct TableSerializer {
    table: Table,
    columns: Vec<CopiedColumn>,
}

impl TableSerializer {
    pub fn resolve(table: &Table, source_columns: &[Column], map: &ColumnMap) -> Self {
        let columns = source_columns
            .iter()
            .filter(|c| map.is_copied(c.name()))
            .map(|c| CopiedColumn {
                name: c.name().to_string(),
                ty: c.type_().clone(),
                serializer: ColumnSerializer::for_type(c.type_()),
            })
            .collect();
        Self {
            table: table.clone(),
            columns,
        }
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// Largest batch that stays under the bind parameter limit.
    pub fn effective_batch_size(&self, requested: usize) -> usize {
        let per_row = self.columns.len().max(1);
        requested.min(MAX_BIND_PARAMS / per_row).max(1)
    }

    pub fn select_sql(&self) -> String {
        format!(
            "SELECT {} FROM {}",
            self.columns
                .iter()
                .map(|c| c.serializer.select_expr(&c.name))
                .join(", "),
            self.table.qualified()
        )
    }

    /// Multi-row INSERT for `rows` rows.
    pub fn insert_sql(&self, rows: usize) -> String {
        let width = self.columns.len();
        let values = (0..rows)
            .map(|r| {
                let placeholders = self
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(i, c)| c.serializer.placeholder(r * width + i + 1, &c.ty))
                    .join(", ");
                format!("({placeholders})")
            })
            .join(", ");
        format!(
            "INSERT INTO {} ({}) OVERRIDING SYSTEM VALUE VALUES {}",
            self.table.qualified(),
            self.columns.iter().map(|c| quote_ident(&c.name)).join(", "),
            values
        )
    }

    /// Appends the bound values of `row` in column order.
    pub fn bind_row(&self, row: &Row, params: &mut Vec<SqlValue>) -> Result<(), SyncError> {
        for (idx, column) in self.columns.iter().enumerate() {
            params.push(column.serializer.extract(row, idx)?);
        }
        Ok(())
    }
}
