use postgres::GenericClient;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_SCHEMA: &str = "public";

/// A user table inside the synced schema.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Table {
    pub schema: String,
    pub name: String,
}

impl FromStr for Table {
    type Err = std::convert::Infallible;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some((schema, name)) = s.split_once('.') {
            Ok(Table {
                schema: schema.to_string(),
                name: name.to_string(),
            })
        } else {
            Ok(Table {
                schema: DEFAULT_SCHEMA.to_string(),
                name: s.to_string(),
            })
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.schema == DEFAULT_SCHEMA {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.schema, self.name)
        }
    }
}

/// Quotes an identifier so mixed-case and reserved names survive.
pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

impl Table {
    pub fn new(schema: &str, name: &str) -> Self {
        Table {
            schema: schema.to_string(),
            name: name.to_string(),
        }
    }

    /// Schema-qualified, quoted name for use in SQL text.
    pub fn qualified(&self) -> String {
        format!("{}.{}", quote_ident(&self.schema), quote_ident(&self.name))
    }

    pub fn row_count<C: GenericClient>(&self, client: &mut C) -> Result<i64, postgres::Error> {
        let row = client.query_one(&format!("SELECT COUNT(*) FROM {}", self.qualified()), &[])?;
        Ok(row.get(0))
    }

    /// Columns the target computes itself and that must not be inserted.
    pub fn generated_columns<C: GenericClient>(
        &self,
        client: &mut C,
    ) -> Result<Vec<String>, postgres::Error> {
        let rows = client.query(
            "SELECT column_name::text FROM information_schema.columns
             WHERE table_schema = $1 AND table_name = $2 AND is_generated = 'ALWAYS'",
            &[&self.schema, &self.name],
        )?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}
