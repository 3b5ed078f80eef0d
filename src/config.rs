use std::time::Duration;

use crate::error::SyncError;
use crate::table::Table;

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Target environment names that are never synced into.
pub const PRODUCTION_ENVIRONMENTS: &[&str] = &["production", "prod"];

/// Validated settings for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub source_url: String,
    pub target_url: String,
    pub schema: String,
    pub batch_size: usize,
    pub exclude: Vec<String>,
    pub target_env: Option<String>,
    pub statement_timeout: Option<Duration>,
    pub connect_timeout: Duration,
    pub dry_run: bool,
}

impl SyncConfig {
    pub fn new(source_url: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            target_url: target_url.into(),
            schema: crate::table::DEFAULT_SCHEMA.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            exclude: Vec::new(),
            target_env: None,
            statement_timeout: None,
            connect_timeout: Duration::from_secs(30),
            dry_run: false,
        }
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.source_url.trim().is_empty() {
            return Err(SyncError::Config("source connection string is empty".into()));
        }
        if self.target_url.trim().is_empty() {
            return Err(SyncError::Config("target connection string is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(SyncError::Config("batch size must be at least 1".into()));
        }
        if is_system_schema(&self.schema) {
            return Err(SyncError::Config(format!(
                "schema '{}' is a system schema",
                self.schema
            )));
        }
        Ok(())
    }

    pub fn is_excluded(&self, table: &Table) -> bool {
        self.exclude
            .iter()
            .any(|e| *e == table.name || *e == table.to_string())
    }
}

pub fn is_system_schema(schema: &str) -> bool {
    schema == "information_schema" || schema.starts_with("pg_")
}

/// Gate in front of the destructive reset.
#[derive(Debug, Clone)]
pub struct SafetyCheck<'a> {
    config: &'a SyncConfig,
}

impl<'a> SafetyCheck<'a> {
    pub fn new(config: &'a SyncConfig) -> Self {
        Self { config }
    }

    pub fn verify(&self) -> Result<(), SyncError> {
        if let Some(env) = &self.config.target_env {
            let env = env.trim().to_ascii_lowercase();
            if PRODUCTION_ENVIRONMENTS.contains(&env.as_str()) {
                return Err(SyncError::UnsafeTarget(format!(
                    "target is designated '{env}'"
                )));
            }
        }
        if same_database(&self.config.source_url, &self.config.target_url)? {
            return Err(SyncError::UnsafeTarget(
                "source and target point at the same database".into(),
            ));
        }
        Ok(())
    }
}

fn same_database(source: &str, target: &str) -> Result<bool, SyncError> {
    let parse = |url: &str, side: &str| {
        url.parse::<postgres::Config>()
            .map_err(|e| SyncError::Config(format!("invalid {side} connection string: {e}")))
    };
    let source = parse(source, "source")?;
    let target = parse(target, "target")?;
    Ok(format!("{:?}", source.get_hosts()) == format!("{:?}", target.get_hosts())
        && source.get_ports() == target.get_ports()
        && source.get_dbname() == target.get_dbname())
}
