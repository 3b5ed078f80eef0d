use std::fmt;

use thiserror::Error;

/// Which side of the sync a connection belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Source,
    Target,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Source => write!(f, "source"),
            Role::Target => write!(f, "target"),
        }
    }
}

/// Errors raised by the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// Invalid or missing configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A pool for one side could not be built or could not hand out a connection
    #[error("Cannot connect to {role} database: {source}")]
    Connection {
        role: Role,
        #[source]
        source: r2d2::Error,
    },

    /// Catalog queries failed; no partial introspection is usable
    #[error("Schema introspection failed: {0}")]
    Introspection(#[source] postgres::Error),

    /// The safety check refused the target
    #[error("Refusing to sync: {0}")]
    UnsafeTarget(String),

    /// Source and target share no copyable column
    #[error("Table {0} has no columns in common between source and target")]
    NoSharedColumns(String),

    #[error("Database error: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SyncError {
    pub fn connection(role: Role, source: r2d2::Error) -> Self {
        SyncError::Connection { role, source }
    }

    /// Fatal errors abort the run before any further work is attempted.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SyncError::Config(_)
                | SyncError::Connection { .. }
                | SyncError::Introspection(_)
                | SyncError::UnsafeTarget(_)
        )
    }
}

/// Renders an error with its whole source chain on one line.
pub fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut current = err.source();
    while let Some(cause) = current {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        current = cause.source();
    }
    message
}
