//! Pooled connections to the source and target databases.

use std::time::Duration;

use postgres::Client;
use r2d2::{CustomizeConnection, Pool, PooledConnection};
use r2d2_postgres::{PostgresConnectionManager, postgres::NoTls as R2d2NoTls};
use tracing::debug;

use crate::config::SyncConfig;
use crate::error::{Role, SyncError};

pub type PgPool = Pool<PostgresConnectionManager<R2d2NoTls>>;
pub type PgConnection = PooledConnection<PostgresConnectionManager<R2d2NoTls>>;

/// Session settings applied to every connection the pools hand out.
#[derive(Debug, Clone, Copy)]
struct SessionSettings {
    statement_timeout: Option<Duration>,
}

impl CustomizeConnection<Client, postgres::Error> for SessionSettings {
    fn on_acquire(&self, client: &mut Client) -> Result<(), postgres::Error> {
        let millis = self.statement_timeout.map_or(0, |t| t.as_millis());
        client.batch_execute(&format!("SET statement_timeout = {millis}"))
    }
}

/// Owns the source and target pools. Connections go back to their pool when
/// the guard returned by [`ConnectionManager::source`]/[`ConnectionManager::target`]
/// is dropped, on every exit path.
#[derive(Clone)]
pub struct ConnectionManager {
    source: PgPool,
    target: PgPool,
}

impl ConnectionManager {
    pub fn connect(config: &SyncConfig) -> Result<Self, SyncError> {
        let settings = SessionSettings {
            statement_timeout: config.statement_timeout,
        };
        let source = build_pool(&config.source_url, Role::Source, config, settings)?;
        let target = build_pool(&config.target_url, Role::Target, config, settings)?;
        Ok(Self { source, target })
    }

    pub fn get(&self, role: Role) -> Result<PgConnection, SyncError> {
        let pool = match role {
            Role::Source => &self.source,
            Role::Target => &self.target,
        };
        pool.get().map_err(|e| SyncError::connection(role, e))
    }

    pub fn source(&self) -> Result<PgConnection, SyncError> {
        self.get(Role::Source)
    }

    pub fn target(&self) -> Result<PgConnection, SyncError> {
        self.get(Role::Target)
    }

    /// Runs `f` with a connection for `role`, releasing it afterwards.
    pub fn with_connection<T, F>(&self, role: Role, f: F) -> Result<T, SyncError>
    where
        F: FnOnce(&mut Client) -> Result<T, SyncError>,
    {
        let mut conn = self.get(role)?;
        let result = f(&mut *conn);
        drop(conn);
        debug!(%role, "Connection released");
        result
    }
}

fn build_pool(
    url: &str,
    role: Role,
    config: &SyncConfig,
    settings: SessionSettings,
) -> Result<PgPool, SyncError> {
    let pg_config: postgres::Config = url
        .parse()
        .map_err(|e| SyncError::Config(format!("invalid {role} connection string: {e}")))?;
    let manager = PostgresConnectionManager::new(pg_config, R2d2NoTls);
    let pool = Pool::builder()
        .max_size(2)
        .connection_timeout(config.connect_timeout)
        .connection_customizer(Box::new(settings))
        .build(manager)
        .map_err(|e| SyncError::connection(role, e))?;
    debug!(%role, "Connection pool ready");
    Ok(pool)
}
