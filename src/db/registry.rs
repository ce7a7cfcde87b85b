//! Connection registry.
//!
//! The registry maps a database name to a live, pinged `DbPool`. It is built
//! once at startup, shared read-only behind an `Arc`, and closed once at
//! shutdown. Names are kept in a `BTreeMap`, so "first failure" and every
//! listing follow lexicographic name order.

use crate::db::pool::{DbPool, connection_suggestion};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ConnectionConfigError};
use futures_util::future::join_all;
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How construction reacts to databases that cannot be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistryMode {
    /// Exactly one database; any failure is fatal and callers may omit the
    /// `database` argument.
    Single,
    /// Several databases; unreachable ones are left out as long as one works.
    Fleet,
}

/// Outcome of a successful registry build.
#[derive(Debug)]
pub struct RegistryBuild {
    pub registry: ConnectionRegistry,
    /// Databases left out in fleet mode, in name order.
    pub failures: Vec<DbError>,
}

impl RegistryBuild {
    /// The failure the caller should warn about, if any database was left out.
    pub fn first_failure(&self) -> Option<&DbError> {
        self.failures.first()
    }
}

#[derive(Debug)]
pub struct ConnectionRegistry {
    handles: BTreeMap<String, DbPool>,
    mode: RegistryMode,
}

impl ConnectionRegistry {
    /// Open and ping every configured database.
    ///
    /// All attempts run concurrently, each bounded by `connect_timeout` and
    /// aborted when `cancel` fires. In [`RegistryMode::Single`] the one
    /// configuration must succeed. In [`RegistryMode::Fleet`] failures are
    /// collected and the registry holds the databases that answered; if none
    /// did, the first failure is returned as a fatal error.
    pub async fn connect(
        configs: Vec<ConnectionConfig>,
        mode: RegistryMode,
        connect_timeout: Duration,
        cancel: &CancellationToken,
    ) -> DbResult<RegistryBuild> {
        validate_configs(&configs, mode)?;

        let mut configs = configs;
        configs.sort_by(|a, b| a.name.cmp(&b.name));
        let total = configs.len();

        info!(count = total, mode = ?mode, "Connecting to configured databases");

        let attempts = configs
            .iter()
            .map(|config| open_verified(config, connect_timeout, cancel));
        let results = join_all(attempts).await;

        let mut handles = BTreeMap::new();
        let mut failures = Vec::new();
        for (config, result) in configs.iter().zip(results) {
            match result {
                Ok(pool) => {
                    handles.insert(config.name.clone(), pool);
                }
                Err(err) => {
                    if mode == RegistryMode::Single {
                        return Err(err);
                    }
                    warn!(database = %config.name, error = %err, "Database left out of registry");
                    failures.push(err);
                }
            }
        }

        if handles.is_empty() {
            let first = failures
                .into_iter()
                .next()
                .unwrap_or_else(|| DbError::internal("no databases configured"));
            return Err(all_failed(first, total));
        }

        info!(
            connected = handles.len(),
            failed = failures.len(),
            "Connection registry ready"
        );

        Ok(RegistryBuild {
            registry: ConnectionRegistry { handles, mode },
            failures,
        })
    }

    /// Look up a database by name. A miss is the caller's to report.
    pub fn resolve(&self, name: &str) -> Option<&DbPool> {
        self.handles.get(name)
    }

    /// In single-database mode, the name used when a call omits `database`.
    pub fn default_database(&self) -> Option<&str> {
        match self.mode {
            RegistryMode::Single => self.handles.keys().next().map(String::as_str),
            RegistryMode::Fleet => None,
        }
    }

    /// Registered names in lexicographic order.
    pub fn names(&self) -> Vec<String> {
        self.handles.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Close every handle. Closing one pool never depends on another.
    pub async fn close_all(&self) {
        let closes = self.handles.iter().map(|(name, pool)| async move {
            info!(database = %name, "Closing connection");
            pool.close().await;
        });
        join_all(closes).await;
    }
}

fn validate_configs(configs: &[ConnectionConfig], mode: RegistryMode) -> DbResult<()> {
    if configs.is_empty() {
        return Err(DbError::configuration(
            "*",
            "no databases configured",
            "Set DB_NAME/DB_USER/DB_PASSWORD or pass --database name=url",
        ));
    }
    if mode == RegistryMode::Single && configs.len() != 1 {
        return Err(DbError::configuration(
            "*",
            format!("single-database mode needs exactly one database, got {}", configs.len()),
            "Use fleet mode for several databases",
        ));
    }

    let mut seen = BTreeSet::new();
    for config in configs {
        ConnectionConfig::validate_name(&config.name).map_err(|e| {
            DbError::configuration(&config.name, e.to_string(), "Use letters, digits, '-' or '_'")
        })?;
        if !seen.insert(config.name.as_str()) {
            return Err(DbError::configuration(
                &config.name,
                ConnectionConfigError::DuplicateName(config.name.clone()).to_string(),
                "Give every database a unique name",
            ));
        }
    }
    Ok(())
}

/// Connect and ping one database, or describe why it could not be reached.
async fn open_verified(
    config: &ConnectionConfig,
    connect_timeout: Duration,
    cancel: &CancellationToken,
) -> DbResult<DbPool> {
    info!(
        database = %config.name,
        target = %config.display_target(),
        ssl_mode = %config.ssl_mode,
        "Connecting to database"
    );

    let attempt = async {
        let pool = DbPool::connect(config, connect_timeout).await?;
        if let Err(e) = pool.ping().await {
            pool.close().await;
            return Err(e);
        }
        Ok(pool)
    };

    let pool = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            return Err(DbError::configuration(
                &config.name,
                "connection attempt cancelled",
                "The server is shutting down",
            ));
        }
        outcome = tokio::time::timeout(connect_timeout, attempt) => match outcome {
            Ok(Ok(pool)) => pool,
            Ok(Err(e)) => {
                return Err(DbError::configuration(
                    &config.name,
                    format!("failed to connect: {}", e),
                    connection_suggestion(config.db_type, &e),
                ));
            }
            Err(_) => {
                return Err(DbError::configuration(
                    &config.name,
                    format!("no answer within {}s", connect_timeout.as_secs()),
                    "Check that the server is reachable from this host",
                ));
            }
        },
    };

    let version = pool.server_version().await;
    info!(
        database = %config.name,
        db_type = %config.db_type,
        version = version.as_deref().unwrap_or("unknown"),
        "Connected to database"
    );
    Ok(pool)
}

fn all_failed(first: DbError, total: usize) -> DbError {
    match first {
        DbError::Configuration {
            database,
            message,
            suggestion,
        } if total > 1 => DbError::Configuration {
            database,
            message: format!("none of the {} configured databases could be reached; first failure: {}", total, message),
            suggestion,
        },
        other => other,
    }
}
