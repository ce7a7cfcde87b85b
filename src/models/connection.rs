//! Connection-related data models.
//!
//! A `ConnectionConfig` is the already-validated description of one named
//! database the registry should open.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Detect the database type from a connection URL scheme.
    pub fn from_url_scheme(url: &str) -> Option<Self> {
        let lower = url.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }

    /// Whether a server login (user and password) is needed to connect.
    pub fn requires_credentials(&self) -> bool {
        !matches!(self, Self::SQLite)
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" | "sqlite3" => Ok(Self::SQLite),
            other => Err(format!(
                "unknown database type '{}' (expected postgres, mysql or sqlite)",
                other
            )),
        }
    }
}

/// SSL negotiation mode, using the PostgreSQL `sslmode` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SslMode {
    #[default]
    Disable,
    Allow,
    Prefer,
    Require,
    VerifyCa,
    VerifyFull,
}

impl SslMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disable => "disable",
            Self::Allow => "allow",
            Self::Prefer => "prefer",
            Self::Require => "require",
            Self::VerifyCa => "verify-ca",
            Self::VerifyFull => "verify-full",
        }
    }
}

impl fmt::Display for SslMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SslMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "disable" | "disabled" => Ok(Self::Disable),
            "allow" => Ok(Self::Allow),
            "prefer" | "preferred" => Ok(Self::Prefer),
            "require" | "required" => Ok(Self::Require),
            "verify-ca" => Ok(Self::VerifyCa),
            "verify-full" | "verify-identity" => Ok(Self::VerifyFull),
            other => Err(format!("unknown SSL mode '{}'", other)),
        }
    }
}

/// Configuration for one named database connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Registry key used by callers in the `database` argument.
    pub name: String,
    pub db_type: DatabaseType,
    pub host: String,
    pub port: u16,
    /// Database name on the server, or the file path for SQLite.
    pub database: String,
    pub user: String,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub ssl_mode: SslMode,
}

impl ConnectionConfig {
    /// Configuration for a SQLite database file.
    pub fn sqlite(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: DatabaseType::SQLite,
            host: String::new(),
            port: 0,
            database: path.into(),
            user: String::new(),
            password: String::new(),
            ssl_mode: SslMode::Disable,
        }
    }

    /// Registry name derived from a database or file name. Characters
    /// outside `[A-Za-z0-9_-]` become `_`.
    pub fn derive_name(source: &str) -> String {
        source
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect()
    }

    /// Check that the registry name is usable as a tool argument.
    pub fn validate_name(name: &str) -> Result<(), ConnectionConfigError> {
        if name.is_empty() {
            return Err(ConnectionConfigError::EmptyName);
        }
        if !name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(ConnectionConfigError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Display-safe connection target (no password).
    pub fn display_target(&self) -> String {
        match self.db_type {
            DatabaseType::SQLite => format!("sqlite:{}", self.database),
            DatabaseType::PostgreSQL | DatabaseType::MySQL => {
                let scheme = if self.db_type == DatabaseType::PostgreSQL {
                    "postgres"
                } else {
                    "mysql"
                };
                format!(
                    "{}://{}@{}:{}/{}",
                    scheme, self.user, self.host, self.port, self.database
                )
            }
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("name", &self.name)
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"****")
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Errors that can occur when describing a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionConfigError {
    #[error("Database name cannot be empty")]
    EmptyName,

    #[error("Database name contains invalid characters: {0}")]
    InvalidName(String),

    #[error("Unknown database type in connection URL: {0}")]
    UnknownDatabaseType(String),

    #[error("Invalid connection URL: {0}")]
    InvalidUrl(String),

    #[error("Duplicate database name: {0}")]
    DuplicateName(String),

    #[error("missing required database configuration (DB_NAME, DB_USER, DB_PASSWORD)")]
    MissingRequired,
}
