//! Connection settings and DSN assembly for the supported drivers.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use url::form_urlencoded::byte_serialize;

use crate::error::SqlFluentError;

/// Driver identifiers accepted by [`Config::dsn`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    Mysql,
    Postgres,
    Sqlite3,
}

impl Driver {
    /// Parse a driver name, ignoring case.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` for an unknown name.
    pub fn parse(name: &str) -> Result<Self, SqlFluentError> {
        <Driver as ValueEnum>::from_str(name.trim(), true)
            .map_err(|_| SqlFluentError::ConfigError(format!("unsupported driver `{name}`")))
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Driver::Mysql => "mysql",
            Driver::Postgres => "postgres",
            Driver::Sqlite3 => "sqlite3",
        }
    }
}

impl std::fmt::Display for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where and how to connect.
///
/// For `sqlite3` only `database` is used, and it is the file path (or `:memory:`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Unix socket path; takes precedence over host and port.
    pub socket: String,
    pub username: String,
    pub password: String,
    pub database: String,
    pub tls: bool,
}

fn escape(part: &str) -> String {
    byte_serialize(part.as_bytes()).collect()
}

impl Config {
    /// Build the data source name `driver` expects.
    ///
    /// # Errors
    ///
    /// Returns `SqlFluentError::ConfigError` for an unknown driver or a missing database.
    pub fn dsn(&self, driver: &str) -> Result<String, SqlFluentError> {
        match Driver::parse(driver)? {
            Driver::Mysql => Ok(self.mysql_dsn()),
            Driver::Postgres => Ok(self.postgres_dsn()),
            Driver::Sqlite3 => {
                if self.database.trim().is_empty() {
                    return Err(SqlFluentError::ConfigError(
                        "sqlite3 needs a database path".into(),
                    ));
                }
                Ok(self.database.clone())
            }
        }
    }

    fn mysql_dsn(&self) -> String {
        let address = if self.socket.is_empty() {
            format!("tcp({}:{})", self.host, self.port)
        } else {
            format!("unix({})", self.socket)
        };
        let mut dsn = format!(
            "{}:{}@{}/{}",
            self.username, self.password, address, self.database
        );
        if self.tls {
            dsn.push_str("?tls=true");
        }
        dsn
    }

    fn postgres_dsn(&self) -> String {
        let user = escape(&self.username);
        let password = escape(&self.password);
        let database = escape(&self.database);
        let mut params = Vec::new();
        let mut dsn = if self.socket.is_empty() {
            let host = escape(&self.host);
            format!("postgres://{user}:{password}@{host}:{}/{database}", self.port)
        } else {
            params.push(format!("host={}", escape(&self.socket)));
            format!("postgres://{user}:{password}@/{database}")
        };
        if self.tls {
            params.push("sslmode=verify-full".to_string());
        }
        if !params.is_empty() {
            dsn.push('?');
            dsn.push_str(&params.join("&"));
        }
        dsn
    }
}
