use serde::{Deserialize, Serialize};
use std::fmt;

/// The four source kinds the engine can read from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    MySql,
    Postgres,
    Sqlite,
    HttpApi,
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::MySql => "mysql",
            SourceKind::Postgres => "postgres",
            SourceKind::Sqlite => "sqlite",
            SourceKind::HttpApi => "http_api",
        };
        write!(f, "{name}")
    }
}

/// Credential material decrypted just-in-time by the CRUD layer.
/// Redacted in Debug/Display so it never leaks into logs.
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    pub fn reveal(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(****)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Connection details handed in by the external CRUD layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub id: String,
    pub kind: SourceKind,
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: Secret,
    /// Base URL for `HttpApi` sources; unset for SQL sources.
    pub base_url: Option<String>,
    /// Bearer token for `HttpApi` sources.
    pub api_token: Option<Secret>,
}

impl ConnectionDescriptor {
    /// Renders the per-dialect connection URL for sqlx pools.
    pub fn connection_url(&self) -> String {
        match self.kind {
            SourceKind::MySql => format!(
                "mysql://{}:{}@{}:{}/{}",
                self.username,
                self.password.reveal(),
                self.host,
                self.port,
                self.database
            ),
            SourceKind::Postgres => format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username,
                self.password.reveal(),
                self.host,
                self.port,
                self.database
            ),
            SourceKind::Sqlite => format!("sqlite://{}", self.database),
            SourceKind::HttpApi => self.base_url.clone().unwrap_or_default(),
        }
    }
}
