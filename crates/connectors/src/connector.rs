use crate::{
    error::SourceError,
    http::HttpApiSource,
    source::SourceAdapter,
    sql::{mysql::MySqlSource, postgres::PostgresSource, sqlite::SqliteSource},
};
use model::connection::{ConnectionDescriptor, SourceKind};

/// One connected source, dispatched by connection kind.
pub enum SourceConnector {
    MySql(MySqlSource),
    Postgres(PostgresSource),
    Sqlite(SqliteSource),
    Http(HttpApiSource),
}

impl SourceConnector {
    pub async fn connect(conn: &ConnectionDescriptor) -> Result<Self, SourceError> {
        match conn.kind {
            SourceKind::MySql => Ok(SourceConnector::MySql(MySqlSource::connect(conn).await?)),
            SourceKind::Postgres => Ok(SourceConnector::Postgres(
                PostgresSource::connect(conn).await?,
            )),
            SourceKind::Sqlite => Ok(SourceConnector::Sqlite(SqliteSource::connect(conn).await?)),
            SourceKind::HttpApi => Ok(SourceConnector::Http(HttpApiSource::connect(conn)?)),
        }
    }

    pub fn adapter(&self) -> &(dyn SourceAdapter) {
        match self {
            SourceConnector::MySql(s) => s,
            SourceConnector::Postgres(s) => s,
            SourceConnector::Sqlite(s) => s,
            SourceConnector::Http(s) => s,
        }
    }
}
