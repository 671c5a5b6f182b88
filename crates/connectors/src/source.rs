use crate::{error::SourceError, request::FetchRequest};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use model::{connection::SourceKind, dataset::SourceRelation, records::row::RowData};

/// Uniform paginated read over one source kind. Strategies depend only on
/// this trait, never on a concrete driver.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn kind(&self) -> SourceKind;

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError>;

    /// Distinct calendar dates of `date_col`, optionally restricted to rows
    /// whose `modified` column is at or after the given instant. Used by
    /// modified-date detection; sources without pushdown support return
    /// `Unsupported`.
    async fn distinct_dates(
        &self,
        relation: &SourceRelation,
        date_col: &str,
        modified: Option<(&str, DateTime<Utc>)>,
    ) -> Result<Vec<NaiveDate>, SourceError>;
}
