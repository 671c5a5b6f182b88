use chrono::{DateTime, NaiveDate, Utc};
use model::{core::value::Value, dataset::SourceRelation};

/// A row predicate pushed down to the source, rendered per dialect.
#[derive(Debug, Clone, PartialEq)]
pub enum RowFilter {
    Gt(String, Value),
    Ge(String, Value),
    Between(String, Value, Value),
    /// Calendar-date equality on a temporal column.
    DateEq(String, NaiveDate),
    /// Inclusive calendar-date window on a temporal column.
    DateBetween(String, NaiveDate, NaiveDate),
    /// Rows modified at or after the given instant.
    Since(String, DateTime<Utc>),
    And(Vec<RowFilter>),
}

/// A paginated read request against a source adapter.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub relation: SourceRelation,
    /// Empty means "all columns".
    pub columns: Vec<String>,
    pub filter: Option<RowFilter>,
    /// Ascending order on this column when set.
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl FetchRequest {
    pub fn table(name: &str) -> Self {
        Self::relation(SourceRelation::Table(name.to_string()))
    }

    pub fn relation(relation: SourceRelation) -> Self {
        FetchRequest {
            relation,
            columns: Vec::new(),
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn filter(mut self, filter: RowFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }
}
