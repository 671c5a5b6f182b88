use crate::request::{FetchRequest, RowFilter};
use chrono::SecondsFormat;
use model::dataset::SourceRelation;

/// The SQL dialects we render SELECTs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    MySql,
    Postgres,
    Sqlite,
}

impl SqlDialect {
    fn quote(&self, ident: &str) -> String {
        // Strip embedded quote characters instead of trusting the input.
        match self {
            SqlDialect::MySql => format!("`{}`", ident.replace('`', "")),
            SqlDialect::Postgres | SqlDialect::Sqlite => {
                format!("\"{}\"", ident.replace('"', ""))
            }
        }
    }

    fn date_expr(&self, column: &str) -> String {
        let col = self.quote(column);
        match self {
            SqlDialect::MySql => format!("DATE({col})"),
            SqlDialect::Postgres => format!("CAST({col} AS date)"),
            SqlDialect::Sqlite => format!("date({col})"),
        }
    }

    pub fn render_filter(&self, filter: &RowFilter) -> String {
        match filter {
            RowFilter::Gt(col, v) => format!("{} > {v}", self.quote(col)),
            RowFilter::Ge(col, v) => format!("{} >= {v}", self.quote(col)),
            RowFilter::Between(col, lo, hi) => {
                format!("{} BETWEEN {lo} AND {hi}", self.quote(col))
            }
            RowFilter::DateEq(col, d) => format!("{} = '{d}'", self.date_expr(col)),
            RowFilter::DateBetween(col, from, to) => {
                format!("{} BETWEEN '{from}' AND '{to}'", self.date_expr(col))
            }
            RowFilter::Since(col, ts) => format!(
                "{} >= '{}'",
                self.quote(col),
                ts.to_rfc3339_opts(SecondsFormat::Secs, true)
                    .replace('T', " ")
                    .replace('Z', "")
            ),
            RowFilter::And(parts) => parts
                .iter()
                .map(|p| format!("({})", self.render_filter(p)))
                .collect::<Vec<_>>()
                .join(" AND "),
        }
    }

    /// Renders a full SELECT for the request. Raw queries become a subselect
    /// so filters and pagination still apply.
    pub fn render_select(&self, request: &FetchRequest) -> String {
        let projection = if request.columns.is_empty() {
            "*".to_string()
        } else {
            request
                .columns
                .iter()
                .map(|c| self.quote(c))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let from = match &request.relation {
            SourceRelation::Table(name) => self.quote(name),
            SourceRelation::Query(query) => format!("({}) AS src", query.trim_end_matches(';')),
        };

        let mut sql = format!("SELECT {projection} FROM {from}");

        if let Some(filter) = &request.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.render_filter(filter));
        }
        if let Some(order) = &request.order_by {
            sql.push_str(&format!(" ORDER BY {} ASC", self.quote(order)));
        }
        if let Some(limit) = request.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = request.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        sql
    }

    /// Distinct calendar dates of a temporal column, optionally restricted
    /// by a modified-column lower bound.
    pub fn render_distinct_dates(
        &self,
        relation: &SourceRelation,
        date_col: &str,
        modified: Option<(&str, &str)>,
    ) -> String {
        let from = match relation {
            SourceRelation::Table(name) => self.quote(name),
            SourceRelation::Query(query) => format!("({}) AS src", query.trim_end_matches(';')),
        };
        let expr = self.date_expr(date_col);
        let mut sql = format!("SELECT DISTINCT {expr} AS d FROM {from}");
        if let Some((col, since)) = modified {
            sql.push_str(&format!(" WHERE {} >= '{since}'", self.quote(col)));
        }
        sql.push_str(" ORDER BY d ASC");
        sql
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use model::core::value::Value;

    #[test]
    fn mysql_select_with_cursor_filter() {
        let req = FetchRequest::table("orders")
            .filter(RowFilter::Gt("id".into(), Value::Int(500)))
            .order_by("id")
            .limit(5000);
        assert_eq!(
            SqlDialect::MySql.render_select(&req),
            "SELECT * FROM `orders` WHERE `id` > 500 ORDER BY `id` ASC LIMIT 5000"
        );
    }

    #[test]
    fn postgres_date_window() {
        let from = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let req = FetchRequest::table("events")
            .filter(RowFilter::DateBetween("created_at".into(), from, to));
        assert_eq!(
            SqlDialect::Postgres.render_select(&req),
            "SELECT * FROM \"events\" WHERE CAST(\"created_at\" AS date) \
             BETWEEN '2024-01-08' AND '2024-01-10'"
        );
    }

    #[test]
    fn raw_query_becomes_subselect() {
        let req = FetchRequest::relation(model::dataset::SourceRelation::Query(
            "SELECT a, b FROM t WHERE region = 'eu';".into(),
        ))
        .limit(10)
        .offset(20);
        assert_eq!(
            SqlDialect::MySql.render_select(&req),
            "SELECT * FROM (SELECT a, b FROM t WHERE region = 'eu') AS src LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn distinct_dates_filters_on_modified_column() {
        let sql = SqlDialect::MySql.render_distinct_dates(
            &SourceRelation::Table("events".into()),
            "event_date",
            Some(("updated_at", "2024-01-11 08:00:00")),
        );
        assert_eq!(
            sql,
            "SELECT DISTINCT DATE(`event_date`) AS d FROM `events` \
             WHERE `updated_at` >= '2024-01-11 08:00:00' ORDER BY d ASC"
        );
    }

    #[test]
    fn identifier_quoting_strips_quote_chars() {
        let req = FetchRequest::table("or`ders");
        assert_eq!(
            SqlDialect::MySql.render_select(&req),
            "SELECT * FROM `orders`"
        );
    }
}
