use crate::{
    error::SourceError,
    request::{FetchRequest, RowFilter},
    source::SourceAdapter,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use model::{
    connection::{ConnectionDescriptor, Secret, SourceKind},
    core::value::Value,
    dataset::SourceRelation,
    records::row::{FieldValue, RowData},
};
use tracing::debug;

const DEFAULT_PAGE_SIZE: usize = 5000;

/// Paginated JSON API source. The dataset's source table names the resource
/// path; rows arrive as a JSON array (optionally wrapped in `{"data": []}`).
pub struct HttpApiSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<Secret>,
    /// Fixed page grid for `page`/`page_size` requests. A request's `limit`
    /// only caps how many rows come back, never the grid itself.
    page_size: usize,
}

impl HttpApiSource {
    pub fn connect(conn: &ConnectionDescriptor) -> Result<Self, SourceError> {
        if conn.kind != SourceKind::HttpApi {
            return Err(SourceError::BadConnection(format!(
                "expected http_api connection, got {}",
                conn.kind
            )));
        }
        let base_url = conn
            .base_url
            .clone()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| SourceError::BadConnection("http_api connection has no base url".into()))?;

        Ok(HttpApiSource {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: conn.api_token.clone(),
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Only timestamp lower bounds translate onto the API (`since` param);
    /// anything else cannot be pushed down.
    fn since_param(filter: &RowFilter) -> Result<(String, String), SourceError> {
        let ts: &DateTime<Utc> = match filter {
            RowFilter::Since(_, ts) => ts,
            RowFilter::Gt(_, Value::Timestamp(ts)) => ts,
            other => {
                return Err(SourceError::Unsupported(format!(
                    "http source cannot express filter {other:?}"
                )));
            }
        };
        Ok((
            "since".to_string(),
            ts.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
    }

    async fn fetch_page(
        &self,
        resource: &str,
        filter: Option<&RowFilter>,
        page: usize,
    ) -> Result<Vec<RowData>, SourceError> {
        let url = format!("{}/{}", self.base_url, resource.trim_start_matches('/'));
        let mut req = self.client.get(&url).query(&[
            ("page", page.to_string()),
            ("page_size", self.page_size.to_string()),
        ]);

        if let Some(filter) = filter {
            let (key, value) = Self::since_param(filter)?;
            req = req.query(&[(key, value)]);
        }
        if let Some(token) = &self.token {
            req = req.bearer_auth(token.reveal());
        }

        debug!(url = %url, page = page, page_size = self.page_size, "fetching page from http source");

        let response = req.send().await?.error_for_status()?;
        let body: serde_json::Value = response.json().await?;

        let items = match &body {
            serde_json::Value::Array(items) => items.as_slice(),
            serde_json::Value::Object(map) => map
                .get("data")
                .and_then(|d| d.as_array())
                .map(|a| a.as_slice())
                .ok_or_else(|| {
                    SourceError::Decode("response object has no \"data\" array".into())
                })?,
            _ => return Err(SourceError::Decode("response is not a JSON array".into())),
        };

        Ok(items
            .iter()
            .filter_map(|item| item.as_object())
            .map(Self::json_to_row)
            .collect())
    }

    fn json_to_row(object: &serde_json::Map<String, serde_json::Value>) -> RowData {
        let columns = object
            .iter()
            .map(|(name, v)| match v {
                serde_json::Value::Null => FieldValue {
                    name: name.clone(),
                    value: None,
                    data_type: model::core::data_type::DataType::String,
                },
                serde_json::Value::Bool(b) => FieldValue::new(name, Value::Boolean(*b)),
                serde_json::Value::Number(n) => {
                    if let Some(i) = n.as_i64() {
                        FieldValue::new(name, Value::Int(i))
                    } else {
                        FieldValue::new(name, Value::Float(n.as_f64().unwrap_or(0.0)))
                    }
                }
                serde_json::Value::String(s) => FieldValue::new(name, Value::String(s.clone())),
                other => FieldValue::new(name, Value::String(other.to_string())),
            })
            .collect();
        RowData::new(columns)
    }
}

#[async_trait]
impl SourceAdapter for HttpApiSource {
    fn kind(&self) -> SourceKind {
        SourceKind::HttpApi
    }

    async fn fetch_rows(&self, request: &FetchRequest) -> Result<Vec<RowData>, SourceError> {
        let resource = match &request.relation {
            SourceRelation::Table(name) => name.clone(),
            SourceRelation::Query(_) => {
                return Err(SourceError::Unsupported(
                    "http source does not accept raw queries".into(),
                ));
            }
        };

        let limit = request.limit.unwrap_or(self.page_size);
        let offset = request.offset.unwrap_or(0);

        // Walk the fixed page grid: the page containing `offset` first,
        // trimming the in-page remainder, then following pages until the
        // limit is covered or the API runs dry.
        let mut page = offset / self.page_size + 1;
        let mut skip = offset % self.page_size;
        let mut rows: Vec<RowData> = Vec::new();

        loop {
            let items = self
                .fetch_page(&resource, request.filter.as_ref(), page)
                .await?;
            let fetched = items.len();

            rows.extend(items.into_iter().skip(skip).take(limit - rows.len()));
            skip = 0;

            if rows.len() >= limit || fetched < self.page_size {
                break;
            }
            page += 1;
        }

        Ok(rows)
    }

    async fn distinct_dates(
        &self,
        _relation: &SourceRelation,
        _date_col: &str,
        _modified: Option<(&str, DateTime<Utc>)>,
    ) -> Result<Vec<NaiveDate>, SourceError> {
        Err(SourceError::Unsupported(
            "modified-date detection is only implemented for mysql sources".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    /// One-shot HTTP server handing out `{"id": n}` items for n in 1..=total,
    /// sliced by the `page`/`page_size` query parameters.
    async fn spawn_items_server(total: i64) -> std::net::SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let mut read = 0usize;
                    loop {
                        let n = socket.read(&mut buf[read..]).await.unwrap_or(0);
                        if n == 0 {
                            break;
                        }
                        read += n;
                        if buf[..read].windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let request = String::from_utf8_lossy(&buf[..read]).into_owned();
                    let query = request
                        .split_whitespace()
                        .nth(1)
                        .and_then(|path| path.split_once('?'))
                        .map(|(_, q)| q.to_string())
                        .unwrap_or_default();

                    let mut page = 1usize;
                    let mut page_size = 5000usize;
                    for pair in query.split('&') {
                        match pair.split_once('=') {
                            Some(("page", v)) => page = v.parse().unwrap_or(1),
                            Some(("page_size", v)) => page_size = v.parse().unwrap_or(5000),
                            _ => {}
                        }
                    }

                    let items: Vec<serde_json::Value> = (1..=total)
                        .skip((page - 1) * page_size)
                        .take(page_size)
                        .map(|id| serde_json::json!({ "id": id }))
                        .collect();
                    let body = serde_json::Value::Array(items).to_string();
                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });
        addr
    }

    fn api_connection(addr: std::net::SocketAddr) -> ConnectionDescriptor {
        ConnectionDescriptor {
            id: "c1".into(),
            kind: SourceKind::HttpApi,
            host: String::new(),
            port: 0,
            database: String::new(),
            username: String::new(),
            password: Secret::new(""),
            base_url: Some(format!("http://{addr}")),
            api_token: None,
        }
    }

    fn ids(rows: &[RowData]) -> Vec<i64> {
        rows.iter()
            .map(|r| r.get_value("id").as_i64().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn shrunken_final_limit_stays_on_the_page_grid() {
        let addr = spawn_items_server(7).await;
        let source = HttpApiSource::connect(&api_connection(addr))
            .unwrap()
            .with_page_size(3);

        // Mid-page start: offset 4 lands inside page 2 (ids 4..6).
        let rows = source
            .fetch_rows(&FetchRequest::table("items").limit(2).offset(4))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![5, 6]);

        // A window spanning a page boundary is stitched from two pages.
        let rows = source
            .fetch_rows(&FetchRequest::table("items").limit(3).offset(4))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![5, 6, 7]);

        // A capped final batch must not re-read rows 5 and 6.
        let rows = source
            .fetch_rows(&FetchRequest::table("items").limit(2).offset(6))
            .await
            .unwrap();
        assert_eq!(ids(&rows), vec![7]);
    }

    #[test]
    fn json_object_becomes_row() {
        let body: serde_json::Value = serde_json::json!({
            "id": 7,
            "name": "widget",
            "price": 9.5,
            "active": true,
            "deleted_at": null,
        });
        let row = HttpApiSource::json_to_row(body.as_object().unwrap());
        assert_eq!(row.get_value("id"), Value::Int(7));
        assert_eq!(row.get_value("price"), Value::Float(9.5));
        assert_eq!(row.get_value("active"), Value::Boolean(true));
        assert_eq!(row.get_value("deleted_at"), Value::Null);
    }
}
