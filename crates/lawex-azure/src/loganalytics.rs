//! Log Analytics query client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, SecondsFormat};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use lawex_scheduler::{QueryExecutor, QueryFailure, QueryResult, ResultTable};

use crate::AzureError;
use crate::credential::{LOG_ANALYTICS_RESOURCE, TokenCredential};
use crate::retry::RetryPolicy;

/// Public query endpoint.
pub const DEFAULT_LOG_ANALYTICS_ENDPOINT: &str = "https://api.loganalytics.io";

/// Placeholder for the window start in query text.
pub const START_TIME_TOKEN: &str = "START_TIME";

/// Placeholder for the window end in query text.
pub const END_TIME_TOKEN: &str = "END_TIME";

/// Stand-in for an absent window start.
const EPOCH: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Serialize)]
struct QueryBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    timespan: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    tables: Vec<ResultTable>,
    #[serde(default)]
    error: Option<ServiceError>,
}

#[derive(Debug, Deserialize)]
struct ServiceError {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

fn rfc3339(at: &DateTime<FixedOffset>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, false)
}

/// Substitute the window placeholders in `query`.
///
/// A missing start becomes the Unix epoch.
pub fn render_query(
    query: &str,
    start: Option<DateTime<FixedOffset>>,
    end: DateTime<FixedOffset>,
) -> String {
    let start = start.map(|s| rfc3339(&s)).unwrap_or_else(|| EPOCH.to_string());
    query
        .replace(START_TIME_TOKEN, &start)
        .replace(END_TIME_TOKEN, &rfc3339(&end))
}

/// ISO 8601 interval for the request, `None` without a start.
pub fn timespan(start: Option<DateTime<FixedOffset>>, end: DateTime<FixedOffset>) -> Option<String> {
    start.map(|s| format!("{}/{}", rfc3339(&s), rfc3339(&end)))
}

/// Runs queries against one workspace.
pub struct LogAnalyticsClient {
    http: Client,
    endpoint: String,
    workspace_id: String,
    credential: Arc<dyn TokenCredential>,
    retry: RetryPolicy,
}

impl LogAnalyticsClient {
    pub fn new(workspace_id: impl Into<String>, credential: Arc<dyn TokenCredential>) -> Self {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            // Large windows can take minutes server-side
            .timeout(Duration::from_secs(600))
            .build()
            .expect("failed to build HTTP client");

        Self {
            http,
            endpoint: DEFAULT_LOG_ANALYTICS_ENDPOINT.to_string(),
            workspace_id: workspace_id.into(),
            credential,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn query(&self, body: &QueryBody<'_>) -> Result<QueryResponse, AzureError> {
        let token = self.credential.get_token(LOG_ANALYTICS_RESOURCE).await?;
        let url = format!(
            "{}/v1/workspaces/{}/query",
            self.endpoint, self.workspace_id
        );

        self.retry
            .run("log_analytics_query", || async {
                let response = self
                    .http
                    .post(&url)
                    .bearer_auth(&token.token)
                    .json(body)
                    .send()
                    .await?;

                if !response.status().is_success() {
                    return Err(AzureError::from_response(response).await);
                }
                Ok(response.json().await?)
            })
            .await
    }
}

#[async_trait]
impl QueryExecutor for LogAnalyticsClient {
    #[instrument(skip_all, fields(start = ?start.map(|s| rfc3339(&s)), end = %rfc3339(&end)))]
    async fn execute(
        &self,
        query: &str,
        start: Option<DateTime<FixedOffset>>,
        end: DateTime<FixedOffset>,
    ) -> Result<QueryResult, QueryFailure> {
        let rendered = render_query(query, start, end);
        let body = QueryBody {
            query: &rendered,
            timespan: timespan(start, end),
        };

        let response = self.query(&body).await.map_err(QueryFailure::failed)?;

        if let Some(error) = response.error {
            warn!(%error, tables = response.tables.len(), "query returned a partial result");
            return Err(QueryFailure::Partial {
                message: error.to_string(),
            });
        }

        let result = QueryResult {
            tables: response.tables,
        };
        debug!(rows = result.row_count(), "query completed");
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
        FixedOffset::east_opt(2 * 3600)
            .unwrap()
            .with_ymd_and_hms(2024, 1, 1, h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_render_query_with_window() {
        let rendered = render_query(
            "T | where TimeGenerated between (datetime(START_TIME) .. datetime(END_TIME))",
            Some(at(9, 0)),
            at(10, 0),
        );
        assert_eq!(
            rendered,
            "T | where TimeGenerated between (datetime(2024-01-01T09:00:00+02:00) .. datetime(2024-01-01T10:00:00+02:00))"
        );
    }

    #[test]
    fn test_render_query_without_start_uses_epoch() {
        let rendered = render_query("T | where t > datetime(START_TIME)", None, at(10, 0));
        assert_eq!(rendered, "T | where t > datetime(1970-01-01T00:00:00Z)");
    }

    #[test]
    fn test_query_without_tokens_is_unchanged() {
        assert_eq!(render_query("T | take 5", Some(at(9, 0)), at(10, 0)), "T | take 5");
    }

    #[test]
    fn test_timespan() {
        assert_eq!(
            timespan(Some(at(9, 0)), at(10, 0)).as_deref(),
            Some("2024-01-01T09:00:00+02:00/2024-01-01T10:00:00+02:00")
        );
        assert_eq!(timespan(None, at(10, 0)), None);
    }

    #[test]
    fn test_partial_response_shape() {
        let response: QueryResponse = serde_json::from_value(serde_json::json!({
            "tables": [],
            "error": {"code": "PartialError", "message": "result truncated"}
        }))
        .unwrap();
        assert_eq!(
            response.error.map(|e| e.to_string()).as_deref(),
            Some("PartialError: result truncated")
        );
    }
}
