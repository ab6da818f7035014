//! Log Analytics client against a mock service.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use lawex_azure::{AccessToken, AzureError, LogAnalyticsClient, RetryPolicy, TokenCredential};
use lawex_scheduler::{QueryExecutor, QueryFailure, reference_offset};

struct StaticCredential;

#[async_trait]
impl TokenCredential for StaticCredential {
    async fn get_token(&self, resource: &str) -> Result<AccessToken, AzureError> {
        assert_eq!(resource, "https://api.loganalytics.io");
        Ok(AccessToken {
            token: "la-token".to_string(),
            expires_on: Utc::now() + chrono::Duration::hours(1),
        })
    }
}

fn at(h: u32, m: u32) -> DateTime<FixedOffset> {
    reference_offset()
        .with_ymd_and_hms(2024, 1, 1, h, m, 0)
        .unwrap()
}

fn client(server: &MockServer) -> LogAnalyticsClient {
    LogAnalyticsClient::new("ws-1234", Arc::new(StaticCredential))
        .with_endpoint(server.uri())
        .with_retry(RetryPolicy::none())
}

fn tables() -> serde_json::Value {
    json!({
        "tables": [{
            "name": "PrimaryResult",
            "columns": [
                {"name": "TimeGenerated", "type": "datetime"},
                {"name": "UserPrincipalName", "type": "string"}
            ],
            "rows": [
                ["2024-01-01T08:10:00Z", "a@example.com"],
                ["2024-01-01T08:20:00Z", "b@example.com"]
            ]
        }]
    })
}

#[tokio::test]
async fn query_sends_window_and_parses_tables() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1234/query"))
        .and(header("Authorization", "Bearer la-token"))
        .and(body_json(json!({
            "query": "SigninLogs | where TimeGenerated > datetime(2024-01-01T09:00:00+02:00)",
            "timespan": "2024-01-01T09:00:00+02:00/2024-01-01T10:00:00+02:00"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(tables()))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .execute(
            "SigninLogs | where TimeGenerated > datetime(START_TIME)",
            Some(at(9, 0)),
            at(10, 0),
        )
        .await
        .unwrap();

    assert_eq!(result.row_count(), 2);
    let records = result.to_records();
    assert_eq!(records[1]["UserPrincipalName"], json!("b@example.com"));
}

#[tokio::test]
async fn unbounded_query_omits_timespan() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1234/query"))
        .and(body_json(json!({
            "query": "T | where t between (datetime(1970-01-01T00:00:00Z) .. datetime(2024-01-01T10:00:00+02:00))"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"tables": []})))
        .expect(1)
        .mount(&server)
        .await;

    let result = client(&server)
        .execute(
            "T | where t between (datetime(START_TIME) .. datetime(END_TIME))",
            None,
            at(10, 0),
        )
        .await
        .unwrap();

    assert!(result.is_empty());
}

#[tokio::test]
async fn error_next_to_tables_is_partial() {
    let server = MockServer::start().await;

    let mut body = tables();
    body["error"] = json!({
        "code": "PartialError",
        "message": "There were some errors when processing your query."
    });

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1234/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(&server)
        .await;

    let err = client(&server)
        .execute("T", Some(at(9, 0)), at(10, 0))
        .await
        .unwrap_err();

    match err {
        QueryFailure::Partial { message } => assert!(message.starts_with("PartialError")),
        other => panic!("expected partial result, got {}", other),
    }
}

#[tokio::test]
async fn bad_request_is_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/workspaces/ws-1234/query"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": {"code": "BadArgumentError", "message": "Syntax error"}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .execute("T |", Some(at(9, 0)), at(10, 0))
        .await
        .unwrap_err();

    match err {
        QueryFailure::Failed(source) => assert!(source.to_string().contains("BadArgumentError")),
        other => panic!("expected failure, got {}", other),
    }
}
