use std::sync::Arc;

use axum::body::Body;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::{DateTime, NaiveDate, Utc};
use futures::stream::{self, Stream};
use serde::Deserialize;
use serde_json::Value;
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use super::logger::AuditLogger;
use crate::auth::RequireAdmin;
use crate::error::json_error;

#[derive(Debug, Default, Deserialize)]
pub struct ExportQuery {
    pub since: Option<String>,
}

pub fn audit_export_router(logger: Arc<AuditLogger>) -> Router {
    Router::new()
        .route("/audit/export", get(export_handler))
        .with_state(logger)
}

/// Accepts RFC 3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub fn parse_since(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Re-serializes one log line when it parses and is stamped at or after
/// `since`; blank and unparseable lines yield nothing.
pub fn filter_line(line: &str, since: Option<DateTime<Utc>>) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    let record: Value = match serde_json::from_str(line) {
        Ok(record) => record,
        Err(err) => {
            warn!(error = %err, "audit.export_unparseable_line");
            return None;
        }
    };

    if let Some(since) = since {
        let stamped = record
            .get("ts")
            .and_then(Value::as_str)
            .and_then(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc));
        if !stamped.is_some_and(|ts| ts >= since) {
            return None;
        }
    }

    let mut output = record.to_string();
    output.push('\n');
    Some(output)
}

/// Streams matching records line by line; a read error ends the stream.
fn record_stream(
    file: File,
    since: Option<DateTime<Utc>>,
) -> impl Stream<Item = Result<String, std::io::Error>> + Send + 'static {
    stream::unfold(Some(BufReader::new(file).lines()), move |state| async move {
        let mut lines = state?;
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if let Some(record) = filter_line(&line, since) {
                        return Some((Ok(record), Some(lines)));
                    }
                }
                Ok(None) => return None,
                Err(err) => {
                    warn!(error = %err, "audit.export_read_failed");
                    return Some((Err(err), None));
                }
            }
        }
    })
}

pub(crate) async fn export_handler(
    State(logger): State<Arc<AuditLogger>>,
    RequireAdmin(claims): RequireAdmin,
    Query(query): Query<ExportQuery>,
) -> Response {
    let since = match query.since.as_deref() {
        Some(raw) => match parse_since(raw) {
            Some(since) => Some(since),
            None => return json_error(StatusCode::BAD_REQUEST, "invalid_since"),
        },
        None => None,
    };

    let file = match File::open(logger.path()).await {
        Ok(file) => file,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return json_error(StatusCode::NOT_FOUND, "audit_log_missing")
        }
        Err(err) => {
            warn!(error = %err, "audit.export_read_failed");
            return json_error(StatusCode::INTERNAL_SERVER_ERROR, "stream_error");
        }
    };

    info!(user_id = %claims.sub, since = ?since, "audit.export");

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/x-ndjson"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"audit-export.ndjson\"",
            ),
        ],
        Body::from_stream(record_stream(file, since)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{with_authentication, Role, TokenService, UserRecord};
    use axum::body::to_bytes;
    use axum::http::Request;
    use std::time::Duration;
    use tower::ServiceExt;

    #[test]
    fn since_accepts_rfc3339_and_dates() {
        assert!(parse_since("2025-01-02T03:04:05Z").is_some());
        assert!(parse_since("2025-01-02T03:04:05+04:00").is_some());
        assert!(parse_since("2025-01-02").is_some());
        assert!(parse_since("yesterday").is_none());
    }

    #[test]
    fn filter_drops_blank_bad_and_old_lines() {
        let lines = [
            "{\"ts\":\"2025-01-01T00:00:00.000Z\",\"route\":\"old\"}",
            "",
            "not json",
            "{\"route\":\"unstamped\"}",
            "{\"ts\":\"2025-03-01T00:00:00.000Z\",\"route\":\"new\"}",
        ];

        let all: Vec<String> = lines.iter().filter_map(|line| filter_line(line, None)).collect();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|record| record.ends_with('\n')));

        let since = parse_since("2025-02-01T00:00:00Z");
        let recent: Vec<String> = lines
            .iter()
            .filter_map(|line| filter_line(line, since))
            .collect();
        assert_eq!(recent.len(), 1);
        assert!(recent[0].contains("\"new\""));
    }

    async fn export(router: &Router, uri: &str, token: &str) -> Response {
        router
            .clone()
            .oneshot(
                Request::builder()
                    .uri(uri)
                    .header(header::AUTHORIZATION, format!("Bearer {token}"))
                    .body(Body::empty())
                    .expect("request builds"),
            )
            .await
            .expect("response")
    }

    #[tokio::test]
    async fn export_streams_every_matching_line() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("audit.log");
        let mut contents = String::new();
        for day in 1..=20 {
            contents.push_str(&format!(
                "{{\"ts\":\"2025-01-{day:02}T00:00:00.000Z\",\"route\":\"/r/{day}\"}}\n"
            ));
            contents.push_str("garbage\n");
        }
        std::fs::write(&path, contents).expect("log written");

        let tokens = Arc::new(TokenService::new("export-secret", Duration::from_secs(60)));
        let admin = UserRecord::new(
            "admin-1".to_string(),
            "admin@example.com".to_string(),
            "hash".to_string(),
            Role::Admin,
        );
        let token = tokens.issue(&admin, Utc::now()).expect("token issued");
        let router = with_authentication(
            audit_export_router(Arc::new(AuditLogger::new(&path))),
            tokens,
        );

        let response = export(&router, "/audit/export", &token).await;
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = String::from_utf8_lossy(&bytes);
        assert_eq!(body.lines().count(), 20);
        assert!(body.lines().all(|line| line.starts_with('{')));

        let response = export(&router, "/audit/export?since=2025-01-15", &token).await;
        let bytes = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body readable");
        let body = String::from_utf8_lossy(&bytes);
        assert_eq!(body.lines().count(), 6);
        assert!(body.lines().next().is_some_and(|line| line.contains("/r/15")));

        std::fs::remove_file(&path).expect("log removed");
        let missing = export(&router, "/audit/export", &token).await;
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);
    }
}
