use axum::body::{Body, HttpBody};
use axum::extract::Request;
use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use http_body_util::BodyExt;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Response bodies above this size are not copied into the log.
const MAX_LOGGED_BODY: u64 = 16 * 1024;

#[derive(Debug, Clone, Serialize)]
pub struct RequestSummary {
    pub method: String,
    pub uri: String,
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseSummary {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExchangeRecord {
    pub request: RequestSummary,
    pub response: ResponseSummary,
    pub elapsed_ms: u64,
}

fn header_map(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if *name == AUTHORIZATION {
                "<redacted>".to_string()
            } else {
                String::from_utf8_lossy(value.as_bytes()).into_owned()
            };
            (name.as_str().to_string(), shown)
        })
        .collect()
}

impl RequestSummary {
    pub fn from_request(req: &Request) -> Self {
        Self {
            method: req.method().to_string(),
            uri: req.uri().to_string(),
            headers: header_map(req.headers()),
        }
    }
}

/// Pure: combine both halves of an exchange into one log record.
pub fn exchange_record(
    request: RequestSummary,
    response: ResponseSummary,
    elapsed: Duration,
) -> ExchangeRecord {
    ExchangeRecord {
        request,
        response,
        elapsed_ms: elapsed.as_millis().min(u64::MAX as u128) as u64,
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/json"))
}

/// Buffer a small JSON body so it can be logged, then hand it back intact.
async fn capture_body(response: Response) -> (Response, Option<String>) {
    let small = response
        .body()
        .size_hint()
        .upper()
        .is_some_and(|n| n <= MAX_LOGGED_BODY);
    if !small || !is_json(response.headers()) {
        return (response, None);
    }

    let (parts, body) = response.into_parts();
    match body.collect().await {
        Ok(collected) => {
            let bytes = collected.to_bytes();
            let text = String::from_utf8_lossy(&bytes).into_owned();
            (Response::from_parts(parts, Body::from(bytes)), Some(text))
        }
        Err(e) => {
            warn!(error = %e, "could not buffer response body for logging");
            (Response::from_parts(parts, Body::empty()), None)
        }
    }
}

/// Middleware wrapping every handler: one `http` log line per exchange.
pub async fn log_exchange(request: Request, next: Next) -> Response {
    let summary = RequestSummary::from_request(&request);
    let started = Instant::now();

    let response = next.run(request).await;
    let status = response.status().as_u16();
    let headers = header_map(response.headers());
    let (response, body) = capture_body(response).await;

    let record = exchange_record(
        summary,
        ResponseSummary {
            status,
            headers,
            body,
        },
        started.elapsed(),
    );
    info!(
        target: "http",
        method = %record.request.method,
        uri = %record.request.uri,
        status = record.response.status,
        elapsed_ms = record.elapsed_ms,
        exchange = %serde_json::to_string(&record).unwrap_or_default(),
        "request handled"
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn test_authorization_is_redacted() {
        let req = Request::builder()
            .method("PUT")
            .uri("/plants/abc?x=1")
            .header("authorization", "eyJhbGciOi.secret.sig")
            .header("x-request-id", "r-1")
            .body(Body::empty())
            .unwrap();

        let summary = RequestSummary::from_request(&req);
        assert_eq!(summary.method, "PUT");
        assert_eq!(summary.uri, "/plants/abc?x=1");
        assert_eq!(summary.headers["authorization"], "<redacted>");
        assert_eq!(summary.headers["x-request-id"], "r-1");
    }

    #[test]
    fn test_exchange_record_serializes() {
        let req = Request::builder().uri("/plants").body(Body::empty()).unwrap();
        let record = exchange_record(
            RequestSummary::from_request(&req),
            ResponseSummary {
                status: 200,
                headers: BTreeMap::new(),
                body: Some("[]".to_string()),
            },
            Duration::from_millis(12),
        );
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["elapsed_ms"], 12);
        assert_eq!(value["response"]["body"], "[]");
        assert_eq!(value["request"]["method"], "GET");
    }

    #[tokio::test]
    async fn test_captured_body_is_preserved() {
        let response = Response::builder()
            .status(StatusCode::OK)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"message":"ok"}"#))
            .unwrap();

        let (response, logged) = capture_body(response).await;
        assert_eq!(logged.as_deref(), Some(r#"{"message":"ok"}"#));
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], br#"{"message":"ok"}"#);
    }

    #[tokio::test]
    async fn test_non_json_body_not_captured() {
        let response = Response::builder()
            .header(CONTENT_TYPE, "image/png")
            .body(Body::from("binary"))
            .unwrap();
        let (_, logged) = capture_body(response).await;
        assert!(logged.is_none());
    }
}
