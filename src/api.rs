use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::engine::{MessageDeleter, RemoteDeleteResult, RunContext};

const MAX_DETAIL_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: String, timeout: Duration) -> Result<Self, ApiError> {
        let http = Client::builder()
            .user_agent(concat!("discord-scrubber/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub async fn delete_message(&self, token: &str, channel_id: &str, message_id: &str) -> RemoteDeleteResult {
        let url = format!("{}/channels/{}/messages/{}", self.base_url, channel_id, message_id);
        let response = match self
            .http
            .delete(url)
            .header(reqwest::header::AUTHORIZATION, token)
            .send()
            .await
        {
            Ok(response) => response,
            Err(error) => return RemoteDeleteResult::network_failure(error.to_string()),
        };

        let status = response.status();
        if status.is_success() {
            return RemoteDeleteResult::success();
        }

        let header_hint = retry_after_header(response.headers());
        let body = response.text().await.unwrap_or_default();
        let error_body: Option<ErrorBody> = serde_json::from_str(&body).ok();

        if status == StatusCode::TOO_MANY_REQUESTS {
            let body_hint = error_body
                .as_ref()
                .and_then(|body| body.retry_after)
                .and_then(seconds_to_duration);
            return RemoteDeleteResult::rate_limited(body_hint.or(header_hint));
        }

        let detail = match error_body {
            Some(ErrorBody {
                message: Some(message),
                code: Some(code),
                ..
            }) => Some(format!("{message} (code {code})")),
            Some(ErrorBody {
                message: Some(message),
                ..
            }) => Some(message),
            _ => {
                let trimmed = body.trim();
                (!trimmed.is_empty()).then(|| truncate(trimmed, MAX_DETAIL_CHARS))
            }
        };
        RemoteDeleteResult::rejected(status.as_u16(), detail)
    }
}

impl MessageDeleter for ApiClient {
    async fn delete(&self, context: &RunContext, channel_id: &str, message_id: &str) -> RemoteDeleteResult {
        self.delete_message(context.credential(), channel_id, message_id)
            .await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: Option<String>,
    code: Option<i64>,
    retry_after: Option<f64>,
}

fn retry_after_header(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.trim().parse::<f64>().ok())
        .and_then(seconds_to_duration)
}

// Out-of-range hints (negative, NaN, past Duration::MAX) are dropped so the
// engine falls back to its default wait.
fn seconds_to_duration(seconds: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(seconds).ok()
}

fn truncate(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    let mut output: String = value.chars().take(max_chars).collect();
    output.push_str("...");
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StatusKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ApiClient {
        ApiClient::new(server.uri(), Duration::from_secs(5)).expect("client")
    }

    #[tokio::test]
    async fn no_content_is_success() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/channels/111/messages/222"))
            .and(header("authorization", "secret"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "111", "222").await;
        assert_eq!(result, RemoteDeleteResult::success());
    }

    #[tokio::test]
    async fn rate_limit_reads_body_hint() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "9")
                    .set_body_json(json!({
                        "message": "You are being rate limited.",
                        "retry_after": 1.5,
                        "global": false
                    })),
            )
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "1", "2").await;
        assert_eq!(result.status_kind, StatusKind::RateLimited);
        assert_eq!(result.retry_after, Some(Duration::from_millis(1500)));
    }

    #[tokio::test]
    async fn rate_limit_falls_back_to_header() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "1", "2").await;
        assert_eq!(result.status_kind, StatusKind::RateLimited);
        assert_eq!(result.retry_after, Some(Duration::from_secs(3)));
    }

    #[tokio::test]
    async fn rate_limit_without_hint_leaves_it_empty() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "1", "2").await;
        assert_eq!(result, RemoteDeleteResult::rate_limited(None));
    }

    #[tokio::test]
    async fn not_found_is_client_error_with_detail() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(404).set_body_json(json!({"message": "Unknown Message", "code": 10008})),
            )
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "1", "2").await;
        assert_eq!(result.status_kind, StatusKind::ClientError(404));
        assert_eq!(result.error_detail.as_deref(), Some("Unknown Message (code 10008)"));
    }

    #[tokio::test]
    async fn server_error_keeps_raw_body() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let result = client(&server).delete_message("secret", "1", "2").await;
        assert_eq!(result.status_kind, StatusKind::ServerError(503));
        assert_eq!(result.error_detail.as_deref(), Some("upstream unavailable"));
    }

    #[tokio::test]
    async fn oversized_hints_are_dropped() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("retry-after", "1e20")
                    .set_body_json(json!({"message": "You are being rate limited.", "retry_after": 1e300})),
            )
            .mount(&server)
            .await;

        let result = client(&server).delete_message("t", "1", "2").await;
        assert_eq!(result, RemoteDeleteResult::rate_limited(None));
    }

    #[tokio::test]
    async fn unreachable_host_is_network_failure() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
            listener.local_addr().expect("addr").port()
        };
        let client =
            ApiClient::new(format!("http://127.0.0.1:{port}"), Duration::from_secs(2)).expect("client");
        let result = client.delete_message("secret", "1", "2").await;
        assert_eq!(result.status_kind, StatusKind::NetworkFailure);
        assert!(result.error_detail.is_some());
    }

    #[test]
    fn out_of_range_hints_are_ignored() {
        assert_eq!(seconds_to_duration(-1.0), None);
        assert_eq!(seconds_to_duration(f64::NAN), None);
        assert_eq!(seconds_to_duration(1e20), None);
        assert_eq!(seconds_to_duration(f64::INFINITY), None);
        assert_eq!(seconds_to_duration(0.25), Some(Duration::from_millis(250)));
    }
}
