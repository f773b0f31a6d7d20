use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;
use uuid::Uuid;

use super::http::{send_with_retry, RetryPolicy};
use crate::credentials::Secret;

/// Crate version, sent in the User-Agent
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Longest upstream error body kept in an error message
const MAX_ERROR_BODY: usize = 512;

/// How a request authenticates against its provider
#[derive(Debug, Clone, Copy)]
pub enum Auth<'a> {
    /// `Authorization: Bearer <key>` (Replicate)
    Bearer(&'a Secret),
    /// `x-goog-api-key: <key>` (Gemini)
    GoogApiKey(&'a Secret),
}

impl Auth<'_> {
    fn apply(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self {
            Auth::Bearer(key) => request.bearer_auth(key.expose()),
            Auth::GoogApiKey(key) => request.header("x-goog-api-key", key.expose()),
        }
    }
}

/// Shared HTTP client for upstream providers.
///
/// One `reqwest::Client` per server, so connections are pooled across
/// requests and providers.
#[derive(Debug, Clone)]
pub struct UpstreamClient {
    client: Client,
    retry: RetryPolicy,
}

impl UpstreamClient {
    /// Create a client whose requests time out after `timeout` and are
    /// retried on transient failures according to `retry`.
    pub fn new(timeout: Duration, retry: RetryPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(format!("solus/{}", VERSION))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client, retry })
    }

    /// POST a JSON body and decode a JSON response.
    pub async fn post_json<T, R>(
        &self,
        url: &Url,
        auth: Auth<'_>,
        extra_headers: &[(&str, &str)],
        body: &T,
    ) -> Result<R>
    where
        T: Serialize,
        R: DeserializeOwned,
    {
        let request_id = Uuid::new_v4().to_string();
        debug!("POST {} (request {})", url, request_id);

        let response = send_with_retry(self.retry, || {
            let mut request = self
                .client
                .post(url.clone())
                .header("x-request-id", &request_id);
            for (name, value) in extra_headers {
                request = request.header(*name, *value);
            }
            auth.apply(request).json(body)
        })
        .await
        .with_context(|| format!("Failed to send request to {}", url))?;

        decode_response(response).await
    }

    /// GET and decode a JSON response.
    pub async fn get_json<R>(&self, url: &Url, auth: Auth<'_>) -> Result<R>
    where
        R: DeserializeOwned,
    {
        debug!("GET {}", url);

        let response = send_with_retry(self.retry, || auth.apply(self.client.get(url.clone())))
            .await
            .with_context(|| format!("Failed to send request to {}", url))?;

        decode_response(response).await
    }

    /// POST a JSON body and hand back the successful response unread, for
    /// streaming bodies.
    pub async fn post_stream<T>(&self, url: &Url, auth: Auth<'_>, body: &T) -> Result<Response>
    where
        T: Serialize,
    {
        let request_id = Uuid::new_v4().to_string();
        debug!("POST {} (stream, request {})", url, request_id);

        let response = send_with_retry(self.retry, || {
            let request = self
                .client
                .post(url.clone())
                .header("x-request-id", &request_id);
            auth.apply(request).json(body)
        })
        .await
        .with_context(|| format!("Failed to send request to {}", url))?;

        ensure_success(response).await
    }
}

/// Turn a non-success response into an error carrying its (truncated) body.
async fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    debug!("Upstream status: {}", status);
    if status.is_success() {
        return Ok(response);
    }

    let text = response.text().await.unwrap_or_default();
    anyhow::bail!(
        "Upstream request failed with status {}: {}",
        status,
        truncate(&text, MAX_ERROR_BODY)
    );
}

async fn decode_response<R: DeserializeOwned>(response: Response) -> Result<R> {
    let text = ensure_success(response)
        .await?
        .text()
        .await
        .context("Failed to read upstream response body")?;

    serde_json::from_str(&text).context("Failed to parse upstream response")
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::api::stub::{self, Canned};
    use serde_json::Value;
    use std::sync::atomic::Ordering;

    fn fast_client() -> UpstreamClient {
        let retry = RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(5),
        };
        UpstreamClient::new(Duration::from_secs(5), retry).unwrap()
    }

    #[tokio::test]
    async fn test_retries_transient_status_then_decodes() {
        let server = stub::serve(vec![
            Canned::json(503, r#"{"error":"overloaded"}"#),
            Canned::json(200, r#"{"ok":true}"#),
        ])
        .await;
        let key = Secret::new("r8_key");

        let value: Value = fast_client()
            .post_json(&server.url("v1/thing"), Auth::Bearer(&key), &[], &"hi")
            .await
            .unwrap();
        assert_eq!(value["ok"], true);
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);

        let requests = server.requests();
        assert!(requests[1].starts_with("POST /v1/thing "));
        assert!(requests[1].contains("authorization: Bearer r8_key"));
        // Same request id on every retry
        let id = |r: &str| {
            r.lines()
                .find(|l| l.starts_with("x-request-id:"))
                .map(str::to_string)
        };
        assert_eq!(id(&requests[0]), id(&requests[1]));
    }

    #[tokio::test]
    async fn test_client_error_is_not_retried() {
        let server = stub::serve(vec![Canned::json(400, r#"{"error":"bad prompt"}"#)]).await;
        let key = Secret::new("AIza_key");

        let err = fast_client()
            .get_json::<Value>(&server.url("models"), Auth::GoogApiKey(&key))
            .await
            .unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("400"));
        assert!(message.contains("bad prompt"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries() {
        let server = stub::serve(vec![Canned::json(503, "{}"); 3]).await;
        let key = Secret::new("r8_key");

        let err = fast_client()
            .post_json::<_, Value>(&server.url("x"), Auth::Bearer(&key), &[], &"hi")
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("503"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_auth_headers() {
        let key = Secret::new("secret-key");
        let client = Client::new();

        let request = Auth::Bearer(&key)
            .apply(client.get("https://api.replicate.com/v1/predictions/x"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("authorization").unwrap(),
            "Bearer secret-key"
        );

        let request = Auth::GoogApiKey(&key)
            .apply(client.get("https://generativelanguage.googleapis.com/v1beta/models"))
            .build()
            .unwrap();
        assert_eq!(request.headers().get("x-goog-api-key").unwrap(), "secret-key");
        // Key never travels in the URL
        assert!(!request.url().as_str().contains("secret-key"));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("abcdef", 3), "abc");
        assert_eq!(truncate("héllo", 2), "h");
    }
}
