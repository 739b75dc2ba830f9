//! OpenAI-compatible embeddings API client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{EmbeddingError, EmbeddingProvider};

/// Default embeddings endpoint
pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1/embeddings";

/// Default embedding model
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// Request body for embedding API
#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    dimensions: usize,
}

/// Response from embedding API
#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

/// Individual embedding data in response
#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

/// Embedding provider backed by an OpenAI-compatible HTTP API.
pub struct OpenAiEmbeddings {
    api_key: String,
    model: String,
    dimensions: usize,
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl OpenAiEmbeddings {
    /// Create a new provider.
    ///
    /// Uses text-embedding-3-small with 1536 dimensions by default.
    pub fn new(api_key: String, model: Option<String>, dimensions: Option<usize>) -> Self {
        Self {
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            dimensions: dimensions.unwrap_or(crate::DEFAULT_DIMENSIONS),
            client: Client::new(),
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
        }
    }

    /// Set a custom endpoint URL (useful for testing or proxies).
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    /// Set how many times a rate-limited request is retried.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Apply a per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Result<Self, EmbeddingError> {
        self.client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(e.to_string()))?;
        Ok(self)
    }

    /// Send embedding request with retry logic for rate limits.
    async fn send_request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };

        let mut retry_count = 0;
        let mut backoff_secs = 1u64;

        loop {
            debug!(
                "Sending embedding request for {} texts to {}",
                texts.len(),
                self.base_url
            );

            let response = self
                .client
                .post(&self.base_url)
                .header("Authorization", format!("Bearer {}", self.api_key))
                .header("Content-Type", "application/json")
                .json(&request_body)
                .send()
                .await
                .map_err(|e| EmbeddingError::NetworkError(e.to_string()))?;

            let status = response.status();

            if status.is_success() {
                let embedding_response: EmbeddingResponse = response
                    .json()
                    .await
                    .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))?;

                return self.order_embeddings(embedding_response, texts.len());
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                // Try to extract retry-after header
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .unwrap_or(backoff_secs);

                retry_count += 1;
                if retry_count > self.max_retries {
                    return Err(EmbeddingError::RateLimited(retry_after));
                }

                warn!(
                    "Rate limited, retrying after {} seconds (attempt {}/{})",
                    retry_after, retry_count, self.max_retries
                );

                tokio::time::sleep(Duration::from_secs(retry_after)).await;
                backoff_secs *= 2;
                continue;
            }

            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(EmbeddingError::AuthError(format!(
                    "{}: {}",
                    status.as_u16(),
                    error_body
                )));
            }

            return Err(EmbeddingError::ApiError(format!(
                "{}: {}",
                status.as_u16(),
                error_body
            )));
        }
    }

    /// Sort response items by their `index` and check they line up with the input.
    fn order_embeddings(
        &self,
        response: EmbeddingResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if response.data.len() != expected {
            return Err(EmbeddingError::InvalidResponse(format!(
                "expected {} embeddings, got {}",
                expected,
                response.data.len()
            )));
        }

        let mut data = response.data;
        data.sort_by_key(|d| d.index);

        let mut embeddings = Vec::with_capacity(data.len());
        for (position, item) in data.into_iter().enumerate() {
            if item.index != position {
                return Err(EmbeddingError::InvalidResponse(format!(
                    "missing embedding for input {}",
                    position
                )));
            }
            if item.embedding.len() != self.dimensions {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: self.dimensions,
                    actual: item.embedding.len(),
                });
            }
            embeddings.push(item.embedding);
        }

        Ok(embeddings)
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let embeddings = self.embed_batch(&[text.to_string()]).await?;
        embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("No embedding returned".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Embedding batch of {} texts", texts.len());
        self.send_request(texts).await
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    /// Serve exactly one HTTP response, returning the request body it received.
    async fn serve_once(status_line: &str, body: &str) -> (String, JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/v1/embeddings", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            body.len(),
            body
        );

        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 4096];
            let request_body = loop {
                let n = socket.read(&mut chunk).await.unwrap();
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf).to_string();
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let content_length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap())
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + content_length {
                        break text[header_end + 4..].to_string();
                    }
                }
                if n == 0 {
                    break String::new();
                }
            };
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
            request_body
        });

        (url, handle)
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenAiEmbeddings::new("test-key".to_string(), None, None);
        assert_eq!(provider.dimensions(), 1536);
        assert_eq!(provider.model_name(), "text-embedding-3-small");
        assert_eq!(provider.base_url, DEFAULT_BASE_URL);
    }

    #[test]
    fn test_provider_custom_model() {
        let provider = OpenAiEmbeddings::new(
            "test-key".to_string(),
            Some("custom/model".to_string()),
            Some(1024),
        );
        assert_eq!(provider.dimensions(), 1024);
        assert_eq!(provider.model_name(), "custom/model");
    }

    #[tokio::test]
    async fn test_empty_batch_makes_no_request() {
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2))
            .with_base_url("http://127.0.0.1:9/unreachable".to_string());
        let result = provider.embed_batch(&[]).await.unwrap();
        assert!(result.is_empty());
    }

    #[tokio::test]
    async fn test_batch_reordered_by_index() {
        let body = r#"{"data":[
            {"index":1,"embedding":[0.0,1.0]},
            {"index":0,"embedding":[1.0,0.0]}
        ]}"#;
        let (url, server) = serve_once("200 OK", body).await;

        let provider = OpenAiEmbeddings::new("k".to_string(), Some("m".to_string()), Some(2))
            .with_base_url(url);
        let texts = vec!["first".to_string(), "second".to_string()];
        let result = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(result, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);

        let request: serde_json::Value = serde_json::from_str(&server.await.unwrap()).unwrap();
        assert_eq!(request["model"], "m");
        assert_eq!(request["dimensions"], 2);
        assert_eq!(request["input"][1], "second");
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let (url, _server) =
            serve_once("401 Unauthorized", r#"{"error":"bad key"}"#).await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2)).with_base_url(url);

        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::AuthError(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_rate_limit_without_retries() {
        let (url, _server) = serve_once("429 Too Many Requests", "{}").await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2))
            .with_base_url(url)
            .with_max_retries(0);

        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::RateLimited(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_server_error_is_api_error() {
        let (url, _server) = serve_once("500 Internal Server Error", "boom").await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2)).with_base_url(url);

        let err = provider.embed("x").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ApiError(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_count_mismatch_is_invalid_response() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0,0.0]}]}"#;
        let (url, _server) = serve_once("200 OK", body).await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2)).with_base_url(url);

        let texts = vec!["a".to_string(), "b".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_wrong_dimension_rejected() {
        let body = r#"{"data":[{"index":0,"embedding":[1.0,0.0,0.0]}]}"#;
        let (url, _server) = serve_once("200 OK", body).await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2)).with_base_url(url);

        let err = provider.embed("a").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_response() {
        let (url, _server) = serve_once("200 OK", "not json").await;
        let provider = OpenAiEmbeddings::new("k".to_string(), None, Some(2)).with_base_url(url);

        let err = provider.embed("a").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)), "got {:?}", err);
    }
}
