//! Authenticated HTTP calls to providers

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::{Stream, StreamExt, stream};
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};
use secrecy::ExposeSecret;

use crate::dialect::RequestPayload;
use crate::error::{CallPhase, LlmError};
use crate::provider::{Dialect, ProviderConfig};

/// Upstream error bodies are cut to this many bytes
const MAX_ERROR_BODY: usize = 512;

/// Raw reads of a streamed response body
///
/// Finite and not restartable. Dropping it closes the connection.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Pooled HTTP client for one provider
#[derive(Debug, Clone)]
pub struct Transport {
    client: Client,
}

impl Transport {
    /// Build the client with the provider's connect timeout
    pub fn new(provider: &ProviderConfig) -> Result<Self, LlmError> {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));

        let client = Client::builder()
            .connect_timeout(provider.connect_timeout)
            .pool_idle_timeout(Some(Duration::from_secs(30)))
            .tcp_nodelay(true)
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .default_headers(headers)
            .build()
            .map_err(|e| LlmError::InvalidConfig {
                provider: provider.name.clone(),
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self { client })
    }

    /// Perform a blocking call and return the full response body
    pub async fn send(
        &self,
        provider: &ProviderConfig,
        model: &str,
        payload: &RequestPayload,
    ) -> Result<Bytes, LlmError> {
        let phase = CallPhase::Blocking;
        let request = self.request(provider, model, payload, false)?.timeout(provider.timeout);

        let response = request.send().await.map_err(|e| transport_error(provider, phase, e))?;
        let response = check_status(provider, phase, response).await?;

        response.bytes().await.map_err(|e| transport_error(provider, phase, e))
    }

    /// Open a streamed call
    ///
    /// Resolves once response headers arrive. Each later read must arrive
    /// within the provider timeout. A body that breaks off mid-read yields
    /// `TruncatedStream`.
    pub async fn open_stream(
        &self,
        provider: &ProviderConfig,
        model: &str,
        payload: &RequestPayload,
    ) -> Result<FrameStream, LlmError> {
        let phase = CallPhase::Streaming;
        let request = self.request(provider, model, payload, true)?;

        let response = tokio::time::timeout(provider.timeout, request.send())
            .await
            .map_err(|_| idle_timeout(&provider.name, provider.timeout))?
            .map_err(|e| transport_error(provider, phase, e))?;
        let response = check_status(provider, phase, response).await?;

        let reads = BodyReads {
            body: Box::pin(response.bytes_stream()),
            provider: provider.name.clone(),
            idle: provider.timeout,
            received: 0,
            done: false,
        };

        Ok(Box::pin(stream::unfold(reads, BodyReads::next)))
    }

    fn request(
        &self,
        provider: &ProviderConfig,
        model: &str,
        payload: &RequestPayload,
        streaming: bool,
    ) -> Result<RequestBuilder, LlmError> {
        let mut url = provider.endpoint(model, streaming)?;

        if provider.dialect == Dialect::Gemini
            && let Some(key) = &provider.api_key
        {
            url.query_pairs_mut().append_pair("key", key.expose_secret());
        }

        let mut request = self
            .client
            .post(url)
            .header(header::CONTENT_TYPE, "application/json")
            .body(payload.body.clone());

        if provider.dialect == Dialect::HuggingFace
            && let Some(key) = &provider.api_key
        {
            request = request.bearer_auth(key.expose_secret());
        }

        Ok(request)
    }
}

struct BodyReads {
    body: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    provider: String,
    idle: Duration,
    received: u64,
    done: bool,
}

impl BodyReads {
    async fn next(mut self) -> Option<(Result<Bytes, LlmError>, Self)> {
        if self.done {
            return None;
        }

        let item = match tokio::time::timeout(self.idle, self.body.next()).await {
            Err(_) => Err(idle_timeout(&self.provider, self.idle)),
            Ok(None) => return None,
            Ok(Some(Ok(bytes))) => {
                self.received += bytes.len() as u64;
                return Some((Ok(bytes), self));
            }
            Ok(Some(Err(e))) if e.is_timeout() => Err(idle_timeout(&self.provider, self.idle)),
            Ok(Some(Err(e))) => {
                tracing::warn!(
                    provider = %self.provider,
                    received_bytes = self.received,
                    error = %e.without_url(),
                    "stream body ended unexpectedly"
                );
                Err(LlmError::TruncatedStream {
                    provider: self.provider.clone(),
                    received_bytes: self.received,
                })
            }
        };

        self.done = true;
        Some((item, self))
    }
}

fn idle_timeout(provider: &str, limit: Duration) -> LlmError {
    tracing::warn!(provider = %provider, timeout = ?limit, "upstream timed out");

    LlmError::CompletionFailed {
        provider: provider.to_owned(),
        phase: CallPhase::Streaming,
        status: None,
        message: format!("no data received within {limit:?}"),
    }
}

/// Connection and read failures; the URL is stripped since it may carry the key
fn transport_error(provider: &ProviderConfig, phase: CallPhase, error: reqwest::Error) -> LlmError {
    let error = error.without_url();
    tracing::error!(provider = %provider.name, phase = %phase, error = %error, "upstream request failed");

    LlmError::CompletionFailed {
        provider: provider.name.clone(),
        phase,
        status: error.status().map(|s| s.as_u16()),
        message: error.to_string(),
    }
}

async fn check_status(provider: &ProviderConfig, phase: CallPhase, response: Response) -> Result<Response, LlmError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    // An error body that stalls must not outlive the provider timeout
    let body = match tokio::time::timeout(provider.timeout, response.text()).await {
        Ok(body) => body.unwrap_or_default(),
        Err(_) => {
            tracing::warn!(provider = %provider.name, timeout = ?provider.timeout, "upstream error body timed out");
            String::new()
        }
    };
    tracing::warn!(provider = %provider.name, status = %status, "upstream returned error");

    Err(LlmError::CompletionFailed {
        provider: provider.name.clone(),
        phase,
        status: Some(status.as_u16()),
        message: truncate(&body, MAX_ERROR_BODY).to_owned(),
    })
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
