// Request orchestration
//
// One chat turn end to end:
// - Count the request
// - Build the completion request (system prompt, user message, detectors)
// - Open one streaming connection to the detection-augmented API
// - Map connection failures and non-2xx statuses to a failed outcome
// - Drive the moderation processor over the response body
//
// No retries. A failure produces a single terminal error fragment.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use axum::http::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use bytes::Bytes;
use futures_util::stream::{self, Stream, StreamExt};
use futures_util::TryStreamExt;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{Config, UpstreamConfig};
use crate::detectors::DetectorConfig;
use crate::metrics::MetricsAggregator;
use crate::server::{ChatService, TurnStream};
use crate::stream::{
    BlockingPolicy, ByteStream, ModerationProcessor, StreamOutcome, StreamUpdate, TurnError,
    WarningGatedPolicy,
};

// ---------------------------------------------------------------------------
// Outbound request body
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage<'a> {
    pub role: &'static str,
    pub content: &'a str,
}

/// Body of one streaming completion request.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionRequest<'a> {
    pub model: &'a str,
    pub messages: [ChatMessage<'a>; 2],
    pub stream: bool,
    pub detectors: &'a DetectorConfig,
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// Sends the completion request upstream.
#[async_trait]
pub trait HttpSender: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HeaderMap,
    pub body: Bytes,
}

pub type HttpBody = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

pub struct HttpResponse {
    pub status: StatusCode,
    pub body: HttpBody,
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("upstream request timed out: {0}")]
    Timeout(String),
    #[error("upstream request failed: {0}")]
    Transport(String),
}

// ---------------------------------------------------------------------------
// Orchestrator dependencies
// ---------------------------------------------------------------------------

pub struct OrchestratorDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub metrics: Arc<MetricsAggregator>,
    pub policy: Arc<dyn BlockingPolicy>,
}

// ---------------------------------------------------------------------------
// ChatOrchestrator
// ---------------------------------------------------------------------------

pub struct ChatOrchestrator {
    deps: OrchestratorDeps,
    detectors: DetectorConfig,
    processor: ModerationProcessor,
    endpoint: String,
    headers: HeaderMap,
}

impl ChatOrchestrator {
    pub fn new_with(deps: OrchestratorDeps) -> Self {
        let detectors = DetectorConfig::from_rules(&deps.config.rules);
        let processor = ModerationProcessor::new(
            deps.policy.clone(),
            deps.metrics.clone(),
            deps.config.streaming.pacing(),
        );
        let endpoint = deps.config.upstream.endpoint();
        let headers = request_headers(&deps.config.upstream);
        Self {
            deps,
            detectors,
            processor,
            endpoint,
            headers,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn detectors(&self) -> &DetectorConfig {
        &self.detectors
    }

    pub fn build_request<'a>(&'a self, message: &'a str) -> ChatCompletionRequest<'a> {
        let config = &self.deps.config;
        ChatCompletionRequest {
            model: &config.upstream.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &config.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: message,
                },
            ],
            stream: true,
            detectors: &self.detectors,
        }
    }

    /// Start one chat turn.
    ///
    /// The request is counted immediately; the upstream connection opens
    /// when the returned stream is first polled. Dropping the stream
    /// closes the connection.
    pub fn chat(&self, message: &str) -> TurnStream {
        self.deps.metrics.record_request();

        let request_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("turn", request_id = %request_id);

        tracing::info!(
            request_id = %request_id,
            model = %self.deps.config.upstream.model,
            endpoint = %self.endpoint,
            message_chars = message.chars().count(),
            "turn started"
        );

        let body = match serde_json::to_vec(&self.build_request(message)) {
            Ok(body) => Bytes::from(body),
            Err(e) => {
                let outcome = StreamOutcome::Failed(TurnError::Transport(format!(
                    "failed to encode request: {e}"
                )));
                log_outcome(&request_id, &outcome, Instant::now());
                return Box::pin(stream::iter([StreamUpdate::Finished(outcome)]));
            }
        };
        let request = HttpRequest {
            url: self.endpoint.clone(),
            headers: self.headers.clone(),
            body,
        };

        let http = self.deps.http.clone();
        let processor = self.processor.clone();
        let turn_id = request_id.clone();
        let started = Instant::now();

        let turn = async move {
            match open_upstream(http.as_ref(), request, &turn_id).await {
                Ok(body) => span.in_scope(|| processor.process(body)).boxed(),
                Err(err) => stream::iter([StreamUpdate::Finished(StreamOutcome::Failed(err))]).boxed(),
            }
        };

        let updates = stream::once(turn).flatten().inspect(move |update| {
            if let StreamUpdate::Finished(outcome) = update {
                log_outcome(&request_id, outcome, started);
            }
        });
        Box::pin(updates)
    }
}

impl ChatService for ChatOrchestrator {
    fn chat(&self, message: &str) -> TurnStream {
        ChatOrchestrator::chat(self, message)
    }
}

// ---------------------------------------------------------------------------
// Turn helpers
// ---------------------------------------------------------------------------

fn request_headers(upstream: &UpstreamConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));
    if let Some(key) = &upstream.api_key {
        match HeaderValue::try_from(format!("Bearer {key}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("api key is not a valid header value, sending without it"),
        }
    }
    headers
}

async fn open_upstream(
    http: &dyn HttpSender,
    request: HttpRequest,
    request_id: &str,
) -> Result<ByteStream, TurnError> {
    let endpoint = request.url.clone();
    let response = http.send(request).await.map_err(|e| {
        tracing::warn!(request_id, error = %e, "upstream request failed");
        match e {
            HttpError::Connect(detail) => TurnError::Connect {
                endpoint: endpoint.clone(),
                detail,
            },
            HttpError::Timeout(detail) => TurnError::Timeout(detail),
            HttpError::Transport(detail) => TurnError::Transport(detail),
        }
    })?;

    let status = response.status;
    tracing::info!(request_id, status = status.as_u16(), "upstream responded");
    if !status.is_success() {
        return Err(TurnError::Status {
            status: status.as_u16(),
            detail: status_detail(status, &endpoint),
        });
    }

    let body = response.body.map_err(|e| match e {
        HttpError::Timeout(detail) => TurnError::Timeout(detail),
        HttpError::Connect(detail) | HttpError::Transport(detail) => TurnError::Stream(detail),
    });
    Ok(Box::pin(body))
}

/// "Server Error: Internal Server Error for url: ..." after the status code.
fn status_detail(status: StatusCode, endpoint: &str) -> String {
    let class = if status.is_client_error() {
        "Client Error"
    } else {
        "Server Error"
    };
    let reason = status.canonical_reason().unwrap_or("Unknown");
    format!("{class}: {reason} for url: {endpoint}")
}

fn log_outcome(request_id: &str, outcome: &StreamOutcome, started: Instant) {
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
    match outcome {
        StreamOutcome::Suppressed { reason } => tracing::info!(
            request_id,
            outcome = outcome.label(),
            reason = %reason,
            latency_ms,
            "turn finished"
        ),
        StreamOutcome::Completed(text) => tracing::info!(
            request_id,
            outcome = outcome.label(),
            response_chars = text.chars().count(),
            latency_ms,
            "turn finished"
        ),
        StreamOutcome::Empty => tracing::info!(
            request_id,
            outcome = outcome.label(),
            latency_ms,
            "turn finished"
        ),
        StreamOutcome::Failed(err) => tracing::warn!(
            request_id,
            outcome = outcome.label(),
            error_kind = err.kind(),
            error = %err,
            latency_ms,
            "turn finished"
        ),
    }
}

// ---------------------------------------------------------------------------
// Reqwest HTTP sender
// ---------------------------------------------------------------------------

pub struct ReqwestHttpSender {
    client: reqwest::Client,
}

impl ReqwestHttpSender {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with the upstream's TLS and timeout settings. The timeout
    /// bounds connecting and each read, not the whole streamed response.
    pub fn from_config(upstream: &UpstreamConfig) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .danger_accept_invalid_certs(!upstream.verify_tls)
            .connect_timeout(upstream.timeout())
            .read_timeout(upstream.timeout())
            .build()
            .map_err(|e| HttpError::Transport(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(client))
    }
}

fn map_reqwest_error(e: reqwest::Error) -> HttpError {
    if is_timeout(&e) {
        HttpError::Timeout(e.to_string())
    } else if e.is_connect() {
        HttpError::Connect(e.to_string())
    } else {
        HttpError::Transport(e.to_string())
    }
}

/// Read timeouts surface as an io `TimedOut` somewhere in the source chain.
fn is_timeout(e: &reqwest::Error) -> bool {
    if e.is_timeout() {
        return true;
    }
    let mut source = std::error::Error::source(e);
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if io.kind() == std::io::ErrorKind::TimedOut {
                return true;
            }
        }
        source = err.source();
    }
    false
}

#[async_trait]
impl HttpSender for ReqwestHttpSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let resp = self
            .client
            .post(&request.url)
            .headers(request.headers)
            .body(request.body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = resp.status();
        let body = resp.bytes_stream().map_err(map_reqwest_error);
        Ok(HttpResponse {
            status,
            body: Box::pin(body),
        })
    }
}

// ---------------------------------------------------------------------------
// Public factory for the default orchestrator
// ---------------------------------------------------------------------------

pub fn build_orchestrator(
    config: Arc<Config>,
    metrics: Arc<MetricsAggregator>,
) -> Result<ChatOrchestrator, HttpError> {
    let http = ReqwestHttpSender::from_config(&config.upstream)?;
    Ok(ChatOrchestrator::new_with(OrchestratorDeps {
        config,
        http: Arc::new(http),
        metrics,
        policy: Arc::new(WarningGatedPolicy::default()),
    }))
}
