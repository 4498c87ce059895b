//! Delivery of messages and files to a RocketChat instance.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use thiserror::Error;
use tokio_retry::RetryIf;
use url::Url;

use crate::message::{ApiAuth, FileUploadRequest, ProtocolVersion, Request, ValidationError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("error validating RocketChat request: {0}")]
    Validation(#[from] ValidationError),

    #[error("invalid RocketChat endpoint: {0}")]
    InvalidEndpoint(#[from] url::ParseError),

    #[error("room identifier missing")]
    MissingRoom,

    #[error("failed to encode RocketChat request: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to reach RocketChat: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("RocketChat responded with {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("giving up after {attempts} attempt(s): {last}")]
    Exhausted {
        attempts: usize,
        #[source]
        last: Box<DeliveryError>,
    },
}

impl DeliveryError {
    /// Whether another attempt could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            DeliveryError::Transport(err) => !err.is_builder(),
            DeliveryError::Status { .. } => true,
            _ => false,
        }
    }
}

/// Pauses between attempts; one attempt more than there are intervals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    intervals: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(intervals: Vec<Duration>) -> Self {
        Self { intervals }
    }

    pub fn from_millis(millis: &[u64]) -> Self {
        Self::new(millis.iter().copied().map(Duration::from_millis).collect())
    }

    /// Single attempt, no retries.
    pub fn none() -> Self {
        Self::new(Vec::new())
    }

    pub fn intervals(&self) -> &[Duration] {
        &self.intervals
    }

    pub fn max_attempts(&self) -> usize {
        self.intervals.len() + 1
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(vec![Duration::from_secs(1), Duration::from_secs(5)])
    }
}

/// HTTP client for webhook messages and REST uploads.
#[derive(Debug, Clone)]
pub struct RocketChat {
    http: reqwest::Client,
    protocol: ProtocolVersion,
    retry: RetryPolicy,
}

impl RocketChat {
    /// Client with the given per-attempt timeout, current protocol and default retries.
    pub fn new(timeout: Duration) -> Result<Self, DeliveryError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            protocol: ProtocolVersion::default(),
            retry: RetryPolicy::default(),
        })
    }

    pub fn with_protocol(mut self, protocol: ProtocolVersion) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn protocol(&self) -> ProtocolVersion {
        self.protocol
    }

    /// Validate `request` and POST it as JSON to the webhook at `endpoint`.
    pub async fn send(&self, endpoint: &str, request: Request) -> Result<(), DeliveryError> {
        let request = request.normalize()?;
        let url = Url::parse(endpoint)?;
        let body = request.encode(self.protocol)?;

        let (http, url, body) = (&self.http, &url, &body);
        self.retrying("send", move || async move {
            let response = http
                .post(url.clone())
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone())
                .send()
                .await?;
            ensure_success(response).await
        })
        .await?;

        tracing::info!(channel = %request.channel, "notification delivered");
        Ok(())
    }

    /// Upload a file into a room via `<endpoint>/api/v1/rooms.upload/<room>`.
    pub async fn upload_file(
        &self,
        endpoint: &str,
        auth: &ApiAuth,
        upload: FileUploadRequest,
    ) -> Result<(), DeliveryError> {
        if upload.room_id.is_empty() {
            return Err(DeliveryError::MissingRoom);
        }

        let mut url = upload_url(endpoint, &upload.room_id)?;
        let mime = mime_guess::from_path(&upload.file_name).first_or_octet_stream();
        let protocol = self.protocol;

        if protocol == ProtocolVersion::Legacy {
            let params: Vec<(&str, &str)> = [
                ("msg", non_empty(&upload.message)),
                ("description", non_empty(&upload.description)),
            ]
            .into_iter()
            .filter_map(|(key, value)| value.map(|v| (key, v)))
            .collect();
            if !params.is_empty() {
                url.query_pairs_mut().extend_pairs(params);
            }
        }

        let (http, url, upload_ref, mime) = (&self.http, &url, &upload, &mime);
        self.retrying("upload", move || async move {
            let builder = http
                .post(url.clone())
                .header("X-User-Id", auth.user_id.as_str())
                .header("X-Auth-Token", auth.token.as_str());
            let builder = match protocol {
                ProtocolVersion::Current => builder.multipart(upload_form(upload_ref, mime)?),
                ProtocolVersion::Legacy => builder
                    .header(CONTENT_TYPE, mime.essence_str())
                    .body(upload_ref.data.clone()),
            };
            ensure_success(builder.send().await?).await
        })
        .await?;

        tracing::info!(room = %upload.room_id, file = %upload.file_name, "file uploaded");
        Ok(())
    }

    async fn retrying<F, Fut>(&self, operation: &'static str, mut attempt: F) -> Result<(), DeliveryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), DeliveryError>>,
    {
        let attempts = AtomicUsize::new(0);
        let max_attempts = self.retry.max_attempts();

        let result = RetryIf::spawn(
            self.retry.intervals.clone(),
            || {
                let n = attempts.fetch_add(1, Ordering::SeqCst) + 1;
                tracing::debug!(operation, attempt = n, max_attempts, "posting to RocketChat");
                attempt()
            },
            |err: &DeliveryError| {
                let transient = err.is_transient();
                if transient {
                    tracing::warn!(
                        operation,
                        attempt = attempts.load(Ordering::SeqCst),
                        max_attempts,
                        error = %err,
                        "RocketChat request failed"
                    );
                }
                transient
            },
        )
        .await;

        match result {
            Err(err) if err.is_transient() => Err(DeliveryError::Exhausted {
                attempts: attempts.load(Ordering::SeqCst),
                last: Box::new(err),
            }),
            other => other,
        }
    }
}

/// Anything that can deliver a message; the orchestrator talks to this.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, request: Request) -> Result<(), DeliveryError>;
}

/// A [`RocketChat`] client bound to one incoming webhook.
#[derive(Debug, Clone)]
pub struct Webhook {
    client: RocketChat,
    endpoint: String,
}

impl Webhook {
    pub fn new(client: RocketChat, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Notifier for Webhook {
    async fn notify(&self, request: Request) -> Result<(), DeliveryError> {
        self.client.send(&self.endpoint, request).await
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<(), DeliveryError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(DeliveryError::Status { status, body })
}

fn upload_url(endpoint: &str, room_id: &str) -> Result<Url, url::ParseError> {
    Url::parse(&format!(
        "{}/api/v1/rooms.upload/{}",
        endpoint.trim_end_matches('/'),
        room_id
    ))
}

fn upload_form(upload: &FileUploadRequest, mime: &mime_guess::Mime) -> Result<Form, DeliveryError> {
    let part = Part::bytes(upload.data.clone())
        .file_name(upload.file_name.clone())
        .mime_str(mime.essence_str())?;

    let mut form = Form::new().part("file", part);
    if let Some(msg) = non_empty(&upload.message) {
        form = form.text("msg", msg.to_string());
    }
    if let Some(description) = non_empty(&upload.description) {
        form = form.text("description", description.to_string());
    }
    Ok(form)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}
