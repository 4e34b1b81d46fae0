// ModelScope inference API client

pub mod stream;

use anyhow::{Context, Result};
use bytes::Bytes;
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::error::JobError;
use crate::models::ChatTurn;

pub use stream::{FrameStream, SseFrame};

const ASYNC_MODE_HEADER: &str = "X-ModelScope-Async-Mode";
const TASK_TYPE_HEADER: &str = "X-ModelScope-Task-Type";

#[derive(Debug, Clone)]
pub struct ModelScopeClient {
    base_url: String,
    client: Client,
}

#[derive(Debug, Serialize)]
pub struct ImageGenerationRequest {
    pub model: String,
    pub prompt: String,
    pub size: String,
}

#[derive(Debug, Deserialize)]
struct TaskCreated {
    #[serde(default)]
    task_id: Option<String>,
}

/// Lifecycle state reported by the task endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskStatus {
    Succeed,
    Failed,
    /// Anything else (`PENDING`, `RUNNING`, ...): keep polling.
    InProgress(String),
}

impl TaskStatus {
    fn parse(raw: &str) -> Self {
        match raw {
            "SUCCEED" => Self::Succeed,
            "FAILED" => Self::Failed,
            other => Self::InProgress(other.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TaskReport {
    pub status: TaskStatus,
    pub output_images: Vec<String>,
    /// Full response body, kept for failure reports.
    pub raw: serde_json::Value,
}

#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatTurn>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: Option<ApiErrorBody>,
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default, alias = "requestId")]
    request_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: Option<serde_json::Value>,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Render an error reply as `"<status> [code] (type): message | req: id"`.
///
/// Falls back to the raw body when it isn't the API's JSON error envelope.
pub fn describe_api_error(status: StatusCode, body: &str) -> String {
    let Ok(envelope) = serde_json::from_str::<ApiErrorEnvelope>(body) else {
        return format!("{}: {}", status.as_u16(), body.trim());
    };

    let inner = envelope.error.as_ref();
    let code = inner
        .and_then(|e| e.code.clone())
        .or(envelope.code)
        .map(|code| match code {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    let kind = inner.and_then(|e| e.kind.clone()).or(envelope.kind);
    let message = inner
        .and_then(|e| e.message.clone())
        .or(envelope.message)
        .unwrap_or_else(|| body.trim().to_string());

    let mut detail = status.as_u16().to_string();
    if let Some(code) = code {
        detail.push_str(&format!(" [{code}]"));
    }
    if let Some(kind) = kind {
        detail.push_str(&format!(" ({kind})"));
    }
    detail.push_str(": ");
    detail.push_str(&message);
    if let Some(id) = envelope.request_id.filter(|id| !id.is_empty()) {
        detail.push_str(&format!(" | req: {id}"));
    }
    detail
}

async fn ensure_ok(response: Response) -> Result<Response, JobError> {
    let status = response.status();
    if status == StatusCode::OK {
        return Ok(response);
    }
    let text = response.text().await.unwrap_or_default();
    Err(JobError::request(
        Some(status.as_u16()),
        describe_api_error(status, &text),
    ))
}

impl ModelScopeClient {
    pub fn new(base_url: impl Into<String>, request_timeout: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout))
            .build()
            .context("Failed to create HTTP client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create an async image task and return its id.
    pub async fn submit_image_task(
        &self,
        api_key: &str,
        request: &ImageGenerationRequest,
    ) -> Result<String, JobError> {
        let url = format!("{}/images/generations", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header(ASYNC_MODE_HEADER, "true")
            .json(request)
            .send()
            .await?;
        let response = ensure_ok(response).await?;

        let text = response.text().await?;
        let created: TaskCreated = serde_json::from_str(&text)
            .map_err(|_| JobError::request(Some(200), format!("No task_id: {text}")))?;

        match created.task_id {
            Some(id) if !id.is_empty() => {
                debug!(task_id = %id, "image task created");
                Ok(id)
            }
            _ => Err(JobError::request(Some(200), format!("No task_id: {text}"))),
        }
    }

    pub async fn task_status(&self, api_key: &str, task_id: &str) -> Result<TaskReport, JobError> {
        let url = format!("{}/tasks/{task_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(api_key)
            .header(TASK_TYPE_HEADER, "image_generation")
            .send()
            .await?;
        let response = ensure_ok(response).await?;

        let raw: serde_json::Value = response
            .json()
            .await
            .map_err(|e| JobError::InvalidResponse(format!("Task status: {e}")))?;

        let status = raw
            .get("task_status")
            .and_then(serde_json::Value::as_str)
            .map(TaskStatus::parse)
            .ok_or_else(|| JobError::InvalidResponse(format!("Task status missing: {raw}")))?;

        let output_images = raw
            .get("output_images")
            .and_then(serde_json::Value::as_array)
            .map(|urls| {
                urls.iter()
                    .filter_map(|url| url.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(TaskReport {
            status,
            output_images,
            raw,
        })
    }

    /// Fetch a result image. Every failure here is a download error.
    pub async fn download(&self, url: &str) -> Result<Bytes, JobError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| JobError::Download(e.to_string()))?;

        if !response.status().is_success() {
            return Err(JobError::Download(format!(
                "{url} returned {}",
                response.status()
            )));
        }

        response
            .bytes()
            .await
            .map_err(|e| JobError::Download(e.to_string()))
    }

    /// Single-shot chat completion; returns `choices[0].message.content`.
    pub async fn chat(&self, api_key: &str, request: &ChatRequest) -> Result<String, JobError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(request)
            .send()
            .await?;
        let response = ensure_ok(response).await?;

        let text = response.text().await?;
        let data: serde_json::Value = serde_json::from_str(&text)
            .map_err(|_| JobError::InvalidResponse(text.clone()))?;

        data.pointer("/choices/0/message/content")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| JobError::InvalidResponse(data.to_string()))
    }

    /// Streaming chat completion, decoded into server-sent-event frames.
    pub async fn chat_stream(
        &self,
        api_key: &str,
        request: &ChatRequest,
    ) -> Result<FrameStream, JobError> {
        let url = format!("{}/chat/completions", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await?;
        let response = ensure_ok(response).await?;

        Ok(stream::sse_frames(response.bytes_stream()))
    }
}
