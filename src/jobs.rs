// Background image and chat jobs
//
// Each job runs on its own tokio task and reports back only through the
// event channel; nothing here touches UI state.

use std::borrow::Cow;
use std::io::{self, Cursor};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use image::ImageFormat;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::{ChatRequest, ImageGenerationRequest, ModelScopeClient, SseFrame, TaskStatus};
use crate::error::JobError;
use crate::events::{AppEvent, EventSender, JobId};
use crate::models::{AppConfig, Artifact, ChatJob, ImageJob, JobKind};
use crate::storage::ArtifactStore;

/// How often, and for how long, an image task is polled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollPolicy {
    /// Policy from `config.toml`; the interval is at least one second.
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            interval: Duration::from_secs(config.poll_interval.max(1)),
            timeout: Duration::from_secs(config.poll_timeout),
        }
    }

    /// Whether another wait would run past `deadline`. A deadline too far
    /// out to represent never expires.
    fn expires_before_next_poll(&self, deadline: Option<Instant>) -> bool {
        deadline.is_some_and(|deadline| {
            Instant::now()
                .checked_add(self.interval)
                .map_or(true, |next| next > deadline)
        })
    }
}

/// One-job-at-a-time latch for a job kind.
#[derive(Debug, Clone, Default)]
struct JobSlot(Arc<AtomicBool>);

struct SlotGuard(Arc<AtomicBool>);

impl JobSlot {
    fn try_acquire(&self) -> Option<SlotGuard> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SlotGuard(Arc::clone(&self.0)))
    }

    fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug)]
pub struct SubmittedJob {
    pub id: JobId,
    #[allow(dead_code)]
    pub handle: JoinHandle<()>,
}

#[derive(Debug, Clone)]
pub struct JobRunner {
    client: ModelScopeClient,
    artifacts: ArtifactStore,
    events: EventSender,
    poll: PollPolicy,
    chat_max_tokens: Option<u32>,
    image_slot: JobSlot,
    chat_slot: JobSlot,
}

impl JobRunner {
    pub fn new(
        client: ModelScopeClient,
        artifacts: ArtifactStore,
        events: EventSender,
        config: &AppConfig,
    ) -> Self {
        Self {
            client,
            artifacts,
            events,
            poll: PollPolicy::from_config(config),
            chat_max_tokens: config.chat_max_tokens,
            image_slot: JobSlot::default(),
            chat_slot: JobSlot::default(),
        }
    }

    #[allow(dead_code)]
    #[must_use]
    pub const fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    #[allow(dead_code)]
    pub fn is_busy(&self, kind: JobKind) -> bool {
        match kind {
            JobKind::Image => self.image_slot.is_busy(),
            JobKind::Chat => self.chat_slot.is_busy(),
        }
    }

    /// Start an image job. Fails with [`JobError::Busy`] while another image
    /// job is in flight.
    pub fn submit_image(&self, job: ImageJob) -> Result<SubmittedJob, JobError> {
        let guard = self
            .image_slot
            .try_acquire()
            .ok_or(JobError::Busy(JobKind::Image))?;
        let id = Uuid::new_v4();
        let runner = self.clone();

        info!(%id, model = %job.model, size = %job.resolution, "starting image job");
        let handle = tokio::spawn(async move {
            let result = runner.run_image(id, &job).await;
            drop(guard);

            let event = match result {
                Ok(artifact) => {
                    info!(%id, path = %artifact.path.display(), "image job finished");
                    AppEvent::ArtifactCreated { job: id, artifact }
                }
                Err(e) => {
                    warn!(%id, kind = %e.kind(), "image job failed: {e}");
                    AppEvent::failed(id, JobKind::Image, &e)
                }
            };
            let _ = runner.events.send(event);
        });

        Ok(SubmittedJob { id, handle })
    }

    /// Start a chat job. Fails with [`JobError::Busy`] while another chat job
    /// is in flight.
    pub fn submit_chat(&self, job: ChatJob) -> Result<SubmittedJob, JobError> {
        let guard = self
            .chat_slot
            .try_acquire()
            .ok_or(JobError::Busy(JobKind::Chat))?;
        let id = Uuid::new_v4();
        let runner = self.clone();

        info!(%id, model = %job.model, turns = job.messages.len(), streaming = job.streaming, "starting chat job");
        let handle = tokio::spawn(async move {
            let result = runner.run_chat(id, &job).await;
            drop(guard);

            let event = match result {
                Ok(text) => {
                    info!(%id, chars = text.chars().count(), "chat job finished");
                    AppEvent::ChatFinished { job: id, text }
                }
                Err(e) => {
                    warn!(%id, kind = %e.kind(), "chat job failed: {e}");
                    AppEvent::failed(id, JobKind::Chat, &e)
                }
            };
            let _ = runner.events.send(event);
        });

        Ok(SubmittedJob { id, handle })
    }

    async fn run_image(&self, id: JobId, job: &ImageJob) -> Result<Artifact, JobError> {
        let request = ImageGenerationRequest {
            model: job.model.clone(),
            prompt: job.prompt.clone(),
            size: job.resolution.clone(),
        };
        let task_id = self.client.submit_image_task(&job.api_key, &request).await?;
        debug!(%id, %task_id, "polling image task");

        let deadline = Instant::now().checked_add(self.poll.timeout);
        let mut last_status: Option<String> = None;

        loop {
            let report = self.client.task_status(&job.api_key, &task_id).await?;

            match report.status {
                TaskStatus::Succeed => {
                    let url = report
                        .output_images
                        .into_iter()
                        .next()
                        .ok_or(JobError::EmptyResult)?;
                    return self.store_result(&url, job).await;
                }
                TaskStatus::Failed => {
                    return Err(JobError::GenerationFailed(report.raw.to_string()));
                }
                TaskStatus::InProgress(status) => {
                    if last_status.as_deref() != Some(status.as_str()) {
                        let _ = self.events.send(AppEvent::ImageProgress {
                            job: id,
                            status: status.clone(),
                        });
                        last_status = Some(status);
                    }
                }
            }

            if self.poll.expires_before_next_poll(deadline) {
                return Err(JobError::Timeout(self.poll.timeout));
            }
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    async fn store_result(&self, url: &str, job: &ImageJob) -> Result<Artifact, JobError> {
        let bytes = self.client.download(url).await?;
        let store = self.artifacts.clone();
        let details = job.details();

        tokio::task::spawn_blocking(move || {
            let (extension, data) = encode_for_storage(&bytes)?;
            store.save(&data, extension, &details)
        })
        .await
        .map_err(|e| JobError::io("Image worker stopped", io::Error::other(e)))?
    }

    async fn run_chat(&self, id: JobId, job: &ChatJob) -> Result<String, JobError> {
        let request = ChatRequest {
            model: job.model.clone(),
            messages: job.messages.clone(),
            stream: job.streaming,
            max_tokens: self.chat_max_tokens,
        };

        if !job.streaming {
            return self.client.chat(&job.api_key, &request).await;
        }

        let mut frames = self.client.chat_stream(&job.api_key, &request).await?;
        let mut reply = String::new();

        while let Some(frame) = frames.next().await {
            match frame? {
                SseFrame::Delta(text) => {
                    reply.push_str(&text);
                    let _ = self.events.send(AppEvent::ChatDelta { job: id, text });
                }
                SseFrame::Done => break,
            }
        }

        Ok(reply)
    }
}

/// Decode downloaded bytes and choose how to store them.
///
/// JPEG and PNG are kept byte-for-byte; any other decodable format is
/// re-encoded as PNG so the gallery can list it.
fn encode_for_storage(bytes: &[u8]) -> Result<(&'static str, Cow<'_, [u8]>), JobError> {
    let format = image::guess_format(bytes)
        .map_err(|e| JobError::Download(format!("Unrecognized image data: {e}")))?;
    let decoded = image::load_from_memory_with_format(bytes, format)
        .map_err(|e| JobError::Download(format!("Failed to decode image: {e}")))?;

    match format {
        ImageFormat::Jpeg => Ok(("jpg", Cow::Borrowed(bytes))),
        ImageFormat::Png => Ok(("png", Cow::Borrowed(bytes))),
        other => {
            debug!(?other, "re-encoding result image as PNG");
            let mut out = Cursor::new(Vec::new());
            decoded
                .write_to(&mut out, ImageFormat::Png)
                .map_err(|e| JobError::io("Failed to encode image", io::Error::other(e)))?;
            Ok(("png", Cow::Owned(out.into_inner())))
        }
    }
}
