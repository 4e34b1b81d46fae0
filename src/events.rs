// Event types for async communication between job workers and the UI loop

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{ErrorKind, JobError};
use crate::models::{Artifact, JobKind};

pub type JobId = Uuid;

pub type EventSender = mpsc::UnboundedSender<AppEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<AppEvent>;

#[derive(Debug, Clone)]
pub enum AppEvent {
    /// The image task reported a non-terminal status while polling
    ImageProgress { job: JobId, status: String },
    /// An image job succeeded and its artifact is on disk
    ArtifactCreated { job: JobId, artifact: Artifact },
    /// A fragment of streamed chat content
    ChatDelta { job: JobId, text: String },
    /// Chat completed; `text` is the full assistant reply
    ChatFinished { job: JobId, text: String },
    /// A job ended with an error
    JobFailed {
        job: JobId,
        kind: JobKind,
        error: ErrorKind,
        message: String,
    },
}

impl AppEvent {
    pub fn failed(job: JobId, kind: JobKind, error: &JobError) -> Self {
        Self::JobFailed {
            job,
            kind,
            error: error.kind(),
            message: error.to_string(),
        }
    }

    pub const fn job(&self) -> JobId {
        match self {
            Self::ImageProgress { job, .. }
            | Self::ArtifactCreated { job, .. }
            | Self::ChatDelta { job, .. }
            | Self::ChatFinished { job, .. }
            | Self::JobFailed { job, .. } => *job,
        }
    }

    /// Whether this is the last event its job will send.
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::ArtifactCreated { .. } | Self::ChatFinished { .. } | Self::JobFailed { .. }
        )
    }
}

pub fn channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}
