// Error types for jobs and persisted configuration

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::models::JobKind;

/// Terminal failure of a single image or chat job.
///
/// Every variant ends the job it belongs to; nothing here is retried.
#[derive(Debug, Error)]
pub enum JobError {
    /// Non-200 reply or a malformed initial response.
    #[error("API error: {message}")]
    Request {
        status: Option<u16>,
        message: String,
    },

    #[error("Failed to download result image: {0}")]
    Download(String),

    #[error("Task succeeded but no output images found")]
    EmptyResult,

    /// The server reported the task as `FAILED`; carries its payload.
    #[error("Image generation failed: {0}")]
    GenerationFailed(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Image task did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("{0} job is already running")]
    Busy(JobKind),
}

impl JobError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Request {
            status,
            message: message.into(),
        }
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Request { .. } => ErrorKind::Request,
            Self::Download(_) => ErrorKind::Download,
            Self::EmptyResult => ErrorKind::EmptyResult,
            Self::GenerationFailed(_) => ErrorKind::GenerationFailed,
            Self::InvalidResponse(_) => ErrorKind::InvalidResponse,
            Self::Io { .. } => ErrorKind::Io,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Busy(_) => ErrorKind::Busy,
        }
    }
}

impl From<reqwest::Error> for JobError {
    fn from(err: reqwest::Error) -> Self {
        Self::request(err.status().map(|s| s.as_u16()), err.to_string())
    }
}

/// Tag carried by job-error events so the UI can label an alert without
/// holding on to the error value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Request,
    Download,
    EmptyResult,
    GenerationFailed,
    InvalidResponse,
    Io,
    Timeout,
    Busy,
}

impl ErrorKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Request => "RequestError",
            Self::Download => "DownloadError",
            Self::EmptyResult => "EmptyResultError",
            Self::GenerationFailed => "GenerationFailedError",
            Self::InvalidResponse => "InvalidResponseError",
            Self::Io => "IOError",
            Self::Timeout => "TimeoutError",
            Self::Busy => "BusyError",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Settings load/save failure. Never fatal: callers log it and carry on with
/// defaults.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        assert_eq!(JobError::EmptyResult.kind().as_str(), "EmptyResultError");
        assert_eq!(
            JobError::request(Some(500), "boom").kind(),
            ErrorKind::Request
        );
        assert_eq!(JobError::Busy(JobKind::Chat).kind().to_string(), "BusyError");
    }

    #[test]
    fn test_messages() {
        let err = JobError::GenerationFailed("{\"task_status\":\"FAILED\"}".to_string());
        assert!(err.to_string().starts_with("Image generation failed"));

        let err = JobError::Timeout(Duration::from_secs(30));
        assert_eq!(err.to_string(), "Image task did not finish within 30s");

        let err = JobError::Busy(JobKind::Image);
        assert_eq!(err.to_string(), "Image job is already running");
    }
}
