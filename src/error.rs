use std::fmt;

use anyhow::Error;
use serde::Serialize;
use serde_json::Value;

/// Error classes local to the capture engine. Capture is best-effort
/// instrumentation: none of these may abort the host generation itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureErrorKind {
    /// Rejected configuration, surfaced before any step runs.
    InvalidConfig,
    /// Directory creation/scan or image write failure. Not retried.
    Io,
    /// Timelapse requested but no frames were captured.
    EmptyTimelapse,
}

impl CaptureErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            Self::InvalidConfig => "invalid_config",
            Self::Io => "io_failure",
            Self::EmptyTimelapse => "empty_timelapse",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CaptureError {
    pub kind: CaptureErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl CaptureError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self {
            kind: CaptureErrorKind::InvalidConfig,
            message: message.into(),
            details: None,
        }
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self {
            kind: CaptureErrorKind::Io,
            message: message.into(),
            details: None,
        }
    }

    pub fn empty_timelapse() -> Self {
        Self {
            kind: CaptureErrorKind::EmptyTimelapse,
            message: "timelapse enabled but no frames were captured".to_owned(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            ok: false,
            error: ErrorEnvelopeBody {
                code: self.kind.code().to_owned(),
                message: self.message.clone(),
                details: self.details.clone(),
            },
        }
    }
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.code(), self.message)
    }
}

impl std::error::Error for CaptureError {}

/// Serializable shape for surfacing a capture failure to the host UI.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    pub ok: bool,
    pub error: ErrorEnvelopeBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelopeBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

pub fn find_capture_error(error: &Error) -> Option<&CaptureError> {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<CaptureError>())
}
