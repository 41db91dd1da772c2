//! Remote render job state.
//!
//! ```text
//! Queued ──► Rendering ──► Done
//!   │  ╲         │
//!   │   ╲        └───────► Failed
//!   │    └─(first poll)──► Done
//!   └────────────────────► Failed
//! ```
//!
//! Terminal states never change again.

use serde::{Deserialize, Serialize};

/// Lifecycle state of a remote render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderStatus {
    Queued,
    Rendering,
    Done,
    Failed,
}

impl RenderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Rendering => "rendering",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

/// Body of `GET /render/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteStatus {
    pub status: RenderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RemoteStatus {
    pub fn queued() -> Self {
        Self {
            status: RenderStatus::Queued,
            url: None,
            error: None,
        }
    }

    pub fn rendering() -> Self {
        Self {
            status: RenderStatus::Rendering,
            url: None,
            error: None,
        }
    }

    pub fn done(url: impl Into<String>) -> Self {
        Self {
            status: RenderStatus::Done,
            url: Some(url.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: RenderStatus::Failed,
            url: None,
            error: Some(error.into()),
        }
    }
}

/// Why a status update could not be applied.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("job {id} is already {from:?} and cannot become {to:?}")]
    AlreadyTerminal {
        id: String,
        from: RenderStatus,
        to: RenderStatus,
    },

    #[error("implausible transition for job {id}: {from:?} -> {to:?}")]
    Implausible {
        id: String,
        from: RenderStatus,
        to: RenderStatus,
    },

    #[error("job {id} reported done without a result url")]
    MissingResultUrl { id: String },
}

/// A handle to an in-progress remote render, owned by one supervisor.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub id: String,
    status: RenderStatus,
    result_url: Option<String>,
    error: Option<String>,
    polls: u32,
}

impl RenderJob {
    /// A freshly submitted job.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: RenderStatus::Queued,
            result_url: None,
            error: None,
            polls: 0,
        }
    }

    pub fn status(&self) -> RenderStatus {
        self.status
    }

    pub fn result_url(&self) -> Option<&str> {
        self.result_url.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Status polls applied so far.
    pub fn polls(&self) -> u32 {
        self.polls
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Whether `from -> to` is allowed on poll number `poll` (1-based).
    pub fn is_allowed(from: RenderStatus, to: RenderStatus, poll: u32) -> bool {
        use RenderStatus::*;
        match (from, to) {
            (Queued, Queued) | (Queued, Rendering) | (Queued, Failed) => true,
            (Rendering, Rendering) | (Rendering, Done) | (Rendering, Failed) => true,
            // A job can finish before we ever look at it.
            (Queued, Done) => poll == 1,
            _ => false,
        }
    }

    /// Apply one poll result. On error the job is left unchanged.
    pub fn observe(&mut self, update: RemoteStatus) -> Result<RenderStatus, TransitionError> {
        let poll = self.polls + 1;
        let (from, to) = (self.status, update.status);

        if from.is_terminal() {
            return Err(TransitionError::AlreadyTerminal {
                id: self.id.clone(),
                from,
                to,
            });
        }
        if !Self::is_allowed(from, to, poll) {
            return Err(TransitionError::Implausible {
                id: self.id.clone(),
                from,
                to,
            });
        }

        let result_url = update.url.filter(|url| !url.trim().is_empty());
        if to == RenderStatus::Done && result_url.is_none() {
            return Err(TransitionError::MissingResultUrl {
                id: self.id.clone(),
            });
        }

        self.polls = poll;
        self.status = to;
        match to {
            RenderStatus::Done => self.result_url = result_url,
            RenderStatus::Failed => {
                self.error = Some(
                    update
                        .error
                        .unwrap_or_else(|| "remote render failed without an error message".into()),
                )
            }
            _ => {}
        }
        Ok(to)
    }
}
