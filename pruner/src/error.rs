use reqwest::StatusCode;

use crate::labels::LabelSet;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid startup parameters.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The HTTP client could not be constructed.
    #[error("failed to build HTTP client")]
    Client(#[source] reqwest::Error),

    /// `GET /metrics` failed after retries; the cycle is aborted.
    #[error("failed to fetch {url}")]
    Fetch {
        url: String,
        #[source]
        source: RequestFailure,
    },

    /// The exposition payload is malformed at `line` (1-based).
    #[error("malformed exposition text at line {line}: {reason}")]
    Parse { line: usize, reason: String },

    /// A sample has no `job` label and cannot be addressed on the gateway.
    #[error("label set {labels} has no `job` label")]
    InvalidLabelSet { labels: LabelSet },

    /// A single group deletion failed after retries.
    #[error("failed to delete {url}")]
    Delete {
        url: String,
        #[source]
        source: RequestFailure,
    },
}

/// Why a request ultimately failed.
#[derive(Debug, thiserror::Error)]
pub enum RequestFailure {
    #[error("gateway responded with {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

impl RequestFailure {
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status(status) => Some(*status),
            Self::Transport(error) => error.status(),
        }
    }
}
