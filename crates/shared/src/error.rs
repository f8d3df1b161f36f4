use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NetworkError,
    HttpError,
    DecodeError,
}

/// Every way a catalog read can fail. Gateways return this instead of
/// propagating transport errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("network error: {detail}")]
    Network { detail: String },
    #[error("http error {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("decode error: {detail}")]
    Decode { detail: String },
}

impl FetchFailure {
    pub fn network(detail: impl Into<String>) -> Self {
        Self::Network {
            detail: detail.into(),
        }
    }

    pub fn http(status: u16, detail: impl Into<String>) -> Self {
        Self::Http {
            status,
            detail: detail.into(),
        }
    }

    pub fn decode(detail: impl Into<String>) -> Self {
        Self::Decode {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            FetchFailure::Network { .. } => FailureKind::NetworkError,
            FetchFailure::Http { .. } => FailureKind::HttpError,
            FetchFailure::Decode { .. } => FailureKind::DecodeError,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            FetchFailure::Network { detail }
            | FetchFailure::Http { detail, .. }
            | FetchFailure::Decode { detail } => detail,
        }
    }
}
