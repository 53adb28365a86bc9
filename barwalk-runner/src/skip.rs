//! Skip reasons for units of work (symbol, period) that produced no result.

use std::fmt;

use serde::{Deserialize, Serialize};

use barwalk_core::{DataQualityError, EngineError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    InsufficientData { detail: String },
    NoValidCandidates,
    Timeout,
    Cancelled,
    DataQuality { message: String },
    Failed { tag: String, message: String },
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InsufficientData { .. } => "insufficient_data",
            Self::NoValidCandidates => "no_valid_candidates",
            Self::Timeout => "timeout",
            Self::Cancelled => "cancelled",
            Self::DataQuality { .. } => "data_quality",
            Self::Failed { .. } => "failed",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData { detail } => write!(f, "insufficient_data: {detail}"),
            Self::DataQuality { message } => write!(f, "data_quality: {message}"),
            Self::Failed { tag, message } => write!(f, "{tag}: {message}"),
            other => f.write_str(other.as_str()),
        }
    }
}

impl From<&EngineError> for SkipReason {
    fn from(err: &EngineError) -> Self {
        match err {
            EngineError::DataInsufficient { .. } => Self::InsufficientData {
                detail: err.to_string(),
            },
            EngineError::TimedOut { .. } => Self::Timeout,
            EngineError::Cancelled { .. } => Self::Cancelled,
            EngineError::DataQuality(inner) => inner.into(),
            other => Self::Failed {
                tag: other.tag().to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl From<&DataQualityError> for SkipReason {
    fn from(err: &DataQualityError) -> Self {
        Self::DataQuality {
            message: err.to_string(),
        }
    }
}
