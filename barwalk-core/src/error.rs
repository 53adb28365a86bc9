//! Engine error taxonomy.
//!
//! Every variant except `LookaheadViolation` is recoverable at the unit
//! boundary (one symbol, one walk-forward period, one grid candidate). A
//! lookahead violation means the decision path read data it must not see;
//! results produced after that point cannot be trusted, so it halts the run.

use chrono::NaiveDate;
use thiserror::Error;

use crate::domain::bar::DataQualityError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("insufficient data for {context}: need {required} bars, have {available}")]
    DataInsufficient {
        context: String,
        required: usize,
        available: usize,
    },

    #[error("invalid parameter '{name}': {reason}")]
    InvalidParameter { name: String, reason: String },

    #[error("indicator '{name}' returned {actual} values for {expected} bars")]
    LengthMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("lookahead violation: decision for bar {decision_index} read index {requested}")]
    LookaheadViolation {
        decision_index: usize,
        requested: usize,
    },

    #[error("malformed bar at index {index} ({date}): {reason}")]
    Execution {
        index: usize,
        date: NaiveDate,
        reason: String,
    },

    #[error("unknown strategy: {0}")]
    UnknownStrategy(String),

    #[error(transparent)]
    DataQuality(#[from] DataQualityError),

    #[error("run timed out at bar {bar_index}")]
    TimedOut { bar_index: usize },

    #[error("run cancelled at bar {bar_index}")]
    Cancelled { bar_index: usize },
}

impl EngineError {
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Invariant violations halt the whole optimization; everything else is
    /// recorded in a skip list by the orchestrator.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LookaheadViolation { .. })
    }

    /// Short machine-readable tag used in skip lists and reports.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::DataInsufficient { .. } => "insufficient_data",
            Self::InvalidParameter { .. } => "invalid_parameter",
            Self::LengthMismatch { .. } => "length_mismatch",
            Self::LookaheadViolation { .. } => "lookahead_violation",
            Self::Execution { .. } => "execution_error",
            Self::UnknownStrategy(_) => "unknown_strategy",
            Self::DataQuality(_) => "data_quality",
            Self::TimedOut { .. } => "timeout",
            Self::Cancelled { .. } => "cancelled",
        }
    }
}
