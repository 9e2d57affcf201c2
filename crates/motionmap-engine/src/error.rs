//! Error types shared by the aggregation pipeline and the adjustment workflow.

use std::fmt;

use thiserror::Error;

use crate::model::{AdjustmentId, SensorId};

/// Input rejected before anything is written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("select a single sensor to make adjustments ({selected} selected)")]
    AmbiguousSensor { selected: usize },

    #[error("sensor {0} does not exist")]
    UnknownSensor(SensorId),

    #[error("a comment is required to explain the adjustment")]
    MissingComment,

    #[error("new total must not be negative (got {0})")]
    NegativeTotal(i64),

    #[error("weeks to view must be between 0 and {max} (got {got})")]
    WeeksOutOfRange { got: u32, max: u32 },

    #[error("clearing adjustments requires confirmation")]
    ClearNotConfirmed,

    #[error("slot has no adjustments to clear")]
    NothingToClear,

    #[error("no adjustment session is open")]
    SessionClosed,
}

/// A stored record that cannot take part in bucketing.
///
/// The pipeline never propagates these; offending records are dropped and logged.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RecordError {
    #[error("empty timestamp")]
    EmptyTimestamp,

    #[error("timestamp `{0}` has no UTC offset")]
    MissingOffset(String),

    #[error("unparsable timestamp `{0}`")]
    Unparsable(String),

    #[error("adjustment {0} is not attached to a sensor")]
    SensorlessAdjustment(AdjustmentId),
}

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("{operation} failed: {message}")]
    Transport {
        operation: &'static str,
        message: String,
    },
}

impl Error {
    pub fn transport(operation: &'static str, err: impl fmt::Display) -> Self {
        Self::Transport {
            operation,
            message: format!("{err:#}"),
        }
    }

    #[must_use]
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
