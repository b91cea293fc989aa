//! Error types for the normalization and aggregation pipeline.

use chrono::NaiveDate;
use thiserror::Error;

/// A single record rejected during normalization. Never aborts the run on
/// its own; rejected records are collected into a summary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required lifecycle timestamp is absent.
    #[error("issue {id}: missing {field}")]
    MissingTimestamp { id: u64, field: &'static str },

    /// A timestamp is present but is not RFC 3339.
    #[error("issue {id}: unparsable {field} {value:?}")]
    UnparsableTimestamp {
        id: u64,
        field: &'static str,
        value: String,
    },

    /// `closed_at` precedes `created_at`.
    #[error("issue {id}: closed_at {closed_at} precedes created_at {created_at}")]
    ClosedBeforeCreated {
        id: u64,
        created_at: String,
        closed_at: String,
    },
}

impl ValidationError {
    pub fn issue_id(&self) -> u64 {
        match self {
            ValidationError::MissingTimestamp { id, .. }
            | ValidationError::UnparsableTimestamp { id, .. }
            | ValidationError::ClosedBeforeCreated { id, .. } => *id,
        }
    }
}

/// Errors that abort a pipeline run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Missing or invalid rule configuration. Raised before any work starts.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Backlog carry-forward disagrees with direct recomputation.
    #[error(
        "backlog mismatch for component {component:?} in {month}: carried {carried}, recomputed {recomputed}"
    )]
    Consistency {
        month: NaiveDate,
        component: String,
        carried: i64,
        recomputed: i64,
    },

    /// Too many records failed validation for the run to be trusted.
    #[error("rejected {rejected} of {total} issues, above the allowed rate {max_rate}: ids {rejected_ids:?}")]
    RejectionRate {
        rejected: usize,
        total: usize,
        max_rate: f64,
        rejected_ids: Vec<u64>,
    },

    /// Bronze input could not be read or decoded.
    #[error("bronze input error: {0}")]
    Bronze(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_expose_the_rejected_issue_id() {
        let err = ValidationError::UnparsableTimestamp {
            id: 42,
            field: "created_at",
            value: "yesterday".to_string(),
        };
        assert_eq!(err.issue_id(), 42);
        assert!(err.to_string().contains("created_at"));
    }

    #[test]
    fn consistency_error_names_month_and_component() {
        let err = PipelineError::Consistency {
            month: NaiveDate::from_ymd_opt(2024, 2, 1).unwrap(),
            component: "io".to_string(),
            carried: 3,
            recomputed: 2,
        };
        let message = err.to_string();
        assert!(message.contains("2024-02-01"));
        assert!(message.contains("\"io\""));
    }

    #[test]
    fn rejection_rate_error_names_the_rejected_ids() {
        let err = PipelineError::RejectionRate {
            rejected: 2,
            total: 10,
            max_rate: 0.05,
            rejected_ids: vec![7, 31],
        };
        assert!(err.to_string().contains("[7, 31]"));
    }
}
