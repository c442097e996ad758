use std::time::Duration;

use thiserror::Error;

/// Why a completion did not end in a delivered usage record.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Missing virtual key or non-positive cost. Expected, never logged.
    #[error("nothing to report: {0}")]
    NotReportable(&'static str),

    #[error("USAGE_CALLBACK_URL or USAGE_CALLBACK_TOKEN not set")]
    Misconfigured,

    #[error("malformed completion event")]
    MalformedInput(#[from] serde_json::Error),

    #[error("failed to serialize usage record")]
    Serialization(#[source] serde_json::Error),

    #[error("usage delivery failed: {0}")]
    Delivery(anyhow::Error),

    #[error("usage delivery timed out after {0:?}")]
    Timeout(Duration),

    /// The delivery queue was full; the newest record was dropped.
    #[error("usage delivery queue is full, dropping record")]
    QueueFull,

    #[error("usage delivery queue is closed")]
    QueueClosed,
}

impl ReportError {
    /// Logs the error at the level its category calls for.
    pub fn log(&self) {
        match self {
            ReportError::NotReportable(_) => {}
            ReportError::Misconfigured => {
                log::info!("{}. Skipping usage callback.", self);
            }
            ReportError::QueueFull | ReportError::QueueClosed => {
                log::warn!("{}", self);
            }
            ReportError::Delivery(err) => {
                log::error!("Error in usage callback: {:?}", err);
            }
            _ => {
                log::error!("Error in usage callback: {:?}", self);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn misconfigured_names_both_variables() {
        let message = ReportError::Misconfigured.to_string();
        assert!(message.contains("USAGE_CALLBACK_URL"));
        assert!(message.contains("USAGE_CALLBACK_TOKEN"));
    }

    #[test]
    fn malformed_input_wraps_serde_errors() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let report_error = ReportError::from(err);
        assert!(matches!(report_error, ReportError::MalformedInput(_)));
        assert!(report_error.to_string().starts_with("malformed completion event"));
    }

    #[test]
    fn serde_causes_are_sources_not_message_text() {
        use std::error::Error as _;

        let cause = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let cause_text = cause.to_string();
        let report_error = ReportError::Serialization(cause);

        assert_eq!(report_error.to_string(), "failed to serialize usage record");
        assert_eq!(
            report_error.source().map(|source| source.to_string()),
            Some(cause_text)
        );
    }

    #[test]
    fn timeout_mentions_the_bound() {
        let message = ReportError::Timeout(Duration::from_secs(5)).to_string();
        assert_eq!(message, "usage delivery timed out after 5s");
    }
}
