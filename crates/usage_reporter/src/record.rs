use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    completion::{CompletionInvocation, CompletionResponse},
    error::ReportError,
};

/// Provider label sent with every record.
pub const PROVIDER: &str = "litellm";

/// The payload POSTed to the metering backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageRecord {
    pub user_api_key: String,
    pub cost_in_usd: f64,
    pub model: Option<String>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub duration_ms: f64,
    pub litellm_model_id: Option<String>,
    pub provider: &'static str,
}

impl UsageRecord {
    /// Builds the record for a finished completion, or refuses when the
    /// invocation carries no virtual key or no positive cost.
    pub fn build(
        invocation: &CompletionInvocation,
        response: &CompletionResponse,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<Self, ReportError> {
        let (user_api_key, cost_in_usd) = invocation.billable()?;

        Ok(Self {
            user_api_key: user_api_key.to_string(),
            cost_in_usd,
            model: invocation.model.clone(),
            prompt_tokens: response.prompt_tokens(),
            completion_tokens: response.completion_tokens(),
            total_tokens: response.total_tokens(),
            duration_ms: duration_ms(start_time, end_time),
            litellm_model_id: response.model.clone(),
            provider: PROVIDER,
        })
    }
}

/// Elapsed time in fractional milliseconds. Negative when the timestamps
/// arrive out of order.
pub fn duration_ms(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> f64 {
    let elapsed = end_time - start_time;
    match elapsed.num_microseconds() {
        Some(micros) => micros as f64 / 1000.0,
        None => elapsed.num_milliseconds() as f64,
    }
}
