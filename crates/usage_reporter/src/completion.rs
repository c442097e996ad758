use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ReportError;

/// The keyword arguments the host pipeline hands over once a request has
/// finished. Every field is optional; the host omits whatever it did not
/// compute.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompletionInvocation {
    pub litellm_params: LitellmParams,
    pub user_api_key: Option<String>,
    pub response_cost: Option<f64>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LitellmParams {
    pub metadata: Option<Map<String, Value>>,
}

impl CompletionInvocation {
    /// The virtual key, if one was supplied and it is not empty.
    pub fn virtual_key(&self) -> Option<&str> {
        self.user_api_key.as_deref().filter(|key| !key.is_empty())
    }

    /// Response cost in USD, zero when the host did not compute one.
    pub fn cost(&self) -> f64 {
        self.response_cost.unwrap_or(0.0)
    }

    /// The virtual key and cost of a billable completion: the key must be
    /// present and the cost strictly positive.
    pub fn billable(&self) -> Result<(&str, f64), ReportError> {
        let key = self
            .virtual_key()
            .ok_or(ReportError::NotReportable("no virtual api key"))?;

        let cost = self.cost();
        if cost.is_nan() || cost <= 0.0 {
            return Err(ReportError::NotReportable("no positive response cost"));
        }

        Ok((key, cost))
    }

    pub fn metadata(&self) -> Option<&Map<String, Value>> {
        self.litellm_params.metadata.as_ref()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CompletionResponse {
    /// Absent for streamed responses that did not request usage.
    pub usage: Option<Usage>,
    /// The model that actually served the request.
    pub model: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Usage {
    pub completion_tokens: Option<u64>,
    pub prompt_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

impl CompletionResponse {
    pub fn prompt_tokens(&self) -> u64 {
        self.usage.and_then(|u| u.prompt_tokens).unwrap_or(0)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.usage.and_then(|u| u.completion_tokens).unwrap_or(0)
    }

    pub fn total_tokens(&self) -> u64 {
        self.usage.and_then(|u| u.total_tokens).unwrap_or(0)
    }
}

/// One finished completion as the sidecar receives it, one per line.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CompletionEvent {
    #[serde(default)]
    pub kwargs: CompletionInvocation,
    #[serde(default)]
    pub completion_response: CompletionResponse,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
}

impl CompletionEvent {
    pub fn from_json(line: &str) -> Result<Self, ReportError> {
        Ok(serde_json::from_str(line)?)
    }

    /// Like [`CompletionEvent::from_json`], for a raw line that may not be
    /// valid UTF-8.
    pub fn from_slice(line: &[u8]) -> Result<Self, ReportError> {
        Ok(serde_json::from_slice(line)?)
    }
}
