use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use http_client::{HttpClient, Request, RequestBuilderExt};
use serde_json::Value;

use crate::{config::CallbackEndpoint, error::ReportError, record::UsageRecord};

/// Upper bound on a single delivery.
pub const DELIVERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Transport that hands a usage record to the metering backend.
#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn deliver(
        &self,
        endpoint: &CallbackEndpoint,
        record: &UsageRecord,
    ) -> Result<(), ReportError>;
}

/// POSTs records as JSON. The backend's answer is not inspected.
pub struct HttpUsageSink {
    http_client: Arc<dyn HttpClient>,
    timeout: Duration,
}

impl HttpUsageSink {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_timeout(http_client, DELIVERY_TIMEOUT)
    }

    pub fn with_timeout(http_client: Arc<dyn HttpClient>, timeout: Duration) -> Self {
        Self {
            http_client,
            timeout,
        }
    }

    async fn post(&self, endpoint: &CallbackEndpoint, body: Value) -> Result<()> {
        log::debug!("Posting usage record to {}", endpoint.url);

        self.http_client
            .send(
                Request::builder()
                    .method("POST")
                    .uri(endpoint.url.as_str())
                    .header("Authorization", format!("Bearer {}", endpoint.token))
                    .header("Content-Type", "application/json")
                    .json(body)?,
            )
            .await?;

        Ok(())
    }
}

#[async_trait]
impl UsageSink for HttpUsageSink {
    async fn deliver(
        &self,
        endpoint: &CallbackEndpoint,
        record: &UsageRecord,
    ) -> Result<(), ReportError> {
        let body = serde_json::to_value(record).map_err(ReportError::Serialization)?;

        match tokio::time::timeout(self.timeout, self.post(endpoint, body)).await {
            Ok(Ok(())) => {
                log::debug!("Usage record delivered for model {:?}", record.model);
                Ok(())
            }
            Ok(Err(err)) => Err(ReportError::Delivery(err)),
            Err(_) => Err(ReportError::Timeout(self.timeout)),
        }
    }
}

