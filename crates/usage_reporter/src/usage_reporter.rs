//! Post-completion usage reporting.
//!
//! Once the host pipeline finishes a model call it hands the invocation and
//! response to a [`UsageReporter`]. Billable completions (a virtual key and a
//! positive cost) become a [`UsageRecord`] that is POSTed to the metering
//! backend. Reporting never fails the caller: every problem is logged and
//! swallowed.

mod completion;
mod config;
mod error;
mod queue;
mod record;
mod sink;

use std::sync::Arc;

use chrono::{DateTime, Utc};

pub use crate::{
    completion::{CompletionEvent, CompletionInvocation, CompletionResponse, LitellmParams, Usage},
    config::{
        CallbackEndpoint, DEFAULT_MAX_IN_FLIGHT, DEFAULT_QUEUE_CAPACITY, MAX_IN_FLIGHT,
        MAX_QUEUE_CAPACITY, ReporterConfig,
        USAGE_CALLBACK_MAX_IN_FLIGHT, USAGE_CALLBACK_QUEUE_CAPACITY, USAGE_CALLBACK_TOKEN,
        USAGE_CALLBACK_URL,
    },
    error::ReportError,
    queue::{DeliveryQueue, PendingDelivery},
    record::{PROVIDER, UsageRecord, duration_ms},
    sink::{DELIVERY_TIMEOUT, HttpUsageSink, UsageSink},
};

pub trait UsageReporter: Send + Sync {
    fn report(
        &self,
        invocation: &CompletionInvocation,
        response: &CompletionResponse,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    );
}

/// Reports usage to the metering backend configured in [`ReporterConfig`].
///
/// [`UsageReporter::report`] only validates and enqueues; delivery happens on
/// a background worker. Use [`MeteringUsageReporter::report_and_wait`] to
/// deliver inline instead.
pub struct MeteringUsageReporter {
    config: ReporterConfig,
    sink: Arc<dyn UsageSink>,
    queue: DeliveryQueue,
}

impl MeteringUsageReporter {
    /// Must be called from within a tokio runtime.
    pub fn new(config: ReporterConfig, sink: Arc<dyn UsageSink>) -> Self {
        let queue = DeliveryQueue::spawn(sink.clone(), config.queue_capacity, config.max_in_flight);

        if config.endpoint().is_none() {
            log::warn!("{}. Usage will not be reported.", ReportError::Misconfigured);
        }

        Self {
            config,
            sink,
            queue,
        }
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Validates the completion and builds the record to deliver.
    pub fn prepare(
        &self,
        invocation: &CompletionInvocation,
        response: &CompletionResponse,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<PendingDelivery, ReportError> {
        invocation.billable()?;

        let endpoint = self.config.endpoint().ok_or(ReportError::Misconfigured)?;
        let record = UsageRecord::build(invocation, response, start_time, end_time)?;

        Ok(PendingDelivery { endpoint, record })
    }

    /// Delivers inline and returns the outcome. Failures are logged here as
    /// well, so callers may ignore the result.
    pub async fn report_and_wait(
        &self,
        invocation: &CompletionInvocation,
        response: &CompletionResponse,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) -> Result<(), ReportError> {
        let result = match self.prepare(invocation, response, start_time, end_time) {
            Ok(delivery) => {
                self.sink
                    .deliver(&delivery.endpoint, &delivery.record)
                    .await
            }
            Err(err) => Err(err),
        };

        if let Err(err) = &result {
            err.log();
        }

        result
    }

    /// Stops accepting records and waits for pending deliveries.
    pub async fn shutdown(self) {
        self.queue.shutdown().await;
    }
}

impl UsageReporter for MeteringUsageReporter {
    fn report(
        &self,
        invocation: &CompletionInvocation,
        response: &CompletionResponse,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
    ) {
        let result = self
            .prepare(invocation, response, start_time, end_time)
            .and_then(|delivery| self.queue.enqueue(delivery));

        if let Err(err) = result {
            err.log();
        }
    }
}
