use std::sync::Arc;

use tokio::{
    sync::{
        Semaphore,
        mpsc::{self, error::TrySendError},
    },
    task::JoinHandle,
};

use crate::{
    config::{CallbackEndpoint, MAX_IN_FLIGHT, MAX_QUEUE_CAPACITY},
    error::ReportError,
    record::UsageRecord,
    sink::UsageSink,
};

/// A record ready to go, with the endpoint it goes to.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingDelivery {
    pub endpoint: CallbackEndpoint,
    pub record: UsageRecord,
}

/// Bounded hand-off between the reporting path and the delivery worker.
///
/// Enqueueing never waits: when the queue is full the newest record is
/// dropped. The worker runs at most `max_in_flight` deliveries at once.
pub struct DeliveryQueue {
    sender: mpsc::Sender<PendingDelivery>,
    worker: JoinHandle<()>,
}

impl DeliveryQueue {
    /// Spawns the worker on the current tokio runtime. Both limits are
    /// clamped to `1..=MAX_QUEUE_CAPACITY` and `1..=MAX_IN_FLIGHT`.
    pub fn spawn(sink: Arc<dyn UsageSink>, capacity: usize, max_in_flight: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.clamp(1, MAX_QUEUE_CAPACITY));
        let max_in_flight = u32::try_from(max_in_flight.clamp(1, MAX_IN_FLIGHT)).unwrap_or(1);
        let worker = tokio::spawn(run_worker(receiver, sink, max_in_flight));

        Self { sender, worker }
    }

    pub fn enqueue(&self, delivery: PendingDelivery) -> Result<(), ReportError> {
        self.sender.try_send(delivery).map_err(|err| match err {
            TrySendError::Full(_) => ReportError::QueueFull,
            TrySendError::Closed(_) => ReportError::QueueClosed,
        })
    }

    /// Stops accepting records and waits for queued and in-flight
    /// deliveries to finish.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(err) = self.worker.await {
            log::error!("Usage delivery worker failed: {}", err);
        }
    }
}

async fn run_worker(
    mut receiver: mpsc::Receiver<PendingDelivery>,
    sink: Arc<dyn UsageSink>,
    max_in_flight: u32,
) {
    let in_flight = Arc::new(Semaphore::new(max_in_flight as usize));

    while let Some(delivery) = receiver.recv().await {
        let Ok(permit) = in_flight.clone().acquire_owned().await else {
            break;
        };
        let sink = sink.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(err) = sink.deliver(&delivery.endpoint, &delivery.record).await {
                err.log();
            }
        });
    }

    // Every permit back means every spawned delivery has finished.
    let _ = in_flight.acquire_many(max_in_flight).await;
    log::debug!("Usage delivery worker stopped");
}
