//! Rate-limited delivery queue
//!
//! A bounded channel feeds a single pacing loop. Each tick releases one job
//! into its own task; a semaphore caps how many run at once and every run
//! carries a deadline. Jobs are not persisted: delivery is at-most-once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Bytes;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::metrics::{DELIVERIES_IN_FLIGHT, FEDERATION_REQUESTS_TOTAL};

/// One signed POST of a pre-serialized activity to one inbox
#[derive(Debug, Clone)]
pub struct DeliveryJob {
    /// Destination inbox IRI
    pub inbox: String,
    /// Serialized activity, shared across a fan-out
    pub body: Bytes,
    /// Actor whose key signs the request
    pub actor_iri: String,
    /// Activity type, for logs and metrics
    pub activity_type: &'static str,
}

/// Performs a single delivery attempt
#[async_trait]
pub trait DeliveryExecutor: Send + Sync + 'static {
    async fn execute(&self, job: &DeliveryJob) -> Result<(), AppError>;
}

/// Pacing parameters for the delivery loop
#[derive(Debug, Clone, Copy)]
pub struct Pacing {
    /// Jobs released per minute
    pub rate_per_minute: u32,
    /// Deliveries allowed to run concurrently
    pub max_in_flight: usize,
    /// Deadline for a single delivery
    pub timeout: Duration,
}

impl Pacing {
    fn tick_period(&self) -> Duration {
        Duration::from_secs(60) / self.rate_per_minute.max(1)
    }
}

/// Producer handle for the delivery queue
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: mpsc::Sender<DeliveryJob>,
}

/// Consumer side of the delivery queue
pub struct DeliveryReceiver {
    receiver: mpsc::Receiver<DeliveryJob>,
}

impl DeliveryQueue {
    /// Create a queue holding at most `capacity` pending jobs
    pub fn bounded(capacity: usize) -> (Self, DeliveryReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, DeliveryReceiver { receiver })
    }

    /// Add a job, waiting while the queue is full
    ///
    /// # Errors
    /// `Internal` if the delivery loop has stopped
    pub async fn enqueue(&self, job: DeliveryJob) -> Result<(), AppError> {
        self.sender
            .send(job)
            .await
            .map_err(|_| AppError::Internal(anyhow::anyhow!("delivery queue is closed")))
    }
}

impl DeliveryReceiver {
    /// Take the next job directly, bypassing the pacing loop
    pub async fn recv(&mut self) -> Option<DeliveryJob> {
        self.receiver.recv().await
    }

    /// Take a job if one is ready
    pub fn try_recv(&mut self) -> Option<DeliveryJob> {
        self.receiver.try_recv().ok()
    }

    /// Start the pacing loop; it ends once every `DeliveryQueue` handle is dropped
    pub fn spawn(self, executor: Arc<dyn DeliveryExecutor>, pacing: Pacing) -> JoinHandle<()> {
        tokio::spawn(self.run(executor, pacing))
    }

    async fn run(mut self, executor: Arc<dyn DeliveryExecutor>, pacing: Pacing) {
        let mut ticker = tokio::time::interval(pacing.tick_period());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let permits = Arc::new(Semaphore::new(pacing.max_in_flight.max(1)));

        tracing::info!(
            rate_per_minute = pacing.rate_per_minute,
            max_in_flight = pacing.max_in_flight,
            "Delivery loop started"
        );

        while let Some(job) = self.receiver.recv().await {
            ticker.tick().await;

            let Ok(permit) = permits.clone().acquire_owned().await else {
                break;
            };
            let executor = executor.clone();
            let timeout = pacing.timeout;

            tokio::spawn(async move {
                let _permit = permit;
                DELIVERIES_IN_FLIGHT.inc();
                let outcome = tokio::time::timeout(timeout, executor.execute(&job)).await;
                DELIVERIES_IN_FLIGHT.dec();

                let status = match outcome {
                    Ok(Ok(())) => {
                        tracing::debug!(
                            inbox = %job.inbox,
                            activity_type = job.activity_type,
                            "Delivered activity"
                        );
                        "success"
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(
                            inbox = %job.inbox,
                            activity_type = job.activity_type,
                            %error,
                            "Delivery failed"
                        );
                        "failure"
                    }
                    Err(_) => {
                        tracing::warn!(
                            inbox = %job.inbox,
                            activity_type = job.activity_type,
                            timeout_secs = timeout.as_secs_f64(),
                            "Delivery timed out"
                        );
                        "timeout"
                    }
                };
                FEDERATION_REQUESTS_TOTAL
                    .with_label_values(&["deliver", status])
                    .inc();
            });
        }

        tracing::info!("Delivery loop stopped");
    }
}
