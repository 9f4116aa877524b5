use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use rdkafka::client::ClientContext;
use rdkafka::config::ClientConfig;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::{BaseRecord, DeliveryResult, Producer, ProducerContext, ThreadedProducer};
use rdkafka::util::Timeout;
use tracing::{debug, warn};

use super::MessageBus;
use crate::error::{PipelineError, Result};

/// Wait before re-enqueueing when librdkafka's local queue is full.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(50);

/// Counts failed deliveries reported by the producer's background thread.
#[derive(Default)]
struct DeliveryTracker {
    failed: AtomicUsize,
    last_error: Mutex<Option<String>>,
}

impl ClientContext for DeliveryTracker {}

impl ProducerContext for DeliveryTracker {
    type DeliveryOpaque = ();

    fn delivery(&self, result: &DeliveryResult<'_>, _: Self::DeliveryOpaque) {
        if let Err((err, _)) = result {
            self.failed.fetch_add(1, Ordering::Relaxed);
            if let Ok(mut last) = self.last_error.lock() {
                *last = Some(err.to_string());
            }
        }
    }
}

/// Kafka producer.
///
/// Messages carry no key. The producer runs with `acks=all` and idempotence
/// enabled; resending failed messages is left to librdkafka's own retry
/// settings.
pub struct KafkaBus {
    producer: ThreadedProducer<DeliveryTracker>,
    flush_timeout: Duration,
}

impl KafkaBus {
    pub fn new(bootstrap_servers: &str, flush_timeout: Duration) -> Result<Self, KafkaError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("acks", "all")
            .set("enable.idempotence", "true")
            .create_with_context(DeliveryTracker::default())?;

        Ok(Self {
            producer,
            flush_timeout,
        })
    }
}

impl MessageBus for KafkaBus {
    fn send(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let mut record = BaseRecord::<(), [u8]>::to(topic).payload(payload);
        loop {
            match self.producer.send(record) {
                Ok(()) => return Ok(()),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), rejected)) => {
                    debug!("Producer queue full, waiting");
                    record = rejected;
                    std::thread::sleep(QUEUE_FULL_BACKOFF);
                }
                Err((err, _)) => {
                    return Err(PipelineError::Publish {
                        failed: 1,
                        reason: err.to_string(),
                    });
                }
            }
        }
    }

    fn flush(&self) -> Result<()> {
        let flushed = self.producer.flush(Timeout::After(self.flush_timeout));
        let tracker = self.producer.context();
        let failed = tracker.failed.swap(0, Ordering::Relaxed);
        let last_error = tracker
            .last_error
            .lock()
            .ok()
            .and_then(|mut last| last.take());

        if let Err(err) = flushed {
            let in_flight = self.producer.in_flight_count().max(0) as usize;
            warn!(error = %err, in_flight, "Producer flush did not complete");
            return Err(PipelineError::Publish {
                failed: failed + in_flight,
                reason: err.to_string(),
            });
        }
        if failed > 0 {
            return Err(PipelineError::Publish {
                failed,
                reason: last_error.unwrap_or_else(|| "delivery failed".to_string()),
            });
        }
        Ok(())
    }
}
