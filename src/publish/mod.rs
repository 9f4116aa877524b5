//! Publication of normalized features onto the message bus.
//!
//! [`MessageBus`] is the seam between the pipeline and the broker client:
//! [`KafkaBus`] in production, [`MemoryBus`] in tests. A [`Publisher`] owns
//! the batching policy for one request: every feature is enqueued, and the
//! bus is flushed after a fixed number of features and at the end of each
//! file.

mod kafka;
mod memory;

pub use kafka::KafkaBus;
pub use memory::MemoryBus;

use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// Broker client shared by all requests.
pub trait MessageBus: Send + Sync {
    /// Enqueue one message on the client's send buffer.
    fn send(&self, topic: &str, payload: &[u8]) -> Result<()>;

    /// Block until every enqueued message is acknowledged or has failed.
    ///
    /// Failed deliveries since the previous flush are reported together as
    /// one [`PipelineError::Publish`].
    fn flush(&self) -> Result<()>;
}

/// The GeoJSON document published for each shapefile record.
#[derive(Debug, Clone, Serialize)]
pub struct NormalizedFeature {
    /// `<sourceID>:<identifier value>`
    pub id: String,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub geometry: Value,
    pub properties: Map<String, Value>,
}

impl NormalizedFeature {
    pub fn new(id: String, geometry: Value, properties: Map<String, Value>) -> Self {
        Self {
            id,
            kind: "Feature",
            geometry,
            properties,
        }
    }
}

/// Serializes features onto one topic and flushes on a record-count boundary.
pub struct Publisher {
    bus: Arc<dyn MessageBus>,
    topic: String,
    flush_every: usize,
    unflushed: usize,
}

impl Publisher {
    pub fn new(bus: Arc<dyn MessageBus>, topic: impl Into<String>, flush_every: usize) -> Self {
        Self {
            bus,
            topic: topic.into(),
            flush_every: flush_every.max(1),
            unflushed: 0,
        }
    }

    pub fn publish(&mut self, feature: &NormalizedFeature) -> Result<()> {
        let payload = serde_json::to_vec(feature)
            .map_err(|e| PipelineError::Unexpected(format!("cannot serialize feature: {e}")))?;
        self.bus.send(&self.topic, &payload)?;

        self.unflushed += 1;
        if self.unflushed >= self.flush_every {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush whatever is still buffered.
    pub fn flush(&mut self) -> Result<()> {
        debug!(pending = self.unflushed, topic = %self.topic, "Flushing producer");
        self.unflushed = 0;
        self.bus.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(n: u32) -> NormalizedFeature {
        let mut properties = Map::new();
        properties.insert("version".to_string(), json!("1"));
        NormalizedFeature::new(
            format!("topsoil:esdac:{n}"),
            json!({"type": "Point", "coordinates": [n, n]}),
            properties,
        )
    }

    #[test]
    fn feature_serialization() {
        let value = serde_json::to_value(feature(7)).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "topsoil:esdac:7",
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [7, 7]},
                "properties": {"version": "1"}
            })
        );
    }

    #[test]
    fn flushes_on_boundary() {
        let bus = Arc::new(MemoryBus::new());
        let mut publisher = Publisher::new(bus.clone(), "topsoil", 3);

        for n in 0..7 {
            publisher.publish(&feature(n)).unwrap();
        }
        assert_eq!(bus.flush_count(), 2);
        assert_eq!(bus.messages().len(), 6);
        assert_eq!(bus.pending(), 1);

        publisher.flush().unwrap();
        assert_eq!(bus.flush_count(), 3);
        assert_eq!(bus.messages().len(), 7);
        assert!(bus.messages().iter().all(|(topic, _)| topic == "topsoil"));
    }

    #[test]
    fn delivery_failures_surface_at_flush() {
        let bus = Arc::new(MemoryBus::rejecting());
        let mut publisher = Publisher::new(bus.clone(), "topsoil", 10);

        publisher.publish(&feature(1)).unwrap();
        publisher.publish(&feature(2)).unwrap();
        let err = publisher.flush().unwrap_err();
        assert!(matches!(err, PipelineError::Publish { failed: 2, .. }));
        assert!(bus.messages().is_empty());
    }
}
