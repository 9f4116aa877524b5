use std::sync::Mutex;

use super::MessageBus;
use crate::error::{PipelineError, Result};

#[derive(Default)]
struct State {
    pending: Vec<(String, Vec<u8>)>,
    delivered: Vec<(String, Vec<u8>)>,
    flushes: usize,
}

/// In-process bus: messages become visible once flushed.
#[derive(Default)]
pub struct MemoryBus {
    state: Mutex<State>,
    reject: bool,
}

impl MemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bus on which every delivery fails at flush time.
    pub fn rejecting() -> Self {
        Self {
            reject: true,
            ..Self::default()
        }
    }

    /// Delivered `(topic, payload)` pairs, in send order.
    pub fn messages(&self) -> Vec<(String, Vec<u8>)> {
        self.lock().delivered.clone()
    }

    /// Messages sent but not yet flushed.
    pub fn pending(&self) -> usize {
        self.lock().pending.len()
    }

    pub fn flush_count(&self) -> usize {
        self.lock().flushes
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl MessageBus for MemoryBus {
    fn send(&self, topic: &str, payload: &[u8]) -> Result<()> {
        self.lock().pending.push((topic.to_string(), payload.to_vec()));
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        let mut state = self.lock();
        state.flushes += 1;
        let pending = std::mem::take(&mut state.pending);
        if self.reject && !pending.is_empty() {
            return Err(PipelineError::Publish {
                failed: pending.len(),
                reason: "delivery rejected".to_string(),
            });
        }
        state.delivered.extend(pending);
        Ok(())
    }
}
