// Outbound message queue and delivery pump
//
// The watch link accepts one message at a time and acknowledges each before
// the next may be sent. Records wait here until the pump hands them over.

use crate::pbt_models::{DisplayRecord, Result};
use std::collections::VecDeque;

/// Link to the display surface.
///
/// `send` resolves once the record has been acknowledged. Taking `&mut self`
/// means a second send cannot start while one is outstanding.
pub trait Transport {
    async fn send(&mut self, record: &DisplayRecord) -> Result<()>;
}

// ============================================================================
// Message Queue
// ============================================================================

/// FIFO of records awaiting delivery.
///
/// Every `clear` starts a new generation; batches tagged with an older
/// generation belong to an abandoned request and are dropped.
///
/// The session drops a superseded sequence together with its in-flight fetch,
/// so the generation check only rejects anything when a caller keeps building
/// records across a `clear`. It stays as the backstop for that case.
#[derive(Debug, Default)]
pub struct MessageQueue {
    records: VecDeque<DisplayRecord>,
    generation: u64,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Discard everything pending and return the new generation.
    pub fn clear(&mut self) -> u64 {
        if !self.records.is_empty() {
            log::debug!("Discarding {} undelivered records", self.records.len());
        }
        self.records.clear();
        self.generation += 1;
        self.generation
    }

    /// Append records produced for `generation`. Returns false, appending
    /// nothing, when the queue has been cleared since.
    pub fn extend(&mut self, generation: u64, records: impl IntoIterator<Item = DisplayRecord>) -> bool {
        if generation != self.generation {
            log::debug!(
                "Ignoring stale records for generation {} (now {})",
                generation,
                self.generation
            );
            return false;
        }
        self.records
            .extend(records.into_iter().map(DisplayRecord::truncated));
        true
    }

    pub fn push(&mut self, generation: u64, record: DisplayRecord) -> bool {
        self.extend(generation, [record])
    }

    pub fn pop_front(&mut self) -> Option<DisplayRecord> {
        self.records.pop_front()
    }

    fn push_front(&mut self, record: DisplayRecord) {
        self.records.push_front(record);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &DisplayRecord> {
        self.records.iter()
    }
}

// ============================================================================
// Delivery Pump
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpState {
    Idle,
    Sending,
}

/// Resets the pump to Idle even if a send is abandoned mid-flight.
struct SendingGuard<'a>(&'a mut PumpState);

impl<'a> SendingGuard<'a> {
    fn enter(state: &'a mut PumpState) -> Self {
        *state = PumpState::Sending;
        SendingGuard(state)
    }
}

impl Drop for SendingGuard<'_> {
    fn drop(&mut self) {
        *self.0 = PumpState::Idle;
    }
}

#[derive(Debug)]
pub struct DeliveryPump {
    state: PumpState,
    delivered: u64,
}

impl Default for DeliveryPump {
    fn default() -> Self {
        DeliveryPump {
            state: PumpState::Idle,
            delivered: 0,
        }
    }
}

impl DeliveryPump {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn state(&self) -> PumpState {
        self.state
    }

    /// Records delivered over the pump's lifetime
    #[cfg(test)]
    pub fn delivered(&self) -> u64 {
        self.delivered
    }

    /// Send queued records head first, each only after the previous one is
    /// acknowledged, until the queue is empty.
    ///
    /// On a transport failure the rejected record goes back to the head of
    /// the queue and the error is returned.
    pub async fn drain<T: Transport>(&mut self, queue: &mut MessageQueue, transport: &mut T) -> Result<usize> {
        let mut sent = 0;

        while let Some(record) = queue.pop_front() {
            let record = record.truncated();
            let outcome = {
                let _sending = SendingGuard::enter(&mut self.state);
                transport.send(&record).await
            };

            if let Err(e) = outcome {
                log::warn!("Delivery stopped with {} records pending: {}", queue.len() + 1, e);
                queue.push_front(record);
                return Err(e);
            }

            sent += 1;
            self.delivered += 1;
        }

        log::debug!("Queue drained, {} records sent ({} in total)", sent, self.delivered);
        Ok(sent)
    }
}
