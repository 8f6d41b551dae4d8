use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::Actor;

// ============================================================================
// Event Envelope - metadata wrapped around every published domain event
// ============================================================================

pub trait DomainEvent: Serialize + Clone + Send + Sync {
    fn event_type(&self) -> &'static str;
    fn event_version(&self) -> i32 {
        1
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct EventEnvelope<E> {
    pub event_id: Uuid,
    pub aggregate_id: Uuid,
    /// Aggregate version right after this event was applied
    pub sequence_number: i64,
    pub event_type: String,
    pub event_version: i32,
    pub event_data: E,
    /// Groups every event produced by one engine operation
    pub correlation_id: Uuid,
    pub actor: Option<Actor>,
    pub timestamp: DateTime<Utc>,
}

impl<E: DomainEvent> EventEnvelope<E> {
    pub fn new(
        aggregate_id: Uuid,
        sequence_number: i64,
        event_data: E,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            event_id: Uuid::now_v7(),
            aggregate_id,
            sequence_number,
            event_type: event_data.event_type().to_string(),
            event_version: event_data.event_version(),
            event_data,
            correlation_id,
            actor: None,
            timestamp,
        }
    }

    pub fn with_actor(mut self, actor: Actor) -> Self {
        self.actor = Some(actor);
        self
    }

    /// Wrap a batch of events that brought an aggregate to `final_version`.
    pub fn sequence(
        aggregate_id: Uuid,
        final_version: i64,
        events: Vec<E>,
        correlation_id: Uuid,
        timestamp: DateTime<Utc>,
    ) -> Vec<Self> {
        let first = final_version - events.len() as i64 + 1;
        events
            .into_iter()
            .enumerate()
            .map(|(i, event)| Self::new(aggregate_id, first + i as i64, event, correlation_id, timestamp))
            .collect()
    }
}
