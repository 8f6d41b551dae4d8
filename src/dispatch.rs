use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::aggregate::{DomainEvent, EventEnvelope};
use crate::collaborators::{EventPublisher, NotificationService, PublishedEvent, StatusNotification};
use crate::domain::Actor;
use crate::metrics::Metrics;
use crate::utils::{retry_on_transient, RetryConfig, RetryResult};

// ============================================================================
// Best-effort Dispatch - notifications and audit events after commit
// ============================================================================
//
// Runs on its own task once the authoritative transaction has committed.
// Failures are retried while transient, then logged and counted; they never
// reach the caller of the engine operation.
//
// ============================================================================

pub struct Dispatcher {
    notifier: Arc<dyn NotificationService>,
    publisher: Arc<dyn EventPublisher>,
    retry: RetryConfig,
    metrics: Arc<Metrics>,
    in_flight: Mutex<Vec<JoinHandle<()>>>,
}

impl Dispatcher {
    pub fn new(
        notifier: Arc<dyn NotificationService>,
        publisher: Arc<dyn EventPublisher>,
        retry: RetryConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            notifier,
            publisher,
            retry,
            metrics,
            in_flight: Mutex::new(Vec::new()),
        }
    }

    pub async fn dispatch(&self, notification: Option<StatusNotification>, events: Vec<PublishedEvent>) {
        if notification.is_none() && events.is_empty() {
            return;
        }

        let notifier = self.notifier.clone();
        let publisher = self.publisher.clone();
        let retry = self.retry.clone();
        let metrics = self.metrics.clone();

        let handle = tokio::spawn(async move {
            for event in &events {
                let outcome = retry_on_transient(&retry, |_| publisher.publish(event)).await;
                report(&metrics, "events", &event.event_type, outcome);
            }
            if let Some(notification) = &notification {
                let outcome = retry_on_transient(&retry, |_| notifier.notify_status_change(notification)).await;
                report(&metrics, "notifications", &notification.subject_id().to_string(), outcome);
            }
        });

        let mut in_flight = self.in_flight.lock().await;
        in_flight.retain(|h| !h.is_finished());
        in_flight.push(handle);
    }

    /// Wait for every dispatch started so far.
    pub async fn drain(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.in_flight.lock().await);
        for result in join_all(handles).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Dispatch task panicked");
            }
        }
    }
}

/// Wrap the events that brought an aggregate to `final_version` for
/// publishing. Events that fail to serialize are logged and skipped.
pub fn publishable<E: DomainEvent>(
    topic: &'static str,
    aggregate_id: Uuid,
    final_version: i64,
    events: Vec<E>,
    actor: Actor,
    correlation_id: Uuid,
    at: DateTime<Utc>,
) -> Vec<PublishedEvent> {
    EventEnvelope::sequence(aggregate_id, final_version, events, correlation_id, at)
        .into_iter()
        .filter_map(|envelope| {
            let envelope = envelope.with_actor(actor);
            match PublishedEvent::from_envelope(topic, &envelope) {
                Ok(published) => Some(published),
                Err(e) => {
                    tracing::warn!(
                        topic,
                        %aggregate_id,
                        event_type = %envelope.event_type,
                        error = %e,
                        "Event could not be serialized, not published"
                    );
                    None
                }
            }
        })
        .collect()
}

fn report<T, E: std::fmt::Display>(metrics: &Metrics, channel: &'static str, subject: &str, outcome: RetryResult<T, E>) {
    match outcome {
        RetryResult::Success(_) => {}
        RetryResult::Failed(e) | RetryResult::PermanentFailure(e) => {
            tracing::warn!(channel, subject, error = %e, "Best-effort delivery dropped");
            metrics.record_dispatch_failure(channel);
        }
    }
}
