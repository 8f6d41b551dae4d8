use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use super::CollaboratorError;
use crate::metrics::Metrics;
use crate::utils::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError, CircuitState};

// ============================================================================
// Collaborator Guard - timeout + circuit breaker around one service
// ============================================================================

#[derive(Clone)]
pub struct CollaboratorGuard {
    breaker: CircuitBreaker,
    timeout: Duration,
    metrics: Arc<Metrics>,
}

impl CollaboratorGuard {
    pub fn new(
        service: &'static str,
        timeout: Duration,
        breaker: CircuitBreakerConfig,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            breaker: CircuitBreaker::new(service, breaker),
            timeout,
            metrics,
        }
    }

    pub fn service(&self) -> &'static str {
        self.breaker.name()
    }

    pub async fn state(&self) -> CircuitState {
        self.breaker.state().await
    }

    /// Run `operation` with the configured timeout, failing fast while the
    /// service's circuit is open.
    pub async fn call<F, T>(&self, operation: F) -> Result<T, CollaboratorError>
    where
        F: Future<Output = Result<T, CollaboratorError>>,
    {
        let timeout = self.timeout;
        let result = self
            .breaker
            .call(async move {
                match tokio::time::timeout(timeout, operation).await {
                    Ok(result) => result,
                    Err(_) => Err(CollaboratorError::Timeout(timeout)),
                }
            })
            .await;

        let error = match result {
            Ok(value) => return Ok(value),
            Err(CircuitBreakerError::CircuitOpen) => {
                tracing::warn!(service = self.service(), "Circuit open, collaborator call skipped");
                CollaboratorError::CircuitOpen(self.service())
            }
            Err(CircuitBreakerError::OperationFailed(e)) => {
                tracing::error!(service = self.service(), error = %e, "Collaborator call failed");
                e
            }
        };

        self.metrics.record_collaborator_failure(self.service(), error.kind());
        Err(error)
    }
}
