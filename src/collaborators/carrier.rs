use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{CollaboratorError, FulfillmentCarrier, PickupBooking};
use crate::clock::Clock;
use crate::domain::Address;

// ============================================================================
// Session Carrier - reverse logistics behind an expiring API session
// ============================================================================
//
// Credentials are handed in explicitly; the session token lives inside this
// value and is refreshed when it is about to expire or when the carrier
// answers `Unauthorized` (one re-login, one retry).
//
// ============================================================================

#[derive(Clone)]
pub struct CarrierCredentials {
    pub account: String,
    pub secret: String,
}

impl std::fmt::Debug for CarrierCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CarrierCredentials")
            .field("account", &self.account)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CarrierSession {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Raw carrier API, one call per HTTP endpoint.
#[async_trait]
pub trait CarrierApi: Send + Sync {
    async fn login(&self, credentials: &CarrierCredentials) -> Result<CarrierSession, CollaboratorError>;

    async fn create_return_shipment(
        &self,
        session: &CarrierSession,
        order_ref: Uuid,
        pickup_address: &Address,
    ) -> Result<PickupBooking, CollaboratorError>;
}

pub struct SessionCarrier<A: CarrierApi> {
    api: A,
    credentials: CarrierCredentials,
    session: Mutex<Option<CarrierSession>>,
    clock: Arc<dyn Clock>,
    refresh_margin: Duration,
}

impl<A: CarrierApi> SessionCarrier<A> {
    pub fn new(api: A, credentials: CarrierCredentials, clock: Arc<dyn Clock>) -> Self {
        Self {
            api,
            credentials,
            session: Mutex::new(None),
            clock,
            refresh_margin: Duration::seconds(30),
        }
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    async fn current_session(&self, force_refresh: bool) -> Result<CarrierSession, CollaboratorError> {
        let mut slot = self.session.lock().await;

        if !force_refresh {
            if let Some(session) = slot.as_ref() {
                if session.expires_at - self.refresh_margin > self.clock.now() {
                    return Ok(session.clone());
                }
            }
        }

        tracing::debug!(account = %self.credentials.account, "Refreshing carrier session");
        let session = self.api.login(&self.credentials).await?;
        *slot = Some(session.clone());
        Ok(session)
    }
}

#[async_trait]
impl<A: CarrierApi> FulfillmentCarrier for SessionCarrier<A> {
    async fn book_return_pickup(
        &self,
        order_ref: Uuid,
        pickup_address: &Address,
    ) -> Result<PickupBooking, CollaboratorError> {
        let session = self.current_session(false).await?;

        match self.api.create_return_shipment(&session, order_ref, pickup_address).await {
            Err(CollaboratorError::Unauthorized(reason)) => {
                tracing::warn!(%order_ref, %reason, "Carrier rejected session, logging in again");
                let session = self.current_session(true).await?;
                self.api.create_return_shipment(&session, order_ref, pickup_address).await
            }
            other => other,
        }
    }
}
