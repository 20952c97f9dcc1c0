use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::search::{FlightOffer, OfferRef};
use crate::domain::session::SessionId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingRecord {
    pub offer_ref: OfferRef,
    pub offer_id: String,
    pub session_id: SessionId,
    pub confirmation_token: Option<String>,
    pub external_link: Option<String>,
    pub status: BookingStatus,
    pub price: Decimal,
    pub currency: String,
    pub created_at: DateTime<Utc>,
    pub failure_reason: Option<String>,
}

impl BookingRecord {
    /// Only called with an offer already resolved against the session's latest
    /// result set.
    pub(crate) fn pending(offer_ref: OfferRef, offer: &FlightOffer, session_id: SessionId) -> Self {
        Self {
            offer_ref,
            offer_id: offer.offer_id.clone(),
            session_id,
            confirmation_token: None,
            external_link: None,
            status: BookingStatus::Pending,
            price: offer.price,
            currency: offer.currency.clone(),
            created_at: Utc::now(),
            failure_reason: None,
        }
    }

    pub fn confirm(&mut self, confirmation_token: String, external_link: Option<String>) {
        self.confirmation_token = Some(confirmation_token);
        self.external_link = external_link;
        self.status = BookingStatus::Confirmed;
        self.failure_reason = None;
    }

    pub fn fail(&mut self, reason: impl Into<String>) {
        self.status = BookingStatus::Failed;
        self.failure_reason = Some(reason.into());
    }
}

/// Result of a booking collaborator call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub confirmation_token: String,
    pub external_link: Option<String>,
}

/// What the user pointed at when asking to book: a printed offer reference, a
/// position in the current list, or both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookingTarget {
    pub offer_ref: Option<OfferRef>,
    pub position: Option<usize>,
}

impl BookingTarget {
    pub fn position(position: usize) -> Self {
        Self { offer_ref: None, position: Some(position) }
    }

    pub fn reference(offer_ref: OfferRef) -> Self {
        Self { offer_ref: Some(offer_ref), position: None }
    }

    pub fn is_empty(&self) -> bool {
        self.offer_ref.is_none() && self.position.is_none()
    }
}
