use async_trait::async_trait;
use thiserror::Error;

use crate::domain::booking::BookingConfirmation;
use crate::domain::search::OfferRef;
use crate::domain::session::SessionId;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BookingError {
    #[error("booking was declined: {0}")]
    Declined(String),
    #[error("booking service unavailable: {0}")]
    Unavailable(String),
}

/// Turns a chosen offer into a confirmation. Calls are not assumed idempotent, so the
/// caller never retries on its own.
#[async_trait]
pub trait BookingProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn book(
        &self,
        offer_ref: &OfferRef,
        session_id: &SessionId,
    ) -> Result<BookingConfirmation, BookingError>;
}
