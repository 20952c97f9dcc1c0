pub mod coordinator;
pub mod retry;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::search::{FlightOffer, SearchQuery};
use crate::domain::slots::LocationCode;
use crate::errors::FailureKind;

pub use coordinator::{OfferSource, SearchCoordinator, SearchOutcome, SearchSettings};
pub use retry::RetryPolicy;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SearchError {
    /// Timeouts, rate limits and provider outages. Retried by the coordinator.
    #[error("flight search temporarily unavailable: {0}")]
    Transient(String),
    /// The provider refused the query itself (unknown airport, bad date, ...).
    #[error("flight search rejected the request: {0}")]
    Validation(String),
}

impl SearchError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Transient(_) => FailureKind::Transient,
            Self::Validation(_) => FailureKind::Validation,
        }
    }

    pub fn detail(&self) -> &str {
        match self {
            Self::Transient(detail) | Self::Validation(detail) => detail,
        }
    }
}

/// Live flight search. Implementations must return the same offers for identical
/// queries so results can be cached by fingerprint.
#[async_trait]
pub trait FlightSearchProvider: Send + Sync {
    fn name(&self) -> &'static str;

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>, SearchError>;
}

/// Turns a free-text place name ("Porto", "Cape Town") into an IATA airport or city
/// code. `Ok(None)` means the lookup worked and nothing matched.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    fn name(&self) -> &'static str;

    async fn resolve(&self, place: &str) -> Result<Option<LocationCode>, SearchError>;
}
