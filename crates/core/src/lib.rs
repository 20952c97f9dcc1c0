pub mod audit;
pub mod booking;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod search;

pub use audit::{AuditContext, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink};
pub use booking::{BookingError, BookingProvider};
pub use dispatch::{
    DispatchAction, DispatchContext, DispatchEngine, DispatchEvent, DispatchState,
    DispatchTransitionError, TripSearchDispatch,
};
pub use domain::booking::{BookingConfirmation, BookingRecord, BookingStatus, BookingTarget};
pub use domain::search::{Fingerprint, FlightOffer, OfferRef, ResultSet, SearchQuery, SortKey};
pub use domain::session::{
    Actor, Phase, PresentedOffer, Session, SessionId, SessionSnapshot, Turn, TurnPayload,
};
pub use domain::slots::{CabinClass, LocationCode, SlotName, SlotSet, SlotUpdate};
pub use errors::{
    ApplicationError, DomainError, FailureKind, InterfaceError, OfferResolutionError,
};
pub use search::{
    FlightSearchProvider, LocationResolver, OfferSource, RetryPolicy, SearchCoordinator,
    SearchError, SearchOutcome, SearchSettings,
};
