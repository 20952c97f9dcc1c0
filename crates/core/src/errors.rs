use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dispatch::DispatchTransitionError;

/// Classification of a failed turn, recorded on the agent turn that explains it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    Transient,
    StaleReference,
    Booking,
    Extractor,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::Transient => "transient",
            Self::StaleReference => "stale_reference",
            Self::Booking => "booking",
            Self::Extractor => "extractor",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum OfferResolutionError {
    #[error("offer {reference} belongs to a superseded search")]
    Stale { reference: String, current: Option<String> },
    #[error("option {position} is not in the current list of {available} offers")]
    OutOfRange { position: usize, available: usize },
    #[error("there are no search results to choose from")]
    NoResults,
    #[error("no offer was identified")]
    Unspecified,
}

impl OfferResolutionError {
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            Self::Stale { .. } => FailureKind::StaleReference,
            Self::OutOfRange { .. } | Self::NoResults | Self::Unspecified => FailureKind::Validation,
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error(transparent)]
    Dispatch(#[from] DispatchTransitionError),
    #[error(transparent)]
    OfferResolution(#[from] OfferResolutionError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("integration failure: {0}")]
    Integration(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("not found: {message}")]
    NotFound { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::NotFound { .. } => "The conversation was not found or has expired.",
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::NotFound { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::NotFound { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(_) => Self::BadRequest {
                message: "domain validation failed".to_owned(),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::SessionNotFound(id) => Self::NotFound {
                message: format!("session `{id}` does not exist"),
                correlation_id: "unassigned".to_owned(),
            },
            ApplicationError::Integration(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Configuration(message) => {
                Self::Internal { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::dispatch::{DispatchEvent, DispatchState, DispatchTransitionError};
    use crate::errors::{
        ApplicationError, DomainError, FailureKind, InterfaceError, OfferResolutionError,
    };

    #[test]
    fn dispatch_error_maps_to_bad_request_interface_error() {
        let interface = ApplicationError::from(DomainError::from(
            DispatchTransitionError::InvalidTransition {
                state: DispatchState::Done,
                event: DispatchEvent::SearchSucceeded,
            },
        ))
        .into_interface("req-1");

        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn missing_session_maps_to_not_found() {
        let interface =
            ApplicationError::SessionNotFound("sess-9".to_owned()).into_interface("req-2");

        assert!(matches!(interface, InterfaceError::NotFound { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn integration_error_maps_to_service_unavailable() {
        let interface = ApplicationError::Integration("provider timeout".to_owned())
            .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn configuration_error_maps_to_internal() {
        let interface =
            ApplicationError::Configuration("missing api key".to_owned()).into_interface("req-4");

        assert!(matches!(interface, InterfaceError::Internal { .. }));
        assert_eq!(interface.user_message(), "An unexpected internal error occurred.");
    }

    #[test]
    fn stale_offer_is_classified_as_stale_reference() {
        let stale = OfferResolutionError::Stale {
            reference: "0badc0de-2".to_owned(),
            current: Some("1234abcd".to_owned()),
        };
        assert_eq!(stale.failure_kind(), FailureKind::StaleReference);
        assert_eq!(OfferResolutionError::NoResults.failure_kind(), FailureKind::Validation);
        assert_eq!(FailureKind::StaleReference.as_str(), "stale_reference");
    }
}
