use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::dispatch::states::{
    DispatchAction, DispatchContext, DispatchEvent, DispatchState, TransitionOutcome,
};
use crate::domain::slots::SlotName;

pub trait DispatchDefinition {
    fn initial_state(&self) -> DispatchState;
    fn transition(
        &self,
        current: DispatchState,
        event: DispatchEvent,
        context: &DispatchContext,
    ) -> Result<TransitionOutcome, DispatchTransitionError>;
}

/// The single-itinerary search-then-book machine.
#[derive(Clone, Debug, Default)]
pub struct TripSearchDispatch;

impl DispatchDefinition for TripSearchDispatch {
    fn initial_state(&self) -> DispatchState {
        DispatchState::Idle
    }

    fn transition(
        &self,
        current: DispatchState,
        event: DispatchEvent,
        context: &DispatchContext,
    ) -> Result<TransitionOutcome, DispatchTransitionError> {
        transition_trip_search(current, event, context)
    }
}

pub struct DispatchEngine<D> {
    definition: D,
}

impl<D> DispatchEngine<D>
where
    D: DispatchDefinition,
{
    pub fn new(definition: D) -> Self {
        Self { definition }
    }

    pub fn initial_state(&self) -> DispatchState {
        self.definition.initial_state()
    }

    pub fn apply(
        &self,
        current: DispatchState,
        event: DispatchEvent,
        context: &DispatchContext,
    ) -> Result<TransitionOutcome, DispatchTransitionError> {
        self.definition.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: DispatchState,
        event: DispatchEvent,
        context: &DispatchContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DispatchTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => sink.emit(
                AuditEvent::new(
                    audit,
                    "dispatch.transition_applied",
                    AuditCategory::Dispatch,
                    AuditOutcome::Success,
                )
                .with_metadata("from", format!("{:?}", outcome.from))
                .with_metadata("to", format!("{:?}", outcome.to))
                .with_metadata("event", format!("{:?}", outcome.event)),
            ),
            Err(error) => sink.emit(
                AuditEvent::new(
                    audit,
                    "dispatch.transition_rejected",
                    AuditCategory::Dispatch,
                    AuditOutcome::Rejected,
                )
                .with_metadata("from", format!("{current:?}"))
                .with_metadata("event", format!("{event:?}"))
                .with_metadata("error", error.to_string()),
            ),
        }
        result
    }
}

impl Default for DispatchEngine<TripSearchDispatch> {
    fn default() -> Self {
        Self::new(TripSearchDispatch)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DispatchTransitionError {
    #[error("missing required slots before transition from {state:?}: {missing_slots:?}")]
    MissingRequiredSlots { state: DispatchState, missing_slots: Vec<SlotName> },
    #[error("no current result set to act on from {state:?}")]
    NoCurrentResults { state: DispatchState },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: DispatchState, event: DispatchEvent },
}

fn transition_trip_search(
    current: DispatchState,
    event: DispatchEvent,
    context: &DispatchContext,
) -> Result<TransitionOutcome, DispatchTransitionError> {
    use DispatchAction::{
        ClearConflictingSlots, ConfirmOfferChoice, DiscardResults, IssueSearch, PresentOffers,
        PromptForCorrection, PromptForMissingSlots, ReorderOffers, ReportBooking,
        ReportBookingFailure, ReportSearchFailure, SubmitBooking,
    };
    use DispatchEvent::{
        BookingConfirmed, BookingDeclined, BookingFailed, BookingRequested, BookingSucceeded,
        NewSearchRequested, ResultsReordered, SearchDispatched, SearchExhausted, SearchRejected,
        SearchSucceeded, SlotsComplete, SlotsIncomplete,
    };
    use DispatchState::{
        AwaitingBookingChoice, AwaitingClarification, BookingInFlight, Done, Failed, Idle,
        ReadyToSearch, ResultsReady, SearchInFlight,
    };

    let (to, actions) = match (current, event) {
        (_, NewSearchRequested) => (Idle, vec![ClearConflictingSlots, DiscardResults]),
        (Idle | AwaitingClarification | Failed, SlotsIncomplete) => {
            (AwaitingClarification, vec![PromptForMissingSlots])
        }
        (Idle | AwaitingClarification | Failed | ResultsReady | AwaitingBookingChoice, SlotsComplete) => {
            if !context.missing_slots.is_empty() {
                return Err(DispatchTransitionError::MissingRequiredSlots {
                    state: current,
                    missing_slots: context.missing_slots.clone(),
                });
            }
            (ReadyToSearch, vec![IssueSearch])
        }
        (ReadyToSearch, SearchDispatched) => (SearchInFlight, Vec::new()),
        (SearchInFlight, SearchSucceeded) => (ResultsReady, vec![PresentOffers]),
        (SearchInFlight, SearchRejected) => (AwaitingClarification, vec![PromptForCorrection]),
        (SearchInFlight, SearchExhausted) => (Failed, vec![ReportSearchFailure]),
        (ResultsReady | AwaitingBookingChoice | Failed, BookingRequested) => {
            if !context.results_current {
                return Err(DispatchTransitionError::NoCurrentResults { state: current });
            }
            (AwaitingBookingChoice, vec![ConfirmOfferChoice])
        }
        (AwaitingBookingChoice, BookingDeclined) => (ResultsReady, vec![PresentOffers]),
        (AwaitingBookingChoice, BookingConfirmed) => {
            if !context.results_current {
                return Err(DispatchTransitionError::NoCurrentResults { state: current });
            }
            (BookingInFlight, vec![SubmitBooking])
        }
        (BookingInFlight, BookingSucceeded) => (Done, vec![ReportBooking]),
        (BookingInFlight, BookingFailed) => (Failed, vec![ReportBookingFailure]),
        (ResultsReady, ResultsReordered) => (ResultsReady, vec![ReorderOffers, PresentOffers]),
        _ => {
            return Err(DispatchTransitionError::InvalidTransition { state: current, event });
        }
    };

    Ok(TransitionOutcome { from: current, to, event, actions })
}
