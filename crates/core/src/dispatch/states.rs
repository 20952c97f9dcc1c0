use serde::{Deserialize, Serialize};

use crate::domain::slots::SlotName;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchState {
    Idle,
    AwaitingClarification,
    ReadyToSearch,
    SearchInFlight,
    ResultsReady,
    AwaitingBookingChoice,
    BookingInFlight,
    Done,
    Failed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DispatchEvent {
    SlotsIncomplete,
    SlotsComplete,
    SearchDispatched,
    SearchSucceeded,
    SearchRejected,
    SearchExhausted,
    BookingRequested,
    BookingDeclined,
    BookingConfirmed,
    BookingSucceeded,
    BookingFailed,
    ResultsReordered,
    NewSearchRequested,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DispatchContext {
    pub missing_slots: Vec<SlotName>,
    /// The session holds a result set whose fingerprint matches its latest query.
    pub results_current: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchAction {
    PromptForMissingSlots,
    IssueSearch,
    PresentOffers,
    PromptForCorrection,
    ReportSearchFailure,
    ConfirmOfferChoice,
    SubmitBooking,
    ReportBooking,
    ReportBookingFailure,
    ReorderOffers,
    ClearConflictingSlots,
    DiscardResults,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: DispatchState,
    pub to: DispatchState,
    pub event: DispatchEvent,
    pub actions: Vec<DispatchAction>,
}
