use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dispatch::{DispatchContext, DispatchState};
use crate::domain::booking::{BookingConfirmation, BookingRecord, BookingTarget};
use crate::domain::search::{Fingerprint, FlightOffer, OfferRef, ResultSet, SearchQuery, SortKey};
use crate::domain::slots::{SlotName, SlotSet};
use crate::errors::{FailureKind, OfferResolutionError};

const MAX_SESSION_ID_LEN: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn generate() -> Self {
        Self(format!("sess-{}", Uuid::new_v4().simple()))
    }

    /// Accepts ids supplied by clients: 1-64 characters of `[A-Za-z0-9_-]`.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.len() > MAX_SESSION_ID_LEN {
            return Err(format!(
                "session id must be between 1 and {MAX_SESSION_ID_LEN} characters"
            ));
        }
        if !trimmed.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err(format!("session id `{trimmed}` contains unsupported characters"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Actor {
    User,
    Agent,
    Tool,
}

/// Coarse conversation phase reported to clients. Derived from the dispatcher state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Gathering,
    Searching,
    Presenting,
    Refining,
    Booking,
    Done,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresentedOffer {
    pub offer_ref: OfferRef,
    pub offer: FlightOffer,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TurnPayload {
    SearchCompleted { fingerprint: Fingerprint, offer_count: usize, from_cache: bool },
    SearchFailed { fingerprint: Fingerprint, failure: FailureKind, detail: String },
    OfferList { result_set: String, sorted_by: Option<SortKey>, offers: Vec<PresentedOffer> },
    Clarification { missing: Vec<SlotName> },
    BookingChoice { offer_ref: OfferRef, offer: FlightOffer },
    Booking { record: BookingRecord },
    Failure { failure: FailureKind, detail: String },
}

/// One appended entry of the conversation. Never mutated once recorded.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub actor: Actor,
    pub at: DateTime<Utc>,
    pub text: String,
    pub payload: Option<TurnPayload>,
}

impl Turn {
    pub fn user(text: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self { actor: Actor::User, at, text: text.into(), payload: None }
    }

    pub fn tool(text: impl Into<String>, payload: TurnPayload, at: DateTime<Utc>) -> Self {
        Self { actor: Actor::Tool, at, text: text.into(), payload: Some(payload) }
    }

    pub fn agent(text: impl Into<String>, payload: Option<TurnPayload>, at: DateTime<Utc>) -> Self {
        Self { actor: Actor::Agent, at, text: text.into(), payload }
    }

    /// Label of the result set this turn presented, if it listed offers.
    pub fn presented_result_set(&self) -> Option<&str> {
        match &self.payload {
            Some(TurnPayload::OfferList { result_set, .. }) => Some(result_set.as_str()),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub dispatch_state: DispatchState,
    pub slots: SlotSet,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ended: bool,
    turns: Vec<Turn>,
    latest_query: Option<SearchQuery>,
    latest_fingerprint: Option<Fingerprint>,
    search_epoch: u64,
    results: Option<ResultSet>,
    pending_choice: Option<OfferRef>,
    booking: Option<BookingRecord>,
}

impl Session {
    pub fn new(id: SessionId, now: DateTime<Utc>) -> Self {
        Self {
            id,
            dispatch_state: DispatchState::Idle,
            slots: SlotSet::default(),
            created_at: now,
            last_activity: now,
            ended: false,
            turns: Vec::new(),
            latest_query: None,
            latest_fingerprint: None,
            search_epoch: 0,
            results: None,
            pending_choice: None,
            booking: None,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.dispatch_state {
            DispatchState::Idle | DispatchState::AwaitingClarification => {
                if self.results.is_some() {
                    Phase::Refining
                } else {
                    Phase::Gathering
                }
            }
            DispatchState::ReadyToSearch | DispatchState::SearchInFlight => Phase::Searching,
            DispatchState::ResultsReady => {
                if self.results.as_ref().is_some_and(|results| results.sorted_by.is_some()) {
                    Phase::Refining
                } else {
                    Phase::Presenting
                }
            }
            DispatchState::AwaitingBookingChoice | DispatchState::BookingInFlight => Phase::Booking,
            DispatchState::Done => Phase::Done,
            DispatchState::Failed => Phase::Failed,
        }
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn recent_turns(&self, window: usize) -> &[Turn] {
        let start = self.turns.len().saturating_sub(window);
        &self.turns[start..]
    }

    pub fn append_turn(&mut self, turn: Turn) {
        self.last_activity = self.last_activity.max(turn.at);
        self.turns.push(turn);
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity = self.last_activity.max(now);
    }

    pub fn is_idle(&self, now: DateTime<Utc>, timeout: std::time::Duration) -> bool {
        now.signed_duration_since(self.last_activity)
            .to_std()
            .map(|elapsed| elapsed >= timeout)
            .unwrap_or(false)
    }

    pub fn latest_query(&self) -> Option<&SearchQuery> {
        self.latest_query.as_ref()
    }

    pub fn latest_fingerprint(&self) -> Option<&Fingerprint> {
        self.latest_fingerprint.as_ref()
    }

    pub fn search_epoch(&self) -> u64 {
        self.search_epoch
    }

    pub fn results(&self) -> Option<&ResultSet> {
        self.results.as_ref()
    }

    /// The result set answering the latest issued query, if it has completed.
    pub fn current_results(&self) -> Option<&ResultSet> {
        let latest = self.latest_fingerprint.as_ref()?;
        self.results.as_ref().filter(|results| &results.fingerprint == latest)
    }

    pub fn results_current(&self) -> bool {
        self.current_results().is_some()
    }

    pub fn dispatch_context(&self) -> DispatchContext {
        DispatchContext {
            missing_slots: self.slots.missing_required(),
            results_current: self.results_current(),
        }
    }

    /// Records `query` as the session's latest search and opens a new search epoch.
    /// Results from earlier epochs are refused by [`Session::accept_results`].
    pub fn issue_search(&mut self, query: SearchQuery) -> (u64, Fingerprint) {
        let fingerprint = query.fingerprint();
        self.latest_fingerprint = Some(fingerprint.clone());
        self.latest_query = Some(query);
        self.search_epoch += 1;
        self.pending_choice = None;
        (self.search_epoch, fingerprint)
    }

    /// Merges offers returned for `fingerprint`. Returns `None` and leaves the session
    /// untouched when the search was superseded.
    pub fn accept_results(
        &mut self,
        epoch: u64,
        fingerprint: &Fingerprint,
        offers: Vec<FlightOffer>,
    ) -> Option<&ResultSet> {
        if epoch != self.search_epoch || self.latest_fingerprint.as_ref() != Some(fingerprint) {
            return None;
        }
        self.results = Some(ResultSet::new(fingerprint.clone(), offers));
        self.results.as_ref()
    }

    /// Forgets the current search so a new trip can start. Any search still running
    /// for this session will be refused when it returns.
    pub fn discard_search(&mut self) {
        self.latest_query = None;
        self.latest_fingerprint = None;
        self.results = None;
        self.pending_choice = None;
        self.search_epoch += 1;
    }

    pub fn sort_results(&mut self, key: SortKey) -> Option<&ResultSet> {
        if !self.results_current() {
            return None;
        }
        self.pending_choice = None;
        let results = self.results.as_mut()?;
        results.sort_by(key);
        Some(&*results)
    }

    /// Finds the offer a booking request points at. Only offers from the result set
    /// of the latest query can be resolved.
    pub fn resolve_booking_target(
        &self,
        target: &BookingTarget,
    ) -> Result<(OfferRef, FlightOffer), OfferResolutionError> {
        let current = self.current_results();

        if let Some(reference) = &target.offer_ref {
            let Some(results) = current else {
                return Err(OfferResolutionError::Stale {
                    reference: reference.to_string(),
                    current: None,
                });
            };
            if reference.result_set != results.label() {
                return Err(OfferResolutionError::Stale {
                    reference: reference.to_string(),
                    current: Some(results.label()),
                });
            }
            return lookup(results, reference.position);
        }

        let Some(position) = target.position else {
            return Err(OfferResolutionError::Unspecified);
        };
        match current {
            Some(results) => lookup(results, position),
            None if self.results.is_some() => Err(OfferResolutionError::Stale {
                reference: format!("option {position}"),
                current: None,
            }),
            None => Err(OfferResolutionError::NoResults),
        }
    }

    pub fn choose_offer(
        &mut self,
        target: &BookingTarget,
    ) -> Result<(OfferRef, FlightOffer), OfferResolutionError> {
        let (offer_ref, offer) = self.resolve_booking_target(target)?;
        self.pending_choice = Some(offer_ref.clone());
        Ok((offer_ref, offer))
    }

    pub fn pending_choice(&self) -> Option<&OfferRef> {
        self.pending_choice.as_ref()
    }

    pub fn clear_pending_choice(&mut self) {
        self.pending_choice = None;
    }

    /// Creates the pending booking for the chosen offer, re-checking that it still
    /// belongs to the latest result set.
    pub fn start_booking(&mut self) -> Result<BookingRecord, OfferResolutionError> {
        let chosen = self.pending_choice.clone().ok_or(OfferResolutionError::Unspecified)?;
        let (offer_ref, offer) = self.resolve_booking_target(&BookingTarget::reference(chosen))?;
        let record = BookingRecord::pending(offer_ref, &offer, self.id.clone());
        self.booking = Some(record.clone());
        Ok(record)
    }

    pub fn complete_booking(&mut self, confirmation: BookingConfirmation) -> Option<&BookingRecord> {
        let record = self.booking.as_mut()?;
        record.confirm(confirmation.confirmation_token, confirmation.external_link);
        self.pending_choice = None;
        Some(&*record)
    }

    pub fn fail_booking(&mut self, reason: impl Into<String>) -> Option<&BookingRecord> {
        let record = self.booking.as_mut()?;
        record.fail(reason);
        Some(&*record)
    }

    pub fn booking(&self) -> Option<&BookingRecord> {
        self.booking.as_ref()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id.clone(),
            phase: self.phase(),
            dispatch_state: self.dispatch_state,
            slots: self.slots.clone(),
            search_ready: self.slots.is_search_ready(),
            latest_query: self.latest_query.clone(),
            latest_fingerprint: self.latest_fingerprint.clone(),
            search_epoch: self.search_epoch,
            results: self.results.clone(),
            pending_choice: self.pending_choice.clone(),
            booking: self.booking.clone(),
            turns: self.turns.clone(),
            created_at: self.created_at,
            last_activity: self.last_activity,
            ended: self.ended,
        }
    }

    /// Rebuilds a session from a snapshot. Work that was in flight when the snapshot
    /// was taken cannot be resumed: a running search is re-armed and a running
    /// booking is reported as failed with its record left pending.
    pub fn from_snapshot(snapshot: SessionSnapshot) -> Self {
        let latest_fingerprint = snapshot.latest_query.as_ref().map(SearchQuery::fingerprint);
        let dispatch_state = match snapshot.dispatch_state {
            DispatchState::SearchInFlight => DispatchState::ReadyToSearch,
            DispatchState::BookingInFlight => DispatchState::Failed,
            other => other,
        };

        Self {
            id: snapshot.session_id,
            dispatch_state,
            slots: snapshot.slots,
            created_at: snapshot.created_at,
            last_activity: snapshot.last_activity,
            ended: snapshot.ended,
            turns: snapshot.turns,
            latest_query: snapshot.latest_query,
            latest_fingerprint,
            search_epoch: snapshot.search_epoch,
            results: snapshot.results,
            pending_choice: snapshot.pending_choice,
            booking: snapshot.booking,
        }
    }
}

fn lookup(results: &ResultSet, position: usize) -> Result<(OfferRef, FlightOffer), OfferResolutionError> {
    results
        .get(position)
        .cloned()
        .map(|offer| (results.offer_ref(position), offer))
        .ok_or(OfferResolutionError::OutOfRange { position, available: results.offers.len() })
}

/// Serializable view of a session, stable enough to resume a conversation after a
/// restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub session_id: SessionId,
    pub phase: Phase,
    pub dispatch_state: DispatchState,
    pub slots: SlotSet,
    pub search_ready: bool,
    pub latest_query: Option<SearchQuery>,
    pub latest_fingerprint: Option<Fingerprint>,
    pub search_epoch: u64,
    pub results: Option<ResultSet>,
    pub pending_choice: Option<OfferRef>,
    pub booking: Option<BookingRecord>,
    pub turns: Vec<Turn>,
    pub created_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub ended: bool,
}
