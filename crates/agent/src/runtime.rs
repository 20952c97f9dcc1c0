//! Turn orchestration.
//!
//! One call to [`AgentRuntime::handle_user_message`] is one conversational turn:
//! extract intent, guard it, merge slots, advance the dispatcher, perform at most one
//! external call (a search or a booking), then append the user, tool and agent turns.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use flightdesk_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use flightdesk_core::booking::BookingProvider;
use flightdesk_core::config::{AppConfig, LlmProvider};
use flightdesk_core::dispatch::{
    DispatchEngine, DispatchEvent, DispatchState, DispatchTransitionError, TransitionOutcome,
    TripSearchDispatch,
};
use flightdesk_core::domain::booking::BookingTarget;
use flightdesk_core::domain::search::{SearchQuery, SortKey};
use flightdesk_core::domain::session::{Session, SessionId, SessionSnapshot, Turn, TurnPayload};
use flightdesk_core::domain::slots::{LocationCode, SlotName, SlotRejection, SlotUpdate};
use flightdesk_core::errors::{ApplicationError, FailureKind, InterfaceError};
use flightdesk_core::search::{
    LocationResolver, OfferSource, RetryPolicy, SearchCoordinator, SearchError, SearchSettings,
};
use flightdesk_core::TracingAuditSink;
use serde_json::Value;
use thiserror::Error;
use tokio::time::timeout;
use tracing::{info, warn};
use uuid::Uuid;

use crate::conversation::RuleBasedExtractor;
use crate::extractor::{Extraction, ExtractionRequest, ExtractorError, IntentExtractor, IntentTag};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::llm::{ChatCompletionsClient, LlmIntentExtractor, RateLimitedLlm};
use crate::providers::{self, CityTableResolver};
use crate::replies;
use crate::sessions::SessionRegistry;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant. Used to pin "today" for date resolution.
#[derive(Clone, Copy, Debug)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    pub confidence_threshold: u8,
    pub turn_window: usize,
    pub extractor_timeout: Duration,
    pub idle_timeout: Duration,
    pub currency: String,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 60,
            turn_window: 8,
            extractor_timeout: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(1_800),
            currency: "USD".to_string(),
        }
    }
}

impl RuntimeSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            confidence_threshold: config.dialogue.confidence_threshold,
            turn_window: config.dialogue.turn_window,
            extractor_timeout: Duration::from_secs(config.dialogue.extractor_timeout_secs),
            idle_timeout: Duration::from_secs(config.dialogue.idle_timeout_secs),
            currency: config.search.currency.clone(),
        }
    }
}

pub fn search_settings_from_config(config: &AppConfig) -> SearchSettings {
    SearchSettings {
        attempt_timeout: Duration::from_secs(config.search.timeout_secs),
        retry: RetryPolicy {
            max_retries: config.search.max_retries,
            base_delay_ms: config.search.backoff_base_ms,
            max_delay_ms: config.search.backoff_max_ms,
        },
        cache_ttl: Duration::from_secs(config.search.cache_ttl_secs),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TurnReply {
    pub session_id: SessionId,
    pub reply: String,
    pub snapshot: SessionSnapshot,
    /// The conversation ended with this turn and the session was destroyed.
    pub ended: bool,
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("message text must not be empty")]
    EmptyMessage,
    #[error(transparent)]
    Application(#[from] ApplicationError),
}

impl RuntimeError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        match self {
            Self::EmptyMessage => InterfaceError::BadRequest {
                message: "message text must not be empty".to_string(),
                correlation_id: correlation_id.into(),
            },
            Self::Application(error) => error.into_interface(correlation_id),
        }
    }
}

/// What a turn produced, before it is recorded on the session.
#[derive(Default)]
struct TurnOutcome {
    reply: String,
    payload: Option<TurnPayload>,
    tool: Option<(String, TurnPayload)>,
    end_session: bool,
}

impl TurnOutcome {
    fn say(reply: impl Into<String>) -> Self {
        Self { reply: reply.into(), ..Self::default() }
    }

    fn with_payload(mut self, payload: TurnPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    fn with_tool(mut self, text: impl Into<String>, payload: TurnPayload) -> Self {
        self.tool = Some((text.into(), payload));
        self
    }

    fn failure(reply: impl Into<String>, failure: FailureKind, detail: impl Into<String>) -> Self {
        Self::say(reply).with_payload(TurnPayload::Failure { failure, detail: detail.into() })
    }
}

pub struct AgentRuntime {
    extractor: Arc<dyn IntentExtractor>,
    guardrails: GuardrailPolicy,
    coordinator: SearchCoordinator,
    booking: Arc<dyn BookingProvider>,
    locations: Arc<dyn LocationResolver>,
    sessions: SessionRegistry,
    dispatcher: DispatchEngine<TripSearchDispatch>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
    settings: RuntimeSettings,
}

impl AgentRuntime {
    pub fn new(
        extractor: Arc<dyn IntentExtractor>,
        coordinator: SearchCoordinator,
        booking: Arc<dyn BookingProvider>,
        settings: RuntimeSettings,
    ) -> Self {
        Self {
            extractor,
            guardrails: GuardrailPolicy::with_threshold(settings.confidence_threshold),
            coordinator,
            booking,
            locations: Arc::new(CityTableResolver),
            sessions: SessionRegistry::new(),
            dispatcher: DispatchEngine::default(),
            audit: Arc::new(TracingAuditSink),
            clock: Arc::new(SystemClock),
            settings,
        }
    }

    /// Wires extractor, providers and coordinator from configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let extractor: Arc<dyn IntentExtractor> = match config.llm.provider {
            LlmProvider::Rules => Arc::new(RuleBasedExtractor::new()),
            LlmProvider::OpenAi | LlmProvider::Ollama => {
                let client = ChatCompletionsClient::from_config(&config.llm)
                    .context("failed to configure the LLM intent extractor")?;
                let limited = RateLimitedLlm::new(
                    client,
                    Duration::from_millis(config.llm.min_request_interval_ms),
                );
                Arc::new(LlmIntentExtractor::new(limited))
            }
        };
        let stack = providers::search_stack_from_config(config)?;
        let coordinator = SearchCoordinator::new(stack.search, search_settings_from_config(config));
        let booking = providers::booking_provider_from_config(config);

        Ok(Self::new(extractor, coordinator, booking, RuntimeSettings::from_config(config))
            .with_location_resolver(stack.locations))
    }

    pub fn with_location_resolver(mut self, locations: Arc<dyn LocationResolver>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_audit_sink(mut self, audit: Arc<dyn AuditSink>) -> Self {
        self.audit = audit;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_sessions(mut self, sessions: SessionRegistry) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn coordinator(&self) -> &SearchCoordinator {
        &self.coordinator
    }

    pub fn settings(&self) -> &RuntimeSettings {
        &self.settings
    }

    pub fn extractor_name(&self) -> &'static str {
        self.extractor.name()
    }

    pub fn booking_provider_name(&self) -> &'static str {
        self.booking.name()
    }

    pub async fn snapshot(&self, session_id: &SessionId) -> Result<SessionSnapshot, ApplicationError> {
        let handle = self
            .sessions
            .get(session_id)
            .await
            .ok_or_else(|| ApplicationError::SessionNotFound(session_id.to_string()))?;
        let session = handle.lock().await;
        Ok(session.snapshot())
    }

    pub async fn restore(&self, snapshot: SessionSnapshot) -> SessionSnapshot {
        let handle = self.sessions.restore(snapshot).await;
        let session = handle.lock().await;
        session.snapshot()
    }

    pub async fn end_session(&self, session_id: &SessionId) -> Result<(), ApplicationError> {
        if self.sessions.remove(session_id).await {
            let audit = system_context(session_id, "client");
            self.audit_session_closed(&audit, "session.ended");
            Ok(())
        } else {
            Err(ApplicationError::SessionNotFound(session_id.to_string()))
        }
    }

    pub async fn evict_idle(&self) -> Vec<SessionId> {
        let evicted = self.sessions.evict_idle(self.clock.now(), self.settings.idle_timeout).await;
        for session_id in &evicted {
            let audit = system_context(session_id, "reaper");
            self.audit_session_closed(&audit, "session.evicted");
        }
        evicted
    }

    fn audit_session_closed(&self, audit: &AuditContext, event_type: &str) {
        self.audit.emit(AuditEvent::new(audit, event_type, AuditCategory::Session, AuditOutcome::Success));
    }

    pub async fn handle_user_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<TurnReply, RuntimeError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(RuntimeError::EmptyMessage);
        }

        let now = self.clock.now();
        let mut guard = self.sessions.lock_current(session_id, now).await;
        let session = &mut *guard;
        if session.ended {
            return Err(ApplicationError::SessionNotFound(session_id.to_string()).into());
        }

        let turn_id = format!("turn-{}", session.turns().len() + 1);
        let correlation_id = Uuid::new_v4().to_string();
        let audit = AuditContext::new(
            Some(session_id.clone()),
            Some(turn_id.clone()),
            correlation_id.clone(),
            "user",
        );
        if session.turns().is_empty() {
            self.audit.emit(AuditEvent::new(
                &audit,
                "session.started",
                AuditCategory::Session,
                AuditOutcome::Success,
            ));
        }
        let state_before = session.dispatch_state;

        let extracted = self.extract(session, text, now).await;
        let intent_label = match &extracted {
            Ok(extraction) => extraction.intent.as_str(),
            Err(_) => "clarify",
        };
        let outcome = match extracted {
            Ok(extraction) => self.run_turn(session, extraction, now, &audit).await,
            Err(error) => {
                warn!(
                    event_name = "dialogue.extractor.failed",
                    correlation_id = %correlation_id,
                    session_id = %session_id,
                    extractor = self.extractor.name(),
                    error = %error,
                    "intent extraction failed, falling back to clarification"
                );
                let reply = format!(
                    "{} {}",
                    replies::extractor_unavailable(),
                    replies::clarification(&session.slots.missing_required(), &[])
                );
                self.prompt_for_missing_or_log(session, &audit);
                TurnOutcome::failure(reply, FailureKind::Extractor, error.to_string())
            }
        };

        let finished = self.clock.now();
        session.append_turn(Turn::user(text, now));
        if let Some((tool_text, payload)) = outcome.tool {
            session.append_turn(Turn::tool(tool_text, payload, finished));
        }
        session.append_turn(Turn::agent(outcome.reply.clone(), outcome.payload, finished));
        if outcome.end_session {
            session.ended = true;
        }

        let snapshot = session.snapshot();
        info!(
            event_name = "dialogue.turn.completed",
            correlation_id = %correlation_id,
            session_id = %session_id,
            turn_id = %turn_id,
            intent = intent_label,
            from_state = ?state_before,
            to_state = ?snapshot.dispatch_state,
            phase = ?snapshot.phase,
            "turn completed"
        );
        self.audit.emit(
            AuditEvent::new(&audit, "dialogue.turn.completed", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("intent", intent_label)
                .with_metadata("from", format!("{state_before:?}"))
                .with_metadata("to", format!("{:?}", snapshot.dispatch_state)),
        );
        drop(guard);

        if outcome.end_session && self.sessions.remove(session_id).await {
            self.audit_session_closed(&audit, "session.ended");
        }

        Ok(TurnReply {
            session_id: session_id.clone(),
            reply: outcome.reply,
            snapshot,
            ended: outcome.end_session,
        })
    }

    async fn extract(
        &self,
        session: &Session,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<Extraction, ExtractorError> {
        let request = ExtractionRequest {
            slots: &session.slots,
            utterance: text,
            turn_window: session.recent_turns(self.settings.turn_window),
            today: now.date_naive(),
        };
        match timeout(self.settings.extractor_timeout, self.extractor.extract(&request)).await {
            Ok(result) => result,
            Err(_) => Err(ExtractorError::Timeout),
        }
    }

    /// Replaces place names in the origin and destination proposals with resolved
    /// codes. Names that cannot be resolved are dropped and reported back.
    async fn resolve_places(
        &self,
        slots: &mut BTreeMap<String, Value>,
        audit: &AuditContext,
    ) -> Vec<SlotRejection> {
        let mut rejected = Vec::new();

        for slot in [SlotName::Origin, SlotName::Destination] {
            let key = slot.as_str();
            let Some(place) = slots.get(key).and_then(Value::as_str).map(str::to_string) else {
                continue;
            };
            if LocationCode::parse(&place).is_ok() {
                continue;
            }

            let lookup = timeout(self.settings.extractor_timeout, self.locations.resolve(&place)).await;
            let resolved = match lookup {
                Ok(result) => result,
                Err(_) => Err(SearchError::Transient(format!("lookup of `{place}` timed out"))),
            };
            match resolved {
                Ok(Some(code)) => {
                    info!(
                        event_name = "dialogue.location_resolved",
                        correlation_id = %audit.correlation_id,
                        slot = key,
                        place = %place,
                        code = %code,
                        resolver = self.locations.name(),
                        "place name resolved"
                    );
                    slots.insert(key.to_string(), Value::String(code.as_str().to_string()));
                }
                Ok(None) => {
                    slots.remove(key);
                    rejected.push(SlotRejection::new(key, format!("no airport or city matches `{place}`")));
                }
                Err(error) => {
                    warn!(
                        event_name = "dialogue.location_lookup_failed",
                        correlation_id = %audit.correlation_id,
                        slot = key,
                        place = %place,
                        error = %error,
                        "place name lookup failed"
                    );
                    slots.remove(key);
                    rejected.push(SlotRejection::new(key, format!("couldn't look up `{place}` right now")));
                }
            }
        }

        rejected
    }

    async fn run_turn(
        &self,
        session: &mut Session,
        mut extraction: Extraction,
        now: DateTime<Utc>,
        audit: &AuditContext,
    ) -> TurnOutcome {
        match self.guardrails.evaluate(&extraction) {
            GuardrailDecision::Allow => {}
            GuardrailDecision::Degrade { reason_code, user_message, .. }
            | GuardrailDecision::Deny { reason_code, user_message, .. } => {
                info!(
                    event_name = "dialogue.guardrail.degraded",
                    correlation_id = %audit.correlation_id,
                    reason_code,
                    confidence = extraction.confidence,
                    "extraction not trusted"
                );
                let missing = session.slots.missing_required();
                self.prompt_for_missing_or_log(session, audit);
                let reply = match reason_code {
                    "low_confidence" => replies::unclear(&missing),
                    _ => user_message,
                };
                return match reason_code {
                    "low_confidence" if !missing.is_empty() => {
                        TurnOutcome::say(reply).with_payload(TurnPayload::Clarification { missing })
                    }
                    _ => TurnOutcome::failure(reply, FailureKind::Validation, reason_code),
                };
            }
        }

        let (update, mut rejected) = if self.guardrails.accepts_slots(&extraction) {
            let unresolved = self.resolve_places(&mut extraction.slots, audit).await;
            let (update, mut rejected) = SlotUpdate::from_raw(&extraction.slots);
            rejected.extend(unresolved);
            (update, rejected)
        } else {
            (SlotUpdate::default(), Vec::new())
        };

        let intent = match extraction.intent {
            intent if session.dispatch_state == DispatchState::Done
                && intent.carries_trip_details()
                && !update.is_empty() =>
            {
                IntentTag::NewSearch
            }
            intent => intent,
        };

        let result = match intent {
            IntentTag::NewSearch => {
                let cleared = session.slots.clear_for_new_search(&update);
                session.discard_search();
                match self.advance(session, DispatchEvent::NewSearchRequested, audit) {
                    Ok(_) => {
                        info!(
                            event_name = "dialogue.new_search",
                            correlation_id = %audit.correlation_id,
                            cleared = ?cleared,
                            "starting a new trip request"
                        );
                        let report = session.slots.apply(update, now.date_naive());
                        rejected.extend(report.rejected);
                        self.advance_trip(session, &rejected, audit).await
                    }
                    Err(error) => Err(error),
                }
            }
            IntentTag::Search | IntentTag::Refine | IntentTag::Clarify => {
                let report = session.slots.apply(update, now.date_naive());
                rejected.extend(report.rejected);
                self.advance_trip(session, &rejected, audit).await
            }
            IntentTag::Book { target } => self.choose_offer(session, &target, audit),
            IntentTag::Confirm => self.confirm_booking(session, audit).await,
            IntentTag::Decline => self.decline_choice(session, audit),
            IntentTag::Sort { key } => self.sort_results(session, key, audit),
            IntentTag::End => Ok(TurnOutcome { end_session: true, ..TurnOutcome::say(replies::farewell()) }),
        };

        result.unwrap_or_else(|error| {
            log_refused_transition(audit, &error);
            TurnOutcome::failure(
                "I can't do that at this point in the conversation.",
                FailureKind::Validation,
                error.to_string(),
            )
        })
    }

    fn advance(
        &self,
        session: &mut Session,
        event: DispatchEvent,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, DispatchTransitionError> {
        let context = session.dispatch_context();
        let outcome = self.dispatcher.apply_with_audit(
            session.dispatch_state,
            event,
            &context,
            self.audit.as_ref(),
            audit,
        )?;
        session.dispatch_state = outcome.to;
        Ok(outcome)
    }

    /// Moves a session that still lacks required slots into clarification. The
    /// dispatcher decides whether the current state allows it.
    fn prompt_for_missing(
        &self,
        session: &mut Session,
        audit: &AuditContext,
    ) -> Result<(), DispatchTransitionError> {
        if session.slots.is_search_ready() {
            return Ok(());
        }
        self.advance(session, DispatchEvent::SlotsIncomplete, audit).map(|_| ())
    }

    /// Prompts for missing slots on paths that already carry their own reply; a
    /// refusal is logged and the session keeps its state.
    fn prompt_for_missing_or_log(&self, session: &mut Session, audit: &AuditContext) {
        if let Err(error) = self.prompt_for_missing(session, audit) {
            log_refused_transition(audit, &error);
        }
    }

    async fn advance_trip(
        &self,
        session: &mut Session,
        rejected: &[SlotRejection],
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        let missing = session.slots.missing_required();
        if !missing.is_empty() {
            self.prompt_for_missing(session, audit)?;
            return Ok(TurnOutcome::say(replies::clarification(&missing, rejected))
                .with_payload(TurnPayload::Clarification { missing }));
        }

        let Some(query) = SearchQuery::from_slots(&session.slots, &self.settings.currency) else {
            return Ok(TurnOutcome::say(replies::clarification(&missing, rejected)));
        };

        let unchanged = session.latest_fingerprint() == Some(&query.fingerprint());
        let presenting = matches!(
            session.dispatch_state,
            DispatchState::ResultsReady | DispatchState::AwaitingBookingChoice
        );
        if unchanged && presenting && session.results_current() {
            return Ok(self.present_current(session, rejected));
        }

        if session.dispatch_state != DispatchState::ReadyToSearch {
            self.advance(session, DispatchEvent::SlotsComplete, audit)?;
        }
        self.run_search(session, query, audit).await
    }

    fn present_current(&self, session: &Session, rejected: &[SlotRejection]) -> TurnOutcome {
        let Some(results) = session.current_results() else {
            return TurnOutcome::say(replies::nothing_to_sort());
        };
        let mut reply = String::new();
        if !rejected.is_empty() {
            reply.push_str(&replies::clarification(&[], rejected));
            reply.push('\n');
        }
        reply.push_str(&replies::offer_list(results, session.latest_query()));
        TurnOutcome::say(reply).with_payload(TurnPayload::OfferList {
            result_set: results.label(),
            sorted_by: results.sorted_by,
            offers: replies::presented_offers(results),
        })
    }

    async fn run_search(
        &self,
        session: &mut Session,
        query: SearchQuery,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        let (epoch, fingerprint) = session.issue_search(query.clone());
        self.advance(session, DispatchEvent::SearchDispatched, audit)?;

        let searched = self.coordinator.search(&query).await;
        match searched {
            Ok(outcome) => {
                let offers = outcome.offers.as_ref().clone();
                let offer_count = offers.len();
                if session.accept_results(epoch, &fingerprint, offers).is_none() {
                    warn!(
                        event_name = "search.result_discarded",
                        correlation_id = %audit.correlation_id,
                        fingerprint = %fingerprint.short(),
                        "search result arrived for a superseded query"
                    );
                    self.advance(session, DispatchEvent::SearchExhausted, audit)?;
                    self.audit.emit(
                        AuditEvent::new(audit, "search.discarded", AuditCategory::Search, AuditOutcome::Failed)
                            .with_metadata("fingerprint", fingerprint.short()),
                    );
                    return Ok(TurnOutcome::failure(
                        replies::search_failed(),
                        FailureKind::Transient,
                        "search superseded",
                    ));
                }
                self.advance(session, DispatchEvent::SearchSucceeded, audit)?;
                self.audit.emit(
                    AuditEvent::new(audit, "search.completed", AuditCategory::Search, AuditOutcome::Success)
                        .with_metadata("fingerprint", fingerprint.short())
                        .with_metadata("source", format!("{:?}", outcome.source))
                        .with_metadata("offers", offer_count.to_string()),
                );

                let tool_text = format!(
                    "search {} returned {offer_count} offers",
                    fingerprint.short()
                );
                let tool_payload = TurnPayload::SearchCompleted {
                    fingerprint: fingerprint.clone(),
                    offer_count,
                    from_cache: outcome.source != OfferSource::Provider,
                };
                Ok(self.present_current(session, &[]).with_tool(tool_text, tool_payload))
            }
            Err(error) => {
                let tool_payload = TurnPayload::SearchFailed {
                    fingerprint: fingerprint.clone(),
                    failure: error.failure_kind(),
                    detail: error.detail().to_string(),
                };
                let tool_text = format!("search {} failed: {error}", fingerprint.short());
                let audit_outcome = match &error {
                    SearchError::Validation(_) => AuditOutcome::Rejected,
                    SearchError::Transient(_) => AuditOutcome::Failed,
                };
                self.audit.emit(
                    AuditEvent::new(audit, "search.failed", AuditCategory::Search, audit_outcome)
                        .with_metadata("fingerprint", fingerprint.short())
                        .with_metadata("error", error.detail()),
                );
                let outcome = match &error {
                    SearchError::Validation(detail) => {
                        self.advance(session, DispatchEvent::SearchRejected, audit)?;
                        TurnOutcome::failure(
                            replies::search_rejected(detail),
                            FailureKind::Validation,
                            detail.clone(),
                        )
                    }
                    SearchError::Transient(detail) => {
                        self.advance(session, DispatchEvent::SearchExhausted, audit)?;
                        TurnOutcome::failure(
                            replies::search_failed(),
                            FailureKind::Transient,
                            detail.clone(),
                        )
                    }
                };
                Ok(outcome.with_tool(tool_text, tool_payload))
            }
        }
    }

    fn choose_offer(
        &self,
        session: &mut Session,
        target: &BookingTarget,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        if session.dispatch_state == DispatchState::Done {
            return Ok(TurnOutcome::say(replies::trip_booked()));
        }

        let (offer_ref, offer) = match session.choose_offer(target) {
            Ok(chosen) => chosen,
            Err(error) => {
                info!(
                    event_name = "booking.offer_unresolved",
                    correlation_id = %audit.correlation_id,
                    error = %error,
                    "booking target could not be resolved"
                );
                return Ok(TurnOutcome::failure(
                    replies::offer_unresolved(&error),
                    error.failure_kind(),
                    error.to_string(),
                ));
            }
        };

        if let Err(error) = self.advance(session, DispatchEvent::BookingRequested, audit) {
            session.clear_pending_choice();
            return Err(error);
        }
        Ok(TurnOutcome::say(replies::confirm_choice(&offer_ref, &offer))
            .with_payload(TurnPayload::BookingChoice { offer_ref, offer }))
    }

    async fn confirm_booking(
        &self,
        session: &mut Session,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        match session.dispatch_state {
            DispatchState::AwaitingBookingChoice => {}
            DispatchState::Done => return Ok(TurnOutcome::say(replies::trip_booked())),
            _ => return Ok(TurnOutcome::say(replies::nothing_to_confirm())),
        }

        let record = match session.start_booking() {
            Ok(record) => record,
            Err(error) => {
                session.clear_pending_choice();
                return Ok(TurnOutcome::failure(
                    replies::offer_unresolved(&error),
                    error.failure_kind(),
                    error.to_string(),
                ));
            }
        };
        self.advance(session, DispatchEvent::BookingConfirmed, audit)?;

        match self.booking.book(&record.offer_ref, &session.id).await {
            Ok(confirmation) => {
                let confirmed = session.complete_booking(confirmation).cloned().unwrap_or(record);
                self.advance(session, DispatchEvent::BookingSucceeded, audit)?;
                info!(
                    event_name = "booking.confirmed",
                    correlation_id = %audit.correlation_id,
                    offer_ref = %confirmed.offer_ref,
                    provider = self.booking.name(),
                    "booking confirmed"
                );
                self.audit.emit(
                    AuditEvent::new(audit, "booking.confirmed", AuditCategory::Booking, AuditOutcome::Success)
                        .with_metadata("offer_ref", confirmed.offer_ref.to_string())
                        .with_metadata("provider", self.booking.name()),
                );
                Ok(TurnOutcome::say(replies::booking_confirmed(&confirmed))
                    .with_payload(TurnPayload::Booking { record: confirmed.clone() })
                    .with_tool(
                        format!("booking {} confirmed", confirmed.offer_ref),
                        TurnPayload::Booking { record: confirmed },
                    ))
            }
            Err(error) => {
                let reason = error.to_string();
                let failed = session.fail_booking(reason.clone()).cloned().unwrap_or(record);
                self.advance(session, DispatchEvent::BookingFailed, audit)?;
                warn!(
                    event_name = "booking.failed",
                    correlation_id = %audit.correlation_id,
                    offer_ref = %failed.offer_ref,
                    error = %reason,
                    "booking failed"
                );
                self.audit.emit(
                    AuditEvent::new(audit, "booking.failed", AuditCategory::Booking, AuditOutcome::Failed)
                        .with_metadata("offer_ref", failed.offer_ref.to_string())
                        .with_metadata("error", reason.clone()),
                );
                Ok(TurnOutcome::failure(replies::booking_failed(&reason), FailureKind::Booking, reason.clone())
                    .with_tool(
                        format!("booking {} failed", failed.offer_ref),
                        TurnPayload::Booking { record: failed },
                    ))
            }
        }
    }

    fn decline_choice(
        &self,
        session: &mut Session,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        if session.dispatch_state != DispatchState::AwaitingBookingChoice {
            return Ok(TurnOutcome::say(replies::unclear(&session.slots.missing_required())));
        }
        self.advance(session, DispatchEvent::BookingDeclined, audit)?;
        session.clear_pending_choice();
        Ok(TurnOutcome::say(replies::choice_declined()))
    }

    fn sort_results(
        &self,
        session: &mut Session,
        key: SortKey,
        audit: &AuditContext,
    ) -> Result<TurnOutcome, DispatchTransitionError> {
        if session.dispatch_state != DispatchState::ResultsReady || !session.results_current() {
            return Ok(TurnOutcome::say(replies::nothing_to_sort()));
        }
        self.advance(session, DispatchEvent::ResultsReordered, audit)?;
        session.sort_results(key);
        Ok(self.present_current(session, &[]))
    }
}

fn system_context(session_id: &SessionId, actor: &str) -> AuditContext {
    AuditContext::new(Some(session_id.clone()), None, Uuid::new_v4().to_string(), actor)
}

fn log_refused_transition(audit: &AuditContext, error: &DispatchTransitionError) {
    warn!(
        event_name = "dialogue.transition_refused",
        correlation_id = %audit.correlation_id,
        error = %error,
        "dispatcher refused the requested step"
    );
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use flightdesk_core::audit::AuditContext;
    use flightdesk_core::config::{AppConfig, LlmProvider, SearchProviderKind};
    use flightdesk_core::dispatch::{DispatchState, DispatchTransitionError};
    use flightdesk_core::domain::session::{Session, SessionId};
    use flightdesk_core::errors::InterfaceError;

    use super::{AgentRuntime, FixedClock, RuntimeError, RuntimeSettings};

    fn runtime() -> AgentRuntime {
        let mut config = AppConfig::default();
        config.llm.provider = LlmProvider::Rules;
        config.search.provider = SearchProviderKind::Simulated;
        let clock = Utc.with_ymd_and_hms(2026, 5, 1, 12, 0, 0).single().expect("time");
        AgentRuntime::from_config(&config)
            .expect("runtime")
            .with_clock(Arc::new(FixedClock(clock)))
    }

    #[test]
    fn settings_follow_config() {
        let mut config = AppConfig::default();
        config.dialogue.confidence_threshold = 75;
        config.search.currency = "EUR".to_string();

        let settings = RuntimeSettings::from_config(&config);
        assert_eq!(settings.confidence_threshold, 75);
        assert_eq!(settings.currency, "EUR");
    }

    #[tokio::test]
    async fn empty_message_is_a_bad_request() {
        let error = runtime()
            .handle_user_message(&SessionId::new("s1"), "   ")
            .await
            .expect_err("rejected");

        assert!(matches!(error, RuntimeError::EmptyMessage));
        assert!(matches!(error.into_interface("req-1"), InterfaceError::BadRequest { .. }));
    }

    #[tokio::test]
    async fn simulated_stack_answers_a_full_request() {
        let runtime = runtime();
        let id = SessionId::new("s1");

        let reply = runtime
            .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
            .await
            .expect("turn");

        assert!(reply.reply.contains("from BOS to PAR"));
        assert!(reply.snapshot.results.is_some());
        assert_eq!(reply.snapshot.turns.len(), 3);
    }

    #[tokio::test]
    async fn goodbye_destroys_the_session() {
        let runtime = runtime();
        let id = SessionId::new("s1");
        runtime.handle_user_message(&id, "Flights from Boston to Paris").await.expect("turn");

        let reply = runtime.handle_user_message(&id, "bye").await.expect("turn");

        assert!(reply.ended);
        assert!(runtime.snapshot(&id).await.is_err());
    }

    #[test]
    fn missing_slots_prompt_follows_the_dispatcher() {
        let runtime = runtime();
        let audit = AuditContext::new(None, None, "corr-1", "test");
        let mut session = Session::new(SessionId::new("s1"), Utc::now());

        runtime.prompt_for_missing(&mut session, &audit).expect("idle may prompt");
        assert_eq!(session.dispatch_state, DispatchState::AwaitingClarification);

        session.dispatch_state = DispatchState::SearchInFlight;
        let error = runtime
            .prompt_for_missing(&mut session, &audit)
            .expect_err("in-flight search cannot prompt");
        assert!(matches!(error, DispatchTransitionError::InvalidTransition { .. }));
        assert_eq!(session.dispatch_state, DispatchState::SearchInFlight);

        runtime.prompt_for_missing_or_log(&mut session, &audit);
        assert_eq!(session.dispatch_state, DispatchState::SearchInFlight);
    }
}
