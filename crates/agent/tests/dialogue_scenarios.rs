use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use flightdesk_agent::{
    AgentRuntime, Extraction, ExtractionRequest, ExtractorError, FixedClock, IntentExtractor,
    IntentTag, RuleBasedExtractor, RuntimeSettings,
};
use flightdesk_core::booking::{BookingError, BookingProvider};
use flightdesk_core::dispatch::DispatchState;
use flightdesk_core::domain::booking::{BookingConfirmation, BookingStatus, BookingTarget};
use flightdesk_core::domain::search::{FlightOffer, OfferRef, SearchQuery, SortKey};
use flightdesk_core::domain::session::{Phase, SessionId, SessionSnapshot, TurnPayload};
use flightdesk_core::domain::slots::{LocationCode, SlotName};
use flightdesk_core::errors::FailureKind;
use flightdesk_core::search::{
    FlightSearchProvider, LocationResolver, RetryPolicy, SearchCoordinator, SearchError,
    SearchSettings,
};
use flightdesk_core::audit::{AuditCategory, AuditOutcome};
use flightdesk_core::InMemoryAuditSink;
use rust_decimal::Decimal;

struct CountingSearch {
    calls: AtomicUsize,
    delay: Duration,
    failure: Option<SearchError>,
}

impl CountingSearch {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), delay: Duration::ZERO, failure: None }
    }

    fn slow(delay: Duration) -> Self {
        Self { delay, ..Self::new() }
    }

    fn failing(error: SearchError) -> Self {
        Self { failure: Some(error), ..Self::new() }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl FlightSearchProvider for CountingSearch {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok((1..=3).map(|index| offer(query, index)).collect())
    }
}

fn offer(query: &SearchQuery, index: u32) -> FlightOffer {
    let departure = query.depart_date.and_hms_opt(7 + index, 30, 0).expect("valid time");
    FlightOffer {
        offer_id: format!("{}-{}-{index}", query.origin, query.destination),
        carrier: ["AF", "QR", "EK"][(index as usize - 1) % 3].to_string(),
        flight_number: format!("XX{index}0"),
        origin: query.origin.to_string(),
        destination: query.destination.to_string(),
        departure_at: departure,
        arrival_at: departure + chrono::Duration::minutes(i64::from(400 + index * 30)),
        duration_minutes: 400 + index * 30,
        stops: (index - 1) as u8,
        fare_class: "economy".to_string(),
        checked_bags: None,
        price: Decimal::from(900 - index * 100),
        currency: query.currency.clone(),
    }
}

struct CountingBooking {
    calls: AtomicUsize,
    failure: Option<BookingError>,
}

impl CountingBooking {
    fn new() -> Self {
        Self { calls: AtomicUsize::new(0), failure: None }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BookingProvider for CountingBooking {
    fn name(&self) -> &'static str {
        "counting"
    }

    async fn book(
        &self,
        offer_ref: &OfferRef,
        _session_id: &SessionId,
    ) -> Result<BookingConfirmation, BookingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(BookingConfirmation {
                confirmation_token: format!("CONF{}", offer_ref.position),
                external_link: None,
            }),
        }
    }
}

/// Rule-based extraction, except for utterances with a scripted answer.
#[derive(Default)]
struct ScriptedExtractor {
    rules: RuleBasedExtractor,
    scripted: Mutex<HashMap<String, Extraction>>,
}

impl ScriptedExtractor {
    fn script(&self, utterance: &str, extraction: Extraction) {
        self.scripted
            .lock()
            .expect("script lock")
            .insert(utterance.to_string(), extraction);
    }
}

#[async_trait]
impl IntentExtractor for ScriptedExtractor {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractorError> {
        let scripted = self.scripted.lock().expect("script lock").get(request.utterance).cloned();
        Ok(scripted.unwrap_or_else(|| self.rules.extract_now(request)))
    }
}

/// Knows a couple of places the built-in city table does not.
#[derive(Default)]
struct DirectoryResolver {
    lookups: Mutex<Vec<String>>,
}

#[async_trait]
impl LocationResolver for DirectoryResolver {
    fn name(&self) -> &'static str {
        "directory"
    }

    async fn resolve(&self, place: &str) -> Result<Option<LocationCode>, SearchError> {
        self.lookups.lock().expect("lookups lock").push(place.to_string());
        let code = match place {
            "Porto" => Some("OPO"),
            "Cape Town" => Some("CPT"),
            _ => None,
        };
        Ok(code.map(|code| LocationCode::parse(code).expect("valid code")))
    }
}

struct StalledExtractor;

#[async_trait]
impl IntentExtractor for StalledExtractor {
    fn name(&self) -> &'static str {
        "stalled"
    }

    async fn extract(&self, _request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractorError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Extraction::clarify())
    }
}

struct Harness {
    runtime: AgentRuntime,
    search: Arc<CountingSearch>,
    booking: Arc<CountingBooking>,
    extractor: Arc<ScriptedExtractor>,
    locations: Arc<DirectoryResolver>,
    audit: InMemoryAuditSink,
}

fn settings() -> RuntimeSettings {
    RuntimeSettings { extractor_timeout: Duration::from_millis(200), ..RuntimeSettings::default() }
}

fn search_settings() -> SearchSettings {
    SearchSettings {
        attempt_timeout: Duration::from_secs(2),
        retry: RetryPolicy { max_retries: 2, base_delay_ms: 1, max_delay_ms: 4 },
        cache_ttl: Duration::from_secs(300),
    }
}

fn harness_with(search: CountingSearch, booking: CountingBooking) -> Harness {
    let search = Arc::new(search);
    let booking = Arc::new(booking);
    let extractor = Arc::new(ScriptedExtractor::default());
    let locations = Arc::new(DirectoryResolver::default());
    let audit = InMemoryAuditSink::default();
    let coordinator = SearchCoordinator::new(search.clone(), search_settings());
    let today = Utc.with_ymd_and_hms(2026, 5, 1, 9, 0, 0).single().expect("valid time");

    let runtime = AgentRuntime::new(extractor.clone(), coordinator, booking.clone(), settings())
        .with_clock(Arc::new(FixedClock(today)))
        .with_audit_sink(Arc::new(audit.clone()))
        .with_location_resolver(locations.clone());

    Harness { runtime, search, booking, extractor, locations, audit }
}

fn harness() -> Harness {
    harness_with(CountingSearch::new(), CountingBooking::new())
}

fn last_agent_payload(snapshot: &SessionSnapshot) -> Option<&TurnPayload> {
    snapshot.turns.last().and_then(|turn| turn.payload.as_ref())
}

fn current_label(snapshot: &SessionSnapshot) -> String {
    snapshot.results.as_ref().map(|results| results.label()).unwrap_or_default()
}

#[tokio::test]
async fn route_without_date_asks_for_a_date() {
    let h = harness();
    let id = SessionId::new("scenario-1");

    let turn = h.runtime.handle_user_message(&id, "Flights from Boston to Paris").await.expect("turn");

    let slots = &turn.snapshot.slots;
    assert_eq!(slots.origin.as_ref().map(|code| code.as_str()), Some("BOS"));
    assert_eq!(slots.destination.as_ref().map(|code| code.as_str()), Some("PAR"));
    assert!(slots.depart_date.is_none());
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
    assert_eq!(turn.snapshot.phase, Phase::Gathering);
    assert!(turn.reply.contains("date"), "reply was: {}", turn.reply);
    assert_eq!(
        last_agent_payload(&turn.snapshot),
        Some(&TurnPayload::Clarification { missing: vec![SlotName::DepartDate] })
    );
    assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn date_completes_the_request_and_lists_three_offers() {
    let h = harness();
    let id = SessionId::new("scenario-2");
    h.runtime.handle_user_message(&id, "Flights from Boston to Paris").await.expect("turn");

    let turn = h.runtime.handle_user_message(&id, "June 10th").await.expect("turn");

    assert_eq!(turn.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert_eq!(turn.snapshot.phase, Phase::Presenting);
    assert_eq!(h.search.calls(), 1);
    let results = turn.snapshot.results.as_ref().expect("results");
    assert_eq!(results.offers.len(), 3);
    for position in 1..=3 {
        assert!(turn.reply.contains(&format!("[{}-{position}]", results.label())));
    }

    let actors: Vec<_> = turn.snapshot.turns.iter().map(|turn| format!("{:?}", turn.actor)).collect();
    assert_eq!(actors, ["User", "Agent", "User", "Tool", "Agent"]);
    assert!(matches!(
        last_agent_payload(&turn.snapshot),
        Some(TurnPayload::OfferList { offers, .. }) if offers.len() == 3
    ));

    let transitions: Vec<_> = h
        .audit
        .events()
        .into_iter()
        .filter(|event| event.event_type == "dispatch.transition_applied")
        .filter_map(|event| event.metadata.get("to").cloned())
        .collect();
    assert_eq!(
        transitions,
        ["AwaitingClarification", "ReadyToSearch", "SearchInFlight", "ResultsReady"]
    );
}

#[tokio::test]
async fn booking_a_superseded_offer_asks_to_reselect() {
    let h = harness();
    let id = SessionId::new("scenario-3");

    let first = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("first search");
    let old_label = current_label(&first.snapshot);

    let second = h
        .runtime
        .handle_user_message(&id, "new search from Boston to London on June 12th")
        .await
        .expect("second search");
    let new_label = current_label(&second.snapshot);
    assert_ne!(old_label, new_label);
    assert_eq!(h.search.calls(), 2);

    let stale_ref = OfferRef { result_set: old_label, position: 2 };
    h.extractor.script(
        "book the second one from before",
        Extraction {
            intent: IntentTag::Book {
                target: BookingTarget { offer_ref: Some(stale_ref), position: Some(2) },
            },
            slots: Default::default(),
            confidence: 90,
        },
    );

    let stale = h
        .runtime
        .handle_user_message(&id, "book the second one from before")
        .await
        .expect("stale turn");

    assert!(stale.reply.contains("re-select from the current list"), "reply was: {}", stale.reply);
    assert_eq!(stale.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert!(stale.snapshot.pending_choice.is_none());
    assert!(matches!(
        last_agent_payload(&stale.snapshot),
        Some(TurnPayload::Failure { failure: FailureKind::StaleReference, .. })
    ));
    assert_eq!(h.booking.calls(), 0);
}

#[tokio::test]
async fn confirmed_choice_books_exactly_once() {
    let h = harness();
    let id = SessionId::new("booking");
    h.runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");

    let choice = h.runtime.handle_user_message(&id, "book the second one").await.expect("choice");
    assert_eq!(choice.snapshot.dispatch_state, DispatchState::AwaitingBookingChoice);
    assert_eq!(h.booking.calls(), 0);

    let done = h.runtime.handle_user_message(&id, "yes").await.expect("confirm");

    assert_eq!(done.snapshot.dispatch_state, DispatchState::Done);
    assert_eq!(h.booking.calls(), 1);
    let record = done.snapshot.booking.as_ref().expect("booking record");
    assert_eq!(record.status, BookingStatus::Confirmed);
    assert_eq!(record.offer_ref.position, 2);
    assert_eq!(record.offer_ref.result_set, current_label(&done.snapshot));
    assert!(done.reply.contains("CONF2"));
}

#[tokio::test]
async fn declined_choice_returns_to_results() {
    let h = harness();
    let id = SessionId::new("decline");
    h.runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    h.runtime.handle_user_message(&id, "book the first one").await.expect("choice");

    let declined = h.runtime.handle_user_message(&id, "no").await.expect("decline");

    assert_eq!(declined.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert!(declined.snapshot.pending_choice.is_none());
    assert_eq!(h.booking.calls(), 0);
}

#[tokio::test]
async fn booking_failure_is_reported_without_retry() {
    let h = harness_with(
        CountingSearch::new(),
        CountingBooking {
            calls: AtomicUsize::new(0),
            failure: Some(BookingError::Declined("fare no longer available".to_string())),
        },
    );
    let id = SessionId::new("booking-fails");
    h.runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    h.runtime.handle_user_message(&id, "book the first one").await.expect("choice");

    let failed = h.runtime.handle_user_message(&id, "yes").await.expect("confirm");

    assert_eq!(failed.snapshot.dispatch_state, DispatchState::Failed);
    assert_eq!(h.booking.calls(), 1);
    assert!(failed.reply.contains("fare no longer available"));
    assert_eq!(
        failed.snapshot.booking.as_ref().map(|record| record.status),
        Some(BookingStatus::Failed)
    );

    let retry = h.runtime.handle_user_message(&id, "book the third one").await.expect("re-choose");
    assert_eq!(retry.snapshot.dispatch_state, DispatchState::AwaitingBookingChoice);
    assert_eq!(h.booking.calls(), 1);
}

#[tokio::test]
async fn concurrent_identical_searches_share_one_provider_call() {
    let h = harness_with(CountingSearch::slow(Duration::from_millis(150)), CountingBooking::new());
    let alice = SessionId::new("alice");
    let bob = SessionId::new("bob");

    let (a, b) = tokio::join!(
        h.runtime.handle_user_message(&alice, "Flights from Boston to Paris on June 10th"),
        h.runtime.handle_user_message(&bob, "Flights from Boston to Paris on June 10th"),
    );

    let (a, b) = (a.expect("alice"), b.expect("bob"));
    assert_eq!(h.search.calls(), 1);
    assert_eq!(a.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert_eq!(b.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert_eq!(a.snapshot.latest_fingerprint, b.snapshot.latest_fingerprint);
}

#[tokio::test]
async fn repeated_query_is_served_without_a_new_call() {
    let h = harness();
    let first = SessionId::new("first");
    let second = SessionId::new("second");
    h.runtime
        .handle_user_message(&first, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");

    let again = h
        .runtime
        .handle_user_message(&first, "Flights from Boston to Paris on June 10th")
        .await
        .expect("repeat");
    assert_eq!(again.snapshot.dispatch_state, DispatchState::ResultsReady);

    let other = h
        .runtime
        .handle_user_message(&second, "Flights from Boston to Paris on June 10th")
        .await
        .expect("other session");

    assert_eq!(h.search.calls(), 1);
    let tool_payload = other.snapshot.turns.iter().find_map(|turn| match &turn.payload {
        Some(TurnPayload::SearchCompleted { from_cache, .. }) => Some(*from_cache),
        _ => None,
    });
    assert_eq!(tool_payload, Some(true));
}

#[tokio::test]
async fn provider_validation_error_asks_for_correction() {
    let h = harness_with(
        CountingSearch::failing(SearchError::Validation("unknown airport PAR".to_string())),
        CountingBooking::new(),
    );
    let id = SessionId::new("validation");

    let turn = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("turn");

    assert_eq!(h.search.calls(), 1);
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
    assert!(turn.reply.contains("unknown airport PAR"));
    assert!(matches!(
        last_agent_payload(&turn.snapshot),
        Some(TurnPayload::Failure { failure: FailureKind::Validation, .. })
    ));
    let search_events: Vec<_> = h
        .audit
        .events()
        .into_iter()
        .filter(|event| event.category == AuditCategory::Search)
        .collect();
    assert_eq!(search_events.len(), 1);
    assert_eq!(search_events[0].event_type, "search.failed");
    assert_eq!(search_events[0].outcome, AuditOutcome::Rejected);
}

#[tokio::test]
async fn exhausted_retries_fail_the_search() {
    let h = harness_with(
        CountingSearch::failing(SearchError::Transient("rate limited".to_string())),
        CountingBooking::new(),
    );
    let id = SessionId::new("transient");

    let turn = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("turn");

    assert_eq!(h.search.calls(), 3);
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::Failed);
    assert_eq!(turn.snapshot.phase, Phase::Failed);
    assert!(turn.reply.contains("try again"));
}

#[tokio::test]
async fn stalled_extractor_degrades_to_clarification() {
    let search = Arc::new(CountingSearch::new());
    let coordinator = SearchCoordinator::new(search.clone(), search_settings());
    let runtime = AgentRuntime::new(
        Arc::new(StalledExtractor),
        coordinator,
        Arc::new(CountingBooking::new()),
        RuntimeSettings { extractor_timeout: Duration::from_millis(20), ..RuntimeSettings::default() },
    );
    let id = SessionId::new("stalled");

    let turn = runtime.handle_user_message(&id, "Flights from Boston to Paris").await.expect("turn");

    assert_eq!(turn.snapshot.turns.len(), 2);
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
    assert!(matches!(
        last_agent_payload(&turn.snapshot),
        Some(TurnPayload::Failure { failure: FailureKind::Extractor, .. })
    ));
    assert_eq!(search.calls(), 0);
}

#[tokio::test]
async fn low_confidence_never_touches_slots() {
    let h = harness();
    let id = SessionId::new("unsure");
    h.extractor.script(
        "maybe somewhere warm",
        Extraction {
            intent: IntentTag::Search,
            slots: [("destination".to_string(), serde_json::json!("MIA"))].into_iter().collect(),
            confidence: 30,
        },
    );

    let turn = h.runtime.handle_user_message(&id, "maybe somewhere warm").await.expect("turn");

    assert!(turn.snapshot.slots.destination.is_none());
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
    assert!(turn.reply.contains("didn't quite catch"));
}

#[tokio::test]
async fn malformed_slot_values_are_discarded() {
    let h = harness();
    let id = SessionId::new("malformed");
    h.extractor.script(
        "weird request",
        Extraction {
            intent: IntentTag::Search,
            slots: [
                ("origin".to_string(), serde_json::json!("BOS")),
                ("destination".to_string(), serde_json::json!(42)),
                ("passengers".to_string(), serde_json::json!(-3)),
            ]
            .into_iter()
            .collect(),
            confidence: 90,
        },
    );

    let turn = h.runtime.handle_user_message(&id, "weird request").await.expect("turn");

    assert_eq!(turn.snapshot.slots.origin.as_ref().map(|code| code.as_str()), Some("BOS"));
    assert!(turn.snapshot.slots.destination.is_none());
    assert!(turn.snapshot.slots.passengers.is_none());
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
}

#[tokio::test]
async fn snapshot_survives_a_restart() {
    let h = harness();
    let id = SessionId::new("resume");
    let turn = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    let stored = serde_json::to_string(&turn.snapshot).expect("serialize snapshot");

    let restarted = harness();
    let snapshot: SessionSnapshot = serde_json::from_str(&stored).expect("deserialize snapshot");
    restarted.runtime.restore(snapshot).await;

    let choice = restarted
        .runtime
        .handle_user_message(&id, "book the second one")
        .await
        .expect("choice after restore");

    assert_eq!(choice.snapshot.dispatch_state, DispatchState::AwaitingBookingChoice);
    assert_eq!(restarted.search.calls(), 0);
}

#[tokio::test]
async fn sorting_by_price_relists_under_a_new_label() {
    let h = harness();
    let id = SessionId::new("sorted");
    let listed = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    let listed_label = current_label(&listed.snapshot);

    let sorted = h.runtime.handle_user_message(&id, "sort by price").await.expect("sort");

    assert_eq!(sorted.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert_eq!(sorted.snapshot.phase, Phase::Presenting);
    assert_eq!(h.search.calls(), 1);
    let results = sorted.snapshot.results.as_ref().expect("results");
    let prices: Vec<_> = results.offers.iter().map(|offer| offer.price).collect();
    assert_eq!(prices, [Decimal::from(600), Decimal::from(700), Decimal::from(800)]);
    assert_eq!(results.sorted_by, Some(SortKey::Price));

    let sorted_label = current_label(&sorted.snapshot);
    assert_ne!(sorted_label, listed_label);
    assert!(sorted.reply.contains(&format!("[{sorted_label}-1]")), "reply was: {}", sorted.reply);
    assert!(!sorted.reply.contains(&format!("[{listed_label}-")));
    assert!(matches!(
        last_agent_payload(&sorted.snapshot),
        Some(TurnPayload::OfferList { result_set, sorted_by: Some(SortKey::Price), .. })
            if *result_set == sorted_label
    ));

    let choice = h.runtime.handle_user_message(&id, "book the first one").await.expect("choice");
    let chosen = choice.snapshot.pending_choice.as_ref().expect("pending choice");
    assert_eq!(chosen, &OfferRef { result_set: sorted_label, position: 1 });
}

#[tokio::test]
async fn refs_printed_before_a_sort_are_stale() {
    let h = harness();
    let id = SessionId::new("sorted-stale");
    let listed = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    let printed = OfferRef { result_set: current_label(&listed.snapshot), position: 1 };
    h.runtime.handle_user_message(&id, "sort by price").await.expect("sort");

    let stale = h
        .runtime
        .handle_user_message(&id, &format!("book {printed}"))
        .await
        .expect("stale turn");

    assert!(stale.reply.contains("re-select from the current list"), "reply was: {}", stale.reply);
    assert!(stale.snapshot.pending_choice.is_none());
    assert!(matches!(
        last_agent_payload(&stale.snapshot),
        Some(TurnPayload::Failure { failure: FailureKind::StaleReference, .. })
    ));
    assert_eq!(h.booking.calls(), 0);
}

#[tokio::test]
async fn sorting_without_results_asks_to_search_first() {
    let h = harness();
    let id = SessionId::new("sort-first");

    let turn = h.runtime.handle_user_message(&id, "sort by price").await.expect("turn");

    assert!(turn.reply.contains("no current results to sort"), "reply was: {}", turn.reply);
    assert!(turn.snapshot.results.is_none());
    assert_eq!(h.search.calls(), 0);
}

#[tokio::test]
async fn audit_trail_records_session_search_and_booking() {
    let h = harness();
    let id = SessionId::new("audited");
    h.runtime
        .handle_user_message(&id, "Flights from Boston to Paris on June 10th")
        .await
        .expect("search");
    h.runtime.handle_user_message(&id, "book the second one").await.expect("choice");
    h.runtime.handle_user_message(&id, "yes").await.expect("confirm");
    h.runtime.handle_user_message(&id, "bye").await.expect("goodbye");

    let trail: Vec<_> = h
        .audit
        .events()
        .into_iter()
        .filter(|event| event.category != AuditCategory::Dispatch && event.category != AuditCategory::Ingress)
        .map(|event| (event.category, event.event_type))
        .collect();
    assert_eq!(
        trail,
        [
            (AuditCategory::Session, "session.started".to_string()),
            (AuditCategory::Search, "search.completed".to_string()),
            (AuditCategory::Booking, "booking.confirmed".to_string()),
            (AuditCategory::Session, "session.ended".to_string()),
        ]
    );
    let booked = h
        .audit
        .events()
        .into_iter()
        .find(|event| event.event_type == "booking.confirmed")
        .expect("booking event");
    assert_eq!(booked.session_id, Some(id));
    assert_eq!(booked.metadata.get("provider").map(String::as_str), Some("counting"));
}

#[tokio::test]
async fn unfamiliar_city_is_looked_up_before_searching() {
    let h = harness();
    let id = SessionId::new("lookup");

    let turn = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Porto on June 10th")
        .await
        .expect("turn");

    assert_eq!(turn.snapshot.slots.destination.as_ref().map(|code| code.as_str()), Some("OPO"));
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::ResultsReady);
    assert_eq!(h.search.calls(), 1);
    assert_eq!(*h.locations.lookups.lock().expect("lookups lock"), ["Porto"]);
}

#[tokio::test]
async fn unknown_place_is_reported_and_asked_again() {
    let h = harness();
    let id = SessionId::new("atlantis");

    let turn = h
        .runtime
        .handle_user_message(&id, "Flights from Boston to Atlantis on June 10th")
        .await
        .expect("turn");

    assert!(turn.snapshot.slots.destination.is_none());
    assert_eq!(turn.snapshot.slots.origin.as_ref().map(|code| code.as_str()), Some("BOS"));
    assert_eq!(turn.snapshot.dispatch_state, DispatchState::AwaitingClarification);
    assert!(turn.reply.contains("no airport or city matches `Atlantis`"), "reply was: {}", turn.reply);
    assert_eq!(h.search.calls(), 0);
}
