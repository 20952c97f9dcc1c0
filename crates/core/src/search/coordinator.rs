//! Shared entry point for flight searches.
//!
//! Every search goes through one [`SearchCoordinator`], shared by all sessions. It
//! bounds each provider attempt with a timeout, retries transient failures with
//! exponential backoff, collapses concurrent searches for the same fingerprint into a
//! single provider call, and keeps successful results for a configurable TTL.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::domain::search::{Fingerprint, FlightOffer, SearchQuery};
use crate::search::{FlightSearchProvider, RetryPolicy, SearchError};

type SearchResult = Result<Arc<Vec<FlightOffer>>, SearchError>;
type SharedSearch = Shared<BoxFuture<'static, SearchResult>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SearchSettings {
    pub attempt_timeout: Duration,
    pub retry: RetryPolicy,
    /// Zero disables the result cache; single-flight still applies.
    pub cache_ttl: Duration,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_secs(20),
            retry: RetryPolicy::default(),
            cache_ttl: Duration::from_secs(300),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OfferSource {
    Provider,
    Joined,
    Cache,
}

#[derive(Clone, Debug)]
pub struct SearchOutcome {
    pub fingerprint: Fingerprint,
    pub offers: Arc<Vec<FlightOffer>>,
    pub source: OfferSource,
}

struct CachedOffers {
    offers: Arc<Vec<FlightOffer>>,
    stored_at: Instant,
}

#[derive(Default)]
struct CoordinatorState {
    cache: HashMap<Fingerprint, CachedOffers>,
    in_flight: HashMap<Fingerprint, SharedSearch>,
}

#[derive(Clone)]
pub struct SearchCoordinator {
    provider: Arc<dyn FlightSearchProvider>,
    settings: SearchSettings,
    state: Arc<Mutex<CoordinatorState>>,
}

impl SearchCoordinator {
    pub fn new(provider: Arc<dyn FlightSearchProvider>, settings: SearchSettings) -> Self {
        Self { provider, settings, state: Arc::new(Mutex::new(CoordinatorState::default())) }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn settings(&self) -> SearchSettings {
        self.settings
    }

    pub async fn search(&self, query: &SearchQuery) -> Result<SearchOutcome, SearchError> {
        let fingerprint = query.fingerprint();

        let (pending, source) = {
            let mut state = lock_state(&self.state);

            if let Some(offers) = self.cached(&mut state, &fingerprint) {
                debug!(
                    event_name = "search.cache_hit",
                    fingerprint = %fingerprint.short(),
                    "serving search results from cache"
                );
                return Ok(SearchOutcome { fingerprint, offers, source: OfferSource::Cache });
            }

            match state.in_flight.get(&fingerprint) {
                Some(existing) => {
                    info!(
                        event_name = "search.single_flight_joined",
                        fingerprint = %fingerprint.short(),
                        "joining in-flight search"
                    );
                    (existing.clone(), OfferSource::Joined)
                }
                None => {
                    let pending = self.spawn_search(query.clone(), fingerprint.clone());
                    state.in_flight.insert(fingerprint.clone(), pending.clone());
                    (pending, OfferSource::Provider)
                }
            }
        };

        let offers = pending.await?;
        Ok(SearchOutcome { fingerprint, offers, source })
    }

    /// Number of distinct searches currently waiting on the provider.
    pub fn in_flight(&self) -> usize {
        lock_state(&self.state).in_flight.len()
    }

    /// Number of result sets held in the cache, expired or not.
    pub fn cached_entries(&self) -> usize {
        lock_state(&self.state).cache.len()
    }

    pub fn clear_cache(&self) {
        lock_state(&self.state).cache.clear();
    }

    fn cached(
        &self,
        state: &mut CoordinatorState,
        fingerprint: &Fingerprint,
    ) -> Option<Arc<Vec<FlightOffer>>> {
        let entry = state.cache.get(fingerprint)?;
        if entry.stored_at.elapsed() < self.settings.cache_ttl {
            return Some(Arc::clone(&entry.offers));
        }
        state.cache.remove(fingerprint);
        None
    }

    // The provider call runs on its own task so it completes (and populates the cache)
    // even if every caller waiting on it goes away.
    fn spawn_search(&self, query: SearchQuery, fingerprint: Fingerprint) -> SharedSearch {
        let provider = Arc::clone(&self.provider);
        let state = Arc::clone(&self.state);
        let settings = self.settings;

        let task = tokio::spawn(async move {
            let result =
                search_with_retry(provider.as_ref(), &query, &fingerprint, settings).await.map(Arc::new);

            let mut state = lock_state(&state);
            state.in_flight.remove(&fingerprint);
            if let Ok(offers) = &result {
                if !settings.cache_ttl.is_zero() {
                    let ttl = settings.cache_ttl;
                    let before = state.cache.len();
                    state.cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
                    let pruned = before - state.cache.len();
                    if pruned > 0 {
                        debug!(
                            event_name = "search.cache_pruned",
                            pruned,
                            remaining = state.cache.len(),
                            "dropped expired search results"
                        );
                    }
                    state.cache.insert(
                        fingerprint,
                        CachedOffers { offers: Arc::clone(offers), stored_at: Instant::now() },
                    );
                }
            }
            result
        });

        async move {
            match task.await {
                Ok(result) => result,
                Err(join_error) => {
                    Err(SearchError::Transient(format!("search task aborted: {join_error}")))
                }
            }
        }
        .boxed()
        .shared()
    }
}

async fn search_with_retry(
    provider: &dyn FlightSearchProvider,
    query: &SearchQuery,
    fingerprint: &Fingerprint,
    settings: SearchSettings,
) -> Result<Vec<FlightOffer>, SearchError> {
    let policy = settings.retry;
    let mut attempt = 0_u32;

    loop {
        let result = match tokio::time::timeout(settings.attempt_timeout, provider.search(query)).await {
            Ok(result) => result,
            Err(_) => Err(SearchError::Transient(format!(
                "{} did not answer within {}ms",
                provider.name(),
                settings.attempt_timeout.as_millis()
            ))),
        };

        match result {
            Ok(offers) => {
                info!(
                    event_name = "search.completed",
                    provider = provider.name(),
                    fingerprint = %fingerprint.short(),
                    attempts = attempt + 1,
                    offers = offers.len(),
                    "flight search completed"
                );
                return Ok(offers);
            }
            Err(SearchError::Transient(reason)) if attempt < policy.max_retries => {
                let delay = policy.backoff(attempt);
                warn!(
                    event_name = "search.retry_scheduled",
                    provider = provider.name(),
                    fingerprint = %fingerprint.short(),
                    attempt = attempt + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "transient search failure, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(SearchError::Transient(reason)) => {
                warn!(
                    event_name = "search.exhausted",
                    provider = provider.name(),
                    fingerprint = %fingerprint.short(),
                    attempts = attempt + 1,
                    error = %reason,
                    "search retries exhausted"
                );
                return Err(SearchError::Transient(format!(
                    "{reason} (gave up after {} attempts)",
                    attempt + 1
                )));
            }
            Err(error) => {
                warn!(
                    event_name = "search.rejected",
                    provider = provider.name(),
                    fingerprint = %fingerprint.short(),
                    error = %error,
                    "search rejected by provider"
                );
                return Err(error);
            }
        }
    }
}

fn lock_state(state: &Mutex<CoordinatorState>) -> MutexGuard<'_, CoordinatorState> {
    match state.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use rust_decimal::Decimal;

    use super::{OfferSource, SearchCoordinator, SearchSettings};
    use crate::domain::search::{FlightOffer, SearchQuery};
    use crate::domain::slots::{LocationCode, SlotSet};
    use crate::search::{FlightSearchProvider, RetryPolicy, SearchError};

    struct ScriptedProvider {
        calls: AtomicUsize,
        delay: Duration,
        failures: Mutex<VecDeque<SearchError>>,
    }

    impl ScriptedProvider {
        fn new(delay: Duration, failures: Vec<SearchError>) -> Arc<Self> {
            Arc::new(Self { calls: AtomicUsize::new(0), delay, failures: Mutex::new(failures.into()) })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl FlightSearchProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            let failure = self.failures.lock().expect("failures lock").pop_front();
            if let Some(error) = failure {
                return Err(error);
            }
            Ok(vec![offer(query)])
        }
    }

    fn offer(query: &SearchQuery) -> FlightOffer {
        let departure = query.depart_date.and_hms_opt(10, 0, 0).expect("valid time");
        FlightOffer {
            offer_id: format!("offer-{}", query.fingerprint().short()),
            carrier: "AA".to_string(),
            flight_number: "AA100".to_string(),
            origin: query.origin.to_string(),
            destination: query.destination.to_string(),
            departure_at: departure,
            arrival_at: departure + chrono::Duration::minutes(380),
            duration_minutes: 380,
            stops: 0,
            fare_class: "ECONOMY".to_string(),
            checked_bags: None,
            price: Decimal::new(399, 0),
            currency: query.currency.clone(),
        }
    }

    fn query(destination: &str) -> SearchQuery {
        let slots = SlotSet {
            origin: Some(LocationCode::parse("BOS").expect("code")),
            destination: Some(LocationCode::parse(destination).expect("code")),
            depart_date: NaiveDate::from_ymd_opt(2026, 6, 10),
            ..SlotSet::default()
        };
        SearchQuery::from_slots(&slots, "USD").expect("complete slots")
    }

    fn fast_settings() -> SearchSettings {
        SearchSettings {
            attempt_timeout: Duration::from_millis(500),
            retry: RetryPolicy { max_retries: 2, base_delay_ms: 1, max_delay_ms: 5 },
            cache_ttl: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn concurrent_identical_searches_share_one_provider_call() {
        let provider = ScriptedProvider::new(Duration::from_millis(50), Vec::new());
        let coordinator = SearchCoordinator::new(provider.clone(), fast_settings());
        let query = query("PAR");

        let (first, second, third) =
            tokio::join!(coordinator.search(&query), coordinator.search(&query), coordinator.search(&query));

        let outcomes = [first.expect("first"), second.expect("second"), third.expect("third")];
        assert_eq!(provider.calls(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.source == OfferSource::Provider).count(), 1);
        assert_eq!(outcomes.iter().filter(|o| o.source == OfferSource::Joined).count(), 2);
        assert!(outcomes.iter().all(|o| o.offers.len() == 1));
        assert_eq!(coordinator.in_flight(), 0);
    }

    #[tokio::test]
    async fn repeated_search_is_served_from_cache() {
        let provider = ScriptedProvider::new(Duration::ZERO, Vec::new());
        let coordinator = SearchCoordinator::new(provider.clone(), fast_settings());

        coordinator.search(&query("PAR")).await.expect("first search");
        let again = coordinator.search(&query("PAR")).await.expect("cached search");
        assert_eq!(again.source, OfferSource::Cache);
        assert_eq!(provider.calls(), 1);

        coordinator.search(&query("LON")).await.expect("different fingerprint");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn disabled_cache_still_calls_provider_again() {
        let provider = ScriptedProvider::new(Duration::ZERO, Vec::new());
        let settings = SearchSettings { cache_ttl: Duration::ZERO, ..fast_settings() };
        let coordinator = SearchCoordinator::new(provider.clone(), settings);

        coordinator.search(&query("PAR")).await.expect("first");
        coordinator.search(&query("PAR")).await.expect("second");
        assert_eq!(provider.calls(), 2);
    }

    #[tokio::test]
    async fn expired_results_for_other_queries_are_pruned() {
        let provider = ScriptedProvider::new(Duration::ZERO, Vec::new());
        let settings = SearchSettings { cache_ttl: Duration::from_millis(30), ..fast_settings() };
        let coordinator = SearchCoordinator::new(provider.clone(), settings);

        for destination in ["PAR", "LON", "MAD", "ROM"] {
            coordinator.search(&query(destination)).await.expect("search");
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        assert_eq!(provider.calls(), 4);
        assert_eq!(coordinator.cached_entries(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_retried_then_succeed() {
        let provider = ScriptedProvider::new(
            Duration::ZERO,
            vec![SearchError::Transient("429".into()), SearchError::Transient("503".into())],
        );
        let coordinator = SearchCoordinator::new(provider.clone(), fast_settings());

        let outcome = coordinator.search(&query("PAR")).await.expect("third attempt succeeds");
        assert_eq!(outcome.offers.len(), 1);
        assert_eq!(provider.calls(), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_a_transient_error_and_are_not_cached() {
        let provider = ScriptedProvider::new(
            Duration::ZERO,
            vec![
                SearchError::Transient("503".into()),
                SearchError::Transient("503".into()),
                SearchError::Transient("503".into()),
            ],
        );
        let coordinator = SearchCoordinator::new(provider.clone(), fast_settings());

        let error = coordinator.search(&query("PAR")).await.expect_err("exhausted");
        assert!(error.is_transient());
        assert!(error.detail().contains("gave up after 3 attempts"));
        assert_eq!(provider.calls(), 3);

        coordinator.search(&query("PAR")).await.expect("fresh attempt after failure");
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn validation_errors_fail_immediately() {
        let provider = ScriptedProvider::new(
            Duration::ZERO,
            vec![SearchError::Validation("unknown airport XXX".into())],
        );
        let coordinator = SearchCoordinator::new(provider.clone(), fast_settings());

        let error = coordinator.search(&query("PAR")).await.expect_err("rejected");
        assert_eq!(error, SearchError::Validation("unknown airport XXX".into()));
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn slow_provider_attempts_time_out_as_transient() {
        let provider = ScriptedProvider::new(Duration::from_millis(300), Vec::new());
        let settings = SearchSettings {
            attempt_timeout: Duration::from_millis(20),
            retry: RetryPolicy { max_retries: 1, base_delay_ms: 1, max_delay_ms: 1 },
            cache_ttl: Duration::from_secs(60),
        };
        let coordinator = SearchCoordinator::new(provider.clone(), settings);

        let error = coordinator.search(&query("PAR")).await.expect_err("timed out");
        assert!(error.is_transient());
        assert_eq!(provider.calls(), 2);
    }
}
