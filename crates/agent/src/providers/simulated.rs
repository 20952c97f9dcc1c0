use async_trait::async_trait;
use chrono::{Duration, NaiveTime};
use flightdesk_core::domain::search::{FlightOffer, SearchQuery};
use flightdesk_core::domain::slots::CabinClass;
use flightdesk_core::search::{FlightSearchProvider, SearchError};
use rust_decimal::Decimal;

const CARRIERS: [&str; 8] = ["AF", "BA", "DL", "UA", "QR", "EK", "AA", "LH"];

/// Offline search that derives offers from the query fingerprint, so identical
/// queries always produce identical offers.
#[derive(Clone, Debug)]
pub struct SimulatedFlightSearch {
    max_offers: usize,
}

impl SimulatedFlightSearch {
    pub fn new(max_offers: usize) -> Self {
        Self { max_offers: max_offers.max(1) }
    }
}

impl Default for SimulatedFlightSearch {
    fn default() -> Self {
        Self::new(5)
    }
}

fn fingerprint_bytes(query: &SearchQuery) -> Vec<u8> {
    let hex = query.fingerprint().0;
    hex.as_bytes()
        .chunks(2)
        .filter_map(|pair| std::str::from_utf8(pair).ok())
        .filter_map(|pair| u8::from_str_radix(pair, 16).ok())
        .collect()
}

fn cabin_multiplier(cabin: CabinClass) -> Decimal {
    match cabin {
        CabinClass::Economy => Decimal::ONE,
        CabinClass::PremiumEconomy => Decimal::new(16, 1),
        CabinClass::Business => Decimal::new(3, 0),
        CabinClass::First => Decimal::new(5, 0),
    }
}

fn checked_bags(cabin: CabinClass) -> u32 {
    match cabin {
        CabinClass::Economy => 0,
        CabinClass::PremiumEconomy => 1,
        CabinClass::Business | CabinClass::First => 2,
    }
}

fn build_offer(query: &SearchQuery, index: usize, seed: &[u8]) -> Option<FlightOffer> {
    let byte = |offset: usize| u32::from(seed[(index * 4 + offset) % seed.len()]);

    let flex = i64::from(query.flexibility_days);
    let day_offset = if flex == 0 { 0 } else { i64::from(byte(0)) % (2 * flex + 1) - flex };
    let date = query.depart_date + Duration::days(day_offset);
    let time = NaiveTime::from_hms_opt(6 + byte(1) % 16, (byte(2) % 4) * 15, 0)?;
    let departure_at = date.and_time(time);

    let stops = (byte(3) % 3) as u8;
    let duration_minutes = 95 + byte(1) * 2 + u32::from(stops) * 85;
    let arrival_at = departure_at + Duration::minutes(i64::from(duration_minutes));

    let carrier = CARRIERS[(byte(2) as usize + index) % CARRIERS.len()];
    let base_fare = Decimal::from(140 + byte(0) * 3 + byte(3)) - Decimal::from(u32::from(stops) * 35);
    let price = (base_fare * cabin_multiplier(query.cabin_class) * Decimal::from(query.passengers))
        .round_dp(2);

    Some(FlightOffer {
        offer_id: format!("SIM-{}-{}", query.fingerprint().short(), index + 1),
        carrier: carrier.to_string(),
        flight_number: format!("{carrier}{}", 100 + byte(0) * 3 + index as u32),
        origin: query.origin.as_str().to_string(),
        destination: query.destination.as_str().to_string(),
        departure_at,
        arrival_at,
        duration_minutes,
        stops,
        fare_class: query.cabin_class.label().to_string(),
        checked_bags: Some(checked_bags(query.cabin_class)),
        price,
        currency: query.currency.clone(),
    })
}

#[async_trait]
impl FlightSearchProvider for SimulatedFlightSearch {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
        if query.origin == query.destination {
            return Err(SearchError::Validation(
                "origin and destination are the same airport".to_string(),
            ));
        }

        let seed = fingerprint_bytes(query);
        if seed.is_empty() {
            return Ok(Vec::new());
        }
        let count = (3 + usize::from(seed[0] % 3)).min(self.max_offers);

        Ok((0..count)
            .filter_map(|index| build_offer(query, index, &seed))
            .filter(|offer| query.budget.map_or(true, |budget| offer.price <= budget))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use flightdesk_core::domain::search::SearchQuery;
    use flightdesk_core::domain::slots::{CabinClass, LocationCode};
    use flightdesk_core::search::FlightSearchProvider;
    use rust_decimal::Decimal;

    use super::SimulatedFlightSearch;

    fn query(budget: Option<Decimal>) -> SearchQuery {
        SearchQuery {
            origin: LocationCode::parse("BOS").expect("code"),
            destination: LocationCode::parse("PAR").expect("code"),
            depart_date: NaiveDate::from_ymd_opt(2026, 6, 10).expect("date"),
            return_date: None,
            passengers: 1,
            cabin_class: CabinClass::Economy,
            budget,
            flexibility_days: 0,
            currency: "USD".to_string(),
        }
    }

    #[tokio::test]
    async fn identical_queries_yield_identical_offers() {
        let provider = SimulatedFlightSearch::new(5);
        let first = provider.search(&query(None)).await.expect("offers");
        let second = provider.search(&query(None)).await.expect("offers");

        assert!(!first.is_empty());
        assert!(first.len() <= 5);
        assert_eq!(first, second);
        assert!(first.iter().all(|offer| offer.origin == "BOS" && offer.destination == "PAR"));
    }

    #[tokio::test]
    async fn honours_offer_cap_and_budget() {
        let capped = SimulatedFlightSearch::new(2).search(&query(None)).await.expect("offers");
        assert!(capped.len() <= 2);

        let budget = Decimal::new(300, 0);
        let within = SimulatedFlightSearch::new(5).search(&query(Some(budget))).await.expect("offers");
        assert!(within.iter().all(|offer| offer.price <= budget));
    }
}
