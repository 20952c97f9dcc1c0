//! Amadeus Self-Service flight offers search and airport/city lookup.

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDateTime;
use flightdesk_core::config::{AmadeusConfig, SearchConfig};
use flightdesk_core::domain::search::{FlightOffer, SearchQuery};
use flightdesk_core::domain::slots::LocationCode;
use flightdesk_core::search::{FlightSearchProvider, LocationResolver, SearchError};
use reqwest::StatusCode;
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

const TOKEN_PATH: &str = "/v1/security/oauth2/token";
const OFFERS_PATH: &str = "/v2/shopping/flight-offers";
const LOCATIONS_PATH: &str = "/v1/reference-data/locations";
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

struct AccessToken {
    value: SecretString,
    expires_at: Instant,
}

pub struct AmadeusFlightSearch {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    max_offers: usize,
    token: Mutex<Option<AccessToken>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct OffersResponse {
    #[serde(default)]
    data: Vec<OfferData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferData {
    id: String,
    itineraries: Vec<Itinerary>,
    price: Price,
    #[serde(default)]
    traveler_pricings: Vec<TravelerPricing>,
}

#[derive(Debug, Deserialize)]
struct Itinerary {
    #[serde(default)]
    duration: Option<String>,
    segments: Vec<Segment>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Segment {
    departure: Endpoint,
    arrival: Endpoint,
    carrier_code: String,
    number: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Endpoint {
    iata_code: String,
    at: NaiveDateTime,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    currency: String,
    grand_total: Decimal,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TravelerPricing {
    #[serde(default)]
    fare_details_by_segment: Vec<FareDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FareDetail {
    #[serde(default)]
    cabin: Option<String>,
    #[serde(default)]
    included_checked_bags: Option<CheckedBags>,
}

#[derive(Debug, Deserialize)]
struct CheckedBags {
    #[serde(default)]
    quantity: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct LocationsResponse {
    #[serde(default)]
    data: Vec<LocationData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LocationData {
    #[serde(default)]
    iata_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<ErrorEntry>,
}

#[derive(Debug, Deserialize)]
struct ErrorEntry {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

impl AmadeusFlightSearch {
    pub fn from_config(amadeus: &AmadeusConfig, search: &SearchConfig) -> Result<Self> {
        let client_id = amadeus
            .client_id
            .clone()
            .ok_or_else(|| anyhow!("amadeus.client_id is required"))?;
        let client_secret = amadeus
            .client_secret
            .clone()
            .ok_or_else(|| anyhow!("amadeus.client_secret is required"))?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(search.timeout_secs))
            .build()
            .context("failed to build amadeus http client")?;

        Ok(Self {
            client,
            base_url: amadeus.base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
            max_offers: search.max_offers,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<SecretString, SearchError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.value.clone());
            }
        }

        let response = self
            .client
            .post(format!("{}{TOKEN_PATH}", self.base_url))
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .send()
            .await
            .map_err(|error| SearchError::Transient(format!("token request failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Transient(format!(
                "token request returned HTTP {status}: {}",
                error_detail(&body)
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|error| SearchError::Transient(format!("unreadable token response: {error}")))?;
        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        let value = SecretString::from(token.access_token);
        *cached = Some(AccessToken { value: value.clone(), expires_at: Instant::now() + lifetime });
        debug!(event_name = "search.amadeus.token_refreshed", "amadeus access token refreshed");
        Ok(value)
    }

    fn query_params(&self, query: &SearchQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("originLocationCode", query.origin.as_str().to_string()),
            ("destinationLocationCode", query.destination.as_str().to_string()),
            ("departureDate", query.depart_date.to_string()),
            ("adults", query.passengers.to_string()),
            ("travelClass", query.cabin_class.provider_code().to_string()),
            ("currencyCode", query.currency.clone()),
            ("max", self.max_offers.to_string()),
        ];
        if let Some(return_date) = query.return_date {
            params.push(("returnDate", return_date.to_string()));
        }
        if let Some(budget) = query.budget {
            params.push(("maxPrice", max_price_param(budget)));
        }
        params
    }
}

#[async_trait]
impl FlightSearchProvider for AmadeusFlightSearch {
    fn name(&self) -> &'static str {
        "amadeus"
    }

    async fn search(&self, query: &SearchQuery) -> Result<Vec<FlightOffer>, SearchError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}{OFFERS_PATH}", self.base_url))
            .bearer_auth(token.expose_secret())
            .query(&self.query_params(query))
            .send()
            .await
            .map_err(|error| SearchError::Transient(format!("offer search failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                *self.token.lock().await = None;
            }
            let error = classify_status(status, error_detail(&body));
            warn!(
                event_name = "search.amadeus.http_error",
                status = status.as_u16(),
                error = %error,
                "amadeus search returned an error"
            );
            return Err(error);
        }

        let parsed: OffersResponse = response
            .json()
            .await
            .map_err(|error| SearchError::Transient(format!("unreadable offer response: {error}")))?;

        Ok(parsed.data.into_iter().filter_map(normalize_offer).take(self.max_offers).collect())
    }
}

#[async_trait]
impl LocationResolver for AmadeusFlightSearch {
    fn name(&self) -> &'static str {
        "amadeus"
    }

    async fn resolve(&self, place: &str) -> Result<Option<LocationCode>, SearchError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .get(format!("{}{LOCATIONS_PATH}", self.base_url))
            .bearer_auth(token.expose_secret())
            .query(&[("subType", "CITY,AIRPORT"), ("keyword", place.trim()), ("page[limit]", "5")])
            .send()
            .await
            .map_err(|error| SearchError::Transient(format!("location lookup failed: {error}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status == StatusCode::UNAUTHORIZED {
                *self.token.lock().await = None;
            }
            return Err(classify_status(status, error_detail(&body)));
        }

        let parsed: LocationsResponse = response
            .json()
            .await
            .map_err(|error| SearchError::Transient(format!("unreadable location response: {error}")))?;
        let code = first_location_code(parsed);
        debug!(
            event_name = "search.amadeus.location_lookup",
            place = %place,
            code = code.as_ref().map(|code| code.as_str()).unwrap_or("none"),
            "amadeus location lookup finished"
        );
        Ok(code)
    }
}

/// Amadeus only takes whole amounts; rounding up keeps offers priced exactly at the
/// budget in the results.
fn max_price_param(budget: Decimal) -> String {
    budget.ceil().normalize().to_string()
}

fn first_location_code(response: LocationsResponse) -> Option<LocationCode> {
    response
        .data
        .into_iter()
        .filter_map(|location| location.iata_code)
        .find_map(|code| LocationCode::parse(&code).ok())
}

fn classify_status(status: StatusCode, detail: String) -> SearchError {
    match status {
        StatusCode::BAD_REQUEST => SearchError::Validation(detail),
        StatusCode::UNAUTHORIZED
        | StatusCode::REQUEST_TIMEOUT
        | StatusCode::TOO_MANY_REQUESTS => SearchError::Transient(format!("HTTP {status}: {detail}")),
        status if status.is_server_error() => {
            SearchError::Transient(format!("HTTP {status}: {detail}"))
        }
        _ => SearchError::Validation(format!("HTTP {status}: {detail}")),
    }
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .and_then(|parsed| parsed.errors.into_iter().next())
        .and_then(|entry| entry.detail.or(entry.title))
        .unwrap_or_else(|| body.chars().take(200).collect())
}

fn normalize_offer(offer: OfferData) -> Option<FlightOffer> {
    let itinerary = offer.itineraries.first()?;
    let first = itinerary.segments.first()?;
    let last = itinerary.segments.last()?;

    let duration_minutes = itinerary
        .duration
        .as_deref()
        .and_then(parse_iso_duration)
        .or_else(|| {
            let minutes = last.arrival.at.signed_duration_since(first.departure.at).num_minutes();
            u32::try_from(minutes).ok()
        })?;

    let first_fare = offer
        .traveler_pricings
        .first()
        .and_then(|pricing| pricing.fare_details_by_segment.first());
    let fare_class = first_fare
        .and_then(|detail| detail.cabin.clone())
        .unwrap_or_else(|| "ECONOMY".to_string())
        .to_ascii_lowercase();
    let checked_bags = first_fare
        .and_then(|detail| detail.included_checked_bags.as_ref())
        .and_then(|bags| bags.quantity);

    Some(FlightOffer {
        offer_id: offer.id,
        carrier: first.carrier_code.clone(),
        flight_number: format!("{}{}", first.carrier_code, first.number),
        origin: first.departure.iata_code.clone(),
        destination: last.arrival.iata_code.clone(),
        departure_at: first.departure.at,
        arrival_at: last.arrival.at,
        duration_minutes,
        stops: u8::try_from(itinerary.segments.len().saturating_sub(1)).unwrap_or(u8::MAX),
        fare_class,
        checked_bags,
        price: offer.price.grand_total,
        currency: offer.price.currency,
    })
}

/// Minutes in an ISO-8601 duration such as `PT7H5M` or `P1DT2H`.
pub fn parse_iso_duration(raw: &str) -> Option<u32> {
    let rest = raw.strip_prefix('P')?;
    let mut minutes = 0_u32;
    let mut number = String::new();
    let mut in_time = false;

    for ch in rest.chars() {
        match ch {
            'T' => in_time = true,
            digit if digit.is_ascii_digit() => number.push(digit),
            unit => {
                let value: u32 = number.parse().ok()?;
                number.clear();
                minutes += match (unit, in_time) {
                    ('D', false) => value * 24 * 60,
                    ('H', true) => value * 60,
                    ('M', true) => value,
                    ('S', true) => 0,
                    _ => return None,
                };
            }
        }
    }

    number.is_empty().then_some(minutes)
}

#[cfg(test)]
mod tests {
    use reqwest::StatusCode;
    use serde_json::json;

    use flightdesk_core::config::AppConfig;
    use flightdesk_core::domain::search::SearchQuery;
    use flightdesk_core::domain::slots::{LocationCode, SlotSet};
    use flightdesk_core::search::SearchError;
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use super::{
        classify_status, first_location_code, max_price_param, normalize_offer, parse_iso_duration,
        AmadeusFlightSearch, LocationsResponse, OfferData,
    };

    #[test]
    fn parses_iso_durations() {
        assert_eq!(parse_iso_duration("PT4H5M"), Some(245));
        assert_eq!(parse_iso_duration("PT45M"), Some(45));
        assert_eq!(parse_iso_duration("P1DT2H"), Some(26 * 60));
        assert_eq!(parse_iso_duration("4h"), None);
        assert_eq!(parse_iso_duration("PT4"), None);
    }

    #[test]
    fn bad_request_is_a_validation_error() {
        assert!(matches!(
            classify_status(StatusCode::BAD_REQUEST, "unknown airport".to_string()),
            SearchError::Validation(detail) if detail == "unknown airport"
        ));
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, String::new()).is_transient());
    }

    #[test]
    fn normalises_multi_segment_offer() {
        let offer: OfferData = serde_json::from_value(json!({
            "id": "7",
            "itineraries": [{
                "duration": "PT10H20M",
                "segments": [
                    {
                        "departure": {"iataCode": "BOS", "at": "2026-06-10T08:00:00"},
                        "arrival": {"iataCode": "DOH", "at": "2026-06-10T14:00:00"},
                        "carrierCode": "QR",
                        "number": "744"
                    },
                    {
                        "departure": {"iataCode": "DOH", "at": "2026-06-10T15:30:00"},
                        "arrival": {"iataCode": "CDG", "at": "2026-06-10T18:20:00"},
                        "carrierCode": "QR",
                        "number": "39"
                    }
                ]
            }],
            "price": {"currency": "USD", "grandTotal": "812.40"},
            "travelerPricings": [{"fareDetailsBySegment": [
                {"cabin": "BUSINESS", "includedCheckedBags": {"quantity": 2}}
            ]}]
        }))
        .expect("fixture");

        let normalized = normalize_offer(offer).expect("offer");
        assert_eq!(normalized.flight_number, "QR744");
        assert_eq!(normalized.origin, "BOS");
        assert_eq!(normalized.destination, "CDG");
        assert_eq!(normalized.stops, 1);
        assert_eq!(normalized.duration_minutes, 620);
        assert_eq!(normalized.fare_class, "business");
        assert_eq!(normalized.checked_bags, Some(2));
        assert_eq!(normalized.price.to_string(), "812.40");
    }

    #[test]
    fn offers_without_baggage_details_leave_it_unknown() {
        let offer: OfferData = serde_json::from_value(json!({
            "id": "8",
            "itineraries": [{
                "segments": [{
                    "departure": {"iataCode": "BOS", "at": "2026-06-10T08:00:00"},
                    "arrival": {"iataCode": "JFK", "at": "2026-06-10T09:15:00"},
                    "carrierCode": "B6",
                    "number": "118"
                }]
            }],
            "price": {"currency": "USD", "grandTotal": "99.00"}
        }))
        .expect("fixture");

        let normalized = normalize_offer(offer).expect("offer");
        assert_eq!(normalized.checked_bags, None);
        assert_eq!(normalized.duration_minutes, 75);
        assert_eq!(normalized.fare_class, "economy");
    }

    #[test]
    fn budget_cap_rounds_up_to_whole_units() {
        assert_eq!(max_price_param(Decimal::new(9950, 2)), "100");
        assert_eq!(max_price_param(Decimal::new(5, 1)), "1");
        assert_eq!(max_price_param(Decimal::new(500, 0)), "500");
        assert_eq!(max_price_param(Decimal::new(50000, 2)), "500");
    }

    #[test]
    fn fractional_budget_keeps_offers_at_the_cap() {
        let mut config = AppConfig::default();
        config.amadeus.client_id = Some("client".to_string());
        config.amadeus.client_secret = Some(SecretString::from("secret".to_string()));
        let provider =
            AmadeusFlightSearch::from_config(&config.amadeus, &config.search).expect("provider");
        let slots = SlotSet {
            origin: Some(LocationCode::parse("BOS").expect("code")),
            destination: Some(LocationCode::parse("PAR").expect("code")),
            depart_date: chrono::NaiveDate::from_ymd_opt(2026, 6, 10),
            budget: Some(Decimal::new(79999, 2)),
            ..SlotSet::default()
        };
        let query = SearchQuery::from_slots(&slots, "USD").expect("complete slots");

        let params = provider.query_params(&query);
        let max_price = params.iter().find(|(key, _)| *key == "maxPrice").map(|(_, value)| value.as_str());
        assert_eq!(max_price, Some("800"));
    }

    #[test]
    fn location_lookup_takes_the_first_usable_code() {
        let response: LocationsResponse = serde_json::from_value(json!({
            "data": [
                {"subType": "CITY", "name": "PORTO"},
                {"subType": "CITY", "name": "PORTO", "iataCode": "OPO"},
                {"subType": "AIRPORT", "name": "FRANCISCO SA CARNEIRO", "iataCode": "OPO"}
            ]
        }))
        .expect("fixture");
        assert_eq!(first_location_code(response).map(|code| code.as_str().to_string()), Some("OPO".to_string()));

        let empty: LocationsResponse = serde_json::from_value(json!({"data": []})).expect("fixture");
        assert!(first_location_code(empty).is_none());
    }
}
