//! Offline, heuristic intent extraction.
//!
//! [`RuleBasedExtractor`] reads an utterance the way a travel agent skims a note:
//! it looks for city names and airport codes around `from`/`to`, month-name and ISO
//! dates, traveller counts, budget caps, cabin words, flexible-date phrases, and the
//! handful of verbs that drive the booking flow. It never needs the network, which
//! makes it the default extractor and the fallback when no LLM is configured.

use std::collections::BTreeMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use flightdesk_core::domain::booking::BookingTarget;
use flightdesk_core::domain::search::{OfferRef, SortKey};
use flightdesk_core::domain::session::{Actor, Turn};
use flightdesk_core::domain::slots::SlotName;
use rust_decimal::Decimal;
use serde_json::{json, Value};

use crate::extractor::{Extraction, ExtractionRequest, ExtractorError, IntentExtractor, IntentTag};

const CITY_CODES: &[(&str, &str)] = &[
    ("amsterdam", "AMS"),
    ("atlanta", "ATL"),
    ("barcelona", "BCN"),
    ("berlin", "BER"),
    ("boston", "BOS"),
    ("chicago", "CHI"),
    ("dallas", "DFW"),
    ("delhi", "DEL"),
    ("denver", "DEN"),
    ("doha", "DOH"),
    ("dubai", "DXB"),
    ("dublin", "DUB"),
    ("frankfurt", "FRA"),
    ("hong kong", "HKG"),
    ("istanbul", "IST"),
    ("lisbon", "LIS"),
    ("london", "LON"),
    ("los angeles", "LAX"),
    ("madrid", "MAD"),
    ("miami", "MIA"),
    ("mumbai", "BOM"),
    ("new york", "NYC"),
    ("nyc", "NYC"),
    ("paris", "PAR"),
    ("rome", "ROM"),
    ("san francisco", "SFO"),
    ("seattle", "SEA"),
    ("singapore", "SIN"),
    ("sydney", "SYD"),
    ("tokyo", "TYO"),
    ("toronto", "YTO"),
    ("washington", "WAS"),
];

const MONTHS: &[(&str, u32)] = &[
    ("january", 1),
    ("jan", 1),
    ("february", 2),
    ("feb", 2),
    ("march", 3),
    ("mar", 3),
    ("april", 4),
    ("apr", 4),
    ("may", 5),
    ("june", 6),
    ("jun", 6),
    ("july", 7),
    ("jul", 7),
    ("august", 8),
    ("aug", 8),
    ("september", 9),
    ("sept", 9),
    ("sep", 9),
    ("october", 10),
    ("oct", 10),
    ("november", 11),
    ("nov", 11),
    ("december", 12),
    ("dec", 12),
];

const COUNT_WORDS: &[(&str, i64)] = &[
    ("one", 1),
    ("two", 2),
    ("three", 3),
    ("four", 4),
    ("five", 5),
    ("six", 6),
    ("seven", 7),
    ("eight", 8),
    ("nine", 9),
];

const ORDINALS: &[(&str, usize)] = &[
    ("first", 1),
    ("1st", 1),
    ("second", 2),
    ("2nd", 2),
    ("third", 3),
    ("3rd", 3),
    ("fourth", 4),
    ("4th", 4),
    ("fifth", 5),
    ("5th", 5),
];

const DEFAULT_FLEXIBILITY_DAYS: i64 = 3;
const MAX_PLACE_WORDS: usize = 3;

#[derive(Clone, Debug, Default)]
pub struct RuleBasedExtractor;

impl RuleBasedExtractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract_now(&self, request: &ExtractionRequest<'_>) -> Extraction {
        let normalized = normalize_text(request.utterance);
        let tokens = tokenize(request.utterance);

        let mut slots = BTreeMap::new();
        let (origin, destination) = extract_route(&tokens);
        if let Some(origin) = origin {
            slots.insert(SlotName::Origin.as_str().to_string(), json!(origin));
        }
        if let Some(destination) = destination {
            slots.insert(SlotName::Destination.as_str().to_string(), json!(destination));
        }

        let (depart_date, return_date) = extract_dates(&tokens, request.today);
        if let Some(date) = depart_date {
            slots.insert(SlotName::DepartDate.as_str().to_string(), json!(date.to_string()));
        }
        if let Some(date) = return_date {
            slots.insert(SlotName::ReturnDate.as_str().to_string(), json!(date.to_string()));
        }
        if let Some(passengers) = extract_passengers(&normalized, &tokens) {
            slots.insert(SlotName::Passengers.as_str().to_string(), json!(passengers));
        }
        if let Some(budget) = extract_budget(&tokens) {
            slots.insert(SlotName::Budget.as_str().to_string(), json!(budget.to_string()));
        }
        if let Some(cabin) = extract_cabin(&normalized) {
            slots.insert(SlotName::CabinClass.as_str().to_string(), json!(cabin));
        }
        if let Some(days) = extract_flexibility(&normalized, &tokens) {
            slots.insert(SlotName::Flexibility.as_str().to_string(), json!(days));
        }

        let intent = detect_intent(&normalized, &tokens, request, !slots.is_empty());
        let confidence = confidence_score(&intent, &slots, &tokens, request);

        Extraction { intent, slots, confidence }
    }
}

#[async_trait]
impl IntentExtractor for RuleBasedExtractor {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractorError> {
        Ok(self.extract_now(request))
    }
}

#[derive(Clone, Debug)]
struct Token {
    raw: String,
    lower: String,
}

fn normalize_text(text: &str) -> String {
    text.to_ascii_lowercase()
}

fn tokenize(text: &str) -> Vec<Token> {
    text.split_whitespace()
        .map(|word| {
            word.trim_matches(|c: char| {
                matches!(c, ',' | '.' | '!' | '?' | ';' | ':' | '"' | '(' | ')')
            })
        })
        .filter(|word| !word.is_empty())
        .map(|word| Token { raw: word.to_string(), lower: word.to_ascii_lowercase() })
        .collect()
}

fn has_word(tokens: &[Token], words: &[&str]) -> bool {
    tokens.iter().any(|token| words.contains(&token.lower.as_str()))
}

fn has_phrase(normalized: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| normalized.contains(phrase))
}

/// Code for a lower-cased city name from the built-in table.
pub(crate) fn city_code(name: &str) -> Option<&'static str> {
    CITY_CODES.iter().find(|(city, _)| *city == name).map(|(_, code)| *code)
}

fn known_code(lower: &str) -> Option<&'static str> {
    CITY_CODES.iter().map(|(_, code)| *code).find(|code| code.eq_ignore_ascii_case(lower))
}

/// Location starting at `index`, with the number of tokens it spans.
fn location_at(tokens: &[Token], index: usize) -> Option<(String, usize)> {
    if let (Some(first), Some(second)) = (tokens.get(index), tokens.get(index + 1)) {
        if let Some(code) = city_code(&format!("{} {}", first.lower, second.lower)) {
            return Some((code.to_string(), 2));
        }
    }

    let token = tokens.get(index)?;
    if let Some(code) = city_code(&token.lower).or_else(|| known_code(&token.lower)) {
        return Some((code.to_string(), 1));
    }
    let is_code = token.raw.len() == 3 && token.raw.chars().all(|c| c.is_ascii_uppercase());
    is_code.then(|| (token.raw.clone(), 1))
}

/// Capitalised words at `index` that the table does not know, kept verbatim so the
/// location resolver can look them up.
fn place_name_at(tokens: &[Token], index: usize) -> Option<String> {
    let words: Vec<&str> = tokens
        .get(index..)
        .unwrap_or_default()
        .iter()
        .take(MAX_PLACE_WORDS)
        .take_while(|token| is_place_word(token))
        .map(|token| token.raw.as_str())
        .collect();
    (!words.is_empty()).then(|| words.join(" "))
}

fn is_place_word(token: &Token) -> bool {
    let capitalised = token.raw.chars().next().is_some_and(|c| c.is_ascii_uppercase());
    capitalised
        && token.raw.len() >= 3
        && token.raw.chars().all(|c| c.is_alphabetic() || c == '-' || c == '\'')
        && month_number(&token.lower).is_none()
}

fn location_or_place_at(tokens: &[Token], index: usize) -> Option<String> {
    location_at(tokens, index).map(|(code, _)| code).or_else(|| place_name_at(tokens, index))
}

fn location_before(tokens: &[Token], index: usize) -> Option<String> {
    if index >= 2 {
        if let Some((code, 2)) = location_at(tokens, index - 2) {
            return Some(code);
        }
    }
    if index >= 1 {
        return location_at(tokens, index - 1).filter(|(_, len)| *len == 1).map(|(code, _)| code);
    }
    None
}

fn extract_route(tokens: &[Token]) -> (Option<String>, Option<String>) {
    let mut origin = None;
    let mut destination = None;

    for (index, token) in tokens.iter().enumerate() {
        match token.lower.as_str() {
            "from" if origin.is_none() => {
                origin = location_or_place_at(tokens, index + 1);
            }
            "to" | "->" | "into" if destination.is_none() => {
                if let Some(place) = location_or_place_at(tokens, index + 1) {
                    destination = Some(place);
                    if origin.is_none() {
                        origin = location_before(tokens, index);
                    }
                }
            }
            _ => {}
        }
    }

    (origin, destination)
}

fn month_number(lower: &str) -> Option<u32> {
    MONTHS.iter().find(|(name, _)| *name == lower).map(|(_, month)| *month)
}

fn day_number(lower: &str) -> Option<u32> {
    let digits = lower
        .strip_suffix("st")
        .or_else(|| lower.strip_suffix("nd"))
        .or_else(|| lower.strip_suffix("rd"))
        .or_else(|| lower.strip_suffix("th"))
        .unwrap_or(lower);
    digits.parse::<u32>().ok().filter(|day| (1..=31).contains(day))
}

/// First date on or after `today` with the given month and day.
fn next_occurrence(today: NaiveDate, month: u32, day: u32) -> Option<NaiveDate> {
    let this_year = NaiveDate::from_ymd_opt(today.year(), month, day);
    match this_year {
        Some(date) if date >= today => Some(date),
        _ => NaiveDate::from_ymd_opt(today.year() + 1, month, day),
    }
}

fn extract_dates(tokens: &[Token], today: NaiveDate) -> (Option<NaiveDate>, Option<NaiveDate>) {
    let mut found = Vec::new();
    let mut index = 0;

    while index < tokens.len() {
        let lower = tokens[index].lower.as_str();

        if let Ok(date) = NaiveDate::parse_from_str(lower, "%Y-%m-%d") {
            found.push((index, date));
        } else if lower == "today" {
            found.push((index, today));
        } else if lower == "tomorrow" {
            found.push((index, today + Duration::days(1)));
        } else if let Some(month) = month_number(lower) {
            let day_after = tokens.get(index + 1).and_then(|token| day_number(&token.lower));
            let day_before = index
                .checked_sub(1)
                .and_then(|prev| tokens.get(prev))
                .and_then(|token| day_number(&token.lower))
                .or_else(|| {
                    let of = index.checked_sub(1).and_then(|prev| tokens.get(prev))?;
                    if of.lower != "of" {
                        return None;
                    }
                    let day = index.checked_sub(2).and_then(|prev| tokens.get(prev))?;
                    day_number(&day.lower)
                });

            if let Some(date) =
                day_after.or(day_before).and_then(|day| next_occurrence(today, month, day))
            {
                found.push((index, date));
                if day_after.is_some() {
                    index += 1;
                }
            }
        }

        index += 1;
    }

    let mut depart = None;
    let mut ret = None;
    for (index, date) in found {
        let window_start = index.saturating_sub(3);
        let return_context = has_word(
            &tokens[window_start..index],
            &["return", "returning", "back", "until", "coming"],
        );
        if return_context || depart.is_some() {
            ret = ret.or(Some(date));
        } else {
            depart = Some(date);
        }
    }

    (depart, ret)
}

fn count_value(lower: &str) -> Option<i64> {
    COUNT_WORDS
        .iter()
        .find(|(word, _)| *word == lower)
        .map(|(_, count)| *count)
        .or_else(|| lower.parse::<i64>().ok())
}

fn extract_passengers(normalized: &str, tokens: &[Token]) -> Option<i64> {
    const UNITS: &[&str] = &[
        "passenger",
        "passengers",
        "people",
        "person",
        "persons",
        "adult",
        "adults",
        "traveler",
        "travelers",
        "traveller",
        "travellers",
        "ticket",
        "tickets",
        "pax",
    ];

    for window in tokens.windows(2) {
        if let [count, unit] = window {
            if UNITS.contains(&unit.lower.as_str()) {
                if let Some(value) = count_value(&count.lower) {
                    return Some(value);
                }
            }
        }
    }

    if has_phrase(normalized, &["just me", "only me", "myself", "solo", "by myself"]) {
        return Some(1);
    }
    None
}

fn parse_money(token: &str) -> Option<Decimal> {
    let trimmed = token.trim_start_matches('$').replace(',', "");
    if trimmed.is_empty() {
        return None;
    }
    let (number, multiplier) = match trimmed.strip_suffix('k') {
        Some(prefix) => (prefix.to_string(), Decimal::from(1_000)),
        None => (trimmed, Decimal::ONE),
    };
    let amount = Decimal::from_str(&number).ok()? * multiplier;
    (amount > Decimal::ZERO).then_some(amount.normalize())
}

fn extract_budget(tokens: &[Token]) -> Option<Decimal> {
    const CONTEXT: &[&str] =
        &["under", "below", "budget", "max", "maximum", "than", "cap", "within", "upto"];

    for (index, token) in tokens.iter().enumerate() {
        let in_context =
            index > 0 && CONTEXT.contains(&tokens[index - 1].lower.as_str());
        if token.lower.starts_with('$') || in_context {
            if let Some(amount) = parse_money(&token.lower) {
                return Some(amount);
            }
        }
    }
    None
}

fn extract_cabin(normalized: &str) -> Option<&'static str> {
    if normalized.contains("premium economy") {
        Some("premium_economy")
    } else if normalized.contains("business") {
        Some("business")
    } else if normalized.contains("first class") || normalized.contains("first-class") {
        Some("first")
    } else if normalized.contains("economy") || normalized.contains("coach") {
        Some("economy")
    } else {
        None
    }
}

fn extract_flexibility(normalized: &str, tokens: &[Token]) -> Option<i64> {
    if has_phrase(normalized, &["exact dates", "fixed dates", "not flexible"]) {
        return Some(0);
    }
    if !has_phrase(normalized, &["flexible", "give or take", "plus or minus", "+/-", "±"]) {
        return None;
    }

    let explicit = tokens.windows(2).find_map(|window| match window {
        [count, unit] if matches!(unit.lower.as_str(), "day" | "days") => count_value(&count.lower),
        _ => None,
    });
    Some(explicit.unwrap_or(DEFAULT_FLEXIBILITY_DAYS))
}

fn extract_position(tokens: &[Token]) -> Option<usize> {
    if let Some(position) = tokens
        .iter()
        .find_map(|token| ORDINALS.iter().find(|(word, _)| *word == token.lower).map(|(_, p)| *p))
    {
        return Some(position);
    }

    for window in tokens.windows(2) {
        if let [marker, number] = window {
            if matches!(marker.lower.as_str(), "option" | "number" | "offer" | "flight" | "no") {
                if let Some(position) = count_value(&number.lower).and_then(|n| usize::try_from(n).ok()) {
                    return Some(position);
                }
            }
        }
    }

    tokens.iter().find_map(|token| token.lower.strip_prefix('#')?.parse::<usize>().ok())
}

/// Result set label of the offer list the agent showed most recently.
fn latest_presented_label(window: &[Turn]) -> Option<&str> {
    window
        .iter()
        .rev()
        .filter(|turn| turn.actor == Actor::Agent)
        .find_map(Turn::presented_result_set)
}

fn extract_booking_target(tokens: &[Token], window: &[Turn]) -> BookingTarget {
    let explicit = tokens.iter().find_map(|token| OfferRef::from_str(&token.lower).ok());
    if let Some(offer_ref) = explicit {
        return BookingTarget::reference(offer_ref);
    }

    let Some(position) = extract_position(tokens).filter(|position| *position > 0) else {
        return BookingTarget::default();
    };
    match latest_presented_label(window) {
        Some(label) => BookingTarget {
            offer_ref: Some(OfferRef { result_set: label.to_string(), position }),
            position: Some(position),
        },
        None => BookingTarget::position(position),
    }
}

fn detect_intent(
    normalized: &str,
    tokens: &[Token],
    request: &ExtractionRequest<'_>,
    has_trip_details: bool,
) -> IntentTag {
    if has_word(tokens, &["bye", "goodbye", "quit", "exit"])
        || has_phrase(normalized, &["that's all", "thats all", "end the conversation", "i'm done"])
    {
        return IntentTag::End;
    }

    if has_phrase(
        normalized,
        &["new search", "start over", "another trip", "different trip", "new trip", "forget that", "instead"],
    ) {
        return IntentTag::NewSearch;
    }

    let wants_booking = has_word(tokens, &["book", "reserve", "take", "choose", "select", "pick"])
        || has_phrase(normalized, &["go with"]);
    let target = if wants_booking {
        extract_booking_target(tokens, request.turn_window)
    } else {
        BookingTarget::default()
    };
    if wants_booking && !target.is_empty() {
        return IntentTag::Book { target };
    }

    if !has_trip_details
        && has_word(tokens, &["sort", "order", "cheapest", "fastest", "shortest", "quickest"])
    {
        let by_duration =
            has_word(tokens, &["fastest", "shortest", "quickest", "duration", "time", "length"]);
        let key = if by_duration { SortKey::Duration } else { SortKey::Price };
        return IntentTag::Sort { key };
    }

    if !has_trip_details {
        if has_word(tokens, &["no", "nope", "nah", "cancel"])
            || has_phrase(normalized, &["not that", "don't", "changed my mind"])
        {
            return IntentTag::Decline;
        }
        if has_word(tokens, &["yes", "yeah", "yep", "confirm", "sure", "ok", "okay", "proceed"])
            || has_phrase(normalized, &["go ahead", "do it"])
        {
            return IntentTag::Confirm;
        }
    }

    if has_trip_details {
        return if request.slots.is_search_ready() { IntentTag::Refine } else { IntentTag::Search };
    }

    if wants_booking {
        return IntentTag::Book { target };
    }

    IntentTag::Clarify
}

fn confidence_score(
    intent: &IntentTag,
    slots: &BTreeMap<String, Value>,
    tokens: &[Token],
    request: &ExtractionRequest<'_>,
) -> u8 {
    let mut score = 10u8;

    score = score.saturating_add(match intent {
        IntentTag::Book { target } if !target.is_empty() => 70,
        IntentTag::Book { .. } => 20,
        IntentTag::Confirm | IntentTag::Decline | IntentTag::Sort { .. } | IntentTag::End => 70,
        IntentTag::NewSearch => 40,
        IntentTag::Search | IntentTag::Refine | IntentTag::Clarify => 0,
    });

    for (slot, weight) in [
        (SlotName::Origin, 25u8),
        (SlotName::Destination, 25),
        (SlotName::DepartDate, 20),
        (SlotName::ReturnDate, 10),
        (SlotName::Passengers, 10),
        (SlotName::Budget, 10),
        (SlotName::CabinClass, 10),
        (SlotName::Flexibility, 5),
    ] {
        if slots.contains_key(slot.as_str()) {
            score = score.saturating_add(weight);
        }
    }

    if has_word(tokens, &["flight", "flights", "fly", "flying", "trip", "travel", "ticket", "tickets"]) {
        score = score.saturating_add(10);
    }

    let missing = request.slots.missing_required();
    let answers_question = missing.iter().any(|slot| slots.contains_key(slot.as_str()));
    let refines_complete_request = missing.is_empty() && !slots.is_empty();
    if answers_question || refines_complete_request {
        score = score.saturating_add(45);
    }

    score.min(100)
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use flightdesk_core::domain::booking::BookingTarget;
    use flightdesk_core::domain::search::{OfferRef, SortKey};
    use flightdesk_core::domain::session::{Turn, TurnPayload};
    use flightdesk_core::domain::slots::{LocationCode, SlotSet};
    use serde_json::json;

    use super::RuleBasedExtractor;
    use crate::extractor::{Extraction, ExtractionRequest, IntentTag};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 5, 1).expect("valid date")
    }

    fn extract(slots: &SlotSet, window: &[Turn], text: &str) -> Extraction {
        RuleBasedExtractor::new().extract_now(&ExtractionRequest {
            slots,
            utterance: text,
            turn_window: window,
            today: today(),
        })
    }

    fn route_slots() -> SlotSet {
        SlotSet {
            origin: Some(LocationCode::parse("BOS").expect("code")),
            destination: Some(LocationCode::parse("PAR").expect("code")),
            ..SlotSet::default()
        }
    }

    #[test]
    fn route_request_sets_origin_and_destination() {
        let extraction = extract(&SlotSet::default(), &[], "Flights from Boston to Paris");

        assert_eq!(extraction.intent, IntentTag::Search);
        assert_eq!(extraction.slots.get("origin"), Some(&json!("BOS")));
        assert_eq!(extraction.slots.get("destination"), Some(&json!("PAR")));
        assert!(!extraction.slots.contains_key("depart_date"));
        assert!(extraction.confidence >= 60);
    }

    #[test]
    fn bare_date_answers_the_pending_question_with_confidence() {
        let extraction = extract(&route_slots(), &[], "June 10th");

        assert_eq!(extraction.intent, IntentTag::Search);
        assert_eq!(extraction.slots.get("depart_date"), Some(&json!("2026-06-10")));
        assert!(extraction.confidence >= 60, "confidence {}", extraction.confidence);
    }

    #[test]
    fn dates_resolve_to_the_next_occurrence() {
        let extraction = extract(&route_slots(), &[], "leaving march 3 returning march 9");
        assert_eq!(extraction.slots.get("depart_date"), Some(&json!("2027-03-03")));
        assert_eq!(extraction.slots.get("return_date"), Some(&json!("2027-03-09")));
    }

    #[test]
    fn rich_request_extracts_every_slot() {
        let extraction = extract(
            &SlotSet::default(),
            &[],
            "NYC to London on 2026-07-01 back 2026-07-15 for 2 adults in business under $3k, flexible by 2 days",
        );

        assert_eq!(extraction.slots.get("origin"), Some(&json!("NYC")));
        assert_eq!(extraction.slots.get("destination"), Some(&json!("LON")));
        assert_eq!(extraction.slots.get("depart_date"), Some(&json!("2026-07-01")));
        assert_eq!(extraction.slots.get("return_date"), Some(&json!("2026-07-15")));
        assert_eq!(extraction.slots.get("passengers"), Some(&json!(2)));
        assert_eq!(extraction.slots.get("budget"), Some(&json!("3000")));
        assert_eq!(extraction.slots.get("cabin_class"), Some(&json!("business")));
        assert_eq!(extraction.slots.get("flexibility"), Some(&json!(2)));
        assert_eq!(extraction.confidence, 100);
    }

    #[test]
    fn refinement_of_complete_request_is_trusted() {
        let mut slots = route_slots();
        slots.depart_date = NaiveDate::from_ymd_opt(2026, 6, 10);

        let extraction = extract(&slots, &[], "make it business class");
        assert_eq!(extraction.intent, IntentTag::Refine);
        assert!(extraction.confidence >= 60);
    }

    #[test]
    fn positional_booking_binds_to_latest_presented_list() {
        let window = vec![Turn::agent(
            "Here are your options",
            Some(TurnPayload::OfferList { result_set: "1a2b3c4d".to_string(), sorted_by: None, offers: Vec::new() }),
            Utc::now(),
        )];

        let extraction = extract(&route_slots(), &window, "book the second one");
        assert_eq!(
            extraction.intent,
            IntentTag::Book {
                target: BookingTarget {
                    offer_ref: Some(OfferRef { result_set: "1a2b3c4d".to_string(), position: 2 }),
                    position: Some(2),
                }
            }
        );
    }

    #[test]
    fn explicit_offer_reference_is_parsed() {
        let extraction = extract(&route_slots(), &[], "please book 0badc0de-3");
        assert_eq!(
            extraction.intent,
            IntentTag::Book {
                target: BookingTarget::reference(OfferRef {
                    result_set: "0badc0de".to_string(),
                    position: 3
                })
            }
        );
    }

    #[test]
    fn booking_without_a_target_stays_ambiguous() {
        let extraction = extract(&route_slots(), &[], "book it");
        assert_eq!(extraction.intent, IntentTag::Book { target: BookingTarget::default() });
        assert!(extraction.confidence < 60);
    }

    #[test]
    fn control_words_map_to_flow_intents() {
        let slots = route_slots();
        assert_eq!(extract(&slots, &[], "yes please").intent, IntentTag::Confirm);
        assert_eq!(extract(&slots, &[], "no, cancel that").intent, IntentTag::Decline);
        assert_eq!(
            extract(&slots, &[], "sort by price").intent,
            IntentTag::Sort { key: SortKey::Price }
        );
        assert_eq!(
            extract(&slots, &[], "show the fastest first").intent,
            IntentTag::Sort { key: SortKey::Duration }
        );
        assert_eq!(extract(&slots, &[], "thanks, bye").intent, IntentTag::End);
        assert_eq!(
            extract(&slots, &[], "start over, Boston to Tokyo instead").intent,
            IntentTag::NewSearch
        );
    }

    #[test]
    fn vague_text_requests_clarification_with_low_confidence() {
        let extraction = extract(&SlotSet::default(), &[], "Can you help?");
        assert_eq!(extraction.intent, IntentTag::Clarify);
        assert!(extraction.slots.is_empty());
        assert!(extraction.confidence < 60);
    }

    #[test]
    fn handles_common_phrasings() {
        struct Case {
            text: &'static str,
            origin: Option<&'static str>,
            destination: Option<&'static str>,
        }

        let cases = [
            Case { text: "fly from BOS to CDG", origin: Some("BOS"), destination: Some("CDG") },
            Case { text: "Boston to Paris please", origin: Some("BOS"), destination: Some("PAR") },
            Case { text: "I need to get to Tokyo", origin: None, destination: Some("TYO") },
            Case { text: "from new york to los angeles", origin: Some("NYC"), destination: Some("LAX") },
            Case { text: "San Francisco to Hong Kong", origin: Some("SFO"), destination: Some("HKG") },
            Case { text: "trip to dubai from doha", origin: Some("DOH"), destination: Some("DXB") },
            Case { text: "want to book a trip", origin: None, destination: None },
            Case { text: "from Boston to Porto", origin: Some("BOS"), destination: Some("Porto") },
            Case {
                text: "to Cape Town on June 10th from Lisbon",
                origin: Some("LIS"),
                destination: Some("Cape Town"),
            },
        ];

        for case in cases {
            let extraction = extract(&SlotSet::default(), &[], case.text);
            assert_eq!(
                extraction.slots.get("origin").and_then(|v| v.as_str()),
                case.origin,
                "origin for `{}`",
                case.text
            );
            assert_eq!(
                extraction.slots.get("destination").and_then(|v| v.as_str()),
                case.destination,
                "destination for `{}`",
                case.text
            );
        }
    }
}
