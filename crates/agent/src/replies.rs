//! Agent utterances. All user-facing wording lives here so the orchestrator only
//! decides *which* reply to give.

use std::fmt::Write;

use flightdesk_core::domain::booking::BookingRecord;
use flightdesk_core::domain::search::{FlightOffer, OfferRef, ResultSet, SearchQuery};
use flightdesk_core::domain::session::PresentedOffer;
use flightdesk_core::domain::slots::{SlotName, SlotRejection};
use flightdesk_core::errors::OfferResolutionError;

pub const GREETING: &str = "Where would you like to fly?";
pub const NO_FLIGHTS: &str =
    "No flights found matching your criteria. Try different dates, a higher budget or nearby airports.";

pub fn airline_name(code: &str) -> &str {
    match code {
        "QR" => "Qatar Airways",
        "EK" => "Emirates",
        "AA" => "American Airlines",
        "AF" => "Air France",
        "BA" => "British Airways",
        "DL" => "Delta Air Lines",
        "UA" => "United Airlines",
        "LH" => "Lufthansa",
        "KL" => "KLM",
        "B6" => "JetBlue",
        "IB" => "Iberia",
        "EI" => "Aer Lingus",
        _ => code,
    }
}

pub fn format_duration(minutes: u32) -> String {
    match (minutes / 60, minutes % 60) {
        (0, m) => format!("{m}m"),
        (h, 0) => format!("{h}h"),
        (h, m) => format!("{h}h {m}m"),
    }
}

fn stops_label(stops: u8) -> String {
    match stops {
        0 => "nonstop".to_string(),
        1 => "1 stop".to_string(),
        n => format!("{n} stops"),
    }
}

fn slot_question(slot: SlotName) -> &'static str {
    match slot {
        SlotName::Origin => "Where are you flying from?",
        SlotName::Destination => "Where would you like to go?",
        SlotName::DepartDate => "What date would you like to depart?",
        SlotName::ReturnDate => "When would you like to come back?",
        SlotName::Passengers => "How many passengers are travelling?",
        SlotName::Budget => "What's your budget?",
        SlotName::CabinClass => "Which cabin would you like?",
        SlotName::Flexibility => "How flexible are your dates?",
    }
}

/// Asks for the first missing required slot, after noting anything that was rejected.
pub fn clarification(missing: &[SlotName], rejected: &[SlotRejection]) -> String {
    let mut reply = String::new();
    for rejection in rejected {
        let _ = write!(reply, "I couldn't use that {}: {}. ", rejection.field.replace('_', " "), rejection.reason);
    }
    match missing.first() {
        Some(slot) => reply.push_str(slot_question(*slot)),
        None if reply.is_empty() => reply.push_str(GREETING),
        None => reply.push_str("Could you tell me the corrected value?"),
    }
    reply
}

pub fn unclear(missing: &[SlotName]) -> String {
    let follow_up = missing.first().map(|slot| slot_question(*slot)).unwrap_or(
        "You can ask me to search, sort by price or duration, or book an option from the list.",
    );
    format!("Sorry, I didn't quite catch that. {follow_up}")
}

pub fn extractor_unavailable() -> String {
    "I'm having trouble understanding requests right now. Could you rephrase that?".to_string()
}

pub fn offer_line(offer_ref: &OfferRef, offer: &FlightOffer) -> String {
    let fare = match offer.checked_bags {
        Some(bags) => format!("{}, {}", offer.fare_class, baggage_label(bags)),
        None => offer.fare_class.clone(),
    };
    format!(
        "[{offer_ref}] {} {} {} {} -> {} {}, {}, {}, {} {} ({fare})",
        airline_name(&offer.carrier),
        offer.flight_number,
        offer.origin,
        offer.departure_at.format("%b %d %H:%M"),
        offer.destination,
        offer.arrival_at.format("%H:%M"),
        format_duration(offer.duration_minutes),
        stops_label(offer.stops),
        offer.price,
        offer.currency,
    )
}

fn baggage_label(bags: u32) -> String {
    match bags {
        0 => "no checked bags".to_string(),
        1 => "1 checked bag".to_string(),
        n => format!("{n} checked bags"),
    }
}

pub fn presented_offers(results: &ResultSet) -> Vec<PresentedOffer> {
    results
        .offers
        .iter()
        .enumerate()
        .map(|(index, offer)| PresentedOffer {
            offer_ref: results.offer_ref(index + 1),
            offer: offer.clone(),
        })
        .collect()
}

pub fn offer_list(results: &ResultSet, query: Option<&SearchQuery>) -> String {
    if results.offers.is_empty() {
        return NO_FLIGHTS.to_string();
    }

    let mut reply = String::new();
    let count = results.offers.len();
    let noun = if count == 1 { "flight" } else { "flights" };
    match query {
        Some(query) => {
            let _ = write!(
                reply,
                "I found {count} {noun} from {} to {} on {}",
                query.origin, query.destination, query.depart_date
            );
        }
        None => {
            let _ = write!(reply, "Here are {count} {noun}");
        }
    }
    if let Some(key) = results.sorted_by {
        let _ = write!(reply, ", sorted by {}", key.label());
    }
    reply.push_str(":\n");

    for (position, presented) in presented_offers(results).iter().enumerate() {
        let _ = writeln!(reply, "{}. {}", position + 1, offer_line(&presented.offer_ref, &presented.offer));
    }
    reply.push_str("Say \"book option N\" to choose one, or ask me to sort by price or duration.");
    reply
}

pub fn search_rejected(detail: &str) -> String {
    format!("The flight search couldn't run with those details ({detail}). Could you check the airports and dates?")
}

pub fn search_failed() -> String {
    "The flight search failed, please try again in a moment.".to_string()
}

pub fn confirm_choice(offer_ref: &OfferRef, offer: &FlightOffer) -> String {
    format!("You picked {}. Shall I book it? (yes / no)", offer_line(offer_ref, offer))
}

pub fn choice_declined() -> String {
    "No problem, nothing was booked. Pick another option whenever you're ready.".to_string()
}

pub fn booking_confirmed(record: &BookingRecord) -> String {
    let mut reply = format!(
        "Booked! Your confirmation code is {} for {} {}.",
        record.confirmation_token.as_deref().unwrap_or("pending"),
        record.price,
        record.currency
    );
    if let Some(link) = &record.external_link {
        let _ = write!(reply, " Manage your booking at {link}");
    }
    reply
}

pub fn booking_failed(reason: &str) -> String {
    format!("The booking failed: {reason}. Nothing was charged. You can try again or pick another option.")
}

pub fn offer_unresolved(error: &OfferResolutionError) -> String {
    match error {
        OfferResolutionError::Stale { reference, current: Some(current) } => format!(
            "Offer {reference} is from an earlier search and is no longer available. \
Please re-select from the current list (offers {current}-N)."
        ),
        OfferResolutionError::Stale { reference, current: None } => format!(
            "Offer {reference} is from an earlier search. Please search again and re-select from the new list."
        ),
        OfferResolutionError::OutOfRange { position, available } => {
            format!("There is no option {position}; the current list has {available}. Which one would you like?")
        }
        OfferResolutionError::NoResults => {
            "There are no flights to book yet. Tell me where and when you'd like to fly.".to_string()
        }
        OfferResolutionError::Unspecified => {
            "Which flight would you like to book? Give me the option number.".to_string()
        }
    }
}

pub fn nothing_to_confirm() -> String {
    "There's nothing waiting for confirmation. Pick an option from the list first.".to_string()
}

pub fn nothing_to_sort() -> String {
    "There are no current results to sort. Let's search first.".to_string()
}

pub fn trip_booked() -> String {
    "Your trip is already booked. Say \"new search\" to plan another one.".to_string()
}

pub fn farewell() -> String {
    "Thanks for planning with us. Safe travels!".to_string()
}
