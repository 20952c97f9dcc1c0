use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::slots::{CabinClass, LocationCode, SlotSet};

pub const RESULT_SET_LABEL_LEN: usize = 8;

/// Hex SHA-256 of a normalised [`SearchQuery`].
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Fingerprint(pub String);

impl Fingerprint {
    pub fn short(&self) -> &str {
        let end = self.0.len().min(RESULT_SET_LABEL_LEN);
        &self.0[..end]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Snapshot of the slot set at the moment a search is issued. Defaults are applied so
/// that equivalent requests normalise to the same fingerprint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub origin: LocationCode,
    pub destination: LocationCode,
    pub depart_date: NaiveDate,
    pub return_date: Option<NaiveDate>,
    pub passengers: u8,
    pub cabin_class: CabinClass,
    pub budget: Option<Decimal>,
    pub flexibility_days: u8,
    pub currency: String,
}

impl SearchQuery {
    pub fn from_slots(slots: &SlotSet, currency: &str) -> Option<Self> {
        Some(Self {
            origin: slots.origin.clone()?,
            destination: slots.destination.clone()?,
            depart_date: slots.depart_date?,
            return_date: slots.return_date,
            passengers: slots.passengers.unwrap_or(1),
            cabin_class: slots.cabin_class.unwrap_or_default(),
            budget: slots.budget.map(|budget| budget.normalize()),
            flexibility_days: slots.flexibility_days.unwrap_or(0),
            currency: currency.trim().to_ascii_uppercase(),
        })
    }

    pub fn fingerprint(&self) -> Fingerprint {
        let canonical = serde_json::json!({
            "origin": self.origin.as_str(),
            "destination": self.destination.as_str(),
            "depart_date": self.depart_date.to_string(),
            "return_date": self.return_date.map(|date| date.to_string()),
            "passengers": self.passengers,
            "cabin_class": self.cabin_class.provider_code(),
            "budget": self.budget.map(|budget| budget.normalize().to_string()),
            "flexibility_days": self.flexibility_days,
            "currency": self.currency,
        });

        let digest = Sha256::digest(canonical.to_string().as_bytes());
        Fingerprint(format!("{digest:x}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlightOffer {
    pub offer_id: String,
    pub carrier: String,
    pub flight_number: String,
    pub origin: String,
    pub destination: String,
    pub departure_at: NaiveDateTime,
    pub arrival_at: NaiveDateTime,
    pub duration_minutes: u32,
    pub stops: u8,
    pub fare_class: String,
    /// Checked bags included per traveller, when the provider reports it.
    #[serde(default)]
    pub checked_bags: Option<u32>,
    pub price: Decimal,
    pub currency: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Price,
    Duration,
}

impl SortKey {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::Duration => "duration",
        }
    }
}

/// Reference to a presented offer: `{result set label}-{1-based position}`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OfferRef {
    pub result_set: String,
    pub position: usize,
}

impl fmt::Display for OfferRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.result_set, self.position)
    }
}

impl FromStr for OfferRef {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim().to_ascii_lowercase();
        let (label, position) =
            trimmed.split_once('-').ok_or_else(|| format!("`{value}` is not an offer reference"))?;
        let valid_label = label.len() == RESULT_SET_LABEL_LEN
            && label.chars().all(|c| c.is_ascii_hexdigit());
        let position = position.parse::<usize>().ok().filter(|position| *position > 0);
        match (valid_label, position) {
            (true, Some(position)) => Ok(Self { result_set: label.to_string(), position }),
            _ => Err(format!("`{value}` is not an offer reference")),
        }
    }
}

/// Offers returned for one fingerprint, in presentation order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultSet {
    pub fingerprint: Fingerprint,
    pub offers: Vec<FlightOffer>,
    pub sorted_by: Option<SortKey>,
    pub received_at: DateTime<Utc>,
}

impl ResultSet {
    pub fn new(fingerprint: Fingerprint, offers: Vec<FlightOffer>) -> Self {
        Self { fingerprint, offers, sorted_by: None, received_at: Utc::now() }
    }

    /// Short label printed in offer refs. Each ordering gets its own label so refs
    /// shown before a re-sort no longer resolve once positions have moved.
    pub fn label(&self) -> String {
        match self.sorted_by {
            None => self.fingerprint.short().to_string(),
            Some(key) => {
                let digest = Sha256::digest(format!("{}:{}", self.fingerprint.0, key.label()));
                let hex = format!("{digest:x}");
                hex[..RESULT_SET_LABEL_LEN].to_string()
            }
        }
    }

    pub fn offer_ref(&self, position: usize) -> OfferRef {
        OfferRef { result_set: self.label(), position }
    }

    pub fn get(&self, position: usize) -> Option<&FlightOffer> {
        position.checked_sub(1).and_then(|index| self.offers.get(index))
    }

    /// Stable reorder; offers with equal keys keep their source order.
    pub fn sort_by(&mut self, key: SortKey) {
        match key {
            SortKey::Price => self.offers.sort_by(|a, b| a.price.cmp(&b.price)),
            SortKey::Duration => self.offers.sort_by_key(|offer| offer.duration_minutes),
        }
        self.sorted_by = Some(key);
    }
}
