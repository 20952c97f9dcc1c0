use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MAX_PASSENGERS: u8 = 9;
pub const MAX_FLEXIBILITY_DAYS: u8 = 7;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotName {
    Origin,
    Destination,
    DepartDate,
    ReturnDate,
    Passengers,
    Budget,
    CabinClass,
    Flexibility,
}

impl SlotName {
    pub const ALL: [SlotName; 8] = [
        SlotName::Origin,
        SlotName::Destination,
        SlotName::DepartDate,
        SlotName::ReturnDate,
        SlotName::Passengers,
        SlotName::Budget,
        SlotName::CabinClass,
        SlotName::Flexibility,
    ];

    pub const REQUIRED: [SlotName; 3] =
        [SlotName::Origin, SlotName::Destination, SlotName::DepartDate];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Origin => "origin",
            Self::Destination => "destination",
            Self::DepartDate => "depart_date",
            Self::ReturnDate => "return_date",
            Self::Passengers => "passengers",
            Self::Budget => "budget",
            Self::CabinClass => "cabin_class",
            Self::Flexibility => "flexibility",
        }
    }
}

impl fmt::Display for SlotName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotName {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|slot| slot.as_str() == value.trim())
            .ok_or_else(|| format!("unknown slot `{value}`"))
    }
}

/// IATA airport or city code, always stored upper-cased.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LocationCode(String);

impl LocationCode {
    pub fn parse(raw: &str) -> Result<Self, String> {
        let trimmed = raw.trim();
        if trimmed.len() == 3 && trimmed.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(trimmed.to_ascii_uppercase()))
        } else {
            Err(format!("`{raw}` is not a three-letter IATA location code"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CabinClass {
    #[default]
    Economy,
    PremiumEconomy,
    Business,
    First,
}

impl CabinClass {
    pub fn provider_code(&self) -> &'static str {
        match self {
            Self::Economy => "ECONOMY",
            Self::PremiumEconomy => "PREMIUM_ECONOMY",
            Self::Business => "BUSINESS",
            Self::First => "FIRST",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Economy => "economy",
            Self::PremiumEconomy => "premium economy",
            Self::Business => "business",
            Self::First => "first",
        }
    }
}

impl FromStr for CabinClass {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match normalized.as_str() {
            "economy" | "coach" => Ok(Self::Economy),
            "premium_economy" | "premium" => Ok(Self::PremiumEconomy),
            "business" => Ok(Self::Business),
            "first" | "first_class" => Ok(Self::First),
            other => Err(format!("unsupported cabin class `{other}`")),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotSet {
    pub origin: Option<LocationCode>,
    pub destination: Option<LocationCode>,
    pub depart_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub passengers: Option<u8>,
    pub budget: Option<Decimal>,
    pub cabin_class: Option<CabinClass>,
    pub flexibility_days: Option<u8>,
}

/// A partial slot set proposed for merging. Absent fields leave the slot untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotUpdate {
    pub origin: Option<LocationCode>,
    pub destination: Option<LocationCode>,
    pub depart_date: Option<NaiveDate>,
    pub return_date: Option<NaiveDate>,
    pub passengers: Option<u8>,
    pub budget: Option<Decimal>,
    pub cabin_class: Option<CabinClass>,
    pub flexibility_days: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotRejection {
    pub field: String,
    pub reason: String,
}

impl SlotRejection {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self { field: field.into(), reason: reason.into() }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: Vec<SlotName>,
    pub rejected: Vec<SlotRejection>,
}

impl ApplyReport {
    pub fn changed(&self) -> bool {
        !self.applied.is_empty()
    }
}

impl SlotUpdate {
    pub fn is_empty(&self) -> bool {
        self.touched().is_empty()
    }

    pub fn touched(&self) -> Vec<SlotName> {
        let mut touched = Vec::new();
        if self.origin.is_some() {
            touched.push(SlotName::Origin);
        }
        if self.destination.is_some() {
            touched.push(SlotName::Destination);
        }
        if self.depart_date.is_some() {
            touched.push(SlotName::DepartDate);
        }
        if self.return_date.is_some() {
            touched.push(SlotName::ReturnDate);
        }
        if self.passengers.is_some() {
            touched.push(SlotName::Passengers);
        }
        if self.budget.is_some() {
            touched.push(SlotName::Budget);
        }
        if self.cabin_class.is_some() {
            touched.push(SlotName::CabinClass);
        }
        if self.flexibility_days.is_some() {
            touched.push(SlotName::Flexibility);
        }
        touched
    }

    /// Converts a loosely typed proposal into a typed update. Entries that do not
    /// parse into their slot's declared type are reported and left out.
    pub fn from_raw(raw: &BTreeMap<String, Value>) -> (Self, Vec<SlotRejection>) {
        let mut update = Self::default();
        let mut rejected = Vec::new();

        for (key, value) in raw {
            if value.is_null() {
                continue;
            }
            let slot = match key.parse::<SlotName>() {
                Ok(slot) => slot,
                Err(reason) => {
                    rejected.push(SlotRejection::new(key, reason));
                    continue;
                }
            };

            let outcome = match slot {
                SlotName::Origin => {
                    raw_str(value).and_then(LocationCode::parse).map(|v| update.origin = Some(v))
                }
                SlotName::Destination => raw_str(value)
                    .and_then(LocationCode::parse)
                    .map(|v| update.destination = Some(v)),
                SlotName::DepartDate => {
                    raw_str(value).and_then(parse_date).map(|v| update.depart_date = Some(v))
                }
                SlotName::ReturnDate => {
                    raw_str(value).and_then(parse_date).map(|v| update.return_date = Some(v))
                }
                SlotName::Passengers => raw_small_int(value, 1, MAX_PASSENGERS)
                    .map(|v| update.passengers = Some(v)),
                SlotName::Budget => raw_decimal(value).map(|v| update.budget = Some(v)),
                SlotName::CabinClass => raw_str(value)
                    .and_then(|v| v.parse::<CabinClass>())
                    .map(|v| update.cabin_class = Some(v)),
                SlotName::Flexibility => raw_small_int(value, 0, MAX_FLEXIBILITY_DAYS)
                    .map(|v| update.flexibility_days = Some(v)),
            };

            if let Err(reason) = outcome {
                rejected.push(SlotRejection::new(slot.as_str(), reason));
            }
        }

        (update, rejected)
    }
}

impl SlotSet {
    /// Merges `update` slot by slot (last writer wins). A value that would break a
    /// validity predicate is rejected and the previous value is kept.
    pub fn apply(&mut self, update: SlotUpdate, today: NaiveDate) -> ApplyReport {
        let mut report = ApplyReport::default();

        if let Some(origin) = update.origin {
            let other = update.destination.as_ref().or(self.destination.as_ref());
            if other == Some(&origin) {
                report.reject(SlotName::Origin, "origin and destination must differ");
            } else {
                report.set(SlotName::Origin, &mut self.origin, origin);
            }
        }

        if let Some(destination) = update.destination {
            if self.origin.as_ref() == Some(&destination) {
                report.reject(SlotName::Destination, "origin and destination must differ");
            } else {
                report.set(SlotName::Destination, &mut self.destination, destination);
            }
        }

        if let Some(depart_date) = update.depart_date {
            let return_date = update.return_date.or(self.return_date);
            if depart_date < today {
                report.reject(SlotName::DepartDate, "departure date is in the past");
            } else if return_date.is_some_and(|ret| ret < depart_date) {
                report.reject(SlotName::DepartDate, "departure date is after the return date");
            } else {
                report.set(SlotName::DepartDate, &mut self.depart_date, depart_date);
            }
        }

        if let Some(return_date) = update.return_date {
            if return_date < today {
                report.reject(SlotName::ReturnDate, "return date is in the past");
            } else if self.depart_date.is_some_and(|depart| return_date < depart) {
                report.reject(SlotName::ReturnDate, "return date is before the departure date");
            } else {
                report.set(SlotName::ReturnDate, &mut self.return_date, return_date);
            }
        }

        if let Some(passengers) = update.passengers {
            if passengers == 0 || passengers > MAX_PASSENGERS {
                report.reject(
                    SlotName::Passengers,
                    format!("passenger count must be between 1 and {MAX_PASSENGERS}"),
                );
            } else {
                report.set(SlotName::Passengers, &mut self.passengers, passengers);
            }
        }

        if let Some(budget) = update.budget {
            if budget <= Decimal::ZERO {
                report.reject(SlotName::Budget, "budget must be a positive amount");
            } else {
                report.set(SlotName::Budget, &mut self.budget, budget.normalize());
            }
        }

        if let Some(cabin_class) = update.cabin_class {
            report.set(SlotName::CabinClass, &mut self.cabin_class, cabin_class);
        }

        if let Some(flexibility) = update.flexibility_days {
            if flexibility > MAX_FLEXIBILITY_DAYS {
                report.reject(
                    SlotName::Flexibility,
                    format!("date flexibility is limited to {MAX_FLEXIBILITY_DAYS} days"),
                );
            } else {
                report.set(SlotName::Flexibility, &mut self.flexibility_days, flexibility);
            }
        }

        report
    }

    pub fn is_search_ready(&self) -> bool {
        self.origin.is_some() && self.destination.is_some() && self.depart_date.is_some()
    }

    pub fn missing_required(&self) -> Vec<SlotName> {
        let mut missing = Vec::new();
        if self.origin.is_none() {
            missing.push(SlotName::Origin);
        }
        if self.destination.is_none() {
            missing.push(SlotName::Destination);
        }
        if self.depart_date.is_none() {
            missing.push(SlotName::DepartDate);
        }
        missing
    }

    pub fn is_set(&self, slot: SlotName) -> bool {
        match slot {
            SlotName::Origin => self.origin.is_some(),
            SlotName::Destination => self.destination.is_some(),
            SlotName::DepartDate => self.depart_date.is_some(),
            SlotName::ReturnDate => self.return_date.is_some(),
            SlotName::Passengers => self.passengers.is_some(),
            SlotName::Budget => self.budget.is_some(),
            SlotName::CabinClass => self.cabin_class.is_some(),
            SlotName::Flexibility => self.flexibility_days.is_some(),
        }
    }

    /// Drops the slots that conflict with a new trip request. A request that names a
    /// different route (or no slots at all) resets the itinerary; traveller
    /// preferences (passengers, cabin) carry over.
    pub fn clear_for_new_search(&mut self, incoming: &SlotUpdate) -> Vec<SlotName> {
        let route_changed = incoming.origin.as_ref().is_some_and(|o| Some(o) != self.origin.as_ref())
            || incoming
                .destination
                .as_ref()
                .is_some_and(|d| Some(d) != self.destination.as_ref());

        if !(route_changed || incoming.is_empty()) {
            return Vec::new();
        }

        let mut cleared = Vec::new();
        for slot in [
            SlotName::Origin,
            SlotName::Destination,
            SlotName::DepartDate,
            SlotName::ReturnDate,
            SlotName::Budget,
            SlotName::Flexibility,
        ] {
            if self.is_set(slot) {
                cleared.push(slot);
            }
        }

        self.origin = None;
        self.destination = None;
        self.depart_date = None;
        self.return_date = None;
        self.budget = None;
        self.flexibility_days = None;
        cleared
    }
}

impl ApplyReport {
    fn set<T: PartialEq>(&mut self, slot: SlotName, target: &mut Option<T>, value: T) {
        if target.as_ref() != Some(&value) {
            self.applied.push(slot);
        }
        *target = Some(value);
    }

    fn reject(&mut self, slot: SlotName, reason: impl Into<String>) {
        self.rejected.push(SlotRejection::new(slot.as_str(), reason));
    }
}

fn raw_str(value: &Value) -> Result<&str, String> {
    value.as_str().ok_or_else(|| format!("expected a string, got `{value}`"))
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("`{raw}` is not a YYYY-MM-DD date"))
}

fn raw_small_int(value: &Value, min: u8, max: u8) -> Result<u8, String> {
    let number = match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse::<i64>().ok(),
        _ => None,
    }
    .ok_or_else(|| format!("expected an integer, got `{value}`"))?;

    if number < i64::from(min) || number > i64::from(max) {
        return Err(format!("{number} is outside {min}..={max}"));
    }
    u8::try_from(number).map_err(|_| format!("{number} is out of range"))
}

fn raw_decimal(value: &Value) -> Result<Decimal, String> {
    let parsed = match value {
        Value::Number(number) => number.to_string().parse::<Decimal>().ok(),
        Value::String(text) => {
            text.trim().trim_start_matches('$').replace(',', "").parse::<Decimal>().ok()
        }
        _ => None,
    }
    .ok_or_else(|| format!("expected an amount, got `{value}`"))?;

    if parsed <= Decimal::ZERO {
        return Err("amount must be positive".to_string());
    }
    Ok(parsed)
}
