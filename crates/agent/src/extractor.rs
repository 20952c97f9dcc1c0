use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use flightdesk_core::domain::booking::BookingTarget;
use flightdesk_core::domain::search::SortKey;
use flightdesk_core::domain::session::Turn;
use flightdesk_core::domain::slots::SlotSet;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum IntentTag {
    Search,
    Refine,
    NewSearch,
    Clarify,
    Book { target: BookingTarget },
    Confirm,
    Decline,
    Sort { key: SortKey },
    End,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Refine => "refine",
            Self::NewSearch => "new_search",
            Self::Clarify => "clarify",
            Self::Book { .. } => "book",
            Self::Confirm => "confirm",
            Self::Decline => "decline",
            Self::Sort { .. } => "sort",
            Self::End => "end",
        }
    }

    /// Intents whose slot proposals are merged into the session.
    pub fn carries_trip_details(&self) -> bool {
        matches!(self, Self::Search | Self::Refine | Self::NewSearch | Self::Clarify)
    }
}

/// Everything an extractor may look at for one utterance.
#[derive(Clone, Copy, Debug)]
pub struct ExtractionRequest<'a> {
    pub slots: &'a SlotSet,
    pub utterance: &'a str,
    pub turn_window: &'a [Turn],
    pub today: NaiveDate,
}

/// Extractor output. Slot proposals are loosely typed and sanitised by the caller
/// before anything is merged.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Extraction {
    pub intent: IntentTag,
    #[serde(default)]
    pub slots: BTreeMap<String, Value>,
    pub confidence: u8,
}

impl Extraction {
    pub fn clarify() -> Self {
        Self { intent: IntentTag::Clarify, slots: BTreeMap::new(), confidence: 0 }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ExtractorError {
    #[error("intent extraction timed out")]
    Timeout,
    #[error("intent extraction transport failure: {0}")]
    Transport(String),
    #[error("intent extraction returned unusable output: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait IntentExtractor: Send + Sync {
    fn name(&self) -> &'static str;

    async fn extract(&self, request: &ExtractionRequest<'_>) -> Result<Extraction, ExtractorError>;
}
