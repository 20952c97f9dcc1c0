use crate::extractor::{Extraction, IntentTag};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
    Degrade { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn reason_code(&self) -> Option<&'static str> {
        match self {
            Self::Allow => None,
            Self::Deny { reason_code, .. } | Self::Degrade { reason_code, .. } => Some(reason_code),
        }
    }
}

/// Checks applied to every extraction before the orchestrator acts on it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GuardrailPolicy {
    pub confidence_threshold: u8,
    /// Slot proposals are only merged for search-shaped intents.
    pub slots_only_on_trip_intents: bool,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { confidence_threshold: 60, slots_only_on_trip_intents: true }
    }
}

impl GuardrailPolicy {
    pub fn with_threshold(confidence_threshold: u8) -> Self {
        Self { confidence_threshold, ..Self::default() }
    }

    pub fn evaluate(&self, extraction: &Extraction) -> GuardrailDecision {
        if extraction.confidence < self.confidence_threshold {
            return GuardrailDecision::Degrade {
                reason_code: "low_confidence",
                user_message: "I'm not sure I understood that.".to_string(),
                fallback_path: "clarify",
            };
        }

        match &extraction.intent {
            IntentTag::Book { target } if target.is_empty() => GuardrailDecision::Degrade {
                reason_code: "ambiguous_offer_reference",
                user_message: "Which flight would you like to book? Give me the option number or \
its reference."
                    .to_string(),
                fallback_path: "request_explicit_offer",
            },
            _ => GuardrailDecision::Allow,
        }
    }

    /// Whether the extraction's slot proposals may be merged into the session.
    pub fn accepts_slots(&self, extraction: &Extraction) -> bool {
        !self.slots_only_on_trip_intents || extraction.intent.carries_trip_details()
    }
}
