//! Agent runtime: the conversational side of flightdesk.
//!
//! This crate turns user utterances into dispatcher steps:
//! - Extracts structured intent from natural language (`conversation`, `llm`)
//! - Applies guardrails before an extraction is trusted (`guardrails`)
//! - Owns live sessions and runs one turn at a time per session (`sessions`, `runtime`)
//! - Talks to flight search and booking services (`providers`)
//!
//! # Architecture
//!
//! Every turn follows the same constrained loop:
//! 1. **Intent Extraction** - utterance + slots + recent turns -> `Extraction`
//! 2. **Guardrail Enforcement** - low confidence or vague booking requests become
//!    clarification questions
//! 3. **Dispatch** - the core dispatcher decides whether to ask, search or book
//! 4. **Reply** - the outcome is rendered (`replies`) and recorded as turns
//!
//! # Safety Principle
//!
//! The extractor is strictly a translator. It NEVER decides which offers exist,
//! what they cost, or whether a booking succeeded. Those come from the search and
//! booking providers through the core dispatcher.

pub mod conversation;
pub mod extractor;
pub mod guardrails;
pub mod llm;
pub mod providers;
pub mod replies;
pub mod runtime;
pub mod sessions;

pub use conversation::RuleBasedExtractor;
pub use extractor::{Extraction, ExtractionRequest, ExtractorError, IntentExtractor, IntentTag};
pub use runtime::{AgentRuntime, Clock, FixedClock, RuntimeError, RuntimeSettings, SystemClock, TurnReply};
pub use sessions::SessionRegistry;
