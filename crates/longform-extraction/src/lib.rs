//! # Longform Extraction
//!
//! The strategy layer of the Longform pipeline:
//!
//! - **Quality scorer**: seven weighted features plus an anti-bot penalty,
//!   producing a bounded score and confidence per candidate
//! - **Adaptive engine**: cached LLM-learned rules, rule application,
//!   replay capture, and the promotion loop that certifies proven rules
//!   as first-class adapters
//! - **Strategies**: X-status API, domain adapters, arXiv HTML, JSON-LD,
//!   HTTP readability, and the LLM adaptive fallback behind one trait
//! - **Orchestrator**: races the strategies in declared order, scores
//!   candidates, short-circuits on acceptance, and builds the webhook DTO

pub mod adaptive;
pub mod orchestrator;
pub mod scoring;
pub mod strategies;

pub use adaptive::{apply_rule, AdaptiveEngine};
pub use orchestrator::{ExtractionRequest, StatusCallback, WebDocumentExtractionOrchestrator};
pub use scoring::{score_candidate, ScoreResult};
pub use strategies::{
    ArxivHtmlStrategy, DomainAdapterStrategy, ExtractorStrategy, HttpReadabilityStrategy,
    JsonLdStrategy, LlmAdaptiveStrategy, XStatusApiStrategy,
};
