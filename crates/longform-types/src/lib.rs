//! # Longform Types
//!
//! Shared document model and pipeline contracts for the Longform web
//! document extraction pipeline:
//!
//! - **Content blocks**: tagged block variants (headings, paragraphs, lists,
//!   tables, equations, figures, code, blockquotes, references) with
//!   inline-run rich text
//! - **Pipeline DTOs**: fetched page, extraction context, candidates,
//!   attempts, decisions, and the webhook result shape
//! - **Error handling**: the `ExtractError` domain enum
//! - **Configuration**: env-driven config structs with safe defaults

pub mod block;
pub mod config;
pub mod error;
pub mod inline;
pub mod models;

pub use block::{Block, ReferenceLink, RichText, TableCell};
pub use config::{
    AdaptiveConfig, OrchestratorConfig, PromotionConfig, SafetyConfig, StoreConfig,
};
pub use error::{ExtractError, Result};
pub use inline::InlineRun;
pub use models::{
    ExtractionAttempt, ExtractionCandidate, ExtractionContext, ExtractionDecision, FetchedPage,
    PageFetcher, WebhookEnvelope, WebhookResult,
};
