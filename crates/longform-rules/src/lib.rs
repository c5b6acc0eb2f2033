//! # Longform Rules
//!
//! Persistent adaptive-rule state and per-host extraction adapters:
//!
//! - **Rule store**: JSON-on-disk state under an exclusive file lock —
//!   generated rules, promoted adapters, and a bounded FIFO of captured
//!   replay samples per host
//! - **Adapter registry**: static domain adapters plus promoted
//!   LLM-learned adapters read from the store
//! - **Rule oracle**: the narrow `RuleSynthesizer` seam with a Gemini
//!   `generateContent` implementation and fenced-JSON rule parsing

pub mod oracle;
pub mod registry;
pub mod store;

pub use oracle::{parse_rule_json, GeminiRuleSynthesizer, RuleDraft, RuleSynthesizer};
pub use registry::{adapter_for_host, DomainAdapter};
pub use store::{
    AdaptiveRule, PromotedAdapter, PromotionEvaluation, ReplaySample, RuleStore, StoreState,
};
