//! Error types for the extraction pipeline

use thiserror::Error;

/// Domain errors surfaced by the extraction pipeline.
///
/// Strategy-level failures (`NoMatch`, `ContentTooShort`, `BinaryPayload`,
/// `BlockedPage`, `LlmUnavailable`, `LlmRejected`) are recovered by the
/// orchestrator and recorded in the extraction trace; only
/// `ExtractionFailed` and `QualityBelowThreshold` terminate a request.
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Scheme or host rejected by the URL safety guard.
    #[error("URL is not allowed: {0}")]
    DisallowedUrl(String),

    /// DNS resolution of the URL host failed.
    #[error("could not resolve URL host: {0}")]
    UnresolvableHost(String),

    /// All transport attempts failed; carries the per-attempt error trail.
    #[error("failed to fetch URL content: {0}")]
    FetchFailure(String),

    /// A strategy found nothing to extract in the payload.
    #[error("{0}")]
    NoMatch(String),

    /// A strategy rejected the payload as too short to be usable.
    #[error("{0}")]
    ContentTooShort(String),

    /// A readable-text strategy refuses to process a binary payload.
    #[error("binary payload cannot be extracted as readable article text")]
    BinaryPayload,

    /// The page carries anti-bot boilerplate instead of content.
    #[error("page appears to be blocked by anti-bot protections")]
    BlockedPage,

    /// The rule-synthesis oracle could not be reached or produced no output.
    #[error("LLM rule synthesis unavailable: {0}")]
    LlmUnavailable(String),

    /// The oracle answered but the rule failed validation.
    #[error("LLM rule rejected: {0}")]
    LlmRejected(String),

    /// No strategy produced a candidate; carries the joined failure reasons.
    #[error("failed to extract readable article content. {0}")]
    ExtractionFailed(String),

    /// The best candidate scored under the publishable minimum.
    #[error("extraction quality below acceptable threshold ({score:.3} < {minimum:.3})")]
    QualityBelowThreshold { score: f64, minimum: f64 },

    /// Rule store I/O failed; callers degrade to in-memory state.
    #[error("rule store error: {0}")]
    StoreIo(String),
}

impl ExtractError {
    /// Create a store error from any I/O or serialization failure.
    pub fn store_io(err: impl std::fmt::Display) -> Self {
        Self::StoreIo(err.to_string())
    }

    /// Whether this error ends the whole extraction request rather than a
    /// single strategy.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::DisallowedUrl(_)
                | Self::UnresolvableHost(_)
                | Self::ExtractionFailed(_)
                | Self::QualityBelowThreshold { .. }
        )
    }
}

/// Convenience alias used throughout the pipeline crates.
pub type Result<T> = std::result::Result<T, ExtractError>;
