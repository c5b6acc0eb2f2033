//! Extraction strategies
//!
//! Every strategy implements the same interface and shares the fetched
//! page through the context. A strategy either produces a candidate or
//! fails with a descriptive reason the orchestrator records in the trace.

mod adaptive;
mod arxiv;
mod domain_adapter;
mod json_ld;
mod readability;
mod x_status;

use async_trait::async_trait;

use longform_types::{ExtractionCandidate, ExtractionContext, Result};

pub use adaptive::LlmAdaptiveStrategy;
pub use arxiv::ArxivHtmlStrategy;
pub use domain_adapter::DomainAdapterStrategy;
pub use json_ld::JsonLdStrategy;
pub use readability::HttpReadabilityStrategy;
pub use x_status::XStatusApiStrategy;

/// Minimum usable content length shared by the text strategies.
pub(crate) const MIN_CONTENT_CHARS: usize = 120;

#[async_trait]
pub trait ExtractorStrategy: Send + Sync {
    /// Stable strategy name used in traces and status messages.
    fn name(&self) -> &'static str;

    async fn extract(&self, context: &ExtractionContext) -> Result<ExtractionCandidate>;
}

pub(crate) fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|parsed| parsed.host_str().map(str::to_lowercase))
        .unwrap_or_default()
}
