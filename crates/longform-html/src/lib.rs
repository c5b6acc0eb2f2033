//! # Longform HTML
//!
//! HTML processing for the Longform extraction pipeline:
//!
//! - **Text utilities**: entity decoding, whitespace-preserving
//!   normalization, char-safe truncation
//! - **Metadata**: `<title>` and canonical-URL extraction, including the
//!   arXiv `/html/<id>` versioned-identifier upgrade
//! - **Readability**: naive container candidates, HTML-to-text projection,
//!   and the reader-block paragraph splitter used when no structured
//!   parser applies
//! - **ArXiv parser**: DOM traversal emitting typed blocks with inline runs

pub mod arxiv;
pub mod meta;
pub mod readability;
pub mod text;

pub use arxiv::{extract_arxiv_structured_content, ArxivStructuredContent};
pub use meta::{extract_canonical_url, extract_jsonld_payloads, extract_title};
pub use readability::{build_reader_blocks, extract_primary_html_candidates, strip_html_to_text};
pub use text::{normalize_text_preserve_paragraphs, normalize_whitespace, truncate_chars};
