//! # Longform Fetch
//!
//! HTTP/network layer for the Longform extraction pipeline:
//!
//! - **URL safety guard**: rejects non-HTTP(S) schemes, localhost aliases,
//!   literal private IPs, and hostnames resolving to private networks
//!   (with a configurable CIDR allow-list)
//! - **Fetcher**: async GET with a primary and fallback UA profile, small
//!   inter-attempt backoff, binary/PDF payload detection
//! - **Blocked-page detection**: anti-bot boilerplate markers

pub mod fetch;
pub mod safety;

pub use fetch::{is_binary_content_type, is_probably_blocked_page, HttpFetcher};
pub use safety::{PublicUrlGuard, UrlGuard};
