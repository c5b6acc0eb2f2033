//! Title and canonical-URL extraction

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

use crate::text::{decode_entities, normalize_whitespace};

static TITLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
static CANONICAL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)<link[^>]+rel=["']canonical["'][^>]*href=["']([^"']+)["']"#).unwrap()
});
static JSONLD_SCRIPT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)<script[^>]+type=["']application/ld\+json["'][^>]*>(.*?)</script>"#).unwrap()
});
static ARXIV_HTML_PATH_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^/html/([^/?#]+)$").unwrap());
static ARXIV_HTML_REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)/html/([^"'\s<>?#]+)"#).unwrap());
static ARXIV_VERSION_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)v\d+$").unwrap());

/// First `<title>` text, whitespace-normalized; `None` when absent or empty.
pub fn extract_title(page_html: &str) -> Option<String> {
    let captures = TITLE_RE.captures(page_html)?;
    let value = normalize_whitespace(&decode_entities(&captures[1]));
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}

/// Inner bodies of every `application/ld+json` script block, unparsed.
pub fn extract_jsonld_payloads(page_html: &str) -> Vec<String> {
    JSONLD_SCRIPT_RE
        .captures_iter(page_html)
        .map(|captures| captures[1].trim().to_string())
        .filter(|body| !body.is_empty())
        .collect()
}

fn resolve_url_without_fragment(target: &str, fallback_url: &str) -> String {
    let base = {
        let trimmed = fallback_url.trim();
        if trimmed.is_empty() {
            target.trim()
        } else {
            trimmed
        }
    };
    let reference = {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            fallback_url.trim()
        } else {
            trimmed
        }
    };
    match Url::parse(base).and_then(|parsed| parsed.join(reference)) {
        Ok(mut resolved) => {
            resolved.set_fragment(None);
            resolved.to_string()
        }
        Err(_) => reference.to_string(),
    }
}

fn is_arxiv_host(host: &str) -> bool {
    host == "arxiv.org" || host.ends_with(".arxiv.org")
}

/// For an arXiv `/html/<id>` URL without a version suffix, upgrade to the
/// first explicitly versioned identifier with the same base id the page
/// references; versioned URLs just lose their query/fragment.
fn normalize_arxiv_canonical_url(page_html: &str, fallback_url: &str) -> String {
    let Ok(parsed) = Url::parse(fallback_url) else {
        return fallback_url.to_string();
    };
    let host = parsed.host_str().unwrap_or_default().to_lowercase();
    if !is_arxiv_host(&host) {
        return fallback_url.to_string();
    }

    let Some(path_match) = ARXIV_HTML_PATH_RE.captures(parsed.path()) else {
        return fallback_url.to_string();
    };
    let current_identifier = path_match[1].trim().to_string();
    if current_identifier.is_empty() {
        return fallback_url.to_string();
    }

    if ARXIV_VERSION_SUFFIX_RE.is_match(&current_identifier) {
        let mut stripped = parsed.clone();
        stripped.set_query(None);
        stripped.set_fragment(None);
        return stripped.to_string();
    }

    let current_base_identifier = ARXIV_VERSION_SUFFIX_RE
        .replace(&current_identifier, "")
        .into_owned();
    for captures in ARXIV_HTML_REFERENCE_RE.captures_iter(page_html) {
        let candidate_identifier = captures[1].trim().to_string();
        if candidate_identifier.is_empty() {
            continue;
        }
        if ARXIV_VERSION_SUFFIX_RE.replace(&candidate_identifier, "") != current_base_identifier {
            continue;
        }
        if !ARXIV_VERSION_SUFFIX_RE.is_match(&candidate_identifier) {
            continue;
        }
        let mut upgraded = parsed.clone();
        upgraded.set_path(&format!("/html/{candidate_identifier}"));
        upgraded.set_query(None);
        upgraded.set_fragment(None);
        return upgraded.to_string();
    }

    fallback_url.to_string()
}

/// `<link rel=canonical>` href joined against the fallback URL with the
/// fragment removed, then the arXiv canonical normalization.
pub fn extract_canonical_url(page_html: &str, fallback_url: &str) -> String {
    let resolved = match CANONICAL_RE.captures(page_html) {
        Some(captures) => {
            let value = captures[1].trim();
            let target = if value.is_empty() { fallback_url } else { value };
            resolve_url_without_fragment(target, fallback_url)
        }
        None => resolve_url_without_fragment(fallback_url, fallback_url),
    };
    normalize_arxiv_canonical_url(page_html, &resolved)
}
