//! Static domain adapters plus promoted LLM-learned adapters

use once_cell::sync::Lazy;
use tracing::warn;

use crate::store::RuleStore;

/// A per-host extraction recipe: container regexes select the article
/// body, drop patterns remove boilerplate from the projected text.
#[derive(Debug, Clone)]
pub struct DomainAdapter {
    pub name: String,
    pub host_suffixes: Vec<String>,
    pub html_container_patterns: Vec<String>,
    pub drop_text_patterns: Vec<String>,
}

static ADAPTERS: Lazy<Vec<DomainAdapter>> = Lazy::new(|| {
    vec![
        DomainAdapter {
            name: "medium".into(),
            host_suffixes: vec!["medium.com".into()],
            html_container_patterns: vec![
                r"<article[^>]*>(.*?)</article>".into(),
                r#"<div[^>]+class=["'][^"']*section-content[^"']*["'][^>]*>(.*?)</div>"#.into(),
            ],
            drop_text_patterns: vec![
                r"Follow\s+Me".into(),
                r"Sign up".into(),
                r"Get unlimited access".into(),
            ],
        },
        DomainAdapter {
            name: "substack".into(),
            host_suffixes: vec!["substack.com".into()],
            html_container_patterns: vec![
                r"<article[^>]*>(.*?)</article>".into(),
                r#"<div[^>]+class=["'][^"']*body[^"']*["'][^>]*>(.*?)</div>"#.into(),
            ],
            drop_text_patterns: vec![],
        },
        DomainAdapter {
            name: "arxiv".into(),
            host_suffixes: vec!["arxiv.org".into()],
            html_container_patterns: vec![
                r"<main[^>]*>(.*?)</main>".into(),
                r#"<div[^>]+id=["']abs["'][^>]*>(.*?)</div>"#.into(),
            ],
            drop_text_patterns: vec![r"Submitters?:.*".into(), r"Subjects?:.*".into()],
        },
    ]
});

/// Resolve the adapter for a host: a promoted LLM-learned adapter wins
/// when it exists and carries container patterns; otherwise the first
/// static adapter whose suffix matches. Store failures degrade to the
/// static table.
pub fn adapter_for_host(host: &str, store: &RuleStore) -> Option<DomainAdapter> {
    let lowered = host.trim().to_lowercase();
    if lowered.is_empty() {
        return None;
    }

    match store.promoted_adapter_for_host(&lowered) {
        Ok(Some(promoted)) => {
            if !promoted.container_regexes.is_empty() {
                let name = if promoted.name.is_empty() {
                    format!("llm-promoted:{lowered}")
                } else {
                    promoted.name
                };
                let host_suffixes = if promoted.host_suffixes.is_empty() {
                    vec![lowered.clone()]
                } else {
                    promoted.host_suffixes
                };
                return Some(DomainAdapter {
                    name,
                    host_suffixes,
                    html_container_patterns: promoted.container_regexes,
                    drop_text_patterns: promoted.drop_text_patterns,
                });
            }
        }
        Ok(None) => {}
        Err(err) => {
            warn!(host = %lowered, error = %err, "promoted adapter lookup failed, using static table");
        }
    }

    ADAPTERS
        .iter()
        .find(|adapter| {
            adapter
                .host_suffixes
                .iter()
                .any(|suffix| lowered.ends_with(suffix.as_str()))
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PromotedAdapter;
    use longform_types::StoreConfig;

    fn empty_store(dir: &tempfile::TempDir) -> RuleStore {
        RuleStore::new(StoreConfig {
            path: dir.path().join("rules.json"),
            ..StoreConfig::default()
        })
    }

    #[test]
    fn static_adapters_match_by_host_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir);
        assert_eq!(
            adapter_for_host("medium.com", &store).unwrap().name,
            "medium"
        );
        assert_eq!(
            adapter_for_host("blog.medium.com", &store).unwrap().name,
            "medium"
        );
        assert_eq!(
            adapter_for_host("news.substack.com", &store).unwrap().name,
            "substack"
        );
        assert!(adapter_for_host("example.com", &store).is_none());
    }

    #[test]
    fn promoted_adapter_takes_precedence_over_static_table() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir);
        store
            .save_promoted_adapter(
                "medium.com",
                PromotedAdapter {
                    name: "llm-promoted:medium.com".into(),
                    host_suffixes: vec!["medium.com".into()],
                    container_regexes: vec![r"<section[^>]*>(.*?)</section>".into()],
                    ..PromotedAdapter::default()
                },
            )
            .unwrap();

        let adapter = adapter_for_host("medium.com", &store).unwrap();
        assert_eq!(adapter.name, "llm-promoted:medium.com");
        assert_eq!(adapter.html_container_patterns.len(), 1);
    }

    #[test]
    fn promoted_adapter_without_patterns_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = empty_store(&dir);
        store
            .save_promoted_adapter(
                "medium.com",
                PromotedAdapter {
                    name: "llm-promoted:medium.com".into(),
                    ..PromotedAdapter::default()
                },
            )
            .unwrap();

        assert_eq!(
            adapter_for_host("medium.com", &store).unwrap().name,
            "medium"
        );
    }
}
