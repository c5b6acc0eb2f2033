//! JSON-on-disk rule state under an exclusive file lock
//!
//! The store file is the single consistency root shared by concurrent
//! workers: every read and mutation runs as a locked read-modify-write so
//! no update is lost between peers. Empty or corrupt content reinitializes
//! to defaults instead of failing.

use std::collections::BTreeMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use longform_types::{ExtractError, Result, StoreConfig};

/// A host-specific extraction recipe learned from the LLM oracle.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AdaptiveRule {
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub container_regexes: Vec<String>,
    #[serde(default)]
    pub drop_text_patterns: Vec<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub generated_at: f64,
}

/// Replay-evaluation outcome attached to a promoted adapter.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromotionEvaluation {
    pub promoted: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub sample_count: usize,
    #[serde(default)]
    pub successful: usize,
    #[serde(default)]
    pub errors: usize,
    #[serde(default)]
    pub success_rate: f64,
    #[serde(default)]
    pub avg_score: f64,
    #[serde(default)]
    pub evaluated_at: f64,
}

/// A learned rule certified as a first-class adapter for its host.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PromotedAdapter {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub host_suffixes: Vec<String>,
    #[serde(default)]
    pub container_regexes: Vec<String>,
    #[serde(default)]
    pub drop_text_patterns: Vec<String>,
    #[serde(default)]
    pub source_model: String,
    #[serde(default)]
    pub source_confidence: f64,
    #[serde(default)]
    pub generated_at: f64,
    #[serde(default)]
    pub promoted_at: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation: Option<PromotionEvaluation>,
}

/// One captured page used to evaluate a learned rule before promotion.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ReplaySample {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub content_type: String,
    #[serde(default)]
    pub payload: String,
    #[serde(default)]
    pub captured_at: f64,
}

fn default_version() -> u32 {
    1
}

/// The full on-disk schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreState {
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(default)]
    pub generated_rules: BTreeMap<String, AdaptiveRule>,
    #[serde(default)]
    pub promoted_adapters: BTreeMap<String, PromotedAdapter>,
    #[serde(default)]
    pub replay_samples: BTreeMap<String, Vec<ReplaySample>>,
}

impl Default for StoreState {
    fn default() -> Self {
        Self {
            version: 1,
            generated_rules: BTreeMap::new(),
            promoted_adapters: BTreeMap::new(),
            replay_samples: BTreeMap::new(),
        }
    }
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}

fn normalize_host(host: &str) -> String {
    host.trim().to_lowercase()
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        text.chars().take(max_chars).collect()
    }
}

struct FileLockGuard<'a> {
    file: &'a File,
}

impl Drop for FileLockGuard<'_> {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

/// The persistent rule store over one JSON file.
pub struct RuleStore {
    path: PathBuf,
    replay_max_samples: usize,
    replay_max_chars: usize,
}

impl RuleStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            path: config.path,
            replay_max_samples: config.replay_max_samples,
            replay_max_chars: config.replay_max_chars,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_locked_state<T>(
        &self,
        persist: bool,
        mutate: impl FnOnce(&mut StoreState) -> T,
    ) -> Result<T> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(ExtractError::store_io)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
            .map_err(ExtractError::store_io)?;
        file.lock_exclusive().map_err(ExtractError::store_io)?;
        let _guard = FileLockGuard { file: &file };

        let mut raw = String::new();
        (&file)
            .read_to_string(&mut raw)
            .map_err(ExtractError::store_io)?;
        let mut state: StoreState = if raw.trim().is_empty() {
            StoreState::default()
        } else {
            serde_json::from_str(&raw).unwrap_or_default()
        };

        let outcome = mutate(&mut state);

        if persist {
            let serialized = serde_json::to_string(&state).map_err(ExtractError::store_io)?;
            (&file)
                .seek(SeekFrom::Start(0))
                .map_err(ExtractError::store_io)?;
            file.set_len(0).map_err(ExtractError::store_io)?;
            (&file)
                .write_all(serialized.as_bytes())
                .map_err(ExtractError::store_io)?;
            file.sync_all().map_err(ExtractError::store_io)?;
        }
        Ok(outcome)
    }

    /// Snapshot of the full state, taken under the lock.
    pub fn read_state(&self) -> Result<StoreState> {
        self.with_locked_state(false, |state| state.clone())
    }

    pub fn generated_rule(&self, host: &str) -> Result<Option<AdaptiveRule>> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(None);
        }
        self.with_locked_state(false, |state| state.generated_rules.get(&lowered).cloned())
    }

    pub fn save_generated_rule(&self, host: &str, rule: &AdaptiveRule) -> Result<()> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(());
        }
        let mut payload = rule.clone();
        payload.host = lowered.clone();
        if payload.generated_at <= 0.0 {
            payload.generated_at = now_epoch();
        }
        self.with_locked_state(true, |state| {
            state.generated_rules.insert(lowered, payload);
        })
    }

    pub fn save_promoted_adapter(&self, host: &str, adapter: PromotedAdapter) -> Result<()> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(());
        }
        let mut payload = adapter;
        payload.host = lowered.clone();
        if payload.promoted_at <= 0.0 {
            payload.promoted_at = now_epoch();
        }
        self.with_locked_state(true, |state| {
            state.promoted_adapters.insert(lowered, payload);
        })
    }

    /// Promoted adapter for the host, by exact key or parent-domain suffix.
    pub fn promoted_adapter_for_host(&self, host: &str) -> Result<Option<PromotedAdapter>> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(None);
        }
        self.with_locked_state(false, |state| {
            if let Some(direct) = state.promoted_adapters.get(&lowered) {
                return Some(direct.clone());
            }
            state
                .promoted_adapters
                .iter()
                .find(|(key, _)| lowered == **key || lowered.ends_with(&format!(".{key}")))
                .map(|(_, value)| value.clone())
        })
    }

    pub fn record_replay_sample(
        &self,
        host: &str,
        url: &str,
        content_type: &str,
        payload: &str,
    ) -> Result<()> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(());
        }
        let sample = ReplaySample {
            url: url.to_string(),
            content_type: content_type.to_string(),
            payload: truncate_chars(payload, self.replay_max_chars),
            captured_at: now_epoch(),
        };
        let max_samples = self.replay_max_samples;
        self.with_locked_state(true, |state| {
            let samples = state.replay_samples.entry(lowered).or_default();
            samples.push(sample);
            if samples.len() > max_samples {
                let excess = samples.len() - max_samples;
                samples.drain(0..excess);
            }
        })
    }

    /// The newest `limit` samples for the host, oldest first.
    pub fn replay_samples(&self, host: &str, limit: Option<usize>) -> Result<Vec<ReplaySample>> {
        let lowered = normalize_host(host);
        if lowered.is_empty() {
            return Ok(Vec::new());
        }
        self.with_locked_state(false, |state| {
            let samples = state
                .replay_samples
                .get(&lowered)
                .cloned()
                .unwrap_or_default();
            match limit {
                Some(limit) if limit > 0 && samples.len() > limit => {
                    samples[samples.len() - limit..].to_vec()
                }
                _ => samples,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn store_in(dir: &tempfile::TempDir) -> RuleStore {
        RuleStore::new(StoreConfig {
            path: dir.path().join("web_rules.json"),
            replay_max_samples: 20,
            replay_max_chars: 120_000,
        })
    }

    fn sample_rule(host: &str) -> AdaptiveRule {
        AdaptiveRule {
            host: host.into(),
            container_regexes: vec![r"<article[^>]*>(.*?)</article>".into()],
            drop_text_patterns: vec!["subscribe now".into()],
            confidence: 0.88,
            model: "gemini-test".into(),
            generated_at: 123.0,
        }
    }

    #[test]
    fn generated_rule_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.save_generated_rule("Example.COM", &sample_rule("example.com")).unwrap();

        let loaded = store.generated_rule("example.com").unwrap().unwrap();
        assert_eq!(loaded.model, "gemini-test");
        assert_eq!(loaded.confidence, 0.88);
        assert_eq!(loaded.generated_at, 123.0);
        assert!(store.generated_rule("other.com").unwrap().is_none());
    }

    #[test]
    fn corrupt_store_reinitializes_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not valid json").unwrap();

        let state = store.read_state().unwrap();
        assert_eq!(state.version, 1);
        assert!(state.generated_rules.is_empty());

        // A following write recovers the file.
        store.save_generated_rule("example.com", &sample_rule("example.com")).unwrap();
        assert!(store.generated_rule("example.com").unwrap().is_some());
    }

    #[test]
    fn promoted_adapter_supports_suffix_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save_promoted_adapter(
                "example.com",
                PromotedAdapter {
                    name: "llm-promoted:example.com".into(),
                    host_suffixes: vec!["example.com".into()],
                    container_regexes: vec![r"<article[^>]*>(.*?)</article>".into()],
                    ..PromotedAdapter::default()
                },
            )
            .unwrap();

        assert!(store
            .promoted_adapter_for_host("example.com")
            .unwrap()
            .is_some());
        let via_subdomain = store
            .promoted_adapter_for_host("blog.example.com")
            .unwrap()
            .unwrap();
        assert_eq!(via_subdomain.name, "llm-promoted:example.com");
        assert!(store
            .promoted_adapter_for_host("notexample.com")
            .unwrap()
            .is_none());
    }

    #[test]
    fn replay_samples_are_bounded_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let store = RuleStore::new(StoreConfig {
            path: dir.path().join("web_rules.json"),
            replay_max_samples: 3,
            replay_max_chars: 16,
        });

        for index in 0..5 {
            store
                .record_replay_sample(
                    "example.com",
                    &format!("https://example.com/post-{index}"),
                    "text/html",
                    "a long payload that exceeds the configured cap",
                )
                .unwrap();
        }

        let samples = store.replay_samples("example.com", None).unwrap();
        assert_eq!(samples.len(), 3);
        assert!(samples[0].url.ends_with("post-2"));
        assert!(samples[2].url.ends_with("post-4"));
        assert_eq!(samples[0].payload.chars().count(), 16);
        assert!(samples[0].captured_at > 0.0);

        let limited = store.replay_samples("example.com", Some(2)).unwrap();
        assert_eq!(limited.len(), 2);
        assert!(limited[1].url.ends_with("post-4"));
    }

    #[test]
    fn concurrent_writers_lose_no_updates() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(store_in(&dir));

        let mut handles = Vec::new();
        for writer in 0..4 {
            let store = store.clone();
            handles.push(std::thread::spawn(move || {
                for index in 0..5 {
                    store
                        .record_replay_sample(
                            &format!("host-{writer}.example.com"),
                            &format!("https://host-{writer}.example.com/{index}"),
                            "text/html",
                            "payload",
                        )
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        for writer in 0..4 {
            let samples = store
                .replay_samples(&format!("host-{writer}.example.com"), None)
                .unwrap();
            assert_eq!(samples.len(), 5);
        }
    }
}
