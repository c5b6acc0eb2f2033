//! Env-driven configuration with safe defaults
//!
//! Every knob has a `LONGFORM_`-prefixed environment override; invalid
//! values are logged and fall back to the default rather than failing.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracing::warn;

fn env_string(name: &str, default: &str) -> String {
    env::var(name).ok().filter(|v| !v.trim().is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_usize(name: &str, default: usize) -> usize {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(%name, value = %raw, %default, "invalid integer override, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_u64(name: &str, default: u64) -> u64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(%name, value = %raw, %default, "invalid integer override, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_f64(name: &str, default: f64) -> f64 {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(%name, value = %raw, %default, "invalid float override, using default");
            default
        }),
        Err(_) => default,
    }
}

fn env_bool(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(raw) => matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Orchestrator thresholds and per-request budgets.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Early-stop bar: a candidate at or above this score ends the race.
    pub acceptance_threshold: f64,
    /// Minimum publishable bar for the best candidate.
    pub minimum_acceptable_score: f64,
    pub timeout: Duration,
    pub max_chars: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.78,
            minimum_acceptable_score: 0.55,
            timeout: Duration::from_secs(30),
            max_chars: 120_000,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            acceptance_threshold: env_f64(
                "LONGFORM_ACCEPTANCE_THRESHOLD",
                defaults.acceptance_threshold,
            ),
            minimum_acceptable_score: env_f64(
                "LONGFORM_MIN_ACCEPTABLE_SCORE",
                defaults.minimum_acceptable_score,
            ),
            timeout: Duration::from_secs(env_u64("LONGFORM_TIMEOUT_SECONDS", 30)),
            max_chars: env_usize("LONGFORM_MAX_CHARS", defaults.max_chars),
        }
    }
}

/// LLM adaptive rule synthesis knobs.
#[derive(Debug, Clone)]
pub struct AdaptiveConfig {
    pub enabled: bool,
    pub model: String,
    pub timeout: Duration,
    pub max_html_chars: usize,
    pub min_confidence: f64,
    pub cache_size: usize,
    pub cache_ttl: Duration,
}

impl Default for AdaptiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-2.5-flash".into(),
            timeout: Duration::from_millis(20_000),
            max_html_chars: 80_000,
            min_confidence: 0.45,
            cache_size: 200,
            cache_ttl: Duration::from_secs(86_400),
        }
    }
}

impl AdaptiveConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("LONGFORM_LLM_ADAPTER_ENABLED", defaults.enabled),
            model: env_string("LONGFORM_RULE_MODEL", &defaults.model),
            timeout: Duration::from_millis(env_u64("LONGFORM_RULE_TIMEOUT_MS", 20_000)),
            max_html_chars: env_usize("LONGFORM_RULE_MAX_HTML_CHARS", defaults.max_html_chars),
            min_confidence: env_f64("LONGFORM_RULE_MIN_CONFIDENCE", defaults.min_confidence),
            cache_size: env_usize("LONGFORM_RULE_CACHE_SIZE", defaults.cache_size),
            cache_ttl: Duration::from_secs(env_u64("LONGFORM_RULE_CACHE_TTL_SECONDS", 86_400)),
        }
    }
}

/// Promotion thresholds for certifying learned rules as adapters.
#[derive(Debug, Clone)]
pub struct PromotionConfig {
    pub enabled: bool,
    pub min_samples: usize,
    pub max_samples: usize,
    pub min_success_rate: f64,
    pub min_avg_score: f64,
    pub min_sample_score: f64,
}

impl Default for PromotionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_samples: 3,
            max_samples: 6,
            min_success_rate: 0.80,
            min_avg_score: 0.72,
            min_sample_score: 0.60,
        }
    }
}

impl PromotionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            enabled: env_bool("LONGFORM_PROMOTION_ENABLED", defaults.enabled),
            min_samples: env_usize("LONGFORM_PROMOTION_MIN_SAMPLES", defaults.min_samples),
            max_samples: env_usize("LONGFORM_PROMOTION_MAX_SAMPLES", defaults.max_samples),
            min_success_rate: env_f64(
                "LONGFORM_PROMOTION_MIN_SUCCESS_RATE",
                defaults.min_success_rate,
            ),
            min_avg_score: env_f64("LONGFORM_PROMOTION_MIN_AVG_SCORE", defaults.min_avg_score),
            min_sample_score: env_f64(
                "LONGFORM_PROMOTION_MIN_SAMPLE_SCORE",
                defaults.min_sample_score,
            ),
        }
    }
}

/// URL safety allow-list for private-range DNS resolutions.
#[derive(Debug, Clone)]
pub struct SafetyConfig {
    /// CIDRs whose addresses are accepted even though they are non-public.
    pub allowed_private_cidrs: Vec<String>,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            allowed_private_cidrs: vec!["198.18.0.0/15".into()],
        }
    }
}

impl SafetyConfig {
    pub fn from_env() -> Self {
        match env::var("LONGFORM_ALLOWED_PRIVATE_CIDRS") {
            Ok(raw) => {
                let cidrs: Vec<String> = raw
                    .split(',')
                    .map(|item| item.trim().to_string())
                    .filter(|item| !item.is_empty())
                    .collect();
                if cidrs.is_empty() {
                    Self::default()
                } else {
                    Self {
                        allowed_private_cidrs: cidrs,
                    }
                }
            }
            Err(_) => Self::default(),
        }
    }
}

/// Rule store location and replay-sample bounds.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub replay_max_samples: usize,
    pub replay_max_chars: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".state/web_extract_rules.json"),
            replay_max_samples: 20,
            replay_max_chars: 120_000,
        }
    }
}

impl StoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            path: env::var("LONGFORM_RULE_STORE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.path),
            replay_max_samples: env_usize(
                "LONGFORM_REPLAY_MAX_SAMPLES",
                defaults.replay_max_samples,
            ),
            replay_max_chars: env_usize("LONGFORM_REPLAY_MAX_HTML_CHARS", defaults.replay_max_chars),
        }
    }
}
