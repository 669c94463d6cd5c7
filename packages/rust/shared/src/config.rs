//! Application configuration for FeedScout.
//!
//! User config lives at `~/.feedscout/feedscout.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{FeedScoutError, Result};
use crate::types::Seed;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "feedscout.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".feedscout";

/// Default validation store file name inside the config directory.
const STORE_FILE_NAME: &str = "store.json";

// ---------------------------------------------------------------------------
// Config structs (matching feedscout.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub validation: ValidationConfig,

    #[serde(default)]
    pub trust: TrustConfig,

    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Static hint seeds.
    #[serde(default)]
    pub seeds: Vec<Seed>,
}

/// `[run]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Size of the validate/retrieve worker pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Run-level deadline covering validation and retrieval.
    #[serde(default = "default_run_timeout")]
    pub timeout_secs: u64,

    /// Upper bound on candidates emitted by discovery.
    #[serde(default = "default_max_candidates")]
    pub max_candidates: usize,

    /// Validation store path. Defaults to `~/.feedscout/store.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            timeout_secs: default_run_timeout(),
            max_candidates: default_max_candidates(),
            store_path: None,
        }
    }
}

fn default_workers() -> usize {
    4
}
fn default_run_timeout() -> u64 {
    600
}
fn default_max_candidates() -> usize {
    500
}

/// `[fetch]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout.
    #[serde(default = "default_fetch_timeout")]
    pub timeout_secs: u64,

    /// Minimum ms between requests to the same host.
    #[serde(default = "default_rate_limit")]
    pub rate_limit_ms: u64,

    /// Responses larger than this are refused.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Allow fetching loopback/private addresses (tests and local mirrors).
    #[serde(default)]
    pub allow_private_hosts: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_fetch_timeout(),
            rate_limit_ms: default_rate_limit(),
            max_body_bytes: default_max_body_bytes(),
            allow_private_hosts: false,
            user_agent: default_user_agent(),
        }
    }
}

fn default_fetch_timeout() -> u64 {
    30
}
fn default_rate_limit() -> u64 {
    500
}
fn default_max_body_bytes() -> usize {
    5 * 1024 * 1024
}
fn default_user_agent() -> String {
    format!("FeedScout/{}", env!("CARGO_PKG_VERSION"))
}

/// `[validation]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationConfig {
    /// Minimum normalized body length, in characters.
    #[serde(default = "default_min_content_chars")]
    pub min_content_chars: usize,

    /// Fetch attempts per candidate before a transient failure becomes a reject.
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,

    /// Base backoff between retries; doubled on every attempt.
    #[serde(default = "default_retry_backoff")]
    pub retry_backoff_ms: u64,

    /// Minimum share of alphabetic characters in the expected script for Indic tags.
    #[serde(default = "default_min_script_ratio")]
    pub min_script_ratio: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_content_chars: default_min_content_chars(),
            retry_budget: default_retry_budget(),
            retry_backoff_ms: default_retry_backoff(),
            min_script_ratio: default_min_script_ratio(),
        }
    }
}

fn default_min_content_chars() -> usize {
    200
}
fn default_retry_budget() -> u32 {
    3
}
fn default_retry_backoff() -> u64 {
    250
}
fn default_min_script_ratio() -> f64 {
    0.2
}

/// `[trust]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustConfig {
    /// Smoothing factor for the trust update, in `(0, 1]`.
    #[serde(default = "default_alpha")]
    pub alpha: f64,

    /// Promotion threshold.
    #[serde(default = "default_upper")]
    pub upper: f64,

    /// Demotion threshold for trusted sources.
    #[serde(default = "default_lower")]
    pub lower: f64,

    /// Consecutive failing runs before quarantine.
    #[serde(default = "default_quarantine_ceiling")]
    pub quarantine_ceiling: u32,

    /// Consecutive failing runs before a quarantined source is rejected for good.
    #[serde(default = "default_reject_ceiling")]
    pub reject_ceiling: u32,

    /// Outcomes kept per source in the store's log.
    #[serde(default = "default_outcome_window")]
    pub outcome_window: usize,

    /// Runs after its last check before an excluded quarantined source is put on probation.
    /// `0` disables automatic probation.
    #[serde(default = "default_probation_interval")]
    pub probation_interval_runs: u64,
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            alpha: default_alpha(),
            upper: default_upper(),
            lower: default_lower(),
            quarantine_ceiling: default_quarantine_ceiling(),
            reject_ceiling: default_reject_ceiling(),
            outcome_window: default_outcome_window(),
            probation_interval_runs: default_probation_interval(),
        }
    }
}

fn default_alpha() -> f64 {
    0.3
}
fn default_upper() -> f64 {
    0.7
}
fn default_lower() -> f64 {
    0.3
}
fn default_quarantine_ceiling() -> u32 {
    3
}
fn default_reject_ceiling() -> u32 {
    10
}
fn default_outcome_window() -> usize {
    20
}
fn default_probation_interval() -> u64 {
    5
}

/// `[discovery]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Publisher templates expanded over language editions.
    #[serde(default)]
    pub patterns: Vec<PatternConfig>,

    /// Patterns accepted below this rate in a run are cooled down.
    #[serde(default = "default_acceptance_floor")]
    pub acceptance_floor: f64,

    /// Outcomes a pattern needs in one run before the floor applies.
    #[serde(default = "default_min_pattern_samples")]
    pub min_pattern_samples: usize,

    /// Runs a cooled-down pattern stays disabled.
    #[serde(default = "default_cooldown_runs")]
    pub cooldown_runs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            acceptance_floor: default_acceptance_floor(),
            min_pattern_samples: default_min_pattern_samples(),
            cooldown_runs: default_cooldown_runs(),
        }
    }
}

fn default_acceptance_floor() -> f64 {
    0.1
}
fn default_min_pattern_samples() -> usize {
    3
}
fn default_cooldown_runs() -> u64 {
    3
}

/// `[[discovery.patterns]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Stable id used to track the pattern's acceptance rate.
    pub id: String,
    /// URL template with `{edition}` and/or `{lang}` placeholders.
    pub template: String,
    #[serde(default = "default_pattern_category")]
    pub category: String,
    #[serde(default)]
    pub editions: Vec<Edition>,
}

fn default_pattern_category() -> String {
    "general".into()
}

/// One language edition of a publisher: the value substituted for `{edition}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Edition {
    pub code: String,
    pub language: String,
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Reject invalid thresholds before any work starts.
    pub fn validate(&self) -> Result<()> {
        let t = &self.trust;
        if !(t.alpha > 0.0 && t.alpha <= 1.0) {
            return Err(FeedScoutError::config(format!(
                "trust.alpha must be in (0, 1], got {}",
                t.alpha
            )));
        }
        if !(0.0..=1.0).contains(&t.lower) || !(0.0..=1.0).contains(&t.upper) {
            return Err(FeedScoutError::config(
                "trust.lower and trust.upper must be in [0, 1]",
            ));
        }
        if t.lower >= t.upper {
            return Err(FeedScoutError::config(format!(
                "trust.lower ({}) must be below trust.upper ({})",
                t.lower, t.upper
            )));
        }
        if t.quarantine_ceiling == 0 || t.reject_ceiling == 0 {
            return Err(FeedScoutError::config("trust ceilings must be at least 1"));
        }
        if t.reject_ceiling <= t.quarantine_ceiling {
            return Err(FeedScoutError::config(format!(
                "trust.reject_ceiling ({}) must exceed trust.quarantine_ceiling ({})",
                t.reject_ceiling, t.quarantine_ceiling
            )));
        }
        if t.outcome_window == 0 {
            return Err(FeedScoutError::config("trust.outcome_window must be at least 1"));
        }
        if self.run.workers == 0 {
            return Err(FeedScoutError::config("run.workers must be at least 1"));
        }
        if self.validation.retry_budget == 0 {
            return Err(FeedScoutError::config(
                "validation.retry_budget must be at least 1",
            ));
        }
        if !(0.0..=1.0).contains(&self.validation.min_script_ratio) {
            return Err(FeedScoutError::config(
                "validation.min_script_ratio must be in [0, 1]",
            ));
        }
        if !(0.0..=1.0).contains(&self.discovery.acceptance_floor) {
            return Err(FeedScoutError::config(
                "discovery.acceptance_floor must be in [0, 1]",
            ));
        }
        for pattern in &self.discovery.patterns {
            if !pattern.template.contains("{edition}") && !pattern.template.contains("{lang}") {
                return Err(FeedScoutError::config(format!(
                    "pattern '{}' has no {{edition}} or {{lang}} placeholder",
                    pattern.id
                )));
            }
            if pattern.editions.is_empty() {
                return Err(FeedScoutError::config(format!(
                    "pattern '{}' has no editions",
                    pattern.id
                )));
            }
        }
        Ok(())
    }

    /// Resolve the store path, falling back to the config directory.
    pub fn store_path(&self) -> Result<PathBuf> {
        match &self.run.store_path {
            Some(path) => Ok(path.clone()),
            None => Ok(config_dir()?.join(STORE_FILE_NAME)),
        }
    }

    /// Config written by `feedscout config init`: defaults plus a sample pattern and seed.
    pub fn sample() -> Self {
        Self {
            discovery: DiscoveryConfig {
                patterns: vec![PatternConfig {
                    id: "pib-releases".into(),
                    template: "https://pib.gov.in/RssMain.aspx?ModId=6&Lang={edition}&Regid=3"
                        .into(),
                    category: "government".into(),
                    editions: vec![
                        Edition {
                            code: "1".into(),
                            language: "en".into(),
                        },
                        Edition {
                            code: "2".into(),
                            language: "hi".into(),
                        },
                    ],
                }],
                ..DiscoveryConfig::default()
            },
            seeds: vec![Seed {
                url: "https://pib.gov.in/RssMain.aspx?ModId=1&Lang=1&Regid=3".into(),
                language: "en".into(),
                category: "government".into(),
            }],
            ..Self::default()
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.feedscout/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| FeedScoutError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.feedscout/feedscout.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| FeedScoutError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| FeedScoutError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a sample config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| FeedScoutError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let content = toml::to_string_pretty(&AppConfig::sample())
        .map_err(|e| FeedScoutError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| FeedScoutError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}
