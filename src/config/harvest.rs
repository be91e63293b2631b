// src/config/harvest.rs
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ingest::fetch::RetryPolicy;
use crate::ingest::profiles::{self, IdentityProfile, DEFAULT_PROFILE};
use crate::ingest::types::Source;
use crate::ingest::ChildSitemapPolicy;
use crate::rolling::{RetentionMode, RetentionPolicy, DEFAULT_WINDOW_DAYS};

pub const ENV_CONFIG_PATH: &str = "HARVEST_CONFIG_PATH";
pub const DEFAULT_TOML_PATH: &str = "config/harvest.toml";
pub const DEFAULT_JSON_PATH: &str = "config/harvest.json";

fn default_history_path() -> PathBuf {
    PathBuf::from("data/master_data.csv")
}
fn default_daily_dir() -> PathBuf {
    PathBuf::from("data/daily")
}
fn default_window_days() -> u32 {
    DEFAULT_WINDOW_DAYS
}
fn default_timeout_secs() -> u64 {
    25
}
fn default_max_attempts() -> u32 {
    3
}
fn default_backoff_base_ms() -> u64 {
    500
}
fn default_backoff_max_ms() -> u64 {
    8_000
}
fn default_concurrency() -> usize {
    4
}
fn default_follow() -> bool {
    true
}
fn default_max_children() -> usize {
    25
}
fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HarvestConfig {
    #[serde(default = "default_history_path")]
    pub history_path: PathBuf,
    #[serde(default = "default_daily_dir")]
    pub daily_dir: PathBuf,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    /// Custom identity profiles; may shadow the built-ins.
    #[serde(default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
    pub sources: Vec<SourceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetentionConfig {
    #[serde(default)]
    pub mode: RetentionMode,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            mode: RetentionMode::Archival,
            window_days: default_window_days(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Sources fetched in parallel.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_follow")]
    pub follow_sitemap_index: bool,
    #[serde(default = "default_max_children")]
    pub max_child_sitemaps: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_attempts: default_max_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_max_ms: default_backoff_max_ms(),
            concurrency: default_concurrency(),
            follow_sitemap_index: default_follow(),
            max_child_sitemaps: default_max_children(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub user_agent: Option<String>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub name: String,
    pub url: String,
    #[serde(default = "default_profile")]
    pub profile: String,
}

impl HarvestConfig {
    /// Load from an explicit path. Supports TOML or JSON formats.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading harvest config from {}", path.display()))?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let cfg = parse_config(&content, ext.as_str())
            .with_context(|| format!("parsing {}", path.display()))?;
        cfg.sanitized().validate()
    }

    /// Load using env var + fallbacks:
    /// 1) $HARVEST_CONFIG_PATH
    /// 2) config/harvest.toml
    /// 3) config/harvest.json
    pub fn load_default() -> Result<Self> {
        if let Ok(p) = std::env::var(ENV_CONFIG_PATH) {
            let pb = PathBuf::from(p);
            if pb.exists() {
                return Self::load_from(&pb);
            }
            bail!("{ENV_CONFIG_PATH} points to non-existent path {}", pb.display());
        }
        for candidate in [DEFAULT_TOML_PATH, DEFAULT_JSON_PATH] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Err(anyhow!(
            "no harvest config found (set {ENV_CONFIG_PATH} or create {DEFAULT_TOML_PATH})"
        ))
    }

    fn sanitized(mut self) -> Self {
        self.fetch.concurrency = self.fetch.concurrency.max(1);
        self.fetch.max_attempts = self.fetch.max_attempts.max(1);
        self.fetch.timeout_secs = self.fetch.timeout_secs.max(1);
        if self.fetch.backoff_max_ms < self.fetch.backoff_base_ms {
            self.fetch.backoff_max_ms = self.fetch.backoff_base_ms;
        }
        for s in &mut self.sources {
            s.name = s.name.trim().to_string();
            s.url = s.url.trim().to_string();
            s.profile = s.profile.trim().to_string();
        }
        self
    }

    fn validate(self) -> Result<Self> {
        if self.sources.is_empty() {
            bail!("config lists no sources");
        }
        let mut seen = HashSet::new();
        for s in &self.sources {
            if s.name.is_empty() {
                bail!("source with url {:?} has an empty name", s.url);
            }
            if !seen.insert(s.name.to_ascii_lowercase()) {
                bail!("duplicate source name {:?}", s.name);
            }
            if s.url.is_empty() {
                bail!("source {:?} has an empty url", s.name);
            }
        }
        if self.retention.mode == RetentionMode::Rolling && self.retention.window_days == 0 {
            bail!("rolling retention needs window_days >= 1");
        }
        // Surfaces unknown profiles and bad header values at load time.
        self.resolve_sources()?;
        Ok(self)
    }

    pub fn resolve_profile(&self, name: &str) -> Result<IdentityProfile> {
        if let Some(custom) = self.profiles.get(name) {
            return IdentityProfile::from_parts(name, custom.user_agent.as_deref(), &custom.headers);
        }
        profiles::builtin(name).ok_or_else(|| anyhow!("unknown identity profile {name:?}"))
    }

    /// Immutable runtime sources, in configured order.
    pub fn resolve_sources(&self) -> Result<Vec<Source>> {
        self.sources
            .iter()
            .map(|s| {
                let profile = self
                    .resolve_profile(&s.profile)
                    .with_context(|| format!("source {:?}", s.name))?;
                Ok(Source::new(&s.name, &s.url).with_profile(profile))
            })
            .collect()
    }

    pub fn retention_policy(&self) -> RetentionPolicy {
        RetentionPolicy {
            mode: self.retention.mode,
            window_days: self.retention.window_days,
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.fetch.max_attempts,
            base_delay: Duration::from_millis(self.fetch.backoff_base_ms),
            max_delay: Duration::from_millis(self.fetch.backoff_max_ms),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.fetch.timeout_secs)
    }

    pub fn child_policy(&self) -> ChildSitemapPolicy {
        ChildSitemapPolicy {
            follow: self.fetch.follow_sitemap_index,
            max_children: self.fetch.max_child_sitemaps,
        }
    }
}

fn parse_config(s: &str, hint_ext: &str) -> Result<HarvestConfig> {
    match hint_ext {
        "toml" => Ok(toml::from_str(s)?),
        "json" => Ok(serde_json::from_str(s)?),
        // No usable extension: JSON documents start with '{'.
        _ if s.trim_start().starts_with('{') => Ok(serde_json::from_str(s)?),
        _ => Ok(toml::from_str(s)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{env, fs};

    const MINIMAL: &str = r#"
[[sources]]
name = "wsj"
url = "https://www.wsj.com/wsjsitemaps/wsj_google_news.xml"
"#;

    #[test]
    fn defaults_fill_everything_but_sources() {
        let cfg = parse_config(MINIMAL, "toml").unwrap().sanitized().validate().unwrap();
        assert_eq!(cfg.history_path, PathBuf::from("data/master_data.csv"));
        assert_eq!(cfg.daily_dir, PathBuf::from("data/daily"));
        assert_eq!(cfg.retention.mode, RetentionMode::Archival);
        assert_eq!(cfg.retention.window_days, 30);
        assert_eq!(cfg.fetch.max_attempts, 3);
        assert_eq!(cfg.sources[0].profile, "default");
        assert_eq!(cfg.retry_policy().base_delay, Duration::from_millis(500));
    }

    #[test]
    fn duplicate_names_and_unknown_profiles_are_rejected() {
        let dup = r#"
[[sources]]
name = "wsj"
url = "https://a.test/1.xml"
[[sources]]
name = "WSJ"
url = "https://a.test/2.xml"
"#;
        let err = parse_config(dup, "toml").unwrap().sanitized().validate();
        assert!(err.unwrap_err().to_string().contains("duplicate"));

        let unknown = r#"
[[sources]]
name = "wsj"
url = "https://a.test/1.xml"
profile = "netscape"
"#;
        let err = parse_config(unknown, "toml").unwrap().sanitized().validate();
        assert!(format!("{:#}", err.unwrap_err()).contains("netscape"));
    }

    #[test]
    fn custom_profile_shadows_builtin() {
        let s = r#"
[profiles.browser]
user_agent = "custom-agent/2"

[[sources]]
name = "forbes"
url = "https://a.test/forbes.xml"
profile = "browser"
"#;
        let cfg = parse_config(s, "toml").unwrap().sanitized().validate().unwrap();
        let sources = cfg.resolve_sources().unwrap();
        assert_eq!(sources[0].profile.user_agent(), Some("custom-agent/2"));
    }

    #[test]
    fn json_without_extension_is_sniffed() {
        let s = r#"{"sources":[{"name":"ft","url":"https://a.test/ft.xml","profile":"googlebot"}],
                    "retention":{"mode":"rolling","window_days":7},
                    "fetch":{"concurrency":0}}"#;
        let cfg = parse_config(s, "").unwrap().sanitized().validate().unwrap();
        assert_eq!(cfg.retention_policy(), RetentionPolicy::rolling(7));
        assert_eq!(cfg.fetch.concurrency, 1);
    }

    #[serial_test::serial]
    #[test]
    fn default_uses_env_then_fallbacks() {
        // Isolate CWD in a temp dir so the repo's own config/ is not read.
        let old = env::current_dir().unwrap();
        let tmp = tempfile::tempdir().unwrap();
        env::set_current_dir(tmp.path()).unwrap();

        env::remove_var(ENV_CONFIG_PATH);
        assert!(HarvestConfig::load_default().is_err());

        fs::create_dir_all(tmp.path().join("config")).unwrap();
        fs::write(tmp.path().join(DEFAULT_TOML_PATH), MINIMAL).unwrap();
        let cfg = HarvestConfig::load_default().unwrap();
        assert_eq!(cfg.sources[0].name, "wsj");

        let p_json = tmp.path().join("elsewhere.json");
        fs::write(&p_json, r#"{"sources":[{"name":"X","url":"https://x.test/"}]}"#).unwrap();
        env::set_var(ENV_CONFIG_PATH, p_json.display().to_string());
        let cfg = HarvestConfig::load_default().unwrap();
        assert_eq!(cfg.sources[0].name, "X");

        env::set_var(ENV_CONFIG_PATH, tmp.path().join("nope.toml").display().to_string());
        assert!(HarvestConfig::load_default().is_err());
        env::remove_var(ENV_CONFIG_PATH);

        env::set_current_dir(&old).unwrap();
    }
}
