use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::auth::{Credentials, Token};
use crate::jira::RetryPolicy;
use crate::sync::AmbiguityPolicy;

const FILE_STEM: &str = "jpd-sync";

/// Configuration file structure for jpd-sync.
///
/// Holds connection settings and tuning knobs so they don't have to be
/// passed on every run. Command-line flags and environment variables take
/// precedence over anything loaded here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub jira: JiraConfig,

    #[serde(default)]
    pub sync: SyncConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub bulk: BulkConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct JiraConfig {
    /// Jira instance base URL (e.g., 'https://example.atlassian.net')
    pub url: Option<String>,

    /// Account email for basic authentication
    pub email: Option<String>,

    /// API token paired with `email`
    pub api_token: Option<String>,

    /// Personal access token; takes precedence over email + API token
    pub bearer_token: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    /// Link type connecting ideas to delivery issues
    #[serde(default = "default_link_type")]
    pub link_type: String,

    /// Issue type name of Product Discovery ideas
    #[serde(default = "default_idea_issue_type")]
    pub idea_issue_type: String,

    /// What to do when an idea links to several delivery issues
    #[serde(default)]
    pub ambiguous_links: AmbiguityPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,

    /// Minimum spacing between consecutive requests
    #[serde(default = "default_min_interval_ms")]
    pub min_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct BulkConfig {
    /// Pause between ideas during a bulk run
    #[serde(default = "default_bulk_delay_ms")]
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,

    /// Pretty-print JSON output
    #[serde(default)]
    pub pretty: bool,

    /// Write an execution summary to this file, replacing any previous one
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Summary,
    Json,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            link_type: default_link_type(),
            idea_issue_type: default_idea_issue_type(),
            ambiguous_links: AmbiguityPolicy::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            min_interval_ms: default_min_interval_ms(),
        }
    }
}

impl Default for BulkConfig {
    fn default() -> Self {
        Self {
            delay_ms: default_bulk_delay_ms(),
        }
    }
}

fn default_link_type() -> String {
    "Polaris work item link".to_string()
}

fn default_idea_issue_type() -> String {
    "Idea".to_string()
}

fn default_max_attempts() -> u32 {
    5
}

fn default_base_delay_ms() -> u64 {
    1000
}

fn default_max_delay_ms() -> u64 {
    60_000
}

fn default_min_interval_ms() -> u64 {
    200
}

fn default_bulk_delay_ms() -> u64 {
    300
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }

    pub fn min_interval(&self) -> Duration {
        Duration::from_millis(self.min_interval_ms)
    }
}

impl BulkConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl JiraConfig {
    /// Builds credentials, preferring a bearer token when one is set.
    pub fn credentials(&self) -> Result<Credentials> {
        let Some(url) = self.url.as_deref().filter(|u| !u.trim().is_empty()) else {
            bail!("Jira URL is not configured (use --url, JIRA_URL or [jira] url)");
        };

        if let Some(token) = &self.bearer_token {
            return Ok(Credentials::bearer(url, Token::from(token.as_str())));
        }

        match (&self.email, &self.api_token) {
            (Some(email), Some(token)) => Ok(Credentials::basic(url, email, Token::from(token.as_str()))),
            (None, _) => bail!("Jira email is not configured (use --email, JIRA_EMAIL or [jira] email)"),
            (_, None) => bail!(
                "Jira API token is not configured (use --token, JIRA_API_TOKEN or [jira] api-token)"
            ),
        }
    }
}

impl Config {
    /// Load configuration from a file.
    ///
    /// Searches for configuration files in this order:
    /// 1. Specified path
    /// 2. ./jpd-sync.toml
    /// 3. ./jpd-sync.json
    /// 4. ./jpd-sync.yaml
    /// 5. ./jpd-sync.yml
    /// 6. `<config dir>/jpd-sync/config.toml`
    ///
    /// Returns default configuration if no file is found.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load_from_path(path);
        }

        for candidate in Self::candidates() {
            if candidate.exists() {
                log::debug!("Loading configuration from {}", candidate.display());
                return Self::load_from_path(&candidate);
            }
        }

        Ok(Self::default())
    }

    fn candidates() -> Vec<PathBuf> {
        let mut candidates: Vec<PathBuf> = ["toml", "json", "yaml", "yml"]
            .iter()
            .map(|ext| PathBuf::from(format!("{FILE_STEM}.{ext}")))
            .collect();
        if let Some(dir) = dirs::config_dir() {
            candidates.push(dir.join(FILE_STEM).join("config.toml"));
        }
        candidates
    }

    /// Load configuration from a specific file path.
    fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        match extension {
            "toml" => toml::from_str(&contents)
                .with_context(|| format!("Failed to parse TOML config: {}", path.display())),
            "json" => serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display())),
            "yaml" | "yml" => serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display())),
            _ => toml::from_str(&contents)
                .or_else(|_| serde_json::from_str(&contents))
                .or_else(|_| serde_yaml::from_str(&contents))
                .with_context(|| format!("Failed to parse config file: {}", path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Auth;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.sync.link_type, "Polaris work item link");
        assert_eq!(config.sync.idea_issue_type, "Idea");
        assert_eq!(config.sync.ambiguous_links, AmbiguityPolicy::Skip);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.retry.min_interval(), Duration::from_millis(200));
        assert_eq!(config.bulk.delay(), Duration::from_millis(300));
        assert_eq!(config.output.format, OutputFormat::Summary);
    }

    #[test]
    fn test_load_toml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".toml").unwrap();
        let toml_content = r#"
[jira]
url = "https://example.atlassian.net"
email = "pm@example.com"
api-token = "secret"

[sync]
ambiguous-links = "warn"

[retry]
max-attempts = 3
base-delay-ms = 500

[bulk]
delay-ms = 1000
"#;
        write!(temp_file, "{}", toml_content).unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.jira.url.as_deref(), Some("https://example.atlassian.net"));
        assert_eq!(config.sync.ambiguous_links, AmbiguityPolicy::Warn);
        assert_eq!(config.sync.link_type, "Polaris work item link");

        let policy = config.retry.policy();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.base_delay, Duration::from_millis(500));
        assert_eq!(policy.max_delay, Duration::from_secs(60));
        assert_eq!(config.bulk.delay(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_yaml_config() {
        let mut temp_file = NamedTempFile::with_suffix(".yaml").unwrap();
        let yaml_content = r#"
jira:
  url: https://jira.example.com
  bearer-token: pat-123
output:
  format: json
  pretty: true
"#;
        write!(temp_file, "{}", yaml_content).unwrap();

        let config = Config::load(Some(temp_file.path())).unwrap();
        assert_eq!(config.output.format, OutputFormat::Json);
        assert!(config.output.pretty);

        let credentials = config.jira.credentials().unwrap();
        assert!(matches!(credentials.auth, Auth::Bearer(_)));
    }

    #[test]
    fn test_explicit_missing_path_is_an_error() {
        let err = Config::load(Some(Path::new("does-not-exist.toml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_credentials_require_url_and_secret() {
        let mut jira = JiraConfig::default();
        assert!(jira.credentials().unwrap_err().to_string().contains("URL"));

        jira.url = Some("https://example.atlassian.net".into());
        jira.email = Some("pm@example.com".into());
        assert!(jira.credentials().unwrap_err().to_string().contains("API token"));

        jira.api_token = Some("secret".into());
        let credentials = jira.credentials().unwrap();
        assert!(matches!(credentials.auth, Auth::Basic { ref email, .. } if email == "pm@example.com"));
    }

    #[test]
    fn test_json_config_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jpd-sync.json");

        let mut config = Config::default();
        config.jira.url = Some("https://example.atlassian.net".into());
        config.sync.ambiguous_links = AmbiguityPolicy::Warn;
        std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();

        let loaded = Config::load(Some(&path)).unwrap();
        assert_eq!(loaded.jira.url, config.jira.url);
        assert_eq!(loaded.sync.ambiguous_links, AmbiguityPolicy::Warn);

        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("ambiguous-links = \"warn\""));
    }
}
