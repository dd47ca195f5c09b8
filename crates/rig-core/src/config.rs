use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub target: TargetConfig,
    #[serde(default)]
    pub load: LoadConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make a run meaningless before any request is sent.
    pub fn validate(&self) -> anyhow::Result<()> {
        self.target.endpoint(&self.target.path)?;
        self.target.endpoint(&self.audit.path)?;

        if self.target.timeout_ms == 0 {
            anyhow::bail!("target.timeout_ms must be greater than zero");
        }
        if self.load.concurrency == 0 {
            anyhow::bail!("load.concurrency must be at least 1");
        }
        if self.load.progress_every == 0 {
            anyhow::bail!("load.progress_every must be at least 1");
        }
        if self.audit.timeout_ms == 0 {
            anyhow::bail!("audit.timeout_ms must be greater than zero");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Base URL of the service under test (e.g., "https://example.onrender.com")
    pub base_url: String,
    /// Endpoint path hit by the load generator
    #[serde(default = "default_path")]
    pub path: String,
    /// Per-request timeout for the load generator in milliseconds
    #[serde(default = "default_load_timeout_ms")]
    pub timeout_ms: u64,
}

impl TargetConfig {
    /// Append `path` to the base URL, keeping any path prefix the base already
    /// has. Fails on malformed or non-http(s) URLs.
    pub fn endpoint(&self, path: &str) -> anyhow::Result<url::Url> {
        let mut base = url::Url::parse(&self.base_url)
            .map_err(|e| anyhow::anyhow!("Invalid target.base_url {}: {}", self.base_url, e))?;

        match base.scheme() {
            "http" | "https" => {}
            other => anyhow::bail!("target.base_url must be http:// or https:// (got {other})"),
        }
        if base.host_str().is_none() {
            anyhow::bail!("target.base_url must include a hostname");
        }

        let (path, query) = match path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (path, None),
        };

        let prefix = base.path().trim_end_matches('/');
        let suffix = path.trim_start_matches('/');
        let joined = if suffix.is_empty() {
            format!("{prefix}/")
        } else {
            format!("{prefix}/{suffix}")
        };

        base.set_path(&joined);
        if query.is_some() {
            base.set_query(query);
        }
        Ok(base)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoadConfig {
    /// Total number of requests dispatched in one run
    #[serde(default = "default_total_requests")]
    pub total_requests: u64,
    /// Number of concurrent workers
    #[serde(default = "default_concurrency")]
    pub concurrency: u32,
    /// Log progress every N completed requests
    #[serde(default = "default_progress_every")]
    pub progress_every: u64,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            total_requests: default_total_requests(),
            concurrency: default_concurrency(),
            progress_every: default_progress_every(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Endpoint path requested by the sequential audit
    #[serde(default = "default_audit_path")]
    pub path: String,
    /// Requests issued in each of the cold and warm scenarios
    #[serde(default = "default_requests_per_scenario")]
    pub requests_per_scenario: u64,
    /// Per-request timeout in milliseconds; high enough to survive a cold start
    #[serde(default = "default_audit_timeout_ms")]
    pub timeout_ms: u64,
    /// Pause between the cold and warm scenarios in milliseconds
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,
}

impl AuditConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            path: default_audit_path(),
            requests_per_scenario: default_requests_per_scenario(),
            timeout_ms: default_audit_timeout_ms(),
            cooldown_ms: default_cooldown_ms(),
        }
    }
}

fn default_path() -> String {
    "/".to_string()
}

fn default_load_timeout_ms() -> u64 {
    10_000
}

fn default_total_requests() -> u64 {
    1000
}

fn default_concurrency() -> u32 {
    50
}

fn default_progress_every() -> u64 {
    100
}

fn default_audit_path() -> String {
    "/login".to_string()
}

fn default_requests_per_scenario() -> u64 {
    50
}

fn default_audit_timeout_ms() -> u64 {
    120_000
}

fn default_cooldown_ms() -> u64 {
    2_000
}
