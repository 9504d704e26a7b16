//! Configuration for the Sophos Central client and CLI.
//!
//! Configuration is plain data: it is loaded once (from a TOML file, the
//! environment, or CLI flags), validated up front, and then handed to
//! `SophosClient::builder`, which copies what it needs. Nothing reads a
//! config object after the client is built, so there is no way to mutate
//! a live client's settings.
//!
//! File layout (`config init` writes this template):
//!
//! ```toml
//! [auth]
//! client_id = "..."
//! client_secret = "..."
//!
//! [api]
//! region = "us"
//! timeout_secs = 30
//! max_retries = 3
//!
//! [output]
//! format = "table"
//! page_size = 50
//!
//! [export]
//! json_indent = 2
//! csv_delimiter = ","
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SophosError};
use crate::export::FieldFilter;

/// Environment variable naming an explicit config file.
pub const CONFIG_FILE_ENV: &str = "SOPHOS_CONFIG_FILE";
/// Environment variable holding the OAuth2 client id.
pub const CLIENT_ID_ENV: &str = "SOPHOS_CLIENT_ID";
/// Environment variable holding the OAuth2 client secret.
pub const CLIENT_SECRET_ENV: &str = "SOPHOS_CLIENT_SECRET";
/// Environment variable holding the tenant id for tenant-scoped calls.
pub const TENANT_ID_ENV: &str = "SOPHOS_TENANT_ID";
/// Environment variable holding the data region.
pub const REGION_ENV: &str = "SOPHOS_REGION";

/// Data regions Sophos Central currently serves.
pub const REGIONS: &[&str] = &["us", "eu", "ap", "de", "ie"];

/// Where a set of credentials was loaded from.
///
/// Carried by `SophosError::Authentication` so a rejected credential can be
/// traced back to the flag, variable, or file that supplied it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum CredentialSource {
    /// Passed directly by the caller (library call or CLI flag).
    #[default]
    Explicit,
    /// Read from `SOPHOS_CLIENT_ID` / `SOPHOS_CLIENT_SECRET`.
    Environment,
    /// Read from the `[auth]` table of a config file.
    ConfigFile(PathBuf),
}

impl fmt::Display for CredentialSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialSource::Explicit => write!(f, "explicit arguments"),
            CredentialSource::Environment => {
                write!(f, "environment ({CLIENT_ID_ENV}/{CLIENT_SECRET_ENV})")
            }
            CredentialSource::ConfigFile(path) => write!(f, "config file {}", path.display()),
        }
    }
}

// ── Sections ───────────────────────────────────────────────────────────

/// OAuth2 client credentials.
#[derive(Clone, Deserialize, Serialize)]
pub struct Credentials {
    /// OAuth2 client id issued by Sophos Central.
    pub client_id: String,
    /// OAuth2 client secret issued by Sophos Central.
    pub client_secret: String,
    #[serde(skip)]
    source: CredentialSource,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

impl Credentials {
    /// Credentials supplied directly by the caller.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Credentials {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            source: CredentialSource::Explicit,
        }
    }

    /// Tags these credentials with where they were loaded from.
    pub fn with_source(mut self, source: CredentialSource) -> Self {
        self.source = source;
        self
    }

    /// Where these credentials were loaded from.
    pub fn source(&self) -> &CredentialSource {
        &self.source
    }

    /// Trims both fields and rejects empty values.
    pub fn validate(&mut self) -> Result<()> {
        self.client_id = self.client_id.trim().to_string();
        self.client_secret = self.client_secret.trim().to_string();
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            return Err(SophosError::Config(format!(
                "client id and client secret must not be empty (from {})",
                self.source
            )));
        }
        Ok(())
    }
}

/// Transport settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Data region (`us`, `eu`, `ap`, `de`, `ie`).
    pub region: String,
    /// Tenant id sent as `X-Tenant-ID`. When absent, the client derives it
    /// from `whoami` for tenant-level credentials.
    pub tenant_id: Option<String>,
    /// Per-request timeout in seconds (1–300).
    pub timeout_secs: u64,
    /// Retries after the first attempt for transient failures (0–10).
    pub max_retries: u32,
    /// Exponential backoff base (>= 1.0).
    pub backoff_factor: f64,
    /// Whether HTTP 429 responses are retried.
    pub rate_limit_retry: bool,
    /// Skips whoami host resolution and sends every request here.
    pub base_url: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            region: "us".to_string(),
            tenant_id: None,
            timeout_secs: 30,
            max_retries: 3,
            backoff_factor: 2.0,
            rate_limit_retry: true,
            base_url: None,
        }
    }
}

impl ApiConfig {
    /// Request timeout as a `Duration`.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Checks every field against its documented range.
    pub fn validate(&self) -> Result<()> {
        if !REGIONS.contains(&self.region.as_str()) {
            return Err(SophosError::Config(format!(
                "unknown region '{}', expected one of {}",
                self.region,
                REGIONS.join(", ")
            )));
        }
        if !(1..=300).contains(&self.timeout_secs) {
            return Err(SophosError::Config(format!(
                "timeout_secs must be between 1 and 300, got {}",
                self.timeout_secs
            )));
        }
        if self.max_retries > 10 {
            return Err(SophosError::Config(format!(
                "max_retries must be between 0 and 10, got {}",
                self.max_retries
            )));
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(SophosError::Config(format!(
                "backoff_factor must be at least 1.0, got {}",
                self.backoff_factor
            )));
        }
        if let Some(tenant) = &self.tenant_id {
            if tenant.trim().is_empty() {
                return Err(SophosError::Config("tenant_id must not be blank".into()));
            }
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                return Err(SophosError::Config(format!(
                    "base_url must be an http(s) URL, got '{url}'"
                )));
            }
        }
        Ok(())
    }
}

/// Output format for CLI listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Fixed-width text table.
    #[default]
    Table,
    /// Pretty-printed JSON array.
    Json,
    /// Flattened CSV with a header row.
    Csv,
}

/// CLI output defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Format used when `--output` is not given.
    pub format: OutputFormat,
    /// Page size used when `--page-size` is not given (1–1000).
    pub page_size: u32,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::Table,
            page_size: 50,
        }
    }
}

/// Exporter defaults.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ExportConfig {
    /// JSON indentation (0 = compact, max 8).
    pub json_indent: usize,
    /// CSV field delimiter.
    pub csv_delimiter: char,
    /// Nesting depth flattened into dotted CSV columns.
    pub flatten_depth: usize,
    /// Top-level fields kept in JSON and CSV output. Empty keeps all.
    pub include_fields: Vec<String>,
    /// Top-level fields dropped from JSON and CSV output.
    pub exclude_fields: Vec<String>,
}

impl ExportConfig {
    /// The include/exclude lists as an exporter filter.
    pub fn field_filter(&self) -> FieldFilter<'_> {
        FieldFilter {
            include: &self.include_fields,
            exclude: &self.exclude_fields,
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        ExportConfig {
            json_indent: 2,
            csv_delimiter: ',',
            flatten_depth: 3,
            include_fields: Vec::new(),
            exclude_fields: Vec::new(),
        }
    }
}

// ── Top-level config ───────────────────────────────────────────────────

/// Complete configuration: credentials plus transport, output, and export
/// sections.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// OAuth2 credentials.
    pub auth: Credentials,
    /// Transport settings.
    #[serde(default)]
    pub api: ApiConfig,
    /// CLI output defaults.
    #[serde(default)]
    pub output: OutputConfig,
    /// Exporter defaults.
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Wraps credentials with default settings.
    pub fn new(auth: Credentials) -> Self {
        Config {
            auth,
            api: ApiConfig::default(),
            output: OutputConfig::default(),
            export: ExportConfig::default(),
        }
    }

    /// Parses TOML text. `source` tags the credentials for error messages.
    pub fn from_toml_str(text: &str, source: CredentialSource) -> Result<Self> {
        let mut config: Config = toml::from_str(text)
            .map_err(|e| SophosError::Config(format!("invalid config: {e}")))?;
        config.auth = config.auth.with_source(source);
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SophosError::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text, CredentialSource::ConfigFile(path.to_path_buf()))
    }

    /// Builds a config from `SOPHOS_*` environment variables only.
    pub fn from_env() -> Result<Self> {
        let client_id = std::env::var(CLIENT_ID_ENV)
            .map_err(|_| SophosError::Config(format!("{CLIENT_ID_ENV} is not set")))?;
        let client_secret = std::env::var(CLIENT_SECRET_ENV)
            .map_err(|_| SophosError::Config(format!("{CLIENT_SECRET_ENV} is not set")))?;
        let mut config = Config::new(
            Credentials::new(client_id, client_secret).with_source(CredentialSource::Environment),
        );
        config.api.tenant_id = std::env::var(TENANT_ID_ENV).ok();
        if let Ok(region) = std::env::var(REGION_ENV) {
            config.api.region = region;
        }
        config.validate()?;
        Ok(config)
    }

    /// Finds a config file: `SOPHOS_CONFIG_FILE`, then `./config.toml`,
    /// then the per-user config directory.
    pub fn discover() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }
        let local = PathBuf::from("config.toml");
        if local.exists() {
            return Some(local);
        }
        default_path().filter(|p| p.exists())
    }

    /// Validates every section.
    pub fn validate(&mut self) -> Result<()> {
        self.auth.validate()?;
        self.api.validate()?;
        if !(1..=1000).contains(&self.output.page_size) {
            return Err(SophosError::Config(format!(
                "output.page_size must be between 1 and 1000, got {}",
                self.output.page_size
            )));
        }
        if self.export.json_indent > 8 {
            return Err(SophosError::Config(format!(
                "export.json_indent must be at most 8, got {}",
                self.export.json_indent
            )));
        }
        Ok(())
    }

    /// Renders a starter config file for `config init`.
    pub fn render_template(client_id: &str, client_secret: &str, region: &str) -> Result<String> {
        let mut config = Config::new(Credentials::new(client_id, client_secret));
        config.api.region = region.to_string();
        config.validate()?;
        let body = toml::to_string_pretty(&config)
            .map_err(|e| SophosError::Config(format!("cannot render config: {e}")))?;
        Ok(format!("# Sophos Central CLI configuration\n\n{body}"))
    }
}

/// Per-user config file location (`<config dir>/sophos-central/config.toml`).
pub fn default_path() -> Option<PathBuf> {
    ProjectDirs::from("", "", "sophos-central").map(|dirs| dirs.config_dir().join("config.toml"))
}
