//! Configuration for civic-sign.
//!
//! Settings are read from `.civic-sign/civic-sign.toml`. Every field has a
//! default, so a missing file or a partial file is fine. Layering is
//! file → environment → CLI flags.
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! host = "127.0.0.1"
//! port = 3300
//! dev_mode = false
//!
//! [database]
//! path = ".civic-sign/civic-sign.db"
//!
//! [sms]
//! gateway = "http"
//! endpoint = "https://sms.example.org/messages"
//! code_length = 6
//! code_ttl_secs = 600
//! dispatch_timeout_ms = 5000
//! max_code_attempts = 5
//!
//! [session]
//! cookie_name = "civic_sign_session"
//! ttl_hours = 24
//!
//! [auth]
//! signer_header = "x-signer-id"
//!
//! [logging]
//! filter = "info"
//! json = false
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_DIR_NAME: &str = ".civic-sign";
pub const CONFIG_FILE_NAME: &str = "civic-sign.toml";

/// Directory holding the config file and, by default, the database.
pub fn get_config_dir(project_dir: &Path) -> PathBuf {
    project_dir.join(CONFIG_DIR_NAME)
}

/// How verification codes reach the signer's phone.
///
/// | Gateway | Behavior                                              |
/// |---------|-------------------------------------------------------|
/// | `Log`   | Writes the code to the log; for local development     |
/// | `Http`  | POSTs the message to `sms.endpoint`                   |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SmsGateway {
    #[default]
    Log,
    Http,
}

impl std::fmt::Display for SmsGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmsGateway::Log => write!(f, "log"),
            SmsGateway::Http => write!(f, "http"),
        }
    }
}

impl std::str::FromStr for SmsGateway {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "log" => Ok(SmsGateway::Log),
            "http" => Ok(SmsGateway::Http),
            _ => anyhow::bail!("Invalid SMS gateway '{}'. Valid values: log, http", s),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Permissive CORS for a local front-end dev server
    #[serde(default)]
    pub dev_mode: bool,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    3300
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            dev_mode: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSection {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

fn default_db_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR_NAME).join("civic-sign.db")
}

impl Default for DatabaseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// SMS verification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsSection {
    #[serde(default)]
    pub gateway: SmsGateway,
    /// Gateway URL, required when `gateway = "http"`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Bearer key for the gateway; `CIVIC_SIGN_SMS_API_KEY` overrides it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_code_length")]
    pub code_length: usize,
    #[serde(default = "default_code_ttl_secs")]
    pub code_ttl_secs: u64,
    #[serde(default = "default_dispatch_timeout_ms")]
    pub dispatch_timeout_ms: u64,
    /// Mismatches allowed per challenge before a new code is required. 0 disables the limit.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
}

fn default_code_length() -> usize {
    6
}

fn default_code_ttl_secs() -> u64 {
    600
}

fn default_dispatch_timeout_ms() -> u64 {
    5000
}

fn default_max_code_attempts() -> u32 {
    5
}

impl Default for SmsSection {
    fn default() -> Self {
        Self {
            gateway: SmsGateway::default(),
            endpoint: None,
            api_key: None,
            code_length: default_code_length(),
            code_ttl_secs: default_code_ttl_secs(),
            dispatch_timeout_ms: default_dispatch_timeout_ms(),
            max_code_attempts: default_max_code_attempts(),
        }
    }
}

/// Longest code lifetime honoured: one day.
pub const MAX_CODE_TTL_SECS: u64 = 86_400;

impl SmsSection {
    pub fn code_ttl(&self) -> Duration {
        Duration::from_secs(self.code_ttl_secs.min(MAX_CODE_TTL_SECS))
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }

    /// Gateway key, with the environment taking precedence over the file.
    pub fn api_key(&self) -> Option<String> {
        std::env::var("CIVIC_SIGN_SMS_API_KEY")
            .ok()
            .or_else(|| self.api_key.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Sessions untouched for longer than this are purged at startup
    #[serde(default = "default_ttl_hours")]
    pub ttl_hours: u32,
    /// Mark the cookie `Secure`; enable when served over HTTPS
    #[serde(default)]
    pub secure_cookie: bool,
}

fn default_cookie_name() -> String {
    "civic_sign_session".to_string()
}

fn default_ttl_hours() -> u32 {
    24
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            ttl_hours: default_ttl_hours(),
            secure_cookie: false,
        }
    }
}

/// Identity is established upstream; this names the header it arrives in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthSection {
    #[serde(default = "default_signer_header")]
    pub signer_header: String,
}

fn default_signer_header() -> String {
    "x-signer-id".to_string()
}

impl Default for AuthSection {
    fn default() -> Self {
        Self {
            signer_header: default_signer_header(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSection {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_filter")]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}

/// Root of `civic-sign.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SigningToml {
    #[serde(default)]
    pub server: ServerSection,
    #[serde(default)]
    pub database: DatabaseSection,
    #[serde(default)]
    pub sms: SmsSection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub auth: AuthSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl SigningToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse civic-sign.toml")
    }

    /// Load configuration from `<config_dir>/civic-sign.toml`, or defaults if
    /// the file doesn't exist.
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        let config_path = config_dir.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            Self::load(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).context("Failed to serialize civic-sign.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply environment overrides on top of the file values.
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(port) = std::env::var("CIVIC_SIGN_PORT") {
            self.server.port = port
                .parse()
                .with_context(|| format!("Invalid CIVIC_SIGN_PORT '{}'", port))?;
        }
        if let Ok(path) = std::env::var("CIVIC_SIGN_DB_PATH") {
            self.database.path = PathBuf::from(path);
        }
        if let Ok(gateway) = std::env::var("CIVIC_SIGN_SMS_GATEWAY") {
            self.sms.gateway = gateway
                .parse()
                .context("Invalid CIVIC_SIGN_SMS_GATEWAY")?;
        }
        Ok(())
    }

    /// Human-readable problems with the configuration. Empty means valid.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if self.sms.gateway == SmsGateway::Http && self.sms.endpoint.is_none() {
            warnings.push("sms.gateway is \"http\" but sms.endpoint is not set".to_string());
        }
        if !(4..=10).contains(&self.sms.code_length) {
            warnings.push(format!(
                "sms.code_length = {} is outside the supported range 4..=10",
                self.sms.code_length
            ));
        }
        if self.sms.code_ttl_secs == 0 {
            warnings.push("sms.code_ttl_secs = 0 makes every code expire immediately".to_string());
        } else if self.sms.code_ttl_secs > MAX_CODE_TTL_SECS {
            warnings.push(format!(
                "sms.code_ttl_secs = {} exceeds {}; codes are capped at that lifetime",
                self.sms.code_ttl_secs, MAX_CODE_TTL_SECS
            ));
        }
        if self.sms.dispatch_timeout_ms == 0 {
            warnings.push("sms.dispatch_timeout_ms must be greater than 0".to_string());
        }
        if self.sms.max_code_attempts == 0 {
            warnings.push(
                "sms.max_code_attempts = 0 allows unlimited code guesses per challenge".to_string(),
            );
        }
        if self.auth.signer_header.trim().is_empty() {
            warnings.push("auth.signer_header must not be empty".to_string());
        }
        if self.session.cookie_name.trim().is_empty() {
            warnings.push("session.cookie_name must not be empty".to_string());
        }
        warnings
    }
}
