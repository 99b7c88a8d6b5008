//! Configuration module for environment variable parsing.
//!
//! Global options come from `MAILRELAY_*` environment variables. Per-mailer
//! settings are read from an optional JSON settings file and can be
//! overridden by `MAILRELAY_<SLUG>_<KEY>` constants, which always win.

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use tracing::warn;

/// Prefix shared by every environment constant.
pub const ENV_PREFIX: &str = "MAILRELAY_";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Slug of the active mailer (see [`crate::mailer::registry`])
    pub mailer: String,

    /// Default sender address
    pub from_email: String,

    /// Default sender display name
    pub from_name: String,

    /// Replace the sender address on every message, not only missing ones
    pub force_from_email: bool,

    /// Replace the sender name on every message
    pub force_from_name: bool,

    /// Set the envelope return path to the sender address
    pub return_path: bool,

    /// Whether messages go through the queue instead of being sent inline
    pub queue_enabled: bool,

    /// Directory holding queue entries
    pub queue_dir: PathBuf,

    /// Directory holding attachments copied by the queue
    pub attachments_dir: PathBuf,

    /// Maximum number of entries claimed per processing run
    pub queue_batch_size: usize,

    /// Days to keep sent/failed entries
    pub queue_retention_days: u64,

    /// Days to keep stored attachment files
    pub attachment_retention_days: u64,

    /// Seconds between queue processing runs
    pub process_interval_secs: u64,

    /// Seconds between scheduler ticks in the worker
    pub tick_interval_secs: u64,

    /// HTTP request timeout in milliseconds
    pub http_timeout_ms: u64,

    /// Disable the weekly summary report
    pub summary_report_disabled: bool,

    /// Recipient of the weekly summary report (defaults to the sender)
    pub summary_report_to: Option<String>,

    /// JSON file with stored per-mailer settings
    pub settings_file: Option<PathBuf>,

    /// Bearer token required by the web API, if set
    pub api_token: Option<String>,

    /// Port for the web server to listen on
    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mailer: "mail".to_string(),
            from_email: String::new(),
            from_name: "Mailrelay".to_string(),
            force_from_email: false,
            force_from_name: false,
            return_path: false,
            queue_enabled: false,
            queue_dir: PathBuf::from("data/queue"),
            attachments_dir: PathBuf::from("data/attachments"),
            queue_batch_size: 10,
            queue_retention_days: 90,
            attachment_retention_days: 30,
            process_interval_secs: 60,
            tick_interval_secs: 5,
            http_timeout_ms: 30_000,
            summary_report_disabled: false,
            summary_report_to: None,
            settings_file: None,
            api_token: None,
            port: 8080,
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Self {
        let defaults = Config::default();

        Config {
            mailer: env_string("MAILER")
                .map(|s| s.to_lowercase())
                .unwrap_or(defaults.mailer),

            from_email: env_string("FROM_EMAIL").unwrap_or(defaults.from_email),

            from_name: env_string("FROM_NAME").unwrap_or(defaults.from_name),

            force_from_email: parse_bool("FORCE_FROM_EMAIL", defaults.force_from_email),

            force_from_name: parse_bool("FORCE_FROM_NAME", defaults.force_from_name),

            return_path: parse_bool("RETURN_PATH", defaults.return_path),

            queue_enabled: parse_bool("QUEUE_ENABLED", defaults.queue_enabled),

            queue_dir: env_string("QUEUE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.queue_dir),

            attachments_dir: env_string("ATTACHMENTS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.attachments_dir),

            queue_batch_size: parse_env("QUEUE_BATCH_SIZE", defaults.queue_batch_size),

            queue_retention_days: parse_env("QUEUE_RETENTION_DAYS", defaults.queue_retention_days),

            attachment_retention_days: parse_env(
                "ATTACHMENT_RETENTION_DAYS",
                defaults.attachment_retention_days,
            ),

            process_interval_secs: parse_env("PROCESS_INTERVAL_SECS", defaults.process_interval_secs),

            tick_interval_secs: parse_env("TICK_INTERVAL_SECS", defaults.tick_interval_secs),

            http_timeout_ms: parse_env("HTTP_TIMEOUT_MS", defaults.http_timeout_ms),

            summary_report_disabled: parse_bool(
                "SUMMARY_REPORT_DISABLED",
                defaults.summary_report_disabled,
            ),

            summary_report_to: env_string("SUMMARY_REPORT_TO"),

            settings_file: env_string("SETTINGS_FILE").map(PathBuf::from),

            api_token: env_string("API_TOKEN"),

            port: env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.port),
        }
    }

    /// Load stored mailer settings, applying environment overrides.
    pub fn provider_settings(&self) -> ProviderSettings {
        match &self.settings_file {
            Some(path) => ProviderSettings::load(path),
            None => ProviderSettings::default(),
        }
    }
}

/// Named settings for one mailer, after constant overrides were applied.
#[derive(Debug, Clone, Default)]
pub struct MailerSettings {
    slug: String,
    values: HashMap<String, String>,
    overridden: HashSet<String>,
}

impl MailerSettings {
    pub fn new(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            ..Default::default()
        }
    }

    /// Build settings from literal pairs, without consulting the environment.
    pub fn from_pairs<'a>(slug: &str, pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut settings = Self::new(slug);
        for (key, value) in pairs {
            settings.values.insert(key.to_string(), value.to_string());
        }
        settings
    }

    pub fn slug(&self) -> &str {
        &self.slug
    }

    /// Value of a setting, or `None` when missing or blank.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values
            .get(key)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Interpret a setting as a boolean flag.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).is_some_and(is_truthy)
    }

    /// True when every listed setting is present and non-empty.
    pub fn has_all(&self, keys: &[&str]) -> bool {
        keys.iter().all(|k| self.get(k).is_some())
    }

    /// Settings listed in `keys` that are missing or blank.
    pub fn missing<'k>(&self, keys: &[&'k str]) -> Vec<&'k str> {
        keys.iter().copied().filter(|k| self.get(k).is_none()).collect()
    }

    /// Whether the value comes from a constant and must be treated as read-only.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overridden.contains(key)
    }

    pub fn set(&mut self, key: &str, value: &str) {
        if self.is_overridden(key) {
            warn!(mailer = %self.slug, key = key, "mailer_setting_read_only");
            return;
        }
        self.values.insert(key.to_string(), value.to_string());
    }

    fn apply_override(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
        self.overridden.insert(key.to_string());
    }
}

/// Stored settings for every mailer, keyed by slug.
#[derive(Debug, Clone, Default)]
pub struct ProviderSettings {
    stored: HashMap<String, HashMap<String, String>>,
}

impl ProviderSettings {
    /// Read a `{ "slug": { "key": "value" } }` JSON file. A missing or
    /// unreadable file yields empty settings.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings_file_unreadable");
                return Self::default();
            }
        };

        match Self::from_json(&raw) {
            Ok(settings) => settings,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "settings_file_invalid");
                Self::default()
            }
        }
    }

    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        let parsed: HashMap<String, HashMap<String, serde_json::Value>> = serde_json::from_str(raw)?;
        let stored = parsed
            .into_iter()
            .map(|(slug, values)| {
                let values = values
                    .into_iter()
                    .map(|(k, v)| {
                        let v = match v {
                            serde_json::Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, v)
                    })
                    .collect();
                (slug, values)
            })
            .collect();
        Ok(Self { stored })
    }

    pub fn insert(&mut self, slug: &str, key: &str, value: &str) {
        self.stored
            .entry(slug.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Resolve the settings of one mailer: stored values first, then any
    /// `MAILRELAY_<SLUG>_<KEY>` constant on top.
    pub fn for_mailer(&self, slug: &str, keys: &[&str]) -> MailerSettings {
        let mut settings = MailerSettings::new(slug);
        if let Some(values) = self.stored.get(slug) {
            settings.values = values.clone();
        }

        for key in keys {
            if let Some(value) = env_string(&constant_name(slug, key)) {
                settings.apply_override(key, value);
            }
        }

        settings
    }
}

/// Environment constant for a mailer setting, e.g. `MAILRELAY_SENDGRID_API_KEY`.
pub fn constant_name(slug: &str, key: &str) -> String {
    format!("{}_{}", slug, key)
        .to_uppercase()
        .replace(|c: char| !c.is_ascii_alphanumeric(), "_")
}

fn env_string(name: &str) -> Option<String> {
    env::var(format!("{}{}", ENV_PREFIX, name))
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse a typed value, warning and falling back to the default when malformed.
fn parse_env<T: FromStr>(name: &str, default: T) -> T {
    let Some(raw) = env_string(name) else {
        return default;
    };

    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            warn!(env_var = name, value = %raw, "Invalid value, using default");
            default
        }
    }
}

fn parse_bool(name: &str, default: bool) -> bool {
    match env_string(name) {
        Some(raw) if is_truthy(&raw) => true,
        Some(raw) if is_falsy(&raw) => false,
        Some(raw) => {
            warn!(env_var = name, value = %raw, "Invalid boolean, using default");
            default
        }
        None => default,
    }
}

fn is_truthy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn is_falsy(raw: &str) -> bool {
    matches!(raw.to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}
