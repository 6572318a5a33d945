use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use mailcast_schedule::Zone;

use crate::error::CoreError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

/// Environment lookups for one profile: `{PROFILE}_{KEY}` wins over `{KEY}`,
/// and empty values count as unset.
#[derive(Clone, Copy)]
struct ProfiledEnv<'a> {
    profile: &'a str,
    lookup: fn(&str) -> Option<String>,
}

impl<'a> ProfiledEnv<'a> {
    fn process(profile: &'a str) -> Self {
        Self {
            profile,
            lookup: |key| env::var(key).ok(),
        }
    }

    fn raw(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn opt(&self, key: &str) -> Option<String> {
        if !self.profile.is_empty() {
            if let Some(v) = self.raw(&format!("{}_{key}", self.profile)) {
                return Some(v);
            }
        }
        self.raw(key)
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.opt(key).unwrap_or_else(|| default.to_string())
    }

    /// Parsed value; unparseable input falls back to `default`.
    fn parse<T: FromStr>(&self, key: &str, default: T) -> T {
        self.opt(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
    }

    fn flag(&self, key: &str, default: bool) -> bool {
        match self.opt(key).map(|v| v.to_ascii_lowercase()) {
            Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
            Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
            _ => default,
        }
    }

    fn zone(&self, key: &str, default: &str) -> Zone {
        let raw = self.or(key, default);
        match raw.parse::<Zone>() {
            Ok(zone) => zone,
            Err(e) => {
                tracing::warn!(key, value = %raw, error = %e, "invalid timezone, using default {default}");
                default.parse().unwrap_or_else(|_| Zone::utc())
            }
        }
    }
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub schedule: ScheduleConfig,
    pub dispatch: DispatchConfig,
    pub sender: SenderConfig,
    pub storage: StorageConfig,
    pub deliverability: DeliverabilityConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `MAILCAST_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env::var("MAILCAST_PROFILE").unwrap_or_default();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let profile = profile.trim().to_uppercase();
        Self::load(ProfiledEnv::process(&profile))
    }

    fn load(env: ProfiledEnv<'_>) -> Self {
        Self {
            profile: env.profile.to_string(),
            schedule: ScheduleConfig::from_env(env),
            dispatch: DispatchConfig::from_env(env),
            sender: SenderConfig::from_env(env),
            storage: StorageConfig::from_env(env),
            deliverability: DeliverabilityConfig::from_env(env),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  schedule:    source={}, target={}", self.schedule.source, self.schedule.target);
        tracing::info!(
            "  dispatch:    pacing={}ms, oversend_threshold={}, verify={}",
            self.dispatch.pacing_ms, self.dispatch.oversend_threshold, self.dispatch.verify_recipients
        );
        tracing::info!(
            "  sender:      host={}, from={}, configured={}",
            self.sender.smtp_host.as_deref().unwrap_or("(none)"),
            self.sender.from_address.as_deref().unwrap_or("(none)"),
            self.sender.is_configured()
        );
        tracing::info!("  storage:     backend={:?}, data_dir={}", self.storage.backend, self.storage.data_dir.display());
        tracing::info!("  dns:         resolver={}", self.deliverability.resolver_url);
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "schedule": {
                "source": self.schedule.source.to_string(),
                "target": self.schedule.target.to_string(),
            },
            "dispatch": {
                "pacing_ms": self.dispatch.pacing_ms,
                "oversend_threshold": self.dispatch.oversend_threshold,
                "verify_recipients": self.dispatch.verify_recipients,
                "poll_interval_secs": self.dispatch.poll_interval_secs,
                "poll_batch_size": self.dispatch.poll_batch_size,
            },
            "sender": {
                "smtp_host": self.sender.smtp_host,
                "smtp_port": self.sender.smtp_port,
                "tls": self.sender.tls,
                "from": self.sender.from_address,
                "configured": self.sender.is_configured(),
            },
            "storage": {
                "backend": self.storage.backend,
                "data_dir": self.storage.data_dir,
            },
            "deliverability": {
                "resolver_url": self.deliverability.resolver_url,
                "timeout_secs": self.deliverability.timeout_secs,
            },
        })
    }
}

// ── Schedule ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Zone in which uploaded wall-clock dates are written.
    pub source: Zone,
    /// Zone used for human-readable display strings.
    pub target: Zone,
}

impl ScheduleConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            source: env.zone("SOURCE_TIMEZONE", "-08:00"),
            target: env.zone("TARGET_TIMEZONE", "+08:00"),
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            source: Zone::fixed_hours(-8).unwrap_or_else(Zone::utc),
            target: Zone::fixed_hours(8).unwrap_or_else(Zone::utc),
        }
    }
}

// ── Dispatch ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    pub pacing_ms: u64,
    /// Historical send count at which an address is flagged.
    pub oversend_threshold: u32,
    pub verify_recipients: bool,
    pub poll_interval_secs: u64,
    pub poll_batch_size: u32,
}

impl DispatchConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        let defaults = Self::default();
        Self {
            pacing_ms: env.parse("DISPATCH_PACING_MS", defaults.pacing_ms),
            oversend_threshold: env.parse("OVERSEND_THRESHOLD", defaults.oversend_threshold),
            verify_recipients: env.flag("VERIFY_RECIPIENTS", defaults.verify_recipients),
            poll_interval_secs: env.parse("POLL_INTERVAL_SECS", defaults.poll_interval_secs),
            poll_batch_size: env.parse("POLL_BATCH_SIZE", defaults.poll_batch_size),
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: 2000,
            oversend_threshold: 3,
            verify_recipients: true,
            poll_interval_secs: 60,
            poll_batch_size: 20,
        }
    }
}

// ── Sender (SMTP) ─────────────────────────────────────────────

/// Outbound mail credentials. The password is never serialized, so persisted
/// jobs carry everything but the secret.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderConfig {
    pub smtp_host: Option<String>,
    pub smtp_port: u16,
    pub tls: bool,
    pub username: Option<String>,
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    pub from_address: Option<String>,
    pub from_name: Option<String>,
}

impl SenderConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        Self {
            smtp_host: env.opt("SMTP_HOST"),
            smtp_port: env.parse("SMTP_PORT", 587),
            tls: env.flag("SMTP_TLS", true),
            username: env.opt("SMTP_USERNAME"),
            password: env.opt("SMTP_PASSWORD"),
            from_address: env.opt("SMTP_FROM"),
            from_name: env.opt("SMTP_FROM_NAME"),
        }
    }

    pub fn is_configured(&self) -> bool {
        self.validate().is_ok()
    }

    /// Every credential a send needs must be present.
    pub fn validate(&self) -> Result<(), CoreError> {
        let missing: Vec<&str> = [
            ("SMTP_HOST", self.smtp_host.is_none()),
            ("SMTP_USERNAME", self.username.is_none()),
            ("SMTP_PASSWORD", self.password.is_none()),
            ("SMTP_FROM", self.from_address.is_none()),
        ]
        .into_iter()
        .filter_map(|(key, absent)| absent.then_some(key))
        .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(CoreError::Config(format!(
                "sender is missing {}",
                missing.join(", ")
            )))
        }
    }

    /// Fill absent fields from `fallback`, keeping what is already set.
    pub fn or(self, fallback: &SenderConfig) -> SenderConfig {
        let has_host = self.smtp_host.is_some();
        SenderConfig {
            smtp_host: self.smtp_host.or_else(|| fallback.smtp_host.clone()),
            smtp_port: if has_host { self.smtp_port } else { fallback.smtp_port },
            tls: if has_host { self.tls } else { fallback.tls },
            username: self.username.or_else(|| fallback.username.clone()),
            password: self.password.or_else(|| fallback.password.clone()),
            from_address: self.from_address.or_else(|| fallback.from_address.clone()),
            from_name: self.from_name.or_else(|| fallback.from_name.clone()),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackend {
    /// JSON files under `data_dir`.
    File,
    /// In-process only; nothing survives a restart.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StoreBackend,
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        let backend = match env.or("STORE_BACKEND", "file").to_ascii_lowercase().as_str() {
            "memory" | "none" => StoreBackend::Memory,
            _ => StoreBackend::File,
        };
        Self {
            backend,
            data_dir: PathBuf::from(env.or("DATA_DIR", "data")),
        }
    }
}

// ── Deliverability ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliverabilityConfig {
    /// DNS-over-HTTPS JSON endpoint.
    pub resolver_url: String,
    pub timeout_secs: u64,
}

impl DeliverabilityConfig {
    fn from_env(env: ProfiledEnv<'_>) -> Self {
        let defaults = Self::default();
        Self {
            resolver_url: env.or("DNS_RESOLVER_URL", &defaults.resolver_url),
            timeout_secs: env.parse("DNS_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for DeliverabilityConfig {
    fn default() -> Self {
        Self {
            resolver_url: "https://dns.google/resolve".to_string(),
            timeout_secs: 5,
        }
    }
}
