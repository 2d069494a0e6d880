//! Runtime configuration and credential resolution.
//!
//! Everything comes from the process environment (after `.env.local` /
//! `.env` are loaded at startup). The API key may also live in the OS
//! keychain under service `scouter`, account `openai`.

use crate::llm::ReplyLanguage;
use reqwest::Url;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/";
pub const CHAT_COMPLETIONS_PATH: &str = "v1/chat/completions";
pub const DEFAULT_MODEL: &str = "gpt-4o";

const KEYRING_SERVICE: &str = "scouter";
const KEYRING_ACCOUNT: &str = "openai";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("invalid base URL '{url}': {reason}")]
    BaseUrl { url: String, reason: String },
}

/// How much of each outbound request to write to the debug log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestLogging {
    #[default]
    Off,
    /// curl line with the image payload elided.
    Redacted,
    /// curl line including the full base64 payload.
    Full,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub base_url: Url,
    /// Bearer credential. Empty means "not configured".
    pub api_key: String,
    pub model: String,
    pub language: ReplyLanguage,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub tick_period: Duration,
    pub request_logging: RequestLogging,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            base_url: Url::parse(DEFAULT_BASE_URL).expect("default base URL is valid"),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            language: ReplyLanguage::Japanese,
            connect_timeout: Duration::from_secs(25),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(60),
            tick_period: Duration::from_millis(50),
            request_logging: RequestLogging::Off,
        }
    }
}

impl Settings {
    /// Build settings from `SCOUTER_*` variables and the API key sources.
    pub fn from_env() -> Result<Self, SettingsError> {
        let defaults = Self::default();

        let base_url = match std::env::var("SCOUTER_BASE_URL") {
            Ok(raw) if !raw.trim().is_empty() => parse_base_url(raw.trim())?,
            _ => defaults.base_url,
        };

        let model = std::env::var("SCOUTER_MODEL")
            .ok()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.model);

        let language = match std::env::var("SCOUTER_LANGUAGE") {
            Ok(code) => ReplyLanguage::from_code(&code).unwrap_or_else(|| {
                log::warn!("[SETTINGS] Unknown SCOUTER_LANGUAGE '{}', using ja", code);
                ReplyLanguage::Japanese
            }),
            Err(_) => defaults.language,
        };

        let settings = Self {
            base_url,
            api_key: resolve_api_key(),
            model,
            language,
            connect_timeout: secs_var("SCOUTER_CONNECT_TIMEOUT_SECS", defaults.connect_timeout),
            read_timeout: secs_var("SCOUTER_READ_TIMEOUT_SECS", defaults.read_timeout),
            write_timeout: secs_var("SCOUTER_WRITE_TIMEOUT_SECS", defaults.write_timeout),
            tick_period: millis_var("SCOUTER_TICK_MS", defaults.tick_period),
            request_logging: parse_request_logging(
                std::env::var("SCOUTER_LOG_REQUESTS").ok().as_deref(),
            ),
        };

        log::info!(
            "[SETTINGS] endpoint={} model={} language={:?} key_present={}",
            settings.endpoint(),
            settings.model,
            settings.language,
            !settings.api_key.is_empty()
        );
        Ok(settings)
    }

    /// Full chat-completions URL.
    pub fn endpoint(&self) -> Url {
        self.base_url
            .join(CHAT_COMPLETIONS_PATH)
            .unwrap_or_else(|_| self.base_url.clone())
    }

    /// Whole-request budget handed to the HTTP client: write then read.
    pub fn request_timeout(&self) -> Duration {
        self.write_timeout + self.read_timeout
    }
}

/// Parse a base URL, forcing a trailing slash so `join` appends the path
/// instead of replacing the last segment.
pub fn parse_base_url(raw: &str) -> Result<Url, SettingsError> {
    let with_slash = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{}/", raw)
    };
    let url = Url::parse(&with_slash).map_err(|e| SettingsError::BaseUrl {
        url: raw.to_string(),
        reason: e.to_string(),
    })?;
    if url.cannot_be_a_base() {
        return Err(SettingsError::BaseUrl {
            url: raw.to_string(),
            reason: "cannot be a base".to_string(),
        });
    }
    Ok(url)
}

/// Find the API key: `OPENAI_API_KEY` first, then the OS keychain.
/// Returns an empty string when neither is set.
pub fn resolve_api_key() -> String {
    if let Ok(key) = std::env::var("OPENAI_API_KEY") {
        if !key.is_empty() {
            return key;
        }
    }

    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT) {
        if let Ok(key) = entry.get_password() {
            if !key.is_empty() {
                log::info!("[SETTINGS] Loaded API key from OS keychain");
                return key;
            }
        }
    }

    log::warn!("[SETTINGS] No OPENAI_API_KEY set — requests will be rejected");
    String::new()
}

/// Store the API key in the OS keychain.
pub fn save_api_key(api_key: &str) -> Result<(), String> {
    let entry = keyring::Entry::new(KEYRING_SERVICE, KEYRING_ACCOUNT)
        .map_err(|e| format!("Keyring error: {}", e))?;
    entry
        .set_password(api_key)
        .map_err(|e| format!("Failed to save key: {}", e))?;
    log::info!("[SETTINGS] API key saved to OS keychain");
    Ok(())
}

fn parse_request_logging(raw: Option<&str>) -> RequestLogging {
    match raw.map(|v| v.trim().to_lowercase()).as_deref() {
        Some("1") | Some("true") | Some("yes") => RequestLogging::Redacted,
        Some("full") => RequestLogging::Full,
        _ => RequestLogging::Off,
    }
}

fn secs_var(name: &str, default: Duration) -> Duration {
    parse_u64_var(name).map(Duration::from_secs).unwrap_or(default)
}

fn millis_var(name: &str, default: Duration) -> Duration {
    parse_u64_var(name)
        .filter(|ms| *ms > 0)
        .map(Duration::from_millis)
        .unwrap_or(default)
}

fn parse_u64_var(name: &str) -> Option<u64> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<u64>() {
        Ok(v) => Some(v),
        Err(_) => {
            log::warn!("[SETTINGS] Ignoring {}='{}' (not a number)", name, raw);
            None
        }
    }
}
