use std::{env, fmt, path::PathBuf, str::FromStr, time::Duration};

use tracing::{info, warn};

use crate::chat::{FallbackMode, MatchDirection};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is required")]
    Missing(&'static str),
    #[error("Invalid {key} value: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Clone)]
pub struct Config {
    pub port: u16,
    pub database_path: PathBuf,
    pub upload_dir: PathBuf,
    pub jwt_secret: String,
    pub token_ttl: Duration,
    pub groq_api_key: String,
    pub groq_base_url: String,
    pub groq_model: String,
    pub fallback_mode: FallbackMode,
    pub faq_match: MatchDirection,
    pub public_url: Option<String>,
    pub provider_timeout: Duration,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let token_ttl_hours: u64 = try_load("TOKEN_TTL_HOURS", "24")?;
        let provider_timeout_secs: u64 = try_load("PROVIDER_TIMEOUT_SECS", "20")?;

        Ok(Self {
            port: try_load("PORT", "5000")?,
            database_path: try_load("DATABASE_PATH", "helpdesk.db")?,
            upload_dir: try_load("UPLOAD_DIR", "uploads")?,
            jwt_secret: require("JWT_SECRET")?,
            token_ttl: token_ttl(token_ttl_hours)?,
            groq_api_key: require("GROQ_API_KEY")?,
            groq_base_url: try_load("GROQ_BASE_URL", DEFAULT_BASE_URL)?,
            groq_model: try_load("GROQ_MODEL", DEFAULT_MODEL)?,
            fallback_mode: try_load("FALLBACK_MODE", "minimal")?,
            faq_match: try_load("FAQ_MATCH", "either")?,
            public_url: var("PUBLIC_URL").map(|url| url.trim_end_matches('/').to_string()),
            provider_timeout: Duration::from_secs(provider_timeout_secs),
        })
    }
}

fn token_ttl(hours: u64) -> Result<Duration, ConfigError> {
    hours
        .checked_mul(60 * 60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            key: "TOKEN_TTL_HOURS",
            message: format!("{hours} hours is out of range"),
        })
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("port", &self.port)
            .field("database_path", &self.database_path)
            .field("upload_dir", &self.upload_dir)
            .field("jwt_secret", &mask(&self.jwt_secret))
            .field("token_ttl", &self.token_ttl)
            .field("groq_api_key", &mask(&self.groq_api_key))
            .field("groq_base_url", &self.groq_base_url)
            .field("groq_model", &self.groq_model)
            .field("fallback_mode", &self.fallback_mode)
            .field("faq_match", &self.faq_match)
            .field("public_url", &self.public_url)
            .field("provider_timeout", &self.provider_timeout)
            .finish()
    }
}

/// Mask secrets for display, keeping only the edges of long values.
pub fn mask(value: &str) -> String {
    if value.len() > 8 && value.is_ascii() {
        format!("{}...{}", &value[..4], &value[value.len() - 4..])
    } else {
        "****".to_string()
    }
}

fn var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn require(key: &'static str) -> Result<String, ConfigError> {
    var(key).ok_or(ConfigError::Missing(key))
}

fn try_load<T: FromStr>(key: &'static str, default: &str) -> Result<T, ConfigError>
where
    T::Err: fmt::Display,
{
    var(key)
        .unwrap_or_else(|| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key,
                message: e.to_string(),
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask_long_secret() {
        assert_eq!(mask("gsk_abcdefghijkl"), "gsk_...ijkl");
    }

    #[test]
    fn test_mask_short_secret() {
        assert_eq!(mask("short"), "****");
    }

    #[test]
    fn test_token_ttl_rejects_overflow() {
        assert_eq!(token_ttl(24).unwrap(), Duration::from_secs(86_400));
        assert!(matches!(
            token_ttl(u64::MAX),
            Err(ConfigError::Invalid {
                key: "TOKEN_TTL_HOURS",
                ..
            })
        ));
    }

    #[test]
    fn test_debug_hides_secrets() {
        let config = Config {
            port: 5000,
            database_path: "helpdesk.db".into(),
            upload_dir: "uploads".into(),
            jwt_secret: "a-very-long-jwt-secret".into(),
            token_ttl: Duration::from_secs(60),
            groq_api_key: "gsk_live_0123456789".into(),
            groq_base_url: DEFAULT_BASE_URL.into(),
            groq_model: DEFAULT_MODEL.into(),
            fallback_mode: FallbackMode::Minimal,
            faq_match: MatchDirection::Pattern,
            public_url: None,
            provider_timeout: Duration::from_secs(20),
        };
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("a-very-long-jwt-secret"));
        assert!(!rendered.contains("gsk_live_0123456789"));
        assert!(rendered.contains("gsk_...6789"));
    }
}
