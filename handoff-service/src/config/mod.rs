use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::str::FromStr;

/// Longest validity any impersonation token may be configured with.
pub const MAX_TOKEN_TTL_SECONDS: u64 = 600;

/// Minimum proof secret length accepted in production.
pub const MIN_PROOF_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone)]
pub struct HandoffConfig {
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
    /// Absolute origin used to build links shown to the user (QR target, approve link).
    pub public_base_url: String,
    pub redis: RedisConfig,
    pub security: SecurityConfig,
    pub handoff: HandoffSettings,
    pub artifacts: ArtifactProviderConfig,
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Environment {
    Dev,
    Prod,
}

impl FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" | "development" | "local" => Ok(Environment::Dev),
            "prod" | "production" => Ok(Environment::Prod),
            other => Err(format!("Unknown ENVIRONMENT '{}', expected dev or prod", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// When unset the in-process store is used.
    pub url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Server secret the approve-link proofs are signed with.
    pub proof_secret: Secret<String>,
    pub secure_cookies: bool,
    pub session_inactivity_minutes: i64,
}

#[derive(Debug, Clone)]
pub struct HandoffSettings {
    pub request_ttl_seconds: u64,
    pub token_ttl_seconds: u64,
    pub poll_interval_ms: u64,
    pub max_poll_attempts: u32,
    pub bridge_retry_delay_ms: u64,
    pub consume_redirect_delay_ms: u64,
    /// Where an unauthenticated approver is sent; receives `redirect_to`.
    pub login_url: String,
}

impl Default for HandoffSettings {
    fn default() -> Self {
        Self {
            request_ttl_seconds: 600,
            token_ttl_seconds: 600,
            poll_interval_ms: 2000,
            max_poll_attempts: 300,
            bridge_retry_delay_ms: 600,
            consume_redirect_delay_ms: 300,
            login_url: "/login".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArtifactProviderConfig {
    /// Base URL of the course data provider. Dev falls back to an in-memory resolver.
    pub provider_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub status_limit: u32,
    pub status_window_seconds: u64,
    pub global_ip_limit: u32,
    pub global_ip_window_seconds: u64,
    /// Key limits on `x-forwarded-for` instead of the peer address.
    pub trust_forwarded_for: bool,
}

impl HandoffConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;
        let defaults = HandoffSettings::default();

        let proof_secret = match env::var("HANDOFF_PROOF_SECRET") {
            Ok(secret) => secret,
            Err(_) if is_prod => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "HANDOFF_PROOF_SECRET is required in production but not set"
                )))
            }
            Err(_) => {
                tracing::warn!("HANDOFF_PROOF_SECRET not set, using an ephemeral secret");
                random_secret()
            }
        };

        let config = HandoffConfig {
            common: common_config,
            environment: environment.clone(),
            service_name: get_env("SERVICE_NAME", Some("handoff-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            otlp_endpoint: get_optional_env("OTLP_ENDPOINT"),
            public_base_url: get_env("PUBLIC_BASE_URL", Some("http://localhost:8080"), is_prod)?
                .trim_end_matches('/')
                .to_string(),
            redis: RedisConfig {
                url: get_optional_env("REDIS_URL"),
            },
            security: SecurityConfig {
                proof_secret: Secret::new(proof_secret),
                secure_cookies: parse_env("SECURE_COOKIES", if is_prod { "true" } else { "false" })?,
                session_inactivity_minutes: parse_env("SESSION_INACTIVITY_MINUTES", "1440")?,
            },
            handoff: HandoffSettings {
                request_ttl_seconds: parse_env(
                    "HANDOFF_REQUEST_TTL_SECONDS",
                    &defaults.request_ttl_seconds.to_string(),
                )?,
                token_ttl_seconds: parse_env(
                    "HANDOFF_TOKEN_TTL_SECONDS",
                    &defaults.token_ttl_seconds.to_string(),
                )?,
                poll_interval_ms: parse_env(
                    "HANDOFF_POLL_INTERVAL_MS",
                    &defaults.poll_interval_ms.to_string(),
                )?,
                max_poll_attempts: parse_env(
                    "HANDOFF_MAX_POLL_ATTEMPTS",
                    &defaults.max_poll_attempts.to_string(),
                )?,
                bridge_retry_delay_ms: parse_env(
                    "HANDOFF_BRIDGE_RETRY_DELAY_MS",
                    &defaults.bridge_retry_delay_ms.to_string(),
                )?,
                consume_redirect_delay_ms: parse_env(
                    "HANDOFF_CONSUME_REDIRECT_DELAY_MS",
                    &defaults.consume_redirect_delay_ms.to_string(),
                )?,
                login_url: env::var("HANDOFF_LOGIN_URL").unwrap_or(defaults.login_url),
            },
            artifacts: ArtifactProviderConfig {
                provider_url: get_optional_env("ARTIFACT_PROVIDER_URL")
                    .map(|u| u.trim_end_matches('/').to_string()),
            },
            rate_limit: RateLimitConfig {
                status_limit: parse_env("RATE_LIMIT_STATUS_LIMIT", "60")?,
                status_window_seconds: parse_env("RATE_LIMIT_STATUS_WINDOW_SECONDS", "60")?,
                global_ip_limit: parse_env("RATE_LIMIT_GLOBAL_IP_LIMIT", "300")?,
                global_ip_window_seconds: parse_env("RATE_LIMIT_GLOBAL_IP_WINDOW_SECONDS", "60")?,
                trust_forwarded_for: parse_env("TRUST_X_FORWARDED_FOR", "false")?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.handoff.request_ttl_seconds == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HANDOFF_REQUEST_TTL_SECONDS must be positive"
            )));
        }

        if self.handoff.token_ttl_seconds == 0
            || self.handoff.token_ttl_seconds > MAX_TOKEN_TTL_SECONDS
        {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "HANDOFF_TOKEN_TTL_SECONDS must be between 1 and {}",
                MAX_TOKEN_TTL_SECONDS
            )));
        }

        if self.handoff.poll_interval_ms == 0 || self.handoff.max_poll_attempts == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "Polling interval and attempt cap must be positive"
            )));
        }

        match reqwest::Url::parse(&self.public_base_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            _ => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "PUBLIC_BASE_URL must be an absolute http(s) URL"
                )))
            }
        }

        if self.environment == Environment::Prod {
            if self.security.proof_secret.expose_secret().len() < MIN_PROOF_SECRET_BYTES {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "HANDOFF_PROOF_SECRET must be at least {} bytes in production",
                    MIN_PROOF_SECRET_BYTES
                )));
            }

            if self.redis.url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "REDIS_URL is required in production"
                )));
            }

            if self.artifacts.provider_url.is_none() {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "ARTIFACT_PROVIDER_URL is required in production"
                )));
            }

            if !self.security.secure_cookies {
                tracing::error!("SECURE_COOKIES is disabled in production - session cookies will be sent over plain HTTP");
            }
        }

        Ok(())
    }
}

fn random_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

fn get_optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parse_env<T>(key: &str, default: &str) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = env::var(key).unwrap_or_else(|_| default.to_string());
    raw.trim().parse().map_err(|e: T::Err| {
        AppError::ConfigError(anyhow::anyhow!("{} has an invalid value '{}': {}", key, raw, e))
    })
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> HandoffConfig {
    HandoffConfig {
        common: core_config::Config::default(),
        environment: Environment::Dev,
        service_name: "handoff-service-test".to_string(),
        service_version: "0.1.0".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        public_base_url: "https://site.test".to_string(),
        redis: RedisConfig { url: None },
        security: SecurityConfig {
            proof_secret: Secret::new("test-proof-secret-0123456789abcdef".to_string()),
            secure_cookies: false,
            session_inactivity_minutes: 60,
        },
        handoff: HandoffSettings::default(),
        artifacts: ArtifactProviderConfig { provider_url: None },
        rate_limit: RateLimitConfig {
            status_limit: 60,
            status_window_seconds: 60,
            global_ip_limit: 300,
            global_ip_window_seconds: 60,
            trust_forwarded_for: false,
        },
    }
}
