use std::fmt;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

const DEFAULT_TOKEN_TTL_HOURS: i64 = 72;

/// Process-wide settings, read once at startup and handed to each component.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub token: TokenConfig,
    pub push: PushConfig,
}

#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: chrono::Duration,
}

/// VAPID credentials used to sign every outgoing push.
#[derive(Clone)]
pub struct PushConfig {
    /// URL-safe base64, uncompressed P-256 point. Handed to browsers as `applicationServerKey`.
    pub public_key: String,
    /// URL-safe base64, raw P-256 scalar.
    pub private_key: String,
    /// `mailto:` or `https:` contact sent as the VAPID `sub` claim.
    pub contact: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup. Missing JWT secret or VAPID keys is an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| get(key).with_context(|| format!("{} must be set", key));

        let ttl_hours = match get("RALLY_TOKEN_TTL_HOURS") {
            Some(raw) => raw
                .parse::<i64>()
                .with_context(|| format!("RALLY_TOKEN_TTL_HOURS is not a number: {}", raw))?,
            None => DEFAULT_TOKEN_TTL_HOURS,
        };
        if ttl_hours <= 0 {
            bail!("RALLY_TOKEN_TTL_HOURS must be positive");
        }

        let port = match get("RALLY_PORT") {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("RALLY_PORT is not a port: {}", raw))?,
            None => 8080,
        };

        let contact = get("VAPID_CONTACT").unwrap_or_else(|| "mailto:admin@localhost".into());
        if !(contact.starts_with("mailto:") || contact.starts_with("https://")) {
            bail!("VAPID_CONTACT must be a mailto: or https:// URI");
        }

        Ok(Self {
            database_path: PathBuf::from(get("RALLY_DB_PATH").unwrap_or_else(|| "rally.db".into())),
            host: get("RALLY_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            token: TokenConfig {
                secret: required("RALLY_JWT_SECRET")?,
                ttl: chrono::Duration::hours(ttl_hours),
            },
            push: PushConfig {
                public_key: required("VAPID_PUBLIC_KEY")?,
                private_key: required("VAPID_PRIVATE_KEY")?,
                contact,
            },
        })
    }
}

impl fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl fmt::Debug for PushConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushConfig")
            .field("public_key", &self.public_key)
            .field("private_key", &"<redacted>")
            .field("contact", &self.contact)
            .finish()
    }
}
