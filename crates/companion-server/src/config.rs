use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use tracing::warn;

use companion_api::auth::Settings;

const DEV_SECRET: &str = "dev-secret-change-me";

#[derive(Debug)]
pub struct Config {
    pub db_path: PathBuf,
    pub addr: SocketAddr,
    pub jwt_secret: String,
    pub settings: Settings,
}

impl Config {
    /// Read `COMPANION_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("COMPANION_JWT_SECRET").unwrap_or_else(|| {
            warn!("COMPANION_JWT_SECRET not set, using the development secret");
            DEV_SECRET.to_string()
        });

        let host = var("COMPANION_HOST", "0.0.0.0");
        let port: u16 = var("COMPANION_PORT", "3000")
            .parse()
            .context("COMPANION_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        let defaults = Settings::default();
        let settings = Settings {
            chat_memory_policy: parsed(&get, "COMPANION_CHAT_MEMORY_POLICY", defaults.chat_memory_policy)?,
            deny_messages: parsed(&get, "COMPANION_DENY_MESSAGES", defaults.deny_messages)?,
            deny_memories: parsed(&get, "COMPANION_DENY_MEMORIES", defaults.deny_memories)?,
            deny_conversations: parsed(&get, "COMPANION_DENY_CONVERSATIONS", defaults.deny_conversations)?,
        };

        Ok(Self {
            db_path: PathBuf::from(var("COMPANION_DB_PATH", "companion.db")),
            addr,
            jwt_secret,
            settings,
        })
    }
}

fn parsed<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {}", key)),
        None => Ok(default),
    }
}
