use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Context;

use tether_gateway::dispatcher::DEFAULT_MAILBOX_CAPACITY;

const DEV_JWT_SECRET: &str = "dev-secret-change-me";

/// Runtime settings, read from `TETHER_*` environment variables (and a
/// `.env` file when present).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Prefix for relative avatar paths. Empty leaves avatars untouched.
    pub media_base_url: String,
    pub mailbox_capacity: usize,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        // Load .env if present
        let _ = dotenvy::dotenv();

        let port = env_or("TETHER_PORT", "3000")
            .parse()
            .context("TETHER_PORT must be a port number")?;
        let mailbox_capacity = env_or("TETHER_MAILBOX_CAPACITY", &DEFAULT_MAILBOX_CAPACITY.to_string())
            .parse()
            .context("TETHER_MAILBOX_CAPACITY must be a positive integer")?;

        Ok(Self {
            host: env_or("TETHER_HOST", "0.0.0.0"),
            port,
            db_path: PathBuf::from(env_or("TETHER_DB_PATH", "tether.db")),
            jwt_secret: env_or("TETHER_JWT_SECRET", DEV_JWT_SECRET),
            media_base_url: env_or("TETHER_MEDIA_BASE_URL", ""),
            mailbox_capacity,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }

    pub fn uses_dev_secret(&self) -> bool {
        self.jwt_secret == DEV_JWT_SECRET
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 3000,
            db_path: PathBuf::from("tether.db"),
            jwt_secret: DEV_JWT_SECRET.into(),
            media_base_url: String::new(),
            mailbox_capacity: DEFAULT_MAILBOX_CAPACITY,
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
