use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};

/// Server settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub upload_dir: PathBuf,
    pub static_dir: PathBuf,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let port = var("PORT", "8080");
        let port: u16 = port
            .parse()
            .with_context(|| format!("PORT must be a port number, got '{}'", port))?;

        Ok(Self {
            host: var("ARBOR_HOST", "0.0.0.0"),
            port,
            db_path: var("ARBOR_DB_PATH", "arbor.db").into(),
            upload_dir: var("ARBOR_UPLOAD_DIR", "uploads").into(),
            static_dir: var("ARBOR_STATIC_DIR", "build").into(),
        })
    }

    pub fn addr(&self) -> Result<SocketAddr> {
        let addr = format!("{}:{}", self.host, self.port);
        addr.parse()
            .with_context(|| format!("invalid listen address '{}'", addr))
    }
}
