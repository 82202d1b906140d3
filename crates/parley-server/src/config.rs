use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::warn;

const DEV_SECRET: &str = "dev-secret-change-me";

/// Server settings, read from `PARLEY_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub addr: SocketAddr,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("PARLEY_JWT_SECRET").unwrap_or_else(|| {
            warn!("PARLEY_JWT_SECRET not set, using the development secret");
            DEV_SECRET.into()
        });
        let db_path = get("PARLEY_DB_PATH").unwrap_or_else(|| "parley.db".into());
        let host = get("PARLEY_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("PARLEY_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("PARLEY_PORT must be a port number")?;

        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", host, port))?;

        Ok(Self {
            jwt_secret,
            db_path: PathBuf::from(db_path),
            addr,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.jwt_secret, DEV_SECRET);
        assert_eq!(config.db_path, PathBuf::from("parley.db"));
        assert_eq!(config.addr, "0.0.0.0:3000".parse().unwrap());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("PARLEY_JWT_SECRET", "s3cret"),
            ("PARLEY_DB_PATH", "/tmp/chat.db"),
            ("PARLEY_HOST", "127.0.0.1"),
            ("PARLEY_PORT", "8080"),
        ]))
        .unwrap();
        assert_eq!(config.jwt_secret, "s3cret");
        assert_eq!(config.db_path, PathBuf::from("/tmp/chat.db"));
        assert_eq!(config.addr, "127.0.0.1:8080".parse().unwrap());
    }

    #[test]
    fn test_bad_port() {
        assert!(Config::from_lookup(lookup(&[("PARLEY_PORT", "http")])).is_err());
    }
}
