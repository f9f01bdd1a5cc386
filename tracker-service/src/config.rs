use std::env;
use std::net::{IpAddr, SocketAddr};

use anyhow::Context;

pub const DEFAULT_PORT: u16 = 8087;
pub const DEFAULT_ALLOWED_ORIGINS: &[&str] = &[
    "http://localhost:3000",
    "http://localhost:5173",
];

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub database_url: String,
    pub host: IpAddr,
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub db_max_connections: u32,
}

impl TrackerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL").context("DATABASE_URL must be set")?;
        let host = lookup("HOST").unwrap_or_else(|| "0.0.0.0".to_string());
        let host: IpAddr = host
            .parse()
            .with_context(|| format!("HOST '{host}' is not an IP address"))?;
        let port = lookup("PORT")
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let allowed_origins = lookup("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .map(str::to_string)
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty())
            .unwrap_or_else(|| DEFAULT_ALLOWED_ORIGINS.iter().map(|o| o.to_string()).collect());
        let db_max_connections = lookup("DB_MAX_CONNECTIONS")
            .and_then(|v| v.parse().ok())
            .unwrap_or(10);

        Ok(TrackerConfig {
            database_url,
            host,
            port,
            allowed_origins,
            db_max_connections,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        SocketAddr::from((self.host, self.port))
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
    fn defaults_apply() {
        let cfg = TrackerConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/tracker")]))
            .unwrap();
        assert_eq!(cfg.addr().to_string(), "0.0.0.0:8087");
        assert_eq!(cfg.allowed_origins.len(), DEFAULT_ALLOWED_ORIGINS.len());
        assert_eq!(cfg.db_max_connections, 10);
    }

    #[test]
    fn database_url_is_required() {
        let err = TrackerConfig::from_lookup(lookup(&[])).unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = TrackerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tracker"),
            ("HOST", "127.0.0.1"),
            ("PORT", "9000"),
            ("ALLOWED_ORIGINS", "https://app.example.com, https://staging.example.com"),
        ]))
        .unwrap();
        assert_eq!(cfg.addr().to_string(), "127.0.0.1:9000");
        assert_eq!(
            cfg.allowed_origins,
            vec!["https://app.example.com", "https://staging.example.com"]
        );
    }

    #[test]
    fn bad_host_is_rejected() {
        let err = TrackerConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db/tracker"),
            ("HOST", "not-an-ip"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("not-an-ip"));
    }
}
