use std::path::PathBuf;

use anyhow::Context;
use serde::Deserialize;

/// How identity tokens are signed by the provider.
#[derive(Debug, Clone, Deserialize)]
pub enum IdentityKey {
    /// HS256 shared secret.
    Secret(String),
    /// RS256 public key in PEM form, read from disk at startup.
    PublicKeyPem(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    pub issuer: String,
    pub audience: String,
    pub key: IdentityKey,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitConfig {
    pub requests: u32,
    pub window_secs: u64,
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub database_max_connections: u32,
    pub host: String,
    pub port: u16,
    pub identity: IdentityConfig,
    pub storage: StorageConfig,
    pub rate_limit: RateLimitConfig,
    pub max_image_bytes: usize,
    pub cors_origins: Vec<String>,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;

        let key = match std::env::var("IDENTITY_PUBLIC_KEY_PATH") {
            Ok(path) => {
                let path = PathBuf::from(path);
                let pem = std::fs::read_to_string(&path)
                    .with_context(|| format!("read identity public key {}", path.display()))?;
                IdentityKey::PublicKeyPem(pem)
            }
            Err(_) => IdentityKey::Secret(std::env::var("IDENTITY_SECRET").context(
                "either IDENTITY_PUBLIC_KEY_PATH or IDENTITY_SECRET must be set",
            )?),
        };
        let identity = IdentityConfig {
            issuer: std::env::var("IDENTITY_ISSUER").context("IDENTITY_ISSUER is not set")?,
            audience: std::env::var("IDENTITY_AUDIENCE").context("IDENTITY_AUDIENCE is not set")?,
            key,
        };

        let storage = StorageConfig {
            endpoint: std::env::var("S3_ENDPOINT").context("S3_ENDPOINT is not set")?,
            bucket: std::env::var("S3_BUCKET").unwrap_or_else(|_| "toyshare".into()),
            access_key: std::env::var("S3_ACCESS_KEY").context("S3_ACCESS_KEY is not set")?,
            secret_key: std::env::var("S3_SECRET_KEY").context("S3_SECRET_KEY is not set")?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "us-east-1".into()),
        };

        let rate_limit = RateLimitConfig {
            requests: env_parse("RATE_LIMIT_REQUESTS", 100),
            window_secs: env_parse("RATE_LIMIT_WINDOW_SECS", 15 * 60),
            trust_proxy: env_parse("TRUST_PROXY", false),
        };

        let cors_origins = std::env::var("CORS_ORIGINS")
            .map(|v| parse_list(&v))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            database_max_connections: env_parse("DATABASE_MAX_CONNECTIONS", 10),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT", 8080),
            identity,
            storage,
            rate_limit,
            max_image_bytes: env_parse("MAX_IMAGE_BYTES", 5 * 1024 * 1024),
            cors_origins,
        })
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_list_skips_blanks() {
        assert_eq!(
            parse_list(" https://a.example , ,https://b.example,"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn env_parse_falls_back_on_garbage() {
        std::env::set_var("TOYSHARE_TEST_PARSE", "not-a-number");
        assert_eq!(env_parse::<u32>("TOYSHARE_TEST_PARSE", 7), 7);
        std::env::set_var("TOYSHARE_TEST_PARSE", " 42 ");
        assert_eq!(env_parse::<u32>("TOYSHARE_TEST_PARSE", 7), 42);
        std::env::remove_var("TOYSHARE_TEST_PARSE");
        assert_eq!(env_parse::<u32>("TOYSHARE_TEST_PARSE", 7), 7);
    }
}
