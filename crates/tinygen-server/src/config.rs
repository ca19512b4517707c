use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context as _, Error};
use jsonwebtoken::Algorithm;

use tinygen_auth::TokenConfig;
use tinygen_engine::EngineSettings;

/// Process configuration, read once at startup from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub token: TokenConfig,
    pub engine: EngineSettings,
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    /// Read configuration from environment variables.
    ///
    /// A missing or empty `JWT_SECRET_KEY` is a fatal configuration error; the
    /// process must not start without it.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_source(&|key| std::env::var(key).ok())
    }

    pub fn from_source(source: &dyn Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let secret = source("JWT_SECRET_KEY")
            .filter(|v| !v.is_empty())
            .context("JWT_SECRET_KEY environment variable is not set")?;

        let algorithm = match source("ALGORITHM") {
            Some(value) => Algorithm::from_str(&value)
                .ok()
                .with_context(|| format!("unsupported signing algorithm {value:?}"))?,
            None => Algorithm::HS256,
        };

        let token = TokenConfig {
            secret,
            algorithm,
            expire_minutes: parse_or(source, "ACCESS_TOKEN_EXPIRE_MINUTES", 30)?,
        };

        let engine = EngineSettings {
            model_name: source("APP_MODEL_NAME")
                .unwrap_or_else(|| "tinyllama-1.1b".to_string()),
            model_path: source("APP_MODEL_PATH").map(PathBuf::from),
            cache_dir: source("APP_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("./data")),
            max_length: parse_or(source, "APP_MAX_LENGTH", 200)?,
            temperature: parse_or(source, "APP_TEMPERATURE", 0.7)?,
        };

        let host = source("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = parse_or(source, "APP_PORT", 8000)?;

        Ok(Self {
            token,
            engine,
            host,
            port,
        })
    }
}

fn parse_or<T: FromStr>(
    source: &dyn Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, Error>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match source(key) {
        Some(value) => value
            .parse()
            .with_context(|| format!("invalid value for {key}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn source(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_missing_secret_is_fatal() {
        let err = ServerConfig::from_source(&source(&[])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET_KEY"));
    }

    #[test]
    fn test_empty_secret_is_fatal() {
        let err = ServerConfig::from_source(&source(&[("JWT_SECRET_KEY", "")])).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET_KEY"));
    }

    #[test]
    fn test_defaults() {
        let config =
            ServerConfig::from_source(&source(&[("JWT_SECRET_KEY", "secret")])).expect("config");

        assert_eq!(config.token.algorithm, Algorithm::HS256);
        assert_eq!(config.token.expire_minutes, 30);
        assert_eq!(config.engine.model_name, "tinyllama-1.1b");
        assert_eq!(config.engine.model_path, None);
        assert_eq!(config.engine.cache_dir, PathBuf::from("./data"));
        assert_eq!(config.engine.max_length, 200);
        assert_eq!(config.engine.temperature, 0.7);
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_overrides() {
        let config = ServerConfig::from_source(&source(&[
            ("JWT_SECRET_KEY", "secret"),
            ("ALGORITHM", "HS384"),
            ("ACCESS_TOKEN_EXPIRE_MINUTES", "5"),
            ("APP_MODEL_NAME", "eagle-7b"),
            ("APP_MODEL_PATH", "/models/eagle-7b.st"),
            ("APP_CACHE_DIR", "/var/cache/models"),
            ("APP_MAX_LENGTH", "64"),
            ("APP_TEMPERATURE", "0.2"),
            ("APP_HOST", "0.0.0.0"),
            ("APP_PORT", "9000"),
        ]))
        .expect("config");

        assert_eq!(config.token.algorithm, Algorithm::HS384);
        assert_eq!(config.token.expire_minutes, 5);
        assert_eq!(config.engine.model_name, "eagle-7b");
        assert_eq!(
            config.engine.model_path,
            Some(PathBuf::from("/models/eagle-7b.st"))
        );
        assert_eq!(config.engine.cache_dir, PathBuf::from("/var/cache/models"));
        assert_eq!(config.engine.max_length, 64);
        assert_eq!(config.engine.temperature, 0.2);
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
    }

    #[test]
    fn test_unsupported_algorithm_rejected() {
        let err = ServerConfig::from_source(&source(&[
            ("JWT_SECRET_KEY", "secret"),
            ("ALGORITHM", "none"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("signing algorithm"));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = ServerConfig::from_source(&source(&[
            ("JWT_SECRET_KEY", "secret"),
            ("APP_PORT", "not-a-port"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("APP_PORT"));
    }
}
