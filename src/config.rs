//! Service configuration.
//!
//! Loaded from an optional TOML file. Every field has a default, so an
//! empty file (or no file) gives a working local setup:
//!
//! ```toml
//! build = "1.4.2"
//! log_format = "json"
//!
//! [web]
//! api_host = "0.0.0.0:3000"
//! debug_host = "127.0.0.1:4000"
//! request_timeout_secs = 10
//! shutdown_timeout_secs = 20
//!
//! [panics]
//! shutdown_after = 5
//! ```

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("parsing: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Build identifier reported by the liveness endpoint.
    pub build: String,
    pub log_format: LogFormat,
    pub web: WebConfig,
    pub panics: PanicConfig,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WebConfig {
    pub api_host: String,
    pub debug_host: String,
    pub request_timeout_secs: u64,
    pub shutdown_timeout_secs: u64,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PanicConfig {
    /// Number of caught panics after which the service asks to be shut
    /// down. Unset: never.
    pub shutdown_after: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            build: "develop".to_owned(),
            log_format: LogFormat::default(),
            web: WebConfig::default(),
            panics: PanicConfig::default(),
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            api_host: "0.0.0.0:3000".to_owned(),
            debug_host: "0.0.0.0:4000".to_owned(),
            request_timeout_secs: 10,
            shutdown_timeout_secs: 20,
        }
    }
}

impl Config {
    /// Loads the file at `path`, or the defaults when there is none, and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&content)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parses a TOML document. Does not validate.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let api = self.web.api_addr()?;
        let debug = self.web.debug_addr()?;
        if api == debug {
            return Err(ConfigError::Invalid {
                field: "web.debug_host",
                reason: format!("must differ from web.api_host ({api})"),
            });
        }
        if self.web.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "web.request_timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.web.shutdown_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "web.shutdown_timeout_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        Ok(())
    }
}

impl WebConfig {
    pub fn api_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("web.api_host", &self.api_host)
    }

    pub fn debug_addr(&self) -> Result<SocketAddr, ConfigError> {
        parse_addr("web.debug_host", &self.debug_host)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

fn parse_addr(field: &'static str, value: &str) -> Result<SocketAddr, ConfigError> {
    value.parse().map_err(|e| ConfigError::Invalid { field, reason: format!("{value:?}: {e}") })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::load(None).unwrap();
        assert_eq!(config.build, "develop");
        assert_eq!(config.log_format, LogFormat::Pretty);
        assert_eq!(config.web.api_addr().unwrap().port(), 3000);
        assert_eq!(config.web.debug_addr().unwrap().port(), 4000);
        assert_eq!(config.panics.shutdown_after, None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let config = Config::from_toml_str(
            r#"
            build = "1.4.2"
            log_format = "json"

            [web]
            debug_host = "127.0.0.1:4100"

            [panics]
            shutdown_after = 5
            "#,
        )
        .unwrap();

        config.validate().unwrap();
        assert_eq!(config.build, "1.4.2");
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.web.api_host, "0.0.0.0:3000");
        assert_eq!(config.web.debug_host, "127.0.0.1:4100");
        assert_eq!(config.web.shutdown_timeout(), Duration::from_secs(20));
        assert_eq!(config.panics.shutdown_after, Some(5));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let err = Config::from_toml_str("[web]\napi_hots = \"0.0.0.0:1\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn shared_listener_is_rejected() {
        let config = Config::from_toml_str(
            "[web]\napi_host = \"127.0.0.1:3000\"\ndebug_host = \"127.0.0.1:3000\"\n",
        )
        .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "web.debug_host", .. }));
    }

    #[test]
    fn bad_address_and_zero_timeout_are_rejected() {
        let config = Config::from_toml_str("[web]\napi_host = \"localhost\"\n").unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "web.api_host", .. }
        ));

        let config = Config::from_toml_str("[web]\nrequest_timeout_secs = 0\n").unwrap();
        assert!(matches!(
            config.validate().unwrap_err(),
            ConfigError::Invalid { field: "web.request_timeout_secs", .. }
        ));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = Config::load(Some(Path::new("/nonexistent/corbel.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
