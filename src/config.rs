use std::{env, path::PathBuf, time::Duration};
use thiserror::Error;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_TIMEOUT_SECS: u64 = 15;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq)]
pub enum StoreBackend {
    Airtable { api_key: String, base_id: String },
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub port: u16,
    pub backend: StoreBackend,
    pub store_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds the config from any variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        let port = match get("PORT") {
            Some(value) => value.parse::<u16>().map_err(|_| ConfigError::Invalid {
                name: "PORT",
                value,
            })?,
            None => DEFAULT_PORT,
        };

        let store_timeout = match get("STORE_TIMEOUT_SECS") {
            Some(value) => match value.parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "STORE_TIMEOUT_SECS",
                        value,
                    });
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let backend = match get("DASHBOARD_STORE").as_deref() {
            Some("file") => StoreBackend::File {
                path: resolve_data_path(get("APP_DATA_PATH")),
            },
            Some("airtable") | None => StoreBackend::Airtable {
                api_key: get("AIRTABLE_API_KEY").ok_or(ConfigError::Missing("AIRTABLE_API_KEY"))?,
                base_id: get("AIRTABLE_BASE_ID").ok_or(ConfigError::Missing("AIRTABLE_BASE_ID"))?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    name: "DASHBOARD_STORE",
                    value: other.to_string(),
                });
            }
        };

        Ok(Self {
            port,
            backend,
            store_timeout,
        })
    }
}

pub fn resolve_data_path(value: Option<String>) -> PathBuf {
    value
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("data/store.json"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned())
    }

    #[test]
    fn airtable_requires_credentials() {
        assert_eq!(config(&[]), Err(ConfigError::Missing("AIRTABLE_API_KEY")));
        assert_eq!(
            config(&[("AIRTABLE_API_KEY", "key")]),
            Err(ConfigError::Missing("AIRTABLE_BASE_ID"))
        );

        let ok = config(&[("AIRTABLE_API_KEY", "key"), ("AIRTABLE_BASE_ID", "app")]).unwrap();
        assert_eq!(ok.port, 8080);
        assert_eq!(ok.store_timeout, Duration::from_secs(15));
    }

    #[test]
    fn file_backend_uses_data_path() {
        let cfg = config(&[
            ("DASHBOARD_STORE", "file"),
            ("APP_DATA_PATH", "/tmp/x.json"),
            ("PORT", "9000"),
            ("STORE_TIMEOUT_SECS", "3"),
        ])
        .unwrap();
        assert_eq!(
            cfg.backend,
            StoreBackend::File {
                path: PathBuf::from("/tmp/x.json")
            }
        );
        assert_eq!(cfg.port, 9000);
        assert_eq!(cfg.store_timeout, Duration::from_secs(3));
    }

    #[test]
    fn bad_values_are_rejected() {
        assert!(matches!(
            config(&[("DASHBOARD_STORE", "file"), ("PORT", "http")]),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
        assert!(matches!(
            config(&[("DASHBOARD_STORE", "file"), ("STORE_TIMEOUT_SECS", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
        assert!(matches!(
            config(&[("DASHBOARD_STORE", "sqlite")]),
            Err(ConfigError::Invalid { name: "DASHBOARD_STORE", .. })
        ));
    }
}
