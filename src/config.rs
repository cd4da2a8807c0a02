use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::{ChaindError, ChaindResult};

pub const DEFAULT_HOME: &str = "~/.chaind";
pub const DEFAULT_CONFIG_FILE: &str = "chaind.toml";

const VALID_ETH_APIS: &[&str] = &[
    "admin", "db", "debug", "eth", "miner", "net", "personal", "shh", "txpool", "web3",
];

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub home: String,
    #[serde(default)]
    pub cert_path: String,
    #[serde(default)]
    pub use_tls: bool,
    #[serde(default)]
    pub enable_prometheus: bool,
    pub eth: Option<EthConfig>,
    #[serde(default = "default_rpc_port")]
    pub rpc_port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    pub log_auditor: Option<LogAuditorConfig>,
    pub redis: Option<RedisConfig>,
    #[serde(rename = "backend", default)]
    pub backends: Vec<BackendConfig>,
}

fn default_rpc_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct EthConfig {
    #[serde(default)]
    pub apis: Vec<String>,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogAuditorConfig {
    pub log_file: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub db: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BackendType {
    Eth,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(rename = "type")]
    pub kind: BackendType,
    pub url: String,
    pub name: String,
    #[serde(default)]
    pub main: bool,
}

impl Config {
    /// Reads and parses `<home>/chaind.toml`. Does not validate; callers
    /// must call `validate` before acting on the result.
    pub fn read(home: &Path) -> ChaindResult<Config> {
        let cfg_file = home.join(DEFAULT_CONFIG_FILE);
        let raw = std::fs::read_to_string(&cfg_file)?;
        let mut cfg: Config = toml::from_str(&raw)?;
        cfg.home = home.to_string_lossy().to_string();
        Ok(cfg)
    }

    /// Mirrors `ValidateConfig` from the original source: at least one
    /// backend, at most one `main = true`, only ETH backends, every
    /// backend has a name and a parseable URL, and every listed API is in
    /// the fixed allow-list. Additionally (see DESIGN.md open question 5)
    /// rejects `use_tls = true` outright since TLS termination is not
    /// implemented here.
    pub fn validate(&self) -> ChaindResult<()> {
        if self.use_tls {
            return Err(ChaindError::Config(
                "TLS is not implemented; set use_tls = false".to_string(),
            ));
        }

        if self.backends.is_empty() {
            return Err(ChaindError::Config(
                "must define at least one backend".to_string(),
            ));
        }

        let mut has_main = false;
        for backend in &self.backends {
            if backend.main {
                if has_main {
                    return Err(ChaindError::Config(
                        "cannot have more than one main backend".to_string(),
                    ));
                }
                has_main = true;
            }

            if backend.kind != BackendType::Eth {
                return Err(ChaindError::Config(
                    "only Ethereum backends are supported right now".to_string(),
                ));
            }

            if backend.name.is_empty() {
                return Err(ChaindError::Config(
                    "backend name must be defined".to_string(),
                ));
            }

            url::Url::parse(&backend.url).map_err(|_| {
                ChaindError::Config(format!("invalid url: {}", backend.url))
            })?;
        }

        if let Some(eth) = &self.eth {
            for api in &eth.apis {
                if !VALID_ETH_APIS.contains(&api.as_str()) {
                    return Err(ChaindError::Config(format!(
                        "invalid API provided: {api}"
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Expands a leading `~` against `$HOME`, matching `go-homedir`'s `Expand`.
pub fn expand_home(raw: &str) -> ChaindResult<PathBuf> {
    if let Some(rest) = raw.strip_prefix('~') {
        let home = std::env::var("HOME").map_err(|_| {
            ChaindError::Config("failed to find home directory on this system".to_string())
        })?;
        let rest = rest.strip_prefix('/').unwrap_or(rest);
        Ok(PathBuf::from(home).join(rest))
    } else {
        Ok(PathBuf::from(raw))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_rejects_empty_backends() {
        let cfg = Config {
            home: String::new(),
            cert_path: String::new(),
            use_tls: false,
            enable_prometheus: false,
            eth: None,
            rpc_port: 8080,
            log_level: "info".to_string(),
            log_auditor: None,
            redis: None,
            backends: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_two_main_backends() {
        let backend = |main: bool| BackendConfig {
            kind: BackendType::Eth,
            url: "http://localhost:8545".to_string(),
            name: "node".to_string(),
            main,
        };
        let cfg = Config {
            home: String::new(),
            cert_path: String::new(),
            use_tls: false,
            enable_prometheus: false,
            eth: None,
            rpc_port: 8080,
            log_level: "info".to_string(),
            log_auditor: None,
            redis: None,
            backends: vec![backend(true), backend(true)],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_use_tls() {
        let cfg = Config {
            home: String::new(),
            cert_path: String::new(),
            use_tls: true,
            enable_prometheus: false,
            eth: None,
            rpc_port: 8080,
            log_level: "info".to_string(),
            log_auditor: None,
            redis: None,
            backends: vec![BackendConfig {
                kind: BackendType::Eth,
                url: "http://localhost:8545".to_string(),
                name: "node".to_string(),
                main: true,
            }],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn expand_home_substitutes_tilde() {
        std::env::set_var("HOME", "/home/tester");
        assert_eq!(
            expand_home("~/.chaind").unwrap(),
            PathBuf::from("/home/tester/.chaind")
        );
    }
}
