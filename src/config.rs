//! Console configuration.
//!
//! Settings are layered from a TOML file and `COREWATCH_` environment
//! variables, with `__` separating sections from keys:
//!
//! ```bash
//! COREWATCH_CONNECTION__ORIGIN=https://monitor.internal corewatch
//! ```
//!
//! Every setting has a default, so a missing file yields a console that
//! connects to `ws://127.0.0.1:8080/ws` and watches no cores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::data::duration::deserialize_duration;
use crate::data::ring::DEFAULT_LOG_CAPACITY;
use crate::data::{AggregatorOptions, SourceRegistration, DEFAULT_STALE_FACTOR, DEFAULT_SWEEP_INTERVAL};
use crate::session::{SessionOptions, DEFAULT_PING_INTERVAL};

/// Configuration file read when none is given.
pub const DEFAULT_CONFIG_PATH: &str = "corewatch.toml";

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "COREWATCH";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    pub connection: ConnectionConfig,
    pub liveness: LivenessConfig,
    pub credentials: BTreeMap<String, CredentialConfig>,
    pub cores: BTreeMap<String, CoreConfig>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Origin of the monitor server, e.g. `http://127.0.0.1:8080`.
    pub origin: String,
    pub path: String,
    #[serde(deserialize_with = "deserialize_duration")]
    pub ping_interval: Duration,
    /// Omit to retry forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:8080".to_string(),
            path: "/ws".to_string(),
            ping_interval: DEFAULT_PING_INTERVAL,
            max_reconnect_attempts: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LivenessConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub sweep_interval: Duration,
    pub stale_factor: u32,
    pub log_capacity: usize,
    /// How often the inventory is re-read.
    #[serde(deserialize_with = "deserialize_duration")]
    pub inventory_refresh: Duration,
}

impl Default for LivenessConfig {
    fn default() -> Self {
        Self {
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
            stale_factor: DEFAULT_STALE_FACTOR,
            log_capacity: DEFAULT_LOG_CAPACITY,
            inventory_refresh: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CredentialConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CoreConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_core_interval")]
    pub interval: String,
    #[serde(default)]
    pub credential: Option<String>,
}

fn default_core_interval() -> String {
    "1s".to_string()
}

impl ConsoleConfig {
    /// Load from `path` (if it exists) and the environment.
    pub fn load(path: &Path) -> Result<Self> {
        Self::from_sources(path, Environment::with_prefix(ENV_PREFIX))
    }

    fn from_sources(path: &Path, env: Environment) -> Result<Self> {
        let env = env.prefix_separator("_").separator("__").try_parsing(true);
        let config = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(env)
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path.display()))?;

        let config: ConsoleConfig = config
            .try_deserialize()
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the console cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.connection.ping_interval.is_zero() {
            bail!("connection.ping_interval must be greater than zero");
        }
        if self.liveness.sweep_interval.is_zero() {
            bail!("liveness.sweep_interval must be greater than zero");
        }
        if self.liveness.inventory_refresh.is_zero() {
            bail!("liveness.inventory_refresh must be greater than zero");
        }
        if self.liveness.stale_factor == 0 {
            bail!("liveness.stale_factor must be at least 1");
        }
        if self.liveness.log_capacity == 0 {
            bail!("liveness.log_capacity must be at least 1");
        }
        self.endpoint()?;
        Ok(())
    }

    /// WebSocket endpoint derived from the configured origin and path.
    ///
    /// `http` maps to `ws` and `https` to `wss`.
    pub fn endpoint(&self) -> Result<String> {
        let origin = self.connection.origin.trim().trim_end_matches('/');
        let (scheme, authority) = origin
            .split_once("://")
            .with_context(|| format!("Origin {:?} has no scheme", origin))?;
        let scheme = match scheme.to_ascii_lowercase().as_str() {
            "http" | "ws" => "ws",
            "https" | "wss" => "wss",
            other => bail!("Unsupported origin scheme {:?}", other),
        };
        if authority.is_empty() {
            bail!("Origin {:?} has no host", origin);
        }

        let path = self.connection.path.trim();
        if path.starts_with('/') {
            Ok(format!("{}://{}{}", scheme, authority, path))
        } else {
            Ok(format!("{}://{}/{}", scheme, authority, path))
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            ping_interval: self.connection.ping_interval,
            max_reconnect_attempts: self.connection.max_reconnect_attempts,
        }
    }

    pub fn aggregator_options(&self) -> AggregatorOptions {
        AggregatorOptions {
            stale_factor: self.liveness.stale_factor,
            log_capacity: self.liveness.log_capacity,
        }
    }

    /// The `[cores]` table as registrations, sorted by name.
    pub fn registrations(&self) -> Vec<SourceRegistration> {
        self.cores
            .iter()
            .map(|(name, core)| {
                if let Some(credential) = &core.credential {
                    if !self.credentials.contains_key(credential) {
                        tracing::warn!("Core {} references unknown credential {}", name, credential);
                    }
                }
                SourceRegistration {
                    name: name.clone(),
                    host: core.host.clone(),
                    port: core.port,
                    interval: core.interval.clone(),
                    credential: core.credential.clone(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(Default::default()))
    }

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = ConsoleConfig::from_sources(Path::new("/nonexistent/corewatch.toml"), no_env())
            .unwrap();

        assert_eq!(config, ConsoleConfig::default());
        assert_eq!(config.endpoint().unwrap(), "ws://127.0.0.1:8080/ws");
        assert_eq!(config.session_options(), SessionOptions::default());
        assert_eq!(config.aggregator_options(), AggregatorOptions::default());
        assert!(config.registrations().is_empty());
    }

    #[test]
    fn test_full_file() {
        let file = write_config(
            r#"
            [connection]
            origin = "https://monitor.example.com/"
            path = "stream"
            ping_interval = "15s"
            max_reconnect_attempts = 20

            [liveness]
            sweep_interval = "2s"
            stale_factor = 4
            log_capacity = 500
            inventory_refresh = "1m"

            [credentials.local]
            path = "certs/local.pem"

            [cores.alpha]
            host = "10.0.0.2"
            port = 50051
            interval = "500ms"
            credential = "local"

            [cores.beta]
            host = "10.0.0.3"
            port = 50052
            "#,
        );

        let config = ConsoleConfig::from_sources(file.path(), no_env()).unwrap();

        assert_eq!(config.endpoint().unwrap(), "wss://monitor.example.com/stream");
        assert_eq!(config.connection.ping_interval, Duration::from_secs(15));
        assert_eq!(config.connection.max_reconnect_attempts, Some(20));
        assert_eq!(config.liveness.inventory_refresh, Duration::from_secs(60));
        assert_eq!(config.aggregator_options().stale_factor, 4);
        assert_eq!(
            config.credentials["local"].path,
            PathBuf::from("certs/local.pem")
        );

        let cores = config.registrations();
        assert_eq!(cores.len(), 2);
        assert_eq!(cores[0].name, "alpha");
        assert_eq!(cores[0].credential.as_deref(), Some("local"));
        assert_eq!(cores[0].poll_interval(), Duration::from_millis(500));
        assert_eq!(cores[1].interval, "1s");
    }

    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(
            r#"
            [connection]
            origin = "http://10.0.0.1:8080"
            "#,
        );

        let config = ConsoleConfig::from_sources(
            file.path(),
            env(&[
                ("COREWATCH_CONNECTION__ORIGIN", "http://10.9.9.9:9000"),
                ("COREWATCH_CONNECTION__MAX_RECONNECT_ATTEMPTS", "5"),
                ("COREWATCH_LIVENESS__SWEEP_INTERVAL", "1s"),
            ]),
        )
        .unwrap();

        assert_eq!(config.endpoint().unwrap(), "ws://10.9.9.9:9000/ws");
        assert_eq!(config.connection.max_reconnect_attempts, Some(5));
        assert_eq!(config.liveness.sweep_interval, Duration::from_secs(1));
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let file = write_config(
            r#"
            [liveness]
            stale_factor = 0
            "#,
        );
        assert!(ConsoleConfig::from_sources(file.path(), no_env()).is_err());

        let file = write_config(
            r#"
            [connection]
            ping_interval = "soon"
            "#,
        );
        assert!(ConsoleConfig::from_sources(file.path(), no_env()).is_err());
    }

    #[test]
    fn test_endpoint_derivation() {
        let mut config = ConsoleConfig::default();

        config.connection.origin = "ws://localhost:1234".to_string();
        assert_eq!(config.endpoint().unwrap(), "ws://localhost:1234/ws");

        config.connection.origin = "HTTPS://host".to_string();
        assert_eq!(config.endpoint().unwrap(), "wss://host/ws");

        config.connection.origin = "ftp://host".to_string();
        assert!(config.endpoint().is_err());

        config.connection.origin = "localhost:8080".to_string();
        assert!(config.endpoint().is_err());
    }
}
