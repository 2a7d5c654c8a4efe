//! Relayer configuration.
//!
//! Settings are layered in this order, later sources overriding earlier ones:
//!
//! 1. every `*.json` file in `./config`
//! 2. the files listed, comma separated, in `CONFIG_FILES`
//! 3. environment variables prefixed with `RELAYER_`, nested keys separated
//!    by `__`, e.g. `RELAYER_SERVER__PORT=3000` or
//!    `RELAYER_SIGNER_KEYS=0xkey1,0xkey2`

use std::collections::HashMap;
use std::env;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use eyre::{bail, Context, Result};
use serde::{Deserialize, Deserializer};

use bossfight_core::{Address, LocalWallet};
use bossfight_ethereum::ConnectionConf;

pub use self::trace::{Level, Style, TracingConfig};

mod trace;

/// Upper bound on configured signer keys
pub const MAX_SIGNER_KEYS: usize = 50;

const ENV_PREFIX: &str = "RELAYER";

/// A private key that never shows up in logs
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct SecretKey(String);

impl SecretKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn wallet(&self) -> Result<LocalWallet> {
        self.0
            .trim()
            .parse::<LocalWallet>()
            .context("Invalid signer key")
    }
}

impl Debug for SecretKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(<redacted>)")
    }
}

/// Accept either a list of keys or a single comma separated string
fn deserialize_keys<'de, D>(deserializer: D) -> Result<Vec<SecretKey>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Keys {
        List(Vec<SecretKey>),
        Joined(String),
    }

    Ok(match Keys::deserialize(deserializer)? {
        Keys::List(keys) => keys,
        Keys::Joined(joined) => joined
            .split(',')
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(SecretKey::new)
            .collect(),
    })
}

fn default_port() -> u16 {
    3000
}

fn default_route() -> String {
    "/api/relayer".to_owned()
}

/// HTTP listener settings
#[derive(Clone, Debug, Deserialize)]
pub struct ServerConf {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_route")]
    pub route: String,
}

impl Default for ServerConf {
    fn default() -> Self {
        Self {
            port: default_port(),
            route: default_route(),
        }
    }
}

/// Queue processor settings
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ProcessorConf {
    /// Pause after every attempt
    pub submission_delay_ms: u64,
    /// Confirmations to wait for before a submission counts as done
    pub confirmations: usize,
    /// How long to wait for those confirmations
    pub confirmation_timeout_secs: u64,
    /// Failed attempts after which a request is dead-lettered. Unset retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ProcessorConf {
    fn default() -> Self {
        Self {
            submission_delay_ms: 100,
            confirmations: 1,
            confirmation_timeout_secs: 150,
            max_attempts: None,
        }
    }
}

impl ProcessorConf {
    pub fn submission_delay(&self) -> Duration {
        Duration::from_millis(self.submission_delay_ms)
    }

    pub fn confirmation_timeout(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout_secs)
    }
}

/// Settings for the relayer binary
#[derive(Clone, Debug, Deserialize)]
pub struct RelayerSettings {
    pub rpc_url: String,
    pub contract_address: Address,
    /// Chain the game client expects. Not used for signing, which follows the node.
    #[serde(default)]
    pub chain_id: Option<u64>,
    #[serde(deserialize_with = "deserialize_keys")]
    pub signer_keys: Vec<SecretKey>,
    #[serde(default)]
    pub server: ServerConf,
    #[serde(default)]
    pub processor: ProcessorConf,
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl RelayerSettings {
    /// Load settings from `./config`, `CONFIG_FILES` and the process environment.
    pub fn new() -> Result<Self> {
        load_settings(Path::new("./config"), env::vars().collect())
    }

    /// Wallets for every configured key, in configuration order
    pub fn wallets(&self) -> Result<Vec<LocalWallet>> {
        self.signer_keys
            .iter()
            .enumerate()
            .map(|(i, key)| key.wallet().with_context(|| format!("signer_keys[{i}]")))
            .collect()
    }

    pub fn connection_conf(&self) -> ConnectionConf {
        ConnectionConf::new(self.rpc_url.clone(), self.contract_address)
            .with_confirmation_timeout(self.processor.confirmation_timeout())
    }

    fn validate(&self) -> Result<()> {
        if self.signer_keys.is_empty() {
            bail!("At least one signer key must be configured");
        }
        if self.signer_keys.len() > MAX_SIGNER_KEYS {
            bail!(
                "At most {MAX_SIGNER_KEYS} signer keys are supported, got {}",
                self.signer_keys.len()
            );
        }
        if !self.server.route.starts_with('/') {
            bail!("Server route must start with '/': {}", self.server.route);
        }
        self.wallets()?;
        Ok(())
    }
}

/// Load and validate settings from `config_dir` and the given environment.
pub(crate) fn load_settings(
    config_dir: &Path,
    env: HashMap<String, String>,
) -> Result<RelayerSettings> {
    let mut config_sources = vec![];
    let mut builder = Config::builder();

    // default config files, in name order
    if let Ok(entries) = config_dir.read_dir() {
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "json"))
            .collect();
        paths.sort();
        for path in paths {
            config_sources.push(path.display().to_string());
            builder = builder.add_source(File::from(path));
        }
    }

    // additional user specified config files
    let config_file_paths: Vec<String> = env
        .get("CONFIG_FILES")
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default();
    for path in &config_file_paths {
        config_sources.push(path.clone());
        builder = builder.add_source(File::with_name(path));
    }

    let config = builder
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(Some(env)),
        )
        .build()?;

    let settings = config
        .try_deserialize::<RelayerSettings>()
        .map_err(eyre::Report::new)
        .map_err(|err| {
            config_sources
                .iter()
                .fold(err, |err, source| err.wrap_err(format!("Config loaded: {source}")))
        })?;
    settings.validate()?;
    Ok(settings)
}
