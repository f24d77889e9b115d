//! Deployment configuration.
//!
//! Values are layered with figment: built-in defaults, then `soldeploy.toml` (or an
//! explicit file), then `SOLDEPLOY_*` environment variables. The bare `PRIVATE_KEY`
//! variable is also honoured.

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use alloy_core::primitives::Address;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{DeployError, chain::ConfirmationPolicy, transaction::Credential};

/// The default name for the configuration file.
pub const CONFIG_FILENAME: &str = "soldeploy.toml";

/// Prefix of the environment variables read by [`DeployConfig::load`].
pub const ENV_PREFIX: &str = "SOLDEPLOY_";

/// Default JSON-RPC endpoint: a local development node.
pub const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";

/// Chain id used by local development nodes (Anvil, Hardhat).
pub const DEFAULT_CHAIN_ID: u64 = 31337;

/// How the driver picks the nonce of the follow-up transaction.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum NoncePolicy {
    /// Fetch once, then increment in memory for every transaction of the run.
    #[default]
    Local,
    /// Re-read the pending nonce from the node before every transaction.
    Refetch,
}

/// A contract function and its arguments, as strings coerced through the ABI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub function: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl FunctionCall {
    pub fn new(function: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            function: function.into(),
            args,
        }
    }
}

impl std::fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.function, self.args.join(", "))
    }
}

/// Everything the deployment driver needs for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeployConfig {
    /// JSON-RPC endpoint of the target node.
    pub rpc_url: Url,
    /// Chain id the transactions are signed for.
    pub chain_id: u64,
    /// Solidity source to compile.
    pub source_path: PathBuf,
    /// Contract to deploy from the source.
    pub contract_name: String,
    /// Compiler release, e.g. `0.7.0`.
    pub solc_version: String,
    /// Explicit compiler binary. When unset, the release is installed into the user data dir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solc_path: Option<PathBuf>,
    /// Extra command line arguments passed to solc.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub solc_args: Vec<String>,
    /// Where the full compiler output is written.
    pub output_path: PathBuf,
    /// Enables the solc optimizer with this many runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimizer_runs: Option<u32>,
    #[serde(default)]
    pub constructor_args: Vec<String>,
    /// State-changing call issued against the fresh deployment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<FunctionCall>,
    /// Zero-argument read-only function called before and after the follow-up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<String>,
    #[serde(default)]
    pub nonce_policy: NoncePolicy,
    pub confirmation_timeout_secs: u64,
    pub poll_interval_ms: u64,
    /// Expected sender address; must match the signing key when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<Address>,

    /// Hex private key. Never written back to disk.
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
    /// BIP-39 phrase, used instead of `private_key`. Never written back to disk.
    #[serde(default, skip_serializing)]
    pub mnemonic: Option<String>,
    #[serde(default)]
    pub mnemonic_index: u32,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            rpc_url: Url::parse(DEFAULT_RPC_URL).expect("default RPC URL is valid"),
            chain_id: DEFAULT_CHAIN_ID,
            source_path: PathBuf::from("./test.sol"),
            contract_name: "SimpleStorage".to_string(),
            solc_version: "0.7.0".to_string(),
            solc_path: None,
            solc_args: Vec::new(),
            output_path: PathBuf::from("compiled_code.json"),
            optimizer_runs: None,
            constructor_args: Vec::new(),
            follow_up: Some(FunctionCall::new("store", vec!["15".to_string()])),
            probe: Some("retrieve".to_string()),
            nonce_policy: NoncePolicy::Local,
            confirmation_timeout_secs: 120,
            poll_interval_ms: 1000,
            sender: None,
            private_key: None,
            mnemonic: None,
            mnemonic_index: 0,
        }
    }
}

impl DeployConfig {
    /// Layered configuration: defaults, TOML file, then environment.
    ///
    /// `path` replaces the default `soldeploy.toml`; a missing default file is ignored.
    pub fn figment(path: Option<&Path>) -> Figment {
        let file = path.map_or_else(|| PathBuf::from(CONFIG_FILENAME), Path::to_path_buf);

        Figment::from(Serialized::defaults(DeployConfig::default()))
            .merge(Toml::file(file))
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(
                Env::raw()
                    .only(&["PRIVATE_KEY"])
                    .map(|_| "private_key".into()),
            )
    }

    /// Extract a configuration from `figment`.
    pub fn from_figment(figment: &Figment) -> Result<Self, DeployError> {
        figment
            .extract()
            .map_err(|e| DeployError::Config(e.to_string()))
    }

    /// Load the layered configuration.
    pub fn load(path: Option<&Path>) -> Result<Self, DeployError> {
        if let Some(path) = path {
            if !path.exists() {
                return Err(DeployError::Config(format!(
                    "configuration file not found: {}",
                    path.display()
                )));
            }
        }

        let config = Self::from_figment(&Self::figment(path))?;
        tracing::debug!(?path, "Configuration loaded");
        Ok(config)
    }

    /// Save the configuration to a TOML file. Key material is never written.
    pub fn save_to_file(&self, path: &Path) -> Result<(), DeployError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DeployError::Config(format!("failed to serialize config: {e}")))?;
        std::fs::write(path, content)?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    /// Load the configuration from a TOML file only, without defaults or environment.
    pub fn load_from_file(path: &Path) -> Result<Self, DeployError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DeployError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        toml::from_str(&content)
            .map_err(|e| DeployError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Resolve the signing credential.
    ///
    /// A missing key is an error here, before anything touches the network.
    pub fn credential(&self) -> Result<Credential, DeployError> {
        let private_key = self
            .private_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty());
        let mnemonic = self
            .mnemonic
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty());

        match (private_key, mnemonic) {
            (Some(key), None) => Ok(Credential::PrivateKey(key.to_string())),
            (None, Some(phrase)) => Ok(Credential::Mnemonic {
                phrase: phrase.to_string(),
                index: self.mnemonic_index,
            }),
            (Some(_), Some(_)) => Err(DeployError::InvalidCredential(
                "both a private key and a mnemonic are configured; keep only one".to_string(),
            )),
            (None, None) => Err(DeployError::InvalidCredential(format!(
                "no signing key configured; set {ENV_PREFIX}PRIVATE_KEY or PRIVATE_KEY"
            ))),
        }
    }

    pub fn confirmation(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            timeout: Duration::from_secs(self.confirmation_timeout_secs),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}
