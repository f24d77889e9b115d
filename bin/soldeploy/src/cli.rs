use std::path::PathBuf;

use alloy_core::primitives::Address;
use clap::{Parser, Subcommand};
use soldeploy_deploy::{NoncePolicy, config::CONFIG_FILENAME};
use tracing::level_filters::LevelFilter;
use url::Url;

#[derive(Parser)]
#[command(name = "soldeploy")]
#[command(
    author,
    version,
    about = "Compile a Solidity contract, deploy it and call it"
)]
pub struct Cli {
    /// The verbosity level.
    #[arg(short, long, global = true, env = "SOLDEPLOY_VERBOSITY", default_value_t = LevelFilter::INFO)]
    pub verbosity: LevelFilter,

    /// Path to a configuration file.
    ///
    /// If not provided, `soldeploy.toml` in the working directory is used when present.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// The URL of the JSON-RPC endpoint. Overrides the configuration.
    #[arg(long, alias = "rpc", global = true)]
    pub rpc_url: Option<Url>,

    /// The chain ID transactions are signed for. Overrides the configuration.
    #[arg(long, global = true)]
    pub chain_id: Option<u64>,

    /// How the nonce of follow-up transactions is chosen: `local` or `refetch`.
    #[arg(long, global = true)]
    pub nonce_policy: Option<NoncePolicy>,

    /// Write the effective configuration (without key material) to this path.
    ///
    /// A path must be attached with `=`; a bare `--save-config` writes `soldeploy.toml`.
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = CONFIG_FILENAME
    )]
    pub save_config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Compile the source and print the contract interface.
    Compile {
        /// Solidity file to compile. Overrides the configuration.
        #[arg(long)]
        source: Option<PathBuf>,

        /// Contract to extract from the compiler output. Overrides the configuration.
        #[arg(long)]
        contract: Option<String>,
    },

    /// Compile, deploy, then send the configured follow-up transaction.
    Run,

    /// Call a read-only function of a deployed contract. Nothing is signed or sent.
    Call(ContractCall),

    /// Sign and send one transaction calling a deployed contract.
    Transact(ContractCall),
}

#[derive(clap::Args)]
pub struct ContractCall {
    /// Address of the deployed contract.
    #[arg(long)]
    pub address: Address,

    /// JSON ABI file of the contract.
    ///
    /// If not provided, the configured source is compiled to obtain it.
    #[arg(long)]
    pub abi: Option<PathBuf>,

    /// Function name.
    pub function: String,

    /// Function arguments, parsed according to the ABI.
    pub args: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bare_save_config_keeps_subcommand() {
        let cli = Cli::try_parse_from(["soldeploy", "--save-config", "compile"]).unwrap();

        assert_eq!(cli.save_config, Some(PathBuf::from(CONFIG_FILENAME)));
        assert!(matches!(cli.command, Command::Compile { .. }));
    }

    #[test]
    fn test_bare_save_config_keeps_function_name() {
        let cli = Cli::try_parse_from([
            "soldeploy",
            "call",
            "--address",
            "0x0000000000000000000000000000000000000001",
            "--save-config",
            "retrieve",
        ])
        .unwrap();

        assert_eq!(cli.save_config, Some(PathBuf::from(CONFIG_FILENAME)));
        let Command::Call(call) = cli.command else {
            panic!("expected the call subcommand");
        };
        assert_eq!(call.function, "retrieve");
        assert!(call.args.is_empty());
    }

    #[test]
    fn test_save_config_with_path() {
        let cli = Cli::try_parse_from(["soldeploy", "--save-config=out.toml", "run"]).unwrap();

        assert_eq!(cli.save_config, Some(PathBuf::from("out.toml")));
        assert!(matches!(cli.command, Command::Run));
    }

    #[test]
    fn test_no_save_config() {
        let cli = Cli::try_parse_from(["soldeploy", "run"]).unwrap();
        assert_eq!(cli.save_config, None);
    }
}
