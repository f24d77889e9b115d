//! soldeploy is a CLI tool to compile a Solidity contract, deploy it and interact with it.

mod cli;

use std::sync::Arc;

use alloy_core::json_abi::JsonAbi;
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Table, presets::UTF8_FULL};

use cli::{Cli, Command, ContractCall};
use soldeploy_deploy::{
    ChainClient, ContractHandle, DeployConfig, Deployer, FunctionCall, HttpTransport, format_value,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up PRIVATE_KEY and friends from a local .env file.
    dotenv::dotenv().ok();

    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let config = load_config(&cli)?;

    match cli.command {
        Command::Compile { source, contract } => {
            let config = DeployConfig {
                source_path: source.unwrap_or(config.source_path),
                contract_name: contract.unwrap_or(config.contract_name),
                ..config
            };
            let artifact = Deployer::compile(&config).await?;

            println!("{}", abi_table(&artifact.abi));
            println!(
                "{} ({} bytes of creation code), full output written to {}",
                artifact.contract_name,
                artifact.bytecode.len(),
                config.output_path.display()
            );
        }
        Command::Run => {
            let deployer = Deployer::connect(config)?;

            tracing::info!(
                rpc_url = %deployer.config().rpc_url,
                chain_id = deployer.config().chain_id,
                address = %deployer.address(),
                nonce_policy = %deployer.config().nonce_policy,
                "Starting deployment..."
            );

            let report = deployer.run().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Call(call) => {
            // Read-only: no signing key needed.
            let chain = ChainClient::new(Arc::new(HttpTransport::new(config.rpc_url.clone())?));
            let contract = contract_handle(&config, &call).await?;

            let values = contract
                .call(&chain, config.sender, &call.function, &call.args)
                .await?;
            let rendered: Vec<String> = values.iter().map(format_value).collect();
            println!("{}", rendered.join(", "));
        }
        Command::Transact(call) => {
            let deployer = Deployer::connect(config)?;
            let contract = contract_handle(deployer.config(), &call).await?;

            deployer.check_chain_id().await?;
            let nonce = deployer.fetch_nonce().await?;
            let receipt = deployer
                .transact(
                    &contract,
                    &FunctionCall::new(call.function, call.args),
                    nonce,
                )
                .await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}

/// Layered configuration with command line overrides applied on top.
fn load_config(cli: &Cli) -> Result<DeployConfig> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;

    if let Some(rpc_url) = &cli.rpc_url {
        config.rpc_url = rpc_url.clone();
    }
    if let Some(chain_id) = cli.chain_id {
        config.chain_id = chain_id;
    }
    if let Some(nonce_policy) = cli.nonce_policy {
        config.nonce_policy = nonce_policy;
    }

    if let Some(path) = &cli.save_config {
        config.save_to_file(path)?;
    }

    Ok(config)
}

/// Build a handle from `--abi`, or compile the configured source to get the ABI.
async fn contract_handle(config: &DeployConfig, call: &ContractCall) -> Result<ContractHandle> {
    let abi = match &call.abi {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read ABI file {}", path.display()))?;
            serde_json::from_str::<JsonAbi>(&content)
                .with_context(|| format!("Failed to parse ABI file {}", path.display()))?
        }
        None => Deployer::compile(config).await?.abi,
    };

    Ok(ContractHandle::new(call.address, abi))
}

fn abi_table(abi: &JsonAbi) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(vec!["Kind", "Signature", "Selector", "Mutability"]);

    if let Some(constructor) = abi.constructor() {
        let inputs: Vec<String> = constructor.inputs.iter().map(|p| p.ty.clone()).collect();
        table.add_row(vec![
            "constructor".to_string(),
            format!("constructor({})", inputs.join(",")),
            String::new(),
            constructor.state_mutability.as_json_str().to_string(),
        ]);
    }

    for function in abi.functions() {
        table.add_row(vec![
            "function".to_string(),
            function.signature(),
            function.selector().to_string(),
            function.state_mutability.as_json_str().to_string(),
        ]);
    }

    for event in abi.events() {
        table.add_row(vec![
            "event".to_string(),
            event.signature(),
            event.selector().to_string(),
            String::new(),
        ]);
    }

    table
}
