//! Deployment driver: compile once, deploy once, then issue one follow-up call.

use std::sync::Arc;

use alloy_core::{
    dyn_abi::DynSolValue,
    primitives::{Address, B256},
};
use serde::Serialize;

use crate::{
    DeployError,
    chain::{ChainClient, Receipt},
    compiler::{CompilationArtifact, Optimizer, SolcBinary, SolcCompiler, SolcInstaller},
    config::{DeployConfig, FunctionCall, NoncePolicy},
    contract::{ContractHandle, encode_constructor_args, format_value},
    rpc::{HttpTransport, RpcTransport},
    transaction::{TransactionBuilder, TxAction, TxSigner, sign_and_submit},
};

/// A freshly deployed contract and the receipt of its creation.
#[derive(Debug, Clone)]
pub struct Deployment {
    pub contract: ContractHandle,
    pub receipt: Receipt,
}

/// Outcome of the follow-up transaction.
#[derive(Debug, Clone, Serialize)]
pub struct FollowUpReport {
    pub call: String,
    pub nonce: u64,
    pub tx_hash: B256,
    pub block_number: Option<u64>,
}

/// Summary of a full [`Deployer::run`].
#[derive(Debug, Clone, Serialize)]
pub struct DeploymentReport {
    pub contract_name: String,
    pub contract_address: Address,
    pub deploy_nonce: u64,
    pub deploy_tx_hash: B256,
    pub deploy_block: Option<u64>,
    pub follow_up: Option<FollowUpReport>,
    /// Probe result before the follow-up call.
    pub probe_before: Option<String>,
    /// Probe result after the follow-up call.
    pub probe_after: Option<String>,
    /// Nonce the next transaction from this account should use.
    pub next_nonce: u64,
}

/// Orchestrates compile → deploy → follow-up for a single account.
///
/// The driver owns the chain connection and the signing key for the whole run.
/// The nonce is threaded explicitly through every build call.
pub struct Deployer {
    config: DeployConfig,
    chain: ChainClient,
    signer: TxSigner,
}

impl Deployer {
    /// Create a driver over `transport`.
    ///
    /// Fails with `InvalidCredential` when no usable key is configured, before any
    /// network traffic. A zero poll interval is rejected with `Config`.
    pub fn new(config: DeployConfig, transport: Arc<dyn RpcTransport>) -> Result<Self, DeployError> {
        let signer = TxSigner::from_credential(&config.credential()?)?;

        if let Some(sender) = config.sender {
            if sender != signer.address() {
                return Err(DeployError::InvalidCredential(format!(
                    "configured sender {sender} does not match the signing key address {}",
                    signer.address()
                )));
            }
        }

        if config.poll_interval_ms == 0 {
            return Err(DeployError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }

        let chain = ChainClient::new(transport).with_confirmation(config.confirmation());

        tracing::debug!(address = %signer.address(), endpoint = %chain.endpoint(), "Deployer ready");

        Ok(Self {
            config,
            chain,
            signer,
        })
    }

    /// Create a driver talking HTTP JSON-RPC to `config.rpc_url`.
    pub fn connect(config: DeployConfig) -> Result<Self, DeployError> {
        let transport = HttpTransport::new(config.rpc_url.clone())?;
        Self::new(config, Arc::new(transport))
    }

    pub fn config(&self) -> &DeployConfig {
        &self.config
    }

    pub fn chain(&self) -> &ChainClient {
        &self.chain
    }

    /// Address of the signing account.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Compiler configured for this run.
    pub fn compiler(config: &DeployConfig) -> Result<SolcCompiler, DeployError> {
        let binary = match &config.solc_path {
            Some(path) => SolcBinary::Path(path.clone()),
            None => SolcBinary::Managed(SolcInstaller::new()?),
        };
        let optimizer = config
            .optimizer_runs
            .map(|runs| Optimizer { enabled: true, runs });

        Ok(SolcCompiler::new(config.solc_version.clone(), binary)
            .optimizer(optimizer)
            .extra_args(config.solc_args.clone()))
    }

    /// Compile the configured source, save the output tree and return the contract artifact.
    pub async fn compile(config: &DeployConfig) -> Result<CompilationArtifact, DeployError> {
        let compiler = Self::compiler(config)?;
        let (source_name, compilation) = compiler.compile_file(&config.source_path).await?;

        compilation.save_output(&config.output_path)?;

        let artifact = compilation.artifact(&source_name, &config.contract_name)?;
        tracing::info!(
            contract = %artifact.contract_name,
            bytecode_len = artifact.bytecode.len(),
            functions = artifact.abi.functions().count(),
            "Contract compiled"
        );

        Ok(artifact)
    }

    /// Make sure the node serves the chain the transactions are signed for.
    pub async fn check_chain_id(&self) -> Result<(), DeployError> {
        let remote = self.chain.chain_id().await?;
        if remote != self.config.chain_id {
            return Err(DeployError::Config(format!(
                "endpoint {} serves chain {remote}, but chain_id is set to {}",
                self.chain.endpoint(),
                self.config.chain_id
            )));
        }
        Ok(())
    }

    /// Current pending nonce of the signing account.
    pub async fn fetch_nonce(&self) -> Result<u64, DeployError> {
        let nonce = self.chain.nonce(self.address()).await?;
        tracing::info!(address = %self.address(), nonce, "Nonce fetched");
        Ok(nonce)
    }

    fn builder(&self) -> TransactionBuilder<'_> {
        TransactionBuilder::new(&self.chain, self.config.chain_id, self.address())
    }

    /// Submit the contract-creation transaction at `nonce` and wait for it.
    pub async fn deploy(
        &self,
        artifact: &CompilationArtifact,
        nonce: u64,
    ) -> Result<Deployment, DeployError> {
        let args = encode_constructor_args(&artifact.abi, &self.config.constructor_args)?;
        let action = TxAction::Create {
            bytecode: artifact.bytecode.clone(),
            args,
        };

        tracing::info!(contract = %artifact.contract_name, nonce, "Deploying contract...");

        let tx = self.builder().build(&action, nonce).await?;
        let receipt = sign_and_submit(&self.chain, &self.signer, &tx).await?;

        let address = receipt.contract_address.ok_or_else(|| {
            DeployError::Rpc {
                method: "eth_getTransactionReceipt".to_string(),
                message: format!(
                    "receipt for {} has no contract address",
                    receipt.transaction_hash
                ),
            }
        })?;

        tracing::info!(contract = %artifact.contract_name, contract_address = %address, "Contract deployed");

        Ok(Deployment {
            contract: ContractHandle::new(address, artifact.abi.clone()),
            receipt,
        })
    }

    /// Sign and submit `call` against `contract` at `nonce`, waiting for confirmation.
    pub async fn transact(
        &self,
        contract: &ContractHandle,
        call: &FunctionCall,
        nonce: u64,
    ) -> Result<Receipt, DeployError> {
        let data = contract.encode_call(&call.function, &call.args)?;
        let action = TxAction::Call {
            to: contract.address,
            data,
        };

        tracing::info!(contract = %contract.address, call = %call, nonce, "Sending transaction...");

        let tx = self.builder().build(&action, nonce).await?;
        sign_and_submit(&self.chain, &self.signer, &tx).await
    }

    /// Read-only call; bypasses the transaction pipeline entirely.
    pub async fn call(
        &self,
        contract: &ContractHandle,
        function: &str,
        args: &[String],
    ) -> Result<Vec<DynSolValue>, DeployError> {
        contract
            .call(&self.chain, Some(self.address()), function, args)
            .await
    }

    async fn probe(&self, contract: &ContractHandle) -> Result<Option<String>, DeployError> {
        let Some(function) = self.config.probe.as_deref() else {
            return Ok(None);
        };

        let values = self.call(contract, function, &[]).await?;
        let rendered = values.iter().map(format_value).collect::<Vec<_>>().join(", ");
        tracing::info!(function, result = %rendered, "Probe");

        Ok(Some(rendered))
    }

    /// Compile, then deploy and follow up starting from the account's current nonce.
    pub async fn run(&self) -> Result<DeploymentReport, DeployError> {
        let artifact = Self::compile(&self.config).await?;
        self.check_chain_id().await?;
        let nonce = self.fetch_nonce().await?;
        self.run_from(&artifact, nonce).await
    }

    /// Deploy `artifact` at `nonce`, then issue the follow-up call.
    ///
    /// Under [`NoncePolicy::Local`] the follow-up uses `nonce + 1`; under
    /// [`NoncePolicy::Refetch`] the node is asked again. A stale `nonce` makes the
    /// deployment fail with `NonceConflict`.
    pub async fn run_from(
        &self,
        artifact: &CompilationArtifact,
        nonce: u64,
    ) -> Result<DeploymentReport, DeployError> {
        let deployment = self.deploy(artifact, nonce).await?;
        let contract = &deployment.contract;

        let mut next_nonce = self.next_nonce(nonce).await?;

        let probe_before = self.probe(contract).await?;

        let follow_up = match &self.config.follow_up {
            Some(call) => {
                let follow_up_nonce = next_nonce;
                let receipt = self
                    .transact(contract, call, follow_up_nonce)
                    .await
                    .inspect_err(|e| {
                        tracing::warn!(
                            contract = %contract.address,
                            deploy_tx_hash = %deployment.receipt.transaction_hash,
                            error = %e,
                            "Follow-up failed, the contract remains deployed"
                        );
                    })?;
                next_nonce = self.next_nonce(follow_up_nonce).await?;

                Some(FollowUpReport {
                    call: call.to_string(),
                    nonce: follow_up_nonce,
                    tx_hash: receipt.transaction_hash,
                    block_number: receipt.block_number,
                })
            }
            None => None,
        };

        let probe_after = match follow_up {
            Some(_) => self.probe(contract).await?,
            None => None,
        };

        Ok(DeploymentReport {
            contract_name: artifact.contract_name.clone(),
            contract_address: contract.address,
            deploy_nonce: nonce,
            deploy_tx_hash: deployment.receipt.transaction_hash,
            deploy_block: deployment.receipt.block_number,
            follow_up,
            probe_before,
            probe_after,
            next_nonce,
        })
    }

    async fn next_nonce(&self, used: u64) -> Result<u64, DeployError> {
        match self.config.nonce_policy {
            NoncePolicy::Local => Ok(used + 1),
            NoncePolicy::Refetch => self.fetch_nonce().await,
        }
    }
}
