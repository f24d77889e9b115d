//! soldeploy-deploy - Compile, deploy and call Solidity contracts on an EVM chain.
//!
//! This crate provides the pipeline behind the `soldeploy` binary: a solc adapter, a
//! JSON-RPC chain client, a local transaction signer and the [`Deployer`] driver that
//! ties them together.

pub mod chain;
pub mod compiler;
pub mod config;
pub mod contract;
mod deployer;
mod error;
pub mod rpc;
pub mod transaction;

pub use chain::{ChainClient, ConfirmationPolicy, Receipt};
pub use compiler::{CompilationArtifact, SolcBinary, SolcCompiler, SolcInstaller};
pub use config::{DeployConfig, FunctionCall, NoncePolicy};
pub use contract::{ContractHandle, format_value};
pub use deployer::{Deployer, Deployment, DeploymentReport, FollowUpReport};
pub use error::DeployError;
pub use rpc::{HttpTransport, RpcResponse, RpcTransport};
pub use transaction::{
    Credential, SignedTransaction, TransactionBuilder, TxAction, TxSigner, TxState,
    UnsignedTransaction,
};
