//! Error taxonomy for the compile → deploy → call pipeline.

use std::path::PathBuf;

use alloy_core::primitives::B256;
use thiserror::Error;

/// Errors surfaced by the deployment library.
///
/// None of these are recovered locally: every stage propagates its failure to the
/// caller, which aborts the run.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The Solidity source could not be read.
    #[error("source file not found: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// The compiler reported errors for the given source.
    #[error("compilation failed:\n{0}")]
    Compilation(String),

    /// The requested compiler version could not be obtained.
    #[error("solc version {version} is unavailable: {reason}")]
    VersionUnavailable { version: String, reason: String },

    /// The compiler output does not contain the requested contract.
    #[error("contract `{contract}` not found in compiler output for `{source_name}`")]
    ContractNotFound { source_name: String, contract: String },

    /// The RPC endpoint could not be reached.
    #[error("failed to reach RPC endpoint {url}: {reason}")]
    Connection { url: String, reason: String },

    /// The signing credential is missing, malformed or does not match the sender.
    #[error("invalid credential: {0}")]
    InvalidCredential(String),

    /// The node rejected the transaction because its nonce was reused or out of order.
    #[error("nonce conflict for nonce {nonce}: {message}")]
    NonceConflict { nonce: u64, message: String },

    /// The node rejected the signed payload for another reason.
    #[error("transaction rejected: {0}")]
    SubmissionRejected(String),

    /// No receipt was observed within the confirmation window.
    #[error("no receipt for transaction {tx_hash} after {waited_secs}s")]
    ConfirmationTimeout { tx_hash: B256, waited_secs: u64 },

    /// The transaction was mined but reverted.
    #[error("transaction {0} reverted")]
    TransactionReverted(B256),

    /// The node returned a JSON-RPC error that does not map onto a more specific kind.
    #[error("RPC error from {method}: {message}")]
    Rpc { method: String, message: String },

    /// A contract function or its arguments did not match the ABI.
    #[error("ABI error: {0}")]
    Abi(String),

    /// The configuration is incomplete or inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Node error fragments that indicate a reused or out-of-order nonce.
const NONCE_CONFLICT_MARKERS: &[&str] = &[
    "nonce too low",
    "nonce too high",
    "already known",
    "replacement transaction underpriced",
    "invalid nonce",
    "nonce has already been used",
];

impl DeployError {
    /// Classify an error returned by `eth_sendRawTransaction`.
    ///
    /// Anything that is not a nonce problem is reported as a rejected submission.
    pub fn from_submission(nonce: u64, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if NONCE_CONFLICT_MARKERS.iter().any(|m| lower.contains(m)) {
            return Self::NonceConflict { nonce, message };
        }

        Self::SubmissionRejected(message)
    }

    /// Whether this error was produced by the node rejecting a reused nonce.
    pub fn is_nonce_conflict(&self) -> bool {
        matches!(self, Self::NonceConflict { .. })
    }
}
