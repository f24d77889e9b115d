//! Build → sign → submit → confirm pipeline for a single transaction.
//!
//! Each transaction moves through `Built → Signed → Submitted → Confirmed`, or ends
//! in `TimedOut`/`Rejected`. Nothing is retried: a submitted transaction can only be
//! superseded by another one at the same nonce, which this crate never does.

mod encode;
mod signer;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use serde::{Deserialize, Serialize};

pub use encode::{EIP1559_TX_TYPE, SignatureParts, signed_payload, signing_payload};
pub use signer::{Credential, TxSigner};

use crate::{
    DeployError,
    chain::{CallRequest, ChainClient, Receipt},
};

/// What a transaction does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxAction {
    /// Create a contract: init code followed by ABI-encoded constructor arguments.
    Create { bytecode: Bytes, args: Bytes },
    /// Call an existing contract with ABI-encoded calldata.
    Call { to: Address, data: Bytes },
}

impl TxAction {
    fn to(&self) -> Option<Address> {
        match self {
            Self::Create { .. } => None,
            Self::Call { to, .. } => Some(*to),
        }
    }

    fn input(&self) -> Bytes {
        match self {
            Self::Create { bytecode, args } => {
                let mut input = bytecode.to_vec();
                input.extend_from_slice(args);
                input.into()
            }
            Self::Call { data, .. } => data.clone(),
        }
    }
}

/// Fee fields of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TxFees {
    /// Pre-London pricing, signed with EIP-155 replay protection.
    Legacy { gas_price: U256 },
    /// EIP-1559 dynamic fees (type 2 envelope).
    Eip1559 {
        max_fee_per_gas: U256,
        max_priority_fee_per_gas: U256,
    },
}

/// A fully specified, not yet signed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub from: Address,
    pub nonce: u64,
    /// `None` for contract creation.
    pub to: Option<Address>,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub fees: TxFees,
}

/// A signed payload ready to broadcast exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    /// The encoded transaction passed to `eth_sendRawTransaction`.
    pub raw: Bytes,
    /// Keccak hash of `raw`, which is also the transaction hash on chain.
    pub hash: B256,
    pub nonce: u64,
}

/// Lifecycle of one transaction, logged at each transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum TxState {
    Built,
    Signed,
    Submitted,
    Confirmed,
    TimedOut,
    Rejected,
}

/// Percentage added on top of the node's gas estimate.
const GAS_LIMIT_HEADROOM_PERCENT: u64 = 20;

/// Fills gas and fee fields from the node to produce [`UnsignedTransaction`]s.
pub struct TransactionBuilder<'a> {
    chain: &'a ChainClient,
    chain_id: u64,
    from: Address,
}

impl<'a> TransactionBuilder<'a> {
    pub fn new(chain: &'a ChainClient, chain_id: u64, from: Address) -> Self {
        Self {
            chain,
            chain_id,
            from,
        }
    }

    /// Build a transaction for `action` at the given `nonce`.
    ///
    /// The nonce is taken as-is; the caller is responsible for never reusing one.
    pub async fn build(
        &self,
        action: &TxAction,
        nonce: u64,
    ) -> Result<UnsignedTransaction, DeployError> {
        let to = action.to();
        let input = action.input();

        let estimate = self
            .chain
            .estimate_gas(&CallRequest {
                from: Some(self.from),
                to,
                data: input.clone(),
                value: None,
            })
            .await?;
        let gas_limit = estimate + estimate * GAS_LIMIT_HEADROOM_PERCENT / 100;

        let fees = self.fees().await?;

        let tx = UnsignedTransaction {
            chain_id: self.chain_id,
            from: self.from,
            nonce,
            to,
            value: U256::ZERO,
            input,
            gas_limit,
            fees,
        };

        tracing::debug!(
            state = %TxState::Built,
            nonce,
            gas_limit,
            fees = ?tx.fees,
            create = to.is_none(),
            "Transaction built"
        );

        Ok(tx)
    }

    /// Dynamic fees when the latest block carries a base fee, legacy pricing otherwise.
    async fn fees(&self) -> Result<TxFees, DeployError> {
        match self.chain.latest_base_fee().await? {
            Some(base_fee) => {
                let max_priority_fee_per_gas = self.chain.max_priority_fee().await?;
                Ok(TxFees::Eip1559 {
                    max_fee_per_gas: base_fee * U256::from(2) + max_priority_fee_per_gas,
                    max_priority_fee_per_gas,
                })
            }
            None => Ok(TxFees::Legacy {
                gas_price: self.chain.gas_price().await?,
            }),
        }
    }
}

/// Sign `tx`, broadcast it and block until it is confirmed.
///
/// A mined transaction whose receipt reports failure yields `TransactionReverted`.
pub async fn sign_and_submit(
    chain: &ChainClient,
    signer: &TxSigner,
    tx: &UnsignedTransaction,
) -> Result<Receipt, DeployError> {
    let signed = signer.sign(tx)?;
    tracing::debug!(state = %TxState::Signed, nonce = signed.nonce, tx_hash = %signed.hash, "Transaction signed");

    submit_and_confirm(chain, &signed).await
}

/// Broadcast an already signed transaction and wait for its receipt.
pub async fn submit_and_confirm(
    chain: &ChainClient,
    signed: &SignedTransaction,
) -> Result<Receipt, DeployError> {
    let tx_hash = match chain.send_raw_transaction(signed).await {
        Ok(hash) => hash,
        Err(e) => {
            tracing::warn!(state = %TxState::Rejected, nonce = signed.nonce, error = %e, "Transaction rejected");
            return Err(e);
        }
    };

    if tx_hash != signed.hash {
        tracing::warn!(
            expected = %signed.hash,
            reported = %tx_hash,
            "Node reported a different transaction hash"
        );
    }

    tracing::info!(state = %TxState::Submitted, nonce = signed.nonce, tx_hash = %tx_hash, "Transaction submitted, waiting for receipt...");

    let receipt = match chain.wait_for_receipt(tx_hash).await {
        Ok(receipt) => receipt,
        Err(e) => {
            if matches!(e, DeployError::ConfirmationTimeout { .. }) {
                tracing::warn!(state = %TxState::TimedOut, tx_hash = %tx_hash, "Transaction not confirmed in time");
            }
            return Err(e);
        }
    };

    if !receipt.succeeded() {
        tracing::warn!(state = %TxState::Rejected, tx_hash = %tx_hash, "Transaction reverted");
        return Err(DeployError::TransactionReverted(tx_hash));
    }

    tracing::info!(
        state = %TxState::Confirmed,
        tx_hash = %tx_hash,
        block_number = ?receipt.block_number,
        gas_used = receipt.gas_used,
        "Transaction confirmed"
    );

    Ok(receipt)
}
