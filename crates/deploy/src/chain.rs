//! Chain client: nonce, fee, call and submission primitives over one RPC endpoint.

use std::{sync::Arc, time::Duration};

use alloy_core::primitives::{Address, B256, Bytes, U256};
use backon::{ConstantBuilder, Retryable};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    DeployError,
    rpc::{
        RpcResponse, RpcTransport, deserialize_opt_u64_from_hex, deserialize_u64_from_hex,
        json_rpc_call, parse_hex_u64,
    },
    transaction::SignedTransaction,
};

/// Default upper bound on how long to wait for a receipt.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_secs(120);

/// Default interval between receipt polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1000);

/// Confirmation record returned once a transaction is included in a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub block_number: Option<u64>,
    /// `1` on success, `0` on revert. Pre-Byzantium receipts carry no status.
    #[serde(default, deserialize_with = "deserialize_opt_u64_from_hex")]
    pub status: Option<u64>,
    #[serde(default)]
    pub contract_address: Option<Address>,
    #[serde(deserialize_with = "deserialize_u64_from_hex")]
    pub gas_used: u64,
}

impl Receipt {
    pub fn succeeded(&self) -> bool {
        self.status != Some(0)
    }
}

/// Request body shared by `eth_call` and `eth_estimateGas`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CallRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<Address>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<Address>,
    pub data: Bytes,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockHeader {
    #[serde(default)]
    base_fee_per_gas: Option<U256>,
}

/// Bounds for the receipt polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl ConfirmationPolicy {
    /// Number of polls that fit in the timeout window, at least one.
    fn max_polls(&self) -> usize {
        let interval = self.poll_interval.as_millis().max(1);
        (self.timeout.as_millis() / interval).max(1) as usize
    }
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_CONFIRMATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

/// Receipt polling outcome used to drive the retry loop.
#[derive(Debug)]
enum Poll {
    Pending,
    Failed(DeployError),
}

/// Handle to a single remote node.
///
/// One handle is held for the whole run; there is no pooling and no retry beyond
/// the receipt polling loop.
#[derive(Clone)]
pub struct ChainClient {
    transport: Arc<dyn RpcTransport>,
    confirmation: ConfirmationPolicy,
}

impl ChainClient {
    pub fn new(transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            transport,
            confirmation: ConfirmationPolicy::default(),
        }
    }

    /// Override the receipt polling bounds.
    pub fn with_confirmation(mut self, confirmation: ConfirmationPolicy) -> Self {
        self.confirmation = confirmation;
        self
    }

    pub fn endpoint(&self) -> String {
        self.transport.endpoint()
    }

    pub fn confirmation(&self) -> ConfirmationPolicy {
        self.confirmation
    }

    pub async fn chain_id(&self) -> Result<u64, DeployError> {
        let id: String = json_rpc_call(self.transport.as_ref(), "eth_chainId", vec![]).await?;
        parse_hex_u64(&id).map_err(|e| DeployError::Rpc {
            method: "eth_chainId".to_string(),
            message: format!("invalid chain id {id}: {e}"),
        })
    }

    /// Next nonce for `address`, counting transactions still in the pool.
    pub async fn nonce(&self, address: Address) -> Result<u64, DeployError> {
        let count: String = json_rpc_call(
            self.transport.as_ref(),
            "eth_getTransactionCount",
            vec![serde_json::json!(address), serde_json::json!("pending")],
        )
        .await?;

        parse_hex_u64(&count).map_err(|e| DeployError::Rpc {
            method: "eth_getTransactionCount".to_string(),
            message: format!("invalid transaction count {count}: {e}"),
        })
    }

    pub async fn gas_price(&self) -> Result<U256, DeployError> {
        json_rpc_call(self.transport.as_ref(), "eth_gasPrice", vec![]).await
    }

    pub async fn max_priority_fee(&self) -> Result<U256, DeployError> {
        json_rpc_call(self.transport.as_ref(), "eth_maxPriorityFeePerGas", vec![]).await
    }

    /// Base fee of the latest block, `None` on chains without EIP-1559.
    pub async fn latest_base_fee(&self) -> Result<Option<U256>, DeployError> {
        let block: Option<BlockHeader> = json_rpc_call(
            self.transport.as_ref(),
            "eth_getBlockByNumber",
            vec![serde_json::json!("latest"), serde_json::json!(false)],
        )
        .await?;

        Ok(block.and_then(|b| b.base_fee_per_gas))
    }

    pub async fn estimate_gas(&self, request: &CallRequest) -> Result<u64, DeployError> {
        let gas: String = json_rpc_call(
            self.transport.as_ref(),
            "eth_estimateGas",
            vec![serde_json::json!(request)],
        )
        .await?;

        parse_hex_u64(&gas).map_err(|e| DeployError::Rpc {
            method: "eth_estimateGas".to_string(),
            message: format!("invalid gas estimate {gas}: {e}"),
        })
    }

    /// Execute a call against the latest state without creating a transaction.
    pub async fn call(&self, request: &CallRequest) -> Result<Bytes, DeployError> {
        json_rpc_call(
            self.transport.as_ref(),
            "eth_call",
            vec![serde_json::json!(request), serde_json::json!("latest")],
        )
        .await
    }

    /// Broadcast a signed transaction and return the hash reported by the node.
    ///
    /// Node rejections are classified into nonce conflicts and other rejections.
    pub async fn send_raw_transaction(
        &self,
        signed: &SignedTransaction,
    ) -> Result<B256, DeployError> {
        let response = self
            .transport
            .request(
                "eth_sendRawTransaction",
                vec![serde_json::json!(signed.raw)],
            )
            .await?;

        match response {
            RpcResponse::Result(value) => {
                serde_json::from_value(value).map_err(|e| DeployError::Rpc {
                    method: "eth_sendRawTransaction".to_string(),
                    message: format!("invalid transaction hash: {e}"),
                })
            }
            RpcResponse::Error(error) => {
                Err(DeployError::from_submission(signed.nonce, error.message))
            }
        }
    }

    pub async fn receipt(&self, tx_hash: B256) -> Result<Option<Receipt>, DeployError> {
        let receipt: Option<Value> = json_rpc_call(
            self.transport.as_ref(),
            "eth_getTransactionReceipt",
            vec![serde_json::json!(tx_hash)],
        )
        .await?;

        receipt
            .map(|r| {
                serde_json::from_value(r).map_err(|e| DeployError::Rpc {
                    method: "eth_getTransactionReceipt".to_string(),
                    message: format!("malformed receipt: {e}"),
                })
            })
            .transpose()
    }

    /// Poll until the transaction has a receipt, or fail after the confirmation timeout.
    pub async fn wait_for_receipt(&self, tx_hash: B256) -> Result<Receipt, DeployError> {
        let backoff = ConstantBuilder::default()
            .with_delay(self.confirmation.poll_interval)
            .with_max_times(self.confirmation.max_polls());

        let fetch = || async {
            match self.receipt(tx_hash).await {
                Ok(Some(receipt)) => Ok(receipt),
                Ok(None) => Err(Poll::Pending),
                Err(e) => Err(Poll::Failed(e)),
            }
        };

        let polling = fetch
            .retry(backoff)
            .sleep(tokio::time::sleep)
            .when(|e| matches!(e, Poll::Pending))
            .notify(|_, after| {
                tracing::trace!(tx_hash = %tx_hash, ?after, "Receipt not available yet, polling again...");
            });

        let timed_out = || DeployError::ConfirmationTimeout {
            tx_hash,
            waited_secs: self.confirmation.timeout.as_secs(),
        };

        // Bounded in wall time as well as in number of polls.
        match tokio::time::timeout(self.confirmation.timeout, polling).await {
            Ok(Ok(receipt)) => Ok(receipt),
            Ok(Err(Poll::Pending)) | Err(_) => Err(timed_out()),
            Ok(Err(Poll::Failed(e))) => Err(e),
        }
    }
}
