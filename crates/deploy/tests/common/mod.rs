//! In-process chain used by the integration tests.
//!
//! Accepts signed legacy and type-2 transactions from a single account, enforces
//! nonce ordering the way a node would, and executes the `store`/`retrieve` pair of
//! a SimpleStorage contract.

#![allow(dead_code)]

use std::{
    collections::HashMap,
    time::Duration,
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use alloy_core::{
    json_abi::JsonAbi,
    primitives::{Address, B256, Bytes, U256, keccak256},
    rlp::{Decodable, EMPTY_STRING_CODE, Header},
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use soldeploy_deploy::{
    CompilationArtifact, DeployConfig, DeployError, RpcResponse, RpcTransport,
    rpc::RpcErrorObject,
};

/// Private key of the first development account (`test test ... junk`, index 0).
pub const DEV_PRIVATE_KEY: &str =
    "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

pub const CHAIN_ID: u64 = 31337;

const STORE_SELECTOR: [u8; 4] = [0x60, 0x57, 0x36, 0x1d];
const RETRIEVE_SELECTOR: [u8; 4] = [0x2e, 0x64, 0xce, 0xc1];

/// What the chain extracted from a raw transaction.
#[derive(Debug, Clone)]
pub struct DecodedTx {
    pub typed: bool,
    pub chain_id: Option<u64>,
    pub nonce: u64,
    pub to: Option<Address>,
    pub input: Bytes,
}

fn decode_to(buf: &mut &[u8]) -> Option<Address> {
    if buf.first() == Some(&EMPTY_STRING_CODE) {
        *buf = &buf[1..];
        None
    } else {
        Some(Address::decode(buf).expect("to"))
    }
}

/// Decode the fields the chain cares about from a signed payload.
pub fn decode_raw(raw: &[u8]) -> DecodedTx {
    if raw[0] == 0x02 {
        let mut buf = &raw[1..];
        let header = Header::decode(&mut buf).expect("header");
        assert!(header.list);

        let chain_id = u64::decode(&mut buf).expect("chain id");
        let nonce = u64::decode(&mut buf).expect("nonce");
        let _priority = U256::decode(&mut buf).expect("priority fee");
        let _max_fee = U256::decode(&mut buf).expect("max fee");
        let _gas = u64::decode(&mut buf).expect("gas");
        let to = decode_to(&mut buf);
        let _value = U256::decode(&mut buf).expect("value");
        let input = Bytes::decode(&mut buf).expect("input");

        DecodedTx {
            typed: true,
            chain_id: Some(chain_id),
            nonce,
            to,
            input,
        }
    } else {
        let mut buf = raw;
        let header = Header::decode(&mut buf).expect("header");
        assert!(header.list);

        let nonce = u64::decode(&mut buf).expect("nonce");
        let _gas_price = U256::decode(&mut buf).expect("gas price");
        let _gas = u64::decode(&mut buf).expect("gas");
        let to = decode_to(&mut buf);
        let _value = U256::decode(&mut buf).expect("value");
        let input = Bytes::decode(&mut buf).expect("input");
        let v = u64::decode(&mut buf).expect("v");

        DecodedTx {
            typed: false,
            chain_id: Some((v - 35) / 2),
            nonce,
            to,
            input,
        }
    }
}

#[derive(Debug, Default)]
struct ChainState {
    next_nonce: u64,
    storage: HashMap<Address, U256>,
    receipts: HashMap<B256, Value>,
    submitted: Vec<DecodedTx>,
    block_number: u64,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    to: Option<Address>,
    #[serde(default)]
    data: Bytes,
}

/// A single-account development chain.
#[derive(Debug)]
pub struct MockChain {
    state: Mutex<ChainState>,
    requests: AtomicUsize,
    methods: Mutex<Vec<String>>,
    base_fee: Option<U256>,
    never_mine: bool,
    revert_calls: bool,
    receipt_latency: Option<Duration>,
}

impl Default for MockChain {
    fn default() -> Self {
        Self {
            state: Mutex::default(),
            requests: AtomicUsize::new(0),
            methods: Mutex::default(),
            base_fee: Some(U256::from(7)),
            never_mine: false,
            revert_calls: false,
            receipt_latency: None,
        }
    }
}

impl MockChain {
    /// Look pre-London: no base fee, so transactions use legacy pricing.
    pub fn without_base_fee(mut self) -> Self {
        self.base_fee = None;
        self
    }

    /// Never mine anything; receipts stay `null`.
    pub fn never_mining(mut self) -> Self {
        self.never_mine = true;
        self
    }

    /// Calls to existing contracts revert.
    pub fn reverting_calls(mut self) -> Self {
        self.revert_calls = true;
        self
    }

    /// Every receipt lookup takes `latency` to answer.
    pub fn slow_receipts(mut self, latency: Duration) -> Self {
        self.receipt_latency = Some(latency);
        self
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub fn methods(&self) -> Vec<String> {
        self.methods.lock().unwrap().clone()
    }

    /// Transactions accepted into the chain, in order.
    pub fn submitted(&self) -> Vec<DecodedTx> {
        self.state.lock().unwrap().submitted.clone()
    }

    pub fn stored(&self, contract: Address) -> U256 {
        self.state
            .lock()
            .unwrap()
            .storage
            .get(&contract)
            .copied()
            .unwrap_or_default()
    }

    fn send_raw(&self, raw: Bytes) -> RpcResponse {
        let tx = decode_raw(&raw);
        let mut state = self.state.lock().unwrap();

        if tx.nonce < state.next_nonce {
            return rpc_error(-32000, "nonce too low");
        }
        if tx.nonce > state.next_nonce {
            return rpc_error(-32000, "nonce too high");
        }
        state.next_nonce += 1;

        let hash = keccak256(&raw);
        state.block_number += 1;

        let (status, contract_address) = match tx.to {
            None => {
                let address = Address::with_last_byte(0xc0 + tx.nonce as u8);
                state.storage.insert(address, U256::ZERO);
                (1, Some(address))
            }
            Some(_) if self.revert_calls => (0, None),
            Some(to) => {
                if tx.input.starts_with(&STORE_SELECTOR) && tx.input.len() >= 36 {
                    let value = U256::from_be_slice(&tx.input[4..36]);
                    state.storage.insert(to, value);
                }
                (1, None)
            }
        };

        let receipt = json!({
            "transactionHash": hash,
            "blockNumber": format!("{:#x}", state.block_number),
            "status": format!("{status:#x}"),
            "contractAddress": contract_address,
            "gasUsed": "0x5208",
            "logs": []
        });
        state.receipts.insert(hash, receipt);
        state.submitted.push(tx);

        RpcResponse::Result(json!(hash))
    }

    fn call(&self, params: &[Value]) -> RpcResponse {
        let call: CallParams = serde_json::from_value(params[0].clone()).expect("call params");
        let state = self.state.lock().unwrap();

        let Some(value) = call.to.and_then(|to| state.storage.get(&to)) else {
            return RpcResponse::Result(json!("0x"));
        };

        if call.data.starts_with(&RETRIEVE_SELECTOR) {
            RpcResponse::Result(json!(Bytes::from(value.to_be_bytes::<32>().to_vec())))
        } else {
            RpcResponse::Result(json!("0x"))
        }
    }

    fn receipt(&self, params: &[Value]) -> RpcResponse {
        if self.never_mine {
            return RpcResponse::Result(Value::Null);
        }

        let hash: B256 = serde_json::from_value(params[0].clone()).expect("tx hash");
        let state = self.state.lock().unwrap();
        RpcResponse::Result(state.receipts.get(&hash).cloned().unwrap_or(Value::Null))
    }
}

fn rpc_error(code: i64, message: &str) -> RpcResponse {
    RpcResponse::Error(RpcErrorObject {
        code,
        message: message.to_string(),
        data: None,
    })
}

#[async_trait]
impl RpcTransport for MockChain {
    async fn request(&self, method: &str, params: Vec<Value>) -> Result<RpcResponse, DeployError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.methods.lock().unwrap().push(method.to_string());

        let response = match method {
            "eth_chainId" => RpcResponse::Result(json!(format!("{CHAIN_ID:#x}"))),
            "eth_getTransactionCount" => {
                let nonce = self.state.lock().unwrap().next_nonce;
                RpcResponse::Result(json!(format!("{nonce:#x}")))
            }
            "eth_gasPrice" => RpcResponse::Result(json!("0x3b9aca00")),
            "eth_maxPriorityFeePerGas" => RpcResponse::Result(json!("0x3b9aca00")),
            "eth_getBlockByNumber" => {
                let number = self.state.lock().unwrap().block_number;
                let mut block = json!({ "number": format!("{number:#x}") });
                if let Some(base_fee) = self.base_fee {
                    block["baseFeePerGas"] = json!(base_fee);
                }
                RpcResponse::Result(block)
            }
            "eth_estimateGas" => RpcResponse::Result(json!("0x30d40")),
            "eth_call" => self.call(&params),
            "eth_sendRawTransaction" => {
                let raw: Bytes = serde_json::from_value(params[0].clone()).expect("raw tx");
                self.send_raw(raw)
            }
            "eth_getTransactionReceipt" => {
                if let Some(latency) = self.receipt_latency {
                    tokio::time::sleep(latency).await;
                }
                self.receipt(&params)
            }
            other => rpc_error(-32601, &format!("method {other} not found")),
        };

        Ok(response)
    }

    fn endpoint(&self) -> String {
        "mock://chain".to_string()
    }
}

/// The interface of `SimpleStorage`, as emitted by solc.
pub fn simple_storage_abi() -> JsonAbi {
    serde_json::from_value(json!([
        {
            "inputs": [],
            "name": "retrieve",
            "outputs": [{"internalType": "uint256", "name": "", "type": "uint256"}],
            "stateMutability": "view",
            "type": "function"
        },
        {
            "inputs": [{"internalType": "uint256", "name": "_favoriteNumber", "type": "uint256"}],
            "name": "store",
            "outputs": [],
            "stateMutability": "nonpayable",
            "type": "function"
        }
    ]))
    .unwrap()
}

/// An artifact the mock chain can "deploy"; the init code is never executed.
pub fn simple_storage_artifact() -> CompilationArtifact {
    CompilationArtifact {
        source_name: "test.sol".to_string(),
        contract_name: "SimpleStorage".to_string(),
        bytecode: Bytes::from(vec![0x60, 0x80, 0x60, 0x40, 0x52]),
        abi: simple_storage_abi(),
        metadata: String::new(),
        source_map: None,
    }
}

/// Configuration for the first development account against the mock chain.
pub fn dev_config() -> DeployConfig {
    DeployConfig {
        chain_id: CHAIN_ID,
        private_key: Some(DEV_PRIVATE_KEY.to_string()),
        ..Default::default()
    }
}

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
}
