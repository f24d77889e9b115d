//! RLP encodings for legacy (EIP-155) and dynamic-fee (EIP-1559) transactions.

use alloy_core::{
    primitives::{Address, U256},
    rlp::{BufMut, EMPTY_LIST_CODE, EMPTY_STRING_CODE, Encodable, Header},
};

use super::{TxFees, UnsignedTransaction};
use crate::DeployError;

/// EIP-2718 type byte for dynamic-fee transactions.
pub const EIP1559_TX_TYPE: u8 = 0x02;

/// Recoverable signature components as they appear on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureParts {
    pub r: U256,
    pub s: U256,
    /// Recovery id, 0 or 1.
    pub y_parity: u8,
}

/// The `to` field: empty string for contract creation, address otherwise.
struct ToField(Option<Address>);

impl Encodable for ToField {
    fn encode(&self, out: &mut dyn BufMut) {
        match &self.0 {
            Some(address) => address.encode(out),
            None => out.put_u8(EMPTY_STRING_CODE),
        }
    }

    fn length(&self) -> usize {
        match &self.0 {
            Some(address) => address.length(),
            None => 1,
        }
    }
}

/// An empty access list.
struct EmptyList;

impl Encodable for EmptyList {
    fn encode(&self, out: &mut dyn BufMut) {
        out.put_u8(EMPTY_LIST_CODE);
    }

    fn length(&self) -> usize {
        1
    }
}

/// Encode `fields` as one RLP list into `out`.
fn encode_list(fields: &[&dyn Encodable], out: &mut Vec<u8>) {
    let payload_length: usize = fields.iter().map(|f| f.length()).sum();
    Header {
        list: true,
        payload_length,
    }
    .encode(out);
    for field in fields {
        field.encode(out);
    }
}

/// The payload whose keccak hash is signed.
pub fn signing_payload(tx: &UnsignedTransaction) -> Vec<u8> {
    let to = ToField(tx.to);
    let mut out = Vec::new();

    match &tx.fees {
        TxFees::Legacy { gas_price } => {
            // EIP-155: chain id followed by two empty values.
            encode_list(
                &[
                    &tx.nonce,
                    gas_price,
                    &tx.gas_limit,
                    &to,
                    &tx.value,
                    &tx.input,
                    &tx.chain_id,
                    &0u8,
                    &0u8,
                ],
                &mut out,
            );
        }
        TxFees::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            out.put_u8(EIP1559_TX_TYPE);
            encode_list(
                &[
                    &tx.chain_id,
                    &tx.nonce,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    &tx.gas_limit,
                    &to,
                    &tx.value,
                    &tx.input,
                    &EmptyList,
                ],
                &mut out,
            );
        }
    }

    out
}

/// The raw bytes submitted with `eth_sendRawTransaction`.
///
/// Fails with `Config` when a legacy `v` cannot be represented for `tx.chain_id`.
pub fn signed_payload(
    tx: &UnsignedTransaction,
    signature: &SignatureParts,
) -> Result<Vec<u8>, DeployError> {
    let to = ToField(tx.to);
    let mut out = Vec::new();

    match &tx.fees {
        TxFees::Legacy { gas_price } => {
            let v = tx
                .chain_id
                .checked_mul(2)
                .and_then(|v| v.checked_add(35 + u64::from(signature.y_parity)))
                .ok_or_else(|| {
                    DeployError::Config(format!(
                        "chain id {} is too large for a legacy transaction",
                        tx.chain_id
                    ))
                })?;
            encode_list(
                &[
                    &tx.nonce,
                    gas_price,
                    &tx.gas_limit,
                    &to,
                    &tx.value,
                    &tx.input,
                    &v,
                    &signature.r,
                    &signature.s,
                ],
                &mut out,
            );
        }
        TxFees::Eip1559 {
            max_fee_per_gas,
            max_priority_fee_per_gas,
        } => {
            out.put_u8(EIP1559_TX_TYPE);
            encode_list(
                &[
                    &tx.chain_id,
                    &tx.nonce,
                    max_priority_fee_per_gas,
                    max_fee_per_gas,
                    &tx.gas_limit,
                    &to,
                    &tx.value,
                    &tx.input,
                    &EmptyList,
                    &signature.y_parity,
                    &signature.r,
                    &signature.s,
                ],
                &mut out,
            );
        }
    }

    Ok(out)
}
