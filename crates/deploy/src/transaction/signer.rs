//! Offline transaction signing with a single local secp256k1 key.

use std::fmt;

use alloy_core::primitives::{Address, B256, Bytes, U256, keccak256};
use alloy_signer_local::{MnemonicBuilder, PrivateKeySigner, coins_bip39::English};
use k256::ecdsa::{RecoveryId, Signature};

use super::{
    SignedTransaction, UnsignedTransaction,
    encode::{SignatureParts, signed_payload, signing_payload},
};
use crate::DeployError;

/// Where the signing key comes from.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// A hex-encoded 32-byte private key, with or without `0x`.
    PrivateKey(String),
    /// A BIP-39 phrase and the account index to derive (`m/44'/60'/0'/0/{index}`).
    Mnemonic { phrase: String, index: u32 },
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrivateKey(_) => f.write_str("PrivateKey(<redacted>)"),
            Self::Mnemonic { index, .. } => f
                .debug_struct("Mnemonic")
                .field("phrase", &"<redacted>")
                .field("index", index)
                .finish(),
        }
    }
}

/// Signs transactions for one account.
///
/// Signing is deterministic (RFC 6979 nonces) and performs no I/O.
#[derive(Clone)]
pub struct TxSigner {
    signer: PrivateKeySigner,
}

impl fmt::Debug for TxSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TxSigner")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

impl TxSigner {
    /// Load the key described by `credential`.
    ///
    /// Returns `DeployError::InvalidCredential` if the key material is malformed.
    pub fn from_credential(credential: &Credential) -> Result<Self, DeployError> {
        match credential {
            Credential::PrivateKey(key) => Self::from_private_key(key),
            Credential::Mnemonic { phrase, index } => {
                let signer = MnemonicBuilder::<English>::default()
                    .phrase(phrase.as_str())
                    .index(*index)
                    .map_err(|e| DeployError::InvalidCredential(format!("bad derivation index: {e}")))?
                    .build()
                    .map_err(|e| DeployError::InvalidCredential(format!("bad mnemonic: {e}")))?;
                Ok(Self { signer })
            }
        }
    }

    pub fn from_private_key(key: &str) -> Result<Self, DeployError> {
        let key = key.trim();
        let key = key.strip_prefix("0x").unwrap_or(key);

        let bytes = hex::decode(key)
            .map_err(|e| DeployError::InvalidCredential(format!("private key is not hex: {e}")))?;

        if bytes.len() != 32 {
            return Err(DeployError::InvalidCredential(format!(
                "private key must be exactly 32 bytes, got {}",
                bytes.len()
            )));
        }

        let signer = PrivateKeySigner::from_slice(&bytes)
            .map_err(|e| DeployError::InvalidCredential(format!("invalid secp256k1 key: {e}")))?;

        Ok(Self { signer })
    }

    /// The address controlled by this key.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Hash that is signed for `tx`.
    pub fn signing_hash(tx: &UnsignedTransaction) -> B256 {
        keccak256(signing_payload(tx))
    }

    /// Sign `tx`.
    ///
    /// Fails with `InvalidCredential` if the transaction's sender is not this key's address.
    pub fn sign(&self, tx: &UnsignedTransaction) -> Result<SignedTransaction, DeployError> {
        if tx.from != self.address() {
            return Err(DeployError::InvalidCredential(format!(
                "transaction sender {} does not match signing key address {}",
                tx.from,
                self.address()
            )));
        }

        let hash = Self::signing_hash(tx);
        let (signature, recovery_id): (Signature, RecoveryId) = self
            .signer
            .credential()
            .sign_prehash_recoverable(hash.as_slice())
            .map_err(|e| DeployError::InvalidCredential(format!("signing failed: {e}")))?;

        let bytes = signature.to_bytes();
        let parts = SignatureParts {
            r: U256::from_be_slice(&bytes[..32]),
            s: U256::from_be_slice(&bytes[32..]),
            y_parity: recovery_id.to_byte(),
        };

        let raw = Bytes::from(signed_payload(tx, &parts)?);
        let tx_hash = keccak256(&raw);

        Ok(SignedTransaction {
            raw,
            hash: tx_hash,
            nonce: tx.nonce,
        })
    }
}

#[cfg(test)]
mod tests {
    use alloy_core::primitives::hex;

    use super::*;
    use crate::transaction::TxFees;

    /// Private key from the EIP-155 example.
    const EIP155_KEY: &str = "0x4646464646464646464646464646464646464646464646464646464646464646";

    /// First account of the well-known Anvil/Hardhat development mnemonic.
    const DEV_MNEMONIC: &str = "test test test test test test test test test test test junk";
    const DEV_ACCOUNT_0: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";
    const DEV_KEY_0: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn eip155_example(from: Address) -> UnsignedTransaction {
        UnsignedTransaction {
            chain_id: 1,
            from,
            nonce: 9,
            to: Some(Address::repeat_byte(0x35)),
            value: U256::from(1_000_000_000_000_000_000u128),
            input: Bytes::new(),
            gas_limit: 21_000,
            fees: TxFees::Legacy {
                gas_price: U256::from(20_000_000_000u64),
            },
        }
    }

    #[test]
    fn test_eip155_example_signature() {
        let signer = TxSigner::from_private_key(EIP155_KEY).unwrap();
        let tx = eip155_example(signer.address());

        assert_eq!(
            TxSigner::signing_hash(&tx),
            "0xdaf5a779ae972f972197303d7b574746c7ef83eadac0f2791ad23db92e4c8e53"
                .parse::<B256>()
                .unwrap()
        );

        let signed = signer.sign(&tx).unwrap();
        assert_eq!(
            hex::encode(&signed.raw),
            "f86c098504a817c800825208943535353535353535353535353535353535353535880de0b6b3a76400008025a028ef61340bd939bc2195fe537567866003e1a15d3c71ff63e1590620aa636276a067cbe9d8997f761aecb703304b3800ccf555c9f3dc64214b297fb1966a3b6d83"
        );
    }

    /// Recover the signer from a signed type-2 payload.
    fn recover_eip1559(raw: &[u8]) -> (UnsignedTransaction, Address) {
        use alloy_core::rlp::{Decodable, Header};
        use k256::ecdsa::VerifyingKey;

        assert_eq!(raw[0], crate::transaction::EIP1559_TX_TYPE);
        let mut buf = &raw[1..];
        assert!(Header::decode(&mut buf).unwrap().list);

        let chain_id = u64::decode(&mut buf).unwrap();
        let nonce = u64::decode(&mut buf).unwrap();
        let max_priority_fee_per_gas = U256::decode(&mut buf).unwrap();
        let max_fee_per_gas = U256::decode(&mut buf).unwrap();
        let gas_limit = u64::decode(&mut buf).unwrap();
        let to = Address::decode(&mut buf).unwrap();
        let value = U256::decode(&mut buf).unwrap();
        let input = Bytes::decode(&mut buf).unwrap();
        let access_list = Header::decode(&mut buf).unwrap();
        assert!(access_list.list && access_list.payload_length == 0);
        let y_parity = u8::decode(&mut buf).unwrap();
        let r = U256::decode(&mut buf).unwrap();
        let s = U256::decode(&mut buf).unwrap();
        assert!(buf.is_empty());

        let tx = UnsignedTransaction {
            chain_id,
            from: Address::ZERO,
            nonce,
            to: Some(to),
            value,
            input,
            gas_limit,
            fees: TxFees::Eip1559 {
                max_fee_per_gas,
                max_priority_fee_per_gas,
            },
        };

        let signature =
            Signature::from_scalars(r.to_be_bytes::<32>(), s.to_be_bytes::<32>()).unwrap();
        let recovery_id = RecoveryId::from_byte(y_parity).unwrap();
        let key = VerifyingKey::recover_from_prehash(
            TxSigner::signing_hash(&tx).as_slice(),
            &signature,
            recovery_id,
        )
        .unwrap();

        let point = key.to_encoded_point(false);
        let from = Address::from_slice(&keccak256(&point.as_bytes()[1..])[12..]);
        (tx, from)
    }

    #[test]
    fn test_eip1559_signature_recovers_sender() {
        let signer = TxSigner::from_private_key(DEV_KEY_0).unwrap();

        for nonce in [0, 1, 300] {
            let tx = UnsignedTransaction {
                chain_id: 31337,
                from: signer.address(),
                nonce,
                to: Some(Address::repeat_byte(0x42)),
                value: U256::ZERO,
                input: Bytes::from(vec![0x60, 0x57, 0x36, 0x1d]),
                gas_limit: 240_000,
                fees: TxFees::Eip1559 {
                    max_fee_per_gas: U256::from(2_000_000_014u64),
                    max_priority_fee_per_gas: U256::from(1_000_000_000u64),
                },
            };

            let signed = signer.sign(&tx).unwrap();
            assert_eq!(signed.hash, keccak256(&signed.raw));

            let (decoded, recovered) = recover_eip1559(&signed.raw);
            assert_eq!(recovered, DEV_ACCOUNT_0.parse::<Address>().unwrap());
            assert_eq!(recovered, signer.address());
            assert_eq!(decoded.nonce, nonce);
            assert_eq!(decoded.input, tx.input);
        }
    }

    #[test]
    fn test_signing_is_deterministic() {
        let signer = TxSigner::from_private_key(DEV_KEY_0).unwrap();
        let tx = eip155_example(signer.address());

        let first = signer.sign(&tx).unwrap();
        let second = signer.sign(&tx).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_nonce_changes_hash() {
        let signer = TxSigner::from_private_key(DEV_KEY_0).unwrap();
        let tx = eip155_example(signer.address());
        let mut bumped = tx.clone();
        bumped.nonce += 1;

        assert_ne!(signer.sign(&tx).unwrap().hash, signer.sign(&bumped).unwrap().hash);
    }

    #[test]
    fn test_sender_mismatch_is_rejected() {
        let signer = TxSigner::from_private_key(DEV_KEY_0).unwrap();
        let tx = eip155_example(Address::repeat_byte(0x01));

        assert!(matches!(
            signer.sign(&tx),
            Err(DeployError::InvalidCredential(_))
        ));
    }

    #[test]
    fn test_malformed_keys() {
        let zero = "00".repeat(32);
        for key in ["", "0x1234", "not-hex-at-all", zero.as_str()] {
            assert!(
                matches!(
                    TxSigner::from_private_key(key),
                    Err(DeployError::InvalidCredential(_))
                ),
                "key {key:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_mnemonic_matches_private_key() {
        let from_mnemonic = TxSigner::from_credential(&Credential::Mnemonic {
            phrase: DEV_MNEMONIC.to_string(),
            index: 0,
        })
        .unwrap();
        let from_key = TxSigner::from_credential(&Credential::PrivateKey(DEV_KEY_0.to_string()))
            .unwrap();

        assert_eq!(from_mnemonic.address(), from_key.address());
        assert_eq!(from_key.address(), DEV_ACCOUNT_0.parse::<Address>().unwrap());
    }

    #[test]
    fn test_credential_debug_is_redacted() {
        let debug = format!("{:?}", Credential::PrivateKey(DEV_KEY_0.to_string()));
        assert!(!debug.contains(DEV_KEY_0));
    }
}
