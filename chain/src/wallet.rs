//! Ed25519 keys, transaction signatures and the local wallet file.
//!
//! An address is the lowercase hex encoding of an Ed25519 verifying key.
//! The wallet file is a JSON object mapping addresses to hex secret keys.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use thiserror::Error;
use tracing::info;

use crate::types::{Address, Signature, Transaction};

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("wallet file {path} is malformed: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no key for address {0} in wallet")]
    UnknownAddress(Address),
    #[error("invalid secret key for address {0}")]
    InvalidKey(Address),
}

/// Checks `signature` over `message` against the key encoded in `address`.
///
/// Any malformed address or signature simply fails verification.
pub fn verify_signature(address: &Address, message: &[u8], signature: &Signature) -> bool {
    let Some(key) = decode_key::<32>(address.as_str()) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(&key) else {
        return false;
    };
    let Ok(sig) = ed25519_dalek::Signature::from_slice(signature.as_bytes()) else {
        return false;
    };
    key.verify(message, &sig).is_ok()
}

fn decode_key<const N: usize>(s: &str) -> Option<[u8; N]> {
    hex::decode(s).ok()?.try_into().ok()
}

/// A signing key and the address it controls.
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_secret_hex(secret: &str) -> Option<Self> {
        let bytes = decode_key::<32>(secret)?;
        Some(Self {
            signing: SigningKey::from_bytes(&bytes),
        })
    }

    pub fn address(&self) -> Address {
        Address(hex::encode(self.signing.verifying_key().to_bytes()))
    }

    pub fn secret_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing.sign(message).to_bytes().to_vec())
    }

    /// Fills the transaction's signature slot. `ClaimFunds` carries no
    /// signature and is left untouched.
    pub fn sign_transaction(&self, tx: &mut Transaction) {
        let signature = self.sign(&tx.signing_bytes());
        if let Some(slot) = tx.signature_mut() {
            *slot = signature;
        }
    }
}

/// Keys held by this machine, persisted as JSON.
#[derive(Debug)]
pub struct WalletStore {
    path: PathBuf,
    keys: BTreeMap<Address, String>,
}

impl WalletStore {
    /// Loads the wallet at `path`; a missing file is an empty wallet.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, WalletError> {
        let path = path.as_ref().to_path_buf();
        let keys = match fs::read(&path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| WalletError::Json {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => BTreeMap::new(),
            Err(source) => return Err(WalletError::Io { path, source }),
        };
        Ok(Self { path, keys })
    }

    pub fn save(&self) -> Result<(), WalletError> {
        let json = serde_json::to_vec_pretty(&self.keys).map_err(|source| WalletError::Json {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| WalletError::Io {
            path: self.path.clone(),
            source,
        })
    }

    /// Generates a key, stores it and persists the wallet.
    pub fn create_wallet(&mut self) -> Result<Address, WalletError> {
        let pair = KeyPair::generate();
        let address = pair.address();
        self.keys.insert(address.clone(), pair.secret_hex());
        self.save()?;
        info!(%address, path = %self.path.display(), "created wallet");
        Ok(address)
    }

    pub fn addresses(&self) -> impl Iterator<Item = &Address> {
        self.keys.keys()
    }

    pub fn keypair(&self, address: &Address) -> Result<KeyPair, WalletError> {
        let secret = self
            .keys
            .get(address)
            .ok_or_else(|| WalletError::UnknownAddress(address.clone()))?;
        let pair =
            KeyPair::from_secret_hex(secret).ok_or_else(|| WalletError::InvalidKey(address.clone()))?;
        if &pair.address() != address {
            return Err(WalletError::InvalidKey(address.clone()));
        }
        Ok(pair)
    }

    /// Signs `tx` with the key of `address`.
    pub fn sign(&self, address: &Address, tx: &mut Transaction) -> Result<(), WalletError> {
        self.keypair(address)?.sign_transaction(tx);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Transfer;
    use tempfile::tempdir;

    fn transfer(from: &Address) -> Transaction {
        Transaction::Transfer(Transfer {
            id: 3,
            symbol: "FOO".to_string(),
            amount: 10,
            from_address: from.clone(),
            to_address: Address::from("B"),
            signature: Signature::default(),
        })
    }

    #[test]
    fn signed_transaction_verifies_only_for_signer() {
        let pair = KeyPair::generate();
        let other = KeyPair::generate();
        let mut tx = transfer(&pair.address());
        pair.sign_transaction(&mut tx);

        let sig = tx.signature().expect("signature slot");
        assert!(verify_signature(&pair.address(), &tx.signing_bytes(), sig));
        assert!(!verify_signature(&other.address(), &tx.signing_bytes(), sig));
    }

    #[test]
    fn tampering_breaks_signature() {
        let pair = KeyPair::generate();
        let mut tx = transfer(&pair.address());
        pair.sign_transaction(&mut tx);

        if let Transaction::Transfer(t) = &mut tx {
            t.amount = 11;
        }
        let sig = tx.signature().expect("signature slot").clone();
        assert!(!verify_signature(&pair.address(), &tx.signing_bytes(), &sig));
    }

    #[test]
    fn malformed_inputs_do_not_verify() {
        let sig = Signature(vec![0; 64]);
        assert!(!verify_signature(&Address::from("not-hex"), b"msg", &sig));
        let pair = KeyPair::generate();
        assert!(!verify_signature(&pair.address(), b"msg", &Signature(vec![1, 2])));
    }

    #[test]
    fn wallet_persists_keys() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("wallet.json");

        let mut wallet = WalletStore::load(&path).expect("empty wallet");
        assert_eq!(wallet.addresses().count(), 0);
        let address = wallet.create_wallet().expect("create");

        let reopened = WalletStore::load(&path).expect("reload");
        let addresses: Vec<&Address> = reopened.addresses().collect();
        assert_eq!(addresses, vec![&address]);

        let mut tx = transfer(&address);
        reopened.sign(&address, &mut tx).expect("sign");
        let sig = tx.signature().expect("slot");
        assert!(verify_signature(&address, &tx.signing_bytes(), sig));
    }

    #[test]
    fn unknown_address_cannot_sign() {
        let dir = tempdir().expect("tempdir");
        let wallet = WalletStore::load(dir.path().join("w.json")).expect("wallet");
        let mut tx = transfer(&Address::from("A"));
        assert!(matches!(
            wallet.sign(&Address::from("A"), &mut tx),
            Err(WalletError::UnknownAddress(_))
        ));
    }
}
