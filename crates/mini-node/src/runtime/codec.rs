//! Codecs, the interface registry and address encoding.
//!
//! The interface registry is populated by invokers during resolution and
//! sealed by the application builder; after sealing it is read-only.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Interface every transaction message implements.
pub const MSG_INTERFACE: &str = "mini.base.v1.Msg";

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("interface registry is sealed; cannot register {0}")]
    Sealed(String),

    #[error("unknown interface {0}")]
    UnknownInterface(String),

    #[error("unknown type url {0}")]
    UnknownType(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("encoding failed: {0}")]
    Encoding(String),
}

/// Registry of interfaces and the type URLs implementing them.
#[derive(Debug, Default)]
pub struct InterfaceRegistry {
    interfaces: RwLock<BTreeMap<String, BTreeSet<String>>>,
    sealed: AtomicBool,
}

impl InterfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_interface(&self, name: &str) -> Result<(), CodecError> {
        self.check_open(name)?;
        self.interfaces.write().entry(name.to_string()).or_default();
        Ok(())
    }

    pub fn register_implementation(&self, interface: &str, type_url: &str) -> Result<(), CodecError> {
        self.check_open(type_url)?;
        let mut interfaces = self.interfaces.write();
        let impls = interfaces
            .get_mut(interface)
            .ok_or_else(|| CodecError::UnknownInterface(interface.to_string()))?;
        impls.insert(type_url.to_string());
        Ok(())
    }

    fn check_open(&self, what: &str) -> Result<(), CodecError> {
        if self.is_sealed() {
            return Err(CodecError::Sealed(what.to_string()));
        }
        Ok(())
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn list_all_interfaces(&self) -> Vec<String> {
        self.interfaces.read().keys().cloned().collect()
    }

    pub fn list_implementations(&self, interface: &str) -> Vec<String> {
        self.interfaces
            .read()
            .get(interface)
            .map(|impls| impls.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any interface lists `type_url` as an implementation.
    pub fn is_registered(&self, type_url: &str) -> bool {
        self.interfaces
            .read()
            .values()
            .any(|impls| impls.contains(type_url))
    }
}

/// Legacy name registry for amino JSON signing.
#[derive(Debug, Default)]
pub struct LegacyAmino {
    names: RwLock<BTreeMap<String, String>>,
}

impl LegacyAmino {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_concrete(&self, type_url: &str, name: &str) {
        self.names
            .write()
            .insert(type_url.to_string(), name.to_string());
    }

    pub fn name_of(&self, type_url: &str) -> Option<String> {
        self.names.read().get(type_url).cloned()
    }

    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Binary codec backed by the interface registry.
#[derive(Debug)]
pub struct Codec {
    registry: Arc<InterfaceRegistry>,
}

impl Codec {
    pub fn new(registry: Arc<InterfaceRegistry>) -> Self {
        Self { registry }
    }

    pub fn interface_registry(&self) -> &Arc<InterfaceRegistry> {
        &self.registry
    }

    pub fn marshal<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(|e| CodecError::Encoding(e.to_string()))
    }

    pub fn unmarshal<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(bytes).map_err(|e| CodecError::Encoding(e.to_string()))
    }

    /// Reject `Any` values whose type URL was never registered.
    pub fn check_any(&self, any: &AnyMsg) -> Result<(), CodecError> {
        if self.registry.is_registered(&any.type_url) {
            Ok(())
        } else {
            Err(CodecError::UnknownType(any.type_url.clone()))
        }
    }
}

/// A packed message: type URL plus its JSON body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnyMsg {
    pub type_url: String,
    #[serde(default)]
    pub value: Value,
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tx {
    pub messages: Vec<AnyMsg>,
    #[serde(default)]
    pub memo: String,
    #[serde(default)]
    pub fee: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxConfigOptions {
    pub enabled_sign_modes: Vec<String>,
    pub max_memo_len: usize,
}

impl Default for TxConfigOptions {
    fn default() -> Self {
        Self {
            enabled_sign_modes: vec!["direct".to_string(), "legacy-amino-json".to_string()],
            max_memo_len: 256,
        }
    }
}

/// Encodes and decodes transactions.
#[derive(Debug)]
pub struct TxConfig {
    codec: Arc<Codec>,
    options: TxConfigOptions,
}

impl TxConfig {
    pub fn new(codec: Arc<Codec>, options: TxConfigOptions) -> Self {
        Self { codec, options }
    }

    pub fn options(&self) -> &TxConfigOptions {
        &self.options
    }

    fn validate(&self, tx: &Tx) -> Result<(), CodecError> {
        if tx.memo.len() > self.options.max_memo_len {
            return Err(CodecError::Encoding(format!(
                "memo too long: {} > {}",
                tx.memo.len(),
                self.options.max_memo_len
            )));
        }
        tx.messages.iter().try_for_each(|m| self.codec.check_any(m))
    }

    pub fn encode(&self, tx: &Tx) -> Result<Vec<u8>, CodecError> {
        self.validate(tx)?;
        self.codec.marshal(tx)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Tx, CodecError> {
        let tx: Tx = self.codec.unmarshal(bytes)?;
        self.validate(&tx)?;
        Ok(tx)
    }
}

/// Human readable address codec: `<prefix>1<hex>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressCodec {
    prefix: String,
}

impl AddressCodec {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn encode(&self, bytes: &[u8]) -> String {
        format!("{}1{}", self.prefix, hex::encode(bytes))
    }

    pub fn decode(&self, address: &str) -> Result<Vec<u8>, CodecError> {
        let invalid = |reason: String| CodecError::InvalidAddress {
            address: address.to_string(),
            reason,
        };
        let body = address
            .strip_prefix(&self.prefix)
            .and_then(|rest| rest.strip_prefix('1'))
            .ok_or_else(|| invalid(format!("expected prefix {}1", self.prefix)))?;
        hex::decode(body).map_err(|e| invalid(e.to_string()))
    }
}

/// Account address codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountAddressCodec(pub AddressCodec);

/// Validator operator address codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorAddressCodec(pub AddressCodec);

/// Consensus node address codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsensusAddressCodec(pub AddressCodec);

/// Interfaces every node registers regardless of its module set.
pub fn register_std_interfaces(registry: &InterfaceRegistry) -> Result<(), CodecError> {
    registry.register_interface(MSG_INTERFACE)?;
    registry.register_interface("mini.crypto.v1.PubKey")?;
    registry.register_implementation("mini.crypto.v1.PubKey", "/mini.crypto.secp256k1.PubKey")?;
    registry.register_implementation("mini.crypto.v1.PubKey", "/mini.crypto.ed25519.PubKey")?;
    Ok(())
}

pub fn register_std_amino(amino: &LegacyAmino) {
    amino.register_concrete("/mini.crypto.secp256k1.PubKey", "mini/PubKeySecp256k1");
    amino.register_concrete("/mini.crypto.ed25519.PubKey", "mini/PubKeyEd25519");
}
