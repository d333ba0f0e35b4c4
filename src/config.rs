//! Engine context - passed on every call. Higher layers construct this once
//! at process start; the network is fixed for the process lifetime.

use crate::encoding::StringEncoding;
use crate::network::Network;
use crate::{Error, Result};
use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::PathBuf;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Opaque handle to the 256-bit at-rest encryption key. The key is generated
/// and persisted by a platform keystore outside this crate; the core only
/// forwards it to the engine.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct EncryptionKey([u8; 32]);

impl EncryptionKey {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        EncryptionKey(bytes)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::BadEncoding { encoding: "hex".into(), reason: e.to_string() })?;
        let bytes: [u8; 32] = bytes.try_into().map_err(|v: Vec<u8>| Error::BadEncoding {
            encoding: "hex".into(),
            reason: format!("encryption key must be 32 bytes but it's {}", v.len()),
        })?;
        Ok(EncryptionKey(bytes))
    }
}

// Key material never reaches logs.
impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

impl Serialize for EncryptionKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        StringEncoding::new_hex(&self.0).serialize(serializer)
    }
}

/// Call context carried in every engine envelope: data root, active network
/// and, when encryption at rest is enabled, the key handle.
#[derive(Debug, Clone)]
pub struct EngineContext {
    pub datadir: PathBuf,
    pub network: Network,
    pub encryption_key: Option<EncryptionKey>,
}

impl EngineContext {
    pub fn new(network: Network) -> Self {
        EngineContext { datadir: default_datadir(), network, encryption_key: None }
    }

    pub fn with_datadir(mut self, datadir: impl Into<PathBuf>) -> Self {
        self.datadir = datadir.into();
        self
    }

    pub fn with_encryption_key(mut self, key: EncryptionKey) -> Self {
        self.encryption_key = Some(key);
        self
    }
}

impl Serialize for EngineContext {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("EngineContext", 3)?;
        s.serialize_field("datadir", &self.datadir.display().to_string())?;
        s.serialize_field("network", &self.network)?;
        s.serialize_field("encryption_key", &self.encryption_key)?;
        s.end()
    }
}

fn default_datadir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("coldsign")
}
