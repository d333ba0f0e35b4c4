//! Artifact records and their identity.
//!
//! Every persisted artifact is addressed by (kind, name, network); the
//! engine owns the directory tree underneath, the core only derives a full
//! path when an operation is defined over paths (sign, print, delete).

use crate::network::Network;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Kind {
    Key,
    Wallet,
    Psbt,
}

impl Kind {
    pub fn dir(&self) -> &'static str {
        match self {
            Kind::Key => "keys",
            Kind::Wallet => "wallets",
            Kind::Psbt => "psbts",
        }
    }

    /// File holding the record inside the artifact's directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            Kind::Key => "master_secret.json",
            Kind::Wallet => "wallet.json",
            Kind::Psbt => "psbt.json",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Kind {
    type Err = std::io::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "Key" | "key" | "keys" => Ok(Kind::Key),
            "Wallet" | "wallet" | "wallets" => Ok(Kind::Wallet),
            "Psbt" | "psbt" | "psbts" => Ok(Kind::Psbt),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("({}) valid values are: keys, wallets, psbts", s),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    pub kind: Kind,
    pub name: String,
    pub network: Network,
}

impl Identifier {
    pub fn new(network: Network, kind: Kind, name: &str) -> Self {
        Identifier { kind, name: name.to_string(), network }
    }

    /// `<datadir>/<network>/<kind dir>/<name>`
    pub fn as_path_buf(&self, datadir: &Path) -> PathBuf {
        datadir
            .join(self.network.to_string())
            .join(self.kind.dir())
            .join(&self.name)
    }

    /// Fully-qualified record file, for the operations defined over paths.
    pub fn record_path(&self, datadir: &Path) -> PathBuf {
        self.as_path_buf(datadir).join(self.kind.file_name())
    }
}

/// Dice provenance kept on a key for audit: how the seed was produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiceRecord {
    pub faces: u32,
    pub launches: Vec<u32>,
    /// Decimal rendering of the accumulated entropy value.
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MasterKeyRecord {
    pub id: Identifier,
    pub xpub: String,
    pub xprv: String,
    pub fingerprint: String,
    pub mnemonic: Option<String>,
    pub dice: Option<DiceRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletRecord {
    pub id: Identifier,
    pub descriptor: String,
    pub fingerprints: Vec<String>,
    pub required_sig: u32,
    /// Chain height at creation, bounds any later rescan.
    pub created_at_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsbtRecord {
    pub id: Identifier,
    /// Base64 PSBT payload.
    pub psbt: String,
    pub fee: f64,
    pub changepos: i32,
}

/// Detached attestation of an artifact's descriptor content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalletSignatureRecord {
    pub id: Identifier,
    pub xpub: String,
    pub address: String,
    pub signature: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListOutput {
    pub keys: Vec<MasterKeyRecord>,
    pub wallets: Vec<WalletRecord>,
    pub psbts: Vec<PsbtRecord>,
}

// ---------------------------------------------------------------------------
// Engine `sign`/`print` output
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxIn {
    pub outpoint: String,
    pub signatures: Vec<String>,
    pub value: String,
    pub wallet_with_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxOut {
    pub address: String,
    pub value: String,
    pub wallet_with_path: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxSize {
    pub unsigned: u32,
    pub estimated: u32,
    pub psbt: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TxFee {
    pub absolute_fmt: String,
    pub absolute: u64,
    pub rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PsbtPrettyPrint {
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub size: TxSize,
    pub fee: TxFee,
    pub info: Vec<String>,
    pub balances: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressOutput {
    pub address: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerifyWalletResult {
    pub descriptor: String,
    pub signature: WalletSignatureRecord,
    pub verified: bool,
}

// ---------------------------------------------------------------------------
// List projection
// ---------------------------------------------------------------------------

/// Uniform row for rendering any artifact kind in a list: a display name, a
/// short description and the full record for a detail view.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemView {
    pub name: String,
    pub description: Option<String>,
    pub details: Option<String>,
}

impl MasterKeyRecord {
    pub fn item(&self) -> ItemView {
        ItemView {
            name: self.id.name.clone(),
            description: Some(self.fingerprint.clone()),
            details: serde_json::to_string_pretty(self).ok(),
        }
    }
}

impl WalletRecord {
    pub fn item(&self) -> ItemView {
        ItemView {
            name: self.id.name.clone(),
            description: Some(format!("{:?}", self.fingerprints)),
            details: serde_json::to_string_pretty(self).ok(),
        }
    }
}

impl PsbtRecord {
    pub fn item(&self) -> ItemView {
        ItemView {
            name: self.id.name.clone(),
            description: None,
            details: serde_json::to_string_pretty(self).ok(),
        }
    }
}
