//! Argument structures for the engine methods, one per operation.

use crate::encoding::StringEncoding;
use crate::store::records::Kind;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListOptions {
    pub kind: Kind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomOptions {
    pub key_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiceOptions {
    pub key_name: String,
    pub faces: u32,
    pub bits: u32,
    pub launches: Vec<u32>,
}

/// Kind of secret material a key can be restored from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Nature {
    Xprv,
    Mnemonic,
}

impl fmt::Display for Nature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for Nature {
    type Err = std::io::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "xprv" | "Xprv" => Ok(Nature::Xprv),
            "mnemonic" | "Mnemonic" => Ok(Nature::Mnemonic),
            _ => Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("({}) valid values are: xprv, mnemonic", s),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestoreOptions {
    pub key_name: String,
    pub nature: Nature,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignOptions {
    pub key_file: String,
    pub wallet_descriptor_file: String,
    pub psbt_file: String,
    pub total_derivations: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintOptions {
    pub psbt_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavePsbtOptions {
    pub psbt: StringEncoding,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletNameOptions {
    pub wallet_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeriveAddressOptions {
    pub descriptor: String,
    pub index: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    pub kind: Kind,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QrMergeOptions {
    pub qrs_content: Vec<StringEncoding>,
}
