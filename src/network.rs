//! Network environment. Exactly one is active per process; every artifact
//! namespace is partitioned by it.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Bitcoin,
    #[default]
    Testnet,
    Regtest,
    Signet,
}

impl Network {
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Bitcoin => "bitcoin",
            Network::Testnet => "testnet",
            Network::Regtest => "regtest",
            Network::Signet => "signet",
        }
    }

    /// Extended-key prefix expected on this network. Mainnet material must
    /// never be accepted under a test network and vice versa.
    pub fn key_prefix(&self) -> &'static str {
        match self {
            Network::Bitcoin => "xpub",
            Network::Testnet | Network::Regtest | Network::Signet => "tpub",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "bitcoin" | "mainnet" => Ok(Network::Bitcoin),
            "testnet" => Ok(Network::Testnet),
            "regtest" => Ok(Network::Regtest),
            "signet" => Ok(Network::Signet),
            other => Err(Error::UnknownNetwork(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_name_roundtrip() {
        for n in [Network::Bitcoin, Network::Testnet, Network::Regtest, Network::Signet] {
            assert_eq!(n.as_str().parse::<Network>().unwrap(), n);
            assert_eq!(serde_json::to_value(n).unwrap(), n.as_str());
        }
        assert!("lightning".parse::<Network>().is_err());
    }

    #[test]
    fn key_prefixes() {
        assert_eq!(Network::Bitcoin.key_prefix(), "xpub");
        assert_eq!(Network::Signet.key_prefix(), "tpub");
    }
}
