//! Text-encoding envelope for opaque byte payloads crossing the engine
//! boundary: `{"t": "hex", "c": "..."}`.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Base64,
    Hex,
    Plain,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Base64 => "base64",
            Encoding::Hex => "hex",
            Encoding::Plain => "plain",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StringEncoding {
    pub t: Encoding,
    pub c: String,
}

impl StringEncoding {
    pub fn new_hex(bytes: &[u8]) -> Self {
        StringEncoding { t: Encoding::Hex, c: hex::encode(bytes) }
    }

    pub fn new_base64(bytes: &[u8]) -> Self {
        use base64::Engine;
        StringEncoding {
            t: Encoding::Base64,
            c: base64::engine::general_purpose::STANDARD.encode(bytes),
        }
    }

    pub fn new_plain(text: impl Into<String>) -> Self {
        StringEncoding { t: Encoding::Plain, c: text.into() }
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        match self.t {
            Encoding::Hex => hex::decode(&self.c).map_err(|e| Error::BadEncoding {
                encoding: "hex".into(),
                reason: e.to_string(),
            }),
            Encoding::Base64 => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(&self.c)
                    .map_err(|e| Error::BadEncoding { encoding: "base64".into(), reason: e.to_string() })
            }
            Encoding::Plain => Ok(self.c.as_bytes().to_vec()),
        }
    }
}
