//! Optical import flow: scan frames until the codec reports a whole
//! payload, decode its outer text encoding, commit through the store.
//!
//! The session stays in Scanning while the codec asks for more frames (or
//! for a re-scan of a bad one); an empty scan cancels the whole flow with
//! nothing committed. A "paste the full payload" path skips scanning
//! entirely.

use crate::encoding::{Encoding, StringEncoding};
use crate::frame::{FrameBuffer, ScanProgress};
use crate::store::records::Kind;
use crate::store::ArtifactStore;
use crate::{Error, Result};
use serde_json::Value;
use tracing::info;

#[derive(Debug)]
pub enum ScanInput {
    Frame(Vec<u8>),
    /// The user closed the scanner without a code.
    Cancelled,
}

#[derive(Debug, PartialEq)]
pub enum ImportProgress {
    /// Keep scanning.
    Continue { have: usize, want: usize },
    /// The artifact is in the store; the record as the engine saved it.
    Imported(Value),
    Cancelled,
}

pub struct ImportSession<'a> {
    store: &'a ArtifactStore,
    kind: Kind,
    buffer: FrameBuffer,
}

impl<'a> ImportSession<'a> {
    pub fn new(store: &'a ArtifactStore, kind: Kind) -> Self {
        ImportSession { store, kind, buffer: FrameBuffer::new() }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    /// Feed one scan result. [`Error::FrameParseRetry`] means "scan the
    /// same payload again"; the session itself is still alive.
    pub fn on_scan(&mut self, input: ScanInput) -> Result<ImportProgress> {
        let frame = match input {
            ScanInput::Cancelled => {
                info!(kind = %self.kind, "import cancelled");
                self.buffer = FrameBuffer::new();
                return Ok(ImportProgress::Cancelled);
            }
            ScanInput::Frame(bytes) => bytes,
        };

        match self.buffer.accumulate(frame, self.store.bridge())? {
            ScanProgress::Continue { have, want } => Ok(ImportProgress::Continue { have, want }),
            ScanProgress::Complete(payload) => {
                // A single-frame payload never entered the buffer.
                let multi = !self.buffer.is_empty();
                self.buffer = FrameBuffer::new();
                let payload = payload_encoding(self.kind, payload, multi)?;
                let record = self.store.import_raw(self.kind, &payload)?;
                Ok(ImportProgress::Imported(record))
            }
        }
    }

    /// Manual entry path: the payload arrives whole, already text-encoded.
    pub fn paste(self, payload: StringEncoding) -> Result<Value> {
        self.store.import_raw(self.kind, &payload)
    }
}

/// The reassembled payload is itself text-encoded one more level; the
/// encoding depends on the artifact kind and on how it arrived. Merged
/// frames carry raw bytes (hex for PSBTs, UTF-8 JSON for records); a single
/// frame carries the scanner's text content directly.
fn payload_encoding(kind: Kind, bytes: Vec<u8>, multi: bool) -> Result<StringEncoding> {
    match kind {
        Kind::Psbt if multi => Ok(StringEncoding::new_hex(&bytes)),
        Kind::Psbt => Ok(StringEncoding { t: Encoding::Base64, c: utf8(bytes)? }),
        Kind::Wallet | Kind::Key => Ok(StringEncoding::new_plain(utf8(bytes)?)),
    }
}

fn utf8(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).map_err(|e| Error::Import(format!("payload is not UTF-8: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineContext;
    use crate::engine::{EngineBridge, LocalEngine};
    use crate::frame;
    use crate::network::Network;

    fn store() -> (ArtifactStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let context = EngineContext::new(Network::Testnet).with_datadir(dir.path());
        (ArtifactStore::new(EngineBridge::new(LocalEngine::new(), context)), dir)
    }

    fn wallet_json(name: &str) -> String {
        serde_json::json!({
            "id": {"kind": "Wallet", "name": name, "network": "testnet"},
            "descriptor": "wsh(multi(2,tpubAAA/0/*,tpubBBB/0/*))",
            "fingerprints": ["aabbccdd", "eeff0011"],
            "required_sig": 2,
            "created_at_height": 123456,
        })
        .to_string()
    }

    #[test]
    fn single_frame_wallet_import() {
        let (store, _dir) = store();
        let mut session = ImportSession::new(&store, Kind::Wallet);
        let progress = session
            .on_scan(ScanInput::Frame(wallet_json("solo").into_bytes()))
            .unwrap();
        assert!(matches!(progress, ImportProgress::Imported(_)));
        assert_eq!(store.list(Kind::Wallet).unwrap().wallets.len(), 1);
    }

    #[test]
    fn multi_frame_wallet_import() {
        let (store, _dir) = store();
        let payload = wallet_json("framed");
        let frames = frame::encode(payload.as_bytes(), 40).unwrap();
        assert!(frames.len() > 1);

        let mut session = ImportSession::new(&store, Kind::Wallet);
        let mut imported = false;
        for frame in frames {
            match session.on_scan(ScanInput::Frame(frame)).unwrap() {
                ImportProgress::Continue { .. } => {}
                ImportProgress::Imported(record) => {
                    imported = true;
                    assert_eq!(record["id"]["name"], "framed");
                }
                ImportProgress::Cancelled => panic!("not cancelled"),
            }
        }
        assert!(imported);
        let listed = store.list(Kind::Wallet).unwrap();
        assert_eq!(listed.wallets.len(), 1);
        assert_eq!(listed.wallets[0].created_at_height, 123456);
    }

    #[test]
    fn bad_frame_keeps_the_session_scanning() {
        let (store, _dir) = store();
        let frames = frame::encode(wallet_json("retry").as_bytes(), 40).unwrap();

        let mut session = ImportSession::new(&store, Kind::Wallet);
        session.on_scan(ScanInput::Frame(frames[0].clone())).unwrap();
        assert!(matches!(
            session.on_scan(ScanInput::Frame(b"\x30garbage".to_vec())),
            Err(Error::FrameParseRetry)
        ));
        for frame in frames.into_iter().skip(1) {
            session.on_scan(ScanInput::Frame(frame)).unwrap();
        }
        assert_eq!(store.list(Kind::Wallet).unwrap().wallets.len(), 1);
    }

    #[test]
    fn cancelled_scan_commits_nothing() {
        let (store, _dir) = store();
        let frames = frame::encode(wallet_json("gone").as_bytes(), 40).unwrap();

        let mut session = ImportSession::new(&store, Kind::Wallet);
        session.on_scan(ScanInput::Frame(frames[0].clone())).unwrap();
        assert_eq!(
            session.on_scan(ScanInput::Cancelled).unwrap(),
            ImportProgress::Cancelled
        );
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());
    }

    #[test]
    fn paste_bypasses_scanning() {
        let (store, _dir) = store();
        let session = ImportSession::new(&store, Kind::Psbt);
        let payload = StringEncoding::new_base64(b"fake psbt bytes");
        session.paste(payload).unwrap();
        assert_eq!(store.list(Kind::Psbt).unwrap().psbts.len(), 1);
    }

    #[test]
    fn failed_import_leaves_no_record() {
        let (store, _dir) = store();
        // Mainnet wallet scanned while the device runs on testnet.
        let foreign = serde_json::json!({
            "id": {"kind": "Wallet", "name": "foreign", "network": "bitcoin"},
            "descriptor": "wsh(multi(1,xpubAAA/0/*))",
            "fingerprints": ["aabbccdd"],
            "required_sig": 1,
            "created_at_height": 1,
        })
        .to_string();

        let mut session = ImportSession::new(&store, Kind::Wallet);
        let err = session.on_scan(ScanInput::Frame(foreign.into_bytes())).unwrap_err();
        assert!(matches!(err, Error::Import(_)));
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());
    }
}
