//! Typed, namespaced CRUD over the three artifact kinds, layered on the
//! engine bridge. The store holds no cache: every `list` re-fetches so the
//! view can never go stale behind an external mutation.

pub mod options;
pub mod records;

use crate::encoding::StringEncoding;
use crate::engine::EngineBridge;
use crate::network::Network;
use crate::{Error, Result};
use options::*;
use records::*;
use serde_json::Value;
use tracing::{debug, info};

pub struct ArtifactStore {
    bridge: EngineBridge,
}

impl ArtifactStore {
    pub fn new(bridge: EngineBridge) -> Self {
        ArtifactStore { bridge }
    }

    pub fn bridge(&self) -> &EngineBridge {
        &self.bridge
    }

    pub fn network(&self) -> Network {
        self.bridge.network()
    }

    /// Fetch all records of one kind from the engine, in the engine's order.
    pub fn list(&self, kind: Kind) -> Result<ListOutput> {
        self.bridge.invoke_as("list", &ListOptions { kind })
    }

    // -----------------------------------------------------------------------
    // Key creation
    // -----------------------------------------------------------------------

    pub fn create_key_random(&self, name: &str) -> Result<MasterKeyRecord> {
        self.ensure_absent(Kind::Key, name)?;
        self.bridge.invoke_as("random", &RandomOptions { key_name: name.to_string() })
    }

    pub fn create_key_from_dice(
        &self,
        name: &str,
        faces: u32,
        launches: &[u32],
    ) -> Result<MasterKeyRecord> {
        self.ensure_absent(Kind::Key, name)?;
        let opts = DiceOptions {
            key_name: name.to_string(),
            faces,
            bits: crate::dice::plan::TARGET_BITS,
            launches: launches.to_vec(),
        };
        self.bridge.invoke_as("dice", &opts)
    }

    pub fn restore_key(&self, name: &str, nature: Nature, value: &str) -> Result<MasterKeyRecord> {
        self.ensure_absent(Kind::Key, name)?;
        let opts = RestoreOptions { key_name: name.to_string(), nature, value: value.to_string() };
        self.bridge.invoke_as("restore", &opts)
    }

    // -----------------------------------------------------------------------
    // Import
    // -----------------------------------------------------------------------

    /// Import a serialized artifact. Structural validation happens here,
    /// domain validation in the engine; to the caller the outcome is binary
    /// (imported or not), with the reason kept on the error and in the logs.
    pub fn import_raw(&self, kind: Kind, payload: &StringEncoding) -> Result<Value> {
        let result = match kind {
            Kind::Wallet => self.import_wallet(payload),
            Kind::Key => self.import_key(payload),
            Kind::Psbt => self.import_psbt(payload),
        };
        if let Err(e) = &result {
            debug!(%kind, error = %e, "import failed");
        }
        result
    }

    fn import_wallet(&self, payload: &StringEncoding) -> Result<Value> {
        let record: WalletRecord = self.parse_payload(payload)?;
        if record.id.kind != Kind::Wallet {
            return Err(Error::Import(format!("expected a wallet, got {}", record.id.kind)));
        }
        if record.id.network != self.network() {
            return Err(Error::Import(format!(
                "wallet belongs to {}, active network is {}",
                record.id.network,
                self.network()
            )));
        }
        let listed = self.list(Kind::Wallet)?;
        if let Some(existing) = listed.wallets.iter().find(|w| w.id.name == record.id.name) {
            return Err(duplicate_outcome(*existing == record, &record.id));
        }
        self.bridge.invoke_as("import_wallet", &record).map_err(fold_import)
    }

    fn import_key(&self, payload: &StringEncoding) -> Result<Value> {
        let record: MasterKeyRecord = self.parse_payload(payload)?;
        if record.id.kind != Kind::Key {
            return Err(Error::Import(format!("expected a key, got {}", record.id.kind)));
        }
        if record.id.network != self.network() {
            return Err(Error::Import(format!(
                "key belongs to {}, active network is {}",
                record.id.network,
                self.network()
            )));
        }
        let listed = self.list(Kind::Key)?;
        if let Some(existing) = listed.keys.iter().find(|k| k.id.name == record.id.name) {
            return Err(duplicate_outcome(*existing == record, &record.id));
        }
        self.bridge.invoke_as("import", &record).map_err(fold_import)
    }

    fn import_psbt(&self, payload: &StringEncoding) -> Result<Value> {
        // Make sure the payload at least decodes before the engine sees it.
        let bytes = payload
            .decode()
            .map_err(|e| Error::Import(format!("psbt payload: {}", e)))?;
        if bytes.is_empty() {
            return Err(Error::Import("psbt payload is empty".into()));
        }
        let opts = SavePsbtOptions { psbt: payload.clone() };
        self.bridge.invoke_as("save_psbt", &opts).map_err(fold_import)
    }

    fn parse_payload<T: serde::de::DeserializeOwned>(&self, payload: &StringEncoding) -> Result<T> {
        let bytes = payload.decode().map_err(|e| Error::Import(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Import(e.to_string()))
    }

    // -----------------------------------------------------------------------
    // Export / attestation
    // -----------------------------------------------------------------------

    /// Detached signature over the artifact's current content, to verify it
    /// has not been tampered with when re-displayed or re-transmitted.
    pub fn export_signature(&self, kind: Kind, name: &str) -> Result<WalletSignatureRecord> {
        self.bridge.invoke_as("export", &ExportOptions { kind, name: name.to_string() })
    }

    pub fn sign_wallet(&self, name: &str) -> Result<WalletSignatureRecord> {
        self.bridge.invoke_as("sign_wallet", &WalletNameOptions { wallet_name: name.to_string() })
    }

    pub fn verify_wallet(&self, name: &str) -> Result<VerifyWalletResult> {
        self.bridge.invoke_as("verify_wallet", &WalletNameOptions { wallet_name: name.to_string() })
    }

    // -----------------------------------------------------------------------
    // Delete
    // -----------------------------------------------------------------------

    /// Deletion requires the caller to pass back the artifact name exactly
    /// as the user retyped it. No match, no delete.
    pub fn delete(&self, kind: Kind, name: &str, typed_confirmation: &str) -> Result<()> {
        if typed_confirmation != name {
            return Err(Error::ConfirmationMismatch {
                name: name.to_string(),
                typed: typed_confirmation.to_string(),
            });
        }
        valid_name(name)?;
        let id = Identifier::new(self.network(), kind, name);
        let dir = id.as_path_buf(&self.bridge.context().datadir);
        if !dir.is_dir() {
            return Err(Error::NotFound(name.to_string()));
        }
        std::fs::remove_dir_all(&dir)?;
        info!(%kind, name, "artifact deleted");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // PSBT operations (path-addressed engine calls)
    // -----------------------------------------------------------------------

    /// Apply `key` to `psbt` against `wallet`'s descriptor. Signing a PSBT
    /// that already carries a matching signature is not an error; the
    /// outcome says "No signature added".
    pub fn sign_psbt(&self, key: &str, wallet: &str, psbt: &str) -> Result<PsbtPrettyPrint> {
        let datadir = &self.bridge.context().datadir;
        let network = self.network();
        let opts = SignOptions {
            key_file: path_string(Identifier::new(network, Kind::Key, key), datadir),
            wallet_descriptor_file: path_string(Identifier::new(network, Kind::Wallet, wallet), datadir),
            psbt_file: path_string(Identifier::new(network, Kind::Psbt, psbt), datadir),
            total_derivations: 100,
        };
        self.bridge.invoke_as("sign", &opts)
    }

    pub fn print_psbt(&self, name: &str) -> Result<PsbtPrettyPrint> {
        let datadir = &self.bridge.context().datadir;
        let id = Identifier::new(self.network(), Kind::Psbt, name);
        self.bridge.invoke_as("print", &PrintOptions { psbt_file: path_string(id, datadir) })
    }

    pub fn derive_address(&self, descriptor: &str, index: u32) -> Result<AddressOutput> {
        let opts = DeriveAddressOptions { descriptor: descriptor.to_string(), index };
        self.bridge.invoke_as("derive_address", &opts)
    }

    // -----------------------------------------------------------------------

    /// Creation pre-check: the identity must be free. The engine enforces
    /// uniqueness too, but reports it as a plain domain error; this check
    /// reports `AlreadyExists`.
    fn ensure_absent(&self, kind: Kind, name: &str) -> Result<()> {
        valid_name(name)?;
        let listed = self.list(kind)?;
        let taken = match kind {
            Kind::Key => listed.keys.iter().any(|k| k.id.name == name),
            Kind::Wallet => listed.wallets.iter().any(|w| w.id.name == name),
            Kind::Psbt => listed.psbts.iter().any(|p| p.id.name == name),
        };
        if taken {
            return Err(Error::AlreadyExists { kind, name: name.to_string() });
        }
        Ok(())
    }
}

fn path_string(id: Identifier, datadir: &std::path::Path) -> String {
    id.record_path(datadir).display().to_string()
}

/// Names become directory components; keep them to one component.
fn valid_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::Domain("artifact name must not be empty".into()));
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        return Err(Error::Domain(format!("invalid artifact name {:?}", name)));
    }
    Ok(())
}

fn fold_import(e: Error) -> Error {
    match e {
        Error::Domain(msg) => Error::Import(msg),
        other => other,
    }
}

/// Re-importing identical content is a duplicate; the same name with
/// different content is a conflict. Both fail, distinguishably.
fn duplicate_outcome(identical: bool, id: &Identifier) -> Error {
    if identical {
        Error::AlreadyExists { kind: id.kind, name: id.name.clone() }
    } else {
        Error::Import(format!("{} {:?} already exists with different content", id.kind, id.name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineContext;
    use crate::engine::{EngineBridge, LocalEngine};
    use tempfile::TempDir;

    fn store_on(network: Network) -> (ArtifactStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let context = EngineContext::new(network).with_datadir(dir.path());
        (ArtifactStore::new(EngineBridge::new(LocalEngine::new(), context)), dir)
    }

    fn wallet_json(name: &str, network: Network, height: u32) -> String {
        let prefix = network.key_prefix();
        serde_json::json!({
            "id": {"kind": "Wallet", "name": name, "network": network.as_str()},
            "descriptor": format!("wsh(multi(2,{p}A/0/*,{p}B/0/*))", p = prefix),
            "fingerprints": ["11aabbcc", "22ddeeff"],
            "required_sig": 2,
            "created_at_height": height,
        })
        .to_string()
    }

    #[test]
    fn create_twice_fails_and_keeps_the_first() {
        let (store, _dir) = store_on(Network::Regtest);
        let first = store.create_key_random("alice").unwrap();
        let err = store.create_key_random("alice").unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Kind::Key, .. }));

        let listed = store.list(Kind::Key).unwrap();
        assert_eq!(listed.keys.len(), 1);
        assert_eq!(listed.keys[0], first);
    }

    #[test]
    fn empty_names_are_rejected() {
        let (store, _dir) = store_on(Network::Regtest);
        assert!(store.create_key_random("").is_err());
        assert!(store.create_key_random("a/b").is_err());
    }

    #[test]
    fn list_reflects_every_mutation() {
        let (store, _dir) = store_on(Network::Testnet);
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());

        let payload = StringEncoding::new_plain(wallet_json("shared", Network::Testnet, 680000));
        store.import_raw(Kind::Wallet, &payload).unwrap();
        assert_eq!(store.list(Kind::Wallet).unwrap().wallets.len(), 1);

        store.delete(Kind::Wallet, "shared", "shared").unwrap();
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());
    }

    #[test]
    fn delete_needs_the_exact_name() {
        let (store, _dir) = store_on(Network::Regtest);
        store.create_key_random("Vault").unwrap();

        for typed in ["vault", "Vault ", "Vaul", ""] {
            let err = store.delete(Kind::Key, "Vault", typed).unwrap_err();
            assert!(matches!(err, Error::ConfirmationMismatch { .. }), "typed {:?}", typed);
        }
        assert_eq!(store.list(Kind::Key).unwrap().keys.len(), 1);

        store.delete(Kind::Key, "Vault", "Vault").unwrap();
        assert!(store.list(Kind::Key).unwrap().keys.is_empty());
    }

    #[test]
    fn delete_of_missing_artifact_reports_not_found() {
        let (store, _dir) = store_on(Network::Regtest);
        assert!(matches!(
            store.delete(Kind::Key, "nobody", "nobody"),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn wallet_from_another_network_is_not_imported() {
        let (store, _dir) = store_on(Network::Bitcoin);
        let payload = StringEncoding::new_plain(wallet_json("test-wallet", Network::Testnet, 1000));
        let err = store.import_raw(Kind::Wallet, &payload).unwrap_err();
        assert!(matches!(err, Error::Import(_)));
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());
    }

    #[test]
    fn foreign_key_material_in_descriptor_is_not_imported() {
        let (store, _dir) = store_on(Network::Bitcoin);
        // Identity says mainnet but the descriptor embeds testnet keys.
        let payload = serde_json::json!({
            "id": {"kind": "Wallet", "name": "mixed", "network": "bitcoin"},
            "descriptor": "wsh(multi(2,tpubA/0/*,tpubB/0/*))",
            "fingerprints": ["11aabbcc", "22ddeeff"],
            "required_sig": 2,
            "created_at_height": 1,
        })
        .to_string();
        let err = store
            .import_raw(Kind::Wallet, &StringEncoding::new_plain(payload))
            .unwrap_err();
        assert!(matches!(err, Error::Import(_)));
        assert!(store.list(Kind::Wallet).unwrap().wallets.is_empty());
    }

    #[test]
    fn duplicate_and_conflicting_imports_are_distinct_outcomes() {
        let (store, _dir) = store_on(Network::Signet);
        let payload = StringEncoding::new_plain(wallet_json("w", Network::Signet, 5));
        store.import_raw(Kind::Wallet, &payload).unwrap();

        // Byte-identical content again: a duplicate.
        let err = store.import_raw(Kind::Wallet, &payload).unwrap_err();
        assert!(matches!(err, Error::AlreadyExists { kind: Kind::Wallet, .. }));

        // Same name, different content: a conflict, reported as not imported.
        let conflicting = StringEncoding::new_plain(wallet_json("w", Network::Signet, 6));
        let err = store.import_raw(Kind::Wallet, &conflicting).unwrap_err();
        assert!(matches!(err, Error::Import(msg) if msg.contains("different content")));

        assert_eq!(store.list(Kind::Wallet).unwrap().wallets.len(), 1);
        assert_eq!(store.list(Kind::Wallet).unwrap().wallets[0].created_at_height, 5);
    }

    #[test]
    fn garbage_wallet_payload_folds_into_import_error() {
        let (store, _dir) = store_on(Network::Regtest);
        let err = store
            .import_raw(Kind::Wallet, &StringEncoding::new_plain("not json"))
            .unwrap_err();
        assert!(matches!(err, Error::Import(_)));
    }

    #[test]
    fn export_signature_verifies_round_trip() {
        let (store, _dir) = store_on(Network::Regtest);
        let payload = StringEncoding::new_plain(wallet_json("attested", Network::Regtest, 9));
        store.import_raw(Kind::Wallet, &payload).unwrap();

        let signature = store.export_signature(Kind::Wallet, "attested").unwrap();
        assert_eq!(signature.id.name, "attested");
        assert!(!signature.signature.is_empty());

        let verified = store.verify_wallet("attested").unwrap();
        assert!(verified.verified);
    }
}
