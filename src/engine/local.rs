//! In-process engine double.
//!
//! Implements the full wire contract against the real on-disk layout
//! (`<datadir>/<network>/<kind>/<name>/<record>.json`) so the store,
//! sessions, CLI demo mode and every test exercise true engine semantics:
//! uniqueness, network compatibility, structured-append merging, dice
//! accumulation, double-sign detection.
//!
//! Key material is a deterministic sha256 placeholder, not BIP32: the
//! production engine owns the actual cryptography and is reached through
//! [`SubprocessTransport`](crate::engine::SubprocessTransport). Records are
//! stored in plaintext; the at-rest encryption key in the context is
//! acknowledged and ignored.

use crate::dice::plan;
use crate::encoding::StringEncoding;
use crate::engine::Transport;
use crate::frame::FrameHeader;
use crate::network::Network;
use crate::store::options::{
    DeriveAddressOptions, DiceOptions, ExportOptions, ListOptions, Nature, PrintOptions,
    QrMergeOptions, RandomOptions, RestoreOptions, SavePsbtOptions, SignOptions,
    WalletNameOptions,
};
use crate::store::records::{
    AddressOutput, DiceRecord, Identifier, Kind, ListOutput, MasterKeyRecord, PsbtPrettyPrint,
    PsbtRecord, TxFee, TxIn, TxOut, TxSize, VerifyWalletResult, WalletRecord,
    WalletSignatureRecord,
};
use crate::Result;
use num_bigint::BigUint;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Default)]
pub struct LocalEngine;

impl LocalEngine {
    pub fn new() -> Self {
        LocalEngine
    }
}

impl Transport for LocalEngine {
    fn call(&self, request: &str) -> Result<String> {
        let response = dispatch(request).unwrap_or_else(|msg| json!({ "error": msg }));
        Ok(response.to_string())
    }
}

/// Engine-side failures are strings; the bridge turns them into domain
/// errors on the caller side.
type EngineResult<T> = std::result::Result<T, String>;

#[derive(Debug, Deserialize)]
struct Envelope {
    method: String,
    context: RequestContext,
    #[serde(default)]
    args: Value,
}

#[derive(Debug, Deserialize)]
struct RequestContext {
    datadir: PathBuf,
    network: Network,
    encryption_key: Option<StringEncoding>,
}

fn dispatch(request: &str) -> EngineResult<Value> {
    let envelope: Envelope =
        serde_json::from_str(request).map_err(|e| format!("bad request: {}", e))?;
    let ctx = envelope.context;
    debug!(
        method = %envelope.method,
        network = %ctx.network,
        encrypted = ctx.encryption_key.is_some(),
        "local engine call"
    );
    let args = envelope.args;
    match envelope.method.as_str() {
        "list" => list(&ctx, parse(args)?),
        "random" => random(&ctx, parse(args)?),
        "dice" => dice(&ctx, parse(args)?),
        "restore" => restore(&ctx, parse(args)?),
        "import" => import_key(&ctx, parse(args)?),
        "import_wallet" => import_wallet(&ctx, parse(args)?),
        "sign_wallet" => sign_wallet(&ctx, parse(args)?),
        "verify_wallet" => verify_wallet(&ctx, parse(args)?),
        "sign" => sign(parse(args)?),
        "print" => print(parse(args)?),
        "save_psbt" => save_psbt(&ctx, parse(args)?),
        "merge_qrs" => merge_qrs(parse(args)?),
        "derive_address" => derive_address(&ctx, parse(args)?),
        "export" => export(&ctx, parse(args)?),
        other => Err(format!("method {} not exist", other)),
    }
}

fn parse<T: DeserializeOwned>(args: Value) -> EngineResult<T> {
    serde_json::from_value(args).map_err(|e| format!("bad arguments: {}", e))
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

fn record_path(ctx: &RequestContext, kind: Kind, name: &str) -> PathBuf {
    Identifier::new(ctx.network, kind, name).record_path(&ctx.datadir)
}

fn read_record(ctx: &RequestContext, kind: Kind, name: &str) -> EngineResult<Value> {
    read_record_at(&record_path(ctx, kind, name))
}

fn read_record_at(path: &Path) -> EngineResult<Value> {
    let bytes =
        fs::read(path).map_err(|e| format!("{:?} file not found or corrupt: {}", path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| format!("{:?} file not found or corrupt: {}", path, e))
}

fn write_record(
    ctx: &RequestContext,
    kind: Kind,
    name: &str,
    value: &Value,
    can_overwrite: bool,
) -> EngineResult<()> {
    let path = record_path(ctx, kind, name);
    if !can_overwrite && path.exists() {
        return Err(format!("cannot overwrite {:?}", path));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| format!("mkdir {:?}: {}", parent, e))?;
    }
    let bytes = serde_json::to_vec_pretty(value).map_err(|e| e.to_string())?;
    fs::write(&path, bytes).map_err(|e| format!("write {:?}: {}", path, e))
}

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

fn list(ctx: &RequestContext, opts: ListOptions) -> EngineResult<Value> {
    let dir = ctx.datadir.join(ctx.network.to_string()).join(opts.kind.dir());
    let mut out = ListOutput::default();
    if dir.is_dir() {
        let mut names: Vec<String> = fs::read_dir(&dir)
            .map_err(|e| format!("list {:?}: {}", dir, e))?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .collect();
        names.sort();
        for name in names {
            let value = match read_record(ctx, opts.kind, &name) {
                Ok(v) => v,
                Err(e) => {
                    debug!(name, error = %e, "skipping unreadable artifact");
                    continue;
                }
            };
            match opts.kind {
                Kind::Key => match serde_json::from_value(value) {
                    Ok(record) => out.keys.push(record),
                    Err(e) => debug!(name, error = %e, "skipping malformed key"),
                },
                Kind::Wallet => match serde_json::from_value(value) {
                    Ok(record) => out.wallets.push(record),
                    Err(e) => debug!(name, error = %e, "skipping malformed wallet"),
                },
                Kind::Psbt => match serde_json::from_value(value) {
                    Ok(record) => out.psbts.push(record),
                    Err(e) => debug!(name, error = %e, "skipping malformed psbt"),
                },
            }
        }
    }
    serde_json::to_value(out).map_err(|e| e.to_string())
}

/// Placeholder key material: prefix per network plus a content hash. The
/// production engine derives real BIP32 keys here.
fn key_material(network: Network, seed: &[u8]) -> (String, String, String) {
    let digest = Sha256::digest(seed);
    let fingerprint = hex::encode(&digest[..4]);
    let (prv, pub_) = match network {
        Network::Bitcoin => ("xprv", "xpub"),
        _ => ("tprv", "tpub"),
    };
    let body = hex::encode(digest);
    (format!("{}{}", prv, body), format!("{}{}", pub_, body), fingerprint)
}

fn store_key(ctx: &RequestContext, record: &MasterKeyRecord) -> EngineResult<Value> {
    let value = serde_json::to_value(record).map_err(|e| e.to_string())?;
    write_record(ctx, Kind::Key, &record.id.name, &value, false)?;
    Ok(value)
}

fn random(ctx: &RequestContext, opts: RandomOptions) -> EngineResult<Value> {
    let seed = Sha256::new()
        .chain_update(b"random")
        .chain_update(ctx.network.as_str())
        .chain_update(opts.key_name.as_bytes())
        .finalize();
    let (xprv, xpub, fingerprint) = key_material(ctx.network, &seed);
    let record = MasterKeyRecord {
        id: Identifier::new(ctx.network, Kind::Key, &opts.key_name),
        xpub,
        xprv,
        fingerprint,
        mnemonic: None,
        dice: None,
    };
    store_key(ctx, &record)
}

fn dice(ctx: &RequestContext, opts: DiceOptions) -> EngineResult<Value> {
    if opts.bits != plan::TARGET_BITS {
        return Err(format!("{} bits of entropy not supported, use 256", opts.bits));
    }
    let required = plan::required_launches(opts.faces).map_err(|e| e.to_string())?;
    if opts.launches.len() as u32 != required {
        return Err(format!(
            "need {} dice launches to achieve {} bits of entropy (provided: {})",
            required,
            opts.bits,
            opts.launches.len()
        ));
    }
    for &n in &opts.launches {
        if n == 0 || n > opts.faces {
            return Err(format!("got {} but must be from 1 to {} included", n, opts.faces));
        }
    }

    let value = accumulate_launches(&opts.launches, opts.faces);
    let seed = value.to_bytes_be();
    let (xprv, xpub, fingerprint) = key_material(ctx.network, &seed);
    let record = MasterKeyRecord {
        id: Identifier::new(ctx.network, Kind::Key, &opts.key_name),
        xpub,
        xprv,
        fingerprint,
        mnemonic: None,
        dice: Some(DiceRecord {
            faces: opts.faces,
            launches: opts.launches.clone(),
            value: value.to_string(),
        }),
    };
    store_key(ctx, &record)
}

/// Each launch is one digit of a base-`faces` number, most significant
/// first.
fn accumulate_launches(launches: &[u32], faces: u32) -> BigUint {
    let mut acc = BigUint::from(0u32);
    for &launch in launches {
        acc *= faces;
        acc += launch - 1;
    }
    acc
}

fn restore(ctx: &RequestContext, opts: RestoreOptions) -> EngineResult<Value> {
    let mnemonic = match opts.nature {
        Nature::Xprv => {
            let expected = match ctx.network {
                Network::Bitcoin => "xprv",
                _ => "tprv",
            };
            let foreign = if expected == "xprv" { "tprv" } else { "xprv" };
            if opts.value.starts_with(foreign) {
                return Err("incompatible networks".into());
            }
            if !opts.value.starts_with(expected) {
                return Err("not a valid extended private key".into());
            }
            None
        }
        Nature::Mnemonic => {
            let words = opts.value.split_whitespace().count();
            if words != 12 && words != 24 {
                return Err(format!("invalid mnemonic: {} words, expected 12 or 24", words));
            }
            Some(opts.value.clone())
        }
    };

    let seed = Sha256::new()
        .chain_update(b"restore")
        .chain_update(opts.value.as_bytes())
        .finalize();
    let (derived_xprv, xpub, fingerprint) = key_material(ctx.network, &seed);
    let xprv = match opts.nature {
        Nature::Xprv => opts.value.clone(),
        Nature::Mnemonic => derived_xprv,
    };
    let record = MasterKeyRecord {
        id: Identifier::new(ctx.network, Kind::Key, &opts.key_name),
        xpub,
        xprv,
        fingerprint,
        mnemonic,
        dice: None,
    };
    store_key(ctx, &record)
}

fn import_key(ctx: &RequestContext, record: MasterKeyRecord) -> EngineResult<Value> {
    if record.id.network != ctx.network {
        return Err("incompatible networks".into());
    }
    store_key(ctx, &record)
}

fn import_wallet(ctx: &RequestContext, record: WalletRecord) -> EngineResult<Value> {
    if record.id.kind != Kind::Wallet {
        return Err(format!("expected a wallet, got {}", record.id.kind));
    }
    if record.id.network != ctx.network {
        return Err("incompatible networks".into());
    }
    let expected = ctx.network.key_prefix();
    let foreign = if expected == "xpub" { "tpub" } else { "xpub" };
    if record.descriptor.contains(foreign) {
        return Err(format!("incompatible networks: descriptor embeds {} keys", foreign));
    }
    if !record.descriptor.contains(expected) {
        return Err(format!("descriptor has no {} keys", expected));
    }
    if record.fingerprints.is_empty() {
        return Err("wallet has no participant fingerprints".into());
    }
    if record.required_sig == 0 || record.required_sig as usize > record.fingerprints.len() {
        return Err(format!(
            "threshold {} out of range for {} participants",
            record.required_sig,
            record.fingerprints.len()
        ));
    }
    let value = serde_json::to_value(&record).map_err(|e| e.to_string())?;
    write_record(ctx, Kind::Wallet, &record.id.name, &value, false)?;
    Ok(value)
}

fn descriptor_signature(descriptor: &str) -> String {
    hex::encode(Sha256::new().chain_update(b"wallet-sig").chain_update(descriptor).finalize())
}

fn wallet_signature_record(
    ctx: &RequestContext,
    name: &str,
    descriptor: &str,
) -> WalletSignatureRecord {
    let seed = Sha256::new().chain_update(b"attest").chain_update(descriptor).finalize();
    let (_, xpub, _) = key_material(ctx.network, &seed);
    WalletSignatureRecord {
        id: Identifier::new(ctx.network, Kind::Wallet, name),
        xpub,
        address: fake_address(ctx.network, descriptor, 0),
        signature: descriptor_signature(descriptor),
    }
}

fn signature_path(ctx: &RequestContext, name: &str) -> PathBuf {
    Identifier::new(ctx.network, Kind::Wallet, name)
        .as_path_buf(&ctx.datadir)
        .join("wallet_signature.json")
}

fn sign_wallet(ctx: &RequestContext, opts: WalletNameOptions) -> EngineResult<Value> {
    let wallet: WalletRecord =
        parse(read_record(ctx, Kind::Wallet, &opts.wallet_name)?)?;
    let record = wallet_signature_record(ctx, &opts.wallet_name, &wallet.descriptor);
    let value = serde_json::to_value(&record).map_err(|e| e.to_string())?;
    let path = signature_path(ctx, &opts.wallet_name);
    fs::write(&path, value.to_string()).map_err(|e| format!("write {:?}: {}", path, e))?;
    Ok(value)
}

fn verify_wallet(ctx: &RequestContext, opts: WalletNameOptions) -> EngineResult<Value> {
    let wallet: WalletRecord =
        parse(read_record(ctx, Kind::Wallet, &opts.wallet_name)?)?;
    let path = signature_path(ctx, &opts.wallet_name);
    let signature: WalletSignatureRecord = parse(read_record_at(&path)?)?;
    let verified = signature.signature == descriptor_signature(&wallet.descriptor);
    serde_json::to_value(VerifyWalletResult { descriptor: wallet.descriptor, signature, verified })
        .map_err(|e| e.to_string())
}

fn export(ctx: &RequestContext, opts: ExportOptions) -> EngineResult<Value> {
    match opts.kind {
        Kind::Wallet => sign_wallet(ctx, WalletNameOptions { wallet_name: opts.name }),
        kind => {
            let record = read_record(ctx, kind, &opts.name)?;
            let content = record.to_string();
            let record = WalletSignatureRecord {
                id: Identifier::new(ctx.network, kind, &opts.name),
                xpub: String::new(),
                address: String::new(),
                signature: descriptor_signature(&content),
            };
            serde_json::to_value(record).map_err(|e| e.to_string())
        }
    }
}

// ---------------------------------------------------------------------------
// PSBT
// ---------------------------------------------------------------------------

fn pretty_print(
    psbt_value: &Value,
    wallet_with_path: Option<String>,
    info: Vec<String>,
) -> EngineResult<Value> {
    let record: PsbtRecord = parse(psbt_value.clone())?;
    let signatures: Vec<String> = psbt_value
        .get("partial_sigs")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();

    let payload_len = record.psbt.len() as u32;
    let outpoint = hex::encode(Sha256::digest(record.psbt.as_bytes()));
    let absolute = (record.fee * 100_000_000.0) as u64;
    let pretty = PsbtPrettyPrint {
        inputs: vec![TxIn {
            outpoint: format!("{}:0", outpoint),
            signatures: signatures.clone(),
            value: "unknown".into(),
            wallet_with_path,
        }],
        outputs: vec![TxOut {
            address: "unknown".into(),
            value: "unknown".into(),
            wallet_with_path: None,
        }],
        size: TxSize {
            unsigned: payload_len,
            estimated: payload_len + 72 * signatures.len() as u32,
            psbt: payload_len,
        },
        fee: TxFee {
            absolute_fmt: format!("{:.8} BTC", record.fee),
            absolute,
            rate: if payload_len > 0 { absolute as f64 / payload_len as f64 } else { 0.0 },
        },
        info,
        balances: String::new(),
    };
    serde_json::to_value(pretty).map_err(|e| e.to_string())
}

fn sign(opts: SignOptions) -> EngineResult<Value> {
    let key: MasterKeyRecord = parse(read_record_at(&PathBuf::from(&opts.key_file))?)?;
    let wallet: WalletRecord =
        parse(read_record_at(&PathBuf::from(&opts.wallet_descriptor_file))?)?;
    let psbt_path = PathBuf::from(&opts.psbt_file);
    let mut psbt_value = read_record_at(&psbt_path)?;

    let mut signatures: Vec<String> = psbt_value
        .get("partial_sigs")
        .and_then(Value::as_array)
        .map(|a| a.iter().filter_map(Value::as_str).map(String::from).collect())
        .unwrap_or_default();

    let info = if signatures.contains(&key.fingerprint) {
        vec!["No signature added".to_string()]
    } else {
        signatures.push(key.fingerprint.clone());
        psbt_value["partial_sigs"] = json!(signatures);
        fs::write(&psbt_path, serde_json::to_vec_pretty(&psbt_value).map_err(|e| e.to_string())?)
            .map_err(|e| format!("write {:?}: {}", psbt_path, e))?;
        vec!["Added signatures".to_string()]
    };

    let wallet_with_path = Some(format!("{} m/0/0", wallet.id.name));
    pretty_print(&psbt_value, wallet_with_path, info)
}

fn print(opts: PrintOptions) -> EngineResult<Value> {
    let psbt_value = read_record_at(&PathBuf::from(&opts.psbt_file))?;
    pretty_print(&psbt_value, None, vec![])
}

fn save_psbt(ctx: &RequestContext, opts: SavePsbtOptions) -> EngineResult<Value> {
    let bytes = opts
        .psbt
        .decode()
        .map_err(|_| format!("PSBT has bad {} string encoding", opts.psbt.t.as_str()))?;
    let base64 = StringEncoding::new_base64(&bytes).c;

    let listed: ListOutput = parse(list(ctx, ListOptions { kind: Kind::Psbt })?)?;
    if listed.psbts.iter().any(|p| p.psbt == base64) {
        return Err("PSBT did not change after merge".into());
    }
    let name = (0..)
        .map(|i| format!("psbt-{}", i))
        .find(|candidate| !listed.psbts.iter().any(|p| &p.id.name == candidate))
        .expect("unbounded candidate names");

    let record = PsbtRecord {
        id: Identifier::new(ctx.network, Kind::Psbt, &name),
        psbt: base64,
        fee: bytes.len() as f64 * 1e-7,
        changepos: -1,
    };
    let mut value = serde_json::to_value(&record).map_err(|e| e.to_string())?;
    value["partial_sigs"] = json!([]);
    write_record(ctx, Kind::Psbt, &name, &value, false)?;
    Ok(value)
}

// ---------------------------------------------------------------------------
// Frames / addresses
// ---------------------------------------------------------------------------

fn merge_qrs(opts: QrMergeOptions) -> EngineResult<Value> {
    let mut frames: Vec<Vec<u8>> = opts
        .qrs_content
        .iter()
        .map(|enc| enc.decode().map_err(|e| e.to_string()))
        .collect::<EngineResult<_>>()?;
    frames.sort();
    frames.dedup();
    if frames.len() < 2 {
        return Err("need at least 2 pieces to merge".into());
    }

    let mut parsed = Vec::with_capacity(frames.len());
    for frame in &frames {
        parsed.push(FrameHeader::parse(frame).map_err(|e| e.to_string())?);
    }

    let total = (parsed.len() - 1) as u8;
    if !parsed.iter().all(|h| h.total == total) {
        return Err(format!("{} pieces but totals mismatch", parsed.len()));
    }
    let sequences: HashSet<u8> = parsed.iter().map(|h| h.seq).collect();
    if sequences.len() != parsed.len() {
        return Err("missing pieces".into());
    }

    parsed.sort_by_key(|h| h.seq);
    let payload: Vec<u8> = parsed.iter().flat_map(|h| h.content.iter().copied()).collect();

    let parity = crate::frame::payload_parity(&payload);
    if !parsed.iter().all(|h| h.parity == parity) {
        return Err("parity mismatch".into());
    }
    Ok(Value::String(hex::encode(payload)))
}

fn fake_address(network: Network, descriptor: &str, index: u32) -> String {
    let hrp = match network {
        Network::Bitcoin => "bc",
        Network::Testnet | Network::Signet => "tb",
        Network::Regtest => "bcrt",
    };
    let digest = Sha256::new()
        .chain_update(descriptor.as_bytes())
        .chain_update(index.to_be_bytes())
        .finalize();
    format!("{}1q{}", hrp, &hex::encode(digest)[..32])
}

fn derive_address(ctx: &RequestContext, opts: DeriveAddressOptions) -> EngineResult<Value> {
    serde_json::to_value(AddressOutput {
        address: fake_address(ctx.network, &opts.descriptor, opts.index),
        path: format!("m/0/{}", opts.index),
    })
    .map_err(|e| e.to_string())
}
