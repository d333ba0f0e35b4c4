//! Coldsign CLI - drive the offline core from a terminal.
//!
//! The signing engine is an external executable (COLDSIGN_ENGINE or
//! --engine); --demo wires the in-process LocalEngine instead, useful for
//! trying the flows without a device.
//!
//! Output is JSON, pretty-printed on a tty.

use anyhow::{anyhow, bail, Context as _, Result};
use coldsign::logging::init_logging;
use coldsign::store::options::Nature;
use coldsign::{
    ArtifactStore, DiceSession, EncryptionKey, EngineBridge, EngineContext, ImportProgress,
    ImportSession, Kind, LocalEngine, Network, ScanInput, StringEncoding, SubprocessTransport,
};
use serde_json::{json, Value};
use std::env;
use std::io::{IsTerminal, Read};

fn main() {
    init_logging();

    let args: Vec<String> = env::args().collect();
    let opts = ParsedArgs::parse(&args[1..]);

    if opts.version {
        println!("coldsign 0.1.0");
        return;
    }
    if opts.help || opts.command.is_none() {
        print_usage();
        return;
    }

    match run(&opts) {
        Ok(output) => {
            if std::io::stdout().is_terminal() {
                println!("{}", serde_json::to_string_pretty(&output).unwrap());
            } else {
                println!("{}", output);
            }
        }
        Err(e) => {
            let err = json!({"error": e.to_string()});
            eprintln!("{}", err);
            std::process::exit(1);
        }
    }
}

#[derive(Default)]
struct ParsedArgs {
    command: Option<String>,
    positional: Vec<String>,
    network: Option<String>,
    datadir: Option<String>,
    engine: Option<String>,
    confirm: Option<String>,
    demo: bool,
    help: bool,
    version: bool,
}

impl ParsedArgs {
    fn parse(args: &[String]) -> Self {
        let mut opts = ParsedArgs::default();
        let mut i = 0;
        while i < args.len() {
            match args[i].as_str() {
                "--help" | "-h" => opts.help = true,
                "--version" | "-V" => opts.version = true,
                "--demo" => opts.demo = true,
                "--network" | "-n" => {
                    if i + 1 < args.len() {
                        opts.network = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--datadir" | "-d" => {
                    if i + 1 < args.len() {
                        opts.datadir = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--engine" | "-e" => {
                    if i + 1 < args.len() {
                        opts.engine = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                "--confirm" => {
                    if i + 1 < args.len() {
                        opts.confirm = Some(args[i + 1].clone());
                        i += 1;
                    }
                }
                arg if !arg.starts_with('-') => {
                    if opts.command.is_none() {
                        opts.command = Some(arg.to_string());
                    } else {
                        opts.positional.push(arg.to_string());
                    }
                }
                _ => {} // Ignore unknown flags
            }
            i += 1;
        }

        if opts.network.is_none() {
            opts.network = env::var("COLDSIGN_NETWORK").ok().filter(|s| !s.is_empty());
        }
        if opts.datadir.is_none() {
            opts.datadir = env::var("COLDSIGN_DATADIR").ok().filter(|s| !s.is_empty());
        }
        if opts.engine.is_none() {
            opts.engine = env::var("COLDSIGN_ENGINE").ok().filter(|s| !s.is_empty());
        }

        opts
    }
}

fn open_store(opts: &ParsedArgs) -> Result<ArtifactStore> {
    let network: Network = opts.network.as_deref().unwrap_or("testnet").parse()?;
    let mut context = EngineContext::new(network);
    if let Some(datadir) = &opts.datadir {
        context = context.with_datadir(datadir);
    }
    if let Ok(key_hex) = env::var("COLDSIGN_ENCRYPTION_KEY_HEX") {
        context = context.with_encryption_key(EncryptionKey::from_hex(&key_hex)?);
    }

    let bridge = if opts.demo {
        EngineBridge::new(LocalEngine::new(), context)
    } else {
        let engine = opts
            .engine
            .as_ref()
            .ok_or_else(|| anyhow!("no engine: set COLDSIGN_ENGINE, pass --engine, or use --demo"))?;
        EngineBridge::new(SubprocessTransport::new(engine), context)
    };
    Ok(ArtifactStore::new(bridge))
}

fn run(opts: &ParsedArgs) -> Result<Value> {
    let store = open_store(opts)?;
    let pos = &opts.positional;
    let arg = |i: usize, what: &str| -> Result<&String> {
        pos.get(i).ok_or_else(|| anyhow!("missing argument: {}", what))
    };

    match opts.command.as_deref().unwrap() {
        "list" => {
            let kind: Kind = arg(0, "kind")?.parse()?;
            Ok(serde_json::to_value(store.list(kind)?)?)
        }
        "random" => Ok(serde_json::to_value(store.create_key_random(arg(0, "name")?)?)?),
        "dice" => {
            let name = arg(0, "name")?;
            let faces: u32 = arg(1, "faces")?.parse().context("faces")?;
            if pos.len() < 3 {
                bail!("missing argument: launches");
            }
            let mut session = DiceSession::new(name, faces)?;
            for launch in &pos[2..] {
                session.add_launch(launch.parse().context("launch")?)?;
            }
            Ok(serde_json::to_value(session.commit(&store)?)?)
        }
        "restore" => {
            let name = arg(0, "name")?;
            let nature: Nature = arg(1, "nature")?.parse()?;
            let value = pos[2..].join(" ");
            if value.is_empty() {
                bail!("missing argument: secret value");
            }
            Ok(serde_json::to_value(store.restore_key(name, nature, &value)?)?)
        }
        "import-wallet" => {
            let payload = read_arg_or_stdin(arg(0, "wallet json or -")?)?;
            Ok(store.import_raw(Kind::Wallet, &StringEncoding::new_plain(payload))?)
        }
        "import-psbt" => {
            let base64 = read_arg_or_stdin(arg(0, "psbt base64 or -")?)?;
            let payload = StringEncoding { t: coldsign::Encoding::Base64, c: base64.trim().into() };
            Ok(store.import_raw(Kind::Psbt, &payload)?)
        }
        "import-frames" => {
            let kind: Kind = arg(0, "kind")?.parse()?;
            if pos.len() < 2 {
                bail!("missing argument: hex frames");
            }
            let mut session = ImportSession::new(&store, kind);
            for frame_hex in &pos[1..] {
                let frame = hex::decode(frame_hex).context("frame hex")?;
                match session.on_scan(ScanInput::Frame(frame))? {
                    ImportProgress::Continue { have, want } => {
                        eprintln!("scanned {} of {}", have, want);
                    }
                    ImportProgress::Imported(record) => return Ok(record),
                    ImportProgress::Cancelled => bail!("cancelled"),
                }
            }
            bail!("payload incomplete, more frames needed")
        }
        "delete" => {
            let kind: Kind = arg(0, "kind")?.parse()?;
            let name = arg(1, "name")?;
            let typed = opts
                .confirm
                .as_ref()
                .ok_or_else(|| anyhow!("retype the name with --confirm <name> to delete"))?;
            store.delete(kind, name, typed)?;
            Ok(json!({"deleted": name}))
        }
        "sign" => {
            let pretty = store.sign_psbt(arg(0, "key")?, arg(1, "wallet")?, arg(2, "psbt")?)?;
            Ok(serde_json::to_value(pretty)?)
        }
        "print" => Ok(serde_json::to_value(store.print_psbt(arg(0, "psbt")?)?)?),
        "export" => {
            let kind: Kind = arg(0, "kind")?.parse()?;
            Ok(serde_json::to_value(store.export_signature(kind, arg(1, "name")?)?)?)
        }
        "sign-wallet" => Ok(serde_json::to_value(store.sign_wallet(arg(0, "name")?)?)?),
        "verify-wallet" => Ok(serde_json::to_value(store.verify_wallet(arg(0, "name")?)?)?),
        "derive-address" => {
            let index: u32 = arg(1, "index")?.parse().context("index")?;
            Ok(serde_json::to_value(store.derive_address(arg(0, "descriptor")?, index)?)?)
        }
        cmd => bail!("unknown command: {}", cmd),
    }
}

fn read_arg_or_stdin(arg: &str) -> Result<String> {
    if arg == "-" {
        let mut buffer = String::new();
        std::io::stdin().read_to_string(&mut buffer)?;
        Ok(buffer)
    } else {
        Ok(arg.to_string())
    }
}

fn print_usage() {
    println!(
        r#"coldsign - offline signer core

USAGE:
    coldsign <command> [args] [options]

COMMANDS:
    list <kind>                       List keys | wallets | psbts
    random <name>                     New key from engine randomness
    dice <name> <faces> <launch>...   New key from physical dice launches
    restore <name> <xprv|mnemonic> <value>
                                      Restore a key from secret material
    import-wallet <json|->            Import a wallet descriptor record
    import-psbt <base64|->            Import a PSBT
    import-frames <kind> <hex>...     Replay scanned frames through import
    delete <kind> <name> --confirm <name>
                                      Delete; the name must be retyped
    sign <key> <wallet> <psbt>        Sign a stored PSBT
    print <psbt>                      Pretty-print a stored PSBT
    export <kind> <name>              Detached signature of an artifact
    sign-wallet <name>                Attest a wallet descriptor
    verify-wallet <name>              Verify a wallet attestation
    derive-address <descriptor> <index>

OPTIONS:
    --network, -n <net>    bitcoin|testnet|regtest|signet (env: COLDSIGN_NETWORK)
    --datadir, -d <path>   Data root (env: COLDSIGN_DATADIR)
    --engine, -e <path>    Signing engine executable (env: COLDSIGN_ENGINE)
    --demo                 Use the in-process engine double
    --version, -V          Print version

The at-rest encryption key handle is read from COLDSIGN_ENCRYPTION_KEY_HEX.

EXAMPLES:
    coldsign --demo -n regtest random alice
    coldsign --demo -n regtest list keys
    coldsign --demo -n regtest delete keys alice --confirm alice
"#
    );
}
