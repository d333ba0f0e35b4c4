//! Coldsign: offline core of an air-gapped signing device.
//!
//! Artifacts (keys, wallets, PSBTs) live under a per-network namespace and
//! only ever move through human-mediated channels: typed text or optical
//! codes. All cryptography runs in an external signing engine reached
//! through one synchronous request/response contract.
//!
//! # Architecture
//!
//! ```text
//! caller (UI / CLI)
//!   │
//!   ├── ArtifactStore (typed CRUD, no cache)
//!   │     └── EngineBridge ── Transport ──→ signing engine
//!   │           {method, context, args}      (subprocess, or the
//!   │                                         in-process LocalEngine)
//!   ├── DiceSession (EntropyPlan → collect launches → commit key)
//!   │
//!   └── ImportSession (scan frames → FrameCodec → import artifact)
//! ```
//!
//! # Flows
//!
//! | Flow | Entry point | Ends in |
//! |------|-------------|---------|
//! | CRUD | [`ArtifactStore`] | one engine call per operation |
//! | dice key | [`DiceSession`] | `ArtifactStore::create_key_from_dice` |
//! | optical import | [`ImportSession`] | `ArtifactStore::import_raw` |
//!
//! Everything is single-threaded and synchronous; sessions suspend only at
//! human-interaction boundaries and cancelling one never leaves a partial
//! artifact behind.

pub mod config;
pub mod dice;
pub mod encoding;
pub mod engine;
pub mod error;
pub mod frame;
pub mod import;
pub mod logging;
pub mod network;
pub mod store;

pub use config::{EncryptionKey, EngineContext};
pub use dice::{plan, DiceProgress, DiceSession};
pub use encoding::{Encoding, StringEncoding};
pub use engine::{EngineBridge, LocalEngine, SubprocessTransport, Transport};
pub use error::{Error, Result};
pub use frame::{FrameBuffer, ScanProgress};
pub use import::{ImportProgress, ImportSession, ScanInput};
pub use network::Network;
pub use store::records::{
    Identifier, ItemView, Kind, ListOutput, MasterKeyRecord, PsbtPrettyPrint, PsbtRecord,
    WalletRecord, WalletSignatureRecord,
};
pub use store::ArtifactStore;
