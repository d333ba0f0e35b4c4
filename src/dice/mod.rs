//! Guided dice key creation.
//!
//! A session collects exactly the planned number of physical launches for
//! one named key, then commits through the artifact store. The flow is
//! strictly linear: choose faces, collect launch by launch, commit once.
//! Dropping the session before commit discards everything; no partial key
//! is ever persisted.

pub mod plan;

use crate::store::records::MasterKeyRecord;
use crate::store::ArtifactStore;
use crate::{Error, Result};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiceProgress {
    /// Collection continues; `next` is the 1-based launch now expected.
    NeedLaunch { next: u32, of: u32 },
    /// All launches collected; the session is ready to commit.
    ReadyToCommit,
}

#[derive(Debug)]
pub struct DiceSession {
    key_name: String,
    faces: u32,
    required: u32,
    launches: Vec<u32>,
}

impl DiceSession {
    /// Choose a die. `faces` must be in the supported set.
    pub fn new(key_name: impl Into<String>, faces: u32) -> Result<Self> {
        let required = plan::required_launches(faces)?;
        Ok(DiceSession {
            key_name: key_name.into(),
            faces,
            required,
            launches: Vec::with_capacity(required as usize),
        })
    }

    pub fn key_name(&self) -> &str {
        &self.key_name
    }

    pub fn faces(&self) -> u32 {
        self.faces
    }

    pub fn required(&self) -> u32 {
        self.required
    }

    pub fn collected(&self) -> usize {
        self.launches.len()
    }

    pub fn is_complete(&self) -> bool {
        self.launches.len() as u32 == self.required
    }

    /// Record one launch. Values run from 1 to the face count; launches past
    /// the plan are rejected so an index can never be re-collected.
    pub fn add_launch(&mut self, value: u32) -> Result<DiceProgress> {
        if self.is_complete() {
            return Err(Error::Domain("all launches already collected".into()));
        }
        if value == 0 || value > self.faces {
            return Err(Error::LaunchOutOfRange(value, self.faces));
        }
        self.launches.push(value);
        if self.is_complete() {
            info!(key = %self.key_name, launches = self.required, "dice collection complete");
            Ok(DiceProgress::ReadyToCommit)
        } else {
            Ok(DiceProgress::NeedLaunch {
                next: self.launches.len() as u32 + 1,
                of: self.required,
            })
        }
    }

    /// Create the key from the collected launches. Consumes the session, so
    /// a committed sequence can never be replayed.
    pub fn commit(self, store: &ArtifactStore) -> Result<MasterKeyRecord> {
        if !self.is_complete() {
            return Err(Error::SessionIncomplete {
                have: self.launches.len(),
                need: self.required as usize,
            });
        }
        store.create_key_from_dice(&self.key_name, self.faces, &self.launches)
    }
}
