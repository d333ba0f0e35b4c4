//! Subprocess call convention: the engine is a local executable, one
//! request on stdin, one response on stdout. No network is ever involved.

use crate::engine::Transport;
use crate::{Error, Result};
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::debug;

pub struct SubprocessTransport {
    program: PathBuf,
}

impl SubprocessTransport {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        SubprocessTransport { program: program.into() }
    }
}

impl Transport for SubprocessTransport {
    fn call(&self, request: &str) -> Result<String> {
        debug!(program = %self.program.display(), "spawning engine");
        let mut child = Command::new(&self.program)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| Error::TransportMalformed(format!("engine spawn: {}", e)))?;

        child
            .stdin
            .take()
            .ok_or_else(|| Error::TransportMalformed("engine stdin unavailable".into()))?
            .write_all(request.as_bytes())
            .map_err(|e| Error::TransportMalformed(format!("engine write: {}", e)))?;

        let output = child
            .wait_with_output()
            .map_err(|e| Error::TransportMalformed(format!("engine wait: {}", e)))?;
        String::from_utf8(output.stdout)
            .map_err(|e| Error::TransportMalformed(format!("engine output: {}", e)))
    }
}
