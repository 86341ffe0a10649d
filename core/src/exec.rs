//! Captured output of external processes.
//!
//! Every external tool the pipeline invokes (compiler container, shell,
//! image builder, platform probe) is captured as one combined
//! stdout+stderr stream, mirroring what the process would have printed to
//! an interleaved terminal.

use serde::{Deserialize, Serialize};

/// Combined output captured from an external process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Captured stdout followed by stderr.
    pub output: Vec<u8>,
    /// Process exit code; -1 when the process was terminated by a signal.
    pub exit_code: i32,
}

impl ExecOutput {
    /// Whether the process exited with status zero.
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// The combined output as a lossily-decoded string.
    pub fn output_lossy(&self) -> String {
        String::from_utf8_lossy(&self.output).into_owned()
    }
}
