//! Host platform probing.
//!
//! The platform tuple is derived once per build from `uname -srm`. A probe
//! that fails or prints something unexpected degrades to "platform unknown";
//! it never fails the build.

use bpfkit_core::error::Result;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::exec::run_captured;

/// The platform a BPF artifact was built on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub os_version: String,
    pub architecture: String,
}

/// Probe the build host's platform tuple.
///
/// Returns `None` on any failure; this is the single non-fatal degradation
/// in the pipeline.
pub async fn probe_platform(cancel: &CancellationToken) -> Option<Platform> {
    match try_probe(cancel).await {
        Ok(platform) => platform,
        Err(e) => {
            tracing::warn!(error = %e, "unable to derive platform info");
            None
        }
    }
}

async fn try_probe(cancel: &CancellationToken) -> Result<Option<Platform>> {
    let mut cmd = Command::new("uname");
    cmd.arg("-srm");

    let out = run_captured(cancel, cmd, None).await?;
    if !out.success() {
        tracing::warn!(output = %out.output_lossy(), "unable to derive platform info");
        return Ok(None);
    }

    let line = out.output_lossy();
    let platform = parse_uname(&line);
    if platform.is_none() {
        tracing::warn!(output = %line, "unable to derive platform info");
    }
    Ok(platform)
}

/// Parse a `uname -srm` line into a platform tuple.
fn parse_uname(line: &str) -> Option<Platform> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() != 3 {
        return None;
    }
    Some(Platform {
        os: fields[0].to_string(),
        os_version: fields[1].to_string(),
        architecture: fields[2].to_string(),
    })
}
