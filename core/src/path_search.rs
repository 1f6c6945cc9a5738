//! Executable lookup on the system search path
//!
//! Lookup is delegated to the platform's own resolver, `which` on POSIX
//! and `where` on Windows, spawned through this library's process layer.
//! Delegation keeps the answer consistent with what a subsequent spawn
//! will do, including platform quirks like `PATHEXT` on Windows. The
//! resolver's output is redirected into a throwaway pipe so the lookup
//! never writes to the caller's streams.

use crate::pipe::Pipe;
use crate::process::{run, Redirect, SpawnOptions};
use crate::{CommandBuf, Result};
use tracing::debug;

#[cfg(unix)]
const RESOLVER: &str = "which";
#[cfg(windows)]
const RESOLVER: &str = "where";

/// Whether `program` can be found on the current search path.
///
/// A resolver exit code of zero means found; any other exit code means
/// not found. A failure to spawn the resolver itself is an error, not a
/// negative answer.
pub fn is_in_path(program: &str) -> Result<bool> {
    let mut cmd = CommandBuf::with_capacity(RESOLVER.len() + program.len(), 2);
    cmd.append(&[RESOLVER, program]);

    let pipe = Pipe::open()?;
    let opts = SpawnOptions {
        redirect: Redirect {
            stdout: Some(&pipe.writer),
            stderr: Some(&pipe.writer),
            ..Default::default()
        },
        ..Default::default()
    };

    let code = run(&cmd, &opts)?;
    debug!(
        "Path lookup for '{}' via '{}' exited with {}",
        program, RESOLVER, code
    );
    Ok(code == 0)
}
