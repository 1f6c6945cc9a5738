//! Process spawning and lifecycle management
//!
//! One contract, two build-time backends: POSIX (`fork`/`exec`/`waitpid`)
//! and Windows (`CreateProcessW`/handles). The shared surface lives here;
//! each backend implements [`Backend`] so its control flow can be exercised
//! in isolation (the unit tests below substitute a mock).
//!
//! A [`Child`] admits exactly one terminal operation (`wait`, `kill` or
//! `discard`), enforced by ownership transfer: each consumes the handle,
//! and a timed wait only consumes it on completion, returning it back
//! inside [`TimedWait::TimedOut`] otherwise.

#[cfg(unix)]
pub mod posix;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
use posix::{ChildHandle, PosixBackend as OsBackend};
#[cfg(windows)]
use windows::{ChildHandle, WindowsBackend as OsBackend};

use crate::command::CommandBuf;
use crate::environment::EnvironmentBuf;
use crate::pipe::{PipeReader, PipeWriter};
use crate::Result;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Exit code reported for a child terminated by a signal or crash
pub const EXIT_ABNORMAL: i32 = -1;

/// Exit code reported when the wait call itself failed
pub const EXIT_WAIT_FAILED: i32 = -2;

/// Standard-stream overrides for a child process.
///
/// An absent endpoint means the child inherits the parent's corresponding
/// stream. `stdin` takes the read end of a pipe; `stdout` and `stderr`
/// take write ends. The endpoints stay owned by the caller, which closes
/// them once the child no longer needs them.
#[derive(Debug, Default)]
pub struct Redirect<'a> {
    pub stdin: Option<&'a PipeReader>,
    pub stdout: Option<&'a PipeWriter>,
    pub stderr: Option<&'a PipeWriter>,
}

impl Redirect<'_> {
    /// Whether any standard stream is overridden
    pub fn any(&self) -> bool {
        self.stdin.is_some() || self.stdout.is_some() || self.stderr.is_some()
    }
}

/// Spawn-time settings beyond the argument list.
///
/// An absent environment means the child inherits the parent environment
/// untouched. A present one merges into the inherited environment on POSIX
/// but replaces the whole block on Windows (rebuilt from the parent's
/// block plus the overrides), a long-standing asymmetry this subsystem
/// preserves deliberately.
#[derive(Debug, Default)]
pub struct SpawnOptions<'a> {
    pub cwd: Option<&'a Path>,
    pub env: Option<&'a EnvironmentBuf>,
    pub redirect: Redirect<'a>,
}

/// Outcome of a timed wait
#[derive(Debug)]
pub enum TimedWait<H> {
    /// The child exited within the timeout; carries its exit code
    Completed(i32),
    /// The timeout elapsed first; carries the still-live handle back
    TimedOut(H),
}

/// Platform process backend.
///
/// `spawn` either produces a live handle or no handle at all; a failure
/// here is distinct from "process ran but exited non-zero". Every handle
/// accepted by the lifecycle methods is consumed except a timed wait that
/// times out.
pub trait Backend {
    type Handle;

    fn spawn(&self, cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<Self::Handle>;
    fn wait(&self, handle: Self::Handle) -> Result<i32>;
    fn wait_timed(
        &self,
        handle: Self::Handle,
        timeout: Option<Duration>,
    ) -> Result<TimedWait<Self::Handle>>;
    fn kill(&self, handle: Self::Handle) -> Result<()>;
    fn discard(&self, handle: Self::Handle);
}

/// A spawned child process
#[derive(Debug)]
pub struct Child {
    handle: ChildHandle,
}

impl Child {
    /// OS process identifier
    pub fn id(&self) -> u32 {
        self.handle.id()
    }

    /// Block until the child exits and return its exit code:
    /// `0..=255` for a normal exit, [`EXIT_ABNORMAL`] for signalled or
    /// crashed termination.
    pub fn wait(self) -> Result<i32> {
        OsBackend.wait(self.handle)
    }

    /// Wait up to `timeout` for the child to exit; `None` waits forever.
    ///
    /// On timeout the handle is returned back unconsumed, so the caller
    /// may retry or escalate to [`Child::kill`].
    pub fn wait_timed(self, timeout: Option<Duration>) -> Result<TimedWait<Child>> {
        Ok(match OsBackend.wait_timed(self.handle, timeout)? {
            TimedWait::Completed(code) => TimedWait::Completed(code),
            TimedWait::TimedOut(handle) => TimedWait::TimedOut(Child { handle }),
        })
    }

    /// Terminate the child unconditionally and release the handle.
    ///
    /// No graceful-shutdown attempt is made. A child that already exited
    /// is not an error.
    pub fn kill(self) -> Result<()> {
        OsBackend.kill(self.handle)
    }

    /// Release bookkeeping without waiting.
    ///
    /// On POSIX this does not reap the OS-level process record; an exited
    /// child stays a zombie until the parent itself exits.
    pub fn discard(self) {
        OsBackend.discard(self.handle)
    }
}

/// Spawn a child process asynchronously (spawn only, no wait).
pub fn spawn(cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<Child> {
    info!("Running external command: {}", cmd.display_line());
    let handle = OsBackend.spawn(cmd, opts)?;
    Ok(Child { handle })
}

/// Spawn a child process and wait for it to exit (synchronous execution).
pub fn run(cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<i32> {
    info!("Running external command: {}", cmd.display_line());
    run_with(&OsBackend, cmd, opts)
}

fn run_with<B: Backend>(backend: &B, cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<i32> {
    let handle = backend.spawn(cmd, opts)?;
    backend.wait(handle)
}

/// Wait on several children serially, in the given order.
///
/// This is not a "first finished wins" primitive. A wait-call failure for
/// one child is recorded as [`EXIT_WAIT_FAILED`] without affecting the
/// others.
pub fn wait_many(children: Vec<Child>) -> Vec<i32> {
    children
        .into_iter()
        .map(|child| child.wait().unwrap_or(EXIT_WAIT_FAILED))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CoreError;
    use std::cell::Cell;

    /// Scripted backend standing in for the OS layer
    struct MockBackend {
        fail_spawn: bool,
        exit_code: i32,
        spawned: Cell<u32>,
    }

    impl MockBackend {
        fn succeeding(exit_code: i32) -> Self {
            Self {
                fail_spawn: false,
                exit_code,
                spawned: Cell::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail_spawn: true,
                exit_code: 0,
                spawned: Cell::new(0),
            }
        }
    }

    impl Backend for MockBackend {
        type Handle = u32;

        fn spawn(&self, _cmd: &CommandBuf, _opts: &SpawnOptions<'_>) -> Result<u32> {
            if self.fail_spawn {
                return Err(CoreError::Spawn("mock spawn failure".to_string()));
            }
            let id = self.spawned.get() + 1;
            self.spawned.set(id);
            Ok(id)
        }

        fn wait(&self, _handle: u32) -> Result<i32> {
            Ok(self.exit_code)
        }

        fn wait_timed(&self, handle: u32, timeout: Option<Duration>) -> Result<TimedWait<u32>> {
            match timeout {
                Some(d) if d < Duration::from_millis(1) => Ok(TimedWait::TimedOut(handle)),
                _ => Ok(TimedWait::Completed(self.exit_code)),
            }
        }

        fn kill(&self, _handle: u32) -> Result<()> {
            Ok(())
        }

        fn discard(&self, _handle: u32) {}
    }

    fn dummy_command() -> CommandBuf {
        let mut cmd = CommandBuf::with_capacity(16, 2);
        cmd.append(&["true"]);
        cmd
    }

    #[test]
    fn test_run_is_spawn_plus_wait() {
        let backend = MockBackend::succeeding(42);
        let code = run_with(&backend, &dummy_command(), &SpawnOptions::default()).unwrap();
        assert_eq!(code, 42);
        assert_eq!(backend.spawned.get(), 1);
    }

    #[test]
    fn test_spawn_failure_produces_no_handle() {
        let backend = MockBackend::failing();
        let result = run_with(&backend, &dummy_command(), &SpawnOptions::default());
        match result.unwrap_err() {
            CoreError::Spawn(_) => {}
            e => panic!("Expected Spawn error, got: {}", e),
        }
        assert_eq!(backend.spawned.get(), 0);
    }

    #[test]
    fn test_timed_out_handle_can_be_retried() {
        let backend = MockBackend::succeeding(7);
        let handle = backend.spawn(&dummy_command(), &SpawnOptions::default()).unwrap();

        let handle = match backend.wait_timed(handle, Some(Duration::ZERO)).unwrap() {
            TimedWait::TimedOut(h) => h,
            TimedWait::Completed(_) => panic!("zero timeout must not complete"),
        };

        match backend.wait_timed(handle, None).unwrap() {
            TimedWait::Completed(code) => assert_eq!(code, 7),
            TimedWait::TimedOut(_) => panic!("infinite wait must complete"),
        }
    }

    #[test]
    fn test_redirect_any() {
        let redirect = Redirect::default();
        assert!(!redirect.any());

        let pipe = crate::Pipe::open().unwrap();
        let redirect = Redirect {
            stdout: Some(&pipe.writer),
            ..Default::default()
        };
        assert!(redirect.any());
    }
}
