//! POSIX process backend: fork, exec, waitpid
//!
//! Spawning forks, wires the child's streams with `dup2`, merges any
//! environment override into the inherited environment with one `setenv`
//! per pair, and replaces the image with `execvp` (PATH-searching exec).
//!
//! Exec failures are reported through a `O_CLOEXEC` status pipe: on a
//! successful exec the pipe closes and the parent reads EOF; on failure
//! the child writes its errno and `_exit(127)`s, and the parent reaps the
//! corpse and surfaces a spawn error instead of a handle. Every allocation
//! the child branch needs (argv, cwd, env pairs as C strings) happens
//! before the fork; after it, only raw syscalls run.

#![allow(unsafe_code)]

use crate::process::{Backend, Redirect, SpawnOptions, TimedWait, EXIT_ABNORMAL};
use crate::{CommandBuf, CoreError, Result};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{execvp, fork, pipe2, ForkResult, Pid};
use std::ffi::{CStr, CString};
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::ffi::OsStrExt;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Granularity of the non-blocking waitpid poll in `wait_timed`
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A not-yet-reaped child process
#[derive(Debug)]
pub struct ChildHandle {
    pid: Pid,
}

impl ChildHandle {
    pub(crate) fn id(&self) -> u32 {
        self.pid.as_raw() as u32
    }
}

/// fork/exec/waitpid backend
pub struct PosixBackend;

impl Backend for PosixBackend {
    type Handle = ChildHandle;

    fn spawn(&self, cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<ChildHandle> {
        if cmd.is_empty() {
            return Err(CoreError::ValidationError(
                "command must contain at least a program name".to_string(),
            ));
        }

        // Everything the child branch touches is materialized up front;
        // allocating between fork and exec is off limits.
        let argv = cmd.to_cstrings()?;
        let cwd = opts
            .cwd
            .map(|p| {
                CString::new(p.as_os_str().as_bytes()).map_err(|_| {
                    CoreError::ValidationError(format!(
                        "working directory contains interior NUL byte: {:?}",
                        p
                    ))
                })
            })
            .transpose()?;
        let env_pairs = opts.env.map(|e| e.to_cstring_pairs()).transpose()?;

        let (status_read, status_write) = pipe2(OFlag::O_CLOEXEC)
            .map_err(|e| CoreError::Pipe(format!("Failed to create status pipe: {}", e)))?;

        debug!("Spawning process: {}", cmd.display_line());

        // Safety: the child branch only performs raw syscalls before exec
        match unsafe { fork() } {
            Ok(ForkResult::Child) => {
                drop(status_read);
                exec_child(
                    &argv,
                    cwd.as_deref(),
                    env_pairs.as_deref(),
                    &opts.redirect,
                    status_write,
                )
            }
            Ok(ForkResult::Parent { child }) => {
                drop(status_write);
                match read_exec_errno(&status_read) {
                    Some(errno) => {
                        // the child already _exit(127)ed; reap it
                        let _ = waitpid(child, None);
                        let err = std::io::Error::from_raw_os_error(errno);
                        error!(
                            "Failed to spawn process '{}': {}",
                            cmd.program().unwrap_or(""),
                            err
                        );
                        Err(CoreError::Spawn(format!(
                            "Failed to spawn '{}': {}",
                            cmd.program().unwrap_or(""),
                            err
                        )))
                    }
                    None => {
                        debug!("Successfully spawned process {}", child);
                        Ok(ChildHandle { pid: child })
                    }
                }
            }
            Err(e) => {
                error!("fork failed: {}", e);
                Err(CoreError::Spawn(format!("fork failed: {}", e)))
            }
        }
    }

    fn wait(&self, handle: ChildHandle) -> Result<i32> {
        match waitpid(handle.pid, None) {
            Ok(status) => Ok(decode_status(status)),
            Err(e) => {
                error!("Failed to wait for process {}: {}", handle.pid, e);
                Err(CoreError::Wait(format!(
                    "Failed to wait for process {}: {}",
                    handle.pid, e
                )))
            }
        }
    }

    fn wait_timed(
        &self,
        handle: ChildHandle,
        timeout: Option<Duration>,
    ) -> Result<TimedWait<ChildHandle>> {
        let Some(timeout) = timeout else {
            return self.wait(handle).map(TimedWait::Completed);
        };

        let start = Instant::now();
        loop {
            match waitpid(handle.pid, Some(WaitPidFlag::WNOHANG)) {
                Ok(WaitStatus::StillAlive) => {
                    let elapsed = start.elapsed();
                    if elapsed >= timeout {
                        return Ok(TimedWait::TimedOut(handle));
                    }
                    std::thread::sleep((timeout - elapsed).min(POLL_INTERVAL));
                }
                Ok(status) => return Ok(TimedWait::Completed(decode_status(status))),
                Err(e) => {
                    error!("Failed to wait for process {}: {}", handle.pid, e);
                    return Err(CoreError::Wait(format!(
                        "Failed to wait for process {}: {}",
                        handle.pid, e
                    )));
                }
            }
        }
    }

    fn kill(&self, handle: ChildHandle) -> Result<()> {
        debug!("Sending SIGKILL to process {}", handle.pid);
        let sent = kill(handle.pid, Signal::SIGKILL);
        match sent {
            Ok(()) => {}
            Err(Errno::ESRCH) => {
                // process already exited
                debug!("Process {} already exited", handle.pid);
            }
            Err(Errno::EPERM) => {
                debug!("Permission denied signaling process {}", handle.pid);
            }
            Err(e) => {
                error!("Failed to send SIGKILL to process {}: {}", handle.pid, e);
                return Err(CoreError::Signal(format!(
                    "Failed to send SIGKILL to process {}: {}",
                    handle.pid, e
                )));
            }
        }
        // A blocking reap is only safe when the process is dying or gone.
        // After EPERM the child may still be alive and unsignalable, so
        // only a non-blocking reap attempt is made.
        if reap_blocks(&sent) {
            let _ = waitpid(handle.pid, None);
        } else {
            let _ = waitpid(handle.pid, Some(WaitPidFlag::WNOHANG));
        }
        Ok(())
    }

    fn discard(&self, handle: ChildHandle) {
        // Does not reap: the OS-level record of an exited-but-unwaited
        // child stays behind until this process exits.
        debug!("Discarding process {} without reaping", handle.pid);
    }
}

/// Whether the outcome of the SIGKILL delivery permits a blocking reap:
/// the signal landed (`Ok`) or the process is already gone (`ESRCH`).
fn reap_blocks(sent: &nix::Result<()>) -> bool {
    matches!(sent, Ok(()) | Err(Errno::ESRCH))
}

fn decode_status(status: WaitStatus) -> i32 {
    match status {
        WaitStatus::Exited(_, code) => code,
        WaitStatus::Signaled(pid, signal, _) => {
            debug!("Process {} terminated by signal {}", pid, signal);
            EXIT_ABNORMAL
        }
        other => {
            debug!("Unexpected wait status: {:?}", other);
            EXIT_ABNORMAL
        }
    }
}

/// Child-side branch between fork and exec. Never returns: on any failure
/// the errno is written to the status pipe and the child exits abnormally,
/// since returning control to shared code would resume the parent's logic
/// inside the forked copy.
fn exec_child(
    argv: &[CString],
    cwd: Option<&CStr>,
    env: Option<&[(CString, CString)]>,
    redirect: &Redirect<'_>,
    status: OwnedFd,
) -> ! {
    unsafe {
        if let Some(dir) = cwd {
            if libc::chdir(dir.as_ptr()) != 0 {
                report_and_exit(&status, Errno::last() as i32);
            }
        }
        if let Some(reader) = redirect.stdin {
            if libc::dup2(reader.as_raw_fd(), libc::STDIN_FILENO) < 0 {
                report_and_exit(&status, Errno::last() as i32);
            }
        }
        if let Some(writer) = redirect.stdout {
            if libc::dup2(writer.as_raw_fd(), libc::STDOUT_FILENO) < 0 {
                report_and_exit(&status, Errno::last() as i32);
            }
        }
        if let Some(writer) = redirect.stderr {
            if libc::dup2(writer.as_raw_fd(), libc::STDERR_FILENO) < 0 {
                report_and_exit(&status, Errno::last() as i32);
            }
        }
        if let Some(pairs) = env {
            // merges into the inherited environment; the Windows backend
            // replaces the whole block instead
            for (key, value) in pairs {
                libc::setenv(key.as_ptr(), value.as_ptr(), 1);
            }
        }
    }

    // Pipe endpoints are close-on-exec; the dup2 copies on fds 0/1/2 shed
    // the flag, so the originals and every other endpoint the parent holds
    // close at exec. Without that a stdin-redirected child would inherit
    // the parent's write end and never see EOF.

    // only returns on failure; O_CLOEXEC closes the status pipe on success
    let err = match execvp(&argv[0], argv) {
        Err(e) => e,
        Ok(infallible) => match infallible {},
    };
    report_and_exit(&status, err as i32)
}

fn report_and_exit(status: &OwnedFd, errno: i32) -> ! {
    let bytes = errno.to_ne_bytes();
    unsafe {
        let _ = libc::write(status.as_raw_fd(), bytes.as_ptr().cast(), bytes.len());
        libc::_exit(127)
    }
}

/// Read the child's exec errno from the status pipe.
///
/// Returns `None` on EOF (the exec succeeded and `O_CLOEXEC` closed the
/// write end) and `Some(errno)` when the child reported a failure.
fn read_exec_errno(fd: &OwnedFd) -> Option<i32> {
    let mut buf = [0u8; 4];
    let mut filled = 0;
    while filled < buf.len() {
        let n = unsafe {
            libc::read(
                fd.as_raw_fd(),
                buf[filled..].as_mut_ptr().cast(),
                buf.len() - filled,
            )
        };
        if n < 0 {
            if Errno::last() == Errno::EINTR {
                continue;
            }
            return None;
        }
        if n == 0 {
            break;
        }
        filled += n as usize;
    }
    if filled == buf.len() {
        Some(i32::from_ne_bytes(buf))
    } else {
        None
    }
}
