//! Windows process backend: CreateProcessW and kernel object handles
//!
//! The argument list is flattened into a single quoted command line (the
//! inverse of the splitting in [`crate::cmdline`]), the working directory
//! goes through the long-path preparation in [`crate::winpath`], and an
//! environment override is applied by rebuilding the whole Unicode block
//! from the parent's variables plus the overrides. Standard streams are
//! only inheritable when at least one is overridden; otherwise no handle
//! inheritance is requested at all.

#![allow(unsafe_code)]

use crate::process::{Backend, SpawnOptions, TimedWait, EXIT_ABNORMAL};
use crate::{cmdline, pipe, winpath, CommandBuf, CoreError, EnvironmentBuf, Result};
use std::io;
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle};
use std::ptr;
use std::time::Duration;
use tracing::{debug, error};
use windows_sys::Win32::Foundation::{
    CloseHandle, HANDLE, STILL_ACTIVE, WAIT_OBJECT_0, WAIT_TIMEOUT,
};
use windows_sys::Win32::System::Threading::{
    CreateProcessW, GetExitCodeProcess, TerminateProcess, WaitForSingleObject,
    CREATE_UNICODE_ENVIRONMENT, INFINITE, PROCESS_INFORMATION, STARTF_USESTDHANDLES, STARTUPINFOW,
};

/// A live child process handle plus its identifier
#[derive(Debug)]
pub struct ChildHandle {
    process: OwnedHandle,
    pid: u32,
}

impl ChildHandle {
    pub(crate) fn id(&self) -> u32 {
        self.pid
    }

    fn raw(&self) -> HANDLE {
        self.process.as_raw_handle() as HANDLE
    }
}

/// CreateProcessW backend
pub struct WindowsBackend;

impl Backend for WindowsBackend {
    type Handle = ChildHandle;

    fn spawn(&self, cmd: &CommandBuf, opts: &SpawnOptions<'_>) -> Result<ChildHandle> {
        if cmd.is_empty() {
            return Err(CoreError::ValidationError(
                "command must contain at least a program name".to_string(),
            ));
        }

        // CreateProcessW may scribble on the command-line buffer, so it
        // must be mutable and owned by us.
        let line = cmdline::join_args(cmd.iter());
        let mut line_wide = winpath::to_wide(&line);

        let cwd_wide = opts.cwd.map(prepare_cwd).transpose()?;
        let env_block = opts.env.map(build_env_block);

        let mut startup: STARTUPINFOW = unsafe { std::mem::zeroed() };
        startup.cb = std::mem::size_of::<STARTUPINFOW>() as u32;

        // Handles only cross the process boundary when a stream is
        // actually overridden; an un-overridden spawn inherits nothing.
        // Pipe endpoints are created non-inheritable, so exactly the
        // redirected ones are marked inheritable, and only around the
        // CreateProcessW call. A parent-side sibling endpoint crossing
        // into the child would keep its pipe open past the parent's
        // close. Console std handles used as fallbacks are inheritable
        // already and are left untouched.
        let redirecting = opts.redirect.any();
        let mut marked: Vec<HANDLE> = Vec::new();
        if redirecting {
            startup.dwFlags |= STARTF_USESTDHANDLES;
            startup.hStdInput = match opts.redirect.stdin {
                Some(reader) => {
                    marked.push(reader.as_raw_handle() as HANDLE);
                    reader.as_raw_handle() as HANDLE
                }
                None => pipe::stdin_handle()? as HANDLE,
            };
            startup.hStdOutput = match opts.redirect.stdout {
                Some(writer) => {
                    marked.push(writer.as_raw_handle() as HANDLE);
                    writer.as_raw_handle() as HANDLE
                }
                None => pipe::stdout_handle()? as HANDLE,
            };
            startup.hStdError = match opts.redirect.stderr {
                Some(writer) => {
                    marked.push(writer.as_raw_handle() as HANDLE);
                    writer.as_raw_handle() as HANDLE
                }
                None => pipe::stderr_handle()? as HANDLE,
            };
            if let Err(e) = marked.iter().try_for_each(|&h| set_inheritable(h, true)) {
                for &h in &marked {
                    let _ = set_inheritable(h, false);
                }
                return Err(e);
            }
        }

        let creation_flags = if env_block.is_some() {
            CREATE_UNICODE_ENVIRONMENT
        } else {
            0
        };

        debug!("Spawning process: {}", line);

        let env_ptr: *const std::ffi::c_void = match &env_block {
            Some(block) => block.as_ptr().cast(),
            None => ptr::null(),
        };

        let mut info: PROCESS_INFORMATION = unsafe { std::mem::zeroed() };
        let ok = unsafe {
            CreateProcessW(
                ptr::null(),
                line_wide.as_mut_ptr(),
                ptr::null(),
                ptr::null(),
                i32::from(redirecting),
                creation_flags,
                env_ptr,
                cwd_wide.as_ref().map_or(ptr::null(), |w| w.as_ptr()),
                &startup,
                &mut info,
            )
        };
        for &h in &marked {
            let _ = set_inheritable(h, false);
        }
        if ok == 0 {
            let err = io::Error::last_os_error();
            error!(
                "Failed to spawn process '{}': {}",
                cmd.program().unwrap_or(""),
                err
            );
            return Err(CoreError::Spawn(format!(
                "Failed to spawn '{}': {}",
                cmd.program().unwrap_or(""),
                err
            )));
        }

        // the thread handle is never used for lifecycle control
        unsafe {
            CloseHandle(info.hThread);
        }
        debug!("Successfully spawned process {}", info.dwProcessId);

        // Safety: CreateProcessW succeeded, hProcess is open and unowned
        let process = unsafe { OwnedHandle::from_raw_handle(info.hProcess as _) };
        Ok(ChildHandle {
            process,
            pid: info.dwProcessId,
        })
    }

    fn wait(&self, handle: ChildHandle) -> Result<i32> {
        let waited = unsafe { WaitForSingleObject(handle.raw(), INFINITE) };
        if waited != WAIT_OBJECT_0 {
            let err = io::Error::last_os_error();
            error!("Failed to wait for process {}: {}", handle.pid, err);
            return Err(CoreError::Wait(format!(
                "Failed to wait for process {}: {}",
                handle.pid, err
            )));
        }
        exit_code(&handle)
    }

    fn wait_timed(
        &self,
        handle: ChildHandle,
        timeout: Option<Duration>,
    ) -> Result<TimedWait<ChildHandle>> {
        let millis = match timeout {
            None => INFINITE,
            Some(d) => d.as_millis().min(u128::from(INFINITE - 1)) as u32,
        };
        match unsafe { WaitForSingleObject(handle.raw(), millis) } {
            WAIT_OBJECT_0 => exit_code(&handle).map(TimedWait::Completed),
            WAIT_TIMEOUT => Ok(TimedWait::TimedOut(handle)),
            _ => {
                let err = io::Error::last_os_error();
                error!("Failed to wait for process {}: {}", handle.pid, err);
                Err(CoreError::Wait(format!(
                    "Failed to wait for process {}: {}",
                    handle.pid, err
                )))
            }
        }
    }

    fn kill(&self, handle: ChildHandle) -> Result<()> {
        debug!("Terminating process {}", handle.pid);
        let ok = unsafe { TerminateProcess(handle.raw(), 1) };
        if ok == 0 {
            // already-exited children refuse termination; anything else
            // is a real signaling failure
            let err = io::Error::last_os_error();
            let mut code: u32 = 0;
            let queried = unsafe { GetExitCodeProcess(handle.raw(), &mut code) };
            if queried == 0 || code == STILL_ACTIVE as u32 {
                error!("Failed to terminate process {}: {}", handle.pid, err);
                return Err(CoreError::Signal(format!(
                    "Failed to terminate process {}: {}",
                    handle.pid, err
                )));
            }
            debug!("Process {} already exited", handle.pid);
            return Ok(());
        }
        // let termination finish so the handle drop observes a dead process
        unsafe {
            WaitForSingleObject(handle.raw(), INFINITE);
        }
        Ok(())
    }

    fn discard(&self, handle: ChildHandle) {
        // dropping the kernel handle is the whole cleanup on Windows
        debug!("Discarding process {}", handle.pid);
    }
}

fn exit_code(handle: &ChildHandle) -> Result<i32> {
    let mut code: u32 = 0;
    let ok = unsafe { GetExitCodeProcess(handle.raw(), &mut code) };
    if ok == 0 {
        let err = io::Error::last_os_error();
        error!("Failed to query exit code of process {}: {}", handle.pid, err);
        return Err(CoreError::Wait(format!(
            "Failed to query exit code of process {}: {}",
            handle.pid, err
        )));
    }
    // NTSTATUS-style codes (crashes, unhandled exceptions) have the high
    // bits set; everything in the conventional byte range passes through
    if code <= 255 {
        Ok(code as i32)
    } else {
        debug!("Process {} exited abnormally with code {:#x}", handle.pid, code);
        Ok(EXIT_ABNORMAL)
    }
}

fn prepare_cwd(path: &std::path::Path) -> Result<Vec<u16>> {
    let text = path.to_str().ok_or_else(|| {
        CoreError::ValidationError(format!("working directory is not valid UTF-8: {:?}", path))
    })?;
    let home = std::env::var("USERPROFILE").ok();
    Ok(winpath::to_wide(&winpath::to_extended(
        text,
        home.as_deref(),
    )))
}

fn set_inheritable(handle: HANDLE, inheritable: bool) -> Result<()> {
    use windows_sys::Win32::Foundation::{SetHandleInformation, HANDLE_FLAG_INHERIT};

    let flags = if inheritable { HANDLE_FLAG_INHERIT } else { 0 };
    let ok = unsafe { SetHandleInformation(handle, HANDLE_FLAG_INHERIT, flags) };
    if ok == 0 {
        return Err(CoreError::Pipe(format!(
            "SetHandleInformation failed: {}",
            io::Error::last_os_error()
        )));
    }
    Ok(())
}

/// Build a Unicode environment block: the parent's variables with the
/// overrides applied on top, as `KEY=VALUE\0` entries plus a final NUL.
///
/// Variable names compare case-insensitively, matching the platform.
fn build_env_block(overrides: &EnvironmentBuf) -> Vec<u16> {
    // vars_os with lossy conversion: a non-Unicode variable in a hostile
    // parent environment must not panic the spawner
    let mut entries: Vec<(String, String)> = std::env::vars_os()
        .map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        })
        .collect();
    for (key, value) in overrides.iter() {
        match entries
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
        {
            Some(entry) => entry.1 = value.to_string(),
            None => entries.push((key.to_string(), value.to_string())),
        }
    }

    let mut block: Vec<u16> = Vec::new();
    for (key, value) in &entries {
        block.extend(key.encode_utf16());
        block.push(b'=' as u16);
        block.extend(value.encode_utf16());
        block.push(0);
    }
    block.push(0);
    block
}
