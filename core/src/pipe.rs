//! Anonymous unidirectional byte channels
//!
//! A `Pipe` is a kernel pipe with two independently owned endpoints. Each
//! endpoint releases its handle when dropped, and `close()` consumes the
//! endpoint, so a double close cannot be expressed. Closing the writer
//! still delivers buffered bytes to the reader before EOF; writing after
//! the reader has closed fails.
//!
//! Endpoints never cross into a child wholesale: POSIX pipes are created
//! close-on-exec (the spawner's `dup2` onto fds 0/1/2 clears the flag on
//! the stdio copies, so everything else vanishes at exec), and Windows
//! pipes are created non-inheritable (the spawner marks exactly the
//! redirected endpoints inheritable around `CreateProcessW`). Otherwise a
//! child reading a redirected stdin would inherit the parent's own write
//! end and never see EOF.

#![allow(unsafe_code)]

use crate::{CoreError, Result};
use std::io::{self, Read, Write};

#[cfg(unix)]
use std::os::fd::{AsRawFd, OwnedFd, RawFd};

#[cfg(windows)]
use std::os::windows::io::{AsRawHandle, FromRawHandle, OwnedHandle, RawHandle};

/// Read end of an anonymous pipe
#[derive(Debug)]
pub struct PipeReader {
    #[cfg(unix)]
    fd: OwnedFd,
    #[cfg(windows)]
    handle: OwnedHandle,
}

/// Write end of an anonymous pipe
#[derive(Debug)]
pub struct PipeWriter {
    #[cfg(unix)]
    fd: OwnedFd,
    #[cfg(windows)]
    handle: OwnedHandle,
}

/// An anonymous pipe pair
#[derive(Debug)]
pub struct Pipe {
    pub reader: PipeReader,
    pub writer: PipeWriter,
}

impl Pipe {
    /// Create an anonymous pipe with close-on-exec endpoints.
    #[cfg(unix)]
    pub fn open() -> Result<Self> {
        let (read_fd, write_fd) = nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)
            .map_err(|e| CoreError::Pipe(format!("Failed to create pipe: {}", e)))?;
        Ok(Self {
            reader: PipeReader { fd: read_fd },
            writer: PipeWriter { fd: write_fd },
        })
    }

    /// Create an anonymous pipe with non-inheritable endpoints.
    #[cfg(windows)]
    pub fn open() -> Result<Self> {
        use std::ptr;
        use windows_sys::Win32::Foundation::HANDLE;
        use windows_sys::Win32::System::Pipes::CreatePipe;

        let mut read_handle: HANDLE = ptr::null_mut();
        let mut write_handle: HANDLE = ptr::null_mut();

        let ok = unsafe { CreatePipe(&mut read_handle, &mut write_handle, ptr::null(), 0) };
        if ok == 0 {
            return Err(CoreError::Pipe(format!(
                "CreatePipe failed: {}",
                io::Error::last_os_error()
            )));
        }
        // Safety: CreatePipe succeeded, both handles are open and unowned
        let (reader, writer) = unsafe {
            (
                OwnedHandle::from_raw_handle(read_handle as RawHandle),
                OwnedHandle::from_raw_handle(write_handle as RawHandle),
            )
        };
        Ok(Self {
            reader: PipeReader { handle: reader },
            writer: PipeWriter { handle: writer },
        })
    }
}

impl PipeReader {
    /// Close the read end. Further writes by the peer will fail.
    pub fn close(self) {
        drop(self);
    }
}

impl PipeWriter {
    /// Close the write end. Buffered bytes are still delivered before EOF.
    pub fn close(self) {
        drop(self);
    }
}

#[cfg(unix)]
impl AsRawFd for PipeReader {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(unix)]
impl AsRawFd for PipeWriter {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

#[cfg(windows)]
impl AsRawHandle for PipeReader {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle.as_raw_handle()
    }
}

#[cfg(windows)]
impl AsRawHandle for PipeWriter {
    fn as_raw_handle(&self) -> RawHandle {
        self.handle.as_raw_handle()
    }
}

impl Read for PipeReader {
    #[cfg(unix)]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    #[cfg(windows)]
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        use windows_sys::Win32::Foundation::ERROR_BROKEN_PIPE;
        use windows_sys::Win32::Storage::FileSystem::ReadFile;

        let mut read = 0u32;
        let ok = unsafe {
            ReadFile(
                self.handle.as_raw_handle() as _,
                buf.as_mut_ptr(),
                buf.len() as u32,
                &mut read,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            let err = io::Error::last_os_error();
            // the peer closing its write end reads as EOF, not an error
            if err.raw_os_error() == Some(ERROR_BROKEN_PIPE as i32) {
                return Ok(0);
            }
            return Err(err);
        }
        Ok(read as usize)
    }
}

impl Write for PipeWriter {
    #[cfg(unix)]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::write(self.fd.as_raw_fd(), buf.as_ptr().cast(), buf.len()) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    #[cfg(windows)]
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        use windows_sys::Win32::Storage::FileSystem::WriteFile;

        let mut written = 0u32;
        let ok = unsafe {
            WriteFile(
                self.handle.as_raw_handle() as _,
                buf.as_ptr(),
                buf.len() as u32,
                &mut written,
                std::ptr::null_mut(),
            )
        };
        if ok == 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(written as usize)
    }

    fn flush(&mut self) -> io::Result<()> {
        // anonymous pipes are unbuffered on the user side
        Ok(())
    }
}

/// Resolve the current standard input descriptor.
#[cfg(unix)]
pub fn stdin_fd() -> RawFd {
    libc::STDIN_FILENO
}

/// Resolve the current standard output descriptor.
#[cfg(unix)]
pub fn stdout_fd() -> RawFd {
    libc::STDOUT_FILENO
}

/// Resolve the current standard error descriptor.
#[cfg(unix)]
pub fn stderr_fd() -> RawFd {
    libc::STDERR_FILENO
}

// Windows standard-handle values are not constants and can change after
// redirection, so each accessor goes through GetStdHandle at call time.

/// Resolve the current standard input handle.
#[cfg(windows)]
pub fn stdin_handle() -> Result<RawHandle> {
    std_handle(windows_sys::Win32::System::Console::STD_INPUT_HANDLE, "stdin")
}

/// Resolve the current standard output handle.
#[cfg(windows)]
pub fn stdout_handle() -> Result<RawHandle> {
    std_handle(
        windows_sys::Win32::System::Console::STD_OUTPUT_HANDLE,
        "stdout",
    )
}

/// Resolve the current standard error handle.
#[cfg(windows)]
pub fn stderr_handle() -> Result<RawHandle> {
    std_handle(
        windows_sys::Win32::System::Console::STD_ERROR_HANDLE,
        "stderr",
    )
}

#[cfg(windows)]
fn std_handle(which: u32, name: &str) -> Result<RawHandle> {
    use windows_sys::Win32::Foundation::INVALID_HANDLE_VALUE;
    use windows_sys::Win32::System::Console::GetStdHandle;

    let handle = unsafe { GetStdHandle(which) };
    if handle == INVALID_HANDLE_VALUE {
        return Err(CoreError::Pipe(format!(
            "GetStdHandle({}) failed: {}",
            name,
            io::Error::last_os_error()
        )));
    }
    Ok(handle as RawHandle)
}
