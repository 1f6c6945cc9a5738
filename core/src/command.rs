//! Argument buffer backed by an owned text arena
//!
//! `CommandBuf` is the logical `argv` handed to the process spawner: an
//! ordered list of arguments whose bytes live in one append-only arena.
//! Arguments are addressed by `(offset, len)` spans, so arena growth can
//! never invalidate a previously stored argument. The `try_*` variant never
//! allocates; the growing variant reallocates with headroom sized to the
//! pending append and retries.

use crate::{CoreError, Result};
use std::ffi::CString;

/// A `(offset, len)` view into a text arena
#[derive(Debug, Clone, Copy)]
pub(crate) struct Span {
    pub(crate) off: usize,
    pub(crate) len: usize,
}

/// Ordered argument list backed by an append-only text arena
#[derive(Debug)]
pub struct CommandBuf {
    arena: Vec<u8>,
    spans: Vec<Span>,
    max_args: usize,
}

impl CommandBuf {
    /// Create a buffer with `arena_bytes` of text capacity and room for
    /// `max_args` arguments. Neither bound is exceeded by `try_append`.
    pub fn with_capacity(arena_bytes: usize, max_args: usize) -> Self {
        Self {
            arena: Vec::with_capacity(arena_bytes),
            spans: Vec::with_capacity(max_args),
            max_args,
        }
    }

    /// Append arguments without allocating.
    ///
    /// Fails with `OutOfSpace` if the remaining arena or slot capacity is
    /// insufficient; on failure nothing is applied.
    pub fn try_append(&mut self, args: &[&str]) -> Result<()> {
        if self.spans.len() + args.len() > self.max_args {
            return Err(CoreError::OutOfSpace(format!(
                "argument slots exhausted: {} used of {}, {} more requested",
                self.spans.len(),
                self.max_args,
                args.len()
            )));
        }
        let needed: usize = args.iter().map(|a| a.len()).sum();
        if self.arena.len() + needed > self.arena.capacity() {
            return Err(CoreError::OutOfSpace(format!(
                "argument arena full: {} used of {}, {} more requested",
                self.arena.len(),
                self.arena.capacity(),
                needed
            )));
        }
        self.push_all(args);
        Ok(())
    }

    /// Append arguments, growing the arena geometrically when needed.
    pub fn append(&mut self, args: &[&str]) {
        let needed: usize = args.iter().map(|a| a.len()).sum();
        let remaining = self.arena.capacity() - self.arena.len();
        if remaining < needed {
            // Headroom: at least the pending append, at least a doubling.
            self.arena.reserve(needed.max(self.arena.capacity()));
        }
        if self.spans.len() + args.len() > self.max_args {
            self.max_args = self.spans.len() + args.len();
        }
        self.push_all(args);
    }

    fn push_all(&mut self, args: &[&str]) {
        for arg in args {
            let off = self.arena.len();
            self.arena.extend_from_slice(arg.as_bytes());
            self.spans.push(Span {
                off,
                len: arg.len(),
            });
        }
    }

    /// Argument at `index`, if present
    pub fn arg(&self, index: usize) -> Option<&str> {
        self.spans.get(index).map(|s| self.resolve(*s))
    }

    /// First argument (the program name), if present
    pub fn program(&self) -> Option<&str> {
        self.arg(0)
    }

    /// Iterate the arguments in order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.spans.iter().map(|s| self.resolve(*s))
    }

    /// Number of arguments stored
    pub fn len(&self) -> usize {
        self.spans.len()
    }

    /// Whether the buffer holds no arguments
    pub fn is_empty(&self) -> bool {
        self.spans.is_empty()
    }

    /// Argument slot capacity
    pub fn capacity(&self) -> usize {
        self.max_args
    }

    /// Bytes currently used in the arena
    pub fn arena_len(&self) -> usize {
        self.arena.len()
    }

    /// Total arena capacity in bytes
    pub fn arena_capacity(&self) -> usize {
        self.arena.capacity()
    }

    /// One-line rendering of the arguments, for logging
    pub fn display_line(&self) -> String {
        crate::cmdline::join_args(self.iter())
    }

    /// Materialize the arguments as C strings for `exec`.
    ///
    /// Fails with `ValidationError` if any argument contains an interior NUL.
    pub fn to_cstrings(&self) -> Result<Vec<CString>> {
        self.iter()
            .map(|a| {
                CString::new(a).map_err(|_| {
                    CoreError::ValidationError(format!(
                        "argument contains interior NUL byte: {:?}",
                        a
                    ))
                })
            })
            .collect()
    }

    fn resolve(&self, span: Span) -> &str {
        // Spans only ever cover whole strings copied in from &str
        std::str::from_utf8(&self.arena[span.off..span.off + span.len])
            .expect("arena span covers valid UTF-8")
    }
}
