//! Environment buffer backed by an owned text arena
//!
//! `EnvironmentBuf` stores ordered `KEY=VALUE` pairs the way `CommandBuf`
//! stores arguments: bytes in one append-only arena, entries as span pairs.
//! Keys are unique within the buffer; `add` rejects duplicates, `set`
//! overwrites in place when the new value fits in the old span, and
//! `remove` shifts trailing entries to close the gap.

use crate::command::Span;
use crate::{CoreError, Result};

#[derive(Debug, Clone, Copy)]
struct EnvSpan {
    key: Span,
    value: Span,
}

/// Ordered key/value environment override set
#[derive(Debug)]
pub struct EnvironmentBuf {
    arena: Vec<u8>,
    entries: Vec<EnvSpan>,
    max_entries: usize,
}

impl EnvironmentBuf {
    /// Create a buffer with `arena_bytes` of text capacity and room for
    /// `max_entries` key/value pairs.
    pub fn with_capacity(arena_bytes: usize, max_entries: usize) -> Self {
        Self {
            arena: Vec::with_capacity(arena_bytes),
            entries: Vec::with_capacity(max_entries),
            max_entries,
        }
    }

    /// Add a new pair without allocating.
    ///
    /// Fails with `DuplicateKey` if the key is already present and with
    /// `OutOfSpace` if the remaining arena or entry capacity is insufficient.
    pub fn try_add(&mut self, key: &str, value: &str) -> Result<()> {
        if self.find(key).is_some() {
            return Err(CoreError::DuplicateKey(key.to_string()));
        }
        if self.entries.len() == self.max_entries {
            return Err(CoreError::OutOfSpace(format!(
                "environment slots exhausted: {} used of {}",
                self.entries.len(),
                self.max_entries
            )));
        }
        let needed = key.len() + value.len();
        if self.arena.len() + needed > self.arena.capacity() {
            return Err(CoreError::OutOfSpace(format!(
                "environment arena full: {} used of {}, {} more requested",
                self.arena.len(),
                self.arena.capacity(),
                needed
            )));
        }
        self.push_entry(key, value);
        Ok(())
    }

    /// Add a new pair, growing the arena when needed.
    ///
    /// Fails with `DuplicateKey` if the key is already present.
    pub fn add(&mut self, key: &str, value: &str) -> Result<()> {
        if self.find(key).is_some() {
            return Err(CoreError::DuplicateKey(key.to_string()));
        }
        self.grow_for(key.len() + value.len());
        if self.entries.len() == self.max_entries {
            self.max_entries += 1;
        }
        self.push_entry(key, value);
        Ok(())
    }

    /// Set a key to a new value, inserting it if absent.
    ///
    /// An existing entry keeps its position. The value bytes are overwritten
    /// in place when the new value fits in the old span; otherwise the new
    /// value is appended to the arena and the entry repointed, leaving the
    /// old bytes as a hole.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let Some(index) = self.find(key) else {
            return self.add(key, value);
        };
        let old = self.entries[index].value;
        if value.len() <= old.len {
            self.arena[old.off..old.off + value.len()].copy_from_slice(value.as_bytes());
            self.entries[index].value.len = value.len();
        } else {
            self.grow_for(value.len());
            let off = self.arena.len();
            self.arena.extend_from_slice(value.as_bytes());
            self.entries[index].value = Span {
                off,
                len: value.len(),
            };
        }
        Ok(())
    }

    /// Remove a key, shifting trailing entries to close the gap.
    ///
    /// Returns `true` if the key was present.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.find(key) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Whether the key is present
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Value stored for `key`, if present
    pub fn get(&self, key: &str) -> Option<&str> {
        self.find(key)
            .map(|index| self.resolve(self.entries[index].value))
    }

    /// Iterate the pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .map(|e| (self.resolve(e.key), self.resolve(e.value)))
    }

    /// Number of pairs stored
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the buffer holds no pairs
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Materialize the pairs as C strings for per-pair `setenv`.
    #[cfg(unix)]
    pub(crate) fn to_cstring_pairs(
        &self,
    ) -> Result<Vec<(std::ffi::CString, std::ffi::CString)>> {
        self.iter()
            .map(|(k, v)| {
                let key = std::ffi::CString::new(k).map_err(|_| {
                    CoreError::ValidationError(format!(
                        "environment key contains interior NUL byte: {:?}",
                        k
                    ))
                })?;
                let value = std::ffi::CString::new(v).map_err(|_| {
                    CoreError::ValidationError(format!(
                        "environment value contains interior NUL byte: {:?}",
                        v
                    ))
                })?;
                Ok((key, value))
            })
            .collect()
    }

    fn find(&self, key: &str) -> Option<usize> {
        // Exact byte compare, linear scan
        self.entries
            .iter()
            .position(|e| self.resolve(e.key) == key)
    }

    fn grow_for(&mut self, needed: usize) {
        let remaining = self.arena.capacity() - self.arena.len();
        if remaining < needed {
            self.arena.reserve(needed.max(self.arena.capacity()));
        }
    }

    fn push_entry(&mut self, key: &str, value: &str) {
        let key_off = self.arena.len();
        self.arena.extend_from_slice(key.as_bytes());
        let value_off = self.arena.len();
        self.arena.extend_from_slice(value.as_bytes());
        self.entries.push(EnvSpan {
            key: Span {
                off: key_off,
                len: key.len(),
            },
            value: Span {
                off: value_off,
                len: value.len(),
            },
        });
    }

    fn resolve(&self, span: Span) -> &str {
        // Spans only ever cover whole strings copied in from &str
        std::str::from_utf8(&self.arena[span.off..span.off + span.len])
            .expect("arena span covers valid UTF-8")
    }
}
