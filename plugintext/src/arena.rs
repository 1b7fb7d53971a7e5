//! Byte arena and cursors (C1).
//!
//! The text reader assembles an entire plugin byte stream before handing it
//! to the caller, and needs to backpatch length fields once a record or
//! field's child scope has closed. A `Vec<u8>` that is only ever appended to
//! or truncated already gives us bump allocation with LIFO lifetime for
//! free, so the "arena" here is just a thin wrapper that makes the intent
//! (and the bounds checks the spec calls for) explicit rather than
//! scattering raw `Vec` pushes through the reader.
//!
//! Two arenas are used per conversion: the output arena, which accumulates
//! the final plugin bytes, and the scratch arena, used as a LIFO workspace
//! for `deflate`/base64 buffers and for routing compressed-record field data
//! before it is recompressed into the output arena.

use crate::error::PluginError;

/// A growable output region with a cursor, length backpatching, and bounds
/// checks equivalent to the "advance" primitive the spec describes.
#[derive(Debug, Default)]
pub struct OutputArena {
    buf: Vec<u8>,
}

impl OutputArena {
    pub fn new() -> Self {
        OutputArena { buf: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        OutputArena {
            buf: Vec::with_capacity(cap),
        }
    }

    /// Current write position; also usable as an offset to come back to for
    /// backpatching once a child scope has closed.
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Appends `n` uninitialised bytes and returns their offset, for code
    /// that wants to reserve space now and backpatch it later (e.g. a
    /// record's `data_size` field, known only once the record's fields have
    /// all been written).
    pub fn advance(&mut self, n: usize) -> usize {
        let offset = self.buf.len();
        self.buf.resize(offset + n, 0);
        offset
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Writes the low `n` bytes of `value`, little-endian. `n` must be one
    /// of 1, 2, 4, or 8.
    pub fn write_integer_of_size(&mut self, value: u64, n: usize) {
        debug_assert!(matches!(n, 1 | 2 | 4 | 8));
        self.buf.extend_from_slice(&value.to_le_bytes()[..n]);
    }

    /// Overwrites previously-written bytes at `offset`, used to backpatch a
    /// length field after the fact. `bytes.len()` must fit within what
    /// remains of the buffer from `offset`.
    pub fn patch(&mut self, offset: usize, bytes: &[u8]) {
        self.buf[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    pub fn remaining_capacity(&self) -> usize {
        self.buf.capacity() - self.buf.len()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// An opaque checkpoint into a [`ScratchArena`]. Restoring a checkpoint
/// discards everything written after it, enforcing the LIFO discipline the
/// spec requires of scratch usage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScratchCheckpoint(usize);

/// A scratch region used for `deflate`/base64 workspaces and as the landing
/// area for a compressed record's field bytes before they are recompressed.
#[derive(Debug, Default)]
pub struct ScratchArena {
    buf: Vec<u8>,
}

impl ScratchArena {
    pub fn new() -> Self {
        ScratchArena { buf: Vec::new() }
    }

    /// Records the current high-water mark so it can be restored later.
    pub fn checkpoint(&self) -> ScratchCheckpoint {
        ScratchCheckpoint(self.buf.len())
    }

    /// Discards everything written since `checkpoint`.
    ///
    /// # Errors
    ///
    /// Fails if `checkpoint` refers to a position past the current length,
    /// which would indicate the caller restored checkpoints out of order.
    pub fn restore(&mut self, checkpoint: ScratchCheckpoint) -> Result<(), PluginError> {
        if checkpoint.0 > self.buf.len() {
            return Err(PluginError::RequirementFailed(String::from(
                "scratch checkpoint does not precede current position",
            )));
        }
        self.buf.truncate(checkpoint.0);
        Ok(())
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// The bytes written since `checkpoint`.
    pub fn since(&self, checkpoint: ScratchCheckpoint) -> &[u8] {
        &self.buf[checkpoint.0..]
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// A scoped guard that restores a [`ScratchArena`] checkpoint when dropped,
/// mirroring the `TempScope` / `TEMP_SCOPE()` pattern used for LIFO scratch
/// usage: acquire, use, and release on every exit path including early
/// returns via `?`.
pub struct TempScope<'a> {
    arena: &'a mut ScratchArena,
    checkpoint: ScratchCheckpoint,
    released: bool,
}

impl<'a> TempScope<'a> {
    pub fn new(arena: &'a mut ScratchArena) -> Self {
        let checkpoint = arena.checkpoint();
        TempScope {
            arena,
            checkpoint,
            released: false,
        }
    }

    pub fn arena(&mut self) -> &mut ScratchArena {
        self.arena
    }

    pub fn checkpoint(&self) -> ScratchCheckpoint {
        self.checkpoint
    }

    /// Bytes written to the arena since this scope began.
    pub fn bytes(&self) -> &[u8] {
        self.arena.since(self.checkpoint)
    }
}

impl Drop for TempScope<'_> {
    fn drop(&mut self) {
        if !self.released {
            // a checkpoint taken by a live TempScope is always valid to restore
            self.arena.restore(self.checkpoint).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_and_patch() {
        let mut arena = OutputArena::new();
        let offset = arena.advance(4);
        arena.write_bytes(b"hello");
        arena.patch(offset, &42u32.to_le_bytes());
        let bytes = arena.as_slice();
        assert_eq!(&bytes[..4], &42u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"hello");
    }

    #[test]
    fn scratch_checkpoint_restore() {
        let mut scratch = ScratchArena::new();
        scratch.write_bytes(b"abc");
        let checkpoint = scratch.checkpoint();
        scratch.write_bytes(b"def");
        assert_eq!(scratch.since(checkpoint), b"def");
        scratch.restore(checkpoint).unwrap();
        assert_eq!(scratch.len(), 3);
    }

    #[test]
    fn scratch_restore_rejects_stale_checkpoint() {
        let mut scratch = ScratchArena::new();
        let checkpoint = scratch.checkpoint();
        scratch.write_bytes(b"abc");
        scratch.restore(checkpoint).unwrap();
        scratch.write_bytes(b"xyz");
        let stale = ScratchCheckpoint(100);
        assert!(scratch.restore(stale).is_err());
    }

    #[test]
    fn temp_scope_restores_on_drop() {
        let mut scratch = ScratchArena::new();
        scratch.write_bytes(b"outer");
        {
            let mut scope = TempScope::new(&mut scratch);
            scope.arena().write_bytes(b"inner");
            assert_eq!(scope.bytes(), b"inner");
        }
        assert_eq!(scratch.len(), 5);
    }
}
