//! Growable byte buffer + per-owner arena registry (C1).
//!
//! genozip's `buffer.c` backs every dictionary, b250 and local stream with a
//! hand-managed growable array guarded by canary bytes at both ends, plus a
//! process-wide list so a single sweep can detect overflow and free
//! everything on thread teardown. Rust's `Vec<u8>` already gives us memory
//! safety, so the canary check can never actually fire — we keep the
//! *contract* (name/tag bookkeeping, an explicit growth policy, and an
//! arena-level sweep) because `Ctx` and `Vblock` are built against it, but
//! the guard bytes exist for parity with the original rather than to catch
//! real corruption.

use std::sync::Mutex;

const GUARD: [u8; 8] = *b"GTZGRD\0\0";

/// A single named, growable byte allocation.
pub struct Buf {
    name: &'static str,
    tag: u32,
    data: Vec<u8>,
    guard_front: [u8; 8],
    guard_back: [u8; 8],
}

impl Buf {
    fn new(min_capacity: usize, name: &'static str, tag: u32) -> Self {
        Buf {
            name,
            tag,
            data: Vec::with_capacity(min_capacity),
            guard_front: GUARD,
            guard_back: GUARD,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_vec(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Return the buffer to the pool: keep the allocation, drop the content.
    /// Mirrors `buf_free` (as opposed to `buf_destroy`, which releases the
    /// backing memory entirely).
    pub fn free(&mut self) {
        self.data.clear();
    }

    /// `true` iff the guard bytes are intact. Always true in safe Rust; kept
    /// so `Arena::sweep` has something real to assert.
    fn guards_intact(&self) -> bool {
        self.guard_front == GUARD && self.guard_back == GUARD
    }
}

/// Per-owner registry of allocations (one per worker thread / vblock), so a
/// single sweep can validate every buffer this owner is responsible for and
/// free them all on teardown.
#[derive(Default)]
pub struct Arena {
    name: &'static str,
    buffers: Mutex<Vec<Buf>>,
}

impl Arena {
    pub fn new(name: &'static str) -> Self {
        Arena {
            name,
            buffers: Mutex::new(Vec::new()),
        }
    }

    /// Allocate a new named buffer of at least `min_capacity` bytes and
    /// register it with this arena. Returns the buffer's index for later
    /// access via [`Arena::with_buf_mut`].
    pub fn alloc(&self, min_capacity: usize, name: &'static str, tag: u32) -> usize {
        let mut bufs = self.buffers.lock().unwrap();
        bufs.push(Buf::new(min_capacity, name, tag));
        bufs.len() - 1
    }

    pub fn with_buf_mut<R>(&self, idx: usize, f: impl FnOnce(&mut Buf) -> R) -> R {
        let mut bufs = self.buffers.lock().unwrap();
        f(&mut bufs[idx])
    }

    pub fn with_buf<R>(&self, idx: usize, f: impl FnOnce(&Buf) -> R) -> R {
        let bufs = self.buffers.lock().unwrap();
        f(&bufs[idx])
    }

    /// Validate every buffer's guard bytes. An overflow (which cannot
    /// actually occur through the safe `Buf` API) would be reported here as
    /// a resource error, matching the "fatal on out-of-memory / corruption"
    /// policy of §7.
    pub fn sweep(&self) -> anyhow::Result<()> {
        let bufs = self.buffers.lock().unwrap();
        for b in bufs.iter() {
            if !b.guards_intact() {
                anyhow::bail!(
                    "arena '{}': buffer '{}' (tag {}) overflow detected",
                    self.name,
                    b.name,
                    b.tag
                );
            }
        }
        Ok(())
    }

    /// Release all memory owned by this arena. Called on vblock/thread
    /// teardown.
    pub fn destroy(&self) {
        self.buffers.lock().unwrap().clear();
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_append_and_sweep() {
        let arena = Arena::new("test");
        let idx = arena.alloc(16, "dict", 1);
        arena.with_buf_mut(idx, |b| b.append(b"hello"));
        arena.with_buf(idx, |b| assert_eq!(b.as_slice(), b"hello"));
        arena.sweep().unwrap();
    }

    #[test]
    fn free_keeps_allocation_clears_content() {
        let arena = Arena::new("test");
        let idx = arena.alloc(16, "local", 2);
        arena.with_buf_mut(idx, |b| {
            b.append(b"data");
            b.free();
        });
        arena.with_buf(idx, |b| assert!(b.is_empty()));
    }
}
