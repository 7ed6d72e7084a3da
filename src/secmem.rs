//! Secret byte storage backed by a pluggable secure allocator.
//!
//! The allocator is an external collaborator: a daemon may hand in a pool
//! of locked pages. [`ZeroizingAllocator`] is the default and only
//! guarantees wipe-on-release. Buffers are always wiped by
//! [`SecretBuffer`] itself before they are handed back through
//! [`SecureAllocator::free`].

use thiserror::Error;
use zeroize::Zeroize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("secure allocation of {0} bytes failed")]
pub struct AllocError(pub usize);

pub trait SecureAllocator {
    /// Allocate `len` zeroed bytes.
    fn alloc(&mut self, len: usize) -> Result<Vec<u8>, AllocError>;

    /// Resize `buf` to `len` bytes. Implementations must not leave an
    /// unwiped copy of the old contents behind.
    fn realloc(&mut self, buf: &mut Vec<u8>, len: usize) -> Result<(), AllocError>;

    /// Take back a buffer whose contents have already been zero-filled.
    fn free(&mut self, buf: Vec<u8>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroizingAllocator;

impl SecureAllocator for ZeroizingAllocator {
    fn alloc(&mut self, len: usize) -> Result<Vec<u8>, AllocError> {
        let mut buf = Vec::new();
        buf.try_reserve_exact(len).map_err(|_| AllocError(len))?;
        buf.resize(len, 0);
        Ok(buf)
    }

    fn realloc(&mut self, buf: &mut Vec<u8>, len: usize) -> Result<(), AllocError> {
        let mut fresh = self.alloc(len)?;
        let keep = buf.len().min(len);
        fresh[..keep].copy_from_slice(&buf[..keep]);
        buf.zeroize();
        *buf = fresh;
        Ok(())
    }

    fn free(&mut self, mut buf: Vec<u8>) {
        buf.zeroize();
    }
}

/// How a buffer obtains room for the next byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Growth {
    /// Allocated once with room for `max_len` bytes and the terminator.
    Presized,
    /// Grown one step at a time as bytes are appended.
    OnDemand,
}

/// Secret bytes plus logical length. The byte after the logical end is
/// always NUL.
pub struct SecretBuffer {
    bytes: Vec<u8>,
    len: usize,
    max_len: usize,
    growth: Growth,
}

impl SecretBuffer {
    pub fn allocate(
        alloc: &mut dyn SecureAllocator,
        max_len: usize,
        growth: Growth,
    ) -> Result<Self, AllocError> {
        let initial = match growth {
            Growth::Presized => max_len.saturating_add(1),
            Growth::OnDemand => 2.min(max_len.saturating_add(1)),
        };
        let bytes = alloc.alloc(initial)?;
        Ok(Self {
            bytes,
            len: 0,
            max_len,
            growth,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn max_len(&self) -> usize {
        self.max_len
    }

    pub fn is_full(&self) -> bool {
        self.len >= self.max_len
    }

    /// The logical contents, without the terminator.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    pub fn last(&self) -> Option<u8> {
        self.as_bytes().last().copied()
    }

    /// Append one byte. Returns `Ok(false)` when the buffer is full.
    pub fn push(&mut self, alloc: &mut dyn SecureAllocator, byte: u8) -> Result<bool, AllocError> {
        if self.is_full() {
            return Ok(false);
        }
        let needed = self.len + 2;
        if self.bytes.len() < needed {
            if self.growth == Growth::Presized {
                tracing::warn!(needed, "presized secret buffer had to grow");
            }
            alloc.realloc(&mut self.bytes, needed)?;
        }
        self.bytes[self.len] = byte;
        self.len += 1;
        self.terminate();
        Ok(true)
    }

    /// Shrink to `len` bytes, wiping the dropped tail.
    pub fn truncate(&mut self, len: usize) {
        if len >= self.len {
            return;
        }
        self.bytes[len..self.len].zeroize();
        self.len = len;
        self.terminate();
    }

    pub fn clear(&mut self) {
        self.truncate(0);
    }

    fn terminate(&mut self) {
        if let Some(slot) = self.bytes.get_mut(self.len) {
            *slot = 0;
        }
    }

    /// Zero-fill and hand the storage back to `alloc`.
    pub fn release(mut self, alloc: &mut dyn SecureAllocator) {
        let mut bytes = std::mem::take(&mut self.bytes);
        bytes.as_mut_slice().zeroize();
        self.len = 0;
        alloc.free(bytes);
    }
}

impl Drop for SecretBuffer {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for SecretBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretBuffer")
            .field("len", &self.len)
            .field("max_len", &self.max_len)
            .field("growth", &self.growth)
            .finish_non_exhaustive()
    }
}
