//! Fixed-capacity sample arena for the RT domain.
//!
//! All backing storage is allocated once in [`RtPool::new`]. Analyzers carve
//! two kinds of regions out of it:
//!
//! - **reserved** regions (`reserve`) are claimed during construction and
//!   survive for the lifetime of the pool - window tables, magnitude
//!   history, accumulators;
//! - **transient** regions (`alloc`) are bump-allocated scratch that
//!   vanishes at the next [`RtPool::reset`], called once per audio block.
//!
//! Exhaustion is an error, never a heap fallback.

use crate::{Error, Result};

/// Handle to a region carved from an [`RtPool`].
///
/// Handles are plain offsets, cheap to copy and store; the pool itself owns
/// the samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolBuf {
    offset: usize,
    len: usize,
}

impl PoolBuf {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

#[derive(Debug)]
pub struct RtPool {
    arena: Box<[f32]>,
    reserved: usize,
    cursor: usize,
    high_water: usize,
}

impl RtPool {
    /// Allocate the arena. This is the only heap allocation the pool ever
    /// performs.
    pub fn new(capacity: usize) -> Self {
        Self {
            arena: vec![0.0; capacity].into_boxed_slice(),
            reserved: 0,
            cursor: 0,
            high_water: 0,
        }
    }

    /// Claim a persistent region. Only valid while no transient allocations
    /// are live, i.e. during construction or right after [`reset`].
    ///
    /// [`reset`]: RtPool::reset
    pub fn reserve(&mut self, len: usize) -> Result<PoolBuf> {
        if self.cursor != self.reserved {
            return Err(Error::ReserveAfterAlloc);
        }
        let buf = self.carve(len)?;
        self.reserved = self.cursor;
        Ok(buf)
    }

    /// Claim a transient scratch region. O(1), released by [`reset`].
    ///
    /// [`reset`]: RtPool::reset
    pub fn alloc(&mut self, len: usize) -> Result<PoolBuf> {
        self.carve(len)
    }

    fn carve(&mut self, len: usize) -> Result<PoolBuf> {
        let available = self.arena.len() - self.cursor;
        if len > available {
            return Err(Error::PoolExhausted {
                requested: len,
                available,
            });
        }
        let buf = PoolBuf {
            offset: self.cursor,
            len,
        };
        self.cursor += len;
        self.high_water = self.high_water.max(self.cursor);
        Ok(buf)
    }

    /// Rewind the watermark past all transient allocations. O(1); reserved
    /// regions keep their contents.
    #[inline]
    pub fn reset(&mut self) {
        self.cursor = self.reserved;
    }

    #[inline]
    pub fn buf(&self, buf: PoolBuf) -> &[f32] {
        &self.arena[buf.offset..buf.offset + buf.len]
    }

    #[inline]
    pub fn buf_mut(&mut self, buf: PoolBuf) -> &mut [f32] {
        &mut self.arena[buf.offset..buf.offset + buf.len]
    }

    /// Mutable access to two regions at once.
    ///
    /// # Panics
    ///
    /// Panics if the regions overlap. Handles carved from this pool are
    /// disjoint by construction, so this only fires on a stale handle used
    /// across a `reset`.
    pub fn buf_pair_mut(&mut self, a: PoolBuf, b: PoolBuf) -> (&mut [f32], &mut [f32]) {
        let swapped = a.offset > b.offset;
        let (lo, hi) = if swapped { (b, a) } else { (a, b) };
        assert!(
            lo.offset + lo.len <= hi.offset,
            "pool regions overlap: {lo:?} and {hi:?}"
        );
        let (left, right) = self.arena.split_at_mut(hi.offset);
        let lo_slice = &mut left[lo.offset..lo.offset + lo.len];
        let hi_slice = &mut right[..hi.len];
        if swapped {
            (hi_slice, lo_slice)
        } else {
            (lo_slice, hi_slice)
        }
    }

    pub fn fill(&mut self, buf: PoolBuf, value: f32) {
        self.buf_mut(buf).fill(value);
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.arena.len()
    }

    #[inline]
    pub fn reserved(&self) -> usize {
        self.reserved
    }

    #[inline]
    pub fn in_use(&self) -> usize {
        self.cursor
    }

    #[inline]
    pub fn available(&self) -> usize {
        self.arena.len() - self.cursor
    }

    /// Highest watermark ever reached, for sizing the pool during bring-up.
    #[inline]
    pub fn high_water(&self) -> usize {
        self.high_water
    }
}
