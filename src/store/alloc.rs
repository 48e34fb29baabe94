//! Per-transaction bump allocator.
//!
//! The allocator owns the append frontier of the open transaction. Bytes
//! in `[start, hwm)` live in a scratch buffer until commit, when the
//! buffer is written at `start` in one sequential pass and synced.
//! Rolling back retreats the frontier; addresses handed out by an
//! aborted transaction are re-issued by the next one, committed
//! addresses are immutable forever.

use crate::{store, Result};

pub(crate) struct Allocator {
    start: u64,
    hwm: u64,
    region_size: u64,
    buf: Vec<u8>,
}

impl Allocator {
    pub fn new(start: u64, region_size: u64) -> Allocator {
        Allocator {
            start,
            hwm: start,
            region_size,
            buf: vec![],
        }
    }

    pub fn to_start(&self) -> u64 {
        self.start
    }

    pub fn to_hwm(&self) -> u64 {
        self.hwm
    }

    pub fn as_buf(&self) -> &[u8] {
        &self.buf
    }

    /// Reserve `size` bytes at the frontier, aligned to `align`. The
    /// reservation is padded past a region boundary it would otherwise
    /// straddle. Return the store address of the reservation.
    pub fn alloc(&mut self, size: u64, align: u64) -> Result<u64> {
        if align == 0 || !align.is_power_of_two() || align > store::MAX_ALIGN {
            return err_at!(AlignmentOverflow, msg: "align {}", align);
        }
        if size == 0 {
            return err_at!(InvalidInput, msg: "zero-sized allocation");
        }
        if size > self.region_size {
            return err_at!(
                OutOfSpace, msg: "alloc {} beyond region size {}", size, self.region_size
            );
        }

        let mut addr = match self.hwm.checked_add(align - 1) {
            Some(n) => n & !(align - 1),
            None => return err_at!(AlignmentOverflow, msg: "hwm {} align {}", self.hwm, align),
        };
        if (addr % self.region_size) + size > self.region_size {
            addr = ((addr / self.region_size) + 1) * self.region_size;
        }
        let end = match addr.checked_add(size) {
            Some(end) => end,
            None => return err_at!(AlignmentOverflow, msg: "addr {} size {}", addr, size),
        };

        self.buf.resize((end - self.start) as usize, 0);
        self.hwm = end;
        Ok(addr)
    }

    /// Copy `data` into the scratch buffer at `addr`, which must lie
    /// within an earlier reservation.
    pub fn write(&mut self, addr: u64, data: &[u8]) {
        let off = (addr - self.start) as usize;
        self.buf[off..off + data.len()].copy_from_slice(data);
    }

    pub fn as_mut(&mut self, addr: u64, size: u64) -> &mut [u8] {
        let off = (addr - self.start) as usize;
        &mut self.buf[off..off + (size as usize)]
    }

    /// Read back uncommitted bytes, None if the range was never
    /// reserved.
    pub fn scratch(&self, addr: u64, size: u64) -> Option<&[u8]> {
        let end = addr.checked_add(size)?;
        if addr < self.start || end > self.hwm {
            None
        } else {
            let off = (addr - self.start) as usize;
            Some(&self.buf[off..off + (size as usize)])
        }
    }

    /// Retreat the frontier to where the transaction began.
    pub fn reset(&mut self) {
        self.hwm = self.start;
        self.buf.clear();
    }
}

#[cfg(test)]
#[path = "alloc_test.rs"]
mod alloc_test;
