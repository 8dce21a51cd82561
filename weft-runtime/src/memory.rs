// Weft - weft-runtime
// Module: linear memory
//
// Licensed under the MIT license.
// SPDX-License-Identifier: MIT

//! WebAssembly linear memory.
//!
//! A contiguous, byte-addressable buffer sized in 64KiB pages, with
//! bounds checking on every access. All accesses compute a 64-bit
//! effective address (base plus static offset), so address arithmetic
//! never wraps.

use weft_error::{codes, Error, ErrorCategory, Result};
use weft_foundation::MemoryType;
use weft_format::binary::MAX_MEMORY_PAGES;

use crate::trap::{Trap, TrapKind};

/// Bytes per WebAssembly page.
pub const PAGE_SIZE: usize = 65536;

/// A linear memory instance.
#[derive(Debug)]
pub struct Memory {
    ty: MemoryType,
    data: Vec<u8>,
}

impl Memory {
    /// Allocates a memory at its declared minimum size.
    pub fn new(ty: MemoryType) -> Result<Self> {
        let pages = ty.limits.min as usize;
        let mut data = Vec::new();
        data.try_reserve_exact(pages * PAGE_SIZE).map_err(|_| {
            Error::new(
                ErrorCategory::Runtime,
                codes::ALLOCATION_FAILED,
                format!("cannot allocate {pages} pages of linear memory"),
            )
        })?;
        data.resize(pages * PAGE_SIZE, 0);
        Ok(Self { ty, data })
    }

    /// The declared memory type.
    #[must_use]
    pub fn ty(&self) -> &MemoryType {
        &self.ty
    }

    /// Current size in pages.
    #[must_use]
    pub fn size_pages(&self) -> u32 {
        (self.data.len() / PAGE_SIZE) as u32
    }

    /// Current size in bytes.
    #[must_use]
    pub fn size_bytes(&self) -> usize {
        self.data.len()
    }

    /// Grows by `delta` pages. Returns the previous size in pages, or
    /// `-1` when the declared maximum (or the format cap) would be
    /// exceeded or allocation fails. Never traps.
    pub fn grow(&mut self, delta: u32) -> i32 {
        let old_pages = self.size_pages();
        let Some(new_pages) = old_pages.checked_add(delta) else {
            return -1;
        };
        let cap = self.ty.limits.max.unwrap_or(MAX_MEMORY_PAGES);
        if new_pages > cap || new_pages > MAX_MEMORY_PAGES {
            return -1;
        }
        let new_len = new_pages as usize * PAGE_SIZE;
        if self.data.try_reserve_exact(new_len - self.data.len()).is_err() {
            return -1;
        }
        self.data.resize(new_len, 0);
        old_pages as i32
    }

    /// Bounds-checks `addr + offset .. + len` and returns the start of
    /// the effective range.
    fn effective(&self, addr: u32, offset: u32, len: usize) -> core::result::Result<usize, Trap> {
        let ea = u64::from(addr) + u64::from(offset);
        let end = ea + len as u64;
        if end > self.data.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsMemoryAccess));
        }
        Ok(ea as usize)
    }

    /// Reads `N` bytes at `addr + offset`.
    pub fn load<const N: usize>(
        &self,
        addr: u32,
        offset: u32,
    ) -> core::result::Result<[u8; N], Trap> {
        let start = self.effective(addr, offset, N)?;
        let mut out = [0u8; N];
        out.copy_from_slice(&self.data[start..start + N]);
        Ok(out)
    }

    /// Writes `N` bytes at `addr + offset`.
    pub fn store<const N: usize>(
        &mut self,
        addr: u32,
        offset: u32,
        bytes: [u8; N],
    ) -> core::result::Result<(), Trap> {
        let start = self.effective(addr, offset, N)?;
        self.data[start..start + N].copy_from_slice(&bytes);
        Ok(())
    }

    /// `memory.init` / active data segments: copies `src[src_off..+len]`
    /// to `dst`. Bounds-checked on both sides before any byte moves.
    pub fn init(
        &mut self,
        dst: u32,
        src: &[u8],
        src_off: u32,
        len: u32,
    ) -> core::result::Result<(), Trap> {
        let src_end = u64::from(src_off) + u64::from(len);
        if src_end > src.len() as u64 {
            return Err(Trap::new(TrapKind::OutOfBoundsMemoryAccess));
        }
        let start = self.effective(dst, 0, len as usize)?;
        self.data[start..start + len as usize]
            .copy_from_slice(&src[src_off as usize..src_end as usize]);
        Ok(())
    }

    /// `memory.copy`: overlapping ranges copy as if through a buffer.
    pub fn copy(&mut self, dst: u32, src: u32, len: u32) -> core::result::Result<(), Trap> {
        let dst_start = self.effective(dst, 0, len as usize)?;
        let src_start = self.effective(src, 0, len as usize)?;
        self.data
            .copy_within(src_start..src_start + len as usize, dst_start);
        Ok(())
    }

    /// `memory.fill`.
    pub fn fill(&mut self, dst: u32, byte: u8, len: u32) -> core::result::Result<(), Trap> {
        let start = self.effective(dst, 0, len as usize)?;
        self.data[start..start + len as usize].fill(byte);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weft_foundation::Limits;

    fn mem(min: u32, max: Option<u32>) -> Memory {
        Memory::new(MemoryType {
            limits: Limits::new(min, max),
        })
        .unwrap()
    }

    #[test]
    fn load_store_round_trip() {
        let mut m = mem(1, None);
        m.store::<4>(8, 0, 0xDEAD_BEEFu32.to_le_bytes()).unwrap();
        assert_eq!(m.load::<4>(8, 0).unwrap(), 0xDEAD_BEEFu32.to_le_bytes());
    }

    #[test]
    fn bounds_are_exact() {
        let m = mem(1, None);
        // The last valid 4-byte load starts at PAGE_SIZE - 4.
        assert!(m.load::<4>((PAGE_SIZE - 4) as u32, 0).is_ok());
        let err = m.load::<4>((PAGE_SIZE - 3) as u32, 0).unwrap_err();
        assert_eq!(err.kind, TrapKind::OutOfBoundsMemoryAccess);
    }

    #[test]
    fn offset_does_not_wrap() {
        let m = mem(1, None);
        assert!(m.load::<1>(u32::MAX, u32::MAX).is_err());
    }

    #[test]
    fn grow_respects_max() {
        let mut m = mem(1, Some(2));
        assert_eq!(m.grow(1), 1);
        assert_eq!(m.size_pages(), 2);
        assert_eq!(m.grow(1), -1);
        assert_eq!(m.size_pages(), 2);
        // Zero-page grow always succeeds and reports the current size.
        assert_eq!(m.grow(0), 2);
    }

    #[test]
    fn fill_and_copy() {
        let mut m = mem(1, None);
        m.fill(0, 0xAB, 4).unwrap();
        m.copy(8, 0, 4).unwrap();
        assert_eq!(m.load::<1>(11, 0).unwrap(), [0xAB]);
        assert!(m.fill(PAGE_SIZE as u32 - 1, 0, 2).is_err());
    }

    #[test]
    fn zero_length_at_boundary_is_ok() {
        let mut m = mem(1, None);
        assert!(m.fill(PAGE_SIZE as u32, 0, 0).is_ok());
        assert!(m.fill(PAGE_SIZE as u32 + 1, 0, 0).is_err());
    }
}
