//! Byte-addressed simulated heap.
//!
//! One flat region starting at [`HEAP_BASE`] serves heap objects, stack
//! slots and raw runtime tables alike; nothing is ever freed. Objects get
//! an eight-byte header word in front and are aligned to
//! [`SMALL_BYTE_ALIGNMENT`], so the address of a type object is always a
//! valid large tag.

use ferrule_types::abi::{HEADER_SIZE, SMALL_BYTE_ALIGNMENT, TAG_MASK};
use rustc_hash::FxHashMap;

use crate::error::InterpError;

/// Lowest heap address. Everything below it, null included, is invalid.
pub const HEAP_BASE: u64 = 0x1000;

/// Default cap on heap growth, in bytes.
pub const DEFAULT_HEAP_LIMIT: usize = 64 << 20;

pub struct Heap {
    mem: Vec<u8>,
    limit: usize,
    /// Object start address to payload size.
    objects: FxHashMap<u64, u64>,
}

impl Default for Heap {
    fn default() -> Self {
        Self::new(DEFAULT_HEAP_LIMIT)
    }
}

impl Heap {
    pub fn new(limit: usize) -> Self {
        Self {
            mem: Vec::with_capacity(4096),
            limit,
            objects: FxHashMap::default(),
        }
    }

    /// Bytes handed out so far.
    pub fn used(&self) -> usize {
        self.mem.len()
    }

    /// Number of live objects (every object ever allocated).
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    fn bump(&mut self, size: u64, align: u64, header: u64) -> Result<u64, InterpError> {
        let cursor = HEAP_BASE + self.mem.len() as u64;
        let start = (cursor + header).next_multiple_of(align.max(1));
        let end = usize::try_from(start + size - HEAP_BASE)
            .ok()
            .filter(|&end| end <= self.limit)
            .ok_or(InterpError::OutOfMemory { limit: self.limit })?;
        self.mem.resize(end, 0);
        Ok(start)
    }

    /// Zeroed untyped memory with no header.
    pub fn alloc_raw(&mut self, size: u64, align: u64) -> Result<u64, InterpError> {
        self.bump(size, align, 0)
    }

    /// A zeroed object of `size` payload bytes whose header holds `tag`.
    pub fn alloc_object(&mut self, size: u64, tag: u64) -> Result<u64, InterpError> {
        let addr = self.bump(
            size,
            u64::from(SMALL_BYTE_ALIGNMENT),
            u64::from(HEADER_SIZE),
        )?;
        self.write_u64(addr - u64::from(HEADER_SIZE), tag)?;
        self.objects.insert(addr, size);
        tracing::trace!(addr = format_args!("{addr:#x}"), size, tag, "alloc");
        Ok(addr)
    }

    pub fn is_object(&self, addr: u64) -> bool {
        self.objects.contains_key(&addr)
    }

    pub fn object_size(&self, addr: u64) -> Option<u64> {
        self.objects.get(&addr).copied()
    }

    /// Tag word of an object, collector bits cleared.
    pub fn tag(&self, addr: u64) -> Result<u64, InterpError> {
        if !self.is_object(addr) {
            return Err(InterpError::NotAnObject { addr });
        }
        Ok(self.read_u64(addr - u64::from(HEADER_SIZE))? & TAG_MASK)
    }

    // --- Raw access ---

    fn range(&self, addr: u64, len: u64) -> Result<std::ops::Range<usize>, InterpError> {
        let bad = InterpError::BadAddress { addr, len };
        let start = addr.checked_sub(HEAP_BASE).ok_or(bad.clone())?;
        let end = start.checked_add(len).ok_or(bad.clone())?;
        if end > self.mem.len() as u64 {
            return Err(bad);
        }
        let start = usize::try_from(start).map_err(|_| bad.clone())?;
        let end = usize::try_from(end).map_err(|_| bad)?;
        Ok(start..end)
    }

    pub fn bytes(&self, addr: u64, len: u64) -> Result<&[u8], InterpError> {
        let r = self.range(addr, len)?;
        Ok(&self.mem[r])
    }

    pub fn bytes_mut(&mut self, addr: u64, len: u64) -> Result<&mut [u8], InterpError> {
        let r = self.range(addr, len)?;
        Ok(&mut self.mem[r])
    }

    pub fn write_bytes(&mut self, addr: u64, src: &[u8]) -> Result<(), InterpError> {
        self.bytes_mut(addr, src.len() as u64)?.copy_from_slice(src);
        Ok(())
    }

    pub fn read_u8(&self, addr: u64) -> Result<u8, InterpError> {
        Ok(self.bytes(addr, 1)?[0])
    }

    pub fn write_u8(&mut self, addr: u64, v: u8) -> Result<(), InterpError> {
        self.bytes_mut(addr, 1)?[0] = v;
        Ok(())
    }

    pub fn read_u32(&self, addr: u64) -> Result<u32, InterpError> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.bytes(addr, 4)?);
        Ok(u32::from_le_bytes(buf))
    }

    pub fn write_u32(&mut self, addr: u64, v: u32) -> Result<(), InterpError> {
        self.write_bytes(addr, &v.to_le_bytes())
    }

    pub fn read_u64(&self, addr: u64) -> Result<u64, InterpError> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.bytes(addr, 8)?);
        Ok(u64::from_le_bytes(buf))
    }

    pub fn write_u64(&mut self, addr: u64, v: u64) -> Result<(), InterpError> {
        self.write_bytes(addr, &v.to_le_bytes())
    }

    /// `memmove` semantics: the ranges may overlap.
    pub fn copy(&mut self, dst: u64, src: u64, len: u64) -> Result<(), InterpError> {
        let from = self.range(src, len)?;
        let to = self.range(dst, len)?;
        self.mem.copy_within(from, to.start);
        Ok(())
    }

    pub fn fill(&mut self, dst: u64, byte: u8, len: u64) -> Result<(), InterpError> {
        self.bytes_mut(dst, len)?.fill(byte);
        Ok(())
    }
}
