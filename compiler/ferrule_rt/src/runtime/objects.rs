//! Permanent objects and module globals.
//!
//! Everything here is allocated at most once per runtime and never moves,
//! so lowered code may compare these objects by address.

use ferrule_ir::GlobalKind;
use ferrule_types::abi::{self, type_object};
use ferrule_types::{Constant, TypeId, TypeNameId};

use super::Runtime;
use crate::error::InterpError;

/// Entries of an 8-bit box cache.
const BOX_CACHE_ENTRIES: u64 = 256;

impl Runtime<'_> {
    /// Header tag word for instances of `t`.
    pub fn tag_word(&mut self, t: TypeId) -> Result<u64, InterpError> {
        match self.pool.smalltag(t) {
            Some(tag) => Ok(abi::small_tag_word(tag)),
            None => self.type_object(t),
        }
    }

    /// The type object of `t`, created on first request.
    pub fn type_object(&mut self, t: TypeId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.type_objects.get(&t) {
            return Ok(addr);
        }
        let pool = self.pool;
        let kind_tag = pool
            .smalltag(pool.kind_of(t))
            .map_or(0, abi::small_tag_word);
        let name = match pool.name_id(t) {
            Some(n) => self.type_name_object(n)?,
            None => 0,
        };
        let addr = self
            .heap
            .alloc_object(u64::from(type_object::SIZE), kind_tag)?;
        self.heap
            .write_u64(addr + u64::from(type_object::NAME_OFFSET), name)?;
        let flags = if pool.is_concrete(t) {
            type_object::FLAG_CONCRETE
        } else {
            0
        };
        self.heap
            .write_u8(addr + u64::from(type_object::FLAGS_OFFSET), flags)?;
        self.heap
            .write_u32(addr + u64::from(type_object::ID_OFFSET), t.raw())?;
        self.type_objects.insert(t, addr);
        self.types_by_object.insert(addr, t);
        tracing::trace!(ty = %pool.format_type(t), addr = format_args!("{addr:#x}"), "type object");
        Ok(addr)
    }

    /// The type whose type object lives at `addr`.
    pub fn type_from_object(&self, addr: u64) -> Result<TypeId, InterpError> {
        self.types_by_object
            .get(&addr)
            .copied()
            .ok_or(InterpError::NotAType { addr })
    }

    /// The shared name record of a nominal type.
    ///
    /// Type-name objects carry no type tag; lowered code only ever
    /// compares them by address.
    pub fn type_name_object(&mut self, n: TypeNameId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.type_names.get(&n) {
            return Ok(addr);
        }
        let pool = self.pool;
        let sym = self.symbol(&pool.type_name(n).name)?;
        let addr = self.heap.alloc_object(8, 0)?;
        self.heap.write_u64(addr, sym)?;
        self.type_names.insert(n, addr);
        Ok(addr)
    }

    /// The one instance of singleton type `t`.
    pub fn singleton(&mut self, t: TypeId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.singletons.get(&t) {
            return Ok(addr);
        }
        let tag = self.tag_word(t)?;
        let addr = self.heap.alloc_object(0, tag)?;
        self.singletons.insert(t, addr);
        Ok(addr)
    }

    // === Text objects ===

    /// The interned symbol `name`.
    pub fn symbol(&mut self, name: &str) -> Result<u64, InterpError> {
        if let Some(&addr) = self.symbols.get(name) {
            return Ok(addr);
        }
        let addr = self.text_object(name, abi::smalltag::SYMBOL)?;
        self.symbols.insert(name.into(), addr);
        Ok(addr)
    }

    /// A fresh string object.
    pub fn string(&mut self, s: &str) -> Result<u64, InterpError> {
        self.text_object(s, abi::smalltag::STRING)
    }

    /// Length word followed by the bytes.
    fn text_object(&mut self, s: &str, tag: u32) -> Result<u64, InterpError> {
        let len = s.len() as u64;
        let addr = self
            .heap
            .alloc_object(8 + len, abi::small_tag_word(tag))?;
        self.heap.write_u64(addr, len)?;
        self.heap.write_bytes(addr + 8, s.as_bytes())?;
        Ok(addr)
    }

    /// Contents of a symbol or string object.
    pub fn text(&self, addr: u64) -> Result<String, InterpError> {
        let len = self.heap.read_u64(addr)?;
        let bytes = self.heap.bytes(addr + 8, len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// A NUL-terminated copy of `s` in raw memory.
    pub fn c_string(&mut self, s: &str) -> Result<u64, InterpError> {
        let addr = self.heap.alloc_raw(s.len() as u64 + 1, 1)?;
        self.heap.write_bytes(addr, s.as_bytes())?;
        Ok(addr)
    }

    pub fn read_c_string(&self, addr: u64) -> Result<String, InterpError> {
        let mut bytes = Vec::new();
        let mut at = addr;
        loop {
            let b = self.heap.read_u8(at)?;
            if b == 0 {
                break;
            }
            bytes.push(b);
            at += 1;
        }
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    // === Tables ===

    /// 256 permanent boxes of an 8-bit type, indexed by bit pattern.
    /// `Bool` only fills the first two entries.
    pub fn box_cache(&mut self, t: TypeId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.box_caches.get(&t) {
            return Ok(addr);
        }
        let table = self.heap.alloc_raw(BOX_CACHE_ENTRIES * 8, 16)?;
        let tag = self.tag_word(t)?;
        let entries = if t == TypeId::BOOL { 2 } else { BOX_CACHE_ENTRIES };
        for i in 0..entries {
            let obj = self.heap.alloc_object(1, tag)?;
            self.heap.write_u8(obj, u8::try_from(i).unwrap_or(u8::MAX))?;
            self.heap.write_u64(table + i * 8, obj)?;
        }
        self.box_caches.insert(t, table);
        Ok(table)
    }

    /// Type objects indexed by tag word: the entry for small tag `k` is
    /// at byte offset `k << 4`.
    pub fn small_typeof_table(&mut self) -> Result<u64, InterpError> {
        if let Some(addr) = self.small_typeof {
            return Ok(addr);
        }
        let size = abi::small_tag_word(abi::MAX_TAGS);
        let table = self.heap.alloc_raw(size, 16)?;
        let small_types = self.small_types;
        for (tag, t) in small_types.iter().enumerate() {
            if t.is_none() {
                continue;
            }
            let obj = self.type_object(*t)?;
            self.heap.write_u64(table + ((tag as u64) << abi::TAG_SHIFT), obj)?;
        }
        self.small_typeof = Some(table);
        Ok(table)
    }

    /// The shared zero-length instance of memory type `t`.
    pub fn empty_memory(&mut self, t: TypeId) -> Result<u64, InterpError> {
        if let Some(&addr) = self.empty_memories.get(&t) {
            return Ok(addr);
        }
        let tag = self.tag_word(t)?;
        let addr = self
            .heap
            .alloc_object(u64::from(abi::memory_object::INLINE_DATA_OFFSET), tag)?;
        self.heap.write_u64(
            addr + u64::from(abi::memory_object::DATA_OFFSET),
            addr + u64::from(abi::memory_object::INLINE_DATA_OFFSET),
        )?;
        self.empty_memories.insert(t, addr);
        Ok(addr)
    }

    // === Globals and constants ===

    /// Address of the object or table a module global names.
    pub fn materialize_global(&mut self, kind: &GlobalKind) -> Result<u64, InterpError> {
        match kind {
            GlobalKind::TypeObject(t) => self.type_object(*t),
            GlobalKind::TypeName(n) => self.type_name_object(*n),
            GlobalKind::Constant(c) => self.box_constant(c),
            GlobalKind::BoxCache(t) => self.box_cache(*t),
            GlobalKind::SmallTypeofTable => self.small_typeof_table(),
            GlobalKind::EmptyMemory(t) => self.empty_memory(*t),
            GlobalKind::CString(s) => self.c_string(s),
        }
    }

    /// Box a constant. Permanent kinds (singletons, symbols, types,
    /// cached small integers) come back as their shared instance.
    pub fn box_constant(&mut self, c: &Constant) -> Result<u64, InterpError> {
        match c {
            Constant::Bits { ty, bytes } => self.box_bits(*ty, bytes),
            Constant::Singleton(t) => self.singleton(*t),
            Constant::Type(t) => self.type_object(*t),
            Constant::Symbol(s) => self.symbol(s),
            Constant::String(s) => self.string(s),
            Constant::Struct { ty, .. } => {
                let size = self.pool.layout(*ty).map_or(0, |l| l.size);
                let tag = self.tag_word(*ty)?;
                let addr = self.heap.alloc_object(u64::from(size), tag)?;
                self.write_constant(addr, *ty, c)?;
                Ok(addr)
            }
        }
    }

    /// Write the inline image of `c`, a value of type `ty`, at `addr`.
    fn write_constant(&mut self, addr: u64, ty: TypeId, c: &Constant) -> Result<(), InterpError> {
        let pool = self.pool;
        match c {
            Constant::Bits { bytes, .. } => self.heap.write_bytes(addr, bytes),
            Constant::Singleton(_) => Ok(()),
            Constant::Struct { fields, .. } => {
                let layout = pool.layout(ty).ok_or_else(|| {
                    InterpError::Malformed(format!("{} has no layout", pool.format_type(ty)))
                })?;
                for (i, (f, fl)) in fields.iter().zip(layout.fields.iter()).enumerate() {
                    let at = addr + u64::from(fl.offset);
                    let fty = pool.field_type(ty, i);
                    if fl.isptr {
                        let p = self.box_constant(f)?;
                        self.heap.write_u64(at, p)?;
                    } else if let Some(sel) = fl.selector_offset() {
                        let member = f.runtime_type(pool);
                        let idx = pool.box_tindex(member, fty);
                        if idx == 0 {
                            return Err(InterpError::Malformed(format!(
                                "{} is not a member of {}",
                                pool.format_type(member),
                                pool.format_type(fty)
                            )));
                        }
                        self.write_constant(at, member, f)?;
                        self.heap.write_u8(addr + u64::from(sel), idx)?;
                    } else {
                        self.write_constant(at, fty, f)?;
                    }
                }
                Ok(())
            }
            other => Err(InterpError::Malformed(format!(
                "{other:?} cannot be stored inline"
            ))),
        }
    }
}
