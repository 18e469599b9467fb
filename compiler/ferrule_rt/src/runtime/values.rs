//! Boxed values: allocation, type queries, field access, egal.

use ferrule_types::abi::{self, memory_object, UNION_INDEX_MASK};
use ferrule_types::{FieldLayout, TypeId, TypeKind};

use super::Runtime;
use crate::error::{InterpError, Trap};

impl Runtime<'_> {
    // === Allocation ===

    /// `alloc_obj`: a zeroed object whose header holds `tag`.
    pub fn alloc_obj(&mut self, size: u64, tag: u64) -> Result<u64, InterpError> {
        self.type_of_tag(tag)?;
        self.heap.alloc_object(size, tag)
    }

    /// A zeroed instance of `t`: every pointer field undefined.
    pub fn alloc_instance(&mut self, t: TypeId) -> Result<u64, InterpError> {
        let size = self.pool.layout(t).map_or(0, |l| l.size);
        let tag = self.tag_word(t)?;
        self.heap.alloc_object(u64::from(size), tag)
    }

    /// `alloc_genericmemory_unchecked`: a memory object of type `t` with
    /// `nbytes` of data, inline when small. The length is left to the
    /// caller.
    pub fn alloc_memory_unchecked(&mut self, nbytes: u64, t: TypeId) -> Result<u64, InterpError> {
        let tag = self.tag_word(t)?;
        let inline = u64::from(memory_object::INLINE_DATA_OFFSET);
        let total = nbytes.saturating_add(inline);
        let (obj, data) = if total <= u64::from(abi::MAX_POOLED_SIZE) {
            let obj = self.heap.alloc_object(total, tag)?;
            (obj, obj + inline)
        } else {
            let data = self.heap.alloc_raw(nbytes, u64::from(abi::SMALL_BYTE_ALIGNMENT))?;
            (self.heap.alloc_object(inline, tag)?, data)
        };
        self.heap
            .write_u64(obj + u64::from(memory_object::DATA_OFFSET), data)?;
        Ok(obj)
    }

    /// A zero-filled memory of type `t` holding `len` elements.
    pub fn new_memory(&mut self, t: TypeId, len: u64) -> Result<u64, InterpError> {
        let pool = self.pool;
        let ml = pool
            .datatype(t)
            .and_then(|dt| dt.memory_layout())
            .ok_or_else(|| InterpError::Malformed(format!("{} is not a memory type", pool.format_type(t))))?;
        if len == 0 {
            return self.empty_memory(t);
        }
        let mut nbytes = len * u64::from(ml.elsize);
        if ml.isunion {
            nbytes += len;
        }
        let obj = self.alloc_memory_unchecked(nbytes, t)?;
        self.heap
            .write_u64(obj + u64::from(memory_object::LENGTH_OFFSET), len)?;
        Ok(obj)
    }

    pub fn memory_length(&self, m: u64) -> Result<u64, InterpError> {
        self.heap
            .read_u64(m + u64::from(memory_object::LENGTH_OFFSET))
    }

    pub fn memory_data(&self, m: u64) -> Result<u64, InterpError> {
        self.heap.read_u64(m + u64::from(memory_object::DATA_OFFSET))
    }

    // === Boxing ===

    /// Box the bit image of a value of concrete type `t`. Singletons and
    /// cached 8-bit values come back as their permanent instance.
    pub fn box_bits(&mut self, t: TypeId, bytes: &[u8]) -> Result<u64, InterpError> {
        if self.pool.is_singleton(t) {
            return self.singleton(t);
        }
        if matches!(t, TypeId::BOOL | TypeId::INT8 | TypeId::UINT8) {
            let table = self.box_cache(t)?;
            let idx = bytes.first().copied().unwrap_or(0);
            return self.heap.read_u64(table + u64::from(idx) * 8);
        }
        let size = self.pool.layout(t).map_or(0, |l| l.size);
        let tag = self.tag_word(t)?;
        let addr = self.heap.alloc_object(u64::from(size), tag)?;
        let n = bytes.len().min(size as usize);
        self.heap.write_bytes(addr, &bytes[..n])?;
        Ok(addr)
    }

    pub fn box_i64(&mut self, v: i64) -> Result<u64, InterpError> {
        self.box_bits(TypeId::INT64, &v.to_le_bytes())
    }

    pub fn box_f64(&mut self, v: f64) -> Result<u64, InterpError> {
        self.box_bits(TypeId::FLOAT64, &v.to_le_bytes())
    }

    pub fn box_bool(&mut self, b: bool) -> Result<u64, InterpError> {
        self.box_bits(TypeId::BOOL, &[u8::from(b)])
    }

    /// Payload bytes of a boxed value, as laid out by its type.
    pub fn payload(&self, obj: u64) -> Result<Vec<u8>, InterpError> {
        let t = self.typeof_object(obj)?;
        let size = self.pool.layout(t).map_or(0, |l| l.size);
        Ok(self.heap.bytes(obj, u64::from(size))?.to_vec())
    }

    /// The value of a boxed `Int64`.
    pub fn unbox_i64(&self, obj: u64) -> Result<i64, InterpError> {
        let t = self.typeof_object(obj)?;
        if t != TypeId::INT64 {
            return Err(InterpError::Malformed(format!(
                "expected a boxed Int64, found {}",
                self.pool.format_type(t)
            )));
        }
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.heap.bytes(obj, 8)?);
        Ok(i64::from_le_bytes(buf))
    }

    // === Types ===

    fn type_of_tag(&self, tag: u64) -> Result<TypeId, InterpError> {
        let t = if abi::is_small_tag_word(tag) {
            usize::try_from(tag >> abi::TAG_SHIFT)
                .ok()
                .and_then(|i| self.small_types.get(i))
                .copied()
                .filter(|t| !t.is_none())
        } else {
            self.types_by_object.get(&tag).copied()
        };
        t.ok_or(InterpError::BadTag { tag })
    }

    /// The concrete type of a boxed value.
    pub fn typeof_object(&self, obj: u64) -> Result<TypeId, InterpError> {
        self.type_of_tag(self.heap.tag(obj)?)
    }

    /// Whether `obj` is an instance of `t`.
    pub fn isa(&self, obj: u64, t: TypeId) -> Result<bool, InterpError> {
        let pool = self.pool;
        match pool.kind(t) {
            TypeKind::Union(ms) => {
                for &m in ms.iter() {
                    if self.isa(obj, m)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            TypeKind::TypeOf(x) => Ok(self.types_by_object.get(&obj) == Some(x)),
            _ => Ok(pool.subtype(self.typeof_object(obj)?, t)),
        }
    }

    pub fn format_type(&self, t: TypeId) -> String {
        self.pool.format_type(t)
    }

    /// Human-readable name of a symbol or, for anything else, its type.
    pub fn describe(&self, obj: u64) -> String {
        match self.typeof_object(obj) {
            Ok(TypeId::SYMBOL | TypeId::STRING) => self.text(obj).unwrap_or_default(),
            Ok(_) if self.types_by_object.contains_key(&obj) => self
                .type_from_object(obj)
                .map(|t| self.pool.format_type(t))
                .unwrap_or_default(),
            Ok(t) => self.pool.format_type(t),
            Err(_) => format!("{obj:#x}"),
        }
    }

    // === Fields ===

    fn field_layout(&self, t: TypeId, idx: usize) -> Result<FieldLayout, InterpError> {
        self.pool
            .layout(t)
            .and_then(|l| l.field(idx))
            .copied()
            .ok_or_else(|| {
                InterpError::Malformed(format!(
                    "{} has no field {idx}",
                    self.pool.format_type(t)
                ))
            })
    }

    /// The member of union `u` selected by a selector byte.
    fn union_member(&self, u: TypeId, selector: u8) -> Option<TypeId> {
        let want = selector & UNION_INDEX_MASK;
        let mut found = None;
        self.pool.for_each_union_small(u, |i, m| {
            if i == want {
                found = Some(m);
            }
        });
        found
    }

    /// `get_nth_field_checked`: field `idx` (0-based) of `obj`, boxed.
    pub fn get_field(&mut self, obj: u64, idx: usize) -> Result<u64, InterpError> {
        let t = self.typeof_object(obj)?;
        if idx >= self.pool.nfields(t) {
            return Err(Trap::Bounds {
                container: self.pool.format_type(t),
                index: i64::try_from(idx + 1).unwrap_or(i64::MAX),
            }
            .into());
        }
        let fl = self.field_layout(t, idx)?;
        let fty = self.pool.field_type(t, idx);
        self.load_field(obj + u64::from(fl.offset), fty, &fl)
    }

    fn load_field(&mut self, at: u64, fty: TypeId, fl: &FieldLayout) -> Result<u64, InterpError> {
        if fl.isptr {
            let p = self.heap.read_u64(at)?;
            return if p == 0 { Err(Trap::UndefRef.into()) } else { Ok(p) };
        }
        let member = if fl.isunion {
            let sel = self.heap.read_u8(at + u64::from(fl.size) - 1)?;
            self.union_member(fty, sel).ok_or_else(|| {
                InterpError::Malformed(format!("selector {sel} out of range for {}", self.pool.format_type(fty)))
            })?
        } else {
            fty
        };
        let size = self.pool.layout(member).map_or(0, |l| l.size);
        let bytes = self.heap.bytes(at, u64::from(size))?.to_vec();
        self.box_bits(member, &bytes)
    }

    /// Whether field `idx` of `obj` holds a value.
    pub fn is_field_defined(&self, obj: u64, idx: usize) -> Result<bool, InterpError> {
        let t = self.typeof_object(obj)?;
        let fl = self.field_layout(t, idx)?;
        if !fl.isptr {
            return Ok(true);
        }
        Ok(self.heap.read_u64(obj + u64::from(fl.offset))? != 0)
    }

    /// Store the boxed `val` into field `idx` of `obj`, unboxing it into
    /// inline storage as the layout requires.
    pub fn set_field(&mut self, obj: u64, idx: usize, val: u64) -> Result<(), InterpError> {
        let t = self.typeof_object(obj)?;
        let fl = self.field_layout(t, idx)?;
        let fty = self.pool.field_type(t, idx);
        if !self.isa(val, fty)? {
            return Err(Trap::TypeError {
                context: "setfield!".into(),
                expected: self.pool.format_type(fty),
                got: self.pool.format_type(self.typeof_object(val)?),
            }
            .into());
        }
        let at = obj + u64::from(fl.offset);
        if fl.isptr {
            return self.heap.write_u64(at, val);
        }
        let vty = self.typeof_object(val)?;
        let bytes = self.payload(val)?;
        self.heap.write_bytes(at, &bytes)?;
        if fl.isunion {
            let sel = self.pool.box_tindex(vty, fty);
            self.heap.write_u8(at + u64::from(fl.size) - 1, sel)?;
        }
        Ok(())
    }

    // === Egal ===

    /// Identity for mutable values, structural equality for immutable ones.
    pub fn egal(&self, a: u64, b: u64) -> Result<bool, InterpError> {
        if a == b {
            return Ok(true);
        }
        if a == 0 || b == 0 {
            return Ok(false);
        }
        let (ta, tb) = (self.typeof_object(a)?, self.typeof_object(b)?);
        if ta != tb {
            return Ok(false);
        }
        match ta {
            TypeId::STRING => return Ok(self.text(a)? == self.text(b)?),
            TypeId::SYMBOL => return Ok(false),
            _ => {}
        }
        if self.pool.is_kind(ta) || !self.pool.is_concrete_immutable(ta) {
            return Ok(false);
        }
        self.egal_inline(a, b, ta)
    }

    fn egal_inline(&self, a: u64, b: u64, t: TypeId) -> Result<bool, InterpError> {
        let pool = self.pool;
        let Some(layout) = pool.layout(t) else {
            return Ok(false);
        };
        if layout.fields.is_empty() {
            let size = u64::from(layout.size);
            return Ok(self.heap.bytes(a, size)? == self.heap.bytes(b, size)?);
        }
        for (i, fl) in layout.fields.iter().enumerate() {
            let (fa, fb) = (a + u64::from(fl.offset), b + u64::from(fl.offset));
            let fty = pool.field_type(t, i);
            let same = if fl.isptr {
                self.egal(self.heap.read_u64(fa)?, self.heap.read_u64(fb)?)?
            } else if fl.isunion {
                let last = u64::from(fl.size) - 1;
                let (sa, sb) = (self.heap.read_u8(fa + last)?, self.heap.read_u8(fb + last)?);
                sa == sb
                    && match self.union_member(fty, sa) {
                        Some(m) => self.egal_inline(fa, fb, m)?,
                        None => false,
                    }
            } else {
                self.egal_inline(fa, fb, fty)?
            };
            if !same {
                return Ok(false);
            }
        }
        Ok(true)
    }
}
