//! Memory operations (alloca, load, store, GEP, memcpy) for `IrBuilder`.

use super::IrBuilder;
use crate::attrs::{AliasTag, AtomicOrdering};
use crate::ids::{InstId, ValueId};
use crate::inst::{InstKind, Load, Store};
use crate::module::{InstData, ValueDef};
use crate::types::{AddressSpace, IrType};

impl IrBuilder<'_> {
    /// Stack slot for one `ty`, placed with the other allocas at the top
    /// of the entry block regardless of the current position.
    pub fn alloca(&mut self, ty: IrType, align: u32, name: &str) -> ValueId {
        let Some(entry) = self.function().entry() else {
            tracing::error!(%ty, "alloca in a function without blocks");
            self.record_codegen_error();
            return self.const_null(AddressSpace::Generic);
        };
        let f = self.func_mut();
        let pos = f.blocks[entry.index()]
            .insts
            .iter()
            .take_while(|&&i| matches!(f.insts[i.index()].kind, InstKind::Alloca { .. }))
            .count();
        let inst = InstId::next(f.insts.len());
        f.insts.push(InstData {
            kind: InstKind::Alloca { ty, align },
            result: None,
            block: entry,
            erased: false,
        });
        f.blocks[entry.index()].insts.insert(pos, inst);
        let v = self.push_value(IrType::PTR, ValueDef::Inst(inst), name);
        self.func_mut().insts[inst.index()].result = Some(v);
        v
    }

    /// Plain load of `ty` from `ptr`.
    pub fn load(
        &mut self,
        ty: IrType,
        ptr: ValueId,
        align: u32,
        tbaa: Option<AliasTag>,
        name: &str,
    ) -> ValueId {
        let mut spec = Load::new(ty, ptr, align);
        spec.tbaa = tbaa;
        self.load_with(spec, name)
    }

    /// Load with ordering and result facts.
    ///
    /// A non-pointer address records a codegen error and yields
    /// `undef` of the requested type.
    pub fn load_with(&mut self, spec: Load, name: &str) -> ValueId {
        if !self.value_type(spec.ptr).is_ptr() {
            tracing::error!(ptr = ?spec.ptr, "load from non-pointer");
            self.record_codegen_error();
            return self.undef(spec.ty);
        }
        let ty = spec.ty.clone();
        self.emit(InstKind::Load(spec), ty, name)
    }

    pub fn store(&mut self, val: ValueId, ptr: ValueId, align: u32, tbaa: Option<AliasTag>) {
        self.store_atomic(val, ptr, align, tbaa, AtomicOrdering::NotAtomic);
    }

    /// A non-pointer address records a codegen error and skips
    /// the store.
    pub fn store_atomic(
        &mut self,
        val: ValueId,
        ptr: ValueId,
        align: u32,
        tbaa: Option<AliasTag>,
        order: AtomicOrdering,
    ) {
        if !self.value_type(ptr).is_ptr() {
            tracing::error!(?ptr, "store to non-pointer");
            self.record_codegen_error();
            return;
        }
        self.emit_void(InstKind::Store(Store {
            val,
            ptr,
            align,
            order,
            tbaa,
        }));
    }

    /// `ptr + offset` bytes, keeping the address space of `ptr`.
    pub fn gep(&mut self, ptr: ValueId, offset: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(ptr);
        if !ty.is_ptr() || !self.value_type(offset).is_int() {
            tracing::error!(?ptr, ?offset, "gep on non-pointer or non-integer offset");
            self.record_codegen_error();
            return ptr;
        }
        if self.const_value(offset) == Some(0) {
            return ptr;
        }
        self.emit(InstKind::Gep { ptr, offset }, ty, name)
    }

    /// `ptr + offset` for a constant byte offset.
    pub fn gep_bytes(&mut self, ptr: ValueId, offset: u64, name: &str) -> ValueId {
        if offset == 0 {
            return ptr;
        }
        let off = self.const_usize(offset);
        self.gep(ptr, off, name)
    }

    /// `ptr + index * alloc_size(elem)`.
    pub fn index_gep(&mut self, elem: IrType, ptr: ValueId, index: ValueId, name: &str) -> ValueId {
        let ty = self.value_type(ptr);
        if !ty.is_ptr() || !self.value_type(index).is_int() {
            tracing::error!(?ptr, ?index, "index_gep on non-pointer or non-integer index");
            self.record_codegen_error();
            return ptr;
        }
        self.emit(InstKind::IndexGep { elem, ptr, index }, ty, name)
    }

    pub fn memcpy(&mut self, dst: ValueId, src: ValueId, len: ValueId, align: u32) {
        if !self.value_type(dst).is_ptr() || !self.value_type(src).is_ptr() {
            tracing::error!(?dst, ?src, "memcpy between non-pointers");
            self.record_codegen_error();
            return;
        }
        if self.const_value(len) == Some(0) {
            return;
        }
        self.emit_void(InstKind::Memcpy {
            dst,
            src,
            len,
            align,
        });
    }

    pub fn memcpy_bytes(&mut self, dst: ValueId, src: ValueId, len: u64, align: u32) {
        let len = self.const_usize(len);
        self.memcpy(dst, src, len, align);
    }

    pub fn memset(&mut self, dst: ValueId, byte: u8, len: ValueId, align: u32) {
        if !self.value_type(dst).is_ptr() {
            tracing::error!(?dst, "memset of non-pointer");
            self.record_codegen_error();
            return;
        }
        if self.const_value(len) == Some(0) {
            return;
        }
        let byte = self.const_i8(byte);
        self.emit_void(InstKind::Memset {
            dst,
            byte,
            len,
            align,
        });
    }
}
