//! Heap allocation, GC roots and write barriers.

use ferrule_ir::{AliasTag, IrType, Load, RetAttrs, RuntimeFn, ValueId};
use ferrule_types::{abi, TypeId};
use smallvec::SmallVec;

use crate::cgval::{CgValue, Repr};
use crate::context::CodegenCx;
use crate::error::LowerError;

pub(crate) type Roots = SmallVec<[ValueId; 4]>;

impl CodegenCx<'_> {
    // === Allocation ===

    pub(crate) fn ptls(&mut self) -> ValueId {
        self.b.call(RuntimeFn::GetPtls, &[], "ptls")
    }

    /// A fresh, zeroed object of `size` bytes whose header holds `tag`.
    pub fn alloc_obj(&mut self, size: u32, tag: ValueId) -> ValueId {
        let ptls = self.ptls();
        let sz = self.b.const_i64(i64::from(size));
        self.b.call_with(
            RuntimeFn::AllocObj,
            &[ptls, sz, tag],
            RetAttrs {
                nonnull: true,
                dereferenceable: u64::from(size),
                align: abi::SMALL_BYTE_ALIGNMENT,
            },
            "obj",
        )
    }

    /// A fresh instance of the concrete type `t`, fields zeroed.
    pub fn alloc_for_type(&mut self, t: TypeId) -> Result<ValueId, LowerError> {
        let size = match self.pool.layout(t) {
            Some(l) if self.pool.is_concrete(t) => l.size,
            _ => return Err(LowerError::NotConcrete { ty: t }),
        };
        let tag = self.emit_tagfrom_type(t);
        Ok(self.alloc_obj(size, tag))
    }

    // === Roots ===

    /// The tracked pointers that keep `v` alive.
    ///
    /// With `inline` set, `v` is about to be copied into another object's
    /// inline storage, so a boxed immutable contributes the pointers it
    /// holds rather than itself.
    pub(crate) fn roots_of(&mut self, v: &CgValue, inline: bool) -> Result<Roots, LowerError> {
        let mut roots = Roots::new();
        match &v.repr {
            Repr::Ghost | Repr::Constant(_) => {}
            Repr::Split(s) => roots.extend(s.roots.iter().copied()),
            Repr::Boxed { ptr } => {
                if inline && self.pool.is_concrete_immutable(v.ty) {
                    roots = self.load_roots(*ptr, v.ty, AliasTag::ImmutableHeap);
                } else {
                    roots.push(*ptr);
                }
            }
            Repr::Register { val } => {
                let ty = self.b.value_type(*val);
                self.tracked_leaves(*val, &ty, &mut roots);
            }
            Repr::Slot(s) => {
                let ptr = self.slot_ptr(s);
                roots = self.load_roots(ptr, v.ty, s.tbaa);
            }
            Repr::Union(u) => roots.extend(u.boxed),
        }
        Ok(roots)
    }

    /// Load every pointer slot of an instance of `t` stored at `base`.
    pub(crate) fn load_roots(&mut self, base: ValueId, t: TypeId, tbaa: AliasTag) -> Roots {
        let offsets = self
            .pool
            .layout(t)
            .map(|l| l.pointer_offsets.clone())
            .unwrap_or_default();
        let ps = self.ptr_size();
        offsets
            .iter()
            .map(|&off| {
                let p = self.b.gep_bytes(base, u64::from(off), "rootaddr");
                self.b
                    .load_with(Load::new(IrType::TRACKED, p, ps).tbaa(tbaa), "root")
            })
            .collect()
    }

    /// Every tracked pointer inside the register value `val` of type `ty`,
    /// in member order.
    fn tracked_leaves(&mut self, val: ValueId, ty: &IrType, out: &mut Roots) {
        match ty {
            IrType::Ptr(a) if a.is_gc() => out.push(val),
            IrType::Struct(ms) => {
                for (i, m) in ms.iter().enumerate() {
                    if !m.has_tracked_pointers() {
                        continue;
                    }
                    let Ok(i) = u32::try_from(i) else { return };
                    let member = self.b.extract_value(val, i, "leaf");
                    self.tracked_leaves(member, m, out);
                }
            }
            IrType::Array(n, e) if e.has_tracked_pointers() => {
                for i in 0..*n {
                    let member = self.b.extract_value(val, i, "leaf");
                    self.tracked_leaves(member, e, out);
                }
            }
            _ => {}
        }
    }

    // === Barriers ===

    /// Tell the collector that `parent` now references `roots`.
    pub(crate) fn write_barrier(&mut self, parent: ValueId, roots: &[ValueId]) {
        if roots.is_empty() {
            return;
        }
        let mut args: SmallVec<[ValueId; 4]> = SmallVec::with_capacity(roots.len() + 1);
        args.push(parent);
        args.extend(roots.iter().copied());
        self.b.call(RuntimeFn::WriteBarrier, &args, "");
    }

    /// Barrier for storing `v` into `parent`, skipped when `v` can never
    /// be a young object.
    pub(crate) fn write_barrier_for(
        &mut self,
        parent: ValueId,
        v: &CgValue,
        inline: bool,
    ) -> Result<(), LowerError> {
        if self.barrier_elidable(v, inline) {
            tracing::trace!(ty = %self.pool.format_type(v.ty), "write barrier elided");
            return Ok(());
        }
        let roots = self.roots_of(v, inline)?;
        self.write_barrier(parent, &roots);
        Ok(())
    }

    /// Permanently allocated values need no barrier, nor do pointer-free
    /// bits copied inline.
    pub(crate) fn barrier_elidable(&self, v: &CgValue, inline: bool) -> bool {
        matches!(v.repr, Repr::Ghost | Repr::Constant(_))
            || self.pool.is_permalloc(v.ty)
            || (inline && self.pool.is_pointer_free(v.ty))
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used, reason = "Tests use unwrap for brevity")]
mod tests {
    use ferrule_ir::InstKind;
    use ferrule_types::{Constant, TypePool};
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::tests_util::Harness;

    fn barrier_calls(h: &Harness) -> usize {
        let f = h.module.function(h.func);
        f.block_ids()
            .flat_map(|b| f.block_insts(b).to_vec())
            .filter(|&i| {
                matches!(
                    f.inst(i).kind,
                    InstKind::Call {
                        callee: RuntimeFn::WriteBarrier,
                        ..
                    }
                )
            })
            .count()
    }

    #[test]
    fn constants_and_pointer_free_values_skip_the_barrier() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::TRACKED, IrType::I64], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let parent = cx.b.param(0);
        let c = cx.const_value(Constant::i64(1));
        cx.write_barrier_for(parent, &c, false).unwrap();
        let x = cx.param_value(1, TypeId::INT64);
        cx.write_barrier_for(parent, &x, false).unwrap();
        let n = cx.const_value(Constant::nothing());
        cx.write_barrier_for(parent, &n, false).unwrap();
        cx.b.ret_void();
        cx.finish().unwrap();
        assert_eq!(barrier_calls(&h), 0);
    }

    #[test]
    fn boxed_values_need_a_barrier() {
        let mut pool = TypePool::new();
        let mut h = Harness::new(&[IrType::TRACKED, IrType::TRACKED], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let parent = cx.b.param(0);
        let x = cx.param_value(1, TypeId::ANY);
        assert_eq!(cx.roots_of(&x, false).unwrap().len(), 1);
        cx.write_barrier_for(parent, &x, false).unwrap();
        cx.b.ret_void();
        cx.finish().unwrap();
        assert_eq!(barrier_calls(&h), 1);
    }

    #[test]
    fn register_roots_are_the_tracked_members() {
        let mut pool = TypePool::new();
        let pair = pool.tuple(&[TypeId::ANY, TypeId::INT64]).unwrap();
        let mut h = Harness::new(&[], IrType::Void);
        let mut cx = h.cx(&mut pool);
        let ty = cx.ir_type(pair);
        let u = cx.b.undef(ty);
        let v = CgValue::register(u, pair);
        assert_eq!(cx.roots_of(&v, true).unwrap().len(), 1);
    }
}
