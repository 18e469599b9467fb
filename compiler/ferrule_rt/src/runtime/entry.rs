//! Runtime entry points as seen from lowered code.

use ferrule_ir::RuntimeFn;
use ferrule_types::TypeId;

use super::Runtime;
use crate::error::{InterpError, Trap};
use crate::value::RtValue;

fn ptr_arg(f: RuntimeFn, args: &[RtValue], i: usize) -> Result<u64, InterpError> {
    args.get(i).and_then(RtValue::as_ptr).ok_or_else(|| {
        InterpError::Malformed(format!("argument {i} of `{}` is not a pointer", f.name()))
    })
}

fn int_arg(f: RuntimeFn, args: &[RtValue], i: usize) -> Result<u128, InterpError> {
    args.get(i).and_then(RtValue::as_u128).ok_or_else(|| {
        InterpError::Malformed(format!("argument {i} of `{}` is not an integer", f.name()))
    })
}

fn i64_arg(f: RuntimeFn, args: &[RtValue], i: usize) -> Result<i64, InterpError> {
    args.get(i).and_then(RtValue::as_i64).ok_or_else(|| {
        InterpError::Malformed(format!("argument {i} of `{}` is not an integer", f.name()))
    })
}

impl Runtime<'_> {
    /// Run entry point `f`. Error entry points come back as
    /// [`InterpError::Trap`].
    pub fn call_runtime(&mut self, f: RuntimeFn, args: &[RtValue]) -> Result<RtValue, InterpError> {
        let sig = f.signature();
        let arity_ok = if sig.variadic {
            args.len() >= sig.params.len()
        } else {
            args.len() == sig.params.len()
        };
        if !arity_ok {
            return Err(InterpError::Arity {
                func: f.name().to_owned(),
                expected: sig.params.len(),
                got: args.len(),
            });
        }
        tracing::trace!(entry = f.name(), "runtime call");

        match f {
            // --- Allocation and GC ---
            RuntimeFn::AllocObj => {
                let size = int_arg(f, args, 1)?;
                let tag = int_arg(f, args, 2)?;
                let size = u64::try_from(size)
                    .map_err(|_| InterpError::Malformed(format!("allocation of {size} bytes")))?;
                let tag = u64::try_from(tag).map_err(|_| InterpError::BadTag { tag: u64::MAX })?;
                Ok(RtValue::Ptr(self.alloc_obj(size, tag)?))
            }
            RuntimeFn::AllocGenericMemoryUnchecked => {
                let nbytes = int_arg(f, args, 1)?;
                let nbytes = u64::try_from(nbytes)
                    .map_err(|_| InterpError::Malformed(format!("allocation of {nbytes} bytes")))?;
                let t = self.type_from_object(ptr_arg(f, args, 2)?)?;
                Ok(RtValue::Ptr(self.alloc_memory_unchecked(nbytes, t)?))
            }
            RuntimeFn::WriteBarrier => {
                let parent = ptr_arg(f, args, 0)?;
                let children = (1..args.len())
                    .map(|i| ptr_arg(f, args, i))
                    .collect::<Result<Vec<_>, _>>()?;
                self.write_barrier(parent, &children);
                Ok(RtValue::Void)
            }
            RuntimeFn::GetPtls => Ok(RtValue::Ptr(self.ptls()?)),
            RuntimeFn::LockValue => {
                self.lock_value(ptr_arg(f, args, 0)?)?;
                Ok(RtValue::Void)
            }
            RuntimeFn::UnlockValue => {
                self.unlock_value(ptr_arg(f, args, 0)?)?;
                Ok(RtValue::Void)
            }

            // --- Errors ---
            RuntimeFn::Error => Err(Trap::Error(self.read_c_string(ptr_arg(f, args, 0)?)?).into()),
            RuntimeFn::ArgumentError => {
                Err(Trap::Argument(self.read_c_string(ptr_arg(f, args, 0)?)?).into())
            }
            RuntimeFn::AtomicError => {
                Err(Trap::Atomic(self.read_c_string(ptr_arg(f, args, 0)?)?).into())
            }
            RuntimeFn::TypeError => {
                let context = self.read_c_string(ptr_arg(f, args, 0)?)?;
                let expected = self.type_from_object(ptr_arg(f, args, 1)?)?;
                let got = self.typeof_object(ptr_arg(f, args, 2)?)?;
                Err(Trap::TypeError {
                    context,
                    expected: self.format_type(expected),
                    got: self.format_type(got),
                }
                .into())
            }
            RuntimeFn::UndefVarError => Err(Trap::UndefVar {
                name: self.describe(ptr_arg(f, args, 0)?),
                scope: self.describe(ptr_arg(f, args, 1)?),
            }
            .into()),
            RuntimeFn::UndefRefError => Err(Trap::UndefRef.into()),
            RuntimeFn::BoundsError => {
                let obj = ptr_arg(f, args, 0)?;
                let container = self.format_type(self.typeof_object(obj)?);
                let index = i64_arg(f, args, 1)?;
                Err(Trap::Bounds { container, index }.into())
            }
            RuntimeFn::BoundsErrorUnboxed => {
                let t = self.type_from_object(ptr_arg(f, args, 1)?)?;
                let index = i64_arg(f, args, 2)?;
                Err(Trap::Bounds {
                    container: self.format_type(t),
                    index,
                }
                .into())
            }
            RuntimeFn::BoundsErrorTuple => {
                let len = i64_arg(f, args, 1)?;
                let index = i64_arg(f, args, 2)?;
                Err(Trap::Bounds {
                    container: format!("{len}-element tuple"),
                    index,
                }
                .into())
            }

            // --- Introspection ---
            RuntimeFn::TypeOf => {
                let t = self.typeof_object(ptr_arg(f, args, 0)?)?;
                Ok(RtValue::Ptr(self.type_object(t)?))
            }
            RuntimeFn::IsA => {
                let v = ptr_arg(f, args, 0)?;
                let t = self.type_from_object(ptr_arg(f, args, 1)?)?;
                Ok(RtValue::int(32, u128::from(self.isa(v, t)?)))
            }
            RuntimeFn::Subtype => {
                let a = self.type_from_object(ptr_arg(f, args, 0)?)?;
                let b = self.type_from_object(ptr_arg(f, args, 1)?)?;
                Ok(RtValue::int(32, u128::from(self.pool.subtype(a, b))))
            }
            RuntimeFn::TypeAssert => {
                let v = ptr_arg(f, args, 0)?;
                let t = self.type_from_object(ptr_arg(f, args, 1)?)?;
                if self.isa(v, t)? {
                    return Ok(RtValue::Void);
                }
                Err(Trap::TypeError {
                    context: "typeassert".into(),
                    expected: self.format_type(t),
                    got: self.format_type(self.typeof_object(v)?),
                }
                .into())
            }
            RuntimeFn::GetNthFieldChecked => {
                let obj = ptr_arg(f, args, 0)?;
                let i = i64_arg(f, args, 1)?;
                let Ok(idx) = usize::try_from(i) else {
                    let t = self.typeof_object(obj)?;
                    return Err(Trap::Bounds {
                        container: self.format_type(t),
                        index: i.saturating_add(1),
                    }
                    .into());
                };
                Ok(RtValue::Ptr(self.get_field(obj, idx)?))
            }
            RuntimeFn::Egal => {
                let a = ptr_arg(f, args, 0)?;
                let b = ptr_arg(f, args, 1)?;
                Ok(RtValue::int(32, u128::from(self.egal(a, b)?)))
            }
            RuntimeFn::PointerFromObjref => Ok(RtValue::Ptr(ptr_arg(f, args, 0)?)),

            // --- Boxing ---
            RuntimeFn::BoxInt16 => self.box_int_arg(f, args, TypeId::INT16, 2),
            RuntimeFn::BoxUInt16 => self.box_int_arg(f, args, TypeId::UINT16, 2),
            RuntimeFn::BoxInt32 => self.box_int_arg(f, args, TypeId::INT32, 4),
            RuntimeFn::BoxUInt32 => self.box_int_arg(f, args, TypeId::UINT32, 4),
            RuntimeFn::BoxChar => self.box_int_arg(f, args, TypeId::CHAR, 4),
            RuntimeFn::BoxInt64 => self.box_int_arg(f, args, TypeId::INT64, 8),
            RuntimeFn::BoxUInt64 => self.box_int_arg(f, args, TypeId::UINT64, 8),
            RuntimeFn::BoxFloat32 => match args.first() {
                Some(RtValue::Float { bits: 32, raw }) => {
                    let bytes = raw.to_le_bytes();
                    Ok(RtValue::Ptr(self.box_bits(TypeId::FLOAT32, &bytes[..4])?))
                }
                _ => Err(InterpError::Malformed(
                    "argument 0 of `box_float32` is not a float".into(),
                )),
            },
        }
    }

    fn box_int_arg(
        &mut self,
        f: RuntimeFn,
        args: &[RtValue],
        t: TypeId,
        width: usize,
    ) -> Result<RtValue, InterpError> {
        let bytes = int_arg(f, args, 0)?.to_le_bytes();
        Ok(RtValue::Ptr(self.box_bits(t, &bytes[..width])?))
    }
}
