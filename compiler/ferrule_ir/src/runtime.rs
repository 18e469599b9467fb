//! Runtime entry points callable from lowered code.
//!
//! Each entry point has one fixed signature; the verifier checks calls
//! against it and the interpreter dispatches on the enum directly.

use crate::types::IrType;

const PTR: IrType = IrType::PTR;
const OBJ: IrType = IrType::TRACKED;
const I16: IrType = IrType::I16;
const I32: IrType = IrType::I32;
const I64: IrType = IrType::I64;
const VOID: IrType = IrType::Void;

/// Parameter and return types of a runtime entry point.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub params: Vec<IrType>,
    pub ret: IrType,
    /// Extra trailing arguments of type `ptr addrspace(10)` are accepted.
    pub variadic: bool,
}

/// A runtime entry point.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "cache", derive(serde::Serialize, serde::Deserialize))]
pub enum RuntimeFn {
    // === Allocation and GC ===
    /// `(ctx, size, tag) -> obj`
    AllocObj,
    /// `(ctx, nbytes, memory_type) -> obj`; the caller fills in the length.
    AllocGenericMemoryUnchecked,
    /// `(parent, children...)`
    WriteBarrier,
    /// Execution context of the current task.
    GetPtls,
    LockValue,
    UnlockValue,

    // === Errors (never return) ===
    Error,
    /// `(context, expected_type, got)`
    TypeError,
    /// `(name, scope)`
    UndefVarError,
    UndefRefError,
    /// `(boxed_container, index)`
    BoundsError,
    /// `(data, container_type, index)`
    BoundsErrorUnboxed,
    /// `(values, len, index)`
    BoundsErrorTuple,
    ArgumentError,
    AtomicError,

    // === Introspection ===
    TypeOf,
    IsA,
    Subtype,
    TypeAssert,
    GetNthFieldChecked,
    Egal,
    PointerFromObjref,

    // === Boxing ===
    BoxInt16,
    BoxInt32,
    BoxInt64,
    BoxUInt16,
    BoxUInt32,
    BoxUInt64,
    BoxChar,
    BoxFloat32,
}

impl RuntimeFn {
    pub const ALL: [RuntimeFn; 30] = [
        Self::AllocObj,
        Self::AllocGenericMemoryUnchecked,
        Self::WriteBarrier,
        Self::GetPtls,
        Self::LockValue,
        Self::UnlockValue,
        Self::Error,
        Self::TypeError,
        Self::UndefVarError,
        Self::UndefRefError,
        Self::BoundsError,
        Self::BoundsErrorUnboxed,
        Self::BoundsErrorTuple,
        Self::ArgumentError,
        Self::AtomicError,
        Self::TypeOf,
        Self::IsA,
        Self::Subtype,
        Self::TypeAssert,
        Self::GetNthFieldChecked,
        Self::Egal,
        Self::PointerFromObjref,
        Self::BoxInt16,
        Self::BoxInt32,
        Self::BoxInt64,
        Self::BoxUInt16,
        Self::BoxUInt32,
        Self::BoxUInt64,
        Self::BoxChar,
        Self::BoxFloat32,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::AllocObj => "alloc_obj",
            Self::AllocGenericMemoryUnchecked => "alloc_genericmemory_unchecked",
            Self::WriteBarrier => "write_barrier",
            Self::GetPtls => "get_ptls",
            Self::LockValue => "lock_value",
            Self::UnlockValue => "unlock_value",
            Self::Error => "error",
            Self::TypeError => "type_error",
            Self::UndefVarError => "undefvar_error",
            Self::UndefRefError => "undefref_error",
            Self::BoundsError => "bounds_error",
            Self::BoundsErrorUnboxed => "bounds_error_unboxed",
            Self::BoundsErrorTuple => "bounds_error_tuple",
            Self::ArgumentError => "argument_error",
            Self::AtomicError => "atomic_error",
            Self::TypeOf => "typeof",
            Self::IsA => "isa",
            Self::Subtype => "subtype",
            Self::TypeAssert => "typeassert",
            Self::GetNthFieldChecked => "get_nth_field_checked",
            Self::Egal => "egal",
            Self::PointerFromObjref => "pointer_from_objref",
            Self::BoxInt16 => "box_int16",
            Self::BoxInt32 => "box_int32",
            Self::BoxInt64 => "box_int64",
            Self::BoxUInt16 => "box_uint16",
            Self::BoxUInt32 => "box_uint32",
            Self::BoxUInt64 => "box_uint64",
            Self::BoxChar => "box_char",
            Self::BoxFloat32 => "box_float32",
        }
    }

    pub fn signature(self) -> Signature {
        let (params, ret, variadic) = match self {
            Self::AllocObj => (vec![PTR, I64, I64], OBJ, false),
            Self::AllocGenericMemoryUnchecked => (vec![PTR, I64, OBJ], OBJ, false),
            Self::WriteBarrier => (vec![OBJ], VOID, true),
            Self::GetPtls => (vec![], PTR, false),
            Self::LockValue | Self::UnlockValue => (vec![OBJ], VOID, false),
            Self::Error | Self::ArgumentError | Self::AtomicError => (vec![PTR], VOID, false),
            Self::TypeError => (vec![PTR, OBJ, OBJ], VOID, false),
            Self::UndefVarError => (vec![OBJ, OBJ], VOID, false),
            Self::UndefRefError => (vec![], VOID, false),
            Self::BoundsError => (vec![OBJ, I64], VOID, false),
            Self::BoundsErrorUnboxed => (vec![PTR, OBJ, I64], VOID, false),
            Self::BoundsErrorTuple => (vec![PTR, I64, I64], VOID, false),
            Self::TypeOf => (vec![OBJ], OBJ, false),
            Self::IsA | Self::Subtype | Self::Egal => (vec![OBJ, OBJ], I32, false),
            Self::TypeAssert => (vec![OBJ, OBJ], VOID, false),
            Self::GetNthFieldChecked => (vec![OBJ, I64], OBJ, false),
            Self::PointerFromObjref => (vec![OBJ], PTR, false),
            Self::BoxInt16 | Self::BoxUInt16 => (vec![I16], OBJ, false),
            Self::BoxInt32 | Self::BoxUInt32 | Self::BoxChar => (vec![I32], OBJ, false),
            Self::BoxInt64 | Self::BoxUInt64 => (vec![I64], OBJ, false),
            Self::BoxFloat32 => (vec![IrType::Float], OBJ, false),
        };
        Signature {
            params,
            ret,
            variadic,
        }
    }

    /// Control never comes back from the call.
    pub fn is_noreturn(self) -> bool {
        matches!(
            self,
            Self::Error
                | Self::TypeError
                | Self::UndefVarError
                | Self::UndefRefError
                | Self::BoundsError
                | Self::BoundsErrorUnboxed
                | Self::BoundsErrorTuple
                | Self::ArgumentError
                | Self::AtomicError
        )
    }
}
