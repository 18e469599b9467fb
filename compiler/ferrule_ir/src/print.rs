//! Textual rendering of modules and functions.
//!
//! The format follows LLVM assembly closely enough to be read by anyone
//! who knows it. Values are named `%name` (deduplicated with a `.N`
//! suffix) or `%N` when unnamed; constants and globals print inline.

use std::fmt::{self, Write};

use rustc_hash::FxHashMap;

use crate::attrs::AtomicOrdering;
use crate::ids::{BlockId, FuncId, InstId, ValueId};
use crate::inst::{sign_extend, InstKind, Load, Store};
use crate::module::{ConstValue, Function, Module, ValueDef};
use crate::types::IrType;

/// Render one function of `module`.
pub fn function_to_string(module: &Module, id: FuncId) -> String {
    let mut p = Printer::new(module, module.function(id));
    p.function();
    p.buf
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; module {}", self.name())?;
        for (_, g) in self.globals() {
            writeln!(f, "@{} = external constant ; {:?}", g.name, g.kind)?;
        }
        for (id, _) in self.functions() {
            writeln!(f)?;
            f.write_str(&function_to_string(self, id))?;
        }
        Ok(())
    }
}

// === Printer ===

struct Printer<'a> {
    module: &'a Module,
    func: &'a Function,
    value_names: Vec<String>,
    block_names: Vec<String>,
    buf: String,
}

/// Assign each name a unique spelling: repeats get `.1`, `.2`, ...
fn dedup_names<'n>(names: impl Iterator<Item = Option<&'n str>>) -> Vec<String> {
    let mut seen: FxHashMap<&str, u32> = FxHashMap::default();
    names
        .enumerate()
        .map(|(i, name)| match name {
            Some(n) => {
                let count = seen.entry(n).or_insert(0);
                let out = if *count == 0 {
                    n.to_owned()
                } else {
                    format!("{n}.{count}")
                };
                *count += 1;
                out
            }
            None => i.to_string(),
        })
        .collect()
}

impl<'a> Printer<'a> {
    fn new(module: &'a Module, func: &'a Function) -> Self {
        let value_names = dedup_names((0..func.num_values()).map(|i| {
            func.value(ValueId::next(i)).name.as_deref()
        }));
        let block_names = dedup_names(func.block_ids().map(|b| Some(func.block(b).name.as_str())));
        Self {
            module,
            func,
            value_names,
            block_names,
            buf: String::new(),
        }
    }

    fn function(&mut self) {
        let f = self.func;
        let _ = write!(self.buf, "define {} @{}(", f.ret(), f.name());
        for (i, ty) in f.params().iter().enumerate() {
            if i > 0 {
                self.buf.push_str(", ");
            }
            let _ = write!(self.buf, "{ty} %{}", self.value_names[i]);
        }
        self.buf.push_str(") {\n");
        for block in f.block_ids() {
            if block.index() > 0 {
                self.buf.push('\n');
            }
            let _ = writeln!(self.buf, "{}:", self.block_names[block.index()]);
            for &inst in f.block_insts(block) {
                self.buf.push_str("  ");
                self.inst(inst);
                self.buf.push('\n');
            }
        }
        self.buf.push_str("}\n");
    }

    // --- Operands ---

    fn value(&self, v: ValueId) -> String {
        let data = self.func.value(v);
        match &data.def {
            ValueDef::Param(_) | ValueDef::Inst(_) => format!("%{}", self.value_names[v.index()]),
            ValueDef::Global(g) => format!("@{}", self.module.global(*g).name),
            ValueDef::Const(c) => match c {
                ConstValue::Int(n) => match data.ty {
                    IrType::Int(1) => (if *n == 0 { "false" } else { "true" }).to_owned(),
                    IrType::Int(bits) => sign_extend(*n, bits).to_string(),
                    _ => n.to_string(),
                },
                ConstValue::Float(bits) => format!("0x{bits:016X}"),
                ConstValue::Null => "null".to_owned(),
                ConstValue::Zero if data.ty.is_int() => "0".to_owned(),
                ConstValue::Zero => "zeroinitializer".to_owned(),
                ConstValue::Undef => "undef".to_owned(),
            },
        }
    }

    /// `ty value`
    fn typed(&self, v: ValueId) -> String {
        format!("{} {}", self.func.value_type(v), self.value(v))
    }

    fn label(&self, b: BlockId) -> String {
        self.block_names
            .get(b.index())
            .map_or_else(|| format!("%<bad {b:?}>"), |n| format!("%{n}"))
    }

    fn ordering(order: AtomicOrdering) -> String {
        if order.is_atomic() {
            format!(" {}", order.name())
        } else {
            String::new()
        }
    }

    // --- Instructions ---

    fn inst(&mut self, inst: InstId) {
        let data = self.func.inst(inst);
        if let Some(r) = data.result {
            if *self.func.value_type(r) != IrType::Void {
                let _ = write!(self.buf, "%{} = ", self.value_names[r.index()]);
            }
        }
        let text = self.render(&data.kind);
        self.buf.push_str(&text);
    }

    fn render(&self, kind: &InstKind) -> String {
        match kind {
            InstKind::Alloca { ty, align } => format!("alloca {ty}, align {align}"),
            InstKind::Load(l) => self.load(l),
            InstKind::Store(s) => self.store(s),
            InstKind::Gep { ptr, offset } => {
                format!("getelementptr inbounds i8, {}, {}", self.typed(*ptr), self.typed(*offset))
            }
            InstKind::IndexGep { elem, ptr, index } => format!(
                "getelementptr inbounds {elem}, {}, {}",
                self.typed(*ptr),
                self.typed(*index)
            ),
            InstKind::Memcpy {
                dst,
                src,
                len,
                align,
            } => format!(
                "call void @llvm.memcpy({}, {}, {}), align {align}",
                self.typed(*dst),
                self.typed(*src),
                self.typed(*len)
            ),
            InstKind::Memset {
                dst,
                byte,
                len,
                align,
            } => format!(
                "call void @llvm.memset({}, {}, {}), align {align}",
                self.typed(*dst),
                self.typed(*byte),
                self.typed(*len)
            ),
            InstKind::Bin { op, lhs, rhs } => {
                format!("{} {}, {}", op.name(), self.typed(*lhs), self.value(*rhs))
            }
            InstKind::Overflow { op, lhs, rhs } => {
                let ty = self.func.value_type(*lhs);
                format!(
                    "call {{ {ty}, i1 }} @llvm.{}({}, {})",
                    op.name(),
                    self.typed(*lhs),
                    self.typed(*rhs)
                )
            }
            InstKind::Icmp { pred, lhs, rhs } => {
                format!("icmp {} {}, {}", pred.name(), self.typed(*lhs), self.value(*rhs))
            }
            InstKind::Select {
                cond,
                then_val,
                else_val,
            } => format!(
                "select {}, {}, {}",
                self.typed(*cond),
                self.typed(*then_val),
                self.typed(*else_val)
            ),
            InstKind::Cast { op, val, to } => format!("{} {} to {to}", op.name(), self.typed(*val)),
            InstKind::ExtractValue { agg, index } => {
                format!("extractvalue {}, {index}", self.typed(*agg))
            }
            InstKind::InsertValue { agg, val, index } => {
                format!("insertvalue {}, {}, {index}", self.typed(*agg), self.typed(*val))
            }
            InstKind::ExtractElement { vec, index } => {
                format!("extractelement {}, {}", self.typed(*vec), self.typed(*index))
            }
            InstKind::InsertElement { vec, val, index } => format!(
                "insertelement {}, {}, {}",
                self.typed(*vec),
                self.typed(*val),
                self.typed(*index)
            ),
            InstKind::CmpXchg {
                ptr,
                expected,
                new,
                success,
                failure,
                align,
                tbaa,
            } => {
                let mut s = format!(
                    "cmpxchg {}, {}, {} {} {}, align {align}",
                    self.typed(*ptr),
                    self.typed(*expected),
                    self.typed(*new),
                    success.name(),
                    failure.name()
                );
                if let Some(tag) = tbaa {
                    let _ = write!(s, ", !tbaa !{tag}");
                }
                s
            }
            InstKind::AtomicXchg {
                ptr,
                val,
                order,
                align,
                tbaa,
            } => {
                let mut s = format!(
                    "atomicrmw xchg {}, {} {}, align {align}",
                    self.typed(*ptr),
                    self.typed(*val),
                    order.name()
                );
                if let Some(tag) = tbaa {
                    let _ = write!(s, ", !tbaa !{tag}");
                }
                s
            }
            InstKind::Fence(order) => format!("fence {}", order.name()),
            InstKind::Call {
                callee,
                args,
                attrs,
            } => {
                let mut s = String::from("call ");
                if attrs.nonnull {
                    s.push_str("nonnull ");
                }
                if attrs.dereferenceable > 0 {
                    let _ = write!(s, "dereferenceable({}) ", attrs.dereferenceable);
                }
                if attrs.align > 0 {
                    let _ = write!(s, "align {} ", attrs.align);
                }
                let args: Vec<String> = args.iter().map(|&a| self.typed(a)).collect();
                let _ = write!(s, "{} @{}({})", callee.signature().ret, callee.name(), args.join(", "));
                if callee.is_noreturn() {
                    s.push_str(" #noreturn");
                }
                s
            }
            InstKind::Phi { ty, incoming } => {
                let edges: Vec<String> = incoming
                    .iter()
                    .map(|&(v, b)| format!("[ {}, {} ]", self.value(v), self.label(b)))
                    .collect();
                format!("phi {ty} {}", edges.join(", "))
            }
            InstKind::Br(b) => format!("br label {}", self.label(*b)),
            InstKind::CondBr {
                cond,
                then_bb,
                else_bb,
            } => format!(
                "br {}, label {}, label {}",
                self.typed(*cond),
                self.label(*then_bb),
                self.label(*else_bb)
            ),
            InstKind::Switch {
                val,
                default,
                cases,
            } => {
                let ty = self.func.value_type(*val);
                let mut s = format!("switch {}, label {} [", self.typed(*val), self.label(*default));
                for &(c, b) in cases {
                    let _ = write!(s, " {ty} {c}, label {}", self.label(b));
                }
                s.push_str(" ]");
                s
            }
            InstKind::Ret(Some(v)) => format!("ret {}", self.typed(*v)),
            InstKind::Ret(None) => "ret void".to_owned(),
            InstKind::Unreachable => "unreachable".to_owned(),
        }
    }

    fn load(&self, l: &Load) -> String {
        let atomic = if l.order.is_atomic() { "atomic " } else { "" };
        let mut s = format!(
            "load {atomic}{}, {}{}, align {}",
            l.ty,
            self.typed(l.ptr),
            Self::ordering(l.order),
            l.align
        );
        if let Some(tag) = l.tbaa {
            let _ = write!(s, ", !tbaa !{tag}");
        }
        let facts = &l.facts;
        if facts.nonnull {
            s.push_str(", !nonnull");
        }
        if facts.dereferenceable > 0 {
            let _ = write!(s, ", !dereferenceable {}", facts.dereferenceable);
        }
        if facts.align > 0 {
            let _ = write!(s, ", !align {}", facts.align);
        }
        if let Some((lo, hi)) = facts.range {
            let _ = write!(s, ", !range [{lo}, {hi})");
        }
        if facts.invariant {
            s.push_str(", !invariant.load");
        }
        s
    }

    fn store(&self, st: &Store) -> String {
        let atomic = if st.order.is_atomic() { "atomic " } else { "" };
        let mut s = format!(
            "store {atomic}{}, {}{}, align {}",
            self.typed(st.val),
            self.typed(st.ptr),
            Self::ordering(st.order),
            st.align
        );
        if let Some(tag) = st.tbaa {
            let _ = write!(s, ", !tbaa !{tag}");
        }
        s
    }
}
