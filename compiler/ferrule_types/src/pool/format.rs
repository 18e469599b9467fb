//! Type formatting for diagnostics and IR comments.

use crate::kind::TypeKind;
use crate::{TypeId, TypePool};

impl TypePool {
    /// Format a type as a human-readable string.
    pub fn format_type(&self, t: TypeId) -> String {
        let mut buf = String::new();
        self.format_type_into(t, &mut buf);
        buf
    }

    /// Format a type into an existing string buffer.
    pub fn format_type_into(&self, t: TypeId, buf: &mut String) {
        if t.is_none() {
            buf.push_str("<none>");
            return;
        }
        match self.kind(t) {
            TypeKind::Bottom => buf.push_str("Union{}"),
            TypeKind::Any => buf.push_str("Any"),
            TypeKind::Abstract(a) => buf.push_str(&self.type_name(a.name).name),
            TypeKind::Family(f) => buf.push_str(&self.type_name(f.name).name),
            TypeKind::DataType(dt) => {
                buf.push_str(&self.type_name(dt.name).name);
                if !dt.params.is_empty() || dt.is_tuple() {
                    self.format_list(&dt.params, buf);
                }
            }
            TypeKind::Union(ms) => {
                buf.push_str("Union");
                self.format_list(ms, buf);
            }
            TypeKind::TypeOf(x) => {
                buf.push_str("Type{");
                self.format_type_into(*x, buf);
                buf.push('}');
            }
        }
    }

    pub(super) fn format_list(&self, items: &[TypeId], buf: &mut String) {
        buf.push('{');
        for (i, &p) in items.iter().enumerate() {
            if i > 0 {
                buf.push_str(", ");
            }
            self.format_type_into(p, buf);
        }
        buf.push('}');
    }
}
