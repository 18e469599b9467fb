//! Intern tables shared by concurrent compilations.
//!
//! Every module that refers to the same permanent object (a type object,
//! a boxed constant, a box cache) names its global identically, so the
//! linker can merge them. The tables are read-mostly: lookups take the
//! read lock, and a miss re-checks under the write lock before inserting
//! ("insert if absent, else return existing").

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ferrule_ir::GlobalKind;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

/// Global names keyed by what the global holds, plus the counter that
/// keeps generated names unique.
#[derive(Debug, Default)]
pub struct InternTables {
    names: RwLock<FxHashMap<GlobalKind, Arc<str>>>,
    counter: AtomicU64,
}

impl InternTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// The name of the global holding `kind`, minting `"{hint}#{n}"` on
    /// first use.
    pub fn global_name(&self, kind: &GlobalKind, hint: impl FnOnce() -> String) -> Arc<str> {
        if let Some(name) = self.names.read().get(kind) {
            return Arc::clone(name);
        }
        let mut names = self.names.write();
        // Another compilation may have won the race for the write lock.
        if let Some(name) = names.get(kind) {
            return Arc::clone(name);
        }
        let name: Arc<str> = self.unique_name(&hint()).into();
        names.insert(kind.clone(), Arc::clone(&name));
        tracing::trace!(%name, "interned global");
        name
    }

    /// `"{prefix}#{n}"` with a process-unique `n`.
    pub fn unique_name(&self, prefix: &str) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("{prefix}#{n}")
    }

    /// Number of interned globals.
    pub fn len(&self) -> usize {
        self.names.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use ferrule_types::{Constant, TypeId};
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn same_kind_gets_same_name() {
        let tables = InternTables::new();
        let a = tables.global_name(&GlobalKind::Constant(Constant::i64(3)), || "int".into());
        let b = tables.global_name(&GlobalKind::Constant(Constant::i64(3)), || "other".into());
        let c = tables.global_name(&GlobalKind::Constant(Constant::i64(4)), || "int".into());
        assert_eq!(a, b);
        assert!(a.starts_with("int#"));
        assert_ne!(a, c);
        assert_eq!(tables.len(), 2);
    }

    #[test]
    fn concurrent_interning_agrees() {
        let tables = Arc::new(InternTables::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let tables = Arc::clone(&tables);
                thread::spawn(move || {
                    tables
                        .global_name(&GlobalKind::TypeObject(TypeId::INT64), || "Int64".into())
                        .to_string()
                })
            })
            .collect();
        let names: Vec<String> = handles.into_iter().filter_map(|h| h.join().ok()).collect();
        assert_eq!(names.len(), 8);
        assert!(names.iter().all(|n| *n == names[0]));
        assert_eq!(tables.len(), 1);
    }
}
