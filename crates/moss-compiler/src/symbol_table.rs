//! Name resolution for the compiler.

use std::collections::HashMap;

/// Which storage class a symbol resolves to. Only the global scope
/// exists today; the outer link on [`SymbolTable`] anticipates nested
/// local scopes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolScope {
    Global,
}

/// A resolved name: its storage class and slot index.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub name: String,
    pub scope: SymbolScope,
    pub index: usize,
}

/// Maps identifiers to storage slots. Indices are handed out in
/// first-definition order and never reused; re-defining a name shadows
/// it at a fresh slot.
#[derive(Debug, Default)]
pub struct SymbolTable {
    outer: Option<Box<SymbolTable>>,
    store: HashMap<String, Symbol>,
    num_definitions: usize,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_enclosed(outer: SymbolTable) -> Self {
        Self {
            outer: Some(Box::new(outer)),
            store: HashMap::new(),
            num_definitions: 0,
        }
    }

    /// Bind `name` to the next free slot in this scope.
    pub fn define(&mut self, name: &str) -> Symbol {
        let symbol = Symbol {
            name: name.to_string(),
            scope: SymbolScope::Global,
            index: self.num_definitions,
        };
        self.num_definitions += 1;
        self.store.insert(name.to_string(), symbol.clone());
        symbol
    }

    /// Look `name` up in this scope, then recurse outward.
    pub fn resolve(&self, name: &str) -> Option<Symbol> {
        if let Some(symbol) = self.store.get(name) {
            return Some(symbol.clone());
        }
        self.outer.as_ref().and_then(|outer| outer.resolve(name))
    }

    /// All bindings visible in this scope, ordered by slot index. Used
    /// by the REPL to list globals.
    pub fn snapshot(&self) -> Vec<Symbol> {
        let mut symbols: Vec<Symbol> = self.store.values().cloned().collect();
        symbols.sort_by_key(|s| s.index);
        symbols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn define_assigns_monotonic_indices() {
        let mut table = SymbolTable::new();
        let a = table.define("a");
        let b = table.define("b");
        assert_eq!(
            a,
            Symbol {
                name: "a".to_string(),
                scope: SymbolScope::Global,
                index: 0
            }
        );
        assert_eq!(
            b,
            Symbol {
                name: "b".to_string(),
                scope: SymbolScope::Global,
                index: 1
            }
        );
    }

    #[test]
    fn resolve_finds_defined_names() {
        let mut table = SymbolTable::new();
        table.define("a");
        table.define("b");

        let a = table.resolve("a").expect("a should resolve");
        assert_eq!(a.index, 0);
        let b = table.resolve("b").expect("b should resolve");
        assert_eq!(b.index, 1);
        assert!(table.resolve("c").is_none());
    }

    #[test]
    fn redefinition_shadows_at_a_fresh_slot() {
        let mut table = SymbolTable::new();
        let first = table.define("x");
        let second = table.define("x");
        assert_eq!(first.index, 0);
        assert_eq!(second.index, 1);
        assert_eq!(table.resolve("x").unwrap().index, 1);
    }

    #[test]
    fn resolve_recurses_into_outer_scopes() {
        let mut outer = SymbolTable::new();
        outer.define("a");
        let inner = SymbolTable::new_enclosed(outer);
        assert_eq!(inner.resolve("a").unwrap().index, 0);
    }

    #[test]
    fn snapshot_orders_by_slot() {
        let mut table = SymbolTable::new();
        table.define("z");
        table.define("a");
        let names: Vec<String> = table.snapshot().into_iter().map(|s| s.name).collect();
        assert_eq!(names, vec!["z".to_string(), "a".to_string()]);
    }
}
