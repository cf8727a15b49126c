//! Name bindings for the tree-walking evaluator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::object::Object;

/// A chain of scopes: each environment owns its bindings and may link
/// to the enclosing scope. Function calls evaluate their bodies in an
/// environment enclosed by the one captured at the definition site.
#[derive(Debug, Default)]
pub struct Environment {
    store: HashMap<String, Object>,
    outer: Option<Rc<RefCell<Environment>>>,
}

impl Environment {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
            outer: None,
        }
    }

    pub fn new_enclosed(outer: Rc<RefCell<Environment>>) -> Self {
        Self {
            store: HashMap::new(),
            outer: Some(outer),
        }
    }

    /// Look a name up in this scope, then recurse outward.
    pub fn get(&self, name: &str) -> Option<Object> {
        if let Some(obj) = self.store.get(name) {
            return Some(obj.clone());
        }
        self.outer
            .as_ref()
            .and_then(|outer| outer.borrow().get(name))
    }

    pub fn set(&mut self, name: String, value: Object) {
        self.store.insert(name, value);
    }

    /// This scope's own bindings, sorted by name. Used by the REPL to
    /// list what has been defined.
    pub fn snapshot(&self) -> Vec<(String, Object)> {
        let mut vars: Vec<(String, Object)> = self
            .store
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        vars
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_recurses_into_outer_scopes() {
        let root = Rc::new(RefCell::new(Environment::new()));
        root.borrow_mut()
            .set("a".to_string(), Object::Integer(1));

        let mut inner = Environment::new_enclosed(Rc::clone(&root));
        inner.set("b".to_string(), Object::Integer(2));

        assert_eq!(inner.get("a"), Some(Object::Integer(1)));
        assert_eq!(inner.get("b"), Some(Object::Integer(2)));
        assert_eq!(inner.get("c"), None);
    }

    #[test]
    fn inner_bindings_shadow_outer_ones() {
        let root = Rc::new(RefCell::new(Environment::new()));
        root.borrow_mut()
            .set("x".to_string(), Object::Integer(1));

        let mut inner = Environment::new_enclosed(Rc::clone(&root));
        inner.set("x".to_string(), Object::Integer(99));

        assert_eq!(inner.get("x"), Some(Object::Integer(99)));
        assert_eq!(root.borrow().get("x"), Some(Object::Integer(1)));
    }
}
