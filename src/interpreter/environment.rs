//! Environment (Scope Tree)
//!
//! A lexically nested scope: bindings live in the scope that defined them,
//! lookup walks parent links, and child scopes merge upward only at explicit
//! points (imports, end-of-child-run). Cloning an `Environment` clones the
//! handle, not the scope — executables capture their defining environment
//! this way.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};

use crate::interpreter::errors::MlldError;
use crate::interpreter::variables::{Variable, VariableOrigin};
use crate::security::{descriptor_merge, SecurityDescriptor};

struct EnvInner {
    bindings: IndexMap<String, Variable>,
    parent: Option<Environment>,
    current_file: Option<String>,
    exported: IndexSet<String>,
    security: Vec<SecurityDescriptor>,
}

#[derive(Clone)]
pub struct Environment {
    inner: Rc<RefCell<EnvInner>>,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Bindings can reference this environment through captured
        // executables; print names only.
        let inner = self.inner.borrow();
        f.debug_struct("Environment")
            .field("bindings", &inner.bindings.keys().collect::<Vec<_>>())
            .field("has_parent", &inner.parent.is_some())
            .field("file", &inner.current_file)
            .finish()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self::with_file(None)
    }

    pub fn with_file(current_file: Option<String>) -> Self {
        Self {
            inner: Rc::new(RefCell::new(EnvInner {
                bindings: IndexMap::new(),
                parent: None,
                current_file,
                exported: IndexSet::new(),
                security: Vec::new(),
            })),
        }
    }

    /// Two handles to the same scope compare equal.
    pub fn same_scope(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn create_child(&self) -> Environment {
        let file = self.current_file();
        let child = Environment::with_file(file);
        child.inner.borrow_mut().parent = Some(self.clone());
        child
    }

    pub fn current_file(&self) -> Option<String> {
        self.inner.borrow().current_file.clone()
    }

    pub fn set_current_file(&self, file: Option<String>) {
        self.inner.borrow_mut().current_file = file;
    }

    /// Lookup, walking parent links.
    pub fn get(&self, name: &str) -> Option<Variable> {
        let inner = self.inner.borrow();
        if let Some(v) = inner.bindings.get(name) {
            return Some(v.clone());
        }
        inner.parent.as_ref().and_then(|p| p.get(name))
    }

    pub fn has(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Is `name` bound in this scope itself (not a parent)?
    pub fn has_local(&self, name: &str) -> bool {
        self.inner.borrow().bindings.contains_key(name)
    }

    /// Define a variable in the current scope. Names are unique within a
    /// scope; user-originated redefinition is an error, internal rebinds
    /// (`Transform` origin) replace silently.
    pub fn define(&self, variable: Variable) -> Result<(), MlldError> {
        let mut inner = self.inner.borrow_mut();
        if inner.bindings.contains_key(&variable.name)
            && !matches!(variable.metadata.origin, VariableOrigin::Transform)
        {
            return Err(MlldError::type_mismatch(format!(
                "@{} is already defined in this scope",
                variable.name
            )));
        }
        inner.bindings.insert(variable.name.clone(), variable);
        Ok(())
    }

    /// Set without the uniqueness check. Used for reserved variables
    /// (`@input`, `@ctx`, loop bindings) that the interpreter rebinds.
    pub fn set(&self, variable: Variable) {
        self.inner
            .borrow_mut()
            .bindings
            .insert(variable.name.clone(), variable);
    }

    pub fn remove(&self, name: &str) -> Option<Variable> {
        self.inner.borrow_mut().bindings.shift_remove(name)
    }

    /// Names bound directly in this scope, in definition order.
    pub fn local_names(&self) -> Vec<String> {
        self.inner.borrow().bindings.keys().cloned().collect()
    }

    // =========================================================================
    // Exports & merging
    // =========================================================================

    pub fn mark_exported(&self, name: &str) {
        self.inner.borrow_mut().exported.insert(name.to_string());
    }

    pub fn exported_names(&self) -> Vec<String> {
        self.inner.borrow().exported.iter().cloned().collect()
    }

    pub fn has_exports(&self) -> bool {
        !self.inner.borrow().exported.is_empty()
    }

    /// Names a child run offers for import: the explicit export list when one
    /// was declared, otherwise every top-level binding.
    pub fn importable_names(&self) -> Vec<String> {
        if self.has_exports() {
            self.exported_names()
        } else {
            self.local_names()
        }
    }

    // =========================================================================
    // Security descriptors
    // =========================================================================

    /// Record a descriptor produced during interpolation.
    pub fn record_security(&self, descriptor: SecurityDescriptor) {
        if !descriptor.is_empty() {
            self.inner.borrow_mut().security.push(descriptor);
        }
    }

    /// Merge everything recorded in this scope.
    pub fn collected_security(&self) -> SecurityDescriptor {
        descriptor_merge(&self.inner.borrow().security)
    }

    pub fn take_security(&self) -> Vec<SecurityDescriptor> {
        std::mem::take(&mut self.inner.borrow_mut().security)
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpreter::variables::{Value, VariableMetadata};

    fn var(name: &str, value: &str) -> Variable {
        Variable::new(
            name,
            Value::Text(value.to_string()),
            VariableMetadata::literal(None, None),
        )
    }

    #[test]
    fn test_lookup_walks_parents() {
        let root = Environment::new();
        root.define(var("a", "1")).unwrap();
        let child = root.create_child();
        child.define(var("b", "2")).unwrap();

        assert_eq!(
            child.get("a").and_then(|v| v.value.to_display_text()),
            Some("1".to_string())
        );
        assert_eq!(
            child.get("b").and_then(|v| v.value.to_display_text()),
            Some("2".to_string())
        );
        // Parent does not see child bindings
        assert!(root.get("b").is_none());
    }

    #[test]
    fn test_child_shadows_parent() {
        let root = Environment::new();
        root.define(var("x", "outer")).unwrap();
        let child = root.create_child();
        child.define(var("x", "inner")).unwrap();
        assert_eq!(
            child.get("x").and_then(|v| v.value.to_display_text()),
            Some("inner".to_string())
        );
        assert_eq!(
            root.get("x").and_then(|v| v.value.to_display_text()),
            Some("outer".to_string())
        );
    }

    #[test]
    fn test_redefinition_in_same_scope_rejected() {
        let env = Environment::new();
        env.define(var("x", "1")).unwrap();
        assert!(env.define(var("x", "2")).is_err());
    }

    #[test]
    fn test_transform_rebind_allowed() {
        let env = Environment::new();
        env.define(var("x", "1")).unwrap();
        env.set(Variable::text("x", "2"));
        assert_eq!(
            env.get("x").and_then(|v| v.value.to_display_text()),
            Some("2".to_string())
        );
    }

    #[test]
    fn test_captured_env_mutation_is_visible() {
        // Closures capture by reference: a later rebind in the defining
        // scope is visible through the captured handle.
        let root = Environment::new();
        root.define(var("x", "before")).unwrap();
        let captured = root.clone();
        root.set(Variable::text("x", "after"));
        assert_eq!(
            captured.get("x").and_then(|v| v.value.to_display_text()),
            Some("after".to_string())
        );
    }

    #[test]
    fn test_importable_names_prefers_exports() {
        let env = Environment::new();
        env.define(var("a", "1")).unwrap();
        env.define(var("b", "2")).unwrap();
        assert_eq!(env.importable_names(), vec!["a", "b"]);
        env.mark_exported("b");
        assert_eq!(env.importable_names(), vec!["b"]);
    }

    #[test]
    fn test_security_accumulation() {
        let env = Environment::new();
        env.record_security(SecurityDescriptor::from_source("a.mld"));
        env.record_security(SecurityDescriptor::from_source("b.mld"));
        let merged = env.collected_security();
        assert_eq!(merged.sources.len(), 2);
    }
}
