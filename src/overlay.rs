//! Module-scoped overlays
//!
//! An overlay is a shadow table owning the view of exactly one module: the
//! editor's unsaved buffer. Reads of any other module delegate to the parent
//! (base) table, so an overlay sees its own module's unsaved content against
//! the saved content of everything else. The base stack never observes
//! overlay state.
//!
//! Ownership is one-directional: the parent table owns its overlay children
//! strongly (`children` map on [`EnvTable`]); each child holds a [`Weak`]
//! back-reference used only to delegate non-owned keys and to reach the
//! shared per-level dependency table. Overlay chains are created lazily,
//! bottom-up, on the first `update(..., in_overlay = true)` for a module,
//! and live for the rest of the session.

use std::rc::{Rc, Weak};

use ahash::AHashMap;

use crate::error::{EnvError, Result};
use crate::table::{EnvTable, Produce};

/// Identity of an overlay table: the module it owns and the base table it
/// shadows
pub struct OverlayLink<P: Produce> {
    module: String,
    parent: Weak<EnvTable<P>>,
}

impl<P: Produce> OverlayLink<P> {
    pub(crate) fn new(module: &str, parent: &Rc<EnvTable<P>>) -> Self {
        Self {
            module: module.to_string(),
            parent: Rc::downgrade(parent),
        }
    }

    /// Module whose keys this overlay owns
    pub(crate) fn module(&self) -> &str {
        &self.module
    }

    /// Parent base table, if still alive
    pub(crate) fn parent(&self) -> Option<Rc<EnvTable<P>>> {
        self.parent.upgrade()
    }
}

impl<P: Produce> EnvTable<P> {
    /// Overlay child for `module`
    ///
    /// Children exist only for modules that have received an
    /// `in_overlay = true` update; anything else is a [`EnvError::KeyNotFound`].
    pub fn overlay_child(&self, module: &str) -> Result<Rc<EnvTable<P>>> {
        self.children
            .borrow()
            .get(module)
            .map(Rc::clone)
            .ok_or_else(|| EnvError::KeyNotFound {
                layer: P::NAME,
                key: module.to_string(),
            })
    }

    /// Whether an overlay child exists for `module`
    pub fn has_overlay_child(&self, module: &str) -> bool {
        self.children.borrow().contains_key(module)
    }

    /// Overlay child for `module`, creating the chain on first use
    ///
    /// Creation is idempotent per module at every level: an existing child
    /// is reused together with its warm caches, and `code` only seeds a
    /// newly created chain.
    pub(crate) fn get_or_create_overlay(self: &Rc<Self>, module: &str, code: &str) -> Rc<Self> {
        if let Some(existing) = self.children.borrow().get(module) {
            tracing::debug!("[OVERLAY] {}: reusing overlay for `{}`", P::NAME, module);
            return Rc::clone(existing);
        }
        self.create_overlay(module, code)
    }

    fn create_overlay(self: &Rc<Self>, module: &str, code: &str) -> Rc<Self> {
        tracing::debug!("[OVERLAY] {}: creating overlay for `{}`", P::NAME, module);
        let upstream = self
            .upstream()
            .map(|up| up.get_or_create_overlay(module, code));

        // Source layers start out already holding the unsaved text.
        let mut cache = AHashMap::new();
        if let Some(value) = P::source_value(module, code) {
            cache.insert(module.to_string(), value);
        }

        let child = EnvTable::new(upstream, Some(OverlayLink::new(module, self)), cache);
        self.children
            .borrow_mut()
            .insert(module.to_string(), Rc::clone(&child));
        child
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::key::ROOT_QUERY;
    use crate::pipeline::create_env_stack;

    fn stack_with_ab() -> crate::pipeline::EnvStack {
        let mut code = BTreeMap::new();
        code.insert("a".to_string(), "class X: pass".to_string());
        code.insert("b".to_string(), "class Z(a.X): pass".to_string());
        create_env_stack(code)
    }

    #[test]
    fn test_overlay_chain_created_lazily() {
        let stack = stack_with_ab();
        assert!(!stack.class_grandparents.has_overlay_child("b"));

        stack
            .class_grandparents
            .update("b", "class Z(a.X): pass", true)
            .expect("overlay update");

        // Every level of the chain registered a child for `b`.
        assert!(stack.class_grandparents.has_overlay_child("b"));
        assert!(stack.class_parents.has_overlay_child("b"));
        assert!(stack.class_body.has_overlay_child("b"));
        assert!(stack.ast.has_overlay_child("b"));
        assert!(stack.code.has_overlay_child("b"));
        assert!(!stack.code.has_overlay_child("a"));
    }

    #[test]
    fn test_overlay_creation_is_idempotent() {
        let stack = stack_with_ab();
        stack
            .class_grandparents
            .update("b", "class Z(a.X): pass", true)
            .expect("overlay update");
        let first = stack.class_grandparents.overlay_child("b").expect("child");

        stack
            .class_grandparents
            .update("b", "class Z: pass", true)
            .expect("overlay update");
        let second = stack.class_grandparents.overlay_child("b").expect("child");

        assert!(std::rc::Rc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_code_overlay_seeded_with_unsaved_text() {
        let stack = stack_with_ab();
        stack
            .class_grandparents
            .update("b", "class Z: pass", true)
            .expect("overlay update");

        let code_child = stack.code.overlay_child("b").expect("child");
        assert_eq!(code_child.overlay_module(), Some("b"));
        assert_eq!(
            code_child.get("b", ROOT_QUERY).expect("get"),
            "class Z: pass"
        );
        // The base cell still holds the saved text.
        assert_eq!(
            stack.code.get("b", ROOT_QUERY).expect("get"),
            "class Z(a.X): pass"
        );
    }

    #[test]
    fn test_missing_overlay_child_is_key_not_found() {
        let stack = stack_with_ab();
        let err = stack
            .class_grandparents
            .overlay_child("c")
            .expect_err("must fail");
        assert!(matches!(
            err,
            crate::error::EnvError::KeyNotFound { layer: "class_grandparents", .. }
        ));
    }

    #[test]
    fn test_overlay_delegates_foreign_keys_without_caching() {
        let stack = stack_with_ab();
        stack
            .class_grandparents
            .update("b", "class Z(a.X): pass", true)
            .expect("overlay update");

        let ast_child = stack.ast.overlay_child("b").expect("child");
        ast_child.get("a", ROOT_QUERY).expect("delegated get");

        // Delegation produced and cached at the base layer only.
        assert!(ast_child.cached_keys().iter().all(|key| key == "b"));
        assert!(stack.ast.cached_keys().contains(&"a".to_string()));
    }
}
