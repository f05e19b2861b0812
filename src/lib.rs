//! Lamina: incremental environment tables with per-module overlays
//!
//! This crate is the incremental-computation core of a language-analysis
//! service. It maintains a stack of derived views over a set of source
//! modules - code text, parse trees, class definitions, parents,
//! grandparents - such that each derived value is computed at most once per
//! input version, dependencies are tracked on access, and edits invalidate
//! and recompute exactly the affected keys, pushed bottom-up through the
//! stack.
//!
//! An editor session can additionally keep a *per-module overlay*: an
//! unsaved buffer's view of one module that shadows the saved view for that
//! module only, while queries about every other module keep seeing saved
//! content.
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use lamina::create_env_stack;
//!
//! let mut code = BTreeMap::new();
//! code.insert("a".to_string(), "class X: pass\nclass Y(a.X): pass".to_string());
//! code.insert("b".to_string(), "class Z(a.X): pass\nclass W(b.Z): pass".to_string());
//!
//! let stack = create_env_stack(code);
//! assert_eq!(stack.class_grandparents.get("b.W", "").unwrap(), vec!["a.X"]);
//!
//! // An unsaved edit to `b` lives in an overlay; the base stack keeps the
//! // saved view.
//! stack.update("b", "class Z(a.Y): pass\nclass W(b.Z): pass", true).unwrap();
//! assert_eq!(stack.class_grandparents.get("b.W", "").unwrap(), vec!["a.X"]);
//! let overlay = stack.class_grandparents.overlay_child("b").unwrap();
//! assert_eq!(overlay.get("b.W", "").unwrap(), vec!["a.Y"]);
//! ```

pub mod error;
pub mod key;
pub mod overlay;
pub mod pipeline;
pub mod syntax;
pub mod table;

pub use error::{EnvError, Result};
pub use key::{module_of, split_class_key, ROOT_QUERY};
pub use overlay::OverlayLink;
pub use pipeline::{
    create_env_stack, Ancestors, AstEnv, ClassBody, ClassBodyEnv, ClassGrandparents,
    ClassGrandparentsEnv, ClassParents, ClassParentsEnv, CodeEnv, EnvStack, ParsedModule,
    SourceText,
};
pub use syntax::{dedent, parse, ClassDef, DottedName, ModuleTree, Stmt, SyntaxError};
pub use table::{EnvTable, LayerStats, Produce, Reader};
