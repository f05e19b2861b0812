//! The class-hierarchy pipeline
//!
//! Concrete instantiation of the environment stack: five layers wired
//! bottom-to-top, each producing one view of a module set.
//!
//! ```text
//! code               module        -> source text        (authoritative)
//! ast                module        -> parse tree
//! class_body         module.Class  -> class definition subtree
//! class_parents      module.Class  -> direct base names
//! class_grandparents module.Class  -> parents of each parent, concatenated
//! ```
//!
//! Each layer keeps the produce logic here and inherits get/update/overlay
//! behavior from [`EnvTable`].

use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use ahash::AHashMap;

use crate::error::{EnvError, Result};
use crate::key::split_class_key;
use crate::syntax::{self, ClassDef, ModuleTree};
use crate::table::{EnvTable, LayerStats, Produce};

/// Ordered ancestor names, rendered to their source form
pub type Ancestors = Vec<String>;

/// Bottom layer: raw module text
///
/// Its cache is the source of truth; production is a cache lookup and an
/// update overwrites the cell directly.
pub struct SourceText;

impl Produce for SourceText {
    type Value = String;
    // Never wired; the code layer sits at the bottom of the stack.
    type Upstream = SourceText;
    const NAME: &'static str = "code";

    fn produce(
        key: &str,
        _upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        own: &dyn Fn(&str) -> Option<String>,
    ) -> Result<String> {
        own(key).ok_or_else(|| EnvError::KeyNotFound {
            layer: Self::NAME,
            key: key.to_string(),
        })
    }

    fn source_value(_module: &str, code: &str) -> Option<String> {
        Some(code.to_string())
    }
}

/// Module text parsed into a tree
pub struct ParsedModule;

impl Produce for ParsedModule {
    type Value = ModuleTree;
    type Upstream = SourceText;
    const NAME: &'static str = "ast";

    fn produce(
        key: &str,
        upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        _own: &dyn Fn(&str) -> Option<ModuleTree>,
    ) -> Result<ModuleTree> {
        let upstream = upstream.ok_or(EnvError::NoUpstream { layer: Self::NAME })?;
        let code = upstream.get(key, key)?;
        syntax::parse(&syntax::dedent(&code)).map_err(|source| EnvError::Parse {
            module: key.to_string(),
            source,
        })
    }
}

/// One class definition, located by `module.Class` key
pub struct ClassBody;

impl Produce for ClassBody {
    type Value = ClassDef;
    type Upstream = ParsedModule;
    const NAME: &'static str = "class_body";

    fn produce(
        key: &str,
        upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        _own: &dyn Fn(&str) -> Option<ClassDef>,
    ) -> Result<ClassDef> {
        let upstream = upstream.ok_or(EnvError::NoUpstream { layer: Self::NAME })?;
        let (module, name) = split_class_key(key).ok_or_else(|| EnvError::KeyNotFound {
            layer: Self::NAME,
            key: key.to_string(),
        })?;
        let tree = upstream.get(module, key)?;
        tree.find_class(name)
            .cloned()
            .ok_or_else(|| EnvError::MissingDefinition {
                module: module.to_string(),
                name: name.to_string(),
            })
    }
}

/// Direct base names of a class, in source order
pub struct ClassParents;

impl Produce for ClassParents {
    type Value = Ancestors;
    type Upstream = ClassBody;
    const NAME: &'static str = "class_parents";

    fn produce(
        key: &str,
        upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        _own: &dyn Fn(&str) -> Option<Ancestors>,
    ) -> Result<Ancestors> {
        let upstream = upstream.ok_or(EnvError::NoUpstream { layer: Self::NAME })?;
        match upstream.get(key, key) {
            Ok(def) => Ok(def.bases.iter().map(|base| base.to_string()).collect()),
            // An undefined class has no parents.
            Err(EnvError::MissingDefinition { .. }) => Ok(Ancestors::new()),
            Err(err) => Err(err),
        }
    }
}

/// Parents of each parent, concatenated in parent order
///
/// The only layer whose dependency set depends on data values: which
/// parent keys get read is decided by the parents list itself.
pub struct ClassGrandparents;

impl Produce for ClassGrandparents {
    type Value = Ancestors;
    type Upstream = ClassParents;
    const NAME: &'static str = "class_grandparents";

    fn produce(
        key: &str,
        upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        _own: &dyn Fn(&str) -> Option<Ancestors>,
    ) -> Result<Ancestors> {
        let upstream = upstream.ok_or(EnvError::NoUpstream { layer: Self::NAME })?;
        let parents = upstream.get(key, key)?;
        let mut grandparents = Ancestors::new();
        for parent in &parents {
            grandparents.extend(upstream.get(parent, key)?);
        }
        Ok(grandparents)
    }
}

/// Code layer table
pub type CodeEnv = EnvTable<SourceText>;
/// Ast layer table
pub type AstEnv = EnvTable<ParsedModule>;
/// Class-body layer table
pub type ClassBodyEnv = EnvTable<ClassBody>;
/// Class-parents layer table
pub type ClassParentsEnv = EnvTable<ClassParents>;
/// Class-grandparents layer table
pub type ClassGrandparentsEnv = EnvTable<ClassGrandparents>;

/// The five layers of one analysis session, wired bottom-to-top
///
/// All derived caches start empty; the code layer holds the initial module
/// map. Dropping the stack drops every layer and overlay with it.
#[derive(Debug)]
pub struct EnvStack {
    pub code: Rc<CodeEnv>,
    pub ast: Rc<AstEnv>,
    pub class_body: Rc<ClassBodyEnv>,
    pub class_parents: Rc<ClassParentsEnv>,
    pub class_grandparents: Rc<ClassGrandparentsEnv>,
}

impl EnvStack {
    /// Apply an edit at the top of the stack
    ///
    /// Equivalent to `update` on the class-grandparents layer, which is the
    /// entry point for editor-driven edits.
    pub fn update(&self, module: &str, code: &str, in_overlay: bool) -> Result<BTreeSet<String>> {
        self.class_grandparents.update(module, code, in_overlay)
    }

    /// Per-layer statistics, bottom-up
    pub fn stats(&self) -> Vec<LayerStats> {
        vec![
            self.code.stats(),
            self.ast.stats(),
            self.class_body.stats(),
            self.class_parents.stats(),
            self.class_grandparents.stats(),
        ]
    }
}

/// Create a five-layer stack over an initial `{module -> code}` map
pub fn create_env_stack(code: BTreeMap<String, String>) -> EnvStack {
    let mut seed = AHashMap::with_capacity(code.len());
    for (module, text) in code {
        seed.insert(module, text);
    }

    let code_env = CodeEnv::new(None, None, seed);
    let ast = AstEnv::new(Some(Rc::clone(&code_env)), None, AHashMap::new());
    let class_body = ClassBodyEnv::new(Some(Rc::clone(&ast)), None, AHashMap::new());
    let class_parents = ClassParentsEnv::new(Some(Rc::clone(&class_body)), None, AHashMap::new());
    let class_grandparents =
        ClassGrandparentsEnv::new(Some(Rc::clone(&class_parents)), None, AHashMap::new());

    EnvStack {
        code: code_env,
        ast,
        class_body,
        class_parents,
        class_grandparents,
    }
}
