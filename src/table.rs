//! Generic environment table with dependency tracking and push-based
//! invalidation
//!
//! An [`EnvTable`] is one stage of the analysis pipeline: a keyed, memoized
//! computation over the stage below it. Four mechanisms live here:
//!
//! - **Cache** - values computed at most once per input version.
//! - **Dependency table** - for each key, the downstream keys that read it
//!   during their own production. Recorded on every `get`, never pruned.
//! - **Produce** - the layer-specific computation, supplied by a
//!   [`Produce`] implementation. Pure given its upstream reads.
//! - **Overlay children** - per-module shadow tables created lazily on the
//!   first unsaved edit (see the `overlay` module).
//!
//! # Query resolution
//!
//! `get(key, dependency)` records the dependency, probes the cache, and on a
//! miss runs `produce`, which reads the upstream table through its own `get`
//! so that dependencies accumulate transitively up the stack.
//!
//! # Update propagation
//!
//! `update(module, code, in_overlay)` mutates the bottom (code) layer and
//! pushes the invalidated key set up the stack; each layer recomputes its
//! affected keys in lexicographic order, emits the dependents of those keys
//! as the next layer's set, and forwards the original set into its overlay
//! children. Overlay updates run through a parallel chain of shadow tables
//! and leave the base stack untouched.

use std::cell::RefCell;
use std::collections::BTreeSet;
use std::fmt;
use std::mem::ManuallyDrop;
use std::rc::Rc;

use ahash::{AHashMap, AHashSet};

use crate::error::{EnvError, Result};
use crate::key::module_of;
use crate::overlay::OverlayLink;

/// Layer-specific production of values from upstream reads
///
/// Implementations are zero-sized markers; the table is generic over them
/// so each layer's value type is known statically.
pub trait Produce: Sized + 'static {
    /// Value type cached at this layer
    type Value: Clone + fmt::Debug;
    /// Producer of the layer below (ignored by source layers)
    type Upstream: Produce;
    /// Layer name used in errors and logs
    const NAME: &'static str;

    /// Compute the value for `key`
    ///
    /// `upstream` is the layer below, or `None` at the bottom of the stack.
    /// Every `upstream.get(k, key)` call records `key` as a dependent of `k`
    /// in the upstream dependency table. `own` reads this layer's cache and
    /// exists for source layers whose production is a cache lookup.
    fn produce(
        key: &str,
        upstream: Option<&Rc<EnvTable<Self::Upstream>>>,
        own: &dyn Fn(&str) -> Option<Self::Value>,
    ) -> Result<Self::Value>;

    /// Convert raw module text into this layer's value, if this layer
    /// stores source text directly
    ///
    /// Source layers return `Some`; derived layers keep the default `None`.
    /// Used by `update` on upstream-less layers and to seed overlay caches.
    fn source_value(_module: &str, _code: &str) -> Option<Self::Value> {
        None
    }
}

/// One environment table in the stack
///
/// Base tables own the dependency table for their level; overlay children
/// share it through their parent back-reference and own only the cache for
/// their module.
pub struct EnvTable<P: Produce> {
    // Wrapped in `ManuallyDrop` to avoid a `rustc` drop-check overflow: the
    // struct recurses both through `P` (via `children`) and through the
    // `P::Upstream` projection, which the compiler cannot bound generically.
    // `drop` below runs the equivalent of the derived glue by hand.
    pub(crate) upstream: ManuallyDrop<Option<Rc<EnvTable<P::Upstream>>>>,
    pub(crate) overlay: Option<OverlayLink<P>>,
    pub(crate) cache: RefCell<AHashMap<String, P::Value>>,
    pub(crate) dependents: RefCell<AHashMap<String, AHashSet<String>>>,
    pub(crate) children: RefCell<AHashMap<String, Rc<EnvTable<P>>>>,
}

impl<P: Produce> Drop for EnvTable<P> {
    fn drop(&mut self) {
        // Safety: `upstream` is never accessed again after this point; this
        // is the only place it is manually dropped.
        unsafe { ManuallyDrop::drop(&mut self.upstream) };
    }
}

impl<P: Produce> EnvTable<P> {
    pub(crate) fn new(
        upstream: Option<Rc<EnvTable<P::Upstream>>>,
        overlay: Option<OverlayLink<P>>,
        cache: AHashMap<String, P::Value>,
    ) -> Rc<Self> {
        Rc::new(Self {
            upstream: ManuallyDrop::new(upstream),
            overlay,
            cache: RefCell::new(cache),
            dependents: RefCell::new(AHashMap::new()),
            children: RefCell::new(AHashMap::new()),
        })
    }

    /// Layer name (`"code"`, `"ast"`, ...)
    pub fn layer_name(&self) -> &'static str {
        P::NAME
    }

    /// Module owned by this table, if it is an overlay
    pub fn overlay_module(&self) -> Option<&str> {
        self.overlay.as_ref().map(|link| link.module())
    }

    pub(crate) fn upstream(&self) -> Option<&Rc<EnvTable<P::Upstream>>> {
        self.upstream.as_ref()
    }

    /// Look up `key`, producing and caching it on a miss
    ///
    /// `dependency` is the key whose production is performing this read, or
    /// [`crate::key::ROOT_QUERY`] for an external query; it is recorded as a
    /// dependent of `key` before the cache probe. An overlay delegates keys
    /// of other modules to its parent without touching its own tables.
    pub fn get(&self, key: &str, dependency: &str) -> Result<P::Value> {
        if let Some(link) = &self.overlay {
            if module_of(key) != link.module() {
                let parent = link.parent().ok_or_else(|| EnvError::KeyNotFound {
                    layer: P::NAME,
                    key: key.to_string(),
                })?;
                return parent.get(key, dependency);
            }
        }

        self.record_dependent(key, dependency);
        if let Some(hit) = self.cache.borrow().get(key) {
            return Ok(hit.clone());
        }

        tracing::trace!("[ENV] {}: producing `{}`", P::NAME, key);
        let value = P::produce(key, self.upstream.as_ref(), &|k| {
            self.cache.borrow().get(k).cloned()
        })?;
        self.cache.borrow_mut().insert(key.to_string(), value.clone());
        Ok(value)
    }

    /// Apply an edit and propagate invalidation to this layer
    ///
    /// With `in_overlay = false` the edit flows through the base stack: the
    /// code layer overwrites its cell and every layer up to this one
    /// recomputes the affected keys. With `in_overlay = true` the overlay
    /// chain for `module` is created on first use and the base stack is left
    /// untouched. Returns the keys whose dependents lie beyond this layer.
    pub fn update(
        self: &Rc<Self>,
        module: &str,
        code: &str,
        in_overlay: bool,
    ) -> Result<BTreeSet<String>> {
        let Some(upstream) = self.upstream.as_ref() else {
            return self.update_source(module, code, in_overlay);
        };

        if in_overlay {
            tracing::debug!("[PUSH] {}: overlay update of `{}`", P::NAME, module);
            let child = self.get_or_create_overlay(module, code);
            let chain = child
                .upstream
                .as_ref()
                .ok_or(EnvError::NoUpstream { layer: P::NAME })?;
            let keys = chain.update(module, code, false)?;
            child.update_for_push(&keys)
        } else {
            tracing::debug!("[PUSH] {}: update of `{}`", P::NAME, module);
            let keys = upstream.update(module, code, false)?;
            self.update_for_push(&keys)
        }
    }

    /// Update entry for a layer with no upstream: overwrite the cell and
    /// hand back its recorded dependents as the initial invalidation set.
    fn update_source(&self, module: &str, code: &str, in_overlay: bool) -> Result<BTreeSet<String>> {
        if in_overlay {
            return Err(EnvError::InvalidOverlayUpdate { layer: P::NAME });
        }
        let value =
            P::source_value(module, code).ok_or(EnvError::NoUpstream { layer: P::NAME })?;
        self.cache.borrow_mut().insert(module.to_string(), value);
        Ok(self.dependents_of(module))
    }

    /// Recompute this layer's slice of an invalidation set
    ///
    /// Keys are processed in lexicographic order. An overlay skips keys of
    /// modules it does not own; a key with neither a cache entry nor a
    /// dependency entry was never seen here and is skipped. After its own
    /// keys, the table forwards the original incoming set to every overlay
    /// child (in module-name order) and unions their outgoing sets; the
    /// over-approximation trades redundant recomputation for simplicity,
    /// never staleness.
    pub fn update_for_push(&self, keys_to_update: &BTreeSet<String>) -> Result<BTreeSet<String>> {
        let mut outgoing = BTreeSet::new();
        let mut recomputed = 0usize;

        for key in keys_to_update {
            if let Some(link) = &self.overlay {
                if module_of(key) != link.module() {
                    continue;
                }
            }
            if !self.cache.borrow().contains_key(key) && !self.has_dependents(key) {
                continue;
            }
            let value = P::produce(key, self.upstream.as_ref(), &|k| {
                self.cache.borrow().get(k).cloned()
            })?;
            self.cache.borrow_mut().insert(key.clone(), value);
            outgoing.extend(self.dependents_of(key));
            recomputed += 1;
        }

        if recomputed > 0 {
            tracing::debug!(
                "[PUSH] {}: recomputed {} keys, {} downstream",
                P::NAME,
                recomputed,
                outgoing.len()
            );
        }

        for child in self.children_sorted() {
            outgoing.extend(child.update_for_push(keys_to_update)?);
        }
        Ok(outgoing)
    }

    /// Read-only projection of `get`, usable as a downstream layer's
    /// upstream reader
    pub fn as_reader(self: &Rc<Self>) -> Reader<P> {
        Reader {
            env: Rc::clone(self),
        }
    }

    /// Record `dependent` as a reader of `key`
    ///
    /// Dependency tables are per level and shared: an overlay resolves
    /// through its parent so that base-stack propagation sees reads made
    /// under the overlay.
    fn record_dependent(&self, key: &str, dependent: &str) {
        if let Some(link) = &self.overlay {
            if let Some(parent) = link.parent() {
                parent.record_dependent(key, dependent);
            }
            return;
        }
        self.dependents
            .borrow_mut()
            .entry(key.to_string())
            .or_default()
            .insert(dependent.to_string());
    }

    /// Recorded dependents of `key` at this level, sorted
    pub fn dependents_of(&self, key: &str) -> BTreeSet<String> {
        if let Some(link) = &self.overlay {
            return link
                .parent()
                .map(|parent| parent.dependents_of(key))
                .unwrap_or_default();
        }
        self.dependents
            .borrow()
            .get(key)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn has_dependents(&self, key: &str) -> bool {
        if let Some(link) = &self.overlay {
            return link.parent().is_some_and(|parent| parent.has_dependents(key));
        }
        self.dependents
            .borrow()
            .get(key)
            .is_some_and(|set| !set.is_empty())
    }

    /// Sorted snapshot of the keys cached in this table
    pub fn cached_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.cache.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Statistics for this table
    pub fn stats(&self) -> LayerStats {
        let dependency_edges = if self.overlay.is_some() {
            // The dependency table lives on the parent.
            0
        } else {
            self.dependents.borrow().values().map(|set| set.len()).sum()
        };
        LayerStats {
            layer: P::NAME,
            cached_keys: self.cache.borrow().len(),
            dependency_edges,
            overlay_children: self.children.borrow().len(),
        }
    }

    /// Overlay children in module-name order
    fn children_sorted(&self) -> Vec<Rc<EnvTable<P>>> {
        let mut entries: Vec<(String, Rc<EnvTable<P>>)> = self
            .children
            .borrow()
            .iter()
            .map(|(module, child)| (module.clone(), Rc::clone(child)))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().map(|(_, child)| child).collect()
    }
}

impl<P: Produce> fmt::Debug for EnvTable<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut children: Vec<String> = self.children.borrow().keys().cloned().collect();
        children.sort();
        f.debug_struct("EnvTable")
            .field("layer", &P::NAME)
            .field("overlay", &self.overlay_module())
            .field("cached_keys", &self.cache.borrow().len())
            .field("children", &children)
            .finish()
    }
}

/// Read-only view of a table
///
/// Cloning is cheap; all clones read the same table. Reads still record
/// dependencies - monotone growth of the dependency table is part of the
/// `get` contract, not a mutation of cached state.
pub struct Reader<P: Produce> {
    env: Rc<EnvTable<P>>,
}

impl<P: Produce> Reader<P> {
    /// Equivalent to [`EnvTable::get`]
    pub fn get(&self, key: &str, dependency: &str) -> Result<P::Value> {
        self.env.get(key, dependency)
    }
}

impl<P: Produce> Clone for Reader<P> {
    fn clone(&self) -> Self {
        Self {
            env: Rc::clone(&self.env),
        }
    }
}

impl<P: Produce> fmt::Debug for Reader<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reader").field(&P::NAME).finish()
    }
}

/// Statistics about one table
#[derive(Debug, Clone, Default)]
pub struct LayerStats {
    /// Layer name
    pub layer: &'static str,
    /// Number of cached values
    pub cached_keys: usize,
    /// Total dependency edges recorded at this level (0 for overlays; the
    /// table lives on the parent)
    pub dependency_edges: usize,
    /// Number of overlay children
    pub overlay_children: usize,
}
