//! Compiled-kernel cache.
//!
//! A kernel is identified by the function it was compiled from plus the
//! template arguments bound at the call. The cache is an ordinary value the
//! embedder owns; there is no process-wide registry.

use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use kiln_codegen::KernelParams;
use kiln_diagnostic::CompileResult;
use kiln_frontend::{HostKey, HostValue, ParsedFunction};
use kiln_syntax::{NodeId, SyntaxTree};

/// Identity of a kernel function: its syntax tree and root node.
///
/// The key holds the tree alive, so identities are never reused while an
/// entry exists.
#[derive(Clone, Debug)]
pub struct KernelKey {
    tree: Rc<SyntaxTree>,
    root: NodeId,
}

impl KernelKey {
    pub fn of(function: &ParsedFunction) -> Self {
        KernelKey {
            tree: Rc::clone(&function.tree),
            root: function.root,
        }
    }
}

impl PartialEq for KernelKey {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.tree, &other.tree) && self.root == other.root
    }
}

impl Eq for KernelKey {}

impl Hash for KernelKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.tree).hash(state);
        self.root.hash(state);
    }
}

/// Full cache key: the kernel plus its template arguments, by name.
pub type CacheKey = (KernelKey, Vec<(String, HostKey)>);

#[derive(Debug, Default)]
pub struct KernelCache {
    entries: FxHashMap<CacheKey, Arc<KernelParams>>,
}

impl KernelCache {
    pub fn new() -> Self {
        KernelCache::default()
    }

    /// The compiled kernel for `kernel` and `template_args`, compiling it
    /// with `compile` on a miss. A failed compile is returned and not
    /// remembered.
    pub fn get_or_compile<F>(
        &mut self,
        kernel: KernelKey,
        template_args: &[(String, HostValue)],
        compile: F,
    ) -> CompileResult<Arc<KernelParams>>
    where
        F: FnOnce() -> CompileResult<KernelParams>,
    {
        let key = (
            kernel,
            template_args
                .iter()
                .map(|(name, value)| (name.clone(), value.cache_key()))
                .collect(),
        );
        if let Some(params) = self.entries.get(&key) {
            tracing::debug!(entries = self.entries.len(), "kernel cache hit");
            return Ok(Arc::clone(params));
        }
        let params = Arc::new(compile()?);
        self.entries.insert(key, Arc::clone(&params));
        tracing::debug!(entries = self.entries.len(), "kernel cache miss");
        Ok(params)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
