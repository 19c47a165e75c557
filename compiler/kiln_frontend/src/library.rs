//! Host-registered library functions.
//!
//! Calls to a library function resolve before builtins and are inlined like
//! user functions. The registry is empty unless the embedder fills it.

use rustc_hash::FxHashMap;

use crate::oracle::ParsedFunction;

#[derive(Clone, Debug, Default)]
pub struct Library {
    functions: FxHashMap<String, ParsedFunction>,
}

impl Library {
    pub fn new() -> Self {
        Library::default()
    }

    /// Register `function` under `name`, replacing an earlier registration.
    pub fn register(&mut self, name: impl Into<String>, function: ParsedFunction) {
        self.functions.insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<&ParsedFunction> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}
