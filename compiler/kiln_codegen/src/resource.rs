//! GPU resources a shader binds, and their binding points.

use rustc_hash::FxHashMap;
use serde::Serialize;

/// Kind of bound resource.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// The root buffer of a storage tree; `id` is the tree.
    Root,
    /// The same buffer viewed as `atomic<i32>`.
    RootAtomic,
    GlobalTmps,
    GlobalTmpsAtomic,
    Args,
    /// Per-invocation xorshift states.
    RandStates,
    Rets,
    /// A sampled texture; `id` is the texture.
    Texture,
    /// The sampler paired with a texture; `id` is the texture.
    Sampler,
    StorageTexture,
}

impl ResourceType {
    pub fn is_buffer(self) -> bool {
        !matches!(
            self,
            ResourceType::Texture | ResourceType::Sampler | ResourceType::StorageTexture
        )
    }

    pub fn is_root(self) -> bool {
        matches!(self, ResourceType::Root | ResourceType::RootAtomic)
    }

    pub fn is_global_temporaries(self) -> bool {
        matches!(
            self,
            ResourceType::GlobalTmps | ResourceType::GlobalTmpsAtomic
        )
    }

    pub fn is_atomic(self) -> bool {
        matches!(
            self,
            ResourceType::RootAtomic | ResourceType::GlobalTmpsAtomic
        )
    }
}

/// A resource, identified by kind and (for trees and textures) id.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceInfo {
    pub ty: ResourceType,
    pub id: Option<u32>,
}

impl ResourceInfo {
    pub const fn new(ty: ResourceType) -> Self {
        ResourceInfo { ty, id: None }
    }

    pub const fn with_id(ty: ResourceType, id: u32) -> Self {
        ResourceInfo { ty, id: Some(id) }
    }
}

/// A resource at a `@group(0) @binding(n)` slot.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct ResourceBinding {
    pub info: ResourceInfo,
    pub binding: u32,
}

/// Bindings of one shader in allocation order, at most one per resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceBindingMap {
    bindings: Vec<ResourceBinding>,
    index: FxHashMap<ResourceInfo, u32>,
}

impl ResourceBindingMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, info: ResourceInfo) -> Option<u32> {
        self.index.get(&info).copied()
    }

    pub fn contains(&self, info: ResourceInfo) -> bool {
        self.index.contains_key(&info)
    }

    /// Record `info` at `binding`. Returns `false`, leaving the map
    /// unchanged, if `info` is already bound.
    pub fn insert(&mut self, info: ResourceInfo, binding: u32) -> bool {
        if self.contains(info) {
            return false;
        }
        self.index.insert(info, binding);
        self.bindings.push(ResourceBinding { info, binding });
        true
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn bindings(&self) -> &[ResourceBinding] {
        &self.bindings
    }

    pub fn into_bindings(self) -> Vec<ResourceBinding> {
        self.bindings
    }
}
