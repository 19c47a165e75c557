//! Host-side registry of fields, storage trees and textures.
//!
//! Kernels read and write *fields*: dense, row-major, multi-dimensional
//! arrays of a fixed element type. Fields are packed into *storage trees*;
//! each tree becomes one GPU buffer (the "root buffer" of that tree). The
//! registry only records layout. It never holds field data.
//!
//! New fields are appended to the current pending tree. The pending tree is
//! frozen by [`Program::materialize_current_tree`], which the kernel compiler
//! calls before compiling so that every field a kernel touches has a final
//! tree and size. A field that fragment shaders may write lives in a tree of
//! its own, materialized immediately.

use kiln_types::{PrimitiveType, Type};
use serde::Serialize;

/// Identifies a storage tree (one root buffer).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
pub struct TreeId(u32);

impl TreeId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        TreeId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identifies a field within its [`Program`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
pub struct FieldId(u32);

impl FieldId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        FieldId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// Identifies a texture within its [`Program`].
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[repr(transparent)]
pub struct TextureId(u32);

impl TextureId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        TextureId(raw)
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }
}

/// A set of fields backed by one GPU buffer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StorageTree {
    pub id: TreeId,
    pub size_bytes: u32,
    /// Whether fragment shaders may write into this tree.
    pub fragment_shader_writable: bool,
    /// Frozen: no more fields will be added.
    pub materialized: bool,
}

/// A dense field.
///
/// Equality is by id; the layout fields are fixed at creation.
#[derive(Clone, Debug, Serialize)]
pub struct Field {
    pub id: FieldId,
    pub tree: TreeId,
    /// Byte offset of element 0 within the tree's buffer.
    pub offset_bytes: u32,
    pub size_bytes: u32,
    pub dimensions: Vec<u32>,
    pub element_type: Type,
}

impl PartialEq for Field {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Field {}

impl std::hash::Hash for Field {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Field {
    /// Number of elements (product of the dimensions).
    pub fn num_elements(&self) -> u32 {
        self.dimensions.iter().product()
    }

    /// Primitives per element.
    pub fn element_primitives(&self) -> usize {
        self.element_type.num_primitives()
    }

    /// Primitive type at `offset_in_element` within one element.
    pub fn primitive_at(&self, offset_in_element: usize) -> Option<PrimitiveType> {
        self.element_type.primitives().get(offset_in_element).copied()
    }

    /// Row-major flat element index of a multi-dimensional index.
    ///
    /// Returns `None` when the index has the wrong arity or is out of bounds.
    pub fn flat_index(&self, index: &[u32]) -> Option<u32> {
        if index.len() != self.dimensions.len() {
            return None;
        }
        let mut flat = 0u32;
        for (i, dim) in index.iter().zip(&self.dimensions) {
            if i >= dim {
                return None;
            }
            flat = flat * dim + i;
        }
        Some(flat)
    }
}

/// Layout options for [`Program::create_field`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldOptions {
    /// Place the field in its own tree that fragment shaders may write.
    pub fragment_shader_writable: bool,
}

/// Texture dimensionality.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TextureDimensionality {
    Dim2d,
    Dim3d,
    Cube,
}

impl TextureDimensionality {
    /// Number of coordinate components used to address a texel.
    pub fn coords_components(self) -> usize {
        match self {
            TextureDimensionality::Dim2d => 2,
            TextureDimensionality::Dim3d | TextureDimensionality::Cube => 3,
        }
    }
}

/// What a texture is used as.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum TextureKind {
    /// Sampled or storage color texture with a WebGPU format string.
    Color { format: String },
    /// The presentation surface of a canvas.
    Canvas { format: String },
    Depth,
}

/// A texture handle.
#[derive(Clone, Debug, Serialize)]
pub struct Texture {
    pub id: TextureId,
    pub dimensionality: TextureDimensionality,
    pub kind: TextureKind,
    pub sample_count: u32,
}

impl PartialEq for Texture {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Texture {}

impl std::hash::Hash for Texture {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Texture {
    pub fn is_depth(&self) -> bool {
        matches!(self.kind, TextureKind::Depth)
    }

    /// WebGPU format string. Depth textures use `depth32float`.
    pub fn format(&self) -> &str {
        match &self.kind {
            TextureKind::Color { format } | TextureKind::Canvas { format } => format,
            TextureKind::Depth => "depth32float",
        }
    }

    pub fn coords_components(&self) -> usize {
        self.dimensionality.coords_components()
    }
}

/// The registry.
#[derive(Clone, Debug)]
pub struct Program {
    trees: Vec<StorageTree>,
    fields: Vec<Field>,
    textures: Vec<Texture>,
    pending: TreeId,
}

impl Default for Program {
    fn default() -> Self {
        Program::new()
    }
}

impl Program {
    pub fn new() -> Self {
        Program {
            trees: vec![StorageTree {
                id: TreeId::new(0),
                size_bytes: 0,
                fragment_shader_writable: false,
                materialized: false,
            }],
            fields: Vec::new(),
            textures: Vec::new(),
            pending: TreeId::new(0),
        }
    }

    fn next_tree_id(&self) -> TreeId {
        TreeId::new(u32::try_from(self.trees.len()).unwrap_or(u32::MAX))
    }

    /// Allocate a dense field of `element_type` with the given extents.
    pub fn create_field(
        &mut self,
        element_type: Type,
        dimensions: Vec<u32>,
        options: FieldOptions,
    ) -> Field {
        let elements: u32 = dimensions.iter().product();
        let element_bytes = u32::try_from(element_type.num_primitives()).unwrap_or(u32::MAX) * 4;
        let size_bytes = element_bytes.saturating_mul(elements);

        let tree = if options.fragment_shader_writable {
            let id = self.next_tree_id();
            self.trees.push(StorageTree {
                id,
                size_bytes: 0,
                fragment_shader_writable: true,
                materialized: false,
            });
            id
        } else {
            self.pending
        };

        let tree_entry = &mut self.trees[tree.index()];
        let offset_bytes = tree_entry.size_bytes;
        tree_entry.size_bytes += size_bytes;
        if options.fragment_shader_writable {
            tree_entry.materialized = true;
        }

        let field = Field {
            id: FieldId::new(u32::try_from(self.fields.len()).unwrap_or(u32::MAX)),
            tree,
            offset_bytes,
            size_bytes,
            dimensions,
            element_type,
        };
        tracing::debug!(
            field = field.id.raw(),
            tree = tree.raw(),
            offset = offset_bytes,
            size = size_bytes,
            "created field"
        );
        self.fields.push(field.clone());
        field
    }

    /// Freeze the pending tree and open a new one. No-op when the pending
    /// tree holds no fields.
    pub fn materialize_current_tree(&mut self) {
        let pending = &mut self.trees[self.pending.index()];
        if pending.size_bytes == 0 {
            return;
        }
        pending.materialized = true;
        let next = self.next_tree_id();
        self.trees.push(StorageTree {
            id: next,
            size_bytes: 0,
            fragment_shader_writable: false,
            materialized: false,
        });
        self.pending = next;
    }

    pub fn create_texture(
        &mut self,
        dimensionality: TextureDimensionality,
        kind: TextureKind,
        sample_count: u32,
    ) -> Texture {
        let texture = Texture {
            id: TextureId::new(u32::try_from(self.textures.len()).unwrap_or(u32::MAX)),
            dimensionality,
            kind,
            sample_count,
        };
        self.textures.push(texture.clone());
        texture
    }

    pub fn tree(&self, id: TreeId) -> Option<&StorageTree> {
        self.trees.get(id.index())
    }

    pub fn trees(&self) -> &[StorageTree] {
        &self.trees
    }

    pub fn field(&self, id: FieldId) -> Option<&Field> {
        self.fields.get(id.raw() as usize)
    }

    pub fn texture(&self, id: TextureId) -> Option<&Texture> {
        self.textures.get(id.raw() as usize)
    }
}

#[cfg(test)]
mod tests;
