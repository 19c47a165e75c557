//! Lazy declaration of buffers, textures and samplers, and the write
//! permissions of each shader stage.

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{StorageTree, Texture, TextureDimensionality, TreeId};

use super::WgslGenerator;
use crate::resource::{ResourceInfo, ResourceType};

impl WgslGenerator<'_> {
    fn next_binding(&self) -> u32 {
        u32::try_from(self.previous_stage.len() + self.bindings.len()).unwrap_or(u32::MAX)
    }

    fn binding_of(&self, info: ResourceInfo) -> u32 {
        self.bindings
            .get(info)
            .unwrap_or_else(|| self.next_binding())
    }

    pub(super) fn tree(&self, info: ResourceInfo) -> CompileResult<&StorageTree> {
        info.id
            .and_then(|id| self.program.tree(TreeId::new(id)))
            .ok_or_else(|| CompileError::internal(format!("{info:?} names no storage tree")))
    }

    /// Element count of a buffer, in 32-bit words (or rand states).
    fn element_count(&self, info: ResourceInfo) -> CompileResult<u32> {
        let count = match info.ty {
            ResourceType::Root | ResourceType::RootAtomic => self.tree(info)?.size_bytes.div_ceil(4),
            ResourceType::GlobalTmps | ResourceType::GlobalTmpsAtomic => {
                self.options.global_temporaries_bytes.div_ceil(4)
            }
            ResourceType::RandStates => self.options.rand_states,
            ResourceType::Args => self.arg_bytes.div_ceil(4),
            ResourceType::Rets => self.ret_bytes.div_ceil(4),
            ResourceType::Texture | ResourceType::Sampler | ResourceType::StorageTexture => {
                return Err(CompileError::internal(format!("{info:?} is not a buffer")));
            }
        };
        let count = count.max(1);
        if self.is_graphics() {
            Ok(count.next_multiple_of(4))
        } else {
            Ok(count)
        }
    }

    /// Name of the buffer variable for `info`, declaring it on first use.
    pub(super) fn buffer_name(&mut self, info: ResourceInfo) -> CompileResult<String> {
        let binding = self.binding_of(info);
        let (name, element_type) = match info.ty {
            ResourceType::Root => (format!("root_buffer_binding_{binding}"), "i32"),
            ResourceType::RootAtomic => {
                (format!("root_buffer_atomic_binding_{binding}"), "atomic<i32>")
            }
            ResourceType::GlobalTmps => ("global_tmps_".to_owned(), "i32"),
            ResourceType::GlobalTmpsAtomic => ("global_tmps_atomic_".to_owned(), "atomic<i32>"),
            ResourceType::RandStates => ("rand_states_".to_owned(), "RandState"),
            ResourceType::Args => ("args_".to_owned(), "i32"),
            ResourceType::Rets => ("rets_".to_owned(), "i32"),
            ResourceType::Texture | ResourceType::Sampler | ResourceType::StorageTexture => {
                return Err(CompileError::internal(format!("{info:?} is not a buffer")));
            }
        };
        if !self.bindings.contains(info) {
            let count = self.element_count(info)?;
            let access = if self.is_buffer_writable(info) {
                "read_write"
            } else {
                "read"
            };
            self.bindings.insert(info, binding);
            self.global_decls.emit_newline();
            self.global_decls.emit_line(0, &format!("struct {name}_type {{"));
            self.global_decls
                .emit_line(2, &format!("member : array<{element_type}, {count}>,"));
            self.global_decls.emit_line(0, "};");
            self.global_decls
                .emit_line(0, &format!("@group(0) @binding({binding})"));
            self.global_decls.emit_line(
                0,
                &format!("var<storage, {access}> {name} : {name}_type;"),
            );
        }
        Ok(name)
    }

    pub(super) fn buffer_member(&mut self, info: ResourceInfo) -> CompileResult<String> {
        Ok(format!("{}.member", self.buffer_name(info)?))
    }

    /// Whether the buffer is declared `read_write` in this stage.
    pub(super) fn is_buffer_writable(&self, info: ResourceInfo) -> bool {
        if self.is_vertex() {
            return false;
        }
        if self.is_fragment() {
            if self.previous_stage.iter().any(|b| b.info == info) {
                return false;
            }
            if info.ty.is_root() {
                return self
                    .tree(info)
                    .is_ok_and(|tree| tree.fragment_shader_writable);
            }
        }
        true
    }

    /// Reject a write this stage may not perform.
    pub(super) fn check_buffer_writable(&self, info: ResourceInfo) -> CompileResult<()> {
        if self.is_vertex() {
            return Err(if info.ty.is_global_temporaries() {
                CompileError::pipeline(
                    "a vertex shader is not allowed to write to global temporary variables",
                )
            } else if info.ty.is_root() {
                CompileError::pipeline("a vertex shader is not allowed to write to fields")
            } else {
                CompileError::internal(format!("vertex shader writes to {info:?}"))
            });
        }
        if !self.is_fragment() {
            return Ok(());
        }
        let read_by_vertex = self.previous_stage.iter().any(|b| b.info == info);
        if info.ty.is_global_temporaries() && read_by_vertex {
            return Err(CompileError::pipeline(
                "a fragment shader is not allowed to write to global temporary variables \
                 if its vertex shader reads any global temporary variable",
            ));
        }
        if info.ty.is_root() {
            let tree = self.tree(info)?;
            if !tree.fragment_shader_writable {
                return Err(CompileError::pipeline(
                    "a fragment shader can only write to fields created as fragment-shader-writable",
                ));
            }
            if read_by_vertex {
                return Err(CompileError::internal(
                    "a vertex shader read a fragment-shader-writable field",
                ));
            }
        }
        Ok(())
    }

    /// Reject a read this stage may not perform.
    pub(super) fn check_buffer_readable(&self, info: ResourceInfo) -> CompileResult<()> {
        if self.is_vertex() && info.ty.is_root() && self.tree(info)?.fragment_shader_writable {
            return Err(CompileError::pipeline(
                "a vertex shader cannot read from a field created as fragment-shader-writable",
            ));
        }
        Ok(())
    }

    // ── Textures ──

    /// Name of the texture variable, declaring it on first use. `storage`
    /// selects the write-only storage binding.
    pub(super) fn texture_name(
        &mut self,
        texture: &Texture,
        storage: bool,
    ) -> CompileResult<String> {
        let ty = if storage {
            ResourceType::StorageTexture
        } else {
            ResourceType::Texture
        };
        let info = ResourceInfo::with_id(ty, texture.id.raw());
        let binding = self.binding_of(info);
        let name = if storage {
            format!("storage_texture_binding_{binding}")
        } else {
            format!("texture_binding_{binding}")
        };
        if !self.bindings.contains(info) {
            let type_name = texture_type_name(texture, storage)?;
            self.bindings.insert(info, binding);
            self.declare_handle(&name, &type_name, binding);
        }
        Ok(name)
    }

    /// Name of the sampler paired with `texture`, declaring it on first use.
    pub(super) fn sampler_name(&mut self, texture: &Texture) -> String {
        let info = ResourceInfo::with_id(ResourceType::Sampler, texture.id.raw());
        let binding = self.binding_of(info);
        let name = format!("sampler_binding_{binding}");
        if !self.bindings.contains(info) {
            let type_name = if texture.is_depth() {
                "sampler_comparison"
            } else {
                "sampler"
            };
            self.bindings.insert(info, binding);
            self.declare_handle(&name, type_name, binding);
        }
        name
    }

    fn declare_handle(&mut self, name: &str, type_name: &str, binding: u32) {
        self.global_decls.emit_newline();
        self.global_decls
            .emit_line(0, &format!("@group(0) @binding({binding})"));
        self.global_decls
            .emit_line(0, &format!("var {name} : {type_name};"));
    }

    // ── Random numbers ──

    /// Declare the xorshift128 state buffer and the `rand_*` functions once.
    pub(super) fn declare_rand(&mut self) -> CompileResult<()> {
        if self.rand_declared {
            return Ok(());
        }
        self.rand_declared = true;
        self.global_decls.emit(RAND_STATE_STRUCT);
        let states = self.buffer_member(ResourceInfo::new(ResourceType::RandStates))?;
        self.global_decls
            .emit(&RAND_FUNCTIONS.replace("{states}", &states));
        Ok(())
    }
}

fn texture_type_name(texture: &Texture, storage: bool) -> CompileResult<String> {
    let depth = texture.is_depth();
    let name = match (texture.dimensionality, depth, storage) {
        (_, true, true) => {
            return Err(CompileError::pipeline(
                "depth textures cannot be written from a shader",
            ));
        }
        (TextureDimensionality::Dim2d, false, true) => {
            format!("texture_storage_2d<{}, write>", texture.format())
        }
        (TextureDimensionality::Dim3d, false, true) => {
            format!("texture_storage_3d<{}, write>", texture.format())
        }
        (TextureDimensionality::Cube, false, true) => {
            return Err(CompileError::pipeline(
                "cube textures cannot be written from a shader",
            ));
        }
        (TextureDimensionality::Dim2d, false, false) => "texture_2d<f32>".to_owned(),
        (TextureDimensionality::Dim3d, false, false) => "texture_3d<f32>".to_owned(),
        (TextureDimensionality::Cube, false, false) => "texture_cube<f32>".to_owned(),
        (TextureDimensionality::Dim2d, true, false) => {
            if texture.sample_count > 1 {
                "texture_depth_multisampled_2d".to_owned()
            } else {
                "texture_depth_2d".to_owned()
            }
        }
        (TextureDimensionality::Dim3d | TextureDimensionality::Cube, true, false) => {
            return Err(CompileError::pipeline(
                "depth textures must be two-dimensional",
            ));
        }
    };
    Ok(name)
}

const RAND_STATE_STRUCT: &str = "
struct RandState {
    x : u32,
    y : u32,
    z : u32,
    w : u32,
};
";

const RAND_FUNCTIONS: &str = "
fn rand_u32(id : u32) -> u32 {
    var state : RandState = {states}[id];
    if (state.x == 0u && state.y == 0u && state.z == 0u && state.w == 0u) {
        state.x = 123456789u * id * 1000000007u;
        state.y = 362436069u;
        state.z = 521288629u;
        state.w = 88675123u;
    }
    let t : u32 = state.x ^ (state.x << 11u);
    state.x = state.y;
    state.y = state.z;
    state.z = state.w;
    state.w = (state.w ^ (state.w >> 19u)) ^ (t ^ (t >> 8u));
    let result : u32 = state.w * 1000000007u;
    {states}[id] = state;
    return result;
}

fn rand_f32(id : u32) -> f32 {
    return f32(rand_u32(id)) * (1.0f / 4294967296.0f);
}

fn rand_i32(id : u32) -> i32 {
    return i32(rand_u32(id));
}
";
