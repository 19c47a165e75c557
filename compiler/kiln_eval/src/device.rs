//! Host-side buffers a kernel runs against.

use rustc_hash::FxHashMap;

use kiln_ir::{Field, Program, TreeId};

use crate::operators::word_f32;

/// Default size of the global-temporaries buffer, matching the pass
/// pipeline's default.
const DEFAULT_GLOBAL_TEMPORARIES_BYTES: u32 = 65536;

/// Buffers of one simulated device, as 32-bit words.
#[derive(Clone, Debug, Default)]
pub struct Device {
    /// One root buffer per storage tree.
    pub roots: FxHashMap<TreeId, Vec<i32>>,
    pub gtemps: Vec<i32>,
    pub args: Vec<i32>,
    pub rets: Vec<i32>,
    /// Xorshift state per invocation id, created on first use.
    pub rand_state: FxHashMap<u32, [u32; 4]>,
}

impl Device {
    /// Zeroed buffers for every storage tree of `program`.
    pub fn new(program: &Program) -> Self {
        let roots = program
            .trees()
            .iter()
            .filter(|tree| tree.size_bytes > 0)
            .map(|tree| (tree.id, vec![0; words(tree.size_bytes)]))
            .collect();
        Device {
            roots,
            gtemps: vec![0; words(DEFAULT_GLOBAL_TEMPORARIES_BYTES)],
            ..Device::default()
        }
    }

    #[must_use]
    pub fn with_global_temporaries(mut self, bytes: u32) -> Self {
        self.gtemps = vec![0; words(bytes)];
        self
    }

    #[must_use]
    pub fn with_args(mut self, args: Vec<i32>) -> Self {
        self.args = args;
        self
    }

    /// The words backing `field`, row-major, primitives of an element
    /// adjacent.
    pub fn field_words(&self, field: &Field) -> Option<&[i32]> {
        let root = self.roots.get(&field.tree)?;
        root.get(field_range(field))
    }

    pub fn field_words_mut(&mut self, field: &Field) -> Option<&mut [i32]> {
        let root = self.roots.get_mut(&field.tree)?;
        root.get_mut(field_range(field))
    }

    /// Contents of an `f32` field.
    pub fn field_f32(&self, field: &Field) -> Option<Vec<f32>> {
        self.field_words(field)
            .map(|words| words.iter().copied().map(word_f32).collect())
    }
}

fn words(bytes: u32) -> usize {
    usize::try_from(bytes / 4).unwrap_or(usize::MAX)
}

fn field_range(field: &Field) -> std::ops::Range<usize> {
    let start = words(field.offset_bytes);
    start..start.saturating_add(words(field.size_bytes))
}
