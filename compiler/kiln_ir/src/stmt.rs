//! IR statements.
//!
//! A statement is a node in the arena-owned IR. Statements that produce a
//! value carry a primitive `return_type`; address statements (`Alloca`,
//! `GlobalPtr`, `GlobalTemporary`) carry the primitive they point to. Every reference to another
//! statement that generic rewriting must see lives in `operands`; the
//! [`StmtKind`] payload only holds data that is not a statement reference
//! (constants, field layout, operator, nested blocks).

use smallvec::SmallVec;

use kiln_types::PrimitiveType;

use crate::module::Block;
use crate::ops::{
    AtomicOpType, BinaryOpType, BuiltInInputKind, BuiltInOutputKind, DerivativeDirection,
    TextureFunctionKind, UnaryOpType,
};
use crate::program::{Field, Texture};

/// Index of a statement in its module's arena.
///
/// Ids are allocated sequentially and never reused, so they are stable
/// across passes and double as deterministic names.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct StmtId(u32);

impl StmtId {
    #[inline]
    pub const fn new(raw: u32) -> Self {
        StmtId(raw)
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

/// Operand list. Most statements have at most four operands.
pub type Operands = SmallVec<[StmtId; 4]>;

/// A compile-time constant.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ConstValue {
    I32(i32),
    F32(f32),
}

impl ConstValue {
    pub fn primitive(self) -> PrimitiveType {
        match self {
            ConstValue::I32(_) => PrimitiveType::I32,
            ConstValue::F32(_) => PrimitiveType::F32,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            ConstValue::I32(v) => f64::from(v),
            ConstValue::F32(v) => f64::from(v),
        }
    }
}

/// Statement kind and non-operand payload.
#[derive(Clone, Debug)]
pub enum StmtKind {
    Const(ConstValue),
    /// `for i in 0..range`. Operands: `[range]`.
    RangeFor {
        /// Must run sequentially (loops inside inlined functions, nested
        /// loops).
        strictly_serialize: bool,
        /// Set by the parallel-loop pass on eligible top-level loops.
        is_parallel: bool,
        body: Block,
    },
    /// The induction variable of a loop. Operands: `[loop]`.
    LoopIndex,
    Alloca,
    /// Operands: `[alloca]`.
    LocalLoad,
    /// Operands: `[alloca, value]`.
    LocalStore,
    /// Address of one primitive of a field element. Operands: one `i32`
    /// index per field dimension.
    GlobalPtr {
        field: Field,
        offset_in_element: usize,
    },
    /// Operands: `[global_ptr]`.
    GlobalLoad,
    /// Operands: `[global_ptr, value]`.
    GlobalStore,
    /// A slot in the global-temporaries buffer. `offset` counts 32-bit
    /// words.
    GlobalTemporary {
        offset: u32,
    },
    /// Operands: `[global_temporary]`.
    GlobalTemporaryLoad,
    /// Operands: `[global_temporary, value]`.
    GlobalTemporaryStore,
    /// Operands: `[lhs, rhs]`.
    Binary(BinaryOpType),
    /// Operands: `[operand]`.
    Unary(UnaryOpType),
    While {
        body: Block,
    },
    /// Operands: `[cond]`.
    If {
        then_block: Block,
        else_block: Block,
    },
    /// Leaves the innermost `while`.
    Break,
    Continue,
    ArgLoad {
        arg_id: u32,
    },
    Rand,
    /// Operands: the returned primitives.
    Return,
    /// Operands: `[dest, operand]`. Produces the old value.
    AtomicOp(AtomicOpType),
    /// Operands: `[ptr]`.
    AtomicLoad,
    /// Operands: `[ptr, value]`.
    AtomicStore,
    VertexFor {
        body: Block,
    },
    FragmentFor {
        body: Block,
    },
    VertexInput {
        location: u32,
    },
    /// Operands: `[value]`.
    VertexOutput {
        location: u32,
    },
    FragmentInput {
        location: u32,
    },
    /// Operands: the output components.
    BuiltInOutput(BuiltInOutputKind),
    BuiltInInput(BuiltInInputKind),
    /// Operands: `[value]`.
    FragmentDerivative(DerivativeDirection),
    Discard,
    /// Operands: `coords_count` coordinates followed by the extra operands
    /// (lod for `SampleLod`, four value components for `Store`).
    TextureFunction {
        texture: Texture,
        kind: TextureFunctionKind,
        coords_count: usize,
    },
    /// Component of a composite result. Operands: `[composite]`.
    CompositeExtract {
        element_index: usize,
    },
}

impl StmtKind {
    pub fn name(&self) -> &'static str {
        match self {
            StmtKind::Const(_) => "const",
            StmtKind::RangeFor { .. } => "range_for",
            StmtKind::LoopIndex => "loop_index",
            StmtKind::Alloca => "alloca",
            StmtKind::LocalLoad => "local_load",
            StmtKind::LocalStore => "local_store",
            StmtKind::GlobalPtr { .. } => "global_ptr",
            StmtKind::GlobalLoad => "global_load",
            StmtKind::GlobalStore => "global_store",
            StmtKind::GlobalTemporary { .. } => "global_tmp",
            StmtKind::GlobalTemporaryLoad => "global_tmp_load",
            StmtKind::GlobalTemporaryStore => "global_tmp_store",
            StmtKind::Binary(_) => "binary",
            StmtKind::Unary(_) => "unary",
            StmtKind::While { .. } => "while",
            StmtKind::If { .. } => "if",
            StmtKind::Break => "break",
            StmtKind::Continue => "continue",
            StmtKind::ArgLoad { .. } => "arg_load",
            StmtKind::Rand => "rand",
            StmtKind::Return => "return",
            StmtKind::AtomicOp(_) => "atomic_op",
            StmtKind::AtomicLoad => "atomic_load",
            StmtKind::AtomicStore => "atomic_store",
            StmtKind::VertexFor { .. } => "vertex_for",
            StmtKind::FragmentFor { .. } => "fragment_for",
            StmtKind::VertexInput { .. } => "vertex_input",
            StmtKind::VertexOutput { .. } => "vertex_output",
            StmtKind::FragmentInput { .. } => "fragment_input",
            StmtKind::BuiltInOutput(_) => "builtin_output",
            StmtKind::BuiltInInput(_) => "builtin_input",
            StmtKind::FragmentDerivative(_) => "fragment_derivative",
            StmtKind::Discard => "discard",
            StmtKind::TextureFunction { .. } => "texture_function",
            StmtKind::CompositeExtract { .. } => "composite_extract",
        }
    }

    /// Statements that only compute an address; they are not values.
    pub fn is_pointer(&self) -> bool {
        matches!(
            self,
            StmtKind::Alloca | StmtKind::GlobalPtr { .. } | StmtKind::GlobalTemporary { .. }
        )
    }

    /// Statements owning nested blocks.
    pub fn has_blocks(&self) -> bool {
        matches!(
            self,
            StmtKind::RangeFor { .. }
                | StmtKind::While { .. }
                | StmtKind::If { .. }
                | StmtKind::VertexFor { .. }
                | StmtKind::FragmentFor { .. }
        )
    }
}

/// One IR statement.
#[derive(Clone, Debug)]
pub struct Stmt {
    pub id: StmtId,
    pub kind: StmtKind,
    pub operands: Operands,
    pub return_type: Option<PrimitiveType>,
    pub name_hint: Option<String>,
}

impl Stmt {
    #[inline]
    pub fn operand(&self, i: usize) -> Option<StmtId> {
        self.operands.get(i).copied()
    }

    /// Deterministic identifier used in generated code: `_{id}` or
    /// `_{id}_{hint}`.
    pub fn name(&self) -> String {
        match &self.name_hint {
            Some(hint) if !hint.is_empty() => format!("_{}_{}", self.id.raw(), hint),
            _ => format!("_{}", self.id.raw()),
        }
    }
}
