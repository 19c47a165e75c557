//! Deterministic text dump of a module.
//!
//! ```text
//! %0 : i32 = const 16
//! %1: range_for %0 parallel {
//!   %2 : i32 = loop_index %1
//!   ...
//! }
//! ```

use std::fmt::Write;

use crate::module::{Block, BlockSlot, Module};
use crate::stmt::{ConstValue, Stmt, StmtId, StmtKind};

const INDENT: &str = "  ";

/// Print the whole module.
pub fn print_module(module: &Module) -> String {
    print_block(module, &module.root)
}

/// Print one block (and its nested blocks) of `module`.
pub fn print_block(module: &Module, block: &Block) -> String {
    let mut out = String::new();
    write_block(module, block, 0, &mut out);
    out
}

fn write_block(module: &Module, block: &Block, depth: usize, out: &mut String) {
    for &id in &block.stmts {
        write_stmt(module, id, depth, out);
    }
}

fn operands(stmt: &Stmt) -> String {
    stmt.operands
        .iter()
        .map(|op| format!("%{}", op.raw()))
        .collect::<Vec<_>>()
        .join(", ")
}

fn write_stmt(module: &Module, id: StmtId, depth: usize, out: &mut String) {
    let stmt = module.stmt(id);
    let pad = INDENT.repeat(depth);
    let ops = operands(stmt);

    let head = match &stmt.kind {
        StmtKind::Const(ConstValue::I32(v)) => format!("const {v}"),
        StmtKind::Const(ConstValue::F32(v)) => format!("const {v:?}"),
        StmtKind::RangeFor {
            strictly_serialize,
            is_parallel,
            ..
        } => {
            let mode = if *is_parallel {
                "parallel"
            } else if *strictly_serialize {
                "serial strict"
            } else {
                "serial"
            };
            format!("range_for {ops} {mode}")
        }
        StmtKind::GlobalPtr {
            field,
            offset_in_element,
        } => format!(
            "global_ptr field#{}[{ops}] +{offset_in_element}",
            field.id.raw()
        ),
        StmtKind::GlobalTemporary { offset } => format!("global_tmp @{offset}"),
        StmtKind::Binary(op) => format!("binary {op} {ops}"),
        StmtKind::Unary(op) => format!("unary {op} {ops}"),
        StmtKind::AtomicOp(op) => format!("atomic_op {op} {ops}"),
        StmtKind::ArgLoad { arg_id } => format!("arg_load #{arg_id}"),
        StmtKind::VertexInput { location }
        | StmtKind::FragmentInput { location } => {
            format!("{} @{location}", stmt.kind.name())
        }
        StmtKind::VertexOutput { location } => format!("vertex_output @{location} {ops}"),
        StmtKind::BuiltInOutput(kind) => format!("builtin_output {kind:?} {ops}"),
        StmtKind::BuiltInInput(kind) => format!("builtin_input {kind:?}"),
        StmtKind::FragmentDerivative(dir) => format!("fragment_derivative {dir:?} {ops}"),
        StmtKind::TextureFunction { texture, kind, .. } => format!(
            "texture_function {} tex#{} {ops}",
            kind.as_str(),
            texture.id.raw()
        ),
        StmtKind::CompositeExtract { element_index } => {
            format!("composite_extract {ops}.{element_index}")
        }
        StmtKind::If { .. } => format!("if {ops}"),
        other if ops.is_empty() => other.name().to_owned(),
        other => format!("{} {ops}", other.name()),
    };

    if stmt.kind.has_blocks() {
        let _ = write!(out, "{pad}%{}: {head} {{", id.raw());
        let slots = module.slots_of(id);
        for (i, slot) in slots.iter().enumerate() {
            if i > 0 {
                let _ = write!(out, "{pad}}} else {{");
            }
            out.push('\n');
            if let Some(block) = module.block(*slot) {
                write_block(module, block, depth + 1, out);
            }
            if matches!(slot, BlockSlot::Then(_)) && else_is_empty(module, id) {
                break;
            }
        }
        let _ = writeln!(out, "{pad}}}");
        return;
    }

    match stmt.return_type {
        Some(ty) if stmt.kind.is_pointer() => {
            let _ = writeln!(out, "{pad}%{} : ptr<{ty}> = {head}", id.raw());
        }
        Some(ty) => {
            let _ = writeln!(out, "{pad}%{} : {ty} = {head}", id.raw());
        }
        None => {
            let _ = writeln!(out, "{pad}{head}");
        }
    }
}

fn else_is_empty(module: &Module, id: StmtId) -> bool {
    module
        .block(BlockSlot::Else(id))
        .map_or(true, Block::is_empty)
}
