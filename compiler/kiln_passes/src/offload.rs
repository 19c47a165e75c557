//! Offloading: splitting a module into separately dispatched sub-modules.
//!
//! The root block is cut at every parallel range loop, vertex loop and
//! fragment loop. Each such loop becomes one sub-module holding the loop
//! body; runs of other root statements become serial sub-modules. A serial
//! run with no statement that has an effect (only constants, argument loads
//! and arithmetic feeding later dispatches) is not emitted. Sub-modules keep
//! referring to the parent module's arena.

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{Block, BlockSlot, ConstValue, Module, StmtId, StmtKind};

use crate::die::has_effect;

/// How a sub-module is dispatched.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OffloadKind {
    /// One invocation.
    Serial,
    /// One invocation per loop iteration.
    Compute,
    Vertex,
    Fragment,
}

/// Number of invocations of a compute sub-module.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum TripCount {
    Const(u32),
    /// Read from this slot of the global-temporaries buffer at dispatch.
    GlobalTemporary(u32),
}

/// One dispatch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OffloadedModule {
    pub kind: OffloadKind,
    pub block: Block,
    /// The dispatched loop, whose `LoopIndex` becomes the invocation index.
    pub loop_stmt: Option<StmtId>,
    pub trip_count: Option<TripCount>,
}

impl OffloadedModule {
    fn serial(block: Block) -> Self {
        OffloadedModule {
            kind: OffloadKind::Serial,
            block,
            loop_stmt: None,
            trip_count: None,
        }
    }
}

fn trip_count(module: &Module, range: StmtId) -> CompileResult<TripCount> {
    match module.kind(range) {
        StmtKind::Const(ConstValue::I32(n)) => Ok(TripCount::Const(u32::try_from(*n).unwrap_or(0))),
        StmtKind::GlobalTemporary { offset } => Ok(TripCount::GlobalTemporary(*offset)),
        other => Err(CompileError::internal(format!(
            "parallel loop range is a {} statement; expected a constant or a global temporary",
            other.name()
        ))),
    }
}

fn flush_serial(module: &Module, serial: &mut Block, out: &mut Vec<OffloadedModule>) {
    let block = std::mem::take(serial);
    if block.stmts.iter().any(|&id| has_effect(module.kind(id))) {
        out.push(OffloadedModule::serial(block));
    }
}

fn body(module: &Module, id: StmtId) -> Block {
    module.block(BlockSlot::Body(id)).cloned().unwrap_or_default()
}

/// Split `module` into dispatches.
pub fn offload(module: &Module) -> CompileResult<Vec<OffloadedModule>> {
    let mut out = Vec::new();
    let mut serial = Block::new();

    for &id in &module.root.stmts {
        let offloaded = match module.kind(id) {
            StmtKind::RangeFor {
                is_parallel: true, ..
            } => {
                let range = module.stmt(id).operand(0).ok_or_else(|| {
                    CompileError::internal("range loop without a range operand")
                })?;
                OffloadedModule {
                    kind: OffloadKind::Compute,
                    block: body(module, id),
                    loop_stmt: Some(id),
                    trip_count: Some(trip_count(module, range)?),
                }
            }
            StmtKind::VertexFor { .. } => OffloadedModule {
                kind: OffloadKind::Vertex,
                block: body(module, id),
                loop_stmt: Some(id),
                trip_count: None,
            },
            StmtKind::FragmentFor { .. } => OffloadedModule {
                kind: OffloadKind::Fragment,
                block: body(module, id),
                loop_stmt: Some(id),
                trip_count: None,
            },
            _ => {
                serial.stmts.push(id);
                continue;
            }
        };
        flush_serial(module, &mut serial, &mut out);
        out.push(offloaded);
    }
    flush_serial(module, &mut serial, &mut out);

    tracing::debug!(modules = out.len(), "offloaded");
    Ok(out)
}
