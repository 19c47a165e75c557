//! Execution of offloaded sub-modules.
//!
//! Serial sub-modules run once. Compute sub-modules run one invocation per
//! iteration, in index order, each with its own statement values and
//! locals; buffers are shared. Vertex and fragment sub-modules have no
//! reference semantics here and are rejected.

use rustc_hash::FxHashMap;

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{Block, BlockSlot, Module, StmtId, StmtKind};
use kiln_passes::{OffloadKind, OffloadedModule, TripCount};
use kiln_types::PrimitiveType;

use crate::device::Device;
use crate::operators::{evaluate_atomic, evaluate_binary, evaluate_unary, Scalar};

/// Run every sub-module of `offloaded`, in order, against `device`.
pub fn execute(
    module: &Module,
    offloaded: &[OffloadedModule],
    device: &mut Device,
) -> CompileResult<()> {
    for (index, sub) in offloaded.iter().enumerate() {
        let _span = tracing::debug_span!("execute", index, kind = ?sub.kind).entered();
        match sub.kind {
            OffloadKind::Serial => {
                Invocation::new(module, device, 0, None).run(&sub.block)?;
            }
            OffloadKind::Compute => {
                let trips = trip_count(sub, device)?;
                let loop_stmt = sub.loop_stmt.ok_or_else(|| {
                    CompileError::internal("compute sub-module without a dispatched loop")
                })?;
                tracing::debug!(invocations = trips, "compute dispatch");
                for ii in 0..trips {
                    let id = u32::try_from(ii).unwrap_or(u32::MAX);
                    Invocation::new(module, device, id, Some((loop_stmt, ii))).run(&sub.block)?;
                }
            }
            OffloadKind::Vertex | OffloadKind::Fragment => {
                return Err(CompileError::internal(
                    "vertex and fragment sub-modules cannot be executed on the host",
                ));
            }
        }
    }
    Ok(())
}

fn trip_count(sub: &OffloadedModule, device: &Device) -> CompileResult<i32> {
    match sub.trip_count {
        Some(TripCount::Const(n)) => Ok(i32::try_from(n).unwrap_or(i32::MAX)),
        Some(TripCount::GlobalTemporary(offset)) => {
            let slot = usize::try_from(offset).unwrap_or(usize::MAX);
            device.gtemps.get(slot).copied().ok_or_else(|| {
                CompileError::internal(format!("trip count slot {offset} is out of bounds"))
            })
        }
        None => Err(CompileError::internal("compute sub-module without a trip count")),
    }
}

/// How a block ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

/// Which buffer a global address lives in.
#[derive(Copy, Clone, Debug)]
enum Buffer {
    Root(kiln_ir::TreeId),
    GlobalTemporaries,
}

struct Invocation<'a> {
    module: &'a Module,
    device: &'a mut Device,
    id: u32,
    /// The dispatched loop and this invocation's iteration.
    dispatched: Option<(StmtId, i32)>,
    values: FxHashMap<StmtId, Scalar>,
    locals: FxHashMap<StmtId, Scalar>,
    loop_indices: FxHashMap<StmtId, i32>,
}

impl<'a> Invocation<'a> {
    fn new(
        module: &'a Module,
        device: &'a mut Device,
        id: u32,
        dispatched: Option<(StmtId, i32)>,
    ) -> Self {
        Invocation {
            module,
            device,
            id,
            dispatched,
            values: FxHashMap::default(),
            locals: FxHashMap::default(),
            loop_indices: FxHashMap::default(),
        }
    }

    fn run(mut self, block: &Block) -> CompileResult<()> {
        match self.exec_block(block)? {
            Flow::Normal => Ok(()),
            flow => Err(CompileError::internal(format!(
                "{flow:?} outside of a loop"
            ))),
        }
    }

    fn exec_block(&mut self, block: &Block) -> CompileResult<Flow> {
        for &id in &block.stmts {
            let flow = self.exec_stmt(id)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn nested(&mut self, slot: BlockSlot) -> CompileResult<Flow> {
        let module = self.module;
        let block = module
            .block(slot)
            .ok_or_else(|| CompileError::internal(format!("missing block {slot:?}")))?;
        self.exec_block(block)
    }

    // ── Values ──────────────────────────────────────────────────────

    fn operand(&self, id: StmtId, index: usize) -> CompileResult<StmtId> {
        self.module.stmt(id).operand(index).ok_or_else(|| {
            CompileError::internal(format!(
                "{} statement {} is missing operand {index}",
                self.module.kind(id).name(),
                id.raw()
            ))
        })
    }

    fn value_type(&self, id: StmtId) -> CompileResult<PrimitiveType> {
        self.module.return_type(id).ok_or_else(|| {
            CompileError::internal(format!(
                "{} statement {} has no value type",
                self.module.kind(id).name(),
                id.raw()
            ))
        })
    }

    /// The value statement `id` produced in this invocation. Constants
    /// defined outside the sub-module are read from the arena.
    fn value(&self, id: StmtId) -> CompileResult<Scalar> {
        if let Some(&value) = self.values.get(&id) {
            return Ok(value);
        }
        match self.module.kind(id) {
            StmtKind::Const(value) => Ok(Scalar::from(*value)),
            other => Err(CompileError::internal(format!(
                "{} statement {} is used before it is defined",
                other.name(),
                id.raw()
            ))),
        }
    }

    fn operand_value(&self, id: StmtId, index: usize) -> CompileResult<Scalar> {
        self.value(self.operand(id, index)?)
    }

    fn define(&mut self, id: StmtId, value: Scalar) {
        self.values.insert(id, value);
    }

    // ── Statements ──────────────────────────────────────────────────

    fn exec_stmt(&mut self, id: StmtId) -> CompileResult<Flow> {
        let module = self.module;
        match module.kind(id) {
            StmtKind::Const(value) => self.define(id, Scalar::from(*value)),
            StmtKind::Binary(op) => {
                let lhs = self.operand_value(id, 0)?;
                let rhs = self.operand_value(id, 1)?;
                let result = evaluate_binary(*op, lhs, rhs, self.value_type(id)?);
                self.define(id, result);
            }
            StmtKind::Unary(op) => {
                let operand = self.operand_value(id, 0)?;
                let result = evaluate_unary(*op, operand, self.value_type(id)?);
                self.define(id, result);
            }

            StmtKind::RangeFor { .. } => return self.exec_range_for(id),
            StmtKind::LoopIndex => {
                let loop_stmt = self.operand(id, 0)?;
                let index = match self.dispatched {
                    Some((dispatched, ii)) if dispatched == loop_stmt => ii,
                    _ => *self.loop_indices.get(&loop_stmt).ok_or_else(|| {
                        CompileError::internal("loop index outside of its loop")
                    })?,
                };
                self.define(id, Scalar::I32(index));
            }
            StmtKind::While { .. } => loop {
                if self.nested(BlockSlot::Body(id))? == Flow::Break {
                    break;
                }
            },
            StmtKind::If { .. } => {
                let cond = self.operand_value(id, 0)?;
                let slot = if cond.is_true() {
                    BlockSlot::Then(id)
                } else {
                    BlockSlot::Else(id)
                };
                return self.nested(slot);
            }
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),

            StmtKind::ArgLoad { arg_id } => {
                let prim = self.value_type(id)?;
                let slot = usize::try_from(*arg_id).unwrap_or(usize::MAX);
                let word = self.device.args.get(slot).copied().ok_or_else(|| {
                    CompileError::internal(format!("argument {arg_id} was not provided"))
                })?;
                self.define(id, Scalar::from_word(word, prim));
            }
            StmtKind::Return => {
                let words = module
                    .stmt(id)
                    .operands
                    .iter()
                    .map(|&value| self.value(value).map(Scalar::to_word))
                    .collect::<CompileResult<Vec<_>>>()?;
                if self.device.rets.len() < words.len() {
                    self.device.rets.resize(words.len(), 0);
                }
                self.device.rets[..words.len()].copy_from_slice(&words);
            }
            StmtKind::Rand => {
                let prim = self.value_type(id)?;
                let bits = self.next_random();
                let value = match prim {
                    PrimitiveType::I32 => Scalar::I32(i32::from_ne_bytes(bits.to_ne_bytes())),
                    #[expect(
                        clippy::cast_possible_truncation,
                        reason = "uniform f32 in [0, 1) from 32 random bits"
                    )]
                    PrimitiveType::F32 => Scalar::F32((f64::from(bits) / 4_294_967_296.0) as f32),
                };
                self.define(id, value);
            }

            StmtKind::Alloca => {
                let prim = self.value_type(id)?;
                self.locals.insert(id, Scalar::zero(prim));
            }
            StmtKind::LocalLoad => {
                let ptr = self.operand(id, 0)?;
                let value = *self.locals.get(&ptr).ok_or_else(|| {
                    CompileError::internal("local load from an unallocated variable")
                })?;
                self.define(id, value);
            }
            StmtKind::LocalStore => {
                let ptr = self.operand(id, 0)?;
                let prim = self.value_type(ptr)?;
                let value = self.operand_value(id, 1)?.cast(prim);
                self.locals.insert(ptr, value);
            }

            StmtKind::GlobalPtr { .. } | StmtKind::GlobalTemporary { .. } => {}
            StmtKind::GlobalLoad | StmtKind::GlobalTemporaryLoad | StmtKind::AtomicLoad => {
                let ptr = self.operand(id, 0)?;
                let value = self.read(ptr)?;
                self.define(id, value);
            }
            StmtKind::GlobalStore | StmtKind::GlobalTemporaryStore | StmtKind::AtomicStore => {
                let ptr = self.operand(id, 0)?;
                let value = self.operand_value(id, 1)?;
                self.write(ptr, value)?;
            }
            StmtKind::AtomicOp(op) => {
                let ptr = self.operand(id, 0)?;
                let operand = self.operand_value(id, 1)?;
                let old = self.read(ptr)?;
                self.write(ptr, evaluate_atomic(*op, old, operand))?;
                self.define(id, old);
            }

            other @ (StmtKind::VertexFor { .. }
            | StmtKind::FragmentFor { .. }
            | StmtKind::VertexInput { .. }
            | StmtKind::VertexOutput { .. }
            | StmtKind::FragmentInput { .. }
            | StmtKind::BuiltInOutput(_)
            | StmtKind::BuiltInInput(_)
            | StmtKind::FragmentDerivative(_)
            | StmtKind::Discard
            | StmtKind::TextureFunction { .. }
            | StmtKind::CompositeExtract { .. }) => {
                return Err(CompileError::internal(format!(
                    "{} statements cannot be executed on the host",
                    other.name()
                )));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec_range_for(&mut self, id: StmtId) -> CompileResult<Flow> {
        let end = self.operand_value(id, 0)?.as_i32();
        for i in 0..end {
            self.loop_indices.insert(id, i);
            if self.nested(BlockSlot::Body(id))? == Flow::Break {
                break;
            }
        }
        self.loop_indices.remove(&id);
        Ok(Flow::Normal)
    }

    // ── Memory ──────────────────────────────────────────────────────

    /// Buffer and word index of a global pointer or global temporary.
    fn address(&self, ptr: StmtId) -> CompileResult<(Buffer, usize)> {
        let stmt = self.module.stmt(ptr);
        match &stmt.kind {
            StmtKind::GlobalPtr {
                field,
                offset_in_element,
            } => {
                let indices = stmt
                    .operands
                    .iter()
                    .map(|&index| {
                        let index = self.value(index)?.as_i32();
                        Ok(u32::try_from(index).unwrap_or(u32::MAX))
                    })
                    .collect::<CompileResult<Vec<_>>>()?;
                let flat = field.flat_index(&indices).ok_or_else(|| {
                    CompileError::internal(format!("field index {indices:?} is out of bounds"))
                })?;
                let element = usize::try_from(flat).unwrap_or(usize::MAX);
                let base = usize::try_from(field.offset_bytes / 4).unwrap_or(usize::MAX);
                let word = base + element * field.element_primitives() + offset_in_element;
                Ok((Buffer::Root(field.tree), word))
            }
            StmtKind::GlobalTemporary { offset } => Ok((
                Buffer::GlobalTemporaries,
                usize::try_from(*offset).unwrap_or(usize::MAX),
            )),
            other => Err(CompileError::internal(format!(
                "global access through a {} statement",
                other.name()
            ))),
        }
    }

    fn slot(&mut self, ptr: StmtId) -> CompileResult<&mut i32> {
        let (buffer, word) = self.address(ptr)?;
        let words = match buffer {
            Buffer::Root(tree) => self.device.roots.get_mut(&tree).ok_or_else(|| {
                CompileError::internal(format!("no buffer for storage tree {}", tree.raw()))
            })?,
            Buffer::GlobalTemporaries => &mut self.device.gtemps,
        };
        words.get_mut(word).ok_or_else(|| {
            CompileError::internal(format!("word {word} is outside its buffer"))
        })
    }

    fn read(&mut self, ptr: StmtId) -> CompileResult<Scalar> {
        let prim = self.value_type(ptr)?;
        let word = *self.slot(ptr)?;
        Ok(Scalar::from_word(word, prim))
    }

    fn write(&mut self, ptr: StmtId, value: Scalar) -> CompileResult<()> {
        let prim = self.value_type(ptr)?;
        *self.slot(ptr)? = value.cast(prim).to_word();
        Ok(())
    }

    /// Xorshift128 keyed by invocation id, seeded like the generated
    /// shaders seed an all-zero state.
    fn next_random(&mut self) -> u32 {
        let id = self.id;
        let state = self.device.rand_state.entry(id).or_insert_with(|| {
            [
                123_456_789u32.wrapping_mul(id).wrapping_mul(1_000_000_007),
                362_436_069,
                521_288_629,
                88_675_123,
            ]
        });
        let [x, y, z, w] = *state;
        let t = x ^ (x << 11);
        let next = (w ^ (w >> 19)) ^ (t ^ (t >> 8));
        *state = [y, z, w, next];
        next.wrapping_mul(1_000_000_007)
    }
}

#[cfg(test)]
mod tests;
