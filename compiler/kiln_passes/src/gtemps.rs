//! Global temporaries.
//!
//! Invocations of a dispatched loop do not share the serial code's locals.
//! This pass cuts the root block into *segments* (a run of serial
//! statements, or one parallel range loop, vertex loop or fragment loop) and
//! moves every value that crosses a segment boundary into a slot of the
//! global-temporaries buffer:
//!
//! - a parallel loop's non-constant trip count is stored to a slot right
//!   before the loop, and the loop's range operand becomes that slot;
//! - an `Alloca` used outside its segment becomes a `GlobalTemporary`, and
//!   its local loads and stores become global-temporary loads and stores;
//! - a `Const` or `ArgLoad` is re-emitted at the start of the consuming
//!   segment, a `GlobalPtr` is re-emitted with its indices imported;
//! - any other value is stored to a slot right after its definition and
//!   reloaded at the start of the consuming segment.
//!
//! Slot offsets count 32-bit words and are handed out in first-use order.

use rustc_hash::FxHashMap;
use smallvec::{smallvec, SmallVec};

use kiln_ir::{
    BlockSlot, BuilderHost, InsertGuard, IrBuilder, Module, Operands, StmtId, StmtKind,
    Transformer, rebuild_module,
};

/// What the pass did.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct GlobalTemporaryStats {
    /// Slots in use; the buffer needs `4 * slots` bytes.
    pub slots: u32,
    pub trip_counts: usize,
    pub promoted_allocas: usize,
    pub spilled_values: usize,
    pub rematerialized: usize,
}

type SegmentId = usize;

#[derive(Copy, Clone, Debug)]
enum SegmentStart {
    /// First root statement of a serial run.
    Serial(StmtId),
    /// A dispatched loop; the segment is its body.
    Dispatch(StmtId),
}

struct Segments {
    of: FxHashMap<StmtId, SegmentId>,
    starts: Vec<SegmentStart>,
}

fn is_dispatch(kind: &StmtKind) -> bool {
    matches!(
        kind,
        StmtKind::RangeFor {
            is_parallel: true,
            ..
        } | StmtKind::VertexFor { .. }
            | StmtKind::FragmentFor { .. }
    )
}

fn compute_segments(module: &Module) -> Segments {
    let mut of = FxHashMap::default();
    let mut starts = Vec::new();
    let mut serial_open = false;
    for &id in &module.root.stmts {
        if is_dispatch(module.kind(id)) {
            starts.push(SegmentStart::Dispatch(id));
            serial_open = false;
        } else if !serial_open {
            starts.push(SegmentStart::Serial(id));
            serial_open = true;
        }
        let segment = starts.len() - 1;
        of.insert(id, segment);
        for slot in module.slots_of(id) {
            if let Some(block) = module.block(slot) {
                for nested in module.reachable_from(block) {
                    of.insert(nested, segment);
                }
            }
        }
    }
    Segments { of, starts }
}

struct Planner<'m> {
    module: &'m mut Module,
    segments: Segments,
    next_slot: u32,
    promoted: FxHashMap<StmtId, u32>,
    spills: FxHashMap<StmtId, u32>,
    imports: FxHashMap<(StmtId, SegmentId), StmtId>,
    prologue: Vec<Vec<StmtId>>,
    after: FxHashMap<StmtId, SmallVec<[StmtId; 2]>>,
    stats: GlobalTemporaryStats,
}

impl Planner<'_> {
    fn allocate_slot(&mut self) -> u32 {
        let slot = self.next_slot;
        self.next_slot += 1;
        slot
    }

    fn promote(&mut self, alloca: StmtId) {
        if !self.promoted.contains_key(&alloca) {
            let slot = self.allocate_slot();
            self.promoted.insert(alloca, slot);
            self.stats.promoted_allocas += 1;
        }
    }

    fn spill_slot(&mut self, value: StmtId) -> u32 {
        if let Some(&slot) = self.spills.get(&value) {
            return slot;
        }
        let slot = self.allocate_slot();
        let prim = self.module.return_type(value);
        let ptr = self
            .module
            .alloc(StmtKind::GlobalTemporary { offset: slot }, SmallVec::new(), prim);
        let store = self
            .module
            .alloc(StmtKind::GlobalTemporaryStore, smallvec![ptr, value], None);
        self.after.entry(value).or_default().extend([ptr, store]);
        self.spills.insert(value, slot);
        self.stats.spilled_values += 1;
        slot
    }

    /// A statement in `segment` producing the same value as `value`.
    fn import(&mut self, value: StmtId, segment: SegmentId) -> StmtId {
        if self.segments.of.get(&value) == Some(&segment) {
            return value;
        }
        if let Some(&done) = self.imports.get(&(value, segment)) {
            return done;
        }
        let stmt = self.module.stmt(value).clone();
        let imported = match &stmt.kind {
            StmtKind::Const(_) | StmtKind::ArgLoad { .. } => {
                let id = self
                    .module
                    .alloc(stmt.kind.clone(), SmallVec::new(), stmt.return_type);
                self.prologue[segment].push(id);
                self.stats.rematerialized += 1;
                id
            }
            StmtKind::GlobalPtr { .. } => {
                let operands: Operands = stmt
                    .operands
                    .iter()
                    .map(|&index| self.import(index, segment))
                    .collect();
                let id = self
                    .module
                    .alloc(stmt.kind.clone(), operands, stmt.return_type);
                self.prologue[segment].push(id);
                id
            }
            _ => {
                let slot = self.spill_slot(value);
                let ptr = self.module.alloc(
                    StmtKind::GlobalTemporary { offset: slot },
                    SmallVec::new(),
                    stmt.return_type,
                );
                let load = self.module.alloc(
                    StmtKind::GlobalTemporaryLoad,
                    smallvec![ptr],
                    stmt.return_type,
                );
                self.prologue[segment].extend([ptr, load]);
                load
            }
        };
        if let Some(hint) = stmt.name_hint {
            self.module.set_name_hint(imported, hint);
        }
        self.imports.insert((value, segment), imported);
        imported
    }

    fn visit_uses(&mut self, id: StmtId) {
        let Some(&segment) = self.segments.of.get(&id) else {
            return;
        };
        if matches!(
            self.segments.starts[segment],
            SegmentStart::Dispatch(start) if start == id
        ) {
            return;
        }
        let operands = self.module.stmt(id).operands.clone();
        for (i, operand) in operands.into_iter().enumerate() {
            match self.segments.of.get(&operand) {
                Some(&defined) if defined != segment => {}
                _ => continue,
            }
            let kind = self.module.kind(operand);
            if matches!(kind, StmtKind::Alloca) {
                self.promote(operand);
            } else if !matches!(kind, StmtKind::GlobalTemporary { .. })
                && !kind.has_blocks()
                && self.module.return_type(operand).is_some()
            {
                let imported = self.import(operand, segment);
                self.module.stmt_mut(id).operands[i] = imported;
            }
        }
    }

    /// Turn promoted allocas into slots and their accesses into
    /// global-temporary accesses.
    fn rewrite_promoted(&mut self, order: &[StmtId]) {
        if self.promoted.is_empty() {
            return;
        }
        for &id in order {
            let through_promoted = self
                .module
                .stmt(id)
                .operand(0)
                .is_some_and(|ptr| self.promoted.contains_key(&ptr));
            if !through_promoted {
                continue;
            }
            let stmt = self.module.stmt_mut(id);
            let rewritten = match stmt.kind {
                StmtKind::LocalLoad => StmtKind::GlobalTemporaryLoad,
                StmtKind::LocalStore => StmtKind::GlobalTemporaryStore,
                _ => continue,
            };
            stmt.kind = rewritten;
        }
        for (&alloca, &offset) in &self.promoted {
            self.module.stmt_mut(alloca).kind = StmtKind::GlobalTemporary { offset };
        }
    }
}

/// Store every non-constant parallel trip count to a fresh slot.
fn hoist_trip_counts(module: &mut Module, next_slot: &mut u32) -> usize {
    let old_root = std::mem::take(&mut module.root);
    let mut hoisted = 0;
    for id in old_root.stmts {
        let is_parallel = matches!(
            module.kind(id),
            StmtKind::RangeFor {
                is_parallel: true,
                ..
            }
        );
        if is_parallel {
            if let Some(range) = module.stmt(id).operand(0) {
                if !matches!(module.kind(range), StmtKind::Const(_)) {
                    let slot = *next_slot;
                    *next_slot += 1;
                    let prim = module.return_type(range);
                    let ptr = module.alloc(
                        StmtKind::GlobalTemporary { offset: slot },
                        SmallVec::new(),
                        prim,
                    );
                    let store =
                        module.alloc(StmtKind::GlobalTemporaryStore, smallvec![ptr, range], None);
                    module.root.stmts.extend([ptr, store]);
                    module.stmt_mut(id).operands[0] = ptr;
                    hoisted += 1;
                }
            }
        }
        module.root.stmts.push(id);
    }
    hoisted
}

/// Re-emits the module with the planned prologues and spill stores.
struct Placement {
    builder: IrBuilder,
    serial_starts: FxHashMap<StmtId, SegmentId>,
    dispatch_starts: FxHashMap<StmtId, SegmentId>,
    prologue: Vec<Vec<StmtId>>,
    after: FxHashMap<StmtId, SmallVec<[StmtId; 2]>>,
}

impl BuilderHost for Placement {
    fn builder(&mut self) -> &mut IrBuilder {
        &mut self.builder
    }
}

impl Transformer for Placement {
    fn visit(&mut self, id: StmtId) {
        if let Some(&segment) = self.serial_starts.get(&id) {
            for &p in &self.prologue[segment] {
                self.builder.push_existing(p);
            }
        }
        if let Some(&segment) = self.dispatch_starts.get(&id) {
            self.builder.push_existing(id);
            let body = self.builder.module_mut().take_block(BlockSlot::Body(id));
            let prologue = self.prologue[segment].clone();
            let mut guard = InsertGuard::attach(self, BlockSlot::Body(id));
            for p in prologue {
                guard.builder.push_existing(p);
            }
            for &child in &body.stmts {
                guard.visit(child);
            }
        } else {
            self.keep(id);
        }
        if let Some(extra) = self.after.get(&id) {
            for &a in extra {
                self.builder.push_existing(a);
            }
        }
    }
}

/// Run the pass.
pub fn insert_global_temporaries(module: &mut Module) -> GlobalTemporaryStats {
    let mut next_slot = 0;
    let trip_counts = hoist_trip_counts(module, &mut next_slot);

    let segments = compute_segments(module);
    let segment_count = segments.starts.len();
    let order = module.reachable();
    let mut planner = Planner {
        module: &mut *module,
        segments,
        next_slot,
        promoted: FxHashMap::default(),
        spills: FxHashMap::default(),
        imports: FxHashMap::default(),
        prologue: vec![Vec::new(); segment_count],
        after: FxHashMap::default(),
        stats: GlobalTemporaryStats {
            trip_counts,
            ..GlobalTemporaryStats::default()
        },
    };
    for &id in &order {
        planner.visit_uses(id);
    }
    planner.rewrite_promoted(&order);

    let mut stats = planner.stats;
    stats.slots = planner.next_slot;
    let Planner {
        segments,
        prologue,
        after,
        ..
    } = planner;

    let mut serial_starts = FxHashMap::default();
    let mut dispatch_starts = FxHashMap::default();
    for (segment, start) in segments.starts.iter().enumerate() {
        match *start {
            SegmentStart::Serial(id) => serial_starts.insert(id, segment),
            SegmentStart::Dispatch(id) => dispatch_starts.insert(id, segment),
        };
    }

    let mut placement = Placement {
        builder: IrBuilder::from_module(std::mem::take(module)),
        serial_starts,
        dispatch_starts,
        prologue,
        after,
    };
    rebuild_module(&mut placement);
    *module = placement.builder.into_module();

    tracing::debug!(
        slots = stats.slots,
        trip_counts = stats.trip_counts,
        promoted = stats.promoted_allocas,
        spilled = stats.spilled_values,
        rematerialized = stats.rematerialized,
        "inserted global temporaries"
    );
    stats
}

#[cfg(test)]
mod tests;
