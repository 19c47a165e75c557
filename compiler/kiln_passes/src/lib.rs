//! Lowering passes and offloading.
//!
//! The compiling visitor produces one flat module written as if it ran on a
//! single thread. These passes make it correct when its parallel loops are
//! replicated across GPU invocations, then split it into dispatches:
//!
//! 1. [`identify_parallel_loops`]
//! 2. [`insert_global_temporaries`]
//! 3. [`demote_atomics`]
//! 4. [`promote_loads_stores_to_atomics`]
//! 5. [`fix_operand_types`]
//! 6. [`eliminate_dead_instructions`]
//! 7. [`offload`]
//!
//! [`run_pipeline`] runs them in that order.

mod atomics;
mod die;
mod fix_types;
mod gtemps;
mod offload;
mod parallel_loops;

#[cfg(test)]
mod test_helpers;

pub use atomics::{demote_atomics, promote_loads_stores_to_atomics};
pub use die::eliminate_dead_instructions;
pub use fix_types::fix_operand_types;
pub use gtemps::{insert_global_temporaries, GlobalTemporaryStats};
pub use offload::{offload, OffloadKind, OffloadedModule, TripCount};
pub use parallel_loops::identify_parallel_loops;

use kiln_diagnostic::{CompileError, CompileResult};
use kiln_ir::{print_module, Module};

/// Pipeline configuration.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PassOptions {
    /// Size of the global-temporaries buffer the runtime allocates.
    pub global_temporaries_bytes: u32,
    pub eliminate_dead_instructions: bool,
}

impl Default for PassOptions {
    fn default() -> Self {
        PassOptions {
            global_temporaries_bytes: 65536,
            eliminate_dead_instructions: true,
        }
    }
}

fn trace_ir(pass: &str, module: &Module) {
    if tracing::enabled!(tracing::Level::TRACE) {
        tracing::trace!(pass, ir = %print_module(module), "ir after pass");
    }
}

/// Run every pass over `module` and split it into dispatches.
pub fn run_pipeline(
    module: &mut Module,
    options: &PassOptions,
) -> CompileResult<Vec<OffloadedModule>> {
    let _span = tracing::debug_span!("passes").entered();

    identify_parallel_loops(module);
    trace_ir("identify_parallel_loops", module);

    let stats = insert_global_temporaries(module);
    trace_ir("insert_global_temporaries", module);
    let needed = u64::from(stats.slots) * 4;
    if needed > u64::from(options.global_temporaries_bytes) {
        return Err(CompileError::internal(format!(
            "kernel needs {needed} bytes of global temporaries, but only {} are available",
            options.global_temporaries_bytes
        )));
    }

    demote_atomics(module);
    trace_ir("demote_atomics", module);

    promote_loads_stores_to_atomics(module);
    trace_ir("promote_loads_stores_to_atomics", module);

    fix_operand_types(module);
    trace_ir("fix_operand_types", module);

    if options.eliminate_dead_instructions {
        eliminate_dead_instructions(module);
        trace_ir("eliminate_dead_instructions", module);
    }

    offload(module)
}
