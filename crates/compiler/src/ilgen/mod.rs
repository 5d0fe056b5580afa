//! AST -> IL generation
//!
//! Lowering is arranged as layered responsibilities, one submodule each:
//!
//! - `module.rs`: module layer - globals, maps, externs, stub intrinsics
//! - `functions.rs`: declaration layer - parameter registers, local
//!   pre-allocation, implicit returns
//! - `statements.rs`: statement layer - control-flow shapes, terminators,
//!   the loop-context stack
//! - `expressions.rs`: expression layer - one result register per value
//! - `state.rs`: the `ILGen` struct and block/register plumbing
//!
//! Functions in a recursion cycle are never lowered; the backend's static
//! frame allocation depends on the call graph being acyclic. After
//! lowering, each function is structurally validated and (by default)
//! converted to SSA form.

mod expressions;
mod functions;
mod module;
mod state;
mod statements;

pub use state::ILGen;

use crate::ast::{MetadataStore, Program, Span};
use crate::call_graph::CallGraph;
use crate::config::{GenOptions, TargetConfig};
use crate::diagnostics::{Code, Diagnostics};
use crate::il::{validate_cfg, ILModule};
use crate::ssa::{construct_ssa, SsaStats};
use crate::symtab::SymbolTable;
use indexmap::IndexMap;
use tracing::debug;

/// Result of lowering one module to IL.
#[derive(Debug)]
pub struct GenerationResult {
    pub module: ILModule,
    /// True when no errors were added during generation
    pub success: bool,
    pub diagnostics: Diagnostics,
    pub ssa_enabled: bool,
    /// Per-function statistics, populated when `collect_ssa_stats` is on
    pub ssa_results: IndexMap<String, SsaStats>,
    pub ssa_success_count: usize,
    pub ssa_failure_count: usize,
}

/// Lower an analyzed program to an IL module.
///
/// Expects the semantic passes to have run: symbols resolved, types
/// attached, and the call graph built (recursive functions are skipped
/// here, their diagnostics having been emitted by the recursion check).
pub fn generate_module(
    program: &Program,
    table: &SymbolTable,
    metadata: &MetadataStore,
    call_graph: &CallGraph,
    target: &TargetConfig,
    options: &GenOptions,
) -> GenerationResult {
    debug!(module = %program.module.name, "generating IL");
    let mut diagnostics = Diagnostics::new();

    let mut il_module = {
        let mut generator = ILGen::new(
            &program.module.name,
            table,
            metadata,
            target,
            options,
            &mut diagnostics,
        );
        generator.lower_module(program, call_graph);
        generator.into_module()
    };

    // Structural invariants hold for every lowered function; a violation
    // here is a generator bug, not a user error
    for function in il_module.functions() {
        for violation in validate_cfg(function) {
            diagnostics.error(
                Code::InternalError,
                format!("IL for '{}' is malformed: {}", function.name, violation),
                Span::default(),
            );
        }
    }

    let mut ssa_results = IndexMap::new();
    let mut ssa_success_count = 0;
    let mut ssa_failure_count = 0;
    if options.enable_ssa {
        let names: Vec<String> = il_module.functions().map(|f| f.name.clone()).collect();
        for name in names {
            let Some(function) = il_module.function_mut(&name) else {
                continue;
            };
            match construct_ssa(function, options) {
                Ok(stats) => {
                    ssa_success_count += 1;
                    if options.collect_ssa_stats {
                        ssa_results.insert(name, stats);
                    }
                }
                Err(message) => {
                    ssa_failure_count += 1;
                    diagnostics.error(
                        Code::InternalError,
                        format!("SSA construction failed for '{}': {}", name, message),
                        Span::default(),
                    );
                }
            }
        }
    }

    GenerationResult {
        success: !diagnostics.has_errors(),
        module: il_module,
        diagnostics,
        ssa_enabled: options.enable_ssa,
        ssa_results,
        ssa_success_count,
        ssa_failure_count,
    }
}
