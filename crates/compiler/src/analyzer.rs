//! Semantic analyzer facade
//!
//! Runs the pass pipeline over one program (or a set of modules in
//! dependency order) against a shared mutable context: symbol table,
//! metadata store, and diagnostic bag. Every pass is best-effort; the
//! pipeline only stops early when the caller asked for `stop_on_first_error`
//! or an error budget.
//!
//! Pass order: symbols -> types -> checking -> control flow -> call graph
//! -> dataflow. IL generation is a separate step over the result (see
//! [`crate::ilgen::generate_module`]).

use crate::ast::{number_nodes, MetadataStore, Program};
use crate::call_graph::{function_spans, CallGraph};
use crate::cfg::{build_cfgs, Cfg};
use crate::config::{AnalyzerOptions, TargetConfig};
use crate::dataflow::{run_dataflow, DataflowResults};
use crate::diagnostics::Diagnostics;
use crate::modules::{
    resolve_imports, DependencyGraph, GlobalSymbolTable, ImportResolution, ModuleRegistry,
};
use crate::symbols::build_symbol_table;
use crate::symtab::SymbolTable;
use crate::type_resolver::resolve_types;
use crate::typechecker::{check_program, CheckOptions};
use crate::types::TypeSystem;
use indexmap::IndexMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Outcome and artifacts of one pass.
#[derive(Debug, Clone)]
pub struct PassStat {
    pub name: &'static str,
    pub diagnostics: usize,
    pub elapsed: Option<Duration>,
}

/// Aggregate pipeline statistics.
#[derive(Debug, Default, Clone)]
pub struct AnalysisStats {
    pub passes: Vec<PassStat>,
    pub node_count: u32,
    pub symbol_count: usize,
    pub function_count: usize,
}

/// Everything the analyzer produced for one module.
#[derive(Debug)]
pub struct AnalysisResult {
    pub success: bool,
    pub module_name: String,
    /// The analyzed program, with node ids assigned
    pub program: Program,
    pub symbol_table: SymbolTable,
    pub type_system: TypeSystem,
    pub metadata: MetadataStore,
    pub cfgs: IndexMap<String, Cfg>,
    pub call_graph: CallGraph,
    /// Present unless the pipeline stopped before the dataflow pass
    pub dataflow: Option<DataflowResults>,
    pub diagnostics: Diagnostics,
    pub stats: AnalysisStats,
}

/// Analyze one program.
pub fn analyze(
    mut program: Program,
    target: &TargetConfig,
    options: &AnalyzerOptions,
) -> AnalysisResult {
    let module_name = program.module.name.clone();
    debug!(module = %module_name, "analysis pipeline start");

    let mut diagnostics = Diagnostics::new();
    let mut metadata = MetadataStore::new();
    let type_system = TypeSystem::new();
    let mut stats = AnalysisStats {
        node_count: number_nodes(&mut program),
        ..AnalysisStats::default()
    };

    // Pass: symbol table construction
    let mut pass = PassTimer::start("symbols", options, &diagnostics);
    let mut symbol_table = build_symbol_table(&program, &mut metadata, &mut diagnostics);
    pass.finish(&mut stats, &diagnostics);
    let mut stopped = should_stop(options, &diagnostics);

    // Pass: type resolution
    if !stopped {
        let mut pass = PassTimer::start("types", options, &diagnostics);
        resolve_types(
            &program,
            &mut symbol_table,
            &type_system,
            &metadata,
            &mut diagnostics,
        );
        pass.finish(&mut stats, &diagnostics);
        stopped = should_stop(options, &diagnostics);
    }

    // Pass: type checking
    if !stopped {
        let mut pass = PassTimer::start("check", options, &diagnostics);
        let check_options = CheckOptions {
            stop_on_first_error: options.stop_on_first_error,
            max_errors: options.max_errors,
            report_warnings: options.report_warnings,
        };
        check_program(
            &program,
            &mut symbol_table,
            &type_system,
            &mut metadata,
            &mut diagnostics,
            &check_options,
        );
        pass.finish(&mut stats, &diagnostics);
        stopped = should_stop(options, &diagnostics);
    }

    // Pass: control-flow graphs and reachability
    let mut cfgs = IndexMap::new();
    if !stopped {
        let mut pass = PassTimer::start("controlflow", options, &diagnostics);
        cfgs = build_cfgs(&program, &mut diagnostics);
        pass.finish(&mut stats, &diagnostics);
        stopped = should_stop(options, &diagnostics);
    }

    // Pass: call graph and recursion rejection. The graph itself is part
    // of the result even when the pipeline stopped early.
    let call_graph = CallGraph::build(&program);
    if !stopped {
        let mut pass = PassTimer::start("callgraph", options, &diagnostics);
        call_graph.report_recursion(&function_spans(&program), &mut diagnostics);
        pass.finish(&mut stats, &diagnostics);
        stopped = should_stop(options, &diagnostics);
    }

    // Pass: dataflow. The analyses are conservative in the presence of
    // call-graph cycles, so recursion errors alone do not block them.
    let dataflow = if stopped {
        None
    } else {
        let mut pass = PassTimer::start("dataflow", options, &diagnostics);
        let results = run_dataflow(
            &program,
            &cfgs,
            &call_graph,
            &symbol_table,
            &mut metadata,
            target,
            &mut diagnostics,
        );
        pass.finish(&mut stats, &diagnostics);
        Some(results)
    };

    stats.symbol_count = symbol_table.symbol_count();
    stats.function_count = cfgs.len();

    diagnostics.dedup();
    AnalysisResult {
        success: !diagnostics.has_errors(),
        module_name,
        program,
        symbol_table,
        type_system,
        metadata,
        cfgs,
        call_graph,
        dataflow,
        diagnostics,
        stats,
    }
}

fn should_stop(options: &AnalyzerOptions, diagnostics: &Diagnostics) -> bool {
    let errors = diagnostics.error_count();
    (options.stop_on_first_error && errors > 0)
        || (options.max_errors > 0 && errors >= options.max_errors)
}

/// Measures one pass and records its stat line.
struct PassTimer {
    name: &'static str,
    before: usize,
    started: Option<Instant>,
}

impl PassTimer {
    fn start(name: &'static str, options: &AnalyzerOptions, diagnostics: &Diagnostics) -> Self {
        PassTimer {
            name,
            before: diagnostics.len(),
            started: options.collect_timings.then(Instant::now),
        }
    }

    fn finish(&mut self, stats: &mut AnalysisStats, diagnostics: &Diagnostics) {
        stats.passes.push(PassStat {
            name: self.name,
            diagnostics: diagnostics.len() - self.before,
            elapsed: self.started.map(|s| s.elapsed()),
        });
    }
}

/// Result of analyzing a set of modules together.
#[derive(Debug)]
pub struct MultiModuleResult {
    pub success: bool,
    /// Per-module results, in compilation order
    pub modules: IndexMap<String, AnalysisResult>,
    pub global_symbols: GlobalSymbolTable,
    pub dependency_graph: DependencyGraph,
    pub import_resolutions: IndexMap<String, ImportResolution>,
    pub compilation_order: Vec<String>,
    /// Cross-module diagnostics (duplicate registrations, cycles, import
    /// failures)
    pub diagnostics: Diagnostics,
}

/// Analyze multiple modules: compute a dependency order, run the
/// single-module pipeline per module in that order, then resolve imports
/// against the aggregated exports.
pub fn analyze_modules(
    programs: Vec<Program>,
    target: &TargetConfig,
    options: &AnalyzerOptions,
) -> MultiModuleResult {
    let mut diagnostics = Diagnostics::new();

    let mut registry = ModuleRegistry::new();
    for program in programs {
        registry.register(program, &mut diagnostics);
    }

    let graph = DependencyGraph::build(&registry);
    let compilation_order = graph.compilation_order(&mut diagnostics);

    // Per-module pipeline, in dependency order
    let mut modules: IndexMap<String, AnalysisResult> = IndexMap::new();
    let mut global_symbols = GlobalSymbolTable::new();
    for name in &compilation_order {
        let Some(program) = registry.get(name) else {
            continue;
        };
        let result = analyze(program.clone(), target, options);
        global_symbols.add_module(name, &result.symbol_table);
        modules.insert(name.clone(), result);
    }

    // Imports resolve against the full export set
    let mut import_resolutions = IndexMap::new();
    for name in &compilation_order {
        let Some(result) = modules.get_mut(name) else {
            continue;
        };
        let resolution = resolve_imports(
            &result.program,
            &global_symbols,
            &mut result.symbol_table,
            &mut diagnostics,
        );
        import_resolutions.insert(name.clone(), resolution);
    }

    diagnostics.dedup();
    let success =
        !diagnostics.has_errors() && modules.values().all(|m| m.success);
    MultiModuleResult {
        success,
        modules,
        global_symbols,
        dependency_graph: graph,
        import_resolutions,
        compilation_order,
        diagnostics,
    }
}
