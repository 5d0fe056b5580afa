//! Advanced dataflow analyses
//!
//! Seventh pass: everything the code generator wants to know beyond types
//! and control flow. Each analysis works over the annotated AST plus the
//! per-function CFG, attaches its results to node metadata under the keys
//! documented in [`crate::ast::meta`], and is independently testable.
//!
//! - `reaching` - reaching definitions with def-use/use-def chains
//! - `liveness` - live-in/live-out per CFG node
//! - `purity` - side-effect classification over the call graph
//! - `escape` - escaping locals and static frame-depth estimates
//! - `usage` - access counters and zero-page placement scores
//!
//! Every fixed-point loop here runs against a quadratic iteration budget;
//! exceeding it means the transfer functions are not monotone, which is
//! reported as an internal error instead of hanging the compiler.

pub mod escape;
pub mod liveness;
pub mod purity;
pub mod reaching;
pub mod usage;

pub use escape::{analyze_escapes, EscapeSummary};
pub use liveness::{analyze_liveness, Liveness};
pub use purity::analyze_purity;
pub use reaching::{analyze_reaching, Def, ReachingDefinitions};
pub use usage::{analyze_usage, UsageSummary};

use crate::ast::{
    Declaration, Expr, ExprKind, FunctionDecl, MetadataStore, NodeId, Program, Stmt,
};
use crate::call_graph::CallGraph;
use crate::cfg::{Cfg, CfgNode, CfgNodeKind};
use crate::config::TargetConfig;
use crate::diagnostics::Diagnostics;
use crate::symtab::{SymbolId, SymbolTable};
use indexmap::IndexMap;
use std::collections::HashMap;
use tracing::debug;

/// Results of all dataflow analyses for one module.
#[derive(Debug)]
pub struct DataflowResults {
    pub reaching: IndexMap<String, ReachingDefinitions>,
    pub liveness: IndexMap<String, Liveness>,
    /// Function name -> is pure
    pub purity: IndexMap<String, bool>,
    pub escape: IndexMap<String, EscapeSummary>,
    pub usage: UsageSummary,
}

/// Run every analysis in dependency order.
pub fn run_dataflow(
    program: &Program,
    cfgs: &IndexMap<String, Cfg>,
    call_graph: &CallGraph,
    table: &SymbolTable,
    metadata: &mut MetadataStore,
    target: &TargetConfig,
    diagnostics: &mut Diagnostics,
) -> DataflowResults {
    debug!(module = %program.module.name, "dataflow analysis");

    let mut reaching = IndexMap::new();
    let mut liveness = IndexMap::new();
    for decl in &program.declarations {
        let Declaration::Function(f) = decl else {
            continue;
        };
        let Some(cfg) = cfgs.get(&f.name) else {
            continue;
        };
        let ctx = FnContext::new(f, cfg, table);
        reaching.insert(f.name.clone(), analyze_reaching(&ctx, metadata, diagnostics));
        liveness.insert(f.name.clone(), analyze_liveness(&ctx, metadata, diagnostics));
    }

    let purity = analyze_purity(program, call_graph, table, metadata, target, diagnostics);
    let escape = analyze_escapes(program, call_graph, table, metadata, target, diagnostics);
    let usage = analyze_usage(program, table, metadata, target, diagnostics);

    DataflowResults {
        reaching,
        liveness,
        purity,
        escape,
        usage,
    }
}

/// Iteration budget for a fixed-point loop over `n` nodes. The lattices
/// here are finite and the transfer functions monotone, so `n^2` steps is
/// already generous; running past this bound is a compiler bug.
pub(crate) fn fixpoint_budget(n: usize) -> usize {
    n * n + n + 1
}

/// Per-function context shared by the CFG-based analyses.
pub(crate) struct FnContext<'a> {
    pub decl: &'a FunctionDecl,
    pub cfg: &'a Cfg,
    pub table: &'a SymbolTable,
    /// Statement lookup by node id, covering nested bodies
    pub stmts: HashMap<NodeId, &'a Stmt>,
}

impl<'a> FnContext<'a> {
    pub fn new(decl: &'a FunctionDecl, cfg: &'a Cfg, table: &'a SymbolTable) -> Self {
        let mut stmts = HashMap::new();
        if let Some(body) = &decl.body {
            for stmt in body {
                index_stmt(stmt, &mut stmts);
            }
        }
        FnContext {
            decl,
            cfg,
            table,
            stmts,
        }
    }

    /// Parameter symbols in declaration order.
    pub fn param_symbols(&self, metadata: &MetadataStore) -> Vec<SymbolId> {
        self.decl
            .params
            .iter()
            .filter_map(|p| metadata.symbol(p.id))
            .collect()
    }

    /// The loop variable symbol of a `for` statement.
    fn for_var_symbol(&self, stmt_id: NodeId, var: &str, metadata: &MetadataStore) -> Option<SymbolId> {
        metadata.symbol(stmt_id).or_else(|| {
            // The variable was reused from an earlier declaration; find it
            // through the function scope
            let scope = self.table.scope_of(self.decl.id)?;
            self.table.lookup_in(scope, var)
        })
    }
}

fn index_stmt<'a>(stmt: &'a Stmt, stmts: &mut HashMap<NodeId, &'a Stmt>) {
    stmts.insert(stmt.id(), stmt);
    match stmt {
        Stmt::If(s) => {
            for st in &s.then_body {
                index_stmt(st, stmts);
            }
            if let Some(else_body) = &s.else_body {
                for st in else_body {
                    index_stmt(st, stmts);
                }
            }
        }
        Stmt::While(s) => {
            for st in &s.body {
                index_stmt(st, stmts);
            }
        }
        Stmt::For(s) => {
            for st in &s.body {
                index_stmt(st, stmts);
            }
        }
        Stmt::Match(s) => {
            for arm in &s.arms {
                for st in &arm.body {
                    index_stmt(st, stmts);
                }
            }
            if let Some(default) = &s.default {
                for st in default {
                    index_stmt(st, stmts);
                }
            }
        }
        _ => {}
    }
}

/// Variable accesses attributable to one CFG node: reads as
/// (symbol, identifier-expression) pairs, strong definitions as symbols.
#[derive(Debug, Default)]
pub(crate) struct UseDef {
    pub uses: Vec<(SymbolId, NodeId)>,
    pub defs: Vec<SymbolId>,
}

/// Compute the uses and definitions belonging to a CFG node itself - its
/// own expressions, not the statements nested under it (those have their
/// own nodes).
pub(crate) fn node_use_defs(
    node: &CfgNode,
    ctx: &FnContext<'_>,
    metadata: &MetadataStore,
) -> UseDef {
    let mut ud = UseDef::default();
    let Some(ast) = node.ast else {
        return ud;
    };
    let Some(stmt) = ctx.stmts.get(&ast) else {
        return ud;
    };
    match stmt {
        Stmt::Variable(v) => {
            if let Some(init) = &v.initializer {
                collect_expr(init, ctx.table, metadata, &mut ud);
                if let Some(sym) = metadata.symbol(v.id) {
                    ud.defs.push(sym);
                }
            }
        }
        Stmt::Expr(s) => collect_expr(&s.expr, ctx.table, metadata, &mut ud),
        Stmt::If(s) => collect_expr(&s.condition, ctx.table, metadata, &mut ud),
        Stmt::While(s) => collect_expr(&s.condition, ctx.table, metadata, &mut ud),
        Stmt::For(s) => {
            if node.kind == CfgNodeKind::Loop {
                // Header: evaluates the bounds and initializes the variable
                collect_expr(&s.from, ctx.table, metadata, &mut ud);
                collect_expr(&s.to, ctx.table, metadata, &mut ud);
                if let Some(step) = &s.step {
                    collect_expr(step, ctx.table, metadata, &mut ud);
                }
                if let Some(sym) = ctx.for_var_symbol(s.id, &s.var, metadata) {
                    ud.defs.push(sym);
                }
            } else {
                // Increment node: reads and redefines the variable
                if let Some(sym) = ctx.for_var_symbol(s.id, &s.var, metadata) {
                    ud.uses.push((sym, s.id));
                    ud.defs.push(sym);
                }
            }
        }
        Stmt::Match(s) => {
            collect_expr(&s.scrutinee, ctx.table, metadata, &mut ud);
            for arm in &s.arms {
                collect_expr(&arm.value, ctx.table, metadata, &mut ud);
            }
        }
        Stmt::Return(s) => {
            if let Some(value) = &s.value {
                collect_expr(value, ctx.table, metadata, &mut ud);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) => {}
    }
    ud
}

/// Walk one expression tree collecting reads and strong writes.
///
/// Array-element writes count as a read of the array, never a kill: other
/// elements keep their old definitions. Function names in call position
/// are not dataflow values; calls through callback variables read the
/// variable.
fn collect_expr(expr: &Expr, table: &SymbolTable, metadata: &MetadataStore, ud: &mut UseDef) {
    match &expr.kind {
        ExprKind::Identifier { .. } => {
            if let Some(sym) = metadata.symbol(expr.id) {
                ud.uses.push((sym, expr.id));
            }
        }
        ExprKind::Assign {
            compound,
            target,
            value,
        } => {
            match &target.kind {
                ExprKind::Identifier { .. } => {
                    if let Some(sym) = metadata.symbol(target.id) {
                        if compound.is_some() {
                            ud.uses.push((sym, target.id));
                        }
                        ud.defs.push(sym);
                    }
                }
                // Weak update: the base is read, nothing is killed
                _ => collect_expr(target, table, metadata, ud),
            }
            collect_expr(value, table, metadata, ud);
        }
        ExprKind::ArrayLiteral { elements } => {
            for e in elements {
                collect_expr(e, table, metadata, ud);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_expr(lhs, table, metadata, ud);
            collect_expr(rhs, table, metadata, ud);
        }
        ExprKind::Unary { operand, .. } => collect_expr(operand, table, metadata, ud),
        ExprKind::Call { callee, args } => {
            match &callee.kind {
                ExprKind::Identifier { .. } => {
                    if let Some(sym) = metadata.symbol(callee.id) {
                        if table.symbol(sym).kind != crate::symtab::SymbolKind::Function {
                            ud.uses.push((sym, callee.id));
                        }
                    }
                }
                _ => collect_expr(callee, table, metadata, ud),
            }
            for a in args {
                collect_expr(a, table, metadata, ud);
            }
        }
        ExprKind::Index { base, index } => {
            collect_expr(base, table, metadata, ud);
            collect_expr(index, table, metadata, ud);
        }
        ExprKind::Member { base, .. } => collect_expr(base, table, metadata, ud),
        ExprKind::IntLiteral { .. }
        | ExprKind::BoolLiteral { .. }
        | ExprKind::StringLiteral { .. } => {}
    }
}
