//! Escape analysis and frame-depth estimation
//!
//! Classifies every function-scoped variable: a local escapes when it is
//! passed to a function, returned, stored into module-level state, or has
//! its address taken. Everything else is marked stack-allocatable and may
//! live in the function's static frame.
//!
//! Each function also gets a conservative frame-depth estimate: two bytes
//! of return address plus parameter and local storage, plus the deepest
//! static callee. Indirect calls contribute nothing (there is no target
//! to measure), which undershoots; callback-heavy code should not rely on
//! these numbers. Estimates above the target thresholds are flagged.

use crate::ast::{
    meta, Declaration, Expr, ExprKind, MetaValue, MetadataStore, Program, Stmt, UnaryOp,
};
use crate::call_graph::CallGraph;
use crate::config::TargetConfig;
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::{SymbolId, SymbolKind, SymbolTable};
use indexmap::IndexMap;
use std::collections::HashSet;

/// Escape classification and frame estimate for one function.
#[derive(Debug)]
pub struct EscapeSummary {
    pub escaping: Vec<SymbolId>,
    pub stack_allocatable: Vec<SymbolId>,
    /// Own frame: return address + parameters + locals, in bytes
    pub frame_bytes: u32,
    /// Own frame plus the deepest static callee chain
    pub total_depth: u32,
    pub overflow_risk: bool,
}

/// Analyze every function in the program.
pub fn analyze_escapes(
    program: &Program,
    call_graph: &CallGraph,
    table: &SymbolTable,
    metadata: &mut MetadataStore,
    target: &TargetConfig,
    diagnostics: &mut Diagnostics,
) -> IndexMap<String, EscapeSummary> {
    let mut own_frames: IndexMap<String, u32> = IndexMap::new();
    let mut escapes: IndexMap<String, (Vec<SymbolId>, Vec<SymbolId>)> = IndexMap::new();

    for decl in &program.declarations {
        let Declaration::Function(f) = decl else {
            continue;
        };
        let Some(scope) = table.scope_of(f.id) else {
            continue;
        };

        // Locals and parameters of this function, in declaration order
        let locals: Vec<SymbolId> = table.scope(scope).symbols.values().copied().collect();

        let mut escaped: HashSet<SymbolId> = HashSet::new();
        if let Some(body) = &f.body {
            let mut walker = EscapeWalker {
                table,
                metadata,
                escaped: &mut escaped,
            };
            for stmt in body {
                walker.walk_stmt(stmt);
            }
        }

        let mut escaping = Vec::new();
        let mut stack_allocatable = Vec::new();
        for &sym in &locals {
            if escaped.contains(&sym) {
                escaping.push(sym);
            } else {
                stack_allocatable.push(sym);
            }
        }

        // 2 bytes of return address plus declared storage
        let frame: u32 = 2 + locals
            .iter()
            .map(|&s| table.symbol(s).type_or_unknown().byte_size() as u32)
            .sum::<u32>();

        own_frames.insert(f.name.clone(), frame);
        escapes.insert(f.name.clone(), (escaping, stack_allocatable));
    }

    // Deepest call chain per function, memoized over the call graph.
    // Recursive cycles are rejected elsewhere; a member of one gets its
    // own frame only.
    let mut depths: IndexMap<String, u32> = IndexMap::new();
    for name in own_frames.keys() {
        let mut visiting = HashSet::new();
        compute_depth(name, &own_frames, call_graph, &mut depths, &mut visiting);
    }

    let mut results = IndexMap::new();
    for decl in &program.declarations {
        let Declaration::Function(f) = decl else {
            continue;
        };
        let Some((escaping, stack_allocatable)) = escapes.swap_remove(&f.name) else {
            continue;
        };
        let frame_bytes = own_frames.get(&f.name).copied().unwrap_or(2);
        let total_depth = depths.get(&f.name).copied().unwrap_or(frame_bytes);
        let overflow_risk = total_depth > target.stack.warn_threshold;

        for &sym in &escaping {
            let node = table.symbol(sym).decl_node;
            metadata.set(node, meta::ESCAPES, MetaValue::Flag(true));
            metadata.set(node, meta::STACK_ALLOCATABLE, MetaValue::Flag(false));
        }
        for &sym in &stack_allocatable {
            let node = table.symbol(sym).decl_node;
            metadata.set(node, meta::ESCAPES, MetaValue::Flag(false));
            metadata.set(node, meta::STACK_ALLOCATABLE, MetaValue::Flag(true));
        }
        metadata.set(f.id, meta::STACK_DEPTH, MetaValue::Count(total_depth as u64));
        metadata.set(
            f.id,
            meta::STACK_OVERFLOW_RISK,
            MetaValue::Flag(overflow_risk),
        );

        if total_depth > target.stack.error_threshold {
            diagnostics.error(
                Code::StackOverflowRisk,
                format!(
                    "estimated frame depth of '{}' is {} bytes, beyond the {}-byte hardware stack",
                    f.name, total_depth, target.stack.error_threshold
                ),
                f.span,
            );
        } else if overflow_risk {
            diagnostics.warning(
                Code::StackOverflowRisk,
                format!(
                    "estimated frame depth of '{}' is {} bytes (threshold {})",
                    f.name, total_depth, target.stack.warn_threshold
                ),
                f.span,
            );
        }

        results.insert(
            f.name.clone(),
            EscapeSummary {
                escaping,
                stack_allocatable,
                frame_bytes,
                total_depth,
                overflow_risk,
            },
        );
    }
    results
}

fn compute_depth(
    name: &str,
    own: &IndexMap<String, u32>,
    call_graph: &CallGraph,
    depths: &mut IndexMap<String, u32>,
    visiting: &mut HashSet<String>,
) -> u32 {
    if let Some(&d) = depths.get(name) {
        return d;
    }
    if !visiting.insert(name.to_string()) {
        // Cycle member: recursion is a separate hard error
        return 0;
    }
    let frame = own.get(name).copied().unwrap_or(0);
    let deepest_callee = call_graph
        .callees(name)
        .map(|callees| {
            callees
                .iter()
                .map(|c| compute_depth(c, own, call_graph, depths, visiting))
                .max()
                .unwrap_or(0)
        })
        .unwrap_or(0);
    visiting.remove(name);
    let total = frame + deepest_callee;
    depths.insert(name.to_string(), total);
    total
}

struct EscapeWalker<'a> {
    table: &'a SymbolTable,
    metadata: &'a MetadataStore,
    escaped: &'a mut HashSet<SymbolId>,
}

impl EscapeWalker<'_> {
    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => {
                if let Some(init) = &v.initializer {
                    self.walk_expr(init);
                }
            }
            Stmt::Expr(s) => self.walk_expr(&s.expr),
            Stmt::If(s) => {
                self.walk_expr(&s.condition);
                for st in &s.then_body {
                    self.walk_stmt(st);
                }
                if let Some(else_body) = &s.else_body {
                    for st in else_body {
                        self.walk_stmt(st);
                    }
                }
            }
            Stmt::While(s) => {
                self.walk_expr(&s.condition);
                for st in &s.body {
                    self.walk_stmt(st);
                }
            }
            Stmt::For(s) => {
                self.walk_expr(&s.from);
                self.walk_expr(&s.to);
                if let Some(step) = &s.step {
                    self.walk_expr(step);
                }
                for st in &s.body {
                    self.walk_stmt(st);
                }
            }
            Stmt::Match(s) => {
                self.walk_expr(&s.scrutinee);
                for arm in &s.arms {
                    self.walk_expr(&arm.value);
                    for st in &arm.body {
                        self.walk_stmt(st);
                    }
                }
                if let Some(default) = &s.default {
                    for st in default {
                        self.walk_stmt(st);
                    }
                }
            }
            Stmt::Return(s) => {
                if let Some(value) = &s.value {
                    // Everything mentioned in a return value leaves the
                    // function
                    self.mark_identifiers(value);
                    self.walk_expr(value);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Call { callee, args } => {
                self.walk_expr(callee);
                for a in args {
                    // Arguments escape into the callee
                    self.mark_identifiers(a);
                    self.walk_expr(a);
                }
            }
            ExprKind::Unary { op, operand } => {
                if *op == UnaryOp::AddressOf {
                    self.mark_identifiers(operand);
                }
                self.walk_expr(operand);
            }
            ExprKind::Assign { target, value, .. } => {
                if let ExprKind::Identifier { .. } = &target.kind {
                    if let Some(sym) = self.metadata.symbol(target.id) {
                        if self.table.symbol(sym).scope == self.table.root() {
                            // Storing a local into module state publishes it
                            self.mark_identifiers(value);
                        }
                    }
                } else {
                    self.walk_expr(target);
                }
                self.walk_expr(value);
            }
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.walk_expr(e);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.walk_expr(lhs);
                self.walk_expr(rhs);
            }
            ExprKind::Index { base, index } => {
                self.walk_expr(base);
                self.walk_expr(index);
            }
            ExprKind::Member { base, .. } => self.walk_expr(base),
            ExprKind::IntLiteral { .. }
            | ExprKind::BoolLiteral { .. }
            | ExprKind::StringLiteral { .. }
            | ExprKind::Identifier { .. } => {}
        }
    }

    /// Mark every function-scoped identifier in the expression as escaped.
    fn mark_identifiers(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier { .. } => {
                if let Some(sym) = self.metadata.symbol(expr.id) {
                    let s = self.table.symbol(sym);
                    if s.scope != self.table.root()
                        && matches!(
                            s.kind,
                            SymbolKind::Variable | SymbolKind::Parameter | SymbolKind::Const
                        )
                    {
                        self.escaped.insert(sym);
                    }
                }
            }
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.mark_identifiers(e);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.mark_identifiers(lhs);
                self.mark_identifiers(rhs);
            }
            ExprKind::Unary { operand, .. } => self.mark_identifiers(operand),
            ExprKind::Call { args, .. } => {
                for a in args {
                    self.mark_identifiers(a);
                }
            }
            ExprKind::Index { base, index } => {
                self.mark_identifiers(base);
                self.mark_identifiers(index);
            }
            ExprKind::Member { base, .. } => self.mark_identifiers(base),
            ExprKind::Assign { value, .. } => self.mark_identifiers(value),
            ExprKind::IntLiteral { .. }
            | ExprKind::BoolLiteral { .. }
            | ExprKind::StringLiteral { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;
    use crate::symbols::build_symbol_table;
    use crate::type_resolver::resolve_types;
    use crate::typechecker::{check_program, CheckOptions};
    use crate::types::TypeSystem;

    fn run(program: &Program) -> (IndexMap<String, EscapeSummary>, SymbolTable, Diagnostics) {
        let mut metadata = MetadataStore::new();
        let mut diags = Diagnostics::new();
        let ts = TypeSystem::new();
        let mut table = build_symbol_table(program, &mut metadata, &mut diags);
        resolve_types(program, &mut table, &ts, &metadata, &mut diags);
        check_program(
            program,
            &mut table,
            &ts,
            &mut metadata,
            &mut diags,
            &CheckOptions::default(),
        );
        let graph = CallGraph::build(program);
        let result = analyze_escapes(
            program,
            &graph,
            &table,
            &mut metadata,
            &TargetConfig::c64(),
            &mut diags,
        );
        (result, table, diags)
    }

    fn names(table: &SymbolTable, ids: &[SymbolId]) -> Vec<String> {
        ids.iter().map(|&s| table.symbol(s).name.clone()).collect()
    }

    #[test]
    fn test_plain_local_is_stack_allocatable() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![
                    build::let_stmt("x", Some("byte"), Some(build::int(1))),
                    build::expr_stmt(build::assign(build::ident("x"), build::int(2))),
                ],
            )],
        );
        let (result, table, _) = run(&program);
        assert_eq!(names(&table, &result["f"].stack_allocatable), vec!["x"]);
        assert!(result["f"].escaping.is_empty());
    }

    #[test]
    fn test_argument_escapes() {
        let program = build::program(
            "m",
            vec![
                build::function("sink", vec![("v", "byte")], None, vec![]),
                build::function(
                    "f",
                    vec![],
                    None,
                    vec![
                        build::let_stmt("x", Some("byte"), Some(build::int(1))),
                        build::expr_stmt(build::call("sink", vec![build::ident("x")])),
                    ],
                ),
            ],
        );
        let (result, table, _) = run(&program);
        assert_eq!(names(&table, &result["f"].escaping), vec!["x"]);
    }

    #[test]
    fn test_returned_local_escapes() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                Some("byte"),
                vec![
                    build::let_stmt("x", Some("byte"), Some(build::int(1))),
                    build::ret(Some(build::ident("x"))),
                ],
            )],
        );
        let (result, table, _) = run(&program);
        assert_eq!(names(&table, &result["f"].escaping), vec!["x"]);
    }

    #[test]
    fn test_address_of_escapes() {
        let program = build::program(
            "m",
            vec![
                build::global("ptr", Some("word"), Some(build::int(0))),
                build::function(
                    "f",
                    vec![],
                    None,
                    vec![
                        build::let_stmt("x", Some("byte"), Some(build::int(1))),
                        build::expr_stmt(build::assign(
                            build::ident("ptr"),
                            build::unary(UnaryOp::AddressOf, build::ident("x")),
                        )),
                    ],
                ),
            ],
        );
        let (result, table, _) = run(&program);
        assert!(names(&table, &result["f"].escaping).contains(&"x".to_string()));
    }

    #[test]
    fn test_frame_depth_accumulates_over_calls() {
        // leaf: 2 + 2 locals; mid calls leaf; top calls mid
        let program = build::program(
            "m",
            vec![
                build::function(
                    "leaf",
                    vec![("a", "byte"), ("b", "byte")],
                    None,
                    vec![],
                ),
                build::function(
                    "mid",
                    vec![],
                    None,
                    vec![build::expr_stmt(build::call(
                        "leaf",
                        vec![build::int(1), build::int(2)],
                    ))],
                ),
                build::function(
                    "top",
                    vec![],
                    None,
                    vec![build::expr_stmt(build::call("mid", vec![]))],
                ),
            ],
        );
        let (result, _, _) = run(&program);
        assert_eq!(result["leaf"].frame_bytes, 4);
        assert_eq!(result["mid"].total_depth, 2 + 4);
        assert_eq!(result["top"].total_depth, 2 + 2 + 4);
        assert!(!result["top"].overflow_risk);
    }

    #[test]
    fn test_deep_frames_flag_risk() {
        // One function with a 300-byte array blows the 256-byte budget
        let program = build::program(
            "m",
            vec![build::function(
                "huge",
                vec![],
                None,
                vec![build::let_stmt("buf", Some("byte[300]"), None)],
            )],
        );
        let (result, _, diags) = run(&program);
        assert!(result["huge"].overflow_risk);
        assert!(diags
            .iter()
            .any(|d| d.code == Code::StackOverflowRisk
                && d.severity == crate::diagnostics::Severity::Error));
    }
}
