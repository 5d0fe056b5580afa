//! Call graph analysis for rejecting recursion
//!
//! This module builds a call graph from a Lode program and detects
//! strongly connected components (SCCs). The 6502 backend allocates every
//! function frame statically, so recursion of any shape - direct or
//! mutual - is a hard compile-time error, not a style warning.
//!
//! Calls through callback values have unknown targets; they are recorded
//! separately and treated conservatively by the analyses that care.

use crate::ast::{Declaration, Expr, ExprKind, NodeId, Program, Span, Stmt};
use crate::diagnostics::{Code, Diagnostics};
use indexmap::{IndexMap, IndexSet};

/// A call graph representing which functions call which other functions.
#[derive(Debug, Clone)]
pub struct CallGraph {
    /// Map from function name to the set of functions it calls
    edges: IndexMap<String, IndexSet<String>>,
    /// All function names in the program, in declaration order
    functions: IndexSet<String>,
    /// Call sites whose target is a callback value rather than a named
    /// function: (calling function, call expression)
    indirect_sites: Vec<(String, NodeId)>,
    /// Strongly connected components with more than one member (mutual
    /// recursion) or single members that call themselves
    recursive_sccs: Vec<IndexSet<String>>,
}

impl CallGraph {
    /// Build a call graph from a program.
    ///
    /// Extracts all static function-to-function call relationships,
    /// including calls nested inside branches, loops, and match arms.
    pub fn build(program: &Program) -> Self {
        let functions: IndexSet<String> = program
            .declarations
            .iter()
            .filter_map(|d| match d {
                Declaration::Function(f) => Some(f.name.clone()),
                _ => None,
            })
            .collect();

        let mut edges: IndexMap<String, IndexSet<String>> = IndexMap::new();
        let mut indirect_sites = Vec::new();

        for decl in &program.declarations {
            let Declaration::Function(f) = decl else {
                continue;
            };
            let mut callees = IndexSet::new();
            if let Some(body) = &f.body {
                for stmt in body {
                    extract_calls_from_stmt(
                        stmt,
                        &functions,
                        &f.name,
                        &mut callees,
                        &mut indirect_sites,
                    );
                }
            }
            edges.insert(f.name.clone(), callees);
        }

        let mut graph = CallGraph {
            edges,
            functions,
            indirect_sites,
            recursive_sccs: Vec::new(),
        };
        graph.recursive_sccs = graph.find_sccs();
        graph
    }

    /// Check if a function is part of any recursive cycle.
    pub fn is_recursive(&self, function: &str) -> bool {
        self.recursive_sccs.iter().any(|scc| scc.contains(function))
    }

    /// Get all recursive cycles.
    pub fn recursive_cycles(&self) -> &[IndexSet<String>] {
        &self.recursive_sccs
    }

    /// Get the functions a given function calls.
    pub fn callees(&self, function: &str) -> Option<&IndexSet<String>> {
        self.edges.get(function)
    }

    /// Call sites with unknown (callback) targets.
    pub fn indirect_sites(&self) -> &[(String, NodeId)] {
        &self.indirect_sites
    }

    /// Whether a function makes any indirect call.
    pub fn has_indirect_calls(&self, function: &str) -> bool {
        self.indirect_sites.iter().any(|(f, _)| f == function)
    }

    /// Functions in declaration order.
    pub fn functions(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(String::as_str)
    }

    /// Emit one diagnostic per function involved in a cycle: direct
    /// self-calls get `RECURSION_DETECTED`, mutual cycles get
    /// `INDIRECT_RECURSION_DETECTED` on every member.
    pub fn report_recursion(
        &self,
        spans: &IndexMap<String, Span>,
        diagnostics: &mut Diagnostics,
    ) {
        for scc in &self.recursive_sccs {
            if scc.len() == 1 {
                let name = scc.iter().next().unwrap();
                let span = spans.get(name).copied().unwrap_or_default();
                diagnostics.error(
                    Code::RecursionDetected,
                    format!("function '{}' calls itself; recursion is not supported", name),
                    span,
                );
            } else {
                let cycle: Vec<&str> = scc.iter().map(String::as_str).collect();
                for name in scc {
                    let span = spans.get(name).copied().unwrap_or_default();
                    diagnostics.error(
                        Code::IndirectRecursionDetected,
                        format!(
                            "function '{}' is part of a recursion cycle ({}); recursion is not supported",
                            name,
                            cycle.join(" -> ")
                        ),
                        span,
                    );
                }
            }
        }
    }

    /// Find strongly connected components using Tarjan's algorithm.
    ///
    /// Returns only SCCs that represent recursion: multi-function SCCs,
    /// and single functions that call themselves.
    fn find_sccs(&self) -> Vec<IndexSet<String>> {
        let mut index_counter = 0;
        let mut stack: Vec<String> = Vec::new();
        let mut on_stack: IndexSet<String> = IndexSet::new();
        let mut indices: IndexMap<String, usize> = IndexMap::new();
        let mut lowlinks: IndexMap<String, usize> = IndexMap::new();
        let mut sccs: Vec<IndexSet<String>> = Vec::new();

        for function in &self.functions {
            if !indices.contains_key(function) {
                self.tarjan_visit(
                    function,
                    &mut index_counter,
                    &mut stack,
                    &mut on_stack,
                    &mut indices,
                    &mut lowlinks,
                    &mut sccs,
                );
            }
        }

        sccs.into_iter()
            .filter(|scc| {
                if scc.len() > 1 {
                    true
                } else if let Some(function) = scc.iter().next() {
                    self.edges
                        .get(function)
                        .map(|callees| callees.contains(function))
                        .unwrap_or(false)
                } else {
                    false
                }
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn tarjan_visit(
        &self,
        function: &str,
        index_counter: &mut usize,
        stack: &mut Vec<String>,
        on_stack: &mut IndexSet<String>,
        indices: &mut IndexMap<String, usize>,
        lowlinks: &mut IndexMap<String, usize>,
        sccs: &mut Vec<IndexSet<String>>,
    ) {
        let index = *index_counter;
        *index_counter += 1;
        indices.insert(function.to_string(), index);
        lowlinks.insert(function.to_string(), index);
        stack.push(function.to_string());
        on_stack.insert(function.to_string());

        if let Some(callees) = self.edges.get(function) {
            for callee in callees {
                if !self.functions.contains(callee) {
                    // External or intrinsic, skip
                    continue;
                }
                if !indices.contains_key(callee) {
                    self.tarjan_visit(
                        callee,
                        index_counter,
                        stack,
                        on_stack,
                        indices,
                        lowlinks,
                        sccs,
                    );
                    let callee_lowlink = *lowlinks.get(callee).unwrap();
                    let lowlink = lowlinks.get_mut(function).unwrap();
                    *lowlink = (*lowlink).min(callee_lowlink);
                } else if on_stack.contains(callee) {
                    let callee_index = *indices.get(callee).unwrap();
                    let lowlink = lowlinks.get_mut(function).unwrap();
                    *lowlink = (*lowlink).min(callee_index);
                }
            }
        }

        if lowlinks.get(function) == indices.get(function) {
            let mut scc = IndexSet::new();
            loop {
                let f = stack.pop().unwrap();
                on_stack.swap_remove(&f);
                let done = f == function;
                scc.insert(f);
                if done {
                    break;
                }
            }
            sccs.push(scc);
        }
    }
}

fn extract_calls_from_stmt(
    stmt: &Stmt,
    known: &IndexSet<String>,
    caller: &str,
    calls: &mut IndexSet<String>,
    indirect: &mut Vec<(String, NodeId)>,
) {
    match stmt {
        Stmt::Variable(v) => {
            if let Some(init) = &v.initializer {
                extract_calls_from_expr(init, known, caller, calls, indirect);
            }
        }
        Stmt::Expr(s) => extract_calls_from_expr(&s.expr, known, caller, calls, indirect),
        Stmt::If(s) => {
            extract_calls_from_expr(&s.condition, known, caller, calls, indirect);
            for st in &s.then_body {
                extract_calls_from_stmt(st, known, caller, calls, indirect);
            }
            if let Some(else_body) = &s.else_body {
                for st in else_body {
                    extract_calls_from_stmt(st, known, caller, calls, indirect);
                }
            }
        }
        Stmt::While(s) => {
            extract_calls_from_expr(&s.condition, known, caller, calls, indirect);
            for st in &s.body {
                extract_calls_from_stmt(st, known, caller, calls, indirect);
            }
        }
        Stmt::For(s) => {
            extract_calls_from_expr(&s.from, known, caller, calls, indirect);
            extract_calls_from_expr(&s.to, known, caller, calls, indirect);
            if let Some(step) = &s.step {
                extract_calls_from_expr(step, known, caller, calls, indirect);
            }
            for st in &s.body {
                extract_calls_from_stmt(st, known, caller, calls, indirect);
            }
        }
        Stmt::Match(s) => {
            extract_calls_from_expr(&s.scrutinee, known, caller, calls, indirect);
            for arm in &s.arms {
                extract_calls_from_expr(&arm.value, known, caller, calls, indirect);
                for st in &arm.body {
                    extract_calls_from_stmt(st, known, caller, calls, indirect);
                }
            }
            if let Some(default) = &s.default {
                for st in default {
                    extract_calls_from_stmt(st, known, caller, calls, indirect);
                }
            }
        }
        Stmt::Return(s) => {
            if let Some(value) = &s.value {
                extract_calls_from_expr(value, known, caller, calls, indirect);
            }
        }
        Stmt::Break(_) | Stmt::Continue(_) => {}
    }
}

fn extract_calls_from_expr(
    expr: &Expr,
    known: &IndexSet<String>,
    caller: &str,
    calls: &mut IndexSet<String>,
    indirect: &mut Vec<(String, NodeId)>,
) {
    match &expr.kind {
        ExprKind::Call { callee, args } => {
            match &callee.kind {
                ExprKind::Identifier { name } if known.contains(name) => {
                    calls.insert(name.clone());
                }
                ExprKind::Identifier { .. } => {
                    // Intrinsic or callback variable: unknown target
                    indirect.push((caller.to_string(), expr.id));
                }
                _ => {
                    extract_calls_from_expr(callee, known, caller, calls, indirect);
                    indirect.push((caller.to_string(), expr.id));
                }
            }
            for a in args {
                extract_calls_from_expr(a, known, caller, calls, indirect);
            }
        }
        ExprKind::ArrayLiteral { elements } => {
            for e in elements {
                extract_calls_from_expr(e, known, caller, calls, indirect);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            extract_calls_from_expr(lhs, known, caller, calls, indirect);
            extract_calls_from_expr(rhs, known, caller, calls, indirect);
        }
        ExprKind::Unary { operand, .. } => {
            extract_calls_from_expr(operand, known, caller, calls, indirect);
        }
        ExprKind::Assign { target, value, .. } => {
            extract_calls_from_expr(target, known, caller, calls, indirect);
            extract_calls_from_expr(value, known, caller, calls, indirect);
        }
        ExprKind::Index { base, index } => {
            extract_calls_from_expr(base, known, caller, calls, indirect);
            extract_calls_from_expr(index, known, caller, calls, indirect);
        }
        ExprKind::Member { base, .. } => {
            extract_calls_from_expr(base, known, caller, calls, indirect);
        }
        ExprKind::IntLiteral { .. }
        | ExprKind::BoolLiteral { .. }
        | ExprKind::StringLiteral { .. }
        | ExprKind::Identifier { .. } => {}
    }
}

/// Declaration spans for every function, used for diagnostic locations.
pub fn function_spans(program: &Program) -> IndexMap<String, Span> {
    program
        .declarations
        .iter()
        .filter_map(|d| match d {
            Declaration::Function(f) => Some((f.name.clone(), f.span)),
            _ => None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;

    fn make_function(name: &str, calls: Vec<&str>) -> Declaration {
        build::function(
            name,
            vec![],
            None,
            calls
                .into_iter()
                .map(|c| build::expr_stmt(build::call(c, vec![])))
                .collect(),
        )
    }

    #[test]
    fn test_no_recursion() {
        let program = build::program(
            "m",
            vec![
                make_function("foo", vec!["bar"]),
                make_function("bar", vec![]),
                make_function("baz", vec!["foo"]),
            ],
        );
        let graph = CallGraph::build(&program);
        assert!(!graph.is_recursive("foo"));
        assert!(!graph.is_recursive("bar"));
        assert!(!graph.is_recursive("baz"));
        assert!(graph.recursive_cycles().is_empty());
    }

    #[test]
    fn test_direct_recursion() {
        let program = build::program(
            "m",
            vec![
                make_function("countdown", vec!["countdown"]),
                make_function("helper", vec![]),
            ],
        );
        let graph = CallGraph::build(&program);
        assert!(graph.is_recursive("countdown"));
        assert!(!graph.is_recursive("helper"));
        assert_eq!(graph.recursive_cycles().len(), 1);

        let mut diags = Diagnostics::new();
        graph.report_recursion(&function_spans(&program), &mut diags);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags.items()[0].code, Code::RecursionDetected);
    }

    #[test]
    fn test_mutual_recursion_pair() {
        let program = build::program(
            "m",
            vec![
                make_function("ping", vec!["pong"]),
                make_function("pong", vec!["ping"]),
            ],
        );
        let graph = CallGraph::build(&program);
        assert!(graph.is_recursive("ping"));
        assert!(graph.is_recursive("pong"));
        assert_eq!(graph.recursive_cycles().len(), 1);
        assert_eq!(graph.recursive_cycles()[0].len(), 2);

        // One diagnostic per function in the cycle
        let mut diags = Diagnostics::new();
        graph.report_recursion(&function_spans(&program), &mut diags);
        assert_eq!(diags.len(), 2);
        assert!(diags
            .iter()
            .all(|d| d.code == Code::IndirectRecursionDetected));
    }

    #[test]
    fn test_mutual_recursion_triple() {
        let program = build::program(
            "m",
            vec![
                make_function("a", vec!["b"]),
                make_function("b", vec!["c"]),
                make_function("c", vec!["a"]),
            ],
        );
        let graph = CallGraph::build(&program);
        assert!(graph.is_recursive("a"));
        assert!(graph.is_recursive("b"));
        assert!(graph.is_recursive("c"));
        assert_eq!(graph.recursive_cycles().len(), 1);
        assert_eq!(graph.recursive_cycles()[0].len(), 3);
    }

    #[test]
    fn test_multiple_independent_cycles() {
        let program = build::program(
            "m",
            vec![
                make_function("ping", vec!["pong"]),
                make_function("pong", vec!["ping"]),
                make_function("even", vec!["odd"]),
                make_function("odd", vec!["even"]),
                make_function("main", vec!["ping", "even"]),
            ],
        );
        let graph = CallGraph::build(&program);
        assert!(!graph.is_recursive("main"));
        assert_eq!(graph.recursive_cycles().len(), 2);
    }

    #[test]
    fn test_calls_to_unknown_names_are_indirect() {
        let program = build::program("m", vec![make_function("foo", vec!["peek", "rand"])]);
        let graph = CallGraph::build(&program);
        assert!(!graph.is_recursive("foo"));
        assert!(graph.callees("foo").unwrap().is_empty());
        assert_eq!(graph.indirect_sites().len(), 2);
        assert!(graph.has_indirect_calls("foo"));
    }

    #[test]
    fn test_calls_inside_control_flow_are_found() {
        let program = build::program(
            "m",
            vec![
                build::function(
                    "f",
                    vec![("c", "boolean")],
                    None,
                    vec![build::if_stmt(
                        build::ident("c"),
                        vec![build::expr_stmt(build::call("g", vec![]))],
                        Some(vec![build::while_stmt(
                            build::ident("c"),
                            vec![build::expr_stmt(build::call("h", vec![]))],
                        )]),
                    )],
                ),
                make_function("g", vec![]),
                make_function("h", vec![]),
            ],
        );
        let graph = CallGraph::build(&program);
        let callees = graph.callees("f").unwrap();
        assert!(callees.contains("g"));
        assert!(callees.contains("h"));
    }
}
