//! Purity analysis
//!
//! A function is pure when it writes no module-level state, calls no
//! impure function or side-effecting intrinsic, and has a known body.
//! Impurity propagates from callees to callers over the call graph until
//! nothing changes. Array writes are treated as impure: without alias
//! information an element store may be visible outside the function.
//!
//! The intrinsic purity classes come from the target configuration, not
//! from code.

use super::fixpoint_budget;
use crate::ast::{
    meta, Declaration, Expr, ExprKind, MetaValue, MetadataStore, Program, Stmt,
};
use crate::call_graph::CallGraph;
use crate::config::TargetConfig;
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::{SymbolKind, SymbolTable};
use indexmap::IndexMap;

/// Classify every function; attaches the `PURE` metadata flag to each
/// function declaration and returns name -> purity.
pub fn analyze_purity(
    program: &Program,
    call_graph: &CallGraph,
    table: &SymbolTable,
    metadata: &mut MetadataStore,
    target: &TargetConfig,
    diagnostics: &mut Diagnostics,
) -> IndexMap<String, bool> {
    let mut pure: IndexMap<String, bool> = IndexMap::new();

    // Local classification first
    for decl in &program.declarations {
        let Declaration::Function(f) = decl else {
            continue;
        };
        let locally_pure = match &f.body {
            None => false, // unknown body
            Some(body) => {
                let mut walker = PurityWalker {
                    table,
                    metadata,
                    target,
                    impure: false,
                };
                for stmt in body {
                    walker.walk_stmt(stmt);
                }
                !walker.impure
            }
        };
        pure.insert(f.name.clone(), locally_pure);
    }

    // Propagate impurity from callees to callers
    let n = pure.len();
    let budget = fixpoint_budget(n);
    let mut steps = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        for i in 0..n {
            steps += 1;
            if steps > budget {
                diagnostics.error(
                    Code::InternalError,
                    format!("purity propagation did not converge ({} functions)", n),
                    program.span,
                );
                changed = false;
                break;
            }
            let name = pure.get_index(i).map(|(k, _)| k.clone()).unwrap();
            if !pure[&name] {
                continue;
            }
            let impure_callee = call_graph
                .callees(&name)
                .map(|callees| callees.iter().any(|c| !pure.get(c).copied().unwrap_or(false)))
                .unwrap_or(false);
            if impure_callee {
                pure.insert(name, false);
                changed = true;
            }
        }
    }

    // Attach results
    for decl in &program.declarations {
        if let Declaration::Function(f) = decl {
            let is_pure = pure.get(&f.name).copied().unwrap_or(false);
            metadata.set(f.id, meta::PURE, MetaValue::Flag(is_pure));
        }
    }
    pure
}

struct PurityWalker<'a> {
    table: &'a SymbolTable,
    metadata: &'a MetadataStore,
    target: &'a TargetConfig,
    impure: bool,
}

impl PurityWalker<'_> {
    fn walk_stmt(&mut self, stmt: &Stmt) {
        if self.impure {
            return;
        }
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
                    self.walk_expr(value);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn walk_expr(&mut self, expr: &Expr) {
        if self.impure {
            return;
        }
        match &expr.kind {
            ExprKind::Assign { target, value, .. } => {
                match &target.kind {
                    ExprKind::Identifier { .. } => {
                        if let Some(sym) = self.metadata.symbol(target.id) {
                            let s = self.table.symbol(sym);
                            // Writes to module-level variables and maps are
                            // observable side effects
                            if s.scope == self.table.root() {
                                self.impure = true;
                                return;
                            }
                        }
                    }
                    ExprKind::Index { .. } => {
                        // Conservative aliasing: element stores may escape
                        self.impure = true;
                        return;
                    }
                    _ => self.walk_expr(target),
                }
                self.walk_expr(value);
            }
            ExprKind::Unary { op, operand } => {
                if *op == crate::ast::UnaryOp::AddressOf {
                    // Once an address exists, writes through it cannot be
                    // tracked
                    self.impure = true;
                    return;
                }
                self.walk_expr(operand);
            }
            ExprKind::Call { callee, args } => {
                match &callee.kind {
                    ExprKind::Identifier { name } => {
                        let is_function = self
                            .metadata
                            .symbol(callee.id)
                            .map(|id| self.table.symbol(id).kind == SymbolKind::Function)
                            .unwrap_or(false);
                        if is_function {
                            // Callee purity handled by propagation
                        } else if !self.target.is_pure_intrinsic(name) {
                            // Impure intrinsic, callback value, or unknown
                            // name: assume the worst
                            self.impure = true;
                            return;
                        }
                    }
                    _ => {
                        self.impure = true;
                        return;
                    }
                }
                for a in args {
                    self.walk_expr(a);
                }
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
}
