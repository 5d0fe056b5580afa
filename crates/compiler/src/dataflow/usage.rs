//! Usage analysis and zero-page scoring
//!
//! Counts reads and writes per variable and records loop nesting, then
//! scores each variable for zero-page placement: accesses inside loops
//! are worth `loop_multiplier * (depth + 1)` times a straight-line
//! access. The backend's zero-page allocator sorts by this score.
//!
//! Locals that are never read produce `UNUSED_VARIABLE` warnings here.

use crate::ast::{
    meta, Declaration, Expr, ExprKind, MetaValue, MetadataStore, Program, Stmt, UnaryOp,
};
use crate::config::TargetConfig;
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::{SymbolId, SymbolKind, SymbolTable};
use indexmap::IndexMap;

/// Access profile of one variable.
#[derive(Debug, Default, Clone)]
pub struct VarUsage {
    pub reads: u64,
    pub writes: u64,
    pub used_in_loop: bool,
    pub max_loop_depth: u32,
    pub address_taken: bool,
    pub zp_score: u64,
}

impl VarUsage {
    pub fn total_accesses(&self) -> u64 {
        self.reads + self.writes
    }
}

/// Program-wide usage profile, in symbol declaration order.
#[derive(Debug, Default)]
pub struct UsageSummary {
    pub vars: IndexMap<SymbolId, VarUsage>,
}

impl UsageSummary {
    pub fn of(&self, symbol: SymbolId) -> Option<&VarUsage> {
        self.vars.get(&symbol)
    }
}

/// Count accesses, score zero-page candidates, and warn about unused
/// locals.
pub fn analyze_usage(
    program: &Program,
    table: &SymbolTable,
    metadata: &mut MetadataStore,
    target: &TargetConfig,
    diagnostics: &mut Diagnostics,
) -> UsageSummary {
    let mut counter = Counter {
        metadata,
        vars: IndexMap::new(),
        loop_depth: 0,
    };

    for decl in &program.declarations {
        match decl {
            Declaration::Variable(v) => {
                if let Some(init) = &v.initializer {
                    counter.read_expr(init);
                }
            }
            Declaration::Function(f) => {
                if let Some(body) = &f.body {
                    for stmt in body {
                        counter.walk_stmt(stmt);
                    }
                }
            }
            _ => {}
        }
    }

    let mut summary = UsageSummary { vars: counter.vars };

    // Score and attach
    let multiplier = target.zero_page.loop_multiplier;
    for (sym, usage) in summary.vars.iter_mut() {
        usage.zp_score = if usage.used_in_loop {
            usage.total_accesses() * (multiplier * (usage.max_loop_depth as u64 + 1))
        } else {
            usage.total_accesses()
        };
        let node = table.symbol(*sym).decl_node;
        metadata.set(node, meta::READ_COUNT, MetaValue::Count(usage.reads));
        metadata.set(node, meta::WRITE_COUNT, MetaValue::Count(usage.writes));
        metadata.set(node, meta::USED_IN_LOOP, MetaValue::Flag(usage.used_in_loop));
        metadata.set(node, meta::ZP_SCORE, MetaValue::Count(usage.zp_score));
    }

    // Unused-local warnings, in declaration order
    for (id, sym) in table.all_symbols() {
        if sym.kind != SymbolKind::Variable || sym.scope == table.root() || sym.is_exported {
            continue;
        }
        let unused = summary
            .vars
            .get(&id)
            .map(|u| u.reads == 0 && !u.address_taken)
            .unwrap_or(true);
        if unused {
            diagnostics.warning(
                Code::UnusedVariable,
                format!("variable '{}' is never read", sym.name),
                sym.location,
            );
        }
    }

    summary
}

struct Counter<'a> {
    metadata: &'a MetadataStore,
    vars: IndexMap<SymbolId, VarUsage>,
    loop_depth: u32,
}

impl Counter<'_> {
    fn record(&mut self, sym: SymbolId, write: bool) {
        let depth = self.loop_depth;
        let usage = self.vars.entry(sym).or_default();
        if write {
            usage.writes += 1;
        } else {
            usage.reads += 1;
        }
        if depth > 0 {
            usage.used_in_loop = true;
            usage.max_loop_depth = usage.max_loop_depth.max(depth - 1);
        }
    }

    fn walk_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => {
                if let Some(init) = &v.initializer {
                    self.read_expr(init);
                    if let Some(sym) = self.metadata.symbol(v.id) {
                        self.record(sym, true);
                    }
                }
            }
            Stmt::Expr(s) => self.read_expr(&s.expr),
            Stmt::If(s) => {
                self.read_expr(&s.condition);
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
                self.loop_depth += 1;
                self.read_expr(&s.condition);
                for st in &s.body {
                    self.walk_stmt(st);
                }
                self.loop_depth -= 1;
            }
            Stmt::For(s) => {
                self.read_expr(&s.from);
                self.read_expr(&s.to);
                if let Some(step) = &s.step {
                    self.read_expr(step);
                }
                self.loop_depth += 1;
                if let Some(sym) = self.metadata.symbol(s.id) {
                    // Initialized once, then read and bumped every pass
                    self.record(sym, true);
                    self.record(sym, false);
                }
                for st in &s.body {
                    self.walk_stmt(st);
                }
                self.loop_depth -= 1;
            }
            Stmt::Match(s) => {
                self.read_expr(&s.scrutinee);
                for arm in &s.arms {
                    self.read_expr(&arm.value);
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
                    self.read_expr(value);
                }
            }
            Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn read_expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Identifier { .. } => {
                if let Some(sym) = self.metadata.symbol(expr.id) {
                    self.record(sym, false);
                }
            }
            ExprKind::Assign {
                compound,
                target,
                value,
            } => {
                match &target.kind {
                    ExprKind::Identifier { .. } => {
                        if let Some(sym) = self.metadata.symbol(target.id) {
                            if compound.is_some() {
                                self.record(sym, false);
                            }
                            self.record(sym, true);
                        }
                    }
                    ExprKind::Index { base, index } => {
                        // Element store: the array is written, the index read
                        if let ExprKind::Identifier { .. } = &base.kind {
                            if let Some(sym) = self.metadata.symbol(base.id) {
                                self.record(sym, true);
                            }
                        } else {
                            self.read_expr(base);
                        }
                        self.read_expr(index);
                    }
                    _ => self.read_expr(target),
                }
                self.read_expr(value);
            }
            ExprKind::Unary { op, operand } => {
                if *op == UnaryOp::AddressOf {
                    if let ExprKind::Identifier { .. } = &operand.kind {
                        if let Some(sym) = self.metadata.symbol(operand.id) {
                            self.vars.entry(sym).or_default().address_taken = true;
                        }
                    }
                }
                self.read_expr(operand);
            }
            ExprKind::ArrayLiteral { elements } => {
                for e in elements {
                    self.read_expr(e);
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                self.read_expr(lhs);
                self.read_expr(rhs);
            }
            ExprKind::Call { callee, args } => {
                if !matches!(callee.kind, ExprKind::Identifier { .. }) {
                    self.read_expr(callee);
                }
                for a in args {
                    self.read_expr(a);
                }
            }
            ExprKind::Index { base, index } => {
                self.read_expr(base);
                self.read_expr(index);
            }
            ExprKind::Member { base, .. } => self.read_expr(base),
            ExprKind::IntLiteral { .. }
            | ExprKind::BoolLiteral { .. }
            | ExprKind::StringLiteral { .. } => {}
        }
    }
}
