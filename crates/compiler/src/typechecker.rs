//! Type checking for Lode
//!
//! Third pass: visits every expression, computes and attaches its type,
//! and validates statements against the usual rules - numeric promotion
//! for arithmetic, widening-only assignment, boolean conditions, exact
//! call arity, lvalue and const discipline, and return/break/continue
//! placement.
//!
//! The checker is best-effort. A failed subexpression types as `Unknown`,
//! which is compatible with everything, so one mistake produces one
//! diagnostic instead of a cascade.

use crate::ast::{
    BinaryOp, Declaration, Expr, ExprKind, FunctionDecl, MetadataStore, Program, Span, Stmt,
    UnaryOp, VariableDecl,
};
use crate::diagnostics::{Code, Diagnostic, Diagnostics, Severity};
use crate::symtab::{SymbolKind, SymbolTable};
use crate::types::{Type, TypeSystem};
use tracing::debug;

/// Options controlling how eagerly the checker reports.
#[derive(Debug, Clone)]
pub struct CheckOptions {
    /// Stop analyzing after the first error
    pub stop_on_first_error: bool,
    /// Stop analyzing after this many errors (0 = unlimited)
    pub max_errors: usize,
    /// Emit warnings in addition to errors
    pub report_warnings: bool,
}

impl Default for CheckOptions {
    fn default() -> Self {
        CheckOptions {
            stop_on_first_error: false,
            max_errors: 0,
            report_warnings: true,
        }
    }
}

/// Type-check a program whose symbols and declared types are resolved.
pub fn check_program(
    program: &Program,
    table: &mut SymbolTable,
    type_system: &TypeSystem,
    metadata: &mut MetadataStore,
    diagnostics: &mut Diagnostics,
    options: &CheckOptions,
) {
    let mut checker = Checker {
        table,
        ts: type_system,
        metadata,
        diagnostics,
        options,
        current_return: None,
        loop_depth: 0,
        errors: 0,
        halted: false,
    };
    checker.run(program);
}

struct Checker<'a> {
    table: &'a mut SymbolTable,
    ts: &'a TypeSystem,
    metadata: &'a mut MetadataStore,
    diagnostics: &'a mut Diagnostics,
    options: &'a CheckOptions,
    current_return: Option<Type>,
    loop_depth: usize,
    errors: usize,
    halted: bool,
}

impl Checker<'_> {
    fn run(&mut self, program: &Program) {
        debug!(module = %program.module.name, "type checking");
        for decl in &program.declarations {
            if self.halted {
                break;
            }
            match decl {
                Declaration::Variable(v) => self.check_variable(v),
                Declaration::Function(f) => self.check_function(f),
                Declaration::Map(_) | Declaration::Import(_) => {}
            }
        }
    }

    fn check_variable(&mut self, v: &VariableDecl) {
        let Some(init) = &v.initializer else {
            return;
        };
        let value_ty = self.check_expr(init);
        let declared = self
            .metadata
            .symbol(v.id)
            .map(|id| self.table.symbol(id).type_or_unknown())
            .unwrap_or(Type::Unknown);
        if !self.ts.assignable(&value_ty, &declared) {
            self.error(
                Code::TypeMismatch,
                format!(
                    "cannot initialize '{}' of type {} with a value of type {}",
                    v.name, declared, value_ty
                ),
                v.span,
            );
        }
    }

    fn check_function(&mut self, f: &FunctionDecl) {
        let Some(scope) = self.table.scope_of(f.id) else {
            return;
        };
        let return_type = self
            .metadata
            .symbol(f.id)
            .map(|id| self.table.symbol(id).type_or_unknown())
            .and_then(|t| match t {
                Type::Callback(sig) => Some(sig.return_type.clone()),
                _ => None,
            })
            .unwrap_or(Type::Unknown);

        self.table.enter_scope(scope);
        self.current_return = Some(return_type);
        if let Some(body) = &f.body {
            for stmt in body {
                if self.halted {
                    break;
                }
                self.check_stmt(stmt);
            }
        }
        self.current_return = None;
        self.table.exit_scope();
    }

    fn check_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => self.check_variable(v),
            Stmt::Expr(s) => {
                self.check_expr(&s.expr);
            }
            Stmt::If(s) => {
                self.expect_boolean(&s.condition, "if condition");
                for st in &s.then_body {
                    self.check_stmt(st);
                }
                if let Some(else_body) = &s.else_body {
                    for st in else_body {
                        self.check_stmt(st);
                    }
                }
            }
            Stmt::While(s) => {
                self.expect_boolean(&s.condition, "while condition");
                self.loop_depth += 1;
                for st in &s.body {
                    self.check_stmt(st);
                }
                self.loop_depth -= 1;
            }
            Stmt::For(s) => {
                self.expect_numeric(&s.from, "for-loop start");
                self.expect_numeric(&s.to, "for-loop end");
                if let Some(step) = &s.step {
                    self.expect_numeric(step, "for-loop step");
                }
                self.loop_depth += 1;
                for st in &s.body {
                    self.check_stmt(st);
                }
                self.loop_depth -= 1;
            }
            Stmt::Match(s) => {
                let scrutinee = self.check_expr(&s.scrutinee);
                for arm in &s.arms {
                    let arm_ty = self.check_expr(&arm.value);
                    if !self.ts.assignable(&arm_ty, &scrutinee)
                        && !self.ts.assignable(&scrutinee, &arm_ty)
                    {
                        self.error(
                            Code::TypeMismatch,
                            format!(
                                "match arm of type {} is incompatible with scrutinee of type {}",
                                arm_ty, scrutinee
                            ),
                            arm.span,
                        );
                    }
                    for st in &arm.body {
                        self.check_stmt(st);
                    }
                }
                if let Some(default) = &s.default {
                    for st in default {
                        self.check_stmt(st);
                    }
                }
            }
            Stmt::Return(s) => self.check_return(s.value.as_ref(), s.span),
            Stmt::Break(s) => {
                if self.loop_depth == 0 {
                    self.error(Code::BreakOutsideLoop, "break outside of a loop", s.span);
                }
            }
            Stmt::Continue(s) => {
                if self.loop_depth == 0 {
                    self.error(
                        Code::ContinueOutsideLoop,
                        "continue outside of a loop",
                        s.span,
                    );
                }
            }
        }
    }

    fn check_return(&mut self, value: Option<&Expr>, span: Span) {
        let expected = self.current_return.clone().unwrap_or(Type::Unknown);
        match value {
            Some(expr) => {
                let actual = self.check_expr(expr);
                if expected == Type::Void {
                    self.error(
                        Code::ReturnValueInVoid,
                        "void function cannot return a value",
                        span,
                    );
                } else if !self.ts.assignable(&actual, &expected) {
                    self.error(
                        Code::TypeMismatch,
                        format!("cannot return {} from a function returning {}", actual, expected),
                        span,
                    );
                }
            }
            None => {
                if expected != Type::Void && !expected.is_unknown() {
                    // The generator still emits a void return to keep the IR
                    // well-formed, so this is only a warning
                    self.warn(
                        Code::MissingReturnValue,
                        format!("return without a value in a function returning {}", expected),
                        span,
                    );
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn check_expr(&mut self, expr: &Expr) -> Type {
        if self.halted {
            return Type::Unknown;
        }
        let ty = self.expr_type(expr);
        self.metadata.set_expr_type(expr.id, ty.clone());
        ty
    }

    fn expr_type(&mut self, expr: &Expr) -> Type {
        match &expr.kind {
            ExprKind::IntLiteral { value } => self.int_literal(*value, expr.span),
            ExprKind::BoolLiteral { .. } => Type::Boolean,
            ExprKind::StringLiteral { .. } => Type::String,
            ExprKind::ArrayLiteral { elements } => self.array_literal(elements, expr.span),
            ExprKind::Identifier { name } => self.identifier(name, expr),
            ExprKind::Binary { op, lhs, rhs } => self.binary(*op, lhs, rhs, expr.span),
            ExprKind::Unary { op, operand } => self.unary(*op, operand, expr.span),
            ExprKind::Assign {
                compound,
                target,
                value,
            } => self.assignment(*compound, target, value, expr.span),
            ExprKind::Call { callee, args } => self.call(callee, args, expr.span),
            ExprKind::Index { base, index } => self.index(base, index, expr.span),
            ExprKind::Member { base, .. } => {
                self.check_expr(base);
                self.error(
                    Code::MemberAccessUnsupported,
                    "member access is not supported yet",
                    expr.span,
                );
                Type::Unknown
            }
        }
    }

    fn int_literal(&mut self, value: i64, span: Span) -> Type {
        if value < 0 {
            self.error(
                Code::LiteralOutOfRange,
                format!("negative literal {} is not representable (types are unsigned)", value),
                span,
            );
            Type::Unknown
        } else if value <= 0xFF {
            Type::Byte
        } else if value <= 0xFFFF {
            Type::Word
        } else {
            self.error(
                Code::LiteralOutOfRange,
                format!("literal {} does not fit in 16 bits", value),
                span,
            );
            Type::Unknown
        }
    }

    fn array_literal(&mut self, elements: &[Expr], span: Span) -> Type {
        if elements.is_empty() {
            self.error(
                Code::TypeMismatch,
                "empty array literal needs a declared element type",
                span,
            );
            return Type::Unknown;
        }
        let mut element = self.check_expr(&elements[0]);
        for e in &elements[1..] {
            let t = self.check_expr(e);
            if t == element || t.is_unknown() || element.is_unknown() {
                continue;
            }
            if t.is_numeric() && element.is_numeric() {
                element = self.ts.promote_numeric(&element, &t);
            } else {
                self.error(
                    Code::TypeMismatch,
                    format!("array literal mixes {} and {}", element, t),
                    e.span,
                );
                element = Type::Unknown;
            }
        }
        self.ts.create_array_type(element, Some(elements.len()))
    }

    fn identifier(&mut self, name: &str, expr: &Expr) -> Type {
        match self.table.lookup(name) {
            Some(id) => {
                self.metadata.set_symbol(expr.id, id);
                self.table.symbol(id).type_or_unknown()
            }
            None => {
                self.error(
                    Code::UndefinedVariable,
                    format!("unknown name '{}'", name),
                    expr.span,
                );
                Type::Unknown
            }
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr, span: Span) -> Type {
        let lt = self.check_expr(lhs);
        let rt = self.check_expr(rhs);

        if op.is_arithmetic() || op.is_bitwise() {
            if !lt.is_numeric() || !rt.is_numeric() {
                self.error(
                    Code::TypeMismatch,
                    format!("operator '{}' needs numeric operands, got {} and {}", op.token(), lt, rt),
                    span,
                );
                return Type::Unknown;
            }
            self.ts.promote_numeric(&lt, &rt)
        } else if op.is_comparison() {
            if !self.ts.assignable(&lt, &rt) && !self.ts.assignable(&rt, &lt) {
                self.error(
                    Code::TypeMismatch,
                    format!("cannot compare {} with {}", lt, rt),
                    span,
                );
            }
            Type::Boolean
        } else {
            // Logical
            if lt != Type::Boolean && !lt.is_unknown() {
                self.error(
                    Code::TypeMismatch,
                    format!("operator '{}' needs boolean operands, got {}", op.token(), lt),
                    lhs.span,
                );
            }
            if rt != Type::Boolean && !rt.is_unknown() {
                self.error(
                    Code::TypeMismatch,
                    format!("operator '{}' needs boolean operands, got {}", op.token(), rt),
                    rhs.span,
                );
            }
            Type::Boolean
        }
    }

    fn unary(&mut self, op: UnaryOp, operand: &Expr, span: Span) -> Type {
        let ty = self.check_expr(operand);
        match op {
            UnaryOp::Neg | UnaryOp::BitNot => {
                if !ty.is_numeric() {
                    self.error(
                        Code::TypeMismatch,
                        format!("operator '{}' needs a numeric operand, got {}", op.token(), ty),
                        span,
                    );
                    return Type::Unknown;
                }
                ty
            }
            UnaryOp::Not => {
                if ty != Type::Boolean && !ty.is_unknown() {
                    self.error(
                        Code::TypeMismatch,
                        format!("operator '!' needs a boolean operand, got {}", ty),
                        span,
                    );
                }
                Type::Boolean
            }
            UnaryOp::AddressOf => {
                if !is_lvalue(operand) {
                    self.error(
                        Code::InvalidLvalue,
                        "'@' needs a variable, index, or member expression",
                        span,
                    );
                }
                Type::Word
            }
        }
    }

    fn assignment(
        &mut self,
        compound: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Type {
        if !is_lvalue(target) {
            self.error(
                Code::InvalidLvalue,
                "assignment target must be a variable, index, or member expression",
                span,
            );
            self.check_expr(value);
            return Type::Unknown;
        }

        let target_ty = self.check_expr(target);
        let value_ty = self.check_expr(value);

        // Const discipline applies to the root identifier
        if let ExprKind::Identifier { .. } = &target.kind {
            if let Some(id) = self.metadata.symbol(target.id) {
                let sym = self.table.symbol(id);
                if sym.is_const || sym.kind == SymbolKind::Const {
                    self.error(
                        Code::ConstAssignment,
                        format!("cannot assign to constant '{}'", sym.name),
                        span,
                    );
                }
            }
        }

        match compound {
            None => {
                if !self.ts.assignable(&value_ty, &target_ty) {
                    self.error(
                        Code::TypeMismatch,
                        format!("cannot assign {} to {}", value_ty, target_ty),
                        span,
                    );
                }
            }
            Some(op) => {
                let category_ok = if op.is_logical() {
                    target_ty == Type::Boolean || target_ty.is_unknown()
                } else {
                    target_ty.is_numeric() && value_ty.is_numeric()
                };
                if !category_ok {
                    self.error(
                        Code::TypeMismatch,
                        format!(
                            "operator '{}=' cannot combine {} and {}",
                            op.token(),
                            target_ty,
                            value_ty
                        ),
                        span,
                    );
                } else if !op.is_logical() {
                    // The promoted result must fit back into the target: a
                    // byte target does not silently widen to word
                    let promoted = self.ts.promote_numeric(&target_ty, &value_ty);
                    if !self.ts.assignable(&promoted, &target_ty) {
                        self.error(
                            Code::TypeMismatch,
                            format!(
                                "result of '{}=' is {}, which does not fit back into {}",
                                op.token(),
                                promoted,
                                target_ty
                            ),
                            span,
                        );
                    }
                }
            }
        }
        target_ty
    }

    fn call(&mut self, callee: &Expr, args: &[Expr], span: Span) -> Type {
        // Call targets resolve through the symbol table first, then the
        // built-in intrinsic catalogue (peek, poke, lo, hi, ...), which
        // needs no declarations
        let callee_ty = match &callee.kind {
            ExprKind::Identifier { name } => {
                let ty = if let Some(id) = self.table.lookup(name) {
                    self.metadata.set_symbol(callee.id, id);
                    self.table.symbol(id).type_or_unknown()
                } else if let Some(intrinsic) = crate::builtins::intrinsic(name) {
                    self.ts.create_callback_type(intrinsic.signature())
                } else {
                    self.error(
                        Code::UndefinedVariable,
                        format!("unknown name '{}'", name),
                        callee.span,
                    );
                    Type::Unknown
                };
                self.metadata.set_expr_type(callee.id, ty.clone());
                ty
            }
            _ => self.check_expr(callee),
        };
        let arg_types: Vec<Type> = args.iter().map(|a| self.check_expr(a)).collect();

        let sig = match callee_ty {
            Type::Callback(sig) => sig,
            Type::Unknown => return Type::Unknown,
            other => {
                self.error(
                    Code::NotCallable,
                    format!("value of type {} is not callable", other),
                    span,
                );
                return Type::Unknown;
            }
        };

        if arg_types.len() != sig.param_types.len() {
            self.error(
                Code::ArityMismatch,
                format!(
                    "call expects {} argument(s), got {}",
                    sig.param_types.len(),
                    arg_types.len()
                ),
                span,
            );
            return sig.return_type.clone();
        }
        for (i, (arg, param)) in arg_types.iter().zip(&sig.param_types).enumerate() {
            if !self.ts.assignable(arg, param) {
                self.error(
                    Code::TypeMismatch,
                    format!("argument {} has type {}, expected {}", i + 1, arg, param),
                    args[i].span,
                );
            }
        }
        sig.return_type.clone()
    }

    fn index(&mut self, base: &Expr, index: &Expr, span: Span) -> Type {
        let base_ty = self.check_expr(base);
        self.expect_numeric(index, "array index");
        match base_ty {
            Type::Array { element, .. } => *element,
            Type::Unknown => Type::Unknown,
            other => {
                self.error(
                    Code::NotAnArray,
                    format!("cannot index into a value of type {}", other),
                    span,
                );
                Type::Unknown
            }
        }
    }

    // ------------------------------------------------------------------
    // Helpers
    // ------------------------------------------------------------------

    fn expect_boolean(&mut self, expr: &Expr, what: &str) {
        let ty = self.check_expr(expr);
        if ty != Type::Boolean && !ty.is_unknown() {
            self.error(
                Code::TypeMismatch,
                format!("{} must be boolean, got {}", what, ty),
                expr.span,
            );
        }
    }

    fn expect_numeric(&mut self, expr: &Expr, what: &str) {
        let ty = self.check_expr(expr);
        if !ty.is_numeric() {
            self.error(
                Code::TypeMismatch,
                format!("{} must be numeric, got {}", what, ty),
                expr.span,
            );
        }
    }

    fn error(&mut self, code: Code, message: impl Into<String>, span: Span) {
        if self.halted {
            return;
        }
        self.diagnostics
            .push(Diagnostic::error(code, message, span));
        self.errors += 1;
        if self.options.stop_on_first_error
            || (self.options.max_errors > 0 && self.errors >= self.options.max_errors)
        {
            self.halted = true;
        }
    }

    fn warn(&mut self, code: Code, message: impl Into<String>, span: Span) {
        if self.halted || !self.options.report_warnings {
            return;
        }
        self.diagnostics
            .push(Diagnostic {
                severity: Severity::Warning,
                code,
                message: message.into(),
                location: span,
                related: Vec::new(),
            });
    }
}

/// Expressions that denote a storable location.
pub fn is_lvalue(expr: &Expr) -> bool {
    matches!(
        expr.kind,
        ExprKind::Identifier { .. } | ExprKind::Index { .. } | ExprKind::Member { .. }
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;
    use crate::symbols::build_symbol_table;
    use crate::type_resolver::resolve_types;

    fn analyze(program: &Program) -> (MetadataStore, Diagnostics) {
        analyze_with(program, &CheckOptions::default())
    }

    fn analyze_with(program: &Program, options: &CheckOptions) -> (MetadataStore, Diagnostics) {
        let mut metadata = MetadataStore::new();
        let mut diagnostics = Diagnostics::new();
        let ts = TypeSystem::new();
        let mut table = build_symbol_table(program, &mut metadata, &mut diagnostics);
        resolve_types(program, &mut table, &ts, &metadata, &mut diagnostics);
        check_program(
            program,
            &mut table,
            &ts,
            &mut metadata,
            &mut diagnostics,
            options,
        );
        (metadata, diagnostics)
    }

    fn codes(diags: &Diagnostics) -> Vec<Code> {
        diags.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_add_function_types_cleanly() {
        let program = build::program(
            "m",
            vec![build::function(
                "add",
                vec![("a", "byte"), ("b", "byte")],
                Some("byte"),
                vec![build::ret(Some(build::binary(
                    BinaryOp::Add,
                    build::ident("a"),
                    build::ident("b"),
                )))],
            )],
        );
        let (metadata, diags) = analyze(&program);
        assert!(diags.is_empty(), "{:?}", diags.items());

        // The return expression is typed byte
        if let Declaration::Function(f) = &program.declarations[0] {
            if let Stmt::Return(r) = &f.body.as_ref().unwrap()[0] {
                let expr = r.value.as_ref().unwrap();
                assert_eq!(metadata.expr_type(expr.id), Some(&Type::Byte));
            }
        }
    }

    #[test]
    fn test_literal_boundaries() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![
                    build::let_stmt("a", Some("byte"), Some(build::int(255))),
                    build::let_stmt("b", Some("word"), Some(build::int(256))),
                    build::let_stmt("c", Some("word"), Some(build::int(70000))),
                    build::let_stmt("d", Some("byte"), Some(build::int(-1))),
                ],
            )],
        );
        let (_, diags) = analyze(&program);
        let errors = codes(&diags);
        assert_eq!(
            errors,
            vec![Code::LiteralOutOfRange, Code::LiteralOutOfRange]
        );
    }

    #[test]
    fn test_narrowing_assignment_rejected() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("w", "word")],
                None,
                vec![
                    build::let_stmt("b", Some("byte"), None),
                    build::expr_stmt(build::assign(build::ident("b"), build::ident("w"))),
                ],
            )],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::TypeMismatch]);
    }

    #[test]
    fn test_widening_assignment_allowed() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("b", "byte")],
                None,
                vec![
                    build::let_stmt("w", Some("word"), None),
                    build::expr_stmt(build::assign(build::ident("w"), build::ident("b"))),
                ],
            )],
        );
        let (_, diags) = analyze(&program);
        assert!(diags.is_empty(), "{:?}", diags.items());
    }

    #[test]
    fn test_const_assignment_rejected() {
        let mut decl = build::var_decl("limit", Some("byte"), Some(build::int(10)));
        decl.constant = true;
        let program = build::program(
            "m",
            vec![
                Declaration::Variable(decl),
                build::function(
                    "f",
                    vec![],
                    None,
                    vec![build::expr_stmt(build::assign(
                        build::ident("limit"),
                        build::int(1),
                    ))],
                ),
            ],
        );
        let (_, diags) = analyze(&program);
        assert!(codes(&diags).contains(&Code::ConstAssignment));
    }

    #[test]
    fn test_compound_assignment_rules() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("b", "byte"), ("w", "word")],
                None,
                vec![
                    // byte += byte is fine
                    build::expr_stmt(build::compound_assign(
                        BinaryOp::Add,
                        build::ident("b"),
                        build::int(1),
                    )),
                    // byte += word would widen the target
                    build::expr_stmt(build::compound_assign(
                        BinaryOp::Add,
                        build::ident("b"),
                        build::ident("w"),
                    )),
                ],
            )],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::TypeMismatch]);
    }

    #[test]
    fn test_call_arity_and_argument_types() {
        let program = build::program(
            "m",
            vec![
                build::function("target", vec![("x", "byte")], None, vec![]),
                build::function(
                    "f",
                    vec![("w", "word")],
                    None,
                    vec![
                        build::expr_stmt(build::call("target", vec![])),
                        build::expr_stmt(build::call("target", vec![build::ident("w")])),
                    ],
                ),
            ],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::ArityMismatch, Code::TypeMismatch]);
    }

    #[test]
    fn test_undefined_variable() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![build::expr_stmt(build::ident("ghost"))],
            )],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::UndefinedVariable]);
    }

    #[test]
    fn test_return_rules() {
        let program = build::program(
            "m",
            vec![
                build::function("v", vec![], None, vec![build::ret(Some(build::int(1)))]),
                build::function("b", vec![], Some("byte"), vec![build::ret(None)]),
            ],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(
            codes(&diags),
            vec![Code::ReturnValueInVoid, Code::MissingReturnValue]
        );
        assert_eq!(diags.error_count(), 1); // the missing value is a warning
    }

    #[test]
    fn test_break_continue_outside_loop() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![build::brk(), build::cont()],
            )],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(
            codes(&diags),
            vec![Code::BreakOutsideLoop, Code::ContinueOutsideLoop]
        );
    }

    #[test]
    fn test_member_access_placeholder() {
        let program = build::program(
            "m",
            vec![
                build::global("g", Some("byte"), None),
                build::function(
                    "f",
                    vec![],
                    None,
                    vec![build::expr_stmt(crate::ast::Expr {
                        id: crate::ast::NodeId::default(),
                        kind: ExprKind::Member {
                            base: Box::new(build::ident("g")),
                            member: "lo".to_string(),
                        },
                        span: Span::default(),
                    })],
                ),
            ],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::MemberAccessUnsupported]);
    }

    #[test]
    fn test_index_rules() {
        let program = build::program(
            "m",
            vec![
                build::global(
                    "arr",
                    Some("byte[]"),
                    Some(build::array(vec![build::int(1), build::int(2)])),
                ),
                build::function(
                    "f",
                    vec![("i", "byte")],
                    Some("byte"),
                    vec![build::ret(Some(build::index(
                        build::ident("arr"),
                        build::ident("i"),
                    )))],
                ),
                build::function(
                    "g",
                    vec![("x", "byte")],
                    None,
                    vec![build::expr_stmt(build::index(build::ident("x"), build::int(0)))],
                ),
            ],
        );
        let (_, diags) = analyze(&program);
        assert_eq!(codes(&diags), vec![Code::NotAnArray]);
    }

    #[test]
    fn test_logical_and_comparison_results() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("a", "byte"), ("b", "word")],
                None,
                vec![build::let_stmt(
                    "ok",
                    Some("boolean"),
                    Some(build::binary(
                        BinaryOp::And,
                        build::binary(BinaryOp::Lt, build::ident("a"), build::ident("b")),
                        build::boolean(true),
                    )),
                )],
            )],
        );
        let (_, diags) = analyze(&program);
        assert!(diags.is_empty(), "{:?}", diags.items());
    }

    #[test]
    fn test_stop_on_first_error() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![
                    build::expr_stmt(build::ident("ghost1")),
                    build::expr_stmt(build::ident("ghost2")),
                ],
            )],
        );
        let (_, diags) = analyze_with(
            &program,
            &CheckOptions {
                stop_on_first_error: true,
                ..CheckOptions::default()
            },
        );
        assert_eq!(diags.error_count(), 1);
    }

    #[test]
    fn test_unknown_does_not_cascade() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![build::let_stmt(
                    "x",
                    Some("byte"),
                    Some(build::binary(
                        BinaryOp::Add,
                        build::ident("ghost"),
                        build::int(1),
                    )),
                )],
            )],
        );
        let (_, diags) = analyze(&program);
        // One undefined-variable error, no follow-on mismatch noise
        assert_eq!(codes(&diags), vec![Code::UndefinedVariable]);
    }
}
