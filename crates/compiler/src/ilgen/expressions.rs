//! Expression layer
//!
//! Each expression lowers to one or more instructions yielding a result
//! register; `lower_expr` returns `None` only for calls to void
//! functions. Parameters are read straight from their construction-time
//! registers; other variables go through `LOAD_VAR`/`STORE_VAR` so the
//! SSA constructor can version them.
//!
//! Error policy: when the checker already rejected an expression the
//! generator emits a placeholder constant and keeps lowering, so the
//! resulting CFG is always structurally valid.

use super::state::ILGen;
use crate::ast::{BinaryOp, Expr, ExprKind, UnaryOp};
use crate::diagnostics::Code;
use crate::il::{BinOp, ILType, Instruction, RegId, UnOp, VarRef};
use crate::symtab::SymbolKind;
use crate::types::Type;

impl ILGen<'_> {
    /// Lower an expression to a value register, substituting a
    /// placeholder when the expression is void or failed to lower.
    pub(super) fn lower_value(&mut self, expr: &Expr) -> RegId {
        match self.lower_expr(expr) {
            Some(reg) => reg,
            None => {
                let ty = self.expr_il_type(expr.id);
                self.placeholder(ty)
            }
        }
    }

    /// Lower an expression. `None` means the expression produced no value
    /// (a call to a void function).
    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Option<RegId> {
        match &expr.kind {
            ExprKind::IntLiteral { value } => {
                let ty = self.expr_il_type(expr.id);
                let dest = self.temp(ty);
                self.emit(Instruction::Const {
                    dest,
                    value: *value,
                });
                Some(dest)
            }
            ExprKind::BoolLiteral { value } => {
                let dest = self.temp(ILType::Bool);
                self.emit(Instruction::Const {
                    dest,
                    value: i64::from(*value),
                });
                Some(dest)
            }
            ExprKind::StringLiteral { value } => {
                let dest = self.temp(ILType::Pointer);
                self.emit(Instruction::ConstString {
                    dest,
                    value: value.clone(),
                });
                Some(dest)
            }
            ExprKind::ArrayLiteral { .. } => {
                // Array literals are only valid as initializers, where the
                // statement layer expands them element by element
                self.error(
                    Code::TypeMismatch,
                    "array literal is only allowed as an initializer",
                    expr.span,
                );
                Some(self.placeholder(ILType::Byte))
            }
            ExprKind::Identifier { .. } => Some(self.lower_identifier(expr)),
            ExprKind::Binary { op, lhs, rhs } => {
                let l = self.lower_value(lhs);
                let r = self.lower_value(rhs);
                let ty = self.expr_il_type(expr.id);
                let dest = self.temp(ty);
                self.emit(Instruction::Binary {
                    op: lower_binop(*op),
                    dest,
                    lhs: l,
                    rhs: r,
                });
                Some(dest)
            }
            ExprKind::Unary { op, operand } => Some(self.lower_unary(*op, operand, expr)),
            ExprKind::Assign {
                compound,
                target,
                value,
            } => Some(self.lower_assign(*compound, target, value, expr)),
            ExprKind::Call { callee, args } => self.lower_call(callee, args, expr),
            ExprKind::Index { base, index } => Some(self.lower_index(base, index, expr)),
            ExprKind::Member { base, .. } => {
                // Already diagnosed by the checker
                self.lower_expr(base);
                Some(self.placeholder(ILType::Byte))
            }
        }
    }

    fn lower_identifier(&mut self, expr: &Expr) -> RegId {
        let Some(sym) = self.metadata.symbol(expr.id) else {
            return self.placeholder(ILType::Byte);
        };
        let symbol = self.table.symbol(sym);
        match symbol.kind {
            // Parameters are read directly from their registers
            SymbolKind::Parameter => match self.vars.get(&sym) {
                Some(VarRef::Reg(reg)) => *reg,
                _ => self.placeholder(ILType::Byte),
            },
            // A bare function name is its address, usable as a callback
            SymbolKind::Function => {
                let name = symbol.name.clone();
                let dest = self.temp(ILType::Pointer);
                self.emit(Instruction::AddrOf {
                    dest,
                    var: VarRef::Global(name),
                });
                dest
            }
            _ => {
                let ty = ILType::from_type(&symbol.type_or_unknown());
                match self.var_ref(sym) {
                    Some(var) => {
                        let dest = self.temp(ty);
                        self.emit(Instruction::LoadVar { dest, var });
                        dest
                    }
                    None => self.placeholder(ty),
                }
            }
        }
    }

    fn lower_unary(&mut self, op: UnaryOp, operand: &Expr, expr: &Expr) -> RegId {
        if op == UnaryOp::AddressOf {
            // Address-of needs a storable location, not a value
            if let ExprKind::Identifier { .. } = &operand.kind {
                if let Some(var) = self
                    .metadata
                    .symbol(operand.id)
                    .and_then(|sym| self.var_ref(sym))
                {
                    let dest = self.temp(ILType::Word);
                    self.emit(Instruction::AddrOf { dest, var });
                    return dest;
                }
            }
            return self.placeholder(ILType::Word);
        }

        let src = self.lower_value(operand);
        let ty = self.expr_il_type(expr.id);
        let dest = self.temp(ty);
        let op = match op {
            UnaryOp::Neg => UnOp::Neg,
            UnaryOp::Not => UnOp::Not,
            UnaryOp::BitNot => UnOp::BitNot,
            UnaryOp::AddressOf => unreachable!("handled above"),
        };
        self.emit(Instruction::Unary { op, dest, src });
        dest
    }

    fn lower_assign(
        &mut self,
        compound: Option<BinaryOp>,
        target: &Expr,
        value: &Expr,
        expr: &Expr,
    ) -> RegId {
        match &target.kind {
            ExprKind::Identifier { .. } => {
                let Some(var) = self
                    .metadata
                    .symbol(target.id)
                    .and_then(|sym| self.var_ref(sym))
                else {
                    self.lower_expr(value);
                    return self.placeholder(ILType::Byte);
                };
                let result = match compound {
                    None => self.lower_value(value),
                    Some(op) => {
                        let ty = self.expr_il_type(target.id);
                        let old = self.temp(ty.clone());
                        self.emit(Instruction::LoadVar {
                            dest: old,
                            var: var.clone(),
                        });
                        let rhs = self.lower_value(value);
                        let dest = self.temp(ty);
                        self.emit(Instruction::Binary {
                            op: lower_binop(op),
                            dest,
                            lhs: old,
                            rhs,
                        });
                        dest
                    }
                };
                self.emit(Instruction::StoreVar { var, src: result });
                result
            }
            ExprKind::Index { base, index } => {
                let Some(array) = self
                    .metadata
                    .symbol(base.id)
                    .and_then(|sym| self.var_ref(sym))
                else {
                    self.lower_expr(value);
                    return self.placeholder(ILType::Byte);
                };
                let idx = self.lower_value(index);
                let result = match compound {
                    None => self.lower_value(value),
                    Some(op) => {
                        let ty = self.expr_il_type(expr.id);
                        let old = self.temp(ty.clone());
                        self.emit(Instruction::LoadElem {
                            dest: old,
                            array: array.clone(),
                            index: idx,
                        });
                        let rhs = self.lower_value(value);
                        let dest = self.temp(ty);
                        self.emit(Instruction::Binary {
                            op: lower_binop(op),
                            dest,
                            lhs: old,
                            rhs,
                        });
                        dest
                    }
                };
                self.emit(Instruction::StoreElem {
                    array,
                    index: idx,
                    src: result,
                });
                result
            }
            _ => {
                // The checker already rejected this target
                self.lower_expr(value);
                self.placeholder(ILType::Byte)
            }
        }
    }

    fn lower_index(&mut self, base: &Expr, index: &Expr, expr: &Expr) -> RegId {
        let Some(array) = self
            .metadata
            .symbol(base.id)
            .and_then(|sym| self.var_ref(sym))
        else {
            self.lower_expr(index);
            return self.placeholder(self.expr_il_type(expr.id));
        };
        let idx = self.lower_value(index);
        let dest = self.temp(self.expr_il_type(expr.id));
        self.emit(Instruction::LoadElem {
            dest,
            array,
            index: idx,
        });
        dest
    }

    fn lower_call(&mut self, callee: &Expr, args: &[Expr], expr: &Expr) -> Option<RegId> {
        let ExprKind::Identifier { name } = &callee.kind else {
            // Call through an arbitrary expression value
            let target = self.lower_value(callee);
            let arg_regs: Vec<RegId> = args.iter().map(|a| self.lower_value(a)).collect();
            return self.finish_indirect(target, arg_regs, expr);
        };

        match self.metadata.symbol(callee.id) {
            Some(sym) => {
                let symbol = self.table.symbol(sym);
                match symbol.kind {
                    SymbolKind::Function if symbol.is_stub => {
                        // Stub bodies live elsewhere; calls go through the
                        // intrinsic path
                        let callee_name = symbol.name.clone();
                        self.module.register_intrinsic(&callee_name);
                        let arg_regs: Vec<RegId> =
                            args.iter().map(|a| self.lower_value(a)).collect();
                        self.finish_intrinsic(&callee_name, arg_regs, expr)
                    }
                    SymbolKind::Function | SymbolKind::Import => {
                        let callee_name = symbol.name.clone();
                        let arg_regs: Vec<RegId> =
                            args.iter().map(|a| self.lower_value(a)).collect();
                        let dest = self.call_dest(expr);
                        self.emit(Instruction::Call {
                            dest,
                            callee: callee_name,
                            args: arg_regs,
                        });
                        dest
                    }
                    // Callback stored in a variable or parameter
                    _ => {
                        let target = self.lower_identifier(callee);
                        let arg_regs: Vec<RegId> =
                            args.iter().map(|a| self.lower_value(a)).collect();
                        self.finish_indirect(target, arg_regs, expr)
                    }
                }
            }
            None => {
                if let Some(def) = crate::builtins::intrinsic(name) {
                    if def.compile_time {
                        return Some(self.fold_compile_time(&def, args, expr));
                    }
                    self.module.register_intrinsic(def.name);
                    let arg_regs: Vec<RegId> = args.iter().map(|a| self.lower_value(a)).collect();
                    self.finish_intrinsic(def.name, arg_regs, expr)
                } else if self.target.is_pure_intrinsic(name) || self.target.is_impure_intrinsic(name)
                {
                    // Target-declared intrinsic with no built-in signature
                    self.module.register_intrinsic(name);
                    let arg_regs: Vec<RegId> = args.iter().map(|a| self.lower_value(a)).collect();
                    self.finish_intrinsic(name, arg_regs, expr)
                } else {
                    // Undefined name, already diagnosed
                    Some(self.placeholder(ILType::Byte))
                }
            }
        }
    }

    fn finish_indirect(
        &mut self,
        target: RegId,
        args: Vec<RegId>,
        expr: &Expr,
    ) -> Option<RegId> {
        let dest = self.call_dest(expr);
        self.emit(Instruction::CallIndirect {
            dest,
            callee: target,
            args,
        });
        dest
    }

    fn finish_intrinsic(&mut self, name: &str, args: Vec<RegId>, expr: &Expr) -> Option<RegId> {
        let dest = self.call_dest(expr);
        self.emit(Instruction::Intrinsic {
            dest,
            name: name.to_string(),
            args,
        });
        dest
    }

    /// Result register for a call, or `None` for void.
    fn call_dest(&mut self, expr: &Expr) -> Option<RegId> {
        match self.metadata.expr_type(expr.id) {
            Some(Type::Void) => None,
            Some(ty) => {
                let ty = ILType::from_type(ty);
                Some(self.temp(ty))
            }
            None => Some(self.temp(ILType::Byte)),
        }
    }

    /// `sizeof`/`length` fold to constants without evaluating arguments.
    fn fold_compile_time(
        &mut self,
        def: &crate::builtins::Intrinsic,
        args: &[Expr],
        expr: &Expr,
    ) -> RegId {
        let dest = self.temp(ILType::Word);
        let value = match (def.name, args.first()) {
            ("sizeof", Some(arg)) => self
                .metadata
                .expr_type(arg.id)
                .map(|t| t.byte_size() as i64)
                .unwrap_or(0),
            ("length", Some(arg)) => match self.metadata.expr_type(arg.id) {
                Some(Type::Array { size: Some(n), .. }) => *n as i64,
                _ => {
                    self.error(
                        Code::ArraySizeUnknown,
                        "length of a value with no known array size",
                        expr.span,
                    );
                    0
                }
            },
            _ => {
                self.error(
                    Code::ArityMismatch,
                    format!("'{}' expects one argument", def.name),
                    expr.span,
                );
                0
            }
        };
        self.emit(Instruction::Const { dest, value });
        dest
    }
}

fn lower_binop(op: BinaryOp) -> BinOp {
    match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::Eq => BinOp::CmpEq,
        BinaryOp::Ne => BinOp::CmpNe,
        BinaryOp::Lt => BinOp::CmpLt,
        BinaryOp::Le => BinOp::CmpLe,
        BinaryOp::Gt => BinOp::CmpGt,
        BinaryOp::Ge => BinOp::CmpGe,
        // Logical operators reach here only with boolean operands, where
        // bitwise and logical agree
        BinaryOp::And | BinaryOp::BitAnd => BinOp::And,
        BinaryOp::Or | BinaryOp::BitOr => BinOp::Or,
        BinaryOp::BitXor => BinOp::Xor,
        BinaryOp::Shl => BinOp::Shl,
        BinaryOp::Shr => BinOp::Shr,
    }
}
