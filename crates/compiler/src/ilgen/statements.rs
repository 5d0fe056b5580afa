//! Statement layer
//!
//! Lowers statements into blocks and terminators. Control flow follows
//! fixed shapes: `if` gets then/else/merge blocks, `while` gets
//! header/body/exit with a back-edge, `for` adds an explicit increment
//! block, and `match` becomes a chain of compare-and-branch tests. The
//! loop-context stack resolves `break` and `continue`.

use super::state::{ILGen, LoopTargets};
use crate::ast::{ExprKind, ForStmt, IfStmt, MatchStmt, Stmt, VariableDecl, WhileStmt};
use crate::diagnostics::Code;
use crate::il::{BinOp, ILType, Instruction};

impl ILGen<'_> {
    pub(super) fn lower_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => self.lower_var_init(v),
            Stmt::Expr(s) => {
                // Evaluate for effect, discard the result register
                self.lower_expr(&s.expr);
            }
            Stmt::If(s) => self.lower_if(s),
            Stmt::While(s) => self.lower_while(s),
            Stmt::For(s) => self.lower_for(s),
            Stmt::Match(s) => self.lower_match(s),
            Stmt::Return(s) => {
                match &s.value {
                    Some(value) => {
                        let reg = self.lower_value(value);
                        if self.return_type == ILType::Void {
                            // Already diagnosed by the checker; keep the IR
                            // well-formed
                            self.terminate(Instruction::ReturnVoid);
                        } else {
                            self.terminate(Instruction::Return { value: reg });
                        }
                    }
                    None => self.terminate(Instruction::ReturnVoid),
                }
            }
            Stmt::Break(s) => match self.loops.last().copied() {
                Some(ctx) => self.terminate(Instruction::Jump {
                    target: ctx.break_target,
                }),
                None => self.error(Code::BreakOutsideLoop, "break outside of a loop", s.span),
            },
            Stmt::Continue(s) => match self.loops.last().copied() {
                Some(ctx) => self.terminate(Instruction::Jump {
                    target: ctx.continue_target,
                }),
                None => self.error(
                    Code::ContinueOutsideLoop,
                    "continue outside of a loop",
                    s.span,
                ),
            },
        }
    }

    fn lower_var_init(&mut self, v: &VariableDecl) {
        let Some(init) = &v.initializer else {
            return;
        };
        let Some(sym) = self.metadata.symbol(v.id) else {
            return;
        };
        let Some(var) = self.var_ref(sym) else {
            return;
        };

        // Array literals initialize element by element
        if let ExprKind::ArrayLiteral { elements } = &init.kind {
            for (i, element) in elements.iter().enumerate() {
                let value = self.lower_value(element);
                let index = self.temp(ILType::Word);
                self.emit(Instruction::Const {
                    dest: index,
                    value: i as i64,
                });
                self.emit(Instruction::StoreElem {
                    array: var.clone(),
                    index,
                    src: value,
                });
            }
            return;
        }

        let value = self.lower_value(init);
        self.emit(Instruction::StoreVar { var, src: value });
    }

    fn lower_if(&mut self, s: &IfStmt) {
        let cond = self.lower_value(&s.condition);
        let then_block = self.func().add_block("then");
        let else_block = s.else_body.as_ref().map(|_| self.func().add_block("else"));
        let merge = self.func().add_block("merge");

        self.terminate(Instruction::Branch {
            cond,
            then_target: then_block,
            else_target: else_block.unwrap_or(merge),
        });

        self.switch_to(then_block);
        for stmt in &s.then_body {
            self.lower_stmt(stmt);
        }
        if !self.current_terminated() {
            self.terminate(Instruction::Jump { target: merge });
        }

        if let (Some(else_block), Some(else_body)) = (else_block, &s.else_body) {
            self.switch_to(else_block);
            for stmt in else_body {
                self.lower_stmt(stmt);
            }
            if !self.current_terminated() {
                self.terminate(Instruction::Jump { target: merge });
            }
        }

        self.switch_to(merge);
        if self.func_ref().block(merge).predecessors.is_empty() {
            // Both arms terminated; whatever follows is unreachable
            self.func().block_mut(merge).unreachable = true;
        }
    }

    fn lower_while(&mut self, s: &WhileStmt) {
        let header = self.func().add_block("while_header");
        let body = self.func().add_block("while_body");
        let exit = self.func().add_block("while_exit");

        self.terminate(Instruction::Jump { target: header });
        self.switch_to(header);
        let cond = self.lower_value(&s.condition);
        self.terminate(Instruction::Branch {
            cond,
            then_target: body,
            else_target: exit,
        });

        self.loops.push(LoopTargets {
            continue_target: header,
            break_target: exit,
        });
        self.switch_to(body);
        for stmt in &s.body {
            self.lower_stmt(stmt);
        }
        if !self.current_terminated() {
            self.terminate(Instruction::Jump { target: header });
        }
        self.loops.pop();

        self.switch_to(exit);
    }

    /// `for` is the while pattern plus an explicit increment block that
    /// `continue` targets.
    fn lower_for(&mut self, s: &ForStmt) {
        let Some(sym) = self
            .metadata
            .symbol(s.id)
            .or_else(|| self.vars.keys().copied().find(|&k| self.table.symbol(k).name == s.var))
        else {
            return;
        };
        let Some(var) = self.var_ref(sym) else {
            return;
        };
        let var_ty = ILType::from_type(&self.table.symbol(sym).type_or_unknown());

        // Initialize the loop variable
        let from = self.lower_value(&s.from);
        self.emit(Instruction::StoreVar {
            var: var.clone(),
            src: from,
        });

        let header = self.func().add_block("for_header");
        let body = self.func().add_block("for_body");
        let incr = self.func().add_block("for_incr");
        let exit = self.func().add_block("for_exit");

        self.terminate(Instruction::Jump { target: header });

        // header: continue while var <= to
        self.switch_to(header);
        let current = self.temp(var_ty.clone());
        self.emit(Instruction::LoadVar {
            dest: current,
            var: var.clone(),
        });
        let to = self.lower_value(&s.to);
        let cond = self.temp(ILType::Bool);
        self.emit(Instruction::Binary {
            op: BinOp::CmpLe,
            dest: cond,
            lhs: current,
            rhs: to,
        });
        self.terminate(Instruction::Branch {
            cond,
            then_target: body,
            else_target: exit,
        });

        self.loops.push(LoopTargets {
            continue_target: incr,
            break_target: exit,
        });
        self.switch_to(body);
        for stmt in &s.body {
            self.lower_stmt(stmt);
        }
        if !self.current_terminated() {
            self.terminate(Instruction::Jump { target: incr });
        }
        self.loops.pop();

        // incr: var = var + step
        self.switch_to(incr);
        let old = self.temp(var_ty.clone());
        self.emit(Instruction::LoadVar {
            dest: old,
            var: var.clone(),
        });
        let step = match &s.step {
            Some(step) => self.lower_value(step),
            None => {
                let one = self.temp(var_ty.clone());
                self.emit(Instruction::Const {
                    dest: one,
                    value: 1,
                });
                one
            }
        };
        let next = self.temp(var_ty);
        self.emit(Instruction::Binary {
            op: BinOp::Add,
            dest: next,
            lhs: old,
            rhs: step,
        });
        self.emit(Instruction::StoreVar { var, src: next });
        self.terminate(Instruction::Jump { target: header });

        self.switch_to(exit);
    }

    /// `match` lowers to a chain of equality tests; the default arm (or
    /// the merge, without one) is the last else-target.
    fn lower_match(&mut self, s: &MatchStmt) {
        let scrutinee = self.lower_value(&s.scrutinee);
        let merge = self.func().add_block("match_merge");

        let mut arm_blocks = Vec::with_capacity(s.arms.len());
        let mut test_blocks = Vec::with_capacity(s.arms.len());
        for i in 0..s.arms.len() {
            if i > 0 {
                test_blocks.push(self.func().add_block("match_test"));
            }
            arm_blocks.push(self.func().add_block("match_arm"));
        }
        let default_block = s.default.as_ref().map(|_| self.func().add_block("match_default"));
        let fallthrough = default_block.unwrap_or(merge);

        // A match with no arms falls straight through
        if s.arms.is_empty() {
            self.terminate(Instruction::Jump {
                target: fallthrough,
            });
        }

        for (i, arm) in s.arms.iter().enumerate() {
            if i > 0 {
                self.switch_to(test_blocks[i - 1]);
            }
            let value = self.lower_value(&arm.value);
            let cond = self.temp(ILType::Bool);
            self.emit(Instruction::Binary {
                op: BinOp::CmpEq,
                dest: cond,
                lhs: scrutinee,
                rhs: value,
            });
            let next = if i + 1 < s.arms.len() {
                test_blocks[i]
            } else {
                fallthrough
            };
            self.terminate(Instruction::Branch {
                cond,
                then_target: arm_blocks[i],
                else_target: next,
            });

            self.switch_to(arm_blocks[i]);
            for stmt in &arm.body {
                self.lower_stmt(stmt);
            }
            if !self.current_terminated() {
                self.terminate(Instruction::Jump { target: merge });
            }
        }

        if let (Some(block), Some(default)) = (default_block, &s.default) {
            self.switch_to(block);
            for stmt in default {
                self.lower_stmt(stmt);
            }
            if !self.current_terminated() {
                self.terminate(Instruction::Jump { target: merge });
            }
        }

        self.switch_to(merge);
        if self.func_ref().block(merge).predecessors.is_empty() {
            self.func().block_mut(merge).unreachable = true;
        }
    }
}
