//! Declaration layer
//!
//! Sets up one `ILFunction` per source function: parameters map to the
//! registers created at construction, and every local variable in the
//! body - including those nested in branches and loops, since scoping is
//! function-scoped - gets its register up front. The statement layer then
//! fills in the blocks.

use super::state::ILGen;
use crate::ast::{FunctionDecl, Stmt};
use crate::diagnostics::Code;
use crate::il::{ILFunction, ILType, Instruction, VarRef};
use crate::types::Type;
use tracing::trace;

impl ILGen<'_> {
    pub(super) fn lower_function(&mut self, decl: &FunctionDecl) {
        trace!(function = %decl.name, "lowering function");

        let signature = self
            .metadata
            .symbol(decl.id)
            .map(|id| self.table.symbol(id).type_or_unknown())
            .and_then(|t| match t {
                Type::Callback(sig) => Some(*sig),
                _ => None,
            });

        let (param_types, return_type) = match &signature {
            Some(sig) => (
                sig.param_types.iter().map(ILType::from_type).collect(),
                ILType::from_type(&sig.return_type),
            ),
            None => (vec![ILType::Byte; decl.params.len()], ILType::Void),
        };

        let params: Vec<(String, ILType, _)> = decl
            .params
            .iter()
            .zip(param_types)
            .map(|(p, ty)| (p.name.clone(), ty, p.storage))
            .collect();

        let mut function = ILFunction::new(&decl.name, params, return_type.clone());
        function.exported = decl.exported;
        function.interrupt = decl.interrupt;

        self.func = Some(function);
        self.current = ILFunction::ENTRY;
        self.vars.clear();
        self.loops.clear();
        self.return_type = return_type;

        // Parameters read and write their construction-time registers
        for param in &decl.params {
            let Some(sym) = self.metadata.symbol(param.id) else {
                continue;
            };
            if let Some(reg) = self.func_ref().param_register(&param.name) {
                self.vars.insert(sym, VarRef::Reg(reg));
            }
        }

        let body = decl.body.as_deref().unwrap_or(&[]);
        self.preallocate_locals(body);
        for stmt in body {
            self.lower_stmt(stmt);
        }

        // Fall off the end: void functions return implicitly; non-void
        // functions get a warning but the IR stays well-formed
        if !self.current_terminated() {
            if self.return_type != ILType::Void
                && !self.func_ref().block(self.current).unreachable
            {
                self.warning(
                    Code::MissingReturnValue,
                    format!(
                        "function '{}' can fall off the end without returning a value",
                        decl.name
                    ),
                    decl.span,
                );
            }
            self.terminate(Instruction::ReturnVoid);
        }

        // Flag whatever the entry cannot reach
        let mut function = self.func.take().expect("function under construction");
        let unreachable = function.unreachable_blocks();
        for b in unreachable {
            function.block_mut(b).unreachable = true;
        }
        self.module.add_function(function);
    }

    /// Walk the body creating one register per local variable, nested
    /// declarations included.
    fn preallocate_locals(&mut self, body: &[Stmt]) {
        for stmt in body {
            self.preallocate_stmt(stmt);
        }
    }

    fn preallocate_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => {
                if let Some(sym) = self.metadata.symbol(v.id) {
                    let ty = ILType::from_type(&self.table.symbol(sym).type_or_unknown());
                    let reg = self.func().new_register(ty, Some(&v.name));
                    self.vars.insert(sym, VarRef::Reg(reg));
                }
            }
            Stmt::If(s) => {
                self.preallocate_locals(&s.then_body);
                if let Some(else_body) = &s.else_body {
                    self.preallocate_locals(else_body);
                }
            }
            Stmt::While(s) => self.preallocate_locals(&s.body),
            Stmt::For(s) => {
                if let Some(sym) = self.metadata.symbol(s.id) {
                    if !self.vars.contains_key(&sym) {
                        let ty = ILType::from_type(&self.table.symbol(sym).type_or_unknown());
                        let reg = self.func().new_register(ty, Some(&s.var));
                        self.vars.insert(sym, VarRef::Reg(reg));
                    }
                }
                self.preallocate_locals(&s.body);
            }
            Stmt::Match(s) => {
                for arm in &s.arms {
                    self.preallocate_locals(&arm.body);
                }
                if let Some(default) = &s.default {
                    self.preallocate_locals(default);
                }
            }
            Stmt::Expr(_) | Stmt::Return(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }
}
