//! Module layer
//!
//! Translates module-level declarations: variables and hardware maps
//! become IL globals (storage-class hints preserved, constant
//! initializers folded), imports become externs, stub functions register
//! as intrinsics, and every function with a body - except members of a
//! recursion cycle, which never get IL - is handed to the declaration
//! layer.

use super::state::ILGen;
use crate::ast::{Declaration, Expr, ExprKind, Program};
use crate::call_graph::CallGraph;
use crate::il::{GlobalVar, ILType};
use tracing::debug;

impl ILGen<'_> {
    pub(super) fn lower_module(&mut self, program: &Program, call_graph: &CallGraph) {
        for decl in &program.declarations {
            match decl {
                Declaration::Variable(v) => {
                    let ty = self
                        .metadata
                        .symbol(v.id)
                        .map(|id| ILType::from_type(&self.table.symbol(id).type_or_unknown()))
                        .unwrap_or(ILType::Byte);
                    let initializer = v.initializer.as_ref().and_then(const_fold);
                    self.module.add_global(GlobalVar {
                        name: v.name.clone(),
                        ty,
                        storage: v.storage,
                        address: None,
                        initializer,
                        exported: v.exported,
                    });
                }
                Declaration::Map(m) => {
                    let ty = self
                        .metadata
                        .symbol(m.id)
                        .map(|id| ILType::from_type(&self.table.symbol(id).type_or_unknown()))
                        .unwrap_or(ILType::Byte);
                    self.module.add_global(GlobalVar {
                        name: m.name.clone(),
                        ty,
                        storage: None,
                        address: m.kind.base_address(),
                        initializer: None,
                        exported: m.exported,
                    });
                }
                Declaration::Import(i) => {
                    for name in &i.names {
                        self.module.add_import(name, &i.from);
                    }
                }
                Declaration::Function(f) if f.is_stub() => {
                    // Stubs have no body to lower; calls to them go
                    // through the intrinsic path
                    self.module.register_intrinsic(&f.name);
                }
                Declaration::Function(_) => {}
            }
        }

        for decl in &program.declarations {
            let Declaration::Function(f) = decl else {
                continue;
            };
            if f.is_stub() {
                continue;
            }
            if call_graph.is_recursive(&f.name) {
                // Static frame allocation cannot host recursion; the call
                // graph pass already reported the error
                debug!(function = %f.name, "skipping IL for recursive function");
                continue;
            }
            self.lower_function(f);
        }
    }
}

/// Fold a literal initializer to its data-segment image.
fn const_fold(expr: &Expr) -> Option<Vec<i64>> {
    match &expr.kind {
        ExprKind::IntLiteral { value } => Some(vec![*value]),
        ExprKind::BoolLiteral { value } => Some(vec![i64::from(*value)]),
        ExprKind::ArrayLiteral { elements } => {
            let mut out = Vec::with_capacity(elements.len());
            for e in elements {
                let mut folded = const_fold(e)?;
                if folded.len() != 1 {
                    return None;
                }
                out.push(folded.pop().unwrap());
            }
            Some(out)
        }
        _ => None,
    }
}
