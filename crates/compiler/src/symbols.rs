//! Symbol-table construction for Lode
//!
//! First pass over a program: creates the module scope, one scope per
//! function, and declares every name. Later passes attach types and check
//! uses; this pass only cares about existence and collisions.
//!
//! Scoping rule: control-flow constructs do not open scopes. A variable
//! declared anywhere inside a function body (including nested branches and
//! loop bodies) is declared into the function scope, and redeclaring a
//! name there is a `DUPLICATE_DECLARATION` error.

use crate::ast::{
    Declaration, FunctionDecl, MetadataStore, NodeId, Program, Stmt, VariableDecl,
};
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::{make_symbol, ScopeKind, SymbolKind, SymbolTable};

/// Build the symbol table for one program.
///
/// Declared symbol ids are recorded in the metadata store under the
/// declaring node so later passes can find them without a name lookup.
pub fn build_symbol_table(
    program: &Program,
    metadata: &mut MetadataStore,
    diagnostics: &mut Diagnostics,
) -> SymbolTable {
    let mut builder = Builder {
        table: SymbolTable::new(NodeId(0)),
        metadata,
        diagnostics,
    };
    builder.run(program);
    builder.table
}

struct Builder<'a> {
    table: SymbolTable,
    metadata: &'a mut MetadataStore,
    diagnostics: &'a mut Diagnostics,
}

impl Builder<'_> {
    fn run(&mut self, program: &Program) {
        for decl in &program.declarations {
            match decl {
                Declaration::Variable(v) => self.declare_variable(v),
                Declaration::Function(f) => self.declare_function(f),
                Declaration::Map(m) => {
                    let mut sym = make_symbol(&m.name, SymbolKind::Map, m.span, m.id);
                    sym.is_exported = m.exported;
                    self.declare(sym, m.id);
                }
                Declaration::Import(i) => {
                    if i.names.is_empty() {
                        self.diagnostics.error(
                            Code::InvalidImportSyntax,
                            format!("import from '{}' names no symbols", i.from),
                            i.span,
                        );
                    }
                    for name in &i.names {
                        let sym = make_symbol(name, SymbolKind::Import, i.span, i.id);
                        self.declare(sym, i.id);
                    }
                }
            }
        }
    }

    fn declare_variable(&mut self, v: &VariableDecl) {
        let kind = if v.constant {
            SymbolKind::Const
        } else {
            SymbolKind::Variable
        };
        let mut sym = make_symbol(&v.name, kind, v.span, v.id);
        sym.is_exported = v.exported;
        sym.storage = v.storage;
        self.declare(sym, v.id);
    }

    fn declare_function(&mut self, f: &FunctionDecl) {
        let mut sym = make_symbol(&f.name, SymbolKind::Function, f.span, f.id);
        sym.is_exported = f.exported;
        sym.is_stub = f.is_stub();
        self.declare(sym, f.id);

        self.table.push_scope(ScopeKind::Function, f.id);
        for param in &f.params {
            let mut psym = make_symbol(&param.name, SymbolKind::Parameter, param.span, param.id);
            psym.storage = param.storage;
            self.declare(psym, param.id);
        }
        if let Some(body) = &f.body {
            for stmt in body {
                self.declare_in_stmt(stmt);
            }
        }
        self.table.exit_scope();
    }

    /// Declare variables found anywhere in a statement tree into the
    /// current (function) scope.
    fn declare_in_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => self.declare_variable(v),
            Stmt::If(s) => {
                for st in &s.then_body {
                    self.declare_in_stmt(st);
                }
                if let Some(else_body) = &s.else_body {
                    for st in else_body {
                        self.declare_in_stmt(st);
                    }
                }
            }
            Stmt::While(s) => {
                for st in &s.body {
                    self.declare_in_stmt(st);
                }
            }
            Stmt::For(s) => {
                // Loop variables are function-scoped like everything else;
                // a second loop may reuse an existing variable of the same
                // name rather than redeclare it
                if self.table.lookup_local(&s.var).is_none() {
                    let sym = make_symbol(&s.var, SymbolKind::Variable, s.span, s.id);
                    self.declare(sym, s.id);
                }
                for st in &s.body {
                    self.declare_in_stmt(st);
                }
            }
            Stmt::Match(s) => {
                for arm in &s.arms {
                    for st in &arm.body {
                        self.declare_in_stmt(st);
                    }
                }
                if let Some(default) = &s.default {
                    for st in default {
                        self.declare_in_stmt(st);
                    }
                }
            }
            Stmt::Expr(_) | Stmt::Return(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn declare(&mut self, symbol: crate::symtab::Symbol, node: NodeId) {
        let name = symbol.name.clone();
        let location = symbol.location;
        match self.table.declare(symbol) {
            Ok(id) => self.metadata.set_symbol(node, id),
            Err(dup) => {
                self.diagnostics.push(
                    crate::diagnostics::Diagnostic::error(
                        Code::DuplicateDeclaration,
                        format!("'{}' is already declared in this scope", name),
                        location,
                    )
                    .with_related(dup.existing_location),
                );
            }
        }
    }
}
