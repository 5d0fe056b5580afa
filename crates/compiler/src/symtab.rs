//! Symbol table for Lode
//!
//! A scope tree rooted at the module scope. Lode scoping is deliberately
//! flat: only modules and function bodies introduce scopes. Control-flow
//! constructs do not, so a variable declared inside an `if` branch lives in
//! the enclosing function scope and collides with any other declaration of
//! the same name there.
//!
//! Scopes and symbols are arena-allocated and referenced by index so the
//! tree stays free of ownership cycles; AST nodes refer back to symbols by
//! id through the metadata store.

use crate::ast::{NodeId, Span, StorageClass};
use crate::types::Type;
use indexmap::IndexMap;

/// Index of a symbol in the table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SymbolId(pub u32);

/// Index of a scope in the table's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScopeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolKind {
    Variable,
    Const,
    Parameter,
    Function,
    Map,
    Import,
}

impl std::fmt::Display for SymbolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SymbolKind::Variable => write!(f, "variable"),
            SymbolKind::Const => write!(f, "constant"),
            SymbolKind::Parameter => write!(f, "parameter"),
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Map => write!(f, "map"),
            SymbolKind::Import => write!(f, "import"),
        }
    }
}

/// A declared name.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    /// Filled in by type resolution; `None` until then
    pub ty: Option<Type>,
    pub scope: ScopeId,
    pub location: Span,
    pub is_const: bool,
    pub is_exported: bool,
    pub is_stub: bool,
    pub storage: Option<StorageClass>,
    /// The declaring AST node
    pub decl_node: NodeId,
}

impl Symbol {
    /// Resolved type, with `Unknown` standing in while resolution is
    /// pending or has failed.
    pub fn type_or_unknown(&self) -> Type {
        self.ty.clone().unwrap_or(Type::Unknown)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Module,
    Function,
}

/// One lexical scope.
#[derive(Debug)]
pub struct Scope {
    pub kind: ScopeKind,
    pub parent: Option<ScopeId>,
    pub children: Vec<ScopeId>,
    /// Declaration order is preserved for deterministic iteration
    pub symbols: IndexMap<String, SymbolId>,
    /// AST node that owns this scope (module header or function decl)
    pub owner: NodeId,
}

/// Error returned by [`SymbolTable::declare`] on a name collision.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateDeclaration {
    pub name: String,
    pub existing: SymbolId,
    pub existing_location: Span,
}

impl std::fmt::Display for DuplicateDeclaration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' is already declared in this scope", self.name)
    }
}

impl std::error::Error for DuplicateDeclaration {}

/// The scope tree plus the symbol arena.
#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    symbols: Vec<Symbol>,
    root: ScopeId,
    /// Enter/exit stack; the root is always at the bottom
    stack: Vec<ScopeId>,
    /// Function-decl node -> its scope, for passes that re-enter functions
    scopes_by_owner: IndexMap<NodeId, ScopeId>,
}

impl SymbolTable {
    /// Create a table with a module scope owned by `module_node`.
    pub fn new(module_node: NodeId) -> Self {
        let root = ScopeId(0);
        SymbolTable {
            scopes: vec![Scope {
                kind: ScopeKind::Module,
                parent: None,
                children: Vec::new(),
                symbols: IndexMap::new(),
                owner: module_node,
            }],
            symbols: Vec::new(),
            root,
            stack: vec![root],
            scopes_by_owner: IndexMap::new(),
        }
    }

    pub fn root(&self) -> ScopeId {
        self.root
    }

    pub fn current_scope(&self) -> ScopeId {
        *self
            .stack
            .last()
            .expect("scope stack must never be empty: the root scope is never exited")
    }

    /// Create a child scope of the current scope and enter it.
    pub fn push_scope(&mut self, kind: ScopeKind, owner: NodeId) -> ScopeId {
        let parent = self.current_scope();
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            kind,
            parent: Some(parent),
            children: Vec::new(),
            symbols: IndexMap::new(),
            owner,
        });
        self.scopes[parent.0 as usize].children.push(id);
        self.scopes_by_owner.insert(owner, id);
        self.stack.push(id);
        id
    }

    /// Re-enter an existing scope (used by later passes revisiting
    /// function bodies).
    pub fn enter_scope(&mut self, scope: ScopeId) {
        assert!(
            (scope.0 as usize) < self.scopes.len(),
            "enter_scope: unknown scope id {:?}",
            scope
        );
        self.stack.push(scope);
    }

    /// Leave the current scope. Enter/exit must stay balanced; popping the
    /// root is an internal error.
    pub fn exit_scope(&mut self) {
        assert!(
            self.stack.len() > 1,
            "exit_scope: unbalanced enter/exit, attempted to pop the module scope"
        );
        self.stack.pop();
    }

    /// Scope created for a given function declaration node, if any.
    pub fn scope_of(&self, owner: NodeId) -> Option<ScopeId> {
        self.scopes_by_owner.get(&owner).copied()
    }

    /// Declare a symbol in the current scope.
    pub fn declare(&mut self, mut symbol: Symbol) -> Result<SymbolId, DuplicateDeclaration> {
        let scope = self.current_scope();
        symbol.scope = scope;
        if let Some(&existing) = self.scopes[scope.0 as usize].symbols.get(&symbol.name) {
            return Err(DuplicateDeclaration {
                name: symbol.name.clone(),
                existing,
                existing_location: self.symbols[existing.0 as usize].location,
            });
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.scopes[scope.0 as usize]
            .symbols
            .insert(symbol.name.clone(), id);
        self.symbols.push(symbol);
        Ok(id)
    }

    /// Look a name up, walking the parent chain.
    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            if let Some(&id) = self.scopes[s.0 as usize].symbols.get(name) {
                return Some(id);
            }
            scope = self.scopes[s.0 as usize].parent;
        }
        None
    }

    /// Look a name up in the current scope only.
    pub fn lookup_local(&self, name: &str) -> Option<SymbolId> {
        self.scopes[self.current_scope().0 as usize]
            .symbols
            .get(name)
            .copied()
    }

    /// Look a name up starting from an arbitrary scope.
    pub fn lookup_in(&self, scope: ScopeId, name: &str) -> Option<SymbolId> {
        let mut cursor = Some(scope);
        while let Some(s) = cursor {
            if let Some(&id) = self.scopes[s.0 as usize].symbols.get(name) {
                return Some(id);
            }
            cursor = self.scopes[s.0 as usize].parent;
        }
        None
    }

    pub fn symbol(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.0 as usize]
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> &mut Symbol {
        &mut self.symbols[id.0 as usize]
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.0 as usize]
    }

    /// Every name visible from the current scope, shadowing applied
    /// (inner declarations win).
    pub fn visible_symbols(&self) -> Vec<SymbolId> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        let mut scope = Some(self.current_scope());
        while let Some(s) = scope {
            for (name, &id) in &self.scopes[s.0 as usize].symbols {
                if seen.insert(name.clone()) {
                    out.push(id);
                }
            }
            scope = self.scopes[s.0 as usize].parent;
        }
        out
    }

    /// All scopes in creation order.
    pub fn all_scopes(&self) -> impl Iterator<Item = (ScopeId, &Scope)> {
        self.scopes
            .iter()
            .enumerate()
            .map(|(i, s)| (ScopeId(i as u32), s))
    }

    /// All symbols in declaration order.
    pub fn all_symbols(&self) -> impl Iterator<Item = (SymbolId, &Symbol)> {
        self.symbols
            .iter()
            .enumerate()
            .map(|(i, s)| (SymbolId(i as u32), s))
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols.len()
    }

    pub fn scope_count(&self) -> usize {
        self.scopes.len()
    }
}

/// Convenience constructor used by the builder pass and tests.
pub fn make_symbol(name: &str, kind: SymbolKind, location: Span, decl_node: NodeId) -> Symbol {
    Symbol {
        name: name.to_string(),
        kind,
        ty: None,
        scope: ScopeId(0),
        location,
        is_const: kind == SymbolKind::Const,
        is_exported: false,
        is_stub: false,
        storage: None,
        decl_node,
    }
}
