//! Multi-module support
//!
//! Three pieces: a registry mapping fully-qualified module names to their
//! programs, a dependency graph over `import` declarations that yields a
//! topological compilation order (falling back to registration order when
//! cycles are reported), and an import resolver that matches imported
//! names against the exporting module's symbols after analysis.
//!
//! All maps preserve insertion order so compilation order and diagnostics
//! are reproducible run to run.

use crate::ast::{Declaration, Program, Span};
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::{SymbolKind, SymbolTable};
use crate::types::Type;
use indexmap::{IndexMap, IndexSet};

/// Maps fully-qualified module names to their programs.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    programs: IndexMap<String, Program>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        ModuleRegistry::default()
    }

    /// Register a module. Re-registering the same name is reported and
    /// keeps the first registration.
    pub fn register(&mut self, program: Program, diagnostics: &mut Diagnostics) {
        let name = program.module.name.clone();
        if self.programs.contains_key(&name) {
            diagnostics.error(
                Code::DuplicateDeclaration,
                format!("module '{}' is registered twice", name),
                program.module.span,
            );
            return;
        }
        self.programs.insert(name, program);
    }

    pub fn get(&self, name: &str) -> Option<&Program> {
        self.programs.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.programs.contains_key(name)
    }

    /// Module names in registration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.programs.keys().map(String::as_str)
    }

    pub fn programs(&self) -> impl Iterator<Item = (&String, &Program)> {
        self.programs.iter()
    }

    pub fn len(&self) -> usize {
        self.programs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }
}

/// Import edges between modules.
#[derive(Debug)]
pub struct DependencyGraph {
    /// module -> modules it imports from
    edges: IndexMap<String, IndexSet<String>>,
}

impl DependencyGraph {
    /// Build the graph from every registered module's imports.
    pub fn build(registry: &ModuleRegistry) -> Self {
        let mut edges: IndexMap<String, IndexSet<String>> = IndexMap::new();
        for (name, program) in registry.programs() {
            let deps = edges.entry(name.clone()).or_default();
            for decl in &program.declarations {
                if let Declaration::Import(i) = decl {
                    deps.insert(i.from.clone());
                }
            }
        }
        DependencyGraph { edges }
    }

    pub fn dependencies(&self, module: &str) -> Option<&IndexSet<String>> {
        self.edges.get(module)
    }

    /// Topological compilation order: every module appears after the
    /// modules it imports. Cycles produce one `CIRCULAR_IMPORT` error each
    /// and the order falls back to registration order.
    pub fn compilation_order(&self, diagnostics: &mut Diagnostics) -> Vec<String> {
        #[derive(Clone, Copy, PartialEq)]
        enum State {
            Unvisited,
            InProgress,
            Done,
        }

        let mut state: IndexMap<&str, State> = self
            .edges
            .keys()
            .map(|k| (k.as_str(), State::Unvisited))
            .collect();
        let mut order: Vec<String> = Vec::with_capacity(self.edges.len());
        let mut cycles = Vec::new();

        // Iterative DFS so deep dependency chains cannot blow the stack
        for root in self.edges.keys() {
            if state[root.as_str()] != State::Unvisited {
                continue;
            }
            let mut stack: Vec<(&str, usize)> = vec![(root.as_str(), 0)];
            state.insert(root.as_str(), State::InProgress);
            while let Some((module, cursor)) = stack.pop() {
                let deps = &self.edges[module];
                if let Some(dep) = deps.get_index(cursor) {
                    stack.push((module, cursor + 1));
                    // Unknown modules are diagnosed by the import resolver
                    if !self.edges.contains_key(dep.as_str()) {
                        continue;
                    }
                    match state[dep.as_str()] {
                        State::Unvisited => {
                            state.insert(dep.as_str(), State::InProgress);
                            stack.push((dep.as_str(), 0));
                        }
                        State::InProgress => cycles.push((module.to_string(), dep.clone())),
                        State::Done => {}
                    }
                } else {
                    state.insert(module, State::Done);
                    order.push(module.to_string());
                }
            }
        }

        if cycles.is_empty() {
            return order;
        }
        for (from, to) in &cycles {
            diagnostics.error(
                Code::CircularImport,
                format!("circular import between '{}' and '{}'", from, to),
                Span::default(),
            );
        }
        // Fall back to registration order, still letting analysis proceed
        self.edges.keys().cloned().collect()
    }
}

/// One exported (or private, for better diagnostics) top-level symbol.
#[derive(Debug, Clone)]
pub struct GlobalSymbol {
    pub module: String,
    pub name: String,
    pub kind: SymbolKind,
    pub ty: Type,
    pub exported: bool,
    pub location: Span,
}

/// Aggregated top-level symbols of every analyzed module.
#[derive(Debug, Default)]
pub struct GlobalSymbolTable {
    symbols: IndexMap<String, IndexMap<String, GlobalSymbol>>,
}

impl GlobalSymbolTable {
    pub fn new() -> Self {
        GlobalSymbolTable::default()
    }

    /// Record every module-scope symbol of one analyzed module.
    pub fn add_module(&mut self, module: &str, table: &SymbolTable) {
        let entry = self.symbols.entry(module.to_string()).or_default();
        let root = table.root();
        for (_, sym) in table.all_symbols() {
            if sym.scope != root || sym.kind == SymbolKind::Import {
                continue;
            }
            entry.insert(
                sym.name.clone(),
                GlobalSymbol {
                    module: module.to_string(),
                    name: sym.name.clone(),
                    kind: sym.kind,
                    ty: sym.type_or_unknown(),
                    exported: sym.is_exported,
                    location: sym.location,
                },
            );
        }
    }

    pub fn lookup(&self, module: &str, name: &str) -> Option<&GlobalSymbol> {
        self.symbols.get(module)?.get(name)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.symbols.contains_key(module)
    }

    /// Exported symbols of one module, in declaration order.
    pub fn exports_of(&self, module: &str) -> Vec<&GlobalSymbol> {
        self.symbols
            .get(module)
            .map(|m| m.values().filter(|s| s.exported).collect())
            .unwrap_or_default()
    }
}

/// Outcome of resolving one module's imports.
#[derive(Debug, Default)]
pub struct ImportResolution {
    /// (importing module, imported name, source module) triples that
    /// resolved successfully
    pub resolved: Vec<(String, String, String)>,
    pub failed: usize,
}

/// Match a module's import declarations against the global table,
/// filling in the types of its import symbols.
pub fn resolve_imports(
    program: &Program,
    global: &GlobalSymbolTable,
    table: &mut SymbolTable,
    diagnostics: &mut Diagnostics,
) -> ImportResolution {
    let mut resolution = ImportResolution::default();
    let importer = &program.module.name;

    for decl in &program.declarations {
        let Declaration::Import(import) = decl else {
            continue;
        };
        if !global.has_module(&import.from) {
            diagnostics.error(
                Code::ModuleNotFound,
                format!("module '{}' not found", import.from),
                import.span,
            );
            resolution.failed += import.names.len();
            continue;
        }
        for name in &import.names {
            match global.lookup(&import.from, name) {
                None => {
                    diagnostics.error(
                        Code::ImportSymbolNotFound,
                        format!("module '{}' has no symbol '{}'", import.from, name),
                        import.span,
                    );
                    resolution.failed += 1;
                }
                Some(sym) if !sym.exported => {
                    diagnostics.push(
                        crate::diagnostics::Diagnostic::error(
                            Code::SymbolNotExported,
                            format!("'{}' in module '{}' is not exported", name, import.from),
                            import.span,
                        )
                        .with_related(sym.location),
                    );
                    resolution.failed += 1;
                }
                Some(sym) => {
                    // Give the local import symbol the exporter's type
                    let ty = sym.ty.clone();
                    if let Some(id) = table.lookup_in(table.root(), name) {
                        if table.symbol(id).kind == SymbolKind::Import {
                            table.symbol_mut(id).ty = Some(ty);
                        }
                    }
                    resolution
                        .resolved
                        .push((importer.clone(), name.clone(), import.from.clone()));
                }
            }
        }
    }
    resolution
}
