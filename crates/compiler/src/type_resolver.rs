//! Type resolution for Lode
//!
//! Second pass: turns annotation strings (`byte`, `word[]`, `byte[8]`,
//! `fn(byte, word): byte`) into [`Type`] values and attaches them to the
//! symbols declared by the first pass. Array declarations with empty
//! brackets get their size inferred from an array-literal initializer;
//! declarations without any annotation fall back to literal-shape
//! inference so `let x = [1, 2, 3];` works.
//!
//! Unresolvable annotations produce `UNKNOWN_TYPE` and leave the symbol
//! typed `Unknown` so later passes keep going.

use crate::ast::{
    Declaration, Expr, ExprKind, FunctionDecl, MapKind, MetadataStore, Program, Stmt,
    VariableDecl,
};
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::SymbolTable;
use crate::types::{FunctionSignature, Type, TypeSystem};

/// Attach types to every symbol in the table.
pub fn resolve_types(
    program: &Program,
    table: &mut SymbolTable,
    type_system: &TypeSystem,
    metadata: &MetadataStore,
    diagnostics: &mut Diagnostics,
) {
    let mut resolver = Resolver {
        table,
        type_system,
        metadata,
        diagnostics,
    };
    resolver.run(program);
}

struct Resolver<'a> {
    table: &'a mut SymbolTable,
    type_system: &'a TypeSystem,
    metadata: &'a MetadataStore,
    diagnostics: &'a mut Diagnostics,
}

impl Resolver<'_> {
    fn run(&mut self, program: &Program) {
        for decl in &program.declarations {
            match decl {
                Declaration::Variable(v) => self.resolve_variable(v),
                Declaration::Function(f) => self.resolve_function(f),
                Declaration::Map(m) => {
                    let ty = self.map_type(m);
                    self.set_symbol_type(m.id, ty);
                }
                Declaration::Import(_) => {
                    // Import types are filled in by the import resolver once
                    // the source module has been analyzed
                }
            }
        }
    }

    fn resolve_variable(&mut self, v: &VariableDecl) {
        let ty = match &v.annotation {
            Some(text) => {
                let parsed = self.parse_annotation(text, v);
                self.complete_array_size(parsed, v)
            }
            None => self.infer_from_initializer(v),
        };
        self.set_symbol_type(v.id, ty);
    }

    fn resolve_function(&mut self, f: &FunctionDecl) {
        let mut param_types = Vec::with_capacity(f.params.len());
        let mut param_names = Vec::with_capacity(f.params.len());

        let Some(scope) = self.table.scope_of(f.id) else {
            // Pass 1 failed to create the scope (duplicate function name);
            // nothing to annotate
            return;
        };
        self.table.enter_scope(scope);
        for param in &f.params {
            let ty = self.parse_named(&param.annotation, param.span);
            param_types.push(ty.clone());
            param_names.push(param.name.clone());
            if let Some(id) = self.metadata.symbol(param.id) {
                self.table.symbol_mut(id).ty = Some(ty);
            }
        }

        let return_type = match &f.return_annotation {
            Some(text) => self.parse_named(text, f.span),
            None => Type::Void,
        };

        if let Some(body) = &f.body {
            for stmt in body {
                self.resolve_in_stmt(stmt);
            }
        }
        self.table.exit_scope();

        let signature = FunctionSignature {
            param_types,
            param_names,
            return_type,
        };
        let ty = self.type_system.create_callback_type(signature);
        self.set_symbol_type(f.id, ty);
    }

    fn resolve_in_stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Variable(v) => self.resolve_variable(v),
            Stmt::If(s) => {
                for st in &s.then_body {
                    self.resolve_in_stmt(st);
                }
                if let Some(else_body) = &s.else_body {
                    for st in else_body {
                        self.resolve_in_stmt(st);
                    }
                }
            }
            Stmt::While(s) => {
                for st in &s.body {
                    self.resolve_in_stmt(st);
                }
            }
            Stmt::For(s) => {
                // Loop variable width follows its bounds: word if either
                // bound is word, else byte
                let ty = if self.bound_is_word(&s.from) || self.bound_is_word(&s.to) {
                    Type::Word
                } else {
                    Type::Byte
                };
                if let Some(id) = self.metadata.symbol(s.id) {
                    let sym = self.table.symbol_mut(id);
                    if sym.ty.is_none() {
                        sym.ty = Some(ty);
                    }
                }
                for st in &s.body {
                    self.resolve_in_stmt(st);
                }
            }
            Stmt::Match(s) => {
                for arm in &s.arms {
                    for st in &arm.body {
                        self.resolve_in_stmt(st);
                    }
                }
                if let Some(default) = &s.default {
                    for st in default {
                        self.resolve_in_stmt(st);
                    }
                }
            }
            Stmt::Expr(_) | Stmt::Return(_) | Stmt::Break(_) | Stmt::Continue(_) => {}
        }
    }

    fn bound_is_word(&self, bound: &Expr) -> bool {
        match &bound.kind {
            ExprKind::IntLiteral { value } => *value > 0xFF,
            ExprKind::Identifier { name } => {
                match self.table.lookup(name).map(|id| self.table.symbol(id)) {
                    Some(sym) => matches!(sym.ty, Some(Type::Word)),
                    None => false,
                }
            }
            _ => false,
        }
    }

    fn map_type(&mut self, m: &crate::ast::MapDecl) -> Type {
        match &m.kind {
            MapKind::Simple { .. } => match &m.annotation {
                Some(text) => self.parse_named(text, m.span),
                None => Type::Byte,
            },
            MapKind::Range { start, end } => {
                let element = match &m.annotation {
                    Some(text) => self.parse_named(text, m.span),
                    None => Type::Byte,
                };
                let elem_size = element.byte_size().max(1);
                let span = (*end as usize).saturating_sub(*start as usize) + 1;
                self.type_system
                    .create_array_type(element, Some(span / elem_size))
            }
            // Struct maps need member access, which the type checker does
            // not support yet; Unknown keeps downstream passes quiet
            MapKind::SequentialStruct { .. } | MapKind::ExplicitStruct { .. } => Type::Unknown,
        }
    }

    /// Parse an annotation and report `UNKNOWN_TYPE` on failure.
    fn parse_named(&mut self, text: &str, span: crate::ast::Span) -> Type {
        match parse_type(self.type_system, text) {
            Some(ty) => ty,
            None => {
                self.diagnostics.error(
                    Code::UnknownType,
                    format!("unknown type '{}'", text.trim()),
                    span,
                );
                Type::Unknown
            }
        }
    }

    fn parse_annotation(&mut self, text: &str, v: &VariableDecl) -> Type {
        self.parse_named(text, v.span)
    }

    /// Fill in an open array size from the initializer, or report why it
    /// cannot be inferred.
    fn complete_array_size(&mut self, ty: Type, v: &VariableDecl) -> Type {
        let Type::Array { element, size: None } = &ty else {
            return ty;
        };
        match &v.initializer {
            Some(Expr {
                kind: ExprKind::ArrayLiteral { elements },
                ..
            }) => self
                .type_system
                .create_array_type((**element).clone(), Some(elements.len())),
            Some(_) => {
                self.diagnostics.error(
                    Code::ArraySizeUnknown,
                    format!(
                        "array size of '{}' cannot be inferred from a non-literal initializer",
                        v.name
                    ),
                    v.span,
                );
                ty
            }
            None => {
                self.diagnostics.error(
                    Code::ArraySizeUnknown,
                    format!("array '{}' has no size and no initializer", v.name),
                    v.span,
                );
                ty
            }
        }
    }

    /// Infer a declaration type from the shape of its initializer.
    fn infer_from_initializer(&mut self, v: &VariableDecl) -> Type {
        let Some(init) = &v.initializer else {
            self.diagnostics.error(
                Code::UnknownType,
                format!("'{}' has neither a type annotation nor an initializer", v.name),
                v.span,
            );
            return Type::Unknown;
        };
        match literal_type(self.type_system, init) {
            Some(ty) => ty,
            None => {
                self.diagnostics.error(
                    Code::UnknownType,
                    format!("cannot infer a type for '{}' from its initializer", v.name),
                    v.span,
                );
                Type::Unknown
            }
        }
    }

    fn set_symbol_type(&mut self, node: crate::ast::NodeId, ty: Type) {
        if let Some(id) = self.metadata.symbol(node) {
            self.table.symbol_mut(id).ty = Some(ty);
        }
    }
}

/// Parse a type annotation: a built-in name, array suffixes (`T[]`,
/// `T[N]`), or a callback type (`fn(T, U): R`).
pub fn parse_type(type_system: &TypeSystem, text: &str) -> Option<Type> {
    let text = text.trim();

    if let Some(rest) = text.strip_prefix("fn") {
        return parse_callback(type_system, rest.trim_start());
    }

    // Strip array suffixes from the right: byte[4][] is an open array of
    // byte[4]
    if let Some(open) = text.rfind('[') {
        if !text.ends_with(']') {
            return None;
        }
        let inner = &text[open + 1..text.len() - 1];
        let element = parse_type(type_system, &text[..open])?;
        let size = if inner.trim().is_empty() {
            None
        } else {
            Some(inner.trim().parse::<usize>().ok()?)
        };
        return Some(type_system.create_array_type(element, size));
    }

    type_system.get_builtin(text)
}

fn parse_callback(type_system: &TypeSystem, rest: &str) -> Option<Type> {
    let rest = rest.strip_prefix('(')?;
    let close = rest.find(')')?;
    let params_text = &rest[..close];
    let after = rest[close + 1..].trim_start();

    let mut param_types = Vec::new();
    if !params_text.trim().is_empty() {
        for part in params_text.split(',') {
            param_types.push(parse_type(type_system, part)?);
        }
    }

    let return_type = match after.strip_prefix(':') {
        Some(ret) => parse_type(type_system, ret)?,
        None if after.is_empty() => Type::Void,
        None => return None,
    };

    let param_names = vec![String::new(); param_types.len()];
    Some(type_system.create_callback_type(FunctionSignature {
        param_types,
        param_names,
        return_type,
    }))
}

/// Shape-based type of a literal expression tree, used when a declaration
/// has no annotation.
fn literal_type(type_system: &TypeSystem, expr: &Expr) -> Option<Type> {
    match &expr.kind {
        ExprKind::IntLiteral { value } => Some(int_literal_type(*value)),
        ExprKind::BoolLiteral { .. } => Some(Type::Boolean),
        ExprKind::StringLiteral { .. } => Some(Type::String),
        ExprKind::ArrayLiteral { elements } => {
            if elements.is_empty() {
                return None;
            }
            let mut element = literal_type(type_system, &elements[0])?;
            for e in &elements[1..] {
                let t = literal_type(type_system, e)?;
                if t != element {
                    if t.is_numeric() && element.is_numeric() {
                        element = type_system.promote_numeric(&element, &t);
                    } else {
                        return None;
                    }
                }
            }
            Some(type_system.create_array_type(element, Some(elements.len())))
        }
        _ => None,
    }
}

/// `0..=255` is byte, anything larger is word. Range errors are the type
/// checker's to report.
pub fn int_literal_type(value: i64) -> Type {
    if (0..=0xFF).contains(&value) {
        Type::Byte
    } else {
        Type::Word
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;
    use crate::symbols::build_symbol_table;

    fn analyze(program: &Program) -> (SymbolTable, MetadataStore, Diagnostics) {
        let mut metadata = MetadataStore::new();
        let mut diagnostics = Diagnostics::new();
        let mut table = build_symbol_table(program, &mut metadata, &mut diagnostics);
        let type_system = TypeSystem::new();
        resolve_types(program, &mut table, &type_system, &metadata, &mut diagnostics);
        (table, metadata, diagnostics)
    }

    fn symbol_type(table: &SymbolTable, name: &str) -> Type {
        table.symbol(table.lookup(name).unwrap()).type_or_unknown()
    }

    #[test]
    fn test_parse_simple_and_array_annotations() {
        let ts = TypeSystem::new();
        assert_eq!(parse_type(&ts, "byte"), Some(Type::Byte));
        assert_eq!(parse_type(&ts, " word "), Some(Type::Word));
        assert_eq!(
            parse_type(&ts, "byte[4]"),
            Some(ts.create_array_type(Type::Byte, Some(4)))
        );
        assert_eq!(
            parse_type(&ts, "word[]"),
            Some(ts.create_array_type(Type::Word, None))
        );
        assert_eq!(parse_type(&ts, "quux"), None);
        assert_eq!(parse_type(&ts, "byte[x]"), None);
    }

    #[test]
    fn test_parse_callback_annotation() {
        let ts = TypeSystem::new();
        let ty = parse_type(&ts, "fn(byte, word): byte").unwrap();
        match ty {
            Type::Callback(sig) => {
                assert_eq!(sig.param_types, vec![Type::Byte, Type::Word]);
                assert_eq!(sig.return_type, Type::Byte);
            }
            other => panic!("expected callback, got {:?}", other),
        }
        let void = parse_type(&ts, "fn()").unwrap();
        match void {
            Type::Callback(sig) => assert_eq!(sig.return_type, Type::Void),
            other => panic!("expected callback, got {:?}", other),
        }
    }

    #[test]
    fn test_variable_annotation_attached() {
        let program = build::program("m", vec![build::global("x", Some("word"), None)]);
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        assert_eq!(symbol_type(&table, "x"), Type::Word);
    }

    #[test]
    fn test_array_size_inferred_from_literal() {
        let program = build::program(
            "m",
            vec![build::global(
                "x",
                Some("byte[]"),
                Some(build::array(vec![build::int(1), build::int(2), build::int(3)])),
            )],
        );
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        assert_eq!(
            symbol_type(&table, "x"),
            TypeSystem::new().create_array_type(Type::Byte, Some(3))
        );
    }

    #[test]
    fn test_unannotated_array_literal_inference() {
        let program = build::program(
            "m",
            vec![build::global(
                "x",
                None,
                Some(build::array(vec![build::int(1), build::int(2), build::int(3)])),
            )],
        );
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        assert_eq!(
            symbol_type(&table, "x"),
            TypeSystem::new().create_array_type(Type::Byte, Some(3))
        );
    }

    #[test]
    fn test_open_array_without_initializer_is_error() {
        let program = build::program("m", vec![build::global("x", Some("byte[]"), None)]);
        let (_, _, diags) = analyze(&program);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.items()[0].code, Code::ArraySizeUnknown);
    }

    #[test]
    fn test_unknown_type_reported() {
        let program = build::program("m", vec![build::global("x", Some("gadget"), None)]);
        let (table, _, diags) = analyze(&program);
        assert_eq!(diags.error_count(), 1);
        assert_eq!(diags.items()[0].code, Code::UnknownType);
        assert_eq!(symbol_type(&table, "x"), Type::Unknown);
    }

    #[test]
    fn test_function_signature_and_params() {
        let program = build::program(
            "m",
            vec![build::function(
                "add",
                vec![("a", "byte"), ("b", "word")],
                Some("word"),
                vec![],
            )],
        );
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        match symbol_type(&table, "add") {
            Type::Callback(sig) => {
                assert_eq!(sig.param_types, vec![Type::Byte, Type::Word]);
                assert_eq!(sig.param_names, vec!["a", "b"]);
                assert_eq!(sig.return_type, Type::Word);
            }
            other => panic!("expected callback, got {:?}", other),
        }
    }

    #[test]
    fn test_range_map_is_sized_array() {
        let program = build::program(
            "m",
            vec![Declaration::Map(crate::ast::MapDecl {
                id: crate::ast::NodeId::default(),
                name: "screen".to_string(),
                kind: MapKind::Range {
                    start: 0x0400,
                    end: 0x07E7,
                },
                annotation: Some("byte".to_string()),
                exported: false,
                span: crate::ast::Span::default(),
            })],
        );
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        assert_eq!(
            symbol_type(&table, "screen"),
            TypeSystem::new().create_array_type(Type::Byte, Some(1000))
        );
    }

    #[test]
    fn test_for_variable_width_follows_bounds() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![
                    build::for_stmt("i", build::int(0), build::int(10), vec![]),
                    build::for_stmt("j", build::int(0), build::int(1000), vec![]),
                ],
            )],
        );
        let (table, _, diags) = analyze(&program);
        assert!(diags.is_empty());
        let fid = match &program.declarations[0] {
            Declaration::Function(f) => f.id,
            _ => unreachable!(),
        };
        let scope = table.scope_of(fid).unwrap();
        let i = table.lookup_in(scope, "i").unwrap();
        let j = table.lookup_in(scope, "j").unwrap();
        assert_eq!(table.symbol(i).ty, Some(Type::Byte));
        assert_eq!(table.symbol(j).ty, Some(Type::Word));
    }
}
