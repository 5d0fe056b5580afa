//! Abstract syntax tree for Lode
//!
//! The front end (lexer + parser) lives outside this crate and hands the
//! core a fully built `Program`, either in memory or serialized as JSON.
//! This module defines that intake surface: declarations, statements,
//! expressions, source spans, and the per-node metadata store that the
//! analysis passes populate.
//!
//! # Node identity
//!
//! Every node carries a `NodeId`. Producers may leave ids at zero; the
//! analyzer renumbers the tree with [`number_nodes`] before the first pass
//! so that side tables keyed by id are unambiguous. Analysis results are
//! attached through [`MetadataStore`], a single open-ended tagged mapping
//! from node id and key to value, rather than per-analysis AST fields.

use crate::symtab::SymbolId;
use crate::types::Type;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A position in a source file (0-indexed line and column, byte offset).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub column: u32,
    #[serde(default)]
    pub offset: u32,
}

/// A half-open source range used for diagnostics and tooling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: Pos,
    pub end: Pos,
}

impl Span {
    pub fn new(start: Pos, end: Pos) -> Self {
        debug_assert!(
            start.offset <= end.offset,
            "Span: start offset ({}) must be <= end offset ({})",
            start.offset,
            end.offset
        );
        Span { start, end }
    }

    /// Single-point span, useful in tests and synthesized nodes.
    pub fn at(line: u32, column: u32) -> Self {
        let p = Pos {
            line,
            column,
            offset: 0,
        };
        Span { start: p, end: p }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // 1-indexed for humans, like editor status lines
        write!(f, "{}:{}", self.start.line + 1, self.start.column + 1)
    }
}

/// Identity of an AST node within one program.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Storage-class hint attached to variable and map declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageClass {
    /// `@zp` - request zero-page placement
    Zp,
    /// `@ram` - uninitialized RAM
    Ram,
    /// `@data` - initialized data segment
    Data,
}

impl std::fmt::Display for StorageClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageClass::Zp => write!(f, "@zp"),
            StorageClass::Ram => write!(f, "@ram"),
            StorageClass::Data => write!(f, "@data"),
        }
    }
}

/// A compilation unit as produced by the parser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    pub module: ModuleHeader,
    pub declarations: Vec<Declaration>,
    #[serde(default)]
    pub span: Span,
}

/// The `module a.b.c;` header, or an implicit single-module name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleHeader {
    /// Dotted module path, e.g. `game.sprites`
    pub name: String,
    /// True when the source had no `module` declaration
    #[serde(default)]
    pub implicit: bool,
    #[serde(default)]
    pub span: Span,
}

/// Top-level declarations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "decl", rename_all = "snake_case")]
pub enum Declaration {
    Variable(VariableDecl),
    Function(FunctionDecl),
    Map(MapDecl),
    Import(ImportDecl),
}

impl Declaration {
    pub fn span(&self) -> Span {
        match self {
            Declaration::Variable(v) => v.span,
            Declaration::Function(f) => f.span,
            Declaration::Map(m) => m.span,
            Declaration::Import(i) => i.span,
        }
    }
}

/// `let x: byte = 0;` / `const LIMIT: word = 1000;`
///
/// Also used for variable statements inside function bodies; Lode scoping
/// is function-scoped, so those declare into the enclosing function scope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDecl {
    #[serde(default)]
    pub id: NodeId,
    pub name: String,
    /// Raw annotation text (`byte`, `word[]`, `fn(byte): void`, ...)
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub initializer: Option<Expr>,
    #[serde(default)]
    pub storage: Option<StorageClass>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub span: Span,
}

/// A function parameter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Param {
    #[serde(default)]
    pub id: NodeId,
    pub name: String,
    pub annotation: String,
    #[serde(default)]
    pub storage: Option<StorageClass>,
    #[serde(default)]
    pub span: Span,
}

/// `function name(a: byte): word { ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDecl {
    #[serde(default)]
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub params: Vec<Param>,
    /// Absent annotation means `void`
    #[serde(default)]
    pub return_annotation: Option<String>,
    /// `None` marks a stub declaration (body provided elsewhere, e.g. an
    /// intrinsic or assembly routine)
    #[serde(default)]
    pub body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub interrupt: bool,
    #[serde(default)]
    pub span: Span,
}

impl FunctionDecl {
    pub fn is_stub(&self) -> bool {
        self.body.is_none()
    }
}

/// Hardware map declarations: `@map borderColor at $D020: byte;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDecl {
    #[serde(default)]
    pub id: NodeId,
    pub name: String,
    #[serde(flatten)]
    pub kind: MapKind,
    /// Element/field type annotation for simple and range maps
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub exported: bool,
    #[serde(default)]
    pub span: Span,
}

/// The four map flavors the language supports.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MapKind {
    /// One register at a fixed address
    Simple { address: u16 },
    /// A contiguous address range, typed as an array of the element type
    Range { start: u16, end: u16 },
    /// Fields packed sequentially from a base address
    SequentialStruct { address: u16, fields: Vec<MapField> },
    /// Fields with explicit absolute addresses
    ExplicitStruct { fields: Vec<MapField> },
}

impl MapKind {
    /// Base address of the mapped region, where one exists.
    pub fn base_address(&self) -> Option<u16> {
        match self {
            MapKind::Simple { address } => Some(*address),
            MapKind::Range { start, .. } => Some(*start),
            MapKind::SequentialStruct { address, .. } => Some(*address),
            MapKind::ExplicitStruct { fields } => fields.first().and_then(|f| f.address),
        }
    }
}

/// One field of a struct map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapField {
    pub name: String,
    pub annotation: String,
    /// Absolute address for explicit-struct maps
    #[serde(default)]
    pub address: Option<u16>,
    #[serde(default)]
    pub span: Span,
}

/// `import { spriteX, spriteY } from game.sprites;`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportDecl {
    #[serde(default)]
    pub id: NodeId,
    pub names: Vec<String>,
    pub from: String,
    #[serde(default)]
    pub span: Span,
}

/// Statements inside function bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stmt", rename_all = "snake_case")]
pub enum Stmt {
    Variable(VariableDecl),
    Expr(ExprStmt),
    If(IfStmt),
    While(WhileStmt),
    For(ForStmt),
    Match(MatchStmt),
    Return(ReturnStmt),
    Break(BreakStmt),
    Continue(ContinueStmt),
}

impl Stmt {
    pub fn id(&self) -> NodeId {
        match self {
            Stmt::Variable(s) => s.id,
            Stmt::Expr(s) => s.id,
            Stmt::If(s) => s.id,
            Stmt::While(s) => s.id,
            Stmt::For(s) => s.id,
            Stmt::Match(s) => s.id,
            Stmt::Return(s) => s.id,
            Stmt::Break(s) => s.id,
            Stmt::Continue(s) => s.id,
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Stmt::Variable(s) => s.span,
            Stmt::Expr(s) => s.span,
            Stmt::If(s) => s.span,
            Stmt::While(s) => s.span,
            Stmt::For(s) => s.span,
            Stmt::Match(s) => s.span,
            Stmt::Return(s) => s.span,
            Stmt::Break(s) => s.span,
            Stmt::Continue(s) => s.span,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExprStmt {
    #[serde(default)]
    pub id: NodeId,
    pub expr: Expr,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IfStmt {
    #[serde(default)]
    pub id: NodeId,
    pub condition: Expr,
    pub then_body: Vec<Stmt>,
    #[serde(default)]
    pub else_body: Option<Vec<Stmt>>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhileStmt {
    #[serde(default)]
    pub id: NodeId,
    pub condition: Expr,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

/// `for i = 0 to 10 [step 2] { ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForStmt {
    #[serde(default)]
    pub id: NodeId,
    pub var: String,
    pub from: Expr,
    pub to: Expr,
    #[serde(default)]
    pub step: Option<Expr>,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchStmt {
    #[serde(default)]
    pub id: NodeId,
    pub scrutinee: Expr,
    pub arms: Vec<MatchArm>,
    #[serde(default)]
    pub default: Option<Vec<Stmt>>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchArm {
    pub value: Expr,
    pub body: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStmt {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub value: Option<Expr>,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakStmt {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContinueStmt {
    #[serde(default)]
    pub id: NodeId,
    #[serde(default)]
    pub span: Span,
}

/// An expression node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expr {
    #[serde(default)]
    pub id: NodeId,
    #[serde(flatten)]
    pub kind: ExprKind,
    #[serde(default)]
    pub span: Span,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "expr", rename_all = "snake_case")]
pub enum ExprKind {
    IntLiteral {
        value: i64,
    },
    BoolLiteral {
        value: bool,
    },
    StringLiteral {
        value: String,
    },
    ArrayLiteral {
        elements: Vec<Expr>,
    },
    Identifier {
        name: String,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    /// `target = value` or a compound form like `target += value`
    Assign {
        #[serde(default)]
        compound: Option<BinaryOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    Member {
        base: Box<Expr>,
        member: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
}

impl BinaryOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }

    pub fn token(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnaryOp {
    /// Arithmetic negation `-x`
    Neg,
    /// Logical not `!x`
    Not,
    /// Bitwise complement `~x`
    BitNot,
    /// Address-of `@x`
    AddressOf,
}

impl UnaryOp {
    pub fn token(self) -> &'static str {
        match self {
            UnaryOp::Neg => "-",
            UnaryOp::Not => "!",
            UnaryOp::BitNot => "~",
            UnaryOp::AddressOf => "@",
        }
    }
}

// ============================================================================
//                            NODE NUMBERING
// ============================================================================

/// Assign fresh sequential ids to every node in the program.
///
/// Returns the number of nodes visited. Called by the analyzer before the
/// first pass; parsers that already assign unique ids may skip it.
pub fn number_nodes(program: &mut Program) -> u32 {
    let mut next = 1u32; // 0 is reserved as "unassigned"

    let mut assign = |id: &mut NodeId| {
        *id = NodeId(next);
        next += 1;
    };

    for decl in &mut program.declarations {
        match decl {
            Declaration::Variable(v) => number_variable(v, &mut assign),
            Declaration::Function(f) => {
                assign(&mut f.id);
                for p in &mut f.params {
                    assign(&mut p.id);
                }
                if let Some(body) = &mut f.body {
                    for stmt in body {
                        number_stmt(stmt, &mut assign);
                    }
                }
            }
            Declaration::Map(m) => assign(&mut m.id),
            Declaration::Import(i) => assign(&mut i.id),
        }
    }

    next - 1
}

fn number_variable(v: &mut VariableDecl, assign: &mut impl FnMut(&mut NodeId)) {
    assign(&mut v.id);
    if let Some(init) = &mut v.initializer {
        number_expr(init, assign);
    }
}

fn number_stmt(stmt: &mut Stmt, assign: &mut impl FnMut(&mut NodeId)) {
    match stmt {
        Stmt::Variable(v) => number_variable(v, assign),
        Stmt::Expr(s) => {
            assign(&mut s.id);
            number_expr(&mut s.expr, assign);
        }
        Stmt::If(s) => {
            assign(&mut s.id);
            number_expr(&mut s.condition, assign);
            for st in &mut s.then_body {
                number_stmt(st, assign);
            }
            if let Some(else_body) = &mut s.else_body {
                for st in else_body {
                    number_stmt(st, assign);
                }
            }
        }
        Stmt::While(s) => {
            assign(&mut s.id);
            number_expr(&mut s.condition, assign);
            for st in &mut s.body {
                number_stmt(st, assign);
            }
        }
        Stmt::For(s) => {
            assign(&mut s.id);
            number_expr(&mut s.from, assign);
            number_expr(&mut s.to, assign);
            if let Some(step) = &mut s.step {
                number_expr(step, assign);
            }
            for st in &mut s.body {
                number_stmt(st, assign);
            }
        }
        Stmt::Match(s) => {
            assign(&mut s.id);
            number_expr(&mut s.scrutinee, assign);
            for arm in &mut s.arms {
                number_expr(&mut arm.value, assign);
                for st in &mut arm.body {
                    number_stmt(st, assign);
                }
            }
            if let Some(default) = &mut s.default {
                for st in default {
                    number_stmt(st, assign);
                }
            }
        }
        Stmt::Return(s) => {
            assign(&mut s.id);
            if let Some(value) = &mut s.value {
                number_expr(value, assign);
            }
        }
        Stmt::Break(s) => assign(&mut s.id),
        Stmt::Continue(s) => assign(&mut s.id),
    }
}

fn number_expr(expr: &mut Expr, assign: &mut impl FnMut(&mut NodeId)) {
    assign(&mut expr.id);
    match &mut expr.kind {
        ExprKind::IntLiteral { .. }
        | ExprKind::BoolLiteral { .. }
        | ExprKind::StringLiteral { .. }
        | ExprKind::Identifier { .. } => {}
        ExprKind::ArrayLiteral { elements } => {
            for e in elements {
                number_expr(e, assign);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            number_expr(lhs, assign);
            number_expr(rhs, assign);
        }
        ExprKind::Unary { operand, .. } => number_expr(operand, assign),
        ExprKind::Assign { target, value, .. } => {
            number_expr(target, assign);
            number_expr(value, assign);
        }
        ExprKind::Call { callee, args } => {
            number_expr(callee, assign);
            for a in args {
                number_expr(a, assign);
            }
        }
        ExprKind::Index { base, index } => {
            number_expr(base, assign);
            number_expr(index, assign);
        }
        ExprKind::Member { base, .. } => number_expr(base, assign),
    }
}

// ============================================================================
//                          PER-NODE METADATA
// ============================================================================

/// Well-known metadata keys. Analyses document their attachments here so
/// downstream consumers (IL generation, hardware hinting) share one
/// vocabulary.
pub mod meta {
    /// `MetaValue::Type` - computed type of an expression
    pub const EXPR_TYPE: &str = "type";
    /// `MetaValue::Symbol` - symbol an identifier resolved to
    pub const SYMBOL: &str = "symbol";
    /// `MetaValue::Nodes` - definition sites reaching an identifier use
    pub const REACHING_DEFS: &str = "reaching-defs";
    /// `MetaValue::Flag` - function is pure
    pub const PURE: &str = "pure";
    /// `MetaValue::Flag` - local variable escapes its function
    pub const ESCAPES: &str = "escapes";
    /// `MetaValue::Flag` - local variable may live in a static frame slot
    pub const STACK_ALLOCATABLE: &str = "stack-allocatable";
    /// `MetaValue::Count` - estimated frame depth in bytes (function decls)
    pub const STACK_DEPTH: &str = "stack-depth";
    /// `MetaValue::Flag` - frame estimate exceeds the target threshold
    pub const STACK_OVERFLOW_RISK: &str = "stack-overflow-risk";
    /// `MetaValue::Count` - reads of a variable
    pub const READ_COUNT: &str = "read-count";
    /// `MetaValue::Count` - writes of a variable
    pub const WRITE_COUNT: &str = "write-count";
    /// `MetaValue::Flag` - variable is accessed inside a loop
    pub const USED_IN_LOOP: &str = "used-in-loop";
    /// `MetaValue::Count` - zero-page placement score
    pub const ZP_SCORE: &str = "zp-score";
}

/// A value stored in a node's metadata bag.
#[derive(Debug, Clone, PartialEq)]
pub enum MetaValue {
    Type(Type),
    Symbol(SymbolId),
    Flag(bool),
    Count(u64),
    Nodes(Vec<NodeId>),
    Text(String),
}

impl MetaValue {
    pub fn as_type(&self) -> Option<&Type> {
        match self {
            MetaValue::Type(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<SymbolId> {
        match self {
            MetaValue::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_flag(&self) -> Option<bool> {
        match self {
            MetaValue::Flag(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_count(&self) -> Option<u64> {
        match self {
            MetaValue::Count(c) => Some(*c),
            _ => None,
        }
    }
}

/// Side table holding every node's metadata bag.
///
/// Additive across the pipeline: passes insert under their documented keys
/// and never delete earlier attachments.
#[derive(Debug, Default)]
pub struct MetadataStore {
    bags: HashMap<NodeId, HashMap<&'static str, MetaValue>>,
}

impl MetadataStore {
    pub fn new() -> Self {
        MetadataStore::default()
    }

    pub fn set(&mut self, node: NodeId, key: &'static str, value: MetaValue) {
        self.bags.entry(node).or_default().insert(key, value);
    }

    pub fn get(&self, node: NodeId, key: &str) -> Option<&MetaValue> {
        self.bags.get(&node).and_then(|bag| bag.get(key))
    }

    /// Convenience accessor for the computed type of an expression.
    pub fn expr_type(&self, node: NodeId) -> Option<&Type> {
        self.get(node, meta::EXPR_TYPE).and_then(MetaValue::as_type)
    }

    /// Convenience accessor for the symbol an identifier resolved to.
    pub fn symbol(&self, node: NodeId) -> Option<SymbolId> {
        self.get(node, meta::SYMBOL).and_then(MetaValue::as_symbol)
    }

    pub fn set_expr_type(&mut self, node: NodeId, ty: Type) {
        self.set(node, meta::EXPR_TYPE, MetaValue::Type(ty));
    }

    pub fn set_symbol(&mut self, node: NodeId, symbol: SymbolId) {
        self.set(node, meta::SYMBOL, MetaValue::Symbol(symbol));
    }
}

// ============================================================================
//                          TEST CONSTRUCTION HELPERS
// ============================================================================

/// Shorthand constructors used across the crate's unit tests.
#[cfg(test)]
pub mod build {
    use super::*;

    pub fn program(name: &str, declarations: Vec<Declaration>) -> Program {
        let mut p = Program {
            module: ModuleHeader {
                name: name.to_string(),
                implicit: false,
                span: Span::default(),
            },
            declarations,
            span: Span::default(),
        };
        number_nodes(&mut p);
        p
    }

    pub fn int(value: i64) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::IntLiteral { value },
            span: Span::default(),
        }
    }

    pub fn boolean(value: bool) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::BoolLiteral { value },
            span: Span::default(),
        }
    }

    pub fn string(value: &str) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::StringLiteral {
                value: value.to_string(),
            },
            span: Span::default(),
        }
    }

    pub fn array(elements: Vec<Expr>) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::ArrayLiteral { elements },
            span: Span::default(),
        }
    }

    pub fn ident(name: &str) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Identifier {
                name: name.to_string(),
            },
            span: Span::default(),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            span: Span::default(),
        }
    }

    pub fn unary(op: UnaryOp, operand: Expr) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Unary {
                op,
                operand: Box::new(operand),
            },
            span: Span::default(),
        }
    }

    pub fn assign(target: Expr, value: Expr) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Assign {
                compound: None,
                target: Box::new(target),
                value: Box::new(value),
            },
            span: Span::default(),
        }
    }

    pub fn compound_assign(op: BinaryOp, target: Expr, value: Expr) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Assign {
                compound: Some(op),
                target: Box::new(target),
                value: Box::new(value),
            },
            span: Span::default(),
        }
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Call {
                callee: Box::new(ident(name)),
                args,
            },
            span: Span::default(),
        }
    }

    pub fn index(base: Expr, idx: Expr) -> Expr {
        Expr {
            id: NodeId::default(),
            kind: ExprKind::Index {
                base: Box::new(base),
                index: Box::new(idx),
            },
            span: Span::default(),
        }
    }

    pub fn expr_stmt(expr: Expr) -> Stmt {
        Stmt::Expr(ExprStmt {
            id: NodeId::default(),
            expr,
            span: Span::default(),
        })
    }

    pub fn var_decl(
        name: &str,
        annotation: Option<&str>,
        initializer: Option<Expr>,
    ) -> VariableDecl {
        VariableDecl {
            id: NodeId::default(),
            name: name.to_string(),
            annotation: annotation.map(str::to_string),
            initializer,
            storage: None,
            exported: false,
            constant: false,
            span: Span::default(),
        }
    }

    pub fn let_stmt(name: &str, annotation: Option<&str>, initializer: Option<Expr>) -> Stmt {
        Stmt::Variable(var_decl(name, annotation, initializer))
    }

    pub fn ret(value: Option<Expr>) -> Stmt {
        Stmt::Return(ReturnStmt {
            id: NodeId::default(),
            value,
            span: Span::default(),
        })
    }

    pub fn brk() -> Stmt {
        Stmt::Break(BreakStmt {
            id: NodeId::default(),
            span: Span::default(),
        })
    }

    pub fn cont() -> Stmt {
        Stmt::Continue(ContinueStmt {
            id: NodeId::default(),
            span: Span::default(),
        })
    }

    pub fn if_stmt(condition: Expr, then_body: Vec<Stmt>, else_body: Option<Vec<Stmt>>) -> Stmt {
        Stmt::If(IfStmt {
            id: NodeId::default(),
            condition,
            then_body,
            else_body,
            span: Span::default(),
        })
    }

    pub fn while_stmt(condition: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::While(WhileStmt {
            id: NodeId::default(),
            condition,
            body,
            span: Span::default(),
        })
    }

    pub fn for_stmt(var: &str, from: Expr, to: Expr, body: Vec<Stmt>) -> Stmt {
        Stmt::For(ForStmt {
            id: NodeId::default(),
            var: var.to_string(),
            from,
            to,
            step: None,
            body,
            span: Span::default(),
        })
    }

    pub fn function(
        name: &str,
        params: Vec<(&str, &str)>,
        ret: Option<&str>,
        body: Vec<Stmt>,
    ) -> Declaration {
        Declaration::Function(FunctionDecl {
            id: NodeId::default(),
            name: name.to_string(),
            params: params
                .into_iter()
                .map(|(n, t)| Param {
                    id: NodeId::default(),
                    name: n.to_string(),
                    annotation: t.to_string(),
                    storage: None,
                    span: Span::default(),
                })
                .collect(),
            return_annotation: ret.map(str::to_string),
            body: Some(body),
            exported: false,
            interrupt: false,
            span: Span::default(),
        })
    }

    pub fn stub_function(name: &str, params: Vec<(&str, &str)>, ret: Option<&str>) -> Declaration {
        match function(name, params, ret, vec![]) {
            Declaration::Function(mut f) => {
                f.body = None;
                Declaration::Function(f)
            }
            _ => unreachable!(),
        }
    }

    pub fn global(name: &str, annotation: Option<&str>, initializer: Option<Expr>) -> Declaration {
        Declaration::Variable(var_decl(name, annotation, initializer))
    }

    pub fn simple_map(name: &str, address: u16, annotation: &str) -> Declaration {
        Declaration::Map(MapDecl {
            id: NodeId::default(),
            name: name.to_string(),
            kind: MapKind::Simple { address },
            annotation: Some(annotation.to_string()),
            exported: false,
            span: Span::default(),
        })
    }

    pub fn import(names: Vec<&str>, from: &str) -> Declaration {
        Declaration::Import(ImportDecl {
            id: NodeId::default(),
            names: names.into_iter().map(str::to_string).collect(),
            from: from.to_string(),
            span: Span::default(),
        })
    }
}
