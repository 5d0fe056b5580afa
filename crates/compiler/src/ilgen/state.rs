//! Generator state and core types
//!
//! `ILGen` owns the module being built plus the state of whichever
//! function is currently being lowered: the active block, the mapping
//! from symbols to storable locations, and the loop-context stack that
//! `break`/`continue` resolve against.

use crate::ast::MetadataStore;
use crate::config::{GenOptions, TargetConfig};
use crate::diagnostics::{Code, Diagnostic, Diagnostics, Severity};
use crate::il::{BlockId, ILFunction, ILModule, ILType, Instruction, RegId, VarRef};
use crate::symtab::{SymbolId, SymbolTable};
use indexmap::IndexMap;

/// Targets a `break` or `continue` jumps to inside the innermost loop.
#[derive(Debug, Clone, Copy)]
pub(super) struct LoopTargets {
    pub continue_target: BlockId,
    pub break_target: BlockId,
}

/// The AST -> IL generator.
pub struct ILGen<'a> {
    pub(super) table: &'a SymbolTable,
    pub(super) metadata: &'a MetadataStore,
    pub(super) target: &'a TargetConfig,
    pub(super) options: &'a GenOptions,
    pub(super) diagnostics: &'a mut Diagnostics,
    pub(super) module: ILModule,

    // State of the function currently being lowered
    pub(super) func: Option<ILFunction>,
    pub(super) current: BlockId,
    pub(super) vars: IndexMap<SymbolId, VarRef>,
    pub(super) loops: Vec<LoopTargets>,
    pub(super) return_type: ILType,
}

impl<'a> ILGen<'a> {
    pub fn new(
        module_name: &str,
        table: &'a SymbolTable,
        metadata: &'a MetadataStore,
        target: &'a TargetConfig,
        options: &'a GenOptions,
        diagnostics: &'a mut Diagnostics,
    ) -> Self {
        ILGen {
            table,
            metadata,
            target,
            options,
            diagnostics,
            module: ILModule::new(module_name),
            func: None,
            current: ILFunction::ENTRY,
            vars: IndexMap::new(),
            loops: Vec::new(),
            return_type: ILType::Void,
        }
    }

    /// The function being lowered. Only valid between `begin_function`
    /// and `finish_function`.
    pub(super) fn func(&mut self) -> &mut ILFunction {
        self.func
            .as_mut()
            .expect("lowering state used outside a function")
    }

    pub(super) fn func_ref(&self) -> &ILFunction {
        self.func
            .as_ref()
            .expect("lowering state used outside a function")
    }

    /// Append an instruction to the current block.
    ///
    /// If the block is already terminated (code after return/break), a
    /// fresh block marked unreachable is opened so lowering always
    /// produces a structurally valid function.
    pub(super) fn emit(&mut self, instruction: Instruction) {
        self.ensure_open_block();
        let current = self.current;
        self.func().block_mut(current).push(instruction);
    }

    /// Terminate the current block and record edges.
    pub(super) fn terminate(&mut self, terminator: Instruction) {
        self.ensure_open_block();
        let current = self.current;
        self.func().terminate(current, terminator);
    }

    /// Switch lowering to an existing block.
    pub(super) fn switch_to(&mut self, block: BlockId) {
        self.current = block;
    }

    pub(super) fn ensure_open_block(&mut self) {
        let current = self.current;
        if self.func().block(current).is_terminated() {
            let dead = self.func().add_block("dead");
            self.func().block_mut(dead).unreachable = true;
            self.current = dead;
        }
    }

    pub(super) fn current_terminated(&self) -> bool {
        self.func_ref().block(self.current).is_terminated()
    }

    /// Fresh temporary typed `ty`.
    pub(super) fn temp(&mut self, ty: ILType) -> RegId {
        self.func().new_register(ty, None)
    }

    /// The storable location of a symbol: a local register or a global.
    pub(super) fn var_ref(&self, symbol: SymbolId) -> Option<VarRef> {
        if let Some(v) = self.vars.get(&symbol) {
            return Some(v.clone());
        }
        let sym = self.table.symbol(symbol);
        if sym.scope == self.table.root() {
            return Some(VarRef::Global(sym.name.clone()));
        }
        None
    }

    /// Source-level type of an expression node, lowered. `byte` when the
    /// checker could not type it.
    pub(super) fn expr_il_type(&self, node: crate::ast::NodeId) -> ILType {
        self.metadata
            .expr_type(node)
            .map(ILType::from_type)
            .unwrap_or(ILType::Byte)
    }

    pub(super) fn error(&mut self, code: Code, message: impl Into<String>, span: crate::ast::Span) {
        self.diagnostics.push(Diagnostic::error(code, message, span));
    }

    pub(super) fn warning(
        &mut self,
        code: Code,
        message: impl Into<String>,
        span: crate::ast::Span,
    ) {
        self.diagnostics.push(Diagnostic {
            severity: Severity::Warning,
            code,
            message: message.into(),
            location: span,
            related: Vec::new(),
        });
    }

    /// Emit a placeholder value so downstream lowering has something to
    /// chew on after an error.
    pub(super) fn placeholder(&mut self, ty: ILType) -> RegId {
        let dest = self.temp(ty);
        self.emit(Instruction::Const { dest, value: 0 });
        dest
    }

    /// Take the finished module out of the generator.
    pub(super) fn into_module(self) -> ILModule {
        self.module
    }
}
