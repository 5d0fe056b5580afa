//! IL functions and basic blocks

use super::{ILType, Instruction, RegId, StorageHint, VirtualRegister};

/// Index of a basic block within its function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "b{}", self.0)
    }
}

/// A maximal straight-line instruction sequence with one terminator.
#[derive(Debug, Clone)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub instructions: Vec<Instruction>,
    pub predecessors: Vec<BlockId>,
    pub successors: Vec<BlockId>,
    /// Set by the generator for blocks it knows control cannot reach;
    /// they are kept in the function for inspection
    pub unreachable: bool,
    /// True for blocks removed with `remove_block`; their instructions
    /// are dropped and their id is never reused
    pub removed: bool,
}

impl BasicBlock {
    fn new(id: BlockId, label: String) -> Self {
        BasicBlock {
            id,
            label,
            instructions: Vec::new(),
            predecessors: Vec::new(),
            successors: Vec::new(),
            unreachable: false,
            removed: false,
        }
    }

    /// The block's terminator, if it has one.
    pub fn terminator(&self) -> Option<&Instruction> {
        self.instructions.last().filter(|i| i.is_terminator())
    }

    pub fn is_terminated(&self) -> bool {
        self.terminator().is_some()
    }

    /// Append an instruction. Appending past a terminator is an internal
    /// error; the generator opens a fresh block instead.
    pub fn push(&mut self, instruction: Instruction) {
        assert!(
            !self.is_terminated(),
            "block {} already has terminator {:?}",
            self.id,
            self.terminator()
        );
        self.instructions.push(instruction);
    }

    /// Insert a phi at the head of the block, after any existing phis.
    pub fn insert_phi(&mut self, phi: Instruction) {
        debug_assert!(matches!(phi, Instruction::Phi { .. }));
        let at = self
            .instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Phi { .. }))
            .count();
        self.instructions.insert(at, phi);
    }

    /// Phi instructions at the head of the block.
    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions
            .iter()
            .take_while(|i| matches!(i, Instruction::Phi { .. }))
    }
}

/// A typed parameter with its pre-created register.
#[derive(Debug, Clone)]
pub struct ILParam {
    pub name: String,
    pub ty: ILType,
    pub reg: RegId,
    pub storage: StorageHint,
}

/// One function in the IL module.
///
/// The entry block always has id 0 and label `entry`, is created at
/// construction, and can never be removed. Register ids and block ids are
/// monotone; parameter registers are created first, in declaration order.
#[derive(Debug, Clone)]
pub struct ILFunction {
    pub name: String,
    pub params: Vec<ILParam>,
    pub return_type: ILType,
    pub exported: bool,
    pub interrupt: bool,
    registers: Vec<VirtualRegister>,
    blocks: Vec<BasicBlock>,
}

impl ILFunction {
    pub fn new(
        name: &str,
        params: Vec<(String, ILType, StorageHint)>,
        return_type: ILType,
    ) -> Self {
        let mut f = ILFunction {
            name: name.to_string(),
            params: Vec::new(),
            return_type,
            exported: false,
            interrupt: false,
            registers: Vec::new(),
            blocks: vec![BasicBlock::new(BlockId(0), "entry".to_string())],
        };
        for (name, ty, storage) in params {
            let reg = f.new_register(ty.clone(), Some(&name));
            f.params.push(ILParam {
                name,
                ty,
                reg,
                storage,
            });
        }
        f
    }

    pub const ENTRY: BlockId = BlockId(0);

    // ------------------------------------------------------------------
    // Registers
    // ------------------------------------------------------------------

    /// Mint a fresh register.
    pub fn new_register(&mut self, ty: ILType, name: Option<&str>) -> RegId {
        let id = RegId(self.registers.len() as u32);
        self.registers.push(VirtualRegister {
            id,
            ty,
            name: name.map(str::to_string),
            ssa_version: None,
        });
        id
    }

    /// Mint an SSA version of an existing register.
    pub fn new_version(&mut self, of: RegId, version: u32) -> RegId {
        let base = &self.registers[of.0 as usize];
        let ty = base.ty.clone();
        let name = base.name.clone();
        let id = RegId(self.registers.len() as u32);
        self.registers.push(VirtualRegister {
            id,
            ty,
            name,
            ssa_version: Some(version),
        });
        id
    }

    pub fn register(&self, id: RegId) -> &VirtualRegister {
        &self.registers[id.0 as usize]
    }

    pub fn registers(&self) -> impl Iterator<Item = &VirtualRegister> {
        self.registers.iter()
    }

    pub fn register_count(&self) -> usize {
        self.registers.len()
    }

    /// The register of a parameter by name.
    pub fn param_register(&self, name: &str) -> Option<RegId> {
        self.params.iter().find(|p| p.name == name).map(|p| p.reg)
    }

    // ------------------------------------------------------------------
    // Blocks
    // ------------------------------------------------------------------

    /// Create a new block. Labels get the block id appended so they stay
    /// unique (`then.3`, `merge.5`).
    pub fn add_block(&mut self, label: &str) -> BlockId {
        let id = BlockId(self.blocks.len() as u32);
        self.blocks.push(BasicBlock::new(id, format!("{}.{}", label, id.0)));
        id
    }

    /// Remove a block, unlinking its edges. The entry block cannot be
    /// removed; its slot is tombstoned so ids stay stable.
    pub fn remove_block(&mut self, id: BlockId) {
        assert!(id != Self::ENTRY, "the entry block cannot be removed");
        let preds = self.blocks[id.0 as usize].predecessors.clone();
        let succs = self.blocks[id.0 as usize].successors.clone();
        for p in preds {
            self.blocks[p.0 as usize].successors.retain(|&s| s != id);
        }
        for s in succs {
            self.blocks[s.0 as usize].predecessors.retain(|&p| p != id);
        }
        let block = &mut self.blocks[id.0 as usize];
        block.instructions.clear();
        block.predecessors.clear();
        block.successors.clear();
        block.removed = true;
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0 as usize]
    }

    pub fn block_mut(&mut self, id: BlockId) -> &mut BasicBlock {
        &mut self.blocks[id.0 as usize]
    }

    /// Live (non-removed) blocks in id order.
    pub fn blocks(&self) -> impl Iterator<Item = &BasicBlock> {
        self.blocks.iter().filter(|b| !b.removed)
    }

    pub fn block_count(&self) -> usize {
        self.blocks.iter().filter(|b| !b.removed).count()
    }

    /// Total block slots including tombstones; useful for dense index
    /// vectors.
    pub fn block_slots(&self) -> usize {
        self.blocks.len()
    }

    /// Record a control-flow edge.
    pub fn add_edge(&mut self, from: BlockId, to: BlockId) {
        if !self.blocks[from.0 as usize].successors.contains(&to) {
            self.blocks[from.0 as usize].successors.push(to);
        }
        if !self.blocks[to.0 as usize].predecessors.contains(&from) {
            self.blocks[to.0 as usize].predecessors.push(from);
        }
    }

    /// Append a terminator to `from` and record its edges.
    pub fn terminate(&mut self, from: BlockId, terminator: Instruction) {
        debug_assert!(terminator.is_terminator());
        for target in terminator.branch_targets() {
            self.add_edge(from, target);
        }
        self.blocks[from.0 as usize].push(terminator);
    }
}

impl std::fmt::Display for ILFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "function {}(", self.name)?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {} [{}]", p.name, p.ty, p.reg)?;
        }
        writeln!(f, "): {} {{", self.return_type)?;
        for block in self.blocks() {
            write!(f, "{}:", block.label)?;
            if block.unreachable {
                write!(f, "  ; unreachable")?;
            }
            writeln!(f)?;
            for instruction in &block.instructions {
                writeln!(f, "    {}", instruction)?;
            }
        }
        write!(f, "}}")
    }
}
