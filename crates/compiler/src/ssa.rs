//! SSA construction
//!
//! Converts a lowered IL function to static single assignment form:
//! dominator tree, dominance frontiers, phi placement for every variable
//! register with definitions in more than one block, then a preorder walk
//! of the dominator tree renaming each definition to a fresh version and
//! each use to the version on top of its stack.
//!
//! Variable registers are the `STORE_VAR` targets plus parameter
//! registers (defined at entry); address-taken registers are excluded
//! because stores through the address cannot be versioned.
//!
//! Verification is optional and off by default: a phi operand defined on
//! a loop back-edge does not dominate the phi position, which strict
//! dominance checking rejects even though the loop is well-formed.

use crate::config::GenOptions;
use crate::il::{BlockId, DominatorTree, ILFunction, Instruction, RegId, VarRef};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

/// Per-function SSA statistics.
#[derive(Debug, Clone, Default)]
pub struct SsaStats {
    pub phi_count: usize,
    pub versions_created: usize,
    pub dom_tree_depth: usize,
    pub elapsed: Option<Duration>,
}

/// Convert one function to SSA form in place.
pub fn construct_ssa(function: &mut ILFunction, options: &GenOptions) -> Result<SsaStats, String> {
    let started = options.collect_ssa_stats.then(Instant::now);

    let dom = function.compute_dominators();
    let frontier = function.compute_dominance_frontier(&dom);
    let reachable: HashSet<BlockId> = function.reachable_blocks().into_iter().collect();

    // ------------------------------------------------------------------
    // Variable collection
    // ------------------------------------------------------------------
    let mut def_blocks: HashMap<RegId, Vec<BlockId>> = HashMap::new();
    let mut address_taken: HashSet<RegId> = HashSet::new();
    for param in &function.params {
        def_blocks.entry(param.reg).or_default().push(ILFunction::ENTRY);
    }
    for block in function.blocks() {
        for instruction in &block.instructions {
            match instruction {
                Instruction::StoreVar {
                    var: VarRef::Reg(v),
                    ..
                } => {
                    let defs = def_blocks.entry(*v).or_default();
                    if !defs.contains(&block.id) {
                        defs.push(block.id);
                    }
                }
                Instruction::AddrOf {
                    var: VarRef::Reg(v),
                    ..
                } => {
                    address_taken.insert(*v);
                }
                _ => {}
            }
        }
    }

    // SSA variables, in register order for deterministic phi layout
    let mut ssa_vars: Vec<RegId> = def_blocks
        .keys()
        .copied()
        .filter(|v| !address_taken.contains(v))
        .collect();
    ssa_vars.sort();

    // ------------------------------------------------------------------
    // Phi placement
    // ------------------------------------------------------------------
    // Variables of the phis at each block head, in phi order
    let mut phi_vars: HashMap<BlockId, Vec<RegId>> = HashMap::new();
    let mut phi_count = 0usize;

    if options.insert_phi_instructions {
        for &var in &ssa_vars {
            let mut worklist: Vec<BlockId> = def_blocks[&var].clone();
            let mut placed: HashSet<BlockId> = HashSet::new();
            let mut processed: HashSet<BlockId> = worklist.iter().copied().collect();

            while let Some(block) = worklist.pop() {
                for &join in &frontier[block.0 as usize] {
                    if !reachable.contains(&join) || placed.contains(&join) {
                        continue;
                    }
                    placed.insert(join);
                    function.block_mut(join).insert_phi(Instruction::Phi {
                        dest: var, // renamed below
                        incoming: Vec::new(),
                    });
                    phi_vars.entry(join).or_default().push(var);
                    phi_count += 1;
                    // The phi is itself a definition; iterate to closure
                    if processed.insert(join) {
                        worklist.push(join);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Renaming
    // ------------------------------------------------------------------
    let mut renamer = Renamer {
        function,
        dom: &dom,
        phi_vars: &phi_vars,
        ssa_vars: ssa_vars.iter().copied().collect(),
        stacks: HashMap::new(),
        counters: HashMap::new(),
        versions_created: 0,
    };
    // Parameters are version 0 of themselves, defined at entry
    for i in 0..renamer.function.params.len() {
        let reg = renamer.function.params[i].reg;
        renamer.stacks.insert(reg, vec![reg]);
        renamer.counters.insert(reg, 1);
    }
    renamer.rename_block(ILFunction::ENTRY);
    let versions_created = renamer.versions_created;

    if options.verify_ssa {
        verify(function)?;
    }

    Ok(SsaStats {
        phi_count,
        versions_created,
        dom_tree_depth: dom.depth(),
        elapsed: started.map(|s| s.elapsed()),
    })
}

struct Renamer<'a> {
    function: &'a mut ILFunction,
    dom: &'a DominatorTree,
    phi_vars: &'a HashMap<BlockId, Vec<RegId>>,
    ssa_vars: HashSet<RegId>,
    /// Original variable -> stack of current versions
    stacks: HashMap<RegId, Vec<RegId>>,
    counters: HashMap<RegId, u32>,
    versions_created: usize,
}

impl Renamer<'_> {
    fn current(&self, var: RegId) -> Option<RegId> {
        self.stacks.get(&var).and_then(|s| s.last().copied())
    }

    fn push_version(&mut self, var: RegId) -> RegId {
        let version = {
            let counter = self.counters.entry(var).or_insert(0);
            let v = *counter;
            *counter += 1;
            v
        };
        let reg = self.function.new_version(var, version);
        self.stacks.entry(var).or_default().push(reg);
        self.versions_created += 1;
        reg
    }

    fn rename_use(&self, reg: &mut RegId) {
        if self.ssa_vars.contains(reg) {
            if let Some(top) = self.current(*reg) {
                *reg = top;
            }
        }
    }

    /// Preorder walk of the dominator tree.
    fn rename_block(&mut self, block: BlockId) {
        let mut pushes: Vec<RegId> = Vec::new();

        // Phi destinations define new versions before any ordinary
        // instruction executes
        let phis_here = self.phi_vars.get(&block).cloned().unwrap_or_default();
        for (k, var) in phis_here.iter().enumerate() {
            let new = self.push_version(*var);
            pushes.push(*var);
            if let Instruction::Phi { dest, .. } =
                &mut self.function.block_mut(block).instructions[k]
            {
                *dest = new;
            }
        }

        // Ordinary instructions: rename uses, then turn variable stores
        // into definitions of fresh versions
        let instruction_count = self.function.block(block).instructions.len();
        for i in phis_here.len()..instruction_count {
            // Uses first
            let mut instruction = self.function.block(block).instructions[i].clone();
            self.rename_instruction_uses(&mut instruction);

            if let Instruction::StoreVar {
                var: VarRef::Reg(v),
                ..
            } = &mut instruction
            {
                if self.ssa_vars.contains(v) {
                    let original = *v;
                    let new = self.push_version(original);
                    pushes.push(original);
                    *v = new;
                }
            }
            self.function.block_mut(block).instructions[i] = instruction;
        }

        // Fill in our slot of every successor's phis
        let successors = self.function.block(block).successors.clone();
        for succ in successors {
            let Some(vars) = self.phi_vars.get(&succ) else {
                continue;
            };
            for (k, var) in vars.iter().enumerate() {
                let value = self.current(*var).unwrap_or(*var);
                if let Instruction::Phi { incoming, .. } =
                    &mut self.function.block_mut(succ).instructions[k]
                {
                    incoming.push((block, value));
                }
            }
        }

        // Children in the dominator tree
        for child in self.dom.children(block) {
            self.rename_block(child);
        }

        // Unwind this block's definitions
        for var in pushes.into_iter().rev() {
            if let Some(stack) = self.stacks.get_mut(&var) {
                stack.pop();
            }
        }
    }

    fn rename_instruction_uses(&self, instruction: &mut Instruction) {
        match instruction {
            Instruction::LoadVar { var, .. } => {
                if let VarRef::Reg(v) = var {
                    self.rename_use(v);
                }
            }
            Instruction::StoreVar { src, .. } => self.rename_use(src),
            Instruction::LoadElem { index, array, .. } => {
                self.rename_use(index);
                if let VarRef::Reg(v) = array {
                    self.rename_use(v);
                }
            }
            Instruction::StoreElem { index, src, array } => {
                self.rename_use(index);
                self.rename_use(src);
                if let VarRef::Reg(v) = array {
                    self.rename_use(v);
                }
            }
            Instruction::Binary { lhs, rhs, .. } => {
                self.rename_use(lhs);
                self.rename_use(rhs);
            }
            Instruction::Unary { src, .. } => self.rename_use(src),
            Instruction::Call { args, .. } | Instruction::Intrinsic { args, .. } => {
                for a in args {
                    self.rename_use(a);
                }
            }
            Instruction::CallIndirect { callee, args, .. } => {
                self.rename_use(callee);
                for a in args {
                    self.rename_use(a);
                }
            }
            Instruction::Branch { cond, .. } => self.rename_use(cond),
            Instruction::Return { value } => self.rename_use(value),
            Instruction::Const { .. }
            | Instruction::ConstString { .. }
            | Instruction::AddrOf { .. }
            | Instruction::Jump { .. }
            | Instruction::ReturnVoid
            | Instruction::Phi { .. } => {}
        }
    }
}

/// Structural SSA checks: unique definitions and one phi operand per
/// predecessor. Dominance of uses is deliberately not checked here; see
/// the module docs.
fn verify(function: &ILFunction) -> Result<(), String> {
    let mut defined: HashSet<RegId> = HashSet::new();
    for param in &function.params {
        defined.insert(param.reg);
    }
    for block in function.blocks() {
        for instruction in &block.instructions {
            if let Some(dest) = instruction.dest() {
                let versioned = function.register(dest).ssa_version.is_some();
                if versioned && !defined.insert(dest) {
                    return Err(format!(
                        "SSA register {} defined more than once in '{}'",
                        dest, function.name
                    ));
                }
            }
            if let Instruction::Phi { incoming, .. } = instruction {
                if incoming.len() != block.predecessors.len() {
                    return Err(format!(
                        "phi in block {} of '{}' has {} operands for {} predecessors",
                        block.id,
                        function.name,
                        incoming.len(),
                        block.predecessors.len()
                    ));
                }
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{BinOp, ILType};

    /// let i = 0; while (i < 10) { i = i + 1; }
    ///
    /// entry: store i <- 0; jump header
    /// header: t = load i; c = t < 10; branch c body, exit
    /// body: t2 = load i; t3 = t2 + 1; store i <- t3; jump header
    /// exit: ret
    fn counting_loop() -> (ILFunction, RegId, BlockId) {
        let mut f = ILFunction::new("loop", vec![], ILType::Void);
        let i = f.new_register(ILType::Byte, Some("i"));
        let header = f.add_block("header");
        let body = f.add_block("body");
        let exit = f.add_block("exit");

        let zero = f.new_register(ILType::Byte, None);
        f.block_mut(ILFunction::ENTRY).push(Instruction::Const {
            dest: zero,
            value: 0,
        });
        f.block_mut(ILFunction::ENTRY).push(Instruction::StoreVar {
            var: VarRef::Reg(i),
            src: zero,
        });
        f.terminate(ILFunction::ENTRY, Instruction::Jump { target: header });

        let t = f.new_register(ILType::Byte, None);
        let ten = f.new_register(ILType::Byte, None);
        let c = f.new_register(ILType::Bool, None);
        f.block_mut(header).push(Instruction::LoadVar {
            dest: t,
            var: VarRef::Reg(i),
        });
        f.block_mut(header).push(Instruction::Const {
            dest: ten,
            value: 10,
        });
        f.block_mut(header).push(Instruction::Binary {
            op: BinOp::CmpLt,
            dest: c,
            lhs: t,
            rhs: ten,
        });
        f.terminate(
            header,
            Instruction::Branch {
                cond: c,
                then_target: body,
                else_target: exit,
            },
        );

        let t2 = f.new_register(ILType::Byte, None);
        let one = f.new_register(ILType::Byte, None);
        let t3 = f.new_register(ILType::Byte, None);
        f.block_mut(body).push(Instruction::LoadVar {
            dest: t2,
            var: VarRef::Reg(i),
        });
        f.block_mut(body).push(Instruction::Const {
            dest: one,
            value: 1,
        });
        f.block_mut(body).push(Instruction::Binary {
            op: BinOp::Add,
            dest: t3,
            lhs: t2,
            rhs: one,
        });
        f.block_mut(body).push(Instruction::StoreVar {
            var: VarRef::Reg(i),
            src: t3,
        });
        f.terminate(body, Instruction::Jump { target: header });

        f.terminate(exit, Instruction::ReturnVoid);
        (f, i, header)
    }

    #[test]
    fn test_loop_gets_one_phi_at_header() {
        let (mut f, _, header) = counting_loop();
        let stats = construct_ssa(&mut f, &GenOptions::default()).unwrap();
        assert_eq!(stats.phi_count, 1);

        let phis: Vec<_> = f.block(header).phis().collect();
        assert_eq!(phis.len(), 1);
        match phis[0] {
            Instruction::Phi { incoming, .. } => {
                // One operand per predecessor: entry and the back-edge
                assert_eq!(incoming.len(), 2);
                let blocks: Vec<BlockId> = incoming.iter().map(|(b, _)| *b).collect();
                assert!(blocks.contains(&ILFunction::ENTRY));
            }
            other => panic!("expected phi, got {:?}", other),
        }
    }

    #[test]
    fn test_loop_verifies() {
        let (mut f, ..) = counting_loop();
        let options = GenOptions::default().with_verify_ssa(true);
        construct_ssa(&mut f, &options).expect("loop SSA should verify");
    }

    #[test]
    fn test_versions_are_distinct_registers() {
        let (mut f, i, _) = counting_loop();
        let before = f.register_count();
        let stats = construct_ssa(&mut f, &GenOptions::default()).unwrap();
        assert!(stats.versions_created >= 2); // entry def + body def (+ phi)
        assert!(f.register_count() > before);

        // Versioned registers inherit the variable's name
        let versions: Vec<_> = f
            .registers()
            .filter(|r| r.ssa_version.is_some())
            .collect();
        assert!(!versions.is_empty());
        assert!(versions.iter().all(|r| r.name.as_deref() == Some("i")));
        // The original register id is untouched
        assert!(f.register(i).ssa_version.is_none());
    }

    #[test]
    fn test_straight_line_needs_no_phi() {
        let mut f = ILFunction::new(
            "add",
            vec![
                ("a".to_string(), ILType::Byte, None),
                ("b".to_string(), ILType::Byte, None),
            ],
            ILType::Byte,
        );
        let sum = f.new_register(ILType::Byte, None);
        f.block_mut(ILFunction::ENTRY).push(Instruction::Binary {
            op: BinOp::Add,
            dest: sum,
            lhs: RegId(0),
            rhs: RegId(1),
        });
        f.terminate(ILFunction::ENTRY, Instruction::Return { value: sum });

        let stats = construct_ssa(&mut f, &GenOptions::default()).unwrap();
        assert_eq!(stats.phi_count, 0);
        assert_eq!(stats.versions_created, 0);
        assert_eq!(stats.dom_tree_depth, 1);
    }

    #[test]
    fn test_diamond_assignment_merges() {
        // x = 1; if c { x = 2 } else { x = 3 }; return x
        let mut f = ILFunction::new(
            "d",
            vec![("c".to_string(), ILType::Bool, None)],
            ILType::Byte,
        );
        let x = f.new_register(ILType::Byte, Some("x"));
        let then_b = f.add_block("then");
        let else_b = f.add_block("else");
        let merge = f.add_block("merge");

        let one = f.new_register(ILType::Byte, None);
        f.block_mut(ILFunction::ENTRY).push(Instruction::Const {
            dest: one,
            value: 1,
        });
        f.block_mut(ILFunction::ENTRY).push(Instruction::StoreVar {
            var: VarRef::Reg(x),
            src: one,
        });
        f.terminate(
            ILFunction::ENTRY,
            Instruction::Branch {
                cond: RegId(0),
                then_target: then_b,
                else_target: else_b,
            },
        );

        let two = f.new_register(ILType::Byte, None);
        f.block_mut(then_b).push(Instruction::Const {
            dest: two,
            value: 2,
        });
        f.block_mut(then_b).push(Instruction::StoreVar {
            var: VarRef::Reg(x),
            src: two,
        });
        f.terminate(then_b, Instruction::Jump { target: merge });

        let three = f.new_register(ILType::Byte, None);
        f.block_mut(else_b).push(Instruction::Const {
            dest: three,
            value: 3,
        });
        f.block_mut(else_b).push(Instruction::StoreVar {
            var: VarRef::Reg(x),
            src: three,
        });
        f.terminate(else_b, Instruction::Jump { target: merge });

        let out = f.new_register(ILType::Byte, None);
        f.block_mut(merge).push(Instruction::LoadVar {
            dest: out,
            var: VarRef::Reg(x),
        });
        f.terminate(merge, Instruction::Return { value: out });

        let options = GenOptions::default().with_verify_ssa(true).with_ssa_stats(true);
        let stats = construct_ssa(&mut f, &options).unwrap();
        assert_eq!(stats.phi_count, 1);
        assert!(stats.elapsed.is_some());

        // The merge's load reads the phi destination
        let phi_dest = match f.block(merge).instructions[0] {
            Instruction::Phi { dest, .. } => dest,
            _ => panic!("phi expected at merge head"),
        };
        match f.block(merge).instructions[1] {
            Instruction::LoadVar { var: VarRef::Reg(v), .. } => assert_eq!(v, phi_dest),
            ref other => panic!("expected load of phi result, got {:?}", other),
        }
    }

    #[test]
    fn test_disabled_phi_insertion() {
        let (mut f, _, header) = counting_loop();
        let mut options = GenOptions::default();
        options.insert_phi_instructions = false;
        let stats = construct_ssa(&mut f, &options).unwrap();
        assert_eq!(stats.phi_count, 0);
        assert!(f.block(header).phis().next().is_none());
    }
}
