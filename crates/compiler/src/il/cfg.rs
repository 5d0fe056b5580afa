//! CFG utilities over IL functions
//!
//! Traversal orders, iterative dominator computation, dominance
//! frontiers, and the structural validator the generator runs after
//! lowering. Dominators use the Cooper-Harvey-Kennedy intersection
//! algorithm over reverse postorder, iterated to a fixed point.

use super::{BasicBlock, BlockId, ILFunction, Instruction};
use std::collections::VecDeque;

impl ILFunction {
    /// Blocks reachable from the entry, in visit (BFS) order.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut seen = vec![false; self.block_slots()];
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(Self::ENTRY);
        seen[Self::ENTRY.0 as usize] = true;
        while let Some(b) = queue.pop_front() {
            order.push(b);
            for &s in &self.block(b).successors {
                if !seen[s.0 as usize] {
                    seen[s.0 as usize] = true;
                    queue.push_back(s);
                }
            }
        }
        order
    }

    /// Live blocks the entry cannot reach, in id order.
    pub fn unreachable_blocks(&self) -> Vec<BlockId> {
        let mut seen = vec![false; self.block_slots()];
        for b in self.reachable_blocks() {
            seen[b.0 as usize] = true;
        }
        self.blocks()
            .filter(|b| !seen[b.id.0 as usize])
            .map(|b| b.id)
            .collect()
    }

    /// Depth-first postorder over reachable blocks.
    pub fn postorder(&self) -> Vec<BlockId> {
        let mut visited = vec![false; self.block_slots()];
        let mut order = Vec::new();
        let mut stack: Vec<(BlockId, usize)> = vec![(Self::ENTRY, 0)];
        visited[Self::ENTRY.0 as usize] = true;
        while let Some((block, cursor)) = stack.pop() {
            let succs = &self.block(block).successors;
            if cursor < succs.len() {
                stack.push((block, cursor + 1));
                let next = succs[cursor];
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    stack.push((next, 0));
                }
            } else {
                order.push(block);
            }
        }
        order
    }

    /// Reverse postorder over reachable blocks; the canonical iteration
    /// order for forward dataflow and printing.
    pub fn reverse_postorder(&self) -> Vec<BlockId> {
        let mut order = self.postorder();
        order.reverse();
        order
    }

    /// Immediate dominators of every reachable block.
    pub fn compute_dominators(&self) -> DominatorTree {
        let rpo = self.reverse_postorder();
        let mut rpo_number = vec![usize::MAX; self.block_slots()];
        for (i, &b) in rpo.iter().enumerate() {
            rpo_number[b.0 as usize] = i;
        }

        let mut idom: Vec<Option<BlockId>> = vec![None; self.block_slots()];
        idom[Self::ENTRY.0 as usize] = Some(Self::ENTRY);

        let intersect = |idom: &[Option<BlockId>], mut a: BlockId, mut b: BlockId| {
            while a != b {
                while rpo_number[a.0 as usize] > rpo_number[b.0 as usize] {
                    a = idom[a.0 as usize].expect("processed block has an idom");
                }
                while rpo_number[b.0 as usize] > rpo_number[a.0 as usize] {
                    b = idom[b.0 as usize].expect("processed block has an idom");
                }
            }
            a
        };

        let mut changed = true;
        while changed {
            changed = false;
            for &b in rpo.iter().skip(1) {
                // First processed predecessor seeds the intersection
                let mut new_idom: Option<BlockId> = None;
                for &p in &self.block(b).predecessors {
                    if rpo_number[p.0 as usize] == usize::MAX {
                        continue; // unreachable predecessor
                    }
                    if idom[p.0 as usize].is_none() {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => p,
                        Some(cur) => intersect(&idom, p, cur),
                    });
                }
                if new_idom.is_some() && idom[b.0 as usize] != new_idom {
                    idom[b.0 as usize] = new_idom;
                    changed = true;
                }
            }
        }

        DominatorTree { idom }
    }

    /// Dominance frontier of every reachable block, indexed by block slot.
    pub fn compute_dominance_frontier(&self, dom: &DominatorTree) -> Vec<Vec<BlockId>> {
        let mut frontier: Vec<Vec<BlockId>> = vec![Vec::new(); self.block_slots()];
        for block in self.blocks() {
            if block.predecessors.len() < 2 {
                continue;
            }
            let Some(target_idom) = dom.idom(block.id) else {
                continue;
            };
            for &p in &block.predecessors {
                let mut runner = p;
                // Walk up from each predecessor until the join's idom;
                // every block passed has the join in its frontier
                while runner != target_idom {
                    let slot = &mut frontier[runner.0 as usize];
                    if !slot.contains(&block.id) {
                        slot.push(block.id);
                    }
                    match dom.idom(runner) {
                        Some(next) if next != runner => runner = next,
                        _ => break,
                    }
                }
            }
        }
        frontier
    }
}

/// Immediate-dominator table. The entry block is its own idom.
#[derive(Debug)]
pub struct DominatorTree {
    idom: Vec<Option<BlockId>>,
}

impl DominatorTree {
    pub fn idom(&self, block: BlockId) -> Option<BlockId> {
        self.idom.get(block.0 as usize).copied().flatten()
    }

    /// Does `a` dominate `b`? Every block dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let mut cursor = b;
        loop {
            if cursor == a {
                return true;
            }
            match self.idom(cursor) {
                Some(next) if next != cursor => cursor = next,
                _ => return false,
            }
        }
    }

    /// Children of a block in the dominator tree, in id order.
    pub fn children(&self, block: BlockId) -> Vec<BlockId> {
        self.idom
            .iter()
            .enumerate()
            .filter_map(|(i, &idom)| {
                let id = BlockId(i as u32);
                (idom == Some(block) && id != block).then_some(id)
            })
            .collect()
    }

    /// Longest root-to-leaf chain in the tree.
    pub fn depth(&self) -> usize {
        let mut max = 0;
        for i in 0..self.idom.len() {
            let mut depth = 0;
            let mut cursor = BlockId(i as u32);
            if self.idom(cursor).is_none() {
                continue;
            }
            while let Some(next) = self.idom(cursor) {
                if next == cursor {
                    break;
                }
                depth += 1;
                cursor = next;
            }
            max = max.max(depth);
        }
        max + 1
    }
}

/// One structural problem found by [`validate_cfg`].
#[derive(Debug, Clone, PartialEq)]
pub enum CfgViolation {
    /// Block has no terminator and is not marked unreachable
    MissingTerminator(BlockId),
    /// A terminator appears before the end of the block
    EarlyTerminator(BlockId),
    /// Successor edge points at a removed or out-of-range block
    DanglingEdge(BlockId, BlockId),
    /// Edge lists disagree with the terminator's targets
    EdgeMismatch(BlockId),
    /// Non-entry block with no predecessors that is not marked unreachable
    UnreachableBlock(BlockId),
    /// Phi instruction after a non-phi
    MisplacedPhi(BlockId),
}

impl std::fmt::Display for CfgViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CfgViolation::MissingTerminator(b) => write!(f, "block {} has no terminator", b),
            CfgViolation::EarlyTerminator(b) => {
                write!(f, "block {} has a terminator before its last instruction", b)
            }
            CfgViolation::DanglingEdge(from, to) => {
                write!(f, "block {} has an edge to missing block {}", from, to)
            }
            CfgViolation::EdgeMismatch(b) => write!(
                f,
                "block {} successor list disagrees with its terminator",
                b
            ),
            CfgViolation::UnreachableBlock(b) => {
                write!(f, "block {} is unreachable but not marked as such", b)
            }
            CfgViolation::MisplacedPhi(b) => {
                write!(f, "block {} has a phi after a non-phi instruction", b)
            }
        }
    }
}

/// Check the structural invariants of a lowered function. A well-formed
/// function returns an empty list.
pub fn validate_cfg(function: &ILFunction) -> Vec<CfgViolation> {
    let mut violations = Vec::new();
    let slots = function.block_slots();

    for block in function.blocks() {
        check_block(function, block, slots, &mut violations);
    }
    violations
}

fn check_block(
    function: &ILFunction,
    block: &BasicBlock,
    slots: usize,
    violations: &mut Vec<CfgViolation>,
) {
    // Exactly one terminator, at the end
    let terminator_count = block
        .instructions
        .iter()
        .filter(|i| i.is_terminator())
        .count();
    match block.terminator() {
        None if !block.unreachable => violations.push(CfgViolation::MissingTerminator(block.id)),
        None => {}
        Some(_) if terminator_count > 1 => violations.push(CfgViolation::EarlyTerminator(block.id)),
        Some(t) => {
            // Successor lists must mirror the terminator's targets
            let targets = t.branch_targets();
            let matches = targets.iter().all(|x| block.successors.contains(x))
                && block.successors.iter().all(|x| targets.contains(x));
            if !matches {
                violations.push(CfgViolation::EdgeMismatch(block.id));
            }
        }
    }

    // Phis only at the head
    let mut seen_non_phi = false;
    for i in &block.instructions {
        match i {
            Instruction::Phi { .. } if seen_non_phi => {
                violations.push(CfgViolation::MisplacedPhi(block.id));
                break;
            }
            Instruction::Phi { .. } => {}
            _ => seen_non_phi = true,
        }
    }

    // Edges must land on live blocks
    for &s in &block.successors {
        if (s.0 as usize) >= slots || function.block(s).removed {
            violations.push(CfgViolation::DanglingEdge(block.id, s));
        }
    }

    // Non-entry blocks need a predecessor unless flagged
    if block.id != ILFunction::ENTRY && block.predecessors.is_empty() && !block.unreachable {
        violations.push(CfgViolation::UnreachableBlock(block.id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{ILType, RegId};

    /// entry -> header -> {body, exit}; body -> header
    fn loop_shape() -> (ILFunction, BlockId, BlockId, BlockId) {
        let mut f = ILFunction::new("loop", vec![], ILType::Void);
        let header = f.add_block("header");
        let body = f.add_block("body");
        let exit = f.add_block("exit");
        let cond = f.new_register(ILType::Bool, None);

        f.terminate(ILFunction::ENTRY, Instruction::Jump { target: header });
        f.block_mut(header).push(Instruction::Const {
            dest: cond,
            value: 1,
        });
        f.terminate(
            header,
            Instruction::Branch {
                cond,
                then_target: body,
                else_target: exit,
            },
        );
        f.terminate(body, Instruction::Jump { target: header });
        f.terminate(exit, Instruction::ReturnVoid);
        (f, header, body, exit)
    }

    #[test]
    fn test_reverse_postorder_starts_at_entry() {
        let (f, ..) = loop_shape();
        let rpo = f.reverse_postorder();
        assert_eq!(rpo[0], ILFunction::ENTRY);
        assert_eq!(rpo.len(), 4);
    }

    #[test]
    fn test_dominators_of_loop() {
        let (f, header, body, exit) = loop_shape();
        let dom = f.compute_dominators();

        assert_eq!(dom.idom(ILFunction::ENTRY), Some(ILFunction::ENTRY));
        assert_eq!(dom.idom(header), Some(ILFunction::ENTRY));
        assert_eq!(dom.idom(body), Some(header));
        assert_eq!(dom.idom(exit), Some(header));

        assert!(dom.dominates(ILFunction::ENTRY, exit));
        assert!(dom.dominates(header, body));
        assert!(!dom.dominates(body, exit));
    }

    #[test]
    fn test_dominator_idempotence() {
        let (f, ..) = loop_shape();
        let d1 = f.compute_dominators();
        let d2 = f.compute_dominators();
        let f1 = f.compute_dominance_frontier(&d1);
        let f2 = f.compute_dominance_frontier(&d2);
        for b in f.blocks() {
            assert_eq!(d1.idom(b.id), d2.idom(b.id));
        }
        assert_eq!(f1, f2);
    }

    #[test]
    fn test_dominance_frontier_of_loop() {
        let (f, header, body, _) = loop_shape();
        let frontier = f.compute_dominance_frontier(&f.compute_dominators());
        // The body's frontier is the header (back-edge join); the header
        // is in its own frontier because it is a loop header
        assert!(frontier[body.0 as usize].contains(&header));
        assert!(frontier[header.0 as usize].contains(&header));
    }

    #[test]
    fn test_diamond_frontier() {
        // entry branches to a and b, both join at merge
        let mut f = ILFunction::new("d", vec![], ILType::Void);
        let a = f.add_block("then");
        let b = f.add_block("else");
        let merge = f.add_block("merge");
        let cond = f.new_register(ILType::Bool, None);
        f.block_mut(ILFunction::ENTRY).push(Instruction::Const {
            dest: cond,
            value: 0,
        });
        f.terminate(
            ILFunction::ENTRY,
            Instruction::Branch {
                cond,
                then_target: a,
                else_target: b,
            },
        );
        f.terminate(a, Instruction::Jump { target: merge });
        f.terminate(b, Instruction::Jump { target: merge });
        f.terminate(merge, Instruction::ReturnVoid);

        let dom = f.compute_dominators();
        assert_eq!(dom.idom(merge), Some(ILFunction::ENTRY));
        let frontier = f.compute_dominance_frontier(&dom);
        assert_eq!(frontier[a.0 as usize], vec![merge]);
        assert_eq!(frontier[b.0 as usize], vec![merge]);
        assert!(frontier[merge.0 as usize].is_empty());
    }

    #[test]
    fn test_validate_well_formed() {
        let (f, ..) = loop_shape();
        assert!(validate_cfg(&f).is_empty());
    }

    #[test]
    fn test_validate_missing_terminator() {
        let mut f = ILFunction::new("bad", vec![], ILType::Void);
        let r = f.new_register(ILType::Byte, None);
        f.block_mut(ILFunction::ENTRY)
            .push(Instruction::Const { dest: r, value: 1 });
        let violations = validate_cfg(&f);
        assert_eq!(
            violations,
            vec![CfgViolation::MissingTerminator(ILFunction::ENTRY)]
        );
    }

    #[test]
    fn test_validate_unmarked_orphan_block() {
        let mut f = ILFunction::new("orphan", vec![], ILType::Void);
        let stray = f.add_block("stray");
        f.terminate(ILFunction::ENTRY, Instruction::ReturnVoid);
        f.terminate(stray, Instruction::ReturnVoid);
        let violations = validate_cfg(&f);
        assert_eq!(violations, vec![CfgViolation::UnreachableBlock(stray)]);

        // Marking it silences the violation
        let mut f2 = ILFunction::new("orphan", vec![], ILType::Void);
        let stray2 = f2.add_block("stray");
        f2.terminate(ILFunction::ENTRY, Instruction::ReturnVoid);
        f2.terminate(stray2, Instruction::ReturnVoid);
        f2.block_mut(stray2).unreachable = true;
        assert!(validate_cfg(&f2).is_empty());
    }

    #[test]
    fn test_unreachable_blocks_listed() {
        let mut f = ILFunction::new("u", vec![], ILType::Void);
        let stray = f.add_block("stray");
        f.terminate(ILFunction::ENTRY, Instruction::ReturnVoid);
        f.terminate(stray, Instruction::ReturnVoid);
        assert_eq!(f.unreachable_blocks(), vec![stray]);
        assert_eq!(f.reachable_blocks(), vec![ILFunction::ENTRY]);
    }
}
