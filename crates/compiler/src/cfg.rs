//! Control-flow graphs over the AST
//!
//! Fifth pass: builds one CFG per function body, then computes
//! reachability from the entry node. The graph stays in AST space - nodes
//! reference statements by `NodeId` - and is consumed by the dataflow
//! analyses and mirrored later by the IL generator in IL space.
//!
//! Edges are index-based (`CfgNodeId` into the owning graph's node arena),
//! so the graph has no ownership cycles.

use crate::ast::{Declaration, NodeId, Program, Span, Stmt};
use crate::diagnostics::{Code, Diagnostics};
use indexmap::IndexMap;
use std::collections::VecDeque;

/// Index of a node within one function's CFG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CfgNodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfgNodeKind {
    Entry,
    Exit,
    Statement,
    Branch,
    Loop,
    Return,
    Break,
    Continue,
    Merge,
}

#[derive(Debug)]
pub struct CfgNode {
    pub id: CfgNodeId,
    pub kind: CfgNodeKind,
    pub predecessors: Vec<CfgNodeId>,
    pub successors: Vec<CfgNodeId>,
    /// Statement this node was built from, when there is one
    pub ast: Option<NodeId>,
    pub span: Option<Span>,
    pub reachable: bool,
}

/// One function's control-flow graph.
#[derive(Debug)]
pub struct Cfg {
    pub function: NodeId,
    pub name: String,
    pub entry: CfgNodeId,
    pub exit: CfgNodeId,
    nodes: Vec<CfgNode>,
}

impl Cfg {
    pub fn node(&self, id: CfgNodeId) -> &CfgNode {
        &self.nodes[id.0 as usize]
    }

    /// Nodes in id (creation) order.
    pub fn nodes(&self) -> impl Iterator<Item = &CfgNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether any path from entry reaches the exit node.
    pub fn exit_reachable(&self) -> bool {
        self.node(self.exit).reachable
    }

    /// Nodes in reverse postorder from the entry. Unreachable nodes are
    /// appended afterwards in id order so every node appears exactly once.
    pub fn reverse_postorder(&self) -> Vec<CfgNodeId> {
        let mut visited = vec![false; self.nodes.len()];
        let mut postorder = Vec::with_capacity(self.nodes.len());
        // Iterative DFS with an explicit successor cursor per frame
        let mut stack: Vec<(CfgNodeId, usize)> = vec![(self.entry, 0)];
        visited[self.entry.0 as usize] = true;
        while let Some((node, cursor)) = stack.pop() {
            let succs = &self.nodes[node.0 as usize].successors;
            if cursor < succs.len() {
                stack.push((node, cursor + 1));
                let next = succs[cursor];
                if !visited[next.0 as usize] {
                    visited[next.0 as usize] = true;
                    stack.push((next, 0));
                }
            } else {
                postorder.push(node);
            }
        }
        postorder.reverse();
        for (i, seen) in visited.iter().enumerate() {
            if !seen {
                postorder.push(CfgNodeId(i as u32));
            }
        }
        postorder
    }
}

/// Build CFGs for every function in the program and report unreachable
/// code.
pub fn build_cfgs(program: &Program, diagnostics: &mut Diagnostics) -> IndexMap<String, Cfg> {
    let mut cfgs = IndexMap::new();
    for decl in &program.declarations {
        if let Declaration::Function(f) = decl {
            if let Some(body) = &f.body {
                let cfg = Builder::build(f.id, &f.name, body, diagnostics);
                cfgs.insert(f.name.clone(), cfg);
            }
        }
    }
    cfgs
}

struct LoopContext {
    continue_target: CfgNodeId,
    break_target: CfgNodeId,
}

struct Builder<'a> {
    nodes: Vec<CfgNode>,
    loops: Vec<LoopContext>,
    diagnostics: &'a mut Diagnostics,
    /// Nodes already covered by an "after terminator" warning, so the
    /// reachability sweep does not warn about them twice
    warned: std::collections::HashSet<CfgNodeId>,
}

impl<'a> Builder<'a> {
    fn build(function: NodeId, name: &str, body: &[Stmt], diagnostics: &'a mut Diagnostics) -> Cfg {
        let mut b = Builder {
            nodes: Vec::new(),
            loops: Vec::new(),
            diagnostics,
            warned: std::collections::HashSet::new(),
        };
        let entry = b.add(CfgNodeKind::Entry, None, None);
        let exit = b.add(CfgNodeKind::Exit, None, None);

        let tails = b.lower_block(body, vec![entry]);
        for t in tails {
            b.link(t, exit);
        }

        let mut cfg = Cfg {
            function,
            name: name.to_string(),
            entry,
            exit,
            nodes: b.nodes,
        };
        let warned = b.warned;
        compute_reachability(&mut cfg);
        report_unreachable(&cfg, &warned, b.diagnostics);
        cfg
    }

    fn add(&mut self, kind: CfgNodeKind, ast: Option<NodeId>, span: Option<Span>) -> CfgNodeId {
        let id = CfgNodeId(self.nodes.len() as u32);
        self.nodes.push(CfgNode {
            id,
            kind,
            predecessors: Vec::new(),
            successors: Vec::new(),
            ast,
            span,
            reachable: false,
        });
        id
    }

    fn link(&mut self, from: CfgNodeId, to: CfgNodeId) {
        self.nodes[from.0 as usize].successors.push(to);
        self.nodes[to.0 as usize].predecessors.push(from);
    }

    /// Lower a statement list. `current` is the set of dangling nodes
    /// whose control continues into the next statement; the return value
    /// is the same for whatever follows the list.
    fn lower_block(&mut self, body: &[Stmt], mut current: Vec<CfgNodeId>) -> Vec<CfgNodeId> {
        for stmt in body {
            current = self.lower_stmt(stmt, current);
        }
        current
    }

    fn lower_stmt(&mut self, stmt: &Stmt, current: Vec<CfgNodeId>) -> Vec<CfgNodeId> {
        match stmt {
            Stmt::Variable(_) | Stmt::Expr(_) => {
                let node = self.straight_line(CfgNodeKind::Statement, stmt, current);
                vec![node]
            }
            Stmt::If(s) => {
                let branch = self.straight_line(CfgNodeKind::Branch, stmt, current);
                let merge = self.add(CfgNodeKind::Merge, None, None);

                let then_tails = self.lower_block(&s.then_body, vec![branch]);
                for t in then_tails {
                    self.link(t, merge);
                }
                match &s.else_body {
                    Some(else_body) => {
                        let else_tails = self.lower_block(else_body, vec![branch]);
                        for t in else_tails {
                            self.link(t, merge);
                        }
                    }
                    None => self.link(branch, merge),
                }
                vec![merge]
            }
            Stmt::While(s) => {
                let header = self.straight_line(CfgNodeKind::Loop, stmt, current);
                let after = self.add(CfgNodeKind::Merge, None, None);

                self.loops.push(LoopContext {
                    continue_target: header,
                    break_target: after,
                });
                let body_tails = self.lower_block(&s.body, vec![header]);
                self.loops.pop();

                // Back-edge from the body to the loop header
                for t in body_tails {
                    self.link(t, header);
                }
                // Condition-false edge out of the loop
                self.link(header, after);
                vec![after]
            }
            Stmt::For(s) => {
                let header = self.straight_line(CfgNodeKind::Loop, stmt, current);
                let incr = self.add(CfgNodeKind::Statement, Some(s.id), Some(s.span));
                let after = self.add(CfgNodeKind::Merge, None, None);

                self.loops.push(LoopContext {
                    continue_target: incr,
                    break_target: after,
                });
                let body_tails = self.lower_block(&s.body, vec![header]);
                self.loops.pop();

                for t in body_tails {
                    self.link(t, incr);
                }
                self.link(incr, header);
                self.link(header, after);
                vec![after]
            }
            Stmt::Match(s) => {
                let branch = self.straight_line(CfgNodeKind::Branch, stmt, current);
                let merge = self.add(CfgNodeKind::Merge, None, None);

                for arm in &s.arms {
                    let tails = self.lower_block(&arm.body, vec![branch]);
                    for t in tails {
                        self.link(t, merge);
                    }
                }
                match &s.default {
                    Some(default) => {
                        let tails = self.lower_block(default, vec![branch]);
                        for t in tails {
                            self.link(t, merge);
                        }
                    }
                    None => self.link(branch, merge),
                }
                vec![merge]
            }
            Stmt::Return(_) => {
                let node = self.straight_line(CfgNodeKind::Return, stmt, current);
                // Exit is node 1 by construction
                self.link(node, CfgNodeId(1));
                vec![]
            }
            Stmt::Break(_) => {
                let node = self.straight_line(CfgNodeKind::Break, stmt, current);
                let target = self
                    .loops
                    .last()
                    .map(|ctx| ctx.break_target)
                    .unwrap_or(CfgNodeId(1));
                self.link(node, target);
                vec![]
            }
            Stmt::Continue(_) => {
                let node = self.straight_line(CfgNodeKind::Continue, stmt, current);
                let target = self
                    .loops
                    .last()
                    .map(|ctx| ctx.continue_target)
                    .unwrap_or(CfgNodeId(1));
                self.link(node, target);
                vec![]
            }
        }
    }

    /// Create a node for a statement and wire the dangling edges into it.
    /// An empty `current` means the statement follows a terminator on the
    /// same straight line, which gets a warning right here.
    fn straight_line(
        &mut self,
        kind: CfgNodeKind,
        stmt: &Stmt,
        current: Vec<CfgNodeId>,
    ) -> CfgNodeId {
        let node = self.add(kind, Some(stmt.id()), Some(stmt.span()));
        if current.is_empty() {
            self.diagnostics.warning(
                Code::UnreachableCode,
                "Unreachable code after terminator",
                stmt.span(),
            );
            self.warned.insert(node);
        }
        for c in current {
            self.link(c, node);
        }
        node
    }
}

/// Breadth-first sweep from entry marking reachable nodes.
fn compute_reachability(cfg: &mut Cfg) {
    let mut queue = VecDeque::new();
    queue.push_back(cfg.entry);
    cfg.nodes[cfg.entry.0 as usize].reachable = true;

    while let Some(id) = queue.pop_front() {
        let succs = cfg.nodes[id.0 as usize].successors.clone();
        for s in succs {
            let node = &mut cfg.nodes[s.0 as usize];
            if !node.reachable {
                node.reachable = true;
                queue.push_back(s);
            }
        }
    }
}

/// Warn once per unreachable straight-line region.
fn report_unreachable(
    cfg: &Cfg,
    already_warned: &std::collections::HashSet<CfgNodeId>,
    diagnostics: &mut Diagnostics,
) {
    let mut suppressed: std::collections::HashSet<CfgNodeId> = already_warned.clone();
    for node in cfg.nodes() {
        if node.reachable || node.ast.is_none() {
            continue;
        }
        if matches!(node.kind, CfgNodeKind::Merge | CfgNodeKind::Exit) {
            continue;
        }
        // Skip nodes whose predecessor already carried the warning for
        // this region
        let covered = node
            .predecessors
            .iter()
            .any(|p| suppressed.contains(p) || (!cfg.node(*p).reachable && cfg.node(*p).ast.is_none() && cfg.node(*p).predecessors.iter().any(|q| suppressed.contains(q))));
        suppressed.insert(node.id);
        if covered || already_warned.contains(&node.id) {
            continue;
        }
        if let Some(span) = node.span {
            diagnostics.warning(Code::UnreachableCode, "unreachable code", span);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::build;

    fn cfg_for(program: &Program, name: &str) -> (IndexMap<String, Cfg>, Diagnostics) {
        let mut diags = Diagnostics::new();
        let cfgs = build_cfgs(program, &mut diags);
        assert!(cfgs.contains_key(name), "no cfg for {}", name);
        (cfgs, diags)
    }

    #[test]
    fn test_empty_body_is_entry_to_exit() {
        let program = build::program("m", vec![build::function("f", vec![], None, vec![])]);
        let (cfgs, diags) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];
        assert!(diags.is_empty());
        assert_eq!(cfg.len(), 2);
        assert_eq!(cfg.node(cfg.entry).successors, vec![cfg.exit]);
        assert!(cfg.exit_reachable());
    }

    #[test]
    fn test_straight_line_chain() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("a", "byte")],
                None,
                vec![
                    build::expr_stmt(build::assign(build::ident("a"), build::int(1))),
                    build::ret(None),
                ],
            )],
        );
        let (cfgs, diags) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];
        assert!(diags.is_empty());
        // entry -> stmt -> return -> exit
        let entry_succ = cfg.node(cfg.entry).successors[0];
        assert_eq!(cfg.node(entry_succ).kind, CfgNodeKind::Statement);
        let ret = cfg.node(entry_succ).successors[0];
        assert_eq!(cfg.node(ret).kind, CfgNodeKind::Return);
        assert_eq!(cfg.node(ret).successors, vec![cfg.exit]);
    }

    #[test]
    fn test_if_else_shape() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("c", "boolean"), ("x", "byte")],
                None,
                vec![build::if_stmt(
                    build::ident("c"),
                    vec![build::expr_stmt(build::assign(build::ident("x"), build::int(1)))],
                    Some(vec![build::expr_stmt(build::assign(
                        build::ident("x"),
                        build::int(2),
                    ))]),
                )],
            )],
        );
        let (cfgs, diags) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];
        assert!(diags.is_empty());

        let branch = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Branch)
            .expect("branch node");
        assert_eq!(branch.successors.len(), 2);
        let merge = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Merge)
            .expect("merge node");
        assert_eq!(merge.predecessors.len(), 2);
        assert!(cfg.exit_reachable());
    }

    #[test]
    fn test_while_loop_shape() {
        let program = build::program(
            "m",
            vec![build::function(
                "loop",
                vec![("i", "byte")],
                None,
                vec![build::while_stmt(
                    build::binary(crate::ast::BinaryOp::Lt, build::ident("i"), build::int(10)),
                    vec![build::expr_stmt(build::compound_assign(
                        crate::ast::BinaryOp::Add,
                        build::ident("i"),
                        build::int(1),
                    ))],
                )],
            )],
        );
        let (cfgs, diags) = cfg_for(&program, "loop");
        let cfg = &cfgs["loop"];
        assert!(diags.is_empty());

        let header = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Loop)
            .expect("loop header");
        // Header branches into the body and out of the loop
        assert_eq!(header.successors.len(), 2);
        // Body statement jumps back to the header
        let body = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Statement)
            .expect("body statement");
        assert!(body.successors.contains(&header.id));
        assert!(cfg.exit_reachable());
    }

    #[test]
    fn test_break_targets_loop_exit() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("c", "boolean")],
                None,
                vec![build::while_stmt(
                    build::ident("c"),
                    vec![build::brk()],
                )],
            )],
        );
        let (cfgs, _) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];
        let brk = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Break)
            .expect("break node");
        let after = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Merge)
            .expect("loop exit merge");
        assert_eq!(brk.successors, vec![after.id]);
    }

    #[test]
    fn test_continue_targets_for_increment() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                None,
                vec![build::for_stmt(
                    "i",
                    build::int(0),
                    build::int(10),
                    vec![build::cont()],
                )],
            )],
        );
        let (cfgs, _) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];
        let cont = cfg
            .nodes()
            .find(|n| n.kind == CfgNodeKind::Continue)
            .expect("continue node");
        let header = cfg.nodes().find(|n| n.kind == CfgNodeKind::Loop).unwrap();
        // The continue target feeds the header (it is the increment node)
        let target = cont.successors[0];
        assert_ne!(target, header.id);
        assert!(cfg.node(target).successors.contains(&header.id));
    }

    #[test]
    fn test_code_after_return_warns() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("x", "byte")],
                Some("byte"),
                vec![
                    build::ret(Some(build::int(1))),
                    build::expr_stmt(build::assign(build::ident("x"), build::int(3))),
                ],
            )],
        );
        let (_, diags) = cfg_for(&program, "f");
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.items()[0].code, Code::UnreachableCode);
        assert!(diags.items()[0].message.contains("after terminator"));
    }

    #[test]
    fn test_both_branches_return_makes_tail_unreachable() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("c", "boolean")],
                Some("byte"),
                vec![
                    build::if_stmt(
                        build::ident("c"),
                        vec![build::ret(Some(build::int(1)))],
                        Some(vec![build::ret(Some(build::int(2)))]),
                    ),
                    build::let_stmt("y", Some("byte"), Some(build::int(3))),
                    build::ret(Some(build::ident("y"))),
                ],
            )],
        );
        let (cfgs, diags) = cfg_for(&program, "f");
        let cfg = &cfgs["f"];

        // One warning for the unreachable tail region
        assert_eq!(diags.warning_count(), 1);
        assert_eq!(diags.items()[0].code, Code::UnreachableCode);

        // Exit is still reachable through the two returns
        assert!(cfg.exit_reachable());
        // The trailing statement nodes are marked unreachable
        let unreachable: Vec<_> = cfg
            .nodes()
            .filter(|n| !n.reachable && n.ast.is_some())
            .collect();
        assert!(unreachable.len() >= 2);
    }

    #[test]
    fn test_reachability_is_deterministic() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("c", "boolean")],
                None,
                vec![build::if_stmt(build::ident("c"), vec![], None)],
            )],
        );
        let mut d1 = Diagnostics::new();
        let mut d2 = Diagnostics::new();
        let c1 = build_cfgs(&program, &mut d1);
        let c2 = build_cfgs(&program, &mut d2);
        let r1: Vec<bool> = c1["f"].nodes().map(|n| n.reachable).collect();
        let r2: Vec<bool> = c2["f"].nodes().map(|n| n.reachable).collect();
        assert_eq!(r1, r2);
    }
}
