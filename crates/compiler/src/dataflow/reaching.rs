//! Reaching definitions
//!
//! Forward may-analysis over the AST-level CFG. For every use of a
//! variable, computes the set of definitions that can reach it without
//! being killed, then materializes def-use and use-def chains. Parameters
//! count as definitions at the entry node.
//!
//! GEN of a node is its own definition; KILL is every other definition of
//! the same variable in the function. The worklist runs in reverse
//! postorder and converges because the def sets only grow.

use super::{fixpoint_budget, node_use_defs, FnContext};
use crate::ast::{meta, MetaValue, MetadataStore, NodeId};
use crate::cfg::CfgNodeId;
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::SymbolId;
use std::collections::{BTreeSet, HashMap};

/// One definition site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Def {
    pub symbol: SymbolId,
    /// CFG node holding the definition
    pub node: CfgNodeId,
    /// AST node of the definition site (parameter or statement)
    pub ast: Option<NodeId>,
}

/// Reaching-definition sets and chains for one function.
#[derive(Debug)]
pub struct ReachingDefinitions {
    pub defs: Vec<Def>,
    /// Definition indices reaching each CFG node's start, indexed by node id
    pub reach_in: Vec<BTreeSet<usize>>,
    /// Definition indices live at each CFG node's end
    pub reach_out: Vec<BTreeSet<usize>>,
    /// Identifier-use site -> definitions that reach it
    pub use_def: HashMap<NodeId, Vec<usize>>,
    /// Definition -> identifier-use sites it reaches
    pub def_use: HashMap<usize, Vec<NodeId>>,
}

impl ReachingDefinitions {
    /// Definitions reaching a given identifier use.
    pub fn defs_for_use(&self, use_site: NodeId) -> &[usize] {
        self.use_def.get(&use_site).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Use sites a given definition reaches.
    pub fn uses_of_def(&self, def: usize) -> &[NodeId] {
        self.def_use.get(&def).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Run the analysis for one function and attach `REACHING_DEFS` metadata
/// to every identifier use.
pub fn analyze_reaching(
    ctx: &FnContext<'_>,
    metadata: &mut MetadataStore,
    diagnostics: &mut Diagnostics,
) -> ReachingDefinitions {
    let n = ctx.cfg.len();

    // Collect definitions: parameters at entry, then per-node writes
    let mut defs: Vec<Def> = Vec::new();
    let mut defs_of_symbol: HashMap<SymbolId, Vec<usize>> = HashMap::new();
    for sym in ctx.param_symbols(metadata) {
        let idx = defs.len();
        defs.push(Def {
            symbol: sym,
            node: ctx.cfg.entry,
            ast: Some(ctx.table.symbol(sym).decl_node),
        });
        defs_of_symbol.entry(sym).or_default().push(idx);
    }

    let mut node_info: Vec<super::UseDef> = Vec::with_capacity(n);
    for node in ctx.cfg.nodes() {
        let ud = node_use_defs(node, ctx, metadata);
        for &sym in &ud.defs {
            let idx = defs.len();
            defs.push(Def {
                symbol: sym,
                node: node.id,
                ast: node.ast,
            });
            defs_of_symbol.entry(sym).or_default().push(idx);
        }
        node_info.push(ud);
    }

    // GEN and KILL per node
    let mut gen_sets: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut kill: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (idx, def) in defs.iter().enumerate() {
        let node = def.node.0 as usize;
        // A later definition of the same symbol in the same node shadows
        // an earlier one; keep only the last in GEN
        let shadowed = gen_sets[node]
            .iter()
            .copied()
            .find(|&d| defs[d].symbol == def.symbol);
        if let Some(prev) = shadowed {
            gen_sets[node].remove(&prev);
        }
        gen_sets[node].insert(idx);
    }
    for (node, g) in gen_sets.iter().enumerate() {
        for &d in g {
            for &other in &defs_of_symbol[&defs[d].symbol] {
                if other != d {
                    kill[node].insert(other);
                }
            }
        }
    }

    // Forward worklist to a fixed point
    let mut reach_in: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let mut reach_out: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    let order = ctx.cfg.reverse_postorder();
    let budget = fixpoint_budget(n);
    let mut steps = 0usize;
    let mut changed = true;
    while changed {
        changed = false;
        for &id in &order {
            steps += 1;
            if steps > budget {
                diagnostics.error(
                    Code::InternalError,
                    format!(
                        "reaching definitions did not converge in '{}' ({} nodes)",
                        ctx.decl.name, n
                    ),
                    ctx.decl.span,
                );
                changed = false;
                break;
            }
            let i = id.0 as usize;
            let mut incoming = BTreeSet::new();
            for p in &ctx.cfg.node(id).predecessors {
                incoming.extend(reach_out[p.0 as usize].iter().copied());
            }
            let mut out: BTreeSet<usize> = gen_sets[i].clone();
            out.extend(incoming.difference(&kill[i]).copied());
            if incoming != reach_in[i] {
                reach_in[i] = incoming;
            }
            if out != reach_out[i] {
                reach_out[i] = out;
                changed = true;
            }
        }
    }

    // Build the chains from the per-node use lists
    let mut use_def: HashMap<NodeId, Vec<usize>> = HashMap::new();
    let mut def_use: HashMap<usize, Vec<NodeId>> = HashMap::new();
    for node in ctx.cfg.nodes() {
        let ud = &node_info[node.id.0 as usize];
        for &(sym, site) in &ud.uses {
            let reaching: Vec<usize> = reach_in[node.id.0 as usize]
                .iter()
                .copied()
                .filter(|&d| defs[d].symbol == sym)
                .collect();
            let def_sites: Vec<NodeId> =
                reaching.iter().filter_map(|&d| defs[d].ast).collect();
            metadata.set(site, meta::REACHING_DEFS, MetaValue::Nodes(def_sites));
            for &d in &reaching {
                def_use.entry(d).or_default().push(site);
            }
            use_def.insert(site, reaching);
        }
    }

    ReachingDefinitions {
        defs,
        reach_in,
        reach_out,
        use_def,
        def_use,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{build, Declaration, Program};
    use crate::cfg::build_cfgs;
    use crate::symbols::build_symbol_table;
    use crate::type_resolver::resolve_types;
    use crate::typechecker::{check_program, CheckOptions};
    use crate::types::TypeSystem;

    fn run(program: &Program, name: &str) -> (ReachingDefinitions, MetadataStore) {
        let mut metadata = MetadataStore::new();
        let mut diags = Diagnostics::new();
        let ts = TypeSystem::new();
        let mut table = build_symbol_table(program, &mut metadata, &mut diags);
        resolve_types(program, &mut table, &ts, &metadata, &mut diags);
        check_program(
            program,
            &mut table,
            &ts,
            &mut metadata,
            &mut diags,
            &CheckOptions::default(),
        );
        let cfgs = build_cfgs(program, &mut diags);
        let decl = program
            .declarations
            .iter()
            .find_map(|d| match d {
                Declaration::Function(f) if f.name == name => Some(f),
                _ => None,
            })
            .unwrap();
        let ctx = FnContext::new(decl, &cfgs[name], &table);
        let result = analyze_reaching(&ctx, &mut metadata, &mut diags);
        assert!(!diags.has_errors(), "{:?}", diags.items());
        (result, metadata)
    }

    #[test]
    fn test_parameters_define_at_entry() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("a", "byte")],
                Some("byte"),
                vec![build::ret(Some(build::ident("a")))],
            )],
        );
        let (result, _) = run(&program, "f");
        assert_eq!(result.defs.len(), 1);
        // The single use of `a` is reached by exactly the parameter def
        let chains: Vec<_> = result.use_def.values().collect();
        assert_eq!(chains.len(), 1);
        assert_eq!(chains[0], &vec![0]);
    }

    #[test]
    fn test_second_assignment_kills_first() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![],
                Some("byte"),
                vec![
                    build::let_stmt("x", Some("byte"), Some(build::int(1))),
                    build::expr_stmt(build::assign(build::ident("x"), build::int(2))),
                    build::ret(Some(build::ident("x"))),
                ],
            )],
        );
        let (result, _) = run(&program, "f");
        assert_eq!(result.defs.len(), 2);
        // The return use sees only the second definition
        let reaching = result.use_def.values().next().unwrap();
        assert_eq!(reaching.len(), 1);
        assert_eq!(result.defs[reaching[0]].ast.is_some(), true);
        // And that definition's chain points back at the use
        assert_eq!(result.uses_of_def(reaching[0]).len(), 1);
    }

    #[test]
    fn test_loop_merges_two_definitions() {
        // let i = 0; while (i < 10) { i = i + 1; }
        let program = build::program(
            "m",
            vec![build::function(
                "loop",
                vec![],
                None,
                vec![
                    build::let_stmt("i", Some("byte"), Some(build::int(0))),
                    build::while_stmt(
                        build::binary(crate::ast::BinaryOp::Lt, build::ident("i"), build::int(10)),
                        vec![build::expr_stmt(build::assign(
                            build::ident("i"),
                            build::binary(
                                crate::ast::BinaryOp::Add,
                                build::ident("i"),
                                build::int(1),
                            ),
                        ))],
                    ),
                ],
            )],
        );
        let (result, _) = run(&program, "loop");
        assert_eq!(result.defs.len(), 2);

        // The condition's use of `i` sees both the initial definition and
        // the one flowing around the back-edge
        let two_def_uses: Vec<_> = result
            .use_def
            .values()
            .filter(|defs| defs.len() == 2)
            .collect();
        assert!(!two_def_uses.is_empty());
    }

    #[test]
    fn test_branch_merges_definitions() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("c", "boolean")],
                Some("byte"),
                vec![
                    build::let_stmt("x", Some("byte"), Some(build::int(0))),
                    build::if_stmt(
                        build::ident("c"),
                        vec![build::expr_stmt(build::assign(build::ident("x"), build::int(1)))],
                        None,
                    ),
                    build::ret(Some(build::ident("x"))),
                ],
            )],
        );
        let (result, _) = run(&program, "f");
        // x: initial def + then-branch def
        let x_defs: Vec<_> = result
            .defs
            .iter()
            .enumerate()
            .filter(|(_, d)| {
                // parameter c is def 0
                result.defs[0].symbol != d.symbol
            })
            .collect();
        assert_eq!(x_defs.len(), 2);

        // The final use of x can see both
        let merged = result.use_def.values().find(|defs| defs.len() == 2);
        assert!(merged.is_some());
    }

    #[test]
    fn test_metadata_attached_to_uses() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("a", "byte")],
                Some("byte"),
                vec![build::ret(Some(build::ident("a")))],
            )],
        );
        let (_, metadata) = run(&program, "f");
        // Find the return expression's identifier and check its bag
        if let Declaration::Function(f) = &program.declarations[0] {
            if let crate::ast::Stmt::Return(r) = &f.body.as_ref().unwrap()[0] {
                let use_site = r.value.as_ref().unwrap().id;
                let bag = metadata.get(use_site, meta::REACHING_DEFS);
                match bag {
                    Some(MetaValue::Nodes(sites)) => assert_eq!(sites.len(), 1),
                    other => panic!("expected reaching-defs nodes, got {:?}", other),
                }
            }
        }
    }

    #[test]
    fn test_idempotent_sets() {
        let program = build::program(
            "m",
            vec![build::function(
                "f",
                vec![("a", "byte")],
                Some("byte"),
                vec![build::ret(Some(build::ident("a")))],
            )],
        );
        let (r1, _) = run(&program, "f");
        let (r2, _) = run(&program, "f");
        assert_eq!(r1.reach_in, r2.reach_in);
        assert_eq!(r1.reach_out, r2.reach_out);
    }
}
