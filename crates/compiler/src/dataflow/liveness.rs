//! Liveness analysis
//!
//! Standard backward dataflow over the AST-level CFG: a variable is live
//! at a point if some path from that point reads it before any write. The
//! results feed register allocation hints and the zero-page placement
//! scoring downstream.

use super::{fixpoint_budget, node_use_defs, FnContext};
use crate::ast::MetadataStore;
use crate::diagnostics::{Code, Diagnostics};
use crate::symtab::SymbolId;
use std::collections::BTreeSet;

/// Live-variable sets for one function, indexed by CFG node id.
#[derive(Debug)]
pub struct Liveness {
    pub live_in: Vec<BTreeSet<SymbolId>>,
    pub live_out: Vec<BTreeSet<SymbolId>>,
}

impl Liveness {
    /// Whether `symbol` is live on entry to `node`.
    pub fn live_at(&self, node: crate::cfg::CfgNodeId, symbol: SymbolId) -> bool {
        self.live_in
            .get(node.0 as usize)
            .map(|s| s.contains(&symbol))
            .unwrap_or(false)
    }
}

/// Run liveness for one function.
pub fn analyze_liveness(
    ctx: &FnContext<'_>,
    metadata: &MetadataStore,
    diagnostics: &mut Diagnostics,
) -> Liveness {
    let n = ctx.cfg.len();

    let mut uses: Vec<BTreeSet<SymbolId>> = Vec::with_capacity(n);
    let mut defs: Vec<BTreeSet<SymbolId>> = Vec::with_capacity(n);
    for node in ctx.cfg.nodes() {
        let ud = node_use_defs(node, ctx, metadata);
        uses.push(ud.uses.iter().map(|(s, _)| *s).collect());
        defs.push(ud.defs.iter().copied().collect());
    }

    let mut live_in: Vec<BTreeSet<SymbolId>> = vec![BTreeSet::new(); n];
    let mut live_out: Vec<BTreeSet<SymbolId>> = vec![BTreeSet::new(); n];

    // Backward: iterate in postorder (reverse RPO visits successors first)
    let mut order = ctx.cfg.reverse_postorder();
    order.reverse();

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
                        "liveness did not converge in '{}' ({} nodes)",
                        ctx.decl.name, n
                    ),
                    ctx.decl.span,
                );
                return Liveness { live_in, live_out };
            }
            let i = id.0 as usize;
            let mut out = BTreeSet::new();
            for s in &ctx.cfg.node(id).successors {
                out.extend(live_in[s.0 as usize].iter().copied());
            }
            let mut inn: BTreeSet<SymbolId> = uses[i].clone();
            inn.extend(out.difference(&defs[i]).copied());
            if out != live_out[i] {
                live_out[i] = out;
            }
            if inn != live_in[i] {
                live_in[i] = inn;
                changed = true;
            }
        }
    }

    Liveness { live_in, live_out }
}
