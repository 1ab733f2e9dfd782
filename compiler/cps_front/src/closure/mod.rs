//! Closure conversion.
//!
//! After block translation, a block body refers to slot variables bound by
//! whichever block ran before it. This pass turns every block into a closed
//! function: its free variables become leading parameters, and every call
//! to it passes them explicitly.
//!
//! # Algorithm
//!
//! 1. **Discovery.** Walk the root and each reachable block breadth-first
//!    with a persistent [`ScopeChain`]. References not bound on the chain
//!    are free in the block being walked; each call to a block is recorded
//!    as a call site with the scope active at the call.
//! 2. **Propagation.** Worklist of `(variable, call site)` pairs. A variable
//!    free in a callee that is not bound at the call site becomes free in
//!    the caller, and is queued against the caller's own call sites. A
//!    variable becomes free in a block at most once, so this terminates on
//!    cyclic block graphs.
//! 3. **Rewrite.** Free variables, sorted by id, are prepended to each
//!    block's parameters and to the arguments of every call to it. Calls
//!    from the root pass `Undefined` for variables nothing binds.
//! 4. **Pruning.** A parameter that receives `Undefined` at any call site is
//!    replaced by `Undefined` throughout the block body and removed from the
//!    block and all its call sites. Calls inside the body that now pass
//!    `Undefined` are queued in turn.
//! 5. **Renaming.** Every binding of a variable that is already bound
//!    elsewhere gets a fresh copy, so each variable has exactly one binder.
//!
//! Running the pass on its own output changes nothing.

use std::collections::VecDeque;

use cps_ir::scope::{ScopeChain, ScopeId};
use cps_ir::{BlockId, CallId, ClosureId, TermArena, Value, VarId};
use rustc_hash::{FxHashMap, FxHashSet};

/// Counters reported by [`convert`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConversionStats {
    /// Blocks reachable from the root.
    pub blocks: usize,
    /// Calls to blocks.
    pub call_sites: usize,
    /// Parameters added to blocks.
    pub free_variables: usize,
    /// `(variable, block)` pairs processed by the propagation worklist.
    pub worklist_steps: usize,
    /// Parameters removed because some caller passed `Undefined`.
    pub pruned_parameters: usize,
    /// Bindings given a fresh variable.
    pub renamed_bindings: usize,
}

/// Index of the root closure or a block. The root is node 0.
type Node = usize;

const ROOT: Node = 0;

#[derive(Clone, Copy, Debug)]
struct CallSite {
    caller: Node,
    callee: Node,
    call: CallId,
    scope: ScopeId,
}

/// Blocks, their free variables, and the calls between them.
struct CallGraph {
    root: ClosureId,
    blocks: Vec<BlockId>,
    node_of: FxHashMap<BlockId, Node>,
    chain: ScopeChain,
    free: Vec<FxHashSet<VarId>>,
    sites: Vec<CallSite>,
    sites_to: Vec<Vec<usize>>,
    sites_from: Vec<Vec<usize>>,
}

impl CallGraph {
    fn new(root: ClosureId) -> Self {
        CallGraph {
            root,
            blocks: Vec::new(),
            node_of: FxHashMap::default(),
            chain: ScopeChain::new(),
            free: vec![FxHashSet::default()],
            sites: Vec::new(),
            sites_to: vec![Vec::new()],
            sites_from: vec![Vec::new()],
        }
    }

    fn len(&self) -> usize {
        self.free.len()
    }

    fn node(&mut self, block: BlockId) -> Node {
        if let Some(&node) = self.node_of.get(&block) {
            return node;
        }
        let node = self.len();
        self.blocks.push(block);
        self.node_of.insert(block, node);
        self.free.push(FxHashSet::default());
        self.sites_to.push(Vec::new());
        self.sites_from.push(Vec::new());
        node
    }

    fn entry(&self, arena: &TermArena, node: Node) -> ClosureId {
        if node == ROOT {
            self.root
        } else {
            arena.block(self.blocks[node - 1]).closure
        }
    }

    fn add_site(&mut self, site: CallSite) {
        let index = self.sites.len();
        self.sites_to[site.callee].push(index);
        self.sites_from[site.caller].push(index);
        self.sites.push(site);
    }
}

/// Convert the graph rooted at `root` in place.
pub fn convert(arena: &mut TermArena, root: ClosureId) -> ConversionStats {
    let mut graph = discover(arena, root);
    let mut stats = ConversionStats {
        blocks: graph.blocks.len(),
        call_sites: graph.sites.len(),
        ..ConversionStats::default()
    };
    propagate(&mut graph, &mut stats);
    rewrite(arena, &graph, &mut stats);
    prune(arena, &graph, &mut stats);
    rename(arena, root, &mut stats);

    tracing::debug!(
        blocks = stats.blocks,
        free_variables = stats.free_variables,
        worklist_steps = stats.worklist_steps,
        pruned = stats.pruned_parameters,
        renamed = stats.renamed_bindings,
        "closure conversion converged"
    );
    stats
}

// ── Step 1: discovery ───────────────────────────────────────────────

fn discover(arena: &TermArena, root: ClosureId) -> CallGraph {
    let mut graph = CallGraph::new(root);
    let mut seen = FxHashSet::default();
    let mut node = ROOT;
    while node < graph.len() {
        scan(arena, &mut graph, &mut seen, node);
        node += 1;
    }
    graph
}

/// Record free variables and block calls of one node's body.
///
/// Breadth-first, so a closure shared by several calls is scanned in the
/// scope of its shallowest use.
fn scan(arena: &TermArena, graph: &mut CallGraph, seen: &mut FxHashSet<ClosureId>, node: Node) {
    let entry = graph.entry(arena, node);
    seen.insert(entry);
    let scope = graph.chain.push(None, &arena.closure(entry).params);
    let mut queue = VecDeque::from([(arena.closure(entry).body, scope)]);

    while let Some((call_id, scope)) = queue.pop_front() {
        let call = arena.call(call_id);
        if let Value::Block(block) = call.procedure {
            let callee = graph.node(block);
            graph.add_site(CallSite {
                caller: node,
                callee,
                call: call_id,
                scope,
            });
        }

        let frame_values = call
            .frame
            .into_iter()
            .flat_map(move |frame| arena.frame(frame).values());
        for value in call.values().chain(frame_values) {
            match *value {
                Value::Var(var) if !graph.chain.binds(Some(scope), var) => {
                    graph.free[node].insert(var);
                }
                Value::Closure(closure) if seen.insert(closure) => {
                    let inner = arena.closure(closure);
                    let inner_scope = graph.chain.push(Some(scope), &inner.params);
                    queue.push_back((inner.body, inner_scope));
                }
                _ => {}
            }
        }
    }
}

// ── Step 2: propagation ─────────────────────────────────────────────

/// Push free variables from callees to callers until nothing changes.
///
/// A `(var, block)` pair is queued only when `var` first enters the
/// block's free set, so the worklist runs at most `blocks * vars` steps.
fn propagate(graph: &mut CallGraph, stats: &mut ConversionStats) {
    let mut worklist: Vec<(VarId, Node)> = Vec::new();
    for callee in 1..graph.len() {
        let mut vars: Vec<VarId> = graph.free[callee].iter().copied().collect();
        vars.sort_unstable();
        worklist.extend(vars.into_iter().map(|var| (var, callee)));
    }

    while let Some((var, callee)) = worklist.pop() {
        stats.worklist_steps += 1;
        for &site in &graph.sites_to[callee] {
            let CallSite { caller, scope, .. } = graph.sites[site];
            let added = !graph.chain.binds(Some(scope), var) && graph.free[caller].insert(var);
            // Nothing calls the root.
            if added && caller != ROOT {
                worklist.push((var, caller));
            }
        }
    }
}

// ── Step 3: signature rewrite ───────────────────────────────────────

fn rewrite(arena: &mut TermArena, graph: &CallGraph, stats: &mut ConversionStats) {
    for callee in 1..graph.len() {
        let mut vars: Vec<VarId> = graph.free[callee].iter().copied().collect();
        if vars.is_empty() {
            continue;
        }
        vars.sort_unstable();
        stats.free_variables += vars.len();

        let closure = graph.entry(arena, callee);
        let params = &mut arena.closure_mut(closure).params;
        let old = std::mem::take(params);
        *params = vars.iter().copied().chain(old).collect();

        for &site in &graph.sites_to[callee] {
            let CallSite {
                caller,
                call,
                scope,
                ..
            } = graph.sites[site];
            let args: Vec<Value> = vars
                .iter()
                .map(|&var| {
                    if caller != ROOT || graph.chain.binds(Some(scope), var) {
                        Value::Var(var)
                    } else {
                        Value::Undefined
                    }
                })
                .collect();
            let call_args = &mut arena.call_mut(call).args;
            let old = std::mem::take(call_args);
            *call_args = args.into_iter().chain(old).collect();
        }
    }
}

// ── Step 4: undefined pruning ───────────────────────────────────────

fn has_undefined(arena: &TermArena, call: CallId) -> bool {
    arena.call(call).args.iter().any(Value::is_undefined)
}

fn prune(arena: &mut TermArena, graph: &CallGraph, stats: &mut ConversionStats) {
    let mut worklist: Vec<usize> = (0..graph.sites.len())
        .filter(|&site| has_undefined(arena, graph.sites[site].call))
        .collect();

    while let Some(site) = worklist.pop() {
        let CallSite { callee, call, .. } = graph.sites[site];
        let closure = graph.entry(arena, callee);
        while let Some(position) = arena.call(call).args.iter().position(Value::is_undefined) {
            let param = arena.closure_mut(closure).params.remove(position);
            for &other in &graph.sites_to[callee] {
                arena.call_mut(graph.sites[other].call).args.remove(position);
            }
            stats.pruned_parameters += 1;
            tracing::trace!(%param, "pruned undefined parameter");

            substitute_undefined(arena, closure, param);
            worklist.extend(
                graph.sites_from[callee]
                    .iter()
                    .copied()
                    .filter(|&inner| has_undefined(arena, graph.sites[inner].call)),
            );
        }
    }
}

/// Replace references to `param` in the body of `closure` with `Undefined`.
///
/// Stops at inner closures that bind `param` again, and at block calls.
fn substitute_undefined(arena: &mut TermArena, closure: ClosureId, param: VarId) {
    let mut seen = FxHashSet::default();
    let mut queue = VecDeque::from([arena.closure(closure).body]);
    let target = Value::Var(param);

    while let Some(call_id) = queue.pop_front() {
        let call = arena.call_mut(call_id);
        for arg in &mut call.args {
            if *arg == target {
                *arg = Value::Undefined;
            }
        }
        let frame = call.frame;
        if let Some(frame) = frame {
            for value in arena.frame_mut(frame).values_mut() {
                if *value == target {
                    *value = Value::Undefined;
                }
            }
        }

        let call = arena.call(call_id);
        for value in call.values() {
            if let Value::Closure(inner) = *value {
                let inner_closure = arena.closure(inner);
                if !inner_closure.params.contains(&param) && seen.insert(inner) {
                    queue.push_back(inner_closure.body);
                }
            }
        }
    }
}

// ── Step 5: renaming ────────────────────────────────────────────────

/// Persistent map of renamed variables, one link per rename.
#[derive(Default)]
struct Renames {
    links: Vec<(VarId, VarId, Option<usize>)>,
}

impl Renames {
    fn push(&mut self, scope: Option<usize>, from: VarId, to: VarId) -> usize {
        self.links.push((from, to, scope));
        self.links.len() - 1
    }

    fn lookup(&self, scope: Option<usize>, var: VarId) -> VarId {
        let mut current = scope;
        while let Some(index) = current {
            let (from, to, parent) = self.links[index];
            if from == var {
                return to;
            }
            current = parent;
        }
        var
    }

    fn apply(&self, scope: Option<usize>, value: &mut Value) {
        if let Value::Var(var) = value {
            *var = self.lookup(scope, *var);
        }
    }
}

fn rename(arena: &mut TermArena, root: ClosureId, stats: &mut ConversionStats) {
    let reachable = arena.reachable(root);
    let entries: Vec<ClosureId> = std::iter::once(root)
        .chain(reachable.blocks.iter().map(|&block| arena.block(block).closure))
        .collect();

    let mut bound: FxHashSet<VarId> = FxHashSet::default();
    let mut renames = Renames::default();
    let mut seen = FxHashSet::default();

    for entry in entries {
        seen.insert(entry);
        let mut queue = VecDeque::from([(entry, None)]);
        while let Some((closure, outer)) = queue.pop_front() {
            let mut scope = outer;
            for i in 0..arena.closure(closure).params.len() {
                let param = arena.closure(closure).params[i];
                if bound.insert(param) {
                    if renames.lookup(scope, param) != param {
                        scope = Some(renames.push(scope, param, param));
                    }
                    continue;
                }
                let fresh = arena.copy_var(param);
                bound.insert(fresh);
                arena.closure_mut(closure).params[i] = fresh;
                scope = Some(renames.push(scope, param, fresh));
                stats.renamed_bindings += 1;
            }

            let body = arena.closure(closure).body;
            let call = arena.call_mut(body);
            renames.apply(scope, &mut call.procedure);
            for arg in &mut call.args {
                renames.apply(scope, arg);
            }
            let frame = call.frame;
            if let Some(frame) = frame {
                for value in arena.frame_mut(frame).values_mut() {
                    renames.apply(scope, value);
                }
            }

            for value in arena.call(body).values() {
                if let Value::Closure(inner) = *value {
                    if seen.insert(inner) {
                        queue.push_back((inner, scope));
                    }
                }
            }
        }
    }
}
