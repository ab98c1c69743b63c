//! Evaluation order: postorder enumeration, recurrent loop detection and
//! sweep plan compilation.
//!
//! A recurrent loop is a strongly connected component of the input graph.
//! Legal loops contain at least one delay edge; within a loop, evaluation
//! follows a topological order over the same-timestep edges only, and the
//! scheduler drives the whole loop once per timestep.

use std::collections::HashSet;

use crate::error::TempoGraphError;
use crate::node::NodeId;

use super::ComputationGraph;

/// One recurrent loop: the members of a strongly connected component plus
/// the order they run in within a single timestep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecurrentLoop {
    pub id: usize,
    /// Members sorted by discovery order of the enclosing walk.
    pub members: Vec<NodeId>,
    /// Topological order of the members over same-timestep edges.
    pub order: Vec<NodeId>,
}

/// One step of a compiled sweep: a standalone node, or a whole recurrent
/// loop driven across every timestep before the sweep moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanStep {
    Node(NodeId),
    Loop(usize),
}

/// Precompiled schedule for a fixed set of roots. Compiling is pure
/// analysis: plans can be rebuilt at any time and rebuilding an unchanged
/// graph yields an identical plan.
#[derive(Debug, Clone)]
pub struct SweepPlan {
    pub(crate) roots: Vec<NodeId>,
    pub(crate) forward: Vec<PlanStep>,
    pub(crate) backward: Vec<PlanStep>,
    pub(crate) loops: Vec<RecurrentLoop>,
}

impl SweepPlan {
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn forward_steps(&self) -> &[PlanStep] {
        &self.forward
    }

    pub fn backward_steps(&self) -> &[PlanStep] {
        &self.backward
    }

    pub fn loops(&self) -> &[RecurrentLoop] {
        &self.loops
    }

    /// Every node the plan touches, in forward order, with loop members
    /// expanded in their intra-loop order.
    pub fn participants(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        for step in &self.forward {
            match step {
                PlanStep::Node(id) => out.push(*id),
                PlanStep::Loop(li) => out.extend(self.loops[*li].order.iter().copied()),
            }
        }
        out
    }
}

struct TarjanCtx {
    next_index: usize,
    stack: Vec<NodeId>,
    loops: Vec<Vec<NodeId>>,
}

impl ComputationGraph {
    /// Runs the depth-first postorder from `roots` and records each node's
    /// visit order in its traversal state. Forward evaluation follows this
    /// order: every node comes after all of its reachable inputs, with
    /// cycle-closing edges skipped.
    pub fn enumerate_order(&mut self, roots: &[NodeId]) -> Vec<NodeId> {
        let order = self.collect_postorder(roots);
        for (pos, &id) in order.iter().enumerate() {
            let state = &mut self.node_mut(id).traversal;
            state.visit_order = pos;
            state.visited = true;
        }
        order
    }

    /// Backward propagation order: the forward postorder re-sorted by
    /// recorded visit order, reversed. Gradient flows root-first, and every
    /// node's gradient is complete before its own inputs are visited.
    pub fn backward_order(&self, forward: &[NodeId]) -> Vec<NodeId> {
        let mut order = forward.to_vec();
        order.sort_by_key(|&id| self.node(id).traversal.visit_order);
        order.reverse();
        order
    }

    /// Finds every recurrent loop reachable from `roots` and tags members
    /// with their loop id. Requires [`ComputationGraph::enumerate_order`]
    /// to have run on the same roots.
    ///
    /// # Errors
    ///
    /// [`TempoGraphError::LoopWithoutDelay`] when a cycle has no delay
    /// operator to break it in time, and
    /// [`TempoGraphError::SameInstantCycle`] when the members cannot be
    /// ordered within one timestep.
    pub fn detect_recurrent_loops(
        &mut self,
        roots: &[NodeId],
    ) -> Result<Vec<RecurrentLoop>, TempoGraphError> {
        let mut ctx = TarjanCtx {
            next_index: 0,
            stack: Vec::new(),
            loops: Vec::new(),
        };
        for &root in roots {
            if root.0 < self.nodes.len() && self.nodes[root.0].traversal.scc_index.is_none() {
                self.tarjan(root, &mut ctx);
            }
        }
        let mut loops = Vec::with_capacity(ctx.loops.len());
        for (loop_id, mut members) in ctx.loops.into_iter().enumerate() {
            members.sort_by_key(|&id| self.nodes[id.0].traversal.visit_order);
            if !members.iter().any(|&m| self.nodes[m.0].kind.is_delay()) {
                return Err(TempoGraphError::LoopWithoutDelay {
                    loop_id,
                    members: self.member_names(&members),
                });
            }
            let order = self.intra_loop_order(loop_id, &members)?;
            log::debug!(
                "recurrent loop {loop_id}: [{}]",
                self.member_names(&order).join(" -> ")
            );
            loops.push(RecurrentLoop {
                id: loop_id,
                members,
                order,
            });
        }
        Ok(loops)
    }

    fn member_names(&self, members: &[NodeId]) -> Vec<String> {
        members
            .iter()
            .map(|&m| self.nodes[m.0].name.clone())
            .collect()
    }

    fn tarjan(&mut self, v: NodeId, ctx: &mut TarjanCtx) {
        let index = ctx.next_index;
        ctx.next_index += 1;
        {
            let state = &mut self.nodes[v.0].traversal;
            state.scc_index = Some(index);
            state.scc_low_link = index;
            state.on_stack = true;
        }
        ctx.stack.push(v);
        let inputs = self.nodes[v.0].inputs.clone();
        for w in inputs {
            if self.nodes[w.0].traversal.scc_index.is_none() {
                self.tarjan(w, ctx);
                let w_low = self.nodes[w.0].traversal.scc_low_link;
                let state = &mut self.nodes[v.0].traversal;
                if w_low < state.scc_low_link {
                    state.scc_low_link = w_low;
                }
            } else if self.nodes[w.0].traversal.on_stack {
                if let Some(w_index) = self.nodes[w.0].traversal.scc_index {
                    let state = &mut self.nodes[v.0].traversal;
                    if w_index < state.scc_low_link {
                        state.scc_low_link = w_index;
                    }
                }
            }
        }
        if self.nodes[v.0].traversal.scc_low_link == index {
            let mut members = Vec::new();
            while let Some(w) = ctx.stack.pop() {
                self.nodes[w.0].traversal.on_stack = false;
                members.push(w);
                if w == v {
                    break;
                }
            }
            let self_cycle = members.len() == 1 && self.nodes[v.0].inputs.contains(&v);
            if members.len() > 1 || self_cycle {
                let loop_id = ctx.loops.len();
                for &m in &members {
                    self.nodes[m.0].traversal.loop_id = Some(loop_id);
                }
                ctx.loops.push(members);
            }
        }
    }

    /// Topological order of `members` over same-timestep edges. A delay
    /// node reads the previous timestep, so its incoming edges never
    /// constrain the current instant and it is always ready first.
    fn intra_loop_order(
        &self,
        loop_id: usize,
        members: &[NodeId],
    ) -> Result<Vec<NodeId>, TempoGraphError> {
        let member_set: HashSet<NodeId> = members.iter().copied().collect();
        let mut placed: HashSet<NodeId> = HashSet::new();
        let mut order = Vec::with_capacity(members.len());
        while order.len() < members.len() {
            let mut advanced = false;
            for &m in members {
                if placed.contains(&m) {
                    continue;
                }
                let ready = self.nodes[m.0].kind.is_delay()
                    || self.nodes[m.0]
                        .inputs
                        .iter()
                        .all(|i| !member_set.contains(i) || placed.contains(i));
                if ready {
                    placed.insert(m);
                    order.push(m);
                    advanced = true;
                }
            }
            if !advanced {
                let stuck: Vec<NodeId> = members
                    .iter()
                    .copied()
                    .filter(|m| !placed.contains(m))
                    .collect();
                return Err(TempoGraphError::SameInstantCycle {
                    loop_id,
                    members: self.member_names(&stuck),
                });
            }
        }
        Ok(order)
    }

    /// Compiles the complete sweep schedule for `roots`.
    ///
    /// Forward steps follow the postorder with each loop folded into a
    /// single step at its last member's position, by which point every
    /// outside dependency of the loop has already run. Backward steps
    /// reverse the flow, with each loop folded at its first appearance.
    ///
    /// # Errors
    ///
    /// Loop legality errors from
    /// [`ComputationGraph::detect_recurrent_loops`], plus
    /// [`TempoGraphError::WholeBatchOnly`] when a whole-batch operator
    /// sits inside a loop and would have to run per timestep.
    pub fn compile_plan(&mut self, roots: &[NodeId]) -> Result<SweepPlan, TempoGraphError> {
        for &root in roots {
            if root.0 >= self.nodes.len() {
                return Err(TempoGraphError::NodeNotFound {
                    name: format!("{root}"),
                });
            }
        }
        self.clear_traversal_state();
        let forward_nodes = self.enumerate_order(roots);
        let loops = self.detect_recurrent_loops(roots)?;
        for l in &loops {
            for &m in &l.members {
                if self.nodes[m.0].kind.whole_batch_only() {
                    return Err(TempoGraphError::WholeBatchOnly {
                        node: self.nodes[m.0].name.clone(),
                        operation: self.nodes[m.0].kind.name().to_string(),
                    });
                }
            }
        }
        let backward_nodes = self.backward_order(&forward_nodes);

        let mut pending: Vec<usize> = loops.iter().map(|l| l.members.len()).collect();
        let mut forward = Vec::new();
        for &id in &forward_nodes {
            match self.nodes[id.0].traversal.loop_id {
                None => forward.push(PlanStep::Node(id)),
                Some(li) => {
                    pending[li] -= 1;
                    if pending[li] == 0 {
                        forward.push(PlanStep::Loop(li));
                    }
                }
            }
        }
        let mut emitted = vec![false; loops.len()];
        let mut backward = Vec::new();
        for &id in &backward_nodes {
            match self.nodes[id.0].traversal.loop_id {
                None => backward.push(PlanStep::Node(id)),
                Some(li) => {
                    if !emitted[li] {
                        emitted[li] = true;
                        backward.push(PlanStep::Loop(li));
                    }
                }
            }
        }
        log::debug!(
            "compiled plan: {} forward steps, {} loops",
            forward.len(),
            loops.len()
        );
        Ok(SweepPlan {
            roots: roots.to_vec(),
            forward,
            backward,
            loops,
        })
    }
}
