//! The computation graph: an arena of nodes addressed by [`NodeId`].
//!
//! The graph owns every node and all of their buffers. Structure is built
//! with [`ComputationGraph::add_node`] and
//! [`ComputationGraph::attach_inputs`], checked once with
//! [`ComputationGraph::validate`], then driven sweep by sweep through a
//! compiled [`SweepPlan`].

mod execution;
mod ordering;

pub use execution::Scheduler;
pub use ordering::{PlanStep, RecurrentLoop, SweepPlan};

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::device::Device;
use crate::error::TempoGraphError;
use crate::layout::MinibatchLayout;
use crate::matrix::Matrix;
use crate::node::{CopyFlags, Node, NodeId, TraversalState};
use crate::ops::{self, OpKind, ShapeInfo};

#[derive(Debug, Default)]
pub struct ComputationGraph {
    nodes: Vec<Node>,
    names: HashMap<String, NodeId>,
    /// Monotonic counter behind both creation order and value staleness.
    next_stamp: u64,
}

impl ComputationGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// Borrows a node.
    ///
    /// # Panics
    ///
    /// Panics if `id` did not come from this graph.
    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id.0]
    }

    pub fn find(&self, name: &str) -> Option<NodeId> {
        self.names.get(name).copied()
    }

    pub(crate) fn bump_stamp(&mut self) -> u64 {
        self.next_stamp += 1;
        self.next_stamp
    }

    fn check_id(&self, id: NodeId) -> Result<(), TempoGraphError> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(TempoGraphError::NodeNotFound {
                name: format!("{id}"),
            })
        }
    }

    /// Creates an unwired node. Names are unique per graph; the creation
    /// stamp doubles as a deterministic tie-breaker for orderings.
    pub fn add_node(
        &mut self,
        name: impl Into<String>,
        kind: OpKind,
    ) -> Result<NodeId, TempoGraphError> {
        let name = name.into();
        if self.names.contains_key(&name) {
            return Err(TempoGraphError::DuplicateNodeName { name });
        }
        let stamp = self.bump_stamp();
        let id = NodeId(self.nodes.len());
        log::trace!("add node {} '{}' ({})", id, name, kind.name());
        self.names.insert(name.clone(), id);
        self.nodes.push(Node::new(name, kind, stamp));
        Ok(id)
    }

    /// Creates an unwired node placed on `device`. Network builders use
    /// this form so every node lands on its device before any buffer
    /// grows large enough for the move to matter.
    pub fn add_node_on(
        &mut self,
        device: Device,
        name: impl Into<String>,
        kind: OpKind,
    ) -> Result<NodeId, TempoGraphError> {
        let id = self.add_node(name, kind)?;
        self.move_to_device(id, device)?;
        Ok(id)
    }

    /// Creates a node and wires its inputs in one step.
    pub fn add_op(
        &mut self,
        name: impl Into<String>,
        kind: OpKind,
        inputs: &[NodeId],
    ) -> Result<NodeId, TempoGraphError> {
        let id = self.add_node(name, kind)?;
        self.attach_inputs(id, inputs)?;
        Ok(id)
    }

    /// Wires `inputs` as the node's ordered input edges, replacing any
    /// previous wiring. Arity and arena membership are checked here so the
    /// graph never holds dangling edges.
    pub fn attach_inputs(
        &mut self,
        id: NodeId,
        inputs: &[NodeId],
    ) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let expected = self.nodes[id.0].kind.arity();
        if inputs.len() != expected {
            return Err(TempoGraphError::ArityMismatch {
                node: self.nodes[id.0].name.clone(),
                operation: self.nodes[id.0].kind.name().to_string(),
                expected,
                actual: inputs.len(),
            });
        }
        for &input in inputs {
            if input.0 >= self.nodes.len() {
                return Err(TempoGraphError::DanglingInput {
                    node: self.nodes[id.0].name.clone(),
                    operation: self.nodes[id.0].kind.name().to_string(),
                    input_id: input.0,
                    arena_len: self.nodes.len(),
                });
            }
        }
        self.nodes[id.0].inputs = inputs.to_vec();
        Ok(())
    }

    /// Drops the node's input edges, leaving it a disconnected leaf-like
    /// shell. Mostly useful while restructuring a network.
    pub fn detach_inputs(&mut self, id: NodeId) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        self.nodes[id.0].inputs.clear();
        Ok(())
    }

    /// Marks the node's value as recomputed now.
    pub fn touch(&mut self, id: NodeId) {
        let stamp = self.bump_stamp();
        self.nodes[id.0].stamp = stamp;
    }

    /// A node is stale when some input was recomputed at or after the
    /// node's own last recompute.
    pub fn is_stale(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        node.inputs.iter().any(|&i| self.nodes[i.0].stamp >= node.stamp)
    }

    /// Replaces the fed minibatch data of an `Input` node and marks it
    /// recomputed, so consumers of the old batch become stale.
    pub fn feed_input(&mut self, id: NodeId, samples: Matrix) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &self.nodes[id.0];
        let rows = match node.kind {
            OpKind::Input { rows } => rows,
            _ => {
                return Err(TempoGraphError::InvalidWiring {
                    node: node.name.clone(),
                    operation: node.kind.name().to_string(),
                    message: "only Input nodes accept fed minibatch data".to_string(),
                })
            }
        };
        if samples.rows() != rows {
            return Err(TempoGraphError::ShapeMismatch {
                node: node.name.clone(),
                operation: node.kind.name().to_string(),
                expected: (rows, samples.cols()),
                actual: samples.shape(),
            });
        }
        if samples.device() != node.device {
            return Err(TempoGraphError::DeviceMismatch {
                node: node.name.clone(),
                operation: node.kind.name().to_string(),
                expected: node.device,
                actual: samples.device(),
            });
        }
        self.nodes[id.0].value = samples;
        self.touch(id);
        Ok(())
    }

    /// Binds the layout of the next minibatch to every layout-carrying
    /// node. Buffers are not resized here; that happens lazily as the
    /// scheduler reaches each node.
    pub fn bind_minibatch(&mut self, layout: &Arc<MinibatchLayout>) {
        log::debug!(
            "bind minibatch: {} steps x {} slots, {} gap cells",
            layout.steps(),
            layout.slots(),
            layout.gap_count()
        );
        for node in &mut self.nodes {
            node.layout = if node.kind.carries_layout() {
                Some(Arc::clone(layout))
            } else {
                None
            };
        }
    }

    /// Brings the node's value buffer to the bound layout's width. Contents
    /// do not survive: consumers must treat a resized buffer as garbage
    /// until the node is evaluated. `Input` nodes are verified instead of
    /// resized, since their data arrives from outside.
    pub(crate) fn resize_for_minibatch(&mut self, id: NodeId) -> Result<(), TempoGraphError> {
        let node = &mut self.nodes[id.0];
        let Some(layout) = node.layout.clone() else {
            return Ok(());
        };
        let cols = layout.columns();
        match node.kind {
            OpKind::Input { .. } => {
                if node.value.cols() != cols {
                    return Err(TempoGraphError::LayoutMismatch {
                        node: node.name.clone(),
                        operation: node.kind.name().to_string(),
                        expected: cols,
                        actual: node.value.cols(),
                    });
                }
            }
            _ => {
                if node.value.cols() != cols {
                    let rows = node.value.rows();
                    node.value.resize(rows, cols);
                }
            }
        }
        Ok(())
    }

    fn input_shapes(&self, id: NodeId) -> Vec<ShapeInfo<'_>> {
        self.nodes[id.0]
            .inputs
            .iter()
            .map(|&c| {
                let child = &self.nodes[c.0];
                ShapeInfo {
                    name: &child.name,
                    rows: child.value.rows(),
                    cols: child.value.cols(),
                    has_layout: child.kind.carries_layout(),
                }
            })
            .collect()
    }

    fn computed_needs_gradient(&self, id: NodeId) -> bool {
        let node = &self.nodes[id.0];
        match node.kind {
            OpKind::Parameter { update_enabled, .. } => update_enabled,
            OpKind::Input { .. } => false,
            _ => node
                .inputs
                .iter()
                .any(|&i| self.nodes[i.0].needs_gradient),
        }
    }

    /// Checks and settles everything reachable from `roots`: arity and
    /// wiring, output shapes (iterated to a fixed point so shapes can flow
    /// through cycles), gradient needs, and finally per-kind structural
    /// rules. Gradient buffers are allocated or dropped here to match the
    /// settled `needs_gradient` flags.
    ///
    /// # Errors
    ///
    /// Any configuration-category error of the reachable subgraph; the
    /// first problem found aborts the whole pass.
    pub fn validate(&mut self, roots: &[NodeId]) -> Result<(), TempoGraphError> {
        for &root in roots {
            self.check_id(root)?;
        }
        let order = self.collect_postorder(roots);
        for &id in &order {
            let node = &self.nodes[id.0];
            let expected = node.kind.arity();
            if node.inputs.len() != expected {
                return Err(TempoGraphError::ArityMismatch {
                    node: node.name.clone(),
                    operation: node.kind.name().to_string(),
                    expected,
                    actual: node.inputs.len(),
                });
            }
            if node.kind.is_delay() && node.inputs.contains(&id) {
                return Err(TempoGraphError::InvalidWiring {
                    node: node.name.clone(),
                    operation: node.kind.name().to_string(),
                    message: "a delay may not read its own output".to_string(),
                });
            }
        }
        // Shapes and gradient needs settle together. Unsettled dimensions
        // start at zero and only ever grow, so the fixed point arrives in
        // at most one pass per node along the longest dependency chain.
        let mut passes = 0;
        loop {
            let mut changed = false;
            for &id in &order {
                let shapes = self.input_shapes(id);
                let node = &self.nodes[id.0];
                let desired =
                    ops::infer_shape(&node.kind, &node.name, &shapes, node.value.shape())?;
                if desired != node.value.shape() {
                    self.nodes[id.0].value.resize(desired.0, desired.1);
                    changed = true;
                }
                let needs = self.computed_needs_gradient(id);
                if needs != self.nodes[id.0].needs_gradient {
                    self.nodes[id.0].needs_gradient = needs;
                    changed = true;
                }
            }
            passes += 1;
            if !changed || passes > order.len() + 1 {
                break;
            }
        }
        for &id in &order {
            let shapes = self.input_shapes(id);
            let node = &self.nodes[id.0];
            ops::validate_final(&node.kind, &node.name, &shapes)?;
            log::debug!("validated {}", self.describe(id));
        }
        for &id in &order {
            let (rows, cols) = self.nodes[id.0].value.shape();
            let device = self.nodes[id.0].device;
            if self.nodes[id.0].needs_gradient {
                let fresh = match self.nodes[id.0].gradient.as_ref() {
                    Some(g) => g.shape() != (rows, cols),
                    None => true,
                };
                if fresh {
                    self.nodes[id.0].gradient = Some(Matrix::new(rows, cols, device));
                }
            } else {
                self.nodes[id.0].gradient = None;
            }
        }
        log::debug!("validated {} nodes", order.len());
        Ok(())
    }

    /// Depth-first postorder over the subgraph reachable from `roots`.
    /// Every node appears after all of its reachable inputs; edges into
    /// nodes already on the active path (cycles) are skipped.
    pub fn collect_postorder(&self, roots: &[NodeId]) -> Vec<NodeId> {
        let mut entered = vec![false; self.nodes.len()];
        let mut order = Vec::new();
        for &root in roots {
            if root.0 >= self.nodes.len() || entered[root.0] {
                continue;
            }
            entered[root.0] = true;
            let mut stack: Vec<(NodeId, usize)> = vec![(root, 0)];
            while let Some(top) = stack.last_mut() {
                let (id, next_input) = *top;
                if next_input < self.nodes[id.0].inputs.len() {
                    top.1 += 1;
                    let child = self.nodes[id.0].inputs[next_input];
                    if !entered[child.0] {
                        entered[child.0] = true;
                        stack.push((child, 0));
                    }
                } else {
                    order.push(id);
                    stack.pop();
                }
            }
        }
        order
    }

    /// Copies a node under a new name. The operator kind always comes
    /// along; [`CopyFlags::VALUE`] additionally copies buffers, device and
    /// gradient state, [`CopyFlags::LINKS`] the input wiring. Stamps and
    /// layout bindings never transfer: the copy has no evaluation history.
    pub fn clone_node(
        &mut self,
        src: NodeId,
        new_name: impl Into<String>,
        flags: CopyFlags,
    ) -> Result<NodeId, TempoGraphError> {
        self.check_id(src)?;
        let new_name = new_name.into();
        if self.names.contains_key(&new_name) {
            return Err(TempoGraphError::DuplicateNodeName { name: new_name });
        }
        let (kind, device, value, gradient, needs_gradient, links) = {
            let s = &self.nodes[src.0];
            (
                s.kind.clone(),
                s.device,
                s.value.clone(),
                s.gradient.clone(),
                s.needs_gradient,
                s.inputs.clone(),
            )
        };
        let stamp = self.bump_stamp();
        let mut node = Node::new(new_name.clone(), kind, stamp);
        if flags.contains(CopyFlags::VALUE) {
            node.device = device;
            node.value = value;
            node.gradient = gradient;
            node.needs_gradient = needs_gradient;
        }
        if flags.contains(CopyFlags::LINKS) {
            node.inputs = links;
        }
        let id = NodeId(self.nodes.len());
        log::trace!("clone {} -> {} '{}'", src, id, self.nodes[src.0].name);
        self.names.insert(new_name, id);
        self.nodes.push(node);
        Ok(id)
    }

    /// Structural equality: same operation and either the same name or
    /// pairwise-equal inputs. Leaves with different names are never equal.
    /// Cycles are handled coinductively: a pair already under comparison
    /// counts as equal, so recurrent graphs terminate.
    pub fn nodes_equal(&self, a: NodeId, b: NodeId) -> bool {
        let mut in_progress = HashSet::new();
        self.nodes_equal_inner(a, b, &mut in_progress)
    }

    fn nodes_equal_inner(
        &self,
        a: NodeId,
        b: NodeId,
        in_progress: &mut HashSet<(usize, usize)>,
    ) -> bool {
        if a == b {
            return true;
        }
        if a.0 >= self.nodes.len() || b.0 >= self.nodes.len() {
            return false;
        }
        if !in_progress.insert((a.0, b.0)) {
            return true;
        }
        let (na, nb) = (&self.nodes[a.0], &self.nodes[b.0]);
        if na.kind.name() != nb.kind.name() {
            return false;
        }
        if na.name == nb.name {
            return true;
        }
        if na.inputs.is_empty() || na.inputs.len() != nb.inputs.len() {
            return false;
        }
        na.inputs
            .iter()
            .zip(nb.inputs.iter())
            .all(|(&x, &y)| self.nodes_equal_inner(x, y, in_progress))
    }

    /// One-line description of a node for logs: name, operation, shape and
    /// input names.
    pub fn describe(&self, id: NodeId) -> String {
        let node = &self.nodes[id.0];
        let (rows, cols) = node.value.shape();
        if node.inputs.is_empty() {
            format!("{} : {} [{rows} x {cols}]", node.name, node.kind.name())
        } else {
            let inputs: Vec<&str> = node
                .inputs
                .iter()
                .map(|&i| self.nodes[i.0].name.as_str())
                .collect();
            format!(
                "{} : {} [{rows} x {cols}] ({})",
                node.name,
                node.kind.name(),
                inputs.join(", ")
            )
        }
    }

    /// Moves every buffer of the node (value, gradient, scratch) in one
    /// step, so a node is never split across devices.
    pub fn move_to_device(&mut self, id: NodeId, device: Device) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &mut self.nodes[id.0];
        node.device = device;
        node.value.to_device(device);
        if let Some(g) = node.gradient.as_mut() {
            g.to_device(device);
        }
        if let Some(s) = node.scratch.as_mut() {
            s.to_device(device);
        }
        Ok(())
    }

    /// Fills a parameter with uniform samples from `[low, high)`.
    pub fn init_parameter_uniform<R: rand::Rng>(
        &mut self,
        id: NodeId,
        low: f32,
        high: f32,
        rng: &mut R,
    ) -> Result<(), TempoGraphError> {
        self.check_learnable(id)?;
        ops::init_uniform(&mut self.nodes[id.0].value, low, high, rng)?;
        self.touch(id);
        Ok(())
    }

    /// Fills a parameter with gaussian samples from `N(mean, std)`.
    pub fn init_parameter_gaussian<R: rand::Rng>(
        &mut self,
        id: NodeId,
        mean: f32,
        std: f32,
        rng: &mut R,
    ) -> Result<(), TempoGraphError> {
        self.check_learnable(id)?;
        ops::init_gaussian(&mut self.nodes[id.0].value, mean, std, rng)?;
        self.touch(id);
        Ok(())
    }

    /// Overwrites a parameter's value, keeping its declared shape. This is
    /// the write half of an update step: read the gradient, compute the
    /// new value, set it here.
    pub fn set_parameter_value(
        &mut self,
        id: NodeId,
        value: Matrix,
    ) -> Result<(), TempoGraphError> {
        self.check_learnable(id)?;
        let node = &mut self.nodes[id.0];
        if value.shape() != node.value.shape() {
            return Err(TempoGraphError::ShapeMismatch {
                node: node.name.clone(),
                operation: node.kind.name().to_string(),
                expected: node.value.shape(),
                actual: value.shape(),
            });
        }
        node.value = value;
        node.value.to_device(node.device);
        self.touch(id);
        Ok(())
    }

    fn check_learnable(&self, id: NodeId) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &self.nodes[id.0];
        if node.kind.is_learnable() {
            Ok(())
        } else {
            Err(TempoGraphError::InvalidInitialization {
                message: format!(
                    "'{}' is a {} node, only parameters are initialized",
                    node.name,
                    node.kind.name()
                ),
            })
        }
    }

    /// Returns every pooled scratch buffer still held by nodes. Called when
    /// tearing a network down or before handing the pool elsewhere.
    pub fn release_transient_buffers(&mut self, pool: &mut crate::pool::BufferPool) {
        for node in &mut self.nodes {
            if let Some(s) = node.scratch.take() {
                pool.release(s);
            }
        }
    }

    pub(crate) fn clear_traversal_state(&mut self) {
        for node in &mut self.nodes {
            node.traversal = TraversalState::default();
        }
    }

    pub(crate) fn restore_parameter(
        &mut self,
        id: NodeId,
        value: Matrix,
        update_enabled: bool,
    ) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &mut self.nodes[id.0];
        node.kind = OpKind::Parameter {
            rows: value.rows(),
            cols: value.cols(),
            update_enabled,
        };
        node.value = value;
        node.value.to_device(node.device);
        self.touch(id);
        Ok(())
    }

    pub(crate) fn restore_input(&mut self, id: NodeId, rows: usize) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &mut self.nodes[id.0];
        node.kind = OpKind::Input { rows };
        node.value = Matrix::new(rows, 0, node.device);
        self.touch(id);
        Ok(())
    }

    pub(crate) fn restore_past_value(
        &mut self,
        id: NodeId,
        delay: usize,
        initial_activation: f32,
    ) -> Result<(), TempoGraphError> {
        self.check_id(id)?;
        let node = &mut self.nodes[id.0];
        node.kind = OpKind::PastValue {
            delay,
            initial_activation,
        };
        self.touch(id);
        Ok(())
    }
}
