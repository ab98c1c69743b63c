//! Sweep execution: forward evaluation and gradient backpropagation over a
//! compiled plan.
//!
//! The scheduler walks plan steps in order. Standalone nodes evaluate over
//! the whole minibatch at once; recurrent loops run member by member, one
//! timestep at a time. Per-sweep buffer hooks run once per participating
//! node regardless of how many timesteps a loop spans.

use crate::device::Device;
use crate::error::TempoGraphError;
use crate::layout::{mask_columns_to, FrameRange};
use crate::matrix::Matrix;
use crate::node::NodeId;
use crate::ops;
use crate::pool::BufferPool;

use super::{ComputationGraph, PlanStep, RecurrentLoop, SweepPlan};

/// Drives sweeps over a graph. Holds only policy switches; the graph, plan
/// and pool are handed in per call so one scheduler can serve many
/// networks.
#[derive(Debug, Clone, Copy, Default)]
pub struct Scheduler {
    reuse_stale_values: bool,
    nan_gap_diagnostics: bool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip recomputation of nodes whose inputs have not been touched
    /// since the node's last evaluation. Only sound for repeated sweeps
    /// over one bound minibatch: feeding an input marks its consumers
    /// stale, structural edits do not.
    pub fn reuse_stale_values(mut self, on: bool) -> Self {
        self.reuse_stale_values = on;
        self
    }

    /// Fill gap columns with NaN instead of zero after each evaluation, so
    /// any computation that reads padding poisons its result visibly.
    pub fn nan_gap_diagnostics(mut self, on: bool) -> Self {
        self.nan_gap_diagnostics = on;
        self
    }

    fn gap_fill(&self) -> f32 {
        if self.nan_gap_diagnostics {
            f32::NAN
        } else {
            0.0
        }
    }

    /// Runs one forward sweep over the plan. Values of every participating
    /// node are valid afterwards, with gap columns masked.
    ///
    /// # Errors
    ///
    /// Fails fast on the first runtime error; buffers already produced in
    /// this sweep keep their contents, later nodes are left untouched.
    pub fn forward(
        &self,
        graph: &mut ComputationGraph,
        plan: &SweepPlan,
        pool: &mut BufferPool,
    ) -> Result<(), TempoGraphError> {
        log::debug!("forward sweep: {} steps", plan.forward_steps().len());
        for step in plan.forward_steps() {
            match *step {
                PlanStep::Node(id) => self.forward_node(graph, id, pool)?,
                PlanStep::Loop(li) => self.forward_loop(graph, &plan.loops()[li], pool)?,
            }
        }
        Ok(())
    }

    fn forward_node(
        &self,
        graph: &mut ComputationGraph,
        id: NodeId,
        pool: &mut BufferPool,
    ) -> Result<(), TempoGraphError> {
        if self.reuse_stale_values && !graph.is_stale(id) {
            log::trace!("reusing value of {}", graph.node(id).name());
            return Ok(());
        }
        graph.resize_for_minibatch(id)?;
        graph.begin_node_sweep(id, pool);
        graph.evaluate_node(id, FrameRange::all())?;
        graph.mask_node_value(id, self.gap_fill())?;
        graph.end_node_sweep(id);
        graph.touch(id);
        Ok(())
    }

    /// Loops always run in full: per-member staleness is meaningless when
    /// values feed back across timesteps.
    fn forward_loop(
        &self,
        graph: &mut ComputationGraph,
        lp: &RecurrentLoop,
        pool: &mut BufferPool,
    ) -> Result<(), TempoGraphError> {
        let steps = graph.loop_steps(lp)?;
        log::trace!("loop {} over {} timesteps", lp.id, steps);
        for &m in &lp.order {
            graph.resize_for_minibatch(m)?;
            graph.begin_node_sweep(m, pool);
        }
        for t in 0..steps {
            for &m in &lp.order {
                graph.evaluate_node(m, FrameRange::at(t))?;
            }
        }
        for &m in &lp.order {
            graph.mask_node_value(m, self.gap_fill())?;
            graph.end_node_sweep(m);
            graph.touch(m);
        }
        Ok(())
    }

    /// Runs one backward sweep from `root`, which must be a scalar plan
    /// root with gradients enabled. Every participating gradient buffer is
    /// zeroed first, then contributions accumulate additively along the
    /// backward steps; afterwards each learnable parameter holds the full
    /// derivative of the root with respect to itself.
    ///
    /// Scratch buffers requested for the sweep pair are returned to the
    /// pool on the way out.
    pub fn backward(
        &self,
        graph: &mut ComputationGraph,
        plan: &SweepPlan,
        root: NodeId,
        pool: &mut BufferPool,
    ) -> Result<(), TempoGraphError> {
        {
            let node = graph.node(root);
            if !plan.roots().contains(&root) {
                return Err(TempoGraphError::InvalidWiring {
                    node: node.name().to_string(),
                    operation: node.kind().name().to_string(),
                    message: "backward root is not a root of the compiled plan".to_string(),
                });
            }
            if !node.needs_gradient() {
                return Err(TempoGraphError::GradientNotEnabled {
                    node: node.name().to_string(),
                    operation: node.kind().name().to_string(),
                });
            }
            if node.value().shape() != (1, 1) {
                return Err(TempoGraphError::BackwardNonScalarRoot {
                    node: node.name().to_string(),
                    shape: node.value().shape(),
                });
            }
        }
        log::debug!("backward sweep from {}", graph.node(root).name());
        let participants = plan.participants();
        for &id in &participants {
            graph.reset_gradient(id);
        }
        graph.seed_root_gradient(root)?;
        let result = self.run_backward_steps(graph, plan);
        for &id in &participants {
            graph.release_scratch(id, pool);
        }
        result
    }

    fn run_backward_steps(
        &self,
        graph: &mut ComputationGraph,
        plan: &SweepPlan,
    ) -> Result<(), TempoGraphError> {
        for step in plan.backward_steps() {
            match *step {
                PlanStep::Node(id) => self.backward_node(graph, id)?,
                PlanStep::Loop(li) => self.backward_loop(graph, &plan.loops()[li])?,
            }
        }
        Ok(())
    }

    fn backward_node(
        &self,
        graph: &mut ComputationGraph,
        id: NodeId,
    ) -> Result<(), TempoGraphError> {
        if !graph.node(id).needs_gradient() {
            return Ok(());
        }
        // Gap columns of the incoming gradient are zeroed before anything
        // flows further down, so padding never contaminates real cells.
        graph.mask_node_gradient(id, FrameRange::all(), 0.0)?;
        let input_count = graph.node(id).inputs().len();
        for i in 0..input_count {
            let child = graph.node(id).inputs()[i];
            if graph.node(child).needs_gradient() {
                graph.backprop_input(id, i, FrameRange::all())?;
            }
        }
        Ok(())
    }

    fn backward_loop(
        &self,
        graph: &mut ComputationGraph,
        lp: &RecurrentLoop,
    ) -> Result<(), TempoGraphError> {
        let steps = graph.loop_steps(lp)?;
        for t in (0..steps).rev() {
            for &m in lp.order.iter().rev() {
                if !graph.node(m).needs_gradient() {
                    continue;
                }
                graph.mask_node_gradient(m, FrameRange::at(t), 0.0)?;
                let input_count = graph.node(m).inputs().len();
                for i in 0..input_count {
                    let child = graph.node(m).inputs()[i];
                    if graph.node(child).needs_gradient() {
                        graph.backprop_input(m, i, FrameRange::at(t))?;
                    }
                }
            }
        }
        Ok(())
    }
}

impl ComputationGraph {
    /// Per-sweep begin hook: checks the node's scratch request and brings a
    /// pooled buffer of the right shape into place.
    pub(crate) fn begin_node_sweep(&mut self, id: NodeId, pool: &mut BufferPool) {
        let want = {
            let node = &self.nodes[id.0];
            let first_input = node
                .inputs
                .first()
                .map(|&i| self.nodes[i.0].value.shape());
            node.kind.scratch_shape(node.value.shape(), first_input)
        };
        let Some((rows, cols)) = want else {
            return;
        };
        let holds = self.nodes[id.0].scratch.as_ref().map(|s| s.shape());
        if holds != Some((rows, cols)) {
            if let Some(old) = self.nodes[id.0].scratch.take() {
                pool.release(old);
            }
            let device = self.nodes[id.0].device;
            self.nodes[id.0].scratch = Some(pool.checkout(device, rows, cols));
        }
    }

    /// Per-sweep end hook, after the node's value is complete and masked.
    pub(crate) fn end_node_sweep(&mut self, id: NodeId) {
        log::trace!("evaluated {}", self.describe(id));
    }

    /// Overwrites gap columns of the node's value, unless the node handles
    /// its own masking or carries no layout.
    pub(crate) fn mask_node_value(&mut self, id: NodeId, fill: f32) -> Result<(), TempoGraphError> {
        if self.nodes[id.0].kind.handles_own_masking() {
            return Ok(());
        }
        let Some(layout) = self.nodes[id.0].layout.clone() else {
            return Ok(());
        };
        let mut value = std::mem::take(&mut self.nodes[id.0].value);
        let result = mask_columns_to(&mut value, &layout, FrameRange::all(), fill);
        self.nodes[id.0].value = value;
        let masked = result?;
        if masked > 0 {
            log::trace!("masked {} gap columns of {}", masked, self.nodes[id.0].name);
        }
        Ok(())
    }

    /// Zeroes gap columns of the node's gradient over the selected frame.
    pub(crate) fn mask_node_gradient(
        &mut self,
        id: NodeId,
        frame: FrameRange,
        fill: f32,
    ) -> Result<(), TempoGraphError> {
        if self.nodes[id.0].kind.handles_own_masking() {
            return Ok(());
        }
        let Some(layout) = self.nodes[id.0].layout.clone() else {
            return Ok(());
        };
        let Some(mut gradient) = self.nodes[id.0].gradient.take() else {
            return Ok(());
        };
        let result = mask_columns_to(&mut gradient, &layout, frame, fill);
        self.nodes[id.0].gradient = Some(gradient);
        result?;
        Ok(())
    }

    /// Brings the node's gradient buffer to its value's shape and zeroes
    /// it. Runs once at the start of a backward sweep; everything after
    /// only ever adds.
    pub(crate) fn reset_gradient(&mut self, id: NodeId) {
        if !self.nodes[id.0].needs_gradient {
            return;
        }
        let (rows, cols) = self.nodes[id.0].value.shape();
        let device = self.nodes[id.0].device;
        match self.nodes[id.0].gradient.as_mut() {
            Some(g) => {
                if g.shape() != (rows, cols) {
                    g.resize(rows, cols);
                } else {
                    g.fill(0.0);
                }
            }
            None => {
                self.nodes[id.0].gradient = Some(Matrix::new(rows, cols, device));
            }
        }
    }

    /// Seeds the derivative of the root with respect to itself.
    pub(crate) fn seed_root_gradient(&mut self, root: NodeId) -> Result<(), TempoGraphError> {
        match self.nodes[root.0].gradient.as_mut() {
            Some(g) => {
                g.fill(1.0);
                Ok(())
            }
            None => Err(TempoGraphError::GradientNotEnabled {
                node: self.nodes[root.0].name.clone(),
                operation: self.nodes[root.0].kind.name().to_string(),
            }),
        }
    }

    /// Timestep count of the minibatch a loop iterates over, read from the
    /// first layout-bound member.
    pub(crate) fn loop_steps(&self, lp: &RecurrentLoop) -> Result<usize, TempoGraphError> {
        for &m in &lp.members {
            if let Some(layout) = &self.nodes[m.0].layout {
                return Ok(layout.steps());
            }
        }
        let first = lp.members.first().copied().unwrap_or(NodeId(0));
        Err(TempoGraphError::LayoutMissing {
            node: self.nodes[first.0].name.clone(),
            operation: self.nodes[first.0].kind.name().to_string(),
        })
    }

    /// Runs the node's forward kernel over `frame`, writing into its value
    /// buffer.
    pub(crate) fn evaluate_node(
        &mut self,
        id: NodeId,
        frame: FrameRange,
    ) -> Result<(), TempoGraphError> {
        self.check_devices(id)?;
        let mut value = std::mem::take(&mut self.nodes[id.0].value);
        let mut scratch = self.nodes[id.0].scratch.take();
        let result = {
            let node = &self.nodes[id.0];
            let inputs: Vec<&Matrix> = node
                .inputs
                .iter()
                .map(|&c| &self.nodes[c.0].value)
                .collect();
            let layout = node.layout.as_deref().or_else(|| {
                node.inputs
                    .first()
                    .and_then(|&c| self.nodes[c.0].layout.as_deref())
            });
            let mut ctx = ops::ForwardCtx {
                node_name: &node.name,
                kind: &node.kind,
                inputs: &inputs,
                layout,
                frame,
                out: &mut value,
                scratch: &mut scratch,
            };
            ops::forward(&mut ctx)
        };
        self.nodes[id.0].value = value;
        self.nodes[id.0].scratch = scratch;
        result
    }

    /// Runs the node's backward kernel for one input over `frame`, adding
    /// into that input's gradient buffer.
    pub(crate) fn backprop_input(
        &mut self,
        id: NodeId,
        input_index: usize,
        frame: FrameRange,
    ) -> Result<(), TempoGraphError> {
        self.check_devices(id)?;
        let child = self.nodes[id.0].inputs[input_index];
        let Some(mut grad_out) = self.nodes[child.0].gradient.take() else {
            return Err(TempoGraphError::GradientNotEnabled {
                node: self.nodes[child.0].name.clone(),
                operation: self.nodes[child.0].kind.name().to_string(),
            });
        };
        let mut scratch = self.nodes[id.0].scratch.take();
        let result = {
            let node = &self.nodes[id.0];
            let inputs: Vec<&Matrix> = node
                .inputs
                .iter()
                .map(|&c| &self.nodes[c.0].value)
                .collect();
            let layout = node.layout.as_deref().or_else(|| {
                node.inputs
                    .first()
                    .and_then(|&c| self.nodes[c.0].layout.as_deref())
            });
            match node.gradient.as_ref() {
                None => Err(TempoGraphError::GradientNotEnabled {
                    node: node.name.clone(),
                    operation: node.kind.name().to_string(),
                }),
                Some(own_gradient) => {
                    let mut ctx = ops::BackwardCtx {
                        node_name: &node.name,
                        kind: &node.kind,
                        input_index,
                        inputs: &inputs,
                        own_value: &node.value,
                        own_gradient,
                        layout,
                        frame,
                        grad_out: &mut grad_out,
                        scratch: &mut scratch,
                    };
                    ops::backward(&mut ctx)
                }
            }
        };
        self.nodes[child.0].gradient = Some(grad_out);
        self.nodes[id.0].scratch = scratch;
        result
    }

    /// Hands the node's scratch buffer back to the pool, if it holds one.
    pub(crate) fn release_scratch(&mut self, id: NodeId, pool: &mut BufferPool) {
        if let Some(s) = self.nodes[id.0].scratch.take() {
            pool.release(s);
        }
    }

    fn check_devices(&self, id: NodeId) -> Result<(), TempoGraphError> {
        let node = &self.nodes[id.0];
        if node.device != Device::Cpu {
            return Err(TempoGraphError::UnsupportedOperation(format!(
                "kernels for {:?} are not implemented (node '{}')",
                node.device, node.name
            )));
        }
        for &c in &node.inputs {
            let child = &self.nodes[c.0];
            if child.device != node.device {
                return Err(TempoGraphError::DeviceMismatch {
                    node: node.name.clone(),
                    operation: node.kind.name().to_string(),
                    expected: node.device,
                    actual: child.device,
                });
            }
        }
        Ok(())
    }
}
