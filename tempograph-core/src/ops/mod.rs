//! Operator kinds and their kernels.
//!
//! Every node carries one [`OpKind`]; capability queries on the tag replace
//! per-operator subclassing. Each operator family lives in its own file with
//! its shape rule, forward kernel and input-gradient kernel, all
//! frame-addressed. The graph dispatches through [`forward`] and
//! [`backward`] here.

mod element_times;
mod leaf;
mod past_value;
mod plus;
mod sigmoid;
mod sum_of_squares;
mod times;

pub use leaf::{init_gaussian, init_uniform};

use crate::error::TempoGraphError;
use crate::layout::{FrameRange, MinibatchLayout};
use crate::matrix::Matrix;

/// Tagged operator kind of a node.
#[derive(Debug, Clone, PartialEq)]
pub enum OpKind {
    /// Learnable leaf with a persistent `rows x cols` value.
    Parameter {
        rows: usize,
        cols: usize,
        /// Cleared to freeze the parameter: no gradient is kept for it.
        update_enabled: bool,
    },
    /// Externally fed leaf; `rows` is fixed, columns track the bound layout.
    Input { rows: usize },
    /// Element-wise sum, with column broadcast for `rows x 1` operands.
    Plus,
    /// Element-wise product, with the same broadcast rule as `Plus`.
    ElementTimes,
    /// Matrix product `left * right`; the left operand is a layout-free
    /// full matrix, the right is addressed per column.
    Times,
    /// Element-wise logistic function.
    Sigmoid,
    /// Reads its input `delay` timesteps in the past; emits
    /// `initial_activation` wherever the lookback crosses a sequence start.
    PastValue { delay: usize, initial_activation: f32 },
    /// Whole-batch sum-of-squared-differences criterion with a scalar
    /// output, `0.5 * sum((a - b)^2)` over the valid cells.
    SumOfSquares,
}

impl OpKind {
    /// Operation tag used in logs, error messages and persisted state.
    pub fn name(&self) -> &'static str {
        match self {
            OpKind::Parameter { .. } => "Parameter",
            OpKind::Input { .. } => "Input",
            OpKind::Plus => "Plus",
            OpKind::ElementTimes => "ElementTimes",
            OpKind::Times => "Times",
            OpKind::Sigmoid => "Sigmoid",
            OpKind::PastValue { .. } => "PastValue",
            OpKind::SumOfSquares => "SumOfSquares",
        }
    }

    /// Number of inputs the operator expects; checked when wiring.
    pub fn arity(&self) -> usize {
        match self {
            OpKind::Parameter { .. } | OpKind::Input { .. } => 0,
            OpKind::Sigmoid | OpKind::PastValue { .. } => 1,
            OpKind::Plus | OpKind::ElementTimes | OpKind::Times | OpKind::SumOfSquares => 2,
        }
    }

    /// True for operators whose semantics span the whole minibatch. The
    /// scheduler refuses to hand them a partial frame and rejects them as
    /// recurrent loop members.
    pub fn whole_batch_only(&self) -> bool {
        matches!(self, OpKind::SumOfSquares)
    }

    /// True when the operator reads its input across timesteps: inside a
    /// recurrent loop its input edge counts as delayed, never as a
    /// same-instant dependency.
    pub fn is_delay(&self) -> bool {
        matches!(self, OpKind::PastValue { .. })
    }

    pub fn is_learnable(&self) -> bool {
        matches!(self, OpKind::Parameter { .. })
    }

    /// Operators that opt out of scheduler-applied gap masking and keep
    /// padding out of their results themselves.
    ///
    /// The claim is a documented precondition of the operator, not a
    /// verified one: the engine trusts it and never checks that gap columns
    /// were actually handled.
    pub fn handles_own_masking(&self) -> bool {
        matches!(self, OpKind::SumOfSquares)
    }

    /// Whether this node's buffers track the bound minibatch layout.
    /// Layout-free nodes (parameters, scalar criteria) are neither resized
    /// per minibatch nor masked.
    pub fn carries_layout(&self) -> bool {
        !matches!(self, OpKind::Parameter { .. } | OpKind::SumOfSquares)
    }

    /// Scratch buffer shape the operator wants across a forward/backward
    /// sweep pair, if any.
    pub(crate) fn scratch_shape(
        &self,
        value: (usize, usize),
        first_input: Option<(usize, usize)>,
    ) -> Option<(usize, usize)> {
        match self {
            OpKind::Sigmoid => Some(value),
            OpKind::SumOfSquares => first_input,
            _ => None,
        }
    }
}

/// Shape facts about one input, collected by validation.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShapeInfo<'a> {
    pub name: &'a str,
    pub rows: usize,
    pub cols: usize,
    pub has_layout: bool,
}

/// Inputs handed to a forward kernel.
pub(crate) struct ForwardCtx<'a> {
    pub node_name: &'a str,
    pub kind: &'a OpKind,
    /// Value buffers of the node's inputs, in wiring order.
    pub inputs: &'a [&'a Matrix],
    /// The node's own layout, or its first input's when the node itself is
    /// layout-free (criteria read layout-bound inputs).
    pub layout: Option<&'a MinibatchLayout>,
    pub frame: FrameRange,
    pub out: &'a mut Matrix,
    pub scratch: &'a mut Option<Matrix>,
}

/// Inputs handed to an input-gradient kernel.
pub(crate) struct BackwardCtx<'a> {
    pub node_name: &'a str,
    pub kind: &'a OpKind,
    pub input_index: usize,
    pub inputs: &'a [&'a Matrix],
    pub own_value: &'a Matrix,
    pub own_gradient: &'a Matrix,
    pub layout: Option<&'a MinibatchLayout>,
    pub frame: FrameRange,
    /// Gradient buffer of the selected input. Kernels add, never overwrite:
    /// the buffer is shared between every consumer of that input.
    pub grad_out: &'a mut Matrix,
    pub scratch: &'a mut Option<Matrix>,
}

/// Runs the forward kernel for the node's kind over the selected frame.
pub(crate) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    if ctx.kind.whole_batch_only() && !ctx.frame.is_whole_batch() {
        return Err(TempoGraphError::WholeBatchOnly {
            node: ctx.node_name.to_string(),
            operation: ctx.kind.name().to_string(),
        });
    }
    match ctx.kind {
        OpKind::Parameter { .. } | OpKind::Input { .. } => leaf::forward(ctx),
        OpKind::Plus => plus::forward(ctx),
        OpKind::ElementTimes => element_times::forward(ctx),
        OpKind::Times => times::forward(ctx),
        OpKind::Sigmoid => sigmoid::forward(ctx),
        OpKind::PastValue { .. } => past_value::forward(ctx),
        OpKind::SumOfSquares => sum_of_squares::forward(ctx),
    }
}

/// Adds this node's contribution for one input into that input's gradient.
pub(crate) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    if ctx.kind.whole_batch_only() && !ctx.frame.is_whole_batch() {
        return Err(TempoGraphError::WholeBatchOnly {
            node: ctx.node_name.to_string(),
            operation: ctx.kind.name().to_string(),
        });
    }
    match ctx.kind {
        OpKind::Parameter { .. } | OpKind::Input { .. } => Err(TempoGraphError::InternalError(
            format!("gradient dispatch reached leaf '{}'", ctx.node_name),
        )),
        OpKind::Plus => plus::backward(ctx),
        OpKind::ElementTimes => element_times::backward(ctx),
        OpKind::Times => times::backward(ctx),
        OpKind::Sigmoid => sigmoid::backward(ctx),
        OpKind::PastValue { .. } => past_value::backward(ctx),
        OpKind::SumOfSquares => sum_of_squares::backward(ctx),
    }
}

/// Output shape rule for the kind. Zero dimensions mean "not settled yet"
/// during iterative validation and are tolerated; genuine inconsistencies
/// between settled dimensions fail immediately.
pub(crate) fn infer_shape(
    kind: &OpKind,
    node_name: &str,
    inputs: &[ShapeInfo<'_>],
    current: (usize, usize),
) -> Result<(usize, usize), TempoGraphError> {
    match kind {
        OpKind::Parameter { rows, cols, .. } => Ok((*rows, *cols)),
        OpKind::Input { rows } => Ok((*rows, current.1)),
        OpKind::Plus | OpKind::ElementTimes => binary_zip_shape(kind, node_name, inputs),
        OpKind::Times => times::infer_shape(node_name, inputs),
        OpKind::Sigmoid | OpKind::PastValue { .. } => Ok((inputs[0].rows, inputs[0].cols)),
        OpKind::SumOfSquares => sum_of_squares::infer_shape(node_name, inputs),
    }
}

/// Final-pass checks for one node: empty-input rejection plus per-kind
/// wiring rules that only make sense once shapes have settled.
pub(crate) fn validate_final(
    kind: &OpKind,
    node_name: &str,
    inputs: &[ShapeInfo<'_>],
) -> Result<(), TempoGraphError> {
    for inp in inputs {
        // A zero-column buffer is legitimate only while the input carries a
        // layout and no minibatch has been bound yet.
        if inp.rows == 0 || (inp.cols == 0 && !inp.has_layout) {
            return Err(TempoGraphError::EmptyInput {
                node: node_name.to_string(),
                operation: kind.name().to_string(),
                input: inp.name.to_string(),
            });
        }
    }
    match kind {
        OpKind::Times => {
            if inputs[0].has_layout {
                return Err(TempoGraphError::InvalidWiring {
                    node: node_name.to_string(),
                    operation: kind.name().to_string(),
                    message: "left operand must be a layout-free full matrix".to_string(),
                });
            }
            Ok(())
        }
        OpKind::PastValue { delay, .. } => {
            if *delay == 0 {
                return Err(TempoGraphError::InvalidWiring {
                    node: node_name.to_string(),
                    operation: kind.name().to_string(),
                    message: "delay must be at least one step".to_string(),
                });
            }
            if !inputs[0].has_layout {
                return Err(TempoGraphError::InvalidWiring {
                    node: node_name.to_string(),
                    operation: kind.name().to_string(),
                    message: "delayed input must carry the minibatch layout".to_string(),
                });
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

/// Shared shape rule of the element-wise binary operators: rows must agree,
/// columns must agree or one side is a broadcast `rows x 1` vector.
fn binary_zip_shape(
    kind: &OpKind,
    node_name: &str,
    inputs: &[ShapeInfo<'_>],
) -> Result<(usize, usize), TempoGraphError> {
    let (a, b) = (inputs[0], inputs[1]);
    if a.rows != 0 && b.rows != 0 && a.rows != b.rows {
        return Err(TempoGraphError::ShapeMismatch {
            node: node_name.to_string(),
            operation: kind.name().to_string(),
            expected: (a.rows, a.cols),
            actual: (b.rows, b.cols),
        });
    }
    let rows = if a.rows != 0 { a.rows } else { b.rows };
    let cols = match (a.cols, b.cols) {
        (0, c) | (c, 0) => c,
        (1, c) | (c, 1) => c,
        (c1, c2) if c1 == c2 => c1,
        _ => {
            return Err(TempoGraphError::ShapeMismatch {
                node: node_name.to_string(),
                operation: kind.name().to_string(),
                expected: (a.rows, a.cols),
                actual: (b.rows, b.cols),
            })
        }
    };
    Ok((rows, cols))
}

/// Resolves a frame selection to a contiguous `(first_column, count)` range
/// of a `cols`-wide buffer.
pub(crate) fn resolve_span(
    frame: FrameRange,
    layout: Option<&MinibatchLayout>,
    cols: usize,
    node_name: &str,
    op: &str,
) -> Result<(usize, usize), TempoGraphError> {
    if frame.is_whole_batch() {
        return Ok((0, cols));
    }
    let layout = layout.ok_or_else(|| TempoGraphError::LayoutMissing {
        node: node_name.to_string(),
        operation: op.to_string(),
    })?;
    frame
        .column_span(layout)
        .ok_or_else(|| TempoGraphError::FrameOutOfRange {
            node: node_name.to_string(),
            operation: op.to_string(),
            time: frame.time().unwrap_or(0),
            steps: layout.steps(),
        })
}

/// Column view of `m` for output column `j`, honoring `rows x 1` broadcast.
pub(crate) fn broadcast_column(m: &Matrix, j: usize) -> &[f32] {
    if m.cols() == 1 {
        m.column(0)
    } else {
        m.column(j)
    }
}
