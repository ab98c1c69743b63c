//! Whole-batch sum-of-squared-differences criterion.

use crate::error::TempoGraphError;
use crate::layout::{mask_columns_to, FrameRange};

use super::{BackwardCtx, ForwardCtx, ShapeInfo};

/// Output is always scalar; the two operands must agree once settled.
pub(super) fn infer_shape(
    node_name: &str,
    inputs: &[ShapeInfo<'_>],
) -> Result<(usize, usize), TempoGraphError> {
    let (a, b) = (inputs[0], inputs[1]);
    if a.rows != 0 && b.rows != 0 && a.rows != b.rows {
        return Err(TempoGraphError::ShapeMismatch {
            node: node_name.to_string(),
            operation: "SumOfSquares".to_string(),
            expected: (a.rows, a.cols),
            actual: (b.rows, b.cols),
        });
    }
    if a.cols != 0 && b.cols != 0 && a.cols != b.cols {
        return Err(TempoGraphError::ShapeMismatch {
            node: node_name.to_string(),
            operation: "SumOfSquares".to_string(),
            expected: (a.rows, a.cols),
            actual: (b.rows, b.cols),
        });
    }
    Ok((1, 1))
}

/// `v = 0.5 * sum((a - b)^2)` over the whole minibatch. The difference is
/// staged in the scratch buffer and its gap columns zeroed there, which is
/// how this criterion keeps padding out of the objective despite opting out
/// of scheduler masking.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    let a = ctx.inputs[0];
    let b = ctx.inputs[1];
    if a.shape() != b.shape() {
        return Err(TempoGraphError::ShapeMismatch {
            node: ctx.node_name.to_string(),
            operation: ctx.kind.name().to_string(),
            expected: a.shape(),
            actual: b.shape(),
        });
    }
    let scratch = ctx.scratch.as_mut().ok_or_else(|| {
        TempoGraphError::InternalError(format!(
            "criterion forward for '{}' without a scratch buffer",
            ctx.node_name
        ))
    })?;
    if scratch.shape() != a.shape() {
        return Err(TempoGraphError::InternalError(format!(
            "criterion scratch for '{}' is {:?}, operands are {:?}",
            ctx.node_name,
            scratch.shape(),
            a.shape()
        )));
    }
    let rows = a.rows();
    for j in 0..a.cols() {
        let a_col = a.column(j);
        let b_col = b.column(j);
        let s_col = scratch.column_mut(j);
        for r in 0..rows {
            s_col[r] = a_col[r] - b_col[r];
        }
    }
    if let Some(layout) = ctx.layout {
        mask_columns_to(scratch, layout, FrameRange::all(), 0.0)?;
    }
    let total: f32 = scratch.data().iter().map(|v| v * v).sum();
    if ctx.out.shape() != (1, 1) {
        ctx.out.resize(1, 1);
    }
    ctx.out.set(0, 0, 0.5 * total);
    Ok(())
}

/// `d/da = g * (a - b)` and `d/db = -g * (a - b)`, reusing the masked
/// difference staged by the forward pass.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let scratch = ctx.scratch.as_ref().ok_or_else(|| {
        TempoGraphError::InternalError(format!(
            "criterion backward for '{}' before its forward pass",
            ctx.node_name
        ))
    })?;
    if ctx.grad_out.shape() != scratch.shape() {
        return Err(TempoGraphError::InternalError(format!(
            "criterion gradient for '{}' is {:?}, staged difference is {:?}",
            ctx.node_name,
            ctx.grad_out.shape(),
            scratch.shape()
        )));
    }
    let scale = ctx.own_gradient.at(0, 0) * if ctx.input_index == 0 { 1.0 } else { -1.0 };
    for (dst, src) in ctx.grad_out.data_mut().iter_mut().zip(scratch.data().iter()) {
        *dst += scale * src;
    }
    Ok(())
}

#[cfg(test)]
#[path = "sum_of_squares_test.rs"]
mod tests;
