//! Element-wise product with column broadcast.

use crate::error::TempoGraphError;

use super::{broadcast_column, resolve_span, BackwardCtx, ForwardCtx};

/// `out = a * b` element-wise over the selected frame, with the same
/// `rows x 1` broadcast rule as the element-wise sum.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        ctx.out.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let a = ctx.inputs[0];
    let b = ctx.inputs[1];
    let rows = ctx.out.rows();
    for j in start..start + count {
        let a_col = broadcast_column(a, j);
        let b_col = broadcast_column(b, j);
        let out_col = ctx.out.column_mut(j);
        for r in 0..rows {
            out_col[r] = a_col[r] * b_col[r];
        }
    }
    Ok(())
}

/// `d_input += g * other` over the selected frame; a broadcast input
/// collects the sum of its per-column contributions.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let own_grad = ctx.own_gradient;
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        own_grad.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let other = ctx.inputs[1 - ctx.input_index];
    let rows = own_grad.rows();
    let collapse = ctx.grad_out.cols() == 1 && own_grad.cols() != 1;
    for j in start..start + count {
        let g_col = own_grad.column(j);
        let o_col = broadcast_column(other, j);
        let target = if collapse {
            ctx.grad_out.column_mut(0)
        } else {
            ctx.grad_out.column_mut(j)
        };
        for r in 0..rows {
            target[r] += g_col[r] * o_col[r];
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "element_times_test.rs"]
mod tests;
