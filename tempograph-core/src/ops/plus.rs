//! Element-wise sum with column broadcast.

use crate::error::TempoGraphError;

use super::{broadcast_column, resolve_span, BackwardCtx, ForwardCtx};

/// `out = a + b` over the selected frame; a `rows x 1` operand is added to
/// every selected column.
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
            out_col[r] = a_col[r] + b_col[r];
        }
    }
    Ok(())
}

/// Adds the incoming gradient into the selected input's gradient. A
/// broadcast `rows x 1` input collects the sum over the selected columns.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let own_grad = ctx.own_gradient;
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        own_grad.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let rows = own_grad.rows();
    let collapse = ctx.grad_out.cols() == 1 && own_grad.cols() != 1;
    for j in start..start + count {
        let g_col = own_grad.column(j);
        let target = if collapse {
            ctx.grad_out.column_mut(0)
        } else {
            ctx.grad_out.column_mut(j)
        };
        for r in 0..rows {
            target[r] += g_col[r];
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "plus_test.rs"]
mod tests;
