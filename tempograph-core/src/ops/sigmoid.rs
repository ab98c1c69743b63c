//! Element-wise logistic activation.

use crate::error::TempoGraphError;

use super::{resolve_span, BackwardCtx, ForwardCtx};

/// `out = 1 / (1 + exp(-x))` over the selected frame.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        ctx.out.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let x = ctx.inputs[0];
    let rows = ctx.out.rows();
    for j in start..start + count {
        let x_col = x.column(j);
        let out_col = ctx.out.column_mut(j);
        for r in 0..rows {
            out_col[r] = 1.0 / (1.0 + (-x_col[r]).exp());
        }
    }
    Ok(())
}

/// `dx += g * y * (1 - y)`, staging the derivative through the pooled
/// scratch buffer so the incoming gradient is read only once per cell.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let own_value = ctx.own_value;
    let own_grad = ctx.own_gradient;
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        own_grad.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let scratch = ctx.scratch.as_mut().ok_or_else(|| {
        TempoGraphError::InternalError(format!(
            "sigmoid backward for '{}' without a scratch buffer",
            ctx.node_name
        ))
    })?;
    let rows = own_grad.rows();
    for j in start..start + count {
        let v_col = own_value.column(j);
        let s_col = scratch.column_mut(j);
        for r in 0..rows {
            let y = v_col[r];
            s_col[r] = y * (1.0 - y);
        }
    }
    for j in start..start + count {
        let g_col = own_grad.column(j);
        let s_col = scratch.column(j);
        let target = ctx.grad_out.column_mut(j);
        for r in 0..rows {
            target[r] += g_col[r] * s_col[r];
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "sigmoid_test.rs"]
mod tests;
