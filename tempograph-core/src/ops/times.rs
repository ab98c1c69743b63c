//! Matrix product against per-column samples.

use crate::error::TempoGraphError;

use super::{resolve_span, BackwardCtx, ForwardCtx, ShapeInfo};

/// `(m x k) * (k x n) -> (m x n)`. Unsettled dimensions pass through until
/// validation's final pass.
pub(super) fn infer_shape(
    node_name: &str,
    inputs: &[ShapeInfo<'_>],
) -> Result<(usize, usize), TempoGraphError> {
    let (a, b) = (inputs[0], inputs[1]);
    if a.cols != 0 && b.rows != 0 && a.cols != b.rows {
        return Err(TempoGraphError::ShapeMismatch {
            node: node_name.to_string(),
            operation: "Times".to_string(),
            expected: (a.rows, a.cols),
            actual: (b.rows, b.cols),
        });
    }
    Ok((a.rows, b.cols))
}

/// `out[:, j] = left * right[:, j]` for each selected column. The left
/// operand is read whole regardless of the frame; only sample columns move
/// with time.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        ctx.out.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    let left = ctx.inputs[0];
    let right = ctx.inputs[1];
    let (m, k) = left.shape();
    for j in start..start + count {
        let r_col = right.column(j);
        let out_col = ctx.out.column_mut(j);
        for row in 0..m {
            let mut acc = 0.0;
            for kk in 0..k {
                acc += left.at(row, kk) * r_col[kk];
            }
            out_col[row] = acc;
        }
    }
    Ok(())
}

/// Left gradient: `dL += g[:, j] * right[:, j]^T` summed over the selected
/// columns. Right gradient: `dR[:, j] += left^T * g[:, j]`.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let own_grad = ctx.own_gradient;
    let (start, count) = resolve_span(
        ctx.frame,
        ctx.layout,
        own_grad.cols(),
        ctx.node_name,
        ctx.kind.name(),
    )?;
    match ctx.input_index {
        0 => {
            let right = ctx.inputs[1];
            let m = own_grad.rows();
            let k = right.rows();
            for j in start..start + count {
                let g_col = own_grad.column(j);
                let r_col = right.column(j);
                for kk in 0..k {
                    let r_v = r_col[kk];
                    let target = ctx.grad_out.column_mut(kk);
                    for row in 0..m {
                        target[row] += g_col[row] * r_v;
                    }
                }
            }
            Ok(())
        }
        1 => {
            let left = ctx.inputs[0];
            let (m, k) = left.shape();
            for j in start..start + count {
                let g_col = own_grad.column(j);
                let target = ctx.grad_out.column_mut(j);
                for kk in 0..k {
                    let mut acc = 0.0;
                    for row in 0..m {
                        acc += left.at(row, kk) * g_col[row];
                    }
                    target[kk] += acc;
                }
            }
            Ok(())
        }
        other => Err(TempoGraphError::InternalError(format!(
            "Times node '{}' asked for gradient of input {other}",
            ctx.node_name
        ))),
    }
}

#[cfg(test)]
#[path = "times_test.rs"]
mod tests;
