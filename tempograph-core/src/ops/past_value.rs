//! Time-delayed read of a layout-bound input.

use crate::error::TempoGraphError;
use crate::layout::{CellFlags, MinibatchLayout};

use super::{BackwardCtx, ForwardCtx, OpKind};

/// The delayed read at `(t, s)` crosses a boundary when it would leave the
/// minibatch window, or when a sequence start sits inside the lookback: the
/// sample at `t - delay` then belongs to a different sequence.
fn crosses_boundary(layout: &MinibatchLayout, t: usize, s: usize, delay: usize) -> bool {
    if t < delay {
        return true;
    }
    for u in (t - delay + 1)..=t {
        if layout.flags(u, s).contains(CellFlags::SEQUENCE_START) {
            return true;
        }
    }
    false
}

fn unpack(kind: &OpKind, node_name: &str) -> Result<(usize, f32), TempoGraphError> {
    match kind {
        OpKind::PastValue {
            delay,
            initial_activation,
        } => Ok((*delay, *initial_activation)),
        _ => Err(TempoGraphError::InternalError(format!(
            "delay kernel dispatched for '{node_name}' of kind {}",
            kind.name()
        ))),
    }
}

fn selected_times(
    frame: crate::layout::FrameRange,
    layout: &MinibatchLayout,
    node_name: &str,
    op: &str,
) -> Result<std::ops::Range<usize>, TempoGraphError> {
    match frame.time() {
        None => Ok(0..layout.steps()),
        Some(t) if t < layout.steps() => Ok(t..t + 1),
        Some(t) => Err(TempoGraphError::FrameOutOfRange {
            node: node_name.to_string(),
            operation: op.to_string(),
            time: t,
            steps: layout.steps(),
        }),
    }
}

/// Copies the input `delay` steps back along each slot. Where the lookback
/// crosses a boundary the configured initial activation is emitted instead,
/// so the first frames of every sequence see a well-defined history.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    let (delay, initial) = unpack(ctx.kind, ctx.node_name)?;
    let layout = ctx.layout.ok_or_else(|| TempoGraphError::LayoutMissing {
        node: ctx.node_name.to_string(),
        operation: ctx.kind.name().to_string(),
    })?;
    if ctx.out.cols() != layout.columns() {
        return Err(TempoGraphError::LayoutMismatch {
            node: ctx.node_name.to_string(),
            operation: ctx.kind.name().to_string(),
            expected: layout.columns(),
            actual: ctx.out.cols(),
        });
    }
    let input = ctx.inputs[0];
    let times = selected_times(ctx.frame, layout, ctx.node_name, ctx.kind.name())?;
    for t in times {
        for s in 0..layout.slots() {
            if let Some(only) = ctx.frame.slot() {
                if s != only {
                    continue;
                }
            }
            let out_col = ctx.out.column_mut(layout.column_of(t, s));
            if crosses_boundary(layout, t, s, delay) {
                for v in out_col {
                    *v = initial;
                }
            } else {
                out_col.copy_from_slice(input.column(layout.column_of(t - delay, s)));
            }
        }
    }
    Ok(())
}

/// Routes the gradient at `(t, s)` back to `(t - delay, s)`. Boundary
/// frames read the constant initial activation and propagate nothing.
pub(super) fn backward(ctx: &mut BackwardCtx<'_>) -> Result<(), TempoGraphError> {
    let (delay, _) = unpack(ctx.kind, ctx.node_name)?;
    let layout = ctx.layout.ok_or_else(|| TempoGraphError::LayoutMissing {
        node: ctx.node_name.to_string(),
        operation: ctx.kind.name().to_string(),
    })?;
    let own_grad = ctx.own_gradient;
    let rows = own_grad.rows();
    let times = selected_times(ctx.frame, layout, ctx.node_name, ctx.kind.name())?;
    for t in times {
        for s in 0..layout.slots() {
            if let Some(only) = ctx.frame.slot() {
                if s != only {
                    continue;
                }
            }
            if crosses_boundary(layout, t, s, delay) {
                continue;
            }
            let g_col = own_grad.column(layout.column_of(t, s));
            let target = ctx.grad_out.column_mut(layout.column_of(t - delay, s));
            for r in 0..rows {
                target[r] += g_col[r];
            }
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "past_value_test.rs"]
mod tests;
