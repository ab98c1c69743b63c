//! Leaf kinds: learnable parameters and externally fed inputs.

use rand::distributions::{Distribution, Uniform};
use rand::Rng;
use rand_distr::Normal;

use crate::error::TempoGraphError;
use crate::matrix::Matrix;

use super::{ForwardCtx, OpKind};

/// Forward pass of the leaf kinds.
///
/// A `Parameter` keeps its persistent value untouched. An `Input` holds
/// whatever was fed for the current minibatch; evaluation only verifies
/// that the fed data spans the bound layout.
pub(super) fn forward(ctx: &mut ForwardCtx<'_>) -> Result<(), TempoGraphError> {
    match ctx.kind {
        OpKind::Parameter { .. } => Ok(()),
        OpKind::Input { rows } => {
            if ctx.out.rows() != *rows {
                return Err(TempoGraphError::ShapeMismatch {
                    node: ctx.node_name.to_string(),
                    operation: ctx.kind.name().to_string(),
                    expected: (*rows, ctx.out.cols()),
                    actual: ctx.out.shape(),
                });
            }
            let expected_cols = match ctx.layout {
                Some(layout) => layout.columns(),
                None => ctx.out.cols(),
            };
            if ctx.out.cols() != expected_cols {
                return Err(TempoGraphError::LayoutMismatch {
                    node: ctx.node_name.to_string(),
                    operation: ctx.kind.name().to_string(),
                    expected: expected_cols,
                    actual: ctx.out.cols(),
                });
            }
            Ok(())
        }
        _ => Err(TempoGraphError::InternalError(format!(
            "leaf forward dispatched for {}",
            ctx.kind.name()
        ))),
    }
}

/// Fills `value` with samples drawn uniformly from `[low, high)`.
///
/// # Errors
///
/// Returns [`TempoGraphError::InvalidInitialization`] when the interval is
/// empty or a bound is not finite.
pub fn init_uniform<R: Rng>(
    value: &mut Matrix,
    low: f32,
    high: f32,
    rng: &mut R,
) -> Result<(), TempoGraphError> {
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(TempoGraphError::InvalidInitialization {
            message: format!("uniform range [{low}, {high}) is empty or not finite"),
        });
    }
    let dist = Uniform::new(low, high);
    for v in value.data_mut() {
        *v = dist.sample(rng);
    }
    Ok(())
}

/// Fills `value` with samples drawn from `N(mean, std)`.
///
/// # Errors
///
/// Returns [`TempoGraphError::InvalidInitialization`] when `std` is
/// negative or NaN.
pub fn init_gaussian<R: Rng>(
    value: &mut Matrix,
    mean: f32,
    std: f32,
    rng: &mut R,
) -> Result<(), TempoGraphError> {
    let dist = Normal::new(mean, std).map_err(|e| TempoGraphError::InvalidInitialization {
        message: format!("gaussian({mean}, {std}): {e}"),
    })?;
    for v in value.data_mut() {
        *v = dist.sample(rng);
    }
    Ok(())
}

#[cfg(test)]
#[path = "leaf_test.rs"]
mod tests;
