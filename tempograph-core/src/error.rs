use crate::device::Device;
use thiserror::Error;

/// Broad failure classes for engine errors.
///
/// Every [`TempoGraphError`] variant maps onto exactly one category via
/// [`TempoGraphError::category`], so callers can route handling policy
/// without matching on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// The graph or a node was built, wired or configured incorrectly.
    Configuration,
    /// A structurally valid graph hit an inconsistency while running.
    Runtime,
    /// An internal contract of the engine itself was broken.
    LogicInvariant,
}

/// Custom error type for the Tempograph engine.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq/Clone for easier testing
pub enum TempoGraphError {
    #[error("Duplicate node name '{name}'")]
    DuplicateNodeName { name: String },

    #[error("No node named '{name}' in the graph")]
    NodeNotFound { name: String },

    #[error("Node '{node}' ({operation}) references input id {input_id} outside the arena of {arena_len} nodes")]
    DanglingInput {
        node: String,
        operation: String,
        input_id: usize,
        arena_len: usize,
    },

    #[error("Arity mismatch for '{node}' ({operation}): expected {expected} inputs, got {actual}")]
    ArityMismatch {
        node: String,
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("Shape mismatch for '{node}' ({operation}): expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        node: String,
        operation: String,
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Validation of '{node}' ({operation}) found input '{input}' with an empty buffer")]
    EmptyInput {
        node: String,
        operation: String,
        input: String,
    },

    #[error("Invalid wiring for '{node}' ({operation}): {message}")]
    InvalidWiring {
        node: String,
        operation: String,
        message: String,
    },

    #[error("Recurrent loop {loop_id} ({members:?}) contains no delay operator")]
    LoopWithoutDelay { loop_id: usize, members: Vec<String> },

    #[error("Recurrent loop {loop_id} has a same-timestep dependency cycle among {members:?}")]
    SameInstantCycle { loop_id: usize, members: Vec<String> },

    #[error("Invalid parameter initialization: {message}")]
    InvalidInitialization { message: String },

    #[error("Backward requires a scalar root: '{node}' has shape {shape:?}")]
    BackwardNonScalarRoot { node: String, shape: (usize, usize) },

    #[error("Matrix creation error: data length {data_len} does not fill {rows}x{cols}")]
    MatrixCreation {
        rows: usize,
        cols: usize,
        data_len: usize,
    },

    #[error("Layout mismatch for '{node}' ({operation}): layout spans {expected} columns, buffer has {actual}")]
    LayoutMismatch {
        node: String,
        operation: String,
        expected: usize,
        actual: usize,
    },

    #[error("No minibatch layout bound to '{node}' ({operation})")]
    LayoutMissing { node: String, operation: String },

    #[error("Frame {time} out of range for '{node}' ({operation}) with {steps} timesteps")]
    FrameOutOfRange {
        node: String,
        operation: String,
        time: usize,
        steps: usize,
    },

    #[error("Device mismatch for '{node}' ({operation}): expected {expected:?}, got {actual:?}")]
    DeviceMismatch {
        node: String,
        operation: String,
        expected: Device,
        actual: Device,
    },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Masking expects one column per layout cell: layout spans {expected} columns, buffer has {actual}")]
    MaskingSpan { expected: usize, actual: usize },

    #[error("'{node}' ({operation}) evaluates whole batches only and was given a partial frame")]
    WholeBatchOnly { node: String, operation: String },

    #[error("Gradient requested for '{node}' ({operation}) which does not carry gradients")]
    GradientNotEnabled { node: String, operation: String },

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl TempoGraphError {
    /// Maps this error onto its broad failure class.
    pub fn category(&self) -> ErrorCategory {
        use TempoGraphError::*;
        match self {
            DuplicateNodeName { .. }
            | NodeNotFound { .. }
            | DanglingInput { .. }
            | ArityMismatch { .. }
            | ShapeMismatch { .. }
            | EmptyInput { .. }
            | InvalidWiring { .. }
            | LoopWithoutDelay { .. }
            | SameInstantCycle { .. }
            | InvalidInitialization { .. }
            | BackwardNonScalarRoot { .. }
            | MatrixCreation { .. } => ErrorCategory::Configuration,
            LayoutMismatch { .. }
            | LayoutMissing { .. }
            | FrameOutOfRange { .. }
            | DeviceMismatch { .. }
            | UnsupportedOperation(_)
            | Serialization(_) => ErrorCategory::Runtime,
            MaskingSpan { .. }
            | WholeBatchOnly { .. }
            | GradientNotEnabled { .. }
            | InternalError(_) => ErrorCategory::LogicInvariant,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_mapping() {
        let config = TempoGraphError::ArityMismatch {
            node: "h".to_string(),
            operation: "Plus".to_string(),
            expected: 2,
            actual: 1,
        };
        assert_eq!(config.category(), ErrorCategory::Configuration);

        let runtime = TempoGraphError::LayoutMismatch {
            node: "x".to_string(),
            operation: "Input".to_string(),
            expected: 8,
            actual: 6,
        };
        assert_eq!(runtime.category(), ErrorCategory::Runtime);

        let logic = TempoGraphError::WholeBatchOnly {
            node: "crit".to_string(),
            operation: "SumOfSquares".to_string(),
        };
        assert_eq!(logic.category(), ErrorCategory::LogicInvariant);
    }

    #[test]
    fn test_messages_carry_context() {
        let err = TempoGraphError::ShapeMismatch {
            node: "z".to_string(),
            operation: "Times".to_string(),
            expected: (3, 4),
            actual: (5, 4),
        };
        let msg = err.to_string();
        assert!(msg.contains("'z'"));
        assert!(msg.contains("Times"));
        assert!(msg.contains("(3, 4)"));
        assert!(msg.contains("(5, 4)"));
    }
}
