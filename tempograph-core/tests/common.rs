use std::sync::Arc;

use tempograph_core::{CellFlags, ComputationGraph, Matrix, MinibatchLayout, NodeId, OpKind};

// Shared builders for the integration tests. Marked dead_code because each
// test file compiles as its own crate and uses only a subset.

/// The layout a packer would produce for one sequence per slot with the
/// given lengths: starts at timestep zero, ends per length, gaps after.
#[allow(dead_code)]
pub(crate) fn ragged_layout(lengths: &[usize]) -> Arc<MinibatchLayout> {
    let steps = lengths.iter().copied().max().unwrap_or(0);
    let mut layout = MinibatchLayout::new(steps, lengths.len());
    for (s, &len) in lengths.iter().enumerate() {
        layout.add_flags(0, s, CellFlags::SEQUENCE_START);
        layout.add_flags(len - 1, s, CellFlags::SEQUENCE_END);
        for t in len..steps {
            layout.add_flags(t, s, CellFlags::NO_INPUT);
        }
    }
    Arc::new(layout)
}

/// Adds an update-enabled parameter and sets its value column-major.
#[allow(dead_code)]
pub(crate) fn parameter_with_value(
    graph: &mut ComputationGraph,
    name: &str,
    rows: usize,
    cols: usize,
    data: Vec<f32>,
) -> NodeId {
    let id = graph
        .add_node(
            name,
            OpKind::Parameter {
                rows,
                cols,
                update_enabled: true,
            },
        )
        .unwrap();
    graph
        .set_parameter_value(id, Matrix::from_columns(rows, cols, data).unwrap())
        .unwrap();
    id
}

/// Feeds column-major sample data into an `Input` node.
#[allow(dead_code)]
pub(crate) fn feed_columns(graph: &mut ComputationGraph, id: NodeId, rows: usize, data: &[f32]) {
    let cols = data.len() / rows;
    graph
        .feed_input(id, Matrix::from_columns(rows, cols, data.to_vec()).unwrap())
        .unwrap();
}

/// Names of the given nodes, for order assertions.
#[allow(dead_code)]
pub(crate) fn names(graph: &ComputationGraph, ids: &[NodeId]) -> Vec<String> {
    ids.iter().map(|&id| graph.node(id).name().to_string()).collect()
}
