use std::sync::Arc;

use crate::device::Device;
use crate::layout::MinibatchLayout;
use crate::matrix::Matrix;
use crate::ops::OpKind;

/// Stable handle to a node in a [`crate::graph::ComputationGraph`] arena.
///
/// Handles are plain indices: the arena never removes individual nodes, so a
/// `NodeId` stays valid for the lifetime of its graph and can be stored in
/// input lists and plans without ownership concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Scope selection for [`crate::graph::ComputationGraph::clone_node`].
///
/// The two scopes are independent: `VALUE` copies the value-bearing state of
/// the node (device, buffers, gradient requirement), `LINKS` copies its
/// input wiring, and `ALL` combines both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CopyFlags(u8);

impl CopyFlags {
    /// Copy only the operator kind: a fresh, unwired node of the same
    /// operation.
    pub const NONE: CopyFlags = CopyFlags(0);
    pub const VALUE: CopyFlags = CopyFlags(1);
    pub const LINKS: CopyFlags = CopyFlags(1 << 1);
    pub const ALL: CopyFlags = CopyFlags(Self::VALUE.0 | Self::LINKS.0);

    pub fn contains(self, other: CopyFlags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for CopyFlags {
    type Output = CopyFlags;

    fn bitor(self, rhs: CopyFlags) -> CopyFlags {
        CopyFlags(self.0 | rhs.0)
    }
}

/// Traversal bookkeeping used by ordering and loop detection.
///
/// Cleared wholesale before every ordering run so repeated runs on an
/// unchanged graph reproduce identical results.
#[derive(Debug, Clone, Default)]
pub(crate) struct TraversalState {
    /// Position in the depth-first postorder of the last enumeration.
    pub visit_order: usize,
    pub visited: bool,
    /// Tarjan discovery index; `None` before the node is reached.
    pub scc_index: Option<usize>,
    pub scc_low_link: usize,
    pub on_stack: bool,
    /// Identifier of the recurrent loop this node belongs to, if any.
    pub loop_id: Option<usize>,
}

/// One node of the computation graph.
///
/// A node owns its value buffer, its optional gradient buffer (allocated
/// exactly when `needs_gradient` is set), an optional pool-managed scratch
/// buffer, and a shared handle to the layout of the currently bound
/// minibatch. Inputs are arena handles; the node does not own its children.
#[derive(Debug)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) kind: OpKind,
    pub(crate) device: Device,
    pub(crate) inputs: Vec<NodeId>,
    pub(crate) value: Matrix,
    pub(crate) gradient: Option<Matrix>,
    pub(crate) scratch: Option<Matrix>,
    pub(crate) layout: Option<Arc<MinibatchLayout>>,
    pub(crate) needs_gradient: bool,
    /// Last-recompute stamp, drawn from the graph's monotonic counter.
    pub(crate) stamp: u64,
    pub(crate) traversal: TraversalState,
}

impl Node {
    pub(crate) fn new(name: String, kind: OpKind, stamp: u64) -> Self {
        let value = match &kind {
            OpKind::Parameter { rows, cols, .. } => Matrix::zeros(*rows, *cols),
            OpKind::Input { rows } => Matrix::zeros(*rows, 0),
            _ => Matrix::default(),
        };
        Node {
            name,
            kind,
            device: Device::Cpu,
            inputs: Vec::new(),
            value,
            gradient: None,
            scratch: None,
            layout: None,
            needs_gradient: false,
            stamp,
            traversal: TraversalState::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn value(&self) -> &Matrix {
        &self.value
    }

    /// Gradient buffer; present exactly when [`Self::needs_gradient`] holds.
    pub fn gradient(&self) -> Option<&Matrix> {
        self.gradient.as_ref()
    }

    pub fn layout(&self) -> Option<&Arc<MinibatchLayout>> {
        self.layout.as_ref()
    }

    pub fn needs_gradient(&self) -> bool {
        self.needs_gradient
    }

    pub fn stamp(&self) -> u64 {
        self.stamp
    }

    /// Loop membership assigned by the last loop detection, if any.
    pub fn loop_id(&self) -> Option<usize> {
        self.traversal.loop_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_copy_flags_scopes() {
        assert!(CopyFlags::ALL.contains(CopyFlags::VALUE));
        assert!(CopyFlags::ALL.contains(CopyFlags::LINKS));
        assert!(!CopyFlags::VALUE.contains(CopyFlags::LINKS));
        assert_eq!(CopyFlags::VALUE | CopyFlags::LINKS, CopyFlags::ALL);
    }

    #[test]
    fn test_leaf_nodes_size_their_values() {
        let p = Node::new(
            "w".to_string(),
            OpKind::Parameter {
                rows: 3,
                cols: 2,
                update_enabled: true,
            },
            0,
        );
        assert_eq!(p.value().shape(), (3, 2));

        let x = Node::new("x".to_string(), OpKind::Input { rows: 4 }, 1);
        assert_eq!(x.value().shape(), (4, 0));

        let op = Node::new("sum".to_string(), OpKind::Plus, 2);
        assert!(op.value().is_empty());
    }
}
