//! tempograph-core: a computation graph engine for training on
//! variable-length sequence minibatches.
//!
//! Networks are directed graphs of operator nodes over column-major `f32`
//! matrices in which every column is one timestep of one sequence.
//! Minibatches pack several sequences side by side in a
//! [`layout::MinibatchLayout`] grid; recurrent wiring is expressed with
//! delay operators and detected as loops the scheduler drives one timestep
//! at a time.
//!
//! A typical session builds a graph, validates it against a set of roots,
//! compiles a [`graph::SweepPlan`], then alternates feeding minibatches
//! with forward and backward sweeps:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tempograph_core::{
//!     BufferPool, ComputationGraph, Matrix, MinibatchLayout, OpKind, Scheduler,
//! };
//!
//! # fn main() -> Result<(), tempograph_core::TempoGraphError> {
//! let mut graph = ComputationGraph::new();
//! let w = graph.add_node(
//!     "w",
//!     OpKind::Parameter { rows: 1, cols: 3, update_enabled: true },
//! )?;
//! let x = graph.add_node("x", OpKind::Input { rows: 3 })?;
//! let y = graph.add_node("y", OpKind::Input { rows: 1 })?;
//! let proj = graph.add_op("proj", OpKind::Times, &[w, x])?;
//! let loss = graph.add_op("loss", OpKind::SumOfSquares, &[proj, y])?;
//!
//! graph.validate(&[loss])?;
//! let plan = graph.compile_plan(&[loss])?;
//!
//! let layout = Arc::new(MinibatchLayout::new(4, 1));
//! graph.bind_minibatch(&layout);
//! graph.feed_input(x, Matrix::zeros(3, 4))?;
//! graph.feed_input(y, Matrix::zeros(1, 4))?;
//!
//! let scheduler = Scheduler::new();
//! let mut pool = BufferPool::new();
//! scheduler.forward(&mut graph, &plan, &mut pool)?;
//! scheduler.backward(&mut graph, &plan, loss, &mut pool)?;
//! # Ok(())
//! # }
//! ```

pub mod device;
pub mod error;
pub mod graph;
pub mod layout;
pub mod matrix;
pub mod node;
pub mod ops;
pub mod pool;
pub mod serialize;
pub mod utils;

pub use device::Device;
pub use error::{ErrorCategory, TempoGraphError};
pub use graph::{ComputationGraph, PlanStep, RecurrentLoop, Scheduler, SweepPlan};
pub use layout::{mask_columns_to, CellFlags, FrameRange, MinibatchLayout};
pub use matrix::Matrix;
pub use node::{CopyFlags, Node, NodeId};
pub use ops::{init_gaussian, init_uniform, OpKind};
pub use pool::{BufferPool, PoolStats};
