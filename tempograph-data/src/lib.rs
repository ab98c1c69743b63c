//! tempograph-data: sequence sources and minibatch packing for
//! tempograph-core.
//!
//! The engine never enumerates data itself: it asks a [`SequenceSource`]
//! for the next bundle of variable-length sequences within a sample
//! budget, packs them into a [`Minibatch`] whose layout records sequence
//! boundaries and padding, and feeds the packed streams to the graph's
//! input nodes.

pub mod memory;
pub mod packer;
pub mod source;

pub use memory::InMemorySource;
pub use packer::{pack_minibatch, Minibatch};
pub use source::{EpochConfig, Sequence, SequenceSet, SequenceSource, StreamDescription};
