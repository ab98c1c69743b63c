//! Packing sequence bundles into layout-backed minibatches.

use std::sync::Arc;

use tempograph_core::{CellFlags, Matrix, MinibatchLayout, TempoGraphError};

use crate::source::{SequenceSet, StreamDescription};

/// One packed minibatch: the shared layout plus a column matrix per
/// stream, in stream-description order, ready for
/// `ComputationGraph::feed_input`.
#[derive(Debug, Clone)]
pub struct Minibatch {
    pub layout: Arc<MinibatchLayout>,
    pub streams: Vec<Matrix>,
}

impl Minibatch {
    pub fn steps(&self) -> usize {
        self.layout.steps()
    }

    pub fn slots(&self) -> usize {
        self.layout.slots()
    }
}

/// Packs one bundle into the `steps x slots` grid.
///
/// Each sequence takes one slot starting at timestep zero; the step count
/// is the longest sequence in the bundle. Cells past a sequence's end are
/// flagged as gaps and zero-filled. Sequence starts and ends are flagged so
/// delay operators can reset between sequences.
///
/// # Errors
///
/// Bundles must be rectangular across streams: same sequence count, and
/// per-sequence lengths and row counts matching the descriptions.
pub fn pack_minibatch(
    set: &SequenceSet,
    descriptions: &[StreamDescription],
) -> Result<Minibatch, TempoGraphError> {
    if set.streams.len() != descriptions.len() {
        return Err(TempoGraphError::InternalError(format!(
            "bundle has {} streams, descriptions have {}",
            set.streams.len(),
            descriptions.len()
        )));
    }
    let slots = set.streams.first().map_or(0, Vec::len);
    for (stream, desc) in set.streams.iter().zip(descriptions) {
        if stream.len() != slots {
            return Err(TempoGraphError::InternalError(format!(
                "stream '{}' carries {} sequences, expected {slots}",
                desc.name,
                stream.len()
            )));
        }
    }
    let mut lengths = Vec::with_capacity(slots);
    for s in 0..slots {
        let steps = set.streams[0][s].steps();
        if steps == 0 {
            return Err(TempoGraphError::EmptyInput {
                node: descriptions[0].name.clone(),
                operation: "pack_minibatch".to_string(),
                input: format!("sequence {s}"),
            });
        }
        for (stream, desc) in set.streams.iter().zip(descriptions) {
            let seq = &stream[s];
            if seq.steps() != steps || seq.rows() != desc.rows {
                return Err(TempoGraphError::ShapeMismatch {
                    node: desc.name.clone(),
                    operation: "pack_minibatch".to_string(),
                    expected: (desc.rows, steps),
                    actual: (seq.rows(), seq.steps()),
                });
            }
        }
        lengths.push(steps);
    }
    let steps = lengths.iter().copied().max().unwrap_or(0);

    let mut layout = MinibatchLayout::new(steps, slots);
    for (s, &len) in lengths.iter().enumerate() {
        layout.add_flags(0, s, CellFlags::SEQUENCE_START);
        layout.add_flags(len - 1, s, CellFlags::SEQUENCE_END);
        for t in len..steps {
            layout.add_flags(t, s, CellFlags::NO_INPUT);
        }
    }
    let layout = Arc::new(layout);

    let mut streams = Vec::with_capacity(set.streams.len());
    for (stream, desc) in set.streams.iter().zip(descriptions) {
        let mut packed = Matrix::zeros(desc.rows, layout.columns());
        for (s, seq) in stream.iter().enumerate() {
            for t in 0..seq.steps() {
                packed
                    .column_mut(layout.column_of(t, s))
                    .copy_from_slice(seq.column(t));
            }
        }
        streams.push(packed);
    }
    Ok(Minibatch { layout, streams })
}

#[cfg(test)]
#[path = "packer_test.rs"]
mod tests;
