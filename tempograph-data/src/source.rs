//! Sequence data model and the source abstraction.

use tempograph_core::TempoGraphError;

/// Fixed description of one named sample stream, matching an `Input` node
/// of the consuming graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDescription {
    pub name: String,
    /// Sample dimension; every column of this stream has this many rows.
    pub rows: usize,
}

impl StreamDescription {
    pub fn new(name: impl Into<String>, rows: usize) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }
}

/// One variable-length sequence of column samples for a single stream,
/// stored column-major like the engine's matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    rows: usize,
    steps: usize,
    values: Vec<f32>,
}

impl Sequence {
    /// # Errors
    ///
    /// Returns [`TempoGraphError::MatrixCreation`] when `values` does not
    /// hold exactly `rows * steps` samples.
    pub fn new(rows: usize, steps: usize, values: Vec<f32>) -> Result<Self, TempoGraphError> {
        if values.len() != rows * steps {
            return Err(TempoGraphError::MatrixCreation {
                rows,
                cols: steps,
                data_len: values.len(),
            });
        }
        Ok(Self { rows, steps, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// The sample at timestep `t`.
    ///
    /// # Panics
    ///
    /// Panics if `t >= steps`.
    pub fn column(&self, t: usize) -> &[f32] {
        &self.values[t * self.rows..(t + 1) * self.rows]
    }
}

/// Sequences handed out for one minibatch: the outer index is the stream,
/// the inner the sequence. Streams are parallel; sequence `i` of every
/// stream belongs to the same logical example and has the same length.
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceSet {
    pub streams: Vec<Vec<Sequence>>,
    /// True when this bundle exhausts the epoch.
    pub end_of_epoch: bool,
}

impl SequenceSet {
    pub fn is_empty(&self) -> bool {
        self.streams.first().map_or(true, Vec::is_empty)
    }
}

/// Epoch settings for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpochConfig {
    pub shuffle: bool,
    pub seed: u64,
}

impl Default for EpochConfig {
    fn default() -> Self {
        Self {
            shuffle: false,
            seed: 0,
        }
    }
}

/// A cursor over an epoch of variable-length sequences.
///
/// Implementations own the enumeration policy (ordering, shuffling,
/// chunking); consumers repeatedly ask for the next bundle within a sample
/// budget until [`SequenceSet::end_of_epoch`] comes back set.
pub trait SequenceSource {
    fn stream_descriptions(&self) -> &[StreamDescription];

    /// Rewinds to the start of a fresh epoch.
    fn start_epoch(&mut self, config: EpochConfig);

    /// Returns the next bundle of sequences whose total timestep count
    /// stays within `sample_budget`, except that at least one sequence is
    /// always returned while any remain.
    fn next_sequences(&mut self, sample_budget: usize) -> SequenceSet;
}
