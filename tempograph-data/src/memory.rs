//! In-process sequence source.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use tempograph_core::TempoGraphError;

use crate::source::{EpochConfig, Sequence, SequenceSet, SequenceSource, StreamDescription};

/// A source over sequences held in memory, with optional seeded shuffling
/// per epoch. Identical seeds yield identical epochs, so runs are
/// reproducible.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    descriptions: Vec<StreamDescription>,
    /// `sequences[stream][example]`, parallel across streams.
    sequences: Vec<Vec<Sequence>>,
    order: Vec<usize>,
    cursor: usize,
}

impl InMemorySource {
    /// # Errors
    ///
    /// The per-stream sequence lists must be parallel: one list per
    /// description, equal lengths, and example `i` the same number of
    /// steps in every stream, with rows matching the descriptions.
    pub fn new(
        descriptions: Vec<StreamDescription>,
        sequences: Vec<Vec<Sequence>>,
    ) -> Result<Self, TempoGraphError> {
        if sequences.len() != descriptions.len() {
            return Err(TempoGraphError::InternalError(format!(
                "{} sequence lists for {} stream descriptions",
                sequences.len(),
                descriptions.len()
            )));
        }
        let count = sequences.first().map_or(0, Vec::len);
        for (stream, desc) in sequences.iter().zip(&descriptions) {
            if stream.len() != count {
                return Err(TempoGraphError::InternalError(format!(
                    "stream '{}' holds {} sequences, expected {count}",
                    desc.name,
                    stream.len()
                )));
            }
        }
        for i in 0..count {
            let steps = sequences[0][i].steps();
            for (stream, desc) in sequences.iter().zip(&descriptions) {
                let seq = &stream[i];
                if seq.steps() != steps || seq.rows() != desc.rows {
                    return Err(TempoGraphError::ShapeMismatch {
                        node: desc.name.clone(),
                        operation: "InMemorySource".to_string(),
                        expected: (desc.rows, steps),
                        actual: (seq.rows(), seq.steps()),
                    });
                }
            }
        }
        Ok(Self {
            descriptions,
            sequences,
            order: (0..count).collect(),
            cursor: 0,
        })
    }

    /// Number of examples held.
    pub fn len(&self) -> usize {
        self.sequences.first().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SequenceSource for InMemorySource {
    fn stream_descriptions(&self) -> &[StreamDescription] {
        &self.descriptions
    }

    fn start_epoch(&mut self, config: EpochConfig) {
        self.cursor = 0;
        self.order = (0..self.len()).collect();
        if config.shuffle {
            let mut rng = StdRng::seed_from_u64(config.seed);
            self.order.shuffle(&mut rng);
        }
        log::debug!(
            "epoch start: {} examples, shuffle={}",
            self.order.len(),
            config.shuffle
        );
    }

    fn next_sequences(&mut self, sample_budget: usize) -> SequenceSet {
        let mut picked = Vec::new();
        let mut total = 0;
        while self.cursor < self.order.len() {
            let example = self.order[self.cursor];
            let steps = self.sequences[0][example].steps();
            if !picked.is_empty() && total + steps > sample_budget {
                break;
            }
            picked.push(example);
            total += steps;
            self.cursor += 1;
        }
        let streams = self
            .sequences
            .iter()
            .map(|stream| picked.iter().map(|&i| stream[i].clone()).collect())
            .collect();
        SequenceSet {
            streams,
            end_of_epoch: self.cursor >= self.order.len(),
        }
    }
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
