#[cfg(test)]
mod tests {
    use tempograph_core::TempoGraphError;

    use crate::memory::InMemorySource;
    use crate::source::{EpochConfig, Sequence, SequenceSource, StreamDescription};

    fn sequence_of_len(len: usize, value: f32) -> Sequence {
        Sequence::new(1, len, vec![value; len]).unwrap()
    }

    fn ragged_source(lengths: &[usize]) -> InMemorySource {
        let sequences = lengths
            .iter()
            .enumerate()
            .map(|(i, &len)| sequence_of_len(len, i as f32))
            .collect();
        InMemorySource::new(
            vec![StreamDescription::new("features", 1)],
            vec![sequences],
        )
        .unwrap()
    }

    /// The first value of each returned sequence identifies the example.
    fn example_ids(source: &mut InMemorySource, budget: usize) -> Vec<Vec<usize>> {
        let mut bundles = Vec::new();
        loop {
            let set = source.next_sequences(budget);
            let ids = set.streams[0]
                .iter()
                .map(|seq| seq.column(0)[0] as usize)
                .collect();
            bundles.push(ids);
            if set.end_of_epoch {
                return bundles;
            }
        }
    }

    #[test]
    fn test_budget_bounds_bundle_size() {
        let mut source = ragged_source(&[3, 2, 4]);
        source.start_epoch(EpochConfig::default());

        let first = source.next_sequences(5);
        assert_eq!(first.streams[0].len(), 2);
        assert!(!first.end_of_epoch);

        let second = source.next_sequences(5);
        assert_eq!(second.streams[0].len(), 1);
        assert_eq!(second.streams[0][0].steps(), 4);
        assert!(second.end_of_epoch);
    }

    #[test]
    fn test_oversized_sequence_still_returned() {
        let mut source = ragged_source(&[7]);
        source.start_epoch(EpochConfig::default());
        let set = source.next_sequences(1);
        assert_eq!(set.streams[0].len(), 1);
        assert_eq!(set.streams[0][0].steps(), 7);
        assert!(set.end_of_epoch);
    }

    #[test]
    fn test_epoch_restart_rewinds() {
        let mut source = ragged_source(&[2, 2]);
        source.start_epoch(EpochConfig::default());
        assert_eq!(example_ids(&mut source, 10), vec![vec![0, 1]]);

        source.start_epoch(EpochConfig::default());
        assert_eq!(example_ids(&mut source, 10), vec![vec![0, 1]]);
    }

    #[test]
    fn test_drained_source_reports_end() {
        let mut source = ragged_source(&[1]);
        source.start_epoch(EpochConfig::default());
        assert!(source.next_sequences(4).end_of_epoch);

        let empty = source.next_sequences(4);
        assert!(empty.is_empty());
        assert!(empty.end_of_epoch);
    }

    #[test]
    fn test_shuffle_is_seed_deterministic() {
        let config = EpochConfig {
            shuffle: true,
            seed: 17,
        };
        let mut a = ragged_source(&[1, 1, 1, 1, 1, 1, 1, 1]);
        let mut b = ragged_source(&[1, 1, 1, 1, 1, 1, 1, 1]);
        a.start_epoch(config);
        b.start_epoch(config);
        assert_eq!(example_ids(&mut a, 3), example_ids(&mut b, 3));
    }

    #[test]
    fn test_shuffle_covers_every_example() {
        let mut source = ragged_source(&[1, 1, 1, 1, 1]);
        source.start_epoch(EpochConfig {
            shuffle: true,
            seed: 99,
        });
        let mut seen: Vec<usize> = example_ids(&mut source, 2).concat();
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn test_unshuffled_order_is_identity() {
        let mut source = ragged_source(&[1, 1, 1]);
        source.start_epoch(EpochConfig::default());
        assert_eq!(example_ids(&mut source, 1), vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn test_new_rejects_uneven_stream_lengths() {
        let err = InMemorySource::new(
            vec![
                StreamDescription::new("features", 1),
                StreamDescription::new("labels", 1),
            ],
            vec![
                vec![sequence_of_len(2, 0.0)],
                vec![sequence_of_len(2, 0.0), sequence_of_len(2, 1.0)],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TempoGraphError::InternalError(_)));
    }

    #[test]
    fn test_new_rejects_mismatched_rows() {
        let err = InMemorySource::new(
            vec![StreamDescription::new("features", 3)],
            vec![vec![sequence_of_len(2, 0.0)]],
        )
        .unwrap_err();
        assert!(matches!(err, TempoGraphError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_new_rejects_ragged_examples_across_streams() {
        let err = InMemorySource::new(
            vec![
                StreamDescription::new("features", 1),
                StreamDescription::new("labels", 1),
            ],
            vec![
                vec![sequence_of_len(3, 0.0)],
                vec![sequence_of_len(2, 0.0)],
            ],
        )
        .unwrap_err();
        assert!(matches!(err, TempoGraphError::ShapeMismatch { .. }));
    }
}
