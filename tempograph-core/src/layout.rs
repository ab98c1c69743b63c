use crate::error::TempoGraphError;
use crate::matrix::Matrix;

/// Per-cell boundary and occupancy flags of a minibatch grid.
///
/// A cell may carry several flags at once; a length-one sequence is both a
/// start and an end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CellFlags(u8);

impl CellFlags {
    /// Plain interior sample.
    pub const NONE: CellFlags = CellFlags(0);
    /// First step of a sequence.
    pub const SEQUENCE_START: CellFlags = CellFlags(1);
    /// Last step of a sequence.
    pub const SEQUENCE_END: CellFlags = CellFlags(1 << 1);
    /// Padding cell with no sample behind it (a gap).
    pub const NO_INPUT: CellFlags = CellFlags(1 << 2);

    pub fn contains(self, other: CellFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CellFlags) {
        self.0 |= other.0;
    }

    pub fn is_gap(self) -> bool {
        self.contains(Self::NO_INPUT)
    }
}

impl std::ops::BitOr for CellFlags {
    type Output = CellFlags;

    fn bitor(self, rhs: CellFlags) -> CellFlags {
        CellFlags(self.0 | rhs.0)
    }
}

/// Shape and occupancy of one packed minibatch: `steps` timesteps by
/// `slots` parallel sequences, with per-cell [`CellFlags`].
///
/// Column `t * slots + s` of every layout-bound buffer belongs to cell
/// `(t, s)`. The layout tracks its gap count so the no-gaps fast path is a
/// single comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct MinibatchLayout {
    steps: usize,
    slots: usize,
    flags: Vec<CellFlags>,
    gap_count: usize,
}

impl MinibatchLayout {
    /// Creates a fully occupied layout: every cell valid, no flags set.
    pub fn new(steps: usize, slots: usize) -> Self {
        MinibatchLayout {
            steps,
            slots,
            flags: vec![CellFlags::NONE; steps * slots],
            gap_count: 0,
        }
    }

    /// Builds a layout from per-cell flags in column order (`t * slots + s`).
    ///
    /// # Errors
    /// Fails with `MaskingSpan` when `flags.len() != steps * slots`.
    pub fn with_flags(
        steps: usize,
        slots: usize,
        flags: Vec<CellFlags>,
    ) -> Result<Self, TempoGraphError> {
        if flags.len() != steps * slots {
            return Err(TempoGraphError::MaskingSpan {
                expected: steps * slots,
                actual: flags.len(),
            });
        }
        let gap_count = flags.iter().filter(|f| f.is_gap()).count();
        Ok(MinibatchLayout {
            steps,
            slots,
            flags,
            gap_count,
        })
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn slots(&self) -> usize {
        self.slots
    }

    /// Total column count spanned by the grid, `steps * slots`.
    pub fn columns(&self) -> usize {
        self.steps * self.slots
    }

    /// Column index of cell `(time, slot)`.
    pub fn column_of(&self, time: usize, slot: usize) -> usize {
        debug_assert!(time < self.steps && slot < self.slots);
        time * self.slots + slot
    }

    pub fn flags(&self, time: usize, slot: usize) -> CellFlags {
        self.flags[self.column_of(time, slot)]
    }

    /// ORs `flags` into cell `(time, slot)`, keeping the gap count current.
    pub fn add_flags(&mut self, time: usize, slot: usize, flags: CellFlags) {
        let col = self.column_of(time, slot);
        let was_gap = self.flags[col].is_gap();
        self.flags[col].insert(flags);
        if !was_gap && self.flags[col].is_gap() {
            self.gap_count += 1;
        }
    }

    pub fn is_gap(&self, time: usize, slot: usize) -> bool {
        self.flags(time, slot).is_gap()
    }

    /// Fast occupancy check: true when at least one cell is a gap.
    pub fn has_gaps(&self) -> bool {
        self.gap_count > 0
    }

    pub fn gap_count(&self) -> usize {
        self.gap_count
    }

    /// Number of cells carrying actual samples.
    pub fn valid_count(&self) -> usize {
        self.columns() - self.gap_count
    }
}

/// Selects which columns of a minibatch a kernel call touches: the whole
/// batch, one timestep, or a single `(timestep, slot)` cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameRange {
    time: Option<usize>,
    slot: Option<usize>,
}

impl FrameRange {
    /// Selects every column of the minibatch.
    pub fn all() -> Self {
        FrameRange {
            time: None,
            slot: None,
        }
    }

    /// Selects one timestep across all slots.
    pub fn at(time: usize) -> Self {
        FrameRange {
            time: Some(time),
            slot: None,
        }
    }

    /// Narrows a timestep selection to a single slot.
    pub fn with_slot(self, slot: usize) -> Self {
        FrameRange {
            time: self.time,
            slot: Some(slot),
        }
    }

    pub fn time(&self) -> Option<usize> {
        self.time
    }

    pub fn slot(&self) -> Option<usize> {
        self.slot
    }

    pub fn is_whole_batch(&self) -> bool {
        self.time.is_none() && self.slot.is_none()
    }

    /// Resolves the selection to a contiguous `(start, count)` column range
    /// within `layout`. Returns `None` for an out-of-range timestep or slot,
    /// and for a slot selection without a timestep (that selection is not
    /// contiguous and no caller produces it).
    pub fn column_span(&self, layout: &MinibatchLayout) -> Option<(usize, usize)> {
        match (self.time, self.slot) {
            (None, None) => Some((0, layout.columns())),
            (Some(t), None) if t < layout.steps() => Some((t * layout.slots(), layout.slots())),
            (Some(t), Some(s)) if t < layout.steps() && s < layout.slots() => {
                Some((layout.column_of(t, s), 1))
            }
            _ => None,
        }
    }
}

/// Writes `fill` into every gap column of `matrix` selected by `frame`.
///
/// `fill` is `0.0` wherever correctness of downstream reductions is at
/// stake, and NaN when hunting for code that reads padding it should not.
/// Returns the number of columns overwritten.
///
/// # Errors
/// Fails with `MaskingSpan` when the buffer does not span exactly one
/// column per layout cell.
pub fn mask_columns_to(
    matrix: &mut Matrix,
    layout: &MinibatchLayout,
    frame: FrameRange,
    fill: f32,
) -> Result<usize, TempoGraphError> {
    if !layout.has_gaps() {
        return Ok(0);
    }
    if matrix.cols() != layout.columns() {
        return Err(TempoGraphError::MaskingSpan {
            expected: layout.columns(),
            actual: matrix.cols(),
        });
    }
    let (times, slots): (std::ops::Range<usize>, std::ops::Range<usize>) =
        match (frame.time(), frame.slot()) {
            (None, None) => (0..layout.steps(), 0..layout.slots()),
            (Some(t), None) => (t..t + 1, 0..layout.slots()),
            (Some(t), Some(s)) => (t..t + 1, s..s + 1),
            (None, Some(s)) => (0..layout.steps(), s..s + 1),
        };
    let mut masked = 0;
    for t in times {
        for s in slots.clone() {
            if t >= layout.steps() || s >= layout.slots() {
                continue;
            }
            if layout.is_gap(t, s) {
                let col = layout.column_of(t, s);
                for v in matrix.column_mut(col) {
                    *v = fill;
                }
                masked += 1;
            }
        }
    }
    Ok(masked)
}
