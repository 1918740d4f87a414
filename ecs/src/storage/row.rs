/// A row index inside an archetype.
///
/// Rows are positions, not identities: swap-removal moves the last row into
/// the gap, so a row is only meaningful until the next structural change.
/// Entities are addressed by id and resolved through the storage's location
/// index; rows never leak past a single operation or query step.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Row(usize);

impl Row {
    /// Create a new row for the given index.
    #[inline]
    pub const fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the index of this row.
    #[inline]
    pub fn index(&self) -> usize {
        self.0
    }
}

impl From<usize> for Row {
    #[inline]
    fn from(value: usize) -> Self {
        Self::new(value)
    }
}
