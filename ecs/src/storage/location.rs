use crate::storage::{Row, archetype};

/// Where a live entity's components are stored: which archetype, and which
/// row within it. Every live entity has exactly one location; migrations and
/// swap-removals rewrite it through the storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    /// The archetype holding the entity.
    archetype: archetype::Id,
    /// The row the entity occupies in that archetype.
    row: Row,
}

impl Location {
    /// Create a new location.
    #[inline]
    pub const fn new(archetype: archetype::Id, row: Row) -> Self {
        Self { archetype, row }
    }

    /// The archetype holding the entity.
    #[inline]
    pub fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// The row the entity occupies.
    #[inline]
    pub fn row(&self) -> Row {
        self.row
    }
}
