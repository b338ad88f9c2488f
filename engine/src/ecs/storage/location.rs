use crate::ecs::storage::archetype;

/// Where an entity's component data lives: an archetype and a row inside it.
///
/// The world keeps one record per entity with components. Swap-removal can
/// relocate other entities inside an archetype, so records are patched
/// whenever a removal reports a displaced entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    archetype: archetype::Id,
    row: usize,
}

impl Location {
    /// Construct a location from an archetype handle and a row.
    #[inline]
    pub const fn new(archetype: archetype::Id, row: usize) -> Self {
        Self { archetype, row }
    }

    /// Get the archetype handle.
    #[inline]
    pub const fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// Get the row inside the archetype.
    #[inline]
    pub const fn row(&self) -> usize {
        self.row
    }
}
