use std::ops::{BitOr, BitOrAssign};

/// Per-archetype dirty flags consumed by the query cache.
///
/// Mutations mark the archetype they touched; a query watching the archetype
/// applies an incremental refresh when exactly one flag is set and clears
/// that flag. Flags are shared by every cache watching the archetype, so
/// only the incremental paths clear them.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DirtyFlags(u8);

impl DirtyFlags {
    /// No pending changes.
    pub const EMPTY: Self = Self(0);

    /// Rows were appended since the last refresh.
    pub const ADDED: Self = Self(1 << 0);

    /// Rows were swap-removed since the last refresh.
    pub const REMOVED: Self = Self(1 << 1);

    /// A value was replaced in place since the last refresh.
    pub const UPDATED: Self = Self(1 << 2);

    /// Check whether every flag in `other` is set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Check whether any flag in `other` is set.
    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set the flags in `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// Clear the flags in `other`.
    #[inline]
    pub fn clear(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    /// Check whether no flags are set.
    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for DirtyFlags {
    type Output = Self;

    #[inline]
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for DirtyFlags {
    #[inline]
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_combine_and_clear() {
        // Given
        let mut flags = DirtyFlags::EMPTY;

        // When
        flags.insert(DirtyFlags::ADDED);
        flags.insert(DirtyFlags::UPDATED);

        // Then
        assert!(flags.contains(DirtyFlags::ADDED));
        assert!(flags.intersects(DirtyFlags::REMOVED | DirtyFlags::UPDATED));
        assert!(!flags.contains(DirtyFlags::ADDED | DirtyFlags::REMOVED));
        assert_ne!(flags, DirtyFlags::ADDED);

        // When
        flags.clear(DirtyFlags::UPDATED);

        // Then - exactly one flag left
        assert_eq!(flags, DirtyFlags::ADDED);
        flags.clear(DirtyFlags::ADDED);
        assert!(flags.is_empty());
    }
}
