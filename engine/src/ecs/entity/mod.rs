//! Entity handles and the generational allocator.
//!
//! Entities are opaque 64-bit handles combining a 48-bit [`Id`] with a 16-bit
//! [`Generation`]. The id indexes the allocator's bookkeeping; the generation
//! detects use-after-despawn: freeing an entity bumps the stored generation,
//! so any handle minted before the free no longer matches.
//!
//! # Architecture
//!
//! - **[`Entity`]**: the encoded handle. The bit layout is part of the public
//!   contract: `handle = (generation << 48) | (id & 0x0000_FFFF_FFFF_FFFF)`.
//!
//! - **[`Allocator`]**: owns the id pool, the generation table, and the
//!   live-prefix bookkeeping. Freed ids are recycled before new ids are
//!   minted, which keeps the id space compact for index-based storage.
//!
//! # Recycling
//!
//! The pool holds every id ever minted; ids `pool[0..alive]` are exactly the
//! live ones. Freeing swaps the freed id to the end of the live prefix and
//! shrinks the prefix, so the next allocation picks it up again with the
//! bumped generation:
//!
//! ```rust,ignore
//! let e = allocator.alloc();          // id 0, generation 0
//! allocator.free(e);
//! let e2 = allocator.alloc();         // id 0, generation 1
//! assert!(!allocator.matches(e));     // stale handle detected
//! ```

use std::collections::HashMap;

/// The generation of an entity id. Incremented (mod 2^16) each time the id
/// is freed, invalidating handles minted for earlier lifetimes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(u16);

impl Generation {
    /// The generation of an id's first lifetime.
    pub const FIRST: Self = Self(0);

    /// Construct a generation from its raw value.
    #[inline]
    pub const fn new(value: u16) -> Self {
        Self(value)
    }

    /// Get the raw generation counter.
    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Get the next generation, wrapping `0xFFFF` back to `0`.
    #[inline]
    pub const fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }
}

/// A 48-bit entity identifier. The upper 16 bits of the raw value are always
/// zero; they belong to the generation in the encoded handle.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u64);

impl Id {
    /// Mask selecting the 48 id bits of an encoded handle.
    pub const MASK: u64 = 0x0000_FFFF_FFFF_FFFF;

    /// Construct an id from a raw value, truncated to 48 bits.
    #[inline]
    pub const fn new(value: u64) -> Self {
        Self(value & Self::MASK)
    }

    /// Get the raw 48-bit value.
    #[inline]
    pub const fn value(&self) -> u64 {
        self.0
    }

    /// Get the id as an index into indexable storage.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// An encoded entity handle.
///
/// The layout is `(generation << 48) | id` and is stable: handles may be
/// stored, compared, and decoded by callers. A handle says nothing about
/// liveness on its own; the world checks it against the allocator's
/// generation table on every access.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Entity(u64);

impl Entity {
    const GENERATION_SHIFT: u32 = 48;

    /// Encode a handle from an id and a generation.
    #[inline]
    pub const fn new(id: Id, generation: Generation) -> Self {
        Self(((generation.0 as u64) << Self::GENERATION_SHIFT) | (id.0 & Id::MASK))
    }

    /// Reconstruct a handle from its raw 64-bit encoding.
    #[inline]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    /// Get the raw 64-bit encoding of this handle.
    #[inline]
    pub const fn to_bits(&self) -> u64 {
        self.0
    }

    /// Get the 48-bit id of this handle.
    #[inline]
    pub const fn id(&self) -> Id {
        Id(self.0 & Id::MASK)
    }

    /// Get the generation of this handle.
    #[inline]
    pub const fn generation(&self) -> Generation {
        Generation((self.0 >> Self::GENERATION_SHIFT) as u16)
    }
}

/// The generational entity allocator.
///
/// Owns the id pool, the per-id generation table, and the inverse index map.
///
/// # Invariants
/// - `pool[0..alive]` are exactly the live ids, each with an entry in
///   `indices` pointing back at its pool slot.
/// - `pool[alive..]` are freed ids awaiting recycling.
/// - Every id ever minted has an entry in `generations`; the stored value is
///   the generation of its current (or next, if freed) lifetime.
#[derive(Default, Debug)]
pub struct Allocator {
    /// Every id ever minted; the live ids form the prefix `[0, alive)`.
    pool: Vec<Id>,

    /// Position of each live id inside `pool`.
    indices: HashMap<Id, usize>,

    /// Current generation of every id ever minted.
    generations: HashMap<Id, Generation>,

    /// Number of live entities.
    alive: usize,

    /// The next never-used id value.
    next_id: u64,
}

impl Allocator {
    /// Construct an empty allocator.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate an entity, recycling a freed id when one is available.
    ///
    /// A recycled id keeps the generation stored at free time, so the new
    /// handle's generation is exactly one past the despawned handle's.
    pub fn alloc(&mut self) -> Entity {
        let (id, generation) = if self.alive < self.pool.len() {
            let id = self.pool[self.alive];
            let generation = self
                .generations
                .get(&id)
                .copied()
                .unwrap_or(Generation::FIRST);
            (id, generation)
        } else {
            let id = Id::new(self.next_id);
            self.next_id += 1;
            self.pool.push(id);
            self.generations.insert(id, Generation::FIRST);
            (id, Generation::FIRST)
        };

        self.alive += 1;
        self.indices.insert(id, self.alive - 1);
        Entity::new(id, generation)
    }

    /// Free an entity's id, making it available for recycling.
    ///
    /// The stored generation is bumped so existing handles stop matching.
    /// The freed id is swapped to the end of the live prefix, keeping
    /// `pool[0..alive]` a dense list of live ids. Unknown ids are ignored;
    /// callers validate the handle before freeing.
    pub fn free(&mut self, entity: Entity) {
        let id = entity.id();
        let Some(index) = self.indices.remove(&id) else {
            return;
        };

        let last = self.alive - 1;
        if index < last {
            self.pool[index] = self.pool[last];
            self.indices.insert(self.pool[index], index);
        }
        self.pool[last] = id;
        self.alive = last;

        self.generations
            .entry(id)
            .and_modify(|generation| *generation = generation.next());
    }

    /// Check a handle against the generation table.
    ///
    /// Returns `false` for ids never minted and for handles whose generation
    /// no longer matches the stored one.
    #[inline]
    pub fn matches(&self, entity: Entity) -> bool {
        self.generations.get(&entity.id()) == Some(&entity.generation())
    }

    /// Get the current generation of an id, if the id was ever minted.
    #[inline]
    pub fn generation_of(&self, id: Id) -> Option<Generation> {
        self.generations.get(&id).copied()
    }

    /// Get the number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.alive
    }

    /// Check whether no entities are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.alive == 0
    }
}
