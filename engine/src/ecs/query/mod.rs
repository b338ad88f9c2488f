//! Typed queries over archetypes and the per-shape result cache.
//!
//! A query is a tuple of component types: `world.query::<(Position, Velocity)>()`
//! yields one `(Entity, &Position, &Velocity)` tuple per entity whose
//! archetype contains *all* requested components. Tuple order determines the
//! order of references in each item; it does not affect which entities match.
//!
//! # Caching
//!
//! Results are cached per query *signature*: the multiset of component ids,
//! hashed in sorted order with [`archash`](crate::ecs::component::archash).
//! Every permutation of the same component set therefore shares one cache
//! entry. The cache stores type-erased rows (entity plus one pointer per
//! requested component, in sorted-id order); each tuple shape reads its
//! references back out through its own position table.
//!
//! A cache entry targets the single archetype it most recently matched.
//! While only that archetype changes, and in only one way at a time, the
//! entry is patched incrementally from the archetype's dirty flags; any
//! other change rebuilds the result by scanning all archetypes.
//!
//! # Pointer lifetime
//!
//! Cached pointers point directly into column storage. They remain valid
//! across in-place updates (`set` on an existing component never moves the
//! column), and are refreshed or rebuilt when rows are added or removed.
//! Borrowing rules enforce the contract for callers: the returned items
//! borrow the world, so no mutation can happen while they are alive.

use std::ptr::NonNull;

use crate::ecs::{component, entity::Entity, storage::archetype};

/// A tuple of component types that a query requests.
///
/// Implemented for tuples of up to twelve [`Component`](component::Component)
/// types. `Item` is the corresponding result tuple: the entity handle
/// followed by one shared reference per component, in declaration order.
pub trait Data: 'static {
    /// The row tuple produced for this shape.
    type Item<'w>;

    /// Resolve (registering on first use) the component ids, in the tuple's
    /// declared order.
    fn component_ids(registry: &component::Registry) -> Vec<component::Id>;

    /// Build one result tuple from a cached row.
    ///
    /// `positions[k]` locates the k-th declared component inside `pointers`,
    /// which holds the row's pointers in sorted-id order.
    ///
    /// # Safety
    /// Every pointer must reference a live value of the component type at
    /// its position, valid for the conjured lifetime `'w`.
    unsafe fn item<'w>(entity: Entity, pointers: &[NonNull<u8>], positions: &[usize]) -> Self::Item<'w>;
}

macro_rules! impl_data {
    ($(($component:ident, $index:tt)),+) => {
        impl<$($component: component::Component),+> Data for ($($component,)+) {
            type Item<'w> = (Entity, $(&'w $component,)+);

            fn component_ids(registry: &component::Registry) -> Vec<component::Id> {
                vec![$(registry.register::<$component>()),+]
            }

            unsafe fn item<'w>(
                entity: Entity,
                pointers: &[NonNull<u8>],
                positions: &[usize],
            ) -> Self::Item<'w> {
                (
                    entity,
                    $(unsafe { pointers[positions[$index]].cast::<$component>().as_ref() },)+
                )
            }
        }
    };
}

impl_data!((A, 0));
impl_data!((A, 0), (B, 1));
impl_data!((A, 0), (B, 1), (C, 2));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7), (I, 8));
impl_data!((A, 0), (B, 1), (C, 2), (D, 3), (E, 4), (F, 5), (G, 6), (H, 7), (I, 8), (J, 9));
impl_data!(
    (A, 0),
    (B, 1),
    (C, 2),
    (D, 3),
    (E, 4),
    (F, 5),
    (G, 6),
    (H, 7),
    (I, 8),
    (J, 9),
    (K, 10)
);
impl_data!(
    (A, 0),
    (B, 1),
    (C, 2),
    (D, 3),
    (E, 4),
    (F, 5),
    (G, 6),
    (H, 7),
    (I, 8),
    (J, 9),
    (K, 10),
    (L, 11)
);

/// A cached query result for one signature.
///
/// Rows are stored type-erased: an entity handle plus `width` pointers in
/// sorted-component-id order, flattened row-major into `pointers`. The
/// entry tracks the archetype it last matched and the entity count observed
/// at that time; the pair drives the freshness check and the incremental
/// refresh paths.
pub struct QueryCache {
    /// The archetype the cached rows were last collected from.
    pub(crate) archetype: Option<archetype::Id>,

    /// That archetype's entity count when the rows were collected.
    pub(crate) entity_count: usize,

    /// Cached entity handles, one per row.
    pub(crate) entities: Vec<Entity>,

    /// Row-major component pointers, `width` per row, sorted-id order.
    pub(crate) pointers: Vec<NonNull<u8>>,

    /// Number of pointers per row.
    width: usize,
}

impl QueryCache {
    /// Create an empty cache entry for a signature of `width` components.
    pub(crate) fn new(width: usize) -> Self {
        Self {
            archetype: None,
            entity_count: 0,
            entities: Vec::new(),
            pointers: Vec::new(),
            width,
        }
    }

    /// Number of pointers per row.
    #[inline]
    pub(crate) fn width(&self) -> usize {
        self.width
    }

    /// Number of cached rows.
    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.entities.len()
    }

    /// The pointer slice for one row.
    #[inline]
    pub(crate) fn row_pointers(&self, index: usize) -> &[NonNull<u8>] {
        &self.pointers[index * self.width..(index + 1) * self.width]
    }

    /// Forget everything in preparation for a rebuild.
    pub(crate) fn reset(&mut self) {
        self.archetype = None;
        self.entity_count = 0;
        self.entities.clear();
        self.pointers.clear();
    }
}
