//! Archetype tables and the archetype registry with its transition graph.
//!
//! An [`Archetype`] stores every entity holding one exact component set:
//! parallel [`Column`]s plus an entity list whose live rows form the prefix
//! `[0, entity_count)`. Appending is amortized O(1); removal is O(1) via
//! swap-remove, which keeps the columns dense.
//!
//! The [`Archetypes`] registry owns every archetype, keyed by the FNV-1a
//! hash of its sorted component-id vector, and lazily builds the transition
//! graph: each archetype caches, per component id, which archetype an entity
//! lands in when that component is added or removed. Edges are written once
//! and never change, so repeated shape transitions are amortized O(1).

use std::{collections::HashMap, fmt};

use log::debug;

use crate::ecs::{
    component::{self, Spec},
    entity,
    storage::{change::DirtyFlags, column::Column},
};

/// A registry handle for an archetype.
///
/// Handles are dense indices into the registry and are never invalidated:
/// archetypes live for the life of the world.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u32);

impl Id {
    /// Construct a handle from a raw index.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Get the handle as an index into the registry.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// A set of entities sharing one exact component combination, stored in
/// parallel columns.
///
/// # Invariants
/// - `entities[entity_rows[x]] == x` for every live entity `x`.
/// - Every column's capacity is at least `entity_count`.
/// - `components` is strictly sorted and unique; `hash` is its archash.
pub struct Archetype {
    /// Stable identity: archash of the sorted component-id vector.
    hash: u64,

    /// The sorted component set stored here.
    components: Spec,

    /// One column per component id. Columns start unbound and are bound to
    /// their element type on first use.
    columns: HashMap<component::Id, Column>,

    /// Row-indexed entity ids; only `[0, entity_count)` is live.
    entities: Vec<entity::Id>,

    /// Inverse mapping from entity id to its row.
    entity_rows: HashMap<entity::Id, usize>,

    /// Number of live rows.
    entity_count: usize,

    /// Cached `add(c)` transitions out of this archetype.
    add_edges: HashMap<component::Id, Id>,

    /// Cached `remove(c)` transitions out of this archetype.
    remove_edges: HashMap<component::Id, Id>,

    /// Pending-change flags consumed by the query cache.
    flags: DirtyFlags,
}

impl Archetype {
    /// Row capacity seeded on the first append.
    const SEED_CAPACITY: usize = 16;

    /// Create an empty archetype for the given component set.
    fn new(hash: u64, components: Spec) -> Self {
        let columns = components
            .ids()
            .iter()
            .map(|&id| (id, Column::new()))
            .collect();
        Self {
            hash,
            components,
            columns,
            entities: Vec::new(),
            entity_rows: HashMap::new(),
            entity_count: 0,
            add_edges: HashMap::new(),
            remove_edges: HashMap::new(),
            flags: DirtyFlags::EMPTY,
        }
    }

    /// Get this archetype's stable identity hash.
    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Get the component set stored here.
    #[inline]
    pub fn components(&self) -> &Spec {
        &self.components
    }

    /// Determine whether this archetype stores the given component.
    #[inline]
    pub fn has(&self, component_id: component::Id) -> bool {
        self.components.contains(component_id)
    }

    /// Get the number of live rows.
    #[inline]
    pub fn len(&self) -> usize {
        self.entity_count
    }

    /// Check whether no rows are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entity_count == 0
    }

    /// Get the row capacity currently reserved.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.entities.len()
    }

    /// Get the live entity ids, in row order.
    #[inline]
    pub fn entities(&self) -> &[entity::Id] {
        &self.entities[..self.entity_count]
    }

    /// Get the row an entity occupies, if it lives here.
    #[inline]
    pub fn row_of(&self, entity: entity::Id) -> Option<usize> {
        self.entity_rows.get(&entity).copied()
    }

    /// Get the column for a component id.
    #[inline]
    pub fn column(&self, component_id: component::Id) -> Option<&Column> {
        self.columns.get(&component_id)
    }

    /// Get the mutable column for a component id.
    #[inline]
    pub fn column_mut(&mut self, component_id: component::Id) -> Option<&mut Column> {
        self.columns.get_mut(&component_id)
    }

    /// Get the pending-change flags.
    #[inline]
    pub fn flags(&self) -> DirtyFlags {
        self.flags
    }

    /// Set pending-change flags.
    #[inline]
    pub fn mark(&mut self, flags: DirtyFlags) {
        self.flags.insert(flags);
    }

    /// Clear pending-change flags.
    #[inline]
    pub fn clear_flag(&mut self, flags: DirtyFlags) {
        self.flags.clear(flags);
    }

    /// Append an entity, returning its row.
    ///
    /// Doubles the row capacity (seeded at 16) when full, resizing every
    /// column alongside the entity list. The root archetype has no columns;
    /// only its entity list grows.
    pub fn append(&mut self, entity: entity::Id) -> usize {
        let row = self.entity_count;
        self.entity_count += 1;

        if row >= self.entities.len() {
            let new_capacity = if self.entities.is_empty() {
                Self::SEED_CAPACITY
            } else {
                self.entities.len() * 2
            };
            self.entities.resize(new_capacity, entity::Id::default());
            for column in self.columns.values_mut() {
                column.resize(new_capacity);
            }
        }

        self.entities[row] = entity;
        self.entity_rows.insert(entity, row);
        self.flags.insert(DirtyFlags::ADDED);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        row
    }

    /// Remove an entity by swap-remove.
    ///
    /// The departing row's values are destroyed, the last live row is
    /// relocated into the vacated slot, and the row count shrinks by one.
    /// Returns the entity that was relocated together with its new row, so
    /// the caller can patch that entity's location record. Unknown entities
    /// are ignored.
    pub fn remove(&mut self, entity: entity::Id) -> Option<(entity::Id, usize)> {
        let row = self.entity_rows.get(&entity).copied()?;
        let last = self.entity_count - 1;

        let displaced = if row != last {
            let moved = self.entities[last];
            for column in self.columns.values_mut() {
                column.destroy_at(row);
                if column.is_constructed(last) {
                    column.relocate(last, row);
                }
            }
            self.entities[row] = moved;
            self.entity_rows.insert(moved, row);
            Some((moved, row))
        } else {
            for column in self.columns.values_mut() {
                column.destroy_at(row);
            }
            None
        };

        self.entity_count = last;
        self.entity_rows.remove(&entity);
        self.entities[last] = entity::Id::default();
        self.flags.insert(DirtyFlags::REMOVED);

        #[cfg(debug_assertions)]
        self.verify_invariants();

        displaced
    }

    /// Migrate the entity at `row` into `dest`.
    ///
    /// Appends a fresh row in `dest`, moves every component shared by both
    /// archetypes across, then swap-removes the source row. Destination
    /// columns left unbound by lazy creation are bound from the source
    /// column's element info before the move.
    ///
    /// Returns the destination row and the entity displaced in the source
    /// by the swap-remove, if any.
    pub fn migrate_to(
        &mut self,
        row: usize,
        dest: &mut Archetype,
        entity: entity::Id,
    ) -> (usize, Option<(entity::Id, usize)>) {
        let dest_row = dest.append(entity);

        for (component_id, column) in self.columns.iter_mut() {
            let Some(target) = dest.columns.get_mut(component_id) else {
                continue;
            };
            if !column.is_constructed(row) {
                continue;
            }
            if !target.is_bound()
                && let Some(info) = column.info()
            {
                target.bind(info);
            }
            column.transfer_to(row, target, dest_row);
        }

        let displaced = self.remove(entity);
        (dest_row, displaced)
    }

    /// Destroy every component value stored at `row`.
    ///
    /// Used by despawn before the row itself is removed.
    pub fn destroy_components_at(&mut self, row: usize) {
        for column in self.columns.values_mut() {
            column.destroy_at(row);
        }
    }

    /// Verify the row bookkeeping and column capacities.
    #[cfg(debug_assertions)]
    fn verify_invariants(&self) {
        for (row, &entity) in self.entities[..self.entity_count].iter().enumerate() {
            debug_assert_eq!(
                self.entity_rows.get(&entity),
                Some(&row),
                "entity row mapping out of sync"
            );
        }
        for column in self.columns.values() {
            debug_assert!(
                column.capacity() >= self.entity_count,
                "column capacity below live row count"
            );
        }
    }
}

impl fmt::Debug for Archetype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archetype")
            .field("hash", &format_args!("{:#018x}", self.hash))
            .field("components", &self.components)
            .field("entity_count", &self.entity_count)
            .field("capacity", &self.entities.len())
            .field("flags", &self.flags)
            .finish_non_exhaustive()
    }
}

/// Registry of every archetype in a world, plus the lazily built transition
/// graph.
pub struct Archetypes {
    /// The archetypes, indexed by handle.
    archetypes: Vec<Archetype>,

    /// Identity lookup keyed by archash.
    by_hash: HashMap<u64, Id>,
}

impl Default for Archetypes {
    fn default() -> Self {
        Self::new()
    }
}

impl Archetypes {
    /// Handle of the root (empty) archetype, created at construction and
    /// permanent thereafter.
    pub const ROOT: Id = Id(0);

    /// Create a registry holding only the root archetype.
    pub fn new() -> Self {
        let mut registry = Self {
            archetypes: Vec::new(),
            by_hash: HashMap::new(),
        };
        registry.ensure(Spec::EMPTY);
        registry
    }

    /// Get an archetype by handle.
    ///
    /// Handles are only minted by this registry and never invalidated, so
    /// lookup is infallible.
    #[inline]
    pub fn get(&self, id: Id) -> &Archetype {
        &self.archetypes[id.index()]
    }

    /// Get a mutable archetype by handle.
    #[inline]
    pub fn get_mut(&mut self, id: Id) -> &mut Archetype {
        &mut self.archetypes[id.index()]
    }

    /// Get two distinct archetypes mutably, for cross-archetype migration.
    ///
    /// # Panics
    /// Panics if the handles are equal.
    pub fn get_pair_mut(&mut self, a: Id, b: Id) -> (&mut Archetype, &mut Archetype) {
        let [first, second] = self
            .archetypes
            .get_disjoint_mut([a.index(), b.index()])
            .expect("migration requires two distinct archetypes");
        (first, second)
    }

    /// Look up or create the archetype for a component set.
    pub fn ensure(&mut self, components: Spec) -> Id {
        let hash = components.key();
        if let Some(&id) = self.by_hash.get(&hash) {
            return id;
        }

        let id = Id(self.archetypes.len() as u32);
        debug!(
            "created archetype {:#018x} with {} components",
            hash,
            components.len()
        );
        self.archetypes.push(Archetype::new(hash, components));
        self.by_hash.insert(hash, id);
        id
    }

    /// Resolve the archetype an entity of `source` lands in when component
    /// `c` is added.
    ///
    /// Consults the cached `add` edge first; a miss resolves the target by
    /// component set and caches the edge. Returns `source` itself when it
    /// already stores `c`.
    pub fn with_component(&mut self, source: Id, component_id: component::Id) -> Id {
        if let Some(&target) = self.get(source).add_edges.get(&component_id) {
            return target;
        }
        if self.get(source).has(component_id) {
            return source;
        }

        let components = self.get(source).components().with(component_id);
        let target = self.ensure(components);
        self.get_mut(source).add_edges.insert(component_id, target);
        target
    }

    /// Resolve the archetype an entity of `source` lands in when component
    /// `c` is removed.
    ///
    /// Symmetric to [`Archetypes::with_component`], using the `remove` edge
    /// cache. Returns `source` itself when it does not store `c`.
    pub fn without_component(&mut self, source: Id, component_id: component::Id) -> Id {
        if let Some(&target) = self.get(source).remove_edges.get(&component_id) {
            return target;
        }
        if !self.get(source).has(component_id) {
            return source;
        }

        let components = self.get(source).components().without(component_id);
        let target = self.ensure(components);
        self.get_mut(source)
            .remove_edges
            .insert(component_id, target);
        target
    }

    /// Iterate over every archetype with its handle.
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = (Id, &Archetype)> {
        self.archetypes
            .iter()
            .enumerate()
            .map(|(index, archetype)| (Id(index as u32), archetype))
    }

    /// Get the number of archetypes, the root included.
    #[inline]
    pub fn len(&self) -> usize {
        self.archetypes.len()
    }

    /// Check whether only the root exists. Never true in practice; present
    /// for API symmetry.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.archetypes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::Registry;

    #[derive(Clone, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Clone, Debug, PartialEq)]
    struct Label(String);

    fn setup(registry: &Registry) -> (component::Id, component::Id) {
        (registry.register::<Position>(), registry.register::<Label>())
    }

    #[test]
    fn registry_creates_permanent_root() {
        // Given
        let archetypes = Archetypes::new();

        // Then - the empty archetype hashes to zero and has no columns
        assert_eq!(archetypes.len(), 1);
        assert_eq!(archetypes.get(Archetypes::ROOT).hash(), 0);
        assert!(archetypes.get(Archetypes::ROOT).components().is_empty());
    }

    #[test]
    fn ensure_is_identity_keyed() {
        // Given
        let registry = Registry::new();
        let (pos, label) = setup(&registry);
        let mut archetypes = Archetypes::new();

        // When
        let a = archetypes.ensure(Spec::new(vec![pos, label]));
        let b = archetypes.ensure(Spec::new(vec![label, pos]));

        // Then - same sorted set, same archetype
        assert_eq!(a, b);
        assert_eq!(archetypes.len(), 2);
    }

    #[test]
    fn graph_edges_are_cached() {
        // Given
        let registry = Registry::new();
        let (pos, label) = setup(&registry);
        let mut archetypes = Archetypes::new();

        // When
        let with_pos = archetypes.with_component(Archetypes::ROOT, pos);
        let with_both = archetypes.with_component(with_pos, label);
        let created = archetypes.len();

        // Then - repeating the transitions hits the cached edges
        assert_eq!(archetypes.with_component(Archetypes::ROOT, pos), with_pos);
        assert_eq!(archetypes.with_component(with_pos, label), with_both);
        assert_eq!(archetypes.len(), created);

        // Then - removing walks back to the existing archetypes
        assert_eq!(archetypes.without_component(with_both, label), with_pos);
        assert_eq!(archetypes.without_component(with_pos, pos), Archetypes::ROOT);
        assert_eq!(archetypes.len(), created);
    }

    #[test]
    fn with_component_on_owner_returns_source() {
        // Given
        let registry = Registry::new();
        let (pos, _) = setup(&registry);
        let mut archetypes = Archetypes::new();
        let with_pos = archetypes.with_component(Archetypes::ROOT, pos);

        // Then
        assert_eq!(archetypes.with_component(with_pos, pos), with_pos);
        assert_eq!(
            archetypes.without_component(Archetypes::ROOT, pos),
            Archetypes::ROOT
        );
    }

    #[test]
    fn append_seeds_and_doubles_capacity() {
        // Given
        let registry = Registry::new();
        let (pos, _) = setup(&registry);
        let mut archetypes = Archetypes::new();
        let id = archetypes.ensure(Spec::new(vec![pos]));
        let archetype = archetypes.get_mut(id);

        // When
        for i in 0..17 {
            archetype.append(entity::Id::new(i));
        }

        // Then
        assert_eq!(archetype.len(), 17);
        assert_eq!(archetype.capacity(), 32);
        assert!(archetype.column(pos).unwrap().capacity() >= 17);
        assert!(archetype.flags().contains(DirtyFlags::ADDED));
    }

    #[test]
    fn root_append_grows_entity_list_only() {
        // Given
        let mut archetypes = Archetypes::new();
        let root = archetypes.get_mut(Archetypes::ROOT);

        // When
        let row = root.append(entity::Id::new(9));

        // Then
        assert_eq!(row, 0);
        assert_eq!(root.len(), 1);
        assert_eq!(root.row_of(entity::Id::new(9)), Some(0));
    }

    #[test]
    fn remove_swaps_last_row_in() {
        // Given
        let registry = Registry::new();
        let (pos, _) = setup(&registry);
        let mut archetypes = Archetypes::new();
        let id = archetypes.ensure(Spec::new(vec![pos]));
        let archetype = archetypes.get_mut(id);

        let info = registry.info_of::<Position>().unwrap();
        for i in 0..3 {
            let row = archetype.append(entity::Id::new(i));
            let column = archetype.column_mut(pos).unwrap();
            if !column.is_bound() {
                column.bind(info);
            }
            column.construct_at(row, Position { x: i as f32, y: 0.0 });
        }

        // When - remove the first entity
        let displaced = archetype.remove(entity::Id::new(0));

        // Then - entity 2 moved into row 0, reported for record patching
        assert_eq!(displaced, Some((entity::Id::new(2), 0)));
        assert_eq!(archetype.len(), 2);
        assert_eq!(archetype.row_of(entity::Id::new(2)), Some(0));
        assert_eq!(archetype.row_of(entity::Id::new(0)), None);
        assert_eq!(
            archetype.column(pos).unwrap().get_as::<Position>(0),
            Some(&Position { x: 2.0, y: 0.0 })
        );
        assert!(archetype.flags().contains(DirtyFlags::REMOVED));

        // Then - the row map stays the inverse of the entity list
        for (row, &entity) in archetype.entities().iter().enumerate() {
            assert_eq!(archetype.row_of(entity), Some(row));
        }
    }

    #[test]
    fn remove_last_row_destroys_in_place() {
        // Given
        let registry = Registry::new();
        let (_, label) = setup(&registry);
        let mut archetypes = Archetypes::new();
        let id = archetypes.ensure(Spec::new(vec![label]));
        let archetype = archetypes.get_mut(id);

        let row = archetype.append(entity::Id::new(1));
        let column = archetype.column_mut(label).unwrap();
        column.bind(registry.info_of::<Label>().unwrap());
        column.construct_at(row, Label(String::from("only")));

        // When
        let displaced = archetype.remove(entity::Id::new(1));

        // Then
        assert_eq!(displaced, None);
        assert!(archetype.is_empty());
        assert!(!archetype.column(label).unwrap().is_constructed(0));
    }

    #[test]
    fn remove_unknown_entity_is_ignored() {
        // Given
        let mut archetypes = Archetypes::new();
        let root = archetypes.get_mut(Archetypes::ROOT);
        root.append(entity::Id::new(1));

        // When
        let displaced = root.remove(entity::Id::new(99));

        // Then
        assert_eq!(displaced, None);
        assert_eq!(root.len(), 1);
    }

    #[test]
    fn migrate_moves_shared_components() {
        // Given - entity with Position in (Position), moving to (Position, Label)
        let registry = Registry::new();
        let (pos, label) = setup(&registry);
        let mut archetypes = Archetypes::new();
        let source_id = archetypes.ensure(Spec::new(vec![pos]));
        let dest_id = archetypes.ensure(Spec::new(vec![pos, label]));

        {
            let source = archetypes.get_mut(source_id);
            let row = source.append(entity::Id::new(7));
            let column = source.column_mut(pos).unwrap();
            column.bind(registry.info_of::<Position>().unwrap());
            column.construct_at(row, Position { x: 1.0, y: 2.0 });
        }

        // When
        let (source, dest) = archetypes.get_pair_mut(source_id, dest_id);
        let (dest_row, displaced) = source.migrate_to(0, dest, entity::Id::new(7));

        // Then - the shared column moved, binding the lazy destination column
        assert_eq!(displaced, None);
        assert!(source.is_empty());
        assert_eq!(dest.len(), 1);
        assert_eq!(
            dest.column(pos).unwrap().get_as::<Position>(dest_row),
            Some(&Position { x: 1.0, y: 2.0 })
        );
        assert!(!dest.column(label).unwrap().is_constructed(dest_row));
    }
}
