//! The world: entity allocation, component CRUD, and queries.
//!
//! A [`World`] owns the archetype registry, the entity allocator, the
//! component-type registry, the entity location records, and the query
//! caches. Every mutation is a graph traversal: adding or removing a
//! component resolves the destination archetype through the cached
//! add/remove edges, migrates the entity's row, and marks the touched
//! archetypes dirty for the query caches.
//!
//! # Handles
//!
//! All operations validate the handle's generation first. Stale handles are
//! never fatal: mutations silently no-op, reads return `None` / `false`.
//!
//! # Example
//!
//! ```rust,ignore
//! let mut world = World::new();
//!
//! let e = world.entity();
//! world
//!     .set(e, Position { x: 1.0, y: 2.0 })
//!     .set(e, Velocity { dx: 0.1, dy: 0.0 });
//!
//! for (entity, position, velocity) in world.query::<(Position, Velocity)>() {
//!     // row order within an archetype, archetype order unspecified
//! }
//!
//! world.despawn(e);
//! ```

use std::collections::HashMap;

use log::trace;

use crate::ecs::{
    component::{self, Component},
    entity::{self, Entity},
    query::{Data, QueryCache},
    storage::{
        archetype::{self, Archetype, Archetypes},
        change::DirtyFlags,
        location::Location,
    },
};

/// An archetype-based entity-component store.
pub struct World {
    /// Every archetype, the root included, plus the transition graph.
    archetypes: Archetypes,

    /// Location record per entity that has components.
    records: HashMap<entity::Id, Location>,

    /// The generational entity allocator.
    entities: entity::Allocator,

    /// The component-type registry.
    components: component::Registry,

    /// Query caches keyed by signature hash.
    caches: HashMap<u64, QueryCache>,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    /// Create an empty world.
    pub fn new() -> Self {
        Self {
            archetypes: Archetypes::new(),
            records: HashMap::new(),
            entities: entity::Allocator::new(),
            components: component::Registry::new(),
            caches: HashMap::new(),
        }
    }

    /// Create a live entity.
    ///
    /// Freed ids are recycled with a bumped generation before new ids are
    /// minted. The entity starts without components and without a location
    /// record; it enters an archetype on its first `set`.
    #[must_use = "the returned handle is the only way to reach the entity"]
    pub fn entity(&mut self) -> Entity {
        self.entities.alloc()
    }

    /// Despawn an entity: destroy its components, release its row, and
    /// retire the handle.
    ///
    /// No-op when the handle is stale.
    pub fn despawn(&mut self, entity: Entity) {
        if !self.entities.matches(entity) {
            trace!("despawn ignored for stale handle {entity:?}");
            return;
        }

        let id = entity.id();
        if let Some(location) = self.records.remove(&id) {
            let archetype = self.archetypes.get_mut(location.archetype());
            archetype.destroy_components_at(location.row());
            let displaced = archetype.remove(id);
            self.patch_displaced(location.archetype(), displaced);
        }
        self.entities.free(entity);
    }

    /// Attach or replace a component value on an entity. Chainable.
    ///
    /// An entity without a record enters the archetype one `add(C)` edge
    /// from the root. An entity that already has the component is updated
    /// in place, in the same slot, without any column reallocation. An
    /// entity gaining a new component migrates along the `add(C)` edge.
    ///
    /// No-op when the handle is stale.
    pub fn set<C: Component>(&mut self, entity: Entity, value: C) -> &mut Self {
        if !self.entities.matches(entity) {
            trace!("set ignored for stale handle {entity:?}");
            return self;
        }

        let component_id = self.components.register::<C>();
        let id = entity.id();

        match self.records.get(&id).copied() {
            None => {
                let dest = self.archetypes.with_component(Archetypes::ROOT, component_id);
                self.ensure_column(dest, component_id);
                let archetype = self.archetypes.get_mut(dest);
                let row = archetype.append(id);
                if let Some(column) = archetype.column_mut(component_id) {
                    column.construct_at(row, value);
                }
                self.records.insert(id, Location::new(dest, row));
            }
            Some(location) if self.archetypes.get(location.archetype()).has(component_id) => {
                // In-place update: destroy and reconstruct within the slot.
                // The update path never resizes a column, so pointers held
                // by the query cache stay valid.
                let archetype = self.archetypes.get_mut(location.archetype());
                if let Some(column) = archetype.column_mut(component_id) {
                    column.destroy_at(location.row());
                    column.construct_at(location.row(), value);
                }
                archetype.mark(DirtyFlags::UPDATED);
            }
            Some(location) => {
                let dest = self.archetypes.with_component(location.archetype(), component_id);
                self.ensure_column(dest, component_id);
                let moved = self.move_entity(id, location, dest);
                let archetype = self.archetypes.get_mut(dest);
                if let Some(column) = archetype.column_mut(component_id) {
                    column.construct_at(moved.row(), value);
                }
            }
        }
        self
    }

    /// Get a reference to an entity's component, if present.
    ///
    /// Returns `None` for stale handles, unknown component types, and
    /// entities without the component.
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        if !self.entities.matches(entity) {
            return None;
        }
        let component_id = self.components.get::<C>()?;
        let location = self.records.get(&entity.id())?;
        self.archetypes
            .get(location.archetype())
            .column(component_id)?
            .get_as::<C>(location.row())
    }

    /// Get a mutable reference to an entity's component, if present.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        if !self.entities.matches(entity) {
            return None;
        }
        let component_id = self.components.get::<C>()?;
        let location = self.records.get(&entity.id()).copied()?;
        self.archetypes
            .get_mut(location.archetype())
            .column_mut(component_id)?
            .get_as_mut::<C>(location.row())
    }

    /// Check whether an entity currently has a component, without touching
    /// the component data.
    pub fn has<C: Component>(&self, entity: Entity) -> bool {
        if !self.entities.matches(entity) {
            return false;
        }
        let Some(component_id) = self.components.get::<C>() else {
            return false;
        };
        self.records
            .get(&entity.id())
            .is_some_and(|location| self.archetypes.get(location.archetype()).has(component_id))
    }

    /// Detach a component from an entity. Chainable.
    ///
    /// Destroys the value and migrates the entity along the `remove(C)`
    /// edge; the entity returns to the archetype it would have without the
    /// component. No-op when the handle is stale or the component absent.
    pub fn remove<C: Component>(&mut self, entity: Entity) -> &mut Self {
        if !self.entities.matches(entity) {
            trace!("remove ignored for stale handle {entity:?}");
            return self;
        }

        let component_id = self.components.register::<C>();
        let id = entity.id();
        let Some(location) = self.records.get(&id).copied() else {
            return self;
        };
        if !self.archetypes.get(location.archetype()).has(component_id) {
            return self;
        }

        // The departing value dies here; migration only moves the rest.
        if let Some(column) = self
            .archetypes
            .get_mut(location.archetype())
            .column_mut(component_id)
        {
            column.destroy_at(location.row());
        }

        let dest = self
            .archetypes
            .without_component(location.archetype(), component_id);
        self.move_entity(id, location, dest);
        self
    }

    /// Run a query, returning one tuple per matching entity.
    ///
    /// `Q` is a tuple of component types; each item is
    /// `(Entity, &C1, ..., &Cn)` in the tuple's order. An entity matches
    /// when its archetype contains every requested component. Row order is
    /// preserved within an archetype; archetype order is unspecified.
    ///
    /// Results are cached per signature and refreshed incrementally from
    /// the dirty flags of the archetype the cache last matched; see the
    /// [`query`](crate::ecs::query) module docs for the exact rules.
    pub fn query<Q: Data>(&mut self) -> Vec<Q::Item<'_>> {
        let ids = Q::component_ids(&self.components);
        let mut sorted = ids.clone();
        sorted.sort_unstable();
        // ids is drawn from sorted, so the search cannot miss
        let positions: Vec<usize> = ids
            .iter()
            .map(|id| sorted.binary_search(id).unwrap_or(0))
            .collect();
        let qhash = component::archash(&sorted);

        let entry = self
            .caches
            .entry(qhash)
            .or_insert_with(|| QueryCache::new(sorted.len()));

        if let Some(archetype_id) = entry.archetype {
            let archetype = self.archetypes.get(archetype_id);
            let flags = archetype.flags();

            // Fresh: nothing changed since the snapshot.
            if entry.entity_count == archetype.len() && flags.is_empty() {
                return collect_rows::<Q>(entry, &positions);
            }

            // Rows appended, nothing else: extend the snapshot.
            if flags == DirtyFlags::ADDED && entry.entity_count <= archetype.len() {
                for row in entry.entity_count..archetype.len() {
                    push_row(entry, archetype, &self.entities, &sorted, row);
                }
                entry.entity_count = archetype.len();
                self.archetypes
                    .get_mut(archetype_id)
                    .clear_flag(DirtyFlags::ADDED);
                return collect_rows::<Q>(entry, &positions);
            }

            // Rows removed, nothing else: drop vanished entities and
            // re-resolve the survivors' rows, which swap-removal may have
            // relocated.
            if flags == DirtyFlags::REMOVED {
                let cached = std::mem::take(&mut entry.entities);
                entry.pointers.clear();
                for encoded in cached {
                    let Some(row) = archetype.row_of(encoded.id()) else {
                        continue;
                    };
                    let base = entry.pointers.len();
                    let mut complete = true;
                    for &component_id in &sorted {
                        match archetype
                            .column(component_id)
                            .and_then(|column| column.get(row))
                        {
                            Some(pointer) => entry.pointers.push(pointer),
                            None => {
                                entry.pointers.truncate(base);
                                complete = false;
                                break;
                            }
                        }
                    }
                    if complete {
                        entry.entities.push(encoded);
                    }
                }
                entry.entity_count = archetype.len();
                self.archetypes
                    .get_mut(archetype_id)
                    .clear_flag(DirtyFlags::REMOVED);
                return collect_rows::<Q>(entry, &positions);
            }

            // Updated in place, nothing else: cached pointers still point
            // at the same slots because the update path never resizes.
            if flags == DirtyFlags::UPDATED && entry.entity_count == archetype.len() {
                self.archetypes
                    .get_mut(archetype_id)
                    .clear_flag(DirtyFlags::UPDATED);
                return collect_rows::<Q>(entry, &positions);
            }
        }

        // Anything else: rebuild from a full archetype scan. Dirty flags
        // stay untouched here; other caches watching the same archetypes
        // still need them.
        entry.reset();
        for (archetype_id, archetype) in self.archetypes.iter() {
            if !sorted
                .iter()
                .all(|&component_id| archetype.has(component_id))
            {
                continue;
            }
            entry.archetype = Some(archetype_id);
            entry.entity_count = archetype.len();
            for row in 0..archetype.len() {
                push_row(entry, archetype, &self.entities, &sorted, row);
            }
        }
        collect_rows::<Q>(entry, &positions)
    }

    /// Get the number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check whether no entities are live.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Bind an archetype's column for `component_id` on first use and seed
    /// its capacity.
    fn ensure_column(&mut self, archetype_id: archetype::Id, component_id: component::Id) {
        let Some(info) = self.components.info(component_id) else {
            return;
        };
        let archetype = self.archetypes.get_mut(archetype_id);
        let capacity = archetype.capacity();
        if let Some(column) = archetype.column_mut(component_id)
            && !column.is_bound()
        {
            column.bind(info);
            column.resize(capacity.max(16));
        }
    }

    /// Move an entity's row to another archetype, carrying the shared
    /// components, and update its record. No-op when source and destination
    /// are the same archetype.
    fn move_entity(&mut self, id: entity::Id, source: Location, dest: archetype::Id) -> Location {
        if source.archetype() == dest {
            return source;
        }

        let (from, to) = self.archetypes.get_pair_mut(source.archetype(), dest);
        let (row, displaced) = from.migrate_to(source.row(), to, id);
        self.patch_displaced(source.archetype(), displaced);

        let location = Location::new(dest, row);
        self.records.insert(id, location);
        location
    }

    /// Repair the record of an entity relocated by a swap-remove.
    fn patch_displaced(
        &mut self,
        archetype_id: archetype::Id,
        displaced: Option<(entity::Id, usize)>,
    ) {
        if let Some((moved, row)) = displaced
            && let Some(record) = self.records.get_mut(&moved)
        {
            *record = Location::new(archetype_id, row);
        }
    }
}

/// Append one archetype row to a cache entry, skipping entities whose id
/// was never minted and rows with an unconstructed requested component.
fn push_row(
    cache: &mut QueryCache,
    archetype: &Archetype,
    entities: &entity::Allocator,
    sorted_ids: &[component::Id],
    row: usize,
) {
    let id = archetype.entities()[row];
    let Some(generation) = entities.generation_of(id) else {
        return;
    };

    let base = cache.pointers.len();
    for &component_id in sorted_ids {
        match archetype
            .column(component_id)
            .and_then(|column| column.get(row))
        {
            Some(pointer) => cache.pointers.push(pointer),
            None => {
                cache.pointers.truncate(base);
                return;
            }
        }
    }
    cache.entities.push(Entity::new(id, generation));
}

/// Materialize a cache entry into typed result tuples.
fn collect_rows<'w, Q: Data>(cache: &QueryCache, positions: &[usize]) -> Vec<Q::Item<'w>> {
    debug_assert!(positions.iter().all(|&p| p < cache.width().max(1)));
    (0..cache.len())
        .map(|index| unsafe { Q::item(cache.entities[index], cache.row_pointers(index), positions) })
        .collect()
}
