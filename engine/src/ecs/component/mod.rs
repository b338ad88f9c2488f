//! Component types, identifiers, and the type registry.
//!
//! A component is any `Clone + 'static` value type attached to an entity.
//! The world assigns each distinct component type a small numeric [`Id`] the
//! first time it is observed, together with an [`Info`] record describing how
//! to store it in type-erased columns: its memory layout, an optional copy
//! thunk, and an optional drop thunk.
//!
//! Ids are process-local: the same type can receive different ids in
//! different runs, depending on registration order.
//!
//! # Thread Safety
//!
//! The [`Registry`] uses lock-free reads via `DashMap` and minimal locking
//! for writes, so registration works through `&self`. The world itself is
//! single-threaded; the registry is synchronized so multiple worlds can
//! share one if they need to agree on ids.

mod spec;

pub use spec::{Spec, archash};

use std::{
    alloc::Layout,
    any::TypeId,
    ptr::NonNull,
    sync::{
        RwLock,
        atomic::{AtomicU16, Ordering},
    },
};

use dashmap::DashMap;

/// A component value attached to entities.
///
/// Blanket-implemented for every `Clone + 'static` type: components are
/// arbitrary value types, registered on first use. `Clone` backs the copy
/// thunk used for deep-copying column storage, mirroring the
/// copy-constructible requirement a value store places on its element types.
pub trait Component: Clone + 'static {}

impl<T: Clone + 'static> Component for T {}

/// A unique identifier for a registered component type.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u16);

impl Id {
    /// Construct an id from its raw value.
    #[inline]
    pub const fn new(id: u16) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    #[inline]
    pub const fn value(&self) -> u16 {
        self.0
    }

    /// Get the id as an index into indexable storage.
    #[inline]
    pub const fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Copy thunk: copy-construct one element from `src` into `dst`.
/// `dst` must point at uninitialized storage of the element type.
pub type CopyFn = unsafe fn(NonNull<u8>, NonNull<u8>);

/// Drop thunk: destroy one element in place.
pub type DropFn = unsafe fn(NonNull<u8>);

/// Metadata about a registered component type.
///
/// Carries what type-erased storage needs: the memory layout plus the
/// optional copy/drop thunks. `None` thunks mean the type has no drop glue;
/// such types are copied bytewise and never destroyed.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The component id this info describes.
    id: Id,

    /// The Rust type id, for debug-build type checking.
    type_id: TypeId,

    /// The element's memory layout.
    layout: Layout,

    /// Copy thunk for types with drop glue; `None` means bytewise copy.
    copy_fn: Option<CopyFn>,

    /// Drop thunk for types with drop glue; `None` means nothing to destroy.
    drop_fn: Option<DropFn>,
}

impl Info {
    /// Construct the info record for component type `C`.
    pub fn new<C: Component>(id: Id) -> Self {
        let (copy_fn, drop_fn) = if std::mem::needs_drop::<C>() {
            (
                Some(Self::copy_impl::<C> as CopyFn),
                Some(Self::drop_impl::<C> as DropFn),
            )
        } else {
            (None, None)
        };
        Self {
            id,
            type_id: TypeId::of::<C>(),
            layout: Layout::new::<C>(),
            copy_fn,
            drop_fn,
        }
    }

    /// Get the component id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the Rust type id.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the element layout.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Get the element size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.layout.size()
    }

    /// Get the copy thunk, if the type has one.
    #[inline]
    pub fn copy_fn(&self) -> Option<CopyFn> {
        self.copy_fn
    }

    /// Get the drop thunk, if the type has one.
    #[inline]
    pub fn drop_fn(&self) -> Option<DropFn> {
        self.drop_fn
    }

    /// Copy thunk implementation: clone `src` into the uninitialized `dst`.
    unsafe fn copy_impl<C: Component>(dst: NonNull<u8>, src: NonNull<u8>) {
        unsafe {
            let value = src.cast::<C>().as_ref().clone();
            dst.cast::<C>().as_ptr().write(value);
        }
    }

    /// Drop thunk implementation for types with drop glue.
    unsafe fn drop_impl<C: Component>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.cast::<C>().as_ptr());
        }
    }
}

/// The component type registry.
///
/// Maps Rust types to component [`Id`]s and stores the [`Info`] record for
/// each id. Reads are lock-free via the sharded `DashMap`; the info vector
/// takes a write lock only on first registration of a type.
pub struct Registry {
    /// Map from Rust TypeId to component Id.
    type_map: DashMap<TypeId, Id>,

    /// Info records indexed by component id.
    infos: RwLock<Vec<Option<Info>>>,

    /// Next available component id.
    next_id: AtomicU16,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create an empty registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_id: AtomicU16::new(0),
        }
    }

    /// Register a component type, returning its id.
    ///
    /// The first call for a type allocates the next id and records the
    /// type's [`Info`]; later calls return the existing id.
    pub fn register<C: Component>(&self) -> Id {
        let type_id = TypeId::of::<C>();

        // Fast path: lock-free read for already-registered types.
        if let Some(id) = self.type_map.get(&type_id) {
            return *id;
        }

        // Slow path: the entry API resolves races between first registrations.
        *self
            .type_map
            .entry(type_id)
            .or_insert_with(|| {
                let value = self.next_id.fetch_add(1, Ordering::Relaxed);
                let id = Id(value);

                let mut infos = self.infos.write().unwrap();
                let index = value as usize;
                if index >= infos.len() {
                    infos.resize(index + 1, None);
                }
                infos[index] = Some(Info::new::<C>(id));

                id
            })
            .value()
    }

    /// Get the id for a type, if registered.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<Id> {
        self.type_map.get(&TypeId::of::<C>()).map(|entry| *entry.value())
    }

    /// Get the info record for an id, if registered.
    #[inline]
    pub fn info(&self, id: Id) -> Option<Info> {
        let infos = self.infos.read().unwrap();
        infos.get(id.index()).and_then(|info| *info)
    }

    /// Get the info record for a type, if registered.
    #[inline]
    pub fn info_of<C: Component>(&self) -> Option<Info> {
        let id = self.get::<C>()?;
        self.info(id)
    }

    /// Get the number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// Check whether no types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone)]
    struct Position {
        #[allow(dead_code)]
        x: f32,
        #[allow(dead_code)]
        y: f32,
    }

    #[derive(Clone)]
    struct Label(#[allow(dead_code)] String);

    #[test]
    fn registration_assigns_distinct_ids() {
        // Given
        let registry = Registry::new();

        // When
        let pos_id = registry.register::<Position>();
        let label_id = registry.register::<Label>();

        // Then
        assert_ne!(pos_id, label_id);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.register::<Position>(), pos_id);
    }

    #[test]
    fn unregistered_types_resolve_to_none() {
        // Given
        let registry = Registry::new();
        registry.register::<Position>();

        // Then
        assert!(registry.get::<Position>().is_some());
        assert!(registry.get::<Label>().is_none());
        assert!(registry.info_of::<Label>().is_none());
    }

    #[test]
    fn info_reflects_drop_glue() {
        // Given
        let registry = Registry::new();
        registry.register::<Position>();
        registry.register::<Label>();

        // When
        let plain = registry.info_of::<Position>().unwrap();
        let owning = registry.info_of::<Label>().unwrap();

        // Then - no drop glue means bytewise copy and no destruction
        assert!(plain.copy_fn().is_none());
        assert!(plain.drop_fn().is_none());
        assert!(owning.copy_fn().is_some());
        assert!(owning.drop_fn().is_some());
        assert_eq!(plain.size(), std::mem::size_of::<Position>());
        assert_eq!(plain.type_id(), std::any::TypeId::of::<Position>());
    }

    #[test]
    fn info_lookup_by_id() {
        // Given
        let registry = Registry::new();
        let id = registry.register::<Position>();

        // Then
        assert_eq!(registry.info(id).unwrap().id(), id);
        assert!(registry.info(Id::new(200)).is_none());
    }
}
