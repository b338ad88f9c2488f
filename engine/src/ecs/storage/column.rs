//! Type-erased column storage with per-row construction tracking.
//!
//! A [`Column`] owns a raw byte buffer of `capacity * element_size` bytes
//! plus a bitmap recording which rows currently hold a live value. The
//! element type is erased: the column carries a [`component::Info`] with the
//! layout and the copy/drop thunks it needs, installed when the column is
//! bound to a concrete type.
//!
//! # Example Usage
//!
//! ```rust,ignore
//! let registry = component::Registry::new();
//! registry.register::<String>();
//!
//! let mut column = Column::new();
//! column.bind(registry.info_of::<String>().unwrap());
//!
//! column.construct_at(0, String::from("Hello"));
//! column.construct_at(1, String::from("World"));
//!
//! assert_eq!(column.get_as::<String>(0).unwrap(), "Hello");
//! column.destroy_at(0);
//! assert!(column.get_as::<String>(0).is_none());
//! ```
//!
//! # Safety
//!
//! The column maintains these invariants:
//! - `get(row)` returns a pointer exactly when `constructed[row]` is set.
//! - Constructing a row sets its bit; destroying a row clears it, for
//!   trivially destructible types too.
//! - Capacity only grows. Growth relocates live rows into the new buffer
//!   and frees the old one; the strong guarantee holds because the new
//!   buffer is allocated before anything is moved.
//! - Dropping the column destroys every constructed row and nothing else.
//!
//! Relocation - growth, swap-remove compaction, and cross-column transfer -
//! is a bitwise move for every element type: the source bit is cleared and
//! the source bytes are forgotten, never dropped. The copy thunk is reserved
//! for deep copies ([`Column::clone`]).

use std::{
    alloc::{self, Layout},
    any::TypeId,
    ptr::{self, NonNull},
};

use fixedbitset::FixedBitSet;

use crate::ecs::component::{self, Component};

/// A type-erased, row-addressable buffer for one component type.
pub struct Column {
    /// The raw buffer; null until the first allocation.
    ptr: *mut u8,

    /// Number of row slots in the buffer (and bits in the bitmap).
    cap: usize,

    /// The bound element type, or `None` while unbound.
    info: Option<component::Info>,

    /// One bit per row: set while the row holds a live value.
    constructed: FixedBitSet,
}

impl Default for Column {
    fn default() -> Self {
        Self::new()
    }
}

impl Column {
    /// Create an empty, unbound column.
    #[inline]
    pub fn new() -> Self {
        Self {
            ptr: ptr::null_mut(),
            cap: 0,
            info: None,
            constructed: FixedBitSet::new(),
        }
    }

    /// Bind the column to a concrete element type.
    ///
    /// Binding allocates backing storage for any rows reserved while the
    /// column was unbound. Rebinding to the same type is a no-op; rebinding
    /// to a different type discards the current contents first.
    pub fn bind(&mut self, info: component::Info) {
        if let Some(bound) = self.info {
            if bound.type_id() == info.type_id() {
                return;
            }
            self.clear();
        }
        self.info = Some(info);
        if self.cap > 0 && info.size() > 0 {
            let layout = buffer_layout(&info, self.cap);
            unsafe {
                let ptr = alloc::alloc(layout);
                if ptr.is_null() {
                    alloc::handle_alloc_error(layout);
                }
                self.ptr = ptr;
            }
        }
        self.constructed.grow(self.cap);
    }

    /// Grow the column to hold at least `new_cap` rows.
    ///
    /// A no-op when `new_cap` does not exceed the current capacity. Live
    /// rows are relocated into the new buffer by bitwise move; the bitmap
    /// is extended with clear bits.
    pub fn resize(&mut self, new_cap: usize) {
        if new_cap <= self.cap {
            return;
        }
        if let Some(info) = self.info
            && info.size() > 0
        {
            let new_layout = buffer_layout(&info, new_cap);
            unsafe {
                let new_ptr = alloc::alloc(new_layout);
                if new_ptr.is_null() {
                    alloc::handle_alloc_error(new_layout);
                }
                if !self.ptr.is_null() {
                    ptr::copy_nonoverlapping(self.ptr, new_ptr, info.size() * self.cap);
                    alloc::dealloc(self.ptr, buffer_layout(&info, self.cap));
                }
                self.ptr = new_ptr;
            }
        }
        self.constructed.grow(new_cap);
        self.cap = new_cap;
    }

    /// Place a value at `row`, growing the column if the row is out of
    /// range. Returns the row.
    ///
    /// The slot must not currently hold a live value; callers destroy the
    /// old value first when overwriting in place.
    ///
    /// # Panics
    /// In debug builds, panics if the column is unbound, bound to a
    /// different type, or the slot is still constructed.
    pub fn construct_at<C: Component>(&mut self, row: usize, value: C) -> usize {
        debug_assert!(self.info.is_some(), "column must be bound before construction");
        self.debug_check_type::<C>();

        if row >= self.cap {
            self.resize((self.cap * 2).max(row + 1));
        }
        debug_assert!(
            !self.constructed.contains(row),
            "slot must be destroyed before reconstruction"
        );

        unsafe {
            self.slot(row).cast::<C>().as_ptr().write(value);
        }
        self.constructed.insert(row);
        row
    }

    /// Destroy the value at `row`, if the slot is constructed.
    ///
    /// Runs the drop thunk when the type has one; the constructed bit is
    /// cleared either way.
    pub fn destroy_at(&mut self, row: usize) {
        if row >= self.cap || !self.constructed.contains(row) {
            return;
        }
        if let Some(info) = self.info
            && let Some(drop_fn) = info.drop_fn()
        {
            unsafe {
                drop_fn(self.slot(row));
            }
        }
        self.constructed.set(row, false);
    }

    /// Get the raw pointer to `row`, if the slot holds a live value.
    #[inline]
    pub fn get(&self, row: usize) -> Option<NonNull<u8>> {
        if row >= self.cap || self.info.is_none() || !self.constructed.contains(row) {
            return None;
        }
        Some(self.slot(row))
    }

    /// Get a typed reference to the value at `row`, if the slot is live.
    ///
    /// # Panics
    /// In debug builds, panics if `C` is not the bound type.
    #[inline]
    pub fn get_as<C: Component>(&self, row: usize) -> Option<&C> {
        self.debug_check_type::<C>();
        self.get(row).map(|ptr| unsafe { ptr.cast::<C>().as_ref() })
    }

    /// Get a typed mutable reference to the value at `row`, if the slot is
    /// live.
    ///
    /// # Panics
    /// In debug builds, panics if `C` is not the bound type.
    #[inline]
    pub fn get_as_mut<C: Component>(&mut self, row: usize) -> Option<&mut C> {
        self.debug_check_type::<C>();
        self.get(row).map(|ptr| unsafe { ptr.cast::<C>().as_mut() })
    }

    /// Set the constructed bit without running a constructor.
    ///
    /// Used after a raw relocation placed a live value in the slot by other
    /// means.
    #[inline]
    pub fn mark_constructed(&mut self, row: usize) {
        debug_assert!(row < self.cap, "row out of range");
        self.constructed.insert(row);
    }

    /// Check whether `row` holds a live value.
    #[inline]
    pub fn is_constructed(&self, row: usize) -> bool {
        self.constructed.contains(row)
    }

    /// Move the live value at `from` into the empty slot at `to`.
    ///
    /// Bitwise move: `from`'s bit is cleared without dropping.
    pub(crate) fn relocate(&mut self, from: usize, to: usize) {
        debug_assert!(self.constructed.contains(from), "source slot not constructed");
        debug_assert!(!self.constructed.contains(to), "target slot still constructed");
        if from == to {
            return;
        }
        if let Some(info) = self.info
            && info.size() > 0
        {
            unsafe {
                ptr::copy_nonoverlapping(self.slot(from).as_ptr(), self.slot(to).as_ptr(), info.size());
            }
        }
        self.constructed.set(from, false);
        self.mark_constructed(to);
    }

    /// Move the live value at `row` into `dest` at `dest_row`.
    ///
    /// Both columns must be bound to the same type, and the destination
    /// slot must be empty and within capacity. Bitwise move: the source bit
    /// is cleared without dropping.
    pub(crate) fn transfer_to(&mut self, row: usize, dest: &mut Column, dest_row: usize) {
        debug_assert!(self.constructed.contains(row), "source slot not constructed");
        debug_assert!(dest_row < dest.cap, "destination row out of range");
        debug_assert!(!dest.constructed.contains(dest_row), "destination slot still constructed");
        debug_assert_eq!(
            self.info.map(|info| info.type_id()),
            dest.info.map(|info| info.type_id()),
            "column element types differ"
        );

        if let Some(info) = self.info
            && info.size() > 0
        {
            unsafe {
                ptr::copy_nonoverlapping(
                    self.slot(row).as_ptr(),
                    dest.slot(dest_row).as_ptr(),
                    info.size(),
                );
            }
        }
        self.constructed.set(row, false);
        dest.mark_constructed(dest_row);
    }

    /// Destroy every constructed row and release the buffer.
    ///
    /// The binding is kept; capacity drops to zero.
    pub fn clear(&mut self) {
        if let Some(info) = self.info {
            if let Some(drop_fn) = info.drop_fn() {
                for row in self.constructed.ones() {
                    unsafe {
                        drop_fn(self.slot(row));
                    }
                }
            }
            if !self.ptr.is_null() {
                unsafe {
                    alloc::dealloc(self.ptr, buffer_layout(&info, self.cap));
                }
                self.ptr = ptr::null_mut();
            }
        }
        self.cap = 0;
        self.constructed = FixedBitSet::new();
    }

    /// Move the column's contents out, leaving this column empty and
    /// unbound with capacity zero.
    #[inline]
    pub fn take(&mut self) -> Column {
        std::mem::take(self)
    }

    /// Get the bound element info, if any.
    #[inline]
    pub fn info(&self) -> Option<component::Info> {
        self.info
    }

    /// Check whether the column has been bound to an element type.
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.info.is_some()
    }

    /// Get the number of row slots.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Get the bound element size in bytes; zero while unbound.
    #[inline]
    pub fn element_size(&self) -> usize {
        self.info.map(|info| info.size()).unwrap_or(0)
    }

    /// Check whether the bound type carries a copy thunk.
    #[inline]
    pub fn has_copy_fn(&self) -> bool {
        self.info.is_some_and(|info| info.copy_fn().is_some())
    }

    /// Check whether the bound type carries a drop thunk.
    #[inline]
    pub fn has_drop_fn(&self) -> bool {
        self.info.is_some_and(|info| info.drop_fn().is_some())
    }

    /// Pointer to the slot at `row`. For zero-sized types this is a
    /// well-aligned dangling pointer; no buffer is ever allocated.
    #[inline]
    fn slot(&self, row: usize) -> NonNull<u8> {
        debug_assert!(row < self.cap, "row out of range");
        let Some(info) = self.info else {
            unreachable!("slot access on unbound column");
        };
        if info.size() == 0 {
            // SAFETY: alignments are non-zero.
            return unsafe {
                NonNull::new_unchecked(ptr::without_provenance_mut(info.layout().align()))
            };
        }
        debug_assert!(!self.ptr.is_null(), "column buffer missing");
        // SAFETY: ptr is non-null and row is within the allocated capacity.
        unsafe { NonNull::new_unchecked(self.ptr.add(row * info.size())) }
    }

    /// Assert in debug builds that `C` is the bound element type.
    #[inline]
    fn debug_check_type<C: Component>(&self) {
        debug_assert!(
            self.info.is_none_or(|info| info.type_id() == TypeId::of::<C>()),
            "type {} does not match the column's bound type",
            std::any::type_name::<C>()
        );
    }
}

impl Clone for Column {
    /// Deep-copy the column: every constructed row is cloned through the
    /// copy thunk, or copied bytewise when the type has none.
    fn clone(&self) -> Self {
        let mut copy = Column::new();
        copy.info = self.info;

        let Some(info) = self.info else {
            copy.cap = self.cap;
            copy.constructed = self.constructed.clone();
            return copy;
        };

        if self.cap > 0 {
            copy.resize(self.cap);
            if let Some(copy_fn) = info.copy_fn() {
                // Bits are set per row so a panicking clone never leaves the
                // copy claiming rows it does not own.
                for row in self.constructed.ones() {
                    unsafe {
                        copy_fn(copy.slot(row), self.slot(row));
                    }
                    copy.constructed.insert(row);
                }
            } else {
                if info.size() > 0 && !self.ptr.is_null() {
                    unsafe {
                        ptr::copy_nonoverlapping(self.ptr, copy.ptr, info.size() * self.cap);
                    }
                }
                copy.constructed = self.constructed.clone();
            }
        }
        copy
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        self.clear();
    }
}

/// Layout for a buffer of `cap` elements.
///
/// # Panics
/// Panics when the total size overflows, as `Vec` growth does.
fn buffer_layout(info: &component::Info, cap: usize) -> Layout {
    let size = info
        .size()
        .checked_mul(cap)
        .expect("column capacity overflows usize");
    Layout::from_size_align(size, info.layout().align()).expect("column capacity overflows isize")
}
