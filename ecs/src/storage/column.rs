use std::{any::TypeId, ptr::NonNull};

use crate::{
    component::{Component, Info},
    storage::{
        Row,
        mem::ErasedMemory,
    },
};

/// A type-erased, contiguous column of component instances.
///
/// All elements share the layout captured in the column's [`Info`]; the
/// static type is gone after construction and every operation works on raw
/// bytes plus the descriptor's drop function. A typed facade (`get`,
/// `get_mut`) re-checks the type at runtime before handing out references.
///
/// # Invariants
/// - Elements `[0..len)` are initialized, except for a row handed out by
///   [`push_uninit`](Column::push_uninit) that the caller has not yet filled.
/// - Every element is destroyed exactly once: by `swap_remove`,
///   `drop_in_place`, `clear`, or the column's own drop, never by more than
///   one of them.
pub struct Column {
    /// The raw backing allocation.
    data: ErasedMemory,

    /// Number of elements currently stored.
    len: usize,

    /// Descriptor of the element type (layout, drop function).
    info: Info,
}

impl Column {
    /// Create a new empty column for the described component type.
    #[inline]
    pub fn new(info: Info) -> Self {
        Self {
            data: ErasedMemory::new(info.layout()),
            len: 0,
            info,
        }
    }

    /// Get the column's component descriptor.
    #[inline]
    pub fn info(&self) -> &Info {
        &self.info
    }

    /// Get the number of elements in the column.
    #[inline]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Check if the column is empty.
    #[inline]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Grow the column by one uninitialized element and return its row.
    ///
    /// # Safety
    /// The caller must initialize the returned row via
    /// [`init_from`](Column::init_from) before any operation that reads,
    /// moves, or drops it.
    pub unsafe fn push_uninit(&mut self) -> Row {
        self.data.ensure(self.len + 1);
        let row = Row::new(self.len);
        self.len += 1;
        row
    }

    /// Initialize a row by copying one element's bytes from `src`.
    ///
    /// Ownership of the source instance moves into the column; the caller
    /// must not drop it afterwards.
    ///
    /// # Safety
    /// - `row` must be within the column.
    /// - `src` must point to a live instance of the column's element type,
    ///   not overlapping the destination row.
    /// - The destination row must be uninitialized (or already moved out).
    pub unsafe fn init_from(&mut self, row: Row, src: NonNull<u8>) {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        unsafe {
            std::ptr::copy_nonoverlapping(
                src.as_ptr(),
                self.data.ptr_at(row.index()).as_ptr(),
                self.info.layout().size(),
            );
        }
    }

    /// Get a pointer to the element at the given row.
    #[inline]
    pub fn ptr_at(&self, row: Row) -> NonNull<u8> {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        self.data.ptr_at(row.index())
    }

    /// Run the destructor on the element at `row`, leaving its bytes in
    /// place. Used when a component is discarded while the row itself is
    /// about to be recycled by a swap-remove-without-destructor pass.
    ///
    /// # Safety
    /// - `row` must be initialized and within the column.
    /// - The element must not be read, moved, or dropped again afterwards.
    pub unsafe fn drop_in_place(&mut self, row: Row) {
        debug_assert!(row.index() < self.len, "row index out of bounds");
        unsafe {
            (self.info.drop_fn())(self.data.ptr_at(row.index()));
        }
    }

    /// Remove the element at `row`, running its destructor, and move the last
    /// element into its place.
    ///
    /// # Safety
    /// - `row` must be initialized and within the column.
    pub unsafe fn swap_remove(&mut self, row: Row) {
        unsafe {
            self.drop_in_place(row);
            self.swap_remove_forget(row);
        }
    }

    /// Remove the element at `row` **without** running its destructor, moving
    /// the last element into its place. Used when the element's bytes have
    /// already moved to a new home (archetype migration).
    ///
    /// # Safety
    /// - `row` must be within the column.
    /// - The element at `row` must be uninitialized, moved out, or already
    ///   destroyed.
    pub unsafe fn swap_remove_forget(&mut self, row: Row) {
        debug_assert!(row.index() < self.len, "row index out of bounds");

        let last = self.len - 1;
        if row.index() < last {
            unsafe {
                std::ptr::copy_nonoverlapping(
                    self.data.ptr_at(last).as_ptr(),
                    self.data.ptr_at(row.index()).as_ptr(),
                    self.info.layout().size(),
                );
            }
        }
        self.len -= 1;
    }

    /// Run the destructor on every live element and empty the column.
    pub fn clear(&mut self) {
        for index in 0..self.len {
            unsafe {
                (self.info.drop_fn())(self.data.ptr_at(index));
            }
        }
        self.len = 0;
    }

    /// Get a reference to the component at the given row.
    ///
    /// Returns `None` if the row is out of bounds.
    ///
    /// # Panics
    /// Panics if type `C` doesn't match the column's component type.
    pub fn get<C: Component>(&self, row: Row) -> Option<&C> {
        self.ensure_type::<C>();
        if row.index() >= self.len {
            return None;
        }
        // SAFETY: the row is initialized and the type was just checked.
        Some(unsafe { self.data.ptr_at(row.index()).cast::<C>().as_ref() })
    }

    /// Get a mutable reference to the component at the given row.
    ///
    /// Returns `None` if the row is out of bounds.
    ///
    /// # Panics
    /// Panics if type `C` doesn't match the column's component type.
    pub fn get_mut<C: Component>(&mut self, row: Row) -> Option<&mut C> {
        self.ensure_type::<C>();
        if row.index() >= self.len {
            return None;
        }
        // SAFETY: the row is initialized and the type was just checked.
        Some(unsafe { self.data.ptr_at(row.index()).cast::<C>().as_mut() })
    }

    /// Ensure the static type `C` is the column's element type.
    ///
    /// This runs in every build profile; a mismatch here would otherwise
    /// reinterpret raw bytes.
    ///
    /// # Panics
    /// Panics if the TypeId of `C` doesn't match the column's stored type.
    #[inline]
    fn ensure_type<C: Component>(&self) {
        assert!(
            TypeId::of::<C>() == self.info.type_id(),
            "type mismatch: attempted to use type {} with a column storing {:?}",
            std::any::type_name::<C>(),
            self.info
        );
    }
}

impl Drop for Column {
    fn drop(&mut self) {
        // Drop all elements - the ErasedMemory handles deallocation.
        self.clear();
    }
}
