//! Low-level memory management for type-erased columns.
//!
//! [`ErasedMemory`] manages a contiguous allocation of uniform-layout
//! elements without compile-time type information: just a base pointer, a
//! capacity, and the element [`Layout`]. It makes no assumptions about
//! whether elements are initialized or need dropping; the owning
//! [`Column`](super::column::Column) tracks both.
//!
//! Zero-sized layouts never touch the allocator: the base pointer stays a
//! well-aligned dangling pointer and the capacity is unbounded, so columns of
//! tag components cost nothing per row.

use std::{
    alloc::{self, Layout},
    ptr::NonNull,
};

/// A contiguous, growable block of uniform-layout elements with no type
/// information.
///
/// # Safety
///
/// This structure does **not** track initialization or run destructors. The
/// caller must:
/// - only read elements it has written,
/// - drop initialized elements before the memory is released or overwritten,
/// - keep indices within the reserved capacity.
pub struct ErasedMemory {
    /// Base pointer of the allocation (dangling until the first grow, and
    /// always dangling for zero-sized layouts).
    ptr: NonNull<u8>,
    /// Number of elements the allocation can hold.
    capacity: usize,
    /// The memory layout of one element.
    element_layout: Layout,
}

impl ErasedMemory {
    /// Construct an empty block for elements of the given layout.
    #[inline]
    pub fn new(element_layout: Layout) -> Self {
        Self {
            ptr: dangling_for(element_layout),
            // A zero-sized element never needs backing bytes; report
            // unbounded capacity so growth is a no-op.
            capacity: if element_layout.size() == 0 {
                usize::MAX
            } else {
                0
            },
            element_layout,
        }
    }

    /// Number of elements the current allocation can hold.
    #[inline]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get a pointer to the element at the given index.
    ///
    /// The caller must have initialized the element before reading through
    /// the pointer.
    #[inline]
    pub fn ptr_at(&self, index: usize) -> NonNull<u8> {
        debug_assert!(
            index < self.capacity,
            "index {} out of bounds (capacity: {})",
            index,
            self.capacity
        );
        // A zero-sized element never advances the pointer.
        unsafe { self.ptr.add(index * self.element_layout.size()) }
    }

    /// Ensure capacity for at least `capacity` elements, at least doubling on
    /// each reallocation so repeated appends stay amortized O(1). Existing
    /// element bytes are preserved.
    pub fn ensure(&mut self, capacity: usize) {
        if capacity <= self.capacity {
            return;
        }
        self.grow_to(capacity.max(self.capacity * 2));
    }

    /// Grow the allocation to exactly `capacity` elements.
    fn grow_to(&mut self, capacity: usize) {
        debug_assert!(self.element_layout.size() > 0, "zero-sized elements never grow");

        let new_layout = layout_for(self.element_layout, capacity);
        let new_ptr = if self.capacity == 0 {
            unsafe { alloc::alloc(new_layout) }
        } else {
            let old_layout = layout_for(self.element_layout, self.capacity);
            unsafe { alloc::realloc(self.ptr.as_ptr(), old_layout, new_layout.size()) }
        };

        let Some(new_ptr) = NonNull::new(new_ptr) else {
            alloc::handle_alloc_error(new_layout);
        };

        self.ptr = new_ptr;
        self.capacity = capacity;
    }
}

impl Drop for ErasedMemory {
    fn drop(&mut self) {
        // Zero-sized layouts never allocated; capacity 0 never allocated.
        if self.element_layout.size() > 0 && self.capacity > 0 {
            let layout = layout_for(self.element_layout, self.capacity);
            unsafe {
                alloc::dealloc(self.ptr.as_ptr(), layout);
            }
        }
    }
}

// SAFETY: ErasedMemory owns its allocation and exposes no interior
// mutability. The owner is responsible for the Send/Sync-ness of whatever it
// stores inside.
unsafe impl Send for ErasedMemory {}
unsafe impl Sync for ErasedMemory {}

/// The layout of `capacity` consecutive elements.
fn layout_for(element: Layout, capacity: usize) -> Layout {
    Layout::from_size_align(
        element.size().checked_mul(capacity).expect("layout overflow"),
        element.align(),
    )
    .expect("layout overflow")
}

/// A dangling pointer correctly aligned for the given layout.
fn dangling_for(layout: Layout) -> NonNull<u8> {
    // align is non-zero by Layout's contract, so the pointer is non-null.
    unsafe { NonNull::new_unchecked(std::ptr::without_provenance_mut(layout.align())) }
}
