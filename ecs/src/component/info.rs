use std::{alloc::Layout, any::TypeId, ptr::NonNull};

use crate::component::{Component, Id};

/// Metadata about a registered component type.
///
/// Contains everything the type-erased storage needs to manage instances it
/// cannot name: the memory layout and the drop function. The `TypeId` is kept
/// for runtime checks on the typed access paths.
#[derive(Debug, Clone, Copy)]
pub struct Info {
    /// The component id assigned by the registry.
    id: Id,

    /// The Rust TypeId for runtime type checking.
    type_id: TypeId,

    /// The memory layout of one instance.
    layout: Layout,

    /// The drop function for one instance (a no-op for types without drop glue).
    drop_fn: unsafe fn(NonNull<u8>),
}

impl Info {
    /// Construct the Info descriptor for component type `C`.
    pub(crate) fn new<C: Component>(id: Id) -> Self {
        let drop_fn = if std::mem::needs_drop::<C>() {
            Self::drop_impl::<C>
        } else {
            Self::drop_noop
        };
        Self {
            id,
            type_id: TypeId::of::<C>(),
            layout: Layout::new::<C>(),
            drop_fn,
        }
    }

    /// Get the component id.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the Rust TypeId.
    #[inline]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Get the memory layout of one instance.
    #[inline]
    pub fn layout(&self) -> Layout {
        self.layout
    }

    /// Check if this is a zero-sized type.
    #[inline]
    pub fn is_zero_sized(&self) -> bool {
        self.layout.size() == 0
    }

    /// Get the drop function.
    ///
    /// # Safety
    /// The returned function must be called at most once per instance, with a
    /// pointer to a live, properly aligned instance of this component type.
    #[inline]
    pub fn drop_fn(&self) -> unsafe fn(NonNull<u8>) {
        self.drop_fn
    }

    /// Drop implementation for types that need drop.
    unsafe fn drop_impl<C>(ptr: NonNull<u8>) {
        unsafe {
            std::ptr::drop_in_place(ptr.as_ptr() as *mut C);
        }
    }

    /// No-op drop for types that don't need drop.
    unsafe fn drop_noop(_ptr: NonNull<u8>) {}
}
