use std::{
    any::TypeId,
    sync::{
        RwLock,
        atomic::{AtomicU32, Ordering},
    },
};

use dashmap::DashMap;

use crate::component::{Component, Id, Info};

/// A thread-safe registry assigning each component type a stable [`Id`].
///
/// Registration is idempotent: the first call for a type mints the next
/// sequential id and captures its [`Info`] descriptor; later calls return the
/// existing id. Lookups are lock-free reads through a sharded concurrent map,
/// so queries and command buffers can register types from `&self`.
pub struct Registry {
    /// Map from Rust TypeId to our Id. Lock-free reads via sharded concurrent hashmap.
    type_map: DashMap<TypeId, Id>,

    /// Descriptors indexed by id. Protected by RwLock for rare writes.
    infos: RwLock<Vec<Option<Info>>>,

    /// Next available component identifier.
    next_id: AtomicU32,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// Create a new, empty registry.
    #[inline]
    pub fn new() -> Self {
        Self {
            type_map: DashMap::new(),
            infos: RwLock::new(Vec::new()),
            next_id: AtomicU32::new(0),
        }
    }

    /// Register component type `C`, returning its id.
    ///
    /// If the type is already registered, returns the existing id.
    pub fn register<C: Component>(&self) -> Id {
        let type_id = TypeId::of::<C>();

        // Fast path: already registered (lock-free read)
        if let Some(existing) = self.type_map.get(&type_id) {
            return *existing;
        }

        // Slow path: use the entry API to handle racing registrations
        match self.type_map.entry(type_id) {
            dashmap::Entry::Occupied(occupied) => *occupied.get(),
            dashmap::Entry::Vacant(vacant) => {
                let id = Id::new(self.next_id.fetch_add(1, Ordering::Relaxed));

                let mut infos = self.infos.write().unwrap();
                let index = id.index();
                if index >= infos.len() {
                    infos.resize(index + 1, None);
                }
                infos[index] = Some(Info::new::<C>(id));
                vacant.insert(id);

                id
            }
        }
    }

    /// Register component type `C` and return its full descriptor.
    #[inline]
    pub fn register_info<C: Component>(&self) -> Info {
        let id = self.register::<C>();
        self.info(id).expect("registered component has info")
    }

    /// Get the id for a type, if registered.
    #[inline]
    pub fn get<C: Component>(&self) -> Option<Id> {
        self.type_map.get(&TypeId::of::<C>()).map(|entry| *entry)
    }

    /// Get the descriptor for a registered id.
    #[inline]
    pub fn info(&self, id: Id) -> Option<Info> {
        let infos = self.infos.read().unwrap();
        infos.get(id.index()).and_then(|info| *info)
    }

    /// Get the number of registered component types.
    #[inline]
    pub fn len(&self) -> usize {
        self.next_id.load(Ordering::Relaxed) as usize
    }

    /// Check if no component types are registered.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
