//! Archetype storage: the owner of every entity, archetype, and component
//! byte in the system.
//!
//! # Architecture
//!
//! Entities with the exact same component set share an [`Archetype`]: a dense
//! entity roster plus one contiguous, type-erased column per component type,
//! kept row-aligned. [`Storage`] owns all archetypes and maintains three
//! indices around them:
//!
//! - `by_signature`: sorted component-id list → archetype, so each signature
//!   maps to exactly one archetype (full keys, no hash-collision exposure),
//! - `locations`: entity → (archetype, row), rewritten on every swap-remove
//!   and migration,
//! - `component_index`: component id → the archetypes carrying it (and the
//!   component's column position there), which is what queries intersect.
//!
//! # Migration
//!
//! Adding or removing a component relocates the entity to the archetype whose
//! signature differs by exactly that component. The unchanged components move
//! as raw byte copies (their destructors do not run; ownership moves with
//! the bytes) and the vacated row is swap-filled from the end of the source
//! archetype, with the displaced neighbour's location fixed up.
//!
//! # Mutation discipline
//!
//! Every structural operation takes `&mut Storage`; nothing here locks. While
//! a query walk is in flight, structural changes must be deferred through a
//! [`CommandBuffer`](crate::CommandBuffer) and applied at a safe point.

use std::{collections::HashMap, mem::ManuallyDrop, ptr::NonNull, sync::Arc};

use log::{debug, trace};

pub mod archetype;
pub(crate) mod column;
mod location;
pub(crate) mod mem;
mod row;

pub use archetype::Archetype;
pub use location::Location;
pub use row::Row;

use crate::{
    command::CommandBuffer,
    component::{self, Component, Info, Registry, Signature},
    entity::{self, Allocator, Entity},
    query::QueryBuilder,
};

/// The top-level container owning all archetypes, all component bytes, and
/// the indices that tie entities to them.
///
/// See the [module documentation](self) for the overall shape. All mutating
/// operations require `&mut self`; the component registry inside is shared
/// (and internally thread-safe) so queries and command buffers can be built
/// from `&self`.
pub struct Storage {
    /// The registry assigning component types their ids and descriptors.
    components: Arc<Registry>,

    /// Mints process-unique entity ids.
    entities: Allocator,

    /// Every archetype ever created, indexed by archetype id. Archetypes are
    /// never destroyed while the storage lives; empty ones stay.
    archetypes: Vec<Archetype>,

    /// Signature-keyed lookup into `archetypes`.
    by_signature: HashMap<Signature, archetype::Id>,

    /// Where each live entity's components are. Every live entity appears
    /// exactly once.
    locations: HashMap<Entity, Location>,

    /// For each component id, the archetypes that carry it and the position
    /// of its column there. Queries intersect the key sets; handle resolution
    /// uses the positions.
    component_index: HashMap<component::Id, HashMap<archetype::Id, usize>>,
}

impl Default for Storage {
    fn default() -> Self {
        Self::new()
    }
}

impl Storage {
    /// Create an empty storage. The archetype of component-less entities is
    /// created up front and lives as long as the storage.
    pub fn new() -> Self {
        let mut storage = Self {
            components: Arc::new(Registry::new()),
            entities: Allocator::new(),
            archetypes: Vec::new(),
            by_signature: HashMap::new(),
            locations: HashMap::new(),
            component_index: HashMap::new(),
        };
        let empty = storage.create_archetype(Signature::EMPTY, &[]);
        debug_assert_eq!(empty, archetype::Id::EMPTY);
        storage
    }

    /// The component registry backing this storage.
    #[inline]
    pub fn components(&self) -> &Registry {
        &self.components
    }

    /// Create a new entity with no components.
    ///
    /// The entity starts in the empty archetype; attach data with
    /// [`add_component`](Storage::add_component).
    pub fn create_entity(&mut self) -> Entity {
        let entity = self.entities.alloc();
        // SAFETY: the empty archetype has no columns to initialize.
        let row = unsafe { self.archetypes[archetype::Id::EMPTY.index()].push_entity(entity) };
        self.locations
            .insert(entity, Location::new(archetype::Id::EMPTY, row));
        entity
    }

    /// Delete an entity, destroying all its components.
    ///
    /// Idempotent: deleting an unknown or already-deleted entity returns
    /// `false` and does nothing.
    pub fn delete_entity(&mut self, entity: Entity) -> bool {
        let Some(location) = self.locations.remove(&entity) else {
            return false;
        };
        let archetype = &mut self.archetypes[location.archetype().index()];
        if let Some(moved) = archetype.swap_remove_row(location.row(), true) {
            // The displaced neighbour now lives where the deleted entity was.
            self.locations
                .insert(moved, Location::new(location.archetype(), location.row()));
        }
        true
    }

    /// Attach a component to an entity, migrating it to the archetype that
    /// carries the extra column. All other component values move with it,
    /// byte for byte.
    ///
    /// Adding a component the entity already has is a no-op on storage state;
    /// the supplied value is dropped (the caller handed over ownership either
    /// way) and `false` is returned.
    ///
    /// # Panics
    /// Panics if the entity is not live.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> bool {
        let info = self.components.register_info::<C>();
        let mut value = ManuallyDrop::new(value);
        // SAFETY: `value` is a live instance of the type described by `info`,
        // and ManuallyDrop relinquishes ownership to the callee.
        unsafe { self.add_component_raw(entity, info, NonNull::from(&mut value).cast()) }
    }

    /// Type-erased core of [`add_component`](Storage::add_component); also
    /// the entry point used by the command executor, whose payloads live in
    /// its byte log.
    ///
    /// # Safety
    /// `payload` must point to a live instance of the component type
    /// described by `info`. Ownership transfers to the storage: the instance
    /// is either moved into a column or destroyed here, and the caller must
    /// not touch it afterwards.
    pub(crate) unsafe fn add_component_raw(
        &mut self,
        entity: Entity,
        info: Info,
        payload: NonNull<u8>,
    ) -> bool {
        let location = *self.locations.get(&entity).expect("unknown entity");
        let source_id = location.archetype();
        let row = location.row();

        if self.archetypes[source_id.index()].contains(info.id()) {
            // Already present: no migration, but the payload is ours to
            // destroy now.
            unsafe { (info.drop_fn())(payload) };
            return false;
        }

        let (signature, slot) = self.archetypes[source_id.index()]
            .signature()
            .with(info.id());
        let target_id = match self.by_signature.get(&signature) {
            Some(&id) => id,
            None => {
                let mut infos: Vec<Info> = self.archetypes[source_id.index()]
                    .columns()
                    .iter()
                    .map(|column| *column.info())
                    .collect();
                infos.insert(slot, info);
                self.create_archetype(signature, &infos)
            }
        };
        trace!(
            "entity {} migrating {:?} -> {:?} (+{:?})",
            entity.id(),
            source_id,
            target_id,
            info.id()
        );

        let (source, target) = pair_mut(&mut self.archetypes, source_id, target_id);
        // SAFETY: every column slot of the new row is initialized in the loop
        // below before control leaves this function.
        let target_row = unsafe { target.push_entity(entity) };
        for index in 0..target.columns().len() {
            unsafe {
                if index == slot {
                    target.column_mut(index).init_from(target_row, payload);
                } else {
                    // Columns after the insertion point sit one position
                    // later in the target than in the source.
                    let from = index - usize::from(index > slot);
                    let src = source.column(from).ptr_at(row);
                    target.column_mut(index).init_from(target_row, src);
                }
            }
        }

        // The bytes have moved; relinquish the source row without running
        // destructors.
        if let Some(moved) = source.swap_remove_row(row, false) {
            self.locations
                .insert(moved, Location::new(source_id, row));
        }
        self.locations
            .insert(entity, Location::new(target_id, target_row));
        true
    }

    /// Detach a component from an entity, destroying its value and migrating
    /// the entity to the archetype without that column.
    ///
    /// Removing a component the entity does not have is a no-op returning
    /// `false`.
    ///
    /// # Panics
    /// Panics if the entity is not live.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> bool {
        // An unregistered component type cannot be on any entity.
        let Some(id) = self.components.get::<C>() else {
            return false;
        };
        self.remove_component_raw(entity, id)
    }

    /// Type-erased core of [`remove_component`](Storage::remove_component);
    /// also used by the command executor.
    pub(crate) fn remove_component_raw(&mut self, entity: Entity, component: component::Id) -> bool {
        let location = *self.locations.get(&entity).expect("unknown entity");
        let source_id = location.archetype();
        let row = location.row();

        if !self.archetypes[source_id.index()].contains(component) {
            return false;
        }

        let (signature, slot) = self.archetypes[source_id.index()]
            .signature()
            .without(component);
        let target_id = match self.by_signature.get(&signature) {
            Some(&id) => id,
            None => {
                let mut infos: Vec<Info> = self.archetypes[source_id.index()]
                    .columns()
                    .iter()
                    .map(|column| *column.info())
                    .collect();
                infos.remove(slot);
                self.create_archetype(signature, &infos)
            }
        };
        trace!(
            "entity {} migrating {:?} -> {:?} (-{:?})",
            entity.id(),
            source_id,
            target_id,
            component
        );

        let (source, target) = pair_mut(&mut self.archetypes, source_id, target_id);
        // SAFETY: every column slot of the new row is initialized in the loop
        // below before control leaves this function.
        let target_row = unsafe { target.push_entity(entity) };
        for index in 0..target.columns().len() {
            // Columns at or after the removal point sit one position earlier
            // in the target than in the source.
            let from = index + usize::from(index >= slot);
            unsafe {
                let src = source.column(from).ptr_at(row);
                target.column_mut(index).init_from(target_row, src);
            }
        }

        unsafe {
            // The removed component dies here; everything else moved.
            source.column_mut(slot).drop_in_place(row);
        }
        if let Some(moved) = source.swap_remove_row(row, false) {
            self.locations
                .insert(moved, Location::new(source_id, row));
        }
        self.locations
            .insert(entity, Location::new(target_id, target_row));
        true
    }

    /// Get a reference to one of an entity's components.
    ///
    /// Returns `None` if the entity is not live or does not carry `C`.
    pub fn get<C: Component>(&self, entity: Entity) -> Option<&C> {
        let location = self.locations.get(&entity)?;
        self.archetypes[location.archetype().index()].get(location.row())
    }

    /// Get a mutable reference to one of an entity's components.
    ///
    /// Returns `None` if the entity is not live or does not carry `C`.
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> Option<&mut C> {
        let location = self.locations.get(&entity)?;
        self.archetypes[location.archetype().index()].get_mut(location.row())
    }

    /// Resolve a query match into a read-only handle directly through the
    /// archetype row it was found at, skipping the location lookup.
    ///
    /// Valid only while no structural change has happened since the match
    /// was yielded, which is exactly the window a query walk guarantees.
    pub fn view(&self, found: &crate::query::Match) -> entity::Ref<'_> {
        let archetype = self.archetype(found.archetype());
        debug_assert_eq!(
            archetype.entity(found.row()),
            Some(found.entity()),
            "stale query match"
        );
        entity::Ref::new(found.entity(), archetype, found.row())
    }

    /// Get a read-only handle to an entity, if it's live.
    pub fn entity(&self, entity: Entity) -> Option<entity::Ref<'_>> {
        let location = self.locations.get(&entity)?;
        Some(entity::Ref::new(
            entity,
            &self.archetypes[location.archetype().index()],
            location.row(),
        ))
    }

    /// Get a mutable handle to an entity, if it's live.
    pub fn entity_mut(&mut self, entity: Entity) -> Option<entity::RefMut<'_>> {
        let location = *self.locations.get(&entity)?;
        Some(entity::RefMut::new(
            entity,
            &mut self.archetypes[location.archetype().index()],
            location.row(),
        ))
    }

    /// Whether the entity is live in this storage.
    #[inline]
    pub fn contains(&self, entity: Entity) -> bool {
        self.locations.contains_key(&entity)
    }

    /// The signature of the archetype an entity currently lives in.
    pub fn signature_of(&self, entity: Entity) -> Option<&Signature> {
        let location = self.locations.get(&entity)?;
        Some(self.archetypes[location.archetype().index()].signature())
    }

    /// Number of live entities.
    #[inline]
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    /// Whether the storage holds no live entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Number of archetypes created so far. Monotonic; queries use it as a
    /// cheap shape generation.
    #[inline]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// An archetype by id.
    ///
    /// # Panics
    /// Panics if the id is out of bounds.
    pub(crate) fn archetype(&self, id: archetype::Id) -> &Archetype {
        &self.archetypes[id.index()]
    }

    /// The archetypes carrying a component (with its column position there),
    /// if any do.
    pub(crate) fn archetypes_with(
        &self,
        component: component::Id,
    ) -> Option<&HashMap<archetype::Id, usize>> {
        self.component_index.get(&component)
    }

    /// Start building a query against this storage's component registry.
    #[inline]
    pub fn query(&self) -> QueryBuilder<'_> {
        QueryBuilder::new(self.components())
    }

    /// Create a command buffer bound to this storage's component registry,
    /// for recording structural changes during iteration.
    #[inline]
    pub fn command_buffer(&self) -> CommandBuffer {
        CommandBuffer::new(Arc::clone(&self.components))
    }

    /// Create a new archetype and wire it into the indices.
    fn create_archetype(&mut self, signature: Signature, infos: &[Info]) -> archetype::Id {
        let id = archetype::Id::from(self.archetypes.len());
        for (position, component) in signature.ids().iter().enumerate() {
            self.component_index
                .entry(*component)
                .or_default()
                .insert(id, position);
        }
        debug!("created archetype {:?} for {:?}", id, signature);
        // One clone for the map key; the archetype owns the original.
        self.by_signature.insert(signature.clone(), id);
        self.archetypes.push(Archetype::new(id, signature, infos));
        id
    }

    /// Validate every cross-structure invariant. Intended for tests; walks
    /// the whole storage.
    ///
    /// # Panics
    /// Panics on the first violated invariant.
    pub fn check_invariants(&self) {
        // Row-count consistency and column/signature alignment.
        for archetype in &self.archetypes {
            let signature = archetype.signature();
            assert!(
                signature.ids().windows(2).all(|pair| pair[0] < pair[1]),
                "signature of {:?} is not strictly ascending",
                archetype.id()
            );
            assert_eq!(
                archetype.columns().len(),
                signature.len(),
                "archetype {:?} has mismatched column count",
                archetype.id()
            );
            for (i, column) in archetype.columns().iter().enumerate() {
                assert_eq!(
                    column.info().id(),
                    signature.ids()[i],
                    "archetype {:?} column {} out of signature order",
                    archetype.id(),
                    i
                );
                assert_eq!(
                    column.len(),
                    archetype.len(),
                    "archetype {:?} column {} row count drifted",
                    archetype.id(),
                    i
                );
            }
        }

        // Location consistency, both directions.
        for (entity, location) in &self.locations {
            let archetype = &self.archetypes[location.archetype().index()];
            assert_eq!(
                archetype.entity(location.row()),
                Some(*entity),
                "location of entity {} points at the wrong row",
                entity.id()
            );
        }
        let roster_total: usize = self.archetypes.iter().map(Archetype::len).sum();
        assert_eq!(
            roster_total,
            self.locations.len(),
            "entity rosters and the location index disagree"
        );

        // Signature uniqueness.
        assert_eq!(
            self.by_signature.len(),
            self.archetypes.len(),
            "signature map and archetype list out of step"
        );
        for (signature, id) in &self.by_signature {
            assert_eq!(
                self.archetypes[id.index()].signature(),
                signature,
                "signature map entry for {:?} is stale",
                id
            );
        }

        // Inverted index soundness, both directions.
        for (component, archetypes) in &self.component_index {
            for (id, position) in archetypes {
                assert_eq!(
                    self.archetypes[id.index()].signature().ids().get(*position),
                    Some(component),
                    "component index claims {:?} at column {} of {:?}",
                    component,
                    position,
                    id
                );
            }
        }
        for archetype in &self.archetypes {
            for (position, component) in archetype.signature().ids().iter().enumerate() {
                let indexed = self
                    .component_index
                    .get(component)
                    .and_then(|archetypes| archetypes.get(&archetype.id()));
                assert_eq!(
                    indexed,
                    Some(&position),
                    "{:?} of {:?} missing from the component index",
                    component,
                    archetype.id()
                );
            }
        }
    }
}

impl Drop for Storage {
    fn drop(&mut self) {
        // Component destruction is handled column by column; this is just
        // the teardown breadcrumb.
        debug!(
            "storage dropped: {} entities across {} archetypes",
            self.locations.len(),
            self.archetypes.len()
        );
    }
}

/// Mutably borrow two distinct archetypes at once.
fn pair_mut(
    archetypes: &mut [Archetype],
    a: archetype::Id,
    b: archetype::Id,
) -> (&mut Archetype, &mut Archetype) {
    debug_assert_ne!(a, b, "migration source and target must differ");
    if a.index() < b.index() {
        let (left, right) = archetypes.split_at_mut(b.index());
        (&mut left[a.index()], &mut right[0])
    } else {
        let (left, right) = archetypes.split_at_mut(a.index());
        (&mut right[0], &mut left[b.index()])
    }
}
