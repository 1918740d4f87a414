//! Deferred structural mutation.
//!
//! Creating or deleting entities and adding or removing components all
//! reshape archetypes, which is illegal while a query walk is in flight. A
//! [`CommandBuffer`] records those operations into an aligned byte log
//! during iteration and replays them against the storage at a safe point:
//!
//! ```
//! # use quarry_ecs::{Component, Storage};
//! # #[derive(Component)] struct Position { x: f32 }
//! # let mut storage = Storage::new();
//! # let e = storage.create_entity();
//! # storage.add_component(e, Position { x: 0.0 });
//! let mut commands = storage.command_buffer();
//! let mut query = storage.query().with::<Position>().build();
//!
//! query.start(&storage);
//! while let Some(found) = query.next(&storage) {
//!     let spawned = commands.create_entity(&mut storage);
//!     commands.add_component(spawned, Position { x: 10.0 });
//!     commands.delete_entity(found.entity());
//! }
//! commands.run(&mut storage);
//! ```
//!
//! Nothing a buffer records has any effect until [`run`](CommandBuffer::run)
//! completes, with one deliberate exception: `create_entity` mints and
//! registers the entity id immediately (hence the `&mut Storage` argument),
//! so the id can be referenced by later commands in the same batch. The
//! logged CreateEntity marker is a no-op at execution time.
//!
//! Component payloads recorded by `add_component` are owned by the buffer
//! until they are executed (ownership moves into the storage) or discarded
//! (the destructor runs on the logged bytes). Dropping a buffer with pending
//! records discards them.

mod log;

use std::{ptr::NonNull, sync::Arc};

use ::log::trace;

use crate::{
    command::log::AlignedBuf,
    component::{self, Component, Info, Registry},
    entity::Entity,
    storage::Storage,
};

/// The record tag starting every log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
enum Op {
    CreateEntity,
    DeleteEntity,
    AddComponent,
    RemoveComponent,
}

/// An entity minted through a command buffer, usable as a target for further
/// commands in the same batch (and deletable before it ever ran).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingEntity(Entity);

impl PendingEntity {
    /// The underlying entity id.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.0
    }
}

impl From<PendingEntity> for Entity {
    #[inline]
    fn from(pending: PendingEntity) -> Entity {
        pending.0
    }
}

/// An append-only log of structural mutations, applied as a batch by
/// [`run`](CommandBuffer::run) or dropped by
/// [`discard`](CommandBuffer::discard).
///
/// Obtained from [`Storage::command_buffer`]; the buffer shares the
/// storage's component registry so component types recorded here resolve to
/// the same ids at execution time.
pub struct CommandBuffer {
    /// The registry shared with the owning storage.
    components: Arc<Registry>,

    /// The record log. See the field-level layout in the recording methods.
    log: AlignedBuf,

    /// Number of records in the log.
    records: usize,
}

impl CommandBuffer {
    /// Create a buffer over the given registry. Use
    /// [`Storage::command_buffer`] rather than this directly.
    pub(crate) fn new(components: Arc<Registry>) -> Self {
        Self {
            components,
            log: AlignedBuf::new(),
            records: 0,
        }
    }

    /// Number of records currently buffered.
    #[inline]
    pub fn len(&self) -> usize {
        self.records
    }

    /// Whether the buffer holds no records.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.records == 0
    }

    /// Mint a new entity immediately and record a creation marker.
    ///
    /// The entity is registered in the storage right away (component-less, in
    /// the empty archetype) so later commands in this batch can target it;
    /// this is the one buffered operation with an eager effect, and the
    /// reason for the `&mut Storage` argument. The recorded marker does
    /// nothing at execution time.
    pub fn create_entity(&mut self, storage: &mut Storage) -> PendingEntity {
        debug_assert!(
            std::ptr::eq(storage.components(), self.components.as_ref()),
            "command buffer used with a storage it was not created from"
        );
        let entity = storage.create_entity();
        self.log.push(Op::CreateEntity);
        self.log.push(entity);
        self.records += 1;
        PendingEntity(entity)
    }

    /// Record deletion of an entity. Executed tolerantly: deleting an entity
    /// that is already gone by then is a no-op.
    pub fn delete_entity(&mut self, entity: impl Into<Entity>) {
        self.log.push(Op::DeleteEntity);
        self.log.push(entity.into());
        self.records += 1;
    }

    /// Record attaching a component value to an entity.
    ///
    /// Ownership of `value` moves into the buffer: it is destroyed exactly
    /// once, either by the storage (after execution hands the bytes over) or
    /// by [`discard`](CommandBuffer::discard).
    pub fn add_component<C: Component>(&mut self, entity: impl Into<Entity>, value: C) {
        let info = self.components.register_info::<C>();
        let mut value = std::mem::ManuallyDrop::new(value);

        self.log.push(Op::AddComponent);
        self.log.push(entity.into());
        self.log.push(info);
        // The payload offset is known only after the payload is aligned and
        // written; reserve the field, then patch it.
        let offset_slot = self.log.push(0usize);
        // SAFETY: `value` is a live C, laid out per `info.layout()`.
        let payload_offset =
            unsafe { self.log.push_erased(NonNull::from(&mut value).cast(), info.layout()) };
        self.log.overwrite(offset_slot, payload_offset);
        self.records += 1;
    }

    /// Record detaching a component from an entity. A component not present
    /// at execution time is a no-op.
    pub fn remove_component<C: Component>(&mut self, entity: impl Into<Entity>) {
        let id = self.components.register::<C>();
        self.log.push(Op::RemoveComponent);
        self.log.push(entity.into());
        self.log.push(id);
        self.records += 1;
    }

    /// Apply every record to the storage, in insertion order, then empty the
    /// buffer. Each record executes at most once; the buffer is reusable
    /// afterwards.
    pub fn run(&mut self, storage: &mut Storage) {
        debug_assert!(
            std::ptr::eq(storage.components(), self.components.as_ref()),
            "command buffer used with a storage it was not created from"
        );
        trace!("running {} buffered commands", self.records);

        // Detach the log before replaying. If an executor panics mid-walk,
        // the detached log is dropped without touching its payloads; the
        // not-yet-executed ones leak instead of being destroyed twice by the
        // buffer's own drop.
        let mut log = std::mem::replace(&mut self.log, AlignedBuf::new());
        self.records = 0;

        let mut cursor = 0;
        while cursor < log.len() {
            match log.read::<Op>(&mut cursor) {
                Op::CreateEntity => {
                    // Minted and registered when recorded; nothing to do.
                    let _entity: Entity = log.read(&mut cursor);
                }
                Op::DeleteEntity => {
                    let entity: Entity = log.read(&mut cursor);
                    storage.delete_entity(entity);
                }
                Op::AddComponent => {
                    let entity: Entity = log.read(&mut cursor);
                    let info: Info = log.read(&mut cursor);
                    let payload_offset: usize = log.read(&mut cursor);
                    cursor = payload_offset + info.layout().size();
                    // SAFETY: the payload at `payload_offset` is a live
                    // instance laid out per `info`, written by
                    // `add_component` and not consumed before (each record
                    // executes once). Ownership moves to the storage here.
                    unsafe {
                        storage.add_component_raw(entity, info, log.ptr_at(payload_offset));
                    }
                }
                Op::RemoveComponent => {
                    let entity: Entity = log.read(&mut cursor);
                    let component: component::Id = log.read(&mut cursor);
                    storage.remove_component_raw(entity, component);
                }
            }
        }

        // Hand the (cleared) allocation back for reuse.
        log.clear();
        self.log = log;
    }

    /// Throw the buffered records away without applying them, running the
    /// destructor on every payload still owned by the buffer.
    pub fn discard(&mut self) {
        trace!("discarding {} buffered commands", self.records);

        // Detached for the same panic discipline as `run`.
        let mut log = std::mem::replace(&mut self.log, AlignedBuf::new());
        self.records = 0;

        let mut cursor = 0;
        while cursor < log.len() {
            match log.read::<Op>(&mut cursor) {
                Op::CreateEntity | Op::DeleteEntity => {
                    let _entity: Entity = log.read(&mut cursor);
                }
                Op::AddComponent => {
                    let _entity: Entity = log.read(&mut cursor);
                    let info: Info = log.read(&mut cursor);
                    let payload_offset: usize = log.read(&mut cursor);
                    cursor = payload_offset + info.layout().size();
                    // SAFETY: the payload is live and was never executed;
                    // this is its one destruction.
                    unsafe {
                        (info.drop_fn())(log.ptr_at(payload_offset));
                    }
                }
                Op::RemoveComponent => {
                    let _entity: Entity = log.read(&mut cursor);
                    let _component: component::Id = log.read(&mut cursor);
                }
            }
        }

        log.clear();
        self.log = log;
    }
}

impl Drop for CommandBuffer {
    fn drop(&mut self) {
        if self.records > 0 {
            self.discard();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use quarry_macros::Component;

    use super::*;

    #[derive(Component, Debug, Clone, Copy, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Debug, Clone, Copy, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Component, Debug)]
    struct DropTracker(Arc<AtomicUsize>);

    impl Drop for DropTracker {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn nothing_applies_before_run() {
        // Given
        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When
        commands.add_component(entity, Position { x: 1.0, y: 2.0 });
        commands.delete_entity(entity);

        // Then - storage untouched so far
        assert!(storage.get::<Position>(entity).is_none());
        assert!(storage.contains(entity));
        assert_eq!(commands.len(), 2);

        // When
        commands.run(&mut storage);

        // Then - both records applied, in order
        assert!(!storage.contains(entity));
        assert!(commands.is_empty());
        storage.check_invariants();
    }

    #[test]
    fn create_entity_is_eagerly_minted() {
        // Given
        let mut storage = Storage::new();
        let mut commands = storage.command_buffer();

        // When
        let pending = commands.create_entity(&mut storage);

        // Then - registered immediately, component-less
        assert!(storage.contains(pending.entity()));
        assert!(storage.signature_of(pending.entity()).unwrap().is_empty());

        // And the id is targetable by later commands in the batch
        commands.add_component(pending, Position { x: 5.0, y: 5.0 });
        commands.run(&mut storage);
        assert_eq!(
            storage.get::<Position>(pending.entity()),
            Some(&Position { x: 5.0, y: 5.0 })
        );
        storage.check_invariants();
    }

    #[test]
    fn pending_entity_can_be_deleted_in_the_same_batch() {
        // Given
        let mut storage = Storage::new();
        let mut commands = storage.command_buffer();

        // When
        let pending = commands.create_entity(&mut storage);
        commands.add_component(pending, Position { x: 0.0, y: 0.0 });
        commands.delete_entity(pending);
        commands.run(&mut storage);

        // Then
        assert!(!storage.contains(pending.entity()));
        storage.check_invariants();
    }

    #[test]
    fn duplicate_deletes_are_tolerated() {
        // Given
        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When - the same delete recorded twice
        commands.delete_entity(entity);
        commands.delete_entity(entity);
        commands.run(&mut storage);

        // Then
        assert!(!storage.contains(entity));
        storage.check_invariants();
    }

    #[test]
    fn add_then_remove_in_one_batch() {
        // Given
        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When
        commands.add_component(entity, Position { x: 1.0, y: 1.0 });
        commands.add_component(entity, Velocity { dx: 2.0, dy: 2.0 });
        commands.remove_component::<Position>(entity);
        commands.run(&mut storage);

        // Then - insertion order: both added, then Position removed
        assert!(storage.get::<Position>(entity).is_none());
        assert_eq!(
            storage.get::<Velocity>(entity),
            Some(&Velocity { dx: 2.0, dy: 2.0 })
        );
        storage.check_invariants();
    }

    #[test]
    fn duplicate_buffered_add_destroys_rejected_payload() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When - two adds of the same component type for one entity
        commands.add_component(entity, DropTracker(counter.clone()));
        commands.add_component(entity, DropTracker(counter.clone()));
        commands.run(&mut storage);

        // Then - the first won; the second was destroyed by the executor
        assert_eq!(counter.load(Ordering::SeqCst), 1);

        // And teardown destroys the survivor exactly once
        drop(storage);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn discard_destroys_unexecuted_payloads() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = Storage::new();
        let entities: Vec<_> = (0..5).map(|_| storage.create_entity()).collect();
        let mut commands = storage.command_buffer();
        for &entity in &entities {
            commands.add_component(entity, DropTracker(counter.clone()));
        }

        // When
        commands.discard();

        // Then - every payload destroyed, storage unchanged
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        assert!(commands.is_empty());
        for &entity in &entities {
            assert!(storage.get::<DropTracker>(entity).is_none());
        }
        storage.check_invariants();
    }

    #[test]
    fn dropping_a_buffer_discards_pending_records() {
        // Given
        let counter = Arc::new(AtomicUsize::new(0));
        let mut storage = Storage::new();
        let entities: Vec<_> = (0..5).map(|_| storage.create_entity()).collect();

        // When
        {
            let mut commands = storage.command_buffer();
            for &entity in &entities {
                commands.add_component(entity, DropTracker(counter.clone()));
            }
        }

        // Then
        assert_eq!(counter.load(Ordering::SeqCst), 5);
        storage.check_invariants();
    }

    #[test]
    fn buffer_is_reusable_after_run() {
        // Given
        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When - first batch
        commands.add_component(entity, Position { x: 1.0, y: 1.0 });
        commands.run(&mut storage);

        // And a second batch through the same buffer
        commands.add_component(entity, Velocity { dx: 2.0, dy: 2.0 });
        commands.run(&mut storage);

        // Then
        assert!(storage.get::<Position>(entity).is_some());
        assert!(storage.get::<Velocity>(entity).is_some());
        storage.check_invariants();
    }

    #[test]
    fn over_aligned_payloads_survive_the_log() {
        // Given
        #[derive(Component, Debug, Clone, Copy, PartialEq)]
        #[repr(align(32))]
        struct Simd([f32; 8]);

        let mut storage = Storage::new();
        let entity = storage.create_entity();
        let mut commands = storage.command_buffer();

        // When
        commands.add_component(entity, Simd([1.5; 8]));
        commands.run(&mut storage);

        // Then
        assert_eq!(storage.get::<Simd>(entity), Some(&Simd([1.5; 8])));
        storage.check_invariants();
    }
}
