use crate::{
    component::Component,
    entity::Entity,
    storage::{Archetype, Row},
};

/// A reference to an entity with read-only access to its components.
/// The lifetime `'w` ties the reference to the storage it resolves into, so
/// it cannot outlive the archetype row it points at.
pub struct Ref<'w> {
    /// The entity this reference points to.
    entity: Entity,
    /// The archetype that stores this entity's components.
    archetype: &'w Archetype,
    /// The row this entity occupies in the archetype.
    row: Row,
}

impl<'w> Ref<'w> {
    /// Create a new Ref for an entity and its archetype row.
    #[inline]
    pub(crate) const fn new(entity: Entity, archetype: &'w Archetype, row: Row) -> Self {
        Self {
            entity,
            archetype,
            row,
        }
    }

    /// Get a reference to a component on this entity.
    /// Returns `None` if the component is not present on the entity.
    pub fn get<C: Component>(&self) -> Option<&C> {
        self.archetype.get::<C>(self.row)
    }

    /// Check whether this entity carries component `C`.
    #[inline]
    pub fn has<C: Component>(&self) -> bool {
        self.archetype.column_of::<C>().is_some()
    }

    /// Get the entity this reference points to.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }
}

/// A mutable reference to an entity, allowing component values to be read and
/// written in place. Structural changes (adding or removing components) still
/// go through the storage.
pub struct RefMut<'w> {
    /// The entity this reference points to.
    entity: Entity,
    /// The archetype that stores this entity's components.
    archetype: &'w mut Archetype,
    /// The row this entity occupies in the archetype.
    row: Row,
}

impl<'w> RefMut<'w> {
    /// Create a new RefMut for an entity and its archetype row.
    #[inline]
    pub(crate) const fn new(entity: Entity, archetype: &'w mut Archetype, row: Row) -> Self {
        Self {
            entity,
            archetype,
            row,
        }
    }

    /// Get a reference to a component on this entity.
    /// Returns `None` if the component is not present on the entity.
    pub fn get<C: Component>(&self) -> Option<&C> {
        self.archetype.get::<C>(self.row)
    }

    /// Get a mutable reference to a component on this entity.
    /// Returns `None` if the component is not present on the entity.
    pub fn get_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.archetype.get_mut::<C>(self.row)
    }

    /// Get the entity this reference points to.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }
}
