use std::any::TypeId;

use crate::{
    component::{self, Component, Info, Signature},
    entity::Entity,
    storage::{Row, column::Column},
};

/// A unique identifier for an archetype within one storage.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id(u32);

impl Id {
    /// The archetype of component-less entities, created with the storage.
    pub(crate) const EMPTY: Self = Self(0);

    /// Create a new Id with the given unique identifier.
    #[inline]
    pub const fn new(id: u32) -> Self {
        Id(id)
    }

    /// Get the index of the Id as a usize to be used in collections.
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl From<usize> for Id {
    #[inline]
    fn from(value: usize) -> Self {
        Self(value as u32)
    }
}

/// The entities that share one exact set of component types, stored in
/// columnar form.
///
/// An archetype keeps a dense entity roster and one [`Column`] per component
/// in its [`Signature`], in signature order. Row `i` of every column belongs
/// to `entities[i]`, and swap-removal keeps the whole block dense.
///
/// # Invariants
/// - `columns.len() == signature.len()` and `columns[i]` stores the component
///   at `signature.ids()[i]`.
/// - Every column's length equals `entities.len()`.
pub struct Archetype {
    /// The archetype's unique identifier.
    id: Id,

    /// The sorted component set stored here.
    signature: Signature,

    /// The entities stored in this archetype (one per row).
    entities: Vec<Entity>,

    /// The component columns, parallel to the signature.
    columns: Vec<Column>,
}

impl Archetype {
    /// Create a new empty archetype for the given signature.
    ///
    /// # Panics
    /// Panics if the descriptors don't match the signature, id for id.
    pub fn new(id: Id, signature: Signature, infos: &[Info]) -> Self {
        assert_eq!(
            infos.iter().map(|info| info.id()).collect::<Vec<_>>(),
            signature.ids(),
            "column descriptors must match the signature"
        );
        Self {
            id,
            columns: infos.iter().map(|info| Column::new(*info)).collect(),
            signature,
            entities: Vec::new(),
        }
    }

    /// Get the Id of this archetype.
    #[inline]
    pub fn id(&self) -> Id {
        self.id
    }

    /// Get the signature of this archetype.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the number of entities (rows) in this archetype.
    #[inline]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Check if the archetype holds no entities.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Get the entities stored in this archetype.
    #[inline]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Get the entity stored at a specific row, if the row is valid.
    #[inline]
    pub fn entity(&self, row: Row) -> Option<Entity> {
        self.entities.get(row.index()).copied()
    }

    /// Determine whether this archetype stores the given component.
    #[inline]
    pub fn contains(&self, id: component::Id) -> bool {
        self.signature.contains(id)
    }

    /// The columns of this archetype, in signature order.
    #[inline]
    pub(crate) fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// A column by position in the signature.
    #[inline]
    pub(crate) fn column(&self, index: usize) -> &Column {
        &self.columns[index]
    }

    /// A mutable column by position in the signature.
    #[inline]
    pub(crate) fn column_mut(&mut self, index: usize) -> &mut Column {
        &mut self.columns[index]
    }

    /// Find the column storing component type `C`, if present.
    pub(crate) fn column_of<C: Component>(&self) -> Option<&Column> {
        self.columns
            .iter()
            .find(|column| column.info().type_id() == TypeId::of::<C>())
    }

    /// Get a reference to one of this archetype's components at a row.
    pub fn get<C: Component>(&self, row: Row) -> Option<&C> {
        self.column_of::<C>().and_then(|column| column.get(row))
    }

    /// Get a mutable reference to one of this archetype's components at a row.
    pub fn get_mut<C: Component>(&mut self, row: Row) -> Option<&mut C> {
        let type_id = TypeId::of::<C>();
        self.columns
            .iter_mut()
            .find(|column| column.info().type_id() == type_id)
            .and_then(|column| column.get_mut(row))
    }

    /// Append `entity` with one uninitialized row in every column, returning
    /// the new row index.
    ///
    /// # Safety
    /// The caller must initialize every column's new slot before yielding
    /// control to anything that may read, move, or drop the row.
    pub(crate) unsafe fn push_entity(&mut self, entity: Entity) -> Row {
        let row = Row::new(self.entities.len());
        self.entities.push(entity);
        for column in self.columns.iter_mut() {
            let column_row = unsafe { column.push_uninit() };
            debug_assert_eq!(column_row, row, "column rows out of step");
        }
        row
    }

    /// Remove the row, swap-filling the gap from the end. Returns the entity
    /// that was moved into `row` (its recorded location must be fixed by the
    /// caller), or `None` if the last row was removed.
    ///
    /// With `destruct` the removed components are destroyed; without it their
    /// bytes are simply relinquished (the caller has already moved them to a
    /// new home, or destroyed the one removed component itself).
    ///
    /// # Panics
    /// Panics if the row is out of bounds.
    pub(crate) fn swap_remove_row(&mut self, row: Row, destruct: bool) -> Option<Entity> {
        let index = row.index();
        assert!(index < self.entities.len(), "row index out of bounds");

        let last = self.entities.len() - 1;
        self.entities.swap_remove(index);

        for column in self.columns.iter_mut() {
            // SAFETY: row < len by the assert above; columns are in step with
            // the roster by invariant.
            unsafe {
                if destruct {
                    column.swap_remove(row);
                } else {
                    column.swap_remove_forget(row);
                }
            }
        }

        #[cfg(debug_assertions)]
        self.check_rows();

        if index == last {
            return None;
        }
        Some(self.entities[index])
    }

    /// Verify that every column has the same length as the entity roster.
    #[cfg(debug_assertions)]
    pub(crate) fn check_rows(&self) {
        for (i, column) in self.columns.iter().enumerate() {
            assert_eq!(
                column.len(),
                self.entities.len(),
                "column {} length {} doesn't match entity count {}",
                i,
                column.len(),
                self.entities.len()
            );
        }
    }
}
