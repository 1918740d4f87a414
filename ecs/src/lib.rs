//! Archetype-based columnar storage for entities and their components.
//!
//! Entities that carry the exact same set of component types live together in
//! an [`storage::Archetype`]: one dense entity roster plus one contiguous,
//! type-erased column per component type. Adding or
//! removing a component migrates the entity (and its component bytes) to the
//! archetype one component over. Queries filter archetypes by required and
//! forbidden component ids and walk the survivors row by row.
//!
//! # Example
//!
//! ```
//! use quarry_ecs::{Component, Storage};
//!
//! #[derive(Component, Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//!
//! #[derive(Component)]
//! struct Frozen;
//!
//! let mut storage = Storage::new();
//!
//! let entity = storage.create_entity();
//! storage.add_component(entity, Position { x: 1.0, y: 2.0 });
//!
//! let mut query = storage.query().with::<Position>().without::<Frozen>().build();
//! query.start(&storage);
//! while let Some(found) = query.next(&storage) {
//!     assert_eq!(storage.get::<Position>(found.entity()).unwrap().x, 1.0);
//! }
//! ```
//!
//! # Deferred mutation
//!
//! Structural changes (creating or deleting entities, adding or removing
//! components) must not happen while a query walk is in flight. Record them
//! on a [`CommandBuffer`] instead and apply the batch with
//! [`CommandBuffer::run`] once the walk is done.
//!
//! # Threading
//!
//! Single-threaded by contract: every mutating operation takes
//! `&mut Storage`, so exclusive access is enforced by the borrow checker
//! rather than locks. [`Storage`] is `Send` and may be moved between threads
//! as a unit.

// Allows the proc macros to reference `quarry_ecs` from within this crate.
extern crate self as quarry_ecs;

pub mod command;
pub mod component;
pub mod entity;
pub mod query;
pub mod storage;

pub use command::{CommandBuffer, PendingEntity};
pub use component::Component;
pub use entity::Entity;
pub use query::Query;
pub use storage::Storage;

/// The `#[derive(Component)]` macro implementing the [`Component`] marker.
pub use quarry_macros::Component;
