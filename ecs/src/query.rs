//! Declarative entity filters over the archetype graph.
//!
//! A [`Query`] names the component types an entity must carry (`with`) and
//! the ones it must not (`without`), then walks every matching archetype row
//! by row. Matching happens at the archetype level: the storage's inverted
//! component index supplies the candidate archetypes for each required
//! component, the candidates are intersected, and the excluded components'
//! archetypes are subtracted. The surviving archetype list is cached and only
//! recomputed when the storage's shape (its archetype count) has changed.
//!
//! # Iteration protocol
//!
//! ```
//! # use quarry_ecs::{Component, Storage};
//! # #[derive(Component)] struct Position { x: f32 }
//! # #[derive(Component)] struct Frozen;
//! # let mut storage = Storage::new();
//! # let e = storage.create_entity();
//! # storage.add_component(e, Position { x: 0.0 });
//! let mut query = storage.query().with::<Position>().without::<Frozen>().build();
//! let mut commands = storage.command_buffer();
//!
//! query.start(&storage);
//! while let Some(found) = query.next(&storage) {
//!     // read components, record structural changes on `commands`
//! }
//! commands.run(&mut storage);
//! ```
//!
//! `next` takes the storage by shared reference per call instead of holding a
//! borrow across the loop body. That is what makes the command-buffer pattern
//! work: recording commands (including the eager entity mint, which needs
//! `&mut Storage`) is legal inside the loop, while genuine structural
//! mutation mid-walk remains off-limits by contract.
//!
//! For pure read loops, [`Query::iter`] offers a plain `Iterator` view.

use fixedbitset::FixedBitSet;

use crate::{
    component::{self, Component, Registry, Signature},
    entity::Entity,
    storage::{Row, Storage, archetype},
};

/// Builds a [`Query`] by accumulating required and forbidden component
/// types. Obtained from [`Storage::query`].
pub struct QueryBuilder<'s> {
    /// The registry resolving component types to ids.
    components: &'s Registry,
    /// Component ids an entity must carry.
    includes: Vec<component::Id>,
    /// Component ids an entity must not carry.
    excludes: Vec<component::Id>,
}

impl<'s> QueryBuilder<'s> {
    /// Start an empty builder against the given registry.
    pub(crate) fn new(components: &'s Registry) -> Self {
        Self {
            components,
            includes: Vec::new(),
            excludes: Vec::new(),
        }
    }

    /// Require component `C` to be present.
    pub fn with<C: Component>(mut self) -> Self {
        self.includes.push(self.components.register::<C>());
        self
    }

    /// Require component `C` to be absent.
    pub fn without<C: Component>(mut self) -> Self {
        self.excludes.push(self.components.register::<C>());
        self
    }

    /// Finish the builder.
    ///
    /// # Panics
    /// Panics if a component appears in both the `with` and `without` sets.
    pub fn build(self) -> Query {
        let includes = Signature::new(self.includes);
        let excludes = Signature::new(self.excludes);
        assert!(
            includes.is_disjoint(&excludes),
            "a component cannot be both required and excluded"
        );
        Query {
            includes,
            excludes,
            matches: Vec::new(),
            archetypes_seen: 0,
            cursor: 0,
            row: 0,
            row_limit: 0,
        }
    }
}

/// One entity produced by a query walk: the entity id plus the archetype row
/// it was found at. Copy, owns nothing; resolve components through the
/// storage (e.g. [`Storage::get`] or [`Storage::entity`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    entity: Entity,
    archetype: archetype::Id,
    row: Row,
}

impl Match {
    /// The entity found.
    #[inline]
    pub fn entity(&self) -> Entity {
        self.entity
    }

    /// The archetype the entity was found in.
    #[inline]
    pub(crate) fn archetype(&self) -> archetype::Id {
        self.archetype
    }

    /// The row the entity was found at. Only valid until the next structural
    /// change, which is why it stays inside the crate.
    #[inline]
    pub(crate) fn row(&self) -> Row {
        self.row
    }
}

/// A reusable filter over the storage: entities carrying every `with`
/// component and none of the `without` components.
///
/// The matching archetype list is cached between iterations and refreshed
/// when the storage has grown new archetypes. See the [module
/// docs](self) for the iteration protocol.
pub struct Query {
    /// Components an entity must carry, sorted.
    includes: Signature,
    /// Components an entity must not carry, sorted.
    excludes: Signature,

    /// Cached ids of matching archetypes, ascending.
    matches: Vec<archetype::Id>,
    /// The storage's archetype count when `matches` was computed; the cache
    /// is stale whenever the current count differs.
    archetypes_seen: usize,

    /// Position in `matches` of the archetype being walked.
    cursor: usize,
    /// Next row to yield within the current archetype.
    row: usize,
    /// Entity count of the current archetype, snapshotted on entry so rows
    /// appended mid-walk are not visited.
    row_limit: usize,
}

impl Query {
    /// Begin (or restart) an iteration, refreshing the cached archetype list
    /// if the storage's shape has changed since the last walk.
    pub fn start(&mut self, storage: &Storage) {
        if self.archetypes_seen != storage.archetype_count() {
            self.refresh(storage);
        }
        self.cursor = 0;
        self.row = 0;
        self.row_limit = 0;
    }

    /// Yield the next matching entity, or `None` when the walk is done.
    ///
    /// Entities come grouped by archetype, archetypes in ascending id order,
    /// rows ascending as of the moment the archetype was entered.
    pub fn next(&mut self, storage: &Storage) -> Option<Match> {
        loop {
            let archetype_id = *self.matches.get(self.cursor)?;
            let archetype = storage.archetype(archetype_id);
            if self.row == 0 {
                // Entering this archetype: snapshot its roster length so
                // entities appended during the walk stay invisible to it.
                self.row_limit = archetype.len();
            }
            if self.row >= self.row_limit.min(archetype.len()) {
                self.cursor += 1;
                self.row = 0;
                continue;
            }

            let row = Row::new(self.row);
            self.row += 1;
            return Some(Match {
                entity: archetype.entity(row).expect("roster shrank mid-walk"),
                archetype: archetype_id,
                row,
            });
        }
    }

    /// Walk the query as a plain iterator borrowing the storage for the
    /// whole loop. Convenient for read-only passes; use the
    /// [`start`](Query::start)/[`next`](Query::next) protocol when commands
    /// are recorded inside the loop.
    pub fn iter<'q>(&'q mut self, storage: &'q Storage) -> Iter<'q> {
        self.start(storage);
        Iter {
            query: self,
            storage,
        }
    }

    /// Recompute the matching archetype set from the inverted component
    /// index.
    fn refresh(&mut self, storage: &Storage) {
        let archetype_count = storage.archetype_count();
        let mut candidates = FixedBitSet::with_capacity(archetype_count);

        if self.includes.is_empty() {
            // No requirements: every archetype qualifies.
            candidates.insert_range(..);
        } else {
            let mut includes = self.includes.ids().iter();
            // Seed from the first required component's archetypes ...
            if let Some(archetypes) = storage.archetypes_with(*includes.next().unwrap()) {
                for id in archetypes.keys() {
                    candidates.insert(id.index());
                }
            }
            // ... and intersect with each further one. A component no
            // archetype carries empties the set.
            for component in includes {
                let mut carrying = FixedBitSet::with_capacity(archetype_count);
                if let Some(archetypes) = storage.archetypes_with(*component) {
                    for id in archetypes.keys() {
                        carrying.insert(id.index());
                    }
                }
                candidates.intersect_with(&carrying);
            }
        }

        // Subtract every archetype carrying an excluded component.
        for component in self.excludes.ids() {
            if let Some(archetypes) = storage.archetypes_with(*component) {
                for id in archetypes.keys() {
                    candidates.set(id.index(), false);
                }
            }
        }

        self.matches = candidates.ones().map(archetype::Id::from).collect();
        self.archetypes_seen = archetype_count;
    }
}

/// Borrowing iterator over a query walk. Created by [`Query::iter`].
pub struct Iter<'q> {
    query: &'q mut Query,
    storage: &'q Storage,
}

impl Iterator for Iter<'_> {
    type Item = Match;

    fn next(&mut self) -> Option<Self::Item> {
        self.query.next(self.storage)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use quarry_macros::Component;

    use super::*;

    #[derive(Component, Debug, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    #[derive(Component, Debug, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    #[derive(Component)]
    struct Player;

    /// Entities: e1{P}, e2{P,V}, e3{P,Player}, e4{V}.
    fn make_storage() -> (Storage, [Entity; 4]) {
        let mut storage = Storage::new();

        let e1 = storage.create_entity();
        storage.add_component(e1, Position { x: 1.0, y: 1.0 });

        let e2 = storage.create_entity();
        storage.add_component(e2, Position { x: 2.0, y: 2.0 });
        storage.add_component(e2, Velocity { dx: 0.1, dy: 0.2 });

        let e3 = storage.create_entity();
        storage.add_component(e3, Position { x: 3.0, y: 3.0 });
        storage.add_component(e3, Player);

        let e4 = storage.create_entity();
        storage.add_component(e4, Velocity { dx: 0.3, dy: 0.4 });

        (storage, [e1, e2, e3, e4])
    }

    fn collect(query: &mut Query, storage: &Storage) -> Vec<Entity> {
        query.iter(storage).map(|found| found.entity()).collect()
    }

    #[test]
    fn include_only_matches_supersets() {
        // Given
        let (storage, [e1, e2, e3, _e4]) = make_storage();

        // When
        let mut query = storage.query().with::<Position>().build();
        let found: HashSet<_> = collect(&mut query, &storage).into_iter().collect();

        // Then
        assert_eq!(found, HashSet::from([e1, e2, e3]));
    }

    #[test]
    fn include_and_exclude() {
        // Given
        let (storage, [e1, _e2, e3, _e4]) = make_storage();

        // When
        let mut query = storage
            .query()
            .with::<Position>()
            .without::<Velocity>()
            .build();
        let found: HashSet<_> = collect(&mut query, &storage).into_iter().collect();

        // Then
        assert_eq!(found, HashSet::from([e1, e3]));
    }

    #[test]
    fn multiple_includes_intersect() {
        // Given
        let (storage, [_e1, e2, _e3, _e4]) = make_storage();

        // When
        let mut query = storage
            .query()
            .with::<Position>()
            .with::<Velocity>()
            .build();
        let found = collect(&mut query, &storage);

        // Then
        assert_eq!(found, vec![e2]);
    }

    #[test]
    fn empty_includes_match_everything() {
        // Given
        let (storage, entities) = make_storage();

        // When
        let mut query = storage.query().build();
        let found: HashSet<_> = collect(&mut query, &storage).into_iter().collect();

        // Then
        assert_eq!(found, HashSet::from(entities));
    }

    #[test]
    fn unknown_component_matches_nothing() {
        // Given
        #[derive(Component)]
        struct NeverAttached;
        let (storage, _) = make_storage();

        // When
        let mut query = storage.query().with::<NeverAttached>().build();

        // Then
        assert!(collect(&mut query, &storage).is_empty());
    }

    #[test]
    fn each_entity_yielded_exactly_once() {
        // Given
        let (storage, _) = make_storage();
        let mut query = storage.query().with::<Position>().build();

        // When
        let found = collect(&mut query, &storage);

        // Then
        let unique: HashSet<_> = found.iter().copied().collect();
        assert_eq!(found.len(), unique.len());
    }

    #[test]
    fn restart_yields_same_set() {
        // Given
        let (storage, _) = make_storage();
        let mut query = storage.query().with::<Position>().build();

        // When
        let first: HashSet<_> = collect(&mut query, &storage).into_iter().collect();
        let second: HashSet<_> = collect(&mut query, &storage).into_iter().collect();

        // Then
        assert_eq!(first, second);
    }

    #[test]
    fn refresh_picks_up_new_archetypes() {
        // Given
        let (mut storage, _) = make_storage();
        let mut query = storage.query().with::<Velocity>().build();
        let before = collect(&mut query, &storage).len();

        // When - a brand-new archetype {V, Player} appears between walks
        let late = storage.create_entity();
        storage.add_component(late, Velocity { dx: 1.0, dy: 1.0 });
        storage.add_component(late, Player);

        // Then
        let after = collect(&mut query, &storage);
        assert_eq!(after.len(), before + 1);
        assert!(after.contains(&late));
    }

    #[test]
    fn rows_ascend_within_an_archetype() {
        // Given
        let mut storage = Storage::new();
        let entities: Vec<_> = (0..5)
            .map(|i| {
                let e = storage.create_entity();
                storage.add_component(e, Position { x: i as f32, y: 0.0 });
                e
            })
            .collect();

        // When
        let mut query = storage.query().with::<Position>().build();
        let found = collect(&mut query, &storage);

        // Then - one archetype, insertion order preserved
        assert_eq!(found, entities);
    }

    #[test]
    fn entities_created_mid_walk_are_not_visited() {
        // Given
        let mut storage = Storage::new();
        for _ in 0..3 {
            storage.create_entity();
        }
        // An include-less query walks the empty archetype itself.
        let mut query = storage.query().build();

        // When - create entities while walking; they land in the archetype
        // being iterated
        let mut visited = 0;
        query.start(&storage);
        while query.next(&storage).is_some() {
            visited += 1;
            storage.create_entity();
        }

        // Then - only the original three were seen
        assert_eq!(visited, 3);
        assert_eq!(storage.len(), 6);
    }

    #[test]
    #[should_panic(expected = "both required and excluded")]
    fn overlapping_with_and_without_rejected() {
        let storage = Storage::new();
        let _ = storage
            .query()
            .with::<Position>()
            .without::<Position>()
            .build();
    }
}
