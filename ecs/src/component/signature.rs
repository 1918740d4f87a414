use crate::component::Id;

/// The canonical description of an archetype: its component ids, sorted
/// ascending with no duplicates.
///
/// The sorted representation is what makes signatures usable as map keys (two
/// archetypes are the same iff their signatures are equal) and lets the set
/// predicates below run as single merge passes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    ids: Vec<Id>,
}

impl Signature {
    /// The empty signature, naming the archetype of component-less entities.
    pub const EMPTY: Self = Signature { ids: Vec::new() };

    /// Construct a signature from the given component ids.
    #[inline]
    pub fn new(ids: impl Into<Vec<Id>>) -> Self {
        let mut ids = ids.into();
        ids.sort();
        ids.dedup();
        ids.shrink_to_fit();

        Self { ids }
    }

    /// Get the component ids, sorted ascending.
    #[inline]
    pub fn ids(&self) -> &[Id] {
        &self.ids
    }

    /// Determine if this signature contains the given component id.
    #[inline]
    pub fn contains(&self, id: Id) -> bool {
        self.ids.binary_search(&id).is_ok()
    }

    /// The position of `id` in this signature, which is also the position of
    /// its column inside the archetype.
    #[inline]
    pub fn position(&self, id: Id) -> Option<usize> {
        self.ids.binary_search(&id).ok()
    }

    /// Determine if every id in `other` appears in this signature.
    ///
    /// Single merge pass over the two sorted lists.
    pub fn contains_all(&self, other: &Signature) -> bool {
        let mut own = self.ids.iter();
        for needed in &other.ids {
            loop {
                match own.next() {
                    Some(id) if id == needed => break,
                    Some(id) if id < needed => continue,
                    _ => return false,
                }
            }
        }
        true
    }

    /// Determine if this signature and `other` share no id.
    ///
    /// Single merge pass over the two sorted lists.
    pub fn is_disjoint(&self, other: &Signature) -> bool {
        let (mut i, mut j) = (0, 0);
        while i < self.ids.len() && j < other.ids.len() {
            match self.ids[i].cmp(&other.ids[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => return false,
            }
        }
        true
    }

    /// The signature with `id` inserted at its sorted position, and that
    /// position. The id must not already be present.
    pub fn with(&self, id: Id) -> (Signature, usize) {
        let slot = self
            .ids
            .binary_search(&id)
            .expect_err("component already in signature");
        let mut ids = Vec::with_capacity(self.ids.len() + 1);
        ids.extend_from_slice(&self.ids[..slot]);
        ids.push(id);
        ids.extend_from_slice(&self.ids[slot..]);
        (Signature { ids }, slot)
    }

    /// The signature with `id` removed, and the position it was removed from.
    /// The id must be present.
    pub fn without(&self, id: Id) -> (Signature, usize) {
        let slot = self
            .ids
            .binary_search(&id)
            .expect("component not in signature");
        let mut ids = Vec::with_capacity(self.ids.len() - 1);
        ids.extend_from_slice(&self.ids[..slot]);
        ids.extend_from_slice(&self.ids[slot + 1..]);
        (Signature { ids }, slot)
    }

    /// Returns true if this signature is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the number of component ids in this signature.
    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

impl From<Vec<Id>> for Signature {
    #[inline]
    fn from(value: Vec<Id>) -> Self {
        Signature::new(value)
    }
}

#[cfg(test)]
mod tests {
    use std::hash::{DefaultHasher, Hash, Hasher};

    use super::*;

    fn id(value: u32) -> Id {
        Id::new(value)
    }

    #[test]
    fn new_sorts_and_dedupes() {
        // Given / When
        let signature = Signature::new(vec![id(3), id(1), id(2), id(1)]);

        // Then
        assert_eq!(signature.ids(), &[id(1), id(2), id(3)]);
    }

    #[test]
    fn order_insensitive_equality_and_hash() {
        // Given
        let a = Signature::new(vec![id(2), id(1), id(3)]);
        let b = Signature::new(vec![id(1), id(2), id(3)]);

        // Then
        assert_eq!(a, b);
        let mut hasher_a = DefaultHasher::new();
        a.hash(&mut hasher_a);
        let mut hasher_b = DefaultHasher::new();
        b.hash(&mut hasher_b);
        assert_eq!(hasher_a.finish(), hasher_b.finish());
    }

    #[test]
    fn contains_and_position() {
        // Given
        let signature = Signature::new(vec![id(1), id(4), id(9)]);

        // Then
        assert!(signature.contains(id(4)));
        assert!(!signature.contains(id(5)));
        assert_eq!(signature.position(id(9)), Some(2));
        assert_eq!(signature.position(id(2)), None);
    }

    #[test]
    fn contains_all_is_superset_check() {
        // Given
        let big = Signature::new(vec![id(1), id(2), id(3), id(7)]);
        let sub = Signature::new(vec![id(2), id(7)]);
        let other = Signature::new(vec![id(2), id(8)]);

        // Then
        assert!(big.contains_all(&sub));
        assert!(big.contains_all(&big));
        assert!(big.contains_all(&Signature::EMPTY));
        assert!(!big.contains_all(&other));
        assert!(!sub.contains_all(&big));
    }

    #[test]
    fn disjoint_signatures() {
        // Given
        let a = Signature::new(vec![id(1), id(3), id(5)]);
        let b = Signature::new(vec![id(2), id(4)]);
        let c = Signature::new(vec![id(4), id(5)]);

        // Then
        assert!(a.is_disjoint(&b));
        assert!(b.is_disjoint(&a));
        assert!(!a.is_disjoint(&c));
        assert!(a.is_disjoint(&Signature::EMPTY));
    }

    #[test]
    fn with_inserts_at_sorted_position() {
        // Given
        let signature = Signature::new(vec![id(1), id(5)]);

        // When
        let (grown, slot) = signature.with(id(3));

        // Then
        assert_eq!(grown.ids(), &[id(1), id(3), id(5)]);
        assert_eq!(slot, 1);
        // Original unchanged
        assert_eq!(signature.len(), 2);
    }

    #[test]
    fn without_removes_at_position() {
        // Given
        let signature = Signature::new(vec![id(1), id(3), id(5)]);

        // When
        let (shrunk, slot) = signature.without(id(3));

        // Then
        assert_eq!(shrunk.ids(), &[id(1), id(5)]);
        assert_eq!(slot, 1);
    }

    #[test]
    #[should_panic(expected = "component already in signature")]
    fn with_rejects_duplicate() {
        let signature = Signature::new(vec![id(1)]);
        let _ = signature.with(id(1));
    }

    #[test]
    #[should_panic(expected = "component not in signature")]
    fn without_rejects_missing() {
        let signature = Signature::new(vec![id(1)]);
        let _ = signature.without(id(2));
    }
}
