//! Identity-aware collections
//!
//! `MemberSet` and `MemberMap` key every engine value on its [`MemberKey`],
//! so two instances of `Encounter/123` are one member no matter how they were
//! produced. Insertion order is preserved, which keeps strata and reports
//! deterministic across runs.

use indexmap::IndexMap;
use indexmap::map::Entry;
use octofhir_cqm_types::{ExpressionValue, MemberKey};

/// Set of engine values under domain equality
#[derive(Debug, Clone, Default)]
pub struct MemberSet {
    members: IndexMap<MemberKey, ExpressionValue>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value; the first instance of a member is the one kept.
    /// Returns `false` when the member was already present.
    pub fn insert(&mut self, value: ExpressionValue) -> bool {
        match self.members.entry(value.member_key()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(value);
                true
            }
        }
    }

    pub fn contains(&self, value: &ExpressionValue) -> bool {
        self.members.contains_key(&value.member_key())
    }

    pub fn contains_key(&self, key: &MemberKey) -> bool {
        self.members.contains_key(key)
    }

    pub fn get(&self, key: &MemberKey) -> Option<&ExpressionValue> {
        self.members.get(key)
    }

    pub fn remove(&mut self, value: &ExpressionValue) -> Option<ExpressionValue> {
        self.members.shift_remove(&value.member_key())
    }

    /// Keep only members also present in `other`
    pub fn retain_all(&mut self, other: &MemberSet) {
        self.members.retain(|key, _| other.contains_key(key));
    }

    /// Drop every member present in `other`
    pub fn remove_all(&mut self, other: &MemberSet) {
        self.members.retain(|key, _| !other.contains_key(key));
    }

    pub fn union(&self, other: &MemberSet) -> MemberSet {
        let mut union = self.clone();
        union.extend(other.iter().cloned());
        union
    }

    pub fn intersection(&self, other: &MemberSet) -> MemberSet {
        self.iter()
            .filter(|value| other.contains(value))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &ExpressionValue> {
        self.members.values()
    }

    pub fn keys(&self) -> impl Iterator<Item = &MemberKey> {
        self.members.keys()
    }
}

impl Extend<ExpressionValue> for MemberSet {
    fn extend<T: IntoIterator<Item = ExpressionValue>>(&mut self, iter: T) {
        for value in iter {
            self.insert(value);
        }
    }
}

impl FromIterator<ExpressionValue> for MemberSet {
    fn from_iter<T: IntoIterator<Item = ExpressionValue>>(iter: T) -> Self {
        let mut set = MemberSet::new();
        set.extend(iter);
        set
    }
}

impl IntoIterator for MemberSet {
    type Item = ExpressionValue;
    type IntoIter = indexmap::map::IntoValues<MemberKey, ExpressionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.into_values()
    }
}

impl<'a> IntoIterator for &'a MemberSet {
    type Item = &'a ExpressionValue;
    type IntoIter = indexmap::map::Values<'a, MemberKey, ExpressionValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.members.values()
    }
}

/// Map from engine values (under domain equality) to `V`
#[derive(Debug, Clone)]
pub struct MemberMap<V> {
    entries: IndexMap<MemberKey, (ExpressionValue, V)>,
}

impl<V> Default for MemberMap<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }
}

impl<V> MemberMap<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite; an existing key keeps its original instance.
    pub fn insert(&mut self, key: ExpressionValue, value: V) -> Option<V> {
        match self.entries.entry(key.member_key()) {
            Entry::Occupied(mut slot) => Some(std::mem::replace(&mut slot.get_mut().1, value)),
            Entry::Vacant(slot) => {
                slot.insert((key, value));
                None
            }
        }
    }

    /// Overwrite only when `key` is already present
    pub fn replace(&mut self, key: &ExpressionValue, value: V) -> Option<V> {
        self.entries
            .get_mut(&key.member_key())
            .map(|(_, existing)| std::mem::replace(existing, value))
    }

    pub fn get(&self, key: &ExpressionValue) -> Option<&V> {
        self.get_by_key(&key.member_key())
    }

    pub fn get_by_key(&self, key: &MemberKey) -> Option<&V> {
        self.entries.get(key).map(|(_, value)| value)
    }

    pub fn contains_key(&self, key: &ExpressionValue) -> bool {
        self.entries.contains_key(&key.member_key())
    }

    pub fn remove(&mut self, key: &ExpressionValue) -> Option<V> {
        self.entries
            .shift_remove(&key.member_key())
            .map(|(_, value)| value)
    }

    /// Keep only entries whose key is a member of `keys`
    pub fn retain_keys(&mut self, keys: &MemberSet) {
        self.entries.retain(|key, _| keys.contains_key(key));
    }

    /// Drop entries whose key is a member of `keys`
    pub fn remove_keys(&mut self, keys: &MemberSet) {
        self.entries.retain(|key, _| !keys.contains_key(key));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ExpressionValue, &V)> {
        self.entries.values().map(|(key, value)| (key, value))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ExpressionValue> {
        self.entries.values().map(|(key, _)| key)
    }

    pub fn member_keys(&self) -> impl Iterator<Item = &MemberKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|(_, value)| value)
    }

    /// Key set as a `MemberSet`
    pub fn key_set(&self) -> MemberSet {
        self.keys().cloned().collect()
    }
}

impl<V> FromIterator<(ExpressionValue, V)> for MemberMap<V> {
    fn from_iter<T: IntoIterator<Item = (ExpressionValue, V)>>(iter: T) -> Self {
        let mut map = MemberMap::new();
        for (key, value) in iter {
            map.insert(key, value);
        }
        map
    }
}
