//! Tag to index resolution.
//!
//! A table keeps one [`TagIndexMap`] for its rows and one for its columns.
//! Exact lookups are a single hash probe. Nearest lookups walk up the tag's
//! ancestors until one is registered, so a query for `a.b.c` falls back to
//! `a.b` and then `a`.

use crate::types::{Tag, TagIndex};
use std::collections::HashMap;

/// Maps registered tags to dense indices
#[derive(Debug, Default, Clone)]
pub struct TagIndexMap {
    entries: HashMap<Tag, TagIndex>,
    next_index: u32,
}

impl TagIndexMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag and every missing ancestor.
    ///
    /// Returns the newly assigned entries, leaf first. Registering a known or
    /// invalid tag returns an empty list.
    pub fn register(&mut self, tag: &Tag) -> Vec<(Tag, TagIndex)> {
        let mut added = Vec::new();
        let mut current = tag.clone();
        while current.is_valid() && !self.entries.contains_key(&current) {
            let parent = current.direct_parent();
            if let Some(index) = self.insert(current.clone()) {
                added.push((current, index));
            }
            current = parent;
        }
        added
    }

    /// Register a single tag, ignoring its ancestors.
    ///
    /// Returns `None` if the tag is invalid or already present.
    pub fn insert(&mut self, tag: Tag) -> Option<TagIndex> {
        if !tag.is_valid() || self.entries.contains_key(&tag) {
            return None;
        }
        let index = TagIndex::new(self.next_index);
        self.next_index += 1;
        self.entries.insert(tag, index);
        Some(index)
    }

    /// Resolve a tag. With `exact == false` the closest registered ancestor wins.
    pub fn resolve(&self, tag: &Tag, exact: bool) -> TagIndex {
        if let Some(&index) = self.entries.get(tag) {
            return index;
        }
        if exact || !tag.is_valid() {
            return TagIndex::INVALID;
        }
        tag.ancestors()
            .find_map(|ancestor| self.entries.get(&ancestor).copied())
            .unwrap_or(TagIndex::INVALID)
    }

    /// Exact lookup
    pub fn get(&self, tag: &Tag) -> Option<TagIndex> {
        self.entries.get(tag).copied()
    }

    pub fn contains(&self, tag: &Tag) -> bool {
        self.entries.contains_key(tag)
    }

    /// Unregister a tag. Its index is not reused.
    pub fn remove(&mut self, tag: &Tag) -> Option<TagIndex> {
        self.entries.remove(tag)
    }

    /// Number of live tags
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The index the next registered tag will receive
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    /// Drop every tag and reset the counter
    pub fn clear(&mut self) {
        self.entries.clear();
        self.next_index = 0;
    }

    /// Live entries ordered by index
    pub fn entries_by_index(&self) -> Vec<(Tag, TagIndex)> {
        let mut entries: Vec<(Tag, TagIndex)> = self
            .entries
            .iter()
            .map(|(tag, &index)| (tag.clone(), index))
            .collect();
        entries.sort_by_key(|&(_, index)| index);
        entries
    }

    /// Live tags ordered by index. This is the canonical persisted order.
    pub fn tags_by_index(&self) -> Vec<Tag> {
        self.entries_by_index()
            .into_iter()
            .map(|(tag, _)| tag)
            .collect()
    }

    /// Live tags whose direct parent is not registered
    pub fn orphans(&self) -> Vec<Tag> {
        self.entries_by_index()
            .into_iter()
            .map(|(tag, _)| tag)
            .filter(|tag| {
                let parent = tag.direct_parent();
                parent.is_valid() && !self.entries.contains_key(&parent)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Result;

    fn tag(name: &str) -> Tag {
        Tag::new(name).unwrap()
    }

    #[test]
    fn test_register_adds_ancestors() {
        let mut map = TagIndexMap::new();
        let added = map.register(&tag("a.b.c"));
        assert_eq!(
            added,
            vec![
                (tag("a.b.c"), TagIndex::new(0)),
                (tag("a.b"), TagIndex::new(1)),
                (tag("a"), TagIndex::new(2)),
            ]
        );

        // Only the missing part of a chain is added
        let added = map.register(&tag("a.d"));
        assert_eq!(added, vec![(tag("a.d"), TagIndex::new(3))]);

        // Idempotent
        assert!(map.register(&tag("a.b")).is_empty());
        assert!(map.register(&Tag::none()).is_empty());
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn test_nearest_ancestor_resolution() {
        let mut map = TagIndexMap::new();
        map.insert(tag("a"));
        map.insert(tag("a.b"));

        assert_eq!(map.resolve(&tag("a.b.c"), false), TagIndex::new(1));
        assert_eq!(map.resolve(&tag("a.b.c"), true), TagIndex::INVALID);
        assert_eq!(map.resolve(&tag("a.x"), false), TagIndex::new(0));
        assert_eq!(map.resolve(&tag("z.b"), false), TagIndex::INVALID);
        assert_eq!(map.resolve(&Tag::none(), false), TagIndex::INVALID);
    }

    #[test]
    fn test_indices_are_not_reused() {
        let mut map = TagIndexMap::new();
        map.insert(tag("a"));
        map.insert(tag("b"));
        assert_eq!(map.remove(&tag("a")), Some(TagIndex::new(0)));
        assert_eq!(map.insert(tag("a")), Some(TagIndex::new(2)));
        assert_eq!(map.next_index(), 3);
        assert_eq!(map.tags_by_index(), vec![tag("b"), tag("a")]);
    }

    #[test]
    fn test_duplicate_insert_and_clear() {
        let mut map = TagIndexMap::new();
        assert!(map.insert(tag("a")).is_some());
        assert!(map.insert(tag("a")).is_none());
        map.clear();
        assert!(map.is_empty());
        assert_eq!(map.insert(tag("a")), Some(TagIndex::new(0)));
    }

    #[test]
    fn test_orphans() -> Result<()> {
        let mut map = TagIndexMap::new();
        map.insert(Tag::new("a")?);
        map.insert(Tag::new("a.b")?);
        map.insert(Tag::new("x.y")?);
        assert_eq!(map.orphans(), vec![Tag::new("x.y")?]);
        Ok(())
    }
}
