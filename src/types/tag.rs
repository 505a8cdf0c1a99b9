//! Hierarchical tags.

use crate::error::{Result, TableError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Segment separator inside a tag
pub const TAG_SEPARATOR: char = '.';

/// A dot-separated hierarchical identifier such as `combat.melee.sword`.
///
/// The empty tag is the invalid tag: it is the parent of every root tag and
/// terminates ancestor walks. Ordering is plain string ordering, which keeps
/// iteration over tag collections deterministic.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Tag(String);

impl Tag {
    /// Parse and validate a tag
    pub fn new(name: &str) -> Result<Self> {
        if !Self::is_well_formed(name) {
            return Err(TableError::InvalidTag(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    /// The invalid (empty) tag
    pub fn none() -> Self {
        Self(String::new())
    }

    /// Check whether text would make a valid tag
    pub fn is_well_formed(name: &str) -> bool {
        !name.is_empty()
            && name.split(TAG_SEPARATOR).all(|segment| {
                !segment.is_empty()
                    && segment
                        .chars()
                        .all(|c| !c.is_whitespace() && !c.is_control() && c != '|')
            })
    }

    /// Whether this is a real tag (not the empty tag)
    pub fn is_valid(&self) -> bool {
        !self.0.is_empty()
    }

    /// Full tag text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The tag with its last segment trimmed. Root tags yield the empty tag.
    pub fn direct_parent(&self) -> Tag {
        match self.0.rfind(TAG_SEPARATOR) {
            Some(pos) => Self(self.0[..pos].to_string()),
            None => Self::none(),
        }
    }

    /// All ancestors, nearest first, ending at the root segment
    pub fn ancestors(&self) -> Ancestors {
        Ancestors {
            next: self.direct_parent(),
        }
    }

    /// Individual segments, root first
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(TAG_SEPARATOR).filter(|s| !s.is_empty())
    }

    /// Number of segments (0 for the empty tag)
    pub fn depth(&self) -> usize {
        self.segments().count()
    }

    /// True if `self` equals `other` or is one of its ancestors
    pub fn is_ancestor_or_self_of(&self, other: &Tag) -> bool {
        self.is_valid()
            && (other.0 == self.0
                || (other.0.starts_with(&self.0)
                    && other.0[self.0.len()..].starts_with(TAG_SEPARATOR)))
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "None")
        }
    }
}

impl std::str::FromStr for Tag {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

/// Iterator over the ancestors of a tag
pub struct Ancestors {
    next: Tag,
}

impl Iterator for Ancestors {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        if !self.next.is_valid() {
            return None;
        }
        let parent = self.next.direct_parent();
        Some(std::mem::replace(&mut self.next, parent))
    }
}
