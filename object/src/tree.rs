// MIT LICENSE
//
// Copyright (c) 2024 Hoard Engine Contributors
//
// Permission is hereby granted, free of charge, to any
// person obtaining a copy of this software and associated
// documentation files (the "Software"), to deal in the
// Software without restriction, including without
// limitation the rights to use, copy, modify, merge,
// publish, distribute, sublicense, and/or sell copies of
// the Software, and to permit persons to whom the Software
// is furnished to do so, subject to the following
// conditions:
//
// The above copyright notice and this permission notice
// shall be included in all copies or substantial portions
// of the Software.
//
// THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF
// ANY KIND, EXPRESS OR IMPLIED, INCLUDING BUT NOT LIMITED
// TO THE WARRANTIES OF MERCHANTABILITY, FITNESS FOR A
// PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT
// SHALL THE AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY
// CLAIM, DAMAGES OR OTHER LIABILITY, WHETHER IN AN ACTION
// OF CONTRACT, TORT OR OTHERWISE, ARISING FROM, OUT OF OR
// IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER
// DEALINGS IN THE SOFTWARE.

use std::collections::BTreeMap;

use crate::{serialization, ObjectId};

/// A directory object: an ordered mapping from child name to child ID.
///
/// Children are kept strictly ascending by name, which makes the ID
/// invariant under insertion order. A tree's ID depends only on its direct
/// children's names and IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeObject {
    children: Vec<(String, ObjectId)>,
    id: ObjectId,
}

impl TreeObject {
    /// Builds a tree from arbitrary-order children. Later entries win on a
    /// duplicate name, matching map-insertion semantics.
    pub fn from_children<I>(children: I) -> Self
    where
        I: IntoIterator<Item = (String, ObjectId)>,
    {
        let map: BTreeMap<String, ObjectId> = children.into_iter().collect();
        Self::from_child_map(map)
    }

    /// Builds a tree from an already-sorted child map.
    pub fn from_child_map(children: BTreeMap<String, ObjectId>) -> Self {
        let children: Vec<(String, ObjectId)> = children.into_iter().collect();
        let bytes = serialization::encode_tree(&children);
        let id = ObjectId::digest(&bytes);
        TreeObject { children, id }
    }

    /// Reassembles a tree decoded from storage. The caller guarantees the
    /// pairs are sorted (the canonical encoding stores them that way).
    pub(crate) fn from_sorted_parts(id: ObjectId, children: Vec<(String, ObjectId)>) -> Self {
        TreeObject { children, id }
    }

    /// Sorted `(name, id)` child pairs.
    pub fn children(&self) -> &[(String, ObjectId)] {
        &self.children
    }

    /// Looks up a child by name.
    pub fn get(&self, name: &str) -> Option<ObjectId> {
        self.children
            .binary_search_by(|(child, _)| child.as_str().cmp(name))
            .ok()
            .map(|idx| self.children[idx].1)
    }

    /// Whether the tree has a child with this name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Looks up a child by its position in sorted order; used by the
    /// compressed-path reverse index.
    pub fn child_at(&self, index: usize) -> Option<(&str, ObjectId)> {
        self.children
            .get(index)
            .map(|(name, id)| (name.as_str(), *id))
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether the tree has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// The tree's content address.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The canonical serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialization::encode_tree(&self.children)
    }
}
