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

//! Cached post-order aggregation over trees.
//!
//! A calculator contributes a value per atom and folds children per
//! compound node; [`CachedCalc`] memoizes results by node identity in a
//! small LRU so shared subtrees are evaluated once. The composite readers
//! walk several parallel roots at once (HOARD's desired plus each cave's
//! current/desired), which is how the query and presence statistics see
//! the whole fleet in one pass.

use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroUsize;

use hoard_object::{FileBlob, ObjectId, StoredObject};
use lru::LruCache;

use crate::{Error, Objects};

/// A post-order fold over some notion of tree node.
pub trait RecursiveCalc {
    /// Node identity; carries the IDs needed to load the position.
    type Node;
    /// The folded value.
    type Value: Clone;

    /// Stable cache key for a node.
    fn cache_key(&self, node: &Self::Node) -> Vec<u8>;
    /// Whether the node folds children (a directory position).
    fn is_compound(&self, objects: &Objects, node: &Self::Node) -> Result<bool, Error>;
    /// Named children of a compound node.
    fn children(
        &self,
        objects: &Objects,
        node: &Self::Node,
    ) -> Result<Vec<(String, Self::Node)>, Error>;
    /// Value of an atom (a file position).
    fn atom_value(&self, objects: &Objects, node: &Self::Node) -> Result<Self::Value, Error>;
    /// Fold of the children's values.
    fn aggregate(&self, children: Vec<(String, Self::Value)>) -> Self::Value;
}

/// Drives a [`RecursiveCalc`] with LRU memoization by node identity.
pub struct CachedCalc<C: RecursiveCalc> {
    calc: C,
    cache: LruCache<Vec<u8>, C::Value>,
}

impl<C: RecursiveCalc> CachedCalc<C> {
    /// Wraps a calculator with a memo of `capacity` entries.
    pub fn new(calc: C, capacity: NonZeroUsize) -> Self {
        CachedCalc {
            calc,
            cache: LruCache::new(capacity),
        }
    }

    /// The value at `node`, computed or recalled.
    pub fn get(&mut self, objects: &Objects, node: &C::Node) -> Result<C::Value, Error> {
        let key = self.calc.cache_key(node);
        if let Some(value) = self.cache.get(&key) {
            return Ok(value.clone());
        }
        let value = if self.calc.is_compound(objects, node)? {
            let mut folded = Vec::new();
            for (name, child) in self.calc.children(objects, node)? {
                let child_value = self.get(objects, &child)?;
                folded.push((name, child_value));
            }
            self.calc.aggregate(folded)
        } else {
            self.calc.atom_value(objects, node)?
        };
        self.cache.put(key, value.clone());
        Ok(value)
    }
}

fn key_part(id: Option<ObjectId>) -> Vec<u8> {
    match id {
        // 0x01-tagged to keep Some(id) and None injective.
        Some(id) => {
            let mut part = vec![0x01];
            part.extend_from_slice(id.as_bytes());
            part
        }
        None => vec![0x00],
    }
}

fn load(objects: &Objects, id: Option<ObjectId>) -> Result<Option<StoredObject>, Error> {
    id.map(|id| objects.get_existing(&id)).transpose()
}

fn tree_children(obj: &Option<StoredObject>) -> Vec<(String, ObjectId)> {
    obj.as_ref()
        .and_then(StoredObject::as_tree)
        .map(|tree| tree.children().to_vec())
        .unwrap_or_default()
}

fn is_tree(obj: &Option<StoredObject>) -> bool {
    obj.as_ref().is_some_and(|o| o.as_tree().is_some())
}

fn blob_size(obj: &Option<StoredObject>) -> u64 {
    obj.as_ref()
        .and_then(StoredObject::as_blob)
        .map(FileBlob::size)
        .unwrap_or(0)
}

/// Disk usage a (current, desired) pair accounts for: per file the larger
/// of the two sizes, summed over the tree.
pub struct UsedSizeCalc;

/// Node of [`UsedSizeCalc`]: the (current, desired) IDs at one position.
pub type PairNode = (Option<ObjectId>, Option<ObjectId>);

impl RecursiveCalc for UsedSizeCalc {
    type Node = PairNode;
    type Value = u64;

    fn cache_key(&self, node: &Self::Node) -> Vec<u8> {
        let mut key = key_part(node.0);
        key.extend(key_part(node.1));
        key
    }

    fn is_compound(&self, objects: &Objects, node: &Self::Node) -> Result<bool, Error> {
        let left = load(objects, node.0)?;
        let right = load(objects, node.1)?;
        Ok(is_tree(&left) || is_tree(&right))
    }

    fn children(
        &self,
        objects: &Objects,
        node: &Self::Node,
    ) -> Result<Vec<(String, Self::Node)>, Error> {
        let left = load(objects, node.0)?;
        let right = load(objects, node.1)?;
        let mut out: Vec<(String, Self::Node)> = Vec::new();

        // A blob opposite a tree would vanish from the fold; it gets a
        // pseudo-child so its size still counts.
        if left.as_ref().is_some_and(|o| o.as_blob().is_some()) && is_tree(&right) {
            out.push(("$CURRENT$".to_owned(), (node.0, None)));
        }
        if right.as_ref().is_some_and(|o| o.as_blob().is_some()) && is_tree(&left) {
            out.push(("$DESIRED$".to_owned(), (None, node.1)));
        }

        let left_children: BTreeMap<String, ObjectId> =
            tree_children(&left).into_iter().collect();
        let right_children: BTreeMap<String, ObjectId> =
            tree_children(&right).into_iter().collect();
        let names: BTreeSet<&String> =
            left_children.keys().chain(right_children.keys()).collect();
        for name in names {
            out.push((
                name.clone(),
                (
                    left_children.get(name).copied(),
                    right_children.get(name).copied(),
                ),
            ));
        }
        Ok(out)
    }

    fn atom_value(&self, objects: &Objects, node: &Self::Node) -> Result<Self::Value, Error> {
        let left = load(objects, node.0)?;
        let right = load(objects, node.1)?;
        Ok(blob_size(&left).max(blob_size(&right)))
    }

    fn aggregate(&self, children: Vec<(String, Self::Value)>) -> Self::Value {
        children.into_iter().map(|(_, value)| value).sum()
    }
}

/// A cave's relationship to one file, derived from its (current, desired)
/// pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PresenceStatus {
    /// On disk and planned to stay.
    Available,
    /// Planned but not on disk yet (or on disk in the wrong version).
    Get,
    /// On disk but no longer planned.
    Cleanup,
}

/// One position across the whole fleet: HOARD's desired plus each cave's
/// (current, desired) pair.
#[derive(Debug, Clone, Default)]
pub struct CompositeNode {
    /// HOARD's desired ID at this position.
    pub hoard: Option<ObjectId>,
    /// Per cave root name, the (current, desired) IDs at this position.
    pub caves: BTreeMap<String, (Option<ObjectId>, Option<ObjectId>)>,
}

impl CompositeNode {
    /// Roots-level node for the fleet.
    pub fn from_roots(
        roots: &crate::Roots,
        config: &crate::config::HoardConfig,
    ) -> Result<Self, Error> {
        let mut node = CompositeNode {
            hoard: roots.root(crate::roots::HOARD_ROOT).desired()?,
            caves: BTreeMap::new(),
        };
        for cave in config.caves() {
            let root = roots.root(&cave.root_name());
            node.caves
                .insert(cave.root_name(), (root.current()?, root.desired()?));
        }
        Ok(node)
    }

    fn cache_key(&self) -> Vec<u8> {
        let mut key = key_part(self.hoard);
        for (name, (current, desired)) in &self.caves {
            if current.is_none() && desired.is_none() {
                continue;
            }
            key.extend_from_slice(name.as_bytes());
            key.extend(key_part(*current));
            key.extend(key_part(*desired));
        }
        key
    }

    fn is_compound(&self, objects: &Objects) -> Result<bool, Error> {
        for id in self.all_ids() {
            if is_tree(&load(objects, Some(id))?) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn all_ids(&self) -> Vec<ObjectId> {
        let mut ids: Vec<ObjectId> = self.hoard.into_iter().collect();
        for (current, desired) in self.caves.values() {
            ids.extend(current.iter());
            ids.extend(desired.iter());
        }
        ids
    }

    /// Named children of this position, unioned across all participating
    /// roots.
    pub fn children(&self, objects: &Objects) -> Result<Vec<(String, CompositeNode)>, Error> {
        let hoard = load(objects, self.hoard)?;
        let mut caves_loaded: BTreeMap<&String, (Option<StoredObject>, Option<StoredObject>)> =
            BTreeMap::new();
        for (name, (current, desired)) in &self.caves {
            caves_loaded.insert(
                name,
                (load(objects, *current)?, load(objects, *desired)?),
            );
        }

        let mut names: BTreeSet<String> = tree_children(&hoard)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        for (current, desired) in caves_loaded.values() {
            names.extend(tree_children(current).into_iter().map(|(name, _)| name));
            names.extend(tree_children(desired).into_iter().map(|(name, _)| name));
        }

        let mut out = Vec::with_capacity(names.len());
        for name in names {
            let mut child = CompositeNode {
                hoard: hoard
                    .as_ref()
                    .and_then(StoredObject::as_tree)
                    .and_then(|tree| tree.get(&name)),
                caves: BTreeMap::new(),
            };
            for (cave, (current, desired)) in &caves_loaded {
                let current_child = current
                    .as_ref()
                    .and_then(StoredObject::as_tree)
                    .and_then(|tree| tree.get(&name));
                let desired_child = desired
                    .as_ref()
                    .and_then(StoredObject::as_tree)
                    .and_then(|tree| tree.get(&name));
                if current_child.is_some() || desired_child.is_some() {
                    child
                        .caves
                        .insert((*cave).clone(), (current_child, desired_child));
                }
            }
            out.push((name, child));
        }
        Ok(out)
    }

    /// Presence classification per cave at a file position.
    pub fn presence(&self) -> BTreeMap<String, PresenceStatus> {
        let mut presence = BTreeMap::new();
        for (cave, (current, desired)) in &self.caves {
            let status = match (current, desired) {
                (Some(c), Some(d)) if c == d => PresenceStatus::Available,
                (_, Some(_)) => PresenceStatus::Get,
                (Some(_), None) => PresenceStatus::Cleanup,
                (None, None) => continue,
            };
            presence.insert(cave.clone(), status);
        }
        presence
    }

    fn file_size(&self, objects: &Objects) -> Result<u64, Error> {
        if let Some(hoard) = self.hoard {
            return Ok(blob_size(&load(objects, Some(hoard))?));
        }
        for (current, _) in self.caves.values() {
            if let Some(id) = current {
                return Ok(blob_size(&load(objects, Some(*id))?));
            }
        }
        Ok(0)
    }
}

/// Statistics answered about one position of the fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStats {
    /// A file position.
    File {
        /// No cave keeps it beyond a pending cleanup.
        is_deleted: bool,
        /// Caves it is actually available on.
        num_sources: usize,
        /// The file's size.
        size: u64,
    },
    /// A folder position.
    Folder {
        /// Files below that are not deleted.
        count_non_deleted: usize,
    },
}

/// Folds [`QueryStats`] over the composite fleet view.
pub struct QueryStatsCalc;

impl RecursiveCalc for QueryStatsCalc {
    type Node = CompositeNode;
    type Value = QueryStats;

    fn cache_key(&self, node: &Self::Node) -> Vec<u8> {
        node.cache_key()
    }

    fn is_compound(&self, objects: &Objects, node: &Self::Node) -> Result<bool, Error> {
        node.is_compound(objects)
    }

    fn children(
        &self,
        objects: &Objects,
        node: &Self::Node,
    ) -> Result<Vec<(String, Self::Node)>, Error> {
        node.children(objects)
    }

    fn atom_value(&self, objects: &Objects, node: &Self::Node) -> Result<Self::Value, Error> {
        let presence = node.presence();
        let is_deleted = !presence
            .values()
            .any(|status| *status != PresenceStatus::Cleanup);
        let num_sources = presence
            .values()
            .filter(|status| **status == PresenceStatus::Available)
            .count();
        Ok(QueryStats::File {
            is_deleted,
            num_sources,
            size: node.file_size(objects)?,
        })
    }

    fn aggregate(&self, children: Vec<(String, Self::Value)>) -> Self::Value {
        let mut count_non_deleted = 0;
        for (_, child) in children {
            match child {
                QueryStats::File { is_deleted, .. } => {
                    if !is_deleted {
                        count_non_deleted += 1;
                    }
                }
                QueryStats::Folder {
                    count_non_deleted: below,
                } => count_non_deleted += below,
            }
        }
        QueryStats::Folder { count_non_deleted }
    }
}

/// A file count and byte total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SizeCount {
    /// Number of files.
    pub nfiles: u64,
    /// Total bytes.
    pub size: u64,
}

impl SizeCount {
    fn add(&mut self, other: SizeCount) {
        self.nfiles += other.nfiles;
        self.size += other.size;
    }
}

/// Per-cave totals, split by presence status.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SizeCountPresenceStats {
    per_cave: BTreeMap<String, BTreeMap<PresenceStatus, SizeCount>>,
}

impl SizeCountPresenceStats {
    /// Caves that contributed anything.
    pub fn caves(&self) -> impl Iterator<Item = &str> {
        self.per_cave.keys().map(String::as_str)
    }

    /// One cave's count under one status.
    pub fn for_cave(&self, cave: &str, status: PresenceStatus) -> SizeCount {
        self.per_cave
            .get(cave)
            .and_then(|by_status| by_status.get(&status))
            .copied()
            .unwrap_or_default()
    }

    /// One cave's total across statuses.
    pub fn total_for_cave(&self, cave: &str) -> SizeCount {
        let mut total = SizeCount::default();
        if let Some(by_status) = self.per_cave.get(cave) {
            for count in by_status.values() {
                total.add(*count);
            }
        }
        total
    }

    fn merge(&mut self, other: &SizeCountPresenceStats) {
        for (cave, by_status) in &other.per_cave {
            let target = self.per_cave.entry(cave.clone()).or_default();
            for (status, count) in by_status {
                target.entry(*status).or_default().add(*count);
            }
        }
    }
}

/// Folds per-cave-per-status size and count sums over the fleet.
pub struct SizeCountPresenceCalc;

impl RecursiveCalc for SizeCountPresenceCalc {
    type Node = CompositeNode;
    type Value = SizeCountPresenceStats;

    fn cache_key(&self, node: &Self::Node) -> Vec<u8> {
        node.cache_key()
    }

    fn is_compound(&self, objects: &Objects, node: &Self::Node) -> Result<bool, Error> {
        node.is_compound(objects)
    }

    fn children(
        &self,
        objects: &Objects,
        node: &Self::Node,
    ) -> Result<Vec<(String, Self::Node)>, Error> {
        node.children(objects)
    }

    fn atom_value(&self, objects: &Objects, node: &Self::Node) -> Result<Self::Value, Error> {
        let size = node.file_size(objects)?;
        let mut stats = SizeCountPresenceStats::default();
        for (cave, status) in node.presence() {
            stats
                .per_cave
                .entry(cave)
                .or_default()
                .insert(status, SizeCount { nfiles: 1, size });
        }
        Ok(stats)
    }

    fn aggregate(&self, children: Vec<(String, Self::Value)>) -> Self::Value {
        let mut total = SizeCountPresenceStats::default();
        for (_, child) in children {
            total.merge(&child);
        }
        total
    }
}
