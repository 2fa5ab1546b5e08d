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

//! Single-tree and synchronized multi-tree iteration.
//!
//! The walkers are explicit-stack iterators. Yielding a tree node arms a
//! set of pending children that the next `next()` call descends into;
//! calling `skip_subtree()` between the two disarms them, which is the
//! iterator rendition of a visitor's skip callback.

use std::collections::BTreeSet;

use hoard_object::{ObjectId, ObjectKind, StoredObject};
use hoard_path::HoardPath;

use crate::{Error, Objects};

/// One node yielded by [`TreeDfs`].
#[derive(Debug, Clone)]
pub struct DfsEntry {
    /// Path from the walk's prefix.
    pub path: HoardPath,
    /// Node kind.
    pub kind: ObjectKind,
    /// The node's ID.
    pub id: ObjectId,
    /// The decoded node.
    pub object: StoredObject,
}

/// Pre-order depth-first walk of a single tree.
pub struct TreeDfs<'o, 'db, 'tx> {
    objects: &'o Objects<'db, 'tx>,
    stack: Vec<(HoardPath, ObjectId)>,
    pending: Option<Vec<(HoardPath, ObjectId)>>,
}

impl<'o, 'db, 'tx> TreeDfs<'o, 'db, 'tx> {
    /// Starts a walk at `root`, with paths joined onto `prefix`. A `None`
    /// root terminates immediately.
    pub fn new(
        objects: &'o Objects<'db, 'tx>,
        prefix: HoardPath,
        root: Option<ObjectId>,
    ) -> Self {
        TreeDfs {
            objects,
            stack: root.map(|id| (prefix, id)).into_iter().collect(),
            pending: None,
        }
    }

    /// Prunes the subtree of the tree node yielded last; its children will
    /// not be visited.
    pub fn skip_subtree(&mut self) {
        self.pending = None;
    }
}

impl Iterator for TreeDfs<'_, '_, '_> {
    type Item = Result<DfsEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(children) = self.pending.take() {
            // Reverse so popping yields ascending names.
            self.stack.extend(children.into_iter().rev());
        }
        let (path, id) = self.stack.pop()?;
        let object = match self.objects.get_existing(&id) {
            Ok(object) => object,
            Err(err) => return Some(Err(err)),
        };
        let kind = object.kind();
        if let StoredObject::Tree(tree) = &object {
            self.pending = Some(
                tree.children()
                    .iter()
                    .map(|(name, child_id)| (path.child(name), *child_id))
                    .collect(),
            );
        }
        Some(Ok(DfsEntry {
            path,
            kind,
            id,
            object,
        }))
    }
}

/// One position yielded by [`ZipTreesDfs`].
#[derive(Debug, Clone)]
pub struct ZipEntry {
    /// Path from the walk's prefix.
    pub path: HoardPath,
    /// The ID each walked root has at this path, positionally.
    pub ids: Vec<Option<ObjectId>>,
}

/// Synchronized pre-order walk over N roots.
///
/// Descends into the sorted union of child names whenever at least one
/// root has a tree at the current position. With `drilldown_same` off, a
/// position where every root holds the same ID is yielded once and not
/// descended.
pub struct ZipTreesDfs<'o, 'db, 'tx> {
    objects: &'o Objects<'db, 'tx>,
    drilldown_same: bool,
    stack: Vec<(HoardPath, Vec<Option<ObjectId>>)>,
    pending: Option<Vec<(HoardPath, Vec<Option<ObjectId>>)>>,
}

impl<'o, 'db, 'tx> ZipTreesDfs<'o, 'db, 'tx> {
    /// Starts a synchronized walk over `roots` at `prefix`.
    pub fn new(
        objects: &'o Objects<'db, 'tx>,
        prefix: HoardPath,
        roots: Vec<Option<ObjectId>>,
        drilldown_same: bool,
    ) -> Self {
        ZipTreesDfs {
            objects,
            drilldown_same,
            stack: vec![(prefix, roots)],
            pending: None,
        }
    }

    /// Prunes the children armed by the last yielded position.
    pub fn skip_subtree(&mut self) {
        self.pending = None;
    }

    fn step(&mut self) -> Result<Option<ZipEntry>, Error> {
        if let Some(children) = self.pending.take() {
            self.stack.extend(children.into_iter().rev());
        }
        loop {
            let Some((path, ids)) = self.stack.pop() else {
                return Ok(None);
            };
            if ids.iter().all(Option::is_none) {
                continue;
            }
            let all_same = ids.windows(2).all(|pair| pair[0] == pair[1]);
            if all_same && !self.drilldown_same {
                return Ok(Some(ZipEntry { path, ids }));
            }

            let mut loaded: Vec<Option<StoredObject>> = Vec::with_capacity(ids.len());
            for id in &ids {
                loaded.push(match id {
                    Some(id) => Some(self.objects.get_existing(id)?),
                    None => None,
                });
            }

            let trees: Vec<Option<&hoard_object::TreeObject>> = loaded
                .iter()
                .map(|obj| obj.as_ref().and_then(StoredObject::as_tree))
                .collect();
            if trees.iter().any(Option::is_some) {
                let names: BTreeSet<&str> = trees
                    .iter()
                    .flatten()
                    .flat_map(|tree| tree.children().iter().map(|(name, _)| name.as_str()))
                    .collect();
                let children = names
                    .into_iter()
                    .map(|name| {
                        (
                            path.child(name),
                            trees
                                .iter()
                                .map(|tree| tree.and_then(|t| t.get(name)))
                                .collect(),
                        )
                    })
                    .collect();
                self.pending = Some(children);
            }
            return Ok(Some(ZipEntry { path, ids }));
        }
    }
}

impl Iterator for ZipTreesDfs<'_, '_, '_> {
    type Item = Result<ZipEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        self.step().transpose()
    }
}

/// How a path differs between the two sides of a pairwise walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffKind {
    /// Both sides hold the same ID.
    Same,
    /// Both sides hold different IDs.
    Different,
    /// Only the right side holds anything.
    LeftMissing,
    /// Only the left side holds anything.
    RightMissing,
}

/// One position yielded by [`ZipDfs`].
#[derive(Debug, Clone)]
pub struct DiffEntry {
    /// Path from the walk's prefix.
    pub path: HoardPath,
    /// Classification of this position.
    pub diff: DiffKind,
    /// Left side's ID.
    pub left: Option<ObjectId>,
    /// Right side's ID.
    pub right: Option<ObjectId>,
}

/// Pairwise synchronized walk, the classified rendition of
/// [`ZipTreesDfs`] over two roots.
pub struct ZipDfs<'o, 'db, 'tx> {
    inner: ZipTreesDfs<'o, 'db, 'tx>,
}

impl<'o, 'db, 'tx> ZipDfs<'o, 'db, 'tx> {
    /// Starts a pairwise walk. With `drilldown_same` off, identical
    /// subtrees are yielded once as [`DiffKind::Same`] and not entered.
    pub fn new(
        objects: &'o Objects<'db, 'tx>,
        prefix: HoardPath,
        left: Option<ObjectId>,
        right: Option<ObjectId>,
        drilldown_same: bool,
    ) -> Self {
        ZipDfs {
            inner: ZipTreesDfs::new(objects, prefix, vec![left, right], drilldown_same),
        }
    }

    /// Prunes the subtree of the position yielded last.
    pub fn skip_subtree(&mut self) {
        self.inner.skip_subtree()
    }
}

impl Iterator for ZipDfs<'_, '_, '_> {
    type Item = Result<DiffEntry, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = match self.inner.next()? {
            Ok(entry) => entry,
            Err(err) => return Some(Err(err)),
        };
        let (left, right) = (entry.ids[0], entry.ids[1]);
        let diff = match (left, right) {
            (None, _) => DiffKind::LeftMissing,
            (_, None) => DiffKind::RightMissing,
            (Some(l), Some(r)) if l == r => DiffKind::Same,
            _ => DiffKind::Different,
        };
        Some(Ok(DiffEntry {
            path: entry.path,
            diff,
            left,
            right,
        }))
    }
}
