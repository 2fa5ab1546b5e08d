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

//! The three-way merge engine.
//!
//! A single synchronized pre-order recursion over a cave's `(base,
//! staging)` pair, with ancillary access to every other participating root
//! (the other caves' desired trees and `"HOARD"`) through a [`ByRoot`]
//! association. Tree positions where base and staging agree pass through
//! untouched; positions where they disagree drill down; file positions
//! delegate to [`MergePreferences`]. Child results are recomposed into
//! fresh tree objects per root on the way back up, with empty trees
//! elided.

mod preferences;
mod pull;

use std::collections::BTreeSet;
use std::sync::Arc;

use hoard_object::{ObjectId, StoredObject, TreeObject};
use hoard_path::HoardPath;

pub use preferences::{
    PullIntention, PullMergePreferences, PullPreferences, PullSituation,
};
pub use pull::{
    check_backup_free_space, commit_merged, merge_contents, BackupCapacity, MergeOutcome,
    MoveRecord, PullOutcome,
};

use crate::{Error, Objects};

/// A fixed-universe association from root name to a value.
///
/// The universe of names is declared once; values are dense and optional.
/// Assignments to names outside the universe are dropped, which is how a
/// merge confines its effects to the roots it was asked to touch.
#[derive(Debug, Clone)]
pub struct ByRoot<V> {
    names: Arc<Vec<String>>,
    values: Vec<Option<V>>,
}

impl<V> ByRoot<V> {
    /// An empty association over a universe of names.
    pub fn new(names: Arc<Vec<String>>) -> Self {
        let values = names.iter().map(|_| None).collect();
        ByRoot { names, values }
    }

    /// The universe, in declaration order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Shares the universe for building sibling associations.
    pub fn universe(&self) -> Arc<Vec<String>> {
        Arc::clone(&self.names)
    }

    /// An empty association over the same universe, possibly of a
    /// different value type.
    pub fn fresh<R>(&self) -> ByRoot<R> {
        ByRoot::new(self.universe())
    }

    fn index_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|n| n == name)
    }

    /// The value assigned to `name`, if any.
    pub fn get(&self, name: &str) -> Option<&V> {
        self.index_of(name)
            .and_then(|idx| self.values[idx].as_ref())
    }

    /// Assigns or clears a name. Unknown names are ignored.
    pub fn set(&mut self, name: &str, value: Option<V>) {
        if let Some(idx) = self.index_of(name) {
            self.values[idx] = value;
        }
    }

    /// Assigns a value to a name. Unknown names are ignored.
    pub fn insert(&mut self, name: &str, value: V) {
        self.set(name, Some(value));
    }

    /// Mutable access to the value assigned to `name`.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut V> {
        self.index_of(name)
            .and_then(|idx| self.values[idx].as_mut())
    }

    /// Whether `name` currently has a value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assigned `(name, value)` pairs, universe order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.names
            .iter()
            .zip(&self.values)
            .filter_map(|(name, value)| value.as_ref().map(|v| (name.as_str(), v)))
    }

    /// Assigned values, universe order.
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.values.iter().flatten()
    }

    /// Names that currently have a value, universe order.
    pub fn assigned_names(&self) -> Vec<String> {
        self.iter().map(|(name, _)| name.to_owned()).collect()
    }

    /// Number of assigned values.
    pub fn len(&self) -> usize {
        self.values.iter().flatten().count()
    }

    /// Whether nothing is assigned.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maps assigned values into a new association over the same universe.
    pub fn map<R>(&self, mut f: impl FnMut(&V) -> R) -> ByRoot<R> {
        ByRoot {
            names: self.universe(),
            values: self.values.iter().map(|v| v.as_ref().map(&mut f)).collect(),
        }
    }

    /// Maps assigned values fallibly.
    pub fn try_map<R>(
        &self,
        mut f: impl FnMut(&V) -> Result<R, Error>,
    ) -> Result<ByRoot<R>, Error> {
        let mut values = Vec::with_capacity(self.values.len());
        for value in &self.values {
            values.push(match value {
                Some(v) => Some(f(v)?),
                None => None,
            });
        }
        Ok(ByRoot {
            names: self.universe(),
            values,
        })
    }
}

impl<V> FromIterator<(String, V)> for ByRoot<V> {
    /// Builds an association whose universe is exactly the given names.
    fn from_iter<I: IntoIterator<Item = (String, V)>>(iter: I) -> Self {
        let (names, values): (Vec<String>, Vec<Option<V>>) = iter
            .into_iter()
            .map(|(name, value)| (name, Some(value)))
            .unzip();
        ByRoot {
            names: Arc::new(names),
            values,
        }
    }
}

/// Per-file policy consulted by the merge walk.
///
/// Each method returns the association of new object IDs to place at the
/// current path, per root; a name left unassigned removes the path from
/// that root's output tree.
pub trait MergePreferences {
    /// Base and staging both carry a (differing) file here.
    fn combine_both_existing(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        staging: &hoard_object::FileBlob,
        base: &hoard_object::FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error>;

    /// Only base carries the file: it disappeared from staging.
    fn combine_base_only(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        base: &hoard_object::FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error>;

    /// Only staging carries the file: it was added by the scan.
    fn combine_staging_only(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        staging: &hoard_object::FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error>;

    /// Neither base nor staging knows the file; it exists only in other
    /// roots.
    fn merge_missing(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
    ) -> Result<ByRoot<ObjectId>, Error>;
}

/// The synchronized three-way walk.
pub struct ThreeWayMerge<'p> {
    base_id: Option<ObjectId>,
    staging_id: Option<ObjectId>,
    prefs: &'p mut dyn MergePreferences,
}

impl<'p> ThreeWayMerge<'p> {
    /// Prepares a merge of one cave's `(base, staging)` pair against a set
    /// of participating roots.
    pub fn new(
        base_id: Option<ObjectId>,
        staging_id: Option<ObjectId>,
        prefs: &'p mut dyn MergePreferences,
    ) -> Self {
        ThreeWayMerge {
            base_id,
            staging_id,
            prefs,
        }
    }

    /// Runs the walk. `roots` maps every participating root name to its
    /// input ID; the result maps each root to its new ID (unassigned means
    /// the root comes out empty). Mutates nothing but the object keyspace,
    /// which only gains freshly-built trees.
    pub fn execute(
        &mut self,
        objects: &Objects,
        roots: &ByRoot<ObjectId>,
    ) -> Result<ByRoot<ObjectId>, Error> {
        let base = load(objects, self.base_id)?;
        let staging = load(objects, self.staging_id)?;
        self.merge_level(objects, &HoardPath::root(), base, staging, roots)
    }

    fn merge_level(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        base: Option<StoredObject>,
        staging: Option<StoredObject>,
        original_ids: &ByRoot<ObjectId>,
    ) -> Result<ByRoot<ObjectId>, Error> {
        let originals: ByRoot<StoredObject> =
            original_ids.try_map(|id| objects.get_existing(id))?;

        let any_tree = originals
            .values()
            .any(|obj| obj.as_tree().is_some())
            || is_tree(&base)
            || is_tree(&staging);

        if any_tree && base != staging {
            return self.drill_down(objects, path, &base, &staging, &originals);
        }

        // File level. Agreement (including both absent) passes everything
        // through untouched.
        if base == staging {
            return Ok(originals.map(StoredObject::id));
        }
        match (as_blob(&staging), as_blob(&base)) {
            (Some(staging), Some(base)) => self
                .prefs
                .combine_both_existing(objects, path, &originals, staging, base),
            (None, Some(base)) => {
                self.prefs
                    .combine_base_only(objects, path, &originals, base)
            }
            (Some(staging), None) => {
                self.prefs
                    .combine_staging_only(objects, path, &originals, staging)
            }
            (None, None) => self.prefs.merge_missing(objects, path, &originals),
        }
    }

    fn drill_down(
        &mut self,
        objects: &Objects,
        path: &HoardPath,
        base: &Option<StoredObject>,
        staging: &Option<StoredObject>,
        originals: &ByRoot<StoredObject>,
    ) -> Result<ByRoot<ObjectId>, Error> {
        let base_tree = base.as_ref().and_then(StoredObject::as_tree);
        let staging_tree = staging.as_ref().and_then(StoredObject::as_tree);

        // Union of child names across every tree at this position, the
        // walked pair included.
        let mut names: BTreeSet<&str> = BTreeSet::new();
        for obj in originals.values() {
            if let Some(tree) = obj.as_tree() {
                names.extend(tree.children().iter().map(|(name, _)| name.as_str()));
            }
        }
        for tree in [base_tree, staging_tree].into_iter().flatten() {
            names.extend(tree.children().iter().map(|(name, _)| name.as_str()));
        }

        let mut merged_children: ByRoot<std::collections::BTreeMap<String, ObjectId>> =
            originals.fresh();

        for name in names {
            let mut child_ids: ByRoot<ObjectId> = originals.fresh();
            for (root_name, obj) in originals.iter() {
                if let Some(id) = obj.as_tree().and_then(|tree| tree.get(name)) {
                    child_ids.insert(root_name, id);
                }
            }
            let child_base = load(objects, base_tree.and_then(|tree| tree.get(name)))?;
            let child_staging = load(objects, staging_tree.and_then(|tree| tree.get(name)))?;

            let merged = self.merge_level(
                objects,
                &path.child(name),
                child_base,
                child_staging,
                &child_ids,
            )?;
            for (root_name, id) in merged.iter() {
                if merged_children.get(root_name).is_none() {
                    merged_children.insert(root_name, Default::default());
                }
                if let Some(map) = merged_children.get_mut(root_name) {
                    map.insert(name.to_owned(), *id);
                }
            }
        }

        // Materialize each root's new subtree; childless results vanish.
        let mut out: ByRoot<ObjectId> = originals.fresh();
        let names: Vec<String> = merged_children.assigned_names();
        for root_name in names {
            let Some(children) = merged_children.get(&root_name) else {
                continue;
            };
            if children.is_empty() {
                continue;
            }
            let tree = TreeObject::from_child_map(children.clone());
            objects.put_tree(&tree)?;
            out.insert(&root_name, tree.id());
        }
        Ok(out)
    }
}

fn load(objects: &Objects, id: Option<ObjectId>) -> Result<Option<StoredObject>, Error> {
    id.map(|id| objects.get_existing(&id)).transpose()
}

fn is_tree(obj: &Option<StoredObject>) -> bool {
    obj.as_ref().is_some_and(|o| o.as_tree().is_some())
}

fn as_blob(obj: &Option<StoredObject>) -> Option<&hoard_object::FileBlob> {
    obj.as_ref().and_then(StoredObject::as_blob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn by_root_ignores_unknown_names() {
        let universe = Arc::new(vec!["a".to_owned(), "b".to_owned()]);
        let mut assoc: ByRoot<u32> = ByRoot::new(universe);
        assoc.insert("a", 1);
        assoc.insert("stranger", 99);
        assert_eq!(assoc.get("a"), Some(&1));
        assert_eq!(assoc.get("stranger"), None);
        assert_eq!(assoc.len(), 1);
        assert_eq!(assoc.assigned_names(), vec!["a".to_owned()]);
    }

    #[test]
    fn by_root_map_keeps_universe() {
        let assoc: ByRoot<u32> =
            vec![("a".to_owned(), 2), ("b".to_owned(), 3)].into_iter().collect();
        let doubled = assoc.map(|v| v * 2);
        assert_eq!(doubled.get("a"), Some(&4));
        assert_eq!(doubled.get("b"), Some(&6));
        let fresh: ByRoot<String> = assoc.fresh();
        assert!(fresh.is_empty());
        assert_eq!(fresh.names(), assoc.names());
    }
}
