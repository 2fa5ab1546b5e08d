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

//! Garbage collection over the object keyspace.
//!
//! Liveness is reachability from the root registry: every ID a root's
//! three heads point at, plus everything those trees reference. GC never
//! runs concurrently with a writer; the sweep happens under a single write
//! transaction and is re-validated before commit.

use std::collections::HashSet;

use hoard_object::{ObjectId, StoredObject};
use log::info;

use crate::{Error, Hoard, Objects, Roots};

/// Counters reported by a completed collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    /// Non-null heads across all roots.
    pub live_heads: usize,
    /// Objects reachable from those heads.
    pub live_objects: usize,
    /// Unreachable objects removed.
    pub deleted_objects: usize,
}

/// Collects every object ID reachable from the given heads by BFS,
/// dereferencing trees to enumerate children.
pub fn find_all_live(
    objects: &Objects,
    heads: &[ObjectId],
) -> Result<HashSet<ObjectId>, Error> {
    let mut live: HashSet<ObjectId> = heads.iter().copied().collect();
    let mut queue: Vec<ObjectId> = live.iter().copied().collect();

    while let Some(current) = queue.pop() {
        // Blobs only get existence-checked; trees contribute children.
        if let StoredObject::Tree(tree) = objects.get_existing(&current)? {
            for (_, child_id) in tree.children() {
                if live.insert(*child_id) {
                    queue.push(*child_id);
                }
            }
        }
    }
    Ok(live)
}

/// Verifies every head resolves to a stored object.
pub(crate) fn validate_storage(objects: &Objects, heads: &[ObjectId]) -> Result<(), Error> {
    for head in heads {
        if !objects.contains(head)? {
            return Err(Error::InconsistentStore(format!(
                "missing root ID {head}: not in stored objects"
            )));
        }
    }
    Ok(())
}

impl Hoard {
    /// Removes every object not reachable from a registered root.
    pub fn gc(&self) -> Result<GcStats, Error> {
        let live = {
            let tx = self.storage().start_transaction();
            let roots = Roots::new(self.storage(), &tx);
            let heads = roots.all_live()?;
            info!("found {} live top-level refs", heads.len());

            let objects = Objects::new(self.storage(), &tx);
            validate_storage(&objects, &heads)?;
            find_all_live(&objects, &heads)?
        };
        info!("retaining {} live objects", live.len());

        let tx = self.storage().start_transaction();
        let objects = Objects::new(self.storage(), &tx);

        let mut doomed = Vec::new();
        for kv in self.storage().iter_objects(&tx) {
            let (key, _) = kv.map_err(hoard_storage::Error::from)?;
            let id = ObjectId::from_slice(&key)?;
            if !live.contains(&id) {
                doomed.push(id);
            }
        }
        for id in &doomed {
            objects.delete(id)?;
        }

        let roots = Roots::new(self.storage(), &tx);
        let heads = roots.all_live()?;
        validate_storage(&objects, &heads)?;
        self.storage().commit_transaction(tx)?;

        Ok(GcStats {
            live_heads: heads.len(),
            live_objects: live.len(),
            deleted_objects: doomed.len(),
        })
    }

    /// Copies every object reachable from `heads` out of `other` into this
    /// store, skipping IDs already present.
    pub fn copy_trees_from(&self, other: &Hoard, heads: &[ObjectId]) -> Result<(), Error> {
        let other_tx = other.storage().start_transaction();
        let other_objects = Objects::new(other.storage(), &other_tx);
        let live = find_all_live(&other_objects, heads)?;

        let tx = self.storage().start_transaction();
        let objects = Objects::new(self.storage(), &tx);
        for id in live {
            if !objects.contains(&id)? {
                let bytes = other
                    .storage()
                    .get_object(&other_tx, id.as_bytes())?
                    .ok_or(Error::MissingObject(id))?;
                self.storage().put_object(&tx, id.as_bytes(), &bytes)?;
            }
        }
        self.storage().commit_transaction(tx)?;
        Ok(())
    }
}
