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

//! The deferred-operations queue.
//!
//! Single-file mutations are cheap to queue and expensive to apply one by
//! one (each would rebuild a path of tree nodes). The queue batches them:
//! flushing loads a branch's whole file list once, applies every queued
//! op, and rebuilds the tree in one sorted pass. Queueing the same
//! (cave, branch, path) again overwrites the earlier item.

use std::collections::BTreeMap;

use hoard_object::{decode_object, FileBlob, ObjectId, StoredObject};
use hoard_path::HoardPath;
use hoard_storage::{HoardStorage, Tx};
use log::{info, warn};

use crate::roots::{Branch, Roots};
use crate::tree::{mktree_from_sorted_tuples, TreeDfs};
use crate::{Error, Hoard, Objects};

/// What a queued item does to its path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferredOp {
    /// Put (or replace) the file at the path.
    Add,
    /// Remove the file at the path.
    Del,
}

impl DeferredOp {
    fn as_str(&self) -> &'static str {
        match self {
            DeferredOp::Add => "add",
            DeferredOp::Del => "del",
        }
    }

    fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "add" => Ok(DeferredOp::Add),
            "del" => Ok(DeferredOp::Del),
            other => Err(Error::InvariantViolation(format!(
                "unknown deferred op '{other}'"
            ))),
        }
    }
}

/// One queued file mutation.
#[derive(Debug, Clone)]
pub struct DeferredItem {
    /// Root name of the cave whose branch the item targets.
    pub cave: String,
    /// Which branch to rebuild.
    pub branch: Branch,
    /// Absolute hoard path of the file.
    pub path: HoardPath,
    /// The blob's ID.
    pub object_id: ObjectId,
    /// The blob's canonical bytes, so a flush needs no object-store read.
    pub object_bytes: Vec<u8>,
    /// Add or delete.
    pub op: DeferredOp,
}

fn must<T, E: std::fmt::Debug>(res: Result<T, E>) -> T {
    res.expect("writing msgpack to a Vec cannot fail")
}

fn queue_key(cave: &str, branch: Branch, path: &HoardPath) -> Vec<u8> {
    let mut buf = Vec::new();
    must(rmp::encode::write_array_len(&mut buf, 3));
    must(rmp::encode::write_str(&mut buf, cave));
    must(rmp::encode::write_str(&mut buf, branch.as_str()));
    must(rmp::encode::write_str(&mut buf, &path.as_posix()));
    buf
}

impl DeferredItem {
    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        must(rmp::encode::write_array_len(&mut buf, 6));
        must(rmp::encode::write_str(&mut buf, &self.cave));
        must(rmp::encode::write_str(&mut buf, self.branch.as_str()));
        must(rmp::encode::write_str(&mut buf, &self.path.as_posix()));
        must(rmp::encode::write_bin(&mut buf, self.object_id.as_bytes()));
        must(rmp::encode::write_bin(&mut buf, &self.object_bytes));
        must(rmp::encode::write_str(&mut buf, self.op.as_str()));
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let corrupt =
            |detail: &str| Error::InconsistentStore(format!("bad deferred item: {detail}"));
        let mut rd: &[u8] = bytes;
        let fields = rmp::decode::read_array_len(&mut rd).map_err(|e| corrupt(&e.to_string()))?;
        if fields != 6 {
            return Err(corrupt("wrong field count"));
        }
        let cave = read_str(&mut rd)?;
        let branch = Branch::parse(&read_str(&mut rd)?)?;
        let path = HoardPath::parse(&read_str(&mut rd)?);
        let object_id = ObjectId::from_slice(&read_bin(&mut rd)?)?;
        let object_bytes = read_bin(&mut rd)?;
        let op = DeferredOp::parse(&read_str(&mut rd)?)?;
        Ok(DeferredItem {
            cave,
            branch,
            path,
            object_id,
            object_bytes,
            op,
        })
    }
}

fn read_str(rd: &mut &[u8]) -> Result<String, Error> {
    let corrupt = |detail: String| Error::InconsistentStore(format!("bad deferred item: {detail}"));
    let len = rmp::decode::read_str_len(rd).map_err(|e| corrupt(e.to_string()))? as usize;
    if rd.len() < len {
        return Err(corrupt("truncated string".to_owned()));
    }
    let (raw, rest) = rd.split_at(len);
    *rd = rest;
    String::from_utf8(raw.to_vec()).map_err(|e| corrupt(e.to_string()))
}

fn read_bin(rd: &mut &[u8]) -> Result<Vec<u8>, Error> {
    let corrupt = |detail: String| Error::InconsistentStore(format!("bad deferred item: {detail}"));
    let len = rmp::decode::read_bin_len(rd).map_err(|e| corrupt(e.to_string()))? as usize;
    if rd.len() < len {
        return Err(corrupt("truncated binary".to_owned()));
    }
    let (raw, rest) = rd.split_at(len);
    *rd = rest;
    Ok(raw.to_vec())
}

/// Queue access bound to a transaction.
pub struct DeferredQueue<'db, 'tx> {
    storage: &'db HoardStorage,
    tx: &'tx Tx<'db>,
}

impl<'db, 'tx> DeferredQueue<'db, 'tx> {
    /// Binds the queue to a transaction.
    pub fn new(storage: &'db HoardStorage, tx: &'tx Tx<'db>) -> Self {
        DeferredQueue { storage, tx }
    }

    /// Queues an add (or replace) of `blob` at `path`.
    pub fn queue_add(
        &self,
        cave: &str,
        branch: Branch,
        path: &HoardPath,
        blob: &FileBlob,
    ) -> Result<(), Error> {
        self.queue(cave, branch, path, blob, DeferredOp::Add)
    }

    /// Queues a delete of `blob` at `path`.
    pub fn queue_delete(
        &self,
        cave: &str,
        branch: Branch,
        path: &HoardPath,
        blob: &FileBlob,
    ) -> Result<(), Error> {
        self.queue(cave, branch, path, blob, DeferredOp::Del)
    }

    fn queue(
        &self,
        cave: &str,
        branch: Branch,
        path: &HoardPath,
        blob: &FileBlob,
        op: DeferredOp,
    ) -> Result<(), Error> {
        let item = DeferredItem {
            cave: cave.to_owned(),
            branch,
            path: path.clone(),
            object_id: blob.id(),
            object_bytes: blob.to_bytes(),
            op,
        };
        self.storage
            .put_deferred(self.tx, &queue_key(cave, branch, path), &item.to_bytes())?;
        Ok(())
    }

    /// Every queued item, key order.
    pub fn items(&self) -> Result<Vec<DeferredItem>, Error> {
        let mut items = Vec::new();
        for kv in self.storage.iter_deferred(self.tx) {
            let (_, value) = kv.map_err(hoard_storage::Error::from)?;
            items.push(DeferredItem::from_bytes(&value)?);
        }
        Ok(items)
    }

    /// Whether anything is queued.
    pub fn have_deferred_ops(&self) -> Result<bool, Error> {
        Ok(self.storage.iter_deferred(self.tx).next().is_some())
    }

    fn clear_group(&self, cave: &str, branch: Branch, paths: &[HoardPath]) -> Result<(), Error> {
        for path in paths {
            self.storage
                .delete_deferred(self.tx, &queue_key(cave, branch, path))?;
        }
        Ok(())
    }
}

impl Hoard {
    /// Flushes the whole queue: per (cave, branch), loads the branch tree,
    /// applies every queued op and rebuilds the tree in one pass. Runs
    /// under a single write transaction; afterwards the queue is empty.
    pub fn apply_deferred_queue(&self) -> Result<(), Error> {
        let tx = self.storage().start_transaction();
        let objects = Objects::new(self.storage(), &tx);
        let roots = Roots::new(self.storage(), &tx);
        let queue = DeferredQueue::new(self.storage(), &tx);

        let mut groups: BTreeMap<(String, Branch), Vec<DeferredItem>> = BTreeMap::new();
        for item in queue.items()? {
            groups
                .entry((item.cave.clone(), item.branch))
                .or_default()
                .push(item);
        }

        for ((cave, branch), items) in groups {
            let root = roots.root(&cave);
            let old_root_id = root.get(branch)?;

            let mut files: BTreeMap<HoardPath, FileBlob> = BTreeMap::new();
            for entry in TreeDfs::new(&objects, HoardPath::root(), old_root_id) {
                let entry = entry?;
                if let StoredObject::Blob(blob) = entry.object {
                    files.insert(entry.path, blob);
                }
            }

            let mut touched = Vec::with_capacity(items.len());
            for item in items {
                match item.op {
                    DeferredOp::Add => {
                        let decoded = decode_object(item.object_id, &item.object_bytes)
                            .map_err(|source| Error::CorruptObject {
                                id: item.object_id,
                                source,
                            })?;
                        let StoredObject::Blob(blob) = decoded else {
                            return Err(Error::InvariantViolation(format!(
                                "deferred add for {} carries a tree object",
                                item.path
                            )));
                        };
                        files.insert(item.path.clone(), blob);
                    }
                    DeferredOp::Del => {
                        if files.remove(&item.path).is_none() {
                            warn!("trying to delete non-existent file {}", item.path);
                        }
                    }
                }
                touched.push(item.path);
            }

            let new_root_id = if files.is_empty() {
                None
            } else {
                Some(mktree_from_sorted_tuples(&objects, files)?)
            };
            if new_root_id == old_root_id {
                log::error!(
                    "changing {} files did not create a new root for {cave}/{}",
                    touched.len(),
                    branch.as_str()
                );
            }
            root.set(branch, new_root_id)?;

            queue.clear_group(&cave, branch, &touched)?;
        }

        info!("cleaning deferred queue done");
        self.storage().commit_transaction(tx)?;
        Ok(())
    }
}
