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

//! The named-root registry.
//!
//! A root is the only mutable state outside the insert-only object
//! keyspace: a named record of three optional object IDs. `"HOARD"` is the
//! global desired view; every cave's root is named by its UUID. Assigning
//! a branch validates that the target ID resolves to a stored object, so a
//! committed registry never points into the void.

use hoard_object::{ObjectId, ID_LEN};
use hoard_storage::{HoardStorage, Tx};
use itertools::Itertools;

use crate::{Error, Objects};

/// Name of the root carrying the global desired view.
pub const HOARD_ROOT: &str = "HOARD";

/// One of the three mutable heads a root carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
    /// What is on disk now.
    Current,
    /// What the latest scan observed.
    Staging,
    /// What the plan says should be on disk.
    Desired,
}

impl Branch {
    /// Stable string form, used in deferred-queue keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Branch::Current => "current",
            Branch::Staging => "staging",
            Branch::Desired => "desired",
        }
    }

    /// Parses the stable string form.
    pub fn parse(s: &str) -> Result<Self, Error> {
        match s {
            "current" => Ok(Branch::Current),
            "staging" => Ok(Branch::Staging),
            "desired" => Ok(Branch::Desired),
            other => Err(Error::InvariantViolation(format!(
                "unknown branch '{other}'"
            ))),
        }
    }
}

/// The stored value of a named root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RootData {
    /// Tree on disk now.
    pub current: Option<ObjectId>,
    /// Tree the latest scan staged.
    pub staging: Option<ObjectId>,
    /// Tree the plan wants on disk.
    pub desired: Option<ObjectId>,
}

fn must<T, E: std::fmt::Debug>(res: Result<T, E>) -> T {
    res.expect("writing msgpack to a Vec cannot fail")
}

impl RootData {
    /// All three heads in declaration order.
    pub fn all(&self) -> [Option<ObjectId>; 3] {
        [self.current, self.staging, self.desired]
    }

    /// Reads one branch.
    pub fn get(&self, branch: Branch) -> Option<ObjectId> {
        match branch {
            Branch::Current => self.current,
            Branch::Staging => self.staging,
            Branch::Desired => self.desired,
        }
    }

    /// Writes one branch.
    pub fn set(&mut self, branch: Branch, id: Option<ObjectId>) {
        match branch {
            Branch::Current => self.current = id,
            Branch::Staging => self.staging = id,
            Branch::Desired => self.desired = id,
        }
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(3 * (ID_LEN + 2) + 1);
        must(rmp::encode::write_array_len(&mut buf, 3));
        for head in self.all() {
            match head {
                Some(id) => must(rmp::encode::write_bin(&mut buf, id.as_bytes())),
                None => must(rmp::encode::write_nil(&mut buf)),
            }
        }
        buf
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut rd: &[u8] = bytes;
        let fields = rmp::decode::read_array_len(&mut rd)
            .map_err(|err| Error::InconsistentStore(format!("bad root record: {err}")))?;
        if fields != 3 {
            return Err(Error::InconsistentStore(format!(
                "root record must have 3 heads, got {fields}"
            )));
        }
        let mut heads = [None; 3];
        for head in heads.iter_mut() {
            if rd.first() == Some(&0xc0) {
                rd = &rd[1..];
                continue;
            }
            let len = rmp::decode::read_bin_len(&mut rd)
                .map_err(|err| Error::InconsistentStore(format!("bad root record: {err}")))?
                as usize;
            if rd.len() < len {
                return Err(Error::InconsistentStore(
                    "root record truncated".to_owned(),
                ));
            }
            let (raw, rest) = rd.split_at(len);
            rd = rest;
            *head = Some(ObjectId::from_slice(raw)?);
        }
        let [current, staging, desired] = heads;
        Ok(RootData {
            current,
            staging,
            desired,
        })
    }
}

/// View over the `roots` keyspace, bound to a transaction.
pub struct Roots<'db, 'tx> {
    storage: &'db HoardStorage,
    tx: &'tx Tx<'db>,
}

impl<'db, 'tx> Roots<'db, 'tx> {
    /// Binds the registry to a transaction.
    pub fn new(storage: &'db HoardStorage, tx: &'tx Tx<'db>) -> Self {
        Roots { storage, tx }
    }

    /// A handle to a root by name; roots spring into existence on first
    /// assignment, so no existence check happens here.
    pub fn root(&self, name: &str) -> Root<'_, 'db, 'tx> {
        Root {
            name: name.to_owned(),
            roots: self,
        }
    }

    /// Loads a root record, defaulting to all-empty when unregistered.
    pub fn load(&self, name: &str) -> Result<RootData, Error> {
        match self.storage.get_root(self.tx, name.as_bytes())? {
            None => Ok(RootData::default()),
            Some(bytes) => RootData::from_bytes(&bytes),
        }
    }

    /// Stores a root record.
    pub fn store(&self, name: &str, data: &RootData) -> Result<(), Error> {
        self.storage
            .put_root(self.tx, name.as_bytes(), &data.to_bytes())?;
        Ok(())
    }

    /// Drops a root from the registry. Its objects stay until GC.
    pub fn remove(&self, name: &str) -> Result<(), Error> {
        self.storage.delete_root(self.tx, name.as_bytes())?;
        Ok(())
    }

    /// Names of all registered roots, in key order.
    pub fn all_names(&self) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for kv in self.storage.iter_roots(self.tx) {
            let (key, _) = kv.map_err(hoard_storage::Error::from)?;
            let name = String::from_utf8(key.to_vec()).map_err(|_| {
                Error::InconsistentStore("root name is not valid UTF-8".to_owned())
            })?;
            names.push(name);
        }
        Ok(names)
    }

    /// The multiset of all non-null IDs across every root's three heads,
    /// sorted for determinism. Duplicates are retained.
    pub fn all_live(&self) -> Result<Vec<ObjectId>, Error> {
        let mut live = Vec::new();
        for name in self.all_names()? {
            let data = self.load(&name)?;
            live.extend(data.all().into_iter().flatten());
        }
        Ok(live.into_iter().sorted().collect())
    }
}

/// Handle to one named root.
pub struct Root<'r, 'db, 'tx> {
    name: String,
    roots: &'r Roots<'db, 'tx>,
}

impl Root<'_, '_, '_> {
    /// The root's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Reads one branch head.
    pub fn get(&self, branch: Branch) -> Result<Option<ObjectId>, Error> {
        Ok(self.roots.load(&self.name)?.get(branch))
    }

    /// Current head.
    pub fn current(&self) -> Result<Option<ObjectId>, Error> {
        self.get(Branch::Current)
    }

    /// Staging head.
    pub fn staging(&self) -> Result<Option<ObjectId>, Error> {
        self.get(Branch::Staging)
    }

    /// Desired head.
    pub fn desired(&self) -> Result<Option<ObjectId>, Error> {
        self.get(Branch::Desired)
    }

    /// Assigns one branch head. A non-null target must resolve to a stored
    /// object.
    pub fn set(&self, branch: Branch, id: Option<ObjectId>) -> Result<(), Error> {
        if let Some(id) = id {
            let objects = Objects::new(self.roots.storage, self.roots.tx);
            if !objects.contains(&id)? {
                return Err(Error::MissingObject(id));
            }
        }
        let mut data = self.roots.load(&self.name)?;
        data.set(branch, id);
        self.roots.store(&self.name, &data)
    }

    /// Assigns the current head.
    pub fn set_current(&self, id: Option<ObjectId>) -> Result<(), Error> {
        self.set(Branch::Current, id)
    }

    /// Assigns the staging head.
    pub fn set_staging(&self, id: Option<ObjectId>) -> Result<(), Error> {
        self.set(Branch::Staging, id)
    }

    /// Assigns the desired head.
    pub fn set_desired(&self, id: Option<ObjectId>) -> Result<(), Error> {
        self.set(Branch::Desired, id)
    }
}

#[cfg(test)]
mod tests {
    use hoard_object::FileBlob;
    use hoard_storage::TempStorage;

    use super::*;

    #[test]
    fn record_round_trip() {
        let id = FileBlob::create("h", 1, None).id();
        let data = RootData {
            current: Some(id),
            staging: None,
            desired: Some(id),
        };
        assert_eq!(RootData::from_bytes(&data.to_bytes()).unwrap(), data);
        assert_eq!(
            RootData::from_bytes(&RootData::default().to_bytes()).unwrap(),
            RootData::default()
        );
    }

    #[test]
    fn assignment_validates_target() {
        let storage = TempStorage::new();
        let tx = storage.start_transaction();
        let objects = Objects::new(&storage, &tx);
        let roots = Roots::new(&storage, &tx);

        let blob = FileBlob::create("h", 1, None);
        let dangling = FileBlob::create("other", 2, None).id();

        objects.put_blob(&blob).unwrap();
        let root = roots.root(HOARD_ROOT);
        root.set_desired(Some(blob.id())).unwrap();
        assert_eq!(root.desired().unwrap(), Some(blob.id()));

        assert!(matches!(
            root.set_current(Some(dangling)),
            Err(Error::MissingObject(id)) if id == dangling
        ));
        // Failed assignment leaves the record untouched.
        assert_eq!(root.current().unwrap(), None);

        root.set_desired(None).unwrap();
        assert_eq!(root.desired().unwrap(), None);
    }

    #[test]
    fn all_live_is_a_sorted_multiset() {
        let storage = TempStorage::new();
        let tx = storage.start_transaction();
        let objects = Objects::new(&storage, &tx);
        let roots = Roots::new(&storage, &tx);

        let a = FileBlob::create("a", 1, None);
        let b = FileBlob::create("b", 2, None);
        objects.put_blob(&a).unwrap();
        objects.put_blob(&b).unwrap();

        roots.root("one").set_current(Some(a.id())).unwrap();
        roots.root("one").set_desired(Some(a.id())).unwrap();
        roots.root("two").set_staging(Some(b.id())).unwrap();

        let live = roots.all_live().unwrap();
        assert_eq!(live.len(), 3);
        let mut expected = vec![a.id(), a.id(), b.id()];
        expected.sort();
        assert_eq!(live, expected);
    }
}
