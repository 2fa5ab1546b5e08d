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

//! Implementation of the hoard keyspaces over RocksDB.

use std::path::Path;

use lazy_static::lazy_static;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, OptimisticTransactionDB,
    Transaction,
};

use crate::error::Error;

/// Name of the column family holding content-addressed object bytes.
pub const OBJECTS_CF_NAME: &str = "objects";
/// Name of the column family holding named root records.
pub const ROOTS_CF_NAME: &str = "roots";
/// Name of the column family holding the deferred operations queue.
pub const DEFERRED_CF_NAME: &str = "deferred_ops";
/// Name of the column family holding metadata.
pub const META_CF_NAME: &str = "meta";

lazy_static! {
    static ref DEFAULT_OPTS: rocksdb::Options = {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        opts.increase_parallelism(num_cpus::get() as i32);
        opts.set_allow_mmap_writes(true);
        opts.set_allow_mmap_reads(true);
        opts.create_missing_column_families(true);
        opts.set_atomic_flush(true);
        opts
    };
}

/// Type alias for a transaction.
pub type Tx<'db> = Transaction<'db, OptimisticTransactionDB>;

/// Iterator over one keyspace within a transaction, in key order.
pub type KeyspaceIter<'tx, 'db> = rocksdb::DBIteratorWithThreadMode<'tx, Tx<'db>>;

/// The single on-disk database behind a hoard, one column family per
/// logical keyspace.
///
/// Writers are exclusive by convention: the engine holds at most one write
/// transaction at a time, and a commit that loses an optimistic race
/// surfaces as [`Error::TransactionConflict`].
pub struct HoardStorage {
    db: OptimisticTransactionDB,
}

fn column_families() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(OBJECTS_CF_NAME, DEFAULT_OPTS.clone()),
        ColumnFamilyDescriptor::new(ROOTS_CF_NAME, DEFAULT_OPTS.clone()),
        ColumnFamilyDescriptor::new(DEFERRED_CF_NAME, DEFAULT_OPTS.clone()),
        ColumnFamilyDescriptor::new(META_CF_NAME, DEFAULT_OPTS.clone()),
    ]
}

impl HoardStorage {
    /// Opens (or creates) the database at `path` with default parameters.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let db =
            OptimisticTransactionDB::open_cf_descriptors(&DEFAULT_OPTS, path, column_families())?;
        Ok(HoardStorage { db })
    }

    /// Starts a transaction. Dropping it without commit discards its
    /// writes.
    pub fn start_transaction(&self) -> Tx<'_> {
        self.db.transaction()
    }

    /// Commits a transaction atomically; all of its writes become visible
    /// together or not at all.
    pub fn commit_transaction(&self, tx: Tx) -> Result<(), Error> {
        tx.commit().map_err(|err| match err.kind() {
            ErrorKind::Busy | ErrorKind::TryAgain => Error::TransactionConflict(err.to_string()),
            _ => Error::RocksDBError(err),
        })
    }

    /// Aborts a transaction, discarding its writes.
    pub fn rollback_transaction(&self, tx: &Tx) -> Result<(), Error> {
        tx.rollback().map_err(Error::RocksDBError)
    }

    fn cf_objects(&self) -> &ColumnFamily {
        self.db
            .cf_handle(OBJECTS_CF_NAME)
            .expect("objects column family must exist")
    }

    fn cf_roots(&self) -> &ColumnFamily {
        self.db
            .cf_handle(ROOTS_CF_NAME)
            .expect("roots column family must exist")
    }

    fn cf_deferred(&self) -> &ColumnFamily {
        self.db
            .cf_handle(DEFERRED_CF_NAME)
            .expect("deferred_ops column family must exist")
    }

    fn cf_meta(&self) -> &ColumnFamily {
        self.db
            .cf_handle(META_CF_NAME)
            .expect("meta column family must exist")
    }

    /// Fetches raw object bytes by ID.
    pub fn get_object(&self, tx: &Tx, id: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(tx.get_cf(self.cf_objects(), id)?)
    }

    /// Stores object bytes under an ID. Writing the same ID twice is a
    /// no-op by content addressing.
    pub fn put_object(&self, tx: &Tx, id: &[u8], bytes: &[u8]) -> Result<(), Error> {
        Ok(tx.put_cf(self.cf_objects(), id, bytes)?)
    }

    /// Removes an object. Garbage collection is the only caller.
    pub fn delete_object(&self, tx: &Tx, id: &[u8]) -> Result<(), Error> {
        Ok(tx.delete_cf(self.cf_objects(), id)?)
    }

    /// Iterates the whole objects keyspace.
    pub fn iter_objects<'tx, 'db>(&self, tx: &'tx Tx<'db>) -> KeyspaceIter<'tx, 'db> {
        tx.iterator_cf(self.cf_objects(), IteratorMode::Start)
    }

    /// Fetches a root record by name.
    pub fn get_root(&self, tx: &Tx, name: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(tx.get_cf(self.cf_roots(), name)?)
    }

    /// Stores a root record.
    pub fn put_root(&self, tx: &Tx, name: &[u8], bytes: &[u8]) -> Result<(), Error> {
        Ok(tx.put_cf(self.cf_roots(), name, bytes)?)
    }

    /// Removes a root record.
    pub fn delete_root(&self, tx: &Tx, name: &[u8]) -> Result<(), Error> {
        Ok(tx.delete_cf(self.cf_roots(), name)?)
    }

    /// Iterates all root records in name order.
    pub fn iter_roots<'tx, 'db>(&self, tx: &'tx Tx<'db>) -> KeyspaceIter<'tx, 'db> {
        tx.iterator_cf(self.cf_roots(), IteratorMode::Start)
    }

    /// Fetches a deferred-queue item by its composite key.
    pub fn get_deferred(&self, tx: &Tx, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(tx.get_cf(self.cf_deferred(), key)?)
    }

    /// Stores a deferred-queue item; same-key writes overwrite.
    pub fn put_deferred(&self, tx: &Tx, key: &[u8], bytes: &[u8]) -> Result<(), Error> {
        Ok(tx.put_cf(self.cf_deferred(), key, bytes)?)
    }

    /// Removes a deferred-queue item.
    pub fn delete_deferred(&self, tx: &Tx, key: &[u8]) -> Result<(), Error> {
        Ok(tx.delete_cf(self.cf_deferred(), key)?)
    }

    /// Iterates the deferred queue in key order.
    pub fn iter_deferred<'tx, 'db>(&self, tx: &'tx Tx<'db>) -> KeyspaceIter<'tx, 'db> {
        tx.iterator_cf(self.cf_deferred(), IteratorMode::Start)
    }

    /// Fetches a metadata entry.
    pub fn get_meta(&self, tx: &Tx, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        Ok(tx.get_cf(self.cf_meta(), key)?)
    }

    /// Stores a metadata entry.
    pub fn put_meta(&self, tx: &Tx, key: &[u8], bytes: &[u8]) -> Result<(), Error> {
        Ok(tx.put_cf(self.cf_meta(), key, bytes)?)
    }
}
