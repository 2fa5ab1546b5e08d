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

//! Typed view over the `objects` keyspace.

use hoard_object::{decode_object, FileBlob, ObjectId, StoredObject, TreeObject};
use hoard_storage::{HoardStorage, Tx};

use crate::Error;

/// Decoded access to the content-addressed object keyspace, bound to a
/// transaction.
///
/// Objects are immutable; `put` never overwrites different content because
/// the key is a digest of the value. Only garbage collection deletes.
pub struct Objects<'db, 'tx> {
    storage: &'db HoardStorage,
    tx: &'tx Tx<'db>,
}

impl<'db, 'tx> Objects<'db, 'tx> {
    /// Binds an object view to a transaction.
    pub fn new(storage: &'db HoardStorage, tx: &'tx Tx<'db>) -> Self {
        Objects { storage, tx }
    }

    /// Fetches and decodes an object, `None` when absent.
    pub fn get(&self, id: &ObjectId) -> Result<Option<StoredObject>, Error> {
        match self.storage.get_object(self.tx, id.as_bytes())? {
            None => Ok(None),
            Some(bytes) => decode_object(*id, &bytes)
                .map(Some)
                .map_err(|source| Error::CorruptObject { id: *id, source }),
        }
    }

    /// Fetches an object that must exist; a miss is corruption.
    pub fn get_existing(&self, id: &ObjectId) -> Result<StoredObject, Error> {
        self.get(id)?.ok_or(Error::MissingObject(*id))
    }

    /// Whether the store holds this ID.
    pub fn contains(&self, id: &ObjectId) -> Result<bool, Error> {
        Ok(self.storage.get_object(self.tx, id.as_bytes())?.is_some())
    }

    /// Stores an object under its own ID. Idempotent.
    pub fn put(&self, object: &StoredObject) -> Result<(), Error> {
        self.storage
            .put_object(self.tx, object.id().as_bytes(), &object.to_bytes())?;
        Ok(())
    }

    /// Stores a tree object.
    pub fn put_tree(&self, tree: &TreeObject) -> Result<(), Error> {
        self.storage
            .put_object(self.tx, tree.id().as_bytes(), &tree.to_bytes())?;
        Ok(())
    }

    /// Stores a file blob.
    pub fn put_blob(&self, blob: &FileBlob) -> Result<(), Error> {
        self.storage
            .put_object(self.tx, blob.id().as_bytes(), &blob.to_bytes())?;
        Ok(())
    }

    /// Removes an object. Garbage collection is the only legitimate
    /// caller; everything else treats the keyspace as insert-only.
    pub fn delete(&self, id: &ObjectId) -> Result<(), Error> {
        self.storage.delete_object(self.tx, id.as_bytes())?;
        Ok(())
    }
}
