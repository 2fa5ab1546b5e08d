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

//! Multi-repository file hoarding engine.
//!
//! A central index (the *hoard*) reconciles the contents of a fleet of
//! physical repositories (*caves*) that may be online or offline at any
//! moment. Per cave the engine tracks three parallel views — what is
//! currently on disk, what the latest scan staged, and what is desired —
//! as roots into one content-addressed Merkle DAG, and computes the plan
//! of copies, moves and deletions that reconciles desire with reality.
//!
//! The crate is the synchronous, single-writer core: object store and
//! registry ([`Objects`], [`Roots`]), tree algebra ([`tree`]), the
//! three-way merge with its pull policies ([`merge`]), the deferred
//! mutation queue ([`deferred`]), reverse indices ([`lookup`]) and
//! cached aggregators ([`calc`]). Scanning disks, copying files and
//! talking to users are consumers of these interfaces, not part of them.

pub mod calc;
pub mod config;
pub mod content;
pub mod deferred;
mod error;
mod gc;
pub mod lookup;
pub mod merge;
mod objects;
pub mod roots;
pub mod tree;

#[cfg(test)]
mod tests;

use std::path::Path;

use hoard_storage::{HoardStorage, Tx};
use log::warn;

pub use error::Error;
pub use gc::{find_all_live, GcStats};
pub use objects::Objects;
pub use roots::{Branch, Root, RootData, Roots, HOARD_ROOT};

use deferred::DeferredQueue;

/// Handle to one hoard: the single on-disk database holding its objects,
/// roots and deferred queue.
pub struct Hoard {
    storage: HoardStorage,
}

impl Hoard {
    /// Opens (or creates) the hoard database at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        Ok(Hoard {
            storage: HoardStorage::open(path)?,
        })
    }

    /// The underlying storage.
    pub fn storage(&self) -> &HoardStorage {
        &self.storage
    }

    /// Starts a transaction; see [`HoardStorage::start_transaction`].
    pub fn start_transaction(&self) -> Tx<'_> {
        self.storage.start_transaction()
    }

    /// Commits a transaction.
    pub fn commit_transaction(&self, tx: Tx) -> Result<(), Error> {
        Ok(self.storage.commit_transaction(tx)?)
    }

    /// Object view under a transaction.
    pub fn objects<'db, 'tx>(&'db self, tx: &'tx Tx<'db>) -> Objects<'db, 'tx> {
        Objects::new(&self.storage, tx)
    }

    /// Root registry under a transaction.
    pub fn roots<'db, 'tx>(&'db self, tx: &'tx Tx<'db>) -> Roots<'db, 'tx> {
        Roots::new(&self.storage, tx)
    }

    /// Deferred queue under a transaction.
    pub fn deferred<'db, 'tx>(&'db self, tx: &'tx Tx<'db>) -> DeferredQueue<'db, 'tx> {
        DeferredQueue::new(&self.storage, tx)
    }

    /// Whether the deferred queue holds anything.
    pub fn have_deferred_ops(&self) -> Result<bool, Error> {
        let tx = self.start_transaction();
        self.deferred(&tx).have_deferred_ops()
    }

    /// Closes a hoard that was open for writing. Leftover deferred
    /// operations are a caller bug and fatal.
    pub fn close(self) -> Result<(), Error> {
        if self.have_deferred_ops()? {
            return Err(Error::DeferredOpsNotFlushed);
        }
        Ok(())
    }

    /// Closes a hoard that was only read. Leftover deferred operations get
    /// flushed as a safety net, with a warning.
    pub fn close_readonly(self) -> Result<(), Error> {
        if self.have_deferred_ops()? {
            warn!("deferred operations left behind by a read-only session; flushing");
            self.apply_deferred_queue()?;
        }
        Ok(())
    }
}
