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

//! Storage layer for the hoard engine.
//!
//! A single on-disk RocksDB database holds every logical keyspace the
//! engine needs: `objects` (content-addressed bytes), `roots` (named
//! mutable pointers), `deferred_ops` (queued file mutations) and `meta`.
//! Each keyspace is a column family; all access happens under a
//! transaction handed out by [`HoardStorage`].

#![deny(missing_docs)]

pub mod error;
mod storage;
mod test_utils;

pub use error::Error;
pub use storage::{
    HoardStorage, KeyspaceIter, Tx, DEFERRED_CF_NAME, META_CF_NAME, OBJECTS_CF_NAME,
    ROOTS_CF_NAME,
};
pub use test_utils::TempStorage;
