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

//! Object model for the hoard engine.
//!
//! Two object kinds form the Merkle DAG: a [`FileBlob`] describes a regular
//! file by its fast-hash fingerprint, and a [`TreeObject`] maps child names
//! to object IDs. Both serialize to a canonical msgpack record whose SHA-1
//! digest is the object's [`ObjectId`] — the content address. The encoding
//! is a wire format: two independent implementations must produce identical
//! bytes, hence identical IDs, for identical inputs.

mod blob;
mod error;
mod fasthash;
mod object_id;
mod serialization;
mod tree;

pub use blob::FileBlob;
pub use error::Error;
pub use fasthash::{fast_hash, fast_hash_bytes, file_md5, DEFAULT_CHUNK_SIZE};
pub use object_id::{ObjectId, ID_LEN};
pub use serialization::{decode_object, TAG_BLOB, TAG_TREE};
pub use tree::TreeObject;

/// A decoded object: either a file blob or a directory tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoredObject {
    /// A regular file, addressed by its content fingerprint.
    Blob(FileBlob),
    /// A directory, addressed by its sorted child list.
    Tree(TreeObject),
}

/// Discriminates the two object kinds without carrying the payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    /// Directory object.
    Tree,
    /// File object.
    Blob,
}

impl StoredObject {
    /// The object's content address.
    pub fn id(&self) -> ObjectId {
        match self {
            StoredObject::Blob(blob) => blob.id(),
            StoredObject::Tree(tree) => tree.id(),
        }
    }

    /// The object's kind tag.
    pub fn kind(&self) -> ObjectKind {
        match self {
            StoredObject::Blob(_) => ObjectKind::Blob,
            StoredObject::Tree(_) => ObjectKind::Tree,
        }
    }

    /// The canonical serialization, i.e. the bytes the ID digests.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            StoredObject::Blob(blob) => blob.to_bytes(),
            StoredObject::Tree(tree) => tree.to_bytes(),
        }
    }

    /// Borrows the tree payload, if this is a tree.
    pub fn as_tree(&self) -> Option<&TreeObject> {
        match self {
            StoredObject::Tree(tree) => Some(tree),
            StoredObject::Blob(_) => None,
        }
    }

    /// Borrows the blob payload, if this is a blob.
    pub fn as_blob(&self) -> Option<&FileBlob> {
        match self {
            StoredObject::Blob(blob) => Some(blob),
            StoredObject::Tree(_) => None,
        }
    }
}

impl From<FileBlob> for StoredObject {
    fn from(blob: FileBlob) -> Self {
        StoredObject::Blob(blob)
    }
}

impl From<TreeObject> for StoredObject {
    fn from(tree: TreeObject) -> Self {
        StoredObject::Tree(tree)
    }
}
