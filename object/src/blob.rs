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

use crate::{serialization, ObjectId};

/// An immutable record describing a regular file.
///
/// The fast-hash is the primary sameness witness (see [`crate::fast_hash`]);
/// the full MD5 is optional and carried only when the scanner computed it.
/// Two blobs with the same `(fasthash, size, md5)` triple share an ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBlob {
    fasthash: String,
    size: u64,
    md5: Option<String>,
    id: ObjectId,
}

impl FileBlob {
    /// Constructs a blob and derives its ID from the canonical encoding.
    pub fn create(fasthash: impl Into<String>, size: u64, md5: Option<String>) -> Self {
        let fasthash = fasthash.into();
        let bytes = serialization::encode_blob(&fasthash, size, md5.as_deref());
        let id = ObjectId::digest(&bytes);
        FileBlob {
            fasthash,
            size,
            md5,
            id,
        }
    }

    /// Reassembles a blob decoded from storage; the ID is the store key and
    /// is trusted, not re-derived.
    pub(crate) fn from_parts(
        id: ObjectId,
        fasthash: String,
        size: u64,
        md5: Option<String>,
    ) -> Self {
        FileBlob {
            fasthash,
            size,
            md5,
            id,
        }
    }

    /// The content fingerprint.
    pub fn fasthash(&self) -> &str {
        &self.fasthash
    }

    /// File size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Full-file MD5, when known.
    pub fn md5(&self) -> Option<&str> {
        self.md5.as_deref()
    }

    /// The blob's content address.
    pub fn id(&self) -> ObjectId {
        self.id
    }

    /// The canonical serialization.
    pub fn to_bytes(&self) -> Vec<u8> {
        serialization::encode_blob(&self.fasthash, self.size, self.md5.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_triple_same_id() {
        let a = FileBlob::create("abcd", 42, None);
        let b = FileBlob::create("abcd", 42, None);
        assert_eq!(a.id(), b.id());
        assert_eq!(a, b);

        let c = FileBlob::create("abcd", 43, None);
        assert_ne!(a.id(), c.id());

        let d = FileBlob::create("abcd", 42, Some("md5".to_owned()));
        assert_ne!(a.id(), d.id());
    }

    #[test]
    fn id_is_digest_of_bytes() {
        let blob = FileBlob::create("1881f6f9784fb08bf6690e9763b76ac3", 100, None);
        assert_eq!(blob.id(), ObjectId::digest(&blob.to_bytes()));
        // Golden value; the encoding is a wire format, so this digest must
        // never change.
        assert_eq!(
            blob.id().to_hex(),
            "cf40e4eca4293b8a27d71ddba3b3c64060208165"
        );
    }
}
