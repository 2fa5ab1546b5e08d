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

//! Canonical object encoding.
//!
//! Every object serializes to a msgpack record `[type_tag, payload]`:
//!
//! ```text
//! blob: [2, [fasthash: str, size: uint, md5: str | nil]]
//! tree: [1, [[name: str, child_id: bin], ...]]   children sorted by name
//! ```
//!
//! The encoding is injective per kind and every integer/string uses the
//! minimal msgpack representation, so equal structures produce equal bytes
//! and the SHA-1 over them is a stable content address.

use crate::{Error, FileBlob, ObjectId, StoredObject, TreeObject, ID_LEN};

/// Type tag of tree objects.
pub const TAG_TREE: u64 = 1;
/// Type tag of blob objects.
pub const TAG_BLOB: u64 = 2;

const NIL_MARKER: u8 = 0xc0;

// All writers target a Vec, which cannot fail.
fn must<T, E: std::fmt::Debug>(res: Result<T, E>) -> T {
    res.expect("writing msgpack to a Vec cannot fail")
}

pub(crate) fn encode_blob(fasthash: &str, size: u64, md5: Option<&str>) -> Vec<u8> {
    let mut buf = Vec::with_capacity(fasthash.len() + 48);
    must(rmp::encode::write_array_len(&mut buf, 2));
    must(rmp::encode::write_uint(&mut buf, TAG_BLOB));
    must(rmp::encode::write_array_len(&mut buf, 3));
    must(rmp::encode::write_str(&mut buf, fasthash));
    must(rmp::encode::write_uint(&mut buf, size));
    match md5 {
        Some(md5) => must(rmp::encode::write_str(&mut buf, md5)),
        None => must(rmp::encode::write_nil(&mut buf)),
    }
    buf
}

pub(crate) fn encode_tree(sorted_children: &[(String, ObjectId)]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + sorted_children.len() * 40);
    must(rmp::encode::write_array_len(&mut buf, 2));
    must(rmp::encode::write_uint(&mut buf, TAG_TREE));
    must(rmp::encode::write_array_len(
        &mut buf,
        sorted_children.len() as u32,
    ));
    for (name, child_id) in sorted_children {
        must(rmp::encode::write_array_len(&mut buf, 2));
        must(rmp::encode::write_str(&mut buf, name));
        must(rmp::encode::write_bin(&mut buf, child_id.as_bytes()));
    }
    buf
}

fn corrupt<E: std::fmt::Display>(err: E) -> Error {
    Error::Corrupt(err.to_string())
}

fn read_str<'a>(rd: &mut &'a [u8]) -> Result<&'a str, Error> {
    let len = rmp::decode::read_str_len(rd).map_err(corrupt)? as usize;
    if rd.len() < len {
        return Err(Error::Corrupt("string payload truncated".to_owned()));
    }
    let (raw, rest) = rd.split_at(len);
    *rd = rest;
    std::str::from_utf8(raw).map_err(corrupt)
}

fn read_bin<'a>(rd: &mut &'a [u8]) -> Result<&'a [u8], Error> {
    let len = rmp::decode::read_bin_len(rd).map_err(corrupt)? as usize;
    if rd.len() < len {
        return Err(Error::Corrupt("binary payload truncated".to_owned()));
    }
    let (raw, rest) = rd.split_at(len);
    *rd = rest;
    Ok(raw)
}

/// Decodes a canonical serialization back into a structural value.
///
/// `id` is the store key the bytes were found under; it is attached to the
/// decoded object as-is and not re-verified, since IDs are opaque handles
/// chosen by the store when the object was written.
pub fn decode_object(id: ObjectId, bytes: &[u8]) -> Result<StoredObject, Error> {
    let mut rd: &[u8] = bytes;

    let outer = rmp::decode::read_array_len(&mut rd).map_err(corrupt)?;
    if outer != 2 {
        return Err(Error::Corrupt(format!(
            "expected a two-element record, got {outer} elements"
        )));
    }
    let tag: u64 = rmp::decode::read_int(&mut rd).map_err(corrupt)?;

    match tag {
        TAG_BLOB => {
            let fields = rmp::decode::read_array_len(&mut rd).map_err(corrupt)?;
            if fields != 3 {
                return Err(Error::Corrupt(format!(
                    "blob payload must have 3 fields, got {fields}"
                )));
            }
            let fasthash = read_str(&mut rd)?.to_owned();
            let size: u64 = rmp::decode::read_int(&mut rd).map_err(corrupt)?;
            let md5 = if rd.first() == Some(&NIL_MARKER) {
                rd = &rd[1..];
                None
            } else {
                Some(read_str(&mut rd)?.to_owned())
            };
            Ok(StoredObject::Blob(FileBlob::from_parts(
                id, fasthash, size, md5,
            )))
        }
        TAG_TREE => {
            let count = rmp::decode::read_array_len(&mut rd).map_err(corrupt)? as usize;
            let mut children = Vec::with_capacity(count);
            for _ in 0..count {
                let pair = rmp::decode::read_array_len(&mut rd).map_err(corrupt)?;
                if pair != 2 {
                    return Err(Error::Corrupt(format!(
                        "tree child must be a [name, id] pair, got {pair} elements"
                    )));
                }
                let name = read_str(&mut rd)?.to_owned();
                let raw_id = read_bin(&mut rd)?;
                if raw_id.len() != ID_LEN {
                    return Err(Error::BadIdLength {
                        expected: ID_LEN,
                        actual: raw_id.len(),
                    });
                }
                let child_id = ObjectId::from_slice(raw_id)?;
                children.push((name, child_id));
            }
            Ok(StoredObject::Tree(TreeObject::from_sorted_parts(
                id, children,
            )))
        }
        other => Err(Error::UnknownTag(other)),
    }
}
