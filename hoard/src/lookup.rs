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

//! Reverse indices over a root.
//!
//! Trees answer "what is at this path"; these compact byte-buffer tables
//! answer the opposite questions: where does a blob live
//! ([`ObjToPathsIndex`]), and what blob does a path name
//! ([`PathHashToObjIndex`]). Paths in the former are *compressed*: child
//! indices from the root, LEB128-packed, decoded by re-walking the tree.

use std::cell::OnceCell;
use std::collections::HashMap;

use hoard_object::{ObjectId, StoredObject, ID_LEN};
use hoard_path::HoardPath;
use integer_encoding::VarInt;
use sha1::{Digest, Sha1};

use crate::{Error, Objects};

/// Child indices from the root down to a blob.
pub type CompressedPath = Vec<u64>;

fn corrupt_index(detail: &str) -> Error {
    Error::InconsistentStore(format!("malformed lookup index: {detail}"))
}

// root-id tag (20 bytes, zero when absent), then records of
// blob-id ++ varint(packed len) ++ packed child indices.
fn parse_obj_records(data: &[u8]) -> Result<HashMap<ObjectId, Vec<CompressedPath>>, Error> {
    let mut table: HashMap<ObjectId, Vec<CompressedPath>> = HashMap::new();
    let mut idx = ID_LEN.min(data.len());
    while idx < data.len() {
        if data.len() - idx < ID_LEN {
            return Err(corrupt_index("truncated record id"));
        }
        let id = ObjectId::from_slice(&data[idx..idx + ID_LEN])?;
        idx += ID_LEN;
        let (packed_len, consumed) =
            u64::decode_var(&data[idx..]).ok_or_else(|| corrupt_index("bad length varint"))?;
        idx += consumed;
        let packed_len = packed_len as usize;
        if data.len() - idx < packed_len {
            return Err(corrupt_index("truncated packed path"));
        }
        let mut path = Vec::new();
        let mut offset = 0;
        while offset < packed_len {
            let (component, consumed) = u64::decode_var(&data[idx + offset..idx + packed_len])
                .ok_or_else(|| corrupt_index("bad path varint"))?;
            offset += consumed;
            path.push(component);
        }
        idx += packed_len;
        table.entry(id).or_default().push(path);
    }
    Ok(table)
}

/// Maps each blob reachable from a root to its compressed paths.
pub struct ObjToPathsIndex {
    root_id: Option<ObjectId>,
    data: Vec<u8>,
    table: OnceCell<HashMap<ObjectId, Vec<CompressedPath>>>,
}

impl ObjToPathsIndex {
    /// Builds the index from every blob reachable from `root_id`.
    pub fn build(objects: &Objects, root_id: Option<ObjectId>) -> Result<Self, Error> {
        let mut data = tag_bytes(root_id);
        if let Some(root) = root_id {
            let mut packed = Vec::new();
            collect_records(objects, root, &mut packed, &mut data)?;
        }
        Ok(ObjToPathsIndex {
            root_id,
            data,
            table: OnceCell::new(),
        })
    }

    /// Builds the difference index: records only for blobs present under
    /// `existing` and absent (or different) at the same position under
    /// `missing`. Walks `existing`'s shape only.
    pub fn build_difference(
        objects: &Objects,
        existing: Option<ObjectId>,
        missing: Option<ObjectId>,
    ) -> Result<Self, Error> {
        let mut data = tag_bytes(existing);
        let mut packed = Vec::new();
        collect_difference(objects, existing, missing, &mut packed, &mut data)?;
        Ok(ObjToPathsIndex {
            root_id: existing,
            data,
            table: OnceCell::new(),
        })
    }

    /// Revives an index from its serialized bytes, validating framing.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self, Error> {
        if data.len() < ID_LEN {
            return Err(corrupt_index("missing root tag"));
        }
        // Validate the record framing once so lookups cannot fail later.
        parse_obj_records(&data)?;
        let root_id = if data[..ID_LEN].iter().all(|b| *b == 0) {
            None
        } else {
            Some(ObjectId::from_slice(&data[..ID_LEN])?)
        };
        Ok(ObjToPathsIndex {
            root_id,
            data,
            table: OnceCell::new(),
        })
    }

    /// The root this index was derived from.
    pub fn root_id(&self) -> Option<ObjectId> {
        self.root_id
    }

    /// The serialized index.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn table(&self) -> &HashMap<ObjectId, Vec<CompressedPath>> {
        self.table.get_or_init(|| {
            parse_obj_records(&self.data).expect("framing was validated at construction")
        })
    }

    /// Whether the index has any record for this blob.
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.table().contains_key(id)
    }

    /// Number of distinct blobs recorded.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether no blob is recorded.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Compressed paths recorded for a blob.
    pub fn compressed_paths(&self, id: &ObjectId) -> &[CompressedPath] {
        self.table().get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Decodes every recorded path of a blob by re-walking the tree.
    pub fn paths_of(&self, objects: &Objects, id: &ObjectId) -> Result<Vec<HoardPath>, Error> {
        self.compressed_paths(id)
            .iter()
            .map(|path| self.resolve(objects, path))
            .collect()
    }

    /// Decodes one compressed path into the POSIX path it addresses.
    pub fn resolve(&self, objects: &Objects, path: &CompressedPath) -> Result<HoardPath, Error> {
        let Some(root) = self.root_id else {
            return Err(corrupt_index("cannot resolve paths without a root"));
        };
        let mut components = Vec::with_capacity(path.len());
        let mut current = root;
        for index in path {
            let StoredObject::Tree(tree) = objects.get_existing(&current)? else {
                return Err(corrupt_index("compressed path runs through a blob"));
            };
            let (name, child) = tree.child_at(*index as usize).ok_or_else(|| {
                corrupt_index("compressed path index out of range")
            })?;
            components.push(name.to_owned());
            current = child;
        }
        Ok(HoardPath::from_components(true, components))
    }
}

fn tag_bytes(root_id: Option<ObjectId>) -> Vec<u8> {
    match root_id {
        Some(id) => id.as_bytes().to_vec(),
        None => vec![0u8; ID_LEN],
    }
}

fn push_record(data: &mut Vec<u8>, id: &ObjectId, packed_path: &[u8]) {
    data.extend_from_slice(id.as_bytes());
    data.extend((packed_path.len() as u64).encode_var_vec());
    data.extend_from_slice(packed_path);
}

fn collect_records(
    objects: &Objects,
    id: ObjectId,
    packed_path: &mut Vec<u8>,
    data: &mut Vec<u8>,
) -> Result<(), Error> {
    match objects.get_existing(&id)? {
        StoredObject::Blob(_) => push_record(data, &id, packed_path),
        StoredObject::Tree(tree) => {
            for (index, (_, child)) in tree.children().iter().enumerate() {
                let marker = (index as u64).encode_var_vec();
                packed_path.extend_from_slice(&marker);
                collect_records(objects, *child, packed_path, data)?;
                packed_path.truncate(packed_path.len() - marker.len());
            }
        }
    }
    Ok(())
}

fn collect_difference(
    objects: &Objects,
    existing: Option<ObjectId>,
    missing: Option<ObjectId>,
    packed_path: &mut Vec<u8>,
    data: &mut Vec<u8>,
) -> Result<(), Error> {
    if existing == missing {
        return Ok(());
    }
    let Some(existing_id) = existing else {
        return Ok(());
    };
    match objects.get_existing(&existing_id)? {
        StoredObject::Blob(_) => push_record(data, &existing_id, packed_path),
        StoredObject::Tree(tree) => {
            let missing_tree = match missing {
                Some(id) => objects.get_existing(&id)?.as_tree().cloned(),
                None => None,
            };
            for (index, (name, child)) in tree.children().iter().enumerate() {
                let missing_child = missing_tree.as_ref().and_then(|tree| tree.get(name));
                let marker = (index as u64).encode_var_vec();
                packed_path.extend_from_slice(&marker);
                collect_difference(objects, Some(*child), missing_child, packed_path, data)?;
                packed_path.truncate(packed_path.len() - marker.len());
            }
        }
    }
    Ok(())
}

// sha1(path) ++ varint(id len) ++ id, repeated.
fn parse_path_records(data: &[u8]) -> Result<HashMap<[u8; ID_LEN], Vec<ObjectId>>, Error> {
    let mut table: HashMap<[u8; ID_LEN], Vec<ObjectId>> = HashMap::new();
    let mut idx = 0;
    while idx < data.len() {
        if data.len() - idx < ID_LEN {
            return Err(corrupt_index("truncated path hash"));
        }
        let mut hash = [0u8; ID_LEN];
        hash.copy_from_slice(&data[idx..idx + ID_LEN]);
        idx += ID_LEN;
        let (id_len, consumed) =
            u64::decode_var(&data[idx..]).ok_or_else(|| corrupt_index("bad id length"))?;
        idx += consumed;
        let id_len = id_len as usize;
        if data.len() - idx < id_len {
            return Err(corrupt_index("truncated object id"));
        }
        let id = ObjectId::from_slice(&data[idx..idx + id_len])?;
        idx += id_len;
        table.entry(hash).or_default().push(id);
    }
    Ok(table)
}

/// Maps the SHA-1 of each blob's absolute POSIX path to its object ID.
pub struct PathHashToObjIndex {
    root_id: Option<ObjectId>,
    data: Vec<u8>,
    table: OnceCell<HashMap<[u8; ID_LEN], Vec<ObjectId>>>,
}

impl PathHashToObjIndex {
    /// Builds the index from every blob reachable from `root_id`.
    pub fn build(objects: &Objects, root_id: Option<ObjectId>) -> Result<Self, Error> {
        let mut data = Vec::new();
        if let Some(root) = root_id {
            collect_path_records(objects, root, &HoardPath::root(), &mut data)?;
        }
        Ok(PathHashToObjIndex {
            root_id,
            data,
            table: OnceCell::new(),
        })
    }

    /// The root this index was derived from.
    pub fn root_id(&self) -> Option<ObjectId> {
        self.root_id
    }

    /// The serialized index.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    fn table(&self) -> &HashMap<[u8; ID_LEN], Vec<ObjectId>> {
        self.table.get_or_init(|| {
            parse_path_records(&self.data).expect("records are well-formed by construction")
        })
    }

    /// The blob IDs recorded for an absolute path.
    pub fn lookup(&self, path: &HoardPath) -> &[ObjectId] {
        let hash: [u8; ID_LEN] = Sha1::digest(path.as_posix().as_bytes()).into();
        self.table().get(&hash).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Number of recorded paths.
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Whether nothing is recorded.
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}

fn collect_path_records(
    objects: &Objects,
    id: ObjectId,
    path: &HoardPath,
    data: &mut Vec<u8>,
) -> Result<(), Error> {
    match objects.get_existing(&id)? {
        StoredObject::Blob(_) => {
            let hash = Sha1::digest(path.as_posix().as_bytes());
            data.extend_from_slice(&hash);
            data.extend((ID_LEN as u64).encode_var_vec());
            data.extend_from_slice(id.as_bytes());
        }
        StoredObject::Tree(tree) => {
            for (name, child) in tree.children() {
                collect_path_records(objects, *child, &path.child(name), data)?;
            }
        }
    }
    Ok(())
}
