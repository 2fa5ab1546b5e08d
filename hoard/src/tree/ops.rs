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

//! Path-directed tree surgery.
//!
//! Grafting produces a new immutable root: tree nodes on the mutation path
//! are cloned, untouched siblings keep their IDs. A rebuild that would
//! leave a tree childless drops the subtree from its parent instead; only
//! the root itself may end up empty, represented as `None`.

use std::collections::BTreeMap;

use hoard_object::{ObjectId, StoredObject, TreeObject};

use crate::{Error, Objects};

/// Resolves `path` inside `root` to the subtree (or blob) ID at that
/// position, `None` when the path leads nowhere.
pub fn sub_tree(
    objects: &Objects,
    root: Option<ObjectId>,
    path: &[String],
) -> Result<Option<ObjectId>, Error> {
    let mut current = root;
    for component in path {
        let Some(id) = current else {
            return Ok(None);
        };
        match objects.get_existing(&id)? {
            StoredObject::Tree(tree) => current = tree.get(component),
            StoredObject::Blob(_) => return Ok(None),
        }
    }
    Ok(current)
}

/// Replaces the subtree at `path` inside `old_root` with whatever
/// `donor_root` has at the same `path`; a donor with nothing there deletes
/// the subtree.
pub fn graft_in_tree(
    objects: &Objects,
    old_root: Option<ObjectId>,
    path: &[String],
    donor_root: Option<ObjectId>,
) -> Result<Option<ObjectId>, Error> {
    let Some((child_name, rest)) = path.split_first() else {
        return Ok(donor_root);
    };

    let donor_obj = load(objects, donor_root)?;
    let donor_child = donor_obj
        .as_ref()
        .and_then(StoredObject::as_tree)
        .and_then(|tree| tree.get(child_name));

    let old_obj = load(objects, old_root)?;
    let old_child = old_obj
        .as_ref()
        .and_then(StoredObject::as_tree)
        .and_then(|tree| tree.get(child_name));

    let new_child = graft_in_tree(objects, old_child, rest, donor_child)?;

    match old_obj {
        Some(StoredObject::Tree(tree)) => {
            let mut children: BTreeMap<String, ObjectId> =
                tree.children().iter().cloned().collect();
            match new_child {
                Some(id) => {
                    children.insert(child_name.clone(), id);
                }
                None => {
                    children.remove(child_name);
                }
            }
            if children.is_empty() {
                // No empty folders.
                return Ok(None);
            }
            let rebuilt = TreeObject::from_child_map(children);
            objects.put_tree(&rebuilt)?;
            Ok(Some(rebuilt.id()))
        }
        // A file at this position, or nothing at all: the graft result
        // replaces it wholesale.
        _ => package_as_tree(objects, child_name, new_child),
    }
}

/// Removes the subtree at `path`; grafting nothing is deletion.
pub fn remove_child(
    objects: &Objects,
    root: Option<ObjectId>,
    path: &[String],
) -> Result<Option<ObjectId>, Error> {
    graft_in_tree(objects, root, path, None)
}

fn load(objects: &Objects, id: Option<ObjectId>) -> Result<Option<StoredObject>, Error> {
    id.map(|id| objects.get_existing(&id)).transpose()
}

fn package_as_tree(
    objects: &Objects,
    child_name: &str,
    child: Option<ObjectId>,
) -> Result<Option<ObjectId>, Error> {
    match child {
        None => Ok(None),
        Some(id) => {
            let tree = TreeObject::from_children(vec![(child_name.to_owned(), id)]);
            objects.put_tree(&tree)?;
            Ok(Some(tree.id()))
        }
    }
}
