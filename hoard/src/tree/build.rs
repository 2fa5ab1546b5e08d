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

//! One-pass tree construction from a sorted file listing.

use std::collections::BTreeMap;

use hoard_object::{FileBlob, ObjectId, TreeObject};
use hoard_path::HoardPath;

use crate::{Error, Objects};

// One directory under construction: its components and the children
// committed so far.
struct OpenDir {
    components: Vec<String>,
    children: BTreeMap<String, ObjectId>,
}

/// Builds a full tree from `(path, blob)` pairs in strictly ascending path
/// order, committing each directory the moment the input leaves it.
///
/// Returns the root tree's ID; with no input that is the empty tree.
/// Out-of-order or duplicate paths are an invariant violation.
pub fn mktree_from_sorted_tuples<I>(objects: &Objects, entries: I) -> Result<ObjectId, Error>
where
    I: IntoIterator<Item = (HoardPath, FileBlob)>,
{
    let mut stack = vec![OpenDir {
        components: Vec::new(),
        children: BTreeMap::new(),
    }];
    let mut previous: Option<HoardPath> = None;

    for (path, blob) in entries {
        if let Some(prev) = &previous {
            if prev >= &path {
                return Err(Error::InvariantViolation(format!(
                    "mktree input not strictly ascending: {prev} then {path}"
                )));
            }
        }

        let components = path.components();
        let Some((file_name, dirs)) = components.split_last() else {
            return Err(Error::InvariantViolation(
                "mktree input path has no components".to_owned(),
            ));
        };

        // Close directories the current path is no longer inside of.
        while !is_prefix(&stack.last().expect("stack never empties").components, dirs) {
            pop_and_commit(objects, &mut stack)?;
        }
        // Open the directories leading down to this file.
        for depth in stack.last().expect("stack never empties").components.len()..dirs.len() {
            stack.push(OpenDir {
                components: dirs[..=depth].to_vec(),
                children: BTreeMap::new(),
            });
        }

        objects.put_blob(&blob)?;
        stack
            .last_mut()
            .expect("stack never empties")
            .children
            .insert(file_name.clone(), blob.id());

        previous = Some(path);
    }

    while stack.len() > 1 {
        pop_and_commit(objects, &mut stack)?;
    }
    let root = stack.pop().expect("stack never empties");
    let tree = TreeObject::from_child_map(root.children);
    objects.put_tree(&tree)?;
    Ok(tree.id())
}

fn is_prefix(dir: &[String], of: &[String]) -> bool {
    of.len() >= dir.len() && of[..dir.len()] == *dir
}

fn pop_and_commit(objects: &Objects, stack: &mut Vec<OpenDir>) -> Result<(), Error> {
    let done = stack.pop().expect("caller checked depth");
    let name = done
        .components
        .last()
        .expect("only the root has no name")
        .clone();
    let tree = TreeObject::from_child_map(done.children);
    objects.put_tree(&tree)?;
    stack
        .last_mut()
        .expect("root stays below every popped dir")
        .children
        .insert(name, tree.id());
    Ok(())
}
