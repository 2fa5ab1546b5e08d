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

//! Pulling a cave's scan into the hoard.
//!
//! `merge_contents` assembles the participating roots, runs the three-way
//! walk under the cave's pull policy and resolves move records;
//! `commit_merged` assigns the outputs. In between, the free-space
//! projection may abort the pull with a diagnostic — object writes already
//! made stay in the store (they are unreachable until committed to a root
//! and fall to GC otherwise).

use std::collections::BTreeMap;
use std::sync::Arc;

use hoard_object::{ObjectId, StoredObject};
use hoard_path::HoardPath;
use log::info;
use uuid::Uuid;

use super::preferences::{PullMergePreferences, PullPreferences};
use super::{ByRoot, ThreeWayMerge};
use crate::config::{CaveType, HoardConfig};
use crate::content::ContentPrefs;
use crate::roots::{Roots, HOARD_ROOT};
use crate::tree::{sub_tree, graft_in_tree, DiffKind, ZipDfs};
use crate::{Error, Hoard, Objects};

/// A detected rename: the same fast-hash vanished from `old_path` and
/// appeared at `new_path` in the staging scan.
#[derive(Debug, Clone)]
pub struct MoveRecord {
    /// Where the file used to be.
    pub old_path: HoardPath,
    /// Where the scan saw it reappear.
    pub new_path: HoardPath,
    /// Root names that held the old path in their plan.
    pub holders: Vec<String>,
}

/// The result of a completed merge.
#[derive(Debug)]
pub struct MergeOutcome {
    /// New desired ID per participating root; unassigned means empty.
    pub desired: ByRoot<ObjectId>,
    /// Renames resolved during the walk.
    pub moves: Vec<MoveRecord>,
}

/// Capacity snapshot of one backup cave, provided by the outer layer.
#[derive(Debug, Clone, Copy)]
pub struct BackupCapacity {
    /// Medium size in bytes.
    pub total_bytes: u64,
    /// Bytes already in use.
    pub used_bytes: u64,
}

/// How a pull ended.
#[derive(Debug)]
pub enum PullOutcome {
    /// Merge committed; new desired roots are in place.
    Completed(MergeOutcome),
    /// A backup cave would drop under the free-space floor; nothing was
    /// committed to the roots. The message starts with `Error:`.
    InsufficientSpace(String),
}

// Free-space floor backups must keep after a pull.
const MIN_BACKUP_FREE_FRACTION: f64 = 0.1;

/// Runs the three-way merge for one cave against the whole fleet.
///
/// The universe of participating roots is every cave's desired tree plus
/// `"HOARD"`'s; the cave's own current/staging pair drives the walk. The
/// merge mutates no root; it only appends objects.
pub fn merge_contents(
    objects: &Objects,
    roots: &Roots,
    config: &HoardConfig,
    cave_uuid: &Uuid,
    preferences: &PullPreferences,
    content: &ContentPrefs,
) -> Result<MergeOutcome, Error> {
    let cave = config.cave(cave_uuid)?;
    if cave.cave_type != preferences.cave_type {
        return Err(Error::WrongCaveType(format!(
            "cave {} is {:?} but the pull preferences are for {:?}",
            cave.name, cave.cave_type, preferences.cave_type
        )));
    }
    let cave_root_name = cave.root_name();
    let base_id = roots.root(&cave_root_name).current()?;
    let staging_id = roots.root(&cave_root_name).staging()?;

    let mut names: Vec<String> = config.caves().iter().map(|c| c.root_name()).collect();
    names.push(HOARD_ROOT.to_owned());
    let universe = Arc::new(names);

    let mut inputs: ByRoot<ObjectId> = ByRoot::new(Arc::clone(&universe));
    for cave in config.caves() {
        inputs.set(&cave.root_name(), roots.root(&cave.root_name()).desired()?);
    }
    inputs.set(HOARD_ROOT, roots.root(HOARD_ROOT).desired()?);

    let staging_added_hashes = collect_added_hashes(objects, base_id, staging_id)?;

    let mut pull_prefs = PullMergePreferences::new(
        cave_root_name,
        preferences,
        content,
        staging_added_hashes,
    );
    let desired = {
        let mut merge = ThreeWayMerge::new(base_id, staging_id, &mut pull_prefs);
        merge.execute(objects, &inputs)?
    };
    let moves = pull_prefs.into_moves();
    let desired = apply_moves(objects, staging_id, desired, &moves)?;

    Ok(MergeOutcome { desired, moves })
}

// Fast-hashes of files the scan added, each mapped to the first staging
// path carrying it.
fn collect_added_hashes(
    objects: &Objects,
    base_id: Option<ObjectId>,
    staging_id: Option<ObjectId>,
) -> Result<BTreeMap<String, HoardPath>, Error> {
    let mut added: BTreeMap<String, HoardPath> = BTreeMap::new();
    let walk = ZipDfs::new(objects, HoardPath::root(), base_id, staging_id, false);
    for entry in walk {
        let entry = entry?;
        if entry.diff != DiffKind::LeftMissing {
            continue;
        }
        let Some(staging_side) = entry.right else {
            continue;
        };
        if let StoredObject::Blob(blob) = objects.get_existing(&staging_side)? {
            added
                .entry(blob.fasthash().to_owned())
                .or_insert(entry.path);
        }
    }
    Ok(added)
}

// Places each moved file at its destination in every root that held the
// old path and has nothing at the new one yet. First-match: records are
// applied in walk order.
fn apply_moves(
    objects: &Objects,
    staging_id: Option<ObjectId>,
    mut desired: ByRoot<ObjectId>,
    moves: &[MoveRecord],
) -> Result<ByRoot<ObjectId>, Error> {
    for record in moves {
        let components = record.new_path.components();
        if sub_tree(objects, staging_id, components)?.is_none() {
            continue;
        }
        for holder in &record.holders {
            let root = desired.get(holder).copied();
            if sub_tree(objects, root, components)?.is_some() {
                continue;
            }
            let new_root = graft_in_tree(objects, root, components, staging_id)?;
            desired.set(holder, new_root);
            info!(
                "move: {} now wants {} instead of {}",
                holder, record.new_path, record.old_path
            );
        }
    }
    Ok(desired)
}

/// Projects each backup cave's free space after the merge lands; a cave
/// projected under the floor produces the abort diagnostic.
pub fn check_backup_free_space(
    objects: &Objects,
    roots: &Roots,
    config: &HoardConfig,
    capacities: &BTreeMap<Uuid, BackupCapacity>,
    desired: &ByRoot<ObjectId>,
) -> Result<Option<String>, Error> {
    for cave in config.caves_of_type(CaveType::Backup) {
        let Some(capacity) = capacities.get(&cave.uuid) else {
            continue;
        };
        let current = roots.root(&cave.root_name()).current()?;
        let planned = desired.get(&cave.root_name()).copied();

        let mut added_bytes: u64 = 0;
        let walk = ZipDfs::new(objects, HoardPath::root(), current, planned, false);
        for entry in walk {
            let entry = entry?;
            if entry.diff != DiffKind::LeftMissing {
                continue;
            }
            let Some(planned_id) = entry.right else {
                continue;
            };
            if let StoredObject::Blob(blob) = objects.get_existing(&planned_id)? {
                added_bytes += blob.size();
            }
        }

        if capacity.total_bytes == 0 {
            continue;
        }
        let projected_free = capacity
            .total_bytes
            .saturating_sub(capacity.used_bytes)
            .saturating_sub(added_bytes) as f64
            / capacity.total_bytes as f64;
        if projected_free < MIN_BACKUP_FREE_FRACTION {
            return Ok(Some(format!(
                "Error: Backup {} free space is projected to become {:.1}% < {:.1}%!",
                cave.name,
                projected_free * 100.0,
                MIN_BACKUP_FREE_FRACTION * 100.0
            )));
        }
    }
    Ok(None)
}

/// Accepts a merge: the cave's staging becomes its current, and every
/// participating root's desired is set to the merge output (cleared where
/// the output is empty).
pub fn commit_merged(
    roots: &Roots,
    cave_root_name: &str,
    desired: &ByRoot<ObjectId>,
) -> Result<(), Error> {
    let cave_root = roots.root(cave_root_name);
    let staged = cave_root.staging()?;
    cave_root.set_current(staged)?;

    for name in desired.names() {
        roots.root(name).set_desired(desired.get(name).copied())?;
    }
    Ok(())
}

impl Hoard {
    /// Pulls one cave's staged scan into the fleet's plans, end to end:
    /// merge, free-space projection, commit. Runs under a single write
    /// transaction.
    pub fn pull(
        &self,
        config: &HoardConfig,
        cave_uuid: &Uuid,
        preferences: &PullPreferences,
        capacities: &BTreeMap<Uuid, BackupCapacity>,
    ) -> Result<PullOutcome, Error> {
        let content = ContentPrefs::new(config);

        let tx = self.storage().start_transaction();
        let objects = Objects::new(self.storage(), &tx);
        let roots = Roots::new(self.storage(), &tx);

        let outcome = merge_contents(&objects, &roots, config, cave_uuid, preferences, &content)?;

        if let Some(diagnostic) =
            check_backup_free_space(&objects, &roots, config, capacities, &outcome.desired)?
        {
            // Advisory early return: objects written so far stay (they are
            // unreachable and fall to the next GC), roots stay untouched.
            self.storage().commit_transaction(tx)?;
            return Ok(PullOutcome::InsufficientSpace(diagnostic));
        }

        let cave_root_name = config.cave(cave_uuid)?.root_name();
        commit_merged(&roots, &cave_root_name, &outcome.desired)?;
        self.storage().commit_transaction(tx)?;
        Ok(PullOutcome::Completed(outcome))
    }
}
