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

//! Pull policy: what happens to each file a scan disagrees about.
//!
//! Every file-level position the merge reaches is classified into a
//! [`PullSituation`]; the cave type's preset maps each situation to a
//! [`PullIntention`]; a small set of mutation primitives translates the
//! intention into per-root ID assignments. Invalid combinations degrade to
//! leaving things unchanged rather than erroring.

use std::collections::BTreeMap;

use hoard_object::{FileBlob, ObjectId, StoredObject};
use hoard_path::HoardPath;
use log::info;

use super::pull::MoveRecord;
use super::{ByRoot, MergePreferences};
use crate::config::CaveType;
use crate::content::ContentPrefs;
use crate::roots::HOARD_ROOT;
use crate::{Error, Objects};

/// What to do about one file in one situation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullIntention {
    /// Refuse the pull; configuration error.
    Fail,
    /// Record the scanned version in the hoard and propagate it.
    AddToHoard,
    /// Leave every root as it is.
    Ignore,
    /// Drop the file from the pulled cave's plan.
    Cleanup,
    /// Record in the hoard, then drop from the pulled cave's plan.
    AddToHoardAndCleanup,
    /// Reset the pulled cave's plan to the hoard's version.
    RestoreFromHoard,
    /// Follow the file to its new path; consume the old one.
    MoveInHoard,
    /// Remove the file from every root's plan.
    DeleteFromHoard,
    /// Keep the hoard's version as the plan without scheduling anything.
    AcceptFromHoard,
}

/// Classification of one file-level merge position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullSituation {
    /// Scanned file matches the hoard.
    SamePresent,
    /// Scanned file is unknown to the hoard.
    AddedOrPresent,
    /// Scanned file differs from the hoard and was modified locally.
    DifferentAndModified,
    /// Scanned file differs from the hoard and is new locally.
    DifferentAndAdded,
    /// Scanned file differs from the hoard but is locally untouched.
    DifferentButPresent,
    /// Hoard has the file; the cave had it and deleted it.
    HoardOnlyDeleted,
    /// Hoard has the file; the cave never had it.
    HoardOnlyUnknown,
    /// Hoard has the file; the cave re-scanned it under a new path.
    HoardOnlyMoved,
}

/// The per-cave-type decision table, plus the two override flags.
#[derive(Debug, Clone)]
pub struct PullPreferences {
    /// Type of the cave being pulled.
    pub cave_type: CaveType,
    /// Treat the local version as authoritative on conflicts.
    pub assume_current: bool,
    /// Re-fetch files that went missing locally instead of deleting them
    /// from the hoard.
    pub force_fetch_local_missing: bool,

    on_same_present: PullIntention,
    on_added_or_present: PullIntention,
    on_different_modified: PullIntention,
    on_different_added: PullIntention,
    on_different_present: PullIntention,
    on_hoard_only_deleted: PullIntention,
    on_hoard_only_unknown: PullIntention,
    on_hoard_only_moved: PullIntention,
}

impl PullPreferences {
    /// The Partial preset: local changes flow into the hoard.
    pub fn for_partial(assume_current: bool, force_fetch_local_missing: bool) -> Self {
        PullPreferences {
            cave_type: CaveType::Partial,
            assume_current,
            force_fetch_local_missing,
            on_same_present: PullIntention::AddToHoard,
            on_added_or_present: PullIntention::AddToHoard,
            on_different_modified: PullIntention::AddToHoard,
            on_different_added: PullIntention::AddToHoard,
            on_different_present: if assume_current {
                PullIntention::AddToHoard
            } else {
                PullIntention::RestoreFromHoard
            },
            on_hoard_only_deleted: if force_fetch_local_missing {
                PullIntention::RestoreFromHoard
            } else {
                PullIntention::DeleteFromHoard
            },
            on_hoard_only_unknown: PullIntention::AcceptFromHoard,
            on_hoard_only_moved: PullIntention::MoveInHoard,
        }
    }

    /// The Backup preset: the hoard is authoritative, local drift gets
    /// restored.
    pub fn for_backup() -> Self {
        PullPreferences {
            cave_type: CaveType::Backup,
            assume_current: false,
            force_fetch_local_missing: false,
            on_same_present: PullIntention::AddToHoard,
            on_added_or_present: PullIntention::Ignore,
            on_different_modified: PullIntention::RestoreFromHoard,
            on_different_added: PullIntention::RestoreFromHoard,
            on_different_present: PullIntention::RestoreFromHoard,
            on_hoard_only_deleted: PullIntention::RestoreFromHoard,
            on_hoard_only_unknown: PullIntention::RestoreFromHoard,
            on_hoard_only_moved: PullIntention::RestoreFromHoard,
        }
    }

    /// The Incoming preset: absorb everything, then clean the drop box.
    pub fn for_incoming() -> Self {
        PullPreferences {
            cave_type: CaveType::Incoming,
            assume_current: false,
            force_fetch_local_missing: false,
            on_same_present: PullIntention::Cleanup,
            on_added_or_present: PullIntention::AddToHoardAndCleanup,
            on_different_modified: PullIntention::AddToHoardAndCleanup,
            on_different_added: PullIntention::AddToHoardAndCleanup,
            on_different_present: PullIntention::Cleanup,
            on_hoard_only_deleted: PullIntention::Ignore,
            on_hoard_only_unknown: PullIntention::Ignore,
            on_hoard_only_moved: PullIntention::Ignore,
        }
    }

    /// The decision for one situation.
    pub fn intention_for(&self, situation: PullSituation) -> PullIntention {
        match situation {
            PullSituation::SamePresent => self.on_same_present,
            PullSituation::AddedOrPresent => self.on_added_or_present,
            PullSituation::DifferentAndModified => self.on_different_modified,
            PullSituation::DifferentAndAdded => self.on_different_added,
            PullSituation::DifferentButPresent => self.on_different_present,
            PullSituation::HoardOnlyDeleted => self.on_hoard_only_deleted,
            PullSituation::HoardOnlyUnknown => self.on_hoard_only_unknown,
            PullSituation::HoardOnlyMoved => self.on_hoard_only_moved,
        }
    }
}

/// The merge-facing side of a pull: classifies positions, looks up the
/// decision table and applies the chosen mutation primitive.
pub struct PullMergePreferences<'a> {
    cave_root_name: String,
    preferences: &'a PullPreferences,
    content: &'a ContentPrefs,
    // fast-hash -> first path added by the staging scan; move detection.
    staging_added_hashes: BTreeMap<String, HoardPath>,
    moves: Vec<MoveRecord>,
}

impl<'a> PullMergePreferences<'a> {
    /// Assembles the pull policy for one cave.
    ///
    /// `staging_added_hashes` maps each fast-hash the scan *added* (present
    /// in staging, absent in base at that path) to the first such path in
    /// ascending order; it witnesses moves.
    pub fn new(
        cave_root_name: String,
        preferences: &'a PullPreferences,
        content: &'a ContentPrefs,
        staging_added_hashes: BTreeMap<String, HoardPath>,
    ) -> Self {
        PullMergePreferences {
            cave_root_name,
            preferences,
            content,
            staging_added_hashes,
            moves: Vec::new(),
        }
    }

    /// The move records collected during the walk.
    pub fn into_moves(self) -> Vec<MoveRecord> {
        self.moves
    }

    fn hoard_blob<'o>(originals: &'o ByRoot<StoredObject>) -> Option<&'o FileBlob> {
        originals.get(HOARD_ROOT).and_then(StoredObject::as_blob)
    }

    fn unchanged(originals: &ByRoot<StoredObject>) -> ByRoot<ObjectId> {
        originals.map(StoredObject::id)
    }

    // Staging's version lands in the hoard and everywhere it belongs.
    fn add_to_hoard(
        &self,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        staging: &FileBlob,
        newly_added: bool,
    ) -> ByRoot<ObjectId> {
        let mut result: ByRoot<ObjectId> = originals.fresh();
        let holders = originals.assigned_names();

        result.insert(HOARD_ROOT, staging.id());
        if newly_added {
            if self.preferences.cave_type == CaveType::Partial {
                result.insert(&self.cave_root_name, staging.id());
            }
            for target in self.content.caves_to_add(path, &holders) {
                result.insert(&target, staging.id());
            }
        }
        for holder in &holders {
            result.insert(holder, staging.id());
        }
        result
    }

    fn apply(
        &mut self,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        situation: PullSituation,
        staging: Option<&FileBlob>,
    ) -> Result<ByRoot<ObjectId>, Error> {
        let intention = self.preferences.intention_for(situation);
        let hoard_id = Self::hoard_blob(originals).map(FileBlob::id);

        match intention {
            PullIntention::Fail => Err(Error::InvariantViolation(format!(
                "pull is configured to fail on {situation:?} at {path}"
            ))),

            PullIntention::Ignore | PullIntention::AcceptFromHoard => {
                Ok(Self::unchanged(originals))
            }

            PullIntention::AddToHoard => {
                let Some(staging) = staging else {
                    // No scanned version to add; nothing sensible to do.
                    return Ok(Self::unchanged(originals));
                };
                if situation == PullSituation::SamePresent {
                    // The cave is recognizing a file the hoard already
                    // tracks; only its own plan needs the mark.
                    let mut result = Self::unchanged(originals);
                    result.insert(&self.cave_root_name, staging.id());
                    return Ok(result);
                }
                let newly_added = situation == PullSituation::AddedOrPresent
                    || situation == PullSituation::DifferentAndAdded;
                Ok(self.add_to_hoard(path, originals, staging, newly_added))
            }

            PullIntention::AddToHoardAndCleanup => {
                let Some(staging) = staging else {
                    return Ok(Self::unchanged(originals));
                };
                let mut result = if situation == PullSituation::SamePresent {
                    Self::unchanged(originals)
                } else {
                    self.add_to_hoard(path, originals, staging, true)
                };
                result.set(&self.cave_root_name, None);
                Ok(result)
            }

            PullIntention::Cleanup => {
                let mut result = Self::unchanged(originals);
                result.set(&self.cave_root_name, None);
                Ok(result)
            }

            PullIntention::RestoreFromHoard => match hoard_id {
                Some(hoard_id) => {
                    let mut result = Self::unchanged(originals);
                    result.insert(&self.cave_root_name, hoard_id);
                    Ok(result)
                }
                // Nothing to restore from: a vanished file with no hoard
                // copy is gone for good.
                None if situation == PullSituation::HoardOnlyDeleted => Ok(originals.fresh()),
                None => Ok(Self::unchanged(originals)),
            },

            PullIntention::DeleteFromHoard => Ok(originals.fresh()),

            // The move record was registered during classification; here
            // the old path gets consumed everywhere.
            PullIntention::MoveInHoard => Ok(originals.fresh()),
        }
    }
}

impl MergePreferences for PullMergePreferences<'_> {
    fn combine_both_existing(
        &mut self,
        _objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        staging: &FileBlob,
        base: &FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error> {
        // "Present" distinguishes a cave that held exactly the hoard's
        // version when the local change appeared from one that was already
        // divergent.
        let situation = match Self::hoard_blob(originals) {
            Some(hoard) if hoard.id() == staging.id() => PullSituation::SamePresent,
            None => PullSituation::AddedOrPresent,
            Some(hoard) if hoard.id() == base.id() => PullSituation::DifferentButPresent,
            Some(_) => PullSituation::DifferentAndModified,
        };
        self.apply(path, originals, situation, Some(staging))
    }

    fn combine_base_only(
        &mut self,
        _objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        base: &FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error> {
        if let Some(destination) = self.staging_added_hashes.get(base.fasthash()).cloned() {
            let intention = self
                .preferences
                .intention_for(PullSituation::HoardOnlyMoved);
            if intention == PullIntention::MoveInHoard {
                info!("move detected: {path} -> {destination}");
                self.moves.push(MoveRecord {
                    old_path: path.clone(),
                    new_path: destination,
                    holders: originals.assigned_names(),
                });
            }
            return self.apply(path, originals, PullSituation::HoardOnlyMoved, None);
        }
        self.apply(path, originals, PullSituation::HoardOnlyDeleted, None)
    }

    fn combine_staging_only(
        &mut self,
        _objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
        staging: &FileBlob,
    ) -> Result<ByRoot<ObjectId>, Error> {
        let situation = match Self::hoard_blob(originals) {
            Some(hoard) if hoard.id() == staging.id() => PullSituation::SamePresent,
            None => PullSituation::AddedOrPresent,
            Some(_) => PullSituation::DifferentAndAdded,
        };
        self.apply(path, originals, situation, Some(staging))
    }

    fn merge_missing(
        &mut self,
        _objects: &Objects,
        path: &HoardPath,
        originals: &ByRoot<StoredObject>,
    ) -> Result<ByRoot<ObjectId>, Error> {
        self.apply(path, originals, PullSituation::HoardOnlyUnknown, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_preset_matches_table() {
        let prefs = PullPreferences::for_partial(false, false);
        assert_eq!(
            prefs.intention_for(PullSituation::SamePresent),
            PullIntention::AddToHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::AddedOrPresent),
            PullIntention::AddToHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::DifferentAndModified),
            PullIntention::AddToHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::DifferentAndAdded),
            PullIntention::AddToHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::DifferentButPresent),
            PullIntention::RestoreFromHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::HoardOnlyDeleted),
            PullIntention::DeleteFromHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::HoardOnlyUnknown),
            PullIntention::AcceptFromHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::HoardOnlyMoved),
            PullIntention::MoveInHoard
        );

        let flagged = PullPreferences::for_partial(true, true);
        assert_eq!(
            flagged.intention_for(PullSituation::DifferentButPresent),
            PullIntention::AddToHoard
        );
        assert_eq!(
            flagged.intention_for(PullSituation::HoardOnlyDeleted),
            PullIntention::RestoreFromHoard
        );
    }

    #[test]
    fn backup_preset_matches_table() {
        let prefs = PullPreferences::for_backup();
        assert_eq!(
            prefs.intention_for(PullSituation::SamePresent),
            PullIntention::AddToHoard
        );
        assert_eq!(
            prefs.intention_for(PullSituation::AddedOrPresent),
            PullIntention::Ignore
        );
        for situation in [
            PullSituation::DifferentAndModified,
            PullSituation::DifferentAndAdded,
            PullSituation::DifferentButPresent,
            PullSituation::HoardOnlyDeleted,
            PullSituation::HoardOnlyUnknown,
            PullSituation::HoardOnlyMoved,
        ] {
            assert_eq!(
                prefs.intention_for(situation),
                PullIntention::RestoreFromHoard
            );
        }
    }

    #[test]
    fn incoming_preset_matches_table() {
        let prefs = PullPreferences::for_incoming();
        assert_eq!(
            prefs.intention_for(PullSituation::SamePresent),
            PullIntention::Cleanup
        );
        for situation in [
            PullSituation::AddedOrPresent,
            PullSituation::DifferentAndModified,
            PullSituation::DifferentAndAdded,
        ] {
            assert_eq!(
                prefs.intention_for(situation),
                PullIntention::AddToHoardAndCleanup
            );
        }
        assert_eq!(
            prefs.intention_for(PullSituation::DifferentButPresent),
            PullIntention::Cleanup
        );
        for situation in [
            PullSituation::HoardOnlyDeleted,
            PullSituation::HoardOnlyUnknown,
            PullSituation::HoardOnlyMoved,
        ] {
            assert_eq!(prefs.intention_for(situation), PullIntention::Ignore);
        }
    }
}
