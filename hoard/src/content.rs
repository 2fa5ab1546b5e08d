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

//! Which caves should acquire a file that is new to the hoard.

use std::collections::BTreeMap;

use hoard_path::HoardPath;
use itertools::Itertools;
use log::info;

use crate::config::{Cave, CaveType, HoardConfig};

/// A group of backup caves sharing a mount point. A file replicates
/// across at most one representative from the set.
pub struct BackupSet {
    mounted_at: HoardPath,
    backups: Vec<Cave>,
    num_backup_copies_desired: usize,
}

impl BackupSet {
    /// Groups every Backup cave in the config by mount point,
    /// declaration order preserved within a set.
    pub fn all(config: &HoardConfig) -> Vec<BackupSet> {
        let mut sets: BTreeMap<String, Vec<Cave>> = BTreeMap::new();
        for cave in config.caves_of_type(CaveType::Backup) {
            sets.entry(cave.mounted_at.as_posix())
                .or_default()
                .push(cave.clone());
        }
        sets.into_values()
            .map(|backups| BackupSet {
                mounted_at: backups[0].mounted_at.clone(),
                num_backup_copies_desired: 1.min(backups.len()),
                backups,
            })
            .collect()
    }

    /// The shared mount point.
    pub fn mounted_at(&self) -> &HoardPath {
        &self.mounted_at
    }

    /// Picks the backups that should additionally receive `hoard_path`,
    /// given the set of root names already scheduled to hold the file.
    ///
    /// Members already scheduled count against the copy target; candidates
    /// are filtered by path availability and taken in declaration order.
    pub fn caves_to_backup_to(
        &self,
        hoard_path: &HoardPath,
        scheduled: &[String],
    ) -> Vec<&Cave> {
        let past_backups: Vec<&Cave> = self
            .backups
            .iter()
            .filter(|cave| scheduled.contains(&cave.root_name()) && cave.covers(hoard_path))
            .collect();

        info!(
            "got {} currently requested backups for {hoard_path}",
            past_backups.len()
        );
        if past_backups.len() >= self.num_backup_copies_desired {
            info!(
                "skipping {hoard_path}, requested backups {} >= {}",
                past_backups.len(),
                self.num_backup_copies_desired
            );
            return Vec::new();
        }
        let num_to_request = self.num_backup_copies_desired - past_backups.len();

        // TODO implement balancing, e.g. order by free share and file size.
        let candidates: Vec<&Cave> = self
            .backups
            .iter()
            .filter(|cave| cave.covers(hoard_path))
            .filter(|cave| !past_backups.iter().any(|past| past.uuid == cave.uuid))
            .collect();

        if candidates.len() < num_to_request {
            log::error!(
                "need at least {num_to_request} backup media to satisfy, has only {} remaining",
                candidates.len()
            );
        }
        candidates.into_iter().take(num_to_request).collect()
    }
}

/// Enumerates the caves that should acquire a file new to the hoard:
/// fetch-new partials whose mount covers it, plus up to the per-set copy
/// target from every backup set.
pub struct ContentPrefs {
    partials_with_fetch_new: Vec<Cave>,
    backup_sets: Vec<BackupSet>,
}

impl ContentPrefs {
    /// Derives the preference tables from the fleet configuration.
    pub fn new(config: &HoardConfig) -> Self {
        ContentPrefs {
            partials_with_fetch_new: config
                .caves_of_type(CaveType::Partial)
                .filter(|cave| cave.fetch_new)
                .cloned()
                .collect(),
            backup_sets: BackupSet::all(config),
        }
    }

    /// Root names of the caves that should also acquire the file at
    /// `hoard_path`, deduplicated. `scheduled` holds the root names
    /// already planned to carry it.
    pub fn caves_to_add(&self, hoard_path: &HoardPath, scheduled: &[String]) -> Vec<String> {
        let mut result: Vec<String> = Vec::new();
        for cave in &self.partials_with_fetch_new {
            if cave.covers(hoard_path) {
                result.push(cave.root_name());
            }
        }
        for set in &self.backup_sets {
            for cave in set.caves_to_backup_to(hoard_path, scheduled) {
                result.push(cave.root_name());
            }
        }
        result.into_iter().unique().collect()
    }
}
