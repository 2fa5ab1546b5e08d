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

//! Cross-module scenario tests: full pull workflows over a temporary
//! hoard, plus the algebraic laws the merge and tree builders uphold.

use std::collections::BTreeMap;
use std::ops::Deref;

use hoard_object::{FileBlob, ObjectId, StoredObject};
use hoard_path::HoardPath;
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use uuid::Uuid;

use crate::calc::{
    CachedCalc, CompositeNode, PresenceStatus, QueryStats, QueryStatsCalc,
    SizeCountPresenceCalc, UsedSizeCalc,
};
use crate::config::{Cave, CaveType, ConnectionLatency, ConnectionSpeed, HoardConfig};
use crate::merge::{BackupCapacity, PullOutcome, PullPreferences};
use crate::roots::{Branch, HOARD_ROOT};
use crate::tree::{graft_in_tree, mktree_from_sorted_tuples, remove_child, sub_tree, TreeDfs};
use crate::{Error, Hoard};

pub(crate) struct TempHoard {
    _dir: TempDir,
    hoard: Hoard,
}

impl TempHoard {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("cannot create tempdir");
        let hoard = Hoard::open(dir.path()).expect("cannot open hoard");
        TempHoard { _dir: dir, hoard }
    }
}

impl Deref for TempHoard {
    type Target = Hoard;

    fn deref(&self) -> &Self::Target {
        &self.hoard
    }
}

fn blob(fasthash: &str, size: u64) -> FileBlob {
    FileBlob::create(fasthash, size, None)
}

fn make_cave(name: &str, cave_type: CaveType, mounted_at: &str, fetch_new: bool) -> Cave {
    Cave {
        uuid: Uuid::new_v4(),
        name: name.to_owned(),
        cave_type,
        mounted_at: HoardPath::parse(mounted_at),
        fetch_new,
        min_copies_before_cleanup: 1,
        speed: ConnectionSpeed::Medium,
        latency: ConnectionLatency::Low,
    }
}

// Builds and stores a tree from (path, blob) pairs; sorted internally.
fn build_tree(hoard: &Hoard, files: &[(&str, &FileBlob)]) -> ObjectId {
    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let sorted: BTreeMap<HoardPath, FileBlob> = files
        .iter()
        .map(|(path, blob)| (HoardPath::parse(path), (*blob).clone()))
        .collect();
    let root = mktree_from_sorted_tuples(&objects, sorted).expect("mktree");
    hoard.commit_transaction(tx).expect("commit");
    root
}

fn set_branch(hoard: &Hoard, root_name: &str, branch: Branch, id: Option<ObjectId>) {
    let tx = hoard.start_transaction();
    hoard
        .roots(&tx)
        .root(root_name)
        .set(branch, id)
        .expect("set branch");
    hoard.commit_transaction(tx).expect("commit");
}

fn get_branch(hoard: &Hoard, root_name: &str, branch: Branch) -> Option<ObjectId> {
    let tx = hoard.start_transaction();
    hoard.roots(&tx).root(root_name).get(branch).expect("get branch")
}

// Flattens a root into path -> (fasthash, size) for assertions.
fn tree_files(hoard: &Hoard, root: Option<ObjectId>) -> BTreeMap<String, (String, u64)> {
    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let mut files = BTreeMap::new();
    for entry in TreeDfs::new(&objects, HoardPath::root(), root) {
        let entry = entry.expect("dfs");
        if let StoredObject::Blob(blob) = entry.object {
            files.insert(
                entry.path.as_posix(),
                (blob.fasthash().to_owned(), blob.size()),
            );
        }
    }
    files
}

fn pull(
    hoard: &Hoard,
    config: &HoardConfig,
    cave_uuid: &Uuid,
    preferences: &PullPreferences,
) -> PullOutcome {
    hoard
        .pull(config, cave_uuid, preferences, &BTreeMap::new())
        .expect("pull")
}

#[test]
fn scenario_fresh_add() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let p_name = p.root_name();
    let p_uuid = p.uuid;
    config.add_cave(p);

    let staged = build_tree(&hoard, &[("/pics/a.jpg", &blob("h1", 100))]);
    set_branch(&hoard, &p_name, Branch::Staging, Some(staged));

    pull(&hoard, &config, &p_uuid, &PullPreferences::for_partial(false, false));

    let hoard_desired = get_branch(&hoard, HOARD_ROOT, Branch::Desired);
    assert_eq!(
        tree_files(&hoard, hoard_desired),
        BTreeMap::from([("/pics/a.jpg".to_owned(), ("h1".to_owned(), 100))])
    );
    assert_eq!(get_branch(&hoard, &p_name, Branch::Current), Some(staged));
    assert_eq!(get_branch(&hoard, &p_name, Branch::Staging), Some(staged));
    assert_eq!(get_branch(&hoard, &p_name, Branch::Desired), hoard_desired);
    assert_eq!(hoard_desired, Some(staged));
}

#[test]
fn scenario_deletion() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let q = make_cave("q", CaveType::Partial, "/", false);
    let (p_name, p_uuid) = (p.root_name(), p.uuid);
    let q_name = q.root_name();
    config.add_cave(p);
    config.add_cave(q);

    let file = blob("h1", 100);
    let tree = build_tree(&hoard, &[("/pics/a.jpg", &file)]);
    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(tree));
    set_branch(&hoard, &p_name, Branch::Current, Some(tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(tree));
    set_branch(&hoard, &q_name, Branch::Current, Some(tree));
    set_branch(&hoard, &q_name, Branch::Desired, Some(tree));

    // The next scan of p no longer sees the file.
    set_branch(&hoard, &p_name, Branch::Staging, None);
    pull(&hoard, &config, &p_uuid, &PullPreferences::for_partial(false, false));

    assert_eq!(get_branch(&hoard, HOARD_ROOT, Branch::Desired), None);
    assert_eq!(get_branch(&hoard, &p_name, Branch::Desired), None);
    assert_eq!(get_branch(&hoard, &q_name, Branch::Desired), None);
    // q still has the file on disk: its status is now a pending cleanup.
    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let mut file_node = CompositeNode::from_roots(&hoard.roots(&tx), &config).expect("roots");
    for component in ["pics", "a.jpg"] {
        file_node = file_node
            .children(&objects)
            .expect("children")
            .into_iter()
            .find(|(name, _)| name == component)
            .map(|(_, child)| child)
            .expect("child exists");
    }
    assert_eq!(
        file_node.presence(),
        BTreeMap::from([(q_name, PresenceStatus::Cleanup)])
    );
}

#[test]
fn scenario_three_copy_convergence() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p1 = make_cave("p1", CaveType::Partial, "/", true);
    let p2 = make_cave("p2", CaveType::Partial, "/", true);
    let b = make_cave("b", CaveType::Backup, "/", false);
    let (p1_name, p1_uuid) = (p1.root_name(), p1.uuid);
    let p2_name = p2.root_name();
    let b_name = b.root_name();
    config.add_cave(p1);
    config.add_cave(p2);
    config.add_cave(b);

    let staged = build_tree(&hoard, &[("/x", &blob("hx", 50))]);
    set_branch(&hoard, &p1_name, Branch::Staging, Some(staged));

    pull(&hoard, &config, &p1_uuid, &PullPreferences::for_partial(false, false));

    let expected = BTreeMap::from([("/x".to_owned(), ("hx".to_owned(), 50))]);
    for name in [&p1_name, &p2_name, &b_name, &HOARD_ROOT.to_owned()] {
        assert_eq!(
            tree_files(&hoard, get_branch(&hoard, name, Branch::Desired)),
            expected,
            "desired of {name}"
        );
    }
    assert_eq!(get_branch(&hoard, &p1_name, Branch::Current), Some(staged));
    assert_eq!(get_branch(&hoard, &p2_name, Branch::Current), None);
    assert_eq!(get_branch(&hoard, &b_name, Branch::Current), None);
}

#[test]
fn scenario_in_place_modification() {
    for assume_current in [false, true] {
        let hoard = TempHoard::new();
        let mut config = HoardConfig::new();
        let p = make_cave("p", CaveType::Partial, "/", true);
        let r = make_cave("r", CaveType::Partial, "/", false);
        let (p_name, p_uuid) = (p.root_name(), p.uuid);
        let r_name = r.root_name();
        config.add_cave(p);
        config.add_cave(r);

        let old = blob("h_old", 10);
        let new = blob("h_new", 12);
        let old_tree = build_tree(&hoard, &[("/doc", &old)]);
        let new_tree = build_tree(&hoard, &[("/doc", &new)]);

        set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(old_tree));
        set_branch(&hoard, &p_name, Branch::Current, Some(old_tree));
        set_branch(&hoard, &p_name, Branch::Desired, Some(old_tree));
        set_branch(&hoard, &r_name, Branch::Current, Some(old_tree));
        set_branch(&hoard, &r_name, Branch::Desired, Some(old_tree));
        set_branch(&hoard, &p_name, Branch::Staging, Some(new_tree));

        pull(
            &hoard,
            &config,
            &p_uuid,
            &PullPreferences::for_partial(assume_current, false),
        );

        let expected = if assume_current {
            BTreeMap::from([("/doc".to_owned(), ("h_new".to_owned(), 12))])
        } else {
            BTreeMap::from([("/doc".to_owned(), ("h_old".to_owned(), 10))])
        };
        assert_eq!(
            tree_files(&hoard, get_branch(&hoard, &p_name, Branch::Desired)),
            expected,
            "assume_current={assume_current}"
        );
        assert_eq!(
            tree_files(&hoard, get_branch(&hoard, &r_name, Branch::Desired)),
            expected
        );
        assert_eq!(
            tree_files(&hoard, get_branch(&hoard, HOARD_ROOT, Branch::Desired)),
            expected
        );
    }
}

#[test]
fn scenario_move_detection() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let q = make_cave("q", CaveType::Partial, "/", false);
    let (p_name, p_uuid) = (p.root_name(), p.uuid);
    let q_name = q.root_name();
    config.add_cave(p);
    config.add_cave(q);

    let file = blob("ha", 33);
    let old_tree = build_tree(&hoard, &[("/old/a", &file)]);
    let new_tree = build_tree(&hoard, &[("/new/a", &file)]);

    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(old_tree));
    set_branch(&hoard, &p_name, Branch::Current, Some(old_tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(old_tree));
    set_branch(&hoard, &q_name, Branch::Current, Some(old_tree));
    set_branch(&hoard, &q_name, Branch::Desired, Some(old_tree));
    set_branch(&hoard, &p_name, Branch::Staging, Some(new_tree));

    let outcome = pull(&hoard, &config, &p_uuid, &PullPreferences::for_partial(false, false));
    let PullOutcome::Completed(outcome) = outcome else {
        panic!("pull did not complete");
    };
    assert_eq!(outcome.moves.len(), 1);
    assert_eq!(outcome.moves[0].old_path.as_posix(), "/old/a");
    assert_eq!(outcome.moves[0].new_path.as_posix(), "/new/a");

    let expected = BTreeMap::from([("/new/a".to_owned(), ("ha".to_owned(), 33))]);
    for name in [&p_name, &q_name, &HOARD_ROOT.to_owned()] {
        assert_eq!(
            tree_files(&hoard, get_branch(&hoard, name, Branch::Desired)),
            expected,
            "desired of {name}"
        );
    }
}

#[test]
fn scenario_gc() {
    let hoard = TempHoard::new();

    let shared = blob("shared", 5);
    let kept_only = blob("kept", 7);
    let doomed_only = blob("doomed", 9);
    let kept_tree = build_tree(&hoard, &[("/s", &shared), ("/k/f", &kept_only)]);
    let doomed_tree = build_tree(&hoard, &[("/s", &shared), ("/d/f", &doomed_only)]);

    set_branch(&hoard, "keeper", Branch::Current, Some(kept_tree));
    set_branch(&hoard, "discard", Branch::Current, Some(doomed_tree));

    // Drop one root from the registry, then collect.
    let tx = hoard.start_transaction();
    hoard.roots(&tx).remove("discard").expect("remove root");
    hoard.commit_transaction(tx).expect("commit");

    let stats = hoard.gc().expect("gc");
    assert!(stats.deleted_objects > 0);

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    assert!(objects.contains(&kept_tree).unwrap());
    assert!(objects.contains(&shared.id()).unwrap());
    assert!(objects.contains(&kept_only.id()).unwrap());
    assert!(!objects.contains(&doomed_tree).unwrap());
    assert!(!objects.contains(&doomed_only.id()).unwrap());
}

#[test]
fn merge_law_reflexivity() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let (p_name, p_uuid) = (p.root_name(), p.uuid);
    config.add_cave(p);

    let tree = build_tree(&hoard, &[("/a", &blob("ha", 1))]);
    let other = build_tree(&hoard, &[("/b", &blob("hb", 2))]);
    set_branch(&hoard, &p_name, Branch::Current, Some(tree));
    set_branch(&hoard, &p_name, Branch::Staging, Some(tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(tree));
    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(other));

    pull(&hoard, &config, &p_uuid, &PullPreferences::for_partial(false, false));

    assert_eq!(get_branch(&hoard, HOARD_ROOT, Branch::Desired), Some(other));
    assert_eq!(get_branch(&hoard, &p_name, Branch::Desired), Some(tree));
}

#[test]
fn merge_law_determinism() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let b = make_cave("b", CaveType::Backup, "/", false);
    let (p_name, p_uuid) = (p.root_name(), p.uuid);
    config.add_cave(p);
    config.add_cave(b);

    let staged = build_tree(
        &hoard,
        &[("/x/one", &blob("h1", 1)), ("/x/two", &blob("h2", 2))],
    );
    set_branch(&hoard, &p_name, Branch::Staging, Some(staged));

    let prefs = PullPreferences::for_partial(false, false);
    let content = crate::content::ContentPrefs::new(&config);

    let run = || -> Vec<(String, ObjectId)> {
        let tx = hoard.start_transaction();
        let objects = hoard.objects(&tx);
        let roots = hoard.roots(&tx);
        let outcome = crate::merge::merge_contents(
            &objects, &roots, &config, &p_uuid, &prefs, &content,
        )
        .expect("merge");
        hoard.commit_transaction(tx).expect("commit");
        outcome
            .desired
            .iter()
            .map(|(name, id)| (name.to_owned(), *id))
            .collect()
    };

    assert_eq!(run(), run());
}

#[test]
fn merge_law_unrelated_paths_commute() {
    let run = |first: &str, second: &str| -> Option<ObjectId> {
        let hoard = TempHoard::new();
        let mut config = HoardConfig::new();
        let p = make_cave("p", CaveType::Partial, "/", true);
        let (p_name, p_uuid) = (p.root_name(), p.uuid);
        config.add_cave(p);
        let prefs = PullPreferences::for_partial(false, false);

        let file_a = blob("hf", 3);
        let file_b = blob("hg", 4);
        let lone = build_tree(&hoard, &[(first, &file_a)]);
        set_branch(&hoard, &p_name, Branch::Staging, Some(lone));
        pull(&hoard, &config, &p_uuid, &prefs);

        let both = build_tree(&hoard, &[(first, &file_a), (second, &file_b)]);
        set_branch(&hoard, &p_name, Branch::Staging, Some(both));
        pull(&hoard, &config, &p_uuid, &prefs);

        get_branch(&hoard, HOARD_ROOT, Branch::Desired)
    };

    // Same final content either way; content addressing makes the roots
    // literally equal.
    let ab = run("/a/f", "/b/g");
    let ba = run("/b/g", "/a/f");
    assert!(ab.is_some());
    assert_eq!(ab, ba);
}

#[test]
fn merge_law_backup_never_changes_hoard() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let b = make_cave("b", CaveType::Backup, "/", false);
    let (b_name, b_uuid) = (b.root_name(), b.uuid);
    let p_name = p.root_name();
    config.add_cave(p);
    config.add_cave(b);

    let old = blob("h_old", 10);
    let hoard_tree = build_tree(&hoard, &[("/doc", &old)]);
    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(hoard_tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(hoard_tree));
    set_branch(&hoard, &b_name, Branch::Current, Some(hoard_tree));
    set_branch(&hoard, &b_name, Branch::Desired, Some(hoard_tree));

    // The backup drifted: /doc modified in place, /stray appeared.
    let drifted = build_tree(
        &hoard,
        &[("/doc", &blob("h_new", 12)), ("/stray", &blob("h_stray", 1))],
    );
    set_branch(&hoard, &b_name, Branch::Staging, Some(drifted));

    pull(&hoard, &config, &b_uuid, &PullPreferences::for_backup());

    // The hoard keeps its version; the backup is told to restore it.
    assert_eq!(
        get_branch(&hoard, HOARD_ROOT, Branch::Desired),
        Some(hoard_tree)
    );
    assert_eq!(
        tree_files(&hoard, get_branch(&hoard, &b_name, Branch::Desired)),
        BTreeMap::from([("/doc".to_owned(), ("h_old".to_owned(), 10))])
    );
}

#[test]
fn incoming_cave_feeds_and_cleans() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let inc = make_cave("inbox", CaveType::Incoming, "/", false);
    let (inc_name, inc_uuid) = (inc.root_name(), inc.uuid);
    let p_name = p.root_name();
    config.add_cave(p);
    config.add_cave(inc);

    let staged = build_tree(&hoard, &[("/drop/new.bin", &blob("hn", 8))]);
    set_branch(&hoard, &inc_name, Branch::Staging, Some(staged));

    pull(&hoard, &config, &inc_uuid, &PullPreferences::for_incoming());

    let expected = BTreeMap::from([("/drop/new.bin".to_owned(), ("hn".to_owned(), 8))]);
    assert_eq!(
        tree_files(&hoard, get_branch(&hoard, HOARD_ROOT, Branch::Desired)),
        expected
    );
    assert_eq!(
        tree_files(&hoard, get_branch(&hoard, &p_name, Branch::Desired)),
        expected
    );
    // The drop box itself does not keep the file.
    assert_eq!(get_branch(&hoard, &inc_name, Branch::Desired), None);
}

#[test]
fn pull_aborts_when_backup_space_runs_low() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let b = make_cave("vault", CaveType::Backup, "/", false);
    let (p_name, p_uuid) = (p.root_name(), p.uuid);
    let b_uuid = b.uuid;
    config.add_cave(p);
    config.add_cave(b);

    let staged = build_tree(&hoard, &[("/big", &blob("hb", 950))]);
    set_branch(&hoard, &p_name, Branch::Staging, Some(staged));

    let capacities = BTreeMap::from([(
        b_uuid,
        BackupCapacity {
            total_bytes: 1000,
            used_bytes: 0,
        },
    )]);
    let outcome = hoard
        .pull(
            &config,
            &p_uuid,
            &PullPreferences::for_partial(false, false),
            &capacities,
        )
        .expect("pull");

    let PullOutcome::InsufficientSpace(message) = outcome else {
        panic!("expected the free-space abort");
    };
    assert!(message.starts_with("Error:"), "got: {message}");
    // Nothing was committed to the roots.
    assert_eq!(get_branch(&hoard, HOARD_ROOT, Branch::Desired), None);
    assert_eq!(get_branch(&hoard, &p_name, Branch::Desired), None);
}

#[test]
fn graft_laws() {
    let hoard = TempHoard::new();
    let file_a = blob("ha", 1);
    let file_b = blob("hb", 2);
    let root = build_tree(&hoard, &[("/x/a", &file_a), ("/y/b", &file_b)]);
    let donor = build_tree(&hoard, &[("/x/a", &file_a), ("/z/c", &blob("hc", 3))]);

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let path = |s: &str| HoardPath::parse(s).components().to_vec();

    // Grafting a subtree onto itself is the identity.
    assert_eq!(
        graft_in_tree(&objects, Some(root), &path("/x"), Some(root)).unwrap(),
        Some(root)
    );

    // Grafting in, then deleting, restores the pre-insertion shape.
    let with_z = graft_in_tree(&objects, Some(root), &path("/z"), Some(donor)).unwrap();
    assert_ne!(with_z, Some(root));
    assert_eq!(
        sub_tree(&objects, with_z, &path("/z/c")).unwrap(),
        Some(blob("hc", 3).id())
    );
    let without_z = remove_child(&objects, with_z, &path("/z")).unwrap();
    assert_eq!(without_z, Some(root));

    // Deleting the only child of /y elides the now-empty folder.
    let without_y = remove_child(&objects, Some(root), &path("/y/b")).unwrap();
    assert_eq!(sub_tree(&objects, without_y, &path("/y")).unwrap(), None);
}

#[test]
fn mktree_round_trips_through_dfs() {
    let hoard = TempHoard::new();
    let files: Vec<(&str, FileBlob)> = vec![
        ("/a/deep/nested/one", blob("h1", 1)),
        ("/a/deep/two", blob("h2", 2)),
        ("/a/three", blob("h3", 3)),
        ("/top", blob("h4", 4)),
    ];
    let refs: Vec<(&str, &FileBlob)> = files.iter().map(|(p, b)| (*p, b)).collect();
    let root = build_tree(&hoard, &refs);

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let mut listed: Vec<(HoardPath, FileBlob)> = Vec::new();
    for entry in TreeDfs::new(&objects, HoardPath::root(), Some(root)) {
        let entry = entry.unwrap();
        if let StoredObject::Blob(blob) = entry.object {
            listed.push((entry.path, blob));
        }
    }
    let rebuilt = mktree_from_sorted_tuples(&objects, listed).unwrap();
    assert_eq!(rebuilt, root);
}

#[test]
fn mktree_rejects_unsorted_input() {
    let hoard = TempHoard::new();
    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let entries = vec![
        (HoardPath::parse("/b"), blob("hb", 1)),
        (HoardPath::parse("/a"), blob("ha", 1)),
    ];
    assert!(matches!(
        mktree_from_sorted_tuples(&objects, entries),
        Err(Error::InvariantViolation(_))
    ));
}

#[test]
fn deferred_queue_flushes_into_branches() {
    let hoard = TempHoard::new();
    let cave = Uuid::new_v4().to_string();

    let kept = blob("keep", 10);
    let replaced = blob("old", 5);
    let replacement = blob("new", 6);

    let initial = build_tree(&hoard, &[("/keep", &kept), ("/swap", &replaced)]);
    set_branch(&hoard, &cave, Branch::Current, Some(initial));

    {
        let tx = hoard.start_transaction();
        let queue = hoard.deferred(&tx);
        let swap = HoardPath::parse("/swap");
        queue
            .queue_add(&cave, Branch::Current, &swap, &replacement)
            .unwrap();
        queue
            .queue_delete(&cave, Branch::Current, &HoardPath::parse("/keep"), &kept)
            .unwrap();
        // Same path queued again: the later item wins.
        queue
            .queue_add(&cave, Branch::Desired, &HoardPath::parse("/d"), &replaced)
            .unwrap();
        queue
            .queue_add(&cave, Branch::Desired, &HoardPath::parse("/d"), &replacement)
            .unwrap();
        hoard.commit_transaction(tx).unwrap();
    }
    assert!(hoard.have_deferred_ops().unwrap());

    hoard.apply_deferred_queue().unwrap();

    assert!(!hoard.have_deferred_ops().unwrap());
    assert_eq!(
        tree_files(&hoard, get_branch(&hoard, &cave, Branch::Current)),
        BTreeMap::from([("/swap".to_owned(), ("new".to_owned(), 6))])
    );
    assert_eq!(
        tree_files(&hoard, get_branch(&hoard, &cave, Branch::Desired)),
        BTreeMap::from([("/d".to_owned(), ("new".to_owned(), 6))])
    );
}

#[test]
fn close_semantics_depend_on_flush_state() {
    let dir = TempDir::new().unwrap();
    let cave = Uuid::new_v4().to_string();

    let hoard = Hoard::open(dir.path()).unwrap();
    {
        let tx = hoard.start_transaction();
        hoard
            .deferred(&tx)
            .queue_add(
                &cave,
                Branch::Desired,
                &HoardPath::parse("/f"),
                &blob("h", 1),
            )
            .unwrap();
        hoard.commit_transaction(tx).unwrap();
    }
    // A writer must not leave queued operations behind.
    assert!(matches!(
        hoard.close(),
        Err(Error::DeferredOpsNotFlushed)
    ));

    // The read path flushes as a safety net instead.
    let hoard = Hoard::open(dir.path()).unwrap();
    hoard.close_readonly().unwrap();

    let hoard = Hoard::open(dir.path()).unwrap();
    assert!(!hoard.have_deferred_ops().unwrap());
    hoard.close().unwrap();
}

#[test]
fn used_size_takes_the_larger_version() {
    let hoard = TempHoard::new();
    let current = build_tree(
        &hoard,
        &[("/a", &blob("h1", 10)), ("/b", &blob("h2", 20))],
    );
    let desired = build_tree(
        &hoard,
        &[("/a", &blob("h1big", 15)), ("/c", &blob("h3", 7))],
    );

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let mut calc = CachedCalc::new(UsedSizeCalc, 128.try_into().unwrap());
    // max(10,15) + 20 + 7
    assert_eq!(
        calc.get(&objects, &(Some(current), Some(desired))).unwrap(),
        42
    );
    // The memo keeps shared subtrees cheap; same query, same answer.
    assert_eq!(
        calc.get(&objects, &(Some(current), Some(desired))).unwrap(),
        42
    );
}

#[test]
fn query_stats_count_sources_and_deletions() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let q = make_cave("q", CaveType::Partial, "/", false);
    let p_name = p.root_name();
    let q_name = q.root_name();
    config.add_cave(p);
    config.add_cave(q);

    let tree = build_tree(&hoard, &[("/f1", &blob("h1", 4)), ("/f2", &blob("h2", 6))]);
    let only_f1 = build_tree(&hoard, &[("/f1", &blob("h1", 4))]);

    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(tree));
    // p has and keeps everything; q has f1 on disk but no longer wants it.
    set_branch(&hoard, &p_name, Branch::Current, Some(tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(tree));
    set_branch(&hoard, &q_name, Branch::Current, Some(only_f1));

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let node = CompositeNode::from_roots(&hoard.roots(&tx), &config).unwrap();
    let mut calc = CachedCalc::new(QueryStatsCalc, 128.try_into().unwrap());
    assert_eq!(
        calc.get(&objects, &node).unwrap(),
        QueryStats::Folder {
            count_non_deleted: 2
        }
    );

    let children = node.children(&objects).unwrap();
    let (_, f1) = children.iter().find(|(name, _)| name == "f1").unwrap();
    assert_eq!(
        calc.get(&objects, f1).unwrap(),
        QueryStats::File {
            is_deleted: false,
            num_sources: 1,
            size: 4
        }
    );
}

#[test]
fn size_count_presence_sums_per_cave() {
    let hoard = TempHoard::new();
    let mut config = HoardConfig::new();
    let p = make_cave("p", CaveType::Partial, "/", true);
    let q = make_cave("q", CaveType::Partial, "/", false);
    let p_name = p.root_name();
    let q_name = q.root_name();
    config.add_cave(p);
    config.add_cave(q);

    let tree = build_tree(&hoard, &[("/f1", &blob("h1", 4)), ("/f2", &blob("h2", 6))]);

    set_branch(&hoard, HOARD_ROOT, Branch::Desired, Some(tree));
    // p holds both files; q is only planned to get them.
    set_branch(&hoard, &p_name, Branch::Current, Some(tree));
    set_branch(&hoard, &p_name, Branch::Desired, Some(tree));
    set_branch(&hoard, &q_name, Branch::Desired, Some(tree));

    let tx = hoard.start_transaction();
    let objects = hoard.objects(&tx);
    let node = CompositeNode::from_roots(&hoard.roots(&tx), &config).unwrap();
    let mut calc = CachedCalc::new(SizeCountPresenceCalc, 128.try_into().unwrap());
    let stats = calc.get(&objects, &node).unwrap();

    let p_available = stats.for_cave(&p_name, PresenceStatus::Available);
    assert_eq!((p_available.nfiles, p_available.size), (2, 10));
    let q_get = stats.for_cave(&q_name, PresenceStatus::Get);
    assert_eq!((q_get.nfiles, q_get.size), (2, 10));
    assert_eq!(stats.for_cave(&q_name, PresenceStatus::Available).nfiles, 0);
    assert_eq!(stats.total_for_cave(&p_name).size, 10);
}

#[test]
fn copy_trees_from_carries_whole_subgraphs() {
    let source = TempHoard::new();
    let target = TempHoard::new();

    let file = blob("h1", 3);
    let root = build_tree(&source, &[("/dir/file", &file)]);

    target.copy_trees_from(&source, &[root]).unwrap();

    let tx = target.start_transaction();
    let objects = target.objects(&tx);
    assert!(objects.contains(&root).unwrap());
    assert!(objects.contains(&file.id()).unwrap());
    assert_eq!(
        tree_files(&target, Some(root)),
        BTreeMap::from([("/dir/file".to_owned(), ("h1".to_owned(), 3))])
    );
}
