// Manifest tests: table keys survive a restart through the manifest

mod common;

use common::*;
use sealtable::env::FsTableStore;
use sealtable::iterator::DbIterator;
use sealtable::manifest::{dump_manifest, ManifestState, ManifestWriter, VersionEdit};
use sealtable::{build_table, Options, ReadOptions, TableCache};
use std::sync::Arc;
use tempfile::TempDir;

#[test]
fn test_tables_readable_after_recovery() {
    init_logging();
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("MANIFEST-000001");
    let options = Options::default().block_size(256);
    let entries = numbered_entries(400);

    {
        let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
        let cache = TableCache::new(store.clone(), options.clone());
        let mut manifest = ManifestWriter::create(&manifest_path).unwrap();

        let (first, second) = entries.split_at(200);
        for (number, part) in [(2u64, first), (3u64, second)] {
            let meta = build_table(store.as_ref(), &options, &cache, &mut input(part), number, &mut rand::rng())
                .unwrap()
                .unwrap();
            manifest.log_edit(&VersionEdit::AddFile { level: 0, meta }).unwrap();
        }
        manifest.log_edit(&VersionEdit::SetNextFileNumber(4)).unwrap();
        manifest.close().unwrap();
    }

    // Fresh store and cache, as after a restart
    let state = ManifestState::recover(&manifest_path).unwrap();
    assert_eq!(state.num_files(), 2);
    assert_eq!(state.next_file_number, 4);

    let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
    let cache = TableCache::new(store, options);
    let mut scanned = Vec::new();
    for meta in state.levels[&0].values() {
        let mut iter = cache.new_iterator(ReadOptions::default(), meta);
        iter.seek_to_first();
        scanned.extend(collect(&mut iter));
        assert!(iter.status().is_ok());
    }
    assert_eq!(scanned, entries);
}

#[test]
fn test_lost_key_leaves_table_unreadable() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
    let options = Options::default();
    let cache = TableCache::new(store.clone(), options.clone());

    let meta = build_table(store.as_ref(), &options, &cache, &mut input(&numbered_entries(50)), 1, &mut rand::rng())
        .unwrap()
        .unwrap();

    let mut forged = meta.clone();
    forged.key = test_key(0);
    cache.evict(1);

    let mut iter = cache.new_iterator(ReadOptions::default(), &forged);
    iter.seek_to_first();
    assert!(!iter.valid());
    assert!(iter.status().unwrap_err().is_corruption());
    assert!(cache.get(&ReadOptions::default(), &forged, b"key000001").unwrap_err().is_corruption());
}

#[test]
fn test_dump_lists_edits_without_keys() {
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("MANIFEST");
    let store = Arc::new(FsTableStore::new(dir.path()).unwrap());
    let options = Options::default();
    let cache = TableCache::new(store.clone(), options.clone());

    let meta = build_table(store.as_ref(), &options, &cache, &mut input(&numbered_entries(10)), 5, &mut rand::rng())
        .unwrap()
        .unwrap();
    let mut manifest = ManifestWriter::create(&manifest_path).unwrap();
    manifest.log_edit(&VersionEdit::AddFile { level: 1, meta: meta.clone() }).unwrap();
    manifest.log_edit(&VersionEdit::DeleteFile { level: 1, file_number: 5 }).unwrap();
    manifest.close().unwrap();

    let mut out = Vec::new();
    assert_eq!(dump_manifest(&manifest_path, &mut out).unwrap(), 2);
    let text = String::from_utf8(out).unwrap();
    assert!(text.starts_with("#1 AddFile level=1 file=5"));
    assert!(text.contains("smallest=key000000 largest=key000009 key=<32 bytes>"));
    assert!(text.contains("#2 DeleteFile level=1 file=5"));

    let key_hex: String = meta.key.as_bytes().iter().map(|b| format!("{:02x}", b)).collect();
    assert!(!text.contains(&key_hex));
}

#[test]
fn test_truncated_manifest_keeps_complete_edits() {
    let dir = TempDir::new().unwrap();
    let manifest_path = dir.path().join("MANIFEST");

    let mut manifest = ManifestWriter::create(&manifest_path).unwrap();
    manifest.log_edit(&VersionEdit::SetLogNumber(7)).unwrap();
    manifest.log_edit(&VersionEdit::SetLastSequence(1234)).unwrap();
    manifest.close().unwrap();

    // Chop the tail of the last record, as an interrupted append would
    let len = std::fs::metadata(&manifest_path).unwrap().len();
    let file = std::fs::OpenOptions::new().write(true).open(&manifest_path).unwrap();
    file.set_len(len - 3).unwrap();

    let state = ManifestState::recover(&manifest_path).unwrap();
    assert_eq!(state.log_number, 7);
    assert_eq!(state.last_sequence, 0);
}
