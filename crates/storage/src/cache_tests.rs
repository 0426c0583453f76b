// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::hash::hash_bytes;

fn cache() -> (tempfile::TempDir, ChannelCache) {
    let dir = tempfile::tempdir().unwrap();
    let cache = ChannelCache::open(dir.path().join("cache")).unwrap();
    (dir, cache)
}

#[test]
fn open_creates_layout_and_empties_staging() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cache");
    std::fs::create_dir_all(root.join("AgentStagingArea")).unwrap();
    std::fs::write(root.join("AgentStagingArea/leftover"), b"x").unwrap();

    let cache = ChannelCache::open(&root).unwrap();
    let layout = cache.layout();
    assert!(layout.jobs_dir().is_dir());
    assert!(layout.logs_dir().is_dir());
    assert!(!layout.staging_dir().join("leftover").exists());
}

#[test]
fn open_fails_when_root_is_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("cache");
    std::fs::write(&root, b"not a dir").unwrap();
    assert!(matches!(ChannelCache::open(&root), Err(CacheError::Root(..))));
}

#[test]
fn store_channel_indexes_digest_of_content() {
    let (_dir, cache) = cache();
    let hash = cache.store_channel("deps/lib.so", b"library bytes").unwrap();
    assert_eq!(hash, hash_bytes(b"library bytes"));
    assert_eq!(cache.hash("deps/lib.so").unwrap(), hash);
    assert!(cache.contains("deps/lib.so"));
    assert_eq!(cache.read_channel("deps/lib.so").unwrap(), b"library bytes");
}

#[test]
fn add_channel_copies_external_file() {
    let (dir, cache) = cache();
    let source = dir.path().join("worker.bin");
    std::fs::write(&source, b"\x7fELF").unwrap();

    let hash = cache.add_channel(&source, "worker.bin").unwrap();
    assert_eq!(hash, hash_bytes(b"\x7fELF"));
    assert!(source.exists(), "source must be left in place");
    assert!(cache.contains("worker.bin"));
}

#[test]
fn add_channel_missing_source_is_not_found() {
    let (dir, cache) = cache();
    let err = cache.add_channel(&dir.path().join("nope"), "nope").unwrap_err();
    assert!(matches!(err, CacheError::NotFound(_)));
}

#[yare::parameterized(
    same = { b"payload".as_slice(), true },
    different_content = { b"paylOad".as_slice(), false },
    different_length = { b"payload!".as_slice(), false },
)]
fn validate_channel_compares_digests(other: &[u8], expected: bool) {
    let (_dir, cache) = cache();
    cache.store_channel("c", b"payload").unwrap();
    assert_eq!(cache.validate_channel("c", &hash_bytes(other)), expected);
}

#[test]
fn validate_channel_missing_is_false() {
    let (_dir, cache) = cache();
    assert!(!cache.validate_channel("missing", &hash_bytes(b"")));
}

#[test]
fn hash_is_computed_lazily_for_files_not_in_index() {
    let (_dir, cache) = cache();
    let path = cache.channel_path("dropped-in").unwrap();
    std::fs::write(&path, b"external").unwrap();
    assert_eq!(cache.hash_snapshot(), vec![]);
    assert_eq!(cache.hash("dropped-in").unwrap(), hash_bytes(b"external"));
    assert_eq!(cache.hash_snapshot().len(), 1);
}

#[test]
fn validate_all_is_idempotent() {
    let (_dir, cache) = cache();
    cache.store_channel("a", b"1").unwrap();
    cache.store_channel("nested/b", b"2").unwrap();
    std::fs::write(cache.channel_path("c").unwrap(), b"3").unwrap();

    assert_eq!(cache.validate_all().unwrap(), 3);
    let first = cache.hash_snapshot();
    cache.validate_all().unwrap();
    assert_eq!(cache.hash_snapshot(), first);
    assert!(first.iter().any(|(name, _)| name == "nested/b"));
}

#[test]
fn commit_staged_moves_into_place() {
    let (_dir, cache) = cache();
    let staged = cache.staging_path("3-1", "out.bin").unwrap();
    std::fs::write(&staged, b"result").unwrap();

    let hash = cache.commit_staged(&staged, "out.bin").unwrap();
    assert!(!staged.exists());
    assert_eq!(hash, hash_bytes(b"result"));
    assert!(cache.contains("out.bin"));
}

#[test]
fn job_dir_is_recreated_empty() {
    let (_dir, cache) = cache();
    let job = JobGuid::new();
    let dir = cache.create_job_dir(job).unwrap();
    std::fs::write(dir.join("stale"), b"x").unwrap();
    let again = cache.create_job_dir(job).unwrap();
    assert_eq!(dir, again);
    assert!(!again.join("stale").exists());
}

#[test]
fn copy_into_job_uses_original_name() {
    let (_dir, cache) = cache();
    let job = JobGuid::new();
    cache.create_job_dir(job).unwrap();
    cache.store_channel("ab12.bin", b"exe").unwrap();

    let dest = cache.copy_into_job(job, "ab12.bin", "worker").unwrap();
    assert_eq!(dest, cache.job_dir(job).join("worker"));
    assert_eq!(std::fs::read(dest).unwrap(), b"exe");
}

#[test]
fn job_channels_round_trip() {
    let (_dir, cache) = cache();
    let job = JobGuid::new();
    cache.store_job_channel(job, "tile-3.out", b"pixels").unwrap();
    assert_eq!(cache.read_job_channel(job, "tile-3.out").unwrap(), b"pixels");
    assert!(matches!(cache.read_job_channel(job, "missing"), Err(CacheError::NotFound(_))));
}

#[test]
fn clear_keeps_logs() {
    let (_dir, cache) = cache();
    cache.store_channel("a", b"1").unwrap();
    cache.create_job_dir(JobGuid::new()).unwrap();
    let log = cache.layout().logs_dir().join("Agent.log");
    std::fs::write(&log, b"line").unwrap();

    cache.clear().unwrap();
    assert!(!cache.contains("a"));
    assert!(log.exists());
    assert_eq!(cache.stats(), CacheStats::default());
    assert!(cache.layout().staging_dir().is_dir());
}

#[test]
fn relocate_switches_root_and_forgets_hashes() {
    let (dir, cache) = cache();
    cache.store_channel("a", b"1").unwrap();
    let new_root = dir.path().join("elsewhere");

    cache.relocate(&new_root).unwrap();
    assert_eq!(cache.root(), new_root);
    assert!(!cache.contains("a"));
    assert!(cache.hash_snapshot().is_empty());
}

#[yare::parameterized(
    parent = { "../x" },
    absolute = { "/x" },
    reserved = { "Jobs/x" },
)]
fn invalid_names_are_rejected(name: &str) {
    let (_dir, cache) = cache();
    assert!(matches!(cache.store_channel(name, b"x"), Err(CacheError::InvalidName(_))));
    assert!(!cache.contains(name));
}

#[test]
fn cache_errors_map_onto_agent_errors() {
    let (_dir, cache) = cache();
    let missing = cache.read_channel("missing").unwrap_err();
    assert_eq!(AgentError::from(missing), AgentError::ChannelNotFound("missing".to_string()));
    let invalid = cache.channel_path("../x").unwrap_err();
    assert!(matches!(AgentError::from(invalid), AgentError::InvalidArgument(_)));
}
