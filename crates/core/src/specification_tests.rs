// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn job_flags_combine() {
    let flags = JobFlags::ALLOW_REMOTE | JobFlags::MANUAL_START;
    assert!(flags.contains(JobFlags::ALLOW_REMOTE));
    assert!(flags.contains(JobFlags::MANUAL_START));
    assert!(!JobFlags::NONE.contains(JobFlags::ALLOW_REMOTE));
}

#[yare::parameterized(
    only_32 = { true, false, "w32.exe" },
    only_64 = { false, true, "w64.exe" },
    both_prefers_64 = { true, true, "w64.exe" },
)]
fn effective_prefers_64_bit(has32: bool, has64: bool, expected: &str) {
    let specs = JobSpecifications {
        spec32: has32.then(|| JobSpecification::builder().executable("w32.exe").build()),
        spec64: has64.then(|| JobSpecification::builder().executable("w64.exe").build()),
    };
    assert_eq!(specs.effective().map(|s| s.executable.as_str()), Some(expected));
}

#[test]
fn all_channels_lists_executable_first() {
    let spec = JobSpecification::builder()
        .executable("worker.bin")
        .required_dependencies(vec!["lib.so".into()])
        .optional_dependencies(vec!["extra.dat".into()])
        .build();
    let channels: Vec<_> = spec.all_channels().collect();
    assert_eq!(channels, vec![("worker.bin", true), ("lib.so", true), ("extra.dat", false)]);
}

#[test]
fn original_name_falls_back_to_channel_name() {
    let mut names = BTreeMap::new();
    names.insert("ab12cd.bin".to_string(), "worker".to_string());
    let spec = JobSpecification::builder().executable("ab12cd.bin").original_names(names).build();
    assert_eq!(spec.original_name("ab12cd.bin"), "worker");
    assert_eq!(spec.original_name("other.so"), "other.so");
}
