// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::collections::HashMap;

#[test]
fn guid_display_is_simple_hex() {
    let guid = JobGuid::from_u128(0x0000_0123_0000_4567_0000_89ab_0000_cdef);
    assert_eq!(guid.to_string(), "0000012300004567000089ab0000cdef");
}

#[test]
fn guid_serializes_as_plain_string() {
    let guid = TaskGuid::new();
    let json = serde_json::to_string(&guid).unwrap();
    assert_eq!(json, format!("\"{}\"", guid.0.hyphenated()));
    let back: TaskGuid = serde_json::from_str(&json).unwrap();
    assert_eq!(back, guid);
}

#[test]
fn guid_parse_round_trips_display_forms() {
    let guid = JobGuid::new();
    assert_eq!(JobGuid::parse(&guid.to_string()), Some(guid));
    assert_eq!(JobGuid::parse("not-a-guid"), None);
}

#[test]
fn guid_default_is_nil() {
    assert!(JobGuid::default().is_nil());
    assert!(!JobGuid::new().is_nil());
}

#[test]
fn guid_hash_map_lookup() {
    let mut map = HashMap::new();
    let guid = TaskGuid::new();
    map.insert(guid, 42);
    assert_eq!(map.get(&guid), Some(&42));
}

#[yare::parameterized(
    zero = { 0, true },
    positive = { 17, true },
    negative = { -1, false },
)]
fn handle_validity(raw: i32, valid: bool) {
    assert_eq!(Handle(raw).is_valid(), valid);
}

#[test]
fn short_truncates() {
    assert_eq!(short("abcdefghijklmnop", 8), "abcdefgh");
    assert_eq!(short("abc", 8), "abc");
}
