// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use serial_test::serial;

fn force_color() {
    std::env::set_var("COLOR", "1");
    std::env::remove_var("NO_COLOR");
}

#[test]
#[serial]
fn helpers_paint_when_color_forced() {
    force_color();
    let cases: [(fn(&str) -> String, u8); 4] = [
        (header, codes::HEADER),
        (literal, codes::LITERAL),
        (context, codes::CONTEXT),
        (muted, codes::MUTED),
    ];
    for (paint, code) in cases {
        assert_eq!(paint("agent"), format!("\x1b[38;5;{code}magent\x1b[0m"));
    }
}

#[test]
#[serial]
fn helpers_plain_when_no_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::remove_var("COLOR");

    assert_eq!(header("foo"), "foo");
    assert_eq!(literal("bar"), "bar");
    assert_eq!(context("baz"), "baz");
    assert_eq!(muted("dim"), "dim");
}

#[test]
#[serial]
fn no_color_overrides_color() {
    std::env::set_var("NO_COLOR", "1");
    std::env::set_var("COLOR", "1");
    assert!(!should_colorize());
    assert_eq!(format!("{:?}", styles()), format!("{:?}", Styles::plain()));
}

#[test]
#[serial]
fn forced_color_styles_help() {
    force_color();
    assert!(should_colorize());
    assert_ne!(format!("{:?}", styles()), format!("{:?}", Styles::plain()));
}
