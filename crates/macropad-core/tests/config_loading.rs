//! Integration tests for loading a complete config through the public API.
//!
//! These tests parse realistic config documents, resolve the behaviour flags
//! and walk the resulting macro table the way the daemon does at runtime.

use std::collections::HashSet;

use macropad_core::{
    Action, ComboStep, CommandSpec, Config, ConfigError, FlagOverrides, HeldKeys, KeyId,
};

const MEDIA_PAD: &str = r#"{
    "dev_name": "USB Keypad",
    "full_grab": false,
    "mapping": { "G1": 183, "G2": 184, "PAD_ENTER": 96 },
    "layers": [
        ["base",  ["G1"]],
        ["media", ["G2"], ["notify-send", "media layer"]]
    ],
    "macros": {
        "__default__": [
            ["swallow-esc", [1], "dispose"],
            ["launch-term", ["PAD_ENTER"], "cmd", ["alacritty"]]
        ],
        "base": [
            ["copy",  ["KEY_LEFTCTRL", "KEY_C"], "key", [46]],
            ["hello", [35], "keylist", ["KEY_H", "KEY_E", "KEY_L", "KEY_L", "KEY_O"]]
        ],
        "media": [
            ["play",   [30], "key", ["KEY_PLAYPAUSE"]],
            ["vol",    [48], "button", { "1": "KEY_VOLUMEUP", "2": "KEY_VOLUMEUP" }],
            ["esc-up", [1], "keycomb", [29, 0.05, [1], -29]]
        ]
    }
}"#;

fn held(codes: &[u16]) -> HeldKeys {
    codes.iter().map(|&c| KeyId(c)).collect()
}

#[test]
fn test_media_pad_config_builds_two_layers() {
    // Act
    let cfg = Config::from_json_str(MEDIA_PAD, &FlagOverrides::default())
        .expect("config must load");

    // Assert
    assert_eq!(cfg.device.as_deref(), Some("USB Keypad"));
    assert!(!cfg.flags.full_grab);
    assert!(!cfg.flags.only_defined);
    assert!(cfg.flags.clone_capabilities);

    let names: Vec<&str> = cfg.table.layers().iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["base", "media"]);
    assert_eq!(
        cfg.table.layer(1).entry_command,
        Some(CommandSpec::Argv(vec!["notify-send".into(), "media layer".into()]))
    );
}

#[test]
fn test_defaults_are_merged_after_layer_macros() {
    let cfg = Config::from_json_str(MEDIA_PAD, &FlagOverrides::default()).unwrap();

    let base: Vec<&str> = cfg.table.layer(0).macros.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(base, vec!["copy", "hello", "swallow-esc", "launch-term"]);

    // "media" binds [1] itself, so the default dispose on [1] is not merged.
    let media: Vec<&str> = cfg.table.layer(1).macros.iter().map(|m| m.name.as_str()).collect();
    assert_eq!(media, vec!["play", "vol", "esc-up", "launch-term"]);
}

#[test]
fn test_layer_switch_and_macro_lookup_follow_held_keys() {
    let cfg = Config::from_json_str(MEDIA_PAD, &FlagOverrides::default()).unwrap();

    assert_eq!(cfg.table.match_switch(&held(&[184])), Some(1));

    let base = cfg.table.layer(0);
    let copy = base.match_held(&held(&[29, 46])).expect("copy must match");
    assert_eq!(copy.action, Action::KeyTap(KeyId(46)));
    assert!(base.match_held(&held(&[46])).is_none());

    let media = cfg.table.layer(1);
    assert!(
        media.match_held(&held(&[48])).is_none(),
        "button macros only match on the single event code"
    );
    assert_eq!(media.match_single(KeyId(48)).unwrap().name, "vol");
    assert_eq!(
        media.match_held(&held(&[1])).unwrap().action,
        Action::KeyCombo(vec![
            ComboStep::Down(KeyId(29)),
            ComboStep::Sleep(std::time::Duration::from_millis(50)),
            ComboStep::Tap(vec![KeyId(1)]),
            ComboStep::Up(KeyId(29)),
        ])
    );
}

#[test]
fn test_output_keys_cover_every_emitting_macro() {
    let cfg = Config::from_json_str(MEDIA_PAD, &FlagOverrides::default()).unwrap();

    let out: HashSet<KeyId> = cfg.table.output_keys().into_iter().collect();

    for code in [46, 35, 18, 38, 24, 164, 115, 29, 1] {
        assert!(out.contains(&KeyId(code)), "missing output key {code}");
    }
    assert!(!out.contains(&KeyId(96)), "commands emit no keys");
}

#[test]
fn test_cli_flags_override_file_flags() {
    let cli = FlagOverrides {
        full_grab: Some(true),
        only_defined: Some(true),
        clone: Some(false),
    };

    let cfg = Config::from_json_str(MEDIA_PAD, &cli).unwrap();

    assert!(cfg.flags.full_grab);
    assert!(cfg.flags.only_defined);
    assert!(!cfg.flags.clone_capabilities);
}

#[test]
fn test_config_without_device_or_macros_is_valid() {
    let cfg = Config::from_json_str(r#"{"layers": [["only", [2]]]}"#, &FlagOverrides::default())
        .unwrap();

    assert!(cfg.device.is_none());
    assert!(cfg.table.layer(0).macros.is_empty());
}

#[test]
fn test_invalid_configs_report_the_offending_declaration() {
    let cases = [
        (r#"{"layers": []}"#, "no layers"),
        (r#"{"layers": [["a", [1]], ["a", [2]]]}"#, "more than once"),
        (r#"{"layers": [["a", [1]]], "macros": {"b": []}}"#, "undeclared layer"),
        (
            r#"{"layers": [["a", [1]]], "macros": {"a": [["m", [2], "teleport", 1]]}}"#,
            "unknown action type",
        ),
        (r#"{"layers": [["a", ["KEY_NOPE"]]]}"#, "KEY_NOPE"),
    ];

    for (text, fragment) in cases {
        let err = Config::from_json_str(text, &FlagOverrides::default())
            .expect_err("config must be rejected");
        assert!(
            err.to_string().contains(fragment),
            "error {err:?} for {text} should mention {fragment:?}"
        );
    }
}

#[test]
fn test_non_json_text_is_a_parse_error() {
    let err = Config::from_json_str("layers = []", &FlagOverrides::default()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(_)));
}

#[test]
fn test_oversized_keycomb_pause_is_a_config_error() {
    let text = r#"{
        "layers": [["base", [183]]],
        "macros": {"base": [["stall", [30], "keycomb", [30, 1e20, -30]]]}
    }"#;

    let err = Config::from_json_str(text, &FlagOverrides::default()).unwrap_err();

    assert!(
        matches!(&err, ConfigError::MalformedMacro { layer, index: 0, .. } if layer == "base"),
        "{err:?}"
    );
    assert!(err.to_string().contains("invalid pause"));
}
