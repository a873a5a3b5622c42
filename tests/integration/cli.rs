// SPDX-License-Identifier: Apache-2.0 OR MIT
//! CLI smoke tests for the utility subcommands of `aimfd`.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn aimfd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_aimfd"))
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_encode_and_decode_time() {
    let output = aimfd().args(["encode-time", "6"]).output().unwrap();
    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).starts_with("0x86"));

    let output = aimfd().args(["decode-time", "0x05"]).output().unwrap();
    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "2s");
}

#[test]
fn test_check_config_accepts_valid_file() {
    let file = config_file(
        r#"{
            // JSON5 comments are allowed
            protocol: { willingness: 4, tie_break: "lowest-address" },
            associations: [{ group: "225.1.2.4", source: "10.1.1.2" }],
            routes: [{ destination: "10.0.0.2", interface: "wlan0" }],
        }"#,
    );
    let output = aimfd()
        .args(["check-config", "--config"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(String::from_utf8_lossy(&output.stdout).contains("1 associations, 1 routes"));
}

#[test]
fn test_check_config_rejects_bad_willingness() {
    let file = config_file("{ protocol: { willingness: 9 } }");
    let output = aimfd()
        .args(["check-config", "--config"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}

#[test]
fn test_default_config_round_trips_through_check() {
    let output = aimfd().arg("default-config").output().unwrap();
    assert!(output.status.success());

    let file = config_file(&String::from_utf8_lossy(&output.stdout));
    let output = aimfd()
        .args(["check-config", "-c"])
        .arg(file.path())
        .output()
        .unwrap();
    assert!(output.status.success());
}
