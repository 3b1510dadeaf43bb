//! CLI integration tests

use std::process::{Command, Output};

fn fluxctl(args: &[&str]) -> Output {
    Command::new("cargo")
        .args(["run", "-q", "-p", "fluxctl", "--"])
        .args(args)
        .env_remove("FLUXBIND_NRI_ENV_PREFIX")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = fluxctl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("fluxbind"), "Should show app description");
    assert!(stdout.contains("decode"), "Should show decode command");
    assert!(stdout.contains("adjust"), "Should show adjust command");
}

#[test]
fn test_cli_version() {
    let output = fluxctl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("fluxctl"), "Should show binary name");
}

#[test]
fn test_decode_json() {
    let output = fluxctl(&["decode", "0x8001", "--reverse", "--format", "json"]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["cpu_list"], "0,15");
    assert_eq!(json["cpus"], serde_json::json!([15, 0]));
    assert_eq!(json["reversed"], true);
}

#[test]
fn test_decode_rejects_missing_prefix() {
    let output = fluxctl(&["decode", "ff"]);
    let stderr = String::from_utf8_lossy(&output.stderr);

    assert!(!output.status.success(), "Unprefixed mask should fail");
    assert!(stderr.contains("ff"), "Should name the bad mask");
}

#[test]
fn test_adjust_json() {
    let output = fluxctl(&[
        "adjust",
        "--env",
        "FLUXBIND_CPUSET=0x30",
        "--env",
        "PATH=/usr/bin",
        "-f",
        "json",
    ]);
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["outcome"], "applied");
    assert_eq!(json["adjustment"]["linux"]["resources"]["cpu"]["cpus"], "4-5");
}

#[test]
fn test_adjust_rejects_malformed_entry() {
    let output = fluxctl(&["adjust", "--env", "NOEQUALS"]);
    assert!(!output.status.success());
}
