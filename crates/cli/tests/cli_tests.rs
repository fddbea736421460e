//! CLI integration tests

use std::process::Command;

fn rbctl() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_rbctl"));
    cmd.env_remove("RBCTL_API_URL");
    cmd
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = rbctl()
        .arg("--help")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("balancer"), "Should describe the tool");
    for command in [
        "nodes",
        "node",
        "containers",
        "transitions",
        "register",
        "decommission",
        "status",
    ] {
        assert!(stdout.contains(command), "Should show {} command", command);
    }
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = rbctl()
        .arg("--version")
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("rbctl"), "Should show binary name");
}

/// Test nodes subcommand help
#[test]
fn test_nodes_help() {
    let output = rbctl()
        .args(["nodes", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--category"), "Should show category filter");
}

/// Test transitions subcommand help
#[test]
fn test_transitions_help() {
    let output = rbctl()
        .args(["transitions", "--help"])
        .output()
        .expect("Failed to execute command");

    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--node"), "Should show node filter");
    assert!(stdout.contains("--limit"), "Should show limit option");
}

/// Test that an unknown output format is rejected
#[test]
fn test_invalid_format() {
    let output = rbctl()
        .args(["--format", "yaml", "nodes"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success(), "Unknown format should fail");
}

/// Test that decommission requires a node ID
#[test]
fn test_decommission_requires_id() {
    let output = rbctl()
        .arg("decommission")
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
}

/// Test that an unreachable engine produces an error exit
#[test]
fn test_unreachable_engine() {
    let output = rbctl()
        .args(["--api-url", "http://127.0.0.1:9", "nodes"])
        .output()
        .expect("Failed to execute command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to send request"));
}
