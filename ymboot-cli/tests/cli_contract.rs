//! Integration tests for core CLI contract behavior.

use {predicates::prelude::*, std::fs, tempfile::tempdir};

const MISSING_PORT: &str = "/dev/ymboot-no-such-port";

fn cli_cmd() -> assert_cmd::Command {
    let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("ymboot");
    cmd.env_remove("YMBOOT_PORT")
        .env_remove("YMBOOT_BAUD")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ymboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn short_help_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("-h")
        .assert()
        .success()
        .stdout(predicate::str::contains("receive"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn version_exits_zero_and_writes_stdout_only() {
    let mut cmd = cli_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ymboot"))
        .stderr(predicate::str::is_empty());
}

#[test]
fn subcommand_help_lists_options() {
    let mut cmd = cli_cmd();
    cmd.args(["receive", "--help"])
        .assert()
        .success()
        .stdout(
            predicate::str::contains("--output")
                .and(predicate::str::contains("--capacity"))
                .and(predicate::str::contains("--checksum")),
        );
}

#[test]
fn list_ports_json_returns_valid_json() {
    let mut cmd = cli_cmd();
    let output = cmd
        .args(["list-ports", "--json"])
        .output()
        .expect("command should execute");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let parsed: serde_json::Value =
        serde_json::from_str(&stdout).expect("stdout should be JSON");
    assert!(parsed.is_array(), "should be a JSON array");
}

#[test]
fn completions_command_writes_to_stdout() {
    let mut cmd = cli_cmd();
    cmd.args(["completions", "bash"])
        .assert()
        .success()
        .code(0)
        .stderr(predicate::str::is_empty())
        .stdout(predicate::str::contains("_ymboot()"));
}

// ============================================================================
// Exit Code Tests
// ============================================================================

#[test]
fn exit_code_two_for_unknown_command() {
    let mut cmd = cli_cmd();
    cmd.arg("unknown-command-xyz")
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("unrecognized").or(predicate::str::contains("unknown")));
}

#[test]
fn exit_code_two_for_invalid_flag() {
    let mut cmd = cli_cmd();
    cmd.arg("--invalid-flag-xyz")
        .assert()
        .failure()
        .code(2);
}

#[test]
fn exit_code_two_for_missing_output() {
    let mut cmd = cli_cmd();
    cmd.arg("receive")
        .assert()
        .failure()
        .code(2)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("--output"));
}

#[test]
fn exit_code_two_for_malformed_capacity() {
    let mut cmd = cli_cmd();
    cmd.args(["receive", "-o", "out.bin", "--capacity", "12q"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("invalid size"));
}

#[test]
fn exit_code_two_for_region_past_address_space() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "receive", "-o", "out.bin"])
        .args(["--base", "0xFFFF0000", "--capacity", "1M"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("address space"));
}

#[test]
fn exit_code_two_for_capacity_over_host_limit() {
    let dir = tempdir().expect("tempdir should be created");
    let output = dir
        .path()
        .join("out.bin");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "receive", "-o"])
        .arg(&output)
        .args(["--base", "0", "--capacity", "0xFFFFFFFF"])
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("limit").and(predicate::str::contains(MISSING_PORT).not()));
    assert!(!output.exists());
}

#[test]
fn exit_code_two_for_oversized_file_name() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir
        .path()
        .join("app.bin");
    fs::write(&image, [0u8; 16]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "send"])
        .arg(&image)
        .arg("--name")
        .arg("n".repeat(64))
        .assert()
        .failure()
        .code(2)
        .stderr(predicate::str::contains("file name"));
}

#[test]
fn exit_code_one_for_missing_send_file() {
    let dir = tempdir().expect("tempdir should be created");
    let nonexistent = dir
        .path()
        .join("does_not_exist.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("send")
        .arg(&nonexistent)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("Error").and(predicate::str::contains("Failed to read")));
}

#[test]
fn exit_code_one_when_port_cannot_open() {
    let dir = tempdir().expect("tempdir should be created");
    let image = dir
        .path()
        .join("app.bin");
    fs::write(&image, [0xA5u8; 300]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .env("YMBOOT_PORT", MISSING_PORT)
        .arg("send")
        .arg(&image)
        .assert()
        .failure()
        .code(1)
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains(MISSING_PORT));
}

#[test]
fn receive_on_missing_port_writes_nothing() {
    let dir = tempdir().expect("tempdir should be created");
    let output = dir
        .path()
        .join("received.bin");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["-p", MISSING_PORT, "receive", "-o"])
        .arg(&output)
        .assert()
        .failure()
        .stdout(predicate::str::is_empty());
    assert!(!output.exists());
}

// ============================================================================
// Configuration
// ============================================================================

#[test]
fn invalid_config_file_warns_and_continues() {
    let dir = tempdir().expect("tempdir should be created");
    fs::write(
        dir.path()
            .join("ymboot.toml"),
        "invalid toml [[[",
    )
    .expect("write invalid config");

    let output = cli_cmd()
        .current_dir(dir.path())
        .arg("list-ports")
        .output()
        .expect("command should execute");
    assert!(
        output
            .status
            .success(),
        "command should succeed despite config warning"
    );
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("TOML"), "should warn about invalid TOML");
}

#[test]
fn config_port_is_used_when_flag_absent() {
    let dir = tempdir().expect("tempdir should be created");
    let config = dir
        .path()
        .join("custom.toml");
    fs::write(&config, format!("[port]\nserial = \"{MISSING_PORT}\"\n")).expect("write config");
    let image = dir
        .path()
        .join("app.bin");
    fs::write(&image, [1u8; 10]).expect("write image");

    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&config)
        .arg("send")
        .arg(&image)
        .assert()
        .failure()
        .stderr(predicate::str::contains(MISSING_PORT));
}

// ============================================================================
// Suggestions and option terminator
// ============================================================================

#[test]
fn unknown_command_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("recieve")
        .assert()
        .failure()
        .stderr(predicate::str::contains("receive"));
}

#[test]
fn unknown_flag_suggests_similar() {
    let mut cmd = cli_cmd();
    cmd.arg("list-ports")
        .arg("--jason")
        .assert()
        .failure()
        .stderr(predicate::str::contains("json"));
}

#[test]
fn option_terminator_allows_dash_prefixed_operand() {
    let dir = tempdir().expect("tempdir should be created");
    let mut cmd = cli_cmd();
    cmd.current_dir(dir.path())
        .args(["send", "--", "-image.bin"])
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("-image.bin"));
}
