//! End-to-end checks of the `pydeck` binary surface: argument parsing,
//! offline subcommands, and failure exit codes.  Anything needing a board is
//! covered by the protocol-level tests in the library crates.

use std::process::Command;

fn pydeck() -> Command {
    Command::new(env!("CARGO_BIN_EXE_pydeck"))
}

#[test]
fn test_help_lists_subcommands() {
    let output = pydeck().arg("--help").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8_lossy(&output.stdout);
    for subcommand in ["ports", "exec", "sync", "doctor", "clock"] {
        assert!(text.contains(subcommand), "missing '{}' in help", subcommand);
    }
}

#[test]
fn test_ports_runs_without_hardware() {
    let output = pydeck().arg("ports").output().unwrap();
    assert!(output.status.success());
}

#[test]
fn test_ports_json_is_valid() {
    let output = pydeck().args(["ports", "--json"]).output().unwrap();
    assert!(output.status.success());
    let parsed: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("ports --json must emit JSON");
    assert!(parsed.is_array());
}

#[test]
fn test_missing_board_is_a_clean_error() {
    // No board attached and no port given: the command must fail with a
    // message, not hang.
    let output = pydeck()
        .args(["--port", "/dev/ttyNOSUCH0", "--timeout-ms", "200", "exec", "print(1)"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(!output.stderr.is_empty());
}

#[test]
fn test_config_file_is_read() {
    let dir = tempfile::tempdir().unwrap();
    let config = dir.path().join("pydeck.toml");
    std::fs::write(&config, "[serial]\nread_timeout_ms = 500\n").unwrap();

    let output = pydeck()
        .args(["--config", config.to_str().unwrap(), "ports"])
        .output()
        .unwrap();
    assert!(output.status.success());
}

#[test]
fn test_mounted_sync_works_offline() {
    let dir = tempfile::tempdir().unwrap();
    let local = dir.path().join("src");
    std::fs::create_dir(&local).unwrap();
    std::fs::write(local.join("main.py"), "print('hi')\n").unwrap();
    let volume = dir.path().join("volume");
    std::fs::create_dir(&volume).unwrap();

    let output = pydeck()
        .args([
            "sync",
            local.to_str().unwrap(),
            volume.to_str().unwrap(),
            "--mounted",
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        std::fs::read(volume.join("main.py")).unwrap(),
        b"print('hi')\n"
    );
}
