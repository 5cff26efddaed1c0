use std::process::Command;

/// Basic smoke tests for the modbus_dev binary
#[test]
fn test_cli_help() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus_dev"))
        .arg("--help")
        .output()
        .expect("Failed to execute modbus_dev binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("Usage: modbus_dev"));
}

#[test]
fn test_cli_session_json() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus_dev"))
        .args(["--json", "--opens", "2"])
        .env_remove("MODBUS_DEV_LOG_FILE")
        .output()
        .expect("Failed to execute modbus_dev binary");

    assert!(output.status.success());
    let report: serde_json::Value =
        serde_json::from_slice(&output.stdout).expect("report is valid JSON");
    assert_eq!(report["device"]["node"], "modbus_dev0");
    assert_eq!(report["device"]["class"], "modbus_class");
    assert_eq!(report["instances"].as_array().map(Vec::len), Some(2));
    assert_eq!(report["node_removed"], true);
}

#[test]
fn test_cli_injected_failure_exits_nonzero() {
    let output = Command::new(env!("CARGO_BIN_EXE_modbus_dev"))
        .args(["--fail-at", "device_create"])
        .env_remove("MODBUS_DEV_LOG_FILE")
        .output()
        .expect("Failed to execute modbus_dev binary");

    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("failed to create the device"));
}
