use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_conclave"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(
        output.status.success(),
        "conclave init failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let config_path = dir.path().join(".conclave.toml");
    assert!(config_path.exists(), ".conclave.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[engine]"));
    assert!(content.contains("[reviewers]"));

    // Verify it's valid TOML that conclave-core can parse
    let config: conclave_core::ConclaveConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.engine.max_retries, 3);
    assert!(config.rate_limit.is_none());
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".conclave.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_conclave"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}
