//! Startup-path smoke tests for the `nightwatch` binary. These exercise only
//! the fail-fast config/topology loading path; a full run requires a live
//! container runtime and is out of scope for an integration test.

use std::io::Write;
use std::process::Command;

use tempfile::NamedTempFile;

fn write_temp(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn missing_config_file_exits_nonzero() {
    let output = Command::new(env!("CARGO_BIN_EXE_nightwatch"))
        .arg("--config")
        .arg("/nonexistent/nightwatch.toml")
        .output()
        .expect("failed to execute nightwatch binary");

    assert!(
        !output.status.success(),
        "should fail fast when config file is missing"
    );
}

#[test]
fn invalid_config_exits_nonzero() {
    let config = write_temp("this is not valid toml {{{");

    let output = Command::new(env!("CARGO_BIN_EXE_nightwatch"))
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("failed to execute nightwatch binary");

    assert!(
        !output.status.success(),
        "should fail fast on a malformed config file"
    );
}

#[test]
fn valid_config_but_missing_topology_exits_nonzero() {
    let config = write_temp(
        r#"
mode = "observe"
[constraints]
max_actions_per_incident = 3
topology_path = "/nonexistent/docker-compose.yml"
"#,
    );

    let output = Command::new(env!("CARGO_BIN_EXE_nightwatch"))
        .arg("--config")
        .arg(config.path())
        .output()
        .expect("failed to execute nightwatch binary");

    assert!(
        !output.status.success(),
        "should fail fast when the topology file can't be read"
    );
}
