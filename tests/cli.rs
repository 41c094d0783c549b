//! Binary-level checks of the `vbr` command line.

use std::io::Write;
use std::process::Command;

fn vbr() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_vbr"));
    cmd.env_remove("PINECONE_API_KEY")
        .env_remove("HF_TOKEN")
        .env("RUST_LOG", "off");
    cmd
}

#[test]
fn missing_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let output = vbr()
        .args(["--config"])
        .arg(dir.path().join("absent.toml"))
        .arg("stats")
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("absent.toml"), "stderr: {stderr}");
}

#[test]
fn missing_api_key_reports_configuration_kind() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[index]\nname = \"policies\"").unwrap();

    let output = vbr()
        .arg("--config")
        .arg(file.path())
        .args(["search", "flood coverage"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[configuration]"), "stderr: {stderr}");
    assert!(stderr.contains("PINECONE_API_KEY"), "stderr: {stderr}");
}

#[test]
fn empty_query_reports_degenerate_input() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(file, "[index]\nname = \"policies\"").unwrap();

    let output = vbr()
        .arg("--config")
        .arg(file.path())
        .args(["search", "   ", "--json"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error[degenerate_input]"), "stderr: {stderr}");
    let failure: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(failure["error"]["kind"], "degenerate_input");
}

#[test]
fn completions_need_no_config() {
    let output = vbr().args(["completions", "bash"]).output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("vbr"));
}

#[test]
fn malformed_filter_is_rejected_by_parser() {
    let output = vbr()
        .args(["search", "x", "--filter", "no-equals-sign"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("KEY=VALUE"), "stderr: {stderr}");
}
