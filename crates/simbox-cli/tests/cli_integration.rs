//! CLI subprocess integration tests.
//!
//! These tests invoke the `simbox` binary against temporary project trees and
//! only exercise paths that never reach a real container runtime.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

fn simbox_bin() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_simbox"));
    cmd.env_remove("SIMBOX_RUNTIME")
        .env_remove("SIMBOX_CONTEXT_DIR")
        .env_remove("SIMBOX_LOG")
        .env_remove("DISPLAY");
    cmd
}

/// `<tmp>/project/docker` with the volumes root at `<tmp>/docker_volumes`.
fn temp_project() -> (tempfile::TempDir, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let context = dir.path().join("project").join("docker");
    fs::create_dir_all(&context).unwrap();
    (dir, context)
}

/// Forced image runtime with an empty `PATH`, so no real binary is ever spawned.
fn run_apptainer(context: &Path, args: &[&str]) -> Output {
    simbox_bin()
        .env("PATH", "")
        .arg("--runtime")
        .arg("apptainer")
        .arg("--context-dir")
        .arg(context)
        .args(args)
        .output()
        .unwrap()
}

#[test]
fn cli_version_exits_zero() {
    let output = simbox_bin().arg("--version").output().unwrap();
    assert!(output.status.success(), "simbox --version must exit 0");
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("simbox"), "version output: {stdout}");
}

#[test]
fn cli_help_lists_lifecycle_commands() {
    let output = simbox_bin().arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    for command in ["start", "enter", "config", "copy", "hard_stop", "deep_cleanup"] {
        assert!(stdout.contains(command), "help must list '{command}'");
    }
}

#[test]
fn cli_unknown_command_fails() {
    let output = simbox_bin().arg("restart").output().unwrap();
    assert!(!output.status.success());
    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn cli_config_on_image_backend_warns_and_succeeds() {
    let (_dir, context) = temp_project();
    let output = run_apptainer(&context, &["config"]);
    assert!(output.status.success(), "config must exit 0");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("not supported"), "stderr: {stderr}");
}

#[test]
fn cli_enter_before_start_points_at_start() {
    let (_dir, context) = temp_project();
    let output = run_apptainer(&context, &["enter"]);
    assert_eq!(output.status.code(), Some(1));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("isaac-lab-base.sif"), "stderr: {stderr}");
    assert!(stderr.contains("Run 'start' first"), "stderr: {stderr}");
}

#[test]
fn cli_without_runtime_exits_four() {
    let (_dir, context) = temp_project();
    let output = simbox_bin()
        .env("PATH", "")
        .arg("--context-dir")
        .arg(&context)
        .arg("start")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("docker"), "stderr: {stderr}");
}

#[test]
fn cli_unknown_runtime_is_configuration_error() {
    let (_dir, context) = temp_project();
    let output = simbox_bin()
        .args(["--runtime", "podman", "--context-dir"])
        .arg(&context)
        .arg("start")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_missing_context_dir_is_configuration_error() {
    let (dir, _context) = temp_project();
    let output = run_apptainer(&dir.path().join("nope"), &["start"]);
    assert_eq!(output.status.code(), Some(3));
}

#[test]
fn cli_stop_on_image_backend_leaves_no_state_file() {
    let (dir, context) = temp_project();
    let output = run_apptainer(&context, &["stop"]);
    assert!(output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("ephemeral"), "stderr: {stderr}");
    assert!(!dir
        .path()
        .join("docker_volumes/config/.container.cfg")
        .exists());
}

#[test]
fn cli_start_without_build_script_exits_three() {
    let (_dir, context) = temp_project();
    let output = run_apptainer(&context, &["start"]);
    assert_eq!(output.status.code(), Some(3));
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("create_sif.sh"), "stderr: {stderr}");
}

#[test]
fn cli_cleanup_assume_no_keeps_project_outputs() {
    let (dir, context) = temp_project();
    let vol = dir.path().join("docker_volumes");
    fs::create_dir_all(vol.join("cache/pip")).unwrap();
    fs::create_dir_all(vol.join("assets/Assets")).unwrap();
    let logs = dir.path().join("project/logs");
    fs::create_dir_all(&logs).unwrap();

    let output = run_apptainer(&context, &["--assume-no", "cleanup"]);
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(!vol.join("cache").exists());
    assert!(vol.join("assets/Assets").exists());
    assert!(logs.exists());
}

#[test]
fn cli_json_outcome_is_stable() {
    let (_dir, context) = temp_project();
    let output = run_apptainer(&context, &["--json", "copy", "ros"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("\"command\": \"copy\""), "stdout: {stdout}");
    assert!(stdout.contains("\"backend\": \"apptainer\""), "stdout: {stdout}");
    assert!(stdout.contains("\"profile\": \"ros\""), "stdout: {stdout}");
    assert!(stdout.contains("\"warnings\""), "stdout: {stdout}");
    assert!(stdout.contains("\"HEADLESS\": \"1\""), "stdout: {stdout}");
}

#[test]
fn cli_start_without_assets_prints_download_instructions() {
    let (dir, context) = temp_project();
    let images = dir.path().join("hyak_transfer");
    fs::create_dir_all(&images).unwrap();
    fs::write(images.join("isaac-lab-base.sif"), b"sif").unwrap();

    let output = run_apptainer(&context, &["start"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("assets not found"), "stderr: {stderr}");
    assert!(
        stderr.contains("docs.isaacsim.omniverse.nvidia.com"),
        "stderr: {stderr}"
    );
    assert!(stderr.contains("cloud assets"), "stderr: {stderr}");
    assert!(stderr.contains("already exists"), "stderr: {stderr}");
}

#[test]
fn cli_start_with_assets_skips_download_instructions() {
    let (dir, context) = temp_project();
    let images = dir.path().join("hyak_transfer");
    fs::create_dir_all(&images).unwrap();
    fs::write(images.join("isaac-lab-base.sif"), b"sif").unwrap();
    let assets = dir.path().join("docker_volumes/assets/Assets");
    fs::create_dir_all(assets.join("NVIDIA")).unwrap();
    fs::create_dir_all(assets.join("Isaac")).unwrap();

    let output = run_apptainer(&context, &["start"]);
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(output.status.success(), "stderr: {stderr}");
    assert!(stderr.contains("assets found"), "stderr: {stderr}");
    assert!(!stderr.contains("assets not found"), "stderr: {stderr}");
}
