//! CLI Integration Tests
//!
//! These tests run the `filedrop` binary end-to-end. Uploads use
//! `--dry-run`, so nothing leaves the machine.

use std::path::{Path, PathBuf};

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// Test Utilities
// ============================================================================

/// Command isolated from the user's config file and environment
fn cli_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("filedrop").expect("Failed to find filedrop binary");
    cmd.arg("--config").arg(dir.path().join("config.json"));
    for var in [
        "FILEDROP_BUCKET",
        "FILEDROP_REGION",
        "FILEDROP_ENDPOINT",
        "FILEDROP_ACCESS_KEY_ID",
        "FILEDROP_SECRET_ACCESS_KEY",
        "FILEDROP_SESSION_TOKEN",
        "FILEDROP_CREDENTIALS_EXPIRE_AT",
        "RUST_LOG",
    ] {
        cmd.env_remove(var);
    }
    cmd
}

fn write_file(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

fn write_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    image::RgbaImage::from_pixel(width, height, image::Rgba([10, 120, 200, 255]))
        .save(&path)
        .unwrap();
    path
}

// ============================================================================
// Upload Command Tests
// ============================================================================

#[test]
fn test_upload_dry_run_prints_url() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "notes.txt", b"hello");

    cli_cmd(&dir)
        .args(["upload", "--bucket", "media", "--path", "docs/", "--dry-run"])
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Uploaded 1 file(s):"))
        .stdout(predicate::str::is_match(r"https://media\.s3\.amazonaws\.com/docs/\d+-notes\.txt").unwrap())
        .stdout(predicate::str::contains("Dry run: 1 upload(s), nothing left this machine"));
}

#[test]
fn test_upload_json_output() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.txt", b"aaa");
    let b = write_file(dir.path(), "b.txt", b"bbbb");

    let output = cli_cmd(&dir)
        .args(["upload", "--bucket", "media", "--multiple", "--dry-run", "--json"])
        .arg(&a)
        .arg(&b)
        .output()
        .unwrap();
    assert!(output.status.success());

    let result: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(result["urls"].as_array().unwrap().len(), 2);
    assert_eq!(result["blobs"][0]["filename"], "a.txt");
    assert_eq!(result["blobs"][1]["size"], 4);
}

#[test]
fn test_upload_multiple_requires_flag() {
    let dir = TempDir::new().unwrap();
    let a = write_file(dir.path(), "a.txt", b"a");
    let b = write_file(dir.path(), "b.txt", b"b");

    cli_cmd(&dir)
        .args(["upload", "--bucket", "media", "--dry-run"])
        .arg(&a)
        .arg(&b)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Multiple file selection is not allowed"));
}

#[test]
fn test_upload_with_crop() {
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "face.png", 400, 300);

    cli_cmd(&dir)
        .args([
            "upload",
            "--bucket",
            "media",
            "--crop",
            "10,10,340,255",
            "--final-size",
            "170x128",
            "--dry-run",
        ])
        .arg(&png)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cropping 400x300 source"))
        .stdout(predicate::str::contains("Uploaded 1 file(s):"))
        .stdout(predicate::str::contains("Dry run: 2 upload(s), nothing left this machine"));
}

#[test]
fn test_upload_crop_enforces_image_constraints() {
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "small.png", 100, 80);

    cli_cmd(&dir)
        .args(["upload", "--bucket", "media", "--crop", "0,0,50,50", "--min-width", "200", "--dry-run"])
        .arg(&png)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Image size is too small (100x80)"));
}

#[test]
fn test_upload_without_credentials_fails() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "notes.txt", b"hello");

    cli_cmd(&dir)
        .args(["upload", "--bucket", "media"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("No session credentials"));
}

#[test]
fn test_upload_rejects_long_lived_keys() {
    let dir = TempDir::new().unwrap();
    let file = write_file(dir.path(), "notes.txt", b"hello");

    cli_cmd(&dir)
        .env("FILEDROP_ACCESS_KEY_ID", "AKIAEXAMPLE")
        .env("FILEDROP_SECRET_ACCESS_KEY", "secret")
        .args(["upload", "--bucket", "media"])
        .arg(&file)
        .assert()
        .failure()
        .stderr(predicate::str::contains("session token"));
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_accepts_matching_files() {
    let dir = TempDir::new().unwrap();
    let csv = write_file(dir.path(), "report.csv", b"a,b\n1,2\n");

    cli_cmd(&dir)
        .args(["validate", "--allowed-type", "csv,txt"])
        .arg(&csv)
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ 1 file(s) pass validation"))
        .stdout(predicate::str::contains("report.csv (text/csv, 8 bytes)"));
}

#[test]
fn test_validate_rejects_extension() {
    let dir = TempDir::new().unwrap();
    let pdf = write_file(dir.path(), "report.pdf", b"%PDF-1.4");

    cli_cmd(&dir)
        .args(["validate", "--allowed-type", "csv,txt"])
        .arg(&pdf)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Selected file extension (pdf) is not allowed. Allowed types are: csv,txt",
        ));
}

#[test]
fn test_validate_rejects_empty_file() {
    let dir = TempDir::new().unwrap();
    let empty = write_file(dir.path(), "empty.txt", b"");

    cli_cmd(&dir)
        .arg("validate")
        .arg(&empty)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Selected file is empty"));
}

#[test]
fn test_validate_image_wildcard() {
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "pic.png", 4, 4);
    let txt = write_file(dir.path(), "notes.txt", b"x");

    cli_cmd(&dir)
        .args(["validate", "--allowed-mime", "image/*"])
        .arg(&png)
        .assert()
        .success();

    cli_cmd(&dir)
        .args(["validate", "--allowed-mime", "image/*"])
        .arg(&txt)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Selected file type (text/plain) is not allowed. Allowed mime types are: image/*"));
}

#[test]
fn test_validate_constraints_need_crop() {
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "pic.png", 4, 4);

    cli_cmd(&dir)
        .args(["validate", "--min-width", "10"])
        .arg(&png)
        .assert()
        .failure()
        .stderr(predicate::str::contains(
            "Can't provide image constraints without setting crop to true.",
        ));
}

// ============================================================================
// Crop Command Tests
// ============================================================================

#[test]
fn test_crop_writes_output() {
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png", 120, 90);
    let output = dir.path().join("out.png");

    cli_cmd(&dir)
        .args(["crop", "--area", "10,10,60,40", "--final-size", "30x20"])
        .arg(&input)
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("Cropped 120x90 → 30x20"));

    let img = image::open(&output).unwrap();
    assert_eq!((img.width(), img.height()), (30, 20));
}

#[test]
fn test_crop_rejects_bad_area() {
    let dir = TempDir::new().unwrap();
    let input = write_png(dir.path(), "in.png", 10, 10);

    cli_cmd(&dir)
        .args(["crop", "--area", "1,2,3"])
        .arg(&input)
        .arg(dir.path().join("out.png"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("must be X,Y,W,H"));
}

// ============================================================================
// Config Command Tests
// ============================================================================

#[test]
fn test_config_show_redacts_secrets() {
    let dir = TempDir::new().unwrap();

    cli_cmd(&dir)
        .env("FILEDROP_BUCKET", "env-bucket")
        .env("FILEDROP_ACCESS_KEY_ID", "ASIAEXAMPLE")
        .env("FILEDROP_SECRET_ACCESS_KEY", "supersecret")
        .env("FILEDROP_SESSION_TOKEN", "sessiontoken")
        .env("FILEDROP_CREDENTIALS_EXPIRE_AT", "2030-01-01T00:00:00Z")
        .args(["config", "show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"bucket\": \"env-bucket\""))
        .stdout(predicate::str::contains("ASIAEXAMPLE"))
        .stdout(predicate::str::contains("supersecret").not())
        .stdout(predicate::str::contains("sessiontoken").not());
}

#[test]
fn test_config_path() {
    let dir = TempDir::new().unwrap();

    cli_cmd(&dir)
        .args(["config", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("config.json"));
}

// ============================================================================
// Logging Tests
// ============================================================================

#[test]
fn test_log_dir_writes_journal() {
    let dir = TempDir::new().unwrap();
    let logs = dir.path().join("logs");
    let file = write_file(dir.path(), "notes.txt", b"hello");

    cli_cmd(&dir)
        .arg("-v")
        .arg("--log-dir")
        .arg(&logs)
        .args(["upload", "--bucket", "media", "--dry-run"])
        .arg(&file)
        .assert()
        .success();

    let journal = std::fs::read_dir(logs.join("raw")).unwrap().count();
    assert_eq!(journal, 1);
    let entries = filedrop_core::logging::read_journal(&logs).unwrap();
    assert!(entries.iter().any(|e| e.msg == "Upload completed"));
}
