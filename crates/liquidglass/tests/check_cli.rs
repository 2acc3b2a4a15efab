use std::fs;
use std::process::Command;

use tempfile::TempDir;

const PAGE: &str = r##"
[viewport]
width = 480.0
height = 320.0

[[stylesheets]]
css = ".panel { border-radius: 18px; background-color: oklch(0.8 0.05 240 / 0.4) }"

[body]
id = "app"
style = { background-color = "#0b1622" }

[[body.children]]
class = ["panel"]
glass = true
rect = { x = 40.0, y = 40.0, width = 200.0, height = 120.0 }

[[body.children]]
tag = "p"
text = "Behind the glass"
rect = { x = 40.0, y = 200.0, width = 300.0, height = 24.0 }
"##;

const CONFIG: &str = r##"
version = 1

[renderer]
capture_target = "#app"
resize_debounce = "100ms"

[presets.".panel"]
tilt = true
"##;

fn write_inputs(root: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
    let page = root.join("page.toml");
    let config = root.join("glass.toml");
    fs::write(&page, PAGE).unwrap();
    fs::write(&config, CONFIG).unwrap();
    (page, config)
}

#[test]
fn check_reports_resolved_lenses_as_json() {
    let root = TempDir::new().unwrap();
    let (page, config) = write_inputs(root.path());

    let output = Command::new(env!("CARGO_BIN_EXE_liquidglass"))
        .env_remove("LIQUIDGLASS_CONFIG")
        .env("RUST_LOG", "warn")
        .arg("check")
        .arg(&page)
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .output()
        .expect("failed to run liquidglass check");

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["capture_target"], "#app");
    let lenses = report["lenses"].as_array().unwrap();
    assert_eq!(lenses.len(), 1);
    assert_eq!(lenses[0]["tilt"], true);
    assert_eq!(lenses[0]["reveal"], "fade");
}

#[test]
fn check_rejects_missing_capture_target() {
    let root = TempDir::new().unwrap();
    let (page, _) = write_inputs(root.path());
    let config = root.path().join("bad.toml");
    fs::write(&config, "version = 1\n[renderer]\ncapture_target = \"#nowhere\"\n").unwrap();

    let status = Command::new(env!("CARGO_BIN_EXE_liquidglass"))
        .env_remove("LIQUIDGLASS_CONFIG")
        .env("RUST_LOG", "off")
        .arg("check")
        .arg(&page)
        .arg("--config")
        .arg(&config)
        .status()
        .expect("failed to run liquidglass check");

    assert!(!status.success());
}

#[test]
fn check_rejects_unsupported_config_version() {
    let root = TempDir::new().unwrap();
    let (page, _) = write_inputs(root.path());
    let config = root.path().join("future.toml");
    fs::write(&config, "version = 2\n").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_liquidglass"))
        .env_remove("LIQUIDGLASS_CONFIG")
        .env("RUST_LOG", "off")
        .args(["check"])
        .arg(&page)
        .arg("--config")
        .arg(&config)
        .output()
        .expect("failed to run liquidglass check");

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("unsupported config version"));
}
