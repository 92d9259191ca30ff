use std::fs;
use std::path::Path;

use assert_cmd::Command;
use image::{Rgb, RgbImage};
use tempfile::tempdir;

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let path = dir.join("dataset.yaml");
    let yaml = format!(
        "data:\n  path_to_data_dir: {root}\n  path_prefix: {root}\n  num_frames: 2\n  sampling_rate: 1\n  train_jitter_scales: [8, 8]\n  train_crop_size: 8\n  test_crop_size: 8\ndata_loader:\n  seed: 3\n  num_retries: 4\nmodel:\n  arch: slow\nannotations:\n  enabled: false\n{extra}",
        root = dir.display()
    );
    fs::write(&path, yaml).expect("failed to write config");
    path
}

fn write_frames(dir: &Path) {
    fs::create_dir_all(dir).unwrap();
    for n in 0..6 {
        let frame = RgbImage::from_fn(12, 8, |x, _| Rgb([(x * 20) as u8, n * 40, 0]));
        frame.save(dir.join(format!("{n:04}.png"))).unwrap();
    }
}

#[test]
fn validate_accepts_consistent_config() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("train.csv"), "clip,1\n").unwrap();
    let config = write_config(temp.path(), "");

    Command::cargo_bin("clip-dataset")
        .expect("binary present")
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .success();
}

#[test]
fn validate_rejects_jittering_train_scales() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("bad.yaml");
    fs::write(&config, "data:\n  train_jitter_scales: [256, 320]\n").unwrap();

    Command::cargo_bin("clip-dataset")
        .expect("binary present")
        .args(["validate", config.to_str().unwrap()])
        .assert()
        .failure();
}

#[test]
fn params_splits_test_index() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "test:\n  num_spatial_crops: 3\n");

    let output = Command::cargo_bin("clip-dataset")
        .expect("binary present")
        .args([
            "params",
            config.to_str().unwrap(),
            "--mode",
            "test",
            "--spatial-temporal-index",
            "5",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value["temporal_index"], 1);
    assert_eq!(value["spatial_index"], 2);
}

#[test]
fn fetch_prints_shapes_and_writes_metrics() {
    let temp = tempdir().unwrap();
    write_frames(&temp.path().join("clip"));
    fs::write(temp.path().join("train.csv"), "clip,4\n").unwrap();
    let config = write_config(temp.path(), "");
    let metrics = temp.path().join("out").join("metrics.json");

    let output = Command::cargo_bin("clip-dataset")
        .expect("binary present")
        .args([
            "fetch",
            config.to_str().unwrap(),
            "--index",
            "0",
            "--index",
            "0",
            "--metrics-json",
            metrics.to_str().unwrap(),
        ])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(value[0]["label"], 4);
    assert_eq!(value[0]["pathways"][0], serde_json::json!([3, 2, 8, 8]));
    assert_eq!(value.as_array().map(Vec::len), Some(2));

    let snapshot: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&metrics).unwrap()).unwrap();
    assert_eq!(snapshot["fetch"]["attempts"], 2);
    assert_eq!(snapshot["fetch"]["successes"], 2);
}

#[test]
fn inspect_rejects_unknown_split() {
    let temp = tempdir().unwrap();
    let config = write_config(temp.path(), "");

    Command::cargo_bin("clip-dataset")
        .expect("binary present")
        .args(["inspect", config.to_str().unwrap(), "--mode", "holdout"])
        .assert()
        .failure();
}
