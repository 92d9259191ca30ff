use std::fs;

use clip_dataset::config::DatasetConfig;
use clip_dataset::sampling::Mode;
use clip_dataset::validation::validate_config;
use tempfile::tempdir;

fn consistent_config() -> DatasetConfig {
    let mut cfg = DatasetConfig::default();
    cfg.data.train_jitter_scales = [224, 224];
    cfg.data.train_crop_size = 224;
    cfg
}

#[test]
fn default_scales_pass_for_train() {
    let report = validate_config(&DatasetConfig::default(), Mode::Train);
    assert!(report.is_ok(), "errors: {:?}", report.errors);
}

#[test]
fn jittering_scales_fail_for_train() {
    let mut cfg = DatasetConfig::default();
    cfg.data.train_jitter_scales = [256, 320];
    cfg.data.train_crop_size = 224;
    let report = validate_config(&cfg, Mode::Train);
    assert!(!report.is_ok());
    assert!(
        report.errors.iter().any(|e| e.contains("train_crop_size")),
        "errors: {:?}",
        report.errors
    );
}

#[test]
fn consistent_config_passes_with_manifest_present() {
    let temp = tempdir().unwrap();
    fs::write(temp.path().join("train.csv"), "a.mp4,1\n").unwrap();
    let mut cfg = consistent_config();
    cfg.data.path_to_data_dir = temp.path().to_path_buf();
    cfg.annotations.keypoint_dir = temp.path().to_path_buf();

    let report = validate_config(&cfg, Mode::Train);
    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert!(report.warnings.is_empty(), "warnings: {:?}", report.warnings);
}

#[test]
fn missing_manifest_and_keypoints_only_warn() {
    let temp = tempdir().unwrap();
    let mut cfg = consistent_config();
    cfg.data.path_to_data_dir = temp.path().join("nowhere");
    cfg.annotations.keypoint_dir = temp.path().join("no-keypoints");

    let report = validate_config(&cfg, Mode::Test);
    assert!(report.is_ok(), "errors: {:?}", report.errors);
    assert_eq!(report.warnings.len(), 2);
}

#[test]
fn bad_values_are_all_reported() {
    let mut cfg = consistent_config();
    cfg.data.path_label_separator = String::new();
    cfg.data.flip_prob = 1.5;
    cfg.data.interpolation = "sinc".into();
    cfg.data_loader.num_retries = 0;
    cfg.model.arch = "unknown".into();
    cfg.contrastive.delta_clips_min = 4;
    cfg.contrastive.delta_clips_max = 1;

    let report = validate_config(&cfg, Mode::Val);
    assert_eq!(report.errors.len(), 6, "errors: {:?}", report.errors);
}

#[test]
fn small_retry_budget_warns() {
    let mut cfg = consistent_config();
    cfg.data_loader.num_retries = 3;
    let report = validate_config(&cfg, Mode::Val);
    assert!(report.warnings.iter().any(|w| w.contains("num_retries")));
}
