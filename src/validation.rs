use serde::Serialize;

use crate::config::DatasetConfig;
use crate::manifest::manifest_path;
use crate::pathway::packer_for;
use crate::sampling::{Mode, select_sampling_params};
use crate::transform::map_filter;
use crate::video::frames::BACKEND_NAME;

#[derive(Debug, Default, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Lints a configuration for loading the `mode` split.
pub fn validate_config(cfg: &DatasetConfig, mode: Mode) -> ValidationReport {
    let mut report = ValidationReport::default();
    report.merge(validate_data(cfg, mode));
    report.merge(validate_loader(cfg));

    if let Err(err) = select_sampling_params(mode, 0, cfg) {
        report.errors.push(format!("Sampling for {mode}: {err}"));
    }
    if let Err(err) = packer_for(&cfg.model) {
        report.errors.push(err.to_string());
    }
    if cfg.model.num_classes == 0 {
        report.errors.push("model.num_classes must be positive".into());
    }

    let manifest = manifest_path(cfg, mode);
    if !manifest.exists() {
        report
            .warnings
            .push(format!("Manifest {} does not exist yet", manifest.display()));
    }
    if cfg.annotations.enabled && !cfg.annotations.keypoint_dir.is_dir() {
        report.warnings.push(format!(
            "Keypoint directory {} is missing; every fetch will fail to align boxes",
            cfg.annotations.keypoint_dir.display()
        ));
    }

    report
}

fn validate_data(cfg: &DatasetConfig, mode: Mode) -> ValidationReport {
    let mut report = ValidationReport::default();
    let data = &cfg.data;

    if data.path_label_separator.is_empty() {
        report
            .errors
            .push("data.path_label_separator cannot be empty".into());
    }
    if data.num_frames == 0 {
        report.errors.push("data.num_frames must be positive".into());
    }
    if data.sampling_rate == 0 {
        report.errors.push("data.sampling_rate must be positive".into());
    }
    if data.target_fps <= 0.0 {
        report.errors.push("data.target_fps must be positive".into());
    }
    if data.frames_fps <= 0.0 {
        report.errors.push("data.frames_fps must be positive".into());
    }
    if !(0.0..=1.0).contains(&data.flip_prob) {
        report.errors.push(format!(
            "data.flip_prob {} must lie in [0, 1]",
            data.flip_prob
        ));
    }
    if !(0.0..=1.0).contains(&data.time_diff_prob) {
        report.errors.push(format!(
            "data.time_diff_prob {} must lie in [0, 1]",
            data.time_diff_prob
        ));
    }
    if data.decoding_backend != BACKEND_NAME {
        report.warnings.push(format!(
            "data.decoding_backend '{}' is not handled by the built-in '{BACKEND_NAME}' backend",
            data.decoding_backend
        ));
    }
    if map_filter(&data.interpolation).is_none() {
        report.errors.push(format!(
            "data.interpolation '{}' is not a known filter",
            data.interpolation
        ));
    }
    if data.loader_chunk_size > 0 && mode != Mode::Train {
        report.warnings.push(format!(
            "data.loader_chunk_size only applies to the train split, ignored for {mode}"
        ));
    }
    if mode != Mode::Train && data.time_diff_prob > 0.0 {
        report
            .warnings
            .push("data.time_diff_prob only applies to the train split".into());
    }
    report
}

fn validate_loader(cfg: &DatasetConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let retries = cfg.data_loader.num_retries;
    if retries == 0 {
        report
            .errors
            .push("data_loader.num_retries must be at least 1".into());
    } else if retries < 8 {
        report.warnings.push(format!(
            "data_loader.num_retries {retries} is below 8; every decode failure replaces the video"
        ));
    }
    if cfg.contrastive.delta_clips_min > cfg.contrastive.delta_clips_max {
        report.errors.push(format!(
            "contrastive.delta_clips_min {} exceeds delta_clips_max {}",
            cfg.contrastive.delta_clips_min, cfg.contrastive.delta_clips_max
        ));
    }
    report
}
