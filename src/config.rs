use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub data: DataConfig,
    pub data_loader: DataLoaderConfig,
    pub test: TestConfig,
    pub model: ModelConfig,
    pub contrastive: ContrastiveConfig,
    pub annotations: AnnotationConfig,
}

impl DatasetConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            DatasetError::io(format!("failed to read config file {}", path.display()), err)
        })?;
        Self::from_yaml(&content).map_err(|err| match err {
            DatasetError::InvalidConfig(reason) => {
                DatasetError::InvalidConfig(format!("{}: {reason}", path.display()))
            }
            other => other,
        })
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|err| DatasetError::InvalidConfig(err.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding `train.csv`, `val.csv` and `test.csv`.
    pub path_to_data_dir: PathBuf,
    /// Joined in front of every manifest path.
    pub path_prefix: PathBuf,
    pub path_label_separator: String,
    pub num_frames: usize,
    pub sampling_rate: usize,
    pub target_fps: f64,
    pub train_jitter_scales: [u32; 2],
    pub train_crop_size: u32,
    pub test_crop_size: u32,
    pub random_flip: bool,
    pub flip_prob: f64,
    pub inv_uniform_sample: bool,
    pub train_jitter_motion_shift: bool,
    pub use_offset_sampling: bool,
    pub time_diff_prob: f64,
    pub decoding_backend: String,
    /// Rows per chunk when chunked ingestion is enabled (train only). Zero disables it.
    pub loader_chunk_size: usize,
    pub skip_rows: usize,
    /// Frame rate assumed for frame-directory videos.
    pub frames_fps: f64,
    pub interpolation: String,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            path_to_data_dir: PathBuf::new(),
            path_prefix: PathBuf::new(),
            path_label_separator: ",".to_string(),
            num_frames: 8,
            sampling_rate: 8,
            target_fps: 30.0,
            train_jitter_scales: [256, 256],
            train_crop_size: 256,
            test_crop_size: 256,
            random_flip: true,
            flip_prob: 0.5,
            inv_uniform_sample: false,
            train_jitter_motion_shift: false,
            use_offset_sampling: false,
            time_diff_prob: 0.0,
            decoding_backend: "frames".to_string(),
            loader_chunk_size: 0,
            skip_rows: 0,
            frames_fps: 30.0,
            interpolation: "triangle".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DataLoaderConfig {
    pub enable_multi_thread_decode: bool,
    pub num_retries: usize,
    /// Seeds the dataset RNG; entropy is used when absent.
    pub seed: Option<u64>,
}

impl Default for DataLoaderConfig {
    fn default() -> Self {
        Self {
            enable_multi_thread_decode: false,
            num_retries: 100,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TestConfig {
    pub num_ensemble_views: usize,
    pub num_spatial_crops: usize,
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            num_ensemble_views: 10,
            num_spatial_crops: 3,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModelConfig {
    pub num_classes: usize,
    pub arch: String,
    pub slowfast_alpha: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            num_classes: 400,
            arch: "slowfast".to_string(),
            slowfast_alpha: 4,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct ContrastiveConfig {
    pub delta_clips_min: i64,
    pub delta_clips_max: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnnotationConfig {
    pub enabled: bool,
    pub keypoint_dir: PathBuf,
    /// Stripped from the video file stem to recover the annotated video name.
    pub name_suffix: String,
    /// Appended to the stem to form the key inside the keypoint file.
    pub extension: String,
}

impl Default for AnnotationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            keypoint_dir: PathBuf::from("./data"),
            name_suffix: "_20fps".to_string(),
            extension: ".mp4".to_string(),
        }
    }
}
