use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Train,
    Val,
    Test,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Train => "train",
            Self::Val => "val",
            Self::Test => "test",
        }
    }

    pub fn is_test(&self) -> bool {
        matches!(self, Self::Test)
    }
}

impl FromStr for Mode {
    type Err = DatasetError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "train" => Ok(Self::Train),
            "val" => Ok(Self::Val),
            "test" => Ok(Self::Test),
            other => Err(DatasetError::UnsupportedMode(other.to_string())),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a clip is taken from, in time or space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "index")]
pub enum SampleIndex {
    /// Chosen randomly downstream; encoded as -1 in flat index form.
    Random,
    Fixed(usize),
}

impl SampleIndex {
    pub fn as_i64(&self) -> i64 {
        match self {
            Self::Random => -1,
            Self::Fixed(idx) => *idx as i64,
        }
    }
}

/// Spatial index that always selects the center crop.
pub const CENTER_CROP: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SamplingParams {
    pub temporal: SampleIndex,
    pub spatial: SampleIndex,
    pub min_scale: u32,
    pub max_scale: u32,
    pub crop_size: u32,
}

/// Derives the clip sampling parameters for one fetch.
///
/// Train and val clips are sampled at random with a fixed scale: the jitter
/// range must collapse to a single value equal to the crop size. Test clips
/// are addressed deterministically by `spatial_temporal_index` and never
/// jitter.
pub fn select_sampling_params(
    mode: Mode,
    spatial_temporal_index: usize,
    cfg: &DatasetConfig,
) -> Result<SamplingParams> {
    match mode {
        Mode::Train | Mode::Val => {
            let [min_scale, max_scale] = cfg.data.train_jitter_scales;
            let crop_size = cfg.data.train_crop_size;
            if min_scale != max_scale || max_scale != crop_size {
                return Err(DatasetError::InvalidConfig(format!(
                    "{mode} clips require train_jitter_scales [{min_scale}, {max_scale}] \
                     to equal train_crop_size {crop_size}"
                )));
            }
            Ok(SamplingParams {
                temporal: SampleIndex::Random,
                spatial: SampleIndex::Random,
                min_scale,
                max_scale,
                crop_size,
            })
        }
        Mode::Test => {
            let num_crops = cfg.test.num_spatial_crops;
            if num_crops == 0 {
                return Err(DatasetError::InvalidConfig(
                    "test.num_spatial_crops must be positive".into(),
                ));
            }
            let temporal = spatial_temporal_index / num_crops;
            let spatial = if num_crops > 1 {
                spatial_temporal_index % num_crops
            } else {
                CENTER_CROP
            };
            let crop_size = cfg.data.test_crop_size;
            let (min_scale, max_scale) = if num_crops > 1 {
                (crop_size, crop_size)
            } else {
                let short_side = cfg.data.train_jitter_scales[0];
                (short_side, short_side)
            };
            if min_scale != max_scale {
                return Err(DatasetError::InvalidConfig(
                    "test sampling must not jitter scale".into(),
                ));
            }
            Ok(SamplingParams {
                temporal: SampleIndex::Fixed(temporal),
                spatial: SampleIndex::Fixed(spatial),
                min_scale,
                max_scale,
                crop_size,
            })
        }
    }
}
