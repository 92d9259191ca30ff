use ndarray::{Array4, Axis};

use crate::config::ModelConfig;
use crate::error::{DatasetError, Result};

const SINGLE_PATHWAY_ARCHS: &[&str] = &["2d", "c2d", "i3d", "slow", "x3d", "mvit", "maskmvit"];
const MULTI_PATHWAY_ARCHS: &[&str] = &["slowfast"];

/// Turns one `(channel, time, height, width)` clip into the list of tensors a
/// model consumes.
pub trait PathwayPacker: Send + Sync {
    fn pack(&self, frames: Array4<f32>) -> Result<Vec<Array4<f32>>>;
}

pub struct SinglePathway;

impl PathwayPacker for SinglePathway {
    fn pack(&self, frames: Array4<f32>) -> Result<Vec<Array4<f32>>> {
        Ok(vec![frames])
    }
}

/// Slow pathway keeps every `alpha`-th frame (by uniform index selection);
/// the fast pathway keeps them all. Output order is `[slow, fast]`.
pub struct SlowFast {
    pub alpha: usize,
}

impl PathwayPacker for SlowFast {
    fn pack(&self, frames: Array4<f32>) -> Result<Vec<Array4<f32>>> {
        let time = frames.len_of(Axis(1));
        let slow_len = time / self.alpha.max(1);
        if slow_len == 0 {
            return Err(DatasetError::Transform(format!(
                "clip of {time} frames is too short for slowfast alpha {}",
                self.alpha
            )));
        }
        let indices: Vec<usize> = (0..slow_len)
            .map(|i| {
                if slow_len == 1 {
                    0
                } else {
                    (i as f64 * (time - 1) as f64 / (slow_len - 1) as f64) as usize
                }
            })
            .collect();
        let slow = frames.select(Axis(1), &indices);
        Ok(vec![slow, frames])
    }
}

pub fn packer_for(model: &ModelConfig) -> Result<Box<dyn PathwayPacker>> {
    let arch = model.arch.to_lowercase();
    if SINGLE_PATHWAY_ARCHS.contains(&arch.as_str()) {
        Ok(Box::new(SinglePathway))
    } else if MULTI_PATHWAY_ARCHS.contains(&arch.as_str()) {
        if model.slowfast_alpha == 0 {
            return Err(DatasetError::InvalidConfig(
                "model.slowfast_alpha must be positive".into(),
            ));
        }
        Ok(Box::new(SlowFast {
            alpha: model.slowfast_alpha,
        }))
    } else {
        Err(DatasetError::InvalidConfig(format!(
            "model architecture '{}' is not supported",
            model.arch
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slowfast_subsamples_time() {
        let frames = Array4::from_shape_fn((3, 8, 2, 2), |(_, t, _, _)| t as f32);
        let packed = SlowFast { alpha: 4 }.pack(frames).unwrap();
        assert_eq!(packed.len(), 2);
        assert_eq!(packed[0].dim(), (3, 2, 2, 2));
        assert_eq!(packed[0][[0, 0, 0, 0]], 0.0);
        assert_eq!(packed[0][[0, 1, 0, 0]], 7.0);
        assert_eq!(packed[1].dim(), (3, 8, 2, 2));
    }

    #[test]
    fn unknown_arch_is_rejected() {
        let model = ModelConfig {
            arch: "transformer-xl".into(),
            ..ModelConfig::default()
        };
        assert!(packer_for(&model).is_err());
    }
}
