//! Frame tensor post-processing: byte frames to normalized channel-first
//! floats, then scale, crop and flip.

use image::imageops::FilterType;
use image::{ImageBuffer, Rgb};
use ndarray::{Array4, Axis, s};
use rand::Rng;

use crate::error::{DatasetError, Result};
use crate::sampling::SampleIndex;

type Rgb32FImage = ImageBuffer<Rgb<f32>, Vec<f32>>;

pub fn map_filter(name: &str) -> Option<FilterType> {
    match name.to_lowercase().as_str() {
        "nearest" => Some(FilterType::Nearest),
        "triangle" | "bilinear" => Some(FilterType::Triangle),
        "catmullrom" | "bicubic" => Some(FilterType::CatmullRom),
        "lanczos3" => Some(FilterType::Lanczos3),
        "gaussian" => Some(FilterType::Gaussian),
        _ => None,
    }
}

/// `(time, height, width, channel)` bytes to `(channel, time, height, width)`
/// floats in `[0, 1]`.
pub fn to_float_cthw(frames: &Array4<u8>) -> Array4<f32> {
    frames
        .mapv(|v| v as f32 / 255.0)
        .permuted_axes([3, 0, 1, 2])
        .as_standard_layout()
        .into_owned()
}

#[derive(Debug, Clone)]
pub struct SpatialSampler {
    pub spatial: SampleIndex,
    pub min_scale: u32,
    pub max_scale: u32,
    pub crop_size: u32,
    pub random_flip: bool,
    pub flip_prob: f64,
    pub inverse_uniform: bool,
    pub motion_shift: bool,
    pub filter: FilterType,
}

impl SpatialSampler {
    /// Random index: jitter the short side, crop at a random location and
    /// maybe flip. Fixed index: scale deterministically and take the
    /// left/top, center or right/bottom crop.
    pub fn apply<R: Rng + ?Sized>(&self, frames: Array4<f32>, rng: &mut R) -> Result<Array4<f32>> {
        match self.spatial {
            SampleIndex::Random => {
                let frames = short_side_scale_jitter(
                    frames,
                    self.min_scale,
                    self.max_scale,
                    self.inverse_uniform,
                    self.filter,
                    rng,
                )?;
                let frames = if self.motion_shift {
                    random_crop_with_motion_shift(&frames, self.crop_size, rng)?
                } else {
                    random_crop(&frames, self.crop_size, rng)?
                };
                Ok(if self.random_flip {
                    horizontal_flip(frames, self.flip_prob, rng)
                } else {
                    frames
                })
            }
            SampleIndex::Fixed(spatial_idx) => {
                if self.min_scale != self.max_scale {
                    return Err(DatasetError::Transform(format!(
                        "deterministic crops need a fixed scale, got [{}, {}]",
                        self.min_scale, self.max_scale
                    )));
                }
                let frames = short_side_scale_jitter(
                    frames,
                    self.min_scale,
                    self.max_scale,
                    false,
                    self.filter,
                    rng,
                )?;
                uniform_crop(&frames, self.crop_size, spatial_idx)
            }
        }
    }
}

/// Rescales so the short side matches a size drawn from `[min, max]`
/// (uniformly in `1/size` when `inverse_uniform` is set).
pub fn short_side_scale_jitter<R: Rng + ?Sized>(
    frames: Array4<f32>,
    min_size: u32,
    max_size: u32,
    inverse_uniform: bool,
    filter: FilterType,
    rng: &mut R,
) -> Result<Array4<f32>> {
    let size = if min_size >= max_size {
        min_size
    } else if inverse_uniform {
        let inv = rng.gen_range((1.0 / max_size as f64)..(1.0 / min_size as f64));
        (1.0 / inv).round() as u32
    } else {
        rng.gen_range(min_size as f64..max_size as f64).round() as u32
    };

    let (_, _, height, width) = frames.dim();
    if (width <= height && width == size as usize) || (height <= width && height == size as usize)
    {
        return Ok(frames);
    }
    let (new_h, new_w) = if width < height {
        (
            ((height as f64 / width as f64) * size as f64).floor() as u32,
            size,
        )
    } else {
        (
            size,
            ((width as f64 / height as f64) * size as f64).floor() as u32,
        )
    };
    resize(&frames, new_h.max(1), new_w.max(1), filter)
}

/// Resizes every frame of a `(3, time, height, width)` tensor.
pub fn resize(frames: &Array4<f32>, height: u32, width: u32, filter: FilterType) -> Result<Array4<f32>> {
    let (channels, time, src_h, src_w) = frames.dim();
    if channels != 3 {
        return Err(DatasetError::Transform(format!(
            "resize expects 3 channels, got {channels}"
        )));
    }
    let mut out = Array4::<f32>::zeros((channels, time, height as usize, width as usize));
    for t in 0..time {
        let hwc = frames
            .slice(s![.., t, .., ..])
            .permuted_axes([1, 2, 0])
            .as_standard_layout()
            .into_owned();
        let (raw, _) = hwc.into_raw_vec_and_offset();
        let image = Rgb32FImage::from_raw(src_w as u32, src_h as u32, raw)
            .ok_or_else(|| DatasetError::Transform("frame buffer size mismatch".into()))?;
        let resized = image::imageops::resize(&image, width, height, filter);
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..channels {
                out[[c, t, y as usize, x as usize]] = pixel[c];
            }
        }
    }
    Ok(out)
}

pub fn random_crop<R: Rng + ?Sized>(
    frames: &Array4<f32>,
    size: u32,
    rng: &mut R,
) -> Result<Array4<f32>> {
    let (_, _, height, width) = frames.dim();
    let size = size as usize;
    ensure_fits(height, width, size)?;
    if height == size && width == size {
        return Ok(frames.clone());
    }
    let y = rng.gen_range(0..=height - size);
    let x = rng.gen_range(0..=width - size);
    Ok(frames.slice(s![.., .., y..y + size, x..x + size]).to_owned())
}

/// Random crop whose window drifts linearly from a random start position to
/// a random end position over the clip.
pub fn random_crop_with_motion_shift<R: Rng + ?Sized>(
    frames: &Array4<f32>,
    size: u32,
    rng: &mut R,
) -> Result<Array4<f32>> {
    let (channels, time, height, width) = frames.dim();
    let size = size as usize;
    ensure_fits(height, width, size)?;
    let (y0, y1) = (rng.gen_range(0..=height - size), rng.gen_range(0..=height - size));
    let (x0, x1) = (rng.gen_range(0..=width - size), rng.gen_range(0..=width - size));

    let mut out = Array4::<f32>::zeros((channels, time, size, size));
    for t in 0..time {
        let progress = if time > 1 {
            t as f64 / (time - 1) as f64
        } else {
            0.0
        };
        let y = lerp(y0, y1, progress);
        let x = lerp(x0, x1, progress);
        out.slice_mut(s![.., t, .., ..])
            .assign(&frames.slice(s![.., t, y..y + size, x..x + size]));
    }
    Ok(out)
}

/// Crop of `size` at position `spatial_idx` along the long side: 0 is the
/// left/top, 1 the center and 2 the right/bottom.
pub fn uniform_crop(frames: &Array4<f32>, size: u32, spatial_idx: usize) -> Result<Array4<f32>> {
    if spatial_idx > 2 {
        return Err(DatasetError::Transform(format!(
            "spatial index {spatial_idx} outside 0..=2"
        )));
    }
    let (_, _, height, width) = frames.dim();
    let size = size as usize;
    ensure_fits(height, width, size)?;

    let mut y = (height - size).div_ceil(2);
    let mut x = (width - size).div_ceil(2);
    if height > width {
        match spatial_idx {
            0 => y = 0,
            2 => y = height - size,
            _ => {}
        }
    } else {
        match spatial_idx {
            0 => x = 0,
            2 => x = width - size,
            _ => {}
        }
    }
    Ok(frames.slice(s![.., .., y..y + size, x..x + size]).to_owned())
}

pub fn horizontal_flip<R: Rng + ?Sized>(frames: Array4<f32>, prob: f64, rng: &mut R) -> Array4<f32> {
    if rng.gen_range(0.0..1.0) < prob {
        let mut flipped = frames;
        flipped.invert_axis(Axis(3));
        flipped.as_standard_layout().into_owned()
    } else {
        frames
    }
}

fn ensure_fits(height: usize, width: usize, size: usize) -> Result<()> {
    if size == 0 || size > height || size > width {
        return Err(DatasetError::Transform(format!(
            "crop size {size} does not fit {height}x{width} frames"
        )));
    }
    Ok(())
}

fn lerp(from: usize, to: usize, progress: f64) -> usize {
    (from as f64 + (to as f64 - from as f64) * progress).round() as usize
}
