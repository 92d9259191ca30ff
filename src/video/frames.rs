//! Frame-directory backend: a video is a directory of image files, one per
//! frame, ordered by the number embedded in each file name.

use std::fs;
use std::path::{Path, PathBuf};

use image::RgbImage;
use image::imageops::FilterType;
use ndarray::{Array4, Axis, Zip};
use rand::{Rng, RngCore};
use tracing::debug;

use crate::error::{DatasetError, Result};
use crate::sampling::SampleIndex;
use crate::video::temporal::{clip_bounds, clip_span, sample_frame_indices};
use crate::video::{DecodeRequest, DecodedClip, OpenOptions, TimeIndex, VideoBackend, VideoMeta};

pub const BACKEND_NAME: &str = "frames";

const FRAME_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff", "ppm"];

#[derive(Debug, Clone)]
pub struct FrameDirectory {
    pub path: PathBuf,
    pub frames: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FrameDirBackend {
    fps: f64,
    filter: FilterType,
}

impl FrameDirBackend {
    pub fn new(fps: f64, filter: FilterType) -> Self {
        Self { fps, filter }
    }
}

impl Default for FrameDirBackend {
    fn default() -> Self {
        Self::new(30.0, FilterType::Triangle)
    }
}

impl VideoBackend for FrameDirBackend {
    type Container = FrameDirectory;

    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Option<FrameDirectory>> {
        if options.backend != BACKEND_NAME {
            return Err(DatasetError::Container {
                path: path.to_path_buf(),
                reason: format!("unsupported decoding backend '{}'", options.backend),
            });
        }
        let listing = fs::read_dir(path).map_err(|err| DatasetError::Container {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

        let mut frames = Vec::new();
        for entry in listing {
            let entry = entry.map_err(|err| DatasetError::Container {
                path: path.to_path_buf(),
                reason: err.to_string(),
            })?;
            let frame_path = entry.path();
            if frame_path.is_file() && is_frame_file(&frame_path) {
                frames.push(frame_path);
            }
        }
        if frames.is_empty() {
            return Ok(None);
        }
        frames.sort_by_key(|p| frame_sort_key(p));
        Ok(Some(FrameDirectory {
            path: path.to_path_buf(),
            frames,
        }))
    }

    fn decode(
        &self,
        container: &mut FrameDirectory,
        request: &DecodeRequest,
        meta: &mut VideoMeta,
        rng: &mut dyn RngCore,
    ) -> Result<Option<DecodedClip>> {
        if request.num_frames == 0 {
            return Ok(None);
        }
        let frame_count = container.frames.len();
        meta.frame_count = Some(frame_count);
        let fps = *meta.fps.get_or_insert(self.fps);

        let span = clip_span(
            request.sampling_rate,
            request.num_frames,
            request.target_fps,
            fps,
        );
        let (start, end) = match request.temporal_index {
            // Deterministic placement for random clips: centered in the video.
            SampleIndex::Random if !request.temporally_rnd_clips => {
                let start = ((frame_count as f64 - span).max(0.0) / 2.0).floor();
                (start, start + span - 1.0)
            }
            clip_index => clip_bounds(
                frame_count as f64,
                span,
                clip_index,
                request.num_ensemble_views,
                request.use_offset,
                rng,
            ),
        };
        let frame_indices = sample_frame_indices(start, end, request.num_frames, frame_count);

        let mut images = Vec::with_capacity(frame_indices.len());
        for &idx in &frame_indices {
            let frame_path = &container.frames[idx];
            let image = image::open(frame_path)
                .map_err(|err| DatasetError::Decode {
                    path: frame_path.clone(),
                    reason: err.to_string(),
                })?
                .to_rgb8();
            images.push(self.rescale(image, request.max_spatial_scale));
        }

        let Some(first) = images.first() else {
            return Ok(None);
        };
        let (width, height) = first.dimensions();
        meta.width = Some(width);
        meta.height = Some(height);

        let mut frames = Array4::<u8>::zeros((images.len(), height as usize, width as usize, 3));
        for (mut slot, image) in frames.axis_iter_mut(Axis(0)).zip(&images) {
            if image.dimensions() != (width, height) {
                return Err(DatasetError::Decode {
                    path: container.path.clone(),
                    reason: format!(
                        "frame size {}x{} differs from {}x{}",
                        image.width(),
                        image.height(),
                        width,
                        height
                    ),
                });
            }
            let view = ndarray::ArrayView3::from_shape(
                (height as usize, width as usize, 3),
                image.as_raw().as_slice(),
            )
            .map_err(|err| DatasetError::Decode {
                path: container.path.clone(),
                reason: err.to_string(),
            })?;
            slot.assign(&view);
        }

        let time_diff = request.time_diff_prob > 0.0 && rng.gen_bool(request.time_diff_prob.min(1.0));
        if time_diff {
            frames = temporal_difference(&frames);
        }

        debug!(
            video = %container.path.display(),
            start,
            end,
            frames = frame_indices.len(),
            time_diff,
            "Decoded clip"
        );

        Ok(Some(DecodedClip {
            frames: Some(frames),
            time_index: TimeIndex { start, end, fps },
            time_diff,
            frame_indices,
        }))
    }
}

impl FrameDirBackend {
    fn rescale(&self, image: RgbImage, short_side: u32) -> RgbImage {
        let (width, height) = image.dimensions();
        if short_side == 0 || width.min(height) == short_side {
            return image;
        }
        let (new_w, new_h) = if width < height {
            let scaled = (height as f64 / width as f64 * short_side as f64).floor() as u32;
            (short_side, scaled.max(1))
        } else {
            let scaled = (width as f64 / height as f64 * short_side as f64).floor() as u32;
            (scaled.max(1), short_side)
        };
        image::imageops::resize(&image, new_w, new_h, self.filter)
    }
}

/// Replaces each frame by its absolute difference to the next one; the last
/// frame has no successor and becomes black.
fn temporal_difference(frames: &Array4<u8>) -> Array4<u8> {
    let mut out = Array4::<u8>::zeros(frames.raw_dim());
    let time = frames.len_of(Axis(0));
    for t in 0..time.saturating_sub(1) {
        let current = frames.index_axis(Axis(0), t);
        let next = frames.index_axis(Axis(0), t + 1);
        Zip::from(out.index_axis_mut(Axis(0), t))
            .and(&current)
            .and(&next)
            .for_each(|o, &a, &b| *o = a.abs_diff(b));
    }
    out
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Sorts `frame10.jpg` after `frame9.jpg`; names without digits sort by name.
fn frame_sort_key(path: &Path) -> (u64, String) {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let digits: String = stem
        .chars()
        .rev()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    (digits.parse().unwrap_or(u64::MAX), stem)
}
