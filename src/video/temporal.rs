//! Temporal clip placement.

use rand::Rng;

use crate::sampling::SampleIndex;

/// Number of source frames a clip spans once resampled from `video_fps` to
/// `target_fps`.
pub fn clip_span(sampling_rate: usize, num_frames: usize, target_fps: f64, video_fps: f64) -> f64 {
    if target_fps <= 0.0 {
        return (sampling_rate * num_frames) as f64;
    }
    (sampling_rate * num_frames) as f64 / target_fps * video_fps
}

/// Start and end source frame of a clip of `clip_size` frames.
///
/// A random clip index places the clip uniformly inside the video. A fixed
/// index splits the video into `num_clips` evenly spaced windows; with
/// `use_offset` the first and last windows touch the video boundaries.
pub fn clip_bounds<R: Rng + ?Sized>(
    video_size: f64,
    clip_size: f64,
    clip_index: SampleIndex,
    num_clips: usize,
    use_offset: bool,
    rng: &mut R,
) -> (f64, f64) {
    let delta = (video_size - clip_size).max(0.0);
    let start = match clip_index {
        SampleIndex::Random => {
            if delta > 0.0 {
                rng.gen_range(0.0..delta)
            } else {
                0.0
            }
        }
        SampleIndex::Fixed(idx) => {
            let num_clips = num_clips.max(1);
            if use_offset {
                if num_clips == 1 {
                    (delta / 2.0).floor()
                } else {
                    idx as f64 * (delta / (num_clips - 1) as f64).floor()
                }
            } else {
                delta * idx as f64 / num_clips as f64
            }
        }
    };
    (start, start + clip_size - 1.0)
}

/// `num_samples` evenly spaced frame numbers over `[start, end]`, clamped to
/// the `num_source_frames` frames that exist.
pub fn sample_frame_indices(
    start: f64,
    end: f64,
    num_samples: usize,
    num_source_frames: usize,
) -> Vec<usize> {
    if num_samples == 0 || num_source_frames == 0 {
        return Vec::new();
    }
    let last = (num_source_frames - 1) as f64;
    (0..num_samples)
        .map(|i| {
            let position = if num_samples == 1 {
                start
            } else {
                start + (end - start) * i as f64 / (num_samples - 1) as f64
            };
            position.clamp(0.0, last) as usize
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn fixed_clips_split_the_video_evenly() {
        let mut rng = StdRng::seed_from_u64(0);
        let (start, end) = clip_bounds(100.0, 20.0, SampleIndex::Fixed(1), 2, false, &mut rng);
        assert_eq!(start, 40.0);
        assert_eq!(end, 59.0);
    }

    #[test]
    fn offset_sampling_touches_both_ends() {
        let mut rng = StdRng::seed_from_u64(0);
        let (first, _) = clip_bounds(100.0, 20.0, SampleIndex::Fixed(0), 3, true, &mut rng);
        let (last, end) = clip_bounds(100.0, 20.0, SampleIndex::Fixed(2), 3, true, &mut rng);
        assert_eq!(first, 0.0);
        assert_eq!(last, 80.0);
        assert_eq!(end, 99.0);
    }

    #[test]
    fn random_clip_stays_inside_video() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let (start, end) = clip_bounds(64.0, 16.0, SampleIndex::Random, 1, false, &mut rng);
            assert!(start >= 0.0 && start < 48.0);
            assert_eq!(end - start, 15.0);
        }
    }

    #[test]
    fn short_videos_clamp_indices() {
        let indices = sample_frame_indices(0.0, 63.0, 8, 10);
        assert_eq!(indices.len(), 8);
        assert_eq!(indices[0], 0);
        assert!(indices.iter().all(|&i| i <= 9));
        assert_eq!(*indices.last().unwrap(), 9);
    }

    #[test]
    fn linspace_truncates_positions() {
        assert_eq!(sample_frame_indices(0.0, 7.0, 4, 100), vec![0, 2, 4, 7]);
    }
}
