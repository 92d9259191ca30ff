//! Video collaborators used by the clip fetch loop.
//!
//! The dataset never touches demuxers or codecs directly. It talks to a
//! [`VideoBackend`], which opens a container for a path and decodes one clip
//! from it according to a [`DecodeRequest`]. The crate ships a frame-directory
//! backend in [`frames`]; tests and other decoders plug in through the trait.

pub mod frames;
pub mod temporal;

use std::collections::HashMap;
use std::path::Path;

use ndarray::{Array2, Array4};
use rand::RngCore;
use serde::Serialize;

use crate::error::Result;
use crate::sampling::SampleIndex;

/// Decoder-populated facts about a video, cached between fetches.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct VideoMeta {
    pub frame_count: Option<usize>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct OpenOptions {
    pub multi_thread_decode: bool,
    pub backend: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DecodeRequest {
    pub sampling_rate: usize,
    pub num_frames: usize,
    pub temporal_index: SampleIndex,
    pub num_ensemble_views: usize,
    pub target_fps: f64,
    pub backend: String,
    pub use_offset: bool,
    /// Short side the decoder may resize to; zero keeps the source size.
    pub max_spatial_scale: u32,
    pub time_diff_prob: f64,
    pub temporally_rnd_clips: bool,
    pub min_delta: i64,
    pub max_delta: i64,
}

/// Source-frame window a clip was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TimeIndex {
    pub start: f64,
    pub end: f64,
    pub fps: f64,
}

impl TimeIndex {
    pub fn to_array(&self) -> Array2<f64> {
        ndarray::arr2(&[[self.start, self.end, self.fps]])
    }
}

/// One decoded clip. `frames` is `(time, height, width, channel)` in raw bytes;
/// `None` marks a clip the decoder could not fill.
#[derive(Debug, Clone)]
pub struct DecodedClip {
    pub frames: Option<Array4<u8>>,
    pub time_index: TimeIndex,
    pub time_diff: bool,
    /// Source frame numbers that ended up in `frames`, in order.
    pub frame_indices: Vec<usize>,
}

pub trait VideoBackend {
    type Container;

    /// Opens the container for `path`. `Ok(None)` means the video exists but
    /// holds nothing decodable.
    fn open(&self, path: &Path, options: &OpenOptions) -> Result<Option<Self::Container>>;

    /// Decodes one clip. `Ok(None)` signals that no frames could be produced.
    fn decode(
        &self,
        container: &mut Self::Container,
        request: &DecodeRequest,
        meta: &mut VideoMeta,
        rng: &mut dyn RngCore,
    ) -> Result<Option<DecodedClip>>;
}

/// Entry count past which metadata is no longer cached.
pub const META_CACHE_LIMIT: usize = 5_000_000;

/// Per-index metadata cache. Once the map holds `limit` entries every decode
/// gets a fresh, empty [`VideoMeta`] instead of a cached one.
#[derive(Debug, Clone)]
pub struct VideoMetaCache {
    entries: HashMap<usize, VideoMeta>,
    limit: usize,
}

impl Default for VideoMetaCache {
    fn default() -> Self {
        Self::with_limit(META_CACHE_LIMIT)
    }
}

impl VideoMetaCache {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            entries: HashMap::new(),
            limit,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&VideoMeta> {
        self.entries.get(&index)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn with_meta<R>(&mut self, index: usize, f: impl FnOnce(&mut VideoMeta) -> R) -> R {
        if self.entries.len() < self.limit {
            f(self.entries.entry(index).or_default())
        } else {
            let mut scratch = VideoMeta::default();
            f(&mut scratch)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_cache_stops_caching_at_limit() {
        let mut cache = VideoMetaCache::with_limit(1);
        cache.with_meta(0, |meta| meta.frame_count = Some(10));
        assert_eq!(cache.get(0).and_then(|m| m.frame_count), Some(10));

        let seen = cache.with_meta(0, |meta| meta.frame_count);
        assert_eq!(seen, None, "oversized cache hands out empty metadata");
        cache.with_meta(1, |meta| meta.frame_count = Some(3));
        assert!(cache.get(1).is_none());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn time_index_row() {
        let idx = TimeIndex {
            start: 2.0,
            end: 9.0,
            fps: 30.0,
        };
        assert_eq!(idx.to_array().row(0).to_vec(), vec![2.0, 9.0, 30.0]);
    }
}
