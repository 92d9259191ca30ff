use image::imageops::FilterType;
use ndarray::{Array2, Array4};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde_json::{Map, Value};
use tracing::{debug, instrument};

use crate::annotations::{KeypointStore, VideoIdentity};
use crate::config::DatasetConfig;
use crate::error::{DatasetError, Result};
use crate::fetch::{FetchContext, FetchedClip, RetryPolicy, fetch_clip};
use crate::manifest::{Manifest, normalize_label};
use crate::observability::MetricsCollector;
use crate::pathway::{PathwayPacker, packer_for};
use crate::sampling::{Mode, SampleIndex, SamplingParams, select_sampling_params};
use crate::transform::{SpatialSampler, map_filter, to_float_cthw};
use crate::video::frames::FrameDirBackend;
use crate::video::{DecodeRequest, OpenOptions, VideoBackend, VideoMetaCache};

/// One dataset item.
#[derive(Debug, Clone)]
pub struct ClipSample {
    /// One `(channel, time, height, width)` tensor per model pathway.
    pub frames: Vec<Array4<f32>>,
    pub label: i64,
    /// Index the clip was finally decoded from; differs from the requested
    /// index when the fetch fell back to a replacement video.
    pub index: usize,
    /// `[[start, end, fps]]`.
    pub time_index: Array2<f64>,
    /// Always empty for this loader.
    pub extra: Map<String, Value>,
    /// `(frames, boxes, 4, 2)` rectangle corners, one row per decoded frame.
    pub boxes: Array4<i64>,
}

/// Clip sampling dataset over a `<mode>.csv` manifest.
///
/// A dataset instance owns its caches and random state; workers that load in
/// parallel each hold their own instance.
pub struct ClipDataset<B: VideoBackend = FrameDirBackend> {
    cfg: DatasetConfig,
    mode: Mode,
    manifest: Manifest,
    backend: B,
    meta_cache: VideoMetaCache,
    keypoints: KeypointStore,
    packer: Box<dyn PathwayPacker>,
    filter: FilterType,
    rng: StdRng,
    epoch: f64,
    metrics: MetricsCollector,
}

impl ClipDataset<FrameDirBackend> {
    /// Dataset over frame-directory videos.
    pub fn new(cfg: DatasetConfig, mode: Mode) -> Result<Self> {
        let filter = resolve_filter(&cfg)?;
        let backend = FrameDirBackend::new(cfg.data.frames_fps, filter);
        Self::with_backend(cfg, mode, backend)
    }
}

impl<B: VideoBackend> ClipDataset<B> {
    pub fn with_backend(cfg: DatasetConfig, mode: Mode, backend: B) -> Result<Self> {
        let manifest = Manifest::load(&cfg, mode)?;
        Self::from_manifest(cfg, mode, manifest, backend)
    }

    pub fn from_manifest(cfg: DatasetConfig, mode: Mode, manifest: Manifest, backend: B) -> Result<Self> {
        let packer = packer_for(&cfg.model)?;
        let filter = resolve_filter(&cfg)?;
        let rng = match cfg.data_loader.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let keypoints = KeypointStore::new(cfg.annotations.keypoint_dir.clone());
        Ok(Self {
            cfg,
            mode,
            manifest,
            backend,
            meta_cache: VideoMetaCache::default(),
            keypoints,
            packer,
            filter,
            rng,
            epoch: 0.0,
            metrics: MetricsCollector::new(),
        })
    }

    /// Reports fetch counters and phase timings to `metrics` instead of a
    /// private collector.
    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.cfg
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn meta_cache(&self) -> &VideoMetaCache {
        &self.meta_cache
    }

    pub fn len(&self) -> usize {
        self.manifest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.manifest.is_empty()
    }

    pub fn num_videos(&self) -> usize {
        self.manifest.len()
    }

    /// Recorded for samplers upstream; fetching ignores it.
    pub fn set_epoch(&mut self, epoch: f64) {
        self.epoch = epoch;
    }

    pub fn epoch(&self) -> f64 {
        self.epoch
    }

    /// Moves a chunked training manifest to its next window of rows. Cached
    /// metadata is keyed by index, so it is dropped along with the old rows.
    pub fn next_chunk(&mut self) -> Result<bool> {
        let advanced = self.manifest.advance_chunk(&self.cfg, self.mode)?;
        if advanced {
            self.meta_cache.clear();
        }
        Ok(advanced)
    }

    pub fn sampling_params(&self, index: usize) -> Result<SamplingParams> {
        let entry = self.manifest.get(index).ok_or(DatasetError::IndexOutOfRange {
            index,
            len: self.manifest.len(),
        })?;
        select_sampling_params(self.mode, entry.spatial_temporal_index, &self.cfg)
    }

    /// Decodes, annotates and post-processes the clip for `index`.
    #[instrument(level = "debug", skip(self), fields(mode = %self.mode))]
    pub fn get(&mut self, index: usize) -> Result<ClipSample> {
        let params = self.sampling_params(index)?;
        let request = self.decode_request(&params);
        let open_options = OpenOptions {
            multi_thread_decode: self.cfg.data_loader.enable_multi_thread_decode,
            backend: self.cfg.data.decoding_backend.clone(),
        };

        let fetched = {
            let mut ctx = FetchContext {
                manifest: &self.manifest,
                backend: &self.backend,
                meta_cache: &mut self.meta_cache,
                open_options: &open_options,
                request: &request,
                policy: RetryPolicy::new(self.cfg.data_loader.num_retries, self.mode),
                metrics: &self.metrics,
            };
            fetch_clip(&mut ctx, index, &mut self.rng)?
        };

        let boxes = self.align_boxes(&fetched)?;
        let frames = self.postprocess(&fetched.frames, &params)?;
        let label = normalize_label(
            self.manifest.entries()[fetched.index].label,
            self.cfg.model.num_classes,
        );
        debug!(
            requested = index,
            index = fetched.index,
            attempts = fetched.attempts,
            time_diff = fetched.time_diff,
            "Prepared clip sample"
        );

        Ok(ClipSample {
            frames,
            label,
            index: fetched.index,
            time_index: fetched.time_index.to_array(),
            extra: Map::new(),
            boxes,
        })
    }

    fn decode_request(&self, params: &SamplingParams) -> DecodeRequest {
        let data = &self.cfg.data;
        let train = self.mode == Mode::Train;
        DecodeRequest {
            sampling_rate: data.sampling_rate,
            num_frames: data.num_frames,
            temporal_index: params.temporal,
            num_ensemble_views: self.cfg.test.num_ensemble_views,
            target_fps: data.target_fps,
            backend: data.decoding_backend.clone(),
            use_offset: data.use_offset_sampling,
            max_spatial_scale: if params.min_scale == params.max_scale {
                params.min_scale
            } else {
                0
            },
            time_diff_prob: if train { data.time_diff_prob } else { 0.0 },
            temporally_rnd_clips: true,
            min_delta: self.cfg.contrastive.delta_clips_min,
            max_delta: self.cfg.contrastive.delta_clips_max,
        }
    }

    fn align_boxes(&mut self, fetched: &FetchedClip) -> Result<Array4<i64>> {
        if !self.cfg.annotations.enabled {
            return Ok(Array4::zeros((fetched.frame_indices.len(), 0, 4, 2)));
        }
        let _timer = self.metrics.start_phase("align");
        let identity = VideoIdentity::from_path(&fetched.path, &self.cfg.annotations)?;
        self.keypoints.align(&identity, &fetched.frame_indices)
    }

    fn postprocess(&mut self, frames: &Array4<u8>, params: &SamplingParams) -> Result<Vec<Array4<f32>>> {
        let _timer = self.metrics.start_phase("postprocess");
        let train = self.mode == Mode::Train;
        let sampler = SpatialSampler {
            spatial: params.spatial,
            min_scale: params.min_scale,
            max_scale: params.max_scale,
            crop_size: params.crop_size,
            random_flip: train && self.cfg.data.random_flip,
            flip_prob: self.cfg.data.flip_prob,
            inverse_uniform: self.cfg.data.inv_uniform_sample,
            motion_shift: train
                && self.cfg.data.train_jitter_motion_shift
                && params.spatial == SampleIndex::Random,
            filter: self.filter,
        };
        let frames = sampler.apply(to_float_cthw(frames), &mut self.rng)?;
        self.packer.pack(frames)
    }
}

fn resolve_filter(cfg: &DatasetConfig) -> Result<FilterType> {
    map_filter(&cfg.data.interpolation).ok_or_else(|| {
        DatasetError::InvalidConfig(format!(
            "unknown interpolation filter '{}'",
            cfg.data.interpolation
        ))
    })
}
