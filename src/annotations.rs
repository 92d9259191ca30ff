//! Per-frame bounding boxes for decoded clips.
//!
//! Each annotated video has a JSON side file `<keypoint_dir>/<stem>_kpts`
//! mapping the video name to `frame<N>` labels, and each label to a list of
//! polygons (lists of `[x, y]` points). Side files are loaded the first time a
//! video is fetched and kept for the lifetime of the store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use ndarray::Array4;
use tracing::debug;

use crate::config::AnnotationConfig;
use crate::error::{DatasetError, Result};

pub type Point = [f64; 2];
pub type Polygon = Vec<Point>;
/// Corners `(x_min, y_min)`, `(x_max, y_min)`, `(x_max, y_max)`, `(x_min, y_max)`.
pub type Rect = [[i64; 2]; 4];

/// Frame label to polygons, per video name.
pub type KeypointFile = HashMap<String, HashMap<String, Vec<Polygon>>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoIdentity {
    /// File stem with the configured suffix removed, e.g. `video93`.
    pub stem: String,
    /// Key inside the side file, e.g. `video93.mp4`.
    pub key: String,
}

impl VideoIdentity {
    pub fn from_path(path: &Path, cfg: &AnnotationConfig) -> Result<Self> {
        let file_stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| {
                DatasetError::Annotation(format!("no file name in {}", path.display()))
            })?;
        let stem = file_stem
            .strip_suffix(cfg.name_suffix.as_str())
            .unwrap_or(file_stem)
            .to_string();
        let key = format!("{stem}{}", cfg.extension);
        Ok(Self { stem, key })
    }

    pub fn side_file(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}_kpts", self.stem))
    }
}

/// Reduces a polygon to its axis-aligned bounding rectangle. Coordinates are
/// truncated to integers first.
pub fn bounding_rect(points: &[Point]) -> Option<Rect> {
    let mut iter = points.iter().map(|[x, y]| (*x as i64, *y as i64));
    let (x0, y0) = iter.next()?;
    let (x_min, x_max, y_min, y_max) = iter.fold((x0, x0, y0, y0), |acc, (x, y)| {
        (acc.0.min(x), acc.1.max(x), acc.2.min(y), acc.3.max(y))
    });
    Some([[x_min, y_min], [x_max, y_min], [x_max, y_max], [x_min, y_max]])
}

/// Stacks per-frame rectangles into a `(frames, boxes, 4, 2)` tensor. Every
/// frame must carry the same number of boxes.
pub fn stack_rects(frames: &[Vec<Rect>]) -> Result<Array4<i64>> {
    let boxes = frames.first().map_or(0, Vec::len);
    if let Some(pos) = frames.iter().position(|rects| rects.len() != boxes) {
        return Err(DatasetError::Annotation(format!(
            "frame {pos} has {} boxes, expected {boxes}",
            frames[pos].len()
        )));
    }
    let mut out = Array4::<i64>::zeros((frames.len(), boxes, 4, 2));
    for (f, rects) in frames.iter().enumerate() {
        for (b, rect) in rects.iter().enumerate() {
            for (corner, [x, y]) in rect.iter().enumerate() {
                out[[f, b, corner, 0]] = *x;
                out[[f, b, corner, 1]] = *y;
            }
        }
    }
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct KeypointStore {
    dir: PathBuf,
    cache: HashMap<String, KeypointFile>,
}

impl KeypointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            cache: HashMap::new(),
        }
    }

    fn load(&mut self, identity: &VideoIdentity) -> Result<&KeypointFile> {
        if !self.cache.contains_key(&identity.stem) {
            let path = identity.side_file(&self.dir);
            let content = std::fs::read_to_string(&path).map_err(|err| {
                DatasetError::Annotation(format!("failed to read {}: {err}", path.display()))
            })?;
            let parsed: KeypointFile = serde_json::from_str(&content).map_err(|err| {
                DatasetError::Annotation(format!("failed to parse {}: {err}", path.display()))
            })?;
            debug!(video = %identity.stem, path = %path.display(), "Loaded keypoint file");
            self.cache.insert(identity.stem.clone(), parsed);
        }
        self.cache
            .get(&identity.stem)
            .ok_or_else(|| DatasetError::Annotation(format!("{} not cached", identity.stem)))
    }

    /// Rectangles for each decoded source frame, in decode order.
    pub fn align(&mut self, identity: &VideoIdentity, frame_indices: &[usize]) -> Result<Array4<i64>> {
        let file = self.load(identity)?;
        let frames = file.get(&identity.key).ok_or_else(|| {
            DatasetError::Annotation(format!("no keypoints for video {}", identity.key))
        })?;

        let mut per_frame = Vec::with_capacity(frame_indices.len());
        for frame_num in frame_indices {
            let label = format!("frame{frame_num}");
            let polygons = frames.get(&label).ok_or_else(|| {
                DatasetError::Annotation(format!("{} has no entry for {label}", identity.key))
            })?;
            let rects = polygons
                .iter()
                .map(|polygon| {
                    bounding_rect(polygon).ok_or_else(|| {
                        DatasetError::Annotation(format!(
                            "empty polygon in {} {label}",
                            identity.key
                        ))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            per_frame.push(rects);
        }
        stack_rects(&per_frame)
    }
}
