pub mod annotations;
pub mod config;
pub mod dataset;
pub mod error;
pub mod fetch;
pub mod manifest;
pub mod observability;
pub mod pathway;
pub mod sampling;
pub mod transform;
pub mod validation;
pub mod video;

pub use config::DatasetConfig;
pub use dataset::{ClipDataset, ClipSample};
pub use error::{DatasetError, Result};
pub use manifest::{Manifest, ManifestEntry};
pub use sampling::{Mode, SampleIndex, SamplingParams};
pub use video::{DecodeRequest, DecodedClip, OpenOptions, VideoBackend, VideoMeta};
