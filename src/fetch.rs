//! Bounded retry loop around container acquisition and clip decoding.
//!
//! Each trial walks `Acquire -> Decode -> Validate` and ends either with a
//! usable clip or a failure. Failed trials may swap the requested video for a
//! random one (see [`RetryPolicy`]) before the next trial starts. Only
//! exhausting the retry budget surfaces as an error; container and decode
//! failures are logged and absorbed.

use std::path::{Path, PathBuf};

use ndarray::{Array4, Axis};
use rand::{Rng, RngCore};
use tracing::{debug, info, instrument, warn};

use crate::error::{DatasetError, Result};
use crate::manifest::Manifest;
use crate::observability::{FetchEvent, MetricsCollector};
use crate::sampling::Mode;
use crate::video::{DecodeRequest, DecodedClip, OpenOptions, TimeIndex, VideoBackend, VideoMetaCache};

/// When a failed trial replaces the requested video with a random one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub num_retries: usize,
    /// Test fetches always retry the same video.
    pub replace_on_failure: bool,
}

impl RetryPolicy {
    pub fn new(num_retries: usize, mode: Mode) -> Self {
        Self {
            num_retries,
            replace_on_failure: !mode.is_test(),
        }
    }

    /// One eighth of the budget.
    pub fn grace_trials(&self) -> usize {
        self.num_retries / 8
    }

    /// Open failures only trigger replacement once the grace period is over.
    pub fn replace_after_open_failure(&self, trial: usize) -> bool {
        self.replace_on_failure && trial > self.grace_trials()
    }

    /// Decode failures trigger replacement every `grace_trials` trials,
    /// starting with the first. A budget under eight replaces every time.
    pub fn replace_after_decode_failure(&self, trial: usize) -> bool {
        if !self.replace_on_failure {
            return false;
        }
        match self.grace_trials() {
            0 => true,
            grace => trial % grace == 0,
        }
    }
}

/// Everything one fetch borrows from its dataset.
pub struct FetchContext<'a, B: VideoBackend> {
    pub manifest: &'a Manifest,
    pub backend: &'a B,
    pub meta_cache: &'a mut VideoMetaCache,
    pub open_options: &'a OpenOptions,
    pub request: &'a DecodeRequest,
    pub policy: RetryPolicy,
    pub metrics: &'a MetricsCollector,
}

/// A validated clip and the index it was finally decoded from.
#[derive(Debug, Clone)]
pub struct FetchedClip {
    pub index: usize,
    pub path: PathBuf,
    /// `(time, height, width, channel)` bytes.
    pub frames: Array4<u8>,
    pub time_index: TimeIndex,
    pub time_diff: bool,
    pub frame_indices: Vec<usize>,
    /// Trials used, including the successful one.
    pub attempts: usize,
}

enum FetchState<C> {
    Acquire,
    Decode(C),
    Validate(Option<DecodedClip>),
}

enum TrialOutcome {
    Ready {
        frames: Array4<u8>,
        clip: DecodedClip,
    },
    OpenFailed,
    DecodeFailed,
}

/// Fetches a clip for `index`, retrying up to `policy.num_retries` times.
#[instrument(level = "debug", skip_all, fields(index = index))]
pub fn fetch_clip<B, R>(ctx: &mut FetchContext<'_, B>, index: usize, rng: &mut R) -> Result<FetchedClip>
where
    B: VideoBackend,
    R: RngCore,
{
    let len = ctx.manifest.len();
    if index >= len {
        return Err(DatasetError::IndexOutOfRange { index, len });
    }

    let mut index = index;
    for trial in 0..ctx.policy.num_retries {
        ctx.metrics.record(FetchEvent::Attempt);
        match run_trial(ctx, index, trial, rng)? {
            TrialOutcome::Ready { frames, clip } => {
                ctx.metrics.record(FetchEvent::Success);
                let path = ctx.manifest.entries()[index].path.clone();
                debug!(index, trial, path = %path.display(), "Fetched clip");
                return Ok(FetchedClip {
                    index,
                    path,
                    frames,
                    time_index: clip.time_index,
                    time_diff: clip.time_diff,
                    frame_indices: clip.frame_indices,
                    attempts: trial + 1,
                });
            }
            TrialOutcome::OpenFailed => {
                if ctx.policy.replace_after_open_failure(trial) {
                    index = replace_index(ctx, index, rng);
                }
            }
            TrialOutcome::DecodeFailed => {
                if ctx.policy.replace_after_decode_failure(trial) {
                    index = replace_index(ctx, index, rng);
                }
            }
        }
    }

    ctx.metrics.record(FetchEvent::Exhausted);
    Err(DatasetError::RetriesExhausted {
        index,
        path: ctx.manifest.entries()[index].path.clone(),
        attempts: ctx.policy.num_retries,
    })
}

fn run_trial<B, R>(
    ctx: &mut FetchContext<'_, B>,
    index: usize,
    trial: usize,
    rng: &mut R,
) -> Result<TrialOutcome>
where
    B: VideoBackend,
    R: RngCore,
{
    let manifest = ctx.manifest;
    let path = manifest.entries()[index].path.as_path();
    let mut state = FetchState::Acquire;
    loop {
        state = match state {
            FetchState::Acquire => {
                let _timer = ctx.metrics.start_phase("open");
                match ctx.backend.open(path, ctx.open_options) {
                    Ok(Some(container)) => FetchState::Decode(container),
                    Ok(None) => {
                        info!(path = %path.display(), "Video container is empty");
                        return Ok(open_failed(ctx, index, path, trial));
                    }
                    Err(err) => {
                        info!(path = %path.display(), error = %err, "Failed to load video");
                        return Ok(open_failed(ctx, index, path, trial));
                    }
                }
            }
            FetchState::Decode(mut container) => {
                let _timer = ctx.metrics.start_phase("decode");
                let decoded = ctx.meta_cache.with_meta(index, |meta| {
                    ctx.backend.decode(&mut container, ctx.request, meta, &mut *rng)
                });
                match decoded {
                    Ok(clip) => FetchState::Validate(clip),
                    Err(err) if err.is_transient() => {
                        debug!(path = %path.display(), error = %err, "Decoder error");
                        FetchState::Validate(None)
                    }
                    Err(err) => return Err(err),
                }
            }
            FetchState::Validate(clip) => {
                let Some(mut clip) = clip else {
                    return Ok(decode_failed(ctx, index, path, trial));
                };
                return Ok(match clip.frames.take() {
                    Some(frames) if frames.len_of(Axis(0)) > 0 => TrialOutcome::Ready { frames, clip },
                    _ => decode_failed(ctx, index, path, trial),
                });
            }
        };
    }
}

fn open_failed<B: VideoBackend>(
    ctx: &FetchContext<'_, B>,
    index: usize,
    path: &Path,
    trial: usize,
) -> TrialOutcome {
    ctx.metrics.record(FetchEvent::ContainerFailure);
    warn!(index, path = %path.display(), trial, "Failed to meta load video");
    TrialOutcome::OpenFailed
}

fn decode_failed<B: VideoBackend>(
    ctx: &FetchContext<'_, B>,
    index: usize,
    path: &Path,
    trial: usize,
) -> TrialOutcome {
    ctx.metrics.record(FetchEvent::DecodeFailure);
    warn!(index, path = %path.display(), trial, "Failed to decode video");
    TrialOutcome::DecodeFailed
}

fn replace_index<B: VideoBackend, R: RngCore>(
    ctx: &FetchContext<'_, B>,
    index: usize,
    rng: &mut R,
) -> usize {
    let replacement = rng.gen_range(0..ctx.manifest.len());
    ctx.metrics.record(FetchEvent::Replacement);
    debug!(from = index, to = replacement, "Replacing video index");
    replacement
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_wait_out_the_grace_period() {
        let policy = RetryPolicy::new(100, Mode::Train);
        assert_eq!(policy.grace_trials(), 12);
        assert!(!policy.replace_after_open_failure(0));
        assert!(!policy.replace_after_open_failure(12));
        assert!(policy.replace_after_open_failure(13));
    }

    #[test]
    fn decode_failures_replace_periodically() {
        let policy = RetryPolicy::new(100, Mode::Val);
        assert!(policy.replace_after_decode_failure(0));
        assert!(!policy.replace_after_decode_failure(5));
        assert!(policy.replace_after_decode_failure(24));
    }

    #[test]
    fn small_budgets_replace_every_decode_failure() {
        let policy = RetryPolicy::new(4, Mode::Train);
        assert!((0..4).all(|trial| policy.replace_after_decode_failure(trial)));
    }

    #[test]
    fn test_split_never_replaces() {
        let policy = RetryPolicy::new(100, Mode::Test);
        assert!((0..100).all(|trial| {
            !policy.replace_after_open_failure(trial) && !policy.replace_after_decode_failure(trial)
        }));
    }
}
