//! Noise-PSD tracking.
//!
//! The filter needs a per-bin noise power estimate `lambda_n` every frame.
//! Two lightweight trackers live here; anything heavier (a full IMCRA, an
//! ML-driven estimator) plugs in through the [`NoiseEstimator`] trait and is
//! selected with [`NoiseMode::ImcraFull`](crate::NoiseMode::ImcraFull).

use crate::config::NoiseMode;

// Recursive-averaging coefficient for the VAD-gated tracker.
const NOISE_ALPHA: f32 = 0.95;
// A bin whose power exceeds this multiple of its noise estimate is treated
// as speech-dominated and the estimate holds.
const VAD_ENERGY_RATIO: f32 = 5.0;
// Fast unconditional adaptation while the floor seeds from real signal.
const STARTUP_ALPHA: f32 = 0.8;
const STARTUP_FRAMES: u64 = 20;

// Asymmetric ballistics for the floor tracker: fast attack downward, very
// slow release upward so speech cannot drag the floor along.
const FLOOR_ATTACK: f32 = 0.90;
const FLOOR_RELEASE: f32 = 0.999;

// Keeps lambda_n strictly positive; gamma divides by it.
pub(crate) const NOISE_PSD_FLOOR: f32 = 1e-10;
// Starting noise power before anything has been observed.
pub(crate) const NOISE_PSD_INIT: f32 = 1e-4;

/// Pluggable noise estimator collaborator.
///
/// Called once per frame with the input magnitude spectrum; fills a noise
/// magnitude estimate and a per-bin speech-presence probability of the same
/// length. The engine squares the noise output into its `lambda_n` power
/// estimate and ignores the speech probability (it is part of the interface
/// for estimators that compute it anyway).
pub trait NoiseEstimator {
    fn estimate(&mut self, magnitude: &[f32], noise: &mut [f32], speech_prob: &mut [f32]);

    /// Clear history (stream discontinuity).
    fn reset(&mut self);
}

/// Per-filter noise tracking state, one of the internal strategies or a
/// boxed external collaborator.
pub(crate) enum NoiseTracker {
    Simple { frame_count: u64 },
    Floor,
    External(ExternalTracker),
}

pub(crate) struct ExternalTracker {
    estimator: Box<dyn NoiseEstimator>,
    noise_scratch: Vec<f32>,
    speech_scratch: Vec<f32>,
}

impl NoiseTracker {
    pub(crate) fn new(mode: NoiseMode, estimator: Option<Box<dyn NoiseEstimator>>) -> Self {
        match mode {
            NoiseMode::Simple => NoiseTracker::Simple { frame_count: 0 },
            NoiseMode::Mcra => NoiseTracker::Floor,
            NoiseMode::ImcraFull => {
                let estimator = estimator.expect("ImcraFull requires an estimator");
                NoiseTracker::External(ExternalTracker {
                    estimator,
                    noise_scratch: Vec::new(),
                    speech_scratch: Vec::new(),
                })
            }
        }
    }

    /// Size scratch buffers for `num_bins`; called at construction and on
    /// reconfiguration, never per frame.
    pub(crate) fn resize(&mut self, num_bins: usize) {
        if let NoiseTracker::External(ext) = self {
            ext.noise_scratch.resize(num_bins, 0.0);
            ext.speech_scratch.resize(num_bins, 0.0);
        }
    }

    pub(crate) fn reset(&mut self) {
        match self {
            NoiseTracker::Simple { frame_count } => *frame_count = 0,
            NoiseTracker::Floor => {}
            NoiseTracker::External(ext) => {
                ext.estimator.reset();
                ext.noise_scratch.fill(0.0);
                ext.speech_scratch.fill(0.0);
            }
        }
    }

    /// Update `lambda_n` (noise power per bin) from this frame's magnitudes.
    pub(crate) fn update(&mut self, magnitude: &[f32], lambda_n: &mut [f32]) {
        debug_assert_eq!(magnitude.len(), lambda_n.len());

        match self {
            NoiseTracker::Simple { frame_count } => {
                let startup = *frame_count < STARTUP_FRAMES;
                for (m, lambda) in magnitude.iter().zip(lambda_n.iter_mut()) {
                    let y2 = m * m;
                    if startup {
                        *lambda = STARTUP_ALPHA * *lambda + (1.0 - STARTUP_ALPHA) * y2;
                    } else if y2 < VAD_ENERGY_RATIO * *lambda {
                        // Likely noise-only; speech-dominated bins hold.
                        *lambda = NOISE_ALPHA * *lambda + (1.0 - NOISE_ALPHA) * y2;
                    }
                    *lambda = lambda.max(NOISE_PSD_FLOOR);
                }
                *frame_count += 1;
            }
            NoiseTracker::Floor => {
                for (m, lambda) in magnitude.iter().zip(lambda_n.iter_mut()) {
                    let y2 = m * m;
                    *lambda = if y2 < *lambda {
                        FLOOR_ATTACK * *lambda + (1.0 - FLOOR_ATTACK) * y2
                    } else {
                        FLOOR_RELEASE * *lambda + (1.0 - FLOOR_RELEASE) * y2
                    };
                    *lambda = lambda.max(NOISE_PSD_FLOOR);
                }
            }
            NoiseTracker::External(ext) => {
                ext.estimator
                    .estimate(magnitude, &mut ext.noise_scratch, &mut ext.speech_scratch);
                for (n, lambda) in ext.noise_scratch.iter().zip(lambda_n.iter_mut()) {
                    *lambda = (n * n).max(NOISE_PSD_FLOOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frames(tracker: &mut NoiseTracker, magnitude: &[f32], lambda: &mut [f32], n: usize) {
        for _ in 0..n {
            tracker.update(magnitude, lambda);
        }
    }

    #[test]
    fn test_simple_converges_on_stationary_noise() {
        let mut tracker = NoiseTracker::new(NoiseMode::Simple, None);
        let mut lambda = vec![NOISE_PSD_INIT; 8];
        let mag = vec![0.1f32; 8];
        run_frames(&mut tracker, &mag, &mut lambda, 400);
        for &l in &lambda {
            assert!((l - 0.01).abs() < 1e-3, "lambda = {l}");
        }
    }

    #[test]
    fn test_simple_holds_during_speech() {
        let mut tracker = NoiseTracker::new(NoiseMode::Simple, None);
        let mut lambda = vec![NOISE_PSD_INIT; 4];
        let noise = vec![0.1f32; 4];
        run_frames(&mut tracker, &noise, &mut lambda, 200);
        let settled = lambda.clone();

        // A loud burst fails the energy-ratio gate and must not be learned.
        let speech = vec![1.0f32; 4];
        run_frames(&mut tracker, &speech, &mut lambda, 50);
        for (s, l) in settled.iter().zip(lambda.iter()) {
            assert!((s - l).abs() < 1e-6);
        }
    }

    #[test]
    fn test_floor_tracker_is_asymmetric() {
        let mut tracker = NoiseTracker::new(NoiseMode::Mcra, None);
        let mut lambda = vec![0.01f32; 1];

        // Upward motion is slow.
        tracker.update(&[1.0], &mut lambda);
        assert!(lambda[0] < 0.012);

        // Downward motion is fast.
        lambda[0] = 0.01;
        tracker.update(&[0.0], &mut lambda);
        assert!(lambda[0] < 0.0095);
    }

    #[test]
    fn test_reset_restarts_startup_learning() {
        let mut tracker = NoiseTracker::new(NoiseMode::Simple, None);
        let mut lambda = vec![NOISE_PSD_INIT; 1];
        run_frames(&mut tracker, &[0.5], &mut lambda, STARTUP_FRAMES as usize + 5);
        tracker.reset();

        // After reset the startup phase adapts unconditionally again, even
        // to values the VAD gate would otherwise reject.
        lambda[0] = 1e-6;
        tracker.update(&[0.5], &mut lambda);
        assert!(lambda[0] > 0.04);
    }

    struct StubEstimator(f32);

    impl NoiseEstimator for StubEstimator {
        fn estimate(&mut self, _magnitude: &[f32], noise: &mut [f32], speech_prob: &mut [f32]) {
            noise.fill(self.0);
            speech_prob.fill(0.0);
        }
        fn reset(&mut self) {}
    }

    #[test]
    fn test_external_estimator_is_squared_into_lambda() {
        let mut tracker = NoiseTracker::new(NoiseMode::ImcraFull, Some(Box::new(StubEstimator(0.2))));
        tracker.resize(4);
        let mut lambda = vec![NOISE_PSD_INIT; 4];
        tracker.update(&[0.0; 4], &mut lambda);
        for &l in &lambda {
            assert!((l - 0.04).abs() < 1e-7);
        }
    }
}
