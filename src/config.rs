//! Configuration snapshots for the enhancement engine.
//!
//! A config is an immutable snapshot: it is validated once, used to size and
//! initialize filter state, and replaced wholesale via `set_config` (which
//! resets the filter). Numeric defaults here are the tuned deployment
//! values; per-module numerical guards (epsilon floors, iteration caps) live
//! as `const` tables next to the code they protect.

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Noise-estimation strategy feeding the per-bin noise PSD each frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum NoiseMode {
    /// Internal recursive averaging, gated by an energy-ratio voice-activity
    /// heuristic: bins that look speech-dominated hold their estimate.
    #[default]
    Simple,
    /// Internal asymmetric floor tracking: fast to follow the spectrum down,
    /// very slow to follow it up, so speech cannot drag the floor along.
    Mcra,
    /// Delegate to an injected [`NoiseEstimator`](crate::NoiseEstimator)
    /// collaborator (e.g. a full IMCRA implementation).
    ImcraFull,
}

/// Tuning for one Wiener/MMSE-LSA filter pass.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WienerConfig {
    /// STFT size; the filter processes `fft_size / 2 + 1` magnitude bins.
    pub fft_size: usize,
    pub sample_rate: f32,

    /// Decision-directed smoothing weight (0-1). Larger trusts the previous
    /// frame's implied SNR more; smaller tracks transients faster.
    pub alpha: f32,

    /// Hard floor on the suppression gain, preventing total muting.
    pub min_gain: f32,
    /// Hard ceiling on the suppression gain, preventing over-gain.
    pub max_gain: f32,

    /// MMSE-LSA gain law when true, classical Wiener law when false.
    pub use_lsa: bool,

    /// Clamp range for the a-priori SNR estimate.
    pub xi_min: f32,
    pub xi_max: f32,

    /// Temporal exponential smoothing of the final gain across frames (0-1).
    pub gain_smoothing: f32,
    /// Strength of the 3-point spectral smoothing of the gain curve (0-1).
    pub frequency_smoothing: f32,

    pub use_perceptual_weighting: bool,
    /// Blend between flat (0.0) and fully A-weighted (1.0) SNR weighting.
    pub perceptual_factor: f32,

    pub noise_mode: NoiseMode,
}

impl Default for WienerConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            sample_rate: 48_000.0,
            alpha: 0.98,
            min_gain: 0.1,
            max_gain: 1.0,
            use_lsa: true,
            xi_min: 1e-3,
            xi_max: 1e3,
            gain_smoothing: 0.3,
            frequency_smoothing: 0.5,
            use_perceptual_weighting: false,
            perceptual_factor: 0.5,
            noise_mode: NoiseMode::Simple,
        }
    }
}

impl WienerConfig {
    /// Number of magnitude bins per frame for this config.
    pub fn num_bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn validate(&self) -> Result<(), Error> {
        if self.fft_size < 16 || self.fft_size % 2 != 0 {
            return Err(Error::InvalidConfig("fft_size must be even and >= 16"));
        }
        if !(self.sample_rate > 0.0) {
            return Err(Error::InvalidConfig("sample_rate must be positive"));
        }
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(Error::InvalidConfig("alpha must be in 0..=1"));
        }
        if !(self.min_gain >= 0.0 && self.min_gain <= self.max_gain) {
            return Err(Error::InvalidConfig("require 0 <= min_gain <= max_gain"));
        }
        if !(self.xi_min >= 0.0 && self.xi_min <= self.xi_max) {
            return Err(Error::InvalidConfig("require 0 <= xi_min <= xi_max"));
        }
        if !(0.0..=1.0).contains(&self.gain_smoothing) {
            return Err(Error::InvalidConfig("gain_smoothing must be in 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.frequency_smoothing) {
            return Err(Error::InvalidConfig("frequency_smoothing must be in 0..=1"));
        }
        if !(0.0..=1.0).contains(&self.perceptual_factor) {
            return Err(Error::InvalidConfig("perceptual_factor must be in 0..=1"));
        }
        Ok(())
    }
}

/// Tuning for the two-step cascade.
///
/// Step 1 is deliberately conservative (high gain floor, faster-tracking
/// SNR) to avoid speech distortion; step 2 is aggressive and cleans up the
/// residual noise step 1 leaves behind.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TwoStepConfig {
    pub step1: WienerConfig,
    pub step2: WienerConfig,

    /// Exponential smoothing coefficient for the residual-noise tracker
    /// (weight on the previous estimate).
    pub residual_smoothing: f32,
    /// The residual estimate only moves when the instantaneous residual
    /// exceeds this multiple of its current value.
    pub residual_update_factor: f32,
}

impl Default for TwoStepConfig {
    fn default() -> Self {
        let base = WienerConfig::default();
        Self {
            step1: WienerConfig {
                alpha: 0.95,
                min_gain: 0.35,
                gain_smoothing: 0.4,
                ..base
            },
            step2: WienerConfig {
                alpha: 0.98,
                min_gain: 0.08,
                gain_smoothing: 0.3,
                ..base
            },
            residual_smoothing: 0.9,
            residual_update_factor: 1.5,
        }
    }
}

impl TwoStepConfig {
    pub fn validate(&self) -> Result<(), Error> {
        self.step1.validate()?;
        self.step2.validate()?;
        if self.step1.fft_size != self.step2.fft_size {
            return Err(Error::InvalidConfig("step fft_size values must match"));
        }
        if !(0.0..=1.0).contains(&self.residual_smoothing) {
            return Err(Error::InvalidConfig("residual_smoothing must be in 0..=1"));
        }
        if !(self.residual_update_factor >= 1.0) {
            return Err(Error::InvalidConfig("residual_update_factor must be >= 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        WienerConfig::default().validate().unwrap();
        TwoStepConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_bad_fields() {
        let mut cfg = WienerConfig::default();
        cfg.fft_size = 17;
        assert!(cfg.validate().is_err());

        let mut cfg = WienerConfig::default();
        cfg.min_gain = 0.5;
        cfg.max_gain = 0.2;
        assert!(cfg.validate().is_err());

        let mut cfg = WienerConfig::default();
        cfg.alpha = 1.5;
        assert!(cfg.validate().is_err());

        let mut two = TwoStepConfig::default();
        two.step2.fft_size = 1024;
        assert!(two.validate().is_err());
    }

    #[test]
    fn test_num_bins() {
        let cfg = WienerConfig {
            fft_size: 512,
            ..Default::default()
        };
        assert_eq!(cfg.num_bins(), 257);
    }
}
