//! Adaptive Wiener / MMSE-LSA spectral gain filter.
//!
//! One instance owns the full per-bin SNR state for a single spectral
//! stream and processes exactly one frame per call:
//!
//! 1. Update the noise power estimate `lambda_n` (internal tracker or the
//!    injected collaborator, per `noise_mode`).
//! 2. A-posteriori SNR: `gamma = Y^2 / lambda_n`.
//! 3. A-priori SNR via the decision-directed recursion (Ephraim & Malah):
//!    `xi = alpha * Gprev^2 * gamma_prev + (1 - alpha) * max(gamma - 1, 0)`,
//!    clamped to `[xi_min, xi_max]`, optionally perceptually reweighted.
//! 4. Gain law: classical Wiener `xi / (1 + xi)` or MMSE-LSA
//!    `xi/(1+xi) * exp(E1(v)/2)` with `v = xi/(1+xi) * gamma`.
//! 5. Temporal then 3-point spectral gain smoothing (musical-noise control).
//! 6. Apply the gain to the magnitudes; remember it for the next frame.
//!
//! The steady-state frame path allocates nothing: every working vector is
//! sized at construction or reconfiguration.
//!
//! # Lifecycle
//! - `new` / `with_estimator` validate the config and build a fresh state.
//! - `set_config` replaces the snapshot, resizes state and resets history.
//! - `reset` clears history in place (stream discontinuity).
//!
//! Not internally synchronized: one instance belongs to one processing
//! thread. Independent instances share nothing and may run concurrently.

use log::debug;

use crate::config::{NoiseMode, WienerConfig};
use crate::error::Error;
use crate::expint;
use crate::noise::{NoiseEstimator, NoiseTracker, NOISE_PSD_FLOOR, NOISE_PSD_INIT};
use crate::utils::{a_weighting_gain, lerp};

// Below this, exp(E1(v)/2) is ill-conditioned and the stable small-argument
// form v/(1+v) substitutes for the LSA gain.
const LSA_V_MIN: f32 = 1e-6;

// Perceptual weight clamp: keeps the DC bin (A-weight 0) from nulling the
// SNR, and caps the presence-region boost.
const PERCEPTUAL_WEIGHT_MIN: f32 = 0.05;
const PERCEPTUAL_WEIGHT_MAX: f32 = 2.0;

// Gain history starting value; in range by config validation (max_gain).
const XI_INIT: f32 = 1.0;
const GAMMA_INIT: f32 = 1.0;

/// Per-bin filter memory, persisting across frames like IIR state.
struct FilterState {
    /// A-priori SNR, clamped to `[xi_min, xi_max]`.
    xi: Vec<f32>,
    /// A-posteriori SNR, >= 0.
    gamma: Vec<f32>,
    /// Current suppression gain, in `[min_gain, max_gain]`.
    g: Vec<f32>,
    /// Previous frame's gain (decision-directed memory).
    g_prev: Vec<f32>,
    /// Noise power estimate, kept strictly positive.
    lambda_n: Vec<f32>,
    /// MMSE-LSA intermediate `v`; valid only when the LSA law is active.
    v: Vec<f32>,
    /// Unsmoothed LSA gain (diagnostic counterpart of `v`).
    gh1: Vec<f32>,
    /// Read-only after construction.
    perceptual_weight: Vec<f32>,

    // Scratch feeding the batched E1 evaluation and the complex entry point.
    v_wide: Vec<f64>,
    e1_wide: Vec<f64>,
    mag_scratch: Vec<f32>,
}

impl FilterState {
    fn sized(num_bins: usize) -> Self {
        Self {
            xi: vec![XI_INIT; num_bins],
            gamma: vec![GAMMA_INIT; num_bins],
            g: vec![1.0; num_bins],
            g_prev: vec![1.0; num_bins],
            lambda_n: vec![NOISE_PSD_INIT; num_bins],
            v: vec![0.0; num_bins],
            gh1: vec![1.0; num_bins],
            perceptual_weight: vec![1.0; num_bins],
            v_wide: vec![0.0; num_bins],
            e1_wide: vec![0.0; num_bins],
            mag_scratch: vec![0.0; num_bins],
        }
    }
}

/// Single-pass adaptive spectral noise filter.
pub struct WienerFilter {
    config: WienerConfig,
    num_bins: usize,
    state: FilterState,
    tracker: NoiseTracker,
}

impl WienerFilter {
    /// Build a filter using one of the internal noise trackers.
    pub fn new(config: WienerConfig) -> Result<Self, Error> {
        if config.noise_mode == NoiseMode::ImcraFull {
            return Err(Error::InvalidConfig(
                "ImcraFull mode requires with_estimator",
            ));
        }
        Self::build(config, None)
    }

    /// Build a filter that delegates noise estimation to `estimator`
    /// whenever `noise_mode` is [`NoiseMode::ImcraFull`].
    pub fn with_estimator(
        config: WienerConfig,
        estimator: Box<dyn NoiseEstimator>,
    ) -> Result<Self, Error> {
        Self::build(config, Some(estimator))
    }

    fn build(
        config: WienerConfig,
        estimator: Option<Box<dyn NoiseEstimator>>,
    ) -> Result<Self, Error> {
        config.validate()?;
        let num_bins = config.num_bins();
        let mut tracker = NoiseTracker::new(config.noise_mode, estimator);
        tracker.resize(num_bins);

        let mut filter = Self {
            config,
            num_bins,
            state: FilterState::sized(num_bins),
            tracker,
        };
        filter.rebuild_perceptual_weights();
        filter.reset();
        debug!(
            "wiener filter ready: {} bins, lsa = {}, noise mode = {:?}",
            num_bins, filter.config.use_lsa, filter.config.noise_mode
        );
        Ok(filter)
    }

    /// Replace the configuration. Resizes all state and resets history.
    pub fn set_config(&mut self, config: WienerConfig) -> Result<(), Error> {
        config.validate()?;
        if config.noise_mode == NoiseMode::ImcraFull
            && !matches!(self.tracker, NoiseTracker::External(_))
        {
            return Err(Error::InvalidConfig(
                "ImcraFull mode requires with_estimator",
            ));
        }
        if config.noise_mode != self.config.noise_mode {
            self.tracker = NoiseTracker::new(config.noise_mode, None);
        }
        self.config = config;
        self.num_bins = config.num_bins();
        self.state = FilterState::sized(self.num_bins);
        self.tracker.resize(self.num_bins);
        self.rebuild_perceptual_weights();
        self.reset();
        debug!("wiener filter reconfigured: {} bins", self.num_bins);
        Ok(())
    }

    /// Clear all cross-frame history without touching the configuration.
    pub fn reset(&mut self) {
        let s = &mut self.state;
        s.xi.fill(XI_INIT);
        s.gamma.fill(GAMMA_INIT);
        s.g.fill(self.config.max_gain);
        s.g_prev.fill(self.config.max_gain);
        s.lambda_n.fill(NOISE_PSD_INIT);
        s.v.fill(0.0);
        s.gh1.fill(self.config.max_gain);
        self.tracker.reset();
        debug!("wiener filter state reset");
    }

    pub fn num_bins(&self) -> usize {
        self.num_bins
    }

    pub fn config(&self) -> &WienerConfig {
        &self.config
    }

    /// Current suppression gain per bin (post-smoothing).
    pub fn gain(&self) -> &[f32] {
        &self.state.g
    }

    /// Current a-priori SNR estimate per bin.
    pub fn a_priori_snr(&self) -> &[f32] {
        &self.state.xi
    }

    /// Current noise power estimate per bin.
    pub fn noise_psd(&self) -> &[f32] {
        &self.state.lambda_n
    }

    /// MMSE-LSA intermediates `(v, GH1)`: the E1 argument and the raw
    /// unclamped LSA gain. Meaningful only while `use_lsa` is set.
    pub fn lsa_intermediates(&self) -> (&[f32], &[f32]) {
        (&self.state.v, &self.state.gh1)
    }

    /// Filter one magnitude frame in place.
    pub fn process_magnitude(&mut self, magnitude: &mut [f32]) -> Result<(), Error> {
        self.compute_frame_gains(magnitude)?;
        for (m, g) in magnitude.iter_mut().zip(self.state.g.iter()) {
            *m *= g;
        }
        Ok(())
    }

    /// Filter a magnitude/phase frame pair in place. The phase is validated
    /// for length and passed through untouched; recombination happens in the
    /// surrounding pipeline.
    pub fn process_magnitude_phase(
        &mut self,
        magnitude: &mut [f32],
        phase: &[f32],
    ) -> Result<(), Error> {
        if phase.len() != self.num_bins {
            return Err(Error::FrameLength {
                expected: self.num_bins,
                got: phase.len(),
            });
        }
        self.process_magnitude(magnitude)
    }

    /// Filter a complex-spectrum frame in place: the gain computed from the
    /// magnitudes scales both components of each bin, so the phase is
    /// preserved exactly.
    pub fn process_spectrum(&mut self, re: &mut [f32], im: &mut [f32]) -> Result<(), Error> {
        if re.len() != self.num_bins {
            return Err(Error::FrameLength {
                expected: self.num_bins,
                got: re.len(),
            });
        }
        if im.len() != self.num_bins {
            return Err(Error::FrameLength {
                expected: self.num_bins,
                got: im.len(),
            });
        }

        let mut mags = std::mem::take(&mut self.state.mag_scratch);
        for (m, (r, i)) in mags.iter_mut().zip(re.iter().zip(im.iter())) {
            *m = (r * r + i * i).sqrt();
        }
        let result = self.compute_frame_gains(&mags);
        self.state.mag_scratch = mags;
        result?;

        for ((r, i), g) in re.iter_mut().zip(im.iter_mut()).zip(self.state.g.iter()) {
            *r *= g;
            *i *= g;
        }
        Ok(())
    }

    /// One full gain-update pass; leaves the result in `state.g` and the
    /// decision-directed memory updated for the next frame.
    fn compute_frame_gains(&mut self, magnitude: &[f32]) -> Result<(), Error> {
        if magnitude.len() != self.num_bins {
            return Err(Error::FrameLength {
                expected: self.num_bins,
                got: magnitude.len(),
            });
        }

        let cfg = &self.config;
        let s = &mut self.state;
        debug_assert_eq!(s.g.len(), self.num_bins);
        debug_assert_eq!(s.lambda_n.len(), self.num_bins);

        self.tracker.update(magnitude, &mut s.lambda_n);

        // SNR tracking: a-posteriori gamma, then the decision-directed
        // a-priori xi blending the previous frame's implied SNR with the
        // instantaneous ML estimate.
        for k in 0..self.num_bins {
            let y2 = magnitude[k] * magnitude[k];
            let gamma_new = y2 / s.lambda_n[k].max(NOISE_PSD_FLOOR);

            let gp = s.g_prev[k];
            let implied = gp * gp * s.gamma[k];
            let instantaneous = (gamma_new - 1.0).max(0.0);
            let mut xi = cfg.alpha * implied + (1.0 - cfg.alpha) * instantaneous;
            xi = xi.clamp(cfg.xi_min, cfg.xi_max);
            if cfg.use_perceptual_weighting {
                xi *= s.perceptual_weight[k];
            }

            s.gamma[k] = gamma_new;
            s.xi[k] = xi;
        }

        // Gain law.
        if cfg.use_lsa {
            for k in 0..self.num_bins {
                let xi = s.xi[k];
                let w = xi / (1.0 + xi);
                let v = w * s.gamma[k];
                s.v[k] = v;
                s.v_wide[k] = f64::from(v.max(LSA_V_MIN));
            }
            expint::e1_batch(&s.v_wide, &mut s.e1_wide);
            for k in 0..self.num_bins {
                let v = s.v[k];
                let raw = if v < LSA_V_MIN {
                    // exp(E1(v)/2) blows up as v -> 0; this limit form is
                    // exact to first order and well conditioned.
                    v / (1.0 + v)
                } else {
                    let xi = s.xi[k];
                    let w = f64::from(xi / (1.0 + xi));
                    (w * (0.5 * s.e1_wide[k]).exp()) as f32
                };
                s.gh1[k] = raw;
                s.g[k] = raw.clamp(cfg.min_gain, cfg.max_gain);
            }
        } else {
            for k in 0..self.num_bins {
                let xi = s.xi[k];
                s.g[k] = (xi / (1.0 + xi)).clamp(cfg.min_gain, cfg.max_gain);
            }
        }

        // Temporal smoothing. Both operands are clamped, so the blend stays
        // in range.
        if cfg.gain_smoothing > 0.0 {
            let gs = cfg.gain_smoothing;
            for k in 0..self.num_bins {
                s.g[k] = gs * s.g_prev[k] + (1.0 - gs) * s.g[k];
            }
        }

        // 3-point spectral smoothing of the gain curve; boundary bins have
        // no valid neighbor on one side and stay untouched. `prev` holds the
        // unsmoothed left neighbor.
        if cfg.frequency_smoothing > 0.0 && self.num_bins >= 3 {
            let fs = cfg.frequency_smoothing;
            let mut prev = s.g[0];
            for k in 1..self.num_bins - 1 {
                let cur = s.g[k];
                let neighborhood = (prev + 2.0 * cur + s.g[k + 1]) * 0.25;
                s.g[k] = lerp(cur, neighborhood, fs);
                prev = cur;
            }
        }

        s.g_prev.copy_from_slice(&s.g);
        Ok(())
    }

    fn rebuild_perceptual_weights(&mut self) {
        let bin_hz = self.config.sample_rate / self.config.fft_size as f32;
        let factor = self.config.perceptual_factor;
        for (k, w) in self.state.perceptual_weight.iter_mut().enumerate() {
            let a = a_weighting_gain(k as f32 * bin_hz);
            *w = (1.0 + factor * (a - 1.0)).clamp(PERCEPTUAL_WEIGHT_MIN, PERCEPTUAL_WEIGHT_MAX);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NoiseMode, WienerConfig};

    fn test_config() -> WienerConfig {
        WienerConfig {
            fft_size: 64,
            ..Default::default()
        }
    }

    // Deterministic pseudo-random magnitude frames.
    struct FrameGen(u64);

    impl FrameGen {
        fn next_frame(&mut self, n: usize) -> Vec<f32> {
            (0..n)
                .map(|_| {
                    self.0 = self
                        .0
                        .wrapping_mul(6_364_136_223_846_793_005)
                        .wrapping_add(1);
                    ((self.0 >> 33) as f32 / (1u64 << 31) as f32) * 0.5
                })
                .collect()
        }
    }

    #[test]
    fn test_frame_length_contract() {
        let mut filter = WienerFilter::new(test_config()).unwrap();
        let mut short = vec![0.0f32; 16];
        assert_eq!(
            filter.process_magnitude(&mut short),
            Err(Error::FrameLength {
                expected: 33,
                got: 16
            })
        );

        let mut mag = vec![0.0f32; 33];
        let phase = vec![0.0f32; 32];
        assert!(filter.process_magnitude_phase(&mut mag, &phase).is_err());

        let mut re = vec![0.0f32; 33];
        let mut im = vec![0.0f32; 12];
        assert!(filter.process_spectrum(&mut re, &mut im).is_err());
    }

    #[test]
    fn test_gain_bounded_for_random_frames() {
        for use_lsa in [false, true] {
            let cfg = WienerConfig {
                use_lsa,
                min_gain: 0.15,
                max_gain: 0.9,
                ..test_config()
            };
            let mut filter = WienerFilter::new(cfg).unwrap();
            let mut gen = FrameGen(0x9e37_79b9);
            for _ in 0..200 {
                let mut frame = gen.next_frame(filter.num_bins());
                filter.process_magnitude(&mut frame).unwrap();
                for &g in filter.gain() {
                    assert!(g.is_finite());
                    assert!((0.15..=0.9).contains(&g), "gain {g} out of bounds");
                }
            }
        }
    }

    #[test]
    fn test_silence_converges_without_nan() {
        let mut filter = WienerFilter::new(test_config()).unwrap();
        let mut last_gain = f32::INFINITY;
        for _ in 0..300 {
            let mut frame = vec![0.0f32; filter.num_bins()];
            filter.process_magnitude(&mut frame).unwrap();
            let g = filter.gain()[5];
            assert!(g.is_finite());
            assert!(g <= last_gain + 1e-6, "gain rebounded on silence");
            last_gain = g;
            for &m in &frame {
                assert_eq!(m, 0.0);
            }
        }
        // Converged to the configured floor.
        assert!((last_gain - filter.config().min_gain).abs() < 1e-3);
    }

    #[test]
    fn test_reset_determinism() {
        let mut filter = WienerFilter::new(test_config()).unwrap();

        let run = |filter: &mut WienerFilter| -> Vec<u32> {
            filter.reset();
            let mut gen = FrameGen(42);
            let mut bits = Vec::new();
            for _ in 0..50 {
                let mut frame = gen.next_frame(filter.num_bins());
                filter.process_magnitude(&mut frame).unwrap();
                bits.extend(filter.gain().iter().map(|g| g.to_bits()));
            }
            bits
        };

        let first = run(&mut filter);
        let second = run(&mut filter);
        assert_eq!(first, second);
    }

    #[test]
    fn test_lsa_and_wiener_laws_differ() {
        let wiener_cfg = WienerConfig {
            use_lsa: false,
            ..test_config()
        };
        let lsa_cfg = WienerConfig {
            use_lsa: true,
            ..test_config()
        };
        let mut a = WienerFilter::new(wiener_cfg).unwrap();
        let mut b = WienerFilter::new(lsa_cfg).unwrap();

        let mut gen = FrameGen(7);
        let mut diverged = false;
        for _ in 0..40 {
            let frame = gen.next_frame(a.num_bins());
            let mut fa = frame.clone();
            let mut fb = frame;
            a.process_magnitude(&mut fa).unwrap();
            b.process_magnitude(&mut fb).unwrap();
            if a.gain()
                .iter()
                .zip(b.gain().iter())
                .any(|(x, y)| (x - y).abs() > 1e-4)
            {
                diverged = true;
            }
        }
        assert!(diverged, "gain laws produced identical output");
    }

    #[test]
    fn test_spectrum_entry_preserves_phase() {
        let mut filter = WienerFilter::new(test_config()).unwrap();
        let n = filter.num_bins();
        let mut re: Vec<f32> = (0..n).map(|k| 0.1 + 0.01 * k as f32).collect();
        let mut im: Vec<f32> = (0..n).map(|k| 0.05 - 0.003 * k as f32).collect();
        let re_in = re.clone();
        let im_in = im.clone();

        filter.process_spectrum(&mut re, &mut im).unwrap();

        for k in 0..n {
            // Same scalar gain on both parts: cross products match.
            let cross = re[k] * im_in[k] - im[k] * re_in[k];
            assert!(cross.abs() < 1e-5, "phase rotated at bin {k}");
        }
    }

    #[test]
    fn test_perceptual_weighting_changes_xi() {
        let flat = WienerConfig {
            use_perceptual_weighting: false,
            ..test_config()
        };
        let weighted = WienerConfig {
            use_perceptual_weighting: true,
            perceptual_factor: 1.0,
            ..test_config()
        };
        let mut a = WienerFilter::new(flat).unwrap();
        let mut b = WienerFilter::new(weighted).unwrap();

        let mut gen = FrameGen(3);
        for _ in 0..30 {
            let frame = gen.next_frame(a.num_bins());
            let mut fa = frame.clone();
            let mut fb = frame;
            a.process_magnitude(&mut fa).unwrap();
            b.process_magnitude(&mut fb).unwrap();
        }
        let differs = a
            .a_priori_snr()
            .iter()
            .zip(b.a_priori_snr().iter())
            .any(|(x, y)| (x - y).abs() > 1e-6);
        assert!(differs);
    }

    #[test]
    fn test_set_config_resizes_and_resets() {
        let mut filter = WienerFilter::new(test_config()).unwrap();
        let mut gen = FrameGen(11);
        for _ in 0..10 {
            let mut frame = gen.next_frame(filter.num_bins());
            filter.process_magnitude(&mut frame).unwrap();
        }

        let bigger = WienerConfig {
            fft_size: 128,
            ..test_config()
        };
        filter.set_config(bigger).unwrap();
        assert_eq!(filter.num_bins(), 65);
        assert_eq!(filter.gain().len(), 65);
        assert!(filter.gain().iter().all(|&g| g == bigger.max_gain));

        // Switching into ImcraFull without a collaborator is refused.
        let imcra = WienerConfig {
            noise_mode: NoiseMode::ImcraFull,
            ..test_config()
        };
        assert!(filter.set_config(imcra).is_err());
        assert!(WienerFilter::new(imcra).is_err());
    }
}
