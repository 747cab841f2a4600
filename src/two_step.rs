//! Two-step cascaded noise reduction.
//!
//! Two independently tuned [`WienerFilter`] passes run back to back: a
//! conservative first pass that avoids speech distortion, then an aggressive
//! second pass that cleans up the residual (musical) noise the first pass
//! leaves behind. Each pass owns its own SNR and noise state; the second
//! pass tracks noise over the *intermediate* signal, not the input.
//!
//! Between the passes a residual-noise magnitude estimate is maintained from
//! `|input - intermediate|`. It is a read-only diagnostic: it does not feed
//! back into the second pass's gain decision.

use log::debug;

use crate::config::TwoStepConfig;
use crate::error::Error;
use crate::wiener::WienerFilter;

pub struct TwoStepNoiseReduction {
    config: TwoStepConfig,
    step1: WienerFilter,
    step2: WienerFilter,
    intermediate: Vec<f32>,
    residual_noise: Vec<f32>,
}

impl TwoStepNoiseReduction {
    pub fn new(config: TwoStepConfig) -> Result<Self, Error> {
        config.validate()?;
        let step1 = WienerFilter::new(config.step1)?;
        let step2 = WienerFilter::new(config.step2)?;
        let num_bins = step1.num_bins();
        debug!("two-step noise reduction ready: {} bins", num_bins);
        Ok(Self {
            config,
            step1,
            step2,
            intermediate: vec![0.0; num_bins],
            residual_noise: vec![0.0; num_bins],
        })
    }

    /// Replace both pass configurations; resets all history.
    pub fn set_config(&mut self, config: TwoStepConfig) -> Result<(), Error> {
        config.validate()?;
        self.step1.set_config(config.step1)?;
        self.step2.set_config(config.step2)?;
        self.config = config;
        let num_bins = self.step1.num_bins();
        self.intermediate = vec![0.0; num_bins];
        self.residual_noise = vec![0.0; num_bins];
        debug!("two-step noise reduction reconfigured: {} bins", num_bins);
        Ok(())
    }

    /// Clear all cross-frame history (both passes and the residual tracker).
    pub fn reset(&mut self) {
        self.step1.reset();
        self.step2.reset();
        self.intermediate.fill(0.0);
        self.residual_noise.fill(0.0);
    }

    pub fn num_bins(&self) -> usize {
        self.step1.num_bins()
    }

    /// Process one magnitude frame in place through both passes.
    pub fn process_magnitude(&mut self, magnitude: &mut [f32]) -> Result<(), Error> {
        if magnitude.len() != self.num_bins() {
            return Err(Error::FrameLength {
                expected: self.num_bins(),
                got: magnitude.len(),
            });
        }

        // Pass 1 (conservative) into the intermediate buffer.
        self.intermediate.copy_from_slice(magnitude);
        self.step1.process_magnitude(&mut self.intermediate)?;

        self.update_residual(magnitude);

        // Pass 2 (aggressive) consumes the intermediate magnitude.
        magnitude.copy_from_slice(&self.intermediate);
        self.step2.process_magnitude(magnitude)
    }

    /// Complex-spectrum variant: both passes' gains end up applied to the
    /// real and imaginary parts, preserving phase.
    pub fn process_spectrum(&mut self, re: &mut [f32], im: &mut [f32]) -> Result<(), Error> {
        let num_bins = self.num_bins();
        if re.len() != num_bins || im.len() != num_bins {
            return Err(Error::FrameLength {
                expected: num_bins,
                got: if re.len() != num_bins {
                    re.len()
                } else {
                    im.len()
                },
            });
        }

        // Input magnitudes, kept for residual tracking across pass 1.
        for (k, (r, i)) in re.iter().zip(im.iter()).enumerate() {
            self.intermediate[k] = (r * r + i * i).sqrt();
        }
        self.step1.process_spectrum(re, im)?;

        let smooth = self.config.residual_smoothing;
        let factor = self.config.residual_update_factor;
        for (k, (r, i)) in re.iter().zip(im.iter()).enumerate() {
            let out_mag = (r * r + i * i).sqrt();
            let residual = (self.intermediate[k] - out_mag).abs();
            if residual > factor * self.residual_noise[k] {
                self.residual_noise[k] =
                    smooth * self.residual_noise[k] + (1.0 - smooth) * residual;
            }
        }

        self.step2.process_spectrum(re, im)
    }

    /// Smoothed estimate of the magnitude step 1 removed. Diagnostic only.
    pub fn residual_noise(&self) -> &[f32] {
        &self.residual_noise
    }

    /// Step-1 (conservative pass) gain vector.
    pub fn step1_gain(&self) -> &[f32] {
        self.step1.gain()
    }

    /// Step-2 (aggressive pass) gain vector.
    pub fn step2_gain(&self) -> &[f32] {
        self.step2.gain()
    }

    fn update_residual(&mut self, input: &[f32]) {
        let smooth = self.config.residual_smoothing;
        let factor = self.config.residual_update_factor;
        for (k, (inp, inter)) in input.iter().zip(self.intermediate.iter()).enumerate() {
            let residual = (inp - inter).abs();
            // Only track upward surprises; small fluctuations leave the
            // estimate alone.
            if residual > factor * self.residual_noise[k] {
                self.residual_noise[k] =
                    smooth * self.residual_noise[k] + (1.0 - smooth) * residual;
            }
        }
    }
}
