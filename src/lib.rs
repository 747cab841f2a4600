//! Real-time spectral speech enhancement.
//!
//! Given the short-time magnitude spectrum of a noisy frame, this crate
//! estimates per-bin suppression gains that attenuate noise while preserving
//! speech, built from three layers:
//!
//! - [`expint`]: exponential-integral engine (E1/Ei/En) with scalar and
//!   batched entry points; the numerical core of the MMSE-LSA gain law.
//! - [`WienerFilter`]: adaptive per-bin SNR tracking (decision-directed
//!   recursion) plus the Wiener or MMSE-LSA gain law, with temporal and
//!   spectral gain smoothing and optional perceptual weighting.
//! - [`TwoStepNoiseReduction`]: a conservative-then-aggressive cascade of
//!   two filters with residual-noise tracking between the passes.
//!
//! STFT framing, overlap-add reconstruction and noise-PSD estimation beyond
//! the built-in trackers are the surrounding pipeline's job; a full IMCRA
//! (or any other estimator) plugs in through [`NoiseEstimator`].
//!
//! Processing is synchronous and allocation-free per frame. Instances are
//! not internally synchronized: drive each one from a single thread.

pub mod config;
pub mod error;
pub mod expint;
pub mod noise;
pub mod two_step;
pub mod utils;
pub mod wiener;

pub use config::{NoiseMode, TwoStepConfig, WienerConfig};
pub use error::Error;
pub use noise::NoiseEstimator;
pub use two_step::TwoStepNoiseReduction;
pub use wiener::WienerFilter;
