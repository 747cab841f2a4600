pub fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t.clamp(0.0, 1.0)
}

pub fn db_to_gain(db: f32) -> f32 {
    (10.0f32).powf(db / 20.0)
}

// IEC 61672 A-weighting pole frequencies (Hz).
const A_F1: f32 = 20.598_997;
const A_F2: f32 = 107.652_65;
const A_F3: f32 = 737.862_23;
const A_F4: f32 = 12_194.217;

/// Linear A-weighting magnitude response, normalized to 1.0 at 1 kHz.
///
/// Used to build the perceptual SNR weighting table: bins the ear is less
/// sensitive to contribute less a-priori SNR, so they get suppressed harder.
/// Returns 0.0 at DC; callers clamp the blended weight before applying it.
pub fn a_weighting_gain(freq_hz: f32) -> f32 {
    let f2 = freq_hz * freq_hz;
    let num = A_F4 * A_F4 * f2 * f2;
    let den = (f2 + A_F1 * A_F1)
        * ((f2 + A_F2 * A_F2) * (f2 + A_F3 * A_F3)).sqrt()
        * (f2 + A_F4 * A_F4);
    if den <= 0.0 {
        return 0.0;
    }
    let ra = num / den;

    // R_A(1000) for the same pole set; dividing by it puts 1 kHz at unity.
    const RA_1K: f32 = 0.794_345_3;
    ra / RA_1K
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lerp_clamps_t() {
        assert_eq!(lerp(0.0, 1.0, 2.0), 1.0);
        assert_eq!(lerp(0.0, 1.0, -1.0), 0.0);
        assert!((lerp(2.0, 4.0, 0.5) - 3.0).abs() < 1e-6);
    }

    #[test]
    fn test_db_to_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-20.0) - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_a_weighting_shape() {
        // Unity at 1 kHz by construction.
        assert!((a_weighting_gain(1000.0) - 1.0).abs() < 1e-3);
        // Low frequencies are strongly de-weighted.
        assert!(a_weighting_gain(50.0) < 0.2);
        // Mild peak in the 2-4 kHz presence region.
        assert!(a_weighting_gain(2500.0) > 1.0);
        // Rolls off again toward the top of the band.
        assert!(a_weighting_gain(16000.0) < 0.8);
        // DC is zero, not NaN.
        assert_eq!(a_weighting_gain(0.0), 0.0);
    }
}
