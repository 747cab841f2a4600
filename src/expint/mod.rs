//! Exponential-integral engine: E1(x), Ei(x) and the generalized En(n, x).
//!
//! The MMSE-LSA gain law needs E1 evaluated per frequency bin per frame, so
//! this module is tuned for accuracy across the whole positive real line and
//! for predictable cost. No single expansion does both: E1 switches between
//! four numerically distinct regimes by argument magnitude, and the batched
//! entry point ([`e1_batch`]) applies the exact same regime logic per lane.
//!
//! Domain errors (non-positive or NaN arguments, `n == 0`) return NaN per
//! the IEEE invalid-operation convention; nothing here panics or allocates.

mod batch;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod x86;

pub use batch::e1_batch;

/// Euler-Mascheroni constant.
pub(crate) const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

// Regime boundaries for E1. Below the log threshold the power-series
// correction terms are negligible and only risk cancellation; above the
// asymptotic threshold the continued fraction wastes iterations.
pub(crate) const E1_LOG_THRESHOLD: f64 = 1e-10;
pub(crate) const E1_SERIES_THRESHOLD: f64 = 0.8;
pub(crate) const E1_ASYMPTOTIC_THRESHOLD: f64 = 40.0;
/// Above this, two extra asymptotic terms are worth their cost.
pub(crate) const E1_EXTRA_TERMS_THRESHOLD: f64 = 60.0;

// Series evaluation limits, shared by the E1 and Ei power series.
const MAX_SERIES_TERMS: u32 = 50;
const SERIES_RELATIVE_TOL: f64 = 1e-7;
const SERIES_ABSOLUTE_TOL: f64 = 1e-30;
const SERIES_OVERFLOW_GUARD: f64 = 1e300;

// Modified-Lentz continued fraction limits.
const MAX_LENTZ_ITERATIONS: u32 = 100;
const MIN_LENTZ_ITERATIONS: u32 = 10;
const LENTZ_CONVERGENCE_TOL: f64 = 1e-13;
/// Sign-preserving floor keeping Lentz numerators/denominators off zero.
const LENTZ_TINY: f64 = 1e-300;

/// En regime switch: forward recurrence from E1 is well conditioned for
/// small arguments (each step scales the inherited error by `x / (k - 1)`);
/// larger arguments go straight to the continued fraction.
const EN_FORWARD_MAX_X: f64 = 1.0;

/// Value floor below which En recurrences report underflow as 0.
const EN_UNDERFLOW_FLOOR: f64 = 1e-290;

/// Compensated (Kahan) accumulator: tracks the rounding error of each
/// addition so long alternating series don't drift.
#[derive(Clone, Copy, Debug)]
struct KahanSum {
    sum: f64,
    compensation: f64,
}

impl KahanSum {
    fn new(initial: f64) -> Self {
        Self {
            sum: initial,
            compensation: 0.0,
        }
    }

    fn add(&mut self, value: f64) {
        let y = value - self.compensation;
        let t = self.sum + y;
        self.compensation = (t - self.sum) - y;
        self.sum = t;
    }

    fn value(&self) -> f64 {
        self.sum
    }
}

/// Exponential integral E1(x) for `x > 0`.
///
/// Returns NaN for `x <= 0` or NaN input.
pub fn e1(x: f64) -> f64 {
    if !(x > 0.0) {
        return f64::NAN;
    }
    if x < E1_LOG_THRESHOLD {
        // Logarithmic asymptote; the series corrections are below rounding.
        -EULER_GAMMA - x.ln()
    } else if x < E1_SERIES_THRESHOLD {
        e1_series(x)
    } else if x <= E1_ASYMPTOTIC_THRESHOLD {
        lentz_continued_fraction(1, x)
    } else {
        e1_asymptotic(x)
    }
}

/// Exponential integral Ei(x) for `x > 0`.
///
/// Returns NaN for `x <= 0` or NaN input.
pub fn ei(x: f64) -> f64 {
    if !(x > 0.0) {
        return f64::NAN;
    }
    if x < E1_LOG_THRESHOLD {
        return EULER_GAMMA + x.ln();
    }

    // Power series Ei(x) = gamma + ln x + sum_{k>=1} x^k / (k * k!), with the
    // term ratio recursion term *= x / k instead of explicit factorials.
    let mut acc = KahanSum::new(EULER_GAMMA + x.ln());
    let mut term = 1.0f64;
    for k in 1..=MAX_SERIES_TERMS {
        term *= x / k as f64;
        if term > SERIES_OVERFLOW_GUARD {
            break;
        }
        let contribution = term / k as f64;
        acc.add(contribution);
        if contribution < SERIES_ABSOLUTE_TOL
            || contribution < acc.value().abs() * SERIES_RELATIVE_TOL
        {
            break;
        }
    }
    acc.value()
}

/// Generalized exponential integral En(n, x) for `n >= 1`, `x > 0`.
///
/// Returns NaN for `n == 0`, `x <= 0` or NaN input.
pub fn en(n: u32, x: f64) -> f64 {
    if n == 0 || !(x > 0.0) {
        return f64::NAN;
    }
    if n == 1 {
        return e1(x);
    }
    if x > EN_FORWARD_MAX_X {
        // The same continued fraction that serves E1's mid regime converges
        // for every order; it is the stable choice once the forward
        // recurrence's error factor x / (k - 1) can exceed 1.
        lentz_continued_fraction(n, x)
    } else {
        en_forward_recurrence(n, x)
    }
}

/// Power-series regime: E1(x) = -gamma - ln x - sum_{k>=1} (-x)^k / (k * k!).
fn e1_series(x: f64) -> f64 {
    let mut acc = KahanSum::new(-EULER_GAMMA - x.ln());
    // term holds (-x)^k / k! via the ratio recursion.
    let mut term = 1.0f64;
    for k in 1..=MAX_SERIES_TERMS {
        term *= -x / k as f64;
        if term.abs() > SERIES_OVERFLOW_GUARD {
            break;
        }
        let contribution = -term / k as f64;
        acc.add(contribution);
        if contribution.abs() < SERIES_ABSOLUTE_TOL
            || contribution.abs() < acc.value().abs() * SERIES_RELATIVE_TOL
        {
            break;
        }
    }
    acc.value()
}

/// Modified Lentz evaluation of the continued fraction
/// `En(n, x) = e^{-x} / (x + n - 1*n/(x + n + 2 - 2*(n+1)/(...)))`
/// (Numerical Recipes form: b = x + n, a_i = -i * (n - 1 + i)).
///
/// Numerators and denominators are floored to a tiny sign-preserving value
/// so an unlucky zero convergent cannot poison the fraction. After a minimum
/// iteration count, a stagnation check bails out once successive convergents
/// stop moving; the primary exit is the per-iteration factor reaching 1.
fn lentz_continued_fraction(n: u32, x: f64) -> f64 {
    let nf = n as f64;
    let mut b = x + nf;
    let mut c = 1.0 / LENTZ_TINY;
    let mut d = 1.0 / b;
    let mut h = d;
    let mut prev_h = h;

    for i in 1..=MAX_LENTZ_ITERATIONS {
        let a = -(i as f64) * (nf - 1.0 + i as f64);
        b += 2.0;

        d = a * d + b;
        if d.abs() < LENTZ_TINY {
            d = LENTZ_TINY.copysign(d);
        }
        d = 1.0 / d;

        c = b + a / c;
        if c.abs() < LENTZ_TINY {
            c = LENTZ_TINY.copysign(c);
        }

        let delta = c * d;
        h *= delta;

        if (delta - 1.0).abs() < LENTZ_CONVERGENCE_TOL {
            break;
        }
        // Slow-starting fractions move little in the first iterations, so
        // only trust stagnation after a minimum amount of work.
        if i >= MIN_LENTZ_ITERATIONS && (h - prev_h).abs() <= f64::EPSILON * h.abs() {
            break;
        }
        prev_h = h;
    }

    h * (-x).exp()
}

/// Asymptotic regime: E1(x) ~ e^{-x}/x * P(1/x) with P in nested Horner
/// form, avoiding explicit factorials. Four terms suffice until the extra
/// pair pays off at very large arguments.
///
/// The `exp * u * p` operation order is shared with the vectorized kernel in
/// [`x86`] so both paths round identically.
fn e1_asymptotic(x: f64) -> f64 {
    let u = 1.0 / x;
    let p = if x > E1_EXTRA_TERMS_THRESHOLD {
        (((((-120.0 * u) + 24.0) * u - 6.0) * u + 2.0) * u - 1.0) * u + 1.0
    } else {
        (((-6.0 * u) + 2.0) * u - 1.0) * u + 1.0
    };
    (-x).exp() * u * p
}

/// Forward recurrence E_k = (e^{-x} - x * E_{k-1}) / (k - 1) from E1(x).
fn en_forward_recurrence(n: u32, x: f64) -> f64 {
    let ex = (-x).exp();
    let mut e = e1(x);
    for k in 2..=n {
        e = (ex - x * e) / (k - 1) as f64;
        if !e.is_finite() {
            return f64::NAN;
        }
        if e.abs() < EN_UNDERFLOW_FLOOR {
            return 0.0;
        }
    }
    e
}
