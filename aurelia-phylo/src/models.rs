//! Nucleotide substitution models and discrete-gamma rate variation.
//!
//! Rate matrices follow the dictionary's `T C A G` symbol order
//! (T = 0, C = 1, A = 2, G = 3). GTR carries five free exchangeability
//! parameters; the sixth, `(A, G)`, is fixed at 1 to anchor the scale.

use aurelia_core::{AureliaError, Result};

/// Number of nucleotide states.
pub const NUC_STATES: usize = 4;

/// GTR (general time-reversible) model parameters.
///
/// `rates` holds the free exchangeabilities in upper-triangle order over
/// `T C A G`: `(T,C) (T,A) (T,G) (C,A) (C,G)`; the `(A,G)` entry is
/// fixed at 1. `freqs` are the equilibrium frequencies `π_T π_C π_A π_G`.
#[derive(Debug, Clone)]
pub struct GtrParams {
    pub rates: [f64; 5],
    pub freqs: [f64; 4],
}

impl GtrParams {
    /// Create GTR parameters with validation.
    ///
    /// # Errors
    ///
    /// `Config` unless all rates are positive and the frequencies are
    /// positive and sum to ~1.
    pub fn new(rates: [f64; 5], freqs: [f64; 4]) -> Result<Self> {
        for (i, &r) in rates.iter().enumerate() {
            if !(r > 0.0) || !r.is_finite() {
                return Err(AureliaError::Config(format!(
                    "GTR rate[{}] = {} must be positive and finite",
                    i, r
                )));
            }
        }
        validate_frequencies(&freqs)?;
        Ok(Self { rates, freqs })
    }

    /// The symmetric exchangeability matrix S over `T C A G`.
    pub fn exchangeabilities(&self) -> [[f64; 4]; 4] {
        let [tc, ta, tg, ca, cg] = self.rates;
        let ag = 1.0;
        [
            [0.0, tc, ta, tg],
            [tc, 0.0, ca, cg],
            [ta, ca, 0.0, ag],
            [tg, cg, ag, 0.0],
        ]
    }

    /// The normalized rate matrix Q.
    ///
    /// `Q[i][j] = S[i][j] · π_j` off the diagonal, rows sum to zero,
    /// scaled so `−Σ π_i Q_ii = 1` (one expected substitution per site
    /// per unit time).
    pub fn rate_matrix(&self) -> [[f64; 4]; 4] {
        let s = self.exchangeabilities();
        let pi = self.freqs;

        let mut q = [[0.0f64; 4]; 4];
        for i in 0..4 {
            for j in 0..4 {
                if i != j {
                    q[i][j] = s[i][j] * pi[j];
                }
            }
            let off_diag: f64 = (0..4).filter(|&j| j != i).map(|j| q[i][j]).sum();
            q[i][i] = -off_diag;
        }

        let mu: f64 = (0..4).map(|i| -pi[i] * q[i][i]).sum();
        if mu > 0.0 {
            for row in &mut q {
                for v in row.iter_mut() {
                    *v /= mu;
                }
            }
        }

        q
    }
}

/// GTR rate vector for the HKY85 model.
///
/// HKY85 gives transitions (T↔C, A↔G) rate κ relative to transversions.
/// With the `(A,G)` exchangeability anchored at 1, that means `(T,C)` at
/// 1 and every transversion at `1/κ`.
///
/// # Errors
///
/// `Config` if κ is not positive.
pub fn hky85_rates(kappa: f64) -> Result<[f64; 5]> {
    if !(kappa > 0.0) || !kappa.is_finite() {
        return Err(AureliaError::Config(format!(
            "HKY85 kappa = {} must be positive and finite",
            kappa
        )));
    }
    let tv = 1.0 / kappa;
    Ok([1.0, tv, tv, tv, tv])
}

pub(crate) fn validate_frequencies(freqs: &[f64]) -> Result<()> {
    for (i, &f) in freqs.iter().enumerate() {
        if !(f > 0.0) || !f.is_finite() {
            return Err(AureliaError::Config(format!(
                "equilibrium frequency [{}] = {} must be positive",
                i, f
            )));
        }
    }
    let sum: f64 = freqs.iter().sum();
    if (sum - 1.0).abs() > 1e-4 {
        return Err(AureliaError::Config(format!(
            "equilibrium frequencies sum to {} (expected ~1.0)",
            sum
        )));
    }
    Ok(())
}

/// Discrete gamma rate categories (Yang 1994 quantile method).
#[derive(Debug, Clone)]
pub struct GammaRates {
    /// Shape parameter alpha (smaller = more rate variation).
    pub alpha: f64,
    /// Number of rate categories.
    pub n_categories: usize,
}

impl GammaRates {
    /// Create new gamma rate parameters.
    ///
    /// # Errors
    ///
    /// `Config` if alpha is not positive or there are zero categories.
    pub fn new(alpha: f64, n_categories: usize) -> Result<Self> {
        if !(alpha > 0.0) || !alpha.is_finite() {
            return Err(AureliaError::Config(format!(
                "gamma shape alpha = {} must be positive",
                alpha
            )));
        }
        if n_categories == 0 {
            return Err(AureliaError::Config(
                "gamma rate category count must be at least 1".into(),
            ));
        }
        Ok(Self {
            alpha,
            n_categories,
        })
    }

    /// Category rate multipliers: the medians of R equal-probability
    /// slices of Gamma(alpha, alpha), normalized to mean 1.
    ///
    /// A single category yields exactly `[1.0]`.
    pub fn category_rates(&self) -> Vec<f64> {
        let k = self.n_categories;
        if k == 1 {
            return vec![1.0];
        }
        let a = self.alpha;

        // Quantile midpoints of Gamma(a, 1), rescaled by 1/a so the
        // underlying distribution has mean 1, then renormalized so the
        // discrete category mean is exactly 1.
        let mut rates = Vec::with_capacity(k);
        for i in 0..k {
            let p = (2 * i + 1) as f64 / (2 * k) as f64;
            rates.push(gamma_quantile(p, a) / a);
        }

        let mean: f64 = rates.iter().sum::<f64>() / k as f64;
        if mean > 0.0 {
            for r in &mut rates {
                *r /= mean;
            }
        }

        rates
    }
}

/// Regularized lower incomplete gamma function P(a, x) = γ(a,x) / Γ(a).
pub(crate) fn gamma_regularized(a: f64, x: f64) -> f64 {
    if x <= 0.0 {
        return 0.0;
    }

    if x < a + 1.0 {
        gamma_series(a, x)
    } else {
        1.0 - gamma_cf(a, x)
    }
}

/// Series expansion for lower incomplete gamma.
fn gamma_series(a: f64, x: f64) -> f64 {
    let ln_gamma_a = ln_gamma(a);
    let mut sum = 1.0 / a;
    let mut term = 1.0 / a;
    for n in 1..200 {
        term *= x / (a + n as f64);
        sum += term;
        if term.abs() < sum.abs() * 1e-14 {
            break;
        }
    }
    sum * (-x + a * x.ln() - ln_gamma_a).exp()
}

/// Continued fraction for upper incomplete gamma.
fn gamma_cf(a: f64, x: f64) -> f64 {
    let ln_gamma_a = ln_gamma(a);
    let mut c = 1e-30f64;
    let mut d = 1.0 / (x + 1.0 - a);
    let mut f = d;

    for n in 1..200 {
        let an = -(n as f64) * (n as f64 - a);
        let bn = x + 2.0 * n as f64 + 1.0 - a;
        d = bn + an * d;
        if d.abs() < 1e-30 {
            d = 1e-30;
        }
        c = bn + an / c;
        if c.abs() < 1e-30 {
            c = 1e-30;
        }
        d = 1.0 / d;
        let delta = c * d;
        f *= delta;
        if (delta - 1.0).abs() < 1e-14 {
            break;
        }
    }
    f * (-x + a * x.ln() - ln_gamma_a).exp()
}

/// Log-gamma function (Lanczos approximation).
pub(crate) fn ln_gamma(x: f64) -> f64 {
    let coeffs = [
        76.18009172947146,
        -86.50532032941677,
        24.01409824083091,
        -1.231739572450155,
        0.1208650973866179e-2,
        -0.5395239384953e-5,
    ];
    let y = x;
    let tmp = x + 5.5;
    let tmp = tmp - (x + 0.5) * tmp.ln();
    let mut ser = 1.000000000190015;
    for (j, &c) in coeffs.iter().enumerate() {
        ser += c / (y + 1.0 + j as f64);
    }
    -tmp + (2.5066282746310005 * ser / x).ln()
}

/// Inverse gamma CDF (quantile function) via Newton-Raphson.
///
/// Returns x such that P(a, x) ≈ p, for Gamma(a, 1).
fn gamma_quantile(p: f64, a: f64) -> f64 {
    if p <= 0.0 {
        return 0.0;
    }
    if p >= 1.0 {
        return f64::MAX;
    }

    // Initial guess using Wilson-Hilferty approximation.
    let mut x = if a > 1.0 {
        let nu = (2.0 / (9.0 * a)).sqrt();
        let t = normal_quantile(p);
        let y = 1.0 - 1.0 / (9.0 * a) + t * nu;
        if y > 0.0 {
            a * y * y * y
        } else {
            a * 0.01
        }
    } else {
        let t = 1.0 - a * (0.253 + a * 0.12);
        if p < t {
            (p / t).powf(1.0 / a)
        } else {
            1.0 - (1.0 - (p - t) / (1.0 - t)).ln()
        }
    };

    if x < 1e-15 {
        x = 1e-15;
    }

    let ln_gamma_a = ln_gamma(a);
    for _ in 0..30 {
        let cdf = gamma_regularized(a, x);
        let pdf = ((a - 1.0) * x.ln() - x - ln_gamma_a).exp();
        if pdf < 1e-30 {
            break;
        }
        let delta = (cdf - p) / pdf;
        x -= delta;
        if x <= 0.0 {
            x = 1e-15;
        }
        if delta.abs() < x * 1e-12 {
            break;
        }
    }
    x
}

/// Approximate inverse normal CDF (Abramowitz & Stegun 26.2.23).
fn normal_quantile(p: f64) -> f64 {
    if p <= 0.0 {
        return -6.0;
    }
    if p >= 1.0 {
        return 6.0;
    }
    if (p - 0.5).abs() < 1e-15 {
        return 0.0;
    }
    let (pp, sign) = if p < 0.5 { (p, -1.0) } else { (1.0 - p, 1.0) };
    let t = (-2.0 * pp.ln()).sqrt();
    let c0 = 2.515517;
    let c1 = 0.802853;
    let c2 = 0.010328;
    let d1 = 1.432788;
    let d2 = 0.189269;
    let d3 = 0.001308;
    let x = t - (c0 + c1 * t + c2 * t * t) / (1.0 + d1 * t + d2 * t * t + d3 * t * t * t);
    sign * x
}
