//! The unified substitution-model object.
//!
//! One [`SubstitutionModel`] struct covers every supported model kind;
//! [`ModelKind`] selects the Q-matrix construction. The model caches the
//! eigendecomposition of the symmetrized generator so that the
//! per-category transition matrices `P_r(t) = U·diag(exp(Λ·t·c_r))·U⁻¹`
//! can be produced for any divergence time without re-decomposing.
//!
//! Divergence time is always an explicit argument; the model holds no
//! mutable "current t".

use aurelia_core::{AureliaError, Result};

use crate::models::{self, GammaRates, GtrParams};
use crate::protein_models::{
    upper_triangle_to_matrix, AA_STATES, JTT_FREQS, JTT_RATES, LG_FREQS, LG_RATES, WAG_FREQS,
    WAG_RATES,
};

/// Supported substitution models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelKind {
    Gtr,
    Hky85,
    Jtt,
    Lg,
    Wag,
}

impl ModelKind {
    /// True for the 4-state nucleotide models.
    pub fn is_nucleotide(self) -> bool {
        matches!(self, ModelKind::Gtr | ModelKind::Hky85)
    }

    /// Alphabet size K of the model.
    pub fn state_count(self) -> usize {
        if self.is_nucleotide() {
            models::NUC_STATES
        } else {
            AA_STATES
        }
    }

    /// Number of free substitution parameters the model expects.
    pub fn parameter_count(self) -> usize {
        match self {
            ModelKind::Gtr => 5,
            ModelKind::Hky85 => 1,
            ModelKind::Jtt | ModelKind::Lg | ModelKind::Wag => 0,
        }
    }
}

/// Cached factors of `exp(Qt)`: eigenvalues of the symmetrized generator
/// plus the similarity-transformed eigenvector matrices, flattened
/// row-major.
#[derive(Debug, Clone)]
struct EigenSystem {
    values: Vec<f64>,
    /// `diag(1/√π) · U`, K×K.
    left: Vec<f64>,
    /// `Uᵀ · diag(√π)`, K×K.
    right: Vec<f64>,
}

/// A substitution model with cached spectral decomposition and
/// discrete-gamma rate mixing.
#[derive(Debug, Clone)]
pub struct SubstitutionModel {
    kind: ModelKind,
    size: usize,
    freqs: Vec<f64>,
    params: Vec<f64>,
    alpha: f64,
    categories: usize,
    category_rates: Vec<f64>,
    eigen: Option<EigenSystem>,
}

impl SubstitutionModel {
    /// Create a model of the given kind.
    ///
    /// Nucleotide models start from uniform frequencies (normally
    /// replaced by [`SubstitutionModel::set_observed_frequencies`]) and
    /// unit exchangeabilities; amino-acid models carry their published
    /// frequencies. [`SubstitutionModel::calculate`] must run before
    /// transition matrices can be produced.
    ///
    /// # Errors
    ///
    /// `Config` for a nonpositive alpha or zero rate categories.
    pub fn new(kind: ModelKind, categories: usize, alpha: f64) -> Result<Self> {
        // Validates both alpha and the category count.
        GammaRates::new(alpha, categories)?;

        let size = kind.state_count();
        let freqs = match kind {
            ModelKind::Gtr | ModelKind::Hky85 => vec![1.0 / size as f64; size],
            ModelKind::Jtt => JTT_FREQS.to_vec(),
            ModelKind::Lg => LG_FREQS.to_vec(),
            ModelKind::Wag => WAG_FREQS.to_vec(),
        };
        let params = vec![1.0; kind.parameter_count()];

        Ok(Self {
            kind,
            size,
            freqs,
            params,
            alpha,
            categories,
            category_rates: Vec::new(),
            eigen: None,
        })
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    /// Alphabet size K.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Equilibrium frequencies π.
    pub fn frequencies(&self) -> &[f64] {
        &self.freqs
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn categories(&self) -> usize {
        self.categories
    }

    /// Current substitution parameters (empty for amino-acid models).
    pub fn parameters(&self) -> &[f64] {
        &self.params
    }

    /// Discrete-gamma category rate multipliers, available after
    /// [`SubstitutionModel::calculate`].
    pub fn category_rates(&self) -> &[f64] {
        &self.category_rates
    }

    /// Take equilibrium frequencies from observed data.
    ///
    /// Amino-acid models ignore this: their published frequencies are
    /// part of the model. Frequencies are floored at 1e-6 and
    /// renormalized so a residue absent from the data cannot produce a
    /// degenerate symmetrization.
    ///
    /// # Errors
    ///
    /// `Config` on a length mismatch.
    pub fn set_observed_frequencies(&mut self, observed: &[f64]) -> Result<()> {
        if !self.kind.is_nucleotide() {
            return Ok(());
        }
        if observed.len() != self.size {
            return Err(AureliaError::Config(format!(
                "expected {} observed frequencies, got {}",
                self.size,
                observed.len()
            )));
        }
        let mut freqs: Vec<f64> = observed.iter().map(|&f| f.max(1e-6)).collect();
        let sum: f64 = freqs.iter().sum();
        for f in &mut freqs {
            *f /= sum;
        }
        self.freqs = freqs;
        self.eigen = None;
        Ok(())
    }

    /// Set the model's free substitution parameters.
    ///
    /// 5 exchangeabilities for GTR, κ for HKY85; a no-op for the
    /// empirical amino-acid models.
    ///
    /// # Errors
    ///
    /// `Config` on wrong arity or nonpositive values.
    pub fn set_parameters(&mut self, params: &[f64]) -> Result<()> {
        let expected = self.kind.parameter_count();
        if expected == 0 {
            return Ok(());
        }
        if params.len() != expected {
            return Err(AureliaError::Config(format!(
                "{:?} takes {} substitution parameters, got {}",
                self.kind,
                expected,
                params.len()
            )));
        }
        for (i, &p) in params.iter().enumerate() {
            if !(p > 0.0) || !p.is_finite() {
                return Err(AureliaError::Config(format!(
                    "substitution parameter [{}] = {} must be positive and finite",
                    i, p
                )));
            }
        }
        self.params = params.to_vec();
        self.eigen = None;
        Ok(())
    }

    /// Set the gamma shape parameter.
    ///
    /// # Errors
    ///
    /// `Config` if alpha is not positive.
    pub fn set_alpha(&mut self, alpha: f64) -> Result<()> {
        GammaRates::new(alpha, self.categories)?;
        self.alpha = alpha;
        self.eigen = None;
        Ok(())
    }

    /// Set the number of discrete-gamma rate categories.
    ///
    /// # Errors
    ///
    /// `Config` if zero.
    pub fn set_rate_categories(&mut self, categories: usize) -> Result<()> {
        GammaRates::new(self.alpha, categories)?;
        self.categories = categories;
        self.eigen = None;
        Ok(())
    }

    /// The instantaneous rate matrix Q for the current parameters,
    /// normalized to one expected substitution per site per unit time.
    ///
    /// # Errors
    ///
    /// `Config` if the current parameters are invalid for the kind.
    pub fn rate_matrix(&self) -> Result<Vec<Vec<f64>>> {
        if self.kind.is_nucleotide() {
            let rates: [f64; 5] = match self.kind {
                ModelKind::Hky85 => models::hky85_rates(self.params[0])?,
                _ => self
                    .params
                    .as_slice()
                    .try_into()
                    .map_err(|_| AureliaError::Config("GTR takes 5 parameters".into()))?,
            };
            let freqs: [f64; 4] = self.freqs.as_slice().try_into().unwrap_or([0.25; 4]);
            let q4 = GtrParams::new(rates, freqs)?.rate_matrix();
            return Ok(q4.iter().map(|row| row.to_vec()).collect());
        }
        let s = match self.kind {
            ModelKind::Jtt => upper_triangle_to_matrix(&JTT_RATES),
            ModelKind::Lg => upper_triangle_to_matrix(&LG_RATES),
            _ => upper_triangle_to_matrix(&WAG_RATES),
        };
        Ok(build_rate_matrix(&s, &self.freqs))
    }

    /// Build (or rebuild) the cached eigendecomposition and category
    /// rates. Idempotent for fixed inputs; required after any parameter
    /// change.
    ///
    /// # Errors
    ///
    /// `Config` on invalid parameters, `Numeric` if the Jacobi iteration
    /// fails to converge.
    pub fn calculate(&mut self) -> Result<()> {
        models::validate_frequencies(&self.freqs)?;
        let q = self.rate_matrix()?;
        let n = self.size;

        let sqrt_pi: Vec<f64> = self.freqs.iter().map(|&f| f.sqrt()).collect();

        // Symmetrize: B = diag(√π) · Q · diag(1/√π).
        let mut b = vec![vec![0.0; n]; n];
        for i in 0..n {
            for j in 0..n {
                b[i][j] = sqrt_pi[i] * q[i][j] / sqrt_pi[j];
            }
        }

        let (values, vectors) = eigen_decompose(&b)?;

        let mut left = vec![0.0; n * n];
        let mut right = vec![0.0; n * n];
        for i in 0..n {
            for k in 0..n {
                left[i * n + k] = vectors[i][k] / sqrt_pi[i];
                right[k * n + i] = vectors[i][k] * sqrt_pi[i];
            }
        }

        self.eigen = Some(EigenSystem {
            values,
            left,
            right,
        });
        self.category_rates = GammaRates::new(self.alpha, self.categories)?.category_rates();
        Ok(())
    }

    /// Transition matrices `P_r(t)` for every rate category, each a flat
    /// row-major K×K stochastic matrix.
    ///
    /// # Errors
    ///
    /// `Internal` if [`SubstitutionModel::calculate`] has not run,
    /// `Numeric` for a negative or non-finite `t`.
    pub fn probability_matrices(&self, t: f64) -> Result<Vec<Vec<f64>>> {
        if !(t >= 0.0) || !t.is_finite() {
            return Err(AureliaError::Numeric(format!(
                "divergence time {} must be finite and non-negative",
                t
            )));
        }
        let eigen = self.eigen.as_ref().ok_or_else(|| {
            AureliaError::Internal("probability_matrices before calculate()".into())
        })?;

        let n = self.size;
        let mut out = Vec::with_capacity(self.category_rates.len());
        for &rate in &self.category_rates {
            let scaled: Vec<f64> = eigen
                .values
                .iter()
                .map(|&v| (v * t * rate).exp())
                .collect();
            let mut p = vec![0.0; n * n];
            for i in 0..n {
                for j in 0..n {
                    let mut sum = 0.0;
                    for k in 0..n {
                        sum += eigen.left[i * n + k] * scaled[k] * eigen.right[k * n + j];
                    }
                    p[i * n + j] = sum.max(0.0);
                }
            }
            out.push(p);
        }
        Ok(out)
    }
}

/// Build a normalized rate matrix Q from exchangeabilities S and
/// frequencies π.
///
/// `Q[i][j] = S[i][j] · π_j` for i ≠ j, rows sum to 0, scaled so
/// `−Σ π_i Q_ii = 1`.
pub(crate) fn build_rate_matrix(exchangeabilities: &[Vec<f64>], freqs: &[f64]) -> Vec<Vec<f64>> {
    let n = freqs.len();
    let mut q = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..n {
            if i != j {
                q[i][j] = exchangeabilities[i][j] * freqs[j];
            }
        }
        let off_diag: f64 = (0..n).filter(|&j| j != i).map(|j| q[i][j]).sum();
        q[i][i] = -off_diag;
    }

    let mu: f64 = (0..n).map(|i| -freqs[i] * q[i][i]).sum();
    if mu > 0.0 {
        for row in &mut q {
            for v in row.iter_mut() {
                *v /= mu;
            }
        }
    }

    q
}

/// Jacobi eigendecomposition of a real symmetric matrix.
///
/// Returns `(eigenvalues, eigenvectors)` where `eigenvectors[i][k]` is
/// the i-th component of the k-th eigenvector. The rotation targeting
/// the largest off-diagonal element repeats until that element falls
/// below 1e-13.
///
/// # Errors
///
/// `Numeric` if the iteration cap (100·K²) is exhausted first.
pub(crate) fn eigen_decompose(matrix: &[Vec<f64>]) -> Result<(Vec<f64>, Vec<Vec<f64>>)> {
    let n = matrix.len();
    let mut a: Vec<Vec<f64>> = matrix.to_vec();

    let mut v: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row
        })
        .collect();

    let max_iter = 100 * n * n;
    let mut converged = false;

    for _ in 0..max_iter {
        // Find largest off-diagonal element.
        let mut max_val = 0.0f64;
        let mut p = 0;
        let mut q = 1;
        for i in 0..n {
            for j in (i + 1)..n {
                if a[i][j].abs() > max_val {
                    max_val = a[i][j].abs();
                    p = i;
                    q = j;
                }
            }
        }
        if max_val < 1e-13 {
            converged = true;
            break;
        }

        // Rotation angle annihilating a[p][q].
        let theta = if (a[p][p] - a[q][q]).abs() < 1e-30 {
            std::f64::consts::FRAC_PI_4
        } else {
            0.5 * (2.0 * a[p][q] / (a[p][p] - a[q][q])).atan()
        };
        let c = theta.cos();
        let s = theta.sin();

        // Apply the Givens rotation to columns p and q, then rows.
        let mut new_a = a.clone();
        for i in 0..n {
            new_a[i][p] = c * a[i][p] + s * a[i][q];
            new_a[i][q] = -s * a[i][p] + c * a[i][q];
        }
        let tmp = new_a.clone();
        for j in 0..n {
            new_a[p][j] = c * tmp[p][j] + s * tmp[q][j];
            new_a[q][j] = -s * tmp[p][j] + c * tmp[q][j];
        }
        new_a[p][q] = 0.0;
        new_a[q][p] = 0.0;
        a = new_a;

        // Accumulate the eigenvectors.
        let mut new_v = v.clone();
        for i in 0..n {
            new_v[i][p] = c * v[i][p] + s * v[i][q];
            new_v[i][q] = -s * v[i][p] + c * v[i][q];
        }
        v = new_v;
    }

    if !converged {
        return Err(AureliaError::Numeric(
            "eigendecomposition failed to converge".into(),
        ));
    }

    let eigenvalues: Vec<f64> = (0..n).map(|i| a[i][i]).collect();
    Ok((eigenvalues, v))
}
