//! Diagonal bands for the pair-HMM dynamic programming.
//!
//! A band restricts each DP matrix to a per-row range of columns around
//! the expected alignment diagonal, making the sweep linear instead of
//! quadratic in sequence length. The geometry comes from a rough guide
//! distance: the wider the expected divergence, the wider the band.

/// Inclusive per-row column ranges for the M, X and Y matrices.
///
/// `None` marks an empty row ("skip"). The X band sits one column left
/// of the M band and the Y band one column right, reflecting the HMM
/// topology: X advances in `i` only and drifts below the diagonal, Y
/// advances in `j` only and drifts above it.
#[derive(Debug, Clone)]
pub struct Band {
    m: usize,
    n: usize,
    match_rows: Vec<Option<(usize, usize)>>,
    x_rows: Vec<Option<(usize, usize)>>,
    y_rows: Vec<Option<(usize, usize)>>,
}

impl Band {
    /// The permissive band: every row spans `[0, n]` in all three
    /// matrices. Used by the model-parameter estimator.
    pub fn full(m: usize, n: usize) -> Self {
        let rows = vec![Some((0, n)); m + 1];
        Self {
            m,
            n,
            match_rows: rows.clone(),
            x_rows: rows.clone(),
            y_rows: rows,
        }
    }

    /// A band of half-width `w` around the expected diagonal
    /// `j ≈ i·n/m`, with the X/Y matrices offset by ∓1 column.
    pub fn around_diagonal(m: usize, n: usize, w: usize) -> Self {
        let w = w as isize;
        let center = |i: usize| -> isize {
            if m == 0 {
                0
            } else {
                ((i as f64) * (n as f64) / (m as f64)).round() as isize
            }
        };

        let clamp_row = |lo: isize, hi: isize| -> Option<(usize, usize)> {
            let lo = lo.max(0);
            let hi = hi.min(n as isize);
            if lo > hi {
                None
            } else {
                Some((lo as usize, hi as usize))
            }
        };

        let mut match_rows = Vec::with_capacity(m + 1);
        let mut x_rows = Vec::with_capacity(m + 1);
        let mut y_rows = Vec::with_capacity(m + 1);
        for i in 0..=m {
            let c = center(i);
            match_rows.push(clamp_row(c - w, c + w));
            x_rows.push(clamp_row(c - w - 1, c + w - 1));
            y_rows.push(clamp_row(c - w + 1, c + w + 1));
        }

        Self {
            m,
            n,
            match_rows,
            x_rows,
            y_rows,
        }
    }

    /// Row count − 1 (length of the first sequence).
    pub fn m(&self) -> usize {
        self.m
    }

    /// Column bound (length of the second sequence).
    pub fn n(&self) -> usize {
        self.n
    }

    /// Column range of the M matrix in row `i`.
    pub fn match_row(&self, i: usize) -> Option<(usize, usize)> {
        self.match_rows[i]
    }

    /// Column range of the X matrix in row `i`.
    pub fn x_row(&self, i: usize) -> Option<(usize, usize)> {
        self.x_rows[i]
    }

    /// Column range of the Y matrix in row `i`.
    pub fn y_row(&self, i: usize) -> Option<(usize, usize)> {
        self.y_rows[i]
    }

    /// Materialized cells across the three matrices.
    pub fn cell_count(&self) -> usize {
        let span = |rows: &[Option<(usize, usize)>]| -> usize {
            rows.iter()
                .map(|r| r.map_or(0, |(lo, hi)| hi - lo + 1))
                .sum()
        };
        span(&self.match_rows) + span(&self.x_rows) + span(&self.y_rows)
    }
}

/// A band plus the Brent search interval it implies.
#[derive(Debug, Clone)]
pub struct BandPlan {
    pub band: Band,
    /// Left Brent bound.
    pub t_lo: f64,
    /// Right Brent bound; `None` defers to the indel model's divergence
    /// bound (the band calculator has no opinion near saturation).
    pub t_hi: Option<f64>,
    /// Brent accuracy.
    pub accuracy: f64,
    /// Starting point for the search, from the guide distance.
    pub t_seed: f64,
}

/// Guide distance above which the plan defers its right bound.
const SATURATION_DISTANCE: f64 = 1.5;

/// Derive the band and Brent bounds for one pair from a rough guide
/// distance.
///
/// The half-width grows with `√max(m,n)` and with the guide distance,
/// and always covers the slope of the diagonal so that every in-band
/// cell's predecessors are in-band in the previous row.
pub fn plan_band(m: usize, n: usize, guide_distance: f64) -> BandPlan {
    let d = guide_distance.max(0.0);
    let longest = m.max(n).max(1) as f64;
    let slope = if m == 0 { n } else { n.div_ceil(m) };
    let w = (3.0 * longest.sqrt() * (1.0 + d)).ceil() as usize + slope + 1;

    let band = Band::around_diagonal(m, n, w);

    let t_hi = if d >= SATURATION_DISTANCE {
        None
    } else {
        Some((3.0 * d).max(0.5))
    };
    let accuracy = if d < 0.25 { 1e-5 } else { 1e-3 };
    let t_seed = match t_hi {
        Some(hi) => d.min(hi),
        None => d,
    };

    BandPlan {
        band,
        t_lo: 0.0,
        t_hi,
        accuracy,
        t_seed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_band_covers_everything() {
        let band = Band::full(5, 7);
        for i in 0..=5 {
            assert_eq!(band.match_row(i), Some((0, 7)));
            assert_eq!(band.x_row(i), Some((0, 7)));
            assert_eq!(band.y_row(i), Some((0, 7)));
        }
        assert_eq!(band.cell_count(), 3 * 6 * 8);
    }

    #[test]
    fn corners_are_inside_every_matrix_band() {
        for &(m, n) in &[(10, 10), (40, 25), (25, 40), (200, 180)] {
            let plan = plan_band(m, n, 0.3);
            for row in [plan.band.match_row(0), plan.band.x_row(0), plan.band.y_row(0)] {
                let (lo, _) = row.expect("row 0 must not be empty");
                assert_eq!(lo, 0, "(0,0) outside band");
            }
            for row in [
                plan.band.match_row(m),
                plan.band.x_row(m),
                plan.band.y_row(m),
            ] {
                let (lo, hi) = row.expect("last row must not be empty");
                assert!(lo <= n && hi == n, "(m,n) outside band");
            }
        }
    }

    #[test]
    fn ranges_are_clamped() {
        let plan = plan_band(50, 50, 0.1);
        for i in 0..=50 {
            for row in [
                plan.band.match_row(i),
                plan.band.x_row(i),
                plan.band.y_row(i),
            ] {
                if let Some((lo, hi)) = row {
                    assert!(lo <= hi);
                    assert!(hi <= 50);
                }
            }
        }
    }

    #[test]
    fn interior_predecessors_stay_in_band() {
        // Away from the band's own corner cells, a cell's diagonal
        // predecessor must be in the previous row of every matrix; only
        // the outermost edge cells may lose a predecessor.
        for &(m, n) in &[(120, 90), (90, 120), (80, 80)] {
            let plan = plan_band(m, n, 0.4);
            let band = &plan.band;
            for i in 1..=m {
                let (lo, hi) = band.match_row(i).expect("row empty");
                for j in (lo + 2).max(1)..=hi.saturating_sub(2) {
                    for prev in [band.match_row(i - 1), band.x_row(i - 1), band.y_row(i - 1)]
                    {
                        let (plo, phi) = prev.expect("predecessor row empty");
                        assert!(
                            plo <= j - 1 && j - 1 <= phi,
                            "({}x{}) M({},{}) predecessor outside [{}, {}]",
                            m,
                            n,
                            i,
                            j,
                            plo,
                            phi
                        );
                    }
                }
            }
        }
    }

    #[test]
    fn width_grows_with_distance() {
        let narrow = plan_band(400, 400, 0.0);
        let wide = plan_band(400, 400, 1.2);
        assert!(wide.band.cell_count() > narrow.band.cell_count());
    }

    #[test]
    fn band_is_sparse_for_long_sequences() {
        let plan = plan_band(1000, 1000, 0.1);
        let full = Band::full(1000, 1000);
        assert!(plan.band.cell_count() * 4 < full.cell_count());
    }

    #[test]
    fn x_and_y_bands_are_offset() {
        let band = Band::around_diagonal(20, 20, 5);
        let (mlo, mhi) = band.match_row(10).unwrap();
        let (xlo, xhi) = band.x_row(10).unwrap();
        let (ylo, yhi) = band.y_row(10).unwrap();
        assert_eq!((xlo, xhi), (mlo - 1, mhi - 1));
        assert_eq!((ylo, yhi), (mlo + 1, mhi + 1));
    }

    #[test]
    fn bounds_follow_the_guide_distance() {
        let close = plan_band(100, 100, 0.05);
        assert_eq!(close.t_lo, 0.0);
        assert_eq!(close.t_hi, Some(0.5));
        assert_eq!(close.accuracy, 1e-5);
        assert!((close.t_seed - 0.05).abs() < 1e-12);

        let mid = plan_band(100, 100, 0.8);
        assert_eq!(mid.t_hi, Some(0.8 * 3.0));
        assert_eq!(mid.accuracy, 1e-3);

        let far = plan_band(100, 100, 2.0);
        assert_eq!(far.t_hi, None);
        assert_eq!(far.t_seed, 2.0);
    }

    #[test]
    fn seed_stays_inside_the_interval() {
        let plan = plan_band(100, 100, 0.4);
        let hi = plan.t_hi.unwrap();
        assert!(plan.t_lo <= plan.t_seed && plan.t_seed <= hi);
    }
}
