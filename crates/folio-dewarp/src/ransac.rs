//! Generic RANSAC
//!
//! Implement [`Estimator`] for a model and call [`ransac`] with the data and
//! a [`RansacOptions`]. The best sample model is chosen by inlier count
//! (ties broken by the residual sum), refit by least squares on its
//! inliers, and the inlier set is re-evaluated against the refit model.
//! Failure is reported through [`RansacResult::success`]; nothing panics.

use folio_core::Polynomial;
use rand::rngs::StdRng;
use rand::seq::index;

/// Configuration of one RANSAC run
#[derive(Debug, Clone, PartialEq)]
pub struct RansacOptions {
    /// Number of random samples drawn
    pub max_iters: usize,
    /// Inlier residual threshold
    pub thresh: f64,
    /// Points per random sample
    pub min_samples: usize,
}

impl RansacOptions {
    /// Options with the default iteration count (100).
    pub fn new(min_samples: usize, thresh: f64) -> Self {
        Self {
            max_iters: 100,
            thresh,
            min_samples: min_samples.max(1),
        }
    }
}

/// Output of a RANSAC run
#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    /// Whether a model was found
    pub success: bool,
    /// Least-squares model over the inliers
    pub model: Option<M>,
    /// Inlier flag per datum
    pub inliers: Vec<bool>,
}

impl<M> RansacResult<M> {
    fn failed(n: usize) -> Self {
        Self {
            success: false,
            model: None,
            inliers: vec![false; n],
        }
    }

    /// Number of inliers
    pub fn inlier_count(&self) -> usize {
        self.inliers.iter().filter(|&&b| b).count()
    }
}

/// A model that RANSAC can fit.
pub trait Estimator {
    type Datum;
    type Model;

    /// Least-squares fit over the given indices; `None` if degenerate.
    fn fit(data: &[Self::Datum], indices: &[usize]) -> Option<Self::Model>;

    /// Non-negative residual of one datum.
    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64;
}

fn score<E: Estimator>(model: &E::Model, data: &[E::Datum], thresh: f64) -> (Vec<bool>, usize, f64) {
    let mut mask = Vec::with_capacity(data.len());
    let mut count = 0;
    let mut sum = 0.0;
    for d in data {
        let r = E::residual(model, d);
        let inlier = r <= thresh;
        if inlier {
            count += 1;
            sum += r;
        }
        mask.push(inlier);
    }
    (mask, count, sum)
}

fn indices_of(mask: &[bool]) -> Vec<usize> {
    mask.iter()
        .enumerate()
        .filter_map(|(i, &b)| b.then_some(i))
        .collect()
}

/// Run RANSAC for estimator `E`.
pub fn ransac<E: Estimator>(
    data: &[E::Datum],
    opts: &RansacOptions,
    rng: &mut StdRng,
) -> RansacResult<E::Model> {
    let n = data.len();
    let k = opts.min_samples.max(1);
    if n < k {
        return RansacResult::failed(n);
    }

    let mut best: Option<(Vec<bool>, usize, f64)> = None;
    let iters = if n == k { 1 } else { opts.max_iters.max(1) };
    for _ in 0..iters {
        let sample = index::sample(rng, n, k).into_vec();
        let Some(model) = E::fit(data, &sample) else {
            continue;
        };
        let (mask, count, sum) = score::<E>(&model, data, opts.thresh);
        if count == 0 {
            continue;
        }
        let better = match &best {
            None => true,
            Some((_, bc, bs)) => count > *bc || (count == *bc && sum < *bs),
        };
        if better {
            best = Some((mask, count, sum));
        }
    }

    let Some((mask, _, _)) = best else {
        return RansacResult::failed(n);
    };
    let Some(model) = E::fit(data, &indices_of(&mask)) else {
        return RansacResult::failed(n);
    };
    let (refit_mask, count, _) = score::<E>(&model, data, opts.thresh);
    if count == 0 {
        return RansacResult::failed(n);
    }
    RansacResult {
        success: true,
        model: Some(model),
        inliers: refit_mask,
    }
}

/// Degree of the baseline polynomial
pub const BASELINE_DEGREE: usize = 5;

/// `y = p(x)` with `deg p <= 5`, vertical residual
pub struct BaselineEstimator;

impl Estimator for BaselineEstimator {
    type Datum = (f64, f64);
    type Model = Polynomial;

    fn fit(data: &[Self::Datum], indices: &[usize]) -> Option<Self::Model> {
        let xs: Vec<f64> = indices.iter().map(|&i| data[i].0).collect();
        let ys: Vec<f64> = indices.iter().map(|&i| data[i].1).collect();
        Polynomial::fit(&xs, &ys, BASELINE_DEGREE).ok()
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        (model.eval(datum.0) - datum.1).abs()
    }
}

/// Near-vertical line `x = m y + b`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideLine {
    /// Slope dx/dy
    pub m: f64,
    /// x at y = 0
    pub b: f64,
}

impl SideLine {
    /// x coordinate at height `y`
    pub fn x_at(&self, y: f64) -> f64 {
        self.m * y + self.b
    }

    /// Intersection with another side line, `None` when parallel.
    pub fn intersect(&self, other: &SideLine) -> Option<(f64, f64)> {
        let dm = self.m - other.m;
        if dm.abs() < 1e-12 {
            return None;
        }
        let y = (other.b - self.b) / dm;
        let x = self.x_at(y);
        (x.is_finite() && y.is_finite()).then_some((x, y))
    }
}

/// Fits [`SideLine`]s with a horizontal residual
pub struct SideLineEstimator;

impl Estimator for SideLineEstimator {
    type Datum = (f64, f64);
    type Model = SideLine;

    fn fit(data: &[Self::Datum], indices: &[usize]) -> Option<Self::Model> {
        if indices.len() < 2 {
            return None;
        }
        let n = indices.len() as f64;
        let (mut sy, mut sx, mut syy, mut sxy) = (0.0, 0.0, 0.0, 0.0);
        for &i in indices {
            let (x, y) = data[i];
            sy += y;
            sx += x;
            syy += y * y;
            sxy += x * y;
        }
        let denom = n * syy - sy * sy;
        if denom.abs() < 1e-9 * n * n {
            return None;
        }
        let m = (n * sxy - sy * sx) / denom;
        let b = (sx - m * sy) / n;
        Some(SideLine { m, b })
    }

    fn residual(model: &Self::Model, datum: &Self::Datum) -> f64 {
        (model.x_at(datum.1) - datum.0).abs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn noisy_baseline() -> Vec<(f64, f64)> {
        let mut data: Vec<(f64, f64)> = (0..30)
            .map(|i| {
                let x = i as f64 * 20.0;
                (x, 100.0 + 0.01 * x + 2e-5 * x * x)
            })
            .collect();
        data[5].1 += 40.0;
        data[17].1 -= 35.0;
        data[23].1 += 60.0;
        data
    }

    #[test]
    fn test_baseline_rejects_outliers() {
        let data = noisy_baseline();
        let mut rng = StdRng::seed_from_u64(7);
        let res = ransac::<BaselineEstimator>(&data, &RansacOptions::new(16, 2.0), &mut rng);
        assert!(res.success);
        assert_eq!(res.inlier_count(), 27);
        assert!(!res.inliers[5] && !res.inliers[17] && !res.inliers[23]);
        let model = res.model.unwrap();
        assert!((model.eval(300.0) - (100.0 + 3.0 + 1.8)).abs() < 1e-6);
    }

    #[test]
    fn test_ransac_idempotent_on_inliers() {
        let data = noisy_baseline();
        let mut rng = StdRng::seed_from_u64(11);
        let opts = RansacOptions::new(16, 2.0);
        let first = ransac::<BaselineEstimator>(&data, &opts, &mut rng);
        let kept: Vec<(f64, f64)> = data
            .iter()
            .zip(&first.inliers)
            .filter_map(|(d, &b)| b.then_some(*d))
            .collect();
        let second = ransac::<BaselineEstimator>(&kept, &opts, &mut rng);
        assert!(second.success);
        assert_eq!(second.inlier_count(), kept.len());
        let (m1, m2) = (first.model.unwrap(), second.model.unwrap());
        for x in [0.0, 200.0, 580.0] {
            assert!((m1.eval(x) - m2.eval(x)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_side_lines_meet_at_vanishing_point() {
        // Two lines converging at (500, -2000).
        let left: Vec<(f64, f64)> = (0..10)
            .map(|i| {
                let y = i as f64 * 50.0;
                (500.0 - 400.0 * (y + 2000.0) / 2000.0, y)
            })
            .collect();
        let right: Vec<(f64, f64)> = (0..10)
            .map(|i| {
                let y = i as f64 * 50.0;
                (500.0 + 400.0 * (y + 2000.0) / 2000.0, y)
            })
            .collect();
        let mut rng = StdRng::seed_from_u64(3);
        let opts = RansacOptions::new(3, 1.0);
        let l = ransac::<SideLineEstimator>(&left, &opts, &mut rng).model.unwrap();
        let r = ransac::<SideLineEstimator>(&right, &opts, &mut rng).model.unwrap();
        let (x, y) = l.intersect(&r).unwrap();
        assert!((x - 500.0).abs() < 1e-6);
        assert!((y + 2000.0).abs() < 1e-6);
        assert!(l.intersect(&l).is_none());
    }

    #[test]
    fn test_too_few_points_fail() {
        let mut rng = StdRng::seed_from_u64(0);
        let res = ransac::<SideLineEstimator>(&[(0.0, 0.0)], &RansacOptions::new(3, 1.0), &mut rng);
        assert!(!res.success);
        assert!(res.model.is_none());
    }
}
