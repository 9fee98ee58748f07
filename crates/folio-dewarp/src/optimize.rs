//! Levenberg-Marquardt fit with random restarts
//!
//! Runs are ranked plausible first, then by residual norm. A run reports
//! the best plausible parameters it visited rather than its final state.

use crate::loss::{DewarpProblem, Objective};
use crate::params::Params;
use crate::surface::SurfaceModel;
use crate::types::DewarpOptions;
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use rand::Rng;
use rand::rngs::StdRng;
use tracing::{debug, info, warn};

/// Half-width of the uniform range for random restart rotations
pub const RESTART_THETA: f64 = 0.125;

/// Initial trust-region bound factor of the solver
const STEP_BOUND: f64 = 1.0;

/// Result of one optimizer run
#[derive(Debug, Clone)]
pub struct FitOutcome {
    /// Fitted parameters
    pub params: Params,
    /// Euclidean norm of the final residual vector
    pub norm: f64,
    /// Number of residual evaluations
    pub evaluations: usize,
    /// Whether the solver reported convergence
    pub converged: bool,
    /// Whether `params` passed the plausibility checks
    pub plausible: bool,
}

impl FitOutcome {
    /// Plausible runs rank first, then lower norms.
    fn is_better_than(&self, other: &FitOutcome) -> bool {
        match (self.plausible, other.plausible) {
            (true, false) => true,
            (false, true) => false,
            _ => self.norm < other.norm,
        }
    }
}

/// Result of the restart loop
#[derive(Debug, Clone)]
pub struct RetryOutcome {
    /// Best run (lowest norm)
    pub best: FitOutcome,
    /// Number of runs performed
    pub attempts: usize,
    /// Whether the best run is plausible with a norm below the acceptance
    /// threshold
    pub accepted: bool,
}

/// Run the solver once from `initial`.
///
/// Returns the lowest-norm plausible parameters evaluated during the run,
/// or the final parameters flagged implausible when none qualified.
pub fn fit_once(
    objective: &Objective,
    model: &dyn SurfaceModel,
    initial: &Params,
    options: &DewarpOptions,
) -> FitOutcome {
    let problem = DewarpProblem::new(objective, model, initial);
    let lm = LevenbergMarquardt::new()
        .with_ftol(options.ftol)
        .with_xtol(1e-8)
        .with_gtol(1e-8)
        .with_stepbound(STEP_BOUND)
        .with_patience(options.patience);
    let (problem, report) = lm.minimize(problem);
    let evaluations = report.number_of_evaluations;
    let converged = report.termination.was_successful();
    if let Some((params, norm)) = problem.best_plausible() {
        return FitOutcome {
            params: params.clone(),
            norm,
            evaluations,
            converged,
            plausible: true,
        };
    }
    let norm = problem
        .residuals()
        .map_or(f64::INFINITY, |r| r.norm());
    FitOutcome {
        params: problem.current_params().clone(),
        norm: if norm.is_finite() { norm } else { f64::INFINITY },
        evaluations,
        converged,
        plausible: false,
    }
}

/// Whether `params` passes the plausibility checks of the objective.
pub fn fit_is_plausible(objective: &Objective, model: &dyn SurfaceModel, params: &Params) -> bool {
    DewarpProblem::new(objective, model, params).is_plausible_fit()
}

/// The flat, unrotated start, used when no run stays plausible.
fn flat_fallback(objective: &Objective, model: &dyn SurfaceModel) -> FitOutcome {
    let params = objective.initial_params([0.0; 3]);
    let problem = DewarpProblem::new(objective, model, &params);
    let norm = problem
        .residuals()
        .map_or(f64::INFINITY, |r| r.norm());
    FitOutcome {
        plausible: problem.is_plausible_fit(),
        params,
        norm: if norm.is_finite() { norm } else { f64::INFINITY },
        evaluations: 1,
        converged: false,
    }
}

fn random_theta(rng: &mut StdRng) -> [f64; 3] {
    [
        rng.gen_range(-RESTART_THETA..RESTART_THETA),
        rng.gen_range(-RESTART_THETA..RESTART_THETA),
        rng.gen_range(-RESTART_THETA..RESTART_THETA),
    ]
}

/// Fit with up to `options.max_attempts` starts.
///
/// The first start uses `theta0` when given; every other start draws a
/// random rotation. The loop stops at the first plausible run whose norm
/// falls below `options.norm_threshold`, and the best run overall is
/// returned. If no run is plausible the flat, unrotated start is returned
/// instead.
pub fn fit_with_retries(
    objective: &Objective,
    model: &dyn SurfaceModel,
    theta0: Option<[f64; 3]>,
    options: &DewarpOptions,
    rng: &mut StdRng,
) -> RetryOutcome {
    let mut best: Option<FitOutcome> = None;
    let mut attempts = 0;
    for attempt in 0..options.max_attempts.max(1) {
        let theta = match (attempt, theta0) {
            (0, Some(t)) => t,
            _ => random_theta(rng),
        };
        let outcome = fit_once(objective, model, &objective.initial_params(theta), options);
        attempts += 1;
        debug!(
            attempt,
            norm = outcome.norm,
            evaluations = outcome.evaluations,
            converged = outcome.converged,
            plausible = outcome.plausible,
            "optimizer run finished"
        );
        let done = outcome.plausible && outcome.norm < options.norm_threshold;
        if best.as_ref().is_none_or(|b| outcome.is_better_than(b)) {
            best = Some(outcome);
        }
        if done {
            break;
        }
    }
    let best = match best {
        Some(b) if b.plausible => b,
        _ => {
            warn!(attempts, "no plausible fit, using the flat page");
            flat_fallback(objective, model)
        }
    };
    let accepted = best.plausible && best.norm < options.norm_threshold;
    info!(attempts, norm = best.norm, accepted, "surface fit");
    RetryOutcome {
        best,
        attempts,
        accepted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{Camera, rotation_angle};
    use crate::loss::{LossOptions, MAX_ROTATION};
    use crate::loss::tests::sample_lines;
    use crate::surface::PolynomialSurface;
    use crate::types::CameraConfig;
    use rand::SeedableRng;

    fn objective() -> Objective {
        let cam = Camera::from_config(&CameraConfig::default(), 460, 360);
        let mut rng = StdRng::seed_from_u64(1);
        let loss = LossOptions {
            depth_scaling: true,
            outer_weighting: true,
            align_weight: 0.6,
        };
        Objective::new(cam, &[sample_lines()], 16.0, loss, &mut rng)
    }

    #[test]
    fn test_flat_page_accepted_first_try() {
        let obj = objective();
        let opts = DewarpOptions::default();
        let mut rng = StdRng::seed_from_u64(0);
        let out = fit_with_retries(&obj, &PolynomialSurface, Some([0.0; 3]), &opts, &mut rng);
        assert_eq!(out.attempts, 1);
        assert!(out.accepted);
        assert!(out.best.norm < 5.0, "norm {}", out.best.norm);
        assert!(out.best.plausible);
    }

    #[test]
    fn test_retries_only_keep_plausible_fits() {
        let obj = objective();
        let opts = DewarpOptions::default()
            .with_max_attempts(4)
            .with_norm_threshold(0.0);
        let mut rng = StdRng::seed_from_u64(11);
        let out = fit_with_retries(&obj, &PolynomialSurface, None, &opts, &mut rng);
        assert_eq!(out.attempts, 4);
        assert!(out.best.plausible);
        assert!(fit_is_plausible(&obj, &PolynomialSurface, &out.best.params));
        assert!(rotation_angle(&out.best.params.theta) <= MAX_ROTATION);
    }

    #[test]
    fn test_plausible_run_outranks_lower_norm() {
        let obj = objective();
        let params = obj.initial_params([0.0; 3]);
        let good = FitOutcome {
            params: params.clone(),
            norm: 50.0,
            evaluations: 1,
            converged: true,
            plausible: true,
        };
        let degenerate = FitOutcome {
            norm: 1e-3,
            plausible: false,
            ..good.clone()
        };
        assert!(good.is_better_than(&degenerate));
        assert!(!degenerate.is_better_than(&good));
        let better = FitOutcome {
            norm: 10.0,
            ..good.clone()
        };
        assert!(better.is_better_than(&good));
    }

    #[test]
    fn test_flat_fallback_is_plausible() {
        let obj = objective();
        let out = flat_fallback(&obj, &PolynomialSurface);
        assert!(out.plausible);
        assert_eq!(out.params.theta, [0.0; 3]);
        assert!(out.norm.is_finite());
    }

    #[test]
    fn test_attempts_bounded_by_option() {
        let obj = objective();
        // Nothing can reach a negative norm, so every attempt runs.
        let opts = DewarpOptions::default()
            .with_max_attempts(3)
            .with_norm_threshold(0.0);
        let mut rng = StdRng::seed_from_u64(0);
        let out = fit_with_retries(&obj, &PolynomialSurface, None, &opts, &mut rng);
        assert_eq!(out.attempts, 3);
        assert!(!out.accepted);
        assert!(out.best.norm.is_finite());
    }

    #[test]
    fn test_random_theta_in_range() {
        let mut rng = StdRng::seed_from_u64(9);
        for _ in 0..100 {
            let t = random_theta(&mut rng);
            assert!(t.iter().all(|v| v.abs() < RESTART_THETA));
        }
    }
}
