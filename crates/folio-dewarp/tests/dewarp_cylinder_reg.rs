//! Curled page dewarp regression test
//!
//! A synthetic page bent into the cylinder `Z = c X^2` and viewed by the
//! default camera. Over the text's X range, the fitted surface with its
//! affine part removed must follow the ground truth `c X^2` (also with its
//! affine part removed) within half of the truth's own RMS, and the
//! corrected page must have straighter lines than the curled input.
//!
//! Run with:
//! ```
//! cargo test -p folio-dewarp --test dewarp_cylinder_reg
//! ```

use folio_core::Pix;
use folio_dewarp::camera::{Camera, rotation};
use folio_dewarp::loss::{LossOptions, Objective};
use folio_dewarp::newton::is_plausible;
use folio_dewarp::optimize::{fit_is_plausible, fit_with_retries};
use folio_dewarp::vanishing::initial_rotation;
use folio_dewarp::{
    CameraConfig, DewarpInput, DewarpOptions, Dewarper, PolynomialSurface, SurfaceModel, TextLine,
    find_text_lines,
};
use folio_test::RegParams;
use folio_test::synthetic::{TextPageSpec, curl_cylinder, render_text_page};
use nalgebra::Vector3;
use rand::SeedableRng;
use rand::rngs::StdRng;

const CURVATURE: f64 = 2e-3;

/// Allowed RMS error of the detrended fit, relative to the detrended truth
const CURVE_TOLERANCE: f64 = 0.5;

/// Samples across the X range for the curve comparison
const CURVE_SAMPLES: usize = 64;

fn page_spec() -> TextPageSpec {
    TextPageSpec {
        width: 700,
        height: 600,
        margin: 50,
        glyph_height: 18,
        line_pitch: 38,
        stroke: 3,
    }
}

/// `ys` minus its least-squares line over `xs`.
fn detrended(xs: &[f64], ys: &[f64]) -> Vec<f64> {
    let n = xs.len() as f64;
    let mx = xs.iter().sum::<f64>() / n;
    let my = ys.iter().sum::<f64>() / n;
    let sxx: f64 = xs.iter().map(|x| (x - mx).powi(2)).sum();
    let sxy: f64 = xs.iter().zip(ys).map(|(x, y)| (x - mx) * (y - my)).sum();
    let slope = if sxx > 0.0 { sxy / sxx } else { 0.0 };
    xs.iter()
        .zip(ys)
        .map(|(x, y)| y - my - slope * (x - mx))
        .collect()
}

fn rms(values: &[f64]) -> f64 {
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Mean RMS distance of base points from each line's straight fit.
fn straightness(lines: &[TextLine]) -> f64 {
    let rms: Vec<f64> = lines
        .iter()
        .filter_map(|line| {
            let fit = line.fit_line()?;
            let pts = line.base_points();
            let ss: f64 = pts.iter().map(|&(x, y)| (y - fit.eval(x)).powi(2)).sum();
            Some((ss / pts.len() as f64).sqrt())
        })
        .collect();
    if rms.is_empty() {
        return f64::INFINITY;
    }
    rms.iter().sum::<f64>() / rms.len() as f64
}

fn lines_of(binary: &Pix, options: &DewarpOptions) -> Vec<TextLine> {
    let mut rng = StdRng::seed_from_u64(options.seed);
    find_text_lines(binary, 1.0, options.stroke_k, options.coarse_line_len, &mut rng)
        .expect("find lines")
        .lines
}

#[test]
fn dewarp_cylinder_reg() {
    let mut rp = RegParams::new("dewarp_cylinder");
    let text = page_spec();
    let flat = render_text_page(&text);
    let curled = curl_cylinder(&flat, CURVATURE, 3230.0);
    let options = DewarpOptions::default();
    let camera = Camera::from_config(&CameraConfig::default(), text.width, text.height);
    let mut rng = StdRng::seed_from_u64(options.seed);

    // --- Lines of the curled page ---
    let set = find_text_lines(
        &curled,
        camera.mult,
        options.stroke_k,
        options.coarse_line_len,
        &mut rng,
    )
    .expect("find lines");
    let before = straightness(&set.lines);
    eprintln!(
        "AH = {}, lines = {}, straightness before = {:.3}",
        set.ah,
        set.lines.len(),
        before
    );
    rp.check(set.lines.len() >= 8, "most lines survive filtering");

    // --- Surface fit ---
    let loss = LossOptions {
        depth_scaling: options.depth_scaling,
        outer_weighting: options.outer_weighting,
        align_weight: options.align_weight,
    };
    let theta0 = initial_rotation(&camera, &set.lines, set.ah, &mut rng);
    let objective = Objective::new(camera, &[set.lines.clone()], set.ah, loss, &mut rng);
    let model = PolynomialSurface;
    let fit = fit_with_retries(&objective, &model, theta0, &options, &mut rng);
    eprintln!("norm = {:.3} after {} attempt(s)", fit.best.norm, fit.attempts);
    rp.check(fit.attempts >= 1 && fit.attempts <= options.max_attempts, "bounded restarts");
    rp.check(fit.best.plausible, "fit is plausible");
    rp.check(
        fit_is_plausible(&objective, &model, &fit.best.params),
        "chosen parameters pass the plausibility checks",
    );

    // Shape of the fitted surface across the text, against the ground truth.
    let r = rotation(&fit.best.params.theta);
    let surface = model.surface(&fit.best.params);
    let points: Vec<Vector3<f64>> = set
        .lines
        .iter()
        .flat_map(|l| l.base_points())
        .map(|(x, y)| camera.focal_point(x, y))
        .collect();
    let mut warm = vec![f64::NAN; points.len()];
    let xs: Vec<f64> = model
        .intersect(&camera, &r, &surface, &points, &mut warm)
        .into_iter()
        .filter(|sp| is_plausible(&surface, sp))
        .map(|sp| sp.xyz.x)
        .collect();
    rp.check(xs.len() >= 2, "base points hit the fitted surface");
    let x0 = xs.iter().copied().fold(f64::INFINITY, f64::min);
    let x1 = xs.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let samples: Vec<f64> = (0..CURVE_SAMPLES)
        .map(|i| x0 + (x1 - x0) * i as f64 / (CURVE_SAMPLES - 1) as f64)
        .collect();
    let fitted: Vec<f64> = samples.iter().map(|&x| surface.eval(x)).collect();
    let truth: Vec<f64> = samples.iter().map(|&x| CURVATURE * x * x).collect();
    let fitted = detrended(&samples, &fitted);
    let truth = detrended(&samples, &truth);
    let error: Vec<f64> = fitted.iter().zip(&truth).map(|(f, t)| f - t).collect();
    let (err_rms, truth_rms) = (rms(&error), rms(&truth));
    eprintln!(
        "X range [{:.1}, {:.1}], curve RMS error {:.2} vs truth RMS {:.2}",
        x0, x1, err_rms, truth_rms
    );
    rp.check(truth_rms > 1.0, "the curl is measurable");
    rp.check(
        err_rms <= CURVE_TOLERANCE * truth_rms,
        "fitted curve follows the cylinder",
    );

    // --- Engine ---
    let dewarper = Dewarper::new(CameraConfig::default(), options.clone());
    let out = dewarper
        .dewarp(&DewarpInput::new(&curled, &curled))
        .expect("dewarp");
    rp.compare_values(1.0, out.pages.len() as f64, 0.0);
    let page = &out.pages[0];
    rp.check(!page.report.identity, "page is corrected");
    rp.check(!page.report.used_fallback_mesh, "mesh uses the arc length");
    let ratio = (page.image.width() as f64 * page.image.height() as f64)
        / (text.width as f64 * text.height as f64);
    rp.check(ratio > 0.5 && ratio < 2.0, "output area within 2x of the input");

    let corrected = page.image.threshold_to_binary(128).expect("binarize");
    let after = straightness(&lines_of(&corrected, &options));
    eprintln!(
        "output {} x {}, straightness after = {:.3}",
        page.image.width(),
        page.image.height(),
        after
    );
    rp.check(after < before, "lines are straighter after dewarping");
    rp.write_pix_and_check(&page.image).expect("write output");

    assert!(rp.cleanup(), "dewarp_cylinder regression test failed");
}
