//! Flat page dewarp regression test
//!
//! A synthetic page photographed head-on: the fit must keep the rotation
//! near identity, the mesh must be affine to within a few pixels, and the
//! engine output must keep roughly the page size.
//!
//! Run with:
//! ```
//! cargo test -p folio-dewarp --test dewarp_flat_reg
//! ```

use folio_dewarp::camera::Camera;
use folio_dewarp::loss::{LossOptions, Objective};
use folio_dewarp::mesh::{Mesh, MeshOptions, make_meshes};
use folio_dewarp::optimize::fit_with_retries;
use folio_dewarp::vanishing::initial_rotation;
use folio_dewarp::{
    CameraConfig, DewarpInput, DewarpOptions, Dewarper, PolynomialSurface, find_text_lines,
};
use folio_test::RegParams;
use folio_test::synthetic::{TextPageSpec, render_text_page};
use rand::SeedableRng;
use rand::rngs::StdRng;

fn page_spec() -> TextPageSpec {
    TextPageSpec {
        width: 700,
        height: 500,
        margin: 50,
        glyph_height: 18,
        line_pitch: 38,
        stroke: 3,
    }
}

/// Largest distance between a mesh node and the bilinear blend of the
/// four mesh corners.
fn affine_deviation(mesh: &Mesh) -> f64 {
    let (rows, cols) = (mesh.rows(), mesh.cols());
    let tl = mesh.get(0, 0);
    let tr = mesh.get(0, cols - 1);
    let bl = mesh.get(rows - 1, 0);
    let br = mesh.get(rows - 1, cols - 1);
    let mut worst = 0.0f64;
    for r in 0..rows {
        let t = r as f64 / (rows - 1) as f64;
        for c in 0..cols {
            let s = c as f64 / (cols - 1) as f64;
            let ex = (1.0 - t) * ((1.0 - s) * tl.0 + s * tr.0) + t * ((1.0 - s) * bl.0 + s * br.0);
            let ey = (1.0 - t) * ((1.0 - s) * tl.1 + s * tr.1) + t * ((1.0 - s) * bl.1 + s * br.1);
            let (x, y) = mesh.get(r, c);
            worst = worst.max((x - ex).hypot(y - ey));
        }
    }
    worst
}

#[test]
fn dewarp_flat_reg() {
    let mut rp = RegParams::new("dewarp_flat");
    let text = page_spec();
    let binary = render_text_page(&text);
    let options = DewarpOptions::default();
    let camera = Camera::from_config(&CameraConfig::default(), text.width, text.height);
    let mut rng = StdRng::seed_from_u64(options.seed);

    // --- Lines ---
    let set = find_text_lines(
        &binary,
        camera.mult,
        options.stroke_k,
        options.coarse_line_len,
        &mut rng,
    )
    .expect("find lines");
    eprintln!(
        "AH = {}, lines = {} of {}",
        set.ah,
        set.lines.len(),
        set.all_lines.len()
    );
    rp.compare_values(18.0, set.ah, 0.0);
    rp.compare_values(text.baselines().len() as f64, set.lines.len() as f64, 0.0);

    // --- Fit ---
    let loss = LossOptions {
        depth_scaling: options.depth_scaling,
        outer_weighting: options.outer_weighting,
        align_weight: options.align_weight,
    };
    let theta0 = initial_rotation(&camera, &set.lines, set.ah, &mut rng);
    let objective = Objective::new(camera, &[set.lines.clone()], set.ah, loss, &mut rng);
    let model = PolynomialSurface;
    let fit = fit_with_retries(&objective, &model, theta0, &options, &mut rng);
    let theta = fit.best.params.theta;
    let angle = (theta[0] * theta[0] + theta[1] * theta[1] + theta[2] * theta[2]).sqrt();
    eprintln!(
        "norm = {:.4} after {} attempt(s), |theta| = {:.5}",
        fit.best.norm, fit.attempts, angle
    );
    rp.check(fit.accepted, "flat page fit reaches the acceptance norm");
    rp.compare_values(0.0, angle, 0.05);

    // --- Mesh ---
    let mesh_opts = MeshOptions {
        width: options.mesh_width,
        min_width: options.min_mesh_width,
        image_width: text.width,
    };
    let meshes = make_meshes(&camera, &fit.best.params, &model, &set.lines, &mesh_opts)
        .expect("flat page yields a mesh");
    rp.compare_values(1.0, meshes.meshes.len() as f64, 0.0);
    rp.check(!meshes.used_fallback, "arc length is usable");
    let mesh = &meshes.meshes[0];
    let deviation = affine_deviation(mesh);
    eprintln!(
        "mesh {} x {}, affine deviation {:.3}",
        mesh.cols(),
        mesh.rows(),
        deviation
    );
    rp.compare_values(0.0, deviation, 3.0);

    // --- Engine ---
    let dewarper = Dewarper::new(CameraConfig::default(), options.clone());
    let out = dewarper
        .dewarp(&DewarpInput::new(&binary, &binary))
        .expect("dewarp");
    rp.compare_values(1.0, out.pages.len() as f64, 0.0);
    let page = &out.pages[0];
    eprintln!(
        "output {} x {}, fine = {}, boxes = {}",
        page.image.width(),
        page.image.height(),
        page.report.fine_applied,
        page.boxes.len()
    );
    rp.check(!page.report.identity, "page is corrected");
    let ratio = (page.image.width() as f64 * page.image.height() as f64)
        / (text.width as f64 * text.height as f64);
    rp.check(ratio > 0.5 && ratio < 2.0, "output area within 2x of the input");
    rp.write_pix_and_check(&page.image).expect("write output");

    assert!(rp.cleanup(), "dewarp_flat regression test failed");
}
