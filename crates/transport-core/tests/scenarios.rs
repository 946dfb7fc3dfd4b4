// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — End-to-End Scenarios
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Full runs through `TransportSolver` on the demo inputs and small
//! hand-built problems with known answers.

use std::path::PathBuf;

use approx::assert_relative_eq;
use transport_core::convergence::phi_difference;
use transport_core::TransportSolver;
use transport_types::config::{NonSymmetricMethod, ProblemConfig};
use transport_types::error::TransportError;

fn demo(name: &str) -> ProblemConfig {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("../../demos")
        .join(name);
    ProblemConfig::from_file(path.to_str().unwrap()).unwrap()
}

/// k∞ = Σ_g χ_g νσf_g / (σt,g − σs,gg) of the two-group demo.
const K_INF: f64 = 0.4 * 0.8 / 0.3 + 0.6 * 0.2 / 0.5;

// ── Fixed source ─────────────────────────────────────────────────────

#[test]
fn test_thick_square_interior_reaches_q_over_sigma_a() {
    let solver = TransportSolver::new(demo("square_fixed_source.json")).unwrap();
    let outcome = solver.run().unwrap();
    assert!(
        outcome.inner_iterations < 60,
        "took {} source iterations",
        outcome.inner_iterations
    );

    let avg = solver.cell_averages(&outcome);
    // Q/σa = 1/5
    for cell in [44, 45, 54, 55] {
        let rel = (avg[0][cell] - 0.2).abs() / 0.2;
        assert!(rel < 0.05, "cell {cell}: {} ({:.2}% off)", avg[0][cell], 100.0 * rel);
    }
    // Corner cells leak
    assert!(avg[0][0] < avg[0][55]);
    assert!(
        outcome.balance.residual < 1e-5,
        "balance residual {:.3e}",
        outcome.balance.residual
    );
    assert!(outcome.balance.total_leakage() > 0.0);
}

#[test]
fn test_reflected_slab_is_infinite_medium() {
    let json = r#"{
        "name": "reflected-slab", "dimension": 1, "sn_order": 8, "n_groups": 1,
        "problem": "fixed-source",
        "geometry": { "extents": [3.0], "cells": [6] },
        "reflective_boundaries": [0, 1],
        "materials": [ { "id": 0, "sigma_t": [1.0], "sigma_s": [[0.5]], "source": [1.0] } ]
    }"#;
    let cfg: ProblemConfig = serde_json::from_str(json).unwrap();
    let solver = TransportSolver::new(cfg).unwrap();
    let outcome = solver.run().unwrap();
    for (cell, v) in solver.cell_averages(&outcome)[0].iter().enumerate() {
        assert!((v - 2.0).abs() < 1e-4, "cell {cell}: {v}");
    }
    assert_eq!(outcome.balance.leakage, vec![0.0]);
}

#[test]
fn test_nda_matches_unaccelerated_square() {
    let json = |nda: bool| {
        format!(
            r#"{{
            "name": "nda-square", "dimension": 2, "sn_order": 4, "n_groups": 1,
            "problem": "fixed-source", "nda": {nda},
            "geometry": {{ "extents": [4.0, 4.0], "cells": [8, 8] }},
            "materials": [ {{ "id": 0, "sigma_t": [1.0], "sigma_s": [[0.8]], "source": [1.0] }} ]
        }}"#
        )
    };
    let plain: ProblemConfig = serde_json::from_str(&json(false)).unwrap();
    let accelerated: ProblemConfig = serde_json::from_str(&json(true)).unwrap();
    let a = TransportSolver::new(plain).unwrap().run().unwrap();
    let b = TransportSolver::new(accelerated).unwrap().run().unwrap();
    let diff = phi_difference(&b.scalar_flux, &a.scalar_flux).unwrap();
    assert!(diff < 1e-4, "NDA flux differs by {diff:.3e}");
    assert!(
        b.inner_iterations < a.inner_iterations,
        "NDA {} vs plain {} iterations",
        b.inner_iterations,
        a.inner_iterations
    );
}

#[test]
fn test_half_slab_nda_demo() {
    let solver = TransportSolver::new(demo("slab_reflected_nda.json")).unwrap();
    let outcome = solver.run().unwrap();
    let avg = &solver.cell_averages(&outcome)[0];
    assert!(avg.iter().all(|&v| v > 0.0));
    // Peak at the reflective face, falling towards vacuum
    assert!(avg[0] > avg[20] && avg[20] > avg[39], "{} {} {}", avg[0], avg[20], avg[39]);
    assert!(avg[0] < 1.0 / 0.05);
}

#[test]
fn test_half_slab_nda_matches_unaccelerated() {
    let mut plain = demo("slab_reflected_nda.json");
    plain.nda = false;
    plain.iteration.max_inner_iterations = 2000;
    let a = TransportSolver::new(plain).unwrap().run().unwrap();
    let b = TransportSolver::new(demo("slab_reflected_nda.json"))
        .unwrap()
        .run()
        .unwrap();
    let diff = phi_difference(&b.scalar_flux, &a.scalar_flux).unwrap();
    assert!(diff < 1e-4, "NDA flux differs by {diff:.3e}");
    assert!(
        b.inner_iterations < a.inner_iterations,
        "NDA {} vs plain {} iterations",
        b.inner_iterations,
        a.inner_iterations
    );
}

// ── Reflection against mirrored domains ──────────────────────────────

/// Square cells of side 0.25 over `[0, nx/4] × [0, ny/4]`, σt = 1 and
/// c = 0.5, with a unit source in the cells `source` selects.
fn patch_problem(
    nx: usize,
    ny: usize,
    reflective: &[usize],
    explicit: bool,
    source: impl Fn(usize, usize) -> bool,
) -> ProblemConfig {
    let ids: Vec<usize> = (0..ny)
        .flat_map(|j| (0..nx).map(move |i| (i, j)))
        .map(|(i, j)| usize::from(source(i, j)))
        .collect();
    let json = format!(
        r#"{{
        "name": "patch", "dimension": 2, "sn_order": 4, "n_groups": 1,
        "problem": "fixed-source",
        "geometry": {{ "extents": [{}, {}], "cells": [{nx}, {ny}], "material_ids": {ids:?} }},
        "reflective_boundaries": {reflective:?},
        "explicit_reflection": {explicit},
        "linear_solver": {{ "nonsymmetric": "gmres" }},
        "materials": [
            {{ "id": 0, "sigma_t": [1.0], "sigma_s": [[0.5]], "source": [0.0] }},
            {{ "id": 1, "sigma_t": [1.0], "sigma_s": [[0.5]], "source": [1.0] }}
        ]
    }}"#,
        nx as f64 * 0.25,
        ny as f64 * 0.25,
    );
    serde_json::from_str(&json).unwrap()
}

/// Cell averages of the `[0, 2]²` half domain reflected at x = 0, and
/// of the matching cells of the `[0, 4] × [0, 2]` vacuum domain with the
/// source mirrored across x = 2. The source sits next to the mirror and
/// away from the y centre line.
fn half_and_mirrored(explicit: bool) -> (Vec<f64>, Vec<f64>) {
    const N: usize = 8;
    let near_mirror = |i: usize, j: usize| i < 2 && j < 2;
    let half = TransportSolver::new(patch_problem(N, N, &[0], explicit, near_mirror)).unwrap();
    let full = TransportSolver::new(patch_problem(2 * N, N, &[], explicit, |i, j| {
        near_mirror(if i < N { N - 1 - i } else { i - N }, j)
    }))
    .unwrap();

    let half_avg = solver_averages(&half);
    let full_avg = solver_averages(&full);
    let matching = (0..N)
        .flat_map(|j| (0..N).map(move |i| (2 * N) * j + N + i))
        .map(|cell| full_avg[cell])
        .collect();
    (half_avg, matching)
}

fn solver_averages(solver: &TransportSolver) -> Vec<f64> {
    let outcome = solver.run().unwrap();
    solver.cell_averages(&outcome).swap_remove(0)
}

fn max_relative_gap(a: &[f64], b: &[f64]) -> f64 {
    let scale = b.iter().fold(0.0_f64, |m, v| m.max(*v));
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0_f64, f64::max)
        / scale
}

#[test]
fn test_implicit_reflection_matches_mirrored_domain() {
    let (half, mirrored) = half_and_mirrored(false);
    // The source corner must dominate, or the check says little
    assert!(half[0] > 2.0 * half[7 * 8 + 7], "{} vs {}", half[0], half[63]);
    assert!(half[0] > half[7 * 8], "flux must fall away from the source in y");
    let gap = max_relative_gap(&half, &mirrored);
    assert!(gap < 1e-4, "half domain differs from mirrored run by {gap:.3e}");
}

#[test]
fn test_explicit_reflection_tracks_mirrored_domain() {
    let (half, mirrored) = half_and_mirrored(true);
    let gap = max_relative_gap(&half, &mirrored);
    assert!(gap < 5e-2, "half domain differs from mirrored run by {gap:.3e}");
}

#[test]
fn test_explicit_reflection_iterations_hold_under_refinement() {
    // Same [0, 2]² domain with halved and quartered cells
    let iterations = |n: usize| {
        let mut cfg = patch_problem(n, n, &[0], true, |_, _| true);
        cfg.geometry.extents = vec![2.0, 2.0];
        let outcome = TransportSolver::new(cfg).unwrap().run().unwrap();
        assert!(outcome.balance.residual < 1e-5, "residual {}", outcome.balance.residual);
        outcome.inner_iterations
    };
    let coarse = iterations(8);
    let fine = iterations(32);
    assert!(
        fine <= 2 * coarse,
        "32x32 took {fine} source iterations, 8x8 took {coarse}"
    );
}

// ── Eigenvalue ───────────────────────────────────────────────────────

#[test]
fn test_two_group_infinite_medium_k() {
    let solver = TransportSolver::new(demo("two_group_infinite.json")).unwrap();
    let outcome = solver.run().unwrap();
    let k = outcome.k_eff.unwrap();
    assert_relative_eq!(k, K_INF, epsilon = 1e-4);
    assert!(outcome.outer_iterations >= 2);
    assert!(outcome.balance.total_leakage() == 0.0);
}

#[test]
fn test_two_group_implicit_reflection_gmres() {
    let mut cfg = demo("two_group_infinite.json");
    cfg.explicit_reflection = false;
    cfg.linear_solver.nonsymmetric = NonSymmetricMethod::Gmres;
    let solver = TransportSolver::new(cfg).unwrap();
    assert!(solver.controller().operators().coupled);
    let k = solver.run().unwrap().k_eff.unwrap();
    assert!((k - K_INF).abs() < 1e-4, "k = {k}, expected {K_INF}");
}

#[test]
fn test_outer_cap_is_a_failure() {
    let mut cfg = demo("two_group_infinite.json");
    cfg.iteration.max_outer_iterations = 1;
    let err = TransportSolver::new(cfg).unwrap().run().unwrap_err();
    assert!(matches!(err, TransportError::SolverFailure { .. }), "got {err:?}");
}

// ── Configuration errors ─────────────────────────────────────────────

#[test]
fn test_odd_sn_order_is_config_error() {
    let mut cfg = demo("square_fixed_source.json");
    cfg.sn_order = 3;
    cfg.geometry.extents = vec![-1.0];
    cfg.materials.clear();
    match TransportSolver::new(cfg) {
        Err(TransportError::Config(msg)) => assert!(msg.contains("SN order"), "got: {msg}"),
        Err(other) => panic!("expected Config error, got {other:?}"),
        Ok(_) => panic!("odd SN order accepted"),
    }
}

#[test]
fn test_eigenvalue_without_fissile_material() {
    let mut cfg = demo("two_group_infinite.json");
    cfg.fissile_materials.clear();
    cfg.materials[0].nu_sigma_f.clear();
    cfg.materials[0].chi.clear();
    assert!(matches!(
        TransportSolver::new(cfg),
        Err(TransportError::Config(_))
    ));
}
