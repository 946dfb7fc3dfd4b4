// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Full solid angle (sr).
pub const FOUR_PI: f64 = 4.0 * std::f64::consts::PI;

/// Vector-difference tolerance for matching a reflected direction
/// against the quadrature set.
pub const MIRROR_TOLERANCE: f64 = 1.0e-13;

/// Cross-section magnitudes below this are skipped when building
/// scattering and fission sources.
pub const XS_SPARSITY_FLOOR: f64 = 1.0e-13;

/// Lower bound of the interior-penalty coefficient.
pub const MIN_PENALTY: f64 = 0.25;

/// Default relative L1 flux tolerance of the inner (source) iteration.
pub const DEFAULT_INNER_TOLERANCE: f64 = 1.0e-7;

/// Default relative tolerance on k between generations.
pub const DEFAULT_K_TOLERANCE: f64 = 1.0e-6;

/// Default relative L1 flux tolerance between generations.
pub const DEFAULT_OUTER_FLUX_TOLERANCE: f64 = 1.0e-6;

/// Default cap on source iterations per inner solve.
pub const DEFAULT_MAX_INNER_ITERATIONS: usize = 500;

/// Default cap on power-iteration generations.
pub const DEFAULT_MAX_OUTER_ITERATIONS: usize = 200;

/// Largest supported polynomial degree of the DG basis.
pub const MAX_POLYNOMIAL_DEGREE: usize = 4;

/// Number of boundary orientations of a 3-D box (−x, +x, −y, +y, −z, +z).
pub const MAX_BOUNDARIES: usize = 6;
