// ─────────────────────────────────────────────────────────────────────
// SCPN Transport — Math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Numerical primitives for SCPN transport: CSR matrices, Krylov solvers,
//! preconditioners and Gauss-Legendre quadrature.

pub mod gauss;
pub mod gmres;
pub mod krylov;
pub mod linalg;
pub mod precond;
pub mod sparse;
