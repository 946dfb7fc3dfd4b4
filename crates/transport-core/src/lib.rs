//! Even-parity discontinuous-Galerkin SN transport.
//!
//! Geometry and basis: mesh, finite_element, angular
//! Problem data: materials, indexer, parallel, discretization
//! Operators: assembler, nda
//! Iteration: convergence, iteration, balance, solver

pub mod angular;
pub mod assembler;
pub mod balance;
pub mod convergence;
pub mod discretization;
pub mod finite_element;
pub mod indexer;
pub mod iteration;
pub mod materials;
pub mod mesh;
pub mod nda;
pub mod parallel;
pub mod solver;

pub use solver::{TransportOutcome, TransportSolver};
