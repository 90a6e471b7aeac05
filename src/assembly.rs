//! Matrix-free operator assembly and application.
//!
//! An [`Equation`](operators::Equation) describes a bilinear form pointwise:
//! given the Jacobian, quadrature weight and point it produces the
//! per-quadrature-point coefficient (a scalar, vector or matrix depending on
//! the operator kind). [`QuadTensorFunc`](domain::QuadTensorFunc) drives the
//! equation over every (quadrature point, element) pair into a dense
//! coefficient tensor, and a [`DomainKernel`](domain::DomainKernel) contracts
//! that tensor against basis-to-quadrature maps to apply the operator to
//! global vectors without forming a matrix.

pub mod domain;
pub mod operators;

pub use domain::{CoefficientTensor, DomainKernel, KernelStrategy, QuadTensorFunc};
pub use operators::{
    AdvectionEquation, CoefficientRank, DiffusionEquation, Equation, MassEquation,
};
