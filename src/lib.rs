//! Matrix-free (partial assembly) operator evaluation for finite element computations.
//!
//! The crate evaluates the action of discretized operators — mass, diffusion,
//! advection — without ever forming a global sparse matrix. For a fixed
//! (finite element space, integration rule, mesh) triple it gathers per-element
//! nodal coordinates, computes Jacobians, inverse Jacobians and determinants at
//! every quadrature point ([`geometry`]), combines them with quadrature weights
//! into per-quadrature-point coefficient tensors and contracts those against
//! basis-to-quadrature interpolation maps to realize matrix-vector products
//! ([`assembly`]).
//!
//! Bulk per-element data lives in dense, contiguous, column-major containers
//! ([`tensor`]); geometric factors are cached per mesh state and recomputed
//! wholesale whenever the mesh reports a new modification sequence.

use nalgebra::RealField;

pub mod assembly;
pub mod dofquad;
pub mod element;
pub mod geometry;
pub mod mesh;
pub mod procedural;
pub mod quadrature;
pub mod reorder;
pub mod space;
pub mod tensor;

pub extern crate nalgebra;

/// Trait alias for scalar types usable in numerical computations.
///
/// The `Send + Sync` requirement lets element-parallel kernels share slices
/// across threads.
pub trait Real: RealField + Copy + Send + Sync {}

impl<T> Real for T where T: RealField + Copy + Send + Sync {}
