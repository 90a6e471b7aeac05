//! The geometry factor kernel: Jacobians, inverses and determinants.
//!
//! The kernel is purely functional: given gathered per-element nodal
//! coordinates and the reference gradient table of the coordinate basis, it
//! fills the three output arrays and touches nothing else. Elements are
//! independent, so the element loop is a rayon parallel-for over disjoint
//! output chunks.
//!
//! Determinants and inverses use closed-form cofactor expansion for the fixed
//! small dimensions 1, 2 and 3; there is no general factorization path. A
//! singular Jacobian produces non-finite inverse entries rather than an error.

use crate::tensor::Tensor;
use crate::Real;
use itertools::izip;
use rayon::prelude::*;

/// Computes `J`, `J^{-1}` and `det J` at every (quad point, element).
///
/// `coordinates` is (component, local dof, element); `gradients` is the
/// reference gradient table (axis, local dof, quad point). The Jacobian at a
/// point is the contraction
/// `J[i][j] = sum_dof coordinates[i, dof, e] * gradients[j, dof, k]`.
///
/// # Panics
///
/// Panics if the output shapes are not mutually consistent with the inputs.
pub fn compute_jacobians<T: Real>(
    coordinates: &Tensor<T, 3>,
    gradients: &Tensor<T, 3>,
    jacobians: &mut Tensor<T, 4>,
    inverse_jacobians: &mut Tensor<T, 4>,
    determinants: &mut Tensor<T, 2>,
) {
    let dim = coordinates.extent(0);
    let ndof = coordinates.extent(1);
    let num_elements = coordinates.extent(2);
    let nq = gradients.extent(2);

    assert_eq!(
        gradients.shape(),
        &[dim, ndof, nq],
        "Gradient table shape mismatch"
    );
    assert_eq!(
        jacobians.shape(),
        &[dim, dim, nq, num_elements],
        "Jacobian array shape mismatch"
    );
    assert_eq!(
        inverse_jacobians.shape(),
        &[dim, dim, nq, num_elements],
        "Inverse Jacobian array shape mismatch"
    );
    assert_eq!(
        determinants.shape(),
        &[nq, num_elements],
        "Determinant array shape mismatch"
    );

    let grad = gradients.as_slice();
    let jac_block = dim * dim * nq;

    jacobians
        .as_mut_slice()
        .par_chunks_mut(jac_block)
        .zip(inverse_jacobians.as_mut_slice().par_chunks_mut(jac_block))
        .zip(determinants.as_mut_slice().par_chunks_mut(nq))
        .zip(coordinates.as_slice().par_chunks(dim * ndof))
        .for_each(|(((jac_e, inv_e), det_e), coords_e)| {
            for k in 0..nq {
                let jac_k = &mut jac_e[k * dim * dim..(k + 1) * dim * dim];
                jac_k.fill(T::zero());
                let grad_k = &grad[k * dim * ndof..(k + 1) * dim * ndof];
                for (x, g) in izip!(coords_e.chunks_exact(dim), grad_k.chunks_exact(dim)) {
                    for col in 0..dim {
                        for row in 0..dim {
                            jac_k[row + dim * col] += x[row] * g[col];
                        }
                    }
                }
                let det = determinant(dim, jac_k);
                det_e[k] = det;
                invert(
                    dim,
                    jac_k,
                    det,
                    &mut inv_e[k * dim * dim..(k + 1) * dim * dim],
                );
            }
        });
}

/// The determinant of a column-major `dim x dim` matrix, `dim` in {1, 2, 3}.
///
/// # Panics
///
/// Panics if `dim` is not 1, 2 or 3 or the slice is too short.
pub fn determinant<T: Real>(dim: usize, m: &[T]) -> T {
    assert!(m.len() >= dim * dim, "Matrix slice too short");
    match dim {
        1 => m[0],
        2 => m[0] * m[3] - m[2] * m[1],
        3 => {
            m[0] * (m[4] * m[8] - m[7] * m[5]) - m[3] * (m[1] * m[8] - m[7] * m[2])
                + m[6] * (m[1] * m[5] - m[4] * m[2])
        }
        _ => panic!("closed-form determinants only exist for dimensions 1 to 3, got {}", dim),
    }
}

/// The inverse of a column-major `dim x dim` matrix via cofactor expansion,
/// given its precomputed determinant.
///
/// No degeneracy check is performed: a zero determinant yields non-finite
/// entries, which is the caller's responsibility to detect if needed.
///
/// # Panics
///
/// Panics if `dim` is not 1, 2 or 3 or a slice is too short.
pub fn invert<T: Real>(dim: usize, m: &[T], det: T, out: &mut [T]) {
    assert!(m.len() >= dim * dim, "Matrix slice too short");
    assert!(out.len() >= dim * dim, "Output slice too short");
    match dim {
        1 => {
            out[0] = T::one() / det;
        }
        2 => {
            out[0] = m[3] / det;
            out[1] = -m[1] / det;
            out[2] = -m[2] / det;
            out[3] = m[0] / det;
        }
        3 => {
            // Adjugate over determinant; column-major entry (r, c) is r + 3c
            out[0] = (m[4] * m[8] - m[7] * m[5]) / det;
            out[1] = -(m[1] * m[8] - m[7] * m[2]) / det;
            out[2] = (m[1] * m[5] - m[4] * m[2]) / det;
            out[3] = -(m[3] * m[8] - m[6] * m[5]) / det;
            out[4] = (m[0] * m[8] - m[6] * m[2]) / det;
            out[5] = -(m[0] * m[5] - m[3] * m[2]) / det;
            out[6] = (m[3] * m[7] - m[6] * m[4]) / det;
            out[7] = -(m[0] * m[7] - m[6] * m[1]) / det;
            out[8] = (m[0] * m[4] - m[3] * m[1]) / det;
        }
        _ => panic!("closed-form inverses only exist for dimensions 1 to 3, got {}", dim),
    }
}
