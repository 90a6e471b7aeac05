//! In-place reordering between blocked and interleaved nodal layouts.
//!
//! A vector-valued nodal buffer of `num_dofs * vdim` entries can be stored
//! *by nodes* (blocked: `data[d + v * num_dofs]`) or *by vdim* (interleaved:
//! `data[v + d * vdim]`). The two permutations here are exact inverses of each
//! other: applying one and then the other restores the original byte sequence.
//!
//! Both run in O(`num_dofs * vdim`) time and space via a scratch buffer owned
//! by the call; they are invoked around geometry gathers on cache miss only,
//! so the cost is proportional to total dof count rather than element count.

use crate::mesh::{GridFunction, NodeOrdering};
use crate::Real;
use nalgebra::Scalar;

/// Permutes a blocked (by-node) buffer into interleaved (by-vdim) layout.
///
/// # Panics
///
/// Panics if the buffer length is not `num_dofs * vdim`.
pub fn to_by_vdim<T: Scalar>(data: &mut [T], num_dofs: usize, vdim: usize) {
    assert_eq!(
        data.len(),
        num_dofs * vdim,
        "Buffer length must equal num_dofs * vdim"
    );
    let mut scratch = Vec::with_capacity(data.len());
    for d in 0..num_dofs {
        for v in 0..vdim {
            scratch.push(data[d + v * num_dofs].clone());
        }
    }
    data.clone_from_slice(&scratch);
}

/// Permutes an interleaved (by-vdim) buffer into blocked (by-node) layout.
///
/// # Panics
///
/// Panics if the buffer length is not `num_dofs * vdim`.
pub fn to_by_nodes<T: Scalar>(data: &mut [T], num_dofs: usize, vdim: usize) {
    assert_eq!(
        data.len(),
        num_dofs * vdim,
        "Buffer length must equal num_dofs * vdim"
    );
    let mut scratch = vec![data[0].clone(); data.len()];
    let mut source = 0;
    for d in 0..num_dofs {
        for v in 0..vdim {
            scratch[d + v * num_dofs] = data[source].clone();
            source += 1;
        }
    }
    data.clone_from_slice(&scratch);
}

/// Converts a grid function to interleaved layout, updating its ordering flag.
///
/// A grid function that is already interleaved is left untouched.
pub fn grid_function_to_by_vdim<T: Real>(gf: &mut GridFunction<T>) {
    if gf.ordering() == NodeOrdering::ByNodes {
        let (num_dofs, vdim) = (gf.num_dofs(), gf.vdim());
        to_by_vdim(gf.data_mut(), num_dofs, vdim);
        gf.set_ordering(NodeOrdering::ByVdim);
    }
}

/// Converts a grid function to blocked layout, updating its ordering flag.
///
/// A grid function that is already blocked is left untouched.
pub fn grid_function_to_by_nodes<T: Real>(gf: &mut GridFunction<T>) {
    if gf.ordering() == NodeOrdering::ByVdim {
        let (num_dofs, vdim) = (gf.num_dofs(), gf.vdim());
        to_by_nodes(gf.data_mut(), num_dofs, vdim);
        gf.set_ordering(NodeOrdering::ByNodes);
    }
}
