//! Procedural generation of simple structured meshes.
//!
//! These constructors exist for tests, benchmarks and examples; real
//! applications are expected to supply their own connectivity. Tensor-product
//! grids place global dofs on a Cartesian lattice over `[0, 1]^d` with the
//! first axis varying fastest, so element dof orderings agree with the
//! lexicographic reference ordering of the tensor-product elements.

use crate::element::{ElementType, FiniteElement};
use crate::mesh::Mesh;
use crate::Real;
use eyre::bail;

/// A single element whose nodal coordinates coincide with its reference nodes.
///
/// The reference-to-physical map of such an element is the identity, which
/// makes it the canonical fixture for Jacobian tests.
pub fn reference_element<T: Real>(element_type: ElementType) -> Mesh<T> {
    let f = |x: f64| T::from_f64(x).expect("Literal must fit in T");
    let (vertices, num_local): (Vec<T>, usize) = match element_type {
        ElementType::Segment => (vec![f(-1.0), f(1.0)], 2),
        ElementType::Quadrilateral => (
            [[-1.0, -1.0], [1.0, -1.0], [-1.0, 1.0], [1.0, 1.0]]
                .iter()
                .flatten()
                .map(|&x| f(x))
                .collect(),
            4,
        ),
        ElementType::Hexahedron => {
            let mut vertices = Vec::with_capacity(24);
            for k in 0..8 {
                let signs = [k & 1, (k >> 1) & 1, (k >> 2) & 1];
                for s in signs {
                    vertices.push(f(if s == 0 { -1.0 } else { 1.0 }));
                }
            }
            (vertices, 8)
        }
        ElementType::Triangle => (
            [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
                .iter()
                .flatten()
                .map(|&x| f(x))
                .collect(),
            3,
        ),
        ElementType::Tetrahedron => (
            [
                [0.0, 0.0, 0.0],
                [1.0, 0.0, 0.0],
                [0.0, 1.0, 0.0],
                [0.0, 0.0, 1.0],
            ]
            .iter()
            .flatten()
            .map(|&x| f(x))
            .collect(),
            4,
        ),
    };
    Mesh::from_raw_parts(element_type, vertices, num_local, (0..num_local).collect())
        .expect("Reference element connectivity is always valid")
}

/// A uniform segment mesh of `cells` elements of the given order on `[0, 1]`.
pub fn unit_interval_segments<T: Real>(cells: usize, order: usize) -> eyre::Result<Mesh<T>> {
    tensor_product_grid(ElementType::Segment, &[cells], order)
}

/// A uniform quadrilateral mesh of `cells_x * cells_y` elements of the given
/// order on the unit square.
pub fn unit_square_quadrilaterals<T: Real>(
    cells_x: usize,
    cells_y: usize,
    order: usize,
) -> eyre::Result<Mesh<T>> {
    tensor_product_grid(ElementType::Quadrilateral, &[cells_x, cells_y], order)
}

/// A uniform hexahedral mesh of the given order on the unit cube.
pub fn unit_cube_hexahedra<T: Real>(
    cells_x: usize,
    cells_y: usize,
    cells_z: usize,
    order: usize,
) -> eyre::Result<Mesh<T>> {
    tensor_product_grid(ElementType::Hexahedron, &[cells_x, cells_y, cells_z], order)
}

/// A triangle mesh on the unit square: each grid cell is split into two
/// linear triangles.
pub fn unit_square_triangles<T: Real>(cells_x: usize, cells_y: usize) -> eyre::Result<Mesh<T>> {
    if cells_x == 0 || cells_y == 0 {
        bail!("triangle meshes require at least one cell per axis");
    }
    let f = |x: f64| T::from_f64(x).expect("Coordinate must fit in T");
    let (nx, ny) = (cells_x + 1, cells_y + 1);
    let mut vertices = Vec::with_capacity(2 * nx * ny);
    for gy in 0..ny {
        for gx in 0..nx {
            vertices.push(f(gx as f64 / cells_x as f64));
            vertices.push(f(gy as f64 / cells_y as f64));
        }
    }
    let node = |gx: usize, gy: usize| gx + nx * gy;
    let mut element_dofs = Vec::with_capacity(6 * cells_x * cells_y);
    for cy in 0..cells_y {
        for cx in 0..cells_x {
            let (bl, br) = (node(cx, cy), node(cx + 1, cy));
            let (tl, tr) = (node(cx, cy + 1), node(cx + 1, cy + 1));
            element_dofs.extend_from_slice(&[bl, br, tl]);
            element_dofs.extend_from_slice(&[br, tr, tl]);
        }
    }
    Mesh::from_raw_parts(ElementType::Triangle, vertices, 3, element_dofs)
}

fn tensor_product_grid<T: Real>(
    element_type: ElementType,
    cells: &[usize],
    order: usize,
) -> eyre::Result<Mesh<T>> {
    let dim = element_type.dim();
    debug_assert_eq!(cells.len(), dim);
    if cells.iter().any(|&c| c == 0) {
        bail!("tensor-product grids require at least one cell per axis");
    }
    // Validates the (type, order) pair
    let fe = FiniteElement::new(element_type, order)?;

    // Global dofs live on a lattice of cells[a] * order + 1 points per axis
    let lattice: Vec<usize> = cells.iter().map(|&c| c * order + 1).collect();
    let num_nodes: usize = lattice.iter().product();
    let f = |x: f64| T::from_f64(x).expect("Coordinate must fit in T");

    let mut vertices = Vec::with_capacity(dim * num_nodes);
    for g in 0..num_nodes {
        let mut rest = g;
        for a in 0..dim {
            let g_axis = rest % lattice[a];
            rest /= lattice[a];
            vertices.push(f(g_axis as f64 / (cells[a] * order) as f64));
        }
    }

    let d1 = order + 1;
    let dofs_per_element = fe.num_dofs();
    let num_elements: usize = cells.iter().product();
    let mut element_dofs = Vec::with_capacity(dofs_per_element * num_elements);
    for c in 0..num_elements {
        let mut cell = [0usize; 3];
        let mut rest = c;
        for a in 0..dim {
            cell[a] = rest % cells[a];
            rest /= cells[a];
        }
        for j in 0..dofs_per_element {
            let mut local = [0usize; 3];
            let mut rest = j;
            for a in 0..dim {
                local[a] = rest % d1;
                rest /= d1;
            }
            let mut global = 0;
            let mut stride = 1;
            for a in 0..dim {
                global += (cell[a] * order + local[a]) * stride;
                stride *= lattice[a];
            }
            element_dofs.push(global);
        }
    }
    Mesh::from_raw_parts(element_type, vertices, dofs_per_element, element_dofs)
}
