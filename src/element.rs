//! Reference finite elements and basis function evaluation.
//!
//! Two element families are supported. The *tensor-product* family
//! (segments, quadrilaterals, hexahedra) uses arbitrary-order Lagrange bases
//! on equispaced 1D nodes over the reference domain $[-1, 1]^d$, with
//! lexicographic dof ordering (first axis fastest) so that every basis
//! function factors exactly into a product of 1D basis functions. The
//! *simplex* family (triangles, tetrahedra) uses closed-form linear bases on
//! the unit simplex.
//!
//! Basis evaluation here is only performed while building dof-to-quadrature
//! tables; hot loops never re-evaluate bases.

use crate::Real;
use eyre::bail;
use numeric_literals::replace_float_literals;
use serde::{Deserialize, Serialize};

/// The reference element families distinguished by the operator kernels.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementFamily {
    /// Elements whose basis factors into a product of 1D bases along each axis.
    TensorProduct,
    Simplex,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    Segment,
    Quadrilateral,
    Hexahedron,
    Triangle,
    Tetrahedron,
}

impl ElementType {
    pub fn dim(&self) -> usize {
        match self {
            ElementType::Segment => 1,
            ElementType::Quadrilateral | ElementType::Triangle => 2,
            ElementType::Hexahedron | ElementType::Tetrahedron => 3,
        }
    }

    pub fn family(&self) -> ElementFamily {
        match self {
            ElementType::Segment | ElementType::Quadrilateral | ElementType::Hexahedron => {
                ElementFamily::TensorProduct
            }
            ElementType::Triangle | ElementType::Tetrahedron => ElementFamily::Simplex,
        }
    }
}

/// A reference finite element: an element type together with a polynomial order.
///
/// The element is a pure description; all state needed for evaluation is the
/// `(type, order)` pair, so the type is `Copy` and usable as a cache key.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FiniteElement {
    element_type: ElementType,
    order: usize,
}

impl FiniteElement {
    /// Creates a reference element of the given type and polynomial order.
    ///
    /// Tensor-product elements support any order `>= 1`; the simplex family
    /// currently only provides linear bases.
    pub fn new(element_type: ElementType, order: usize) -> eyre::Result<Self> {
        if order == 0 {
            bail!("element order must be at least 1");
        }
        if element_type.family() == ElementFamily::Simplex && order != 1 {
            bail!(
                "only linear bases are available for simplex elements, requested order {}",
                order
            );
        }
        Ok(Self {
            element_type,
            order,
        })
    }

    pub fn element_type(&self) -> ElementType {
        self.element_type
    }

    pub fn family(&self) -> ElementFamily {
        self.element_type.family()
    }

    pub fn order(&self) -> usize {
        self.order
    }

    pub fn dim(&self) -> usize {
        self.element_type.dim()
    }

    /// The number of local degrees of freedom.
    pub fn num_dofs(&self) -> usize {
        match self.family() {
            ElementFamily::TensorProduct => (self.order + 1).pow(self.dim() as u32),
            ElementFamily::Simplex => self.dim() + 1,
        }
    }

    /// The number of 1D degrees of freedom along each axis.
    ///
    /// # Panics
    ///
    /// Panics if the element is not of the tensor-product family.
    pub fn num_dofs_1d(&self) -> usize {
        assert_eq!(
            self.family(),
            ElementFamily::TensorProduct,
            "1D dof counts only exist for tensor-product elements"
        );
        self.order + 1
    }

    /// Evaluates every basis function at the given reference point.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not hold exactly `num_dofs` entries or `xi`
    /// does not hold exactly `dim` coordinates.
    pub fn populate_basis<T: Real>(&self, values: &mut [T], xi: &[T]) {
        assert_eq!(values.len(), self.num_dofs(), "Basis buffer length mismatch");
        assert_eq!(xi.len(), self.dim(), "Reference point dimension mismatch");
        match self.element_type {
            ElementType::Segment | ElementType::Quadrilateral | ElementType::Hexahedron => {
                self.populate_tensor_basis(values, xi)
            }
            ElementType::Triangle => populate_triangle_basis(values, xi),
            ElementType::Tetrahedron => populate_tetrahedron_basis(values, xi),
        }
    }

    /// Evaluates the reference gradient of every basis function at the given
    /// reference point.
    ///
    /// Gradients are stored column-major as `(derivative axis, local dof)`,
    /// i.e. `gradients[i + dim * j]` holds $\partial_i \phi_j$.
    pub fn populate_basis_gradients<T: Real>(&self, gradients: &mut [T], xi: &[T]) {
        let dim = self.dim();
        assert_eq!(
            gradients.len(),
            dim * self.num_dofs(),
            "Gradient buffer length mismatch"
        );
        assert_eq!(xi.len(), dim, "Reference point dimension mismatch");
        match self.element_type {
            ElementType::Segment | ElementType::Quadrilateral | ElementType::Hexahedron => {
                self.populate_tensor_basis_gradients(gradients, xi)
            }
            ElementType::Triangle => populate_triangle_gradients(gradients),
            ElementType::Tetrahedron => populate_tetrahedron_gradients(gradients),
        }
    }

    /// Evaluates the 1D Lagrange basis along one axis of a tensor-product element.
    ///
    /// # Panics
    ///
    /// Panics if the element is not of the tensor-product family.
    pub fn populate_basis_1d<T: Real>(&self, values: &mut [T], x: T) {
        assert_eq!(values.len(), self.num_dofs_1d(), "Basis buffer length mismatch");
        lagrange_values_1d(self.order, x, values);
    }

    /// Evaluates the 1D Lagrange basis derivatives along one axis of a
    /// tensor-product element.
    pub fn populate_basis_gradients_1d<T: Real>(&self, derivatives: &mut [T], x: T) {
        assert_eq!(
            derivatives.len(),
            self.num_dofs_1d(),
            "Derivative buffer length mismatch"
        );
        lagrange_derivatives_1d(self.order, x, derivatives);
    }

    fn populate_tensor_basis<T: Real>(&self, values: &mut [T], xi: &[T]) {
        let dim = self.dim();
        let d1 = self.order + 1;
        let mut axis_values = vec![T::zero(); dim * d1];
        for (axis, chunk) in axis_values.chunks_exact_mut(d1).enumerate() {
            lagrange_values_1d(self.order, xi[axis], chunk);
        }
        for (j, value) in values.iter_mut().enumerate() {
            let mut v = T::one();
            let mut rest = j;
            for axis in 0..dim {
                let j_axis = rest % d1;
                rest /= d1;
                v *= axis_values[axis * d1 + j_axis];
            }
            *value = v;
        }
    }

    fn populate_tensor_basis_gradients<T: Real>(&self, gradients: &mut [T], xi: &[T]) {
        let dim = self.dim();
        let d1 = self.order + 1;
        let mut axis_values = vec![T::zero(); dim * d1];
        let mut axis_derivatives = vec![T::zero(); dim * d1];
        for axis in 0..dim {
            lagrange_values_1d(self.order, xi[axis], &mut axis_values[axis * d1..(axis + 1) * d1]);
            lagrange_derivatives_1d(
                self.order,
                xi[axis],
                &mut axis_derivatives[axis * d1..(axis + 1) * d1],
            );
        }
        for j in 0..self.num_dofs() {
            for i in 0..dim {
                let mut g = T::one();
                let mut rest = j;
                for axis in 0..dim {
                    let j_axis = rest % d1;
                    rest /= d1;
                    let table = if axis == i {
                        &axis_derivatives
                    } else {
                        &axis_values
                    };
                    g *= table[axis * d1 + j_axis];
                }
                gradients[i + dim * j] = g;
            }
        }
    }
}

/// The equispaced 1D Lagrange node $x_m = -1 + 2m/p$.
fn lagrange_node<T: Real>(order: usize, m: usize) -> T {
    T::from_f64(-1.0 + 2.0 * m as f64 / order as f64).expect("Node coordinate must fit in T")
}

fn lagrange_values_1d<T: Real>(order: usize, x: T, values: &mut [T]) {
    for (j, value) in values.iter_mut().enumerate() {
        let x_j = lagrange_node::<T>(order, j);
        let mut v = T::one();
        for m in 0..=order {
            if m != j {
                let x_m = lagrange_node::<T>(order, m);
                v *= (x - x_m) / (x_j - x_m);
            }
        }
        *value = v;
    }
}

fn lagrange_derivatives_1d<T: Real>(order: usize, x: T, derivatives: &mut [T]) {
    for (j, derivative) in derivatives.iter_mut().enumerate() {
        let x_j = lagrange_node::<T>(order, j);
        let mut sum = T::zero();
        for n in 0..=order {
            if n == j {
                continue;
            }
            let x_n = lagrange_node::<T>(order, n);
            let mut product = T::one();
            for m in 0..=order {
                if m != j && m != n {
                    let x_m = lagrange_node::<T>(order, m);
                    product *= (x - x_m) / (x_j - x_m);
                }
            }
            sum += product / (x_j - x_n);
        }
        *derivative = sum;
    }
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn populate_triangle_basis<T: Real>(values: &mut [T], xi: &[T]) {
    let (x, y) = (xi[0], xi[1]);
    values[0] = 1.0 - x - y;
    values[1] = x;
    values[2] = y;
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn populate_triangle_gradients<T: Real>(gradients: &mut [T]) {
    // Columns are the (constant) gradients of [1 - x - y, x, y]
    gradients.copy_from_slice(&[-1.0, -1.0, 1.0, 0.0, 0.0, 1.0]);
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn populate_tetrahedron_basis<T: Real>(values: &mut [T], xi: &[T]) {
    let (x, y, z) = (xi[0], xi[1], xi[2]);
    values[0] = 1.0 - x - y - z;
    values[1] = x;
    values[2] = y;
    values[3] = z;
}

#[replace_float_literals(T::from_f64(literal).expect("Literal must fit in T"))]
fn populate_tetrahedron_gradients<T: Real>(gradients: &mut [T]) {
    gradients.copy_from_slice(&[
        -1.0, -1.0, -1.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0,
    ]);
}
