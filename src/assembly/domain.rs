//! Coefficient tensor evaluation and matrix-free operator application.

use crate::assembly::operators::{CoefficientRank, Equation};
use crate::dofquad::{DofQuadCache, DofQuadMap};
use crate::geometry::{GeometricFactors, GeometryCache};
use crate::quadrature::IntegrationRule;
use crate::space::FeSpace;
use crate::tensor::Tensor;
use crate::Real;
use davenport::{define_thread_local_workspace, with_thread_local_workspace};
use eyre::bail;
use rayon::prelude::*;
use std::sync::Arc;

/// The precomputed per-quadrature-point coefficients of an operator.
///
/// The variant follows the equation's [`CoefficientRank`]; the element index
/// is always the slowest axis, so per-element blocks are contiguous.
#[derive(Debug, Clone)]
pub enum CoefficientTensor<T: Real> {
    /// (quad point, element)
    Scalar(Tensor<T, 2>),
    /// (component, quad point, element)
    Vector(Tensor<T, 3>),
    /// (row, col, quad point, element)
    Matrix(Tensor<T, 4>),
}

impl<T: Real> CoefficientTensor<T> {
    pub fn rank(&self) -> CoefficientRank {
        match self {
            CoefficientTensor::Scalar(_) => CoefficientRank::Scalar,
            CoefficientTensor::Vector(_) => CoefficientRank::Vector,
            CoefficientTensor::Matrix(_) => CoefficientRank::Matrix,
        }
    }
}

/// Drives an equation over every quadrature point of every element, producing
/// the dense coefficient tensor the domain kernel contracts against.
pub struct QuadTensorFunc<'a, T: Real, E: ?Sized> {
    equation: &'a E,
    factors: &'a GeometricFactors<T>,
    rule: &'a IntegrationRule<T>,
}

impl<'a, T: Real, E: Equation<T> + ?Sized> QuadTensorFunc<'a, T, E> {
    /// # Panics
    ///
    /// Panics if the factors were computed for a different quadrature point
    /// count than the rule provides.
    pub fn new(
        equation: &'a E,
        factors: &'a GeometricFactors<T>,
        rule: &'a IntegrationRule<T>,
    ) -> Self {
        assert_eq!(
            factors.num_quad_points(),
            rule.num_points(),
            "Geometric factors and integration rule disagree on the quadrature point count"
        );
        Self {
            equation,
            factors,
            rule,
        }
    }

    /// Evaluates the coefficient at every (quadrature point, element) pair.
    ///
    /// Elements are independent and evaluated in parallel.
    pub fn evaluate(&self) -> CoefficientTensor<T> {
        let dim = self.factors.dim();
        let nq = self.factors.num_quad_points();
        let ne = self.factors.num_elements();
        match self.equation.coefficient_rank() {
            CoefficientRank::Scalar => {
                let mut tensor = Tensor::zeros([nq, ne]);
                self.fill(tensor.as_mut_slice(), 1);
                CoefficientTensor::Scalar(tensor)
            }
            CoefficientRank::Vector => {
                let mut tensor = Tensor::zeros([dim, nq, ne]);
                self.fill(tensor.as_mut_slice(), dim);
                CoefficientTensor::Vector(tensor)
            }
            CoefficientRank::Matrix => {
                let mut tensor = Tensor::zeros([dim, dim, nq, ne]);
                self.fill(tensor.as_mut_slice(), dim * dim);
                CoefficientTensor::Matrix(tensor)
            }
        }
    }

    fn fill(&self, output: &mut [T], components: usize) {
        let nq = self.factors.num_quad_points();
        output
            .par_chunks_mut(components * nq)
            .enumerate()
            .for_each(|(e, element_coefficients)| {
                let jacobians_e = self.factors.jacobians().index_last(e);
                for k in 0..nq {
                    self.equation.eval_coefficient(
                        &mut element_coefficients[k * components..(k + 1) * components],
                        jacobians_e.index_last(k),
                        self.rule.weight(k),
                        self.rule.point(k),
                    );
                }
            });
    }
}

/// The contraction strategy used to apply an operator.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum KernelStrategy {
    /// Sum-factorized per-axis contractions; valid only for tensor-product
    /// elements and scalar- or matrix-rank coefficients.
    TensorProduct,
    /// Direct dense contraction; valid for every element family and rank.
    General,
}

/// A partial-assembly domain operator.
///
/// Construction precomputes the coefficient tensor; application contracts it
/// against the dof-to-quadrature maps. The two strategies produce numerically
/// identical results (up to rounding) on tensor-product elements.
pub struct DomainKernel<T: Real> {
    strategy: KernelStrategy,
    coefficients: CoefficientTensor<T>,
    maps: Arc<DofQuadMap<T>>,
    factors: Arc<GeometricFactors<T>>,
    num_global_dofs: usize,
}

define_thread_local_workspace!(WORKSPACE);

#[derive(Debug)]
struct KernelWorkspace<T> {
    x_local: Vec<T>,
    y_local: Vec<T>,
    ping: Vec<T>,
    pong: Vec<T>,
    quad_values: Vec<T>,
    quad_gradients: [Vec<T>; 3],
}

impl<T> Default for KernelWorkspace<T> {
    fn default() -> Self {
        Self {
            x_local: Vec::new(),
            y_local: Vec::new(),
            ping: Vec::new(),
            pong: Vec::new(),
            quad_values: Vec::new(),
            quad_gradients: [Vec::new(), Vec::new(), Vec::new()],
        }
    }
}

impl<T: Real> DomainKernel<T> {
    /// Builds the operator for the space's current mesh state.
    ///
    /// Geometric factors come from `geometry` (computed or reused per its
    /// caching rules) and the dof-to-quadrature maps from `maps`. The strategy
    /// defaults to the sum-factorized path whenever it is applicable.
    pub fn new<E: Equation<T>>(
        space: &mut FeSpace<T>,
        rule: &IntegrationRule<T>,
        equation: &E,
        geometry: &mut GeometryCache<T>,
        maps: &mut DofQuadCache<T>,
    ) -> eyre::Result<Self> {
        let factors = geometry.get(space, rule)?;
        let map = maps.get(space.finite_element(), rule)?;
        let coefficients = QuadTensorFunc::new(equation, &factors, rule).evaluate();
        let strategy =
            if map.has_tensor_factors() && coefficients.rank() != CoefficientRank::Vector {
                KernelStrategy::TensorProduct
            } else {
                KernelStrategy::General
            };
        Ok(Self {
            strategy,
            coefficients,
            maps: map,
            factors,
            num_global_dofs: space.num_dofs(),
        })
    }

    /// Overrides the contraction strategy.
    ///
    /// Requesting the sum-factorized path for an element family or coefficient
    /// rank it does not support is an error, never a silent fallback.
    pub fn with_strategy(mut self, strategy: KernelStrategy) -> eyre::Result<Self> {
        if strategy == KernelStrategy::TensorProduct {
            if !self.maps.has_tensor_factors() {
                bail!("the sum-factorized path requires a tensor-product element and rule");
            }
            if self.coefficients.rank() == CoefficientRank::Vector {
                bail!("the sum-factorized path does not support vector-rank coefficients");
            }
        }
        self.strategy = strategy;
        Ok(self)
    }

    pub fn strategy(&self) -> KernelStrategy {
        self.strategy
    }

    pub fn coefficients(&self) -> &CoefficientTensor<T> {
        &self.coefficients
    }

    /// `y = A x`.
    pub fn mult(&self, x: &[T], y: &mut [T]) {
        y.fill(T::zero());
        self.mult_add(x, y);
    }

    /// `y += A x`.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` do not hold one entry per global dof.
    pub fn mult_add(&self, x: &[T], y: &mut [T]) {
        assert_eq!(x.len(), self.num_global_dofs, "Input vector length mismatch");
        assert_eq!(y.len(), self.num_global_dofs, "Output vector length mismatch");

        let ndof = self.factors.num_dofs_per_element();
        let num_elements = self.factors.num_elements();
        let element_dofs = self.factors.element_dof_map().as_slice();

        with_thread_local_workspace(&WORKSPACE, |ws: &mut KernelWorkspace<T>| {
            ws.x_local.resize(ndof, T::zero());
            ws.y_local.resize(ndof, T::zero());
            for e in 0..num_elements {
                let dofs = &element_dofs[e * ndof..(e + 1) * ndof];
                for (local, &global) in dofs.iter().enumerate() {
                    ws.x_local[local] = x[global];
                }
                ws.y_local.fill(T::zero());
                match self.strategy {
                    KernelStrategy::General => {
                        self.apply_general(e, &ws.x_local, &mut ws.y_local)
                    }
                    KernelStrategy::TensorProduct => self.apply_tensor(
                        e,
                        &ws.x_local,
                        &mut ws.y_local,
                        &mut ws.ping,
                        &mut ws.pong,
                        &mut ws.quad_values,
                        &mut ws.quad_gradients,
                    ),
                }
                for (local, &global) in dofs.iter().enumerate() {
                    y[global] += ws.y_local[local];
                }
            }
        });
    }

    /// Direct dense contraction of one element, O(dofs^2) per quadrature point.
    fn apply_general(&self, e: usize, x_local: &[T], y_local: &mut [T]) {
        let ndof = self.factors.num_dofs_per_element();
        let nq = self.factors.num_quad_points();
        let dim = self.factors.dim();
        let values = self.maps.values().as_slice();
        let gradients = self.maps.gradients().as_slice();

        match &self.coefficients {
            CoefficientTensor::Scalar(d) => {
                let d_e = &d.as_slice()[e * nq..(e + 1) * nq];
                for k in 0..nq {
                    let b_k = &values[k * ndof..(k + 1) * ndof];
                    let mut u = T::zero();
                    for j in 0..ndof {
                        u += b_k[j] * x_local[j];
                    }
                    let t = d_e[k] * u;
                    for i in 0..ndof {
                        y_local[i] += b_k[i] * t;
                    }
                }
            }
            CoefficientTensor::Vector(d) => {
                let d_e = &d.as_slice()[e * dim * nq..(e + 1) * dim * nq];
                for k in 0..nq {
                    let b_k = &values[k * ndof..(k + 1) * ndof];
                    let g_k = &gradients[k * dim * ndof..(k + 1) * dim * ndof];
                    let mut s = T::zero();
                    for a in 0..dim {
                        let mut grad_a = T::zero();
                        for j in 0..ndof {
                            grad_a += g_k[a + dim * j] * x_local[j];
                        }
                        s += d_e[a + dim * k] * grad_a;
                    }
                    for i in 0..ndof {
                        y_local[i] += b_k[i] * s;
                    }
                }
            }
            CoefficientTensor::Matrix(d) => {
                let d_e = &d.as_slice()[e * dim * dim * nq..(e + 1) * dim * dim * nq];
                for k in 0..nq {
                    let g_k = &gradients[k * dim * ndof..(k + 1) * dim * ndof];
                    let d_k = &d_e[k * dim * dim..(k + 1) * dim * dim];
                    let mut grad = [T::zero(); 3];
                    for (a, entry) in grad.iter_mut().enumerate().take(dim) {
                        let mut g = T::zero();
                        for j in 0..ndof {
                            g += g_k[a + dim * j] * x_local[j];
                        }
                        *entry = g;
                    }
                    let mut flux = [T::zero(); 3];
                    for (a, entry) in flux.iter_mut().enumerate().take(dim) {
                        let mut f = T::zero();
                        for b in 0..dim {
                            f += d_k[a + dim * b] * grad[b];
                        }
                        *entry = f;
                    }
                    for i in 0..ndof {
                        let mut acc = T::zero();
                        for (a, &f) in flux.iter().enumerate().take(dim) {
                            acc += g_k[a + dim * i] * f;
                        }
                        y_local[i] += acc;
                    }
                }
            }
        }
    }

    /// Sum-factorized contraction of one element, O(dofs * dofs1d) per
    /// quadrature point.
    #[allow(clippy::too_many_arguments)]
    fn apply_tensor(
        &self,
        e: usize,
        x_local: &[T],
        y_local: &mut [T],
        ping: &mut Vec<T>,
        pong: &mut Vec<T>,
        quad_values: &mut Vec<T>,
        quad_gradients: &mut [Vec<T>; 3],
    ) {
        let dim = self.factors.dim();
        let nq = self.factors.num_quad_points();
        let b1 = self.maps.values_1d();
        let g1 = self.maps.gradients_1d();
        let d1 = b1.extent(0);
        let q1 = b1.extent(1);
        let b1 = b1.as_slice();
        let g1 = g1.as_slice();

        let scratch = d1.max(q1).pow(dim as u32);
        ping.resize(scratch, T::zero());
        pong.resize(scratch, T::zero());

        match &self.coefficients {
            CoefficientTensor::Scalar(d) => {
                let d_e = &d.as_slice()[e * nq..(e + 1) * nq];
                quad_values.resize(nq, T::zero());
                let in_ping = contract_chain(b1, g1, d1, q1, dim, false, None, x_local, ping, pong);
                let forward = if in_ping { &ping[..nq] } else { &pong[..nq] };
                for (out, (&u, &coeff)) in
                    quad_values.iter_mut().zip(forward.iter().zip(d_e.iter()))
                {
                    *out = u * coeff;
                }
                let in_ping =
                    contract_chain(b1, g1, d1, q1, dim, true, None, quad_values, ping, pong);
                let ndof = y_local.len();
                let result = if in_ping { &ping[..ndof] } else { &pong[..ndof] };
                for (y, &r) in y_local.iter_mut().zip(result) {
                    *y += r;
                }
            }
            CoefficientTensor::Matrix(d) => {
                let d_e = &d.as_slice()[e * dim * dim * nq..(e + 1) * dim * dim * nq];
                for component in quad_gradients.iter_mut().take(dim) {
                    component.resize(nq, T::zero());
                }
                for a in 0..dim {
                    let in_ping =
                        contract_chain(b1, g1, d1, q1, dim, false, Some(a), x_local, ping, pong);
                    let forward = if in_ping { &ping[..nq] } else { &pong[..nq] };
                    quad_gradients[a].copy_from_slice(forward);
                }
                // Pointwise flux: f = D g at every quadrature point
                for k in 0..nq {
                    let d_k = &d_e[k * dim * dim..(k + 1) * dim * dim];
                    let mut grad = [T::zero(); 3];
                    for (a, entry) in grad.iter_mut().enumerate().take(dim) {
                        *entry = quad_gradients[a][k];
                    }
                    for a in 0..dim {
                        let mut f = T::zero();
                        for b in 0..dim {
                            f += d_k[a + dim * b] * grad[b];
                        }
                        quad_gradients[a][k] = f;
                    }
                }
                let ndof = y_local.len();
                for a in 0..dim {
                    let in_ping = contract_chain(
                        b1,
                        g1,
                        d1,
                        q1,
                        dim,
                        true,
                        Some(a),
                        &quad_gradients[a],
                        ping,
                        pong,
                    );
                    let result = if in_ping { &ping[..ndof] } else { &pong[..ndof] };
                    for (y, &r) in y_local.iter_mut().zip(result) {
                        *y += r;
                    }
                }
            }
            CoefficientTensor::Vector(_) => {
                unreachable!("Vector-rank coefficients never select the sum-factorized path")
            }
        }
    }
}

/// Applies the 1D operator tables along every axis of a rank-`dim` local
/// tensor, one axis at a time.
///
/// With `transpose == false` axes are contracted dof-to-quad in ascending
/// order; with `transpose == true` quad-to-dof in descending order, which is
/// the exact adjoint. `grad_axis` selects the axis that uses the derivative
/// table instead of the value table. Returns `true` if the result landed in
/// `ping`, `false` for `pong`.
#[allow(clippy::too_many_arguments)]
fn contract_chain<T: Real>(
    values_1d: &[T],
    gradients_1d: &[T],
    d1: usize,
    q1: usize,
    dim: usize,
    transpose: bool,
    grad_axis: Option<usize>,
    input: &[T],
    ping: &mut [T],
    pong: &mut [T],
) -> bool {
    let (n_in, n_out) = if transpose { (q1, d1) } else { (d1, q1) };
    let mut result_in_ping = true;
    for step in 0..dim {
        let axis = if transpose { dim - 1 - step } else { step };
        let table = if grad_axis == Some(axis) {
            gradients_1d
        } else {
            values_1d
        };
        let pre = q1.pow(axis as u32);
        let post = d1.pow((dim - 1 - axis) as u32);
        let in_len = pre * n_in * post;
        let out_len = pre * n_out * post;
        if step == 0 {
            contract_axis(
                table,
                d1,
                transpose,
                pre,
                n_in,
                n_out,
                post,
                &input[..in_len],
                &mut ping[..out_len],
            );
            result_in_ping = true;
        } else if result_in_ping {
            contract_axis(
                table,
                d1,
                transpose,
                pre,
                n_in,
                n_out,
                post,
                &ping[..in_len],
                &mut pong[..out_len],
            );
            result_in_ping = false;
        } else {
            contract_axis(
                table,
                d1,
                transpose,
                pre,
                n_in,
                n_out,
                post,
                &pong[..in_len],
                &mut ping[..out_len],
            );
            result_in_ping = true;
        }
    }
    result_in_ping
}

/// Contracts one axis of a column-major tensor with a 1D operator table.
///
/// The table is stored (1D dof, 1D quad point). Forward contractions
/// (`transpose == false`) produce `out[k] = sum_j table[j, k] in[j]` along the
/// axis; transposed contractions produce `out[j] = sum_k table[j, k] in[k]`.
#[allow(clippy::too_many_arguments)]
fn contract_axis<T: Real>(
    table: &[T],
    d1: usize,
    transpose: bool,
    pre: usize,
    n_in: usize,
    n_out: usize,
    post: usize,
    input: &[T],
    output: &mut [T],
) {
    debug_assert_eq!(input.len(), pre * n_in * post);
    debug_assert_eq!(output.len(), pre * n_out * post);
    for p2 in 0..post {
        for out_index in 0..n_out {
            for p1 in 0..pre {
                let mut sum = T::zero();
                for j in 0..n_in {
                    let entry = if transpose {
                        table[out_index + d1 * j]
                    } else {
                        table[j + d1 * out_index]
                    };
                    sum += entry * input[p1 + pre * (j + n_in * p2)];
                }
                output[p1 + pre * (out_index + n_out * p2)] = sum;
            }
        }
    }
}
