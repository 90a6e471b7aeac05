//! Integration rules for reference elements.
//!
//! Tensor-product rules are Gauss–Legendre products over $[-1, 1]^d$ with the
//! first axis varying fastest, matching the lexicographic dof ordering of the
//! tensor-product elements so that separable kernels can factor the rule.
//! Simplex rules are closed-form low-degree rules on the unit simplex.

use crate::element::{ElementFamily, ElementType, FiniteElement};
use crate::tensor::TensorView;
use crate::Real;
use eyre::bail;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// Identifies how a rule was constructed.
///
/// Two rules with the same id are identical, which makes the id usable as a
/// cache key for tables derived from the rule.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    GaussTensor { dim: usize, points_per_dim: usize },
    Simplex { element_type: ElementType, degree: usize },
}

/// A quadrature rule: weights and reference-point coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRule<T: Real> {
    id: RuleId,
    dim: usize,
    weights: Vec<T>,
    // Point coordinates, column-major (coordinate, point)
    points: Vec<T>,
    // The generating 1D rule for tensor-product rules
    rule_1d: Option<(Vec<T>, Vec<T>)>,
}

impl<T: Real> IntegrationRule<T> {
    /// Constructs the tensor-product Gauss–Legendre rule for a tensor-product
    /// element type with the given number of points along each axis.
    pub fn gauss(element_type: ElementType, points_per_dim: usize) -> eyre::Result<Self> {
        if element_type.family() != ElementFamily::TensorProduct {
            bail!(
                "Gauss tensor-product rules require a tensor-product element type, got {:?}",
                element_type
            );
        }
        if points_per_dim == 0 {
            bail!("Gauss rules require at least one point per dimension");
        }
        let dim = element_type.dim();
        let (weights_1d, points_1d) = gauss_1d(points_per_dim);
        let weights_1d: Vec<T> = weights_1d.iter().map(|&w| convert_f64(w)).collect();
        let points_1d: Vec<T> = points_1d.iter().map(|&x| convert_f64(x)).collect();

        let num_points = points_per_dim.pow(dim as u32);
        let mut weights = Vec::with_capacity(num_points);
        let mut points = Vec::with_capacity(dim * num_points);
        for k in 0..num_points {
            let mut weight = T::one();
            let mut rest = k;
            for _ in 0..dim {
                let k_axis = rest % points_per_dim;
                rest /= points_per_dim;
                weight *= weights_1d[k_axis];
                points.push(points_1d[k_axis]);
            }
            weights.push(weight);
        }
        Ok(Self {
            id: RuleId::GaussTensor {
                dim,
                points_per_dim,
            },
            dim,
            weights,
            points,
            rule_1d: Some((weights_1d, points_1d)),
        })
    }

    /// Constructs a closed-form rule of the given polynomial degree on the
    /// unit simplex.
    pub fn simplex(element_type: ElementType, degree: usize) -> eyre::Result<Self> {
        let (weights, points): (Vec<f64>, Vec<f64>) = match (element_type, degree) {
            (ElementType::Triangle, 1) => {
                let c = 1.0 / 3.0;
                (vec![0.5], vec![c, c])
            }
            (ElementType::Triangle, 2) => {
                let (a, b) = (1.0 / 6.0, 2.0 / 3.0);
                (vec![a; 3], vec![a, a, b, a, a, b])
            }
            (ElementType::Tetrahedron, 1) => (vec![1.0 / 6.0], vec![0.25, 0.25, 0.25]),
            (ElementType::Tetrahedron, 2) => {
                let a = (5.0 + 3.0 * 5.0f64.sqrt()) / 20.0;
                let b = (5.0 - 5.0f64.sqrt()) / 20.0;
                (
                    vec![1.0 / 24.0; 4],
                    vec![a, b, b, b, a, b, b, b, a, b, b, b],
                )
            }
            _ => bail!(
                "no simplex rule of degree {} available for {:?}",
                degree,
                element_type
            ),
        };
        Ok(Self {
            id: RuleId::Simplex {
                element_type,
                degree,
            },
            dim: element_type.dim(),
            weights: weights.iter().map(|&w| convert_f64(w)).collect(),
            points: points.iter().map(|&x| convert_f64(x)).collect(),
            rule_1d: None,
        })
    }

    /// The default rule for an element: exact for the element's mass form.
    pub fn for_element(fe: &FiniteElement) -> eyre::Result<Self> {
        match fe.family() {
            ElementFamily::TensorProduct => Self::gauss(fe.element_type(), fe.order() + 1),
            ElementFamily::Simplex => Self::simplex(fe.element_type(), 2),
        }
    }

    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_points(&self) -> usize {
        self.weights.len()
    }

    pub fn weights(&self) -> &[T] {
        &self.weights
    }

    pub fn weight(&self, k: usize) -> T {
        self.weights[k]
    }

    /// The coordinates of point `k`.
    pub fn point(&self, k: usize) -> &[T] {
        &self.points[k * self.dim..(k + 1) * self.dim]
    }

    /// All point coordinates as a `(coordinate, point)` tensor view.
    pub fn points(&self) -> TensorView<'_, T, 2> {
        TensorView::from_slice(&self.points, [self.dim, self.num_points()])
    }

    /// The generating 1D rule, present only for tensor-product rules.
    pub fn rule_1d(&self) -> Option<(&[T], &[T])> {
        self.rule_1d
            .as_ref()
            .map(|(w, x)| (w.as_slice(), x.as_slice()))
    }

    /// The number of points along each axis, present only for tensor-product rules.
    pub fn num_points_1d(&self) -> Option<usize> {
        match self.id {
            RuleId::GaussTensor { points_per_dim, .. } => Some(points_per_dim),
            RuleId::Simplex { .. } => None,
        }
    }
}

fn convert_f64<T: Real>(x: f64) -> T {
    T::from_f64(x).expect("Rule constant must fit in T")
}

/// Evaluates the Legendre polynomial $P_n$ and its derivative at `x`.
///
/// The derivative formula is undefined at |x| = 1, which never occurs for the
/// interior Newton iterates below.
fn legendre_value_and_derivative(n: usize, x: f64) -> (f64, f64) {
    // Three-term recurrence m P_m = (2m - 1) x P_{m-1} - (m - 1) P_{m-2}
    let mut p1 = 1.0;
    let mut p2 = 0.0;
    for m in 1..=n {
        let mf = m as f64;
        let p3 = p2;
        p2 = p1;
        p1 = ((2.0 * mf - 1.0) * x * p2 - (mf - 1.0) * p3) / mf;
    }
    let dp = n as f64 * (x * p1 - p2) / (x * x - 1.0);
    (p1, dp)
}

/// Gauss–Legendre rule with `n` points on `[-1, 1]`.
///
/// Integrates polynomials up to order `2n - 1` exactly. Roots of $P_n$ are
/// found by Newton's method from a cosine initial guess; only the first half
/// is computed, the rest follows by symmetry.
fn gauss_1d(n: usize) -> (Vec<f64>, Vec<f64>) {
    assert!(n > 0, "number of points must be positive");
    let half = (n + 1) / 2;
    let mut weights = vec![0.0; n];
    let mut points = vec![0.0; n];

    for i in 0..half {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = legendre_value_and_derivative(n, x);
        loop {
            let dx = -p / dp;
            x += dx;
            let next = legendre_value_and_derivative(n, x);
            p = next.0;
            dp = next.1;
            if dx.abs() <= 1e-15 {
                break;
            }
        }
        // Weight from the standard closed form at a converged root
        let w = 2.0 / ((1.0 - x * x) * dp * dp);
        points[i] = x;
        weights[i] = w;
    }
    for i in half..n {
        points[i] = -points[n - i - 1];
        weights[i] = weights[n - i - 1];
    }

    // Sort ascending so tensor-product point ordering is reproducible
    let mut paired: Vec<(f64, f64)> = points.into_iter().zip(weights).collect();
    paired.sort_by(|a, b| a.0.partial_cmp(&b.0).expect("Roots are finite"));
    paired.into_iter().map(|(x, w)| (w, x)).unzip()
}
