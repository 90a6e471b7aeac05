//! Basis-to-quadrature interpolation and differentiation tables.
//!
//! A [`DofQuadMap`] stores, for a fixed (finite element, integration rule)
//! pair, the value and reference gradient of every basis function at every
//! quadrature point. Operator kernels contract against these tables instead of
//! re-evaluating bases. Tensor-product elements additionally carry the 1D
//! factor tables that the separable fast path contracts axis by axis.
//!
//! Maps are immutable once built and shared via `Arc`; [`DofQuadCache`]
//! deduplicates them per (element, rule) pair.

use crate::element::{ElementFamily, FiniteElement};
use crate::quadrature::{IntegrationRule, RuleId};
use crate::tensor::Tensor;
use crate::Real;
use eyre::bail;
use fxhash::FxHashMap;
use std::sync::Arc;

/// Basis values and reference gradients tabulated at quadrature points.
#[derive(Debug, Clone)]
pub struct DofQuadMap<T: Real> {
    dim: usize,
    // (local dof, quad point)
    values: Tensor<T, 2>,
    // (derivative axis, local dof, quad point)
    gradients: Tensor<T, 3>,
    // 1D factor tables, (1D dof, 1D quad point), tensor-product maps only
    values_1d: Option<Tensor<T, 2>>,
    gradients_1d: Option<Tensor<T, 2>>,
}

impl<T: Real> DofQuadMap<T> {
    /// Builds the full (non-factorized) tables for any element family.
    pub fn simplex_map(fe: &FiniteElement, rule: &IntegrationRule<T>) -> eyre::Result<Self> {
        let (values, gradients) = Self::build_full_tables(fe, rule)?;
        Ok(Self {
            dim: fe.dim(),
            values,
            gradients,
            values_1d: None,
            gradients_1d: None,
        })
    }

    /// Builds full tables plus the 1D factor tables of a tensor-product
    /// element under a tensor-product rule.
    pub fn tensor_map(fe: &FiniteElement, rule: &IntegrationRule<T>) -> eyre::Result<Self> {
        if fe.family() != ElementFamily::TensorProduct {
            bail!(
                "tensor-product maps require a tensor-product element, got {:?}",
                fe.element_type()
            );
        }
        let points_1d = match rule.rule_1d() {
            Some((_, x)) => x,
            None => bail!("tensor-product maps require a tensor-product integration rule"),
        };
        let (values, gradients) = Self::build_full_tables(fe, rule)?;

        let d1 = fe.num_dofs_1d();
        let q1 = points_1d.len();
        let mut values_1d = Tensor::zeros([d1, q1]);
        let mut gradients_1d = Tensor::zeros([d1, q1]);
        for (k, &x) in points_1d.iter().enumerate() {
            let columns = &mut values_1d.as_mut_slice()[k * d1..(k + 1) * d1];
            fe.populate_basis_1d(columns, x);
            let columns = &mut gradients_1d.as_mut_slice()[k * d1..(k + 1) * d1];
            fe.populate_basis_gradients_1d(columns, x);
        }
        Ok(Self {
            dim: fe.dim(),
            values,
            gradients,
            values_1d: Some(values_1d),
            gradients_1d: Some(gradients_1d),
        })
    }

    fn build_full_tables(
        fe: &FiniteElement,
        rule: &IntegrationRule<T>,
    ) -> eyre::Result<(Tensor<T, 2>, Tensor<T, 3>)> {
        if fe.dim() != rule.dim() {
            bail!(
                "element dimension {} does not match rule dimension {}",
                fe.dim(),
                rule.dim()
            );
        }
        let dim = fe.dim();
        let ndof = fe.num_dofs();
        let nq = rule.num_points();
        let mut values = Tensor::zeros([ndof, nq]);
        let mut gradients = Tensor::zeros([dim, ndof, nq]);
        for k in 0..nq {
            let xi = rule.point(k);
            fe.populate_basis(&mut values.as_mut_slice()[k * ndof..(k + 1) * ndof], xi);
            fe.populate_basis_gradients(
                &mut gradients.as_mut_slice()[k * dim * ndof..(k + 1) * dim * ndof],
                xi,
            );
        }
        Ok((values, gradients))
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_dofs(&self) -> usize {
        self.values.extent(0)
    }

    pub fn num_quad_points(&self) -> usize {
        self.values.extent(1)
    }

    /// Basis values, indexed by (local dof, quad point).
    pub fn values(&self) -> &Tensor<T, 2> {
        &self.values
    }

    /// Reference basis gradients, indexed by (axis, local dof, quad point).
    pub fn gradients(&self) -> &Tensor<T, 3> {
        &self.gradients
    }

    pub fn has_tensor_factors(&self) -> bool {
        self.values_1d.is_some()
    }

    /// 1D basis values, indexed by (1D dof, 1D quad point).
    ///
    /// # Panics
    ///
    /// Panics if the map carries no 1D factor tables.
    pub fn values_1d(&self) -> &Tensor<T, 2> {
        self.values_1d
            .as_ref()
            .expect("Map was not built with tensor-product factor tables")
    }

    /// 1D basis derivatives, indexed by (1D dof, 1D quad point).
    ///
    /// # Panics
    ///
    /// Panics if the map carries no 1D factor tables.
    pub fn gradients_1d(&self) -> &Tensor<T, 2> {
        self.gradients_1d
            .as_ref()
            .expect("Map was not built with tensor-product factor tables")
    }
}

/// A get-or-build cache of dof-quad maps keyed by (element, rule identity).
#[derive(Debug)]
pub struct DofQuadCache<T: Real> {
    maps: FxHashMap<(FiniteElement, RuleId), Arc<DofQuadMap<T>>>,
}

impl<T: Real> Default for DofQuadCache<T> {
    fn default() -> Self {
        Self {
            maps: FxHashMap::default(),
        }
    }
}

impl<T: Real> DofQuadCache<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the map for the given pair, building it on first request.
    ///
    /// Tensor-product elements under tensor-product rules get factorized maps;
    /// everything else gets full tables.
    pub fn get(
        &mut self,
        fe: &FiniteElement,
        rule: &IntegrationRule<T>,
    ) -> eyre::Result<Arc<DofQuadMap<T>>> {
        let key = (*fe, rule.id());
        if let Some(map) = self.maps.get(&key) {
            return Ok(Arc::clone(map));
        }
        let map = if fe.family() == ElementFamily::TensorProduct && rule.rule_1d().is_some() {
            DofQuadMap::tensor_map(fe, rule)?
        } else {
            DofQuadMap::simplex_map(fe, rule)?
        };
        let map = Arc::new(map);
        self.maps.insert(key, Arc::clone(&map));
        Ok(map)
    }

    pub fn len(&self) -> usize {
        self.maps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }

    pub fn clear(&mut self) {
        self.maps.clear();
    }
}
