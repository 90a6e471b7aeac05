//! Geometric factor computation and caching.
//!
//! For a fixed (finite element space, integration rule, mesh state) triple the
//! engine gathers per-element nodal coordinates through the element-to-dof
//! table and computes the Jacobian, its inverse and its determinant at every
//! (element, quadrature point) pair. The results are cached against the mesh
//! modification sequence and recomputed wholesale — never patched — when the
//! mesh reports a new sequence.
//!
//! Degenerate geometry (near-zero or negative determinants) is *not* detected
//! here; consumers relying on positivity must check the sign of the
//! determinant array themselves.

pub mod kernel;

use crate::dofquad::DofQuadCache;
use crate::element::FiniteElement;
use crate::mesh::NodeOrdering;
use crate::quadrature::{IntegrationRule, RuleId};
use crate::reorder;
use crate::space::FeSpace;
use crate::tensor::Tensor;
use crate::Real;
use log::debug;
use parking_lot::Mutex;
use std::sync::Arc;

/// Per-element geometric data for one (space, rule, mesh state) triple.
///
/// All arrays are column-major with the element index slowest, so per-element
/// blocks are contiguous. Shapes are mutually consistent: the same spatial
/// dimension, quadrature point count and element count throughout.
#[derive(Debug, Clone)]
pub struct GeometricFactors<T: Real> {
    // (local dof, element) -> global dof
    element_dof_map: Tensor<usize, 2>,
    // (component, local dof, element)
    node_coordinates: Tensor<T, 3>,
    // (row, col, quad point, element)
    jacobians: Tensor<T, 4>,
    inverse_jacobians: Tensor<T, 4>,
    // (quad point, element)
    determinants: Tensor<T, 2>,
}

impl<T: Real> GeometricFactors<T> {
    pub fn dim(&self) -> usize {
        self.node_coordinates.extent(0)
    }

    pub fn num_dofs_per_element(&self) -> usize {
        self.element_dof_map.extent(0)
    }

    pub fn num_quad_points(&self) -> usize {
        self.determinants.extent(0)
    }

    pub fn num_elements(&self) -> usize {
        self.element_dof_map.extent(1)
    }

    /// Global dof ids per (local dof, element).
    pub fn element_dof_map(&self) -> &Tensor<usize, 2> {
        &self.element_dof_map
    }

    /// Gathered physical coordinates per (component, local dof, element).
    pub fn node_coordinates(&self) -> &Tensor<T, 3> {
        &self.node_coordinates
    }

    /// Jacobians per (row, col, quad point, element).
    pub fn jacobians(&self) -> &Tensor<T, 4> {
        &self.jacobians
    }

    /// Pointwise Jacobian inverses, same shape as [`Self::jacobians`].
    pub fn inverse_jacobians(&self) -> &Tensor<T, 4> {
        &self.inverse_jacobians
    }

    /// Signed Jacobian determinants per (quad point, element).
    pub fn determinants(&self) -> &Tensor<T, 2> {
        &self.determinants
    }
}

#[derive(Debug)]
struct CacheEntry<T: Real> {
    sequence: u64,
    fe: FiniteElement,
    rule_id: RuleId,
    factors: Arc<GeometricFactors<T>>,
}

/// A cache of geometric factors keyed by the mesh modification sequence.
///
/// The cache holds a single entry: the factors of the most recent
/// (space, rule) request. A request at an unchanged mesh sequence returns the
/// cached `Arc` without touching the kernel; a request at a new sequence
/// recomputes everything and replaces the entry wholesale. Requesting factors
/// for a *different* element or rule while the cached entry is still live is
/// a programming error and fails fast.
#[derive(Debug)]
pub struct GeometryCache<T: Real> {
    entry: Option<CacheEntry<T>>,
    map_cache: DofQuadCache<T>,
    recompute_count: u64,
}

impl<T: Real> Default for GeometryCache<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> GeometryCache<T> {
    pub fn new() -> Self {
        Self {
            entry: None,
            map_cache: DofQuadCache::new(),
            recompute_count: 0,
        }
    }

    /// Returns the geometric factors for the space's current mesh state.
    ///
    /// Reads nodal coordinates from the mesh's own grid function; a mesh
    /// without one is upgraded first (see [`crate::mesh::Mesh::ensure_nodes`]).
    /// A grid function stored in by-node ordering is transparently transposed
    /// to interleaved ordering for the gather and restored bit-for-bit before
    /// returning, on cache hits and misses alike.
    ///
    /// The returned reference stays valid (and correct) until the next mesh
    /// state change.
    pub fn get(
        &mut self,
        space: &mut FeSpace<T>,
        rule: &IntegrationRule<T>,
    ) -> eyre::Result<Arc<GeometricFactors<T>>> {
        space.mesh_mut().ensure_nodes();
        let sequence = space.mesh().sequence();
        if let Some(entry) = &self.entry {
            if entry.sequence == sequence {
                assert_eq!(
                    entry.fe,
                    *space.finite_element(),
                    "Cached geometric factors were computed for a different finite element; \
                     clear the cache before switching elements"
                );
                assert_eq!(
                    entry.rule_id,
                    rule.id(),
                    "Cached geometric factors were computed for a different integration rule; \
                     clear the cache before switching rules"
                );
                return Ok(Arc::clone(&entry.factors));
            }
        }

        debug!(
            "recomputing geometric factors: {} elements at mesh sequence {}",
            space.num_elements(),
            sequence
        );
        let restore_by_nodes =
            space.mesh().nodes().map(|n| n.ordering()) == Some(NodeOrdering::ByNodes);
        if restore_by_nodes {
            let nodes = space
                .mesh_mut()
                .nodes_mut()
                .expect("Nodes exist after ensure_nodes");
            reorder::grid_function_to_by_vdim(nodes);
        }
        let factors = self.compute(
            space,
            rule,
            space
                .mesh()
                .nodes()
                .expect("Nodes exist after ensure_nodes")
                .data(),
        )?;
        if restore_by_nodes {
            let nodes = space
                .mesh_mut()
                .nodes_mut()
                .expect("Nodes exist after ensure_nodes");
            reorder::grid_function_to_by_nodes(nodes);
        }
        self.entry = Some(CacheEntry {
            sequence,
            fe: *space.finite_element(),
            rule_id: rule.id(),
            factors: Arc::clone(&factors),
        });
        Ok(factors)
    }

    /// Computes geometric factors from an externally supplied nodal vector.
    ///
    /// The vector must hold interleaved coordinates indexed by the mesh's
    /// native global dof numbering (`num_dofs * dim` entries). This evaluates
    /// the geometry at a perturbed configuration without mutating the mesh;
    /// the result is returned fresh and the mesh-keyed cache entry is left
    /// untouched.
    pub fn get_with_nodal_vector(
        &mut self,
        space: &FeSpace<T>,
        rule: &IntegrationRule<T>,
        nodal: &[T],
    ) -> eyre::Result<Arc<GeometricFactors<T>>> {
        assert_eq!(
            nodal.len(),
            space.num_dofs() * space.dim(),
            "External nodal vector must hold dim components per global dof"
        );
        self.compute(space, rule, nodal)
    }

    /// Gathers coordinates from an interleaved global vector and runs the
    /// factor kernel.
    fn compute(
        &mut self,
        space: &FeSpace<T>,
        rule: &IntegrationRule<T>,
        node_data: &[T],
    ) -> eyre::Result<Arc<GeometricFactors<T>>> {
        let mesh = space.mesh();
        let dim = mesh.dim();
        let ndof = mesh.dofs_per_element();
        let num_elements = mesh.num_elements();

        let mut element_dof_map = Tensor::zeros([ndof, num_elements]);
        let mut node_coordinates = Tensor::zeros([dim, ndof, num_elements]);
        {
            let emap = element_dof_map.as_mut_slice();
            let coords = node_coordinates.as_mut_slice();
            for e in 0..num_elements {
                for (d, &gid) in mesh.element_dofs(e).iter().enumerate() {
                    let lid = d + ndof * e;
                    emap[lid] = gid;
                    for v in 0..dim {
                        coords[v + dim * lid] = node_data[v + dim * gid];
                    }
                }
            }
        }

        let maps = self.map_cache.get(space.finite_element(), rule)?;
        let nq = maps.num_quad_points();
        let mut jacobians = Tensor::zeros([dim, dim, nq, num_elements]);
        let mut inverse_jacobians = Tensor::zeros([dim, dim, nq, num_elements]);
        let mut determinants = Tensor::zeros([nq, num_elements]);
        kernel::compute_jacobians(
            &node_coordinates,
            maps.gradients(),
            &mut jacobians,
            &mut inverse_jacobians,
            &mut determinants,
        );
        self.recompute_count += 1;

        Ok(Arc::new(GeometricFactors {
            element_dof_map,
            node_coordinates,
            jacobians,
            inverse_jacobians,
            determinants,
        }))
    }

    /// The number of factor kernel invocations so far.
    ///
    /// Cache hits do not increment this; tests use it to observe idempotence
    /// and invalidation.
    pub fn recompute_count(&self) -> u64 {
        self.recompute_count
    }

    /// Releases the cached factors (all arrays together) and the derived maps.
    pub fn clear(&mut self) {
        if self.entry.take().is_some() {
            debug!("cleared geometric factor cache");
        }
        self.map_cache.clear();
    }
}

// The process-wide cache. Created on first use, torn down via
// `clear_global_cache`. Readers during a stable mesh period are safe; the
// design assumes a single mutator thread (typically the main solve loop) and
// the mutex merely serializes access, it does not make concurrent mutation a
// supported scenario.
static GLOBAL_CACHE: Mutex<Option<GeometryCache<f64>>> = Mutex::new(None);

/// Fetches factors from the process-wide cache, creating it on first use.
///
/// See [`GeometryCache::get`] for the semantics of a single lookup.
pub fn global_factors(
    space: &mut FeSpace<f64>,
    rule: &IntegrationRule<f64>,
) -> eyre::Result<Arc<GeometricFactors<f64>>> {
    let mut guard = GLOBAL_CACHE.lock();
    guard.get_or_insert_with(GeometryCache::new).get(space, rule)
}

/// Tears down the process-wide cache, releasing all cached factors and maps.
pub fn clear_global_cache() {
    if GLOBAL_CACHE.lock().take().is_some() {
        debug!("tore down process-wide geometry cache");
    }
}
