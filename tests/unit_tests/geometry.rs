use matfree::element::{ElementType, FiniteElement};
use matfree::geometry::{self, kernel, GeometryCache};
use matfree::mesh::NodeOrdering;
use matfree::procedural;
use matfree::quadrature::IntegrationRule;
use matfree::reorder;
use matfree::space::FeSpace;
use matrixcompare::assert_matrix_eq;
use nalgebra::DMatrix;
use std::sync::Arc;

fn quad_space(cells: usize, order: usize) -> FeSpace<f64> {
    let mesh = procedural::unit_square_quadrilaterals(cells, cells, order).unwrap();
    let fe = FiniteElement::new(ElementType::Quadrilateral, order).unwrap();
    FeSpace::new(mesh, fe).unwrap()
}

/// Applies a smooth, deterministic distortion to the nodal coordinates.
fn distort(space: &mut FeSpace<f64>) {
    space.mesh_mut().ensure_nodes();
    let perturbed: Vec<f64> = space
        .mesh()
        .nodes()
        .unwrap()
        .data()
        .chunks_exact(2)
        .flat_map(|p| {
            let (x, y) = (p[0], p[1]);
            [x + 0.08 * x * y, y - 0.05 * x * x + 0.03 * y * y]
        })
        .collect();
    space.mesh_mut().set_node_positions(&perturbed);
}

#[test]
fn reference_element_has_identity_jacobians() {
    let mesh = procedural::reference_element::<f64>(ElementType::Quadrilateral);
    let fe = FiniteElement::new(ElementType::Quadrilateral, 1).unwrap();
    let mut space = FeSpace::new(mesh, fe).unwrap();
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    let factors = cache.get(&mut space, &rule).unwrap();

    assert_eq!(factors.num_elements(), 1);
    assert_eq!(factors.num_quad_points(), 4);
    for k in 0..factors.num_quad_points() {
        for r in 0..2 {
            for c in 0..2 {
                let expected = if r == c { 1.0 } else { 0.0 };
                assert!(
                    (factors.jacobians()[[r, c, k, 0]] - expected).abs() < 1e-14,
                    "J[{}][{}] at point {}",
                    r,
                    c,
                    k
                );
            }
        }
        assert!((factors.determinants()[[k, 0]] - 1.0).abs() < 1e-14);
    }
}

#[test]
fn determinant_and_inverse_are_consistent_on_distorted_mesh() {
    let mut space = quad_space(3, 2);
    distort(&mut space);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 3).unwrap();

    let mut cache = GeometryCache::new();
    let factors = cache.get(&mut space, &rule).unwrap();

    let dim = factors.dim();
    for e in 0..factors.num_elements() {
        let jacobians_e = factors.jacobians().index_last(e);
        let inverses_e = factors.inverse_jacobians().index_last(e);
        for k in 0..factors.num_quad_points() {
            let jac = jacobians_e.index_last(k);
            let inv = inverses_e.index_last(k);

            let det = factors.determinants()[[k, e]];
            assert!((kernel::determinant(dim, jac.as_slice()) - det).abs() < 1e-14);

            // det(J^{-1}) = 1 / det(J)
            let inv_det = kernel::determinant(dim, inv.as_slice());
            assert!(
                (inv_det * det - 1.0).abs() < 1e-10,
                "element {}, point {}: det(inv) * det = {}",
                e,
                k,
                inv_det * det
            );

            // J * J^{-1} = I
            let jac = DMatrix::from_column_slice(dim, dim, jac.as_slice());
            let inv = DMatrix::from_column_slice(dim, dim, inv.as_slice());
            assert_matrix_eq!(
                jac * inv,
                DMatrix::identity(dim, dim),
                comp = abs,
                tol = 1e-10
            );
        }
    }
}

#[test]
fn repeated_lookups_reuse_the_cached_factors() {
    let mut space = quad_space(4, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    let first = cache.get(&mut space, &rule).unwrap();
    let second = cache.get(&mut space, &rule).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(cache.recompute_count(), 1);
}

#[test]
fn mesh_modification_forces_recomputation() {
    let mut space = quad_space(2, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    let before = cache.get(&mut space, &rule).unwrap();
    assert_eq!(cache.recompute_count(), 1);

    distort(&mut space);
    let after = cache.get(&mut space, &rule).unwrap();
    assert_eq!(cache.recompute_count(), 2);
    assert!(!Arc::ptr_eq(&before, &after));

    // The recomputed factors reflect the new geometry
    let mut max_difference: f64 = 0.0;
    for e in 0..after.num_elements() {
        for k in 0..after.num_quad_points() {
            let difference =
                (after.determinants()[[k, e]] - before.determinants()[[k, e]]).abs();
            max_difference = max_difference.max(difference);
        }
    }
    assert!(max_difference > 1e-6);
}

#[test]
fn meshes_without_nodes_gain_them_on_first_lookup() {
    let mut space = quad_space(2, 1);
    assert!(space.mesh().nodes().is_none());
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    cache.get(&mut space, &rule).unwrap();

    let nodes = space.mesh().nodes().expect("Upgrade must persist");
    assert_eq!(nodes.ordering(), NodeOrdering::ByVdim);
    assert_eq!(nodes.num_dofs(), space.num_dofs());

    // The upgrade happened once; the second lookup is a pure cache hit
    cache.get(&mut space, &rule).unwrap();
    assert_eq!(cache.recompute_count(), 1);
}

#[test]
fn by_node_ordered_grid_functions_are_restored_exactly() {
    let mut space = quad_space(3, 1);
    space.mesh_mut().ensure_nodes();
    reorder::grid_function_to_by_nodes(space.mesh_mut().nodes_mut().unwrap());

    let snapshot = space.mesh().nodes().unwrap().data().to_vec();
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    let factors = cache.get(&mut space, &rule).unwrap();

    let nodes = space.mesh().nodes().unwrap();
    assert_eq!(nodes.ordering(), NodeOrdering::ByNodes);
    assert_eq!(nodes.data(), snapshot.as_slice());

    // The gather saw the interleaved layout regardless of the storage order
    for k in 0..factors.num_quad_points() {
        assert!(factors.determinants()[[k, 0]] > 0.0);
    }
}

#[test]
fn external_nodal_vectors_bypass_the_cache() {
    let mut space = quad_space(2, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let mut cache = GeometryCache::new();
    let baseline = cache.get(&mut space, &rule).unwrap();
    assert_eq!(cache.recompute_count(), 1);

    // Translate every node; Jacobians are translation invariant
    let translated: Vec<f64> = space
        .mesh()
        .nodes()
        .unwrap()
        .data()
        .chunks_exact(2)
        .flat_map(|p| [p[0] + 3.0, p[1] - 2.0])
        .collect();
    let perturbed = cache
        .get_with_nodal_vector(&space, &rule, &translated)
        .unwrap();
    assert_eq!(cache.recompute_count(), 2);

    for e in 0..baseline.num_elements() {
        for k in 0..baseline.num_quad_points() {
            for r in 0..2 {
                for c in 0..2 {
                    let difference = (perturbed.jacobians()[[r, c, k, e]]
                        - baseline.jacobians()[[r, c, k, e]])
                    .abs();
                    assert!(difference < 1e-14);
                }
            }
        }
    }

    // The mesh-keyed entry is untouched: the next lookup is still a hit
    let hit = cache.get(&mut space, &rule).unwrap();
    assert!(Arc::ptr_eq(&baseline, &hit));
    assert_eq!(cache.recompute_count(), 2);
}

#[test]
#[should_panic(expected = "different integration rule")]
fn switching_rules_against_a_live_entry_fails_fast() {
    let mut space = quad_space(2, 1);
    let coarse = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();
    let fine = IntegrationRule::gauss(ElementType::Quadrilateral, 3).unwrap();

    let mut cache = GeometryCache::new();
    cache.get(&mut space, &coarse).unwrap();
    let _ = cache.get(&mut space, &fine);
}

#[test]
fn simplex_meshes_use_full_maps() {
    let mesh = procedural::unit_square_triangles::<f64>(2, 2).unwrap();
    let fe = FiniteElement::new(ElementType::Triangle, 1).unwrap();
    let mut space = FeSpace::new(mesh, fe).unwrap();
    let rule = IntegrationRule::simplex(ElementType::Triangle, 2).unwrap();

    let mut cache = GeometryCache::new();
    let factors = cache.get(&mut space, &rule).unwrap();

    // Affine elements: the Jacobian is constant per element and the total
    // volume sum w_k det_k recovers the mesh area
    let mut area = 0.0;
    for e in 0..factors.num_elements() {
        for k in 0..factors.num_quad_points() {
            area += rule.weight(k) * factors.determinants()[[k, e]];
        }
    }
    assert!((area - 1.0).abs() < 1e-12);
}

#[test]
fn process_wide_cache_is_created_lazily_and_torn_down_explicitly() {
    let mut space = quad_space(2, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();

    let first = geometry::global_factors(&mut space, &rule).unwrap();
    let second = geometry::global_factors(&mut space, &rule).unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    geometry::clear_global_cache();
    let third = geometry::global_factors(&mut space, &rule).unwrap();
    assert!(!Arc::ptr_eq(&first, &third));
    geometry::clear_global_cache();
}
