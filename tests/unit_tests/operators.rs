use matfree::assembly::{
    AdvectionEquation, DiffusionEquation, DomainKernel, Equation, KernelStrategy, MassEquation,
};
use matfree::dofquad::DofQuadCache;
use matfree::element::{ElementType, FiniteElement};
use matfree::geometry::GeometryCache;
use matfree::procedural;
use matfree::quadrature::IntegrationRule;
use matfree::space::FeSpace;

fn quad_space(cells: usize, order: usize) -> FeSpace<f64> {
    let mesh = procedural::unit_square_quadrilaterals(cells, cells, order).unwrap();
    let fe = FiniteElement::new(ElementType::Quadrilateral, order).unwrap();
    FeSpace::new(mesh, fe).unwrap()
}

fn hex_space(cells: usize, order: usize) -> FeSpace<f64> {
    let mesh = procedural::unit_cube_hexahedra(cells, cells, cells, order).unwrap();
    let fe = FiniteElement::new(ElementType::Hexahedron, order).unwrap();
    FeSpace::new(mesh, fe).unwrap()
}

fn build_kernel<E: Equation<f64>>(
    space: &mut FeSpace<f64>,
    rule: &IntegrationRule<f64>,
    equation: &E,
) -> DomainKernel<f64> {
    let mut geometry = GeometryCache::new();
    let mut maps = DofQuadCache::new();
    DomainKernel::new(space, rule, equation, &mut geometry, &mut maps).unwrap()
}

/// A deterministic, irregular input vector.
fn pseudo_random_vector(len: usize) -> Vec<f64> {
    (0..len)
        .map(|i| {
            let bits = (i as u64).wrapping_mul(2654435761).wrapping_add(12345);
            (bits % 2000) as f64 / 1000.0 - 1.0
        })
        .collect()
}

#[test]
fn mass_kernel_paths_agree_on_a_single_quadrilateral() {
    // One bilinear element on the unit square, constant coefficient 2,
    // 2x2 Gauss rule
    let mut space = quad_space(1, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();
    let equation = MassEquation::new(2.0);

    let kernel = build_kernel(&mut space, &rule, &equation);
    assert_eq!(kernel.strategy(), KernelStrategy::TensorProduct);

    let x = vec![1.0; space.num_dofs()];
    let mut y_tensor = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_tensor);

    let kernel = kernel.with_strategy(KernelStrategy::General).unwrap();
    let mut y_general = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_general);

    for (a, b) in y_tensor.iter().zip(&y_general) {
        assert!((a - b).abs() < 1e-12, "{} != {}", a, b);
    }

    // Row sums of the scaled mass matrix: y_i = 2 * int(phi_i) = 2/4
    for &value in &y_tensor {
        assert!((value - 0.5).abs() < 1e-12);
    }
}

#[test]
fn mass_kernel_conserves_total_mass_on_refined_meshes() {
    let mut space = quad_space(4, 2);
    let rule = IntegrationRule::for_element(space.finite_element()).unwrap();
    let kernel = build_kernel(&mut space, &rule, &MassEquation::unit());

    // sum_i (M 1)_i = int_Omega 1 = |Omega| = 1
    let x = vec![1.0; space.num_dofs()];
    let mut y = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y);
    let total: f64 = y.iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn diffusion_kernel_annihilates_constants() {
    let mut space = quad_space(3, 2);
    let rule = IntegrationRule::for_element(space.finite_element()).unwrap();
    let kernel = build_kernel(&mut space, &rule, &DiffusionEquation::unit());

    let x = vec![1.0; space.num_dofs()];
    let mut y = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y);
    for &value in &y {
        assert!(value.abs() < 1e-12);
    }

    let kernel = kernel.with_strategy(KernelStrategy::General).unwrap();
    kernel.mult(&x, &mut y);
    for &value in &y {
        assert!(value.abs() < 1e-12);
    }
}

#[test]
fn diffusion_kernel_paths_agree_in_two_dimensions() {
    let mut space = quad_space(3, 3);
    let rule = IntegrationRule::for_element(space.finite_element()).unwrap();
    let kernel = build_kernel(&mut space, &rule, &DiffusionEquation::new(0.75));

    let x = pseudo_random_vector(space.num_dofs());
    let mut y_tensor = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_tensor);

    let kernel = kernel.with_strategy(KernelStrategy::General).unwrap();
    let mut y_general = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_general);

    for (a, b) in y_tensor.iter().zip(&y_general) {
        assert!((a - b).abs() < 1e-11, "{} != {}", a, b);
    }
}

#[test]
fn kernel_paths_agree_in_three_dimensions() {
    let mut space = hex_space(2, 2);
    let rule = IntegrationRule::for_element(space.finite_element()).unwrap();
    let x = pseudo_random_vector(space.num_dofs());

    for equation in [DiffusionEquation::unit(), DiffusionEquation::new(3.0)] {
        let kernel = build_kernel(&mut space, &rule, &equation);
        assert_eq!(kernel.strategy(), KernelStrategy::TensorProduct);
        let mut y_tensor = vec![0.0; space.num_dofs()];
        kernel.mult(&x, &mut y_tensor);

        let kernel = kernel.with_strategy(KernelStrategy::General).unwrap();
        let mut y_general = vec![0.0; space.num_dofs()];
        kernel.mult(&x, &mut y_general);

        for (a, b) in y_tensor.iter().zip(&y_general) {
            assert!((a - b).abs() < 1e-11, "{} != {}", a, b);
        }
    }

    let kernel = build_kernel(&mut space, &rule, &MassEquation::new(1.5));
    let mut y_tensor = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_tensor);
    let kernel = kernel.with_strategy(KernelStrategy::General).unwrap();
    let mut y_general = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y_general);
    for (a, b) in y_tensor.iter().zip(&y_general) {
        assert!((a - b).abs() < 1e-11, "{} != {}", a, b);
    }
}

#[test]
fn advection_kernel_integrates_constant_gradients() {
    let mut space = quad_space(3, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();
    let equation = AdvectionEquation::new(&[1.0, 0.0]);
    let kernel = build_kernel(&mut space, &rule, &equation);
    assert_eq!(kernel.strategy(), KernelStrategy::General);

    // u = x has constant gradient e_x; since the basis sums to one,
    // sum_i (A u)_i = int_Omega b . grad u = |Omega| = 1
    space.mesh_mut().ensure_nodes();
    let u: Vec<f64> = space
        .mesh()
        .nodes()
        .unwrap()
        .data()
        .chunks_exact(2)
        .map(|p| p[0])
        .collect();
    let mut y = vec![0.0; space.num_dofs()];
    kernel.mult(&u, &mut y);
    let total: f64 = y.iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn advection_rejects_the_sum_factorized_path() {
    let mut space = quad_space(2, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();
    let kernel = build_kernel(&mut space, &rule, &AdvectionEquation::new(&[0.5, -0.25]));
    assert!(kernel.with_strategy(KernelStrategy::TensorProduct).is_err());
}

#[test]
fn simplex_spaces_use_the_general_path() {
    let mesh = procedural::unit_square_triangles::<f64>(2, 2).unwrap();
    let fe = FiniteElement::new(ElementType::Triangle, 1).unwrap();
    let mut space = FeSpace::new(mesh, fe).unwrap();
    let rule = IntegrationRule::simplex(ElementType::Triangle, 2).unwrap();

    let kernel = build_kernel(&mut space, &rule, &MassEquation::unit());
    assert_eq!(kernel.strategy(), KernelStrategy::General);

    let x = vec![1.0; space.num_dofs()];
    let mut y = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y);
    let total: f64 = y.iter().sum();
    assert!((total - 1.0).abs() < 1e-12);
}

#[test]
fn mult_add_accumulates_into_the_output() {
    let mut space = quad_space(2, 1);
    let rule = IntegrationRule::gauss(ElementType::Quadrilateral, 2).unwrap();
    let kernel = build_kernel(&mut space, &rule, &MassEquation::unit());

    let x = pseudo_random_vector(space.num_dofs());
    let mut y = vec![0.0; space.num_dofs()];
    kernel.mult(&x, &mut y);

    let mut accumulated = y.clone();
    kernel.mult_add(&x, &mut accumulated);
    for (a, &b) in accumulated.iter().zip(&y) {
        assert!((a - 2.0 * b).abs() < 1e-13);
    }
}
