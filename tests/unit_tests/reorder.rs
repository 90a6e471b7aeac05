use matfree::mesh::{GridFunction, NodeOrdering};
use matfree::reorder::{
    grid_function_to_by_nodes, grid_function_to_by_vdim, to_by_nodes, to_by_vdim,
};
use proptest::prelude::*;

#[test]
fn reorder_round_trip_is_exact_on_small_buffer() {
    let original = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    let mut buffer = original.clone();
    to_by_vdim(&mut buffer, 3, 2);
    assert_ne!(buffer, original);
    to_by_nodes(&mut buffer, 3, 2);
    assert_eq!(buffer, original);
}

#[test]
fn grid_function_reorder_updates_flag_and_restores_data() {
    let data = vec![0.0, 1.0, 2.0, 10.0, 11.0, 12.0];
    let mut gf = GridFunction::from_parts(data.clone(), 3, 2, NodeOrdering::ByNodes).unwrap();
    grid_function_to_by_vdim(&mut gf);
    assert_eq!(gf.ordering(), NodeOrdering::ByVdim);
    // Node 1 has coordinates (1, 11), now adjacent
    assert_eq!(&gf.data()[2..4], &[1.0, 11.0]);
    grid_function_to_by_nodes(&mut gf);
    assert_eq!(gf.ordering(), NodeOrdering::ByNodes);
    assert_eq!(gf.data(), data.as_slice());
}

#[test]
fn reorder_on_already_matching_ordering_is_a_no_op() {
    let data = vec![0.5, 1.5, 2.5, 3.5];
    let mut gf = GridFunction::from_parts(data.clone(), 2, 2, NodeOrdering::ByVdim).unwrap();
    grid_function_to_by_vdim(&mut gf);
    assert_eq!(gf.data(), data.as_slice());
    assert_eq!(gf.ordering(), NodeOrdering::ByVdim);
}

proptest! {
    #[test]
    fn reorder_involution_restores_any_buffer(
        num_dofs in 1usize..20,
        vdim in 1usize..4,
        seed in any::<u64>(),
    ) {
        // Deterministic but arbitrary buffer contents derived from the seed
        let original: Vec<f64> = (0..num_dofs * vdim)
            .map(|i| {
                let bits = seed.wrapping_mul(6364136223846793005).wrapping_add(i as u64);
                (bits % 10_000) as f64 / 101.0 - 49.0
            })
            .collect();

        let mut buffer = original.clone();
        to_by_vdim(&mut buffer, num_dofs, vdim);
        to_by_nodes(&mut buffer, num_dofs, vdim);
        prop_assert_eq!(&buffer, &original);

        to_by_nodes(&mut buffer, num_dofs, vdim);
        to_by_vdim(&mut buffer, num_dofs, vdim);
        prop_assert_eq!(&buffer, &original);
    }
}
