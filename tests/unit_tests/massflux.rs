use crate::{gather, run_distributed, serial, smooth_state};
use nalgebra::{DefaultAllocator, DimName, U2, U3};
use octfv::element::Var;
use octfv::face::{resolve_face, ResolvedFace};
use octfv::field::FlowField;
use octfv::massflux::{face_massflux, init_massfluxes};
use octfv::mesh::procedural::PeriodicForest;
use octfv::mesh::MeshIterator;
use octfv::proptest::{periodic_forest, state_value};
use octfv::traits::allocators::DimAllocator;
use proptest::collection::vec;
use proptest::prelude::*;
use util::assert_approx_slice_eq;

/// Checks that every face carries opposite fluxes on its two sides.
fn assert_fluxes_antisymmetric<M, D>(mesh: &M, field: &FlowField<f64, D>)
where
    M: MeshIterator,
    D: DimName,
    DefaultAllocator: DimAllocator<f64, D>,
{
    mesh.for_each_face(&mut |face| match resolve_face(face, field) {
        ResolvedFace::Conforming { owner, neighbor } => {
            let owner_flux = field.get(owner.element).mass_flux(owner.face);
            let neighbor_flux = field.get(neighbor.element).mass_flux(neighbor.face);
            assert!((owner_flux + neighbor_flux).abs() <= 1e-12);
        }
        ResolvedFace::Hanging { large, small } => {
            let small_flux: f64 = small
                .iter()
                .map(|side| field.get(side.element).mass_flux(side.face))
                .sum();
            let large_flux = field.get(large.element).mass_flux(large.face);
            assert!((small_flux + large_flux).abs() <= 1e-12);
        }
    });
}

#[test]
fn uniform_velocity_on_uniform_forest() {
    let forest = PeriodicForest::<U2>::uniform(4);
    let local = serial(&forest);
    let mut field = local
        .create_field(|element| element.set_var(Var::Vx, 1.0))
        .unwrap();
    init_massfluxes(&local, &mut field).unwrap();

    for element in field.elements().iter() {
        assert_eq!(element.mass_fluxes(), &[-0.25, 0.25, 0.0, 0.0]);
    }
}

#[test]
fn face_massflux_averages_velocities() {
    let forest = PeriodicForest::<U2>::uniform(2);
    let mut near = forest.leaf_element::<f64>(0);
    let mut far = forest.leaf_element::<f64>(1);
    near.set_var(Var::Vx, 1.0);
    near.set_var(Var::Vy, 4.0);
    far.set_var(Var::Vx, 3.0);
    far.set_var(Var::Vy, -2.0);

    // Face 1 has normal (0.5, 0), face 2 has normal (0, -0.5)
    assert_eq!(face_massflux(&near, 1, &far), 1.0);
    assert_eq!(face_massflux(&near, 2, &far), -0.5);
}

#[test]
fn hanging_fluxes_sum_to_large_side_flux() {
    // For uniform velocity the fluxes through the two halves add up to the flux through the
    // large face
    let forest = PeriodicForest::<U2>::refine_roots_where(2, |coords| coords == [1, 0]);
    let local = serial(&forest);
    let mut field = local
        .create_field(|element| {
            element.set_var(Var::Vx, 2.0);
            element.set_var(Var::Vy, -1.0);
        })
        .unwrap();
    init_massfluxes(&local, &mut field).unwrap();

    for element in field.elements().iter() {
        let size = if element.level() == 0 { 0.5 } else { 0.25 };
        assert_approx_slice_eq!(
            element.mass_fluxes().to_vec(),
            [-2.0 * size, 2.0 * size, size, -size],
            abstol = 1e-14
        );
    }
    assert_fluxes_antisymmetric(&local, &field);
}

proptest! {
    #[test]
    fn massfluxes_are_antisymmetric_2d(
        (forest, velocities) in (1..5usize)
            .prop_flat_map(periodic_forest::<U2>)
            .prop_flat_map(|forest| {
                let num_leaves = forest.num_leaves();
                (Just(forest), vec([state_value(), state_value()], num_leaves))
            })
    ) {
        let local = serial(&forest);
        let mut field = local
            .create_field(|element| {
                let [vx, vy] = velocities[element.global_index()];
                element.set_var(Var::Vx, vx);
                element.set_var(Var::Vy, vy);
            })
            .unwrap();
        init_massfluxes(&local, &mut field).unwrap();
        assert_fluxes_antisymmetric(&local, &field);
    }

    #[test]
    fn massfluxes_are_antisymmetric_3d(
        (forest, velocities) in (1..4usize)
            .prop_flat_map(periodic_forest::<U3>)
            .prop_flat_map(|forest| {
                let num_leaves = forest.num_leaves();
                (Just(forest), vec([state_value(), state_value(), state_value()], num_leaves))
            })
    ) {
        let local = serial(&forest);
        let mut field = local
            .create_field(|element| {
                let [vx, vy, vz] = velocities[element.global_index()];
                element.set_var(Var::Vx, vx);
                element.set_var(Var::Vy, vy);
                element.set_var(Var::Vz, vz);
            })
            .unwrap();
        init_massfluxes(&local, &mut field).unwrap();
        assert_fluxes_antisymmetric(&local, &field);
    }
}

#[test]
fn distributed_massfluxes_match_serial_massfluxes() {
    let mut forest = PeriodicForest::<U2>::refine_roots_where(5, |coords| coords[0] == coords[1]);
    let velocity = |element: &mut octfv::element::Element<f64, U2>| {
        smooth_state(element);
        let x = element.centroid().clone();
        element.set_var(Var::Vx, x[1].sin());
        element.set_var(Var::Vy, 1.0 + x[0] * x[0]);
    };

    let serial_fluxes = {
        let local = serial(&forest);
        let mut field = local.create_field(velocity).unwrap();
        init_massfluxes(&local, &mut field).unwrap();
        field
            .elements()
            .iter()
            .flat_map(|element| element.mass_fluxes().to_vec())
            .collect::<Vec<_>>()
    };

    for num_ranks in [2, 3, 5] {
        forest.partition_uniform(num_ranks);
        let parts = run_distributed(&forest, |local, _| {
            let mut field = local.create_field(velocity).unwrap();
            init_massfluxes(local, &mut field).unwrap();
            // Ghosts carry the fluxes computed by their owners
            for ghost in field.ghosts().elements() {
                assert!(ghost.mass_fluxes().iter().any(|&flux| flux != 0.0));
            }
            field.elements().elements().to_vec()
        });
        let distributed_fluxes = gather(parts)
            .iter()
            .flat_map(|element| element.mass_fluxes().to_vec())
            .collect::<Vec<_>>();
        assert_approx_slice_eq!(distributed_fluxes, serial_fluxes, abstol = 1e-14);
    }
}
