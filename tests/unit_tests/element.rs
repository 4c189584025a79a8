use matrixcompare::{assert_matrix_eq, prop_assert_matrix_eq};
use nalgebra::{point, vector, Point3, Vector3, U2};
use octfv::element::{
    num_children, num_faces, num_subfaces, Buffer, Element, ElementArena, ElementGeometry, Slot, Var,
};
use proptest::prelude::*;

#[test]
fn face_counts() {
    assert_eq!(num_faces::<U2>(), 4);
    assert_eq!(num_subfaces::<U2>(), 2);
    assert_eq!(num_children::<U2>(), 4);
    assert_eq!(num_faces::<nalgebra::U3>(), 6);
    assert_eq!(num_subfaces::<nalgebra::U3>(), 4);
    assert_eq!(num_children::<nalgebra::U3>(), 8);
}

#[test]
fn box_geometry_2d() {
    let geometry = ElementGeometry::from_box(point![1.0, 2.0], vector![0.5, 0.25]);

    assert_eq!(geometry.volume(), 0.125);
    assert_eq!(geometry.centroid(), &point![1.25, 2.125]);
    assert_eq!(
        geometry.vertices(),
        &[point![1.0, 2.0], point![1.5, 2.0], point![1.0, 2.25], point![1.5, 2.25]]
    );

    // Normals are scaled by the length of their face
    assert_eq!(geometry.normal(0), &vector![-0.25, 0.0]);
    assert_eq!(geometry.normal(1), &vector![0.25, 0.0]);
    assert_eq!(geometry.normal(2), &vector![0.0, -0.5]);
    assert_eq!(geometry.normal(3), &vector![0.0, 0.5]);

    assert_eq!(geometry.face_centroid(0), &point![1.0, 2.125]);
    assert_eq!(geometry.face_centroid(1), &point![1.5, 2.125]);
    assert_eq!(geometry.face_centroid(2), &point![1.25, 2.0]);
    assert_eq!(geometry.face_centroid(3), &point![1.25, 2.25]);
}

#[test]
#[should_panic]
fn box_geometry_rejects_degenerate_extents() {
    let _ = ElementGeometry::from_box(point![0.0, 0.0], vector![1.0, 0.0]);
}

#[test]
fn new_element_is_at_rest() {
    let geometry = ElementGeometry::from_box(point![0.0, 0.0], vector![1.0, 1.0]);
    let element: Element<f64, U2> = Element::new(geometry, 1, 42);

    assert_eq!(element.level(), 1);
    assert_eq!(element.global_index(), 42);
    assert!(element.vars().iter().all(|&v| v == 0.0));
    assert_eq!(element.mass_fluxes(), &[0.0; 4]);
    for var in Var::ALL {
        assert_matrix_eq!(element.gradient(var).clone(), vector![0.0, 0.0]);
    }
    for buffer in Buffer::ALL {
        assert_eq!(element.buffer(buffer), 0.0);
    }
}

#[test]
fn slots_address_vars_and_buffers() {
    let geometry = ElementGeometry::from_box(point![0.0, 0.0], vector![1.0, 1.0]);
    let mut element: Element<f64, U2> = Element::new(geometry, 0, 0);

    element.set_var(Var::S, 3.0);
    *element.slot_mut(Slot::Buffer(Buffer::R0)) = 5.0;
    *element.slot_mut(Var::P.into()) = 7.0;

    assert_eq!(element.slot(Var::S.into()), 3.0);
    assert_eq!(element.buffer(Buffer::R0), 5.0);
    assert_eq!(element.var(Var::P), 7.0);
    assert_eq!(Var::velocity(1), Var::Vy);

    let mut arena = ElementArena::new();
    let handle = arena.push(element);
    arena.reset_buffers();
    assert_eq!(arena[handle].buffer(Buffer::R0), 0.0);
    assert_eq!(arena[handle].var(Var::S), 3.0);
}

proptest! {
    #[test]
    fn closed_box_normals_sum_to_zero(
        origin in [-10.0..10.0, -10.0..10.0, -10.0..10.0],
        extents in [0.01..10.0, 0.01..10.0, 0.01..10.0]
    ) {
        let geometry = ElementGeometry::from_box(Point3::from(origin), Vector3::from(extents));
        let normal_sum = (0..6).fold(Vector3::zeros(), |acc, face| acc + geometry.normal(face));
        prop_assert_matrix_eq!(normal_sum, Vector3::zeros(), comp = abs, tol = 1e-12);

        // Divergence theorem for x: sum of n_f · x_f equals d times the volume
        let flux: f64 = (0..6)
            .map(|face| geometry.normal(face).dot(&geometry.face_centroid(face).coords))
            .sum();
        let volume = extents.iter().product::<f64>();
        prop_assert!((flux - 3.0 * volume).abs() <= 1e-9 * (1.0 + volume));
    }
}
