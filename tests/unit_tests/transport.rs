use crate::{gather, run_distributed, serial, smooth_state};
use nalgebra::U2;
use octfv::comm::SerialCommunicator;
use octfv::convection::AssemblyContext;
use octfv::element::{Buffer, Element, Var};
use octfv::field::FlowField;
use octfv::massflux::init_massfluxes;
use octfv::mesh::procedural::PeriodicForest;
use octfv::settings::{BicgstabSettings, Settings, TemporalScheme, TimeSettings};
use octfv::transport::{assemble, TransportSolver};
use util::assert_approx_slice_eq;

fn settings(scheme: TemporalScheme) -> Settings {
    Settings {
        time: TimeSettings { timestep: 0.01, scheme },
        bicgstab: BicgstabSettings {
            epsilon: 1e-10,
            ..BicgstabSettings::default()
        },
        ..Settings::default()
    }
}

/// Uniform flow, which is discretely divergence free on any forest.
fn uniform_flow(element: &mut Element<f64, U2>) {
    smooth_state(element);
    element.set_var(Var::Rho, 1.0);
    element.set_var(Var::Vx, 1.0);
    element.set_var(Var::Vy, 0.5);
}

fn total_amount(field: &FlowField<f64, U2>, var: Var) -> f64 {
    field
        .elements()
        .iter()
        .map(|element| element.volume() * element.var(Var::Rho) * element.var(var))
        .sum()
}

fn values(elements: &[Element<f64, U2>], var: Var) -> Vec<f64> {
    elements.iter().map(|element| element.var(var)).collect()
}

#[test]
fn explicit_step_advects_along_x() {
    let n = 4;
    let forest = PeriodicForest::<U2>::uniform(n);
    let local = serial(&forest);
    let mut field = local
        .create_field(|element| {
            element.set_var(Var::Rho, 1.0);
            element.set_var(Var::Vx, 1.0);
            element.set_var(Var::S, element.global_index() as f64);
        })
        .unwrap();
    init_massfluxes(&local, &mut field).unwrap();

    let settings = settings(TemporalScheme::EulerExplicit);
    let mut solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
    let outcome = solver.solve_tran_eq(&mut field, Var::S).unwrap();
    assert_eq!(outcome.var, Var::S);
    assert_eq!(outcome.scheme, TemporalScheme::EulerExplicit);
    assert!(outcome.bicgstab.is_none());

    // With dt / vol = 0.16 and a face flux of 0.25 the upwind update has coefficient 0.04
    for element in field.elements().iter() {
        let index = element.global_index();
        let west = if index % n == 0 { index + n - 1 } else { index - 1 };
        let phi = index as f64;
        let expected = phi - 0.04 * (phi - west as f64);
        assert!((element.var(Var::S) - expected).abs() <= 1e-12);
    }
}

#[test]
fn constant_state_is_preserved_by_explicit_step() {
    let forest = PeriodicForest::<U2>::refine_roots_where(4, |coords| coords[0] + coords[1] == 3);
    let local = serial(&forest);
    let mut field = local
        .create_field(|element| {
            uniform_flow(element);
            element.set_var(Var::Rho, 1.0 + element.centroid()[0]);
            element.set_var(Var::P, 2.5);
        })
        .unwrap();
    init_massfluxes(&local, &mut field).unwrap();

    let settings = settings(TemporalScheme::EulerExplicit);
    let mut solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
    solver.solve_tran_eq(&mut field, Var::P).unwrap();

    for element in field.elements().iter() {
        assert!((element.var(Var::P) - 2.5).abs() <= 1e-12);
    }
}

#[test]
fn transport_conserves_total_amount() {
    let forest = PeriodicForest::<U2>::refine_roots_where(6, |coords| coords[0] == coords[1]);
    let local = serial(&forest);

    for scheme in [
        TemporalScheme::EulerExplicit,
        TemporalScheme::EulerImplicit,
        TemporalScheme::CrankNicolson,
    ] {
        let mut field = local.create_field(uniform_flow).unwrap();
        init_massfluxes(&local, &mut field).unwrap();
        let before = total_amount(&field, Var::S);

        let settings = settings(scheme);
        let mut solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
        for _ in 0..3 {
            let outcome = solver.solve_tran_eq(&mut field, Var::S).unwrap();
            if let Some(output) = outcome.bicgstab {
                assert!(output.converged);
            }
        }
        let after = total_amount(&field, Var::S);
        assert!((after - before).abs() <= 1e-8, "{:?}: {} vs {}", scheme, after, before);
    }
}

#[test]
fn implicit_solution_satisfies_assembled_system() {
    let forest = PeriodicForest::<U2>::uniform(6);
    let local = serial(&forest);
    let mut field = local.create_field(uniform_flow).unwrap();
    init_massfluxes(&local, &mut field).unwrap();

    let settings = settings(TemporalScheme::CrankNicolson);
    let mut solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
    solver.compute_rhs(&mut field, Var::S).unwrap();
    let output = solver.solve_implicit_sequential(&mut field, Var::S).unwrap();
    assert!(output.converged);

    solver
        .compute_ax(&mut field, Var::S, Var::S.into(), Buffer::Ax)
        .unwrap();
    let applied: Vec<_> = field.elements().iter().map(|e| e.buffer(Buffer::Ax)).collect();
    let rhs: Vec<_> = field.elements().iter().map(|e| e.buffer(Buffer::B)).collect();
    assert_approx_slice_eq!(applied, rhs, abstol = 1e-8);
}

#[test]
fn assemble_zeroes_target_before_accumulating() {
    let forest = PeriodicForest::<U2>::uniform(3);
    let local = serial(&forest);
    let mut field = local
        .create_field(|element| {
            element.set_var(Var::Rho, 2.0);
            element.set_var(Var::S, 1.5);
            *element.buffer_mut(Buffer::H) = 100.0;
        })
        .unwrap();

    let ctx = AssemblyContext {
        var: Var::S,
        source: Var::S.into(),
        target: Buffer::H,
        flux_factor: 1.0,
        timestep: 0.5,
    };
    assemble(&local, &mut field, &ctx).unwrap();

    // Without flow only the unsteady term remains
    for element in field.elements().iter() {
        let expected = element.volume() * 2.0 * 1.5 / 0.5;
        assert!((element.buffer(Buffer::H) - expected).abs() <= 1e-14);
    }
}

#[test]
fn initialize_gradients_covers_all_variables() {
    let forest = PeriodicForest::<U2>::uniform(4);
    let local = serial(&forest);
    let mut field = local.create_field(smooth_state).unwrap();
    let settings = Settings::default();
    let solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
    solver.initialize_gradients(&mut field).unwrap();

    // Density and the passive scalar vary in space, velocity and pressure do not
    assert!(field.elements().iter().any(|e| e.gradient(Var::Rho).norm() > 0.1));
    assert!(field.elements().iter().any(|e| e.gradient(Var::S).norm() > 0.1));
    for var in [Var::Vx, Var::Vy, Var::P] {
        assert!(field.elements().iter().all(|e| e.gradient(var).norm() <= 1e-12));
    }
}

fn serial_steps(forest: &PeriodicForest<U2>, scheme: TemporalScheme) -> Vec<Element<f64, U2>> {
    let local = serial(forest);
    let mut field = local.create_field(smooth_state).unwrap();
    init_massfluxes(&local, &mut field).unwrap();
    let settings = settings(scheme);
    let mut solver = TransportSolver::<f64, _, _>::new(&local, &SerialCommunicator, &settings);
    for _ in 0..2 {
        solver.solve_tran_eq(&mut field, Var::S).unwrap();
    }
    field.elements().elements().to_vec()
}

fn distributed_steps(forest: &PeriodicForest<U2>, scheme: TemporalScheme) -> Vec<Element<f64, U2>> {
    let settings = settings(scheme);
    let parts = run_distributed(forest, |local, comm| {
        let mut field = local.create_field(smooth_state).unwrap();
        init_massfluxes(local, &mut field).unwrap();
        let mut solver = TransportSolver::<f64, _, _>::new(local, comm, &settings);
        for _ in 0..2 {
            solver.solve_tran_eq(&mut field, Var::S).unwrap();
        }
        field.elements().elements().to_vec()
    });
    gather(parts)
}

#[test]
fn distributed_explicit_steps_match_serial_steps() {
    let mut forest = PeriodicForest::<U2>::refine_roots_where(6, |coords| coords[1] == 3 || coords[0] == 0);
    let expected = serial_steps(&forest, TemporalScheme::EulerExplicit);

    for num_ranks in [2, 3, 4] {
        forest.partition_uniform(num_ranks);
        let computed = distributed_steps(&forest, TemporalScheme::EulerExplicit);
        assert_approx_slice_eq!(values(&computed, Var::S), values(&expected, Var::S), abstol = 1e-14);
    }
}

#[test]
fn distributed_implicit_steps_match_serial_steps() {
    let mut forest = PeriodicForest::<U2>::refine_roots_where(6, |coords| coords[1] == 3 || coords[0] == 0);

    for scheme in [TemporalScheme::EulerImplicit, TemporalScheme::CrankNicolson] {
        forest.partition_uniform(1);
        let expected = serial_steps(&forest, scheme);
        for num_ranks in [2, 3] {
            forest.partition_uniform(num_ranks);
            let computed = distributed_steps(&forest, scheme);
            assert_approx_slice_eq!(values(&computed, Var::S), values(&expected, Var::S), abstol = 1e-7);
        }
    }
}
