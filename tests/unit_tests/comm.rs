use crate::{run_distributed, serial};
use itertools::Itertools;
use nalgebra::U2;
use octfv::comm::{Communicator, SerialCommunicator, ThreadGroup};
use octfv::element::ElementArena;
use octfv::ghost::GhostMirror;
use octfv::mesh::procedural::PeriodicForest;
use octfv::mesh::GhostExchange;
use std::thread;

#[test]
fn serial_communicator_is_a_group_of_one() {
    let comm = SerialCommunicator;
    assert_eq!(Communicator::<f64>::rank(&comm), 0);
    assert_eq!(Communicator::<f64>::size(&comm), 1);
    assert_eq!(comm.all_reduce_sum(2.5).unwrap(), 2.5);

    // References forward to the communicator
    let by_ref = &comm;
    assert_eq!(Communicator::<f64>::all_reduce_sum(&by_ref, -1.0).unwrap(), -1.0);
}

#[test]
fn thread_group_all_reduce() {
    let size = 4;
    let group = ThreadGroup::<f64, U2>::new(size);
    assert_eq!(group.size(), size);

    let results = thread::scope(|scope| {
        let handles = (0..size)
            .map(|rank| {
                let group = &group;
                scope.spawn(move || {
                    let comm = group.communicator(rank);
                    assert_eq!(comm.rank(), rank);
                    assert_eq!(comm.size(), size);
                    // Consecutive reductions must not interfere
                    (0..5)
                        .map(|round| comm.all_reduce_sum((rank + 1) as f64 * round as f64).unwrap())
                        .collect_vec()
                })
            })
            .collect_vec();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect_vec()
    });

    let expected = (0..5).map(|round| 10.0 * round as f64).collect_vec();
    assert!(results.iter().all(|result| result == &expected));
}

#[test]
fn every_rank_receives_identical_reduction() {
    let mut forest = PeriodicForest::<U2>::uniform(6);
    forest.partition_uniform(3);
    let results = run_distributed(&forest, |_, comm| {
        let local = 0.1 * (comm.rank() as f64 + 1.0) + 1e-17 * comm.rank() as f64;
        comm.all_reduce_sum(local).unwrap()
    });
    assert!(results.iter().all(|&total| total.to_bits() == results[0].to_bits()));
}

#[test]
#[should_panic]
fn empty_group_is_rejected() {
    let _ = ThreadGroup::<f64, U2>::new(0);
}

#[test]
#[should_panic]
fn rank_must_be_in_group() {
    let group = ThreadGroup::<f64, U2>::new(2);
    let _ = group.communicator(2);
}

#[test]
fn exchange_rejects_mismatched_element_count() {
    let forest = PeriodicForest::<U2>::uniform(3);
    let local = serial(&forest);
    let mut ghosts = GhostMirror::new();
    let result = local.exchange(&ElementArena::new(), &mut ghosts);
    assert!(result.is_err());
}

#[test]
fn exchange_mismatch_in_group_fails_on_every_rank() {
    let mut forest = PeriodicForest::<U2>::uniform(4);
    forest.partition_uniform(2);
    // Rank 1 drops its elements; both ranks must leave the exchange with an error
    let results = run_distributed(&forest, |local, comm| {
        let (elements, mut ghosts) = local.create_field(|_| {}).unwrap().into_parts();
        let elements = if comm.rank() == 1 { ElementArena::new() } else { elements };
        local.exchange(&elements, &mut ghosts).is_err()
    });
    assert_eq!(results, vec![true, true]);
}
