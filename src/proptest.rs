//! Strategies for forests, partitions and element state.
use crate::mesh::procedural::PeriodicForest;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::DimName;

/// Refinement flags for the `cells_per_dim^d` root cells of a periodic forest.
pub fn refinement_flags<D: DimName>(cells_per_dim: usize) -> impl Strategy<Value = Vec<bool>> {
    vec(any::<bool>(), cells_per_dim.pow(D::dim() as u32))
}

/// Periodic forests with `cells_per_dim` root cells per dimension and arbitrary refinement.
pub fn periodic_forest<D: DimName>(cells_per_dim: usize) -> impl Strategy<Value = PeriodicForest<D>> {
    refinement_flags::<D>(cells_per_dim)
        .prop_map(move |refined| PeriodicForest::with_refinement(cells_per_dim, refined))
}

/// A number of ranks in `1..=max_ranks` together with an arbitrary (not necessarily contiguous)
/// owner for each of `num_leaves` leaves.
pub fn owners(num_leaves: usize, max_ranks: usize) -> impl Strategy<Value = (usize, Vec<usize>)> {
    assert!(max_ranks > 0);
    (1..=max_ranks).prop_flat_map(move |num_ranks| (Just(num_ranks), vec(0..num_ranks, num_leaves)))
}

/// Periodic forests together with an arbitrary distribution of their leaves.
pub fn distributed_periodic_forest<D: DimName>(
    cells_per_dim: usize,
    max_ranks: usize,
) -> impl Strategy<Value = PeriodicForest<D>> {
    periodic_forest::<D>(cells_per_dim).prop_flat_map(move |forest| {
        let num_leaves = forest.num_leaves();
        owners(num_leaves, max_ranks).prop_map(move |(num_ranks, owners)| {
            let mut forest = forest.clone();
            forest.set_owners(owners, num_ranks);
            forest
        })
    })
}

/// Values for a single state variable, bounded away from extreme magnitudes.
pub fn state_value() -> impl Strategy<Value = f64> {
    -10.0..10.0
}
