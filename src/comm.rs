//! Process groups.
//!
//! [`ThreadGroup`] runs every rank of a group on its own thread within a single process. It offers
//! the same blocking semantics as a message-passing substrate: every collective call waits until
//! all ranks have arrived.
use crate::element::{Element, ElementArena, ElementHandle};
use crate::ghost::GhostMirror;
use crate::Real;
use eyre::eyre;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use parking_lot::Mutex;
use std::sync::Barrier;

pub use octfv_traits::comm::{Communicator, SerialCommunicator};

/// Shared state of a group of ranks running on separate threads.
pub struct ThreadGroup<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    size: usize,
    barrier: Barrier,
    partials: Mutex<Vec<T>>,
    published: Mutex<Vec<Option<Vec<Element<T, D>>>>>,
}

impl<T, D> ThreadGroup<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// # Panics
    ///
    /// Panics if `size == 0`.
    pub fn new(size: usize) -> Self {
        assert!(size > 0, "A process group needs at least one rank.");
        Self {
            size,
            barrier: Barrier::new(size),
            partials: Mutex::new(vec![T::zero(); size]),
            published: Mutex::new(vec![None; size]),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn communicator(&self, rank: usize) -> ThreadCommunicator<'_, T, D> {
        assert!(rank < self.size, "Rank {} out of range for group of size {}", rank, self.size);
        ThreadCommunicator { group: self, rank }
    }

    fn all_reduce_sum(&self, rank: usize, local: T) -> T {
        self.partials.lock()[rank] = local;
        self.barrier.wait();
        // Summation in rank order gives every rank the same result
        let total = self
            .partials
            .lock()
            .iter()
            .fold(T::zero(), |acc, &partial| acc + partial);
        self.barrier.wait();
        total
    }

    /// Publishes the local elements of `rank` and collects the requested remote elements.
    ///
    /// `sources` lists, for every ghost index, the owning rank and the handle of the element on
    /// that rank. A rank whose arena does not hold exactly `num_owned` elements publishes nothing,
    /// and every rank requesting ghosts from it reports an error.
    pub(crate) fn exchange(
        &self,
        rank: usize,
        num_owned: usize,
        local: &ElementArena<T, D>,
        sources: &[(usize, ElementHandle)],
        ghosts: &mut GhostMirror<T, D>,
    ) -> eyre::Result<()> {
        let consistent = local.len() == num_owned;
        self.published.lock()[rank] = consistent.then(|| local.elements().to_vec());
        self.barrier.wait();
        let snapshot = {
            let published = self.published.lock();
            sources
                .iter()
                .map(|&(owner, handle)| {
                    let elements = published
                        .get(owner)
                        .and_then(Option::as_ref)
                        .ok_or_else(|| eyre!("rank {} did not publish its elements", owner))?;
                    elements
                        .get(handle.0)
                        .cloned()
                        .ok_or_else(|| eyre!("rank {} did not publish element {:?}", owner, handle))
                })
                .collect::<eyre::Result<Vec<_>>>()
        };
        // All ranks must leave the second barrier before reporting errors, or the group deadlocks
        self.barrier.wait();
        if !consistent {
            return Err(eyre!(
                "rank {} owns {} leaves but holds {} elements",
                rank,
                num_owned,
                local.len()
            ));
        }
        ghosts.refresh(snapshot?);
        Ok(())
    }
}

/// The view of a single rank onto a [`ThreadGroup`].
pub struct ThreadCommunicator<'g, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    group: &'g ThreadGroup<T, D>,
    rank: usize,
}

impl<'g, T, D> ThreadCommunicator<'g, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn group(&self) -> &'g ThreadGroup<T, D> {
        self.group
    }
}

impl<'g, T, D> Communicator<T> for ThreadCommunicator<'g, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.group.size
    }

    fn all_reduce_sum(&self, local: T) -> eyre::Result<T> {
        Ok(self.group.all_reduce_sum(self.rank, local))
    }
}
