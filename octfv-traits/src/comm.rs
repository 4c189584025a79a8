//! Collective communication over a fixed process group.

/// A fixed group of cooperating processes that can perform blocking reductions.
///
/// Every process of the group must call [`all_reduce_sum`](Self::all_reduce_sum) the same number
/// of times and in the same order. A call blocks until all processes have contributed.
pub trait Communicator<T> {
    /// The index of this process within the group.
    fn rank(&self) -> usize;

    /// The number of processes in the group.
    fn size(&self) -> usize;

    /// Sums `local` over all processes and returns the total to every process.
    ///
    /// Implementations must combine the contributions in an order that does not depend on which
    /// process calls first, so that every process receives a bitwise identical result.
    fn all_reduce_sum(&self, local: T) -> eyre::Result<T>;
}

impl<'a, T, C> Communicator<T> for &'a C
where
    C: ?Sized + Communicator<T>,
{
    fn rank(&self) -> usize {
        <C as Communicator<T>>::rank(self)
    }

    fn size(&self) -> usize {
        <C as Communicator<T>>::size(self)
    }

    fn all_reduce_sum(&self, local: T) -> eyre::Result<T> {
        <C as Communicator<T>>::all_reduce_sum(self, local)
    }
}

/// The trivial group consisting of only the calling process.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SerialCommunicator;

impl<T> Communicator<T> for SerialCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce_sum(&self, local: T) -> eyre::Result<T> {
        Ok(local)
    }
}
