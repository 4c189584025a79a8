//! Read-only replicas of elements owned by other ranks.
use crate::element::Element;
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;

/// Index of a ghost element in a [`GhostMirror`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GhostIndex(pub usize);

/// Read-only copies of elements owned by other processes that share a face with a local element.
///
/// The mirror is only ever replaced wholesale by a ghost exchange. Operator passes read from it but
/// never write to it.
#[derive(Debug, Clone, PartialEq)]
pub struct GhostMirror<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    ghosts: Vec<Element<T, D>>,
}

impl<T, D> Default for GhostMirror<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self { ghosts: Vec::new() }
    }
}

impl<T, D> GhostMirror<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ghosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ghosts.is_empty()
    }

    pub fn get(&self, index: GhostIndex) -> Option<&Element<T, D>> {
        self.ghosts.get(index.0)
    }

    pub fn elements(&self) -> &[Element<T, D>] {
        &self.ghosts
    }

    /// Replaces the entire content of the mirror with a fresh snapshot.
    ///
    /// The i-th element of `snapshot` becomes `GhostIndex(i)`.
    pub fn refresh(&mut self, snapshot: impl IntoIterator<Item = Element<T, D>>) {
        self.ghosts.clear();
        self.ghosts.extend(snapshot);
    }
}
