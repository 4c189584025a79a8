//! Element storage of one rank together with its ghost mirror.
use crate::element::{Element, ElementArena, ElementHandle};
use crate::ghost::{GhostIndex, GhostMirror};
use crate::mesh::{ElementRef, GhostExchange};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;

/// The local elements together with the ghost mirror of this process.
///
/// Reads are possible through any [`ElementRef`]. Writes are only possible for local elements,
/// which gives every face pass exactly-once semantics for element updates: an update targeting a
/// ghost is dropped here and performed by the owning process instead.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowField<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    elements: ElementArena<T, D>,
    ghosts: GhostMirror<T, D>,
}

impl<T, D> FlowField<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new(elements: ElementArena<T, D>, ghosts: GhostMirror<T, D>) -> Self {
        Self { elements, ghosts }
    }

    /// A field without ghosts, as used by a single process.
    pub fn from_elements(elements: ElementArena<T, D>) -> Self {
        Self::new(elements, GhostMirror::new())
    }

    pub fn elements(&self) -> &ElementArena<T, D> {
        &self.elements
    }

    pub fn elements_mut(&mut self) -> &mut ElementArena<T, D> {
        &mut self.elements
    }

    pub fn ghosts(&self) -> &GhostMirror<T, D> {
        &self.ghosts
    }

    /// # Panics
    ///
    /// Panics if the reference is dangling.
    pub fn get(&self, element: ElementRef) -> &Element<T, D> {
        match element {
            ElementRef::Local(ElementHandle(idx)) => self
                .elements
                .elements()
                .get(idx)
                .unwrap_or_else(|| panic!("Local element {} does not exist", idx)),
            ElementRef::Ghost(GhostIndex(idx)) => self
                .ghosts
                .get(GhostIndex(idx))
                .unwrap_or_else(|| panic!("Ghost element {} does not exist", idx)),
        }
    }

    /// Mutable access to a local element. Returns `None` for ghosts.
    pub fn local_mut(&mut self, element: ElementRef) -> Option<&mut Element<T, D>> {
        match element {
            ElementRef::Local(handle) => self.elements.get_mut(handle),
            ElementRef::Ghost(_) => None,
        }
    }

    /// Refreshes the ghost mirror from the owning processes. Collective.
    pub fn exchange<E>(&mut self, exchange: &E) -> eyre::Result<()>
    where
        E: ?Sized + GhostExchange<T, D>,
    {
        exchange.exchange(&self.elements, &mut self.ghosts)
    }

    pub fn into_parts(self) -> (ElementArena<T, D>, GhostMirror<T, D>) {
        (self.elements, self.ghosts)
    }
}
