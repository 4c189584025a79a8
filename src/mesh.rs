//! The interface between the numerics and the mesh engine.
//!
//! The mesh engine owns the forest topology, the partitioning and the ghost layer. The numerics
//! only see local elements through [`MeshIterator`] and remote neighbors through a ghost mirror
//! that is refreshed by [`GhostExchange`].
use crate::element::{ElementArena, ElementHandle};
use crate::ghost::{GhostIndex, GhostMirror};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use std::slice;

pub mod procedural;

/// Reference to an element that is either owned by this process or mirrored from another one.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementRef {
    Local(ElementHandle),
    Ghost(GhostIndex),
}

impl ElementRef {
    pub fn is_local(&self) -> bool {
        matches!(self, ElementRef::Local(_))
    }
}

/// The elements on one side of a face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SideElements {
    /// A single element covers the whole face.
    Full(ElementRef),
    /// The face is covered by 2^(d-1) elements one level finer than the element on the other side.
    Hanging(Vec<ElementRef>),
}

impl SideElements {
    pub fn is_hanging(&self) -> bool {
        matches!(self, SideElements::Hanging(_))
    }

    pub fn elements(&self) -> &[ElementRef] {
        match self {
            SideElements::Full(element) => slice::from_ref(element),
            SideElements::Hanging(elements) => elements,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceSide {
    /// Local face number on the element(s) of this side.
    pub face: usize,
    pub elements: SideElements,
}

impl FaceSide {
    pub fn full(face: usize, element: ElementRef) -> Self {
        Self {
            face,
            elements: SideElements::Full(element),
        }
    }

    pub fn hanging(face: usize, elements: Vec<ElementRef>) -> Self {
        Self {
            face,
            elements: SideElements::Hanging(elements),
        }
    }
}

/// An interior face as reported by the mesh engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub sides: [FaceSide; 2],
}

/// Iteration over the local part of a distributed forest.
pub trait MeshIterator {
    fn num_local_elements(&self) -> usize;

    /// Visits every local element once.
    fn for_each_element(&self, f: &mut dyn FnMut(ElementHandle));

    /// Visits every interior face adjacent to at least one local element exactly once.
    fn for_each_face(&self, f: &mut dyn FnMut(&Face));
}

impl<M> MeshIterator for &M
where
    M: ?Sized + MeshIterator,
{
    fn num_local_elements(&self) -> usize {
        M::num_local_elements(self)
    }

    fn for_each_element(&self, f: &mut dyn FnMut(ElementHandle)) {
        M::for_each_element(self, f)
    }

    fn for_each_face(&self, f: &mut dyn FnMut(&Face)) {
        M::for_each_face(self, f)
    }
}

/// Collective refresh of the ghost mirror with current copies of the remote elements.
///
/// Every process must call `exchange` the same number of times in the same order.
pub trait GhostExchange<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn exchange(&self, local: &ElementArena<T, D>, ghosts: &mut GhostMirror<T, D>) -> eyre::Result<()>;
}

impl<T, D, E> GhostExchange<T, D> for &E
where
    T: Real,
    D: DimName,
    E: ?Sized + GhostExchange<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn exchange(&self, local: &ElementArena<T, D>, ghosts: &mut GhostMirror<T, D>) -> eyre::Result<()> {
        E::exchange(self, local, ghosts)
    }
}
