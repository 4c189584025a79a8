//! Elementwise and reduction primitives over the local elements.
use crate::element::{ElementArena, Slot};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use octfv_traits::comm::Communicator;
use std::ops::{Index, IndexMut};

pub const NUM_SCALAR_SLOTS: usize = 7;

/// Slots of the process-wide [`ScalarBuffer`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ScalarSlot {
    /// `rho` of the previous iteration.
    Rho0,
    Alpha,
    Omega,
    Rho,
    Beta,
    /// Most recent normalized residual.
    Residual,
    /// Most recent reduced sum of squared residuals.
    GlobalResidual,
}

impl ScalarSlot {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Scalars shared by all processes. Only written by reduction results, so they are identical on
/// every process.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ScalarBuffer<T> {
    values: [T; NUM_SCALAR_SLOTS],
}

impl<T: Real> Default for ScalarBuffer<T> {
    fn default() -> Self {
        Self {
            values: [T::zero(); NUM_SCALAR_SLOTS],
        }
    }
}

impl<T: Real> ScalarBuffer<T> {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> Index<ScalarSlot> for ScalarBuffer<T> {
    type Output = T;

    fn index(&self, slot: ScalarSlot) -> &T {
        &self.values[slot.index()]
    }
}

impl<T> IndexMut<ScalarSlot> for ScalarBuffer<T> {
    fn index_mut(&mut self, slot: ScalarSlot) -> &mut T {
        &mut self.values[slot.index()]
    }
}

/// `c = wa * a + wb * b` on every local element.
pub fn field_sum<T, D>(elements: &mut ElementArena<T, D>, a: Slot, b: Slot, c: Slot, wa: T, wb: T)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    for element in elements.iter_mut() {
        let value = wa * element.slot(a) + wb * element.slot(b);
        *element.slot_mut(c) = value;
    }
}

/// `c = a * b` on every local element.
pub fn field_prod<T, D>(elements: &mut ElementArena<T, D>, a: Slot, b: Slot, c: Slot)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    for element in elements.iter_mut() {
        let value = element.slot(a) * element.slot(b);
        *element.slot_mut(c) = value;
    }
}

/// `b = a` on every local element.
pub fn field_copy<T, D>(elements: &mut ElementArena<T, D>, a: Slot, b: Slot)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    for element in elements.iter_mut() {
        let value = element.slot(a);
        *element.slot_mut(b) = value;
    }
}

/// Broadcasts a scalar into `a` on every local element.
pub fn field_fill<T, D>(elements: &mut ElementArena<T, D>, a: Slot, value: T)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    for element in elements.iter_mut() {
        *element.slot_mut(a) = value;
    }
}

/// Global sum of `wa * a + wb * b` over all elements of all processes, stored in `scalars[c]`.
///
/// Collective. The local partial is accumulated in handle order and partials are combined by the
/// communicator, so every process obtains the same value.
#[allow(clippy::too_many_arguments)]
pub fn scalar_sum<T, D, C>(
    elements: &ElementArena<T, D>,
    comm: &C,
    scalars: &mut ScalarBuffer<T>,
    a: Slot,
    b: Slot,
    c: ScalarSlot,
    wa: T,
    wb: T,
) -> eyre::Result<T>
where
    T: Real,
    D: DimName,
    C: ?Sized + Communicator<T>,
    DefaultAllocator: DimAllocator<T, D>,
{
    let local = elements
        .iter()
        .fold(T::zero(), |acc, element| acc + wa * element.slot(a) + wb * element.slot(b));
    let global = comm.all_reduce_sum(local)?;
    scalars[c] = global;
    Ok(global)
}

/// Global dot product of `a` and `b`, stored in `scalars[c]`. Collective.
pub fn scalar_prod<T, D, C>(
    elements: &ElementArena<T, D>,
    comm: &C,
    scalars: &mut ScalarBuffer<T>,
    a: Slot,
    b: Slot,
    c: ScalarSlot,
) -> eyre::Result<T>
where
    T: Real,
    D: DimName,
    C: ?Sized + Communicator<T>,
    DefaultAllocator: DimAllocator<T, D>,
{
    let local = elements
        .iter()
        .fold(T::zero(), |acc, element| acc + element.slot(a) * element.slot(b));
    let global = comm.all_reduce_sum(local)?;
    scalars[c] = global;
    Ok(global)
}

/// Total number of elements over all processes. Collective.
pub fn global_element_count<T, D, C>(elements: &ElementArena<T, D>, comm: &C) -> eyre::Result<T>
where
    T: Real,
    D: DimName,
    C: ?Sized + Communicator<T>,
    DefaultAllocator: DimAllocator<T, D>,
{
    let local = T::from_usize(elements.len())
        .ok_or_else(|| eyre::eyre!("element count {} does not fit in scalar type", elements.len()))?;
    comm.all_reduce_sum(local)
}
