//! Per-element data: geometry, flow state, gradients, mass fluxes and solver scratch buffers.
//!
//! Elements are owned by an [`ElementArena`] and addressed by stable [`ElementHandle`]s. The mesh
//! engine decides when elements are created or replaced; this module only defines the payload.
use crate::Real;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector};
use numeric_literals::replace_float_literals;
use octfv_traits::allocators::DimAllocator;
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Number of state variables stored per element.
pub const NUM_VARS: usize = 6;

/// Number of scratch buffers stored per element.
pub const NUM_BUFFERS: usize = 10;

/// Flow state variables.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Var {
    Rho,
    Vx,
    Vy,
    Vz,
    P,
    /// Passive scalar.
    S,
}

impl Var {
    pub const ALL: [Var; NUM_VARS] = [Var::Rho, Var::Vx, Var::Vy, Var::Vz, Var::P, Var::S];

    pub fn index(self) -> usize {
        self as usize
    }

    /// The velocity component along the given axis.
    ///
    /// # Panics
    ///
    /// Panics if `axis > 2`.
    pub fn velocity(axis: usize) -> Var {
        match axis {
            0 => Var::Vx,
            1 => Var::Vy,
            2 => Var::Vz,
            _ => panic!("There is no velocity component for axis {}", axis),
        }
    }
}

/// Scratch buffers used while assembling and solving a transport equation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Buffer {
    /// Result of the operator application `A x`.
    Ax,
    /// Right-hand side.
    B,
    /// Iterate of the unknown during an implicit solve.
    Vn,
    /// Current residual `b - A x`.
    R,
    /// Initial residual (shadow vector).
    R0,
    /// Search direction.
    P,
    /// `A p`.
    V,
    /// `x + alpha p`.
    H,
    /// `r - alpha v`.
    S,
    /// `A s`.
    T,
}

impl Buffer {
    pub const ALL: [Buffer; NUM_BUFFERS] = [
        Buffer::Ax,
        Buffer::B,
        Buffer::Vn,
        Buffer::R,
        Buffer::R0,
        Buffer::P,
        Buffer::V,
        Buffer::H,
        Buffer::S,
        Buffer::T,
    ];

    pub fn index(self) -> usize {
        self as usize
    }
}

/// A per-element scalar value addressable by the field algebra: either a state variable or a
/// scratch buffer.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    Var(Var),
    Buffer(Buffer),
}

impl From<Var> for Slot {
    fn from(var: Var) -> Self {
        Slot::Var(var)
    }
}

impl From<Buffer> for Slot {
    fn from(buffer: Buffer) -> Self {
        Slot::Buffer(buffer)
    }
}

/// Number of faces of an element of dimension `D`.
pub fn num_faces<D: DimName>() -> usize {
    2 * D::dim()
}

/// Number of sub-faces covering a face that is adjacent to elements one level finer.
pub fn num_subfaces<D: DimName>() -> usize {
    1 << (D::dim() - 1)
}

/// Number of children of an element, which is also its number of vertices.
pub fn num_children<D: DimName>() -> usize {
    1 << D::dim()
}

/// Geometry of an axis-aligned element.
///
/// Faces are numbered `2k` for the face whose outward normal points along `-e_k` and `2k + 1` for
/// `+e_k`. Normals are scaled by the area of their face, so that `normal · u` is a volume flux.
/// Vertices are stored in z-order: bit `k` of the vertex index selects the upper end along axis `k`.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementGeometry<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    vertices: Vec<OPoint<T, D>>,
    centroid: OPoint<T, D>,
    volume: T,
    normals: Vec<OVector<T, D>>,
    face_centroids: Vec<OPoint<T, D>>,
}

impl<T, D> ElementGeometry<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Construct the geometry of the box `[origin, origin + extents]`.
    ///
    /// # Panics
    ///
    /// Panics if any extent is not positive.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn from_box(origin: OPoint<T, D>, extents: OVector<T, D>) -> Self {
        assert!(
            extents.iter().all(|&h| h > T::zero()),
            "Element extents must be positive."
        );

        let vertices = (0..num_children::<D>())
            .map(|corner| {
                let offset = OVector::<T, D>::from_fn(|k, _| {
                    if corner & (1 << k) != 0 {
                        extents[k]
                    } else {
                        T::zero()
                    }
                });
                origin.clone() + offset
            })
            .collect();

        let half_extents = extents.clone() * 0.5;
        let centroid = origin + half_extents.clone();
        let volume = extents.iter().fold(T::one(), |acc, &h| acc * h);

        let mut normals = Vec::with_capacity(num_faces::<D>());
        let mut face_centroids = Vec::with_capacity(num_faces::<D>());
        for face in 0..num_faces::<D>() {
            let axis = face / 2;
            let sign = if face % 2 == 0 { -1.0 } else { 1.0 };
            let area = volume / extents[axis];
            normals.push(OVector::<T, D>::from_fn(|k, _| {
                if k == axis {
                    sign * area
                } else {
                    T::zero()
                }
            }));
            let mut face_centroid = centroid.clone();
            face_centroid[axis] += sign * half_extents[axis];
            face_centroids.push(face_centroid);
        }

        Self {
            vertices,
            centroid,
            volume,
            normals,
            face_centroids,
        }
    }

    pub fn vertices(&self) -> &[OPoint<T, D>] {
        &self.vertices
    }

    pub fn centroid(&self) -> &OPoint<T, D> {
        &self.centroid
    }

    pub fn volume(&self) -> T {
        self.volume
    }

    /// Outward normal of the given face, scaled by the face area.
    pub fn normal(&self, face: usize) -> &OVector<T, D> {
        &self.normals[face]
    }

    pub fn face_centroid(&self, face: usize) -> &OPoint<T, D> {
        &self.face_centroids[face]
    }
}

/// The payload of a single mesh leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct Element<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    geometry: ElementGeometry<T, D>,
    level: u8,
    global_index: usize,
    vars: [T; NUM_VARS],
    gradients: [OVector<T, D>; NUM_VARS],
    mass_fluxes: Vec<T>,
    buffers: [T; NUM_BUFFERS],
}

impl<T, D> Element<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Creates an element at rest: all state, gradients, fluxes and buffers are zero.
    ///
    /// `global_index` must be unique across all processes and independent of the partitioning.
    pub fn new(geometry: ElementGeometry<T, D>, level: u8, global_index: usize) -> Self {
        Self {
            geometry,
            level,
            global_index,
            vars: [T::zero(); NUM_VARS],
            gradients: std::array::from_fn(|_| OVector::zeros()),
            mass_fluxes: vec![T::zero(); num_faces::<D>()],
            buffers: [T::zero(); NUM_BUFFERS],
        }
    }

    pub fn geometry(&self) -> &ElementGeometry<T, D> {
        &self.geometry
    }

    pub fn volume(&self) -> T {
        self.geometry.volume()
    }

    pub fn centroid(&self) -> &OPoint<T, D> {
        self.geometry.centroid()
    }

    pub fn level(&self) -> u8 {
        self.level
    }

    pub fn global_index(&self) -> usize {
        self.global_index
    }

    /// Used by the mesh engine when leaves are renumbered.
    pub(crate) fn set_global_index(&mut self, global_index: usize) {
        self.global_index = global_index;
    }

    pub fn var(&self, var: Var) -> T {
        self.vars[var.index()]
    }

    pub fn set_var(&mut self, var: Var, value: T) {
        self.vars[var.index()] = value;
    }

    pub fn vars(&self) -> &[T; NUM_VARS] {
        &self.vars
    }

    pub fn gradient(&self, var: Var) -> &OVector<T, D> {
        &self.gradients[var.index()]
    }

    pub fn gradient_mut(&mut self, var: Var) -> &mut OVector<T, D> {
        &mut self.gradients[var.index()]
    }

    /// The cached mass flux through the given face, positive when leaving this element.
    pub fn mass_flux(&self, face: usize) -> T {
        self.mass_fluxes[face]
    }

    pub fn mass_flux_mut(&mut self, face: usize) -> &mut T {
        &mut self.mass_fluxes[face]
    }

    pub fn mass_fluxes(&self) -> &[T] {
        &self.mass_fluxes
    }

    pub fn reset_mass_fluxes(&mut self) {
        self.mass_fluxes.fill(T::zero());
    }

    pub fn buffer(&self, buffer: Buffer) -> T {
        self.buffers[buffer.index()]
    }

    pub fn buffer_mut(&mut self, buffer: Buffer) -> &mut T {
        &mut self.buffers[buffer.index()]
    }

    pub fn reset_buffers(&mut self) {
        self.buffers = [T::zero(); NUM_BUFFERS];
    }

    pub fn slot(&self, slot: Slot) -> T {
        match slot {
            Slot::Var(var) => self.var(var),
            Slot::Buffer(buffer) => self.buffer(buffer),
        }
    }

    pub fn slot_mut(&mut self, slot: Slot) -> &mut T {
        match slot {
            Slot::Var(var) => &mut self.vars[var.index()],
            Slot::Buffer(buffer) => self.buffer_mut(buffer),
        }
    }
}

/// Stable handle of a locally owned element.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementHandle(pub usize);

/// Storage for the elements owned by this process.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementArena<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    elements: Vec<Element<T, D>>,
}

impl<T, D> Default for ElementArena<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn default() -> Self {
        Self { elements: Vec::new() }
    }
}

impl<T, D> ElementArena<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_elements(elements: Vec<Element<T, D>>) -> Self {
        Self { elements }
    }

    pub fn push(&mut self, element: Element<T, D>) -> ElementHandle {
        self.elements.push(element);
        ElementHandle(self.elements.len() - 1)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn get(&self, handle: ElementHandle) -> Option<&Element<T, D>> {
        self.elements.get(handle.0)
    }

    pub fn get_mut(&mut self, handle: ElementHandle) -> Option<&mut Element<T, D>> {
        self.elements.get_mut(handle.0)
    }

    pub fn elements(&self) -> &[Element<T, D>] {
        &self.elements
    }

    pub fn iter(&self) -> impl Iterator<Item = &Element<T, D>> {
        self.elements.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Element<T, D>> {
        self.elements.iter_mut()
    }

    pub fn handles(&self) -> impl Iterator<Item = ElementHandle> {
        (0..self.elements.len()).map(ElementHandle)
    }

    /// Zeroes the scratch buffers of every element.
    pub fn reset_buffers(&mut self) {
        for element in &mut self.elements {
            element.reset_buffers();
        }
    }

    pub fn into_elements(self) -> Vec<Element<T, D>> {
        self.elements
    }
}

impl<T, D> Index<ElementHandle> for ElementArena<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    type Output = Element<T, D>;

    fn index(&self, handle: ElementHandle) -> &Self::Output {
        &self.elements[handle.0]
    }
}

impl<T, D> IndexMut<ElementHandle> for ElementArena<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn index_mut(&mut self, handle: ElementHandle) -> &mut Self::Output {
        &mut self.elements[handle.0]
    }
}
