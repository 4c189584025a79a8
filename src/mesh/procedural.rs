//! Procedurally generated forests on the periodic unit box.
//!
//! [`PeriodicForest`] is a small stand-in for a distributed forest-of-octrees engine. The unit box
//! is split into `n^d` root cells, each of which is either a leaf or refined once into `2^d`
//! children. Such forests are always 2:1 balanced, yet contain every face configuration the
//! numerics have to handle: conforming faces at both levels and hanging faces on either side.
use crate::adapt::{interpolate_coarsen, interpolate_refine, should_coarsen, should_refine};
use crate::comm::ThreadGroup;
use crate::element::{num_children, Element, ElementArena, ElementGeometry, ElementHandle};
use crate::field::FlowField;
use crate::ghost::{GhostIndex, GhostMirror};
use crate::mesh::{ElementRef, Face, FaceSide, GhostExchange, MeshIterator};
use crate::settings::AdaptSettings;
use crate::Real;
use eyre::eyre;
use itertools::Itertools;
use log::info;
use nalgebra::{DefaultAllocator, DimName, OPoint, OVector};
use octfv_traits::allocators::DimAllocator;
use std::collections::BTreeMap;
use std::marker::PhantomData;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct Leaf {
    root: usize,
    child: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ForestSide {
    face: usize,
    leaves: Vec<usize>,
    hanging: bool,
}

impl ForestSide {
    fn full(face: usize, leaf: usize) -> Self {
        Self {
            face,
            leaves: vec![leaf],
            hanging: false,
        }
    }

    fn hanging(face: usize, leaves: Vec<usize>) -> Self {
        Self {
            face,
            leaves,
            hanging: true,
        }
    }
}

/// A periodic forest of root cells refined at most once.
///
/// Leaves are numbered globally by root cell, then by child index in z-order. The global number of
/// a leaf doubles as the global index of its element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PeriodicForest<D> {
    cells_per_dim: usize,
    refined: Vec<bool>,
    leaves: Vec<Leaf>,
    first_leaf: Vec<usize>,
    faces: Vec<[ForestSide; 2]>,
    owners: Vec<usize>,
    num_ranks: usize,
    marker: PhantomData<D>,
}

impl<D: DimName> PeriodicForest<D> {
    /// A forest without refined root cells, owned by a single rank.
    pub fn uniform(cells_per_dim: usize) -> Self {
        Self::with_refinement(cells_per_dim, vec![false; cells_per_dim.pow(D::dim() as u32)])
    }

    /// A forest in which root cell `r` is refined if `refined[r]` is set, owned by a single rank.
    ///
    /// Root cells are numbered lexicographically with the first axis running fastest.
    ///
    /// # Panics
    ///
    /// Panics if `cells_per_dim == 0` or if `refined` does not have one entry per root cell.
    pub fn with_refinement(cells_per_dim: usize, refined: Vec<bool>) -> Self {
        assert!(cells_per_dim > 0, "Forest needs at least one root cell per dimension.");
        assert_eq!(
            refined.len(),
            cells_per_dim.pow(D::dim() as u32),
            "Need exactly one refinement flag per root cell."
        );
        let mut forest = Self {
            cells_per_dim,
            refined,
            leaves: Vec::new(),
            first_leaf: Vec::new(),
            faces: Vec::new(),
            owners: Vec::new(),
            num_ranks: 1,
            marker: PhantomData,
        };
        forest.rebuild();
        forest
    }

    /// Refines the root cells whose integer coordinates satisfy the predicate.
    pub fn refine_roots_where(cells_per_dim: usize, mut predicate: impl FnMut(&[usize]) -> bool) -> Self {
        let num_roots = cells_per_dim.pow(D::dim() as u32);
        let refined = (0..num_roots)
            .map(|root| predicate(&root_coords::<D>(cells_per_dim, root)))
            .collect();
        Self::with_refinement(cells_per_dim, refined)
    }

    pub fn cells_per_dim(&self) -> usize {
        self.cells_per_dim
    }

    pub fn num_roots(&self) -> usize {
        self.refined.len()
    }

    pub fn num_leaves(&self) -> usize {
        self.leaves.len()
    }

    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    pub fn is_refined(&self, root: usize) -> bool {
        self.refined[root]
    }

    pub fn num_ranks(&self) -> usize {
        self.num_ranks
    }

    /// The owning rank of every leaf, in global order.
    pub fn owners(&self) -> &[usize] {
        &self.owners
    }

    /// Distributes the leaves over `num_ranks` ranks in contiguous chunks of (nearly) equal size.
    pub fn partition_uniform(&mut self, num_ranks: usize) {
        assert!(num_ranks > 0, "Need at least one rank.");
        let num_leaves = self.num_leaves();
        self.owners = (0..num_leaves)
            .map(|leaf| leaf * num_ranks / num_leaves)
            .collect();
        self.num_ranks = num_ranks;
    }

    /// Assigns an arbitrary owner to every leaf.
    ///
    /// # Panics
    ///
    /// Panics if there is not one owner per leaf or if an owner is not smaller than `num_ranks`.
    pub fn set_owners(&mut self, owners: Vec<usize>, num_ranks: usize) {
        assert_eq!(owners.len(), self.num_leaves(), "Need exactly one owner per leaf.");
        assert!(
            owners.iter().all(|&owner| owner < num_ranks),
            "Owners must be smaller than the number of ranks."
        );
        self.owners = owners;
        self.num_ranks = num_ranks;
    }

    pub fn leaf_level(&self, leaf: usize) -> u8 {
        match self.leaves[leaf].child {
            None => 0,
            Some(_) => 1,
        }
    }

    /// Creates the element of the given leaf with its geometry and zero state.
    pub fn leaf_element<T>(&self, leaf: usize) -> Element<T, D>
    where
        T: Real,
        DefaultAllocator: DimAllocator<T, D>,
    {
        let Leaf { root, child } = self.leaves[leaf];
        let to_real = |i: usize| T::from_usize(i).expect("Must be able to fit usize in T");
        let root_size = T::one() / to_real(self.cells_per_dim);
        let coords = root_coords::<D>(self.cells_per_dim, root);

        let (origin, size) = match child {
            None => (OVector::<T, D>::from_fn(|k, _| to_real(coords[k]) * root_size), root_size),
            Some(child) => {
                let size = root_size / to_real(2);
                let origin = OVector::<T, D>::from_fn(|k, _| {
                    let offset = if child & (1 << k) != 0 { size } else { T::zero() };
                    to_real(coords[k]) * root_size + offset
                });
                (origin, size)
            }
        };

        let geometry = ElementGeometry::from_box(OPoint::from(origin), OVector::repeat(size));
        Element::new(geometry, self.leaf_level(leaf), leaf)
    }

    /// The part of the forest owned by `rank`.
    ///
    /// A group is required whenever the rank has ghosts, that is whenever more than one rank owns
    /// leaves.
    pub fn local_forest<'a, T>(&'a self, rank: usize, group: Option<&'a ThreadGroup<T, D>>) -> LocalForest<'a, T, D>
    where
        T: Real,
        DefaultAllocator: DimAllocator<T, D>,
    {
        assert!(rank < self.num_ranks, "Rank {} out of range for {} ranks", rank, self.num_ranks);
        let owners = &self.owners;

        let mut counters = vec![0; self.num_ranks];
        let mut positions = vec![0; self.num_leaves()];
        for (leaf, &owner) in owners.iter().enumerate() {
            positions[leaf] = counters[owner];
            counters[owner] += 1;
        }

        let global_indices = (0..self.num_leaves())
            .filter(|&leaf| owners[leaf] == rank)
            .collect_vec();

        let local_faces = self
            .faces
            .iter()
            .filter(|sides| {
                sides
                    .iter()
                    .flat_map(|side| &side.leaves)
                    .any(|&leaf| owners[leaf] == rank)
            })
            .collect_vec();

        let ghost_indices: BTreeMap<usize, GhostIndex> = local_faces
            .iter()
            .flat_map(|sides| sides.iter().flat_map(|side| side.leaves.iter().copied()))
            .filter(|&leaf| owners[leaf] != rank)
            .sorted()
            .dedup()
            .enumerate()
            .map(|(idx, leaf)| (leaf, GhostIndex(idx)))
            .collect();

        let ghost_sources = ghost_indices
            .keys()
            .map(|&leaf| (owners[leaf], ElementHandle(positions[leaf])))
            .collect();

        let element_ref = |leaf: usize| {
            if owners[leaf] == rank {
                ElementRef::Local(ElementHandle(positions[leaf]))
            } else {
                ElementRef::Ghost(ghost_indices[&leaf])
            }
        };
        let convert_side = |side: &ForestSide| {
            if side.hanging {
                FaceSide::hanging(side.face, side.leaves.iter().map(|&leaf| element_ref(leaf)).collect())
            } else {
                FaceSide::full(side.face, element_ref(side.leaves[0]))
            }
        };
        let faces = local_faces
            .iter()
            .map(|sides| Face {
                sides: [convert_side(&sides[0]), convert_side(&sides[1])],
            })
            .collect();

        LocalForest {
            forest: self,
            rank,
            global_indices,
            ghost_sources,
            faces,
            group,
        }
    }

    /// Refines and coarsens root cells according to the error estimates of `elements`, and
    /// transfers the element data to the new leaves.
    ///
    /// Requires the elements of all leaves in global order, with up-to-date gradients of the
    /// variable that drives adaptation. Ownership is reset to a single rank. Mass fluxes and
    /// gradients of the returned elements must be recomputed before the next solve.
    ///
    /// # Panics
    ///
    /// Panics if the forest is distributed over more than one rank or if the number of elements
    /// does not match the number of leaves.
    pub fn adapt<T>(&mut self, elements: &ElementArena<T, D>, settings: &AdaptSettings) -> ElementArena<T, D>
    where
        T: Real,
        DefaultAllocator: DimAllocator<T, D>,
    {
        assert_eq!(self.num_ranks, 1, "Adaptation is only supported on a single rank.");
        assert_eq!(elements.len(), self.num_leaves(), "Need exactly one element per leaf.");
        let old = elements.elements();
        let num_children = num_children::<D>();
        let old_refined = self.refined.clone();
        let old_first_leaf = self.first_leaf.clone();

        let mut num_refined = 0;
        let mut num_coarsened = 0;
        for root in 0..self.num_roots() {
            let first = old_first_leaf[root];
            if old_refined[root] {
                if should_coarsen(&old[first..first + num_children], settings) {
                    self.refined[root] = false;
                    num_coarsened += 1;
                }
            } else if should_refine(&old[first], settings) {
                self.refined[root] = true;
                num_refined += 1;
            }
        }
        self.rebuild();

        let mut adapted = Vec::with_capacity(self.num_leaves());
        for root in 0..self.num_roots() {
            let old_first = old_first_leaf[root];
            let new_first = self.first_leaf[root];
            match (old_refined[root], self.refined[root]) {
                (false, false) => adapted.push(old[old_first].clone()),
                (true, true) => adapted.extend_from_slice(&old[old_first..old_first + num_children]),
                (false, true) => {
                    let mut children = (0..num_children)
                        .map(|child| self.leaf_element(new_first + child))
                        .collect_vec();
                    interpolate_refine(&old[old_first], &mut children);
                    adapted.extend(children);
                }
                (true, false) => {
                    let mut parent = self.leaf_element(new_first);
                    interpolate_coarsen(&old[old_first..old_first + num_children], &mut parent);
                    adapted.push(parent);
                }
            }
        }
        for (leaf, element) in adapted.iter_mut().enumerate() {
            element.set_global_index(leaf);
        }

        info!(
            "Adapted forest: {} root cells refined, {} coarsened, {} leaves",
            num_refined,
            num_coarsened,
            self.num_leaves()
        );
        ElementArena::from_elements(adapted)
    }

    fn root_index(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .rev()
            .fold(0, |index, &coord| index * self.cells_per_dim + coord)
    }

    fn leaf_of(&self, root: usize, child: usize) -> usize {
        self.first_leaf[root] + child
    }

    /// Recomputes leaves and faces from the refinement flags and resets ownership to one rank.
    fn rebuild(&mut self) {
        let d = D::dim();
        let n = self.cells_per_dim;
        let num_children = num_children::<D>();

        self.leaves.clear();
        self.first_leaf.clear();
        for (root, &refined) in self.refined.iter().enumerate() {
            self.first_leaf.push(self.leaves.len());
            if refined {
                self.leaves
                    .extend((0..num_children).map(|child| Leaf { root, child: Some(child) }));
            } else {
                self.leaves.push(Leaf { root, child: None });
            }
        }

        let mut faces = Vec::new();
        for root in 0..self.num_roots() {
            let coords = root_coords::<D>(n, root);
            for axis in 0..d {
                let upper = 2 * axis + 1;
                let lower = 2 * axis;
                let mut neighbor_coords = coords.clone();
                neighbor_coords[axis] = (coords[axis] + 1) % n;
                let neighbor = self.root_index(&neighbor_coords);

                // Children touching the upper (lower) face along the axis
                let upper_children = (0..num_children)
                    .filter(|child| child & (1 << axis) != 0)
                    .collect_vec();
                let lower_children = upper_children
                    .iter()
                    .map(|child| child ^ (1 << axis))
                    .collect_vec();

                match (self.refined[root], self.refined[neighbor]) {
                    (false, false) => faces.push([
                        ForestSide::full(upper, self.leaf_of(root, 0)),
                        ForestSide::full(lower, self.leaf_of(neighbor, 0)),
                    ]),
                    (true, true) => {
                        for (&child, &neighbor_child) in upper_children.iter().zip(&lower_children) {
                            faces.push([
                                ForestSide::full(upper, self.leaf_of(root, child)),
                                ForestSide::full(lower, self.leaf_of(neighbor, neighbor_child)),
                            ]);
                        }
                    }
                    (true, false) => faces.push([
                        ForestSide::hanging(
                            upper,
                            upper_children
                                .iter()
                                .map(|&child| self.leaf_of(root, child))
                                .collect(),
                        ),
                        ForestSide::full(lower, self.leaf_of(neighbor, 0)),
                    ]),
                    (false, true) => faces.push([
                        ForestSide::full(upper, self.leaf_of(root, 0)),
                        ForestSide::hanging(
                            lower,
                            lower_children
                                .iter()
                                .map(|&child| self.leaf_of(neighbor, child))
                                .collect(),
                        ),
                    ]),
                }

                if self.refined[root] {
                    for &child in &lower_children {
                        faces.push([
                            ForestSide::full(upper, self.leaf_of(root, child)),
                            ForestSide::full(lower, self.leaf_of(root, child | (1 << axis))),
                        ]);
                    }
                }
            }
        }
        self.faces = faces;
        self.owners = vec![0; self.leaves.len()];
        self.num_ranks = 1;
    }
}

fn root_coords<D: DimName>(cells_per_dim: usize, root: usize) -> Vec<usize> {
    (0..D::dim())
        .map(|k| (root / cells_per_dim.pow(k as u32)) % cells_per_dim)
        .collect()
}

/// The part of a [`PeriodicForest`] owned by a single rank.
///
/// Local elements are numbered by increasing global index. Ghosts are the remote leaves that
/// share a face with a local leaf, again numbered by increasing global index.
pub struct LocalForest<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    forest: &'a PeriodicForest<D>,
    rank: usize,
    global_indices: Vec<usize>,
    ghost_sources: Vec<(usize, ElementHandle)>,
    faces: Vec<Face>,
    group: Option<&'a ThreadGroup<T, D>>,
}

impl<'a, T, D> LocalForest<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn forest(&self) -> &'a PeriodicForest<D> {
        self.forest
    }

    /// Global index of a local element.
    pub fn global_index(&self, handle: ElementHandle) -> usize {
        self.global_indices[handle.0]
    }

    pub fn num_ghosts(&self) -> usize {
        self.ghost_sources.len()
    }

    pub fn faces(&self) -> &[Face] {
        &self.faces
    }

    /// Creates the local elements, lets `init` set their initial state and fills the ghost mirror.
    ///
    /// Collective.
    pub fn create_field(&self, mut init: impl FnMut(&mut Element<T, D>)) -> eyre::Result<FlowField<T, D>> {
        let elements = self
            .global_indices
            .iter()
            .map(|&leaf| {
                let mut element = self.forest.leaf_element(leaf);
                init(&mut element);
                element
            })
            .collect();
        let mut field = FlowField::new(ElementArena::from_elements(elements), GhostMirror::new());
        field.exchange(self)?;
        Ok(field)
    }
}

impl<'a, T, D> MeshIterator for LocalForest<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn num_local_elements(&self) -> usize {
        self.global_indices.len()
    }

    fn for_each_element(&self, f: &mut dyn FnMut(ElementHandle)) {
        for idx in 0..self.global_indices.len() {
            f(ElementHandle(idx));
        }
    }

    fn for_each_face(&self, f: &mut dyn FnMut(&Face)) {
        for face in &self.faces {
            f(face);
        }
    }
}

impl<'a, T, D> GhostExchange<T, D> for LocalForest<'a, T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn exchange(&self, local: &ElementArena<T, D>, ghosts: &mut GhostMirror<T, D>) -> eyre::Result<()> {
        let num_owned = self.global_indices.len();
        if let Some(group) = self.group {
            return group.exchange(self.rank, num_owned, local, &self.ghost_sources, ghosts);
        }
        if local.len() != num_owned {
            return Err(eyre!(
                "rank {} owns {} leaves but holds {} elements",
                self.rank,
                num_owned,
                local.len()
            ));
        }
        if !self.ghost_sources.is_empty() {
            return Err(eyre!(
                "rank {} has {} ghosts but no process group to exchange them with",
                self.rank,
                self.ghost_sources.len()
            ));
        }
        ghosts.refresh(Vec::new());
        Ok(())
    }
}
