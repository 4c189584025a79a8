//! Classification of faces into conforming and hanging configurations.
use crate::element::{num_faces, num_subfaces, Element};
use crate::field::FlowField;
use crate::mesh::{ElementRef, Face, FaceSide, SideElements};
use crate::Real;
use log::error;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use std::cmp::{Ordering, Reverse};

/// An element together with the local number of the face under consideration.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ResolvedSide {
    pub element: ElementRef,
    pub face: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedFace {
    /// Both sides are covered by a single element.
    ///
    /// The owner is the side whose normal and mass-flux slot are authoritative for the face.
    Conforming { owner: ResolvedSide, neighbor: ResolvedSide },
    /// One large element faces 2^(d-1) smaller elements. The small sides are authoritative.
    Hanging { large: ResolvedSide, small: Vec<ResolvedSide> },
}

fn contract_violation(message: String) -> ! {
    error!("{}", message);
    panic!("Mesh topology contract violated: {}", message)
}

/// Elements are ordered finer level first, then by lower global index.
fn owner_order<T, D>(a: &Element<T, D>, b: &Element<T, D>) -> Ordering
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    (Reverse(a.level()), a.global_index()).cmp(&(Reverse(b.level()), b.global_index()))
}

fn check_face_index<D: DimName>(side: &FaceSide) {
    if side.face >= num_faces::<D>() {
        contract_violation(format!(
            "face index {} out of range for an element with {} faces",
            side.face,
            num_faces::<D>()
        ));
    }
}

/// Resolves a face reported by the mesh engine into its conforming or hanging configuration.
///
/// For a conforming face the owner is determined by a total order on the two elements (finer level
/// first, then lower global index), so that the result does not depend on partitioning or on the
/// order in which the engine reports the two sides.
///
/// # Panics
///
/// Panics if both sides are hanging, if a hanging side does not contain exactly 2^(d-1) elements,
/// or if a face index is out of range.
pub fn resolve_face<T, D>(face: &Face, field: &FlowField<T, D>) -> ResolvedFace
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    let [side_a, side_b] = &face.sides;
    check_face_index::<D>(side_a);
    check_face_index::<D>(side_b);

    match (&side_a.elements, &side_b.elements) {
        (SideElements::Full(a), SideElements::Full(b)) => {
            let side_a = ResolvedSide {
                element: *a,
                face: side_a.face,
            };
            let side_b = ResolvedSide {
                element: *b,
                face: side_b.face,
            };
            // Ties only occur for a face between an element and itself, where side 0 wins
            if owner_order(field.get(*b), field.get(*a)) == Ordering::Less {
                ResolvedFace::Conforming {
                    owner: side_b,
                    neighbor: side_a,
                }
            } else {
                ResolvedFace::Conforming {
                    owner: side_a,
                    neighbor: side_b,
                }
            }
        }
        (SideElements::Full(large), SideElements::Hanging(small)) => {
            resolve_hanging::<D>(side_a.face, *large, side_b.face, small)
        }
        (SideElements::Hanging(small), SideElements::Full(large)) => {
            resolve_hanging::<D>(side_b.face, *large, side_a.face, small)
        }
        (SideElements::Hanging(_), SideElements::Hanging(_)) => {
            contract_violation("both sides of a face are hanging".to_string())
        }
    }
}

fn resolve_hanging<D: DimName>(
    large_face: usize,
    large: ElementRef,
    small_face: usize,
    small: &[ElementRef],
) -> ResolvedFace {
    if small.len() != num_subfaces::<D>() {
        contract_violation(format!(
            "hanging side has {} elements, expected {}",
            small.len(),
            num_subfaces::<D>()
        ));
    }
    ResolvedFace::Hanging {
        large: ResolvedSide {
            element: large,
            face: large_face,
        },
        small: small
            .iter()
            .map(|&element| ResolvedSide {
                element,
                face: small_face,
            })
            .collect(),
    }
}
