//! Face mass fluxes.
//!
//! Each face carries a single flux value. It is computed with the normal of the authoritative side
//! (the owner of a conforming face, or the small elements of a hanging face) and stored positively
//! in that side's slot and negated in the slot of the opposite side.
use crate::element::{Element, Var};
use crate::face::{resolve_face, ResolvedFace};
use crate::field::FlowField;
use crate::mesh::{Face, GhostExchange, MeshIterator};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use numeric_literals::replace_float_literals;
use octfv_traits::allocators::DimAllocator;

/// Recomputes the mass flux through every face of every local element.
///
/// Ghosts are refreshed before the face pass so that neighbor velocities are current, and again
/// afterwards so that ghost copies carry the new fluxes.
pub fn init_massfluxes<T, D, M>(mesh: &M, field: &mut FlowField<T, D>) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator + GhostExchange<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh.for_each_element(&mut |handle| field.elements_mut()[handle].reset_mass_fluxes());
    field.exchange(mesh)?;
    mesh.for_each_face(&mut |face| accumulate_face_massflux(face, field));
    field.exchange(mesh)
}

/// The flux `n · 0.5 (u_near + u_far)` through face `face` of `near`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn face_massflux<T, D>(near: &Element<T, D>, face: usize, far: &Element<T, D>) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    let normal = near.geometry().normal(face);
    (0..D::dim())
        .map(|axis| {
            let velocity = Var::velocity(axis);
            normal[axis] * 0.5 * (near.var(velocity) + far.var(velocity))
        })
        .fold(T::zero(), |acc, flux| acc + flux)
}

fn accumulate_face_massflux<T, D>(face: &Face, field: &mut FlowField<T, D>)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    match resolve_face(face, field) {
        ResolvedFace::Conforming { owner, neighbor } => {
            let flux = face_massflux(field.get(owner.element), owner.face, field.get(neighbor.element));
            if let Some(element) = field.local_mut(owner.element) {
                *element.mass_flux_mut(owner.face) += flux;
            }
            if let Some(element) = field.local_mut(neighbor.element) {
                *element.mass_flux_mut(neighbor.face) -= flux;
            }
        }
        ResolvedFace::Hanging { large, small } => {
            for side in small {
                let flux = face_massflux(field.get(side.element), side.face, field.get(large.element));
                if let Some(element) = field.local_mut(side.element) {
                    *element.mass_flux_mut(side.face) += flux;
                }
                if let Some(element) = field.local_mut(large.element) {
                    *element.mass_flux_mut(large.face) -= flux;
                }
            }
        }
    }
}
