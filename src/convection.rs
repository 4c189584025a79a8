//! Upwind convective fluxes and the unsteady term.
//!
//! Together these form the matrix-free transport operator. The same routines assemble both the
//! right-hand side and the implicit operator; they only differ in the [`AssemblyContext`].
use crate::element::{Buffer, Slot, Var};
use crate::face::{resolve_face, ResolvedFace};
use crate::field::FlowField;
use crate::mesh::{ElementRef, Face, MeshIterator};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName};
use numeric_literals::replace_float_literals;
use octfv_traits::allocators::DimAllocator;
use serde::{Deserialize, Serialize};

/// Time integration scheme of the transport equation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalScheme {
    #[default]
    EulerExplicit,
    EulerImplicit,
    CrankNicolson,
}

impl TemporalScheme {
    /// Weight of the new time level: 0, 1 and 0.5 respectively.
    #[replace_float_literals(T::from_f64(literal).unwrap())]
    pub fn weight<T: Real>(&self) -> T {
        match self {
            TemporalScheme::EulerExplicit => 0.0,
            TemporalScheme::EulerImplicit => 1.0,
            TemporalScheme::CrankNicolson => 0.5,
        }
    }

    /// Flux factor used when assembling the right-hand side.
    pub fn rhs_flux_factor<T: Real>(&self) -> T {
        self.weight::<T>() - T::one()
    }

    /// Flux factor used when applying the implicit operator.
    pub fn implicit_flux_factor<T: Real>(&self) -> T {
        self.weight()
    }

    pub fn is_explicit(&self) -> bool {
        matches!(self, TemporalScheme::EulerExplicit)
    }
}

/// Parameters of a single operator assembly pass.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct AssemblyContext<T> {
    /// The transported variable. Its gradient is refreshed before the face pass.
    pub var: Var,
    /// Where the convected values are read from.
    pub source: Slot,
    /// The accumulator that receives the contributions.
    pub target: Buffer,
    pub flux_factor: T,
    pub timestep: T,
}

/// Selects the value on the outward side when the mass flux leaves that side.
pub fn upwind<T: Real>(mass_flux: T, outward: T, inward: T) -> T {
    if mass_flux > T::zero() {
        outward
    } else {
        inward
    }
}

/// Adds the upwind convective flux through every face to `ctx.target`.
pub fn add_convective_fluxes<T, D, M>(mesh: &M, field: &mut FlowField<T, D>, ctx: &AssemblyContext<T>)
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh.for_each_face(&mut |face| add_face_flux(face, field, ctx));
}

/// Adds the convective flux through a single face.
///
/// The flux is computed once, added to the authoritative side and subtracted from the other side.
pub fn add_face_flux<T, D>(face: &Face, field: &mut FlowField<T, D>, ctx: &AssemblyContext<T>)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    match resolve_face(face, field) {
        ResolvedFace::Conforming { owner, neighbor } => {
            let owner_element = field.get(owner.element);
            let mass_flux = owner_element.mass_flux(owner.face);
            let phi = upwind(
                mass_flux,
                owner_element.slot(ctx.source),
                field.get(neighbor.element).slot(ctx.source),
            );
            let flux = ctx.flux_factor * phi * mass_flux;
            add_to_target(field, owner.element, ctx.target, flux);
            add_to_target(field, neighbor.element, ctx.target, -flux);
        }
        ResolvedFace::Hanging { large, small } => {
            for side in small {
                let small_element = field.get(side.element);
                let mass_flux = small_element.mass_flux(side.face);
                let phi = upwind(
                    mass_flux,
                    small_element.slot(ctx.source),
                    field.get(large.element).slot(ctx.source),
                );
                let flux = ctx.flux_factor * phi * mass_flux;
                add_to_target(field, side.element, ctx.target, flux);
                add_to_target(field, large.element, ctx.target, -flux);
            }
        }
    }
}

fn add_to_target<T, D>(field: &mut FlowField<T, D>, element: ElementRef, target: Buffer, value: T)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    if let Some(element) = field.local_mut(element) {
        *element.buffer_mut(target) += value;
    }
}

/// Adds `vol * rho * source / dt` to `ctx.target` on every local element.
pub fn add_time_derivative<T, D, M>(mesh: &M, field: &mut FlowField<T, D>, ctx: &AssemblyContext<T>)
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh.for_each_element(&mut |handle| {
        let element = &mut field.elements_mut()[handle];
        let term = element.volume() * element.var(Var::Rho) * element.slot(ctx.source) / ctx.timestep;
        *element.buffer_mut(ctx.target) += term;
    });
}
