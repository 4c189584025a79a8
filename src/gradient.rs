//! Green-Gauss gradient reconstruction.
use crate::element::Var;
use crate::face::{resolve_face, ResolvedFace, ResolvedSide};
use crate::field::FlowField;
use crate::mesh::{ElementRef, Face, GhostExchange, MeshIterator};
use crate::Real;
use nalgebra::{DefaultAllocator, DimName, OVector};
use numeric_literals::replace_float_literals;
use octfv_traits::allocators::DimAllocator;

/// Recomputes the gradient of `var` on every local element.
///
/// The gradient is the sum over all faces of the face-averaged value times the outward area
/// normal, divided by the element volume. Ghosts are refreshed before the face pass, which makes
/// this a collective operation.
pub fn compute_gradients<T, D, M>(mesh: &M, field: &mut FlowField<T, D>, var: Var) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator + GhostExchange<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh.for_each_element(&mut |handle| {
        field.elements_mut()[handle].gradient_mut(var).fill(T::zero());
    });

    field.exchange(mesh)?;

    mesh.for_each_face(&mut |face| accumulate_face_gradient(face, field, var));

    mesh.for_each_element(&mut |handle| {
        let element = &mut field.elements_mut()[handle];
        let inv_volume = T::one() / element.volume();
        *element.gradient_mut(var) *= inv_volume;
    });

    Ok(())
}

/// Adds the contributions of a single face to the (unnormalized) gradients of the adjacent local
/// elements.
pub fn accumulate_face_gradient<T, D>(face: &Face, field: &mut FlowField<T, D>, var: Var)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    match resolve_face(face, field) {
        ResolvedFace::Conforming { owner, neighbor } => {
            let contribution = face_contribution(field, owner, neighbor.element, var);
            add_to_gradient(field, owner.element, var, &contribution, true);
            add_to_gradient(field, neighbor.element, var, &contribution, false);
        }
        ResolvedFace::Hanging { large, small } => {
            for side in small {
                let contribution = face_contribution(field, side, large.element, var);
                add_to_gradient(field, side.element, var, &contribution, true);
                add_to_gradient(field, large.element, var, &contribution, false);
            }
        }
    }
}

#[replace_float_literals(T::from_f64(literal).unwrap())]
fn face_contribution<T, D>(field: &FlowField<T, D>, near: ResolvedSide, far: ElementRef, var: Var) -> OVector<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    let near_element = field.get(near.element);
    let face_average = 0.5 * (near_element.var(var) + field.get(far).var(var));
    near_element.geometry().normal(near.face) * face_average
}

fn add_to_gradient<T, D>(
    field: &mut FlowField<T, D>,
    element: ElementRef,
    var: Var,
    contribution: &OVector<T, D>,
    add: bool,
) where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    if let Some(element) = field.local_mut(element) {
        if add {
            *element.gradient_mut(var) += contribution;
        } else {
            *element.gradient_mut(var) -= contribution;
        }
    }
}
