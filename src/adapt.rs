//! Refinement and coarsening criteria, and transfer of element data between levels.
use crate::element::{Element, Var};
use crate::settings::AdaptSettings;
use crate::Real;
use nalgebra::{DefaultAllocator, DimName, OVector};
use numeric_literals::replace_float_literals;
use octfv_traits::allocators::DimAllocator;

/// Squared error estimate `|∇φ|² vol / 12` of a piecewise constant representation of `var`.
#[replace_float_literals(T::from_f64(literal).unwrap())]
pub fn squared_error_estimate<T, D>(element: &Element<T, D>, var: Var) -> T
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    element.gradient(var).norm_squared() * element.volume() / 12.0
}

fn threshold_squared<T: Real>(settings: &AdaptSettings) -> T {
    let threshold = T::from_f64(settings.refine_error_scalar).unwrap();
    threshold * threshold
}

/// Whether the error estimate of the element exceeds the volume-scaled threshold.
pub fn should_refine<T, D>(element: &Element<T, D>, settings: &AdaptSettings) -> bool
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    squared_error_estimate(element, settings.variable) > threshold_squared::<T>(settings) * element.volume()
}

/// Whether the combined error estimate of a family of children is below the threshold scaled by
/// their combined volume.
pub fn should_coarsen<T, D>(children: &[Element<T, D>], settings: &AdaptSettings) -> bool
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    let (error, volume) = children
        .iter()
        .fold((T::zero(), T::zero()), |(error, volume), child| {
            (
                error + squared_error_estimate(child, settings.variable),
                volume + child.volume(),
            )
        });
    error < threshold_squared::<T>(settings) * volume
}

/// Fills newly created children from their parent.
///
/// Each state variable is extrapolated linearly from the parent centroid to the child centroid,
/// and children inherit the parent gradients. Mass fluxes and buffers are reset and must be
/// recomputed on the new topology.
pub fn interpolate_refine<T, D>(parent: &Element<T, D>, children: &mut [Element<T, D>])
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    for child in children {
        let offset = child.centroid() - parent.centroid();
        for var in Var::ALL {
            let gradient = parent.gradient(var);
            child.set_var(var, parent.var(var) + gradient.dot(&offset));
            child.gradient_mut(var).copy_from(gradient);
        }
        child.reset_mass_fluxes();
        child.reset_buffers();
    }
}

/// Fills a parent from the children it replaces, using volume-weighted averages of state and
/// gradients.
///
/// # Panics
///
/// Panics if `children` is empty.
pub fn interpolate_coarsen<T, D>(children: &[Element<T, D>], parent: &mut Element<T, D>)
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    assert!(!children.is_empty(), "Cannot coarsen an empty family.");
    let volume = children
        .iter()
        .fold(T::zero(), |acc, child| acc + child.volume());
    for var in Var::ALL {
        let mut value = T::zero();
        let mut gradient = OVector::<T, D>::zeros();
        for child in children {
            value += child.var(var) * child.volume();
            gradient += child.gradient(var) * child.volume();
        }
        parent.set_var(var, value / volume);
        *parent.gradient_mut(var) = gradient / volume;
    }
    parent.reset_mass_fluxes();
    parent.reset_buffers();
}
