use nalgebra::RealField;

pub use nalgebra;

/// The floating-point type used for all element data.
///
/// The width is chosen once by the user (typically `f64`) and used uniformly.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

pub mod allocators;
pub mod comm;
