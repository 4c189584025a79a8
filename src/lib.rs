//! Matrix-free finite-volume transport operators on distributed, adaptively refined forests.
//!
//! The mesh engine (forest topology, partitioning, ghost layer) is accessed through the traits in
//! [`mesh`]. Everything else is computed from per-element data: Green-Gauss gradients, face mass
//! fluxes, upwind convective fluxes and a BICGSTAB solver built on top of them.
pub mod adapt;
pub mod algebra;
pub mod bicgstab;
pub mod comm;
pub mod convection;
pub mod element;
pub mod face;
pub mod field;
pub mod ghost;
pub mod gradient;
pub mod massflux;
pub mod mesh;
pub mod settings;
pub mod transport;

#[cfg(feature = "proptest")]
pub mod proptest;

pub mod traits {
    pub use octfv_traits::*;
}

pub extern crate nalgebra;

pub use octfv_traits::Real;
