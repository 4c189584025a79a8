//! Matrix-free BICGSTAB over element slots.
use crate::algebra::{
    field_copy, field_fill, field_sum, global_element_count, scalar_prod, ScalarBuffer, ScalarSlot,
};
use crate::element::{Buffer, Slot};
use crate::field::FlowField;
use crate::Real;
use log::{debug, info, warn};
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use octfv_traits::comm::Communicator;
use serde::{Deserialize, Serialize};

/// A linear operator acting on one slot of every element.
pub trait FieldOperator<T, D>
where
    T: Real,
    D: DimName,
    DefaultAllocator: DimAllocator<T, D>,
{
    /// Computes `y = A x` on all local elements. Collective.
    fn apply(&mut self, field: &mut FlowField<T, D>, x: Slot, y: Buffer) -> eyre::Result<()>;
}

impl<'a, T, D, A> FieldOperator<T, D> for &'a mut A
where
    T: Real,
    D: DimName,
    A: ?Sized + FieldOperator<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn apply(&mut self, field: &mut FlowField<T, D>, x: Slot, y: Buffer) -> eyre::Result<()> {
        <A as FieldOperator<T, D>>::apply(self, field, x, y)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BicgstabSettings {
    /// Tolerance on the root-mean-square residual.
    pub epsilon: f64,
    pub k_max: usize,
    /// Minimum number of iterations before convergence is accepted.
    pub k_min: usize,
    /// Added to every denominator.
    pub small: f64,
}

impl Default for BicgstabSettings {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            k_max: 50,
            k_min: 2,
            small: 1e-30,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct BicgstabOutput<T> {
    pub converged: bool,
    pub num_iterations: usize,
    /// Root-mean-square residual of the initial guess.
    pub initial_residual: T,
    /// Root-mean-square residual of the returned iterate.
    pub residual: T,
}

/// Buffers overwritten by [`Bicgstab::solve`].
pub const WORK_BUFFERS: [Buffer; 8] = [
    Buffer::Ax,
    Buffer::R,
    Buffer::R0,
    Buffer::P,
    Buffer::V,
    Buffer::H,
    Buffer::S,
    Buffer::T,
];

#[derive(Debug, Clone)]
pub struct Bicgstab<T> {
    settings: BicgstabSettings,
    scalars: ScalarBuffer<T>,
}

impl<T: Real> Default for Bicgstab<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Real> Bicgstab<T> {
    pub fn new() -> Self {
        Self {
            settings: BicgstabSettings::default(),
            scalars: ScalarBuffer::default(),
        }
    }

    pub fn with_settings(self, settings: BicgstabSettings) -> Self {
        Self { settings, ..self }
    }

    pub fn settings(&self) -> &BicgstabSettings {
        &self.settings
    }

    /// The scalar buffer as left by the most recent solve.
    pub fn scalars(&self) -> &ScalarBuffer<T> {
        &self.scalars
    }

    /// Solves `A x = b`, using the current content of `x` as initial guess.
    ///
    /// Collective: every process must call `solve` with the same settings. The slots in
    /// [`WORK_BUFFERS`] are overwritten. If the iteration does not reach the tolerance within
    /// `k_max` iterations, the last iterate is left in `x` and the output reports
    /// `converged == false`.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `b` is one of the work buffers.
    pub fn solve<D, A, C>(
        &mut self,
        mut operator: A,
        field: &mut FlowField<T, D>,
        comm: &C,
        x: Slot,
        b: Buffer,
    ) -> eyre::Result<BicgstabOutput<T>>
    where
        D: DimName,
        A: FieldOperator<T, D>,
        C: ?Sized + Communicator<T>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        use ScalarSlot::*;
        assert!(
            !WORK_BUFFERS.iter().any(|&w| Slot::Buffer(w) == x || w == b),
            "Solution and right-hand side must not alias the BICGSTAB work buffers."
        );

        let settings = self.settings;
        let small = T::from_f64(settings.small).unwrap();
        let epsilon = T::from_f64(settings.epsilon).unwrap();
        let num_elements = global_element_count(field.elements(), comm)?;
        self.scalars = ScalarBuffer::default();

        // r = b - Ax
        operator.apply(field, x, Buffer::Ax)?;
        let elements = field.elements_mut();
        field_sum(elements, b.into(), Buffer::Ax.into(), Buffer::R.into(), T::one(), -T::one());
        field_copy(elements, Buffer::R.into(), Buffer::R0.into());
        field_fill(elements, Buffer::P.into(), T::zero());
        field_fill(elements, Buffer::V.into(), T::zero());

        let initial_residual = self.rms(field, comm, Buffer::R, num_elements)?;
        let mut residual = initial_residual;
        let mut converged = settings.k_min == 0 && residual < epsilon;
        let mut num_iterations = 0;

        self.scalars[Rho0] = T::one();
        self.scalars[Alpha] = T::one();
        self.scalars[Omega] = T::one();

        while !converged && num_iterations < settings.k_max {
            num_iterations += 1;
            let accept = |residual: T| residual < epsilon && num_iterations >= settings.k_min;

            let scalars = &mut self.scalars;
            let rho = scalar_prod(field.elements(), comm, scalars, Buffer::R0.into(), Buffer::R.into(), Rho)?;
            let beta = (rho / (self.scalars[Rho0] + small)) * (self.scalars[Alpha] / (self.scalars[Omega] + small));
            self.scalars[Beta] = beta;

            // p = r + beta (p - omega v)
            let omega = self.scalars[Omega];
            let elements = field.elements_mut();
            field_sum(elements, Buffer::P.into(), Buffer::V.into(), Buffer::P.into(), T::one(), -omega);
            field_sum(elements, Buffer::R.into(), Buffer::P.into(), Buffer::P.into(), T::one(), beta);

            operator.apply(field, Buffer::P.into(), Buffer::V)?;
            let scalars = &mut self.scalars;
            let r0_v = scalar_prod(field.elements(), comm, scalars, Buffer::R0.into(), Buffer::V.into(), Alpha)?;
            let alpha = rho / (r0_v + small);
            self.scalars[Alpha] = alpha;

            field_sum(field.elements_mut(), x, Buffer::P.into(), Buffer::H.into(), T::one(), alpha);
            residual = self.system_residual(&mut operator, field, comm, Buffer::H.into(), b, num_elements)?;
            if accept(residual) {
                field_copy(field.elements_mut(), Buffer::H.into(), x);
                converged = true;
                debug!("BICGSTAB iteration {}: residual {} (early exit)", num_iterations, residual);
                break;
            }

            let elements = field.elements_mut();
            field_sum(elements, Buffer::R.into(), Buffer::V.into(), Buffer::S.into(), T::one(), -alpha);
            operator.apply(field, Buffer::S.into(), Buffer::T)?;
            let scalars = &mut self.scalars;
            let t_s = scalar_prod(field.elements(), comm, scalars, Buffer::T.into(), Buffer::S.into(), Omega)?;
            let t_t = scalar_prod(field.elements(), comm, scalars, Buffer::T.into(), Buffer::T.into(), Omega)?;
            let omega = t_s / (t_t + small);
            self.scalars[Omega] = omega;

            field_sum(field.elements_mut(), Buffer::H.into(), Buffer::S.into(), x, T::one(), omega);
            residual = self.system_residual(&mut operator, field, comm, x, b, num_elements)?;
            debug!("BICGSTAB iteration {}: residual {}", num_iterations, residual);
            if accept(residual) {
                converged = true;
                break;
            }

            let elements = field.elements_mut();
            field_sum(elements, Buffer::S.into(), Buffer::T.into(), Buffer::R.into(), T::one(), -omega);
            self.scalars[Rho0] = rho;
        }

        if converged {
            info!(
                "BICGSTAB converged after {} iterations (residual {}, initial {})",
                num_iterations, residual, initial_residual
            );
        } else {
            warn!(
                "BICGSTAB did not converge within {} iterations (residual {}, tolerance {})",
                settings.k_max, residual, epsilon
            );
        }

        Ok(BicgstabOutput {
            converged,
            num_iterations,
            initial_residual,
            residual,
        })
    }

    /// Root-mean-square of the residual `b - A y`. Uses `Ax` as scratch.
    fn system_residual<D, A, C>(
        &mut self,
        operator: &mut A,
        field: &mut FlowField<T, D>,
        comm: &C,
        y: Slot,
        b: Buffer,
        num_elements: T,
    ) -> eyre::Result<T>
    where
        D: DimName,
        A: FieldOperator<T, D>,
        C: ?Sized + Communicator<T>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        operator.apply(field, y, Buffer::Ax)?;
        field_sum(field.elements_mut(), b.into(), Buffer::Ax.into(), Buffer::Ax.into(), T::one(), -T::one());
        self.rms(field, comm, Buffer::Ax, num_elements)
    }

    fn rms<D, C>(&mut self, field: &FlowField<T, D>, comm: &C, r: Buffer, num_elements: T) -> eyre::Result<T>
    where
        D: DimName,
        C: ?Sized + Communicator<T>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        let squared = scalar_prod(
            field.elements(),
            comm,
            &mut self.scalars,
            r.into(),
            r.into(),
            ScalarSlot::GlobalResidual,
        )?;
        let residual = if num_elements > T::zero() {
            (squared / num_elements).sqrt()
        } else {
            T::zero()
        };
        self.scalars[ScalarSlot::Residual] = residual;
        Ok(residual)
    }
}
