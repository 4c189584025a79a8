//! Entry points for advancing a transport equation by one time step.
use crate::algebra::field_copy;
use crate::bicgstab::{Bicgstab, BicgstabOutput, FieldOperator};
use crate::convection::{add_convective_fluxes, add_time_derivative, AssemblyContext, TemporalScheme};
use crate::element::{Buffer, Slot, Var};
use crate::field::FlowField;
use crate::gradient::compute_gradients;
use crate::mesh::{GhostExchange, MeshIterator};
use crate::settings::{Settings, TimeSettings};
use crate::Real;
use log::info;
use nalgebra::{DefaultAllocator, DimName};
use octfv_traits::allocators::DimAllocator;
use octfv_traits::comm::Communicator;

/// Assembles the transport operator into `ctx.target`.
///
/// The target buffer is zeroed, the gradient of `ctx.var` is recomputed (which refreshes ghosts),
/// then the convective fluxes and the unsteady term are accumulated.
pub fn assemble<T, D, M>(mesh: &M, field: &mut FlowField<T, D>, ctx: &AssemblyContext<T>) -> eyre::Result<()>
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator + GhostExchange<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    mesh.for_each_element(&mut |handle| *field.elements_mut()[handle].buffer_mut(ctx.target) = T::zero());
    compute_gradients(mesh, field, ctx.var)?;
    add_convective_fluxes(mesh, field, ctx);
    add_time_derivative(mesh, field, ctx);
    Ok(())
}

/// The implicit transport operator for one variable, for use with BICGSTAB.
#[derive(Debug)]
pub struct TransportOperator<'a, T, M: ?Sized> {
    mesh: &'a M,
    var: Var,
    flux_factor: T,
    timestep: T,
}

impl<'a, T: Real, M: ?Sized> TransportOperator<'a, T, M> {
    pub fn new(mesh: &'a M, var: Var, time: &TimeSettings) -> Self {
        Self {
            mesh,
            var,
            flux_factor: time.scheme.implicit_flux_factor(),
            timestep: T::from_f64(time.timestep).unwrap(),
        }
    }
}

impl<'a, T, D, M> FieldOperator<T, D> for TransportOperator<'a, T, M>
where
    T: Real,
    D: DimName,
    M: ?Sized + MeshIterator + GhostExchange<T, D>,
    DefaultAllocator: DimAllocator<T, D>,
{
    fn apply(&mut self, field: &mut FlowField<T, D>, x: Slot, y: Buffer) -> eyre::Result<()> {
        let ctx = AssemblyContext {
            var: self.var,
            source: x,
            target: y,
            flux_factor: self.flux_factor,
            timestep: self.timestep,
        };
        assemble(self.mesh, field, &ctx)
    }
}

#[non_exhaustive]
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TransportOutcome<T> {
    pub var: Var,
    pub scheme: TemporalScheme,
    /// Present for implicit schemes.
    pub bicgstab: Option<BicgstabOutput<T>>,
}

/// Advances transport equations on the local part of a distributed forest.
///
/// All methods that take a field are collective and must be called in the same order on every
/// process.
#[derive(Debug)]
pub struct TransportSolver<'a, T, M: ?Sized, C: ?Sized> {
    mesh: &'a M,
    comm: &'a C,
    time: TimeSettings,
    bicgstab: Bicgstab<T>,
}

impl<'a, T, M, C> TransportSolver<'a, T, M, C>
where
    T: Real,
    M: ?Sized,
    C: ?Sized + Communicator<T>,
{
    pub fn new(mesh: &'a M, comm: &'a C, settings: &Settings) -> Self {
        Self {
            mesh,
            comm,
            time: settings.time,
            bicgstab: Bicgstab::new().with_settings(settings.bicgstab),
        }
    }

    pub fn time_settings(&self) -> &TimeSettings {
        &self.time
    }

    fn timestep(&self) -> T {
        T::from_f64(self.time.timestep).unwrap()
    }

    /// Computes the gradients of all state variables.
    pub fn initialize_gradients<D>(&self, field: &mut FlowField<T, D>) -> eyre::Result<()>
    where
        D: DimName,
        M: MeshIterator + GhostExchange<T, D>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        for var in Var::ALL {
            compute_gradients(self.mesh, field, var)?;
        }
        Ok(())
    }

    /// Assembles the right-hand side for `var` into `b`.
    pub fn compute_rhs<D>(&self, field: &mut FlowField<T, D>, var: Var) -> eyre::Result<()>
    where
        D: DimName,
        M: MeshIterator + GhostExchange<T, D>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        let ctx = AssemblyContext {
            var,
            source: var.into(),
            target: Buffer::B,
            flux_factor: self.time.scheme.rhs_flux_factor(),
            timestep: self.timestep(),
        };
        assemble(self.mesh, field, &ctx)
    }

    /// Applies the implicit operator for `var` to `source` and stores the result in `target`.
    pub fn compute_ax<D>(&self, field: &mut FlowField<T, D>, var: Var, source: Slot, target: Buffer) -> eyre::Result<()>
    where
        D: DimName,
        M: MeshIterator + GhostExchange<T, D>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        TransportOperator::<T, M>::new(self.mesh, var, &self.time).apply(field, source, target)
    }

    /// Sets `var = b * dt / (vol * rho)` on every local element.
    pub fn solve_explicit_sequential<D>(&self, field: &mut FlowField<T, D>, var: Var)
    where
        D: DimName,
        M: MeshIterator,
        DefaultAllocator: DimAllocator<T, D>,
    {
        let dt = self.timestep();
        self.mesh.for_each_element(&mut |handle| {
            let element = &mut field.elements_mut()[handle];
            let value = element.buffer(Buffer::B) * dt / (element.volume() * element.var(Var::Rho));
            element.set_var(var, value);
        });
    }

    /// Solves the implicit system for `var` with BICGSTAB, starting from the current state.
    pub fn solve_implicit_sequential<D>(
        &mut self,
        field: &mut FlowField<T, D>,
        var: Var,
    ) -> eyre::Result<BicgstabOutput<T>>
    where
        D: DimName,
        M: MeshIterator + GhostExchange<T, D>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        field_copy(field.elements_mut(), var.into(), Buffer::Vn.into());
        let operator = TransportOperator::<T, M>::new(self.mesh, var, &self.time);
        let output = self
            .bicgstab
            .solve(operator, field, self.comm, Buffer::Vn.into(), Buffer::B)?;
        field_copy(field.elements_mut(), Buffer::Vn.into(), var.into());
        Ok(output)
    }

    /// Advances `var` by one time step and refreshes the ghosts.
    pub fn solve_tran_eq<D>(&mut self, field: &mut FlowField<T, D>, var: Var) -> eyre::Result<TransportOutcome<T>>
    where
        D: DimName,
        M: MeshIterator + GhostExchange<T, D>,
        DefaultAllocator: DimAllocator<T, D>,
    {
        field.elements_mut().reset_buffers();
        self.compute_rhs(field, var)?;

        let scheme = self.time.scheme;
        let bicgstab = if scheme.is_explicit() {
            self.solve_explicit_sequential(field, var);
            None
        } else {
            Some(self.solve_implicit_sequential(field, var)?)
        };

        field.exchange(self.mesh)?;
        if self.comm.rank() == 0 {
            info!("Solved transport equation for {:?} ({:?})", var, scheme);
        }

        Ok(TransportOutcome { var, scheme, bicgstab })
    }
}
