//! Simulation dynamics: external forces, integration, and contact resolution.

pub mod forces;
pub mod integrator;
pub mod resolver;

pub use forces::{
    DragForce, ForceGenerator, ForceRegistry, GravityField, RadialGravity, SpringForce,
    UniformGravity,
};
pub use integrator::Integrator;
pub use resolver::{ContactPair, ImpulseResolver, ResolverMetrics, SolverBody};
