use crate::{
    config::SimulationConfig,
    dynamics::{integrator::Integrator, resolver::ImpulseResolver},
};

/// Dynamics half of the world: the integrator with its force sources and the
/// contact resolver.
pub struct DynamicsManager {
    pub integrator: Integrator,
    pub resolver: ImpulseResolver,
}

impl DynamicsManager {
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            integrator: Integrator::from_config(config),
            resolver: ImpulseResolver::from_config(config),
        }
    }
}
