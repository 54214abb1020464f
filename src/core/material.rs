//! Physical materials, the session material table, and pairwise combination.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{PhysicsError, PhysicsResult};

/// Largest number of materials a table can hold.
pub const MAX_MATERIALS: usize = 256;

/// Small integer key into the material table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MaterialId(pub u16);

impl MaterialId {
    pub const DEFAULT: Self = Self(0);

    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

/// Immutable physical properties. Build with [`Material::builder`] or a preset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    id: MaterialId,
    density: f32,
    static_friction: f32,
    dynamic_friction: f32,
    rolling_friction: f32,
    elasticity_normal: f32,
    elasticity_tangential: f32,
    elasticity_torsional: f32,
}

impl Material {
    pub fn builder(id: MaterialId) -> MaterialBuilder {
        MaterialBuilder::new(id)
    }

    pub fn rubber(id: MaterialId) -> Self {
        Self::preset(id, 1.4, 1.2, 1.0, 0.04, 0.8)
    }

    pub fn steel(id: MaterialId) -> Self {
        Self::preset(id, 7.8, 0.58, 0.44, 0.015, 0.4)
    }

    pub fn ice(id: MaterialId) -> Self {
        Self::preset(id, 0.9, 0.05, 0.03, 0.005, 0.05)
    }

    pub fn wood(id: MaterialId) -> Self {
        Self::preset(id, 0.7, 0.5, 0.3, 0.02, 0.3)
    }

    fn preset(
        id: MaterialId,
        density: f32,
        static_friction: f32,
        dynamic_friction: f32,
        rolling_friction: f32,
        elasticity_normal: f32,
    ) -> Self {
        Self {
            id,
            density,
            static_friction,
            dynamic_friction,
            rolling_friction,
            elasticity_normal,
            elasticity_tangential: 0.0,
            elasticity_torsional: 0.0,
        }
    }

    pub fn id(&self) -> MaterialId {
        self.id
    }

    pub fn density(&self) -> f32 {
        self.density
    }

    pub fn static_friction(&self) -> f32 {
        self.static_friction
    }

    pub fn dynamic_friction(&self) -> f32 {
        self.dynamic_friction
    }

    pub fn rolling_friction(&self) -> f32 {
        self.rolling_friction
    }

    pub fn elasticity_normal(&self) -> f32 {
        self.elasticity_normal
    }

    pub fn elasticity_tangential(&self) -> f32 {
        self.elasticity_tangential
    }

    pub fn elasticity_torsional(&self) -> f32 {
        self.elasticity_torsional
    }
}

/// Validating builder for [`Material`].
#[derive(Debug, Clone, Copy)]
pub struct MaterialBuilder {
    material: Material,
}

impl MaterialBuilder {
    pub fn new(id: MaterialId) -> Self {
        Self {
            material: Material {
                id,
                density: 1.0,
                static_friction: 0.5,
                dynamic_friction: 0.3,
                rolling_friction: 0.02,
                elasticity_normal: 0.1,
                elasticity_tangential: 0.0,
                elasticity_torsional: 0.0,
            },
        }
    }

    pub fn density(mut self, density: f32) -> Self {
        self.material.density = density;
        self
    }

    pub fn friction(mut self, static_friction: f32, dynamic_friction: f32) -> Self {
        self.material.static_friction = static_friction;
        self.material.dynamic_friction = dynamic_friction;
        self
    }

    pub fn rolling_friction(mut self, rolling_friction: f32) -> Self {
        self.material.rolling_friction = rolling_friction;
        self
    }

    pub fn elasticity(mut self, normal: f32, tangential: f32, torsional: f32) -> Self {
        self.material.elasticity_normal = normal;
        self.material.elasticity_tangential = tangential;
        self.material.elasticity_torsional = torsional;
        self
    }

    /// Rejects non-positive density and negative or out-of-range coefficients.
    /// Dynamic friction above static friction is clamped down, not rejected.
    pub fn build(self) -> PhysicsResult<Material> {
        let mut m = self.material;
        if !(m.density > 0.0 && m.density.is_finite()) {
            return Err(PhysicsError::invalid(format!(
                "material {} density must be positive, got {}",
                m.id.0, m.density
            )));
        }
        let coefficients = [
            ("static_friction", m.static_friction),
            ("dynamic_friction", m.dynamic_friction),
            ("rolling_friction", m.rolling_friction),
        ];
        for (name, value) in coefficients {
            if !(value >= 0.0 && value.is_finite()) {
                return Err(PhysicsError::invalid(format!(
                    "material {} {name} must be non-negative, got {value}",
                    m.id.0
                )));
            }
        }
        let elasticities = [
            ("elasticity_normal", m.elasticity_normal),
            ("elasticity_tangential", m.elasticity_tangential),
            ("elasticity_torsional", m.elasticity_torsional),
        ];
        for (name, value) in elasticities {
            if !(0.0..=1.0).contains(&value) {
                return Err(PhysicsError::invalid(format!(
                    "material {} {name} must lie in [0, 1], got {value}",
                    m.id.0
                )));
            }
        }
        m.dynamic_friction = m.dynamic_friction.min(m.static_friction);
        Ok(m)
    }
}

/// How two coefficients are merged into one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MixingMode {
    Average,
    Min,
    Max,
    #[default]
    Product,
    GeometricMean,
}

impl MixingMode {
    pub fn combine(self, a: f32, b: f32) -> f32 {
        match self {
            MixingMode::Average => 0.5 * (a + b),
            MixingMode::Min => a.min(b),
            MixingMode::Max => a.max(b),
            MixingMode::Product => a * b,
            MixingMode::GeometricMean => (a * b).max(0.0).sqrt(),
        }
    }
}

/// Pairwise combination rules. The default (product for friction, minimum
/// for elasticity) is a compatibility policy, not a physical law.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CombinePolicy {
    pub friction: MixingMode,
    pub elasticity: MixingMode,
}

impl Default for CombinePolicy {
    fn default() -> Self {
        Self {
            friction: MixingMode::Product,
            elasticity: MixingMode::Min,
        }
    }
}

/// Coefficients for one contacting pair, consumed by the resolver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialPair {
    pub static_friction: f32,
    pub dynamic_friction: f32,
    pub rolling_friction: f32,
    pub elasticity_normal: f32,
    pub elasticity_tangential: f32,
    pub elasticity_torsional: f32,
}

impl MaterialPair {
    pub fn combine(a: &Material, b: &Material, policy: CombinePolicy) -> Self {
        let friction = policy.friction;
        let elasticity = policy.elasticity;
        let static_friction = friction.combine(a.static_friction, b.static_friction);
        let dynamic_friction = friction
            .combine(a.dynamic_friction, b.dynamic_friction)
            .min(static_friction);
        Self {
            static_friction,
            dynamic_friction,
            rolling_friction: friction.combine(a.rolling_friction, b.rolling_friction),
            elasticity_normal: elasticity.combine(a.elasticity_normal, b.elasticity_normal),
            elasticity_tangential: elasticity
                .combine(a.elasticity_tangential, b.elasticity_tangential),
            elasticity_torsional: elasticity
                .combine(a.elasticity_torsional, b.elasticity_torsional),
        }
    }

    /// Frictionless pair with the given normal elasticity.
    pub fn frictionless(elasticity_normal: f32) -> Self {
        Self {
            static_friction: 0.0,
            dynamic_friction: 0.0,
            rolling_friction: 0.0,
            elasticity_normal,
            elasticity_tangential: 0.0,
            elasticity_torsional: 0.0,
        }
    }
}

/// Dense table of materials keyed by [`MaterialId`].
#[derive(Debug, Clone, Default)]
pub struct MaterialTable {
    slots: Vec<Option<Material>>,
    policy: CombinePolicy,
}

impl MaterialTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table holding `Material::builder(MaterialId::DEFAULT)` defaults in slot 0.
    pub fn with_default_material() -> Self {
        let mut table = Self::new();
        let default = Material::builder(MaterialId::DEFAULT).build();
        if let Ok(material) = default {
            table.slots.push(Some(material));
        }
        table
    }

    pub fn with_policy(mut self, policy: CombinePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn policy(&self) -> CombinePolicy {
        self.policy
    }

    /// Stores `material` in the slot named by its id, replacing any previous entry.
    pub fn insert(&mut self, material: Material) -> PhysicsResult<MaterialId> {
        let index = material.id().index();
        if index >= MAX_MATERIALS {
            return Err(PhysicsError::invalid(format!(
                "material id {index} exceeds table capacity {MAX_MATERIALS}"
            )));
        }
        if self.slots.len() <= index {
            self.slots.resize(index + 1, None);
        }
        self.slots[index] = Some(material);
        Ok(material.id())
    }

    pub fn get(&self, id: MaterialId) -> PhysicsResult<&Material> {
        self.slots
            .get(id.index())
            .and_then(Option::as_ref)
            .ok_or(PhysicsError::MaterialIndexOutOfRange {
                index: id.0,
                len: self.slots.len(),
            })
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.get(id).is_ok()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Combined coefficients for two registered materials.
    pub fn pair(&self, a: MaterialId, b: MaterialId) -> PhysicsResult<MaterialPair> {
        Ok(MaterialPair::combine(self.get(a)?, self.get(b)?, self.policy))
    }
}

/// Shared handle to the session's material table.
#[derive(Debug, Clone, Default)]
pub struct MaterialRegistry {
    inner: Arc<RwLock<MaterialTable>>,
}

impl MaterialRegistry {
    pub fn new(table: MaterialTable) -> Self {
        Self {
            inner: Arc::new(RwLock::new(table)),
        }
    }

    pub fn register(&self, material: Material) -> PhysicsResult<MaterialId> {
        self.inner.write().insert(material)
    }

    pub fn get(&self, id: MaterialId) -> PhysicsResult<Material> {
        self.inner.read().get(id).copied()
    }

    pub fn contains(&self, id: MaterialId) -> bool {
        self.inner.read().contains(id)
    }

    pub fn pair(&self, a: MaterialId, b: MaterialId) -> PhysicsResult<MaterialPair> {
        self.inner.read().pair(a, b)
    }

    /// Runs `f` with the table read-locked.
    pub fn read<R>(&self, f: impl FnOnce(&MaterialTable) -> R) -> R {
        f(&self.inner.read())
    }
}
