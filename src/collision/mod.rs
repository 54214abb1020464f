//! Collision detection: broad phase, narrow-phase dispatch, contact
//! manifolds, the per-pair cache, and the terrain interface.

pub mod broadphase;
pub mod cache;
pub mod clipping;
pub mod contact;
pub mod narrowphase;
mod primitives;
pub mod sat;
pub mod terrain;

pub use broadphase::{BroadPhase, BroadPhaseProxy, SweepAndPrune, UniformGrid};
pub use cache::{CacheEntry, CacheStats, CollisionCache, PairKey};
pub use contact::{ContactManifold, ContactPoint, Feature, FeaturePair, MAX_MANIFOLD_POINTS};
pub use narrowphase::{CollisionAgent, DetectFn, Dispatch, WarmStart};
pub use sat::SatAxis;
pub use terrain::{
    FlatTerrain, HeightFieldTerrain, NoTerrain, Terrain, TerrainContact, TerrainSample,
    TerrainTriangle, TriangleSoupTerrain,
};
