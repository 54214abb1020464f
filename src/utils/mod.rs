//! Utility helpers including math extensions, allocators, logging, and spatial vectors.

pub mod allocator;
pub mod logging;
pub mod math;
pub mod spatial;

pub use spatial::SpatialVec;

pub use allocator::{Arena, BodyHandle};
pub use math::*;
