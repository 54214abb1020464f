//! Error types reported by construction paths of the physics core.

use thiserror::Error;

use crate::core::shape::ShapeKind;

/// Errors surfaced synchronously when materials, shapes, bodies, or the
/// world configuration are built. The per-step pipeline never returns these.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PhysicsError {
    /// Malformed material, shape, body, or configuration parameters.
    #[error("invalid settings: {reason}")]
    InvalidSettings {
        /// Description of the rejected parameter.
        reason: String,
    },

    /// A material id that is not registered in the material table.
    #[error("material index {index} out of range (table holds {len} slots)")]
    MaterialIndexOutOfRange {
        /// The requested material id.
        index: u16,
        /// Number of slots currently in the table.
        len: usize,
    },

    /// No detection routine exists for this combination of shape kinds.
    #[error("no collision routine for shape pair {a:?} / {b:?}")]
    UnsupportedShapePair {
        /// Kind of the first shape.
        a: ShapeKind,
        /// Kind of the second shape.
        b: ShapeKind,
    },

    /// Shape rejected because its mass properties would divide by ~0.
    #[error("shape volume {volume} is below the minimum {minimum}")]
    VolumeTooSmall {
        /// Computed volume.
        volume: f32,
        /// Smallest accepted volume.
        minimum: f32,
    },
}

impl PhysicsError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidSettings {
            reason: reason.into(),
        }
    }
}

/// Result alias used across construction APIs.
pub type PhysicsResult<T> = Result<T, PhysicsError>;
