use std::collections::HashSet;

use log::warn;
#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{
    collision::{
        broadphase::{BroadPhase, UniformGrid},
        cache::{CacheStats, CollisionCache, PairKey},
        contact::ContactManifold,
        narrowphase::{CollisionAgent, Dispatch, WarmStart},
    },
    config::SimulationConfig,
    core::rigidbody::{BodyKind, RigidBody},
    error::PhysicsResult,
    utils::{Arena, BodyHandle},
};

/// Collision state that persists across steps: the broad phase, the pair
/// cache, and which unsupported pairs have already been reported.
pub struct CollisionManager {
    pub broadphase: Box<dyn BroadPhase>,
    cache: CollisionCache,
    eviction_frames: u64,
    warned: HashSet<PairKey>,
}

/// Narrow-phase work item. Hints are copied out of the cache before detection
/// and written back after it, so each entry has a single writer.
struct DetectJob {
    key: PairKey,
    dispatch: Dispatch,
    warm: WarmStart,
    cached: bool,
}

impl CollisionManager {
    pub fn new(config: &SimulationConfig) -> PhysicsResult<Self> {
        Ok(Self {
            broadphase: Box::new(UniformGrid::new(config.broadphase_cell_size)),
            cache: CollisionCache::with_capacity(config.cache_capacity)?,
            eviction_frames: config.cache_eviction_frames,
            warned: HashSet::new(),
        })
    }

    pub fn cache(&self) -> &CollisionCache {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Detects every candidate pair and returns the touching ones in pair order.
    pub(crate) fn narrow_phase(
        &mut self,
        bodies: &Arena<RigidBody>,
        pairs: &[(BodyHandle, BodyHandle)],
        frame: u64,
    ) -> Vec<(PairKey, ContactManifold)> {
        let mut jobs = Vec::with_capacity(pairs.len());
        let mut uncached = 0usize;
        for &(a, b) in pairs {
            let key = PairKey::new(a, b);
            let (Some(body_a), Some(body_b)) = (bodies.get(key.low()), bodies.get(key.high())) else {
                continue;
            };
            // Kinematic pairs are still detected so they report contact events.
            if body_a.kind() == BodyKind::Static && body_b.kind() == BodyKind::Static {
                continue;
            }

            let kinds = (body_a.shape().kind(), body_b.shape().kind());
            let (dispatch, warm, cached) = match self.cache.get_or_insert(key, kinds, frame) {
                Some(entry) => (entry.dispatch, entry.warm, true),
                None => {
                    uncached += 1;
                    (CollisionAgent::dispatch(kinds.0, kinds.1), WarmStart::default(), false)
                }
            };
            if !dispatch.is_supported() {
                if self.warned.insert(key) {
                    warn!(
                        "no collision routine for {:?} / {:?} (bodies {:?}, {:?}); pair skipped",
                        kinds.0,
                        kinds.1,
                        key.low(),
                        key.high()
                    );
                }
                continue;
            }
            jobs.push(DetectJob {
                key,
                dispatch,
                warm,
                cached,
            });
        }
        if uncached > 0 {
            warn!("collision cache saturated: {uncached} pairs detected without warm start");
        }

        #[cfg(feature = "parallel")]
        let manifolds: Vec<Option<ContactManifold>> =
            jobs.par_iter_mut().map(|job| detect(bodies, job)).collect();
        #[cfg(not(feature = "parallel"))]
        let manifolds: Vec<Option<ContactManifold>> =
            jobs.iter_mut().map(|job| detect(bodies, job)).collect();

        let mut touching = Vec::new();
        for (job, manifold) in jobs.into_iter().zip(manifolds) {
            if job.cached {
                if let Some(entry) = self.cache.lookup_mut(&job.key) {
                    entry.warm = job.warm;
                }
            }
            if let Some(manifold) = manifold.filter(|manifold| !manifold.is_empty()) {
                touching.push((job.key, manifold));
            }
        }
        touching
    }

    /// Drops entries that have not been used for longer than the configured age.
    pub(crate) fn evict(&mut self, frame: u64) -> usize {
        self.cache.evict(frame, self.eviction_frames)
    }

    pub(crate) fn forget_body(&mut self, handle: BodyHandle) {
        self.cache.remove_body(handle);
        self.warned.retain(|key| !key.involves(handle));
    }
}

fn detect(bodies: &Arena<RigidBody>, job: &mut DetectJob) -> Option<ContactManifold> {
    let a = bodies.get(job.key.low())?;
    let b = bodies.get(job.key.high())?;
    CollisionAgent::detect_with(job.dispatch, a.shape(), a.pose(), b.shape(), b.pose(), &mut job.warm).ok()
}
