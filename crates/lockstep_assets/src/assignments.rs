//! Grouping of finished texture loads by material and role.

use std::collections::BTreeMap;

use lockstep_core::{CancellationToken, CoreError, CoreResult, WorkerPool};

use crate::ids::{MaterialId, TextureId};
use crate::renderer::ResourceFactory;
use crate::requests::{LoadOutcome, TextureLoadResults, TextureRole};

/// Every texture resolved for one material, grouped by role.
#[derive(Clone, Debug)]
pub struct MaterialTextureAssignment {
    /// Material the textures belong to.
    pub material: MaterialId,
    /// Outcomes per role, in request order.
    pub textures: BTreeMap<TextureRole, Vec<LoadOutcome<TextureId>>>,
}

impl MaterialTextureAssignment {
    fn new(material: MaterialId) -> Self {
        Self {
            material,
            textures: BTreeMap::new(),
        }
    }

    /// Identifiers resolved for `role`.
    #[must_use]
    pub fn ids(&self, role: TextureRole) -> Vec<TextureId> {
        self.textures
            .get(&role)
            .map(|outcomes| outcomes.iter().map(|o| o.id).collect())
            .unwrap_or_default()
    }

    /// The identifier bound for `role`: the first one requested.
    #[must_use]
    pub fn primary(&self, role: TextureRole) -> Option<TextureId> {
        self.textures
            .get(&role)
            .and_then(|outcomes| outcomes.first())
            .map(|o| o.id)
    }

    /// Binds the primary texture of every role to the material.
    pub fn apply(&self, factory: &dyn ResourceFactory) {
        for role in self.textures.keys().copied() {
            if let Some(texture) = self.primary(role) {
                factory.assign_texture(self.material, role, texture);
            }
        }
    }
}

/// Waits for every texture in `results` and groups them per material.
///
/// The wait re-checks `token` and the texture pool between polls, so it
/// cannot outlive shutdown.
///
/// # Errors
///
/// [`CoreError::Cancelled`] if the token is cancelled, or
/// [`CoreError::PoolExiting`] if `pool` starts shutting down, before every
/// texture has finished.
pub fn resolve_texture_assignments(
    results: &TextureLoadResults,
    pool: &WorkerPool,
    token: &CancellationToken,
) -> CoreResult<Vec<MaterialTextureAssignment>> {
    let mut assignments = Vec::with_capacity(results.len());

    for (&material, textures) in results {
        let mut assignment = MaterialTextureAssignment::new(material);
        for texture in textures {
            let outcome = loop {
                if let Some(outcome) = texture.result.try_get() {
                    break outcome;
                }
                if token.is_cancelled() {
                    return Err(CoreError::Cancelled);
                }
                if pool.is_exiting() {
                    return Err(CoreError::PoolExiting {
                        pool: pool.name().to_string(),
                    });
                }
                if let Some(outcome) = texture.result.wait_timeout(token.poll_interval()) {
                    break outcome;
                }
            };
            assignment
                .textures
                .entry(texture.role)
                .or_default()
                .push(outcome);
        }
        assignments.push(assignment);
    }

    assignments.sort_by_key(|a| a.material);
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::requests::{DeferredLoad, TextureLoadResult};
    use lockstep_core::{promise, SharedFuture};
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    fn ready(id: u32) -> DeferredLoad<TextureId> {
        DeferredLoad::new(
            SharedFuture::ready(LoadOutcome::loaded(TextureId(id))),
            Arc::from(Path::new("t.png")),
            TextureId(0),
        )
    }

    #[test]
    fn test_groups_by_material_and_role() {
        let pool = WorkerPool::new("tex", 1).unwrap();
        let token = CancellationToken::new();
        let mut results: TextureLoadResults = HashMap::new();
        results.entry(MaterialId(2)).or_default().extend([
            TextureLoadResult { role: TextureRole::Diffuse, result: ready(5) },
            TextureLoadResult { role: TextureRole::Normal, result: ready(6) },
            TextureLoadResult { role: TextureRole::Diffuse, result: ready(7) },
        ]);
        results.entry(MaterialId(1)).or_default().push(TextureLoadResult {
            role: TextureRole::Roughness,
            result: ready(8),
        });

        let assignments = resolve_texture_assignments(&results, &pool, &token).unwrap();
        assert_eq!(assignments.len(), 2);
        assert_eq!(assignments[0].material, MaterialId(1));
        assert_eq!(assignments[1].ids(TextureRole::Diffuse), vec![TextureId(5), TextureId(7)]);
        assert_eq!(assignments[1].primary(TextureRole::Normal), Some(TextureId(6)));
        assert_eq!(assignments[1].primary(TextureRole::Height), None);
    }

    #[test]
    fn test_wait_abandoned_when_pool_exits() {
        let pool = WorkerPool::new("tex", 1).unwrap();
        let token = CancellationToken::with_poll_interval(Duration::from_millis(1));
        let (_pending, future) = promise();
        let mut results: TextureLoadResults = HashMap::new();
        results.entry(MaterialId(0)).or_default().push(TextureLoadResult {
            role: TextureRole::Diffuse,
            result: DeferredLoad::new(future, Arc::from(Path::new("slow.png")), TextureId(0)),
        });

        pool.shutdown();
        assert!(matches!(
            resolve_texture_assignments(&results, &pool, &token),
            Err(CoreError::PoolExiting { .. })
        ));

        token.cancel();
        let live_pool = WorkerPool::new("tex2", 1).unwrap();
        assert!(matches!(
            resolve_texture_assignments(&results, &live_pool, &token),
            Err(CoreError::Cancelled)
        ));
    }
}
