//! # Load Requests and Deferred Results
//!
//! ```text
//!   ModelLoadRequest { owner, path, name, import }   ──┐
//!   ModelLoadRequest { owner', path, name, import }  ──┼─► one import of `path`
//!                                                      │
//!   owner  ──► DeferredLoad<ModelId> ─┐                │
//!   owner' ──► DeferredLoad<ModelId> ─┴── same SharedFuture<LoadOutcome>
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lockstep_core::{CancellationToken, CoreResult, SharedFuture};

use crate::error::AssetError;
use crate::ids::{MaterialId, OwnerId, TextureId};
use crate::import::ImportModelFn;

/// Slot a texture fills on its material.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TextureRole {
    /// Base color.
    Diffuse,
    /// Tangent-space normal map.
    Normal,
    /// Specular intensity.
    Specular,
    /// Alpha mask (cutout).
    AlphaMask,
    /// Emissive color.
    Emissive,
    /// Height / displacement.
    Height,
    /// Metalness.
    Metalness,
    /// Roughness.
    Roughness,
}

impl TextureRole {
    /// Every role, in declaration order.
    pub const ALL: [TextureRole; 8] = [
        TextureRole::Diffuse,
        TextureRole::Normal,
        TextureRole::Specular,
        TextureRole::AlphaMask,
        TextureRole::Emissive,
        TextureRole::Height,
        TextureRole::Metalness,
        TextureRole::Roughness,
    ];

    /// Lower-case name, as used in logs and scene files.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TextureRole::Diffuse => "diffuse",
            TextureRole::Normal => "normal",
            TextureRole::Specular => "specular",
            TextureRole::AlphaMask => "alpha_mask",
            TextureRole::Emissive => "emissive",
            TextureRole::Height => "height",
            TextureRole::Metalness => "metalness",
            TextureRole::Roughness => "roughness",
        }
    }

    /// Parses [`TextureRole::as_str`] output.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.as_str() == name)
    }
}

impl fmt::Display for TextureRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A game object's request for a model.
#[derive(Clone)]
pub struct ModelLoadRequest {
    /// Requesting object.
    pub owner: OwnerId,
    /// Source file; the dedup key.
    pub path: PathBuf,
    /// Display name.
    pub name: String,
    /// Importer run on a model worker.
    pub import: ImportModelFn,
}

impl fmt::Debug for ModelLoadRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelLoadRequest")
            .field("owner", &self.owner)
            .field("path", &self.path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A material's request for one texture.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TextureLoadRequest {
    /// Slot the texture fills.
    pub role: TextureRole,
    /// Material the texture belongs to.
    pub material: MaterialId,
    /// Source image; the dedup key within a task.
    pub path: PathBuf,
}

/// Resolved value of a load: the identifier to use, plus the error if the
/// identifier is a fallback.
#[derive(Clone, Debug)]
pub struct LoadOutcome<Id> {
    /// Identifier to render with. Always usable.
    pub id: Id,
    /// Why the fallback was substituted, if it was.
    pub error: Option<Arc<AssetError>>,
}

impl<Id: Copy> LoadOutcome<Id> {
    /// A successful load.
    #[must_use]
    pub fn loaded(id: Id) -> Self {
        Self { id, error: None }
    }

    /// A failed load resolved to `fallback`.
    #[must_use]
    pub fn fallback(fallback: Id, error: AssetError) -> Self {
        Self {
            id: fallback,
            error: Some(Arc::new(error)),
        }
    }

    /// Whether `id` is a substituted fallback.
    #[inline]
    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

/// Handle to a load that may still be running.
///
/// Every owner of the same path holds a clone of the same underlying future.
/// A load whose unit was discarded at shutdown resolves to the fallback.
#[derive(Clone)]
pub struct DeferredLoad<Id> {
    future: SharedFuture<LoadOutcome<Id>>,
    path: Arc<Path>,
    fallback: Id,
}

impl<Id: Copy> DeferredLoad<Id> {
    pub(crate) fn new(future: SharedFuture<LoadOutcome<Id>>, path: Arc<Path>, fallback: Id) -> Self {
        Self {
            future,
            path,
            fallback,
        }
    }

    fn settle(&self, resolved: Option<&LoadOutcome<Id>>) -> LoadOutcome<Id> {
        match resolved {
            Some(outcome) => outcome.clone(),
            None => LoadOutcome::fallback(
                self.fallback,
                AssetError::Abandoned {
                    path: self.path.to_path_buf(),
                },
            ),
        }
    }

    /// Source path of the load.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the load has finished (successfully, with a fallback, or
    /// abandoned).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.future.is_ready() || self.future.is_abandoned()
    }

    /// The outcome, if the load has finished. Never blocks.
    #[must_use]
    pub fn try_get(&self) -> Option<LoadOutcome<Id>> {
        self.is_ready().then(|| self.settle(self.future.try_get()))
    }

    /// Blocks until the load finishes.
    #[must_use]
    pub fn wait(&self) -> LoadOutcome<Id> {
        self.settle(self.future.wait())
    }

    /// Blocks until the load finishes or `timeout` elapses.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<LoadOutcome<Id>> {
        match self.future.wait_timeout(timeout) {
            Some(outcome) => Some(outcome.clone()),
            None if self.future.is_abandoned() => Some(self.settle(None)),
            None => None,
        }
    }

    /// Blocks until the load finishes, giving up if `token` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`lockstep_core::CoreError::Cancelled`] on cancellation.
    pub fn wait_cancellable(&self, token: &CancellationToken) -> CoreResult<LoadOutcome<Id>> {
        let resolved = self.future.wait_cancellable(token)?;
        Ok(self.settle(resolved))
    }

    /// Whether `other` observes the same underlying load.
    #[must_use]
    pub fn shares_load_with(&self, other: &Self) -> bool {
        self.future.ptr_eq(&other.future)
    }
}

impl<Id: fmt::Debug> fmt::Debug for DeferredLoad<Id> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredLoad")
            .field("path", &self.path)
            .field("future", &self.future)
            .finish()
    }
}

/// Deferred model identifier for one owner.
pub type ModelLoadResult = DeferredLoad<crate::ids::ModelId>;

/// One owner → its deferred model.
pub type ModelLoadResults = HashMap<OwnerId, ModelLoadResult>;

/// Deferred texture identifier tagged with the slot it fills.
#[derive(Clone, Debug)]
pub struct TextureLoadResult {
    /// Slot the texture fills.
    pub role: TextureRole,
    /// Deferred texture.
    pub result: DeferredLoad<TextureId>,
}

/// Material → every texture requested for it (a multimap).
pub type TextureLoadResults = HashMap<MaterialId, Vec<TextureLoadResult>>;

#[cfg(test)]
mod tests {
    use super::*;
    use lockstep_core::promise;

    #[test]
    fn test_role_names_round_trip() {
        for role in TextureRole::ALL {
            assert_eq!(TextureRole::from_name(role.as_str()), Some(role));
        }
        assert_eq!(TextureRole::from_name("albedo"), None);
    }

    #[test]
    fn test_abandoned_load_resolves_to_fallback() {
        let (promise, future) = promise::<LoadOutcome<TextureId>>();
        let deferred = DeferredLoad::new(future, Arc::from(Path::new("a.png")), TextureId(0));
        assert!(!deferred.is_ready());
        drop(promise);

        let outcome = deferred.wait();
        assert_eq!(outcome.id, TextureId(0));
        assert!(matches!(
            outcome.error.as_deref(),
            Some(AssetError::Abandoned { .. })
        ));
    }

    #[test]
    fn test_clones_share_one_load() {
        let deferred = DeferredLoad::new(
            SharedFuture::ready(LoadOutcome::loaded(TextureId(4))),
            Arc::from(Path::new("b.png")),
            TextureId(0),
        );
        let other = deferred.clone();
        assert!(deferred.shares_load_with(&other));
        assert_eq!(other.try_get().map(|o| o.id), Some(TextureId(4)));
    }
}
