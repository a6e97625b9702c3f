//! # Asset Loader
//!
//! Accepts load requests, deduplicates them and dispatches the real work
//! onto the model and texture worker pools. Models are keyed by path,
//! textures by path and upload format, so one image used both as color and
//! as data is decoded once per format.
//!
//! ## Architecture
//!
//! ```text
//!   queue_model_load(owner, path) ─► model queue ─┐
//!                                                 │ start_loading_models()
//!                                                 ▼
//!                         ┌──────── models registry (path → future) ────────┐
//!                         │ Existing: share the future, no dispatch         │
//!                         │ Vacant:   dispatch one import onto model pool   │
//!                         └─────────────────────────────────────────────────┘
//!                                                 │
//!                                   owner → DeferredLoad<ModelId>
//!
//!   queue_texture_load(task, req) ─► per-task queue ─► start_loading_textures(task)
//!                                                 │
//!               textures registry ((path, format) → future), texture pool
//!                                                 │
//!                             material → [TextureLoadResult]
//! ```
//!
//! ## Failure Policy
//!
//! A failed load resolves its future with the renderer's fallback identifier
//! and the error. The failure is logged once, by the unit that ran the load;
//! later requests for the same path share the cached outcome until
//! [`AssetLoader::unload`].

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use lockstep_core::{CancellationToken, Promise, WorkerPool};
use parking_lot::Mutex;

use crate::error::AssetError;
use crate::ids::{LoadTaskId, ModelId, OwnerId, TextureId};
use crate::import::{asset_name, import_obj_model, load_texture_file, normalize, ImportContext, ImportModelFn};
use crate::queue::{LoadBatch, LoadQueue};
use crate::registry::{InFlightRegistry, Slot};
use crate::renderer::{ResourceFactory, TextureFormat};
use crate::requests::{
    DeferredLoad, LoadOutcome, ModelLoadRequest, ModelLoadResults, TextureLoadRequest,
    TextureLoadResult, TextureLoadResults, TextureRole,
};

/// Snapshot of loader activity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoaderStats {
    /// Model imports dispatched to the model pool.
    pub models_dispatched: u64,
    /// Texture loads dispatched to the texture pool.
    pub textures_dispatched: u64,
    /// Requests served by an existing load instead of a dispatch.
    pub cache_hits: u64,
    /// Loads that resolved to a fallback.
    pub failures: u64,
    /// Model paths in the registry.
    pub cached_models: usize,
    /// Texture (path, format) pairs in the registry.
    pub cached_textures: usize,
}

/// Texture dedup key: one load per source image and upload format.
type TextureKey = (PathBuf, TextureFormat);

/// Pending model requests and the owners that have one.
#[derive(Default)]
struct ModelQueue {
    requests: LoadQueue<ModelLoadRequest>,
    owners: HashSet<OwnerId>,
}

impl ModelQueue {
    fn drain(&mut self) -> LoadBatch<ModelLoadRequest> {
        self.owners.clear();
        self.requests.drain()
    }
}

/// Pending texture requests of one task.
#[derive(Default)]
struct TextureTask {
    requests: LoadQueue<TextureLoadRequest, TextureKey>,
    seen: HashSet<TextureLoadRequest>,
}

#[derive(Default)]
struct Counters {
    models_dispatched: AtomicU64,
    textures_dispatched: AtomicU64,
    cache_hits: AtomicU64,
    failures: AtomicU64,
}

struct LoaderShared {
    model_pool: Arc<WorkerPool>,
    texture_pool: Arc<WorkerPool>,
    factory: Arc<dyn ResourceFactory>,
    token: CancellationToken,

    model_queue: Mutex<ModelQueue>,
    texture_tasks: Mutex<HashMap<LoadTaskId, TextureTask>>,

    models: InFlightRegistry<LoadOutcome<ModelId>>,
    textures: InFlightRegistry<LoadOutcome<TextureId>, TextureKey>,

    counters: Counters,
}

/// Deduplicating, deferred asset loader. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct AssetLoader {
    shared: Arc<LoaderShared>,
}

impl AssetLoader {
    /// Creates a loader dispatching onto the given pools.
    #[must_use]
    pub fn new(
        model_pool: Arc<WorkerPool>,
        texture_pool: Arc<WorkerPool>,
        factory: Arc<dyn ResourceFactory>,
        token: CancellationToken,
    ) -> Self {
        Self {
            shared: Arc::new(LoaderShared {
                model_pool,
                texture_pool,
                factory,
                token,
                model_queue: Mutex::new(ModelQueue::default()),
                texture_tasks: Mutex::new(HashMap::new()),
                models: InFlightRegistry::new(),
                textures: InFlightRegistry::new(),
                counters: Counters::default(),
            }),
        }
    }

    /// Pool model imports run on.
    #[must_use]
    pub fn model_pool(&self) -> &WorkerPool {
        &self.shared.model_pool
    }

    /// Pool texture loads run on.
    #[must_use]
    pub fn texture_pool(&self) -> &WorkerPool {
        &self.shared.texture_pool
    }

    /// Renderer collaborator.
    #[must_use]
    pub fn factory(&self) -> &dyn ResourceFactory {
        self.shared.factory.as_ref()
    }

    /// Shutdown token observed by waits inside imports.
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    // =========================================================================
    // Models
    // =========================================================================

    /// Queues a model load using the default OBJ importer.
    ///
    /// Returns false if `owner` already has a pending request; the first
    /// request is kept.
    pub fn queue_model_load(&self, owner: OwnerId, path: impl AsRef<Path>, name: &str) -> bool {
        self.queue_model_load_with(owner, path, name, import_obj_model)
    }

    /// Queues a model load with a custom importer.
    ///
    /// Returns false if `owner` already has a pending request.
    pub fn queue_model_load_with(
        &self,
        owner: OwnerId,
        path: impl AsRef<Path>,
        name: &str,
        import: ImportModelFn,
    ) -> bool {
        let path = normalize(path.as_ref());
        let mut queue = self.shared.model_queue.lock();
        if !queue.owners.insert(owner) {
            tracing::warn!(%owner, path = %path.display(), "owner already has a queued model, request ignored");
            return false;
        }

        let first_in_batch = queue.requests.push(
            path.clone(),
            ModelLoadRequest {
                owner,
                path: path.clone(),
                name: name.to_string(),
                import,
            },
        );
        tracing::trace!(%owner, path = %path.display(), first_in_batch, "model load queued");
        true
    }

    /// Model requests waiting for [`AssetLoader::start_loading_models`].
    #[must_use]
    pub fn pending_model_loads(&self) -> usize {
        self.shared.model_queue.lock().requests.len()
    }

    /// Drains the model queue and starts one import per unique path.
    ///
    /// The returned map has exactly one entry per owner in the drained batch.
    /// Owners of the same path share one deferred result.
    pub fn start_loading_models(&self) -> ModelLoadResults {
        let batch = self.shared.model_queue.lock().drain();
        self.shared
            .counters
            .cache_hits
            .fetch_add(batch.shared_requests() as u64, Ordering::Relaxed);

        // The first request of each unique path starts the load.
        let mut loads: Vec<Option<DeferredLoad<ModelId>>> = vec![None; batch.unique.len()];
        let mut results = ModelLoadResults::with_capacity(batch.requests.len());
        for (slot, request) in batch.requests {
            let deferred = loads[slot]
                .get_or_insert_with(|| self.start_model(&request))
                .clone();
            results.insert(request.owner, deferred);
        }

        tracing::debug!(
            owners = results.len(),
            unique_paths = batch.unique.len(),
            "model loading started"
        );
        results
    }

    fn start_model(&self, request: &ModelLoadRequest) -> DeferredLoad<ModelId> {
        let path: Arc<Path> = Arc::from(request.path.as_path());
        let fallback = self.shared.factory.fallback_model();

        match self.shared.models.get_or_insert_pending(&request.path) {
            Slot::Existing(future) => {
                self.shared.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                DeferredLoad::new(future, path, fallback)
            }
            Slot::Vacant(promise, future) => {
                self.shared
                    .counters
                    .models_dispatched
                    .fetch_add(1, Ordering::Relaxed);
                let loader = self.clone();
                let unit_path = request.path.clone();
                let name = request.name.clone();
                let import = request.import;
                let dispatched = self.shared.model_pool.dispatch(move || {
                    loader.run_model_import(&unit_path, &name, import, promise);
                });
                if let Err(err) = dispatched {
                    // The unit (and its promise) was dropped: the load reads as abandoned.
                    tracing::debug!(path = %path.display(), error = %err, "model import not dispatched");
                }
                DeferredLoad::new(future, path, fallback)
            }
        }
    }

    fn run_model_import(
        &self,
        path: &Path,
        name: &str,
        import: ImportModelFn,
        promise: Promise<LoadOutcome<ModelId>>,
    ) {
        if self.shared.model_pool.is_exiting() || self.shared.token.is_cancelled() {
            return;
        }

        let ctx = ImportContext::new(self);
        let outcome = match import(&ctx, path, name) {
            Ok(id) => LoadOutcome::loaded(id),
            Err(err) => self.fallback_outcome("model", err, self.shared.factory.fallback_model()),
        };
        promise.fulfill(outcome);
    }

    // =========================================================================
    // Textures
    // =========================================================================

    /// Queues a texture load under `task`.
    ///
    /// Returns false for an exact duplicate (same role, material and path)
    /// already pending in the task.
    pub fn queue_texture_load(&self, task: LoadTaskId, mut request: TextureLoadRequest) -> bool {
        request.path = normalize(&request.path);
        let mut tasks = self.shared.texture_tasks.lock();
        let pending = tasks.entry(task).or_default();
        if !pending.seen.insert(request.clone()) {
            tracing::debug!(%task, path = %request.path.display(), "duplicate texture request ignored");
            return false;
        }
        let key = (request.path.clone(), TextureFormat::for_role(request.role));
        let first_in_batch = pending.requests.push(key, request);
        tracing::trace!(%task, first_in_batch, "texture load queued");
        true
    }

    /// Texture requests pending under `task`.
    #[must_use]
    pub fn pending_texture_loads(&self, task: LoadTaskId) -> usize {
        self.shared
            .texture_tasks
            .lock()
            .get(&task)
            .map_or(0, |pending| pending.requests.len())
    }

    /// Drains `task` and starts one load per unique (path, upload format).
    ///
    /// The returned multimap has one entry per drained request. An unknown
    /// or empty task yields an empty map.
    pub fn start_loading_textures(&self, task: LoadTaskId) -> TextureLoadResults {
        let Some(mut pending) = self.shared.texture_tasks.lock().remove(&task) else {
            tracing::debug!(%task, "no textures queued for task");
            return TextureLoadResults::new();
        };

        let batch = pending.requests.drain();
        self.shared
            .counters
            .cache_hits
            .fetch_add(batch.shared_requests() as u64, Ordering::Relaxed);

        let mut loads: Vec<Option<DeferredLoad<TextureId>>> = vec![None; batch.unique.len()];
        let mut results = TextureLoadResults::new();
        for (slot, request) in batch.requests {
            let deferred = loads[slot]
                .get_or_insert_with(|| self.start_texture(&batch.unique[slot], request.role))
                .clone();
            results
                .entry(request.material)
                .or_default()
                .push(TextureLoadResult {
                    role: request.role,
                    result: deferred,
                });
        }

        tracing::debug!(%task, unique_loads = batch.unique.len(), "texture loading started");
        results
    }

    fn start_texture(&self, key: &TextureKey, role: TextureRole) -> DeferredLoad<TextureId> {
        let path = key.0.as_path();
        let shared_path: Arc<Path> = Arc::from(path);
        let fallback = self.shared.factory.fallback_texture();

        match self.shared.textures.get_or_insert_pending(key) {
            Slot::Existing(future) => {
                self.shared.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
                DeferredLoad::new(future, shared_path, fallback)
            }
            Slot::Vacant(promise, future) => {
                self.shared
                    .counters
                    .textures_dispatched
                    .fetch_add(1, Ordering::Relaxed);
                let loader = self.clone();
                let unit_path = path.to_path_buf();
                let dispatched = self.shared.texture_pool.dispatch(move || {
                    loader.run_texture_load(&unit_path, role, promise);
                });
                if let Err(err) = dispatched {
                    tracing::debug!(path = %path.display(), format = ?key.1, error = %err, "texture load not dispatched");
                }
                DeferredLoad::new(future, shared_path, fallback)
            }
        }
    }

    fn run_texture_load(&self, path: &Path, role: TextureRole, promise: Promise<LoadOutcome<TextureId>>) {
        if self.shared.texture_pool.is_exiting() || self.shared.token.is_cancelled() {
            return;
        }

        let factory = self.shared.factory.as_ref();
        let loaded = load_texture_file(path, role).and_then(|image| {
            factory
                .create_texture_resource(&asset_name(path), &image)
                .map_err(|source| AssetError::ResourceCreation {
                    path: path.to_path_buf(),
                    source,
                })
        });
        let outcome = match loaded {
            Ok(id) => LoadOutcome::loaded(id),
            Err(err) => self.fallback_outcome("texture", err, factory.fallback_texture()),
        };
        promise.fulfill(outcome);
    }

    fn fallback_outcome<Id: Copy + std::fmt::Display>(
        &self,
        kind: &str,
        err: AssetError,
        fallback: Id,
    ) -> LoadOutcome<Id> {
        self.shared.counters.failures.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(
            kind,
            path = %err.path().display(),
            error = %err,
            %fallback,
            "asset load failed, substituting fallback"
        );
        LoadOutcome::fallback(fallback, err)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Drops every pending queue and cached result (scene unload).
    ///
    /// Loads still running finish into futures nobody is registered for;
    /// owners holding those futures still see them resolve.
    pub fn unload(&self) {
        let dropped_models = self.shared.model_queue.lock().drain().requests.len();
        let dropped_tasks = {
            let mut tasks = self.shared.texture_tasks.lock();
            let count = tasks.len();
            tasks.clear();
            count
        };
        let cached_models = self.shared.models.len();
        let cached_textures = self.shared.textures.len();
        self.shared.models.clear();
        self.shared.textures.clear();

        tracing::info!(
            dropped_models,
            dropped_tasks,
            cached_models,
            cached_textures,
            "asset loader unloaded"
        );
    }

    /// Activity counters and cache sizes.
    #[must_use]
    pub fn stats(&self) -> LoaderStats {
        let counters = &self.shared.counters;
        LoaderStats {
            models_dispatched: counters.models_dispatched.load(Ordering::Relaxed),
            textures_dispatched: counters.textures_dispatched.load(Ordering::Relaxed),
            cache_hits: counters.cache_hits.load(Ordering::Relaxed),
            failures: counters.failures.load(Ordering::Relaxed),
            cached_models: self.shared.models.len(),
            cached_textures: self.shared.textures.len(),
        }
    }

    /// Finished entries in the model registry.
    #[must_use]
    pub fn completed_models(&self) -> usize {
        self.shared.models.completed_len()
    }

    /// Finished entries in the texture registry.
    #[must_use]
    pub fn completed_textures(&self) -> usize {
        self.shared.textures.completed_len()
    }
}

impl std::fmt::Debug for AssetLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetLoader")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}
