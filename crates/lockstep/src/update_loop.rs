//! # Update Loop
//!
//! Producer side of the frame handshake and owner of the app-state machine.
//!
//! ## Tick Order
//!
//! ```text
//! 1. Pre-update: sample the frame timer
//! 2. State update:
//!    a. Initializing → dispatch the level load onto the update pool → Loading
//!    b. Loading      → update pool idle? hand results to the scene → Simulating
//!    c. Simulating   → scene.update(dt)
//! 3. Post-update: claim the next FrameSceneView slot and fill it
//! 4. Count the tick
//! 5. Publish the slot (render gate), then wait until the ring has room
//!    again (update gate)
//! ```
//!
//! Every wait observes the engine token, so cancellation ends the loop at
//! the next gate.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use lockstep_assets::{
    resolve_texture_assignments, AssetLoader, LoadTaskId, TextureLoadRequest,
};
use lockstep_core::{CancellationToken, FrameTimer, WorkerPool};
use parking_lot::Mutex;

use crate::app_state::AppState;
use crate::engine::EngineShared;
use crate::frame::FrameSceneView;
use crate::scene::{LoadPlan, LoadedAssets, Scene};

/// Runs a whole level load: queues every model and material texture of
/// `plan`, starts loading, and waits for the results.
///
/// Waits give up when `token` is cancelled or a load pool starts exiting;
/// whatever was resolved by then is returned.
pub fn load_level(loader: &AssetLoader, plan: &LoadPlan, token: &CancellationToken) -> LoadedAssets {
    let mut assets = LoadedAssets::default();

    for model in &plan.models {
        loader.queue_model_load(model.owner, &model.path, &model.name);
    }
    let model_results = loader.start_loading_models();

    let factory = loader.factory();
    let task = LoadTaskId::generate();
    for material in &plan.materials {
        let id = factory.create_material(&material.name);
        assets.materials.insert(material.name.clone(), id);
        for (role, path) in &material.textures {
            loader.queue_texture_load(
                task,
                TextureLoadRequest {
                    role: *role,
                    material: id,
                    path: path.clone(),
                },
            );
        }
    }
    let texture_results = loader.start_loading_textures(task);

    match resolve_texture_assignments(&texture_results, loader.texture_pool(), token) {
        Ok(assignments) => {
            for assignment in &assignments {
                assets.fallbacks += assignment
                    .textures
                    .values()
                    .flatten()
                    .filter(|outcome| outcome.is_fallback())
                    .count();
                assignment.apply(factory);
            }
        }
        Err(err) => {
            tracing::info!(reason = %err, "level load interrupted while waiting for textures");
            return assets;
        }
    }

    assets.models.reserve(model_results.len());
    for (owner, result) in model_results {
        match result.wait_cancellable(token) {
            Ok(outcome) => {
                if outcome.is_fallback() {
                    assets.fallbacks += 1;
                }
                assets.models.insert(owner, outcome);
            }
            Err(err) => {
                tracing::info!(reason = %err, "level load interrupted while waiting for models");
                break;
            }
        }
    }

    assets
}

/// State owned by the update thread.
pub(crate) struct UpdateLoop {
    pub(crate) shared: Arc<EngineShared>,
    pub(crate) loader: AssetLoader,
    pub(crate) update_pool: Arc<WorkerPool>,
    pub(crate) scene: Box<dyn Scene>,
    pub(crate) timer: FrameTimer,
}

impl UpdateLoop {
    /// Body of the update thread.
    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let token = &shared.token;
        tracing::info!(scene = self.scene.name(), "update thread started");

        // The renderer must be up before the first frame is produced.
        while !shared.render_ready.load(Ordering::Acquire) {
            if token.is_cancelled() {
                self.finish();
                return;
            }
            std::thread::sleep(token.poll_interval());
        }

        let level_results: Arc<Mutex<Option<LoadedAssets>>> = Arc::new(Mutex::new(None));

        while !token.is_cancelled() {
            // 1. Pre-update
            let tick_start = self.timer.begin_tick();

            // 2. State update
            let state = shared.app_state.get();
            match state {
                AppState::Initializing => {
                    if !self.dispatch_level_load(&level_results) {
                        break;
                    }
                    shared.app_state.transition(AppState::Loading);
                }
                AppState::Loading => {
                    if self.update_pool.num_active_tasks() == 0 {
                        let assets = level_results.lock().take().unwrap_or_default();
                        self.scene.on_load_complete(assets);
                        shared.app_state.transition(AppState::Simulating);
                    }
                }
                AppState::Simulating => {
                    self.scene.update(self.timer.delta_seconds());
                }
            }

            // 3. Post-update
            {
                let Ok(mut slot) = shared.ring.begin_write(token) else {
                    break;
                };
                let slot_index = slot.slot_index();
                let view: &mut FrameSceneView = &mut slot;
                view.clear();
                view.frame_number = self.timer.tick_count();
                if shared.app_state.get() == AppState::Simulating {
                    self.scene.write_scene_view(view);
                }
                tracing::trace!(
                    frame = view.frame_number,
                    slot = slot_index,
                    draws = view.draw_count(),
                    "update frame written"
                );
            }

            // 4.
            shared.update_loops.fetch_add(1, Ordering::AcqRel);
            self.timer.end_tick(tick_start);

            // 5.
            if shared.ring.wait_writable(token).is_err() {
                break;
            }
            self.timer.wait_for_next_tick();
        }

        self.finish();
    }

    fn dispatch_level_load(&mut self, results: &Arc<Mutex<Option<LoadedAssets>>>) -> bool {
        let plan = self.scene.load_plan();
        tracing::info!(
            scene = self.scene.name(),
            models = plan.models.len(),
            materials = plan.materials.len(),
            "level load dispatched"
        );

        let loader = self.loader.clone();
        let token = self.shared.token.clone();
        let results = Arc::clone(results);
        let dispatched = self.update_pool.dispatch(move || {
            let assets = load_level(&loader, &plan, &token);
            *results.lock() = Some(assets);
        });

        match dispatched {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(error = %err, "level load not dispatched");
                false
            }
        }
    }

    fn finish(&mut self) {
        self.scene.unload();
        self.loader.unload();
        let stats = self.timer.stats();
        tracing::info!(
            ticks = self.timer.tick_count(),
            late_ticks = stats.late_ticks,
            max_tick_us = stats.max_tick_us,
            "update thread exiting"
        );
    }
}
