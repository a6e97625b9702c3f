//! Engine lifecycle tests: handshake depth, app-state progression, level
//! loading from real files, and shutdown behavior.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use lockstep::{
    load_level, AppState, Engine, EngineConfig, EngineError, EngineResult, FrameRenderer,
    FrameSceneView, HeadlessRenderer, LevelScene, LoadPlan, LoadedAssets, MaterialPlan,
    ModelPlan, Scene,
};
use lockstep_assets::{AssetLoader, HeadlessResourceFactory, OwnerId, TextureRole};
use lockstep_core::{CancellationToken, WorkerPool};
use parking_lot::Mutex;

fn test_config() -> EngineConfig {
    EngineConfig {
        model_workers: 2,
        texture_workers: 2,
        wait_poll_ms: 2,
        ..EngineConfig::default()
    }
}

fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

fn demo_level() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("demos/yard/level.toml")
}

#[test]
fn test_empty_plan_reaches_simulating() {
    let mut engine = Engine::start(
        &test_config(),
        Box::new(LevelScene::empty()),
        Box::new(HeadlessRenderer::new()),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || engine.app_state()
        == AppState::Simulating));
    assert!(engine.is_render_ready());

    let stats = engine.shutdown().unwrap();
    assert_eq!(stats.app_state, AppState::Simulating);
    assert_eq!(stats.frames_in_flight, 0);
}

/// Remembers the frame number of the first view written while simulating.
struct FirstFrameScene {
    first_simulated: Arc<Mutex<Option<u64>>>,
}

impl Scene for FirstFrameScene {
    fn name(&self) -> &str {
        "first-frame"
    }

    fn load_plan(&mut self) -> LoadPlan {
        LoadPlan::default()
    }

    fn on_load_complete(&mut self, _assets: LoadedAssets) {}

    fn update(&mut self, _dt: f32) {}

    fn write_scene_view(&self, view: &mut FrameSceneView) {
        self.first_simulated.lock().get_or_insert(view.frame_number);
    }

    fn unload(&mut self) {}
}

#[test]
fn test_loading_ends_on_first_idle_tick() {
    // 50 ms ticks: the empty level load is long finished by the second tick.
    let config = EngineConfig {
        target_update_hz: 20,
        ..test_config()
    };
    let first_simulated = Arc::new(Mutex::new(None));
    let mut engine = Engine::start(
        &config,
        Box::new(FirstFrameScene {
            first_simulated: Arc::clone(&first_simulated),
        }),
        Box::new(HeadlessRenderer::new()),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || first_simulated
        .lock()
        .is_some()));
    engine.shutdown().unwrap();

    // Tick 1 dispatches the load, tick 2 sees the idle pool and simulates.
    assert_eq!(*first_simulated.lock(), Some(2));
}

#[test]
fn test_frame_limit_bounds_update_lead() {
    for frame_buffers in 1..=3 {
        let config = EngineConfig {
            frame_buffers,
            max_render_frames: Some(50),
            ..test_config()
        };
        let renderer = HeadlessRenderer::new();
        let counters = renderer.counters();
        let mut engine = Engine::start(
            &config,
            Box::new(LevelScene::empty()),
            Box::new(renderer),
            Arc::new(HeadlessResourceFactory::new()),
        )
        .unwrap();

        assert!(engine.wait_for_exit_timeout(Duration::from_secs(10)));
        // Let update run into the full ring.
        std::thread::sleep(Duration::from_millis(20));
        let stats = engine.shutdown().unwrap();

        assert_eq!(stats.render_loops, 50);
        assert_eq!(counters.frames(), 50);
        assert_eq!(counters.out_of_order(), 0);
        assert!(counters.shut_down());
        assert!(stats.update_loops >= 50);
        assert!(
            stats.update_loops <= 50 + frame_buffers as u64,
            "update ran {} ticks ahead at depth {frame_buffers}",
            stats.update_loops - 50
        );
    }
}

#[test]
fn test_demo_level_loads_shared_model_once() {
    let factory = Arc::new(HeadlessResourceFactory::new());
    let renderer = HeadlessRenderer::new();
    let counters = renderer.counters();
    let scene = LevelScene::from_file(demo_level()).unwrap();

    let mut engine = Engine::start(
        &test_config(),
        Box::new(scene),
        Box::new(renderer),
        factory.clone(),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(10), || {
        engine.app_state() == AppState::Simulating && counters.draws() > 0
    }));
    let stats = engine.shutdown().unwrap();

    // Three crates share one OBJ.
    assert_eq!(factory.models_created(), 1);
    // crate diffuse + normal from the MTL, ground diffuse from the level.
    assert_eq!(factory.textures_created(), 3);
    assert_eq!(stats.loader.failures, 0);
    assert_eq!(stats.loader.models_dispatched, 1);
    assert_eq!(counters.draws() % 3, 0);
}

struct FailingRenderer {
    frames: u64,
}

impl FrameRenderer for FailingRenderer {
    fn initialize(&mut self) -> EngineResult<()> {
        Ok(())
    }

    fn render_frame(&mut self, _view: &FrameSceneView) -> EngineResult<()> {
        self.frames += 1;
        if self.frames == 3 {
            return Err(EngineError::Render("device lost".into()));
        }
        Ok(())
    }

    fn shutdown(&mut self) {}
}

#[test]
fn test_renderer_failure_stops_engine() {
    let mut engine = Engine::start(
        &test_config(),
        Box::new(LevelScene::empty()),
        Box::new(FailingRenderer { frames: 0 }),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    assert!(engine.wait_for_exit_timeout(Duration::from_secs(5)));
    assert!(engine.token().is_cancelled());
    assert!(matches!(engine.shutdown(), Err(EngineError::Render(_))));
    // A second shutdown is a no-op.
    assert!(engine.shutdown().is_ok());
}

#[test]
fn test_shutdown_with_no_work_is_prompt() {
    let mut engine = Engine::start(
        &test_config(),
        Box::new(LevelScene::empty()),
        Box::new(HeadlessRenderer::new()),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    let start = Instant::now();
    engine.shutdown().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
    assert!(!engine.load_thread().is_running());
}

#[test]
fn test_load_thread_runs_submitted_tasks() {
    let mut engine = Engine::start(
        &test_config(),
        Box::new(LevelScene::empty()),
        Box::new(HeadlessRenderer::new()),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    let ran = Arc::new(AtomicU64::new(0));
    for _ in 0..4 {
        let ran = Arc::clone(&ran);
        assert!(engine.load_thread().submit(move || {
            ran.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert!(wait_until(Duration::from_secs(5), || ran.load(Ordering::SeqCst) == 4));

    let stats = engine.shutdown().unwrap();
    assert_eq!(stats.load_tasks_processed, 4);
}

#[derive(Default)]
struct CallLog {
    calls: Vec<&'static str>,
    updates: u64,
}

struct RecordingScene {
    log: Arc<Mutex<CallLog>>,
}

impl Scene for RecordingScene {
    fn name(&self) -> &str {
        "recording"
    }

    fn load_plan(&mut self) -> LoadPlan {
        self.log.lock().calls.push("load_plan");
        LoadPlan::default()
    }

    fn on_load_complete(&mut self, _assets: LoadedAssets) {
        self.log.lock().calls.push("on_load_complete");
    }

    fn update(&mut self, _dt: f32) {
        let mut log = self.log.lock();
        if log.updates == 0 {
            log.calls.push("update");
        }
        log.updates += 1;
    }

    fn write_scene_view(&self, _view: &mut FrameSceneView) {}

    fn unload(&mut self) {
        self.log.lock().calls.push("unload");
    }
}

#[test]
fn test_scene_callbacks_in_order() {
    let log = Arc::new(Mutex::new(CallLog::default()));
    let mut engine = Engine::start(
        &test_config(),
        Box::new(RecordingScene { log: Arc::clone(&log) }),
        Box::new(HeadlessRenderer::new()),
        Arc::new(HeadlessResourceFactory::new()),
    )
    .unwrap();

    assert!(wait_until(Duration::from_secs(5), || log.lock().updates >= 10));
    engine.shutdown().unwrap();

    let log = log.lock();
    assert_eq!(log.calls, vec!["load_plan", "on_load_complete", "update", "unload"]);
}

#[test]
fn test_load_level_resolves_missing_files_to_fallbacks() {
    let token = CancellationToken::new();
    let model_pool = Arc::new(WorkerPool::new("test-models", 2).unwrap());
    let texture_pool = Arc::new(WorkerPool::new("test-textures", 2).unwrap());
    let factory = Arc::new(HeadlessResourceFactory::new());
    let loader = AssetLoader::new(model_pool, texture_pool, factory.clone(), token.clone());

    let plan = LoadPlan {
        models: vec![
            ModelPlan {
                owner: OwnerId(1),
                path: PathBuf::from("/nonexistent/lockstep/a.obj"),
                name: "a".into(),
            },
            ModelPlan {
                owner: OwnerId(2),
                path: PathBuf::from("/nonexistent/lockstep/a.obj"),
                name: "b".into(),
            },
        ],
        materials: vec![MaterialPlan {
            name: "stone".into(),
            textures: vec![(TextureRole::Diffuse, PathBuf::from("/nonexistent/lockstep/s.png"))],
        }],
    };

    let assets = load_level(&loader, &plan, &token);

    assert_eq!(assets.models.len(), 2);
    assert!(assets.models.values().all(|outcome| outcome.is_fallback()));
    assert_eq!(assets.fallbacks, 3);
    assert!(assets.materials.contains_key("stone"));
    assert_eq!(factory.models_created(), 0);
    // One failed model path and one failed texture path, each counted once.
    assert_eq!(loader.stats().failures, 2);
}
