//! Headless demo: loads a level, runs the update/render pair for a fixed
//! number of frames, and prints the final statistics.
//!
//! ```text
//! lockstep_demo [LEVEL.toml] [CONFIG.toml]
//! ```
//!
//! Log verbosity follows `RUST_LOG` (default `info`).

use std::process::ExitCode;
use std::sync::Arc;

use lockstep::{Engine, EngineConfig, EngineResult, HeadlessRenderer, LevelScene, Scene};
use lockstep_assets::HeadlessResourceFactory;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_thread_names(true)
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "demo failed");
            ExitCode::FAILURE
        }
    }
}

fn run() -> EngineResult<()> {
    let mut args = std::env::args().skip(1);
    let level_path = args.next();
    let config_path = args.next();

    let mut config = match &config_path {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    if config.max_render_frames.is_none() {
        config.max_render_frames = Some(300);
    }

    let scene: Box<dyn Scene> = match &level_path {
        Some(path) => Box::new(LevelScene::from_file(path)?),
        None => Box::new(LevelScene::empty()),
    };

    let factory = Arc::new(HeadlessResourceFactory::new());
    let renderer = HeadlessRenderer::new();
    let counters = renderer.counters();

    let mut engine = Engine::start(&config, scene, Box::new(renderer), factory.clone())?;

    engine.load_thread().submit(|| {
        tracing::info!("environment map load finished (no-op)");
    });

    engine.wait_for_exit();
    let stats = engine.shutdown()?;

    tracing::info!(
        update_loops = stats.update_loops,
        render_loops = stats.render_loops,
        draws = counters.draws(),
        out_of_order = counters.out_of_order(),
        models = factory.models_created(),
        textures = factory.textures_created(),
        failures = stats.loader.failures,
        "demo finished"
    );
    Ok(())
}
