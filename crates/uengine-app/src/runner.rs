//! Application runner and frame loop.

use std::thread;
use std::time::Instant;

use anyhow::Context as _;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use uengine_gpu::FrameOutcome;

use crate::app::UengineApp;
use crate::config::AppConfig;
use crate::context::AppContext;

/// Install the global `tracing` subscriber. `RUST_LOG` overrides the
/// default `info` filter. Does nothing if a subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

/// Run a `UengineApp` with the given configuration.
///
/// Initializes logging, creates the window, GPU context and renderer, and
/// runs the frame loop until the window is closed. Fatal errors are logged
/// and returned.
pub fn run_app<A: UengineApp>(config: AppConfig) -> anyhow::Result<()> {
    init_logging();
    info!("{} starting...", config.title);

    let result = run::<A>(&config);
    if let Err(e) = &result {
        error!("{e:#}");
    }
    result
}

fn run<A: UengineApp>(config: &AppConfig) -> anyhow::Result<()> {
    let mut ctx = AppContext::new(config)?;
    let mut app = A::init(&mut ctx).context("Application init failed")?;
    info!("Application ready!");

    let result = frame_loop(&mut ctx, &mut app, config);

    // Teardown waits for the GPU even when the loop failed.
    if let Err(e) = ctx.renderer.wait_idle() {
        error!("Failed to wait for device idle: {e}");
    }
    app.cleanup(&mut ctx);
    drop(app);

    info!(frames = ctx.frame_count, "Shutting down");
    result
}

fn frame_loop<A: UengineApp>(
    ctx: &mut AppContext,
    app: &mut A,
    config: &AppConfig,
) -> anyhow::Result<()> {
    let target_frame_time = config.target_frame_time();
    let mut last_frame = Instant::now();

    while ctx.platform.poll_events() {
        for event in ctx.platform.drain_events() {
            app.on_event(ctx, &event);
        }

        let frame_start = Instant::now();
        let dt = frame_start.duration_since(last_frame).as_secs_f32();
        last_frame = frame_start;

        app.update(ctx, dt)?;

        let outcome = ctx
            .renderer
            .draw(&mut ctx.platform)
            .context("Frame failed")?;
        if let FrameOutcome::Presented { image_index, .. } = outcome {
            tracing::trace!(frame = ctx.frame_count, image_index, "Frame presented");
        }
        ctx.frame_count += 1;

        if let Some(target) = target_frame_time {
            let elapsed = frame_start.elapsed();
            if elapsed < target {
                thread::sleep(target - elapsed);
            }
        }
    }

    info!("Close requested");
    Ok(())
}
