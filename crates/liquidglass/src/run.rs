use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use renderer::{LensHandle, LensHooks, Renderer};
use tracing_subscriber::EnvFilter;

use crate::bootstrap::{
    load_config, load_page, override_viewport, plan_lenses, renderer_config, PlannedLens,
};
use crate::cli::{CheckArgs, Cli, Command, PointerPath, RunArgs};

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();
    match cli.command {
        Command::Run(args) => run_render(args),
        Command::Check(args) => run_check(args),
    }
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_check(args: CheckArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let page = load_page(&args.page)?;
    let target = page
        .query_selector(&config.renderer.capture_target)
        .context("invalid capture target selector")?;
    if target.is_none() {
        bail!(
            "capture target `{}` matches no element in {}",
            config.renderer.capture_target,
            args.page.display()
        );
    }
    let planned = plan_lenses(&page, &config)?;
    tracing::info!(
        page = %args.page.display(),
        lenses = planned.len(),
        "page and configuration are valid"
    );

    if args.json {
        let lenses: Vec<_> = planned.iter().map(PlannedLens::summary).collect();
        let report = serde_json::json!({
            "capture_target": config.renderer.capture_target,
            "viewport": page.viewport(),
            "lenses": lenses,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "{}: {} lens(es), capture target `{}`",
            args.page.display(),
            planned.len(),
            config.renderer.capture_target
        );
        for lens in &planned {
            println!("  node {} [{}]", lens.node.index(), lens.selectors.join(" "));
        }
    }
    Ok(())
}

fn run_render(args: RunArgs) -> Result<()> {
    let config = load_config(args.config.as_deref())?;
    let mut page = load_page(&args.page)?;
    override_viewport(&mut page, args.size, args.dpr)?;
    let planned = plan_lenses(&page, &config)?;
    if planned.is_empty() {
        tracing::warn!(page = %args.page.display(), "page declares no glass elements");
    }

    let mut renderer = Renderer::with_gpu(page, renderer_config(&config.renderer))
        .context("failed to initialise the glass renderer")?;
    let handles = planned
        .iter()
        .map(|lens| {
            renderer
                .add_lens(lens.node, lens.options(), LensHooks::new().on_init(log_init))
                .with_context(|| format!("failed to add lens on node {}", lens.node.index()))
        })
        .collect::<Result<Vec<_>>>()?;

    let start = Instant::now();
    if !renderer.capture_snapshot(start) {
        bail!("initial snapshot capture did not complete");
    }
    renderer.start_render_loop();

    let frame = Duration::from_millis(args.frame_ms.max(1));
    let mut now = start;
    for index in 0..args.frames {
        now = start + frame * (index + 1);
        if let Some(path) = args.pointer.as_ref() {
            let (x, y) = pointer_at(path, index, args.frames);
            renderer.handle_pointer_move(x, y, now);
        }
        renderer.on_animation_frame(now);
    }
    if renderer.is_capture_in_flight() {
        renderer.wait_for_capture(now);
        renderer.render(now);
    }
    log_lenses(&renderer, &handles);

    let overlay = renderer
        .read_frame()
        .context("failed to read back the overlay")?;
    overlay
        .save(&args.output)
        .with_context(|| format!("failed to write overlay to {}", args.output.display()))?;
    tracing::info!(
        path = %args.output.display(),
        width = overlay.width(),
        height = overlay.height(),
        frames = args.frames,
        "overlay exported"
    );
    renderer.destroy();
    Ok(())
}

fn log_init(handle: LensHandle) {
    tracing::info!(lens = %handle, "lens initialised");
}

fn log_lenses(renderer: &Renderer, handles: &[LensHandle]) {
    for &handle in handles {
        let (Ok(state), Ok(tilt), Ok(mirror)) = (
            renderer.reveal_state(handle),
            renderer.lens_tilt(handle),
            renderer.mirror_active(handle),
        ) else {
            continue;
        };
        tracing::debug!(
            lens = %handle,
            state = ?state,
            tilt_x = tilt.0,
            tilt_y = tilt.1,
            mirror,
            "lens state after run"
        );
    }
}

/// Pointer position for frame `index` of `frames`, linearly interpolated
/// along the path.
fn pointer_at(path: &PointerPath, index: u32, frames: u32) -> (f32, f32) {
    let points = &path.0;
    if points.len() < 2 || frames < 2 {
        return points.first().copied().unwrap_or((0.0, 0.0));
    }
    let t = index as f32 / (frames - 1) as f32;
    let scaled = t * (points.len() - 1) as f32;
    let segment = (scaled.floor() as usize).min(points.len() - 2);
    let local = scaled - segment as f32;
    let (x0, y0) = points[segment];
    let (x1, y1) = points[segment + 1];
    (x0 + (x1 - x0) * local, y0 + (y1 - y0) * local)
}
