use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Context, Result};
use renderer::{
    ControllerStats, FrameCounters, FrameStatus, HeadlessGl, Mailbox, PanelHandle, PanelVisual,
    RenderContext, RenderLoopController, SystemTimeSource,
};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::settings::{RunLength, RunSettings};

pub fn initialise_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Object accounting summed over every context a run used.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Accounting {
    pub contexts: usize,
    pub allocated: usize,
    pub released: usize,
    pub live: usize,
    pub double_releases: u32,
    pub deleted_while_bound: u32,
}

impl Accounting {
    fn collect(contexts: &[Rc<HeadlessGl>]) -> Self {
        contexts.iter().fold(
            Accounting {
                contexts: contexts.len(),
                ..Accounting::default()
            },
            |mut totals, gl| {
                let stats = gl.stats();
                totals.allocated += stats.allocated.len();
                totals.released += stats.released.len();
                totals.live += gl.live_objects().len();
                totals.double_releases += stats.double_releases;
                totals.deleted_while_bound += stats.deleted_while_bound;
                totals
            },
        )
    }

    pub fn is_clean(&self) -> bool {
        self.live == 0 && self.double_releases == 0 && self.deleted_while_bound == 0
    }
}

/// What the render thread reports back once the panel is detached.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub label: String,
    pub frames: FrameCounters,
    pub controller: ControllerStats,
    pub accounting: Accounting,
    pub final_scale: f64,
    pub elapsed: Duration,
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accounting = &self.accounting;
        writeln!(f, "shader:          {}", self.label)?;
        writeln!(
            f,
            "frames:          drawn={} skipped={} failed={}",
            self.frames.drawn, self.frames.skipped, self.frames.failed
        )?;
        writeln!(
            f,
            "resource sets:   built={} failed={} migrations={} error-rebuilds={}",
            self.controller.builds,
            self.controller.failed_builds,
            self.controller.migrations,
            self.controller.error_rebuilds
        )?;
        writeln!(f, "contexts:        {}", accounting.contexts)?;
        writeln!(
            f,
            "handles:         allocated={} released={} live={}",
            accounting.allocated, accounting.released, accounting.live
        )?;
        writeln!(f, "final scale:     {}", self.final_scale)?;
        write!(f, "elapsed:         {:.2?}", self.elapsed)
    }
}

pub fn run(settings: RunSettings) -> Result<()> {
    info!(
        shader = settings.asset.label(),
        size = %settings.size,
        scale = settings.initial_scale,
        fps = settings.fps,
        migrate_every = settings.migrate_every,
        "starting headless panel"
    );

    let summary = drive(settings)?;
    println!("{summary}");

    let accounting = summary.accounting;
    if !accounting.is_clean() {
        bail!(
            "GL objects leaked: {} live, {} double releases, {} deleted while bound",
            accounting.live,
            accounting.double_releases,
            accounting.deleted_while_bound
        );
    }
    if summary.frames.drawn == 0 && summary.frames.failed > 0 {
        bail!("panel never rendered a frame; see the logged errors");
    }
    Ok(())
}

/// Runs the control thread on the caller and the render thread alongside it
/// until the configured run length is reached and the panel detached.
pub fn drive(settings: RunSettings) -> Result<RunSummary> {
    let (mut handle, mailbox) = renderer::panel_channel(settings.initial_scale);
    let frames = Arc::new(AtomicU64::new(0));

    let render = {
        let settings = settings.clone();
        let frames = Arc::clone(&frames);
        thread::Builder::new()
            .name("panel-render".into())
            .spawn(move || render_thread(settings, mailbox, frames))
            .context("failed to spawn render thread")?
    };

    let started = Instant::now();
    let poll = settings.frame_interval().min(Duration::from_millis(10));
    let mut steps = settings.scale_steps.iter().peekable();
    while !render.is_finished() {
        let elapsed = started.elapsed();
        while let Some(step) = steps.next_if(|step| step.at <= elapsed) {
            debug!(scale = step.scale, at = ?step.at, "posting scale change");
            handle.set_render_scaling(step.scale);
        }

        let done = match settings.length {
            RunLength::Duration(limit) => elapsed >= limit,
            RunLength::Frames(limit) => frames.load(Ordering::Acquire) >= limit,
        };
        if done {
            break;
        }
        thread::sleep(poll);
    }

    finish(handle, render)
}

fn finish(handle: PanelHandle, render: thread::JoinHandle<RunSummary>) -> Result<RunSummary> {
    debug!("detaching panel");
    handle.detach();
    render
        .join()
        .map_err(|_| anyhow!("render thread panicked"))
}

fn render_thread(settings: RunSettings, mailbox: Mailbox, frames: Arc<AtomicU64>) -> RunSummary {
    let started = Instant::now();
    let ticker = crossbeam_channel::tick(settings.frame_interval());
    let RunSettings {
        asset,
        options,
        size,
        migrate_every,
        ..
    } = settings;
    let label = asset.label().to_string();
    let controller = RenderLoopController::<HeadlessGl>::new(asset, options);
    let mut visual = PanelVisual::new(controller, mailbox, Box::new(SystemTimeSource::new()));

    let mut contexts = vec![Rc::new(HeadlessGl::new())];
    let mut context = RenderContext::from_shared(Rc::clone(&contexts[0]));
    let mut turn: u64 = 0;

    loop {
        if migrate_every > 0 && turn > 0 && turn % migrate_every == 0 {
            let fresh = Rc::new(HeadlessGl::new());
            let next = RenderContext::from_shared(Rc::clone(&fresh));
            debug!(from = ?context.id(), to = ?next.id(), turn, "migrating to a new context");
            contexts.push(fresh);
            context = next;
        }

        let report = visual.on_render(Some(&context), size);
        if report.status != FrameStatus::Detached {
            frames.fetch_add(1, Ordering::AcqRel);
        }
        if !report.rearm {
            break;
        }
        turn += 1;
        if ticker.recv().is_err() {
            warn!("frame ticker stopped; ending render loop");
            break;
        }
    }

    RunSummary {
        label,
        frames: visual.counters(),
        controller: visual.controller_stats(),
        accounting: Accounting::collect(&contexts),
        final_scale: visual.device_scale(),
        elapsed: started.elapsed(),
    }
}

/// Builds the resource set for `asset` once on a fresh headless context.
pub fn check(asset: renderer::ShaderAsset, options: renderer::PanelOptions) -> Result<()> {
    let label = asset.label().to_string();
    let texture = asset
        .texture()
        .map_or_else(|| "none".to_string(), |wrap| wrap.to_string());
    let context = RenderContext::new(HeadlessGl::new());
    let mut controller = RenderLoopController::new(asset, options);

    let outcome = controller.draw(&context, renderer::PixelSize::new(1, 1), 0.0);
    let built = context.gl().live_objects().len();
    controller.teardown();

    outcome.with_context(|| format!("shader '{label}' failed to build"))?;
    println!("ok: {label} (texture={texture}, {built} GL objects)");
    Ok(())
}

pub fn list_variants() {
    for variant in renderer::ShaderVariant::ALL {
        let texture = variant
            .texture()
            .map_or_else(|| "none".to_string(), |wrap| wrap.to_string());
        println!("{:<8} texture={texture}", variant.name());
    }
}
