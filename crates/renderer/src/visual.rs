use tracing::{debug, error};

use crate::context::RenderContext;
use crate::controller::{ControllerStats, FrameOutcome, LoopState, PanelOptions, RenderLoopController};
use crate::error::RenderError;
use crate::gl::GlApi;
use crate::message::{panel_channel, Mailbox, PanelHandle};
use crate::runtime::BoxedTimeSource;
use crate::shaders::ShaderAsset;
use crate::types::PixelSize;

/// What happened during one [`PanelVisual::on_render`] call.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Whether the host should schedule another animation frame.
    pub rearm: bool,
    pub status: FrameStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameStatus {
    Drawn,
    /// Degenerate size or no context this turn.
    Skipped,
    /// The frame failed; the error was logged.
    Failed(RenderError),
    /// The panel has been torn down.
    Detached,
}

/// Running totals across frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameCounters {
    pub drawn: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// The render-thread half of a panel: mailbox, frame clock and controller.
///
/// Hosts call [`on_render`](Self::on_render) once per animation frame and
/// request another frame while the report asks for it.
pub struct PanelVisual<G: GlApi> {
    controller: RenderLoopController<G>,
    mailbox: Mailbox,
    clock: BoxedTimeSource,
    last_error: Option<RenderError>,
    counters: FrameCounters,
}

impl<G: GlApi> PanelVisual<G> {
    pub fn new(
        controller: RenderLoopController<G>,
        mailbox: Mailbox,
        clock: BoxedTimeSource,
    ) -> Self {
        Self {
            controller,
            mailbox,
            clock,
            last_error: None,
            counters: FrameCounters::default(),
        }
    }

    /// Attaches a new panel, returning the control-side handle alongside the
    /// visual. The handle has already posted `initial_scale`.
    pub fn attach(
        asset: ShaderAsset,
        options: PanelOptions,
        initial_scale: f64,
        clock: BoxedTimeSource,
    ) -> (PanelHandle, Self) {
        let (handle, mailbox) = panel_channel(initial_scale);
        let controller = RenderLoopController::new(asset, options);
        (handle, Self::new(controller, mailbox, clock))
    }

    /// Applies queued messages, then draws at most one frame.
    ///
    /// Failures are logged and reported, never propagated: a broken shader
    /// keeps the panel alive and the next frame tries again.
    pub fn on_render(
        &mut self,
        context: Option<&RenderContext<G>>,
        size: PixelSize,
    ) -> FrameReport {
        for message in self.mailbox.drain() {
            self.controller.handle_message(message);
        }

        let status = match context {
            _ if self.controller.is_disposed() => FrameStatus::Detached,
            None => FrameStatus::Skipped,
            Some(context) => {
                let sample = self.clock.sample();
                match self.controller.draw(context, size, sample.seconds) {
                    Ok(FrameOutcome::Drawn) => {
                        self.last_error = None;
                        FrameStatus::Drawn
                    }
                    Ok(FrameOutcome::Skipped) => FrameStatus::Skipped,
                    Ok(FrameOutcome::Disposed) => FrameStatus::Detached,
                    Err(err) => {
                        self.report(&err, sample.frame_index);
                        FrameStatus::Failed(err)
                    }
                }
            }
        };

        match status {
            FrameStatus::Drawn => self.counters.drawn += 1,
            FrameStatus::Skipped => self.counters.skipped += 1,
            FrameStatus::Failed(_) => self.counters.failed += 1,
            FrameStatus::Detached => {}
        }

        FrameReport {
            rearm: !self.controller.is_disposed(),
            status,
        }
    }

    fn report(&mut self, err: &RenderError, frame: u64) {
        if self.last_error.as_ref() == Some(err) {
            debug!(error = %err, frame, "panel frame failed again");
        } else {
            error!(
                error = %err,
                frame,
                asset = self.controller.asset().label(),
                state = ?self.controller.state(),
                "panel frame failed"
            );
            self.last_error = Some(err.clone());
        }
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    pub fn state(&self) -> LoopState {
        self.controller.state()
    }

    pub fn controller_stats(&self) -> ControllerStats {
        self.controller.stats()
    }

    pub fn device_scale(&self) -> f64 {
        self.controller.device_scale()
    }
}
