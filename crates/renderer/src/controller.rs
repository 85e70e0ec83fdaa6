use std::mem;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::context::{ContextId, RenderContext};
use crate::error::RenderError;
use crate::gl::GlApi;
use crate::gpu::ContextBoundResources;
use crate::message::PanelMessage;
use crate::shaders::ShaderAsset;
use crate::types::{DriverErrorPolicy, FrameInput, PixelSize};

/// Knobs fixed for the lifetime of a panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PanelOptions {
    /// Seed of the generator that fills procedural textures.
    pub texture_seed: u64,
    pub on_driver_error: DriverErrorPolicy,
}

/// Observable state of a [`RenderLoopController`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Uninitialized,
    Bound(ContextId),
    Disposed,
}

/// What a successful [`RenderLoopController::draw`] did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Drawn,
    /// The panel is smaller than a pixel; nothing touched the driver.
    Skipped,
    /// The panel was torn down; nothing touched the driver.
    Disposed,
}

enum Slot<G: GlApi> {
    Uninitialized,
    Bound(ContextBoundResources<G>),
    Disposed,
}

/// Lifecycle counters, mostly for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControllerStats {
    /// Resource sets successfully constructed.
    pub builds: u64,
    /// Construction attempts that failed.
    pub failed_builds: u64,
    /// Sets released because the context changed under them.
    pub migrations: u64,
    /// Sets released after a driver error while drawing.
    pub error_rebuilds: u64,
}

/// Owns at most one resource set and keeps it bound to whichever context
/// the host draws with.
///
/// Lives on the render thread. Messages from the control thread are applied
/// through [`handle_message`](Self::handle_message) before the frame's
/// [`draw`](Self::draw).
pub struct RenderLoopController<G: GlApi> {
    asset: ShaderAsset,
    options: PanelOptions,
    noise: StdRng,
    device_scale: f64,
    slot: Slot<G>,
    stats: ControllerStats,
}

impl<G: GlApi> RenderLoopController<G> {
    pub fn new(asset: ShaderAsset, options: PanelOptions) -> Self {
        Self {
            asset,
            noise: StdRng::seed_from_u64(options.texture_seed),
            options,
            device_scale: 1.0,
            slot: Slot::Uninitialized,
            stats: ControllerStats::default(),
        }
    }

    pub fn state(&self) -> LoopState {
        match &self.slot {
            Slot::Uninitialized => LoopState::Uninitialized,
            Slot::Bound(resources) => LoopState::Bound(resources.context_id()),
            Slot::Disposed => LoopState::Disposed,
        }
    }

    pub fn is_disposed(&self) -> bool {
        matches!(self.slot, Slot::Disposed)
    }

    pub fn device_scale(&self) -> f64 {
        self.device_scale
    }

    pub fn asset(&self) -> &ShaderAsset {
        &self.asset
    }

    pub fn stats(&self) -> ControllerStats {
        self.stats
    }

    pub fn handle_message(&mut self, message: PanelMessage) {
        match message {
            PanelMessage::ScaleChanged(scale) if scale.is_finite() && scale > 0.0 => {
                debug!(scale, "device scale changed");
                self.device_scale = scale;
            }
            PanelMessage::ScaleChanged(scale) => {
                warn!(scale, "ignoring non-positive device scale");
            }
            PanelMessage::Teardown => self.teardown(),
        }
    }

    /// Releases the resource set, if any, and stops all further drawing.
    /// Calling it again has no effect.
    pub fn teardown(&mut self) {
        match mem::replace(&mut self.slot, Slot::Disposed) {
            Slot::Bound(resources) => {
                debug!(context = ?resources.context_id(), "tearing down panel");
                resources.dispose();
            }
            Slot::Uninitialized => debug!("tearing down panel before first build"),
            Slot::Disposed => {}
        }
    }

    /// Draws one frame with `context`, rebuilding the resource set first when
    /// it belongs to another context or does not exist yet.
    pub fn draw(
        &mut self,
        context: &RenderContext<G>,
        size: PixelSize,
        elapsed_seconds: f64,
    ) -> Result<FrameOutcome, RenderError> {
        if self.is_disposed() {
            return Ok(FrameOutcome::Disposed);
        }
        if !size.is_drawable() {
            return Ok(FrameOutcome::Skipped);
        }

        let resources = match mem::replace(&mut self.slot, Slot::Uninitialized) {
            Slot::Bound(resources) if resources.matches_context(context) => resources,
            Slot::Bound(stale) => {
                debug!(
                    from = ?stale.context_id(),
                    to = ?context.id(),
                    "rendering context changed; rebuilding resources"
                );
                stale.dispose();
                self.stats.migrations += 1;
                self.build(context)?
            }
            Slot::Uninitialized => self.build(context)?,
            Slot::Disposed => {
                self.slot = Slot::Disposed;
                return Ok(FrameOutcome::Disposed);
            }
        };

        let frame = FrameInput::new(size, self.device_scale, elapsed_seconds);
        match resources.draw(&frame) {
            Ok(()) => {
                self.slot = Slot::Bound(resources);
                Ok(FrameOutcome::Drawn)
            }
            Err(err) if err.is_driver_error() => {
                match self.options.on_driver_error {
                    DriverErrorPolicy::Rebuild => {
                        debug!(context = ?context.id(), "releasing resources after driver error");
                        resources.dispose();
                        self.stats.error_rebuilds += 1;
                    }
                    DriverErrorPolicy::LogOnly => self.slot = Slot::Bound(resources),
                }
                Err(err)
            }
            Err(err) => {
                self.slot = Slot::Bound(resources);
                Err(err)
            }
        }
    }

    fn build(
        &mut self,
        context: &RenderContext<G>,
    ) -> Result<ContextBoundResources<G>, RenderError> {
        match ContextBoundResources::construct(context, &self.asset, &mut self.noise) {
            Ok(resources) => {
                self.stats.builds += 1;
                Ok(resources)
            }
            Err(err) => {
                self.stats.failed_builds += 1;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::rc::Rc;

    use super::*;
    use crate::gl::{HeadlessGl, ResourceKind, UniformValue};
    use crate::types::ShaderVariant;

    fn controller(variant: ShaderVariant) -> RenderLoopController<HeadlessGl> {
        RenderLoopController::new(ShaderAsset::builtin(variant), PanelOptions::default())
    }

    fn released_set(gl: &HeadlessGl) -> BTreeSet<(ResourceKind, u32)> {
        gl.stats().released.into_iter().collect()
    }

    fn allocated_set(gl: &HeadlessGl) -> BTreeSet<(ResourceKind, u32)> {
        gl.stats().allocated.into_iter().collect()
    }

    #[test]
    fn context_migration_disposes_old_set_before_building_new() {
        let first = RenderContext::new(HeadlessGl::new());
        let second = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Noise);
        let size = PixelSize::new(800, 600);

        assert_eq!(controller.draw(&first, size, 0.0), Ok(FrameOutcome::Drawn));
        assert_eq!(controller.state(), LoopState::Bound(first.id()));
        assert_eq!(first.gl().viewport(), Some([0, 0, 800, 600]));
        assert_eq!(first.gl().get_error(), glow::NO_ERROR);
        assert!(released_set(first.gl()).is_empty());

        assert_eq!(controller.draw(&second, size, 0.1), Ok(FrameOutcome::Drawn));
        assert_eq!(controller.state(), LoopState::Bound(second.id()));
        assert_eq!(released_set(first.gl()), allocated_set(first.gl()));
        assert!(first.gl().live_objects().is_empty());
        assert_eq!(first.gl().stats().double_releases, 0);
        assert_eq!(second.gl().stats().draw_calls, 1);
        assert_eq!(second.gl().get_error(), glow::NO_ERROR);

        controller.teardown();
        assert!(second.gl().live_objects().is_empty());
        assert_eq!(
            controller.stats(),
            ControllerStats {
                builds: 2,
                migrations: 1,
                ..ControllerStats::default()
            }
        );
    }

    #[test]
    fn same_context_draws_without_rebuilding() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Plasma);
        for frame in 0..5 {
            let outcome = controller.draw(&ctx, PixelSize::new(64, 64), frame as f64);
            assert_eq!(outcome, Ok(FrameOutcome::Drawn));
        }
        assert_eq!(controller.stats().builds, 1);
        assert_eq!(ctx.gl().stats().draw_calls, 5);
        controller.teardown();
    }

    #[test]
    fn rewrapped_driver_counts_as_new_context() {
        let shared = Rc::new(HeadlessGl::new());
        let first = RenderContext::from_shared(Rc::clone(&shared));
        let second = RenderContext::from_shared(Rc::clone(&shared));
        let mut controller = controller(ShaderVariant::Bouncy);
        controller.draw(&first, PixelSize::new(10, 10), 0.0).unwrap();
        controller.draw(&second, PixelSize::new(10, 10), 0.0).unwrap();
        assert_eq!(controller.stats().builds, 2);
        controller.teardown();
        assert!(shared.live_objects().is_empty());
    }

    #[test]
    fn teardown_is_idempotent() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Grain);
        controller.draw(&ctx, PixelSize::new(100, 50), 0.0).unwrap();

        controller.handle_message(PanelMessage::Teardown);
        controller.handle_message(PanelMessage::Teardown);
        controller.teardown();

        assert_eq!(controller.state(), LoopState::Disposed);
        let stats = ctx.gl().stats();
        assert_eq!(stats.double_releases, 0);
        assert_eq!(stats.allocated.len(), stats.released.len());
    }

    #[test]
    fn teardown_before_first_frame_is_safe() {
        let mut controller = controller(ShaderVariant::Bouncy);
        controller.teardown();
        assert_eq!(controller.state(), LoopState::Disposed);
    }

    #[test]
    fn disposed_controller_never_builds_again() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Bouncy);
        controller.teardown();
        let outcome = controller.draw(&ctx, PixelSize::new(800, 600), 0.0);
        assert_eq!(outcome, Ok(FrameOutcome::Disposed));
        assert_eq!(ctx.gl().call_count(), 0);
        assert!(ctx.gl().stats().allocated.is_empty());
    }

    #[test]
    fn zero_size_frame_leaves_state_and_driver_untouched() {
        let bound = RenderContext::new(HeadlessGl::new());
        let other = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Bouncy);
        controller.draw(&bound, PixelSize::new(32, 32), 0.0).unwrap();
        let calls = bound.gl().call_count();

        for size in [PixelSize::new(0, 600), PixelSize::new(800, 0)] {
            assert_eq!(controller.draw(&other, size, 1.0), Ok(FrameOutcome::Skipped));
        }
        assert_eq!(controller.state(), LoopState::Bound(bound.id()));
        assert_eq!(bound.gl().call_count(), calls);
        assert_eq!(other.gl().call_count(), 0);
        controller.teardown();
    }

    #[test]
    fn scale_change_applies_to_the_next_draw() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Bouncy);
        let size = PixelSize::new(400, 300);

        controller.draw(&ctx, size, 0.0).unwrap();
        assert_eq!(ctx.gl().viewport(), Some([0, 0, 400, 300]));

        controller.handle_message(PanelMessage::ScaleChanged(2.0));
        assert_eq!(controller.state(), LoopState::Bound(ctx.id()));
        controller.draw(&ctx, size, 0.0).unwrap();
        assert_eq!(ctx.gl().viewport(), Some([0, 0, 800, 600]));
        assert_eq!(controller.stats().builds, 1);

        controller.handle_message(PanelMessage::ScaleChanged(-1.0));
        assert_eq!(controller.device_scale(), 2.0);
        controller.teardown();
    }

    #[test]
    fn invalid_scales_keep_the_previous_value() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Fancy);
        controller.handle_message(PanelMessage::ScaleChanged(1.5));
        for scale in [0.0, -2.0, f64::NAN, f64::INFINITY] {
            controller.handle_message(PanelMessage::ScaleChanged(scale));
            assert_eq!(controller.device_scale(), 1.5, "{scale}");
        }
        controller.draw(&ctx, PixelSize::new(100, 40), 0.0).unwrap();
        assert_eq!(ctx.gl().viewport(), Some([0, 0, 150, 60]));
        controller.teardown();
    }

    #[test]
    fn driver_error_during_construction_is_retried_on_the_next_frame() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Noise);
        ctx.gl().fail_after("tex_image_2d", glow::OUT_OF_MEMORY);

        let err = controller.draw(&ctx, PixelSize::new(16, 16), 0.0).unwrap_err();
        assert!(err.is_driver_error());
        assert_eq!(controller.state(), LoopState::Uninitialized);
        assert!(ctx.gl().live_objects().is_empty());

        assert_eq!(
            controller.draw(&ctx, PixelSize::new(16, 16), 0.1),
            Ok(FrameOutcome::Drawn)
        );
        assert_eq!(controller.stats().failed_builds, 1);
        assert_eq!(controller.stats().builds, 1);
        controller.teardown();
        assert!(ctx.gl().live_objects().is_empty());
    }

    #[test]
    fn compile_failure_leaves_controller_uninitialized_and_retries() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let asset = ShaderAsset::builtin(ShaderVariant::Bouncy).with_fragment("void main() {");
        let mut controller = RenderLoopController::new(asset, PanelOptions::default());

        for _ in 0..2 {
            let err = controller.draw(&ctx, PixelSize::new(10, 10), 0.0).unwrap_err();
            assert!(matches!(err, RenderError::ShaderCompile { .. }));
            assert_eq!(controller.state(), LoopState::Uninitialized);
        }
        assert_eq!(controller.stats().failed_builds, 2);
        assert!(ctx.gl().live_objects().is_empty());
        assert!(ctx
            .gl()
            .stats()
            .allocated
            .iter()
            .all(|(kind, _)| *kind == ResourceKind::Shader));
    }

    #[test]
    fn failed_rebuild_after_migration_still_released_old_set() {
        let first = RenderContext::new(HeadlessGl::new());
        let second = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Plasma);
        controller.draw(&first, PixelSize::new(10, 10), 0.0).unwrap();

        second.gl().lose_context();
        assert!(controller.draw(&second, PixelSize::new(10, 10), 0.0).is_err());
        assert_eq!(controller.state(), LoopState::Uninitialized);
        assert!(first.gl().live_objects().is_empty());
    }

    #[test]
    fn driver_error_with_rebuild_policy_rebuilds_next_frame() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let mut controller = controller(ShaderVariant::Bouncy);
        controller.draw(&ctx, PixelSize::new(10, 10), 0.0).unwrap();

        ctx.gl().inject_error(glow::INVALID_OPERATION);
        let err = controller.draw(&ctx, PixelSize::new(10, 10), 0.1).unwrap_err();
        assert!(err.is_driver_error());
        assert_eq!(controller.state(), LoopState::Uninitialized);
        assert!(ctx.gl().live_objects().is_empty());

        assert_eq!(
            controller.draw(&ctx, PixelSize::new(10, 10), 0.2),
            Ok(FrameOutcome::Drawn)
        );
        assert_eq!(controller.stats().builds, 2);
        assert_eq!(controller.stats().error_rebuilds, 1);
        controller.teardown();
    }

    #[test]
    fn driver_error_with_log_only_policy_keeps_resources() {
        let ctx = RenderContext::new(HeadlessGl::new());
        let options = PanelOptions {
            on_driver_error: DriverErrorPolicy::LogOnly,
            ..PanelOptions::default()
        };
        let mut controller =
            RenderLoopController::new(ShaderAsset::builtin(ShaderVariant::Bouncy), options);
        controller.draw(&ctx, PixelSize::new(10, 10), 0.0).unwrap();

        ctx.gl().inject_error(glow::OUT_OF_MEMORY);
        assert!(controller.draw(&ctx, PixelSize::new(10, 10), 0.1).is_err());
        assert_eq!(controller.state(), LoopState::Bound(ctx.id()));

        controller.draw(&ctx, PixelSize::new(10, 10), 0.2).unwrap();
        assert_eq!(controller.stats().builds, 1);
        assert_eq!(
            ctx.gl().uniform_value("time"),
            Some(UniformValue::Float(0.2))
        );
        controller.teardown();
    }
}
