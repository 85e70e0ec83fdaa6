//! Rendering core for a continuously redrawing shader panel.
//!
//! The crate manages the lifetime of the GL objects a full-panel shader needs
//! and keeps them bound to whichever context the host renders with. The flow
//! for one animation frame is:
//!
//! ```text
//!   control thread                         render thread
//!   PanelHandle::set_render_scaling ─┐
//!   PanelHandle::detach ─────────────┤
//!                                    ▼
//!                         Mailbox ──▶ PanelVisual::on_render
//!                                        │ drain messages, sample clock
//!                                        ▼
//!                              RenderLoopController::draw
//!                                        │ context changed? dispose + construct
//!                                        ▼
//!                              ContextBoundResources::draw ──▶ GlApi
//! ```
//!
//! All GL work happens on the render thread. `RenderContext` shares its
//! driver through an `Rc`, so resource sets cannot be sent elsewhere.

mod context;
mod controller;
mod error;
pub mod gl;
mod gpu;
mod message;
mod runtime;
mod shaders;
mod types;
mod visual;

pub use context::{ContextId, RenderContext};
pub use controller::{ControllerStats, FrameOutcome, LoopState, PanelOptions, RenderLoopController};
pub use error::RenderError;
pub use gl::{GlApi, GlowDriver, HeadlessGl, HeadlessStats, ResourceKind};
pub use gpu::ContextBoundResources;
pub use message::{panel_channel, Mailbox, PanelHandle, PanelMessage};
pub use runtime::{
    BoxedTimeSource, FixedTimeSource, SteppedTimeSource, SystemTimeSource, TimeSample, TimeSource,
};
pub use shaders::{
    ShaderAsset, POSITION_ATTRIBUTE, POSITION_SLOT, RATIO_UNIFORM, SAMPLER_UNIFORM,
    TEXCOORD_ATTRIBUTE, TEXCOORD_SLOT, TIME_UNIFORM,
};
pub use types::{
    DriverErrorPolicy, FrameInput, PixelSize, ShaderStage, ShaderVariant, TextureWrap,
};
pub use visual::{FrameCounters, FrameReport, FrameStatus, PanelVisual};
