//! GPU objects owned by the panel.
//!
//! - `geometry` holds the unit quad and its vertex layout.
//! - `texture` fills and uploads the procedural noise texture.
//! - `state` builds, draws and releases one complete resource set against a
//!   single rendering context.

mod geometry;
mod state;
mod texture;

pub use state::ContextBoundResources;
