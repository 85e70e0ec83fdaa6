use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::gl::GlApi;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a rendering context.
///
/// Two ids are equal only if they were issued for the same context instance.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(u64);

impl ContextId {
    fn next() -> Self {
        ContextId(NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A rendering context as leased to the panel for one or more frames.
///
/// Cloning shares the driver and keeps the identity. The driver lives behind
/// an `Rc`, so neither the context nor anything built from it can leave the
/// render thread.
pub struct RenderContext<G: GlApi> {
    id: ContextId,
    gl: Rc<G>,
}

impl<G: GlApi> RenderContext<G> {
    /// Registers a freshly created context and assigns it a new identity.
    pub fn new(gl: G) -> Self {
        Self::from_shared(Rc::new(gl))
    }

    /// Registers a driver the host also keeps a handle to.
    pub fn from_shared(gl: Rc<G>) -> Self {
        Self {
            id: ContextId::next(),
            gl,
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn gl(&self) -> &G {
        &self.gl
    }

    /// Shared handle to the driver, e.g. for inspection after the panel
    /// released its resources.
    pub fn shared_gl(&self) -> Rc<G> {
        Rc::clone(&self.gl)
    }

    pub fn is_same(&self, other: &RenderContext<G>) -> bool {
        self.id == other.id
    }
}

impl<G: GlApi> Clone for RenderContext<G> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            gl: Rc::clone(&self.gl),
        }
    }
}

impl<G: GlApi> fmt::Debug for RenderContext<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderContext").field("id", &self.id).finish()
    }
}
