//! Control-thread to render-thread messaging.
//!
//! The control side owns a [`PanelHandle`], the render side a [`Mailbox`].
//! Messages are delivered in send order and each is consumed exactly once.

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tracing::debug;

/// Lifecycle message posted to the render thread.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanelMessage {
    /// The device scale factor the viewport is computed with.
    ScaleChanged(f64),
    /// The panel left its host; release everything and stop drawing.
    Teardown,
}

/// Opens a channel and posts `initial_scale` so the first frame sees it.
pub fn panel_channel(initial_scale: f64) -> (PanelHandle, Mailbox) {
    let (sender, receiver) = unbounded();
    let handle = PanelHandle {
        sender,
        scale: initial_scale,
    };
    handle.post(PanelMessage::ScaleChanged(initial_scale));
    (
        handle,
        Mailbox {
            receiver,
            torn_down: false,
        },
    )
}

/// Control-thread side of the panel.
#[derive(Debug)]
pub struct PanelHandle {
    sender: Sender<PanelMessage>,
    scale: f64,
}

impl PanelHandle {
    /// Updates the render scaling property, posting a message when it
    /// actually changed.
    pub fn set_render_scaling(&mut self, scale: f64) {
        if scale == self.scale {
            return;
        }
        self.scale = scale;
        self.post(PanelMessage::ScaleChanged(scale));
    }

    pub fn render_scaling(&self) -> f64 {
        self.scale
    }

    /// Detaches the panel. The render thread releases its resources on the
    /// next frame and stops re-arming.
    pub fn detach(self) {
        self.post(PanelMessage::Teardown);
    }

    fn post(&self, message: PanelMessage) {
        if self.sender.send(message).is_err() {
            debug!(?message, "render side already gone; message dropped");
        }
    }
}

/// Render-thread side of the panel.
#[derive(Debug)]
pub struct Mailbox {
    receiver: Receiver<PanelMessage>,
    torn_down: bool,
}

impl Mailbox {
    /// Takes every queued message in FIFO order without blocking.
    ///
    /// Once the handle is gone and the queue is empty a `Teardown` is
    /// synthesised unless one was already delivered, so dropping the handle
    /// behaves like detaching it.
    pub fn drain(&mut self) -> Vec<PanelMessage> {
        let mut messages = Vec::new();
        loop {
            match self.receiver.try_recv() {
                Ok(message) => {
                    self.torn_down |= message == PanelMessage::Teardown;
                    messages.push(message);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.torn_down {
                        self.torn_down = true;
                        debug!("panel handle dropped without detach; tearing down");
                        messages.push(PanelMessage::Teardown);
                    }
                    break;
                }
            }
        }
        messages
    }
}
