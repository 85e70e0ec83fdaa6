use std::time::Instant;

/// Snapshot of the frame clock handed to the `time` uniform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeSample {
    /// Elapsed seconds since the source was created.
    pub seconds: f64,
    /// Monotonic frame counter for the running session.
    pub frame_index: u64,
}

impl TimeSample {
    pub fn new(seconds: f64, frame_index: u64) -> Self {
        Self {
            seconds,
            frame_index,
        }
    }
}

/// Abstraction over where frame time originates from.
pub trait TimeSource: Send {
    /// Produces the sample for the next frame.
    fn sample(&mut self) -> TimeSample;
}

/// Time source backed by the system monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct SystemTimeSource {
    origin: Instant,
    frame: u64,
}

impl SystemTimeSource {
    /// Starts counting from `Instant::now()`.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self {
            origin: Instant::now(),
            frame: 0,
        }
    }
}

impl TimeSource for SystemTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.origin.elapsed().as_secs_f64(), self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Time source that always reports the same timestamp.
#[derive(Debug, Clone, Copy)]
pub struct FixedTimeSource {
    time: f64,
    frame: u64,
}

impl FixedTimeSource {
    pub fn new(time: f64) -> Self {
        Self { time, frame: 0 }
    }
}

impl TimeSource for FixedTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.time, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Simulated clock advancing by a fixed step per sampled frame.
///
/// The first sample reads zero.
#[derive(Debug, Clone, Copy)]
pub struct SteppedTimeSource {
    step: f64,
    frame: u64,
}

impl SteppedTimeSource {
    pub fn new(step: f64) -> Self {
        Self { step, frame: 0 }
    }

    /// One step per frame at `fps` frames per second.
    pub fn per_frame(fps: f64) -> Self {
        Self::new(1.0 / fps)
    }
}

impl TimeSource for SteppedTimeSource {
    fn sample(&mut self) -> TimeSample {
        let sample = TimeSample::new(self.step * self.frame as f64, self.frame);
        self.frame = self.frame.saturating_add(1);
        sample
    }
}

/// Owning handle for a time source behind a trait object.
pub type BoxedTimeSource = Box<dyn TimeSource + Send>;
