//! Coarse progress reporting to a caller-supplied sink

/// Receives `(percent, message)` updates from a running job
pub trait ProgressSink {
    fn report(&mut self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: FnMut(u8, &str),
{
    fn report(&mut self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Sink that drops every update
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _percent: u8, _message: &str) {}
}

/// Fixed milestones, in the order a transcription job reaches them
pub mod milestones {
    pub const SEPARATION_STARTED: u8 = 0;
    pub const STEM_SEPARATED: u8 = 30;
    pub const TEMPO_FOUND: u8 = 50;
    pub const LOOP_SELECTED: u8 = 70;
    pub const TRANSCRIPTION_DONE: u8 = 90;
    pub const SPECTROGRAM_RENDERED: u8 = 80;
    pub const COMPLETE: u8 = 100;
}

/// Forwards updates while keeping the percentage non-decreasing and <= 100
pub struct ProgressTracker<'a> {
    sink: &'a mut dyn ProgressSink,
    last: Option<u8>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(sink: &'a mut dyn ProgressSink) -> Self {
        Self { sink, last: None }
    }

    pub fn report(&mut self, percent: u8, message: &str) {
        let percent = percent.min(100);
        if let Some(last) = self.last {
            if percent < last {
                tracing::debug!(percent, last, message, "Dropping out-of-order progress update");
                return;
            }
        }
        self.last = Some(percent);
        tracing::debug!(percent, message, "Progress");
        self.sink.report(percent, message);
    }

    pub fn last(&self) -> Option<u8> {
        self.last
    }
}
