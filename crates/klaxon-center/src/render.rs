//! Render sink: where the visible notification list goes.
//!
//! Actual presentation (DOM, TUI, anything) is out of scope; the center
//! hands every repaint the full ordered set and the sink does whatever
//! display means locally.

use std::sync::{Arc, Mutex};

use klaxon_core::Notification;

/// Receives each repaint of the visible notification set.
pub trait RenderSink: Send {
    /// Present the current working set, in display order.
    fn render(&mut self, notifications: &[Notification]);
}

/// Sink that discards every frame.
#[derive(Debug, Default)]
pub struct NullSink;

impl RenderSink for NullSink {
    fn render(&mut self, _notifications: &[Notification]) {}
}

/// Sink that records every frame for later inspection (tests).
pub struct RecordingSink {
    frames: Arc<Mutex<Vec<Vec<Notification>>>>,
}

impl RecordingSink {
    /// Create a sink and a shared handle to its recorded frames.
    pub fn new() -> (Self, Arc<Mutex<Vec<Vec<Notification>>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                frames: frames.clone(),
            },
            frames,
        )
    }
}

impl RenderSink for RecordingSink {
    fn render(&mut self, notifications: &[Notification]) {
        self.frames.lock().unwrap().push(notifications.to_vec());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use klaxon_core::RawNotification;

    #[test]
    fn test_recording_sink_captures_frames() {
        let (mut sink, frames) = RecordingSink::new();
        let n = Notification::from_raw(RawNotification::new("1", 3));

        sink.render(&[n.clone()]);
        sink.render(&[]);

        let frames = frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0][0].id, "1");
        assert!(frames[1].is_empty());
    }
}
