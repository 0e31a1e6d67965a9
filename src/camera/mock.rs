use super::{Camera, Frame};

/// Scripted frame source for bench runs and tests.
///
/// Plays back a sequence where `None` entries simulate a camera hiccup.
/// A single-entry script repeats forever; longer scripts run dry.
pub struct MockCamera {
    frames: Vec<Option<Frame>>,
    frame_index: usize,
    frames_served: u64,
    closed: bool,
}

impl MockCamera {
    pub fn new(frames: Vec<Option<Frame>>) -> Self {
        Self {
            frames,
            frame_index: 0,
            frames_served: 0,
            closed: false,
        }
    }

    pub fn new_repeating(frame: Frame) -> Self {
        Self::new(vec![Some(frame)])
    }

    pub fn frames_served(&self) -> u64 {
        self.frames_served
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Camera for MockCamera {
    fn get_frame(&mut self) -> Option<Frame> {
        if self.closed {
            return None;
        }
        let frame = if self.frames.len() == 1 {
            self.frames[0].clone()
        } else {
            let frame = self.frames.get(self.frame_index).cloned().flatten();
            self.frame_index += 1;
            frame
        };
        if frame.is_some() {
            self.frames_served += 1;
        }
        frame
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
