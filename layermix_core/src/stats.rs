// Copyright 2026 the Layermix Authors
// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Windowed frame-rate measurement.

use crate::time::{Duration, HostTime};

/// Counts frames over one-second windows and reports frames per second.
///
/// A window opens on the first recorded frame. Once at least
/// [`WINDOW`](Self::WINDOW) has elapsed since it opened, the rate is
/// recomputed as `frames / elapsed_seconds` and a new window opens at the
/// closing frame's timestamp.
#[derive(Clone, Copy, Debug, Default)]
pub struct FpsCounter {
    window_start: Option<HostTime>,
    frames: u32,
    fps: f64,
    total_frames: u64,
}

impl FpsCounter {
    /// Length of one measurement window.
    pub const WINDOW: Duration = Duration::SECOND;

    /// Creates a counter that reports zero until the first window closes.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            window_start: None,
            frames: 0,
            fps: 0.0,
            total_frames: 0,
        }
    }

    /// Opens the first window at `now` without counting a frame.
    ///
    /// Calling this before the first [`record`](Self::record) makes the
    /// first frame count toward a window that started earlier, which is how
    /// a render loop measures from its own start.
    pub fn start(&mut self, now: HostTime) {
        if self.window_start.is_none() {
            self.window_start = Some(now);
        }
    }

    /// Records one frame at `now`.
    ///
    /// Returns the new rate when this frame closes a window.
    pub fn record(&mut self, now: HostTime) -> Option<f64> {
        let start = *self.window_start.get_or_insert(now);
        self.frames = self.frames.saturating_add(1);
        self.total_frames = self.total_frames.saturating_add(1);

        let elapsed = now.saturating_duration_since(start);
        if elapsed >= Self::WINDOW {
            self.fps = f64::from(self.frames) / elapsed.as_secs_f64();
            self.frames = 0;
            self.window_start = Some(now);
            Some(self.fps)
        } else {
            None
        }
    }

    /// Returns the rate computed by the last closed window.
    #[must_use]
    pub const fn fps(&self) -> f64 {
        self.fps
    }

    /// Returns the number of frames recorded since creation.
    #[must_use]
    pub const fn total_frames(&self) -> u64 {
        self.total_frames
    }
}
