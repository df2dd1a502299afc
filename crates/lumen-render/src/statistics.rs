// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Rolling frame timing statistics.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A started timer.
#[derive(Debug, Clone)]
pub(crate) struct Stopwatch {
    start_time: Instant,
}

impl Stopwatch {
    #[inline]
    pub(crate) fn new() -> Self {
        Self {
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub(crate) fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }
}

/// A snapshot of [`FrameStatistics`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatisticsSnapshot {
    /// Frames rendered since startup.
    pub frame_count: u64,
    /// Frames dropped since startup.
    pub skipped_frames: u64,
    /// Swap chain recreations since startup.
    pub swap_chain_recreations: u64,
    /// Mean duration over the window.
    pub average_frame_time: Duration,
    /// Frames per second derived from the mean duration.
    pub fps: f64,
}

/// Frame durations averaged over a rolling window.
#[derive(Debug)]
pub struct FrameStatistics {
    window: usize,
    samples: VecDeque<Duration>,
    current: Option<Stopwatch>,
    frame_count: u64,
    skipped_frames: u64,
    swap_chain_recreations: u64,
}

impl FrameStatistics {
    /// Creates statistics averaging over `window` frames (at least one).
    pub fn new(window: usize) -> Self {
        let window = window.max(1);
        Self {
            window,
            samples: VecDeque::with_capacity(window),
            current: None,
            frame_count: 0,
            skipped_frames: 0,
            swap_chain_recreations: 0,
        }
    }

    /// Starts timing a frame.
    pub fn start_frame(&mut self) {
        self.current = Some(Stopwatch::new());
    }

    /// Stops timing the current frame and records it.
    pub fn stop_frame(&mut self) {
        if let Some(watch) = self.current.take() {
            self.record(watch.elapsed());
        }
    }

    /// Records a frame of known duration.
    pub fn record(&mut self, duration: Duration) {
        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(duration);
        self.frame_count += 1;
    }

    /// Counts a dropped frame and discards its timer.
    pub fn skip_frame(&mut self) {
        self.current = None;
        self.skipped_frames += 1;
    }

    /// Counts a swap chain recreation.
    pub fn record_recreation(&mut self) {
        self.swap_chain_recreations += 1;
    }

    /// Mean frame duration over the window.
    pub fn average_frame_time(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        self.samples.iter().sum::<Duration>() / self.samples.len() as u32
    }

    /// Frames per second, or 0 before the first frame.
    pub fn fps(&self) -> f64 {
        let average = self.average_frame_time().as_secs_f64();
        if average > 0.0 {
            1.0 / average
        } else {
            0.0
        }
    }

    /// Frames rendered since startup.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Frames dropped since startup.
    pub fn skipped_frames(&self) -> u64 {
        self.skipped_frames
    }

    /// Swap chain recreations since startup.
    pub fn swap_chain_recreations(&self) -> u64 {
        self.swap_chain_recreations
    }

    /// A copy of the current values.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            frame_count: self.frame_count,
            skipped_frames: self.skipped_frames,
            swap_chain_recreations: self.swap_chain_recreations,
            average_frame_time: self.average_frame_time(),
            fps: self.fps(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn window_drops_oldest_samples() {
        let mut stats = FrameStatistics::new(2);
        stats.record(Duration::from_millis(100));
        stats.record(Duration::from_millis(10));
        stats.record(Duration::from_millis(30));
        assert_eq!(stats.average_frame_time(), Duration::from_millis(20));
        assert_relative_eq!(stats.fps(), 50.0, epsilon = 1e-9);
        assert_eq!(stats.frame_count(), 3);
    }

    #[test]
    fn empty_statistics_report_zero() {
        let stats = FrameStatistics::new(0);
        assert_eq!(stats.average_frame_time(), Duration::ZERO);
        assert_eq!(stats.fps(), 0.0);
    }

    #[test]
    fn skipped_frames_are_not_sampled() {
        let mut stats = FrameStatistics::new(30);
        stats.start_frame();
        stats.skip_frame();
        stats.stop_frame();
        let snapshot = stats.snapshot();
        assert_eq!(snapshot.frame_count, 0);
        assert_eq!(snapshot.skipped_frames, 1);
    }
}
