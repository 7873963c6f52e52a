//! Frame timing

use std::time::Instant;

use glam::Vec2;

/// Per-frame values handed to update hooks and uploaded as shader uniforms.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FrameContext {
    /// Seconds since the clock started
    pub time: f32,
    /// Seconds since the previous frame
    pub delta: f32,
    /// Cursor position in pixels
    pub mouse: Vec2,
    /// Framebuffer size in pixels
    pub resolution: Vec2,
}

/// Produces [`FrameContext`]s from wall-clock or host-supplied time.
#[derive(Debug, Clone)]
pub struct Clock {
    start: Instant,
    last_time: Option<f32>,
    mouse: Vec2,
    resolution: Vec2,
    fps: f32,
    frame_ms: f32,
    frame_count: u64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            last_time: None,
            mouse: Vec2::ZERO,
            resolution: Vec2::ZERO,
            fps: 0.0,
            frame_ms: 0.0,
            frame_count: 0,
        }
    }

    pub fn set_mouse(&mut self, x: f32, y: f32) {
        self.mouse = Vec2::new(x, y);
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = Vec2::new(width as f32, height as f32);
    }

    /// Advance using wall-clock time.
    pub fn tick(&mut self) -> FrameContext {
        let now = self.start.elapsed().as_secs_f32();
        self.tick_at(now)
    }

    /// Advance to an explicit time in seconds.
    ///
    /// The first tick has a zero delta. Time going backwards also yields zero.
    pub fn tick_at(&mut self, seconds: f32) -> FrameContext {
        let delta = match self.last_time {
            Some(last) => (seconds - last).max(0.0),
            None => 0.0,
        };
        self.last_time = Some(seconds);
        self.frame_count += 1;

        self.frame_ms = delta * 1000.0;
        self.fps = if delta > 0.0 { 1.0 / delta } else { 0.0 };

        FrameContext {
            time: seconds,
            delta,
            mouse: self.mouse,
            resolution: self.resolution,
        }
    }

    pub fn fps(&self) -> f32 {
        self.fps
    }

    /// Duration of the last frame in milliseconds.
    pub fn frame_ms(&self) -> f32 {
        self.frame_ms
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_tick_has_zero_delta() {
        let mut clock = Clock::new();
        let frame = clock.tick_at(3.0);
        assert_eq!(frame.time, 3.0);
        assert_eq!(frame.delta, 0.0);
        assert_eq!(clock.fps(), 0.0);
    }

    #[test]
    fn test_tick_at_computes_delta_and_fps() {
        let mut clock = Clock::new();
        clock.tick_at(1.0);
        let frame = clock.tick_at(1.5);
        assert!((frame.delta - 0.5).abs() < 1e-6);
        assert!((clock.fps() - 2.0).abs() < 1e-4);
        assert!((clock.frame_ms() - 500.0).abs() < 1e-3);
        assert_eq!(clock.frame_count(), 2);
    }

    #[test]
    fn test_backwards_time_clamps_delta() {
        let mut clock = Clock::new();
        clock.tick_at(2.0);
        assert_eq!(clock.tick_at(1.0).delta, 0.0);
    }

    #[test]
    fn test_mouse_and_resolution_carried() {
        let mut clock = Clock::new();
        clock.set_mouse(10.0, 20.0);
        clock.set_resolution(800, 600);
        let frame = clock.tick();
        assert_eq!(frame.mouse, Vec2::new(10.0, 20.0));
        assert_eq!(frame.resolution, Vec2::new(800.0, 600.0));
        assert!(frame.time >= 0.0);
    }
}
