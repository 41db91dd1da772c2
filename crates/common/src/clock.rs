//! Frame clock utilities.
//!
//! Every backend derives frame counts and frame timestamps from the same
//! [`FrameClock`], so the number of frames a timeline produces never depends
//! on which encoder renders it.

/// Maps between frame indices and presentation time at a fixed rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameClock {
    fps: u32,
}

impl FrameClock {
    /// Create a clock ticking at `fps` frames per second (minimum 1).
    pub fn new(fps: u32) -> Self {
        Self { fps: fps.max(1) }
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    /// Number of frames covering `duration_secs`: `round(duration * fps)`.
    pub fn frame_count(&self, duration_secs: f64) -> u64 {
        if duration_secs <= 0.0 {
            return 0;
        }
        (duration_secs * self.fps as f64).round() as u64
    }

    /// Presentation time of frame `index`, in seconds.
    pub fn frame_time(&self, index: u64) -> f64 {
        index as f64 / self.fps as f64
    }

    /// Duration of a single frame, in seconds.
    pub fn frame_duration(&self) -> f64 {
        1.0 / self.fps as f64
    }

    /// Duration actually covered by `frame_count(duration_secs)` frames.
    pub fn quantize(&self, duration_secs: f64) -> f64 {
        self.frame_count(duration_secs) as f64 / self.fps as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_count_rounds() {
        let clock = FrameClock::new(30);
        assert_eq!(clock.frame_count(6.0), 180);
        assert_eq!(clock.frame_count(0.0), 0);
        // 1.01s at 30fps is 30.3 frames
        assert_eq!(clock.frame_count(1.01), 30);
        assert_eq!(clock.frame_count(1.02), 31);
    }

    #[test]
    fn test_frame_time() {
        let clock = FrameClock::new(24);
        assert_eq!(clock.frame_time(0), 0.0);
        assert!((clock.frame_time(48) - 2.0).abs() < 1e-12);
        assert!((clock.frame_duration() - 1.0 / 24.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_fps_is_clamped() {
        let clock = FrameClock::new(0);
        assert_eq!(clock.fps(), 1);
        assert_eq!(clock.frame_count(3.0), 3);
    }

    #[test]
    fn test_quantize_matches_frame_grid() {
        let clock = FrameClock::new(30);
        assert!((clock.quantize(5.0) - 5.0).abs() < 1e-12);
        assert!((clock.quantize(1.01) - 1.0).abs() < 1e-12);
    }
}
