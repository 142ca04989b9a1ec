use std::time::Duration;

pub use pupil_track_types::{Frame, FrameError, FrameResult};

pub type DynFrameSource = Box<dyn FrameSource>;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct VideoMetadata {
    pub duration: Option<Duration>,
    pub fps: Option<f64>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub total_frames: Option<u64>,
}

impl VideoMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration_and_fps(duration: Duration, fps: f64) -> Self {
        Self {
            duration: Some(duration),
            fps: Some(fps),
            ..Default::default()
        }
    }

    pub fn duration_ms(&self) -> Option<f64> {
        self.duration.map(|d| d.as_secs_f64() * 1000.0)
    }

    pub fn calculate_total_frames(&self) -> Option<u64> {
        if let Some(total) = self.total_frames {
            return Some(total);
        }

        if let (Some(duration), Some(fps)) = (self.duration, self.fps) {
            let seconds = duration.as_secs_f64();
            let total = (seconds * fps).round();
            if total.is_finite() && total >= 0.0 {
                return Some(total as u64);
            }
        }

        None
    }
}

/// Result of pulling one frame from a source.
#[derive(Debug, Clone)]
pub enum NextFrame {
    Frame(Frame),
    EndOfStream,
}

/// Pull-based frame source driven by the tracking session.
///
/// Sources are read strictly in order from the current cursor; `seek` moves
/// the cursor so the next call to `next_frame` yields the requested index.
pub trait FrameSource: Send + 'static {
    fn metadata(&self) -> VideoMetadata;

    fn next_frame(&mut self) -> FrameResult<NextFrame>;

    fn seek(&mut self, index: u64) -> FrameResult<()>;

    /// Index of the frame the next `next_frame` call will return.
    fn position(&self) -> u64;

    fn frame_count(&self) -> u64 {
        self.metadata().calculate_total_frames().unwrap_or(0)
    }

    fn native_size(&self) -> Option<(u32, u32)> {
        let metadata = self.metadata();
        match (metadata.width, metadata.height) {
            (Some(width), Some(height)) => Some((width, height)),
            _ => None,
        }
    }
}

pub(crate) fn check_seek(backend: &'static str, index: u64, frame_count: u64) -> FrameResult<()> {
    if index > frame_count {
        return Err(FrameError::backend_failure(
            backend,
            format!("seek to frame {index} past end of {frame_count}-frame stream"),
        ));
    }
    Ok(())
}

pub(crate) fn frame_timestamp(index: u64, fps: f64) -> Option<Duration> {
    if fps.is_finite() && fps > 0.0 {
        Some(Duration::from_secs_f64(index as f64 / fps))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_frames_derived_from_duration_and_fps() {
        let metadata = VideoMetadata::with_duration_and_fps(Duration::from_secs(2), 29.97);
        assert_eq!(metadata.calculate_total_frames(), Some(60));
    }

    #[test]
    fn explicit_total_frames_wins() {
        let metadata = VideoMetadata {
            total_frames: Some(7),
            ..VideoMetadata::with_duration_and_fps(Duration::from_secs(2), 30.0)
        };
        assert_eq!(metadata.calculate_total_frames(), Some(7));
    }

    #[test]
    fn timestamps_require_positive_fps() {
        assert_eq!(frame_timestamp(30, 60.0), Some(Duration::from_millis(500)));
        assert_eq!(frame_timestamp(30, 0.0), None);
    }
}
