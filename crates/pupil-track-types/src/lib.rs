//! Shared domain models for the pupil-track workspace.
//!
//! This crate centralizes the lightweight data structures exchanged between
//! the decoder, detector, sink, core, and CLI crates. Keep it free of imaging
//! and I/O dependencies so every crate can depend on it cheaply.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

pub type FrameResult<T> = Result<T, FrameError>;

/// Interleaved 8-bit RGB frame at native resolution.
#[derive(Clone)]
pub struct Frame {
    width: u32,
    height: u32,
    stride: usize,
    frame_index: Option<u64>,
    timestamp: Option<Duration>,
    data: Arc<[u8]>,
}

impl fmt::Debug for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .field("timestamp", &self.timestamp)
            .field("bytes", &self.data.len())
            .field("frame_index", &self.frame_index)
            .finish()
    }
}

impl Frame {
    pub const CHANNELS: usize = 3;

    pub fn from_owned(
        width: u32,
        height: u32,
        stride: usize,
        timestamp: Option<Duration>,
        data: Vec<u8>,
    ) -> FrameResult<Self> {
        if width == 0 || height == 0 {
            return Err(FrameError::InvalidFrame {
                reason: format!("frame dimensions must be non-zero, got {width}x{height}"),
            });
        }
        let row_bytes = width as usize * Self::CHANNELS;
        if stride < row_bytes {
            return Err(FrameError::InvalidFrame {
                reason: format!("stride {stride} is smaller than a {width}px RGB row"),
            });
        }
        let required =
            stride
                .checked_mul(height as usize)
                .ok_or_else(|| FrameError::InvalidFrame {
                    reason: "calculated RGB plane length overflowed".into(),
                })?;
        if data.len() < required {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "insufficient RGB bytes: got {} expected at least {}",
                    data.len(),
                    required
                ),
            });
        }
        Ok(Self {
            width,
            height,
            stride,
            timestamp,
            data: Arc::from(data.into_boxed_slice()),
            frame_index: None,
        })
    }

    /// Builds a frame from tightly packed RGB bytes.
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> FrameResult<Self> {
        Self::from_owned(width, height, width as usize * Self::CHANNELS, None, data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn timestamp(&self) -> Option<Duration> {
        self.timestamp
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn frame_index(&self) -> Option<u64> {
        self.frame_index
    }

    pub fn with_frame_index(mut self, index: Option<u64>) -> Self {
        self.frame_index = index;
        self
    }

    pub fn with_timestamp(mut self, timestamp: Option<Duration>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// RGB bytes of row `y` without stride padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * Self::CHANNELS]
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = y as usize * self.stride + x as usize * Self::CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Copies the frame into a tightly packed RGB buffer.
    pub fn packed_rgb(&self) -> Vec<u8> {
        let row_bytes = self.width as usize * Self::CHANNELS;
        if self.stride == row_bytes {
            return self.data[..row_bytes * self.height as usize].to_vec();
        }
        let mut out = Vec::with_capacity(row_bytes * self.height as usize);
        for y in 0..self.height {
            out.extend_from_slice(self.row(y));
        }
        out
    }
}

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("backend {backend} is not supported in this build")]
    Unsupported { backend: &'static str },

    #[error("{backend} backend failed: {message}")]
    BackendFailure {
        backend: &'static str,
        message: String,
    },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("invalid frame: {reason}")]
    InvalidFrame { reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl FrameError {
    pub fn unsupported(backend: &'static str) -> Self {
        Self::Unsupported { backend }
    }

    pub fn backend_failure(backend: &'static str, message: impl Into<String>) -> Self {
        Self::BackendFailure {
            backend,
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}

/// Integer pixel position in native frame coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct Point {
    pub x: i32,
    pub y: i32,
}

impl Point {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    pub fn offset(self, dx: i32, dy: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
        }
    }
}

/// Axis-aligned search window `(x0, y0)..(x1, y1)` in native coordinates.
///
/// The high edges are exclusive and may lie past the frame; consumers clip
/// with [`Roi::clip_to`] before indexing pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Roi {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl Roi {
    pub fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Option<Self> {
        if x1 > x0 && y1 > y0 {
            Some(Self { x0, y0, x1, y1 })
        } else {
            None
        }
    }

    /// Square window of half-size `half` around `center`.
    ///
    /// Low edges are clamped to zero; high edges are not clamped against the
    /// frame size.
    pub fn around(center: Point, half: i32) -> Self {
        let half = half.max(1);
        Self {
            x0: (center.x - half).max(0),
            y0: (center.y - half).max(0),
            x1: center.x + half,
            y1: center.y + half,
        }
    }

    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    pub fn origin(&self) -> Point {
        Point::new(self.x0, self.y0)
    }

    /// Strict containment: points on the border are outside.
    pub fn contains_strict(&self, point: Point) -> bool {
        self.x0 < point.x && point.x < self.x1 && self.y0 < point.y && point.y < self.y1
    }

    /// Intersection with a `width` x `height` frame, or `None` when empty.
    pub fn clip_to(&self, width: u32, height: u32) -> Option<PixelRect> {
        let x0 = self.x0.clamp(0, width as i32);
        let y0 = self.y0.clamp(0, height as i32);
        let x1 = self.x1.clamp(x0, width as i32);
        let y1 = self.y1.clamp(y0, height as i32);
        if x1 == x0 || y1 == y0 {
            return None;
        }
        Some(PixelRect {
            x: x0 as usize,
            y: y0 as usize,
            width: (x1 - x0) as usize,
            height: (y1 - y0) as usize,
        })
    }
}

/// A ROI clipped to the frame, ready for slicing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
}

impl PixelRect {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: width as usize,
            height: height as usize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureId {
    Pupil,
    Reflection,
}

impl FeatureId {
    pub const ALL: [FeatureId; 2] = [FeatureId::Pupil, FeatureId::Reflection];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureId::Pupil => "pupil",
            FeatureId::Reflection => "reflection",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the candidate extractor should look on the next call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchScope {
    WholeFrame,
    Explicit(Roi),
    Cached(FeatureId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackState {
    #[default]
    Searching,
    Tracking,
}

impl fmt::Display for TrackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrackState::Searching => f.write_str("searching"),
            TrackState::Tracking => f.write_str("tracking"),
        }
    }
}

/// Fitted pupil ellipse.
///
/// `axes` are full axis lengths. `angle` is canonicalized from `raw_angle`
/// with the 90 degree rule, see `pupil_track_detector::canonical_angle`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PupilDetection {
    pub center: Point,
    pub axes: (f64, f64),
    pub raw_angle: f64,
    pub angle: f64,
}

impl PupilDetection {
    pub fn major_axis(&self) -> f64 {
        self.axes.0.max(self.axes.1)
    }
}

/// Minimum-area rectangle around a reflection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReflectionDetection {
    pub center: Point,
    pub size: (f64, f64),
    pub angle: f64,
}

impl ReflectionDetection {
    pub fn larger_side(&self) -> f64 {
        self.size.0.max(self.size.1)
    }
}

/// Per-feature result of one frame's search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureOutcome<T> {
    Detected(T),
    NotFound,
}

impl<T> FeatureOutcome<T> {
    pub fn detected(&self) -> Option<&T> {
        match self {
            FeatureOutcome::Detected(value) => Some(value),
            FeatureOutcome::NotFound => None,
        }
    }

    pub fn is_detected(&self) -> bool {
        matches!(self, FeatureOutcome::Detected(_))
    }
}

impl<T> From<Option<T>> for FeatureOutcome<T> {
    fn from(value: Option<T>) -> Self {
        match value {
            Some(value) => FeatureOutcome::Detected(value),
            None => FeatureOutcome::NotFound,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_rejects_short_buffers() {
        let err = Frame::from_rgb(4, 4, vec![0; 10]).unwrap_err();
        assert!(matches!(err, FrameError::InvalidFrame { .. }));
    }

    #[test]
    fn packed_rgb_strips_stride_padding() {
        let mut data = vec![0u8; 8 * 2];
        data[0..6].copy_from_slice(&[1, 2, 3, 4, 5, 6]);
        data[8..14].copy_from_slice(&[7, 8, 9, 10, 11, 12]);
        let frame = Frame::from_owned(2, 2, 8, None, data).unwrap();
        assert_eq!(frame.packed_rgb(), vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
        assert_eq!(frame.pixel(1, 1), Some([10, 11, 12]));
        assert_eq!(frame.pixel(2, 0), None);
    }

    #[test]
    fn roi_around_clamps_only_low_edges() {
        let roi = Roi::around(Point::new(5, 630), 20);
        assert_eq!(roi.x0, 0);
        assert_eq!(roi.y0, 610);
        assert_eq!(roi.x1, 25);
        // Past a 640px-high frame: the high edge is deliberately left unclamped.
        assert_eq!(roi.y1, 650);
    }

    #[test]
    fn roi_clip_handles_overhang_and_disjoint_windows() {
        let roi = Roi::around(Point::new(630, 470), 20);
        let rect = roi.clip_to(640, 480).unwrap();
        assert_eq!(rect, PixelRect { x: 610, y: 450, width: 30, height: 30 });

        let outside = Roi::new(700, 500, 720, 520).unwrap();
        assert!(outside.clip_to(640, 480).is_none());
    }

    #[test]
    fn containment_is_strict() {
        let roi = Roi::new(10, 10, 20, 20).unwrap();
        assert!(roi.contains_strict(Point::new(15, 15)));
        assert!(!roi.contains_strict(Point::new(10, 15)));
        assert!(!roi.contains_strict(Point::new(15, 20)));
    }

    #[test]
    fn degenerate_roi_is_rejected() {
        assert!(Roi::new(5, 5, 5, 10).is_none());
        assert!(Roi::new(5, 5, 10, 4).is_none());
    }
}
