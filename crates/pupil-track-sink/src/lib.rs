//! Frame-sink collaborators for the tracking session.
//!
//! A sink receives one annotated display frame per processed tick while
//! recording is enabled. The session never inspects what a sink does with
//! the frame beyond the returned [`SinkResult`].

use pupil_track_types::Frame;
use thiserror::Error;

pub mod avi;
pub mod dump;
pub mod overlay;

pub use avi::{AviWriter, MJPEG_FOURCC};
pub use dump::{FrameDumpSink, ImageOutputFormat};
pub use overlay::{Canvas, Rgb};

pub type SinkResult<T> = Result<T, SinkError>;

pub type DynFrameSink = Box<dyn FrameSink>;

pub trait FrameSink: Send {
    fn write(&mut self, frame: &Frame) -> SinkResult<()>;

    /// Flushes pending data. Further writes fail with [`SinkError::Finished`].
    fn finish(&mut self) -> SinkResult<()>;
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("encoding error: {0}")]
    Encode(#[from] image::ImageError),
    #[error("frame size {got_width}x{got_height} does not match stream size {width}x{height}")]
    FrameSize {
        width: u32,
        height: u32,
        got_width: u32,
        got_height: u32,
    },
    #[error("sink already finished")]
    Finished,
    #[error("invalid sink configuration: {message}")]
    Configuration { message: String },
}
