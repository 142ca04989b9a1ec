use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use pupil_track_types::Frame;

use crate::{FrameSink, SinkError, SinkResult};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ImageOutputFormat {
    Jpeg { quality: u8 },
    Png,
}

impl ImageOutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageOutputFormat::Jpeg { .. } => "jpg",
            ImageOutputFormat::Png => "png",
        }
    }
}

impl Default for ImageOutputFormat {
    fn default() -> Self {
        ImageOutputFormat::Jpeg { quality: 90 }
    }
}

/// Writes every frame as `frame_{index}.{ext}` into a directory.
pub struct FrameDumpSink {
    directory: PathBuf,
    format: ImageOutputFormat,
    written: u64,
    finished: bool,
}

impl FrameDumpSink {
    pub fn new(directory: impl Into<PathBuf>, format: ImageOutputFormat) -> SinkResult<Self> {
        let directory = directory.into();
        std::fs::create_dir_all(&directory)?;
        Ok(Self {
            directory,
            format,
            written: 0,
            finished: false,
        })
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Path the frame with `index` is written to.
    pub fn path_for(&self, index: u64) -> PathBuf {
        self.directory
            .join(format!("frame_{index}.{}", self.format.extension()))
    }
}

impl FrameSink for FrameDumpSink {
    fn write(&mut self, frame: &Frame) -> SinkResult<()> {
        if self.finished {
            return Err(SinkError::Finished);
        }
        let index = frame.frame_index().unwrap_or(self.written);
        let encoded = encode_frame(frame, self.format)?;
        std::fs::write(self.path_for(index), encoded)?;
        self.written += 1;
        Ok(())
    }

    fn finish(&mut self) -> SinkResult<()> {
        if !self.finished {
            log::debug!(
                "dumped {} frame(s) to {}",
                self.written,
                self.directory.display()
            );
        }
        self.finished = true;
        Ok(())
    }
}

pub fn encode_frame(frame: &Frame, format: ImageOutputFormat) -> SinkResult<Vec<u8>> {
    let buffer = frame.packed_rgb();
    let mut encoded = Vec::new();
    match format {
        ImageOutputFormat::Jpeg { quality } => {
            let mut encoder = JpegEncoder::new_with_quality(&mut encoded, quality);
            encoder.encode(&buffer, frame.width(), frame.height(), ColorType::Rgb8)?;
        }
        ImageOutputFormat::Png => {
            let encoder = PngEncoder::new(&mut encoded);
            encoder.write_image(&buffer, frame.width(), frame.height(), ColorType::Rgb8)?;
        }
    }
    Ok(encoded)
}
