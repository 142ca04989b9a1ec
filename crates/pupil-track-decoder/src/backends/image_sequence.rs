use std::fs;
use std::path::{Path, PathBuf};

use crate::core::{
    DynFrameSource, Frame, FrameError, FrameResult, FrameSource, NextFrame, VideoMetadata,
    check_seek, frame_timestamp,
};

const BACKEND: &str = "image-sequence";
const EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Directory of still images played back in lexical file-name order.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    width: u32,
    height: u32,
    fps: f64,
    cursor: u64,
}

impl ImageSequenceSource {
    pub fn open(dir: &Path, fps: f64) -> FrameResult<Self> {
        let mut paths = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            let matches = path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
                .unwrap_or(false);
            if matches && path.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        let Some(first) = paths.first() else {
            return Err(FrameError::configuration(format!(
                "no png or jpeg images found in {}",
                dir.display()
            )));
        };
        let (width, height) = image::image_dimensions(first)
            .map_err(|err| FrameError::backend_failure(BACKEND, err.to_string()))?;
        log::debug!(
            "image sequence {}: {} frames at {width}x{height}",
            dir.display(),
            paths.len()
        );
        Ok(Self {
            paths,
            width,
            height,
            fps,
            cursor: 0,
        })
    }

    fn decode(&self, index: u64) -> FrameResult<Frame> {
        let path = &self.paths[index as usize];
        let image = image::open(path)
            .map_err(|err| {
                FrameError::backend_failure(BACKEND, format!("{}: {err}", path.display()))
            })?
            .to_rgb8();
        if image.width() != self.width || image.height() != self.height {
            return Err(FrameError::InvalidFrame {
                reason: format!(
                    "{} is {}x{}, sequence is {}x{}",
                    path.display(),
                    image.width(),
                    image.height(),
                    self.width,
                    self.height
                ),
            });
        }
        Ok(Frame::from_rgb(self.width, self.height, image.into_raw())?
            .with_frame_index(Some(index))
            .with_timestamp(frame_timestamp(index, self.fps)))
    }
}

impl FrameSource for ImageSequenceSource {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: frame_timestamp(self.paths.len() as u64, self.fps),
            fps: Some(self.fps),
            width: Some(self.width),
            height: Some(self.height),
            total_frames: Some(self.paths.len() as u64),
        }
    }

    fn next_frame(&mut self) -> FrameResult<NextFrame> {
        if self.cursor >= self.paths.len() as u64 {
            return Ok(NextFrame::EndOfStream);
        }
        let frame = self.decode(self.cursor)?;
        self.cursor += 1;
        Ok(NextFrame::Frame(frame))
    }

    fn seek(&mut self, index: u64) -> FrameResult<()> {
        check_seek(BACKEND, index, self.paths.len() as u64)?;
        self.cursor = index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

pub fn boxed_image_sequence(dir: PathBuf, fps: f64) -> FrameResult<DynFrameSource> {
    Ok(Box::new(ImageSequenceSource::open(&dir, fps)?))
}
