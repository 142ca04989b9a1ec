//! Motion-JPEG video in a RIFF/AVI container.
//!
//! The writer emits the headers up front with placeholder counts, appends one
//! `00dc` chunk per frame, and patches the counts plus the `idx1` index when
//! the stream is finished.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use image::ColorType;
use image::codecs::jpeg::JpegEncoder;
use pupil_track_types::Frame;

use crate::{FrameSink, SinkError, SinkResult};

pub const MJPEG_FOURCC: [u8; 4] = *b"MJPG";

const DEFAULT_QUALITY: u8 = 90;
const AVIF_HASINDEX: u32 = 0x10;
const AVIIF_KEYFRAME: u32 = 0x10;
const FPS_SCALE: u32 = 1000;

// Absolute offsets of the fields patched on finish.
const RIFF_SIZE_AT: u64 = 4;
const AVIH_TOTAL_FRAMES_AT: u64 = 48;
const AVIH_BUFFER_SIZE_AT: u64 = 60;
const STRH_LENGTH_AT: u64 = 140;
const STRH_BUFFER_SIZE_AT: u64 = 144;
const MOVI_SIZE_AT: u64 = 216;
const MOVI_FOURCC_AT: u64 = 220;
const HEADER_LEN: u64 = 224;

#[derive(Clone, Copy, Debug)]
struct IndexEntry {
    offset: u32,
    size: u32,
}

pub struct AviWriter<W: Write + Seek = BufWriter<File>> {
    writer: Option<W>,
    width: u32,
    height: u32,
    quality: u8,
    position: u64,
    index: Vec<IndexEntry>,
    largest_chunk: u32,
    finished: bool,
    encoded: Vec<u8>,
}

impl AviWriter<BufWriter<File>> {
    /// Creates `path` and writes the stream headers for `width`x`height` at `fps`.
    pub fn create(path: &Path, width: u32, height: u32, fps: f64) -> SinkResult<Self> {
        let file = File::create(path)?;
        log::debug!(
            "recording {}x{} MJPEG at {fps} fps to {}",
            width,
            height,
            path.display()
        );
        Self::new(BufWriter::new(file), width, height, fps)
    }
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(writer: W, width: u32, height: u32, fps: f64) -> SinkResult<Self> {
        if width == 0 || height == 0 {
            return Err(SinkError::Configuration {
                message: format!("video size must be non-zero, got {width}x{height}"),
            });
        }
        if !fps.is_finite() || fps <= 0.0 {
            return Err(SinkError::Configuration {
                message: format!("video fps must be positive, got {fps}"),
            });
        }
        let mut this = Self {
            writer: Some(writer),
            width,
            height,
            quality: DEFAULT_QUALITY,
            position: 0,
            index: Vec::new(),
            largest_chunk: 0,
            finished: false,
            encoded: Vec::new(),
        };
        this.write_headers(fps)?;
        Ok(this)
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frames_written(&self) -> usize {
        self.index.len()
    }

    /// Finishes the stream and hands back the underlying writer.
    pub fn into_inner(mut self) -> SinkResult<W> {
        self.finish_stream()?;
        self.writer.take().ok_or(SinkError::Finished)
    }

    fn writer(&mut self) -> SinkResult<&mut W> {
        self.writer.as_mut().ok_or(SinkError::Finished)
    }

    fn put(&mut self, bytes: &[u8]) -> SinkResult<()> {
        self.writer()?.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn put_u32(&mut self, value: u32) -> SinkResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn put_u16(&mut self, value: u16) -> SinkResult<()> {
        self.put(&value.to_le_bytes())
    }

    fn write_headers(&mut self, fps: f64) -> SinkResult<()> {
        let rate = (fps * f64::from(FPS_SCALE)).round() as u32;
        let micros_per_frame = (1_000_000.0 / fps).round() as u32;
        let image_size = self.width.saturating_mul(self.height).saturating_mul(3);
        let (width, height) = (self.width, self.height);

        self.put(b"RIFF")?;
        self.put_u32(0)?;
        self.put(b"AVI ")?;

        self.put(b"LIST")?;
        self.put_u32(192)?;
        self.put(b"hdrl")?;

        self.put(b"avih")?;
        self.put_u32(56)?;
        self.put_u32(micros_per_frame)?;
        self.put_u32(0)?;
        self.put_u32(0)?;
        self.put_u32(AVIF_HASINDEX)?;
        self.put_u32(0)?; // total frames
        self.put_u32(0)?;
        self.put_u32(1)?;
        self.put_u32(0)?; // suggested buffer size
        self.put_u32(width)?;
        self.put_u32(height)?;
        self.put(&[0u8; 16])?;

        self.put(b"LIST")?;
        self.put_u32(116)?;
        self.put(b"strl")?;

        self.put(b"strh")?;
        self.put_u32(56)?;
        self.put(b"vids")?;
        self.put(&MJPEG_FOURCC)?;
        self.put_u32(0)?;
        self.put_u16(0)?;
        self.put_u16(0)?;
        self.put_u32(0)?;
        self.put_u32(FPS_SCALE)?;
        self.put_u32(rate)?;
        self.put_u32(0)?;
        self.put_u32(0)?; // length
        self.put_u32(0)?; // suggested buffer size
        self.put_u32(u32::MAX)?;
        self.put_u32(0)?;
        self.put_u16(0)?;
        self.put_u16(0)?;
        self.put_u16(u16::try_from(width).unwrap_or(u16::MAX))?;
        self.put_u16(u16::try_from(height).unwrap_or(u16::MAX))?;

        self.put(b"strf")?;
        self.put_u32(40)?;
        self.put_u32(40)?;
        self.put_u32(width)?;
        self.put_u32(height)?;
        self.put_u16(1)?;
        self.put_u16(24)?;
        self.put(&MJPEG_FOURCC)?;
        self.put_u32(image_size)?;
        self.put_u32(0)?;
        self.put_u32(0)?;
        self.put_u32(0)?;
        self.put_u32(0)?;

        self.put(b"LIST")?;
        self.put_u32(0)?; // movi size
        self.put(b"movi")?;
        debug_assert_eq!(self.position, HEADER_LEN);
        Ok(())
    }

    fn patch(&mut self, at: u64, value: u32) -> SinkResult<()> {
        let writer = self.writer()?;
        writer.seek(SeekFrom::Start(at))?;
        writer.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    pub fn write_frame(&mut self, frame: &Frame) -> SinkResult<()> {
        if self.finished {
            return Err(SinkError::Finished);
        }
        if frame.width() != self.width || frame.height() != self.height {
            return Err(SinkError::FrameSize {
                width: self.width,
                height: self.height,
                got_width: frame.width(),
                got_height: frame.height(),
            });
        }

        let rgb = frame.packed_rgb();
        let mut encoded = std::mem::take(&mut self.encoded);
        encoded.clear();
        JpegEncoder::new_with_quality(&mut encoded, self.quality).encode(
            &rgb,
            self.width,
            self.height,
            ColorType::Rgb8,
        )?;

        let size = Self::chunk_len(encoded.len() as u64)?;
        let offset = Self::chunk_len(self.position - MOVI_FOURCC_AT)?;
        self.put(b"00dc")?;
        self.put_u32(size)?;
        self.put(&encoded)?;
        if encoded.len() % 2 == 1 {
            self.put(&[0])?;
        }
        self.encoded = encoded;

        self.index.push(IndexEntry { offset, size });
        self.largest_chunk = self.largest_chunk.max(size);
        Ok(())
    }

    /// Writes the index and patches the header counts. Idempotent.
    pub fn finish_stream(&mut self) -> SinkResult<()> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        let movi_size = Self::chunk_len(self.position - MOVI_FOURCC_AT)?;
        let index = std::mem::take(&mut self.index);
        self.put(b"idx1")?;
        self.put_u32(Self::chunk_len(index.len() as u64 * 16)?)?;
        for entry in &index {
            self.put(b"00dc")?;
            self.put_u32(AVIIF_KEYFRAME)?;
            self.put_u32(entry.offset)?;
            self.put_u32(entry.size)?;
        }
        let frames = Self::chunk_len(index.len() as u64)?;
        self.index = index;

        let riff_size = Self::chunk_len(self.position - 8)?;
        let end = self.position;
        let largest = self.largest_chunk;
        self.patch(RIFF_SIZE_AT, riff_size)?;
        self.patch(AVIH_TOTAL_FRAMES_AT, frames)?;
        self.patch(AVIH_BUFFER_SIZE_AT, largest)?;
        self.patch(STRH_LENGTH_AT, frames)?;
        self.patch(STRH_BUFFER_SIZE_AT, largest)?;
        self.patch(MOVI_SIZE_AT, movi_size)?;

        let writer = self.writer()?;
        writer.seek(SeekFrom::Start(end))?;
        writer.flush()?;
        log::debug!("finished AVI stream with {frames} frame(s)");
        Ok(())
    }

    fn chunk_len(len: u64) -> SinkResult<u32> {
        u32::try_from(len).map_err(|_| SinkError::Configuration {
            message: "AVI stream exceeds the 4 GiB RIFF limit".into(),
        })
    }
}

impl<W: Write + Seek + Send> FrameSink for AviWriter<W> {
    fn write(&mut self, frame: &Frame) -> SinkResult<()> {
        self.write_frame(frame)
    }

    fn finish(&mut self) -> SinkResult<()> {
        self.finish_stream()
    }
}

impl<W: Write + Seek> Drop for AviWriter<W> {
    fn drop(&mut self) {
        if self.finished || self.writer.is_none() {
            return;
        }
        if let Err(err) = self.finish_stream() {
            log::warn!("failed to finalize AVI stream on drop: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn solid(width: u32, height: u32, value: u8) -> Frame {
        Frame::from_rgb(width, height, vec![value; (width * height * 3) as usize]).unwrap()
    }

    fn u32_at(bytes: &[u8], at: usize) -> u32 {
        u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
    }

    #[test]
    fn header_counts_are_patched_on_finish() {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), 32, 24, 60.0).unwrap();
        for value in [10, 120, 240] {
            writer.write(&solid(32, 24, value)).unwrap();
        }
        let bytes = writer.into_inner().unwrap().into_inner();

        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");
        assert_eq!(u32_at(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(u32_at(&bytes, 48), 3);
        assert_eq!(u32_at(&bytes, 140), 3);
        assert_eq!(&bytes[112..116], b"MJPG");
        assert_eq!(u32_at(&bytes, 64), 32);
        assert_eq!(u32_at(&bytes, 68), 24);
        // rate / scale encodes 60 fps
        assert_eq!(u32_at(&bytes, 132) / u32_at(&bytes, 128), 60);

        let movi_size = u32_at(&bytes, 216) as usize;
        let idx_at = 220 + movi_size;
        assert_eq!(&bytes[idx_at..idx_at + 4], b"idx1");
        assert_eq!(u32_at(&bytes, idx_at + 4), 48);

        let first_offset = u32_at(&bytes, idx_at + 16) as usize;
        let first_size = u32_at(&bytes, idx_at + 20) as usize;
        assert_eq!(first_offset, 4);
        let chunk = 220 + first_offset;
        assert_eq!(&bytes[chunk..chunk + 4], b"00dc");
        assert_eq!(u32_at(&bytes, chunk + 4) as usize, first_size);
        // every chunk is a JPEG stream
        assert_eq!(&bytes[chunk + 8..chunk + 10], &[0xFF, 0xD8]);
    }

    #[test]
    fn rejects_frames_of_another_size() {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), 32, 24, 30.0).unwrap();
        let err = writer.write(&solid(16, 24, 0)).unwrap_err();
        assert!(matches!(
            err,
            SinkError::FrameSize {
                got_width: 16,
                ..
            }
        ));
        assert_eq!(writer.frames_written(), 0);
    }

    #[test]
    fn write_after_finish_fails() {
        let mut writer = AviWriter::new(Cursor::new(Vec::new()), 8, 8, 30.0).unwrap();
        writer.finish().unwrap();
        writer.finish().unwrap();
        assert!(matches!(
            writer.write(&solid(8, 8, 0)),
            Err(SinkError::Finished)
        ));
    }

    #[test]
    fn rejects_invalid_stream_parameters() {
        assert!(AviWriter::new(Cursor::new(Vec::new()), 0, 8, 30.0).is_err());
        assert!(AviWriter::new(Cursor::new(Vec::new()), 8, 8, 0.0).is_err());
        assert!(AviWriter::new(Cursor::new(Vec::new()), 8, 8, f64::NAN).is_err());
    }
}
