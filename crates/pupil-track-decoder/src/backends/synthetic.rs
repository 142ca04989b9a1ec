use std::ops::Range;
use std::time::Duration;

use crate::core::{
    DynFrameSource, Frame, FrameResult, FrameSource, NextFrame, VideoMetadata, check_seek,
    frame_timestamp,
};

const BACKEND: &str = "synthetic";

/// Procedurally drawn eye: a dark disk (pupil) holding a bright square
/// (reflection) on a flat background.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticScene {
    pub width: u32,
    pub height: u32,
    pub frame_count: u64,
    pub fps: f64,
    pub background: u8,
    pub pupil_value: u8,
    pub reflection_value: u8,
    pub pupil_center: (i32, i32),
    pub pupil_radius: i32,
    /// Reflection center relative to the pupil center.
    pub reflection_offset: (i32, i32),
    pub reflection_size: i32,
    /// Per-frame pupil displacement.
    pub drift: (i32, i32),
    /// Frames on which the reflection is not drawn.
    pub reflection_gap: Option<Range<u64>>,
    /// Extra reflection offset applied from the end of the gap onward.
    pub reflection_shift_after_gap: (i32, i32),
}

impl Default for SyntheticScene {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            frame_count: 120,
            fps: 60.0,
            background: 160,
            pupil_value: 20,
            reflection_value: 250,
            pupil_center: (320, 240),
            pupil_radius: 30,
            reflection_offset: (0, 0),
            reflection_size: 10,
            drift: (0, 0),
            reflection_gap: None,
            reflection_shift_after_gap: (0, 0),
        }
    }
}

impl SyntheticScene {
    pub fn pupil_center_at(&self, index: u64) -> (i32, i32) {
        let step = index as i32;
        (
            self.pupil_center.0 + self.drift.0 * step,
            self.pupil_center.1 + self.drift.1 * step,
        )
    }

    pub fn reflection_visible(&self, index: u64) -> bool {
        match &self.reflection_gap {
            Some(gap) => !gap.contains(&index),
            None => true,
        }
    }

    pub fn reflection_center_at(&self, index: u64) -> (i32, i32) {
        let (px, py) = self.pupil_center_at(index);
        let mut offset = self.reflection_offset;
        if let Some(gap) = &self.reflection_gap {
            if index >= gap.end {
                offset.0 += self.reflection_shift_after_gap.0;
                offset.1 += self.reflection_shift_after_gap.1;
            }
        }
        (px + offset.0, py + offset.1)
    }

    pub fn render(&self, index: u64) -> FrameResult<Frame> {
        let width = self.width as i32;
        let height = self.height as i32;
        let mut luma = vec![self.background; (width * height) as usize];

        let (cx, cy) = self.pupil_center_at(index);
        let r = self.pupil_radius;
        let r2 = r * r;
        for y in (cy - r).max(0)..(cy + r + 1).min(height) {
            for x in (cx - r).max(0)..(cx + r + 1).min(width) {
                let (dx, dy) = (x - cx, y - cy);
                if dx * dx + dy * dy <= r2 {
                    luma[(y * width + x) as usize] = self.pupil_value;
                }
            }
        }

        if self.reflection_visible(index) && self.reflection_size > 0 {
            let (rx, ry) = self.reflection_center_at(index);
            let x0 = rx - self.reflection_size / 2;
            let y0 = ry - self.reflection_size / 2;
            for y in y0.max(0)..(y0 + self.reflection_size).min(height) {
                for x in x0.max(0)..(x0 + self.reflection_size).min(width) {
                    luma[(y * width + x) as usize] = self.reflection_value;
                }
            }
        }

        let mut rgb = Vec::with_capacity(luma.len() * Frame::CHANNELS);
        for value in luma {
            rgb.extend_from_slice(&[value, value, value]);
        }
        Ok(Frame::from_rgb(self.width, self.height, rgb)?
            .with_frame_index(Some(index))
            .with_timestamp(frame_timestamp(index, self.fps)))
    }
}

pub struct SyntheticSource {
    scene: SyntheticScene,
    cursor: u64,
}

impl SyntheticSource {
    pub fn new(scene: SyntheticScene) -> Self {
        Self { scene, cursor: 0 }
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }
}

impl FrameSource for SyntheticSource {
    fn metadata(&self) -> VideoMetadata {
        VideoMetadata {
            duration: Some(Duration::from_secs_f64(
                self.scene.frame_count as f64 / self.scene.fps.max(f64::EPSILON),
            )),
            fps: Some(self.scene.fps),
            width: Some(self.scene.width),
            height: Some(self.scene.height),
            total_frames: Some(self.scene.frame_count),
        }
    }

    fn next_frame(&mut self) -> FrameResult<NextFrame> {
        if self.cursor >= self.scene.frame_count {
            return Ok(NextFrame::EndOfStream);
        }
        let frame = self.scene.render(self.cursor)?;
        self.cursor += 1;
        Ok(NextFrame::Frame(frame))
    }

    fn seek(&mut self, index: u64) -> FrameResult<()> {
        check_seek(BACKEND, index, self.scene.frame_count)?;
        self.cursor = index;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.cursor
    }
}

pub fn boxed_synthetic(scene: SyntheticScene) -> FrameResult<DynFrameSource> {
    if scene.width == 0 || scene.height == 0 {
        return Err(crate::core::FrameError::configuration(
            "synthetic scene needs non-zero dimensions",
        ));
    }
    Ok(Box::new(SyntheticSource::new(scene)))
}
