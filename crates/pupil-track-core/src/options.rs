use std::ops::RangeInclusive;

use pupil_track_types::FeatureId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const PUPIL_THRESHOLD_RANGE: RangeInclusive<u8> = 0..=150;
pub const REFLECTION_THRESHOLD_RANGE: RangeInclusive<u8> = 155..=255;

pub const DEFAULT_PUPIL_THRESHOLD: u8 = 45;
pub const DEFAULT_REFLECTION_THRESHOLD: u8 = 200;
pub const DEFAULT_DISPLAY_WIDTH: u32 = 960;
pub const DEFAULT_SMOOTHING_WINDOW: usize = 5;
pub const DEFAULT_SMOOTHING_MIN_VALID: usize = 3;
pub const DEFAULT_PLOT_INTERVAL: u64 = 3;
pub const DEFAULT_VIDEO_FPS: f64 = 60.0;

/// User-tunable session options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingOptions {
    pub pupil_threshold: u8,
    /// Pixels brighter than this count as reflection.
    pub reflection_threshold: u8,
    /// Draw ROI outlines and contours in addition to the crosshairs.
    pub verbose_overlay: bool,
    pub picture_in_picture: bool,
    pub plot_enabled: bool,
    pub record_video: bool,
    pub dump_data: bool,
    pub display_width: u32,
    pub smoothing_window: usize,
    pub smoothing_min_valid: usize,
    pub plot_interval: u64,
    pub video_fps: f64,
}

impl Default for TrackingOptions {
    fn default() -> Self {
        Self {
            pupil_threshold: DEFAULT_PUPIL_THRESHOLD,
            reflection_threshold: DEFAULT_REFLECTION_THRESHOLD,
            verbose_overlay: false,
            picture_in_picture: false,
            plot_enabled: true,
            record_video: false,
            dump_data: false,
            display_width: DEFAULT_DISPLAY_WIDTH,
            smoothing_window: DEFAULT_SMOOTHING_WINDOW,
            smoothing_min_valid: DEFAULT_SMOOTHING_MIN_VALID,
            plot_interval: DEFAULT_PLOT_INTERVAL,
            video_fps: DEFAULT_VIDEO_FPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum OptionsError {
    #[error("{field} must be in {expected}, got {value}")]
    OutOfRange {
        field: &'static str,
        value: String,
        expected: &'static str,
    },
}

impl TrackingOptions {
    pub fn validate(&self) -> Result<(), OptionsError> {
        if !PUPIL_THRESHOLD_RANGE.contains(&self.pupil_threshold) {
            return Err(out_of_range(
                "pupil_threshold",
                self.pupil_threshold,
                "0..=150",
            ));
        }
        if !REFLECTION_THRESHOLD_RANGE.contains(&self.reflection_threshold) {
            return Err(out_of_range(
                "reflection_threshold",
                self.reflection_threshold,
                "155..=255",
            ));
        }
        if self.display_width == 0 {
            return Err(out_of_range("display_width", self.display_width, "1.."));
        }
        if self.smoothing_window == 0 {
            return Err(out_of_range(
                "smoothing_window",
                self.smoothing_window,
                "1..",
            ));
        }
        if self.smoothing_min_valid == 0 || self.smoothing_min_valid > self.smoothing_window {
            return Err(out_of_range(
                "smoothing_min_valid",
                self.smoothing_min_valid,
                "1..=smoothing_window",
            ));
        }
        if self.plot_interval == 0 {
            return Err(out_of_range("plot_interval", self.plot_interval, "1.."));
        }
        if !self.video_fps.is_finite() || self.video_fps <= 0.0 {
            return Err(out_of_range("video_fps", self.video_fps, "a positive number"));
        }
        Ok(())
    }

    pub fn threshold(&self, feature: FeatureId) -> u8 {
        match feature {
            FeatureId::Pupil => self.pupil_threshold,
            FeatureId::Reflection => self.reflection_threshold,
        }
    }
}

fn out_of_range(
    field: &'static str,
    value: impl ToString,
    expected: &'static str,
) -> OptionsError {
    OptionsError::OutOfRange {
        field,
        value: value.to_string(),
        expected,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let options = TrackingOptions::default();
        assert_eq!(options.validate(), Ok(()));
        assert_eq!(options.threshold(FeatureId::Pupil), 45);
        assert_eq!(options.threshold(FeatureId::Reflection), 200);
    }

    #[test]
    fn threshold_ranges_are_enforced() {
        let options = TrackingOptions {
            pupil_threshold: 151,
            ..Default::default()
        };
        assert!(matches!(
            options.validate(),
            Err(OptionsError::OutOfRange {
                field: "pupil_threshold",
                ..
            })
        ));

        let options = TrackingOptions {
            reflection_threshold: 154,
            ..Default::default()
        };
        assert!(options.validate().is_err());

        let options = TrackingOptions {
            pupil_threshold: 150,
            reflection_threshold: 155,
            ..Default::default()
        };
        assert!(options.validate().is_ok());
    }

    #[test]
    fn min_valid_cannot_exceed_window() {
        let options = TrackingOptions {
            smoothing_window: 2,
            smoothing_min_valid: 3,
            ..Default::default()
        };
        assert!(options.validate().is_err());
    }

    #[test]
    fn partial_input_keeps_defaults() {
        let options: TrackingOptions = serde_json::from_str(r#"{"pupil_threshold": 60}"#).unwrap();
        assert_eq!(options.pupil_threshold, 60);
        assert_eq!(options.display_width, DEFAULT_DISPLAY_WIDTH);
    }
}
