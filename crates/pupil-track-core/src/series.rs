//! Frame-indexed time series with NaN as the missing-value sentinel.

use pupil_track_types::{FeatureId, Point};
use thiserror::Error;

use crate::normalize;

pub const MISSING: f64 = f64::NAN;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RecordError {
    #[error("frame index {index} is outside a {len}-frame series")]
    OutOfRange { index: u64, len: usize },
    #[error("series lengths differ: pupil {pupil}, reflection {reflection}, angle {angle}")]
    LengthMismatch {
        pupil: usize,
        reflection: usize,
        angle: usize,
    },
}

/// Pupil and reflection centers plus pupil angle, one cell per frame.
///
/// Allocated once per loaded source; cells are only ever overwritten.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    pupil: Vec<[f64; 2]>,
    reflection: Vec<[f64; 2]>,
    angle: Vec<f64>,
    // Slot of the first frame with both features; every earlier slot is
    // incomplete.
    baseline: Option<usize>,
}

impl TimeSeries {
    pub fn new(len: usize) -> Self {
        Self {
            pupil: vec![[MISSING; 2]; len],
            reflection: vec![[MISSING; 2]; len],
            angle: vec![MISSING; len],
            baseline: None,
        }
    }

    pub fn from_parts(
        pupil: Vec<[f64; 2]>,
        reflection: Vec<[f64; 2]>,
        angle: Vec<f64>,
    ) -> Result<Self, RecordError> {
        if pupil.len() != reflection.len() || pupil.len() != angle.len() {
            return Err(RecordError::LengthMismatch {
                pupil: pupil.len(),
                reflection: reflection.len(),
                angle: angle.len(),
            });
        }
        let baseline = normalize::first_complete(&pupil, &reflection, 0);
        Ok(Self {
            pupil,
            reflection,
            angle,
            baseline,
        })
    }

    pub fn len(&self) -> usize {
        self.pupil.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pupil.is_empty()
    }

    /// Resets every cell to the sentinel without changing the length.
    pub fn clear(&mut self) {
        self.pupil.fill([MISSING; 2]);
        self.reflection.fill([MISSING; 2]);
        self.angle.fill(MISSING);
        self.baseline = None;
    }

    fn slot(&self, index: u64) -> Result<usize, RecordError> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.len())
            .ok_or(RecordError::OutOfRange {
                index,
                len: self.len(),
            })
    }

    /// Writes a center, or the sentinel pair for `None`.
    pub fn record(
        &mut self,
        index: u64,
        feature: FeatureId,
        center: Option<Point>,
    ) -> Result<(), RecordError> {
        let slot = self.slot(index)?;
        let value = center.map_or([MISSING; 2], |p| [f64::from(p.x), f64::from(p.y)]);
        match feature {
            FeatureId::Pupil => self.pupil[slot] = value,
            FeatureId::Reflection => self.reflection[slot] = value,
        }
        self.update_baseline(slot);
        Ok(())
    }

    fn update_baseline(&mut self, slot: usize) {
        let complete = normalize::is_valid(self.pupil[slot]) && normalize::is_valid(self.reflection[slot]);
        match self.baseline {
            Some(base) if complete && slot < base => self.baseline = Some(slot),
            None if complete => self.baseline = Some(slot),
            Some(base) if !complete && slot == base => {
                self.baseline = normalize::first_complete(&self.pupil, &self.reflection, base + 1);
            }
            _ => {}
        }
    }

    /// Frame index of the corrected-displacement baseline, if any.
    pub fn baseline_index(&self) -> Option<u64> {
        self.baseline.map(|slot| slot as u64)
    }

    pub fn record_angle(&mut self, index: u64, angle: Option<f64>) -> Result<(), RecordError> {
        let slot = self.slot(index)?;
        self.angle[slot] = angle.unwrap_or(MISSING);
        Ok(())
    }

    pub fn pupil(&self) -> &[[f64; 2]] {
        &self.pupil
    }

    pub fn reflection(&self) -> &[[f64; 2]] {
        &self.reflection
    }

    pub fn angle(&self) -> &[f64] {
        &self.angle
    }

    pub fn points(&self, feature: FeatureId) -> &[[f64; 2]] {
        match feature {
            FeatureId::Pupil => &self.pupil,
            FeatureId::Reflection => &self.reflection,
        }
    }

    pub fn corrected(&self) -> Vec<[f64; 2]> {
        normalize::corrected_series(&self.pupil, &self.reflection)
    }

    /// Corrected sample at `index` against the current baseline.
    pub fn corrected_at(&self, index: u64) -> [f64; 2] {
        let Ok(slot) = self.slot(index) else {
            return [MISSING; 2];
        };
        match self.baseline {
            Some(base) => normalize::corrected(
                self.pupil[slot],
                self.reflection[slot],
                normalize::displacement(self.pupil[base], self.reflection[base]),
            ),
            None => [MISSING; 2],
        }
    }

    /// Cell-for-cell equality where two sentinels compare equal.
    pub fn same_values(&self, other: &TimeSeries) -> bool {
        fn eq(a: f64, b: f64) -> bool {
            (a.is_nan() && b.is_nan()) || a == b
        }
        self.len() == other.len()
            && self
                .pupil
                .iter()
                .chain(&self.reflection)
                .zip(other.pupil.iter().chain(&other.reflection))
                .all(|(a, b)| eq(a[0], b[0]) && eq(a[1], b[1]))
            && self
                .angle
                .iter()
                .zip(&other.angle)
                .all(|(a, b)| eq(*a, *b))
    }
}

/// Trailing mean over the last `window` samples, including the current one.
///
/// Positions whose window holds fewer than `min_valid` finite samples emit
/// the sentinel. The first positions use the shorter window available.
pub fn moving_average(values: &[f64], window: usize, min_valid: usize) -> Vec<f64> {
    let window = window.max(1);
    let mut out = Vec::with_capacity(values.len());
    let mut sum = 0.0;
    let mut valid = 0usize;
    for (i, &value) in values.iter().enumerate() {
        if value.is_finite() {
            sum += value;
            valid += 1;
        }
        if i >= window {
            let leaving = values[i - window];
            if leaving.is_finite() {
                sum -= leaving;
                valid -= 1;
            }
        }
        if valid >= min_valid.max(1) {
            out.push(sum / valid as f64);
        } else {
            out.push(MISSING);
        }
    }
    out
}

/// [`moving_average`] applied to each coordinate of a point series.
pub fn moving_average_xy(values: &[[f64; 2]], window: usize, min_valid: usize) -> Vec<[f64; 2]> {
    let xs: Vec<f64> = values.iter().map(|v| v[0]).collect();
    let ys: Vec<f64> = values.iter().map(|v| v[1]).collect();
    moving_average(&xs, window, min_valid)
        .into_iter()
        .zip(moving_average(&ys, window, min_valid))
        .map(|(x, y)| if x.is_finite() && y.is_finite() { [x, y] } else { [MISSING; 2] })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn record_rejects_out_of_range_index() {
        let mut series = TimeSeries::new(3);
        assert!(series.record(2, FeatureId::Pupil, Some(Point::new(4, 5))).is_ok());
        assert_eq!(series.pupil()[2], [4.0, 5.0]);
        assert_eq!(
            series.record(3, FeatureId::Reflection, None),
            Err(RecordError::OutOfRange { index: 3, len: 3 })
        );
        assert!(series.record_angle(7, Some(1.0)).is_err());
    }

    #[test]
    fn missing_detection_writes_sentinel() {
        let mut series = TimeSeries::new(2);
        series
            .record(0, FeatureId::Reflection, Some(Point::new(1, 1)))
            .unwrap();
        series.record(0, FeatureId::Reflection, None).unwrap();
        assert!(series.reflection()[0].iter().all(|v| v.is_nan()));
    }

    #[test]
    fn clear_keeps_length() {
        let mut series = TimeSeries::new(4);
        series.record_angle(1, Some(45.0)).unwrap();
        series.clear();
        assert_eq!(series.len(), 4);
        assert!(series.angle().iter().all(|v| v.is_nan()));
    }

    #[test]
    fn moving_average_matches_trailing_mean_without_gaps() {
        let values: Vec<f64> = (0..10).map(|v| (v * v) as f64).collect();
        let smoothed = moving_average(&values, 3, 1);
        for i in 2..values.len() {
            let expected = (values[i - 2] + values[i - 1] + values[i]) / 3.0;
            assert_relative_eq!(smoothed[i], expected, epsilon = 1e-9);
        }
        assert_relative_eq!(smoothed[0], 0.0);
        assert_relative_eq!(smoothed[1], 0.5);
    }

    #[test]
    fn moving_average_needs_min_valid_samples() {
        let values = [1.0, MISSING, MISSING, 4.0, 5.0, 6.0, MISSING];
        let smoothed = moving_average(&values, 3, 2);
        assert!(smoothed[0].is_nan());
        assert!(smoothed[1].is_nan());
        assert!(smoothed[2].is_nan());
        assert!(smoothed[3].is_nan());
        assert_relative_eq!(smoothed[4], 4.5);
        assert_relative_eq!(smoothed[5], 5.0);
        assert_relative_eq!(smoothed[6], 5.5);
    }

    #[test]
    fn xy_average_drops_half_missing_points() {
        let values = [[1.0, 2.0], [3.0, MISSING], [5.0, 6.0]];
        let smoothed = moving_average_xy(&values, 2, 2);
        assert!(smoothed[0][0].is_nan());
        assert!(smoothed[1][0].is_nan());
        assert!(smoothed[2][0].is_nan());

        let smoothed = moving_average_xy(&values, 3, 2);
        assert_eq!(smoothed[2], [3.0, 4.0]);
    }

    #[test]
    fn corrected_sample_uses_first_complete_frame() {
        let mut series = TimeSeries::new(3);
        for i in 0..3 {
            series
                .record(i, FeatureId::Pupil, Some(Point::new(10 + i as i32, 20)))
                .unwrap();
        }
        series
            .record(1, FeatureId::Reflection, Some(Point::new(5, 5)))
            .unwrap();
        series
            .record(2, FeatureId::Reflection, Some(Point::new(5, 5)))
            .unwrap();
        assert!(series.corrected_at(0)[0].is_nan());
        assert_eq!(series.corrected_at(1), [0.0, 0.0]);
        assert_eq!(series.corrected_at(2), [1.0, 0.0]);
    }

    #[test]
    fn baseline_follows_earliest_complete_frame() {
        let mut series = TimeSeries::new(5);
        assert_eq!(series.baseline_index(), None);
        for i in 0..5 {
            series
                .record(i, FeatureId::Pupil, Some(Point::new(10, 20)))
                .unwrap();
        }
        series
            .record(3, FeatureId::Reflection, Some(Point::new(4, 4)))
            .unwrap();
        assert_eq!(series.baseline_index(), Some(3));
        series
            .record(4, FeatureId::Reflection, Some(Point::new(5, 4)))
            .unwrap();
        assert_eq!(series.baseline_index(), Some(3));
        assert_eq!(series.corrected_at(4), [-1.0, 0.0]);

        series
            .record(1, FeatureId::Reflection, Some(Point::new(6, 6)))
            .unwrap();
        assert_eq!(series.baseline_index(), Some(1));

        // losing the baseline frame moves it to the next complete one
        series.record(1, FeatureId::Pupil, None).unwrap();
        assert_eq!(series.baseline_index(), Some(3));
        assert_eq!(series.corrected_at(3), [0.0, 0.0]);

        series.clear();
        assert_eq!(series.baseline_index(), None);
        assert!(series.corrected_at(3)[0].is_nan());
    }

    #[test]
    fn baseline_is_restored_from_parts() {
        let series = TimeSeries::from_parts(
            vec![[MISSING; 2], [3.0, 3.0]],
            vec![[1.0, 1.0], [1.0, 2.0]],
            vec![MISSING; 2],
        )
        .unwrap();
        assert_eq!(series.baseline_index(), Some(1));
    }
}
