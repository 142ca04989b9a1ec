use thiserror::Error;

// Frame width the absolute area bounds are tuned for (1080p).
pub const REFERENCE_WIDTH: f64 = 1920.0;
// Pupil contour area bounds at the reference width, exclusive.
pub const PUPIL_AREA_BOUNDS: (f64, f64) = (2000.0, 120_000.0);
// Degenerate hulls with fewer points are rejected.
pub const PUPIL_MIN_HULL_POINTS: usize = 5;
// Circularity must stay strictly below this.
pub const PUPIL_MAX_CIRCULARITY: f64 = 1.6;
pub const PUPIL_CLOSE_ITERATIONS: usize = 2;
// Reflection contour area bounds at the reference width, exclusive.
pub const REFLECTION_AREA_BOUNDS: (f64, f64) = (80.0, 8000.0);
// Inclusive height/width range of the reflection's bounding rectangle.
pub const REFLECTION_SQUARENESS: (f64, f64) = (0.5, 2.0);
pub const REFLECTION_CLOSE_ITERATIONS: usize = 1;

/// Shape-filter parameters for both features.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectorConfig {
    pub reference_width: f64,
    pub pupil_area: (f64, f64),
    pub pupil_min_hull_points: usize,
    pub pupil_max_circularity: f64,
    pub pupil_close_iterations: usize,
    pub reflection_area: (f64, f64),
    pub reflection_squareness: (f64, f64),
    pub reflection_close_iterations: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            reference_width: REFERENCE_WIDTH,
            pupil_area: PUPIL_AREA_BOUNDS,
            pupil_min_hull_points: PUPIL_MIN_HULL_POINTS,
            pupil_max_circularity: PUPIL_MAX_CIRCULARITY,
            pupil_close_iterations: PUPIL_CLOSE_ITERATIONS,
            reflection_area: REFLECTION_AREA_BOUNDS,
            reflection_squareness: REFLECTION_SQUARENESS,
            reflection_close_iterations: REFLECTION_CLOSE_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DetectorError {
    #[error("detector parameter {field} must be {expected}")]
    InvalidParameter {
        field: &'static str,
        expected: &'static str,
    },
}

pub type DetectorResult<T> = Result<T, DetectorError>;

impl DetectorConfig {
    pub fn validate(&self) -> DetectorResult<()> {
        if !(self.reference_width.is_finite() && self.reference_width > 0.0) {
            return Err(invalid("reference_width", "a positive number"));
        }
        if !is_open_interval(self.pupil_area) {
            return Err(invalid("pupil_area", "an increasing pair of non-negative bounds"));
        }
        if !is_open_interval(self.reflection_area) {
            return Err(invalid(
                "reflection_area",
                "an increasing pair of non-negative bounds",
            ));
        }
        let (lo, hi) = self.reflection_squareness;
        if !(lo.is_finite() && hi.is_finite() && lo > 0.0 && lo <= hi) {
            return Err(invalid("reflection_squareness", "a positive range"));
        }
        if !(self.pupil_max_circularity.is_finite() && self.pupil_max_circularity > 1.0) {
            return Err(invalid("pupil_max_circularity", "greater than 1"));
        }
        if self.pupil_min_hull_points < 3 {
            return Err(invalid("pupil_min_hull_points", "at least 3"));
        }
        Ok(())
    }

    /// Ratio of `frame_width` to the reference width.
    pub fn param_scale(&self, frame_width: u32) -> f64 {
        frame_width as f64 / self.reference_width
    }
}

fn is_open_interval((lo, hi): (f64, f64)) -> bool {
    lo.is_finite() && hi.is_finite() && lo >= 0.0 && lo < hi
}

fn invalid(field: &'static str, expected: &'static str) -> DetectorError {
    DetectorError::InvalidParameter { field, expected }
}
