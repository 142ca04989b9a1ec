//! Native/display coordinate conversion and the reflection-corrected signal.

use pupil_track_types::Point;

/// Maps native-resolution coordinates onto the display copy of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DisplayScale {
    native: (u32, u32),
    display: (u32, u32),
    factor: f64,
}

impl DisplayScale {
    /// Display size keeps the native aspect ratio at `display_width`.
    pub fn new(native_width: u32, native_height: u32, display_width: u32) -> Self {
        let native_width = native_width.max(1);
        let display_width = display_width.max(1);
        let display_height =
            (u64::from(display_width) * u64::from(native_height) / u64::from(native_width)).max(1);
        Self {
            native: (native_width, native_height),
            display: (display_width, display_height as u32),
            factor: f64::from(native_width) / f64::from(display_width),
        }
    }

    /// `native_width / display_width`
    pub fn factor(&self) -> f64 {
        self.factor
    }

    pub fn native_size(&self) -> (u32, u32) {
        self.native
    }

    pub fn display_size(&self) -> (u32, u32) {
        self.display
    }

    pub fn to_display(&self, point: Point) -> Point {
        Point::new(
            self.length_to_display(point.x),
            self.length_to_display(point.y),
        )
    }

    pub fn length_to_display(&self, value: i32) -> i32 {
        (f64::from(value) / self.factor) as i32
    }

    pub fn to_display_f64(&self, value: (f64, f64)) -> (f64, f64) {
        (value.0 / self.factor, value.1 / self.factor)
    }
}

/// Pupil center relative to the reflection center.
pub fn displacement(pupil: [f64; 2], reflection: [f64; 2]) -> [f64; 2] {
    [pupil[0] - reflection[0], pupil[1] - reflection[1]]
}

/// First frame where both features were found; its displacement is the
/// session baseline.
pub fn baseline(pupil: &[[f64; 2]], reflection: &[[f64; 2]]) -> Option<[f64; 2]> {
    first_complete(pupil, reflection, 0).map(|i| displacement(pupil[i], reflection[i]))
}

/// Index of the first frame at or after `start` with both features present.
pub fn first_complete(pupil: &[[f64; 2]], reflection: &[[f64; 2]], start: usize) -> Option<usize> {
    pupil
        .iter()
        .zip(reflection)
        .skip(start)
        .position(|(p, r)| is_valid(*p) && is_valid(*r))
        .map(|offset| start + offset)
}

/// `(pupil - reflection) - baseline` per frame; NaN where either feature is
/// missing or no baseline exists yet.
pub fn corrected_series(pupil: &[[f64; 2]], reflection: &[[f64; 2]]) -> Vec<[f64; 2]> {
    let Some(base) = baseline(pupil, reflection) else {
        return vec![[f64::NAN; 2]; pupil.len().min(reflection.len())];
    };
    pupil
        .iter()
        .zip(reflection)
        .map(|(p, r)| corrected(*p, *r, base))
        .collect()
}

pub fn corrected(pupil: [f64; 2], reflection: [f64; 2], base: [f64; 2]) -> [f64; 2] {
    let d = displacement(pupil, reflection);
    [d[0] - base[0], d[1] - base[1]]
}

pub fn is_valid(value: [f64; 2]) -> bool {
    value[0].is_finite() && value[1].is_finite()
}
