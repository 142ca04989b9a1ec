use pupil_track_types::{FeatureOutcome, Point, PupilDetection, ReflectionDetection};

use crate::conic;
use crate::extractor::{PupilCandidate, ReflectionCandidate};
use crate::geometry::{EllipseBox, canonical_angle};

/// Fits an ellipse to candidate `index`. An out-of-range index or an
/// unfittable hull reports `NotFound`.
pub fn fit_pupil(candidates: &[PupilCandidate], index: usize) -> FeatureOutcome<PupilDetection> {
    let Some(candidate) = candidates.get(index) else {
        return FeatureOutcome::NotFound;
    };
    let points: Vec<[f64; 2]> = candidate
        .hull
        .iter()
        .map(|p| [p.x as f64, p.y as f64])
        .collect();
    let Some(ellipse) = conic::fit_ellipse(&points) else {
        log::debug!("pupil candidate {index} could not be fitted with an ellipse");
        return FeatureOutcome::NotFound;
    };
    let fitted = EllipseBox::from(ellipse);
    FeatureOutcome::Detected(PupilDetection {
        center: Point::new(
            fitted.center.0.round_ties_even() as i32,
            fitted.center.1.round_ties_even() as i32,
        ),
        axes: fitted.size,
        raw_angle: fitted.angle,
        angle: canonical_angle(fitted.angle),
    })
}

/// Reports the minimum-area rectangle of candidate `index`; the center is
/// truncated toward zero.
pub fn fit_reflection(
    candidates: &[ReflectionCandidate],
    index: usize,
) -> FeatureOutcome<ReflectionDetection> {
    let Some(candidate) = candidates.get(index) else {
        return FeatureOutcome::NotFound;
    };
    let rect = candidate.rect;
    FeatureOutcome::Detected(ReflectionDetection {
        center: Point::new(rect.center.0 as i32, rect.center.1 as i32),
        size: rect.size,
        angle: rect.angle,
    })
}
