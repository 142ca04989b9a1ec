use pupil_track_types::{FeatureId, Frame, Point, Roi};

use crate::config::DetectorConfig;
use crate::contour::{self, Component, ComponentScratch};
use crate::geometry::{self, RotatedRect};
use crate::morphology::{self, Mask, MorphScratch};
use crate::preprocess::{self, Preprocessed};

/// Pupil shape that passed the area, hull and circularity gates.
#[derive(Debug, Clone, PartialEq)]
pub struct PupilCandidate {
    /// Convex hull in native frame coordinates.
    pub hull: Vec<Point>,
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
}

/// Reflection shape that passed the area, squareness and containment gates.
#[derive(Debug, Clone, PartialEq)]
pub struct ReflectionCandidate {
    /// Outer boundary in native frame coordinates.
    pub boundary: Vec<Point>,
    pub area: f64,
    pub rect: RotatedRect,
    pub squareness: f64,
}

#[derive(Default)]
struct ExtractorWorkspace {
    mask: Mask,
    morph: MorphScratch,
    components: ComponentScratch,
}

/// Thresholds, cleans and filters frames into feature candidates.
///
/// Buffers are reused between calls, so keep one extractor per session.
pub struct CandidateExtractor {
    config: DetectorConfig,
    workspace: ExtractorWorkspace,
}

impl CandidateExtractor {
    pub fn new(config: DetectorConfig) -> Self {
        Self {
            config,
            workspace: ExtractorWorkspace::default(),
        }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Dark regions below `threshold` that look like a pupil, most circular
    /// first.
    ///
    /// `size_limit` is the cached pupil ROI half-size. Without it the area
    /// must fall inside the scaled absolute bounds; with it the upper bound
    /// becomes `size_limit²`.
    pub fn pupil_candidates(
        &mut self,
        frame: &Frame,
        roi: Option<Roi>,
        threshold: u8,
        size_limit: Option<i32>,
    ) -> Vec<PupilCandidate> {
        let scale = self.config.param_scale(frame.width());
        let lower = self.config.pupil_area.0 * scale;
        let upper = match size_limit {
            Some(half) => (half as f64).powi(2),
            None => self.config.pupil_area.1 * scale,
        };

        let pre = preprocess::preprocess(frame, roi);
        let (dx, dy) = pre.offset;
        let components = self.segment(&pre, threshold, self.config.pupil_close_iterations, false);

        let mut candidates = Vec::new();
        for component in &components {
            if component.bbox_area() as f64 <= lower {
                continue;
            }
            let boundary = contour::trace_outer_boundary(
                &self.workspace.mask,
                false,
                component.start,
                max_trace_steps(component),
            );
            let area = contour::polygon_area(&boundary);
            if area == 0.0 || area <= lower || area >= upper {
                continue;
            }
            let hull = contour::convex_hull(&boundary);
            if hull.len() < self.config.pupil_min_hull_points {
                continue;
            }
            let perimeter = contour::closed_perimeter(&hull);
            let circularity = geometry::circularity(perimeter, area);
            if !(circularity < self.config.pupil_max_circularity) {
                continue;
            }
            candidates.push(PupilCandidate {
                hull: hull.into_iter().map(|p| p.offset(dx, dy)).collect(),
                area,
                perimeter,
                circularity,
            });
        }
        candidates.sort_by(|a, b| a.circularity.total_cmp(&b.circularity));
        log::trace!(
            "pupil: {} components, {} candidates (roi {:?}, threshold {threshold})",
            components.len(),
            candidates.len(),
            roi
        );
        candidates
    }

    /// Bright regions above `threshold` that look like a corneal reflection,
    /// in raster order.
    ///
    /// When `roi` is given the search is cropped to it and the rectangle
    /// center must lie strictly inside it.
    pub fn reflection_candidates(
        &mut self,
        frame: &Frame,
        roi: Option<Roi>,
        threshold: u8,
    ) -> Vec<ReflectionCandidate> {
        let scale = self.config.param_scale(frame.width());
        let lower = self.config.reflection_area.0 * scale;
        let upper = self.config.reflection_area.1 * scale;
        let (min_square, max_square) = self.config.reflection_squareness;

        let pre = preprocess::preprocess(frame, roi);
        let (dx, dy) = pre.offset;
        let components = self.segment(
            &pre,
            threshold,
            self.config.reflection_close_iterations,
            true,
        );

        let mut candidates = Vec::new();
        for component in &components {
            if component.bbox_area() as f64 <= lower {
                continue;
            }
            let boundary = contour::trace_outer_boundary(
                &self.workspace.mask,
                true,
                component.start,
                max_trace_steps(component),
            );
            let area = contour::polygon_area(&boundary);
            if area == 0.0 || area <= lower || area >= upper {
                continue;
            }
            let boundary: Vec<Point> = boundary.into_iter().map(|p| p.offset(dx, dy)).collect();
            let rect = geometry::min_area_rect(&contour::convex_hull(&boundary));
            let squareness = rect.squareness();
            if !(min_square..=max_square).contains(&squareness) {
                continue;
            }
            if let Some(roi) = roi {
                let center = Point::new(rect.center.0 as i32, rect.center.1 as i32);
                if !roi.contains_strict(center) {
                    continue;
                }
            }
            candidates.push(ReflectionCandidate {
                boundary,
                area,
                rect,
                squareness,
            });
        }
        log::trace!(
            "reflection: {} components, {} candidates (roi {:?}, threshold {threshold})",
            components.len(),
            candidates.len(),
            roi
        );
        candidates
    }

    /// Full-frame cleaned mask for `feature`, 1 where the feature's polarity
    /// matches (dark for the pupil, bright for the reflection).
    pub fn threshold_mask(&mut self, frame: &Frame, feature: FeatureId, threshold: u8) -> Mask {
        let pre = preprocess::preprocess(frame, None);
        let iterations = match feature {
            FeatureId::Pupil => self.config.pupil_close_iterations,
            FeatureId::Reflection => self.config.reflection_close_iterations,
        };
        self.segment_mask(&pre, threshold, iterations);
        let mut mask = self.workspace.mask.clone();
        if feature == FeatureId::Pupil {
            mask.invert();
        }
        mask
    }

    fn segment_mask(&mut self, pre: &Preprocessed, threshold: u8, iterations: usize) {
        let ws = &mut self.workspace;
        morphology::threshold_bright(&pre.image, threshold, &mut ws.mask);
        morphology::close(&mut ws.mask, iterations, &mut ws.morph);
    }

    fn segment(
        &mut self,
        pre: &Preprocessed,
        threshold: u8,
        iterations: usize,
        foreground: bool,
    ) -> Vec<Component> {
        self.segment_mask(pre, threshold, iterations);
        let ws = &mut self.workspace;
        contour::label_components(&ws.mask, foreground, &mut ws.components)
    }
}

impl Default for CandidateExtractor {
    fn default() -> Self {
        Self::new(DetectorConfig::default())
    }
}

fn max_trace_steps(component: &Component) -> usize {
    4 * component.pixels + 8
}
