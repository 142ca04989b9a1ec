//! Pupil and corneal-reflection detection on single frames.
//!
//! The pipeline is preprocessing (crop, intensity, blur), thresholding and
//! morphological closing, outer-contour extraction, shape filtering, and
//! finally ellipse or rectangle fitting of the selected candidate. Frame to
//! frame state such as the adaptive ROI lives in `pupil-track-core`.

pub mod config;
pub mod conic;
pub mod contour;
pub mod extractor;
pub mod fit;
pub mod geometry;
pub mod morphology;
pub mod preprocess;

pub use config::{DetectorConfig, DetectorError, DetectorResult};
pub use extractor::{CandidateExtractor, PupilCandidate, ReflectionCandidate};
pub use fit::{fit_pupil, fit_reflection};
pub use geometry::{RotatedRect, canonical_angle, circularity};
pub use morphology::Mask;
pub use preprocess::{IntensityImage, Preprocessed, preprocess};
