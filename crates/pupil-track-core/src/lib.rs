//! Frame-to-frame tracking on top of the single-frame detector.
//!
//! [`TrackingSession`] owns everything that persists between frames: the
//! search/track state and adaptive ROI of each feature, the recorded time
//! series, the display scale, and an optional recording sink. The caller
//! drives it one frame at a time and decides how to react to each
//! [`StepOutcome`].

pub mod export;
pub mod normalize;
pub mod options;
pub mod series;
pub mod session;
pub mod state;

pub use export::{ExportError, parse_text};
pub use normalize::DisplayScale;
pub use options::{OptionsError, TrackingOptions};
pub use series::{MISSING, RecordError, TimeSeries, moving_average};
pub use session::{
    CandidateSelection, FrameReport, SessionError, SessionResult, StepOutcome, TrackingSession,
};
pub use state::{FeatureTrack, RoiManager, Transition};
