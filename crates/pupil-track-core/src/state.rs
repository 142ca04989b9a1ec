//! Search/track state machine and the adaptive ROIs it maintains.

use pupil_track_types::{
    FeatureId, PupilDetection, ReflectionDetection, Roi, SearchScope, TrackState,
};

pub const PUPIL_ROI_FACTOR: f64 = 1.75;
pub const REFLECTION_ROI_FACTOR: f64 = 1.25;

/// Edge taken by one feature on one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Searching -> Tracking`
    Acquired,
    /// `Tracking -> Tracking`
    Held,
    /// `Tracking -> Searching`
    Lost,
    /// `Searching -> Searching`
    Missed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureTrack {
    state: TrackState,
    roi: Option<Roi>,
    half_size: Option<i32>,
}

impl FeatureTrack {
    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn roi(&self) -> Option<Roi> {
        self.roi
    }

    /// Remembered ROI half-size for the current track cycle.
    pub fn half_size(&self) -> Option<i32> {
        self.half_size
    }

    fn hit(&mut self, roi: Roi, half_size: i32) -> Transition {
        let transition = match self.state {
            TrackState::Searching => Transition::Acquired,
            TrackState::Tracking => Transition::Held,
        };
        self.state = TrackState::Tracking;
        self.roi = Some(roi);
        self.half_size = Some(half_size);
        transition
    }

    fn miss(&mut self) -> Transition {
        let transition = match self.state {
            TrackState::Searching => Transition::Missed,
            TrackState::Tracking => Transition::Lost,
        };
        *self = Self::default();
        transition
    }
}

/// Half-size of the square pupil ROI for an ellipse whose longer full axis is
/// `major_axis`.
pub fn pupil_roi_half(major_axis: f64) -> i32 {
    (major_axis * PUPIL_ROI_FACTOR).round_ties_even() as i32
}

/// Half-size of the square reflection ROI; the side is rounded before scaling
/// and the product truncated.
pub fn reflection_roi_half(larger_side: f64) -> i32 {
    (larger_side.round_ties_even() * REFLECTION_ROI_FACTOR) as i32
}

/// Owns the per-feature track state and ROI pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoiManager {
    pupil: FeatureTrack,
    reflection: FeatureTrack,
}

impl RoiManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&self, feature: FeatureId) -> &FeatureTrack {
        match feature {
            FeatureId::Pupil => &self.pupil,
            FeatureId::Reflection => &self.reflection,
        }
    }

    fn track_mut(&mut self, feature: FeatureId) -> &mut FeatureTrack {
        match feature {
            FeatureId::Pupil => &mut self.pupil,
            FeatureId::Reflection => &mut self.reflection,
        }
    }

    pub fn state(&self, feature: FeatureId) -> TrackState {
        self.track(feature).state
    }

    pub fn roi(&self, feature: FeatureId) -> Option<Roi> {
        self.track(feature).roi
    }

    /// Where the next automatic search for `feature` should look.
    ///
    /// A tracked feature reuses its own ROI. A reflection that is still being
    /// searched for is looked for inside the pupil ROI when the pupil is
    /// tracked.
    pub fn scope(&self, feature: FeatureId) -> SearchScope {
        if self.state(feature) == TrackState::Tracking {
            return SearchScope::Cached(feature);
        }
        match feature {
            FeatureId::Reflection if self.pupil.state == TrackState::Tracking => {
                SearchScope::Cached(FeatureId::Pupil)
            }
            _ => SearchScope::WholeFrame,
        }
    }

    pub fn resolve(&self, scope: SearchScope) -> Option<Roi> {
        match scope {
            SearchScope::WholeFrame => None,
            SearchScope::Explicit(roi) => Some(roi),
            SearchScope::Cached(feature) => self.roi(feature),
        }
    }

    /// Upper bound for pupil candidate search, once a pupil size is known.
    pub fn pupil_size_limit(&self) -> Option<i32> {
        self.pupil.half_size
    }

    /// Recenters the pupil ROI on `detection`. The half-size is derived only
    /// when none is cached for this track cycle.
    pub fn pupil_hit(&mut self, detection: &PupilDetection) -> Transition {
        let half = self
            .pupil
            .half_size
            .unwrap_or_else(|| pupil_roi_half(detection.major_axis()));
        let roi = Roi::around(detection.center, half);
        let transition = self.pupil.hit(roi, half);
        log_transition(FeatureId::Pupil, transition, Some(roi));
        transition
    }

    /// Rebuilds the reflection ROI from `detection`, size included.
    pub fn reflection_hit(&mut self, detection: &ReflectionDetection) -> Transition {
        let half = reflection_roi_half(detection.larger_side());
        let roi = Roi::around(detection.center, half);
        let transition = self.reflection.hit(roi, half);
        log_transition(FeatureId::Reflection, transition, Some(roi));
        transition
    }

    /// Drops the ROI and cached size of `feature`.
    pub fn miss(&mut self, feature: FeatureId) -> Transition {
        let transition = self.track_mut(feature).miss();
        log_transition(feature, transition, None);
        transition
    }

    pub fn clear(&mut self) {
        for feature in FeatureId::ALL {
            self.miss(feature);
        }
    }
}

fn log_transition(feature: FeatureId, transition: Transition, roi: Option<Roi>) {
    match transition {
        Transition::Acquired => log::debug!("{feature}: searching -> tracking, roi {roi:?}"),
        Transition::Lost => log::debug!("{feature}: tracking -> searching"),
        Transition::Held | Transition::Missed => {}
    }
}
