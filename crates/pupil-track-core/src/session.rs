use std::path::Path;

use pupil_track_decoder::{DynFrameSource, NextFrame};
use pupil_track_detector::{
    CandidateExtractor, DetectorConfig, DetectorError, PupilCandidate, ReflectionCandidate, fit_pupil,
    fit_reflection,
};
use pupil_track_sink::{AviWriter, Canvas, DynFrameSink, Rgb, SinkError};
use pupil_track_types::{
    FeatureId, FeatureOutcome, Frame, FrameError, Point, PupilDetection, ReflectionDetection,
    Roi, SearchScope, TrackState,
};
use thiserror::Error;

use crate::export::{self, ExportError};
use crate::normalize::DisplayScale;
use crate::options::{OptionsError, TrackingOptions};
use crate::series::{self, RecordError, TimeSeries};
use crate::state::{RoiManager, Transition};

const CROSSHAIR_ARM: i32 = 2;
const PUPIL_PREVIEW_WEIGHTS: (f64, f64) = (0.4, 0.6);
const REFLECTION_PREVIEW_WEIGHTS: (f64, f64) = (0.7, 0.3);

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no frame source loaded")]
    NoSource,
    #[error("frame source has been released")]
    SourceReleased,
    #[error("video writer already initialized; stop recording first")]
    WriterAlreadyInitialized,
    #[error("video writer not initialized")]
    WriterNotInitialized,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Sink(#[from] SinkError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error(transparent)]
    Options(#[from] OptionsError),
    #[error(transparent)]
    Detector(#[from] DetectorError),
    #[error(transparent)]
    Record(#[from] RecordError),
}

/// Result of one `process_frame` call.
#[derive(Debug, Clone)]
pub enum StepOutcome {
    Processed(FrameReport),
    /// The source ran out; tracking was reset and frame 0 reloaded.
    EndOfStream,
}

#[derive(Debug, Clone)]
pub struct FrameReport {
    pub frame_index: u64,
    pub pupil: FeatureOutcome<PupilDetection>,
    pub reflection: FeatureOutcome<ReflectionDetection>,
    pub pupil_state: TrackState,
    pub reflection_state: TrackState,
    pub pupil_transition: Transition,
    pub reflection_transition: Transition,
    pub pupil_roi: Option<Roi>,
    pub reflection_roi: Option<Roi>,
    /// Centers on the display copy of the frame.
    pub display_pupil: Option<Point>,
    pub display_reflection: Option<Point>,
    /// Reflection-corrected displacement; NaN while either feature or the
    /// baseline is missing.
    pub corrected: [f64; 2],
    /// Trailing moving average of `corrected` ending at this frame.
    pub smoothed: [f64; 2],
    pub plot_due: bool,
    /// Annotated display frame.
    pub display: Frame,
}

/// Outcome of manually choosing a candidate on the current frame.
#[derive(Debug, Clone)]
pub struct CandidateSelection {
    pub feature: FeatureId,
    /// Index actually used.
    pub index: usize,
    /// The requested index was past the end and wrapped to 0.
    pub wrapped: bool,
    pub candidates: usize,
    pub center: Option<Point>,
    pub display: Frame,
}

enum SourceSlot {
    Empty,
    Loaded(DynFrameSource),
    Released,
}

enum Fitted<'a> {
    Pupil(&'a PupilCandidate, &'a PupilDetection),
    Reflection(&'a ReflectionCandidate, &'a ReflectionDetection),
}

/// One tracking session over one frame source.
///
/// The shell calls [`TrackingSession::process_frame`] once per tick; all ROI,
/// state and series mutation happens inside that call.
pub struct TrackingSession {
    options: TrackingOptions,
    extractor: CandidateExtractor,
    rois: RoiManager,
    series: TimeSeries,
    source: SourceSlot,
    scale: Option<DisplayScale>,
    current: Option<Frame>,
    current_index: Option<u64>,
    writer: Option<DynFrameSink>,
}

impl TrackingSession {
    pub fn new(options: TrackingOptions) -> SessionResult<Self> {
        Self::with_detector(options, DetectorConfig::default())
    }

    pub fn with_detector(options: TrackingOptions, detector: DetectorConfig) -> SessionResult<Self> {
        options.validate()?;
        detector.validate()?;
        Ok(Self {
            options,
            extractor: CandidateExtractor::new(detector),
            rois: RoiManager::new(),
            series: TimeSeries::default(),
            source: SourceSlot::Empty,
            scale: None,
            current: None,
            current_index: None,
            writer: None,
        })
    }

    pub fn options(&self) -> &TrackingOptions {
        &self.options
    }

    /// Applies new options; thresholds take effect on the next frame.
    pub fn configure(&mut self, options: TrackingOptions) -> SessionResult<()> {
        options.validate()?;
        if options.display_width != self.options.display_width {
            if let Some(scale) = self.scale {
                let (width, height) = scale.native_size();
                self.scale = Some(DisplayScale::new(width, height, options.display_width));
                if self.writer.is_some() {
                    log::warn!("display width changed while recording; frames will be rejected");
                }
            }
        }
        self.options = options;
        Ok(())
    }

    pub fn series(&self) -> &TimeSeries {
        &self.series
    }

    pub fn rois(&self) -> &RoiManager {
        &self.rois
    }

    /// Index of the frame currently displayed, `None` before the first step.
    pub fn frame_index(&self) -> Option<u64> {
        self.current_index
    }

    pub fn frame_count(&self) -> usize {
        self.series.len()
    }

    pub fn display_size(&self) -> Option<(u32, u32)> {
        self.scale.map(|scale| scale.display_size())
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_some()
    }

    fn source_mut(&mut self) -> SessionResult<&mut DynFrameSource> {
        match &mut self.source {
            SourceSlot::Loaded(source) => Ok(source),
            SourceSlot::Empty => Err(SessionError::NoSource),
            SourceSlot::Released => Err(SessionError::SourceReleased),
        }
    }

    fn loaded_frame(&self) -> SessionResult<&Frame> {
        match &self.source {
            SourceSlot::Loaded(_) => self.current.as_ref().ok_or(SessionError::NoSource),
            SourceSlot::Empty => Err(SessionError::NoSource),
            SourceSlot::Released => Err(SessionError::SourceReleased),
        }
    }

    fn scale(&self) -> SessionResult<DisplayScale> {
        self.scale.ok_or(SessionError::NoSource)
    }

    /// Attaches `source`, allocates the series and shows frame 0 without
    /// consuming it.
    pub fn load(&mut self, mut source: DynFrameSource) -> SessionResult<()> {
        source.seek(0)?;
        let first = match source.next_frame()? {
            NextFrame::Frame(frame) => frame,
            NextFrame::EndOfStream => {
                return Err(FrameError::InvalidFrame {
                    reason: "source yielded no frames".into(),
                }
                .into());
            }
        };
        source.seek(0)?;

        let frame_count = source.frame_count();
        if frame_count == 0 {
            log::warn!("source does not report a frame count; nothing will be recorded");
        }
        let scale = DisplayScale::new(first.width(), first.height(), self.options.display_width);
        log::debug!(
            "loaded {}x{} source with {frame_count} frame(s), display {:?}",
            first.width(),
            first.height(),
            scale.display_size()
        );

        self.series = TimeSeries::new(usize::try_from(frame_count).unwrap_or(usize::MAX));
        self.rois.clear();
        self.scale = Some(scale);
        self.current = Some(first);
        self.current_index = None;
        self.source = SourceSlot::Loaded(source);
        Ok(())
    }

    /// Drops the source. Later frame calls fail with `SourceReleased`.
    pub fn release(&mut self) -> SessionResult<()> {
        match std::mem::replace(&mut self.source, SourceSlot::Released) {
            SourceSlot::Loaded(_) => {
                self.current = None;
                self.current_index = None;
                Ok(())
            }
            SourceSlot::Empty => {
                self.source = SourceSlot::Empty;
                Err(SessionError::NoSource)
            }
            SourceSlot::Released => Err(SessionError::SourceReleased),
        }
    }

    /// Advances one frame, tracks both features and records the result.
    pub fn process_frame(&mut self) -> SessionResult<StepOutcome> {
        let (position, next) = {
            let source = self.source_mut()?;
            let position = source.position();
            (position, source.next_frame()?)
        };
        let frame = match next {
            NextFrame::Frame(frame) => frame,
            NextFrame::EndOfStream => {
                self.rewind()?;
                return Ok(StepOutcome::EndOfStream);
            }
        };
        let index = frame.frame_index().unwrap_or(position);

        let pupil_roi = self.rois.resolve(self.rois.scope(FeatureId::Pupil));
        let pupil_candidates = self.extractor.pupil_candidates(
            &frame,
            pupil_roi,
            self.options.pupil_threshold,
            self.rois.pupil_size_limit(),
        );
        let pupil = fit_pupil(&pupil_candidates, 0);
        let pupil_transition = match &pupil {
            FeatureOutcome::Detected(detection) => self.rois.pupil_hit(detection),
            FeatureOutcome::NotFound => self.rois.miss(FeatureId::Pupil),
        };

        let reflection_roi = self.rois.resolve(self.rois.scope(FeatureId::Reflection));
        let reflection_candidates = self.extractor.reflection_candidates(
            &frame,
            reflection_roi,
            self.options.reflection_threshold,
        );
        let reflection = fit_reflection(&reflection_candidates, 0);
        let reflection_transition = match &reflection {
            FeatureOutcome::Detected(detection) => self.rois.reflection_hit(detection),
            FeatureOutcome::NotFound => self.rois.miss(FeatureId::Reflection),
        };

        let pupil_detection = pupil.detected();
        let reflection_detection = reflection.detected();
        // An empty series means the source has no frame count.
        if !self.series.is_empty() {
            self.series
                .record(index, FeatureId::Pupil, pupil_detection.map(|d| d.center))?;
            self.series
                .record_angle(index, pupil_detection.map(|d| d.angle))?;
            self.series.record(
                index,
                FeatureId::Reflection,
                reflection_detection.map(|d| d.center),
            )?;
        }

        let scale = self.scale()?;
        let mut fitted = Vec::with_capacity(2);
        if let (Some(candidate), Some(detection)) = (pupil_candidates.first(), pupil_detection) {
            fitted.push(Fitted::Pupil(candidate, detection));
        }
        if let (Some(candidate), Some(detection)) =
            (reflection_candidates.first(), reflection_detection)
        {
            fitted.push(Fitted::Reflection(candidate, detection));
        }
        let display = self.render(&frame, index, &scale, &fitted)?;
        if let Some(writer) = self.writer.as_mut() {
            writer.write(&display)?;
        }

        let display_pupil = pupil_detection.map(|d| scale.to_display(d.center));
        let display_reflection = reflection_detection.map(|d| scale.to_display(d.center));
        let report = FrameReport {
            frame_index: index,
            pupil_state: self.rois.state(FeatureId::Pupil),
            reflection_state: self.rois.state(FeatureId::Reflection),
            pupil_transition,
            reflection_transition,
            pupil_roi: self.rois.roi(FeatureId::Pupil),
            reflection_roi: self.rois.roi(FeatureId::Reflection),
            display_pupil,
            display_reflection,
            corrected: self.series.corrected_at(index),
            smoothed: self.smoothed_corrected_at(index),
            plot_due: self.options.plot_enabled && index % self.options.plot_interval == 0,
            pupil,
            reflection,
            display,
        };
        log::trace!(
            "frame {index}: pupil {} ({}), reflection {} ({})",
            report.pupil.is_detected(),
            report.pupil_state,
            report.reflection.is_detected(),
            report.reflection_state
        );

        self.current = Some(frame);
        self.current_index = Some(index);
        Ok(StepOutcome::Processed(report))
    }

    fn rewind(&mut self) -> SessionResult<()> {
        self.rois.clear();
        let source = self.source_mut()?;
        source.seek(0)?;
        let first = source.next_frame()?;
        source.seek(0)?;
        if let NextFrame::Frame(frame) = first {
            self.current = Some(frame);
        }
        self.current_index = None;
        log::debug!("end of stream; tracking reset and rewound to frame 0");
        Ok(())
    }

    /// Steps the display back one frame without tracking or recording.
    /// Returns `None` when already at the first frame.
    pub fn previous_frame(&mut self) -> SessionResult<Option<Frame>> {
        self.loaded_frame()?;
        let Some(index) = self.current_index.filter(|&index| index > 0) else {
            return Ok(None);
        };
        let target = index - 1;
        let source = self.source_mut()?;
        source.seek(target)?;
        let NextFrame::Frame(frame) = source.next_frame()? else {
            return Ok(None);
        };
        self.current = Some(frame);
        self.current_index = Some(target);
        self.display_frame().map(Some)
    }

    /// Unannotated display copy of the current frame.
    pub fn display_frame(&self) -> SessionResult<Frame> {
        let frame = self.loaded_frame()?;
        let (width, height) = self.scale()?.display_size();
        Ok(Canvas::resized_from(frame, width, height).into_frame(frame.frame_index())?)
    }

    /// Picks candidate `index` of `feature` from a whole-frame search of the
    /// current frame and starts tracking it with a fresh ROI.
    pub fn select_candidate(
        &mut self,
        feature: FeatureId,
        index: usize,
    ) -> SessionResult<CandidateSelection> {
        self.select_candidate_in(feature, index, SearchScope::WholeFrame)
    }

    /// Like [`select_candidate`](Self::select_candidate), searching only the
    /// region `scope` resolves to on the current frame.
    pub fn select_candidate_in(
        &mut self,
        feature: FeatureId,
        index: usize,
        scope: SearchScope,
    ) -> SessionResult<CandidateSelection> {
        let frame = self.loaded_frame()?.clone();
        let scale = self.scale()?;
        let threshold = self.options.threshold(feature);
        let roi = self.rois.resolve(scope);

        let (count, used, wrapped, center, display) = match feature {
            FeatureId::Pupil => {
                let candidates = self
                    .extractor
                    .pupil_candidates(&frame, roi, threshold, None);
                let (used, wrapped) = wrap_index(feature, index, candidates.len());
                self.rois.miss(feature);
                let outcome = fit_pupil(&candidates, used);
                let mut fitted = Vec::new();
                if let (Some(candidate), FeatureOutcome::Detected(detection)) =
                    (candidates.get(used), &outcome)
                {
                    self.rois.pupil_hit(detection);
                    fitted.push(Fitted::Pupil(candidate, detection));
                }
                let center = outcome.detected().map(|d| d.center);
                let display = self.render(&frame, self.current_index.unwrap_or(0), &scale, &fitted)?;
                if let (Some(frame_index), Some(detection)) =
                    (self.current_index, outcome.detected())
                {
                    self.series
                        .record(frame_index, feature, Some(detection.center))?;
                    self.series.record_angle(frame_index, Some(detection.angle))?;
                }
                (candidates.len(), used, wrapped, center, display)
            }
            FeatureId::Reflection => {
                let candidates = self
                    .extractor
                    .reflection_candidates(&frame, roi, threshold);
                let (used, wrapped) = wrap_index(feature, index, candidates.len());
                self.rois.miss(feature);
                let outcome = fit_reflection(&candidates, used);
                let mut fitted = Vec::new();
                if let (Some(candidate), FeatureOutcome::Detected(detection)) =
                    (candidates.get(used), &outcome)
                {
                    self.rois.reflection_hit(detection);
                    fitted.push(Fitted::Reflection(candidate, detection));
                }
                let center = outcome.detected().map(|d| d.center);
                let display = self.render(&frame, self.current_index.unwrap_or(0), &scale, &fitted)?;
                if let (Some(frame_index), Some(center)) = (self.current_index, center) {
                    self.series.record(frame_index, feature, Some(center))?;
                }
                (candidates.len(), used, wrapped, center, display)
            }
        };

        Ok(CandidateSelection {
            feature,
            index: used,
            wrapped,
            candidates: count,
            center,
            display,
        })
    }

    /// Manual clear: both features back to searching and every series cell
    /// back to the sentinel.
    pub fn reset(&mut self) {
        self.rois.clear();
        self.series.clear();
    }

    /// Drops both ROIs and track states, keeping the recorded data.
    pub fn clear_tracking(&mut self) {
        self.rois.clear();
    }

    pub fn start_recording(&mut self, sink: DynFrameSink) -> SessionResult<()> {
        if self.writer.is_some() {
            return Err(SessionError::WriterAlreadyInitialized);
        }
        self.writer = Some(sink);
        Ok(())
    }

    /// Starts an MJPEG AVI recording at the display size and configured fps.
    pub fn start_recording_to(&mut self, path: &Path) -> SessionResult<()> {
        if self.writer.is_some() {
            return Err(SessionError::WriterAlreadyInitialized);
        }
        let (width, height) = self.scale()?.display_size();
        let writer = AviWriter::create(path, width, height, self.options.video_fps)?;
        self.start_recording(Box::new(writer))
    }

    pub fn stop_recording(&mut self) -> SessionResult<()> {
        let mut writer = self.writer.take().ok_or(SessionError::WriterNotInitialized)?;
        writer.finish()?;
        Ok(())
    }

    pub fn export(&self, path: &Path) -> SessionResult<()> {
        export::export_text(&self.series, path)?;
        Ok(())
    }

    pub fn export_json(&self, path: &Path) -> SessionResult<()> {
        export::export_json(&self.series, path, true)?;
        Ok(())
    }

    /// Display frame blended with the cleaned threshold mask of `feature`.
    pub fn threshold_preview(&mut self, feature: FeatureId) -> SessionResult<Frame> {
        let frame = self.loaded_frame()?.clone();
        let (width, height) = self.scale()?.display_size();
        let mask = self
            .extractor
            .threshold_mask(&frame, feature, self.options.threshold(feature));
        let gray: Vec<u8> = mask.data.iter().map(|&v| v * 255).collect();
        let (mask_weight, frame_weight) = match feature {
            FeatureId::Pupil => PUPIL_PREVIEW_WEIGHTS,
            FeatureId::Reflection => REFLECTION_PREVIEW_WEIGHTS,
        };
        let mut canvas = Canvas::resized_from(&frame, width, height);
        canvas.blend_gray(&gray, mask.width, mask.height, mask_weight, frame_weight);
        Ok(canvas.into_frame(frame.frame_index())?)
    }

    /// Moving average of the corrected displacement, for plotting.
    pub fn smoothed_corrected(&self) -> Vec<[f64; 2]> {
        series::moving_average_xy(
            &self.series.corrected(),
            self.options.smoothing_window,
            self.options.smoothing_min_valid,
        )
    }

    /// Last value of [`Self::smoothed_corrected`] up to `index`, computed
    /// from the trailing window only.
    pub fn smoothed_corrected_at(&self, index: u64) -> [f64; 2] {
        let window = self.options.smoothing_window.max(1);
        let start = index.saturating_sub(window as u64 - 1);
        let samples: Vec<[f64; 2]> = (start..=index)
            .map(|i| self.series.corrected_at(i))
            .collect();
        series::moving_average_xy(&samples, window, self.options.smoothing_min_valid)
            .last()
            .copied()
            .unwrap_or([series::MISSING; 2])
    }

    fn render(
        &self,
        frame: &Frame,
        index: u64,
        scale: &DisplayScale,
        fitted: &[Fitted<'_>],
    ) -> SessionResult<Frame> {
        let (width, height) = scale.display_size();
        let mut canvas = Canvas::resized_from(frame, width, height);
        let verbose = self.options.verbose_overlay;
        let mut pip = None;

        for item in fitted {
            match item {
                Fitted::Pupil(candidate, detection) => {
                    let center = scale.to_display(detection.center);
                    canvas.crosshair(center, CROSSHAIR_ARM, Rgb::WHITE);
                    canvas.ellipse(
                        scale.to_display_f64((
                            f64::from(detection.center.x),
                            f64::from(detection.center.y),
                        )),
                        scale.to_display_f64(detection.axes),
                        detection.raw_angle,
                        Rgb::OUTLINE,
                    );
                    let half = self
                        .rois
                        .track(FeatureId::Pupil)
                        .half_size()
                        .map(|half| scale.length_to_display(half));
                    if verbose {
                        let hull: Vec<Point> =
                            candidate.hull.iter().map(|&p| scale.to_display(p)).collect();
                        canvas.polygon(&hull, Rgb::WHITE);
                        if let Some(half) = half {
                            canvas.rect(
                                Roi {
                                    x0: center.x - half,
                                    y0: center.y - half,
                                    x1: center.x + half,
                                    y1: center.y + half,
                                },
                                Rgb::WHITE,
                            );
                        }
                    }
                    pip = half.and_then(|half| {
                        Roi::new(
                            (center.x - half + 1).max(0),
                            (center.y - half + 1).max(0),
                            center.x + half,
                            center.y + half,
                        )
                    });
                }
                Fitted::Reflection(candidate, detection) => {
                    let center = scale.to_display(detection.center);
                    canvas.crosshair(center, CROSSHAIR_ARM, Rgb::BLACK);
                    canvas.rotated_box(
                        scale.to_display_f64(candidate.rect.center),
                        scale.to_display_f64(candidate.rect.size),
                        candidate.rect.angle,
                        Rgb::OUTLINE,
                    );
                    if verbose {
                        if let Some(roi) = self.rois.roi(FeatureId::Reflection) {
                            let half = scale.length_to_display(roi.x1 - detection.center.x);
                            canvas.rect(
                                Roi {
                                    x0: center.x - half,
                                    y0: center.y - half,
                                    x1: center.x + half,
                                    y1: center.y + half,
                                },
                                Rgb::WHITE,
                            );
                        }
                        let boundary: Vec<Point> = candidate
                            .boundary
                            .iter()
                            .map(|&p| scale.to_display(p))
                            .collect();
                        canvas.polygon(&boundary, Rgb::CONTOUR);
                    }
                }
            }
        }

        if self.options.picture_in_picture {
            if let Some(roi) = pip {
                canvas.picture_in_picture(roi);
            }
        }
        Ok(canvas.into_frame(Some(index))?)
    }
}

fn wrap_index(feature: FeatureId, index: usize, len: usize) -> (usize, bool) {
    if index < len || len == 0 {
        return (index, false);
    }
    log::warn!("{feature} candidate {index} out of range ({len} found); wrapping to 0");
    (0, true)
}
