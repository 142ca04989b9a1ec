use pupil_track_core::{
    SessionError, StepOutcome, TrackingOptions, TrackingSession, Transition,
};
use pupil_track_decoder::{SyntheticScene, SyntheticSource};
use pupil_track_sink::{FrameDumpSink, ImageOutputFormat};
use pupil_track_types::{FeatureId, Point, Roi, SearchScope, TrackState};

fn options() -> TrackingOptions {
    TrackingOptions {
        display_width: 320,
        ..Default::default()
    }
}

fn session_with(frames: u64) -> TrackingSession {
    let scene = SyntheticScene {
        frame_count: frames,
        ..Default::default()
    };
    let mut session = TrackingSession::new(options()).unwrap();
    session.load(Box::new(SyntheticSource::new(scene))).unwrap();
    session
}

fn step(session: &mut TrackingSession) -> pupil_track_core::FrameReport {
    match session.process_frame().unwrap() {
        StepOutcome::Processed(report) => report,
        StepOutcome::EndOfStream => panic!("unexpected end of stream"),
    }
}

#[test]
fn tracks_both_features_from_the_first_frame() {
    let mut session = session_with(4);
    assert_eq!(session.frame_count(), 4);
    assert_eq!(session.display_size(), Some((320, 240)));

    let first = step(&mut session);
    assert_eq!(first.frame_index, 0);
    assert_eq!(first.pupil_transition, Transition::Acquired);
    assert_eq!(first.reflection_transition, Transition::Acquired);
    assert_eq!(first.pupil_state, TrackState::Tracking);
    assert_eq!(first.pupil.detected().map(|d| d.center), Some(Point::new(320, 240)));
    assert_eq!(first.display_pupil, Some(Point::new(160, 120)));
    assert_eq!(first.corrected, [0.0, 0.0]);
    assert_eq!((first.display.width(), first.display.height()), (320, 240));
    assert!(first.plot_due);

    let second = step(&mut session);
    assert_eq!(second.pupil_transition, Transition::Held);
    assert_eq!(second.reflection_transition, Transition::Held);
    assert_eq!(second.pupil_roi, first.pupil_roi);
    assert!(!second.plot_due);
}

#[test]
fn end_of_stream_rewinds_but_keeps_data() {
    let mut session = session_with(2);
    step(&mut session);
    step(&mut session);
    assert!(matches!(
        session.process_frame().unwrap(),
        StepOutcome::EndOfStream
    ));
    assert_eq!(session.frame_index(), None);
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Searching);
    assert_eq!(session.rois().roi(FeatureId::Reflection), None);
    assert!(session.series().pupil().iter().all(|p| p[0] == 320.0));

    let again = step(&mut session);
    assert_eq!(again.frame_index, 0);
    assert_eq!(again.pupil_transition, Transition::Acquired);
}

#[test]
fn frame_calls_need_a_live_source() {
    let mut session = TrackingSession::new(options()).unwrap();
    assert!(matches!(session.process_frame(), Err(SessionError::NoSource)));
    assert!(matches!(session.release(), Err(SessionError::NoSource)));

    let mut session = session_with(3);
    session.release().unwrap();
    assert!(matches!(
        session.process_frame(),
        Err(SessionError::SourceReleased)
    ));
    assert!(matches!(
        session.threshold_preview(FeatureId::Pupil),
        Err(SessionError::SourceReleased)
    ));
}

#[test]
fn recording_writes_one_frame_per_step() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = session_with(3);
    assert!(matches!(
        session.stop_recording(),
        Err(SessionError::WriterNotInitialized)
    ));

    let sink = FrameDumpSink::new(dir.path(), ImageOutputFormat::Png).unwrap();
    session.start_recording(Box::new(sink)).unwrap();
    let again = FrameDumpSink::new(dir.path(), ImageOutputFormat::Png).unwrap();
    assert!(matches!(
        session.start_recording(Box::new(again)),
        Err(SessionError::WriterAlreadyInitialized)
    ));

    step(&mut session);
    step(&mut session);
    session.stop_recording().unwrap();
    step(&mut session);

    assert!(dir.path().join("frame_0.png").exists());
    assert!(dir.path().join("frame_1.png").exists());
    assert!(!dir.path().join("frame_2.png").exists());
    assert!(!session.is_recording());
}

#[test]
fn avi_recording_uses_display_size() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.avi");
    let mut session = session_with(2);
    session.start_recording_to(&path).unwrap();
    step(&mut session);
    session.stop_recording().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let width = u32::from_le_bytes(bytes[64..68].try_into().unwrap());
    let height = u32::from_le_bytes(bytes[68..72].try_into().unwrap());
    assert_eq!((width, height), (320, 240));
}

#[test]
fn out_of_range_selection_wraps_to_first_candidate() {
    let mut session = session_with(3);
    let selection = session.select_candidate(FeatureId::Pupil, 4).unwrap();
    assert!(selection.wrapped);
    assert_eq!(selection.index, 0);
    assert_eq!(selection.candidates, 1);
    assert_eq!(selection.center, Some(Point::new(320, 240)));
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Tracking);

    let selection = session.select_candidate(FeatureId::Reflection, 0).unwrap();
    assert!(!selection.wrapped);
    assert!(selection.center.is_some());
    assert_eq!(
        session.rois().state(FeatureId::Reflection),
        TrackState::Tracking
    );
}

#[test]
fn explicit_scope_limits_the_candidate_search() {
    let mut session = session_with(3);
    let elsewhere = SearchScope::Explicit(Roi::new(0, 0, 120, 120).unwrap());
    let selection = session
        .select_candidate_in(FeatureId::Pupil, 0, elsewhere)
        .unwrap();
    assert_eq!(selection.candidates, 0);
    assert_eq!(selection.center, None);
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Searching);

    let around = SearchScope::Explicit(Roi::new(250, 170, 390, 310).unwrap());
    let selection = session
        .select_candidate_in(FeatureId::Pupil, 0, around)
        .unwrap();
    assert_eq!(selection.candidates, 1);
    assert_eq!(selection.center, Some(Point::new(320, 240)));
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Tracking);
}

#[test]
fn previous_frame_only_moves_the_display() {
    let mut session = session_with(5);
    for _ in 0..3 {
        step(&mut session);
    }
    let recorded = session.series().pupil().to_vec();
    let shown = session.previous_frame().unwrap();
    assert!(shown.is_some());
    assert_eq!(session.frame_index(), Some(1));
    assert_eq!(session.series().pupil()[..3], recorded[..3]);

    let next = step(&mut session);
    assert_eq!(next.frame_index, 2);

    let mut fresh = session_with(5);
    assert!(fresh.previous_frame().unwrap().is_none());
}

#[test]
fn reset_and_clear_tracking() {
    let mut session = session_with(3);
    step(&mut session);
    session.clear_tracking();
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Searching);
    assert!(session.series().pupil()[0][0].is_finite());

    session.reset();
    assert_eq!(session.series().len(), 3);
    assert!(session.series().pupil()[0][0].is_nan());
}

#[test]
fn threshold_preview_blends_at_display_size() {
    let mut session = session_with(1);
    let preview = session.threshold_preview(FeatureId::Pupil).unwrap();
    assert_eq!((preview.width(), preview.height()), (320, 240));
    // pupil pixels are masked white at 0.4 over a dark disk
    let center = preview.pixel(160, 110).unwrap();
    assert!(center[0] > 100, "{center:?}");
}

#[test]
fn configure_validates_and_applies_thresholds() {
    let mut session = session_with(2);
    let bad = TrackingOptions {
        reflection_threshold: 100,
        ..options()
    };
    assert!(matches!(
        session.configure(bad),
        Err(SessionError::Options(_))
    ));

    // nothing is darker than 5, so the pupil is lost
    let dark = TrackingOptions {
        pupil_threshold: 5,
        ..options()
    };
    session.configure(dark).unwrap();
    let report = step(&mut session);
    assert!(!report.pupil.is_detected());
    assert!(session.series().pupil()[0][0].is_nan());
}

#[test]
fn smoothed_corrected_needs_enough_samples() {
    let mut session = session_with(4);
    for _ in 0..4 {
        step(&mut session);
    }
    let smoothed = session.smoothed_corrected();
    assert_eq!(smoothed.len(), 4);
    assert!(smoothed[1][0].is_nan());
    assert_eq!(smoothed[2], [0.0, 0.0]);
    assert_eq!(smoothed[3], [0.0, 0.0]);
}

#[test]
fn report_carries_the_running_smoothed_value() {
    let mut session = session_with(4);
    let reports: Vec<_> = (0..4).map(|_| step(&mut session)).collect();
    let full = session.smoothed_corrected();
    for (report, expected) in reports.iter().zip(&full) {
        if expected[0].is_nan() {
            assert!(report.smoothed[0].is_nan());
        } else {
            approx::assert_abs_diff_eq!(report.smoothed[0], expected[0], epsilon = 1e-9);
            approx::assert_abs_diff_eq!(report.smoothed[1], expected[1], epsilon = 1e-9);
        }
    }
}

#[test]
fn invalid_detector_config_is_rejected() {
    let detector = pupil_track_detector::DetectorConfig {
        pupil_area: (5000.0, 100.0),
        ..Default::default()
    };
    assert!(matches!(
        TrackingSession::with_detector(options(), detector),
        Err(SessionError::Detector(_))
    ));
}
