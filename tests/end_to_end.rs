use pupil_track_core::{
    FrameReport, StepOutcome, TrackingOptions, TrackingSession, Transition, parse_text,
};
use pupil_track_decoder::{Backend, Configuration, SyntheticScene};
use pupil_track_types::{FeatureId, Point, Roi, TrackState};

fn session_for(scene: SyntheticScene) -> TrackingSession {
    let config = Configuration {
        backend: Backend::Synthetic,
        scene,
        ..Default::default()
    };
    let mut session = TrackingSession::new(TrackingOptions::default()).unwrap();
    session.load(config.create_source().unwrap()).unwrap();
    session
}

fn run_to_end(session: &mut TrackingSession) -> Vec<FrameReport> {
    let mut reports = Vec::new();
    loop {
        match session.process_frame().unwrap() {
            StepOutcome::Processed(report) => reports.push(report),
            StepOutcome::EndOfStream => return reports,
        }
    }
}

#[test]
fn static_scene_tracks_every_frame_without_displacement() {
    let mut session = session_for(SyntheticScene {
        frame_count: 50,
        ..Default::default()
    });
    let reports = run_to_end(&mut session);
    assert_eq!(reports.len(), 50);

    let series = session.series();
    assert_eq!(series.len(), 50);
    let pupil = series.pupil()[0];
    let reflection = series.reflection()[0];
    assert!(pupil[0].is_finite() && reflection[0].is_finite());
    assert!(series.pupil().iter().all(|p| *p == pupil));
    assert!(series.reflection().iter().all(|r| *r == reflection));
    assert!(series.corrected().iter().all(|c| *c == [0.0, 0.0]));

    assert!(reports.iter().all(|r| r.pupil_state == TrackState::Tracking));
    assert!(reports.iter().skip(1).all(|r| r.pupil_transition == Transition::Held));
    let plots = reports.iter().filter(|r| r.plot_due).count();
    assert_eq!(plots, 17);
}

#[test]
fn reflection_loss_is_recorded_and_reacquired() {
    let mut session = session_for(SyntheticScene {
        frame_count: 30,
        reflection_gap: Some(10..20),
        reflection_shift_after_gap: (4, 0),
        ..Default::default()
    });
    let reports = run_to_end(&mut session);
    assert_eq!(reports.len(), 30);

    let series = session.series();
    for (index, point) in series.reflection().iter().enumerate() {
        let missing = (10..20).contains(&index);
        assert_eq!(point[0].is_nan(), missing, "frame {index}");
        assert_eq!(series.corrected_at(index as u64)[0].is_nan(), missing);
    }
    assert!(series.pupil().iter().all(|p| p[0].is_finite()));

    assert_eq!(reports[9].reflection_state, TrackState::Tracking);
    assert_eq!(reports[10].reflection_transition, Transition::Lost);
    assert_eq!(reports[10].reflection_state, TrackState::Searching);
    assert_eq!(reports[10].reflection_roi, None);
    assert!(
        reports[11..20]
            .iter()
            .all(|r| r.reflection_transition == Transition::Missed)
    );

    let back = &reports[20];
    assert_eq!(back.reflection_transition, Transition::Acquired);
    assert_eq!(
        back.reflection.detected().map(|d| d.center),
        Some(Point::new(323, 239))
    );
    assert_eq!(back.reflection_roi, Roi::new(315, 231, 331, 247));
    assert!(
        reports
            .iter()
            .all(|r| r.pupil_state == TrackState::Tracking)
    );

    // The shifted reflection moves the corrected displacement by the shift.
    assert_eq!(series.corrected_at(25), [-4.0, 0.0]);
    assert_eq!(session.rois().state(FeatureId::Pupil), TrackState::Searching);
}

#[test]
fn exported_series_parses_back() {
    let mut session = session_for(SyntheticScene {
        frame_count: 12,
        reflection_gap: Some(4..6),
        ..Default::default()
    });
    run_to_end(&mut session);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("eye.txt");
    session.export(&path).unwrap();
    let text = std::fs::read_to_string(&path).unwrap();
    let parsed = parse_text(&text).unwrap();
    assert!(parsed.same_values(session.series()));

    let json_path = dir.path().join("eye.json");
    session.export_json(&json_path).unwrap();
    let json = std::fs::read_to_string(&json_path).unwrap();
    assert!(json.contains("null"));
}
