mod cli;
mod progress;
mod settings;

use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};

use indicatif::ProgressBar;
use pupil_track_core::{SessionError, StepOutcome, TrackingSession};
use pupil_track_decoder::{Backend, Configuration, FrameError};
use pupil_track_sink::{FrameDumpSink, SinkError};
use tokio::time::{Interval, MissedTickBehavior};

use crate::cli::parse_cli;
use crate::progress::{format_displacement, tracking_progress};
use crate::settings::{ConfigError, EffectiveSettings, resolve_settings};

#[derive(Debug)]
enum AppError {
    Config(ConfigError),
    Frame(FrameError),
    Sink(SinkError),
    Session(SessionError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(err) => write!(f, "{err}"),
            AppError::Frame(err) => write!(f, "{err}"),
            AppError::Sink(err) => write!(f, "{err}"),
            AppError::Session(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(err) => Some(err),
            AppError::Frame(err) => Some(err),
            AppError::Sink(err) => Some(err),
            AppError::Session(err) => Some(err),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<FrameError> for AppError {
    fn from(err: FrameError) -> Self {
        AppError::Frame(err)
    }
}

impl From<SinkError> for AppError {
    fn from(err: SinkError) -> Self {
        AppError::Sink(err)
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        AppError::Session(err)
    }
}

#[derive(Debug, Default)]
struct RunStats {
    processed: u64,
    pupil_hits: u64,
    reflection_hits: u64,
    interrupted: bool,
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (cli, sources) = parse_cli();
    if cli.list_backends {
        print_available_backends();
        return Ok(());
    }

    let settings = resolve_settings(&cli, &sources)?;
    if let Some(dir) = settings.config_dir.as_deref() {
        log::debug!("config directory {}", dir.display());
    }
    let config = decoder_configuration(&settings)?;

    let available = Configuration::available_backends();
    if !available.contains(&config.backend) {
        return Err(FrameError::unsupported(config.backend.as_str()).into());
    }
    if config.backend == Backend::ImageSequence && config.input.is_none() {
        println!("usage: pupil-track [--backend <name>] [--output <file>] <frames-dir>");
        println!("       pupil-track --backend synthetic");
        println!("       pupil-track --list-backends");
        print_available_backends();
        return Ok(());
    }

    let source = config.create_source()?;
    let source_fps = source.metadata().fps;
    let mut session = TrackingSession::new(settings.options.clone())?;
    session.load(source)?;

    if session.frame_count() == 0 {
        eprintln!(
            "backend {} did not report a frame count; tracked values will not be stored",
            config.backend
        );
    }

    start_recording(&mut session, &settings)?;

    let mut ticker = if settings.realtime {
        source_fps
            .filter(|fps| fps.is_finite() && *fps > 0.0)
            .map(|fps| {
                let mut interval = tokio::time::interval(Duration::from_secs_f64(1.0 / fps));
                interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
                interval
            })
    } else {
        None
    };

    let progress = tracking_progress(session.frame_count() as u64);
    let started = Instant::now();
    let run = track(&mut session, &settings, &mut ticker, &progress).await;

    let stats = match run {
        Ok(stats) => stats,
        Err(err) => {
            progress.abandon_with_message(format!("stopped: {err}"));
            if session.is_recording() {
                if let Err(stop_err) = session.stop_recording() {
                    eprintln!("failed to finalize recording: {stop_err}");
                }
            }
            return Err(err);
        }
    };

    if session.is_recording() {
        session.stop_recording()?;
    }
    write_outputs(&session, &settings)?;

    let elapsed = started.elapsed().as_secs_f64();
    let speed = if elapsed > 0.0 {
        stats.processed as f64 / elapsed
    } else {
        0.0
    };
    progress.finish_with_message(format!(
        "{}pupil {}/{} reflection {}/{} ({speed:.1} fps)",
        if stats.interrupted { "interrupted, " } else { "" },
        stats.pupil_hits,
        stats.processed,
        stats.reflection_hits,
        stats.processed,
    ));

    session.release()?;
    Ok(())
}

fn decoder_configuration(settings: &EffectiveSettings) -> Result<Configuration, AppError> {
    let mut config = match Configuration::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("ignoring decoder environment: {err}");
            Configuration::default()
        }
    };
    if let Some(input) = settings.input.clone() {
        config.input = Some(input);
        config.backend = Backend::ImageSequence;
    }
    if let Some(name) = settings.backend.as_deref() {
        config.backend = Backend::from_str(name)?;
    }
    if let Some(fps) = settings.fps {
        config.fps = Some(fps);
    }
    Ok(config)
}

fn start_recording(
    session: &mut TrackingSession,
    settings: &EffectiveSettings,
) -> Result<(), AppError> {
    if let Some(path) = settings.video_output.as_deref() {
        if settings.frame_dump.is_some() {
            eprintln!(
                "recording to {}; ignoring the frame dump directory",
                path.display()
            );
        }
        session.start_recording_to(path)?;
    } else if let Some(dump) = settings.frame_dump.as_ref() {
        let sink = FrameDumpSink::new(dump.dir.clone(), dump.format.image_format())?;
        session.start_recording(Box::new(sink))?;
    }
    Ok(())
}

async fn track(
    session: &mut TrackingSession,
    settings: &EffectiveSettings,
    ticker: &mut Option<Interval>,
    progress: &ProgressBar,
) -> Result<RunStats, AppError> {
    let mut stats = RunStats::default();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                log::info!("interrupted after {} frames", stats.processed);
                stats.interrupted = true;
                break;
            }
            _ = next_tick(ticker) => {}
        }

        let report = match session.process_frame()? {
            StepOutcome::Processed(report) => report,
            StepOutcome::EndOfStream => {
                log::info!("end of stream after {} frames", stats.processed);
                break;
            }
        };

        stats.processed += 1;
        if report.pupil.is_detected() {
            stats.pupil_hits += 1;
        }
        if report.reflection.is_detected() {
            stats.reflection_hits += 1;
        }
        progress.inc(1);
        if report.plot_due && settings.options.plot_enabled {
            progress.set_message(format_displacement(report.smoothed));
        }
    }

    Ok(stats)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => tokio::task::yield_now().await,
    }
}

fn write_outputs(session: &TrackingSession, settings: &EffectiveSettings) -> Result<(), AppError> {
    if let Some(path) = settings.data_output.as_deref() {
        session.export(path)?;
        eprintln!("wrote tracking data to {}", path.display());
    }
    if let Some(path) = settings.json_output.as_deref() {
        session.export_json(path)?;
        eprintln!("wrote tracking data to {}", path.display());
    }
    Ok(())
}

fn print_available_backends() {
    let available = Configuration::available_backends();
    if available.is_empty() {
        println!("no frame backends are compiled into this build");
    } else {
        println!("available backends:");
        for backend in available {
            println!("  - {}", backend.as_str());
        }
    }
}
