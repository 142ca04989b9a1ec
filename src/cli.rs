use std::path::PathBuf;

use clap::parser::ValueSource;
use clap::{ArgMatches, CommandFactory, FromArgMatches, Parser, ValueEnum};
use pupil_track_sink::ImageOutputFormat;

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DumpFormat {
    Jpeg,
    Png,
}

impl DumpFormat {
    pub fn image_format(self) -> ImageOutputFormat {
        match self {
            DumpFormat::Jpeg => ImageOutputFormat::default(),
            DumpFormat::Png => ImageOutputFormat::Png,
        }
    }
}

#[derive(Debug, Default)]
pub struct CliSources {
    pub dump_format_from_cli: bool,
    pub verbose_overlay_from_cli: bool,
    pub pip_from_cli: bool,
    pub no_plot_from_cli: bool,
    pub realtime_from_cli: bool,
}

impl CliSources {
    fn from_matches(matches: &ArgMatches) -> Self {
        Self {
            dump_format_from_cli: value_from_cli(matches, "dump_format"),
            verbose_overlay_from_cli: value_from_cli(matches, "verbose_overlay"),
            pip_from_cli: value_from_cli(matches, "pip"),
            no_plot_from_cli: value_from_cli(matches, "no_plot"),
            realtime_from_cli: value_from_cli(matches, "realtime"),
        }
    }
}

fn value_from_cli(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|source| matches!(source, ValueSource::CommandLine))
}

pub fn parse_cli() -> (CliArgs, CliSources) {
    let command = CliArgs::command();
    let matches = command.get_matches();
    let args = match CliArgs::from_arg_matches(&matches) {
        Ok(args) => args,
        Err(err) => err.exit(),
    };
    let sources = CliSources::from_matches(&matches);
    (args, sources)
}

#[derive(Debug, Parser)]
#[command(
    name = "pupil-track",
    about = "Track the pupil and corneal reflection across eye video frames",
    disable_help_subcommand = true
)]
pub struct CliArgs {
    /// Lock frame decoding to a specific backend implementation
    #[arg(short = 'b', long = "backend")]
    pub backend: Option<String>,

    /// Override the configuration file path
    #[arg(long = "config")]
    pub config: Option<PathBuf>,

    /// Print the list of available decoding backends
    #[arg(long = "list-backends")]
    pub list_backends: bool,

    /// Gray level below which pixels may belong to the pupil (0-150)
    #[arg(
        long = "pupil-threshold",
        value_parser = clap::value_parser!(u8).range(0..=150)
    )]
    pub pupil_threshold: Option<u8>,

    /// Gray level above which pixels may belong to the reflection (155-255)
    #[arg(
        long = "reflection-threshold",
        value_parser = clap::value_parser!(u8).range(155..=255)
    )]
    pub reflection_threshold: Option<u8>,

    /// Width of the display copy used for overlays and recording
    #[arg(
        long = "display-width",
        value_parser = clap::value_parser!(u32).range(1..)
    )]
    pub display_width: Option<u32>,

    /// Frame rate for image sequences and the synthetic source
    #[arg(long = "fps", value_name = "FPS")]
    pub fps: Option<String>,

    /// Trailing window of the corrected-displacement moving average
    #[arg(long = "smoothing-window", value_parser = clap::value_parser!(usize))]
    pub smoothing_window: Option<usize>,

    /// Draw hulls, boundaries and search regions on top of the crosshairs
    #[arg(long = "verbose-overlay", id = "verbose_overlay")]
    pub verbose_overlay: bool,

    /// Copy the pupil search region into the top-right corner of the display
    #[arg(long = "pip", id = "pip")]
    pub pip: bool,

    /// Do not print the smoothed displacement next to the progress bar
    #[arg(long = "no-plot", id = "no_plot")]
    pub no_plot: bool,

    /// Pace processing at the source frame rate instead of running flat out
    #[arg(long = "realtime", id = "realtime")]
    pub realtime: bool,

    /// Record the annotated display frames to a Motion-JPEG AVI file
    #[arg(long = "record", value_name = "FILE")]
    pub record: Option<PathBuf>,

    /// Write the tracked series as a text table when the stream ends
    #[arg(long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Write the tracked series as JSON when the stream ends
    #[arg(long = "json", value_name = "FILE")]
    pub json: Option<PathBuf>,

    /// Output directory for writing annotated frames as image files
    #[arg(long = "dump-dir")]
    pub dump_dir: Option<PathBuf>,

    /// Image format for dumped frames when --dump-dir is set
    #[arg(long = "dump-format", value_enum, default_value_t = DumpFormat::Jpeg)]
    pub dump_format: DumpFormat,

    /// Input directory of frames (image-sequence backend)
    pub input: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> (CliArgs, CliSources) {
        let matches = CliArgs::command().try_get_matches_from(args).unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        (cli, CliSources::from_matches(&matches))
    }

    #[test]
    fn defaults_are_not_marked_as_command_line() {
        let (cli, sources) = parse(&["pupil-track", "frames/"]);
        assert_eq!(cli.dump_format, DumpFormat::Jpeg);
        assert!(!sources.dump_format_from_cli);
        assert!(!sources.pip_from_cli);
        assert_eq!(cli.input, Some(PathBuf::from("frames/")));
    }

    #[test]
    fn explicit_flags_are_tracked() {
        let (cli, sources) = parse(&["pupil-track", "--dump-format", "png", "--pip", "-b", "mock"]);
        assert_eq!(cli.dump_format, DumpFormat::Png);
        assert!(sources.dump_format_from_cli);
        assert!(sources.pip_from_cli);
        assert_eq!(cli.backend.as_deref(), Some("mock"));
    }

    #[test]
    fn thresholds_are_range_checked() {
        assert!(
            CliArgs::command()
                .try_get_matches_from(["pupil-track", "--pupil-threshold", "151"])
                .is_err()
        );
        assert!(
            CliArgs::command()
                .try_get_matches_from(["pupil-track", "--reflection-threshold", "154"])
                .is_err()
        );
        let (cli, _) = parse(&["pupil-track", "--reflection-threshold", "255"]);
        assert_eq!(cli.reflection_threshold, Some(255));
    }
}
