use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use directories::{BaseDirs, ProjectDirs};
use pupil_track_core::{OptionsError, TrackingOptions};
use pupil_track_decoder::config::parse_fps;
use serde::Deserialize;

use crate::cli::{CliArgs, CliSources, DumpFormat};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    backend: Option<String>,
    input: Option<String>,
    fps: Option<f64>,
    realtime: Option<bool>,
    tracking: Option<TrackingOptions>,
    output: Option<OutputFileConfig>,
}

#[derive(Debug, Default, Deserialize, Clone)]
#[serde(default)]
struct OutputFileConfig {
    data: Option<String>,
    json: Option<String>,
    video: Option<String>,
    frames_dir: Option<String>,
    frames_format: Option<String>,
}

#[derive(Debug)]
pub struct EffectiveSettings {
    pub backend: Option<String>,
    pub input: Option<PathBuf>,
    pub fps: Option<f64>,
    pub realtime: bool,
    pub options: TrackingOptions,
    pub data_output: Option<PathBuf>,
    pub json_output: Option<PathBuf>,
    pub video_output: Option<PathBuf>,
    pub frame_dump: Option<FrameDumpSettings>,
    pub config_dir: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FrameDumpSettings {
    pub dir: PathBuf,
    pub format: DumpFormat,
}

const CONFIG_FILE_NAME: &str = "pupil-track.toml";
const DEFAULT_DATA_OUTPUT: &str = "pupil-track.txt";
const DEFAULT_VIDEO_OUTPUT: &str = "pupil-track.avi";

#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    InvalidValue {
        path: Option<PathBuf>,
        field: &'static str,
        value: String,
    },
    NotFound {
        path: PathBuf,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io { path, source } => {
                write!(
                    f,
                    "failed to read config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::Parse { path, source } => {
                write!(
                    f,
                    "failed to parse config file {}: {}",
                    path.display(),
                    source
                )
            }
            ConfigError::InvalidValue { path, field, value } => {
                if let Some(path) = path {
                    write!(
                        f,
                        "invalid value '{}' for '{}' in {}",
                        value,
                        field,
                        path.display()
                    )
                } else {
                    write!(f, "invalid value '{}' for '{}'", value, field)
                }
            }
            ConfigError::NotFound { path } => {
                write!(f, "config file {} does not exist", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Io { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::InvalidValue { .. } => None,
            ConfigError::NotFound { .. } => None,
        }
    }
}

pub fn resolve_settings(
    cli: &CliArgs,
    sources: &CliSources,
) -> Result<EffectiveSettings, ConfigError> {
    let (file, config_path) = load_config(cli.config.as_deref())?;
    merge(cli, sources, file, config_path)
}

fn load_config(path_override: Option<&Path>) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    if let Some(path) = path_override {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        return read_config(path.to_path_buf());
    }

    let candidates = [project_config_path(), default_config_path()];
    for path in candidates.into_iter().flatten() {
        if path.exists() {
            return read_config(path);
        }
    }
    Ok((FileConfig::default(), None))
}

fn read_config(path: PathBuf) -> Result<(FileConfig, Option<PathBuf>), ConfigError> {
    let contents = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
        path: path.clone(),
        source,
    })?;
    let config = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
        path: path.clone(),
        source,
    })?;
    Ok((config, Some(path)))
}

fn merge(
    cli: &CliArgs,
    sources: &CliSources,
    file: FileConfig,
    config_path: Option<PathBuf>,
) -> Result<EffectiveSettings, ConfigError> {
    let config_dir = config_path
        .as_ref()
        .and_then(|path| path.parent().map(|dir| dir.to_path_buf()));

    let FileConfig {
        backend: file_backend,
        input: file_input,
        fps: file_fps,
        realtime: file_realtime,
        tracking: file_tracking,
        output: file_output,
    } = file;
    let file_output = file_output.unwrap_or_default();

    let mut backend = normalize_string(cli.backend.clone());
    if backend.is_none() {
        backend = normalize_string(file_backend);
    }

    let input = match cli.input.clone() {
        Some(path) => Some(expand_pathbuf(path)),
        None => normalize_string(file_input)
            .and_then(|value| resolve_path_from_config(value, config_dir.as_deref())),
    };

    let fps = match normalize_string(cli.fps.clone()) {
        Some(value) => Some(parse_fps(&value).map_err(|_| ConfigError::InvalidValue {
            path: None,
            field: "fps",
            value,
        })?),
        None => match file_fps {
            Some(value) if !value.is_finite() || value <= 0.0 => {
                return Err(ConfigError::InvalidValue {
                    path: config_path,
                    field: "fps",
                    value: value.to_string(),
                });
            }
            other => other,
        },
    };

    let realtime = if sources.realtime_from_cli {
        cli.realtime
    } else {
        file_realtime.unwrap_or(false)
    };

    let mut options = file_tracking.unwrap_or_default();
    if let Err(err) = options.validate() {
        return Err(invalid_option(err, config_path));
    }
    if let Some(value) = cli.pupil_threshold {
        options.pupil_threshold = value;
    }
    if let Some(value) = cli.reflection_threshold {
        options.reflection_threshold = value;
    }
    if let Some(value) = cli.display_width {
        options.display_width = value;
    }
    if let Some(value) = cli.smoothing_window {
        options.smoothing_window = value;
        options.smoothing_min_valid = options.smoothing_min_valid.min(value.max(1));
    }
    if sources.verbose_overlay_from_cli {
        options.verbose_overlay = cli.verbose_overlay;
    }
    if sources.pip_from_cli {
        options.picture_in_picture = cli.pip;
    }
    if sources.no_plot_from_cli && cli.no_plot {
        options.plot_enabled = false;
    }
    if let Err(err) = options.validate() {
        return Err(invalid_option(err, None));
    }

    let mut dump_format = cli.dump_format;
    if !sources.dump_format_from_cli {
        if let Some(format_str) = normalize_string(file_output.frames_format.clone()) {
            dump_format = parse_dump_format(&format_str, config_path.as_ref())?;
        }
    }

    let from_file = |value: Option<String>| {
        normalize_string(value).and_then(|value| resolve_path_from_config(value, config_dir.as_deref()))
    };

    let frames_dir = cli
        .dump_dir
        .clone()
        .map(expand_pathbuf)
        .or_else(|| from_file(file_output.frames_dir.clone()));
    let frame_dump = frames_dir.map(|dir| FrameDumpSettings {
        dir,
        format: dump_format,
    });

    let mut video_output = cli
        .record
        .clone()
        .map(expand_pathbuf)
        .or_else(|| from_file(file_output.video.clone()));
    if options.record_video && video_output.is_none() && frame_dump.is_none() {
        video_output = Some(default_output_path(DEFAULT_VIDEO_OUTPUT, config_dir.as_deref()));
    }

    let json_output = cli
        .json
        .clone()
        .map(expand_pathbuf)
        .or_else(|| from_file(file_output.json.clone()));
    let mut data_output = cli
        .output
        .clone()
        .map(expand_pathbuf)
        .or_else(|| from_file(file_output.data.clone()));
    if options.dump_data && data_output.is_none() && json_output.is_none() {
        data_output = Some(default_output_path(DEFAULT_DATA_OUTPUT, config_dir.as_deref()));
    }

    options.record_video = video_output.is_some() || frame_dump.is_some();
    options.dump_data = data_output.is_some() || json_output.is_some();

    Ok(EffectiveSettings {
        backend,
        input,
        fps,
        realtime,
        options,
        data_output,
        json_output,
        video_output,
        frame_dump,
        config_dir,
    })
}

fn invalid_option(err: OptionsError, path: Option<PathBuf>) -> ConfigError {
    match err {
        OptionsError::OutOfRange { field, value, .. } => {
            ConfigError::InvalidValue { path, field, value }
        }
    }
}

fn default_output_path(name: &str, config_dir: Option<&Path>) -> PathBuf {
    resolve_path_from_config(name.to_string(), config_dir).unwrap_or_else(|| PathBuf::from(name))
}

fn default_config_path() -> Option<PathBuf> {
    ProjectDirs::from("rs", "pupil-track", "pupil-track")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}

fn project_config_path() -> Option<PathBuf> {
    env::current_dir().ok().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_string(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

fn expand_pathbuf(path: PathBuf) -> PathBuf {
    match path.to_str() {
        Some(s) => expand_home_path(s),
        None => path,
    }
}

fn resolve_path_from_config(value: String, base: Option<&Path>) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    let expanded = expand_home_path(trimmed);
    match base {
        Some(base) if !expanded.is_absolute() => Some(base.join(expanded)),
        _ => Some(expanded),
    }
}

fn expand_home_path(value: &str) -> PathBuf {
    if value == "~" {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().to_path_buf();
        }
    } else if let Some(stripped) = value.strip_prefix("~/") {
        if let Some(base) = BaseDirs::new() {
            return base.home_dir().join(stripped);
        }
    }
    PathBuf::from(value)
}

fn parse_dump_format(value: &str, path: Option<&PathBuf>) -> Result<DumpFormat, ConfigError> {
    DumpFormat::from_str(value, true).map_err(|_| ConfigError::InvalidValue {
        path: path.cloned(),
        field: "frames_format",
        value: value.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, FromArgMatches};

    use super::*;

    fn cli(args: &[&str]) -> (CliArgs, CliSources) {
        let matches = CliArgs::command().try_get_matches_from(args).unwrap();
        let cli = CliArgs::from_arg_matches(&matches).unwrap();
        let sources = CliSources {
            dump_format_from_cli: args.contains(&"--dump-format"),
            verbose_overlay_from_cli: args.contains(&"--verbose-overlay"),
            pip_from_cli: args.contains(&"--pip"),
            no_plot_from_cli: args.contains(&"--no-plot"),
            realtime_from_cli: args.contains(&"--realtime"),
        };
        (cli, sources)
    }

    fn file(text: &str) -> FileConfig {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn defaults_without_config() {
        let (args, sources) = cli(&["pupil-track"]);
        let settings = merge(&args, &sources, FileConfig::default(), None).unwrap();
        assert_eq!(settings.options, TrackingOptions::default());
        assert!(settings.data_output.is_none());
        assert!(settings.frame_dump.is_none());
        assert!(!settings.realtime);
    }

    #[test]
    fn command_line_overrides_file() {
        let config = file(
            r#"
            backend = "images"
            fps = 30.0

            [tracking]
            pupil_threshold = 60
            reflection_threshold = 230
            picture_in_picture = true
            "#,
        );
        let (args, sources) = cli(&["pupil-track", "--pupil-threshold", "20", "-b", "synthetic"]);
        let settings = merge(&args, &sources, config, None).unwrap();
        assert_eq!(settings.backend.as_deref(), Some("synthetic"));
        assert_eq!(settings.fps, Some(30.0));
        assert_eq!(settings.options.pupil_threshold, 20);
        assert_eq!(settings.options.reflection_threshold, 230);
        assert!(settings.options.picture_in_picture);
    }

    #[test]
    fn relative_outputs_resolve_against_config_dir() {
        let config = file(
            r#"
            [output]
            data = "runs/eye.txt"
            frames_dir = "/tmp/frames"
            frames_format = "PNG"
            "#,
        );
        let (args, sources) = cli(&["pupil-track"]);
        let settings = merge(
            &args,
            &sources,
            config,
            Some(PathBuf::from("/etc/pupil/config.toml")),
        )
        .unwrap();
        assert_eq!(settings.data_output, Some(PathBuf::from("/etc/pupil/runs/eye.txt")));
        let dump = settings.frame_dump.unwrap();
        assert_eq!(dump.dir, PathBuf::from("/tmp/frames"));
        assert_eq!(dump.format, DumpFormat::Png);
        assert!(settings.options.dump_data);
        assert!(settings.options.record_video);
    }

    #[test]
    fn enabled_flags_without_paths_use_default_outputs() {
        let config = file(
            r#"
            [tracking]
            record_video = true
            dump_data = true
            "#,
        );
        let (args, sources) = cli(&["pupil-track"]);
        let settings = merge(&args, &sources, config, None).unwrap();
        assert_eq!(settings.video_output, Some(PathBuf::from(DEFAULT_VIDEO_OUTPUT)));
        assert_eq!(settings.data_output, Some(PathBuf::from(DEFAULT_DATA_OUTPUT)));
    }

    #[test]
    fn out_of_range_file_values_are_rejected() {
        let config = file(
            r#"
            [tracking]
            reflection_threshold = 120
            "#,
        );
        let (args, sources) = cli(&["pupil-track"]);
        let err = merge(&args, &sources, config, Some(PathBuf::from("cfg.toml"))).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "reflection_threshold",
                ..
            }
        ));

        let (args, sources) = cli(&["pupil-track", "--fps", "fast"]);
        let err = merge(&args, &sources, FileConfig::default(), None).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { field: "fps", .. }));
    }

    #[test]
    fn missing_override_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            load_config(Some(&path)),
            Err(ConfigError::NotFound { .. })
        ));
    }
}
