use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::backends::synthetic::SyntheticScene;
use crate::core::{DynFrameSource, FrameError, FrameResult};

#[cfg(feature = "backend-image-sequence")]
const DEFAULT_FPS: f64 = 60.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Synthetic,
    ImageSequence,
}

impl FromStr for Backend {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "synthetic" | "mock" => Ok(Backend::Synthetic),
            "image-sequence" | "images" => Ok(Backend::ImageSequence),
            other => Err(FrameError::configuration(format!(
                "unknown backend '{other}'"
            ))),
        }
    }
}

impl Backend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Backend::Synthetic => "synthetic",
            Backend::ImageSequence => "image-sequence",
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn compiled_backends() -> Vec<Backend> {
    let mut backends = Vec::new();
    #[cfg(feature = "backend-image-sequence")]
    {
        backends.push(Backend::ImageSequence);
    }
    backends.push(Backend::Synthetic);
    backends
}

#[derive(Debug, Clone)]
pub struct Configuration {
    pub backend: Backend,
    pub input: Option<PathBuf>,
    pub fps: Option<f64>,
    pub scene: SyntheticScene,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            backend: Backend::Synthetic,
            input: None,
            fps: None,
            scene: SyntheticScene::default(),
        }
    }
}

impl Configuration {
    pub fn from_env() -> FrameResult<Self> {
        let mut config = Configuration::default();
        if let Ok(backend) = env::var("PUPIL_TRACK_BACKEND") {
            config.backend = Backend::from_str(&backend)?;
        }
        if let Ok(path) = env::var("PUPIL_TRACK_INPUT") {
            config.input = Some(PathBuf::from(path));
            if env::var("PUPIL_TRACK_BACKEND").is_err() {
                config.backend = Backend::ImageSequence;
            }
        }
        if let Ok(fps) = env::var("PUPIL_TRACK_FPS") {
            config.fps = Some(parse_fps(&fps)?);
        }
        Ok(config)
    }

    pub fn available_backends() -> Vec<Backend> {
        compiled_backends()
    }

    pub fn create_source(&self) -> FrameResult<DynFrameSource> {
        match self.backend {
            Backend::Synthetic => {
                let mut scene = self.scene.clone();
                if let Some(fps) = self.fps {
                    scene.fps = fps;
                }
                crate::backends::synthetic::boxed_synthetic(scene)
            }
            Backend::ImageSequence => {
                #[cfg(feature = "backend-image-sequence")]
                {
                    let dir = self.input.clone().ok_or_else(|| {
                        FrameError::configuration(
                            "image-sequence backend requires an input directory",
                        )
                    })?;
                    crate::backends::image_sequence::boxed_image_sequence(
                        dir,
                        self.fps.unwrap_or(DEFAULT_FPS),
                    )
                }
                #[cfg(not(feature = "backend-image-sequence"))]
                {
                    Err(FrameError::unsupported("image-sequence"))
                }
            }
        }
    }
}

pub fn parse_fps(value: &str) -> FrameResult<f64> {
    match value.trim().parse::<f64>() {
        Ok(fps) if fps.is_finite() && fps > 0.0 => Ok(fps),
        _ => Err(FrameError::configuration(format!(
            "failed to parse fps '{value}' as a positive number"
        ))),
    }
}
