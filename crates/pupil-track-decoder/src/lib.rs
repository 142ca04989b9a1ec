pub mod backends;
pub mod config;
pub mod core;

pub use backends::synthetic::{SyntheticScene, SyntheticSource};
pub use config::{Backend, Configuration};
pub use core::{
    DynFrameSource, Frame, FrameError, FrameResult, FrameSource, NextFrame, VideoMetadata,
};
