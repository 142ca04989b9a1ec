pub mod synthetic;

#[cfg(feature = "backend-image-sequence")]
pub mod image_sequence;
