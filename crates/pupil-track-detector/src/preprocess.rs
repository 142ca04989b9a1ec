use pupil_track_types::{Frame, PixelRect, Roi};

// Fixed-point BT.601 luma weights, scaled by 2^14.
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;
// Separable 5x5 binomial kernel; weights sum to 16 per axis.
const BLUR_KERNEL: [u32; 5] = [1, 4, 6, 4, 1];

/// Single-channel 8-bit image.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntensityImage {
    width: usize,
    height: usize,
    data: Vec<u8>,
}

impl IntensityImage {
    #[cfg(test)]
    pub(crate) fn new(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
        if data.len() != width * height {
            return None;
        }
        Some(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }
}

/// Output of [`preprocess`]: the blurred intensity crop and its origin in
/// the full frame.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    pub image: IntensityImage,
    pub offset: (i32, i32),
}

/// Crops `frame` to `roi` (or keeps the whole frame), converts it to
/// intensity and applies a 5x5 Gaussian blur.
///
/// A ROI that misses the frame entirely yields an empty image.
pub fn preprocess(frame: &Frame, roi: Option<Roi>) -> Preprocessed {
    let rect = match roi {
        Some(roi) => match roi.clip_to(frame.width(), frame.height()) {
            Some(rect) => rect,
            None => {
                return Preprocessed {
                    image: IntensityImage::default(),
                    offset: (roi.x0.max(0), roi.y0.max(0)),
                };
            }
        },
        None => PixelRect::full(frame.width(), frame.height()),
    };

    let gray = to_intensity(frame, rect);
    let blurred = gaussian_blur_5x5(&gray, rect.width, rect.height);
    Preprocessed {
        image: IntensityImage {
            width: rect.width,
            height: rect.height,
            data: blurred,
        },
        offset: (rect.x as i32, rect.y as i32),
    }
}

fn to_intensity(frame: &Frame, rect: PixelRect) -> Vec<u8> {
    let mut gray = Vec::with_capacity(rect.width * rect.height);
    for y in rect.y..rect.y + rect.height {
        let row = frame.row(y as u32);
        let span = &row[rect.x * Frame::CHANNELS..(rect.x + rect.width) * Frame::CHANNELS];
        for px in span.chunks_exact(Frame::CHANNELS) {
            let luma = px[0] as u32 * LUMA_R
                + px[1] as u32 * LUMA_G
                + px[2] as u32 * LUMA_B
                + (1 << (LUMA_SHIFT - 1));
            gray.push((luma >> LUMA_SHIFT) as u8);
        }
    }
    gray
}

pub(crate) fn gaussian_blur_5x5(src: &[u8], width: usize, height: usize) -> Vec<u8> {
    if width == 0 || height == 0 {
        return Vec::new();
    }

    let mut horizontal = vec![0u16; width * height];
    for y in 0..height {
        let row = &src[y * width..(y + 1) * width];
        let out = &mut horizontal[y * width..(y + 1) * width];
        for (x, slot) in out.iter_mut().enumerate() {
            let mut acc = 0u32;
            for (k, weight) in BLUR_KERNEL.iter().enumerate() {
                let xi = reflect101(x as isize + k as isize - 2, width);
                acc += row[xi] as u32 * weight;
            }
            *slot = acc as u16;
        }
    }

    let mut dst = vec![0u8; width * height];
    for y in 0..height {
        for x in 0..width {
            let mut acc = 0u32;
            for (k, weight) in BLUR_KERNEL.iter().enumerate() {
                let yi = reflect101(y as isize + k as isize - 2, height);
                acc += horizontal[yi * width + x] as u32 * weight;
            }
            dst[y * width + x] = ((acc + 128) >> 8) as u8;
        }
    }
    dst
}

/// Border index mapping `gfedcb|abcdefgh|gfedcba`.
fn reflect101(mut idx: isize, len: usize) -> usize {
    let n = len as isize;
    if n == 1 {
        return 0;
    }
    loop {
        if idx < 0 {
            idx = -idx;
        } else if idx >= n {
            idx = 2 * n - 2 - idx;
        } else {
            return idx as usize;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: [u8; 3]) -> Frame {
        let data = rgb.repeat((width * height) as usize);
        Frame::from_rgb(width, height, data).unwrap()
    }

    #[test]
    fn reflect101_mirrors_without_repeating_edge() {
        assert_eq!(reflect101(-1, 5), 1);
        assert_eq!(reflect101(-2, 5), 2);
        assert_eq!(reflect101(5, 5), 3);
        assert_eq!(reflect101(6, 5), 2);
        assert_eq!(reflect101(3, 2), 1);
        assert_eq!(reflect101(-2, 1), 0);
    }

    #[test]
    fn uniform_frame_is_unchanged_by_blur() {
        let frame = solid_frame(9, 7, [90, 90, 90]);
        let out = preprocess(&frame, None);
        assert_eq!(out.offset, (0, 0));
        assert_eq!(out.image.width(), 9);
        assert!(out.image.data().iter().all(|&v| v == 90));
    }

    #[test]
    fn luma_uses_bt601_weights() {
        let frame = solid_frame(3, 3, [255, 0, 0]);
        let out = preprocess(&frame, None);
        assert_eq!(out.image.get(1, 1), 76);
    }

    #[test]
    fn roi_crop_reports_origin_and_clips_overhang() {
        let frame = solid_frame(20, 10, [10, 10, 10]);
        let roi = Roi::new(15, 4, 40, 30).unwrap();
        let out = preprocess(&frame, Some(roi));
        assert_eq!(out.offset, (15, 4));
        assert_eq!(out.image.width(), 5);
        assert_eq!(out.image.height(), 6);
    }

    #[test]
    fn roi_outside_frame_yields_empty_image() {
        let frame = solid_frame(20, 10, [10, 10, 10]);
        let roi = Roi::new(30, 0, 40, 5).unwrap();
        let out = preprocess(&frame, Some(roi));
        assert!(out.image.is_empty());
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut src = vec![0u8; 25];
        src[12] = 255;
        let out = gaussian_blur_5x5(&src, 5, 5);
        // Center weight is 36/256 of the impulse.
        assert_eq!(out[12], 36);
        // The corner sees the impulse twice through the mirrored border.
        assert_eq!(out[0], 4);
    }
}
