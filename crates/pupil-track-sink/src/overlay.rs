//! Annotation drawing on display frames.
//!
//! Coordinates are display pixels. Everything drawn is clipped to the canvas,
//! so callers can pass shapes that hang over the frame edge.

use image::imageops::{self, FilterType};
use image::{ImageBuffer, RgbImage};
use pupil_track_types::{Frame, FrameResult, Point, Roi};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub [u8; 3]);

impl Rgb {
    pub const WHITE: Rgb = Rgb([255, 255, 255]);
    pub const BLACK: Rgb = Rgb([0, 0, 0]);
    pub const OUTLINE: Rgb = Rgb([0, 255, 100]);
    pub const CONTOUR: Rgb = Rgb([255, 0, 0]);
}

/// Packed RGB8 drawing surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Canvas {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Canvas {
    pub fn from_frame(frame: &Frame) -> Self {
        Self {
            width: frame.width(),
            height: frame.height(),
            data: frame.packed_rgb(),
        }
    }

    /// Bilinear resize of `frame` to `width`x`height`.
    pub fn resized_from(frame: &Frame, width: u32, height: u32) -> Self {
        if frame.width() == width && frame.height() == height {
            return Self::from_frame(frame);
        }
        let source: Option<RgbImage> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.packed_rgb());
        let Some(source) = source else {
            return Self::filled(width, height, Rgb::BLACK);
        };
        let resized = imageops::resize(&source, width, height, FilterType::Triangle);
        Self {
            width,
            height,
            data: resized.into_raw(),
        }
    }

    pub fn filled(width: u32, height: u32, color: Rgb) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize * 3);
        for _ in 0..width as usize * height as usize {
            data.extend_from_slice(&color.0);
        }
        Self {
            width,
            height,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_frame(self, frame_index: Option<u64>) -> FrameResult<Frame> {
        Ok(Frame::from_rgb(self.width, self.height, self.data)?.with_frame_index(frame_index))
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some((y as usize * self.width as usize + x as usize) * 3)
    }

    pub fn get(&self, x: i32, y: i32) -> Option<Rgb> {
        self.index(x, y)
            .map(|i| Rgb([self.data[i], self.data[i + 1], self.data[i + 2]]))
    }

    pub fn put(&mut self, x: i32, y: i32, color: Rgb) {
        if let Some(i) = self.index(x, y) {
            self.data[i..i + 3].copy_from_slice(&color.0);
        }
    }

    /// Bresenham line including both end points.
    pub fn line(&mut self, from: Point, to: Point, color: Rgb) {
        let (mut x, mut y) = (from.x, from.y);
        let dx = (to.x - x).abs();
        let dy = -(to.y - y).abs();
        let sx = if x < to.x { 1 } else { -1 };
        let sy = if y < to.y { 1 } else { -1 };
        let mut err = dx + dy;
        loop {
            self.put(x, y, color);
            if x == to.x && y == to.y {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    pub fn crosshair(&mut self, center: Point, arm: i32, color: Rgb) {
        self.line(center.offset(-arm, 0), center.offset(arm, 0), color);
        self.line(center.offset(0, -arm), center.offset(0, arm), color);
    }

    /// One pixel outline through both corners of `roi`.
    pub fn rect(&mut self, roi: Roi, color: Rgb) {
        let corners = [
            Point::new(roi.x0, roi.y0),
            Point::new(roi.x1, roi.y0),
            Point::new(roi.x1, roi.y1),
            Point::new(roi.x0, roi.y1),
        ];
        self.polygon(&corners, color);
    }

    pub fn polygon(&mut self, points: &[Point], color: Rgb) {
        for (i, &p) in points.iter().enumerate() {
            let q = points[(i + 1) % points.len()];
            self.line(p, q, color);
        }
    }

    /// Outline of an ellipse with full axis lengths `size`, the first axis
    /// pointing along `angle` degrees.
    pub fn ellipse(&mut self, center: (f64, f64), size: (f64, f64), angle: f64, color: Rgb) {
        const SEGMENTS: usize = 72;
        let (sin, cos) = angle.to_radians().sin_cos();
        let (a, b) = (size.0 / 2.0, size.1 / 2.0);
        let points: Vec<Point> = (0..SEGMENTS)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / SEGMENTS as f64;
                let (u, v) = (a * t.cos(), b * t.sin());
                Point::new(
                    (center.0 + u * cos - v * sin).round() as i32,
                    (center.1 + u * sin + v * cos).round() as i32,
                )
            })
            .collect();
        self.polygon(&points, color);
    }

    /// Outline of a rotated rectangle, `size.0` measured along `angle` degrees.
    pub fn rotated_box(&mut self, center: (f64, f64), size: (f64, f64), angle: f64, color: Rgb) {
        let (sin, cos) = angle.to_radians().sin_cos();
        let (hw, hh) = (size.0 / 2.0, size.1 / 2.0);
        let corners: Vec<Point> = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)]
            .into_iter()
            .map(|(u, v)| {
                Point::new(
                    (center.0 + u * cos - v * sin).round() as i32,
                    (center.1 + u * sin + v * cos).round() as i32,
                )
            })
            .collect();
        self.polygon(&corners, color);
    }

    /// Copies the part of the canvas under `roi` into the top-right corner.
    /// Returns false when the region lies entirely off canvas.
    pub fn picture_in_picture(&mut self, roi: Roi) -> bool {
        let Some(rect) = roi.clip_to(self.width, self.height) else {
            return false;
        };
        let row_bytes = rect.width * 3;
        let dest_x = self.width as usize - rect.width;
        let stride = self.width as usize * 3;
        let patch: Vec<u8> = (0..rect.height)
            .flat_map(|row| {
                let start = (rect.y + row) * stride + rect.x * 3;
                self.data[start..start + row_bytes].iter().copied()
            })
            .collect();
        for (row, chunk) in patch.chunks_exact(row_bytes).enumerate() {
            let start = row * stride + dest_x * 3;
            self.data[start..start + row_bytes].copy_from_slice(chunk);
        }
        true
    }

    /// Weighted blend with a single-channel plane sampled nearest-neighbor
    /// to the canvas size: `out = gray * gray_weight + pixel * frame_weight`.
    pub fn blend_gray(
        &mut self,
        gray: &[u8],
        gray_width: usize,
        gray_height: usize,
        gray_weight: f64,
        frame_weight: f64,
    ) {
        if gray_width == 0 || gray_height == 0 || gray.len() < gray_width * gray_height {
            return;
        }
        let (width, height) = (self.width as usize, self.height as usize);
        for y in 0..height {
            let gy = y * gray_height / height;
            for x in 0..width {
                let gx = x * gray_width / width;
                let g = f64::from(gray[gy * gray_width + gx]) * gray_weight;
                let i = (y * width + x) * 3;
                for value in &mut self.data[i..i + 3] {
                    let blended = g + f64::from(*value) * frame_weight;
                    *value = blended.round().clamp(0.0, 255.0) as u8;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crosshair_is_clipped_at_edges() {
        let mut canvas = Canvas::filled(5, 5, Rgb::BLACK);
        canvas.crosshair(Point::new(0, 0), 2, Rgb::WHITE);
        assert_eq!(canvas.get(0, 0), Some(Rgb::WHITE));
        assert_eq!(canvas.get(2, 0), Some(Rgb::WHITE));
        assert_eq!(canvas.get(0, 2), Some(Rgb::WHITE));
        assert_eq!(canvas.get(1, 1), Some(Rgb::BLACK));
        assert_eq!(canvas.get(3, 0), Some(Rgb::BLACK));
    }

    #[test]
    fn rect_outline_leaves_interior() {
        let mut canvas = Canvas::filled(10, 10, Rgb::BLACK);
        canvas.rect(Roi::new(2, 2, 6, 6).unwrap(), Rgb::WHITE);
        for i in 2..=6 {
            assert_eq!(canvas.get(i, 2), Some(Rgb::WHITE));
            assert_eq!(canvas.get(6, i), Some(Rgb::WHITE));
        }
        assert_eq!(canvas.get(4, 4), Some(Rgb::BLACK));
    }

    #[test]
    fn picture_in_picture_copies_to_top_right() {
        let mut canvas = Canvas::filled(8, 6, Rgb::BLACK);
        canvas.put(1, 4, Rgb::WHITE);
        assert!(canvas.picture_in_picture(Roi::new(0, 3, 2, 5).unwrap()));
        // patch is 2x2, pasted at x 6..8, y 0..2
        assert_eq!(canvas.get(7, 1), Some(Rgb::WHITE));
        assert_eq!(canvas.get(6, 0), Some(Rgb::BLACK));
        assert!(!canvas.picture_in_picture(Roi::new(20, 20, 30, 30).unwrap()));
    }

    #[test]
    fn blend_weights_mask_and_frame() {
        let mut canvas = Canvas::filled(2, 1, Rgb([100, 100, 100]));
        canvas.blend_gray(&[255, 0], 2, 1, 0.4, 0.6);
        assert_eq!(canvas.get(0, 0), Some(Rgb([162, 162, 162])));
        assert_eq!(canvas.get(1, 0), Some(Rgb([60, 60, 60])));
    }

    #[test]
    fn resize_keeps_solid_color() {
        let frame = Frame::from_rgb(8, 4, vec![77; 8 * 4 * 3]).unwrap();
        let canvas = Canvas::resized_from(&frame, 4, 2);
        assert_eq!((canvas.width(), canvas.height()), (4, 2));
        assert!(canvas.data().iter().all(|&v| v == 77));
    }

    #[test]
    fn ellipse_outline_touches_axis_ends() {
        let mut canvas = Canvas::filled(40, 40, Rgb::BLACK);
        canvas.ellipse((20.0, 20.0), (10.0, 20.0), 0.0, Rgb::OUTLINE);
        assert_eq!(canvas.get(25, 20), Some(Rgb::OUTLINE));
        assert_eq!(canvas.get(20, 30), Some(Rgb::OUTLINE));
        assert_eq!(canvas.get(20, 20), Some(Rgb::BLACK));
    }
}
