use crate::preprocess::IntensityImage;

/// Binary mask with one byte per pixel (0 or 1).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl Mask {
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    pub fn population(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }

    pub fn invert(&mut self) {
        for value in &mut self.data {
            *value ^= 1;
        }
    }
}

/// Reusable line buffers for the separable passes.
#[derive(Default)]
pub(crate) struct MorphScratch {
    padded: Vec<u8>,
    prefix: Vec<u8>,
    suffix: Vec<u8>,
    out: Vec<u8>,
    column: Vec<u8>,
}

impl MorphScratch {
    fn ensure_capacity(&mut self, len: usize) {
        if self.padded.len() < len {
            self.padded.resize(len, 0);
            self.prefix.resize(len, 0);
            self.suffix.resize(len, 0);
            self.out.resize(len, 0);
            self.column.resize(len, 0);
        }
    }
}

/// Marks pixels strictly brighter than `threshold`.
pub fn threshold_bright(image: &IntensityImage, threshold: u8, mask: &mut Mask) {
    mask.width = image.width();
    mask.height = image.height();
    mask.data.clear();
    mask.data
        .extend(image.data().iter().map(|&value| u8::from(value > threshold)));
}

/// Morphological closing with a 3x3 square applied `iterations` times.
///
/// `n` iterations of a 3x3 dilation equal one dilation with a
/// `(2n+1)x(2n+1)` square, so each half of the closing is a single separable
/// pass. Pixels outside the mask never contribute.
pub(crate) fn close(mask: &mut Mask, iterations: usize, scratch: &mut MorphScratch) {
    if iterations == 0 || mask.width == 0 || mask.height == 0 {
        return;
    }
    morph_pass(mask, iterations, true, scratch);
    morph_pass(mask, iterations, false, scratch);
}

pub fn close_mask(mask: &mut Mask, iterations: usize) {
    let mut scratch = MorphScratch::default();
    close(mask, iterations, &mut scratch);
}

fn morph_pass(mask: &mut Mask, radius: usize, is_dilation: bool, scratch: &mut MorphScratch) {
    let width = mask.width;
    let height = mask.height;
    scratch.ensure_capacity(width.max(height) + 2 * radius);

    for row in mask.data.chunks_mut(width) {
        line_op(row, radius, is_dilation, scratch);
    }

    let mut column = std::mem::take(&mut scratch.column);
    for col in 0..width {
        for y in 0..height {
            column[y] = mask.data[y * width + col];
        }
        line_op(&mut column[..height], radius, is_dilation, scratch);
        for y in 0..height {
            mask.data[y * width + col] = column[y];
        }
    }
    scratch.column = column;
}

/// Centered running max/min over `2 * radius + 1` samples, in place.
fn line_op(line: &mut [u8], radius: usize, is_dilation: bool, scratch: &mut MorphScratch) {
    let len = line.len();
    let neutral = if is_dilation { 0 } else { 1 };
    let padded_len = len + 2 * radius;
    let padded = &mut scratch.padded[..padded_len];
    padded[..radius].fill(neutral);
    padded[radius..radius + len].copy_from_slice(line);
    padded[radius + len..].fill(neutral);

    vhgw_line_op(
        padded,
        &mut scratch.prefix[..padded_len],
        &mut scratch.suffix[..padded_len],
        2 * radius + 1,
        is_dilation,
        &mut scratch.out[..padded_len],
    );
    line.copy_from_slice(&scratch.out[..len]);
}

/// van Herk/Gil-Werman forward window: `dst[i]` combines `src[i..i + window]`.
fn vhgw_line_op(
    src: &[u8],
    prefix: &mut [u8],
    suffix: &mut [u8],
    window: usize,
    is_dilation: bool,
    dst: &mut [u8],
) {
    let window = window.max(1);
    let len = src.len();
    let combine = if is_dilation { u8::max } else { u8::min };

    for i in 0..len {
        prefix[i] = if i % window == 0 {
            src[i]
        } else {
            combine(prefix[i - 1], src[i])
        };
    }

    let Some(last) = len.checked_sub(1) else {
        return;
    };
    for idx in (0..len).rev() {
        suffix[idx] = if idx == last || (idx + 1) % window == 0 {
            src[idx]
        } else {
            combine(suffix[idx + 1], src[idx])
        };
    }

    for idx in 0..len {
        let end = (idx + window - 1).min(last);
        dst[idx] = combine(prefix[end], suffix[idx]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from_rows(rows: &[&str]) -> Mask {
        let width = rows[0].len();
        let data = rows
            .iter()
            .flat_map(|row| row.bytes().map(|b| u8::from(b == b'#')))
            .collect();
        Mask {
            width,
            height: rows.len(),
            data,
        }
    }

    fn brute_close(mask: &Mask, radius: usize) -> Mask {
        let pass = |src: &Mask, dilate: bool| {
            let mut out = src.clone();
            for y in 0..src.height {
                for x in 0..src.width {
                    let mut acc = if dilate { 0 } else { 1 };
                    for yy in y.saturating_sub(radius)..(y + radius + 1).min(src.height) {
                        for xx in x.saturating_sub(radius)..(x + radius + 1).min(src.width) {
                            let v = src.data[yy * src.width + xx];
                            acc = if dilate { acc.max(v) } else { acc.min(v) };
                        }
                    }
                    out.data[y * src.width + x] = acc;
                }
            }
            out
        };
        pass(&pass(mask, true), false)
    }

    #[test]
    fn threshold_is_strictly_greater() {
        let image = IntensityImage::new(3, 1, vec![44, 45, 46]).unwrap();
        let mut mask = Mask::default();
        threshold_bright(&image, 45, &mut mask);
        assert_eq!(mask.data, vec![0, 0, 1]);
    }

    #[test]
    fn closing_fills_small_gaps_but_keeps_borders() {
        let mut mask = mask_from_rows(&[
            "#########",
            "####.####",
            "#########",
            ".........",
            ".........",
        ]);
        close_mask(&mut mask, 1);
        assert!(mask.get(4, 1));
        assert!(mask.get(0, 0));
        assert!(!mask.get(0, 3));
        assert!(!mask.get(4, 4));
    }

    #[test]
    fn closing_matches_brute_force() {
        let rows = [
            "..#....#......",
            ".###..###...#.",
            "..#...........",
            "......##.##...",
            "#.....#...#..#",
            "##....####...#",
        ];
        for radius in 1..=3 {
            let original = mask_from_rows(&rows);
            let expected = brute_close(&original, radius);
            let mut actual = original.clone();
            close_mask(&mut actual, radius);
            assert_eq!(actual, expected, "radius {radius}");
        }
    }
}
