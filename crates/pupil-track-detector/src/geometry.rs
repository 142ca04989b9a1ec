use pupil_track_types::Point;

use crate::conic::Ellipse;

/// `perimeter² / (4π·area)`: 1.0 for a circle, larger when elongated.
pub fn circularity(perimeter: f64, area: f64) -> f64 {
    perimeter * perimeter / (4.0 * std::f64::consts::PI * area)
}

/// Maps a raw fitted angle in degrees onto the tracker's half-turn
/// convention: values above 90 lose 90, everything else gains 90.
///
/// `canonical_angle(90.0) == 180.0`.
pub fn canonical_angle(raw: f64) -> f64 {
    if raw > 90.0 { raw - 90.0 } else { raw + 90.0 }
}

/// Rectangle of `size.0` along `angle` (degrees) and `size.1` across it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
}

impl RotatedRect {
    /// `height / width`; zero-width rectangles report infinity.
    pub fn squareness(&self) -> f64 {
        if self.size.0 <= 0.0 {
            return f64::INFINITY;
        }
        self.size.1 / self.size.0
    }
}

/// Smallest enclosing rectangle of a convex polygon (rotating calipers:
/// one side of the optimum is collinear with a hull edge).
pub fn min_area_rect(hull: &[Point]) -> RotatedRect {
    match hull {
        [] => RotatedRect {
            center: (0.0, 0.0),
            size: (0.0, 0.0),
            angle: 0.0,
        },
        [p] => RotatedRect {
            center: (p.x as f64, p.y as f64),
            size: (0.0, 0.0),
            angle: 0.0,
        },
        _ => {
            let mut best: Option<(f64, RotatedRect)> = None;
            for (i, a) in hull.iter().enumerate() {
                let b = hull[(i + 1) % hull.len()];
                let (ex, ey) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
                let len = ex.hypot(ey);
                if len == 0.0 {
                    continue;
                }
                let (ux, uy) = (ex / len, ey / len);
                let (vx, vy) = (-uy, ux);

                let mut min_u = f64::MAX;
                let mut max_u = f64::MIN;
                let mut min_v = f64::MAX;
                let mut max_v = f64::MIN;
                for p in hull {
                    let (px, py) = (p.x as f64, p.y as f64);
                    let u = px * ux + py * uy;
                    let v = px * vx + py * vy;
                    min_u = min_u.min(u);
                    max_u = max_u.max(u);
                    min_v = min_v.min(v);
                    max_v = max_v.max(v);
                }
                let width = max_u - min_u;
                let height = max_v - min_v;
                let area = width * height;
                if best.as_ref().is_some_and(|(best_area, _)| *best_area <= area) {
                    continue;
                }
                let mid_u = (min_u + max_u) / 2.0;
                let mid_v = (min_v + max_v) / 2.0;
                best = Some((
                    area,
                    RotatedRect {
                        center: (mid_u * ux + mid_v * vx, mid_u * uy + mid_v * vy),
                        size: (width, height),
                        angle: uy.atan2(ux).to_degrees(),
                    },
                ));
            }
            best.map(|(_, rect)| rect).unwrap_or(RotatedRect {
                center: (hull[0].x as f64, hull[0].y as f64),
                size: (0.0, 0.0),
                angle: 0.0,
            })
        }
    }
}

/// Ellipse as a rotated box: `size` holds full axis lengths with the minor
/// axis first, `angle` is the minor axis direction in `[0, 180)` degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EllipseBox {
    pub center: (f64, f64),
    pub size: (f64, f64),
    pub angle: f64,
}

impl From<Ellipse> for EllipseBox {
    fn from(ellipse: Ellipse) -> Self {
        let major_deg = ellipse.angle.to_degrees();
        Self {
            center: (ellipse.cx, ellipse.cy),
            size: (2.0 * ellipse.b, 2.0 * ellipse.a),
            angle: (major_deg + 90.0).rem_euclid(180.0),
        }
    }
}
