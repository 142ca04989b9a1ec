//! Direct least-squares ellipse fitting (Fitzgibbon et al., 1999) with a
//! second-moment fallback for degenerate point sets.

use nalgebra::{DMatrix, Matrix2, Matrix3, Vector3, Vector6};

/// Geometric ellipse: center, semi-axes (`a >= b`) and the major-axis angle
/// in radians, normalized to `[0, pi)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipse {
    pub cx: f64,
    pub cy: f64,
    pub a: f64,
    pub b: f64,
    pub angle: f64,
}

impl Ellipse {
    pub fn is_valid(&self) -> bool {
        self.a > 0.0
            && self.b > 0.0
            && self.a.is_finite()
            && self.b.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.angle.is_finite()
    }
}

/// Fits an ellipse to `points`, preferring the algebraic direct fit and
/// falling back to the ellipse with matching second moments.
pub fn fit_ellipse(points: &[[f64; 2]]) -> Option<Ellipse> {
    fit_ellipse_direct(points).or_else(|| ellipse_from_moments(points))
}

/// Requires at least 6 points. Returns `None` when the scatter matrix is
/// singular or the best conic is not an ellipse.
pub fn fit_ellipse_direct(points: &[[f64; 2]]) -> Option<Ellipse> {
    let n = points.len();
    if n < 6 {
        return None;
    }

    let (mean_x, mean_y, scale) = normalization_params(points);

    // Design matrix rows [x², xy, y², x, y, 1] in normalized coordinates.
    let mut d = DMatrix::<f64>::zeros(n, 6);
    for (i, &[px, py]) in points.iter().enumerate() {
        let x = (px - mean_x) * scale;
        let y = (py - mean_y) * scale;
        d[(i, 0)] = x * x;
        d[(i, 1)] = x * y;
        d[(i, 2)] = y * y;
        d[(i, 3)] = x;
        d[(i, 4)] = y;
        d[(i, 5)] = 1.0;
    }

    let s = d.transpose() * &d;
    let s11 = s.fixed_view::<3, 3>(0, 0).into_owned();
    let s12 = s.fixed_view::<3, 3>(0, 3).into_owned();
    let s22 = s.fixed_view::<3, 3>(3, 3).into_owned();

    // Ellipse constraint 4AC - B² > 0.
    let c1 = Matrix3::new(0.0, 0.0, 2.0, 0.0, -1.0, 0.0, 2.0, 0.0, 0.0);

    let s22_inv = s22.try_inverse()?;
    let m = s11 - s12 * s22_inv * s12.transpose();
    let system = c1.try_inverse()? * m;

    let a1 = constrained_eigenvector(&system)?;
    let a2 = -s22_inv * s12.transpose() * a1;

    let coeffs_norm = Vector6::new(a1[0], a1[1], a1[2], a2[0], a2[1], a2[2]);
    let coeffs = denormalize_conic(&coeffs_norm, mean_x, mean_y, scale);
    let ellipse = conic_to_ellipse(coeffs)?;
    ellipse.is_valid().then_some(ellipse)
}

/// Ellipse with the same area-weighted second moments as the polygon
/// through `points`.
pub fn ellipse_from_moments(points: &[[f64; 2]]) -> Option<Ellipse> {
    if points.len() < 3 {
        return None;
    }
    let mut area2 = 0.0;
    let mut cx = 0.0;
    let mut cy = 0.0;
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for (i, &[x0, y0]) in points.iter().enumerate() {
        let [x1, y1] = points[(i + 1) % points.len()];
        let cross = x0 * y1 - x1 * y0;
        area2 += cross;
        cx += (x0 + x1) * cross;
        cy += (y0 + y1) * cross;
        sxx += (x0 * x0 + x0 * x1 + x1 * x1) * cross;
        syy += (y0 * y0 + y0 * y1 + y1 * y1) * cross;
        sxy += (x0 * y1 + 2.0 * x0 * y0 + 2.0 * x1 * y1 + x1 * y0) * cross;
    }
    if area2.abs() < 1e-12 {
        return None;
    }
    let area = area2 / 2.0;
    let cx = cx / (3.0 * area2);
    let cy = cy / (3.0 * area2);
    // Central second moments per unit area.
    let mxx = sxx / (12.0 * area) - cx * cx;
    let myy = syy / (12.0 * area) - cy * cy;
    let mxy = sxy / (24.0 * area) - cx * cy;

    let cov = Matrix2::new(mxx, mxy, mxy, myy);
    let eig = cov.symmetric_eigen();
    let (major_idx, minor_idx) = if eig.eigenvalues[0] >= eig.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let major = eig.eigenvalues[major_idx];
    let minor = eig.eigenvalues[minor_idx];
    if major <= 0.0 || minor <= 0.0 {
        return None;
    }
    let axis = eig.eigenvectors.column(major_idx);
    let ellipse = Ellipse {
        cx,
        cy,
        // A uniform ellipse has variance a²/4 along its major axis.
        a: 2.0 * major.sqrt(),
        b: 2.0 * minor.sqrt(),
        angle: normalize_half_turn(axis[1].atan2(axis[0])),
    };
    ellipse.is_valid().then_some(ellipse)
}

/// Returns `(mean_x, mean_y, scale)` mapping the points to zero mean and a
/// mean distance of sqrt(2).
fn normalization_params(points: &[[f64; 2]]) -> (f64, f64, f64) {
    let n = points.len() as f64;
    let mean_x: f64 = points.iter().map(|p| p[0]).sum::<f64>() / n;
    let mean_y: f64 = points.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist: f64 = points
        .iter()
        .map(|p| ((p[0] - mean_x).powi(2) + (p[1] - mean_y).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let scale = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    (mean_x, mean_y, scale)
}

/// Undoes `x' = s(x - mx), y' = s(y - my)` on conic coefficients.
fn denormalize_conic(c: &Vector6<f64>, mx: f64, my: f64, s: f64) -> [f64; 6] {
    let [a_, b_, c_, d_, e_, f_] = [c[0], c[1], c[2], c[3], c[4], c[5]];
    let s2 = s * s;

    let a = a_ * s2;
    let b = b_ * s2;
    let c = c_ * s2;
    let d = -2.0 * a_ * s2 * mx - b_ * s2 * my + d_ * s;
    let e = -b_ * s2 * mx - 2.0 * c_ * s2 * my + e_ * s;
    let f =
        a_ * s2 * mx * mx + b_ * s2 * mx * my + c_ * s2 * my * my - d_ * s * mx - e_ * s * my + f_;

    [a, b, c, d, e, f]
}

fn conic_to_ellipse([a, b, c, d, e, f]: [f64; 6]) -> Option<Ellipse> {
    let denom = 4.0 * a * c - b * b;
    if denom <= 0.0 {
        return None;
    }

    let cx = (b * e - 2.0 * c * d) / denom;
    let cy = (b * d - 2.0 * a * e) / denom;

    // Direction of the eigenvector for the larger eigenvalue of the
    // quadratic part, i.e. the shorter axis.
    let angle = if (a - c).abs() < 1e-15 {
        if b > 0.0 {
            std::f64::consts::FRAC_PI_4
        } else if b < 0.0 {
            -std::f64::consts::FRAC_PI_4
        } else {
            0.0
        }
    } else {
        0.5 * b.atan2(a - c)
    };

    let sum = a + c;
    let diff = ((a - c).powi(2) + b * b).sqrt();
    let lambda1 = (sum + diff) / 2.0;
    let lambda2 = (sum - diff) / 2.0;

    let f_center = a * cx * cx + b * cx * cy + c * cy * cy + d * cx + e * cy + f;
    if f_center.abs() < 1e-15 {
        return None;
    }

    let a_sq = -f_center / lambda1;
    let b_sq = -f_center / lambda2;
    if a_sq <= 0.0 || b_sq <= 0.0 {
        return None;
    }
    let (semi_1, semi_2) = (a_sq.sqrt(), b_sq.sqrt());

    let (major, minor, angle) = if semi_1 >= semi_2 {
        (semi_1, semi_2, angle)
    } else {
        (semi_2, semi_1, angle + std::f64::consts::FRAC_PI_2)
    };

    Some(Ellipse {
        cx,
        cy,
        a: major,
        b: minor,
        angle: normalize_half_turn(angle),
    })
}

fn normalize_half_turn(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(std::f64::consts::PI);
    if wrapped >= std::f64::consts::PI {
        0.0
    } else {
        wrapped
    }
}

/// Eigenvector of the 3x3 reduced system satisfying `4 v0 v2 - v1² > 0`.
fn constrained_eigenvector(system: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let a = system;
    let tr = a.trace();
    let minor_sum = a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)] + a[(0, 0)] * a[(2, 2)]
        - a[(0, 2)] * a[(2, 0)]
        + a[(1, 1)] * a[(2, 2)]
        - a[(1, 2)] * a[(2, 1)];
    let det = a.determinant();

    let mut best = None;
    let mut best_ev = f64::MAX;
    for ev in solve_cubic_real(-tr, minor_sum, -det) {
        let shifted = system - Matrix3::identity() * ev;
        let Some(v) = null_vector_3x3(&shifted) else {
            continue;
        };
        let constraint = 4.0 * v[0] * v[2] - v[1] * v[1];
        if constraint > 0.0 && ev.abs() < best_ev {
            best_ev = ev.abs();
            best = Some(v);
        }
    }
    best
}

/// Null vector of a rank-2 matrix: the largest row of its adjugate.
fn null_vector_3x3(m: &Matrix3<f64>) -> Option<Vector3<f64>> {
    let cofactors = [
        Vector3::new(
            m[(1, 1)] * m[(2, 2)] - m[(1, 2)] * m[(2, 1)],
            -(m[(1, 0)] * m[(2, 2)] - m[(1, 2)] * m[(2, 0)]),
            m[(1, 0)] * m[(2, 1)] - m[(1, 1)] * m[(2, 0)],
        ),
        Vector3::new(
            -(m[(0, 1)] * m[(2, 2)] - m[(0, 2)] * m[(2, 1)]),
            m[(0, 0)] * m[(2, 2)] - m[(0, 2)] * m[(2, 0)],
            -(m[(0, 0)] * m[(2, 1)] - m[(0, 1)] * m[(2, 0)]),
        ),
        Vector3::new(
            m[(0, 1)] * m[(1, 2)] - m[(0, 2)] * m[(1, 1)],
            -(m[(0, 0)] * m[(1, 2)] - m[(0, 2)] * m[(1, 0)]),
            m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)],
        ),
    ];

    let best = cofactors
        .iter()
        .max_by(|x, y| x.norm_squared().total_cmp(&y.norm_squared()))?;
    let norm_sq = best.norm_squared();
    if norm_sq < 1e-30 {
        return None;
    }
    Some(best / norm_sq.sqrt())
}

/// Real roots of the monic cubic `x³ + b x² + c x + d`.
fn solve_cubic_real(b: f64, c: f64, d: f64) -> Vec<f64> {
    let p = c - b * b / 3.0;
    let q = 2.0 * b * b * b / 27.0 - b * c / 3.0 + d;
    let disc = -4.0 * p * p * p - 27.0 * q * q;
    let shift = -b / 3.0;

    if disc >= 0.0 {
        let r = (-p / 3.0).sqrt();
        let cos_arg = if r.abs() < 1e-15 {
            0.0
        } else {
            (-q / (2.0 * r * r * r)).clamp(-1.0, 1.0)
        };
        let theta = cos_arg.acos();
        let two_r = 2.0 * r;
        let tau = 2.0 * std::f64::consts::PI;
        vec![
            two_r * (theta / 3.0).cos() + shift,
            two_r * ((theta + tau) / 3.0).cos() + shift,
            two_r * ((theta + 2.0 * tau) / 3.0).cos() + shift,
        ]
    } else {
        let sqrt_disc = (q * q / 4.0 + p * p * p / 27.0).sqrt();
        let u = (-q / 2.0 + sqrt_disc).cbrt();
        let v = (-q / 2.0 - sqrt_disc).cbrt();
        vec![u + v + shift]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn sample(cx: f64, cy: f64, a: f64, b: f64, angle: f64, n: usize) -> Vec<[f64; 2]> {
        (0..n)
            .map(|i| {
                let t = 2.0 * PI * i as f64 / n as f64;
                let (px, py) = (a * t.cos(), b * t.sin());
                [
                    cx + angle.cos() * px - angle.sin() * py,
                    cy + angle.sin() * px + angle.cos() * py,
                ]
            })
            .collect()
    }

    #[test]
    fn direct_fit_recovers_rotated_ellipse() {
        let points = sample(120.0, 80.0, 40.0, 22.0, 0.6, 48);
        let ellipse = fit_ellipse_direct(&points).unwrap();
        assert_relative_eq!(ellipse.cx, 120.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.cy, 80.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.a, 40.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.b, 22.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.angle, 0.6, epsilon = 1e-6);
    }

    #[test]
    fn vertical_major_axis_reports_half_pi() {
        let points = sample(0.0, 0.0, 30.0, 10.0, FRAC_PI_2, 36);
        let ellipse = fit_ellipse_direct(&points).unwrap();
        assert_relative_eq!(ellipse.angle, FRAC_PI_2, epsilon = 1e-6);
    }

    #[test]
    fn too_few_points_fall_back_to_moments() {
        let square = [[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [5.0, 12.0], [0.0, 10.0]];
        assert!(fit_ellipse_direct(&square).is_none());
        let ellipse = fit_ellipse(&square).unwrap();
        assert!(ellipse.cx > 4.0 && ellipse.cx < 6.0);
        assert!(ellipse.cy > 5.0 && ellipse.cy < 7.0);
    }

    #[test]
    fn moments_of_dense_polygon_match_the_ellipse() {
        let points = sample(50.0, 60.0, 30.0, 15.0, 0.3, 720);
        let ellipse = ellipse_from_moments(&points).unwrap();
        assert_relative_eq!(ellipse.cx, 50.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.cy, 60.0, epsilon = 1e-6);
        assert_relative_eq!(ellipse.a, 30.0, epsilon = 0.05);
        assert_relative_eq!(ellipse.b, 15.0, epsilon = 0.05);
        assert_relative_eq!(ellipse.angle, 0.3, epsilon = 1e-3);
    }

    #[test]
    fn collinear_points_have_no_moment_ellipse() {
        let line: Vec<[f64; 2]> = (0..10).map(|i| [i as f64, 2.0 * i as f64]).collect();
        assert!(ellipse_from_moments(&line).is_none());
    }
}
