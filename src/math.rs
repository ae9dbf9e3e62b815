use nalgebra as na;
use num_traits::Float;

/// Twice the signed area of the triangle `o, a, b`. Positive when the turn
/// `o -> a -> b` is counter-clockwise in a y-up frame.
#[inline]
pub fn cross<T: na::Scalar + Float>(o: &na::Point2<T>, a: &na::Point2<T>, b: &na::Point2<T>) -> T {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

/// True when `p` lies on the closed segment `a-b`, within `eps`.
pub fn on_segment<T: na::Scalar + Float>(
    p: &na::Point2<T>,
    a: &na::Point2<T>,
    b: &na::Point2<T>,
    eps: T,
) -> bool {
    let len = Float::hypot(b.x - a.x, b.y - a.y);
    if Float::abs(cross(a, b, p)) > eps * Float::max(len, T::one()) {
        return false;
    }

    p.x >= Float::min(a.x, b.x) - eps
        && p.x <= Float::max(a.x, b.x) + eps
        && p.y >= Float::min(a.y, b.y) - eps
        && p.y <= Float::max(a.y, b.y) + eps
}

/// Signed shoelace area of a closed outline, positive when counter-clockwise
/// in a y-up frame.
pub fn polygon_area<T: na::Scalar + Float>(points: &[na::Point2<T>]) -> T {
    let n = points.len();
    let twice = (0..n).fold(T::zero(), |acc, i| {
        let a = &points[i];
        let b = &points[(i + 1) % n];
        acc + (a.x * b.y - b.x * a.y)
    });

    twice / (T::one() + T::one())
}

/// Checks every triple of `points` for (near-)collinearity. The triangle
/// area is compared against the squared spread of the whole set, so the
/// test does not depend on units.
pub fn has_collinear_triple(points: &[na::Point2<f64>], rel_tol: f64) -> bool {
    let spread = points
        .iter()
        .flat_map(|a| points.iter().map(move |b| na::distance_squared(a, b)))
        .fold(0.0, f64::max);

    if spread <= f64::EPSILON {
        return true;
    }

    let n = points.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                if cross(&points[i], &points[j], &points[k]).abs() <= rel_tol * spread {
                    return true;
                }
            }
        }
    }

    false
}

/// Similarity transform moving the centroid of `points` to the origin with a
/// mean distance of sqrt(2).
pub fn normalizing_transform(points: &[na::Point2<f64>]) -> Option<na::Matrix3<f64>> {
    let n = points.len() as f64;
    let centroid = points
        .iter()
        .fold(na::Vector2::zeros(), |acc, p| acc + p.coords)
        / n;
    let mean_dist = points
        .iter()
        .map(|p| (p.coords - centroid).norm())
        .sum::<f64>()
        / n;

    if mean_dist <= f64::EPSILON {
        return None;
    }

    let s = std::f64::consts::SQRT_2 / mean_dist;

    Some(na::Matrix3::new(
        s,
        0.0,
        -s * centroid.x,
        0.0,
        s,
        -s * centroid.y,
        0.0,
        0.0,
        1.0,
    ))
}

/// Projective transform of a single point. `None` when the point maps to
/// infinity.
#[inline]
pub fn project(h: &na::Matrix3<f64>, p: &na::Point2<f64>) -> Option<na::Point2<f64>> {
    let v = h * na::Vector3::new(p.x, p.y, 1.0);

    if v.z.abs() < f64::EPSILON {
        return None;
    }

    Some(na::Point2::new(v.x / v.z, v.y / v.z))
}

#[inline]
fn apply_affine(t: &na::Matrix3<f64>, p: &na::Point2<f64>) -> na::Point2<f64> {
    na::Point2::new(
        t[(0, 0)] * p.x + t[(0, 1)] * p.y + t[(0, 2)],
        t[(1, 0)] * p.x + t[(1, 1)] * p.y + t[(1, 2)],
    )
}

/// Exact homography through four correspondences with h33 fixed to 1.
fn solve_dlt(src: &[na::Point2<f64>; 4], dst: &[na::Point2<f64>; 4]) -> Option<na::Matrix3<f64>> {
    let mut a = na::SMatrix::<f64, 8, 8>::zeros();
    let mut b = na::SVector::<f64, 8>::zeros();

    for (i, (s, d)) in src.iter().zip(dst.iter()).enumerate() {
        let (x, y, u, v) = (s.x, s.y, d.x, d.y);
        let r = 2 * i;

        a[(r, 0)] = x;
        a[(r, 1)] = y;
        a[(r, 2)] = 1.0;
        a[(r, 6)] = -x * u;
        a[(r, 7)] = -y * u;
        b[r] = u;

        a[(r + 1, 3)] = x;
        a[(r + 1, 4)] = y;
        a[(r + 1, 5)] = 1.0;
        a[(r + 1, 6)] = -x * v;
        a[(r + 1, 7)] = -y * v;
        b[r + 1] = v;
    }

    let h = a.lu().solve(&b)?;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }

    Some(na::Matrix3::new(
        h[0], h[1], h[2], h[3], h[4], h[5], h[6], h[7], 1.0,
    ))
}

/// Direct linear transform over four point pairs, conditioned by
/// normalising both sets first. The result is scaled so that h33 == 1.
pub fn fit_homography(
    src: &[na::Point2<f64>; 4],
    dst: &[na::Point2<f64>; 4],
) -> Option<na::Matrix3<f64>> {
    let t_src = normalizing_transform(src)?;
    let t_dst = normalizing_transform(dst)?;

    let n_src = src.map(|p| apply_affine(&t_src, &p));
    let n_dst = dst.map(|p| apply_affine(&t_dst, &p));

    let h_norm = solve_dlt(&n_src, &n_dst)?;
    let h = t_dst.try_inverse()? * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() <= 1e-12 * h.norm() || !scale.is_finite() {
        return None;
    }

    let h = h / scale;
    if h.determinant().abs() <= f64::EPSILON {
        return None;
    }

    Some(h)
}
