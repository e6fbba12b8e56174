use std::f64::consts::TAU;

/// Convert (RA, Dec) in radians to a unit vector `[x, y, z]`.
pub fn radec_to_xyz(ra: f64, dec: f64) -> [f64; 3] {
    let cos_dec = dec.cos();
    [cos_dec * ra.cos(), cos_dec * ra.sin(), dec.sin()]
}

/// Convert a unit vector to (RA, Dec) in radians, RA in `[0, 2*pi)`.
pub fn xyz_to_radec(xyz: [f64; 3]) -> (f64, f64) {
    let ra = f64::atan2(xyz[1], xyz[0]).rem_euclid(TAU);
    let dec = f64::atan2(xyz[2], xyz[0].hypot(xyz[1]));
    (ra, dec)
}

/// Gnomonic projection of `point` onto the plane tangent at `reference`.
///
/// `x` grows toward increasing RA (East), `y` toward the north pole.
/// `None` when the point sits on the far hemisphere.
pub fn tangent_coords(point: [f64; 3], reference: [f64; 3]) -> Option<(f64, f64)> {
    let (s, r) = (point, reference);

    let sdotr = s[0] * r[0] + s[1] * r[1] + s[2] * r[2];
    if sdotr <= 0.0 {
        return None;
    }
    let inv = 1.0 / sdotr;

    if r[2] == 1.0 {
        return Some((s[0] * inv, s[1] * inv));
    } else if r[2] == -1.0 {
        return Some((-s[0] * inv, s[1] * inv));
    }

    // east: horizontal unit vector along increasing RA
    let norm = r[0].hypot(r[1]);
    let (ex, ey) = (-r[1] / norm, r[0] / norm);

    // north = r x east
    let nx = -r[2] * ey;
    let ny = r[2] * ex;
    let nz = r[0] * ey - r[1] * ex;

    let x = (s[0] * ex + s[1] * ey) * inv;
    let y = (s[0] * nx + s[1] * ny + s[2] * nz) * inv;
    Some((x, y))
}

/// Wrap an angle in degrees into `[0, 360)`.
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can round tiny negatives up to exactly 360
    if wrapped >= 360.0 { 0.0 } else { wrapped }
}

/// Signed difference `a - b` in degrees, wrapped into `(-180, 180]`.
pub fn angle_difference(a: f64, b: f64) -> f64 {
    let d = normalize_degrees(a - b);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Apply tangent-plane offsets `(dx, dy)` to a base position, all in degrees.
///
/// `dx` runs along increasing RA and `dy` along increasing Dec. The
/// returned RA is wrapped into `[0, 360)`.
pub fn offset_radec(ra: f64, dec: f64, dx: f64, dy: f64) -> (f64, f64) {
    let x = dx.to_radians();
    let y = dy.to_radians();
    let ra0 = ra.to_radians();
    let (sin_dec0, cos_dec0) = dec.to_radians().sin_cos();

    let d = cos_dec0 - y * sin_dec0;
    let ra2 = (f64::atan2(x, d) + ra0).rem_euclid(TAU);
    let dec2 = f64::atan2(sin_dec0 + y * cos_dec0, x.hypot(d));

    (normalize_degrees(ra2.to_degrees()), dec2.to_degrees())
}

/// Rotate `(x, y)` counter-clockwise by `theta_deg` about `center`.
pub fn rotate_point(x: f64, y: f64, theta_deg: f64, center: (f64, f64)) -> (f64, f64) {
    let a = x - center.0;
    let b = y - center.1;
    let (sin_t, cos_t) = theta_deg.to_radians().sin_cos();
    (
        a * cos_t - b * sin_t + center.0,
        a * sin_t + b * cos_t + center.1,
    )
}
