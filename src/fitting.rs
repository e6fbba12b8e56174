//! Linear approximation of arbitrary mappings.
//!
//! Mappings that cannot report their own pixel scale (distorted or
//! tabulated ones) are sampled on a pixel grid and fitted with a TAN WCS.

use crate::geom::sphere::{radec_to_xyz, tangent_coords};
use crate::geom::tan::TanWcs;
use crate::wcs::{ImageShape, PixelScale, WcsError, WorldMapping};

/// Samples per axis used by [`fitted_pixel_scale`].
pub const DEFAULT_GRID: usize = 5;

/// Fit a TAN WCS to `mapping` over an image of `shape`.
///
/// The tangent point is the world position of the image center, and the
/// CD matrix is the least-squares solution over a `grid x grid` lattice
/// of pixel samples spanning the image.
pub fn fit_linear_wcs(
    mapping: &dyn WorldMapping,
    shape: ImageShape,
    grid: usize,
) -> Result<TanWcs, WcsError> {
    shape.validate()?;
    if grid < 2 {
        return Err(WcsError::FitFailed("need at least a 2x2 sample grid"));
    }

    let (cx, cy) = shape.center();
    let center = mapping.pixel_to_world(cx, cy)?;
    let (crval_ra, crval_dec) = (center.ra.to_radians(), center.dec.to_radians());
    let reference = radec_to_xyz(crval_ra, crval_dec);

    let step = |extent: usize, i: usize| extent as f64 * i as f64 / (grid - 1) as f64;

    let mut sum_uu = 0.0;
    let mut sum_uv = 0.0;
    let mut sum_vv = 0.0;
    let mut sum_u_xi = 0.0;
    let mut sum_v_xi = 0.0;
    let mut sum_u_eta = 0.0;
    let mut sum_v_eta = 0.0;

    for i in 0..grid {
        for j in 0..grid {
            let px = step(shape.cols, i);
            let py = step(shape.rows, j);
            let coord = mapping.pixel_to_world(px, py)?;
            let xyz = radec_to_xyz(coord.ra.to_radians(), coord.dec.to_radians());
            let (xi, eta) = tangent_coords(xyz, reference).ok_or(WcsError::BehindTangentPlane {
                ra: coord.ra,
                dec: coord.dec,
            })?;
            let u = px - cx;
            let v = py - cy;

            sum_uu += u * u;
            sum_uv += u * v;
            sum_vv += v * v;
            sum_u_xi += u * xi;
            sum_v_xi += v * xi;
            sum_u_eta += u * eta;
            sum_v_eta += v * eta;
        }
    }

    // Normal equations for xi = cd00*u + cd01*v, eta = cd10*u + cd11*v.
    let det = sum_uu * sum_vv - sum_uv * sum_uv;
    if det.abs() < 1e-30 {
        return Err(WcsError::FitFailed("singular normal matrix"));
    }
    let inv_det = 1.0 / det;

    let cd00 = inv_det * (sum_vv * sum_u_xi - sum_uv * sum_v_xi);
    let cd01 = inv_det * (-sum_uv * sum_u_xi + sum_uu * sum_v_xi);
    let cd10 = inv_det * (sum_vv * sum_u_eta - sum_uv * sum_v_eta);
    let cd11 = inv_det * (-sum_uv * sum_u_eta + sum_uu * sum_v_eta);

    Ok(TanWcs {
        crval: [crval_ra, crval_dec],
        crpix: [cx, cy],
        cd: [[cd00, cd01], [cd10, cd11]],
    })
}

/// Pixel scale of `mapping`, estimated from a sampled linear fit.
pub fn fitted_pixel_scale(
    mapping: &dyn WorldMapping,
    shape: ImageShape,
) -> Result<PixelScale, WcsError> {
    let wcs = fit_linear_wcs(mapping, shape, DEFAULT_GRID)?;
    let scale = PixelScale::from_cd(wcs.cd_degrees());
    if scale.scales.iter().any(|s| !s.is_finite() || *s == 0.0) {
        return Err(WcsError::DegenerateScale);
    }
    log::debug!(
        "fitted pixel scale {:.3e} x {:.3e} deg/pix, signs {:?}",
        scale.scales[0],
        scale.scales[1],
        scale.signs
    );
    Ok(scale)
}
