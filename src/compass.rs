//! North/East compass geometry for image overlays.
//!
//! Given a world mapping and an image shape, [`compute_compass`] locates the
//! endpoints of a North arm and an East arm drawn from the image center, and
//! the angles a renderer needs to label them.

use crate::geom::sphere::{angle_difference, offset_radec, rotate_point};
use crate::wcs::{ImageShape, SkyCoord, WcsError, WorldMapping};

/// Arm length as a fraction of the smaller image dimension.
pub const DEFAULT_RADIUS_FRACTION: f64 = 0.4;

/// Length of the pixel-axis (X/Y) arms as a fraction of the smaller dimension.
pub const PIXEL_ARM_FRACTION: f64 = 0.25;

/// `degn` values within this distance of zero are left unsigned on flip.
const ZERO_ANGLE_TOLERANCE: f64 = 1e-8;

/// How the per-axis plate scale is measured at the image center.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleProbe {
    /// Step one pixel along each image axis and measure the sky displacement.
    #[default]
    Pixel,
    /// Step one degree East and one degree North on the sky and measure the
    /// pixel displacement.
    Degree,
}

/// Configuration for [`compute_compass_with`].
#[derive(Debug, Clone, Copy)]
pub struct CompassConfig {
    /// Arm length as a fraction of the smaller image dimension.
    pub radius_fraction: f64,
    pub probe: ScaleProbe,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            radius_fraction: DEFAULT_RADIUS_FRACTION,
            probe: ScaleProbe::default(),
        }
    }
}

/// Compass arms in pixel coordinates, with their angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompassGeometry {
    pub x: f64,
    pub y: f64,
    pub xn: f64,
    pub yn: f64,
    pub xe: f64,
    pub ye: f64,
    /// `atan2(xn - x, yn - y)`, sign inverted when `xflip` is set.
    pub degn: f64,
    /// Angle of the East arm after rotating it by the North angle.
    pub dege: f64,
    /// The display should mirror horizontally to show East left of North.
    pub xflip: bool,
}

/// Compute the compass with the default probe and the given arm fraction.
pub fn compute_compass(
    mapping: &dyn WorldMapping,
    shape: ImageShape,
    radius_fraction: f64,
) -> Result<CompassGeometry, WcsError> {
    let config = CompassConfig {
        radius_fraction,
        ..CompassConfig::default()
    };
    compute_compass_with(mapping, shape, &config)
}

pub fn compute_compass_with(
    mapping: &dyn WorldMapping,
    shape: ImageShape,
    config: &CompassConfig,
) -> Result<CompassGeometry, WcsError> {
    shape.validate()?;

    let (x, y) = shape.center();
    let radius_px = config.radius_fraction * shape.min_dim() as f64;
    let center = mapping.pixel_to_world(x, y)?;

    let (len_e, len_n) = match config.probe {
        ScaleProbe::Pixel => {
            let deg_per_px_x = planar_separation(center, mapping.pixel_to_world(x + 1.0, y)?);
            let deg_per_px_y = planar_separation(center, mapping.pixel_to_world(x, y + 1.0)?);
            (radius_px * deg_per_px_x, radius_px * deg_per_px_y)
        }
        ScaleProbe::Degree => {
            let (ex, ey) = offset_to_pixel(mapping, center, 1.0, 0.0)?;
            let (nx, ny) = offset_to_pixel(mapping, center, 0.0, 1.0)?;
            let px_per_deg_e = (ex - x).hypot(ey - y);
            let px_per_deg_n = (nx - x).hypot(ny - y);
            (radius_px / px_per_deg_e, radius_px / px_per_deg_n)
        }
    };
    if [len_e, len_n].iter().any(|l| !l.is_finite() || *l == 0.0) {
        return Err(WcsError::DegenerateScale);
    }

    let (xe, ye) = offset_to_pixel(mapping, center, len_e, 0.0)?;
    let (xn, yn) = offset_to_pixel(mapping, center, 0.0, len_n)?;

    let mut degn = f64::atan2(xn - x, yn - y).to_degrees();

    let (xe2, ye2) = rotate_point(xe, ye, degn, (x, y));
    let dege = f64::atan2(xe2 - x, ye2 - y).to_degrees();

    // Empirical handedness rule: a positive East angle means East sits right
    // of North, so the display is mirrored and the North angle follows.
    let xflip = dege > 0.0;
    if xflip && degn.abs() > ZERO_ANGLE_TOLERANCE {
        degn = -degn;
    }

    log::debug!(
        "compass at ({x:.2}, {y:.2}): N=({xn:.2}, {yn:.2}) E=({xe:.2}, {ye:.2}) degn={degn:.3} dege={dege:.3} xflip={xflip}"
    );

    Ok(CompassGeometry {
        x,
        y,
        xn,
        yn,
        xe,
        ye,
        degn,
        dege,
        xflip,
    })
}

/// Small-angle separation in degrees, with RA differences scaled by cos(Dec).
fn planar_separation(a: SkyCoord, b: SkyCoord) -> f64 {
    let dra = angle_difference(b.ra, a.ra) * a.dec.to_radians().cos();
    let ddec = b.dec - a.dec;
    dra.hypot(ddec)
}

/// Pixel position of `base` shifted by tangent-plane offsets in degrees.
fn offset_to_pixel(
    mapping: &dyn WorldMapping,
    base: SkyCoord,
    dx: f64,
    dy: f64,
) -> Result<(f64, f64), WcsError> {
    let (ra, dec) = offset_radec(base.ra, base.dec, dx, dy);
    mapping.world_to_pixel(SkyCoord::new(ra, dec))
}

/// What an overlay renderer should draw for one image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CompassOverlay {
    Full(CompassGeometry),
    /// No usable mapping: only the image center is marked.
    CenterOnly { x: f64, y: f64 },
}

impl CompassOverlay {
    /// Compute the overlay, falling back to the center marker when the
    /// mapping is absent or the compass cannot be computed.
    pub fn for_mapping(
        mapping: Option<&dyn WorldMapping>,
        shape: ImageShape,
        config: &CompassConfig,
    ) -> Self {
        let (x, y) = shape.center();
        let Some(mapping) = mapping else {
            return Self::CenterOnly { x, y };
        };
        match compute_compass_with(mapping, shape, config) {
            Ok(geometry) => Self::Full(geometry),
            Err(e) => {
                log::warn!("compass disabled: {e}");
                Self::CenterOnly { x, y }
            }
        }
    }

    pub fn center(&self) -> (f64, f64) {
        match self {
            Self::Full(g) => (g.x, g.y),
            Self::CenterOnly { x, y } => (*x, *y),
        }
    }

    /// Endpoints of the X and Y pixel-axis arms.
    pub fn pixel_arms(&self, shape: ImageShape) -> ((f64, f64), (f64, f64)) {
        let (x, y) = self.center();
        let r = shape.min_dim() as f64 * PIXEL_ARM_FRACTION;
        ((x + r, y), (x, y + r))
    }
}
