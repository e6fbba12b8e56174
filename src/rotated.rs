//! Synthetic rotated reference frames.
//!
//! A [`RotatedFrame`] carries no real pixel data. It is a small placeholder
//! image whose TAN mapping is centered on a reference image and rotated (and
//! optionally mirrored) so that viewers aligned to it show the reference
//! sky in a new orientation without resampling.

use ndarray::Array2;

use crate::fitting::fitted_pixel_scale;
use crate::geom::sphere::normalize_degrees;
use crate::geom::tan::{TanWcs, rotated_cd};
use crate::wcs::{
    BoundingBox, ImageShape, PixelScale, SkyCoord, WcsError, WcsInfo, WorldMapping,
};

/// Pixel-scale rescale per placeholder pixel.
///
/// Tuned by eye so that a frame built for a 2x2 placeholder covers roughly
/// the same sky as typical reference images. Adjust through
/// [`FrameConfig::rescale_per_pixel`].
pub const DEFAULT_RESCALE_PER_PIXEL: f64 = 1.0 / 1000.0;

/// Configuration for [`synthesize_rotated_frame`].
#[derive(Debug, Clone, Copy)]
pub struct FrameConfig {
    /// Shape of the placeholder array.
    pub target_shape: ImageShape,
    /// Per-axis sign flips; `None` keeps the reference's own signs.
    pub axis_sign_flips: Option<[f64; 2]>,
    /// Pixel scale multiplier per placeholder pixel along each axis.
    pub rescale_per_pixel: f64,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            target_shape: ImageShape::new(2, 2),
            axis_sign_flips: None,
            rescale_per_pixel: DEFAULT_RESCALE_PER_PIXEL,
        }
    }
}

/// A coordinates-only frame.
#[derive(Debug, Clone)]
pub struct RotatedFrame {
    pub wcs: TanWcs,
    /// World position of the reference image center.
    pub center: SkyCoord,
    /// Rotation in degrees, in `[0, 360)`.
    pub rotation_angle: f64,
    /// Reference pixel scales in degrees per pixel, before rescaling.
    pub pixel_scales: [f64; 2],
    pub axis_sign_flips: [f64; 2],
    /// Sequential fill; only its shape is meaningful.
    pub data: Array2<i8>,
    /// Always `true`: consumers must exclude this frame from flux computations.
    pub wcs_only: bool,
}

impl RotatedFrame {
    pub fn shape(&self) -> ImageShape {
        let (rows, cols) = self.data.dim();
        ImageShape::new(rows, cols)
    }
}

impl WorldMapping for RotatedFrame {
    fn pixel_to_world(&self, x: f64, y: f64) -> Result<SkyCoord, WcsError> {
        self.wcs.pixel_to_world(x, y)
    }

    fn world_to_pixel(&self, coord: SkyCoord) -> Result<(f64, f64), WcsError> {
        self.wcs.world_to_pixel(coord)
    }

    fn pixel_scale(&self) -> Option<PixelScale> {
        self.wcs.pixel_scale()
    }

    fn bounding_box(&self) -> Option<BoundingBox> {
        let shape = self.shape();
        Some(BoundingBox {
            x: (-0.5, shape.cols as f64 - 0.5),
            y: (-0.5, shape.rows as f64 - 0.5),
        })
    }
}

/// Per-axis pixel scale of a reference image.
///
/// Uses the mapping's own linear scale when it has one, else the
/// `CDELT`/`PC` keywords in `wcs_info`, else a sampled linear fit.
pub fn reference_pixel_scale(
    mapping: &dyn WorldMapping,
    shape: ImageShape,
    wcs_info: Option<&WcsInfo>,
) -> Result<PixelScale, WcsError> {
    if let Some(scale) = mapping.pixel_scale() {
        return Ok(scale);
    }
    if let Some(scale) = wcs_info.and_then(WcsInfo::pixel_scale) {
        log::debug!("pixel scale taken from CDELT/PC keywords");
        return Ok(scale);
    }
    log::debug!("no linear scale or CDELT keywords; sampling the mapping");
    fitted_pixel_scale(mapping, shape)
}

/// Build a rotated, coordinates-only frame around the center of a reference image.
///
/// The frame's pixels are shifted to the placeholder center, sign-flipped,
/// scaled, and rotated counter-clockwise by `rotation_angle` before the TAN
/// deprojection onto the reference center.
pub fn synthesize_rotated_frame(
    reference: Option<&dyn WorldMapping>,
    reference_shape: ImageShape,
    rotation_angle: f64,
    wcs_info: Option<&WcsInfo>,
    config: &FrameConfig,
) -> Result<RotatedFrame, WcsError> {
    let reference = reference.ok_or_else(|| WcsError::NoWcs("reference image".into()))?;
    reference_shape.validate()?;
    let target = config.target_shape;
    target.validate()?;

    let (cx, cy) = reference_shape.center();
    let center = reference.pixel_to_world(cx, cy)?;
    let rotation_angle = normalize_degrees(rotation_angle);

    let scale = reference_pixel_scale(reference, reference_shape, wcs_info)?;
    if scale.scales.iter().any(|s| !s.is_finite() || *s == 0.0) {
        return Err(WcsError::DegenerateScale);
    }
    let flips = config.axis_sign_flips.unwrap_or(scale.signs);

    let rescale = [
        target.cols as f64 * config.rescale_per_pixel,
        target.rows as f64 * config.rescale_per_pixel,
    ];
    let cd_deg = rotated_cd(
        rotation_angle,
        [
            flips[0] * scale.scales[0] * rescale[0],
            flips[1] * scale.scales[1] * rescale[1],
        ],
    );

    let wcs = TanWcs {
        crval: [center.ra.to_radians(), center.dec.to_radians()],
        crpix: [target.cols as f64 * 0.5, target.rows as f64 * 0.5],
        cd: cd_deg.map(|row| row.map(f64::to_radians)),
    };

    let data = Array2::from_shape_fn((target.rows, target.cols), |(r, c)| {
        (r * target.cols + c) as i8
    });

    log::debug!(
        "rotated frame at RA={:.5} Dec={:+.5}, angle {:.2} deg, flips {:?}",
        center.ra,
        center.dec,
        rotation_angle,
        flips
    );

    Ok(RotatedFrame {
        wcs,
        center,
        rotation_angle,
        pixel_scales: scale.scales,
        axis_sign_flips: flips,
        data,
        wcs_only: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compass::{DEFAULT_RADIUS_FRACTION, compute_compass};
    use crate::geom::sphere::angle_difference;
    use crate::wcs::outside_bounding_box;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    const SHAPE: ImageShape = ImageShape {
        rows: 1024,
        cols: 2048,
    };

    fn reference(rotation: f64) -> TanWcs {
        TanWcs::from_scale_rotation(
            SkyCoord::new(337.5, 33.9),
            (1000.0, 500.0),
            0.11 / 3600.0,
            rotation,
            true,
        )
    }

    fn frame(rotation: f64, flips: Option<[f64; 2]>) -> RotatedFrame {
        let wcs = reference(0.0);
        let config = FrameConfig {
            axis_sign_flips: flips,
            ..FrameConfig::default()
        };
        synthesize_rotated_frame(Some(&wcs as &dyn WorldMapping), SHAPE, rotation, None, &config)
            .unwrap()
    }

    #[test]
    fn missing_mapping_is_an_error() {
        let err = synthesize_rotated_frame(None, SHAPE, 0.0, None, &FrameConfig::default())
            .unwrap_err();
        assert!(matches!(err, WcsError::NoWcs(_)));
        assert!(err.to_string().contains("no WCS"));
    }

    #[test]
    fn center_pixel_maps_to_reference_center() {
        let wcs = reference(0.0);
        let expected = wcs.pixel_to_world(1024.0, 512.0).unwrap();

        let f = frame(0.0, Some([1.0, 1.0]));
        let (cx, cy) = f.shape().center();
        let c = f.pixel_to_world(cx, cy).unwrap();
        assert_close(c.ra, expected.ra, 1e-9);
        assert_close(c.dec, expected.dec, 1e-9);
        assert_close(f.center.ra, c.ra, 1e-9);
        assert_close(f.center.dec, c.dec, 1e-9);
    }

    #[test]
    fn rotation_is_normalized() {
        assert_close(frame(-90.0, None).rotation_angle, 270.0, 1e-12);
        assert_close(frame(720.0, None).rotation_angle, 0.0, 1e-12);
    }

    #[test]
    fn placeholder_data_and_flag() {
        let config = FrameConfig {
            target_shape: ImageShape::new(3, 4),
            ..FrameConfig::default()
        };
        let wcs = reference(0.0);
        let f = synthesize_rotated_frame(Some(&wcs as &dyn WorldMapping), SHAPE, 0.0, None, &config)
            .unwrap();
        assert!(f.wcs_only);
        assert_eq!(f.data.dim(), (3, 4));
        assert_eq!(f.data[[0, 0]], 0);
        assert_eq!(f.data[[2, 3]], 11);
    }

    #[test]
    fn scale_is_rescaled_by_target_shape() {
        let f = frame(0.0, None);
        let scale = f.pixel_scale().unwrap();
        assert_close(scale.scales[0], 0.11 / 3600.0 * 2.0 / 1000.0, 1e-15);
        assert_close(f.pixel_scales[0], 0.11 / 3600.0, 1e-15);
        assert_close(f.pixel_scales[1], 0.11 / 3600.0, 1e-15);
    }

    #[test]
    fn default_flips_follow_reference() {
        let f = frame(0.0, None);
        assert_eq!(f.axis_sign_flips, [-1.0, 1.0]);
    }

    #[test]
    fn rotation_turns_the_compass() {
        for theta in [0.0, 45.0, 90.0, 180.0, 270.0] {
            let f = frame(theta, None);
            let g = compute_compass(&f, f.shape(), DEFAULT_RADIUS_FRACTION).unwrap();
            // 2x2 frames span milliarcseconds, so angles carry ~1e-5 deg of noise
            assert_close(angle_difference(g.degn, -theta), 0.0, 1e-3);
            assert!(!g.xflip);
        }
    }

    #[test]
    fn mirrored_flips_keep_the_center() {
        let left = frame(30.0, Some([-1.0, 1.0]));
        let right = frame(30.0, Some([1.0, 1.0]));
        let (cx, cy) = left.shape().center();
        let a = left.pixel_to_world(cx, cy).unwrap();
        let b = right.pixel_to_world(cx, cy).unwrap();
        assert_close(a.ra, b.ra, 1e-12);
        assert_close(a.dec, b.dec, 1e-12);

        let gl = compute_compass(&left, left.shape(), DEFAULT_RADIUS_FRACTION).unwrap();
        let gr = compute_compass(&right, right.shape(), DEFAULT_RADIUS_FRACTION).unwrap();
        assert!(!gl.xflip);
        assert!(gr.xflip);
    }

    #[test]
    fn scale_from_header_for_nonlinear_mapping() {
        struct Opaque(TanWcs);

        impl WorldMapping for Opaque {
            fn pixel_to_world(&self, x: f64, y: f64) -> Result<SkyCoord, WcsError> {
                self.0.pixel_to_world(x, y)
            }

            fn world_to_pixel(&self, coord: SkyCoord) -> Result<(f64, f64), WcsError> {
                self.0.world_to_pixel(coord)
            }
        }

        let opaque = Opaque(reference(0.0));
        let info = WcsInfo::new().with("cdelt1", 0.5 / 3600.0).with("cdelt2", 0.5 / 3600.0);
        let scale = reference_pixel_scale(&opaque, SHAPE, Some(&info)).unwrap();
        assert_eq!(scale.signs, [1.0, 1.0]);
        assert_close(scale.scales[0], 0.5 / 3600.0, 1e-15);

        // without keywords the mapping is sampled
        let scale = reference_pixel_scale(&opaque, SHAPE, None).unwrap();
        assert_eq!(scale.signs, [-1.0, 1.0]);
        assert_close(scale.scales[1], 0.11 / 3600.0, 1e-10);
    }

    #[test]
    fn zero_target_dimension_is_rejected() {
        let wcs = reference(0.0);
        let config = FrameConfig {
            target_shape: ImageShape::new(2, 0),
            ..FrameConfig::default()
        };
        let err = synthesize_rotated_frame(Some(&wcs as &dyn WorldMapping), SHAPE, 0.0, None, &config)
            .unwrap_err();
        assert_eq!(err, WcsError::DegenerateShape { rows: 2, cols: 0 });
    }

    #[test]
    fn bounding_box_covers_placeholder() {
        let f = frame(0.0, None);
        assert!(!outside_bounding_box(&f, 0.0, 1.0));
        assert!(outside_bounding_box(&f, 2.0, 0.0));
    }

    #[test]
    fn single_pixel_reference() {
        let shape = ImageShape::new(1, 1);
        let wcs = TanWcs::from_scale_rotation(
            SkyCoord::new(10.0, 41.2),
            (0.0, 0.0),
            1.0 / 3600.0,
            0.0,
            true,
        );
        let f = synthesize_rotated_frame(
            Some(&wcs as &dyn WorldMapping),
            shape,
            0.0,
            None,
            &FrameConfig::default(),
        )
        .unwrap();
        let expected = wcs.pixel_to_world(0.5, 0.5).unwrap();
        assert_close(f.center.ra, expected.ra, 1e-12);
        assert_close(f.center.dec, expected.dec, 1e-12);
        assert_close(f.pixel_scales[0], 1.0 / 3600.0, 1e-15);
        assert_eq!(f.axis_sign_flips, [-1.0, 1.0]);
    }

    #[test]
    fn rotated_reference_keeps_scale_and_center() {
        let wcs = reference(40.0);
        let g_ref = compute_compass(&wcs, SHAPE, DEFAULT_RADIUS_FRACTION).unwrap();
        assert_close(g_ref.degn, -40.0, 1e-6);

        for theta in [0.0, 40.0, 125.0] {
            let f = synthesize_rotated_frame(
                Some(&wcs as &dyn WorldMapping),
                SHAPE,
                theta,
                None,
                &FrameConfig::default(),
            )
            .unwrap();
            let expected = wcs.pixel_to_world(1024.0, 512.0).unwrap();
            assert_close(f.center.ra, expected.ra, 1e-9);
            assert_close(f.center.dec, expected.dec, 1e-9);
            assert_close(f.pixel_scales[0], 0.11 / 3600.0, 1e-15);
            assert_close(f.pixel_scales[1], 0.11 / 3600.0, 1e-15);

            // the frame angle is absolute; the reference rotation is not added
            let g = compute_compass(&f, f.shape(), DEFAULT_RADIUS_FRACTION).unwrap();
            assert_close(angle_difference(g.degn, -theta), 0.0, 1e-3);
            assert!(!g.xflip);
        }
    }
}
