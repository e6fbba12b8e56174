use super::sphere;
use crate::wcs::{PixelScale, SkyCoord, WcsError, WcsInfo, WorldMapping};

/// TAN (gnomonic) WCS projection.
///
/// Pixel offsets from `crpix` go through the CD matrix to intermediate
/// world coordinates on the tangent plane, which are then deprojected onto
/// the sphere around `crval` with the native pole at longitude 180°.
#[derive(Debug, Clone, PartialEq)]
pub struct TanWcs {
    /// Reference point on sky (RA, Dec) in radians.
    pub crval: [f64; 2],
    /// Reference pixel, 0-based.
    pub crpix: [f64; 2],
    /// CD matrix in radians per pixel. Row 0 yields the East component,
    /// row 1 the North component.
    pub cd: [[f64; 2]; 2],
}

impl TanWcs {
    /// Build a mapping from a plate scale and a counter-clockwise rotation.
    ///
    /// With `east_left` the x axis is mirrored so that East runs toward
    /// decreasing x, the usual sky-on-screen layout.
    pub fn from_scale_rotation(
        center: SkyCoord,
        crpix: (f64, f64),
        scale_deg: f64,
        rotation_deg: f64,
        east_left: bool,
    ) -> Self {
        let sx = if east_left { -1.0 } else { 1.0 };
        let cd_deg = rotated_cd(rotation_deg, [sx * scale_deg, scale_deg]);
        Self {
            crval: [center.ra.to_radians(), center.dec.to_radians()],
            crpix: [crpix.0, crpix.1],
            cd: cd_to_radians(cd_deg),
        }
    }

    /// Build a mapping from FITS header keywords.
    ///
    /// `CRPIXn` is 1-based in the header and converted to 0-based here.
    /// The CD matrix is taken from `CDi_j` if present, else `CDELTi * PCi_j`.
    pub fn from_header(info: &WcsInfo) -> Result<Self, WcsError> {
        let crval = [info.require("CRVAL1")?, info.require("CRVAL2")?];
        let crpix = [info.require("CRPIX1")? - 1.0, info.require("CRPIX2")? - 1.0];
        let cd_deg = match info.cd() {
            Some(cd) => cd,
            None => {
                let cdelt = [info.require("CDELT1")?, info.require("CDELT2")?];
                let pc = info.pc();
                [
                    [cdelt[0] * pc[0][0], cdelt[0] * pc[0][1]],
                    [cdelt[1] * pc[1][0], cdelt[1] * pc[1][1]],
                ]
            }
        };
        Ok(Self {
            crval: [crval[0].to_radians(), crval[1].to_radians()],
            crpix,
            cd: cd_to_radians(cd_deg),
        })
    }

    /// Convert pixel coordinates to a unit vector on the celestial sphere.
    pub fn pixel_to_xyz(&self, px: f64, py: f64) -> [f64; 3] {
        let u = px - self.crpix[0];
        let v = py - self.crpix[1];
        let x = self.cd[0][0] * u + self.cd[0][1] * v;
        let y = self.cd[1][0] * u + self.cd[1][1] * v;
        self.iwc_to_xyz(x, y)
    }

    /// Convert a unit vector to pixel coordinates; `None` behind the tangent plane.
    pub fn xyz_to_pixel(&self, xyz: [f64; 3]) -> Option<(f64, f64)> {
        let reference = sphere::radec_to_xyz(self.crval[0], self.crval[1]);
        let (x, y) = sphere::tangent_coords(xyz, reference)?;

        let inv_det = 1.0 / self.determinant();
        let u = inv_det * (self.cd[1][1] * x - self.cd[0][1] * y);
        let v = inv_det * (-self.cd[1][0] * x + self.cd[0][0] * y);

        Some((u + self.crpix[0], v + self.crpix[1]))
    }

    /// CD matrix in degrees per pixel.
    pub fn cd_degrees(&self) -> [[f64; 2]; 2] {
        self.cd.map(|row| row.map(f64::to_degrees))
    }

    fn determinant(&self) -> f64 {
        self.cd[0][0] * self.cd[1][1] - self.cd[0][1] * self.cd[1][0]
    }

    /// Deproject tangent-plane coordinates (radians) to a unit vector.
    fn iwc_to_xyz(&self, x: f64, y: f64) -> [f64; 3] {
        let r = sphere::radec_to_xyz(self.crval[0], self.crval[1]);
        let (rx, ry, rz) = (r[0], r[1], r[2]);

        // east and north unit vectors of the tangent plane
        // at the poles, match the axis choice of `tangent_coords`
        let (ex, ey) = if rz == 1.0 {
            (1.0, 0.0)
        } else if rz == -1.0 {
            (-1.0, 0.0)
        } else {
            let norm = rx.hypot(ry);
            (-ry / norm, rx / norm)
        };
        let nx = -rz * ey;
        let ny = rz * ex;
        let nz = rx * ey - ry * ex;

        let px = ex * x + nx * y + rx;
        let py = ey * x + ny * y + ry;
        let pz = nz * y + rz;
        let norm = (px * px + py * py + pz * pz).sqrt();

        [px / norm, py / norm, pz / norm]
    }
}

impl WorldMapping for TanWcs {
    fn pixel_to_world(&self, x: f64, y: f64) -> Result<SkyCoord, WcsError> {
        if !x.is_finite() || !y.is_finite() {
            return Err(WcsError::OutOfDomain { x, y });
        }
        let (ra, dec) = sphere::xyz_to_radec(self.pixel_to_xyz(x, y));
        Ok(SkyCoord::new(ra.to_degrees(), dec.to_degrees()))
    }

    fn world_to_pixel(&self, coord: SkyCoord) -> Result<(f64, f64), WcsError> {
        let xyz = sphere::radec_to_xyz(coord.ra.to_radians(), coord.dec.to_radians());
        self.xyz_to_pixel(xyz)
            .ok_or(WcsError::BehindTangentPlane {
                ra: coord.ra,
                dec: coord.dec,
            })
    }

    fn pixel_scale(&self) -> Option<PixelScale> {
        Some(PixelScale::from_cd(self.cd_degrees()))
    }
}

/// `R(theta) * diag(scales)` with `R` the counter-clockwise rotation matrix.
pub(crate) fn rotated_cd(theta_deg: f64, scales: [f64; 2]) -> [[f64; 2]; 2] {
    let (s, c) = theta_deg.to_radians().sin_cos();
    [
        [c * scales[0], -s * scales[1]],
        [s * scales[0], c * scales[1]],
    ]
}

fn cd_to_radians(cd_deg: [[f64; 2]; 2]) -> [[f64; 2]; 2] {
    cd_deg.map(|row| row.map(f64::to_radians))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    fn assert_close(a: f64, b: f64, tol: f64) {
        assert!(
            (a - b).abs() < tol,
            "expected {a} ~= {b} (diff = {})",
            (a - b).abs()
        );
    }

    fn test_wcs(rotation: f64, east_left: bool) -> TanWcs {
        TanWcs::from_scale_rotation(
            SkyCoord::new(150.0, 2.2),
            (512.0, 512.0),
            1.0 / 3600.0,
            rotation,
            east_left,
        )
    }

    #[test]
    fn roundtrip_pixel_world() {
        for rotation in [0.0, 33.0, 210.0] {
            for east_left in [true, false] {
                let wcs = test_wcs(rotation, east_left);
                for &(px, py) in &[(512.0, 512.0), (0.0, 0.0), (1024.0, 300.0), (17.5, 900.0)] {
                    let coord = wcs.pixel_to_world(px, py).unwrap();
                    let (px2, py2) = wcs.world_to_pixel(coord).unwrap();
                    assert_close(px, px2, 1e-6);
                    assert_close(py, py2, 1e-6);
                }
            }
        }
    }

    #[test]
    fn crpix_maps_to_crval() {
        let wcs = test_wcs(45.0, true);
        let c = wcs.pixel_to_world(512.0, 512.0).unwrap();
        assert_close(c.ra, 150.0, 1e-10);
        assert_close(c.dec, 2.2, 1e-10);
    }

    #[test]
    fn east_left_layout() {
        let wcs = test_wcs(0.0, true);
        let c = wcs.pixel_to_world(500.0, 512.0).unwrap();
        assert!(c.ra > 150.0, "East should lie toward decreasing x");
        let c = wcs.pixel_to_world(512.0, 600.0).unwrap();
        assert!(c.dec > 2.2, "North should lie toward increasing y");
    }

    #[test]
    fn pixel_scale_reports_parity() {
        let scale = test_wcs(60.0, true).pixel_scale().unwrap();
        assert_close(scale.scales[0], 1.0 / 3600.0, 1e-15);
        assert_close(scale.scales[1], 1.0 / 3600.0, 1e-15);
        assert_eq!(scale.signs, [-1.0, 1.0]);
        assert_eq!(test_wcs(60.0, false).pixel_scale().unwrap().signs, [1.0, 1.0]);
    }

    #[test]
    fn header_with_cdelt_matches_direct() {
        let info: WcsInfo = [
            ("CRVAL1", 150.0),
            ("CRVAL2", 2.2),
            ("CRPIX1", 513.0),
            ("CRPIX2", 513.0),
            ("CDELT1", -1.0 / 3600.0),
            ("CDELT2", 1.0 / 3600.0),
        ]
        .into_iter()
        .collect();
        let wcs = TanWcs::from_header(&info).unwrap();
        let direct = test_wcs(0.0, true);
        for (a, b) in wcs.cd.iter().flatten().zip(direct.cd.iter().flatten()) {
            assert_close(*a, *b, 1e-18);
        }
        assert_eq!(wcs.crpix, [512.0, 512.0]);
    }

    #[test]
    fn header_prefers_cd() {
        let info: WcsInfo = [
            ("CRVAL1", 10.0),
            ("CRVAL2", -30.0),
            ("CRPIX1", 1.0),
            ("CRPIX2", 1.0),
            ("CD1_1", -2e-4),
            ("CD2_2", 2e-4),
            ("CDELT1", 5.0),
            ("CDELT2", 5.0),
        ]
        .into_iter()
        .collect();
        let wcs = TanWcs::from_header(&info).unwrap();
        let scale = wcs.pixel_scale().unwrap();
        assert_close(scale.scales[0], 2e-4, 1e-15);
        assert_eq!(wcs.crpix, [0.0, 0.0]);
    }

    #[test]
    fn header_missing_keyword() {
        let info = WcsInfo::new().with("CRVAL1", 1.0);
        assert_eq!(
            TanWcs::from_header(&info),
            Err(WcsError::MissingKeyword("CRVAL2".into()))
        );
    }

    #[test]
    fn header_names_the_absent_cdelt() {
        let info: WcsInfo = [
            ("CRVAL1", 10.0),
            ("CRVAL2", -30.0),
            ("CRPIX1", 1.0),
            ("CRPIX2", 1.0),
            ("CDELT1", -2e-4),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            TanWcs::from_header(&info),
            Err(WcsError::MissingKeyword("CDELT2".into()))
        );
    }

    #[test]
    fn antipode_is_behind_plane() {
        let wcs = test_wcs(0.0, true);
        let err = wcs.world_to_pixel(SkyCoord::new(330.0, -2.2)).unwrap_err();
        assert!(matches!(err, WcsError::BehindTangentPlane { .. }));
    }

    #[test]
    fn near_pole() {
        let wcs = TanWcs::from_scale_rotation(
            SkyCoord::new(0.0, 89.9),
            (256.0, 256.0),
            1.0 / 3600.0,
            0.0,
            true,
        );
        let c = wcs.pixel_to_world(300.0, 200.0).unwrap();
        let (x, y) = wcs.world_to_pixel(c).unwrap();
        assert_close(x, 300.0, 1e-6);
        assert_close(y, 200.0, 1e-6);
        assert!(wcs.crval[1] < PI / 2.0);
    }
}
