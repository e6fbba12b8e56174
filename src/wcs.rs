//! World-coordinate capability shared by every mapping in the crate.
//!
//! A [`WorldMapping`] converts between pixel positions and sky positions.
//! Linear mappings also report their per-axis [`PixelScale`]; non-linear
//! ones leave that to [`WcsInfo`] header metadata or to a sampled fit.

use std::collections::BTreeMap;

use thiserror::Error;

/// Errors raised by mappings and by the geometry built on top of them.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WcsError {
    #[error("{0} has no WCS available")]
    NoWcs(String),

    #[error("pixel ({x}, {y}) is outside the mapping domain")]
    OutOfDomain { x: f64, y: f64 },

    #[error("RA={ra} Dec={dec} lies behind the tangent plane")]
    BehindTangentPlane { ra: f64, dec: f64 },

    #[error("image shape ({rows}, {cols}) has a zero dimension")]
    DegenerateShape { rows: usize, cols: usize },

    #[error("pixel scale is zero or not finite")]
    DegenerateScale,

    #[error("missing header keyword {0}")]
    MissingKeyword(String),

    #[error("linear fit failed: {0}")]
    FitFailed(&'static str),
}

/// A position on the sky, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SkyCoord {
    pub ra: f64,
    pub dec: f64,
}

impl SkyCoord {
    pub fn new(ra: f64, dec: f64) -> Self {
        Self { ra, dec }
    }
}

/// Image shape as `(rows, cols)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageShape {
    pub rows: usize,
    pub cols: usize,
}

impl ImageShape {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Geometric center `(x, y)` in pixel coordinates.
    pub fn center(&self) -> (f64, f64) {
        (self.cols as f64 * 0.5, self.rows as f64 * 0.5)
    }

    pub fn min_dim(&self) -> usize {
        self.rows.min(self.cols)
    }

    /// Fails with [`WcsError::DegenerateShape`] when either dimension is zero.
    pub fn validate(&self) -> Result<(), WcsError> {
        if self.rows == 0 || self.cols == 0 {
            return Err(WcsError::DegenerateShape {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }
}

impl From<(usize, usize)> for ImageShape {
    fn from((rows, cols): (usize, usize)) -> Self {
        Self { rows, cols }
    }
}

/// Linear pixel scale of a mapping along each pixel axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelScale {
    /// Magnitude in degrees per pixel, `[x, y]`.
    pub scales: [f64; 2],
    /// `+1.0` or `-1.0` per axis; `-1.0` on x is the usual East-left layout.
    pub signs: [f64; 2],
}

impl PixelScale {
    /// Scale from a CD matrix given in degrees per pixel.
    ///
    /// Magnitudes are the column norms. The x sign is negative when the
    /// matrix has negative determinant (East-left parity).
    pub fn from_cd(cd: [[f64; 2]; 2]) -> Self {
        let sx = cd[0][0].hypot(cd[1][0]);
        let sy = cd[0][1].hypot(cd[1][1]);
        let det = cd[0][0] * cd[1][1] - cd[0][1] * cd[1][0];
        let signs = if det < 0.0 { [-1.0, 1.0] } else { [1.0, 1.0] };
        Self {
            scales: [sx, sy],
            signs,
        }
    }
}

/// Valid pixel domain of a mapping, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub x: (f64, f64),
    pub y: (f64, f64),
}

impl BoundingBox {
    pub fn contains(&self, x: f64, y: f64) -> bool {
        self.x.0 <= x && x <= self.x.1 && self.y.0 <= y && y <= self.y.1
    }
}

/// Pixel ↔ world conversion capability.
pub trait WorldMapping {
    fn pixel_to_world(&self, x: f64, y: f64) -> Result<SkyCoord, WcsError>;

    fn world_to_pixel(&self, coord: SkyCoord) -> Result<(f64, f64), WcsError>;

    /// Linear scale, when the mapping is linear up to projection.
    fn pixel_scale(&self) -> Option<PixelScale> {
        None
    }

    fn bounding_box(&self) -> Option<BoundingBox> {
        None
    }
}

/// True when the mapping declares a bounding box and `(x, y)` falls outside it.
pub fn outside_bounding_box(mapping: &dyn WorldMapping, x: f64, y: f64) -> bool {
    mapping.bounding_box().is_some_and(|bb| !bb.contains(x, y))
}

/// FITS-style WCS header keywords with numeric values.
///
/// Keys are stored upper-cased, so lookups are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WcsInfo {
    cards: BTreeMap<String, f64>,
}

impl WcsInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: f64) {
        self.cards.insert(key.to_ascii_uppercase(), value);
    }

    pub fn with(mut self, key: &str, value: f64) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.cards.get(&key.to_ascii_uppercase()).copied()
    }

    pub fn require(&self, key: &str) -> Result<f64, WcsError> {
        self.get(key)
            .ok_or_else(|| WcsError::MissingKeyword(key.to_ascii_uppercase()))
    }

    /// `CDELT1`, `CDELT2`, if both are present.
    pub fn cdelt(&self) -> Option<[f64; 2]> {
        Some([self.get("CDELT1")?, self.get("CDELT2")?])
    }

    /// `PCi_j` matrix; missing terms default to the identity.
    pub fn pc(&self) -> [[f64; 2]; 2] {
        let term = |i: usize, j: usize| {
            self.get(&format!("PC{i}_{j}"))
                .unwrap_or(if i == j { 1.0 } else { 0.0 })
        };
        [[term(1, 1), term(1, 2)], [term(2, 1), term(2, 2)]]
    }

    /// `CDi_j` matrix, if any CD term is present.
    pub fn cd(&self) -> Option<[[f64; 2]; 2]> {
        let keys = ["CD1_1", "CD1_2", "CD2_1", "CD2_2"];
        if keys.iter().all(|k| self.get(k).is_none()) {
            return None;
        }
        let term = |k: &str| self.get(k).unwrap_or(0.0);
        Some([
            [term("CD1_1"), term("CD1_2")],
            [term("CD2_1"), term("CD2_2")],
        ])
    }

    /// Per-axis scale from `CDELT`/`PC`: column norms of `diag(CDELT)·PC`
    /// with the signs of `CDELT`.
    pub fn pixel_scale(&self) -> Option<PixelScale> {
        let cdelt = self.cdelt()?;
        let pc = self.pc();
        let col = |j: usize| (cdelt[0] * pc[0][j]).hypot(cdelt[1] * pc[1][j]);
        let sign = |v: f64| if v < 0.0 { -1.0 } else { 1.0 };
        Some(PixelScale {
            scales: [col(0), col(1)],
            signs: [sign(cdelt[0]), sign(cdelt[1])],
        })
    }

    /// `(NAXIS2, NAXIS1)` as an image shape, if present.
    pub fn shape(&self) -> Option<ImageShape> {
        let cols = self.get("NAXIS1")?;
        let rows = self.get("NAXIS2")?;
        Some(ImageShape::new(rows as usize, cols as usize))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.cards.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

impl<'a> FromIterator<(&'a str, f64)> for WcsInfo {
    fn from_iter<I: IntoIterator<Item = (&'a str, f64)>>(iter: I) -> Self {
        let mut info = Self::new();
        for (k, v) in iter {
            info.insert(k, v);
        }
        info
    }
}
