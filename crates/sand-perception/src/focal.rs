//! Lens-distortion correction driven by a single focal value.
//!
//! The model is a pinhole camera with a two-term radial distortion around the
//! image centre.  Only the focal length is tunable; the radial coefficients
//! are fixed for the deployed lenses.

use image::RgbImage;
use tracing::debug;

/// Second-order radial coefficient.
pub const K1: f64 = -0.28;
/// Fourth-order radial coefficient.
pub const K2: f64 = 0.07;

/// Precomputed source pixel for every destination pixel of one image size.
#[derive(Debug, Clone)]
struct RemapTable {
    width: u32,
    height: u32,
    /// Row-major, `None` where the source falls outside the frame.
    lookup: Vec<Option<(u32, u32)>>,
}

/// Undistorts frames for one camera.
#[derive(Debug, Clone)]
pub struct FocalNormalizer {
    focal: f64,
    table: Option<RemapTable>,
}

impl FocalNormalizer {
    /// `focal` is in pixels of the frames that will be passed to
    /// [`normalize`][Self::normalize].
    pub fn new(focal: f64) -> Self {
        Self { focal, table: None }
    }

    pub fn focal(&self) -> f64 {
        self.focal
    }

    /// Change the focal value and drop the cached remap table.
    pub fn set_focal(&mut self, focal: f64) {
        if focal != self.focal {
            self.focal = focal;
            self.table = None;
        }
    }

    /// Source coordinate sampled for destination pixel `(u, v)` of a
    /// `width`×`height` frame.
    pub fn distort(&self, u: f64, v: f64, width: u32, height: u32) -> (f64, f64) {
        let cx = f64::from(width) / 2.0;
        let cy = f64::from(height) / 2.0;
        if self.focal <= 0.0 {
            return (u, v);
        }
        let x = (u - cx) / self.focal;
        let y = (v - cy) / self.focal;
        let r2 = x * x + y * y;
        let factor = 1.0 + K1 * r2 + K2 * r2 * r2;
        (cx + x * factor * self.focal, cy + y * factor * self.focal)
    }

    fn build_table(&self, width: u32, height: u32) -> RemapTable {
        debug!(focal = self.focal, width, height, "building focal remap table");
        let mut lookup = Vec::with_capacity(width as usize * height as usize);
        for v in 0..height {
            for u in 0..width {
                let (sx, sy) = self.distort(f64::from(u), f64::from(v), width, height);
                let (sx, sy) = (sx.round(), sy.round());
                let inside = sx >= 0.0 && sy >= 0.0 && sx < f64::from(width) && sy < f64::from(height);
                lookup.push(inside.then_some((sx as u32, sy as u32)));
            }
        }
        RemapTable {
            width,
            height,
            lookup,
        }
    }

    /// Undistort `image`; pixels whose source falls outside the frame are
    /// black.
    pub fn normalize(&mut self, image: &RgbImage) -> RgbImage {
        let (width, height) = image.dimensions();
        let stale = self
            .table
            .as_ref()
            .is_none_or(|t| t.width != width || t.height != height);
        if stale {
            self.table = Some(self.build_table(width, height));
        }

        let mut out = RgbImage::new(width, height);
        if let Some(table) = &self.table {
            for (i, source) in table.lookup.iter().enumerate() {
                if let Some((sx, sy)) = *source {
                    let u = i as u32 % width;
                    let v = i as u32 / width;
                    out.put_pixel(u, v, *image.get_pixel(sx, sy));
                }
            }
        }
        out
    }
}
