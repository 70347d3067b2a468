//! Per-camera projection of raw frames into the shared ground plane.
//!
//! A [`Transformation`] chains three steps for every frame:
//!
//! 1. focal normalization in stream resolution,
//! 2. area-averaging downsample to the working resolution,
//! 3. nearest-neighbour perspective warp into the output resolution.
//!
//! The homography is derived from the camera's calibration after scaling
//! the source points into working space and the target points into output
//! space.  It is recomputed eagerly whenever the calibration changes.
//!
//! # Degenerate calibration
//!
//! A calibration that does not hold exactly four correspondences, or whose
//! four points cannot be solved, yields the **identity** matrix.  This is
//! deliberate: a misconfigured camera keeps producing (unwarped) output
//! instead of stopping safety monitoring.  The fallback is logged at `warn`.

use chrono::{DateTime, Utc};
use image::{Rgb, RgbImage, imageops};
use sand_types::config::CameraConfig;
use sand_types::{CalPoints, Dimensions, Point, Quad, SandError};
use tracing::{debug, warn};

use crate::focal::FocalNormalizer;
use crate::homography::{Homography, homography_from_4pt};
use crate::scale::Scale;

/// A captured frame plus its lazily attached ground-plane projection.
#[derive(Debug, Clone)]
pub struct EnrichedFrame {
    pub camera_name: String,
    pub timestamp: DateTime<Utc>,
    pub frame: RgbImage,
    transformed: Option<RgbImage>,
}

impl EnrichedFrame {
    pub fn new(camera_name: impl Into<String>, frame: RgbImage) -> Self {
        Self {
            camera_name: camera_name.into(),
            timestamp: Utc::now(),
            frame,
            transformed: None,
        }
    }

    /// The warped frame, once a [`Transformation`] has produced it.
    pub fn transformed(&self) -> Option<&RgbImage> {
        self.transformed.as_ref()
    }
}

/// Raw-pixel to ground-plane mapping for one camera.
#[derive(Debug, Clone)]
pub struct Transformation {
    camera_name: String,
    output: Dimensions,
    /// Stream resolution → working resolution.
    capture_scale: Scale,
    /// Calibration target resolution → output resolution.
    target_scale: Scale,
    /// Calibration source resolution → stream resolution.
    focal_scale: Scale,
    focal: FocalNormalizer,
    /// Source points in stream pixels, targets in calibration target space.
    cal_points: CalPoints,
    matrix: Homography,
    inverse: Homography,
}

impl Transformation {
    /// Build the transformation for `config`, warping into `output`.
    ///
    /// # Errors
    ///
    /// [`SandError::InvalidDimensions`] if any configured resolution or
    /// `output` has a zero side.
    pub fn new(config: &CameraConfig, output: Dimensions) -> Result<Self, SandError> {
        let capture_scale = Scale::new(config.stream_resolution, config.working_resolution)?;
        let target_scale = Scale::new(config.transformation_target_resolution, output)?;
        let focal_scale = Scale::new(config.transformation_source_resolution, config.stream_resolution)?;
        let focal = FocalNormalizer::new(config.focal * focal_scale.scale_avg());

        let mut transformation = Self {
            camera_name: config.name.clone(),
            output,
            capture_scale,
            target_scale,
            focal_scale,
            focal,
            cal_points: config.cal_points(),
            matrix: Homography::identity(),
            inverse: Homography::identity(),
        };
        transformation.refresh_matrix();
        Ok(transformation)
    }

    pub fn camera_name(&self) -> &str {
        &self.camera_name
    }

    pub fn output(&self) -> Dimensions {
        self.output
    }

    pub fn cal_points(&self) -> &CalPoints {
        &self.cal_points
    }

    /// The cached working-space → output-space matrix.
    pub fn get_matrix(&self) -> Homography {
        self.matrix
    }

    /// Replace the calibration (source points in stream pixels) and
    /// recompute the matrix.
    pub fn set_cal_points(&mut self, cal_points: CalPoints) {
        self.cal_points = cal_points;
        self.refresh_matrix();
    }

    /// Replace only the ground-plane target points.
    pub fn set_target_points(&mut self, target_points: Vec<Point>) {
        self.cal_points.target_points = target_points;
        self.refresh_matrix();
    }

    /// Set the focal value, given in calibration-source pixels.
    pub fn set_focal(&mut self, focal: f64) {
        self.focal.set_focal(focal * self.focal_scale.scale_avg());
    }

    fn compute_matrix(&self) -> Homography {
        if !self.cal_points.is_well_posed() {
            // Identity on purpose: keep the pipeline running unwarped.
            warn!(
                camera = %self.camera_name,
                points = self.cal_points.len(),
                "calibration is not 4 correspondences, using identity matrix"
            );
            return Homography::identity();
        }

        let mut src = [Point::default(); 4];
        let mut dst = [Point::default(); 4];
        for i in 0..4 {
            src[i] = self.capture_scale.point(self.cal_points.source_points[i]);
            dst[i] = self.target_scale.point(self.cal_points.target_points[i]);
        }
        homography_from_4pt(&src, &dst).unwrap_or_else(|| {
            warn!(camera = %self.camera_name, "degenerate calibration, using identity matrix");
            Homography::identity()
        })
    }

    fn refresh_matrix(&mut self) {
        self.matrix = self.compute_matrix();
        self.inverse = self.matrix.inverse().unwrap_or_else(Homography::identity);
        debug!(camera = %self.camera_name, matrix = ?self.matrix.to_array(), "matrix updated");
    }

    /// Map a stream-space pixel into output space.
    pub fn transform_point(&self, point: Point) -> Point {
        self.matrix.apply(self.capture_scale.point(point))
    }

    /// Map a stream-space detection box corner by corner.
    pub fn transform_quad(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.transform_point(p))
    }

    /// Calibration targets expressed in output pixels.
    pub fn transformed_cal_points(&self) -> Vec<Point> {
        self.target_scale.points(&self.cal_points.target_points)
    }

    /// Project a stream-resolution image into the output plane.
    pub fn transform_image(&mut self, image: &RgbImage) -> RgbImage {
        let normalized = self.focal.normalize(image);

        let working = self.capture_scale.scaled_dimensions(Dimensions::new(
            normalized.width(),
            normalized.height(),
        ));
        let resized = if (working.width, working.height) == normalized.dimensions() {
            normalized
        } else {
            imageops::thumbnail(&normalized, working.width, working.height)
        };

        self.warp(&resized)
    }

    /// Warp `frame.frame` and cache the result on the frame.
    ///
    /// A frame that already carries a projection is left untouched.
    pub fn transform_enriched_frame(&mut self, frame: &mut EnrichedFrame) {
        if frame.transformed.is_none() {
            frame.transformed = Some(self.transform_image(&frame.frame));
        }
    }

    fn warp(&self, src: &RgbImage) -> RgbImage {
        let (sw, sh) = src.dimensions();
        let mut out = RgbImage::from_pixel(self.output.width, self.output.height, Rgb([0, 0, 0]));
        for y in 0..self.output.height {
            for x in 0..self.output.width {
                let p = self.inverse.apply(Point::new(f64::from(x), f64::from(y)));
                let (sx, sy) = (p.x.round(), p.y.round());
                if sx >= 0.0 && sy >= 0.0 && sx < f64::from(sw) && sy < f64::from(sh) {
                    out.put_pixel(x, y, *src.get_pixel(sx as u32, sy as u32));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn camera(source: Vec<Point>, target: Vec<Point>) -> CameraConfig {
        CameraConfig {
            name: "f1_c1".into(),
            stream_resolution: Dimensions::new(2560, 1440),
            transformation_source_resolution: Dimensions::new(2560, 1440),
            transformation_target_resolution: Dimensions::new(7000, 8000),
            working_resolution: Dimensions::new(1280, 720),
            transformation: CalPoints::new(source, target).unwrap(),
            ..CameraConfig::default()
        }
    }

    fn pts(raw: &[(f64, f64)]) -> Vec<Point> {
        raw.iter().copied().map(Point::from).collect()
    }

    #[test]
    fn calibration_points_land_on_their_targets() {
        let source = pts(&[(400.0, 300.0), (2100.0, 320.0), (2300.0, 1300.0), (200.0, 1250.0)]);
        let target = pts(&[(1000.0, 1000.0), (6000.0, 1000.0), (6000.0, 7000.0), (1000.0, 7000.0)]);
        let t = Transformation::new(&camera(source.clone(), target), Dimensions::new(700, 800)).unwrap();

        for (s, expected) in source.iter().zip(t.transformed_cal_points()) {
            let mapped = t.transform_point(*s);
            assert!((mapped.x - expected.x).abs() < 0.5, "{mapped:?} vs {expected:?}");
            assert!((mapped.y - expected.y).abs() < 0.5, "{mapped:?} vs {expected:?}");
        }
    }

    #[test]
    fn three_points_fall_back_to_identity() {
        let three = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let t = Transformation::new(&camera(three.clone(), three), Dimensions::new(700, 800)).unwrap();
        assert!(t.get_matrix().is_identity());
    }

    #[test]
    fn five_points_fall_back_to_identity() {
        let five = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (5.0, 5.0)]);
        let t = Transformation::new(&camera(five.clone(), five), Dimensions::new(700, 800)).unwrap();
        assert!(t.get_matrix().is_identity());
    }

    #[test]
    fn set_cal_points_recomputes_matrix() {
        let three = pts(&[(0.0, 0.0), (10.0, 0.0), (10.0, 10.0)]);
        let mut t = Transformation::new(&camera(three.clone(), three), Dimensions::new(700, 800)).unwrap();
        assert!(t.get_matrix().is_identity());

        let square = pts(&[(0.0, 0.0), (2560.0, 0.0), (2560.0, 1440.0), (0.0, 1440.0)]);
        let ground = pts(&[(0.0, 0.0), (7000.0, 0.0), (7000.0, 8000.0), (0.0, 8000.0)]);
        t.set_cal_points(CalPoints::new(square, ground).unwrap());
        assert!(!t.get_matrix().is_identity());
        let corner = t.transform_point(Point::new(2560.0, 1440.0));
        assert!((corner.x - 700.0).abs() < 1e-6 && (corner.y - 800.0).abs() < 1e-6);
    }

    #[test]
    fn zero_output_is_rejected() {
        let cam = CameraConfig::default();
        assert!(Transformation::new(&cam, Dimensions::new(0, 800)).is_err());
    }

    #[test]
    fn identity_pipeline_preserves_pixels() {
        let unit = pts(&[(0.0, 0.0), (16.0, 0.0), (16.0, 12.0), (0.0, 12.0)]);
        let cam = CameraConfig {
            focal: 1e9,
            stream_resolution: Dimensions::new(16, 12),
            transformation_source_resolution: Dimensions::new(16, 12),
            transformation_target_resolution: Dimensions::new(16, 12),
            working_resolution: Dimensions::new(16, 12),
            transformation: CalPoints::new(unit.clone(), unit).unwrap(),
            ..CameraConfig::default()
        };
        let mut t = Transformation::new(&cam, Dimensions::new(16, 12)).unwrap();

        let mut image = RgbImage::new(16, 12);
        image.put_pixel(5, 7, Rgb([0, 255, 0]));
        let mut frame = EnrichedFrame::new("f1_c1", image);
        t.transform_enriched_frame(&mut frame);

        let warped = frame.transformed().unwrap();
        assert_eq!(warped.dimensions(), (16, 12));
        assert_eq!(warped.get_pixel(5, 7), &Rgb([0, 255, 0]));
        assert_eq!(warped.get_pixel(6, 7), &Rgb([0, 0, 0]));
    }

    #[test]
    fn calibration_pixels_are_warped_onto_their_targets() {
        let source = pts(&[(40.0, 30.0), (210.0, 25.0), (220.0, 120.0), (30.0, 110.0)]);
        let target = pts(&[(1000.0, 1000.0), (6000.0, 1000.0), (6000.0, 7000.0), (1000.0, 7000.0)]);
        let cam = CameraConfig {
            focal: 1e9,
            stream_resolution: Dimensions::new(256, 144),
            transformation_source_resolution: Dimensions::new(256, 144),
            transformation_target_resolution: Dimensions::new(7000, 8000),
            working_resolution: Dimensions::new(256, 144),
            transformation: CalPoints::new(source.clone(), target).unwrap(),
            ..CameraConfig::default()
        };
        let mut t = Transformation::new(&cam, Dimensions::new(700, 800)).unwrap();

        let colours = [Rgb([255, 0, 0]), Rgb([0, 255, 0]), Rgb([0, 0, 255]), Rgb([255, 255, 0])];
        let mut image = RgbImage::from_pixel(256, 144, Rgb([40, 40, 40]));
        for (p, colour) in source.iter().zip(colours) {
            image.put_pixel(p.x as u32, p.y as u32, colour);
        }
        let warped = t.transform_image(&image);
        assert_eq!(warped.dimensions(), (700, 800));

        let expected: [(u32, u32); 4] = [(100, 100), (600, 100), (600, 700), (100, 700)];
        for ((x, y), colour) in expected.into_iter().zip(colours) {
            let found = (x - 3..=x + 3).any(|u| (y - 3..=y + 3).any(|v| warped.get_pixel(u, v) == &colour));
            assert!(found, "{colour:?} not found around ({x}, {y})");
        }
        // Inside the calibrated quad the frame content carries through.
        assert_eq!(warped.get_pixel(350, 400), &Rgb([40, 40, 40]));
    }

    #[test]
    fn warp_output_has_output_dimensions() {
        let mut t = Transformation::new(&CameraConfig::default(), Dimensions::new(70, 80)).unwrap();
        let out = t.transform_image(&RgbImage::new(256, 144));
        assert_eq!(out.dimensions(), (70, 80));
    }
}
