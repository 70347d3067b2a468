//! Linear mapping between two rectangular pixel spaces.
//!
//! Axes are scaled independently (`out.width / in.width`,
//! `out.height / in.height`); aspect ratio is not preserved.

use sand_types::{CalPoints, Dimensions, Point, Quad, SandError};

/// Pure coordinate-space mapping from `input` to `output` dimensions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale {
    input: Dimensions,
    output: Dimensions,
    scale_width: f64,
    scale_height: f64,
}

impl Scale {
    /// Build a scale between two pixel spaces.
    ///
    /// # Errors
    ///
    /// [`SandError::InvalidDimensions`] if either space has a zero width or
    /// height.
    pub fn new(input: Dimensions, output: Dimensions) -> Result<Self, SandError> {
        for dims in [input, output] {
            if dims.width == 0 || dims.height == 0 {
                return Err(SandError::InvalidDimensions {
                    width: dims.width,
                    height: dims.height,
                });
            }
        }
        Ok(Self {
            input,
            output,
            scale_width: f64::from(output.width) / f64::from(input.width),
            scale_height: f64::from(output.height) / f64::from(input.height),
        })
    }

    pub fn input(&self) -> Dimensions {
        self.input
    }

    pub fn output(&self) -> Dimensions {
        self.output
    }

    pub fn scale_width(&self) -> f64 {
        self.scale_width
    }

    pub fn scale_height(&self) -> f64 {
        self.scale_height
    }

    /// Mean of both axis factors.
    pub fn scale_avg(&self) -> f64 {
        (self.scale_width + self.scale_height) / 2.0
    }

    /// The mapping from `output` back to `input`.
    pub fn inverse(&self) -> Self {
        Self {
            input: self.output,
            output: self.input,
            scale_width: 1.0 / self.scale_width,
            scale_height: 1.0 / self.scale_height,
        }
    }

    pub fn point(&self, p: Point) -> Point {
        Point::new(p.x * self.scale_width, p.y * self.scale_height)
    }

    pub fn points(&self, points: &[Point]) -> Vec<Point> {
        points.iter().map(|&p| self.point(p)).collect()
    }

    pub fn quad(&self, quad: &Quad) -> Quad {
        quad.map(|p| self.point(p))
    }

    /// Scale both halves of a correspondence with this scale.
    pub fn cal_points(&self, cal: &CalPoints) -> CalPoints {
        CalPoints {
            source_points: self.points(&cal.source_points),
            target_points: self.points(&cal.target_points),
        }
    }

    /// Dimensions of an image of size `dims` after scaling, at least 1x1.
    pub fn scaled_dimensions(&self, dims: Dimensions) -> Dimensions {
        Dimensions::new(
            ((f64::from(dims.width) * self.scale_width).round() as u32).max(1),
            ((f64::from(dims.height) * self.scale_height).round() as u32).max(1),
        )
    }
}
