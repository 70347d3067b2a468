//! VLP-16 packet decoding into a fixed-size, in-place updated point cloud.
//!
//! The cloud holds one cell per `(azimuth degree, laser row)`: 360 slices of
//! 16 rows.  Every packet overwrites the cells it covers, so readers always
//! see a full-resolution snapshot whose cells may be of different ages.
//!
//! Raw polar samples are retained next to the Cartesian points, which lets
//! [`LidarCloud::set_transformation`] re-anchor the whole cloud without new
//! packets.

use sand_types::{LidarRawPoint, LidarTransformation, Point, SandError};
use tracing::debug;

/// Laser rows per firing sequence.
pub const ROWS: usize = 16;
/// One-degree azimuth buckets per revolution.
pub const SLICES: usize = 360;
/// Total cells in the cloud.
pub const CLOUD_SIZE: usize = ROWS * SLICES;

/// Metres per raw distance unit.
pub const DISTANCE_RESOLUTION: f64 = 0.002;

/// Elevation of each laser row, in degrees.
pub const ELEVATION_DEGREES: [f64; ROWS] = [
    -15.0, 1.0, -13.0, 3.0, -11.0, 5.0, -9.0, 7.0, -7.0, 9.0, -5.0, 11.0, -3.0, 13.0, -1.0, 15.0,
];

pub const PACKET_SIZE: usize = 1206;
pub const BLOCKS_PER_PACKET: usize = 12;
pub const BLOCK_SIZE: usize = 100;
/// Two bytes `0xFF 0xEE` open every data block.
pub const BLOCK_FLAG: u16 = 0xFFEE;

const CHANNELS_PER_BLOCK: usize = 2 * ROWS;
const CHANNEL_SIZE: usize = 3;
/// Hundredths of a degree per revolution.
const FULL_TURN: u32 = 36_000;

/// Cell index of a sample; `angle` is in hundredths of a degree.
#[inline]
pub fn point_index(angle: u16, row: u8) -> usize {
    let slice = (u32::from(angle) % FULL_TURN) / 100;
    slice as usize * ROWS + usize::from(row)
}

/// One transformed sample in the ground frame, in metres.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LidarPoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub reflectivity: u8,
}

impl LidarPoint {
    /// The top-down projection.
    pub fn xy(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

fn to_cartesian(raw: &LidarRawPoint, t: &LidarTransformation) -> LidarPoint {
    let radius = f64::from(raw.distance) * DISTANCE_RESOLUTION;
    let elevation = ELEVATION_DEGREES[usize::from(raw.row) % ROWS].to_radians();
    let azimuth = (f64::from(raw.angle) / 100.0 + t.angle).to_radians();
    let flat = radius * elevation.cos();
    LidarPoint {
        x: flat * azimuth.sin() + t.x,
        y: flat * azimuth.cos() + t.y,
        z: radius * elevation.sin() + t.z,
        reflectivity: raw.reflectivity,
    }
}

/// Decoded cloud of one LiDAR unit.
#[derive(Debug, Clone)]
pub struct LidarCloud {
    transformation: LidarTransformation,
    raw: Vec<LidarRawPoint>,
    points: Vec<LidarPoint>,
}

impl LidarCloud {
    pub fn new(transformation: LidarTransformation) -> Self {
        let raw: Vec<LidarRawPoint> = (0..CLOUD_SIZE)
            .map(|i| LidarRawPoint {
                distance: 0,
                angle: ((i / ROWS) * 100) as u16,
                row: (i % ROWS) as u8,
                reflectivity: 0,
            })
            .collect();
        let points = raw.iter().map(|r| to_cartesian(r, &transformation)).collect();
        Self {
            transformation,
            raw,
            points,
        }
    }

    pub fn transformation(&self) -> LidarTransformation {
        self.transformation
    }

    /// Replace the placement and recompute every cell from its raw sample.
    pub fn set_transformation(&mut self, transformation: LidarTransformation) {
        self.transformation = transformation;
        for (point, raw) in self.points.iter_mut().zip(&self.raw) {
            *point = to_cartesian(raw, &transformation);
        }
        debug!(?transformation, "lidar cloud re-anchored");
    }

    /// Decode one data packet and overwrite the cells it covers.
    ///
    /// # Errors
    ///
    /// - [`SandError::PacketLength`] unless the packet is exactly
    ///   [`PACKET_SIZE`] bytes.
    /// - [`SandError::BadBlockFlag`] if a block does not start with
    ///   [`BLOCK_FLAG`].  Nothing is written in either case.
    pub fn update_point_cloud(&mut self, packet: &[u8]) -> Result<(), SandError> {
        if packet.len() != PACKET_SIZE {
            return Err(SandError::PacketLength {
                expected: PACKET_SIZE,
                actual: packet.len(),
            });
        }

        let mut azimuths = [0u32; BLOCKS_PER_PACKET];
        for (block, azimuth) in azimuths.iter_mut().enumerate() {
            let base = block * BLOCK_SIZE;
            let flag = u16::from_be_bytes([packet[base], packet[base + 1]]);
            if flag != BLOCK_FLAG {
                return Err(SandError::BadBlockFlag { block, flag });
            }
            *azimuth = u32::from(u16::from_le_bytes([packet[base + 2], packet[base + 3]])) % FULL_TURN;
        }

        for block in 0..BLOCKS_PER_PACKET {
            let gap = if block + 1 < BLOCKS_PER_PACKET {
                (azimuths[block + 1] + FULL_TURN - azimuths[block]) % FULL_TURN
            } else {
                (azimuths[block] + FULL_TURN - azimuths[block - 1]) % FULL_TURN
            };
            let firings = [azimuths[block], (azimuths[block] + gap / 2) % FULL_TURN];

            let data = &packet[block * BLOCK_SIZE + 4..(block + 1) * BLOCK_SIZE];
            for channel in 0..CHANNELS_PER_BLOCK {
                let offset = channel * CHANNEL_SIZE;
                let raw = LidarRawPoint {
                    distance: u16::from_le_bytes([data[offset], data[offset + 1]]),
                    angle: firings[channel / ROWS] as u16,
                    row: (channel % ROWS) as u8,
                    reflectivity: data[offset + 2],
                };
                let index = point_index(raw.angle, raw.row);
                self.points[index] = to_cartesian(&raw, &self.transformation);
                self.raw[index] = raw;
            }
        }
        Ok(())
    }

    /// Every cell, indexed by [`point_index`].
    pub fn get_cloud(&self) -> &[LidarPoint] {
        &self.points
    }

    pub fn raw_points(&self) -> &[LidarRawPoint] {
        &self.raw
    }

    /// Top-down projection of every cell that carries a return.
    pub fn pointcloud2d(&self) -> Vec<Point> {
        self.raw
            .iter()
            .zip(&self.points)
            .filter(|(raw, _)| raw.distance > 0)
            .map(|(_, p)| p.xy())
            .collect()
    }
}
