//! Per-cycle collision grid.

use sand_types::{Dimensions, Point};

/// Cells in which a tracked entity was found inside a danger zone during the
/// current fusion cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Collision {
    cluster_size: u32,
    map: Vec<Vec<bool>>,
}

impl Collision {
    pub fn new(output: Dimensions, cluster_size: u32) -> Self {
        let cluster_size = cluster_size.max(1);
        let columns = output.width.div_ceil(cluster_size) as usize;
        let rows = output.height.div_ceil(cluster_size) as usize;
        Self {
            cluster_size,
            map: vec![vec![false; columns]; rows],
        }
    }

    /// Clear every cell. Call once at the start of each cycle.
    pub fn reset(&mut self) {
        for row in &mut self.map {
            row.fill(false);
        }
    }

    /// Flag the cell under `point`; points outside the frame are clamped to
    /// the nearest edge cell.
    pub fn mark(&mut self, point: Point) {
        let rows = self.map.len();
        let Some(columns) = self.map.first().map(Vec::len) else {
            return;
        };
        if columns == 0 {
            return;
        }
        let size = f64::from(self.cluster_size);
        let column = ((point.x / size).max(0.0) as usize).min(columns - 1);
        let row = ((point.y / size).max(0.0) as usize).min(rows - 1);
        self.map[row][column] = true;
    }

    /// Row-major grid, `true` where a collision was recorded.
    pub fn collision_map(&self) -> &Vec<Vec<bool>> {
        &self.map
    }

    pub fn is_collision(&self) -> bool {
        self.map.iter().flatten().any(|&cell| cell)
    }

    pub fn flagged_cells(&self) -> usize {
        self.map.iter().flatten().filter(|&&cell| cell).count()
    }
}
