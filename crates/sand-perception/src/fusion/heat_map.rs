//! Occupancy counters over the fusion frame.

use sand_types::{Dimensions, Point};

/// A grid of hit counters, one per `cluster_size`×`cluster_size` block of
/// output pixels.
///
/// Counts only grow through [`add`][HeatMap::add]; decay happens solely
/// through explicit [`cool_down`][HeatMap::cool_down] or
/// [`reset`][HeatMap::reset] calls.
#[derive(Debug, Clone, PartialEq)]
pub struct HeatMap {
    cluster_size: u32,
    columns: usize,
    rows: usize,
    heat_up: u32,
    cool_down: u32,
    cells: Vec<u32>,
}

impl HeatMap {
    pub fn new(output: Dimensions, cluster_size: u32, heat_up: u32, cool_down: u32) -> Self {
        let cluster_size = cluster_size.max(1);
        let columns = output.width.div_ceil(cluster_size) as usize;
        let rows = output.height.div_ceil(cluster_size) as usize;
        Self {
            cluster_size,
            columns,
            rows,
            heat_up,
            cool_down,
            cells: vec![0; columns * rows],
        }
    }

    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    fn cell_index(&self, point: Point) -> Option<usize> {
        if point.x < 0.0 || point.y < 0.0 || !point.x.is_finite() || !point.y.is_finite() {
            return None;
        }
        let column = (point.x / f64::from(self.cluster_size)) as usize;
        let row = (point.y / f64::from(self.cluster_size)) as usize;
        (column < self.columns && row < self.rows).then_some(row * self.columns + column)
    }

    /// Heat up the cell under `point`. Points outside the frame are ignored.
    pub fn add(&mut self, point: Point) -> bool {
        match self.cell_index(point) {
            Some(i) => {
                self.cells[i] = self.cells[i].saturating_add(self.heat_up);
                true
            }
            None => false,
        }
    }

    /// Value of the cell under `point`, zero outside the frame.
    pub fn heat_at(&self, point: Point) -> u32 {
        self.cell_index(point).map_or(0, |i| self.cells[i])
    }

    pub fn cell(&self, column: usize, row: usize) -> u32 {
        if column < self.columns && row < self.rows {
            self.cells[row * self.columns + column]
        } else {
            0
        }
    }

    pub fn max(&self) -> u32 {
        self.cells.iter().copied().max().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.cells.iter().map(|&c| u64::from(c)).sum()
    }

    pub fn cool_down(&mut self) {
        for cell in &mut self.cells {
            *cell = cell.saturating_sub(self.cool_down);
        }
    }

    pub fn reset(&mut self) {
        self.cells.fill(0);
    }
}
