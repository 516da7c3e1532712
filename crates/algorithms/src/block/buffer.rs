//! Point storage for the sort-based estimators (median and mode)

use std::cmp::Ordering;

use super::BlockPoint;
use super::robust::is_integral;

/// One accepted point, as kept until the cells are finalized
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SortRecord {
    pub node: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub weight: f64,
    pub source_id: u64,
}

/// Coordinate a run of records can be ordered by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl SortRecord {
    #[inline]
    pub fn coord(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }
}

/// Order by cell, then z, then source id
fn by_node_then_z(a: &SortRecord, b: &SortRecord) -> Ordering {
    a.node
        .cmp(&b.node)
        .then_with(|| a.z.total_cmp(&b.z))
        .then_with(|| a.source_id.cmp(&b.source_id))
}

/// Stable sort of one cell's records along `axis`
pub fn sort_run(run: &mut [SortRecord], axis: Axis) {
    run.sort_by(|a, b| a.coord(axis).total_cmp(&b.coord(axis)));
}

/// Growable store of accepted points, tracking whether every z is an
/// integer for the histogram defaults.
#[derive(Debug, Clone)]
pub struct PointBuffer {
    records: Vec<SortRecord>,
    all_integral: bool,
}

impl Default for PointBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl PointBuffer {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            all_integral: true,
        }
    }

    pub fn push(&mut self, point: &BlockPoint) {
        if self.all_integral && !is_integral(point.z) {
            self.all_integral = false;
        }
        self.records.push(SortRecord {
            node: point.node,
            x: point.x,
            y: point.y,
            z: point.z,
            weight: point.weight,
            source_id: point.source_id,
        });
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Whether every stored z is an integer (vacuously true when empty)
    pub fn all_integral(&self) -> bool {
        self.all_integral
    }

    /// Bytes held by the record storage
    pub fn memory_bytes(&self) -> usize {
        self.records.capacity() * std::mem::size_of::<SortRecord>()
    }

    /// Sort by cell and z, then split into one mutable run per cell.
    ///
    /// Runs are returned in increasing node order and each is sorted by
    /// ascending z (ties by source id).
    pub fn cells_mut(&mut self) -> Vec<&mut [SortRecord]> {
        self.records.sort_unstable_by(by_node_then_z);
        self.records.chunk_by_mut(|a, b| a.node == b.node).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(node: usize, z: f64, source_id: u64) -> BlockPoint {
        BlockPoint {
            node,
            x: 0.0,
            y: 0.0,
            z,
            weight: 1.0,
            position_weight: 1.0,
            error_term: 0.0,
            source_id,
        }
    }

    #[test]
    fn test_cells_sorted_by_node_and_z() {
        let mut buffer = PointBuffer::new();
        for (node, z, id) in [(3, 2.0, 1), (1, 5.0, 2), (3, 1.0, 3), (1, 4.0, 4), (3, 1.0, 0)] {
            buffer.push(&point(node, z, id));
        }
        let cells = buffer.cells_mut();
        assert_eq!(cells.len(), 2);
        let first: Vec<f64> = cells[0].iter().map(|r| r.z).collect();
        assert_eq!(first, vec![4.0, 5.0]);
        let ids: Vec<u64> = cells[1].iter().map(|r| r.source_id).collect();
        assert_eq!(ids, vec![0, 3, 1]);
    }

    #[test]
    fn test_integral_tracking() {
        let mut buffer = PointBuffer::new();
        assert!(buffer.is_empty());
        assert!(buffer.all_integral());
        buffer.push(&point(0, 3.0, 1));
        buffer.push(&point(0, -2.0, 2));
        assert_eq!(buffer.len(), 2);
        assert!(buffer.all_integral());
        buffer.push(&point(0, 0.5, 3));
        assert!(!buffer.all_integral());
    }

    #[test]
    fn test_sort_run_by_axis() {
        let mut run = vec![
            SortRecord { node: 0, x: 2.0, y: 1.0, z: 0.0, weight: 1.0, source_id: 1 },
            SortRecord { node: 0, x: 1.0, y: 3.0, z: 1.0, weight: 1.0, source_id: 2 },
        ];
        sort_run(&mut run, Axis::X);
        assert_eq!(run[0].source_id, 2);
        sort_run(&mut run, Axis::Y);
        assert_eq!(run[0].source_id, 1);
    }
}
