//! Input point records

/// One input observation `(x, y, z[, weight][, source_id])`.
///
/// `weight` holds the raw weight column (a weight, a sigma or an inverse
/// variance depending on how the caller interprets it); `source_id` is an
/// explicit record identifier. Both are `None` when the table has no such
/// column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PointRecord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub weight: Option<f64>,
    pub source_id: Option<u64>,
}

impl PointRecord {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            x,
            y,
            z,
            weight: None,
            source_id: None,
        }
    }

    /// Attach a weight column value
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = Some(weight);
        self
    }

    /// Attach an explicit source identifier
    pub fn with_source_id(mut self, source_id: u64) -> Self {
        self.source_id = Some(source_id);
        self
    }
}
