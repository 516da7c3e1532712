//! Per-cell output records and their table / raster forms

use std::fmt;
use std::str::FromStr;

use blockstat_core::{Error, GridSpec, Raster, Result};

/// Which record of a tie supplies the reported source id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceTie {
    /// The record sorting lower in z
    #[default]
    Low,
    /// The record sorting higher in z
    High,
}

/// Extended statistics attached to a cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Spread {
    /// A scale estimate (std dev, propagated error or MAD) with the z extremes
    Scale { scale: f64, low: f64, high: f64 },
    /// Box-and-whisker summary
    Quartiles { low: f64, q25: f64, q75: f64, high: f64 },
}

/// Shape of the spread columns an estimator emits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpreadKind {
    #[default]
    None,
    Scale,
    Quartiles,
}

/// Which optional columns every record of a run carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordLayout {
    pub spread: SpreadKind,
    pub weight: bool,
    pub source_id: bool,
}

impl RecordLayout {
    /// Column names in output order
    pub fn column_names(&self) -> Vec<&'static str> {
        let mut names = vec!["x", "y", "z"];
        match self.spread {
            SpreadKind::None => {}
            SpreadKind::Scale => names.extend(["scale", "low", "high"]),
            SpreadKind::Quartiles => names.extend(["low", "q25", "q75", "high"]),
        }
        if self.weight {
            names.push("weight");
        }
        if self.source_id {
            names.push("source_id");
        }
        names
    }

    /// Whether records with this layout carry `field`
    pub fn has_field(&self, field: BlockField) -> bool {
        match field {
            BlockField::Z => true,
            BlockField::Scale => self.spread == SpreadKind::Scale,
            BlockField::Q25 | BlockField::Q75 => self.spread == SpreadKind::Quartiles,
            BlockField::Low | BlockField::High => self.spread != SpreadKind::None,
            BlockField::Weight => self.weight,
        }
    }
}

/// The summary of one non-empty cell
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlockRecord {
    pub node: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub spread: Option<Spread>,
    /// Sum of the z weights of the cell
    pub weight: Option<f64>,
    pub source_id: Option<u64>,
}

impl BlockRecord {
    /// A record with only location and value
    pub fn new(node: usize, x: f64, y: f64, z: f64) -> Self {
        Self {
            node,
            x,
            y,
            z,
            spread: None,
            weight: None,
            source_id: None,
        }
    }

    /// Output columns: `x y z [spread...] [weight] [source_id]`
    pub fn columns(&self) -> Vec<f64> {
        let mut row = vec![self.x, self.y, self.z];
        match self.spread {
            None => {}
            Some(Spread::Scale { scale, low, high }) => row.extend([scale, low, high]),
            Some(Spread::Quartiles { low, q25, q75, high }) => row.extend([low, q25, q75, high]),
        }
        if let Some(w) = self.weight {
            row.push(w);
        }
        if let Some(id) = self.source_id {
            row.push(id as f64);
        }
        row
    }

    /// Value of a single field, if this record carries it
    pub fn field(&self, field: BlockField) -> Option<f64> {
        match (field, self.spread) {
            (BlockField::Z, _) => Some(self.z),
            (BlockField::Weight, _) => self.weight,
            (BlockField::Scale, Some(Spread::Scale { scale, .. })) => Some(scale),
            (BlockField::Low, Some(Spread::Scale { low, .. } | Spread::Quartiles { low, .. })) => {
                Some(low)
            }
            (BlockField::High, Some(Spread::Scale { high, .. } | Spread::Quartiles { high, .. })) => {
                Some(high)
            }
            (BlockField::Q25, Some(Spread::Quartiles { q25, .. })) => Some(q25),
            (BlockField::Q75, Some(Spread::Quartiles { q75, .. })) => Some(q75),
            _ => None,
        }
    }
}

/// A per-cell quantity that can be written as a raster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockField {
    Z,
    Scale,
    Low,
    Q25,
    Q75,
    High,
    Weight,
}

impl BlockField {
    pub const ALL: [BlockField; 7] = [
        BlockField::Z,
        BlockField::Scale,
        BlockField::Low,
        BlockField::Q25,
        BlockField::Q75,
        BlockField::High,
        BlockField::Weight,
    ];

    /// Short code used in file name patterns
    pub fn code(self) -> &'static str {
        match self {
            BlockField::Z => "z",
            BlockField::Scale => "s",
            BlockField::Low => "l",
            BlockField::Q25 => "q25",
            BlockField::Q75 => "q75",
            BlockField::High => "h",
            BlockField::Weight => "w",
        }
    }
}

impl fmt::Display for BlockField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for BlockField {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        BlockField::ALL
            .into_iter()
            .find(|f| f.code() == s)
            .ok_or_else(|| Error::invalid("field", s, "expected one of z, s, l, q25, q75, h, w"))
    }
}

/// Scatter one field of `records` into a NaN-filled raster over `grid`
pub(crate) fn field_raster(grid: &GridSpec, records: &[BlockRecord], field: BlockField) -> Result<Raster<f64>> {
    let mut raster = Raster::for_grid(grid, f64::NAN);
    for record in records {
        if let Some(value) = record.field(field) {
            raster.set_node(record.node, value)?;
        }
    }
    Ok(raster)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_columns_order() {
        let mut record = BlockRecord::new(0, 1.0, 2.0, 3.0);
        record.spread = Some(Spread::Scale { scale: 0.5, low: 2.0, high: 4.0 });
        record.weight = Some(6.0);
        record.source_id = Some(42);
        assert_eq!(record.columns(), vec![1.0, 2.0, 3.0, 0.5, 2.0, 4.0, 6.0, 42.0]);
    }

    #[test]
    fn test_quartile_fields() {
        let mut record = BlockRecord::new(0, 0.0, 0.0, 2.0);
        record.spread = Some(Spread::Quartiles { low: 1.0, q25: 1.5, q75: 3.0, high: 9.0 });
        assert_eq!(record.field(BlockField::Q25), Some(1.5));
        assert_eq!(record.field(BlockField::High), Some(9.0));
        assert_eq!(record.field(BlockField::Scale), None);
        assert_eq!(record.columns().len(), 7);
    }

    #[test]
    fn test_layout_names() {
        let layout = RecordLayout {
            spread: SpreadKind::Quartiles,
            weight: true,
            source_id: false,
        };
        assert_eq!(
            layout.column_names(),
            vec!["x", "y", "z", "low", "q25", "q75", "high", "weight"]
        );
        assert!(layout.has_field(BlockField::Q75));
        assert!(!layout.has_field(BlockField::Scale));
    }

    #[test]
    fn test_field_codes() {
        for field in BlockField::ALL {
            assert_eq!(field.code().parse::<BlockField>().unwrap(), field);
        }
        assert!("median".parse::<BlockField>().is_err());
    }

    #[test]
    fn test_field_raster() {
        let grid = GridSpec::new(0.0, 1.0, 0.0, 1.0, 1.0, 1.0).unwrap();
        let records = [BlockRecord::new(3, 1.0, 0.0, 7.0)];
        let raster = field_raster(&grid, &records, BlockField::Z).unwrap();
        assert_eq!(raster.get(1, 1).unwrap(), 7.0);
        assert!(raster.get(0, 0).unwrap().is_nan());
    }
}
