// 🧮 Record Normalizer - positional rows → fixed-shape indicator record
//
// Rows are picked by a configured offset table (RowMap). The derived
// indicators are small pure functions over Option<f64>; absent in, absent out
// unless the rule says otherwise.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::{PipelineError, PipelineResult};
use crate::table::RawReportTable;

// ============================================================================
// FIELD KEYS
// ============================================================================

/// Semantic indicator keys. Declaration order is the workbook column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKey {
    Y1,
    Y2,
    Y3,
    Y4,
    Y5,
    Y6,
    Y7,
    Y8,
    Y9,
    Y10,
    Y11,
    Y12,
    Y13,
    X1,
    X2,
    X3,
    X4,
    X5,
    /// Added to y9 when present.
    T0,
    /// Divisor for y3 and x5.
    T1,
}

impl FieldKey {
    /// The 13 output indicators.
    pub const OUTPUTS: [FieldKey; 13] = [
        FieldKey::Y1,
        FieldKey::Y2,
        FieldKey::Y3,
        FieldKey::Y4,
        FieldKey::Y5,
        FieldKey::Y6,
        FieldKey::Y7,
        FieldKey::Y8,
        FieldKey::Y9,
        FieldKey::Y10,
        FieldKey::Y11,
        FieldKey::Y12,
        FieldKey::Y13,
    ];

    /// The 5 input indicators.
    pub const INPUTS: [FieldKey; 5] = [
        FieldKey::X1,
        FieldKey::X2,
        FieldKey::X3,
        FieldKey::X4,
        FieldKey::X5,
    ];

    /// All 20 keys a row map must cover.
    pub const ALL: [FieldKey; 20] = [
        FieldKey::Y1,
        FieldKey::Y2,
        FieldKey::Y3,
        FieldKey::Y4,
        FieldKey::Y5,
        FieldKey::Y6,
        FieldKey::Y7,
        FieldKey::Y8,
        FieldKey::Y9,
        FieldKey::Y10,
        FieldKey::Y11,
        FieldKey::Y12,
        FieldKey::Y13,
        FieldKey::X1,
        FieldKey::X2,
        FieldKey::X3,
        FieldKey::X4,
        FieldKey::X5,
        FieldKey::T0,
        FieldKey::T1,
    ];

    /// The 18 public indicators, in column order.
    pub fn indicators() -> impl Iterator<Item = FieldKey> {
        FieldKey::OUTPUTS.into_iter().chain(FieldKey::INPUTS)
    }

    pub fn is_auxiliary(&self) -> bool {
        matches!(self, FieldKey::T0 | FieldKey::T1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKey::Y1 => "y1",
            FieldKey::Y2 => "y2",
            FieldKey::Y3 => "y3",
            FieldKey::Y4 => "y4",
            FieldKey::Y5 => "y5",
            FieldKey::Y6 => "y6",
            FieldKey::Y7 => "y7",
            FieldKey::Y8 => "y8",
            FieldKey::Y9 => "y9",
            FieldKey::Y10 => "y10",
            FieldKey::Y11 => "y11",
            FieldKey::Y12 => "y12",
            FieldKey::Y13 => "y13",
            FieldKey::X1 => "x1",
            FieldKey::X2 => "x2",
            FieldKey::X3 => "x3",
            FieldKey::X4 => "x4",
            FieldKey::X5 => "x5",
            FieldKey::T0 => "t0",
            FieldKey::T1 => "t1",
        }
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// ROW MAP (positional contract, kept as data)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMapping {
    pub row: usize,
    pub field: FieldKey,
}

/// Ordered `(row offset, field)` table.
///
/// If the upstream report gains or loses rows this misaligns silently, so it
/// lives in config where it can be audited.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowMap {
    pub entries: Vec<RowMapping>,
}

impl Default for RowMap {
    fn default() -> Self {
        let offsets: [usize; 20] = [
            10, 57, 58, 61, 63, 70, 72, 74, 76, 12, 68, 82, 66, 48, 7, 38, 31, 83, 78, 5,
        ];
        RowMap {
            entries: FieldKey::ALL
                .into_iter()
                .zip(offsets)
                .map(|(field, row)| RowMapping { row, field })
                .collect(),
        }
    }
}

impl RowMap {
    /// Every field key exactly once.
    pub fn validate(&self) -> PipelineResult<()> {
        for key in FieldKey::ALL {
            let count = self.entries.iter().filter(|e| e.field == key).count();
            if count != 1 {
                return Err(PipelineError::Config(format!(
                    "row map must map field {} exactly once (found {})",
                    key, count
                )));
            }
        }
        Ok(())
    }

    pub fn row_of(&self, field: FieldKey) -> Option<usize> {
        self.entries.iter().find(|e| e.field == field).map(|e| e.row)
    }
}

// ============================================================================
// DERIVED FIELDS
// ============================================================================

/// `value / t1`, absent when either side is absent. A zero `t1` never gets
/// here: `RecordNormalizer::normalize` rejects the year first.
pub fn per_t1(value: Option<f64>, t1: Option<f64>) -> Option<f64> {
    match (value, t1) {
        (Some(v), Some(d)) if d != 0.0 => Some(v / d),
        (Some(_), Some(_)) => {
            debug!("t1 is zero, derived value treated as absent");
            None
        }
        _ => None,
    }
}

/// y9 plus t0, where either side may stand alone.
pub fn y9_final(y9: Option<f64>, t0: Option<f64>) -> Option<f64> {
    match (y9, t0) {
        (None, Some(t)) => Some(t),
        (Some(y), None) => Some(y),
        (Some(y), Some(t)) => Some(t + y),
        (None, None) => None,
    }
}

/// Percentage points → fraction. A value still above 1 after rescaling is corrupt.
pub fn x4_scaled(x4: Option<f64>) -> Option<f64> {
    let x4 = x4?;
    if x4 <= 1.0 {
        return Some(x4);
    }
    let scaled = x4 / 100.0;
    if scaled > 1.0 {
        debug!(x4, "x4 above 100 percent, treated as absent");
        None
    } else {
        Some(scaled)
    }
}

// ============================================================================
// NORMALIZED RECORD
// ============================================================================

/// One entity, one year, exactly the 18 public indicators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedRecord {
    pub entity_name: String,
    pub year: String,
    pub fields: BTreeMap<FieldKey, Option<f64>>,
}

impl NormalizedRecord {
    pub fn get(&self, key: FieldKey) -> Option<f64> {
        self.fields.get(&key).copied().flatten()
    }
}

// ============================================================================
// NORMALIZER
// ============================================================================

#[derive(Debug, Clone, Default)]
pub struct RecordNormalizer {
    rows: RowMap,
}

impl RecordNormalizer {
    pub fn new(rows: RowMap) -> Self {
        RecordNormalizer { rows }
    }

    pub fn row_map(&self) -> &RowMap {
        &self.rows
    }

    pub fn normalize(
        &self,
        table: &RawReportTable,
        entity_name: &str,
        year: &str,
    ) -> PipelineResult<NormalizedRecord> {
        let col = table
            .year_index(year)
            .ok_or_else(|| PipelineError::MissingYear(year.to_string()))?;

        let mut raw: BTreeMap<FieldKey, Option<f64>> = BTreeMap::new();
        for mapping in &self.rows.entries {
            let cell = table
                .cell(mapping.row, col)
                .ok_or_else(|| PipelineError::RowOutOfRange {
                    row: mapping.row,
                    field: mapping.field.to_string(),
                    rows: table.row_count(),
                })?;
            raw.insert(mapping.field, cell);
        }

        let value = |k: FieldKey| raw.get(&k).copied().flatten();
        let t0 = value(FieldKey::T0);
        let t1 = value(FieldKey::T1);
        if t1 == Some(0.0) {
            return Err(PipelineError::ZeroDivisor {
                year: year.to_string(),
            });
        }

        let mut fields: BTreeMap<FieldKey, Option<f64>> = FieldKey::indicators()
            .map(|k| (k, value(k)))
            .collect();

        fields.insert(FieldKey::Y3, per_t1(value(FieldKey::Y3), t1));
        fields.insert(FieldKey::X5, per_t1(value(FieldKey::X5), t1));
        fields.insert(FieldKey::Y9, y9_final(value(FieldKey::Y9), t0));
        fields.insert(FieldKey::X4, x4_scaled(value(FieldKey::X4)));

        Ok(NormalizedRecord {
            entity_name: entity_name.to_string(),
            year: year.to_string(),
            fields,
        })
    }
}
