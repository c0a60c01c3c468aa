use geo::MultiPolygon;
use serde::Serialize;
use std::collections::BTreeMap;

/// Measure column name to value. Ordered so serialized output is stable.
pub type Measures = BTreeMap<String, f64>;

#[derive(Debug, Clone)]
pub struct County {
    /// Normalized join key; `None` when the boundary carries no usable id.
    pub id: Option<String>,
    pub name: String,
    pub geometry: MultiPolygon<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatisticRow {
    pub key: String,
    /// Line in the statistics file, for error reporting.
    pub line: u64,
    pub measures: Measures,
}

#[derive(Debug, Clone)]
pub struct UnifiedRecord {
    pub county: County,
    /// Statistics of the matching row, absent for unmatched counties.
    pub statistics: Option<Measures>,
}

impl UnifiedRecord {
    pub fn measure(&self, column: &str) -> Option<f64> {
        self.statistics.as_ref()?.get(column).copied()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct JoinReport {
    pub boundaries: usize,
    pub statistics: usize,
    pub matched: usize,
    pub unmatched_boundaries: usize,
    pub unused_statistics: usize,
}

/// Boundaries left-joined with statistics, in boundary file order.
#[derive(Debug, Clone)]
pub struct UnifiedTable {
    records: Vec<UnifiedRecord>,
    columns: Vec<String>,
    report: JoinReport,
}

impl UnifiedTable {
    pub fn new(records: Vec<UnifiedRecord>, columns: Vec<String>, report: JoinReport) -> Self {
        Self {
            records,
            columns,
            report,
        }
    }

    pub fn records(&self) -> &[UnifiedRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Measure columns from the statistics header, join column excluded.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn report(&self) -> &JoinReport {
        &self.report
    }

    /// One value per record, or `None` if the column does not exist.
    pub fn column_values(&self, column: &str) -> Option<Vec<Option<f64>>> {
        if !self.has_column(column) {
            return None;
        }
        Some(self.records.iter().map(|r| r.measure(column)).collect())
    }
}
